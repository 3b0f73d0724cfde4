//! Negotiation error types.

use common::{ListingId, OfferId};
use domain::{ErrorKind, OfferError};
use offer_store::StoreError;
use thiserror::Error;

/// Errors returned by [`NegotiationService`](crate::NegotiationService).
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// A business rule refused the request.
    #[error(transparent)]
    Offer(#[from] OfferError),

    /// The offer store failed or refused the write.
    #[error(transparent)]
    Store(StoreError),

    /// No offer with this id exists.
    #[error("offer not found")]
    OfferNotFound(OfferId),

    /// The catalog does not know the listing.
    #[error("listing not found")]
    ListingNotFound(ListingId),

    /// A collaborator the operation depends on is unreachable.
    #[error("{service} unavailable: {reason}")]
    Collaborator {
        service: &'static str,
        reason: String,
    },
}

impl NegotiationError {
    /// Returns the outcome category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NegotiationError::Offer(err) => err.kind(),
            NegotiationError::Store(err) => err.kind(),
            NegotiationError::OfferNotFound(_) | NegotiationError::ListingNotFound(_) => {
                ErrorKind::NotFound
            }
            NegotiationError::Collaborator { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller lost a race and should refetch.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<StoreError> for NegotiationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OfferNotFound(id) => NegotiationError::OfferNotFound(id),
            StoreError::DuplicateActiveOffer { .. } => {
                NegotiationError::Offer(OfferError::DuplicateActiveOffer)
            }
            other => NegotiationError::Store(other),
        }
    }
}

impl From<crate::services::CollaboratorError> for NegotiationError {
    fn from(err: crate::services::CollaboratorError) -> Self {
        NegotiationError::Collaborator {
            service: err.service,
            reason: err.reason,
        }
    }
}

/// Result type for negotiation operations.
pub type Result<T> = std::result::Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{UserId, Version};
    use domain::{OfferEventType, OfferStatus};

    #[test]
    fn test_kinds() {
        assert_eq!(
            NegotiationError::from(OfferError::NotYourTurn).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            NegotiationError::from(OfferError::InvalidStatus {
                status: OfferStatus::Accepted,
                action: OfferEventType::Counter,
            })
            .kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            NegotiationError::OfferNotFound(OfferId::new()).kind(),
            ErrorKind::NotFound
        );

        let stale = NegotiationError::from(StoreError::StaleState {
            offer_id: OfferId::new(),
            expected_status: OfferStatus::Pending,
            expected_version: Version::first(),
        });
        assert!(stale.is_conflict());
    }

    #[test]
    fn test_store_errors_are_translated() {
        let id = OfferId::new();
        assert!(matches!(
            NegotiationError::from(StoreError::OfferNotFound(id)),
            NegotiationError::OfferNotFound(found) if found == id
        ));

        let dup = NegotiationError::from(StoreError::DuplicateActiveOffer {
            listing_id: ListingId::new(),
            buyer_id: UserId::new(),
        });
        assert_eq!(dup.to_string(), "you already have an active offer on this listing");
        assert_eq!(dup.kind(), ErrorKind::BadRequest);
    }
}
