use common::{ListingId, OfferId, UserId, Version};
use domain::{ErrorKind, OfferStatus};
use thiserror::Error;

/// Errors that can occur when reading or writing offers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The offer moved on since it was read; the conditional write matched
    /// no row. The caller should refetch and decide again.
    #[error(
        "offer {offer_id} changed since it was read (expected {expected_status} at version {expected_version})"
    )]
    StaleState {
        offer_id: OfferId,
        expected_status: OfferStatus,
        expected_version: Version,
    },

    /// The buyer already has an open negotiation on the listing.
    #[error("buyer {buyer_id} already has an active offer on listing {listing_id}")]
    DuplicateActiveOffer {
        listing_id: ListingId,
        buyer_id: UserId,
    },

    /// An offer with this id was already inserted.
    #[error("offer already exists: {0}")]
    OfferExists(OfferId),

    #[error("offer not found: {0}")]
    OfferNotFound(OfferId),

    /// The offer and event handed to a write do not line up.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// A stored row could not be turned back into domain types.
    #[error("corrupt row: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns the caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::StaleState { .. } | StoreError::OfferExists(_) => ErrorKind::Conflict,
            StoreError::DuplicateActiveOffer { .. } => ErrorKind::BadRequest,
            StoreError::OfferNotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidWrite(_)
            | StoreError::Decode(_)
            | StoreError::Database(_)
            | StoreError::Migration(_)
            | StoreError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for offer store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let stale = StoreError::StaleState {
            offer_id: OfferId::new(),
            expected_status: OfferStatus::Pending,
            expected_version: Version::first(),
        };
        assert_eq!(stale.kind(), ErrorKind::Conflict);
        assert_eq!(
            StoreError::OfferNotFound(OfferId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::Decode("bad status".into()).kind(),
            ErrorKind::Internal
        );
    }
}
