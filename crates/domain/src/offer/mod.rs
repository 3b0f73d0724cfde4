//! Offer aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod listing;
mod state;
mod value_objects;

pub use aggregate::{DEFAULT_COUNTER_WINDOW_HOURS, Offer, OfferSnapshot};
pub use commands::*;
pub use events::{
    Actor, OfferAcceptedData, OfferCounteredData, OfferEvent, OfferEventType, OfferExpiredData,
    OfferProposedData, OfferRejectedData, OfferWithdrawnData, Terms,
};
pub use listing::{Listing, ListingStatus};
pub use state::{OfferStatus, ParseStatusError};
pub use value_objects::{
    MAX_MESSAGE_LEN, Money, Quantity, UnitPrice, normalize_message, total_price,
};

use common::ListingId;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during offer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferError {
    /// Listing is missing, inactive, or otherwise not open.
    #[error("listing {listing_id} is not available")]
    ListingUnavailable { listing_id: ListingId },

    /// Seller turned offers off for the listing.
    #[error("this listing does not accept offers")]
    OffersDisabled,

    /// Buyer and seller are the same user.
    #[error("you cannot make an offer on your own listing")]
    SelfOffer,

    /// Proposed unit price is under the seller's floor.
    #[error("minimum price is {floor}")]
    BelowFloor { floor: UnitPrice },

    #[error("price must be greater than zero (got {price})")]
    InvalidPrice { price: Decimal },

    #[error("quantity must be at least 1 (got {quantity})")]
    InvalidQuantity { quantity: u32 },

    #[error("total price is too large")]
    AmountOverflow,

    #[error("message must be at most {max} characters")]
    MessageTooLong { max: usize },

    /// The buyer already has a pending or countered offer on the listing.
    #[error("you already have an active offer on this listing")]
    DuplicateActiveOffer,

    /// The offer's status does not allow the action.
    #[error("cannot {action} an offer that is {status}")]
    InvalidStatus {
        status: OfferStatus,
        action: OfferEventType,
    },

    /// The response deadline passed.
    #[error("this offer has expired")]
    Expired,

    #[error("you are not a party to this offer")]
    NotAParty,

    #[error("it's not your turn")]
    NotYourTurn,

    #[error("only the buyer can withdraw an offer")]
    NotBuyer,

    /// The response deadline would fall outside the representable range.
    #[error("response deadline is out of range")]
    DeadlineOutOfRange,
}

impl OfferError {
    /// Returns the caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OfferError::ListingUnavailable { .. } => ErrorKind::NotFound,
            OfferError::NotAParty | OfferError::NotYourTurn | OfferError::NotBuyer => {
                ErrorKind::Forbidden
            }
            OfferError::OffersDisabled
            | OfferError::SelfOffer
            | OfferError::BelowFloor { .. }
            | OfferError::InvalidPrice { .. }
            | OfferError::InvalidQuantity { .. }
            | OfferError::AmountOverflow
            | OfferError::MessageTooLong { .. }
            | OfferError::DuplicateActiveOffer
            | OfferError::InvalidStatus { .. }
            | OfferError::Expired => ErrorKind::BadRequest,
            OfferError::DeadlineOutOfRange => ErrorKind::Internal,
        }
    }
}
