//! The slice of a marketplace listing the negotiation engine reads.

use common::{ListingId, UserId};
use serde::{Deserialize, Serialize};

use super::UnitPrice;

/// Catalog status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Draft,
    Sold,
    Archived,
}

/// A listing as exposed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub status: ListingStatus,
    pub allow_offers: bool,

    /// Lowest unit price the seller will entertain, if any.
    pub floor_price: Option<UnitPrice>,
}

impl Listing {
    /// Creates an active listing that accepts offers and has no floor.
    pub fn new(listing_id: ListingId, seller_id: UserId, title: impl Into<String>) -> Self {
        Self {
            listing_id,
            seller_id,
            title: title.into(),
            status: ListingStatus::Active,
            allow_offers: true,
            floor_price: None,
        }
    }

    /// Sets the floor price.
    pub fn with_floor_price(mut self, floor: UnitPrice) -> Self {
        self.floor_price = Some(floor);
        self
    }

    /// Sets whether offers are allowed.
    pub fn with_offers_allowed(mut self, allow: bool) -> Self {
        self.allow_offers = allow;
        self
    }

    /// Sets the catalog status.
    pub fn with_status(mut self, status: ListingStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the listing is live in the catalog.
    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }
}
