//! Offer commands.
//!
//! Commands carry caller input as received. The aggregate validates it when
//! deciding which event, if any, the command produces.

use common::{ListingId, OfferId, UserId};
use rust_decimal::Decimal;

use super::OfferEventType;

/// Trait for commands that act on an offer.
pub trait Command: Send + Sync {
    /// Returns the user issuing the command.
    fn actor_id(&self) -> UserId;

    /// Returns the action the command requests.
    fn action() -> OfferEventType;
}

/// Command to open a negotiation on a listing.
#[derive(Debug, Clone)]
pub struct ProposeOffer {
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub price_per_unit: Decimal,
    pub quantity: u32,
    pub message: Option<String>,
}

impl ProposeOffer {
    /// Creates a new ProposeOffer command.
    pub fn new(listing_id: ListingId, buyer_id: UserId, price_per_unit: Decimal, quantity: u32) -> Self {
        Self {
            listing_id,
            buyer_id,
            price_per_unit,
            quantity,
            message: None,
        }
    }

    /// Attaches a message to the proposal.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Command for ProposeOffer {
    fn actor_id(&self) -> UserId {
        self.buyer_id
    }

    fn action() -> OfferEventType {
        OfferEventType::Propose
    }
}

/// Command to answer with a new unit price.
#[derive(Debug, Clone)]
pub struct CounterOffer {
    pub offer_id: OfferId,
    pub actor_id: UserId,
    pub price_per_unit: Decimal,
    pub message: Option<String>,
}

impl CounterOffer {
    /// Creates a new CounterOffer command.
    pub fn new(offer_id: OfferId, actor_id: UserId, price_per_unit: Decimal) -> Self {
        Self {
            offer_id,
            actor_id,
            price_per_unit,
            message: None,
        }
    }

    /// Attaches a message to the counter.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Command for CounterOffer {
    fn actor_id(&self) -> UserId {
        self.actor_id
    }

    fn action() -> OfferEventType {
        OfferEventType::Counter
    }
}

/// Command to agree to the current terms.
#[derive(Debug, Clone)]
pub struct AcceptOffer {
    pub offer_id: OfferId,
    pub actor_id: UserId,
}

impl AcceptOffer {
    /// Creates a new AcceptOffer command.
    pub fn new(offer_id: OfferId, actor_id: UserId) -> Self {
        Self { offer_id, actor_id }
    }
}

impl Command for AcceptOffer {
    fn actor_id(&self) -> UserId {
        self.actor_id
    }

    fn action() -> OfferEventType {
        OfferEventType::Accept
    }
}

/// Command to decline the current terms.
#[derive(Debug, Clone)]
pub struct RejectOffer {
    pub offer_id: OfferId,
    pub actor_id: UserId,
    pub message: Option<String>,
}

impl RejectOffer {
    /// Creates a new RejectOffer command.
    pub fn new(offer_id: OfferId, actor_id: UserId) -> Self {
        Self {
            offer_id,
            actor_id,
            message: None,
        }
    }

    /// Attaches a reason to the rejection.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Command for RejectOffer {
    fn actor_id(&self) -> UserId {
        self.actor_id
    }

    fn action() -> OfferEventType {
        OfferEventType::Reject
    }
}

/// Command for the buyer to walk away.
#[derive(Debug, Clone)]
pub struct WithdrawOffer {
    pub offer_id: OfferId,
    pub actor_id: UserId,
}

impl WithdrawOffer {
    /// Creates a new WithdrawOffer command.
    pub fn new(offer_id: OfferId, actor_id: UserId) -> Self {
        Self { offer_id, actor_id }
    }
}

impl Command for WithdrawOffer {
    fn actor_id(&self) -> UserId {
        self.actor_id
    }

    fn action() -> OfferEventType {
        OfferEventType::Withdraw
    }
}
