//! Offer aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{ListingId, OfferId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};

use super::{
    AcceptOffer, CounterOffer, Listing, Money, OfferError, OfferEvent, OfferEventType,
    OfferStatus, ProposeOffer, Quantity, RejectOffer, Terms, UnitPrice, WithdrawOffer,
    events::{
        OfferAcceptedData, OfferCounteredData, OfferExpiredData, OfferProposedData,
        OfferRejectedData, OfferWithdrawnData,
    },
    normalize_message,
};

/// Hours a party has to answer a counter before the offer lapses.
pub const DEFAULT_COUNTER_WINDOW_HOURS: i64 = 48;

/// Offer aggregate root.
///
/// Current state of one negotiation between a buyer and the seller of a
/// listing. Command methods validate and return the event to record; the
/// state only changes through [`Aggregate::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    id: OfferId,
    listing_id: ListingId,
    buyer_id: UserId,
    seller_id: UserId,

    /// Unit price from the opening proposal.
    offer_price: UnitPrice,
    quantity: Quantity,

    /// Total for the current terms.
    total_price: Money,

    /// Unit price from the latest counter.
    counter_price: Option<UnitPrice>,
    status: OfferStatus,
    current_round: u32,
    last_actor_id: UserId,

    /// Response deadline, set by the first counter.
    expires_at: Option<DateTime<Utc>>,
    message: Option<String>,
    counter_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Number of events applied; the compare-and-swap token for writes.
    version: Version,
}

/// Field-by-field image of an [`Offer`], used to persist and restore the
/// materialized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferSnapshot {
    pub id: OfferId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub offer_price: UnitPrice,
    pub quantity: Quantity,
    pub total_price: Money,
    pub counter_price: Option<UnitPrice>,
    pub status: OfferStatus,
    pub current_round: u32,
    pub last_actor_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub counter_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl Aggregate for Offer {
    type Event = OfferEvent;
    type Error = OfferError;

    fn aggregate_type() -> &'static str {
        "Offer"
    }

    fn version(&self) -> Version {
        self.version
    }

    fn from_initial_event(event: &Self::Event) -> Option<Self> {
        let OfferEvent::Proposed(data) = event else {
            return None;
        };
        Some(Self {
            id: data.offer_id,
            listing_id: data.listing_id,
            buyer_id: data.buyer_id,
            seller_id: data.seller_id,
            offer_price: data.terms.price_per_unit,
            quantity: data.terms.quantity,
            total_price: data.terms.total_price,
            counter_price: None,
            status: OfferStatus::Pending,
            current_round: 1,
            last_actor_id: data.buyer_id,
            expires_at: None,
            message: data.message.clone(),
            counter_message: None,
            created_at: data.proposed_at,
            updated_at: data.proposed_at,
            version: Version::first(),
        })
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OfferEvent::Proposed(_) => {}
            OfferEvent::Countered(data) => {
                self.status = OfferStatus::Countered;
                self.counter_price = Some(data.terms.price_per_unit);
                self.total_price = data.terms.total_price;
                self.current_round = data.round;
                self.last_actor_id = data.actor_id;
                self.expires_at = Some(data.expires_at);
                self.counter_message = data.message.clone();
            }
            OfferEvent::Accepted(data) => {
                self.status = OfferStatus::Accepted;
                self.total_price = data.terms.total_price;
                self.last_actor_id = data.actor_id;
            }
            OfferEvent::Rejected(data) => {
                self.status = OfferStatus::Rejected;
                self.last_actor_id = data.actor_id;
            }
            OfferEvent::Withdrawn(data) => {
                self.status = OfferStatus::Withdrawn;
                self.last_actor_id = data.actor_id;
            }
            // The system is not a party, so the turn stays where it was.
            OfferEvent::Expired(_) => {
                self.status = OfferStatus::Expired;
            }
        }
        self.updated_at = event.occurred_at();
        self.version = self.version.next();
    }
}

impl From<OfferSnapshot> for Offer {
    fn from(s: OfferSnapshot) -> Self {
        Self {
            id: s.id,
            listing_id: s.listing_id,
            buyer_id: s.buyer_id,
            seller_id: s.seller_id,
            offer_price: s.offer_price,
            quantity: s.quantity,
            total_price: s.total_price,
            counter_price: s.counter_price,
            status: s.status,
            current_round: s.current_round,
            last_actor_id: s.last_actor_id,
            expires_at: s.expires_at,
            message: s.message,
            counter_message: s.counter_message,
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: s.version,
        }
    }
}

// Query methods
impl Offer {
    pub fn id(&self) -> OfferId {
        self.id
    }

    pub fn listing_id(&self) -> ListingId {
        self.listing_id
    }

    pub fn buyer_id(&self) -> UserId {
        self.buyer_id
    }

    pub fn seller_id(&self) -> UserId {
        self.seller_id
    }

    /// Returns the unit price from the opening proposal.
    pub fn offer_price(&self) -> UnitPrice {
        self.offer_price
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Returns the total for the current terms.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    /// Returns the unit price from the latest counter, if any.
    pub fn counter_price(&self) -> Option<UnitPrice> {
        self.counter_price
    }

    /// Returns the unit price currently on the table.
    pub fn current_price(&self) -> UnitPrice {
        self.counter_price.unwrap_or(self.offer_price)
    }

    pub fn status(&self) -> OfferStatus {
        self.status
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn last_actor_id(&self) -> UserId {
        self.last_actor_id
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns the buyer's opening message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the message attached to the latest counter.
    pub fn counter_message(&self) -> Option<&str> {
        self.counter_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the user is the buyer or the seller.
    pub fn is_party(&self, user: UserId) -> bool {
        user == self.buyer_id || user == self.seller_id
    }

    /// Returns the other party, or None if `user` is not a party.
    pub fn counterparty(&self, user: UserId) -> Option<UserId> {
        if user == self.buyer_id {
            Some(self.seller_id)
        } else if user == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }

    /// Returns true if the offer is still open and its deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Returns the field-by-field image of this offer.
    pub fn snapshot(&self) -> OfferSnapshot {
        OfferSnapshot {
            id: self.id,
            listing_id: self.listing_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            offer_price: self.offer_price,
            quantity: self.quantity,
            total_price: self.total_price,
            counter_price: self.counter_price,
            status: self.status,
            current_round: self.current_round,
            last_actor_id: self.last_actor_id,
            expires_at: self.expires_at,
            message: self.message.clone(),
            counter_message: self.counter_message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

// Command methods (return the event to record)
impl Offer {
    /// Opens a negotiation on a listing.
    ///
    /// Checking that the buyer has no other active offer on the listing
    /// needs the store and is left to the caller.
    pub fn propose(
        offer_id: OfferId,
        listing: &Listing,
        cmd: &ProposeOffer,
        now: DateTime<Utc>,
    ) -> Result<OfferEvent, OfferError> {
        if !listing.is_active() {
            return Err(OfferError::ListingUnavailable {
                listing_id: listing.listing_id,
            });
        }
        if !listing.allow_offers {
            return Err(OfferError::OffersDisabled);
        }
        if cmd.buyer_id == listing.seller_id {
            return Err(OfferError::SelfOffer);
        }

        let price = UnitPrice::new(cmd.price_per_unit)?;
        let quantity = Quantity::new(cmd.quantity)?;
        if let Some(floor) = listing.floor_price
            && price < floor
        {
            return Err(OfferError::BelowFloor { floor });
        }

        Ok(OfferEvent::Proposed(OfferProposedData {
            offer_id,
            listing_id: listing.listing_id,
            buyer_id: cmd.buyer_id,
            seller_id: listing.seller_id,
            terms: Terms::new(price, quantity)?,
            message: normalize_message(cmd.message.clone())?,
            proposed_at: now,
        }))
    }

    /// Checks that `actor` may counter, accept, or reject right now.
    ///
    /// Order matters: strangers are turned away before the deadline is
    /// looked at, and an overdue offer reports [`OfferError::Expired`]
    /// ahead of any status or turn problem.
    pub fn ensure_can_respond(
        &self,
        actor: UserId,
        action: OfferEventType,
        now: DateTime<Utc>,
    ) -> Result<(), OfferError> {
        if !self.is_party(actor) {
            return Err(OfferError::NotAParty);
        }
        if self.is_overdue(now) {
            return Err(OfferError::Expired);
        }
        if !self.status.can_respond() {
            return Err(OfferError::InvalidStatus {
                status: self.status,
                action,
            });
        }
        if actor == self.last_actor_id {
            return Err(OfferError::NotYourTurn);
        }
        Ok(())
    }

    /// Answers with a new unit price and restarts the response deadline.
    pub fn counter(
        &self,
        cmd: &CounterOffer,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<OfferEvent, OfferError> {
        self.ensure_can_respond(cmd.actor_id, OfferEventType::Counter, now)?;
        let price = UnitPrice::new(cmd.price_per_unit)?;
        let expires_at = now
            .checked_add_signed(window)
            .ok_or(OfferError::DeadlineOutOfRange)?;

        Ok(OfferEvent::Countered(OfferCounteredData {
            actor_id: cmd.actor_id,
            terms: Terms::new(price, self.quantity)?,
            message: normalize_message(cmd.message.clone())?,
            round: self.current_round.saturating_add(1),
            expires_at,
            countered_at: now,
        }))
    }

    /// Agrees to the price currently on the table.
    pub fn accept(&self, cmd: &AcceptOffer, now: DateTime<Utc>) -> Result<OfferEvent, OfferError> {
        self.ensure_can_respond(cmd.actor_id, OfferEventType::Accept, now)?;

        Ok(OfferEvent::Accepted(OfferAcceptedData {
            actor_id: cmd.actor_id,
            terms: Terms::new(self.current_price(), self.quantity)?,
            accepted_at: now,
        }))
    }

    /// Declines the current terms.
    pub fn reject(&self, cmd: &RejectOffer, now: DateTime<Utc>) -> Result<OfferEvent, OfferError> {
        self.ensure_can_respond(cmd.actor_id, OfferEventType::Reject, now)?;

        Ok(OfferEvent::Rejected(OfferRejectedData {
            actor_id: cmd.actor_id,
            message: normalize_message(cmd.message.clone())?,
            rejected_at: now,
        }))
    }

    /// Lets the buyer walk away regardless of turn or deadline.
    ///
    /// A closed offer refuses the seller the same way it refuses the buyer;
    /// only an open one reports that withdrawing is the buyer's call.
    pub fn withdraw(
        &self,
        cmd: &WithdrawOffer,
        now: DateTime<Utc>,
    ) -> Result<OfferEvent, OfferError> {
        if !self.is_party(cmd.actor_id) {
            return Err(OfferError::NotAParty);
        }
        if !self.status.can_withdraw() {
            return Err(OfferError::InvalidStatus {
                status: self.status,
                action: OfferEventType::Withdraw,
            });
        }
        if cmd.actor_id != self.buyer_id {
            return Err(OfferError::NotBuyer);
        }

        Ok(OfferEvent::Withdrawn(OfferWithdrawnData {
            actor_id: cmd.actor_id,
            withdrawn_at: now,
        }))
    }

    /// Returns the expire event if the offer is overdue at `now`.
    pub fn expire(&self, now: DateTime<Utc>) -> Option<OfferEvent> {
        let deadline = self.expires_at?;
        self.is_overdue(now).then(|| {
            OfferEvent::Expired(OfferExpiredData {
                deadline,
                expired_at: now,
            })
        })
    }
}
