//! Offer domain events.

use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Money, OfferError, Quantity, UnitPrice, total_price};

/// Who performed a logged action.
///
/// Serialized as the user's UUID, or the literal `"system"` for transitions
/// the engine performs on its own (expiration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Actor {
    /// A buyer or seller acting through the API.
    User(UserId),

    /// The engine itself.
    System,
}

impl Actor {
    const SYSTEM: &'static str = "system";

    /// Returns the user id, or None for the system actor.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::User(id) => write!(f, "{id}"),
            Actor::System => f.write_str(Self::SYSTEM),
        }
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

impl TryFrom<String> for Actor {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == Actor::SYSTEM {
            Ok(Actor::System)
        } else {
            value.parse().map(Actor::User)
        }
    }
}

impl From<UserId> for Actor {
    fn from(id: UserId) -> Self {
        Actor::User(id)
    }
}

/// The action an event records, as stored in the log's `event_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferEventType {
    Propose,
    Counter,
    Accept,
    Reject,
    Withdraw,
    Expire,
}

impl OfferEventType {
    /// Returns the action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferEventType::Propose => "propose",
            OfferEventType::Counter => "counter",
            OfferEventType::Accept => "accept",
            OfferEventType::Reject => "reject",
            OfferEventType::Withdraw => "withdraw",
            OfferEventType::Expire => "expire",
        }
    }
}

impl std::fmt::Display for OfferEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price, quantity, and total captured at the moment an event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub price_per_unit: UnitPrice,
    pub quantity: Quantity,
    pub total_price: Money,
}

impl Terms {
    /// Captures a price and quantity together with their rounded total.
    pub fn new(price_per_unit: UnitPrice, quantity: Quantity) -> Result<Self, OfferError> {
        Ok(Self {
            price_per_unit,
            quantity,
            total_price: total_price(price_per_unit, quantity)?,
        })
    }
}

/// Events that can occur on an offer aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OfferEvent {
    /// The buyer opened the negotiation.
    Proposed(OfferProposedData),

    /// A party answered with a new price.
    Countered(OfferCounteredData),

    /// A party agreed to the current terms.
    Accepted(OfferAcceptedData),

    /// A party declined the current terms.
    Rejected(OfferRejectedData),

    /// The buyer walked away.
    Withdrawn(OfferWithdrawnData),

    /// The response deadline passed.
    Expired(OfferExpiredData),
}

impl DomainEvent for OfferEvent {
    fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OfferEvent::Proposed(data) => data.proposed_at,
            OfferEvent::Countered(data) => data.countered_at,
            OfferEvent::Accepted(data) => data.accepted_at,
            OfferEvent::Rejected(data) => data.rejected_at,
            OfferEvent::Withdrawn(data) => data.withdrawn_at,
            OfferEvent::Expired(data) => data.expired_at,
        }
    }
}

/// Data for Proposed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferProposedData {
    pub offer_id: OfferId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub terms: Terms,
    pub message: Option<String>,
    pub proposed_at: DateTime<Utc>,
}

/// Data for Countered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferCounteredData {
    pub actor_id: UserId,
    pub terms: Terms,
    pub message: Option<String>,

    /// Round number after this counter.
    pub round: u32,

    /// New response deadline.
    pub expires_at: DateTime<Utc>,
    pub countered_at: DateTime<Utc>,
}

/// Data for Accepted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferAcceptedData {
    pub actor_id: UserId,

    /// The terms both parties agreed on.
    pub terms: Terms,
    pub accepted_at: DateTime<Utc>,
}

/// Data for Rejected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRejectedData {
    pub actor_id: UserId,
    pub message: Option<String>,
    pub rejected_at: DateTime<Utc>,
}

/// Data for Withdrawn event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferWithdrawnData {
    pub actor_id: UserId,
    pub withdrawn_at: DateTime<Utc>,
}

/// Data for Expired event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferExpiredData {
    /// The deadline that was missed.
    pub deadline: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl OfferEvent {
    /// Returns the logged action.
    pub fn kind(&self) -> OfferEventType {
        match self {
            OfferEvent::Proposed(_) => OfferEventType::Propose,
            OfferEvent::Countered(_) => OfferEventType::Counter,
            OfferEvent::Accepted(_) => OfferEventType::Accept,
            OfferEvent::Rejected(_) => OfferEventType::Reject,
            OfferEvent::Withdrawn(_) => OfferEventType::Withdraw,
            OfferEvent::Expired(_) => OfferEventType::Expire,
        }
    }

    /// Returns who performed the action.
    pub fn actor(&self) -> Actor {
        match self {
            OfferEvent::Proposed(data) => Actor::User(data.buyer_id),
            OfferEvent::Countered(data) => Actor::User(data.actor_id),
            OfferEvent::Accepted(data) => Actor::User(data.actor_id),
            OfferEvent::Rejected(data) => Actor::User(data.actor_id),
            OfferEvent::Withdrawn(data) => Actor::User(data.actor_id),
            OfferEvent::Expired(_) => Actor::System,
        }
    }

    /// Returns the terms snapshot; None for reject, withdraw, and expire.
    pub fn terms(&self) -> Option<Terms> {
        match self {
            OfferEvent::Proposed(data) => Some(data.terms),
            OfferEvent::Countered(data) => Some(data.terms),
            OfferEvent::Accepted(data) => Some(data.terms),
            OfferEvent::Rejected(_) | OfferEvent::Withdrawn(_) | OfferEvent::Expired(_) => None,
        }
    }

    /// Returns the free-text message attached to the action, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            OfferEvent::Proposed(data) => data.message.as_deref(),
            OfferEvent::Countered(data) => data.message.as_deref(),
            OfferEvent::Rejected(data) => data.message.as_deref(),
            OfferEvent::Accepted(_) | OfferEvent::Withdrawn(_) | OfferEvent::Expired(_) => None,
        }
    }
}
