use chrono::{DateTime, Utc};
use common::{OfferId, Version};
use domain::{Actor, DomainEvent, OfferEvent, OfferEventType, Terms};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of an offer's negotiation log.
///
/// The flat columns answer "who said what, when" without decoding anything;
/// `payload` holds the full typed event so the log alone can rebuild the
/// offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub offer_id: OfferId,

    /// 1-based position in the offer's log; equals the offer version after
    /// this event.
    pub sequence: Version,
    pub event_type: OfferEventType,
    pub actor: Actor,

    /// Price, quantity, and total at that moment; None for reject, withdraw,
    /// and expire.
    pub terms: Option<Terms>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps an event for the log at the given position.
    pub fn record(
        offer_id: OfferId,
        sequence: Version,
        event: &OfferEvent,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            offer_id,
            sequence,
            event_type: event.kind(),
            actor: event.actor(),
            terms: event.terms(),
            message: event.message().map(str::to_string),
            created_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Decodes the typed event from the payload.
    pub fn decode(&self) -> Result<OfferEvent, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::UserId;
    use domain::{Quantity, UnitPrice};
    use domain::offer::OfferRejectedData;
    use rust_decimal::Decimal;

    #[test]
    fn test_record_flattens_event() {
        let actor = UserId::new();
        let event = OfferEvent::Rejected(OfferRejectedData {
            actor_id: actor,
            message: Some("no thanks".into()),
            rejected_at: Utc::now(),
        });

        let envelope = EventEnvelope::record(OfferId::new(), Version::new(2), &event).unwrap();

        assert_eq!(envelope.event_type, OfferEventType::Reject);
        assert_eq!(envelope.actor, Actor::User(actor));
        assert_eq!(envelope.terms, None);
        assert_eq!(envelope.message.as_deref(), Some("no thanks"));
        assert_eq!(envelope.decode().unwrap(), event);
    }

    #[test]
    fn test_terms_serialize_as_strings() {
        let terms = Terms::new(
            UnitPrice::new(Decimal::new(650, 2)).unwrap(),
            Quantity::new(400).unwrap(),
        )
        .unwrap();
        let json = serde_json::to_value(terms).unwrap();
        assert_eq!(json["price_per_unit"], "6.50");
        assert_eq!(json["quantity"], 400);
        assert_eq!(json["total_price"], "2600.00");
    }
}
