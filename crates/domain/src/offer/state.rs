//! Offer status state machine.

use serde::{Deserialize, Serialize};

/// The status of an offer in its lifecycle.
///
/// State transitions:
/// ```text
///             counter
///           ┌─────────┐
///           ▼         │
/// Pending ──┴──► Countered ──┬──► Accepted
///    │                 │     ├──► Rejected
///    │                 │     ├──► Withdrawn
///    └─────────────────┴─────┴──► Expired (Countered only)
/// ```
/// Pending can also move straight to Accepted, Rejected, or Withdrawn.
/// The four terminal statuses are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    /// Proposed by the buyer, awaiting the seller.
    #[default]
    Pending,

    /// At least one counter has been made; a response deadline is running.
    Countered,

    /// Both parties agreed on terms (terminal).
    Accepted,

    /// A party declined the current terms (terminal).
    Rejected,

    /// The buyer walked away (terminal).
    Withdrawn,

    /// The response deadline passed before anyone acted (terminal).
    Expired,
}

impl OfferStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OfferStatus; 6] = [
        OfferStatus::Pending,
        OfferStatus::Countered,
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::Withdrawn,
        OfferStatus::Expired,
    ];

    /// Statuses that still allow the negotiation to move.
    pub const ACTIVE: [OfferStatus; 2] = [OfferStatus::Pending, OfferStatus::Countered];

    /// Returns true while the negotiation is still open.
    pub fn is_active(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::Countered)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if a party may counter, accept, or reject in this status.
    pub fn can_respond(&self) -> bool {
        self.is_active()
    }

    /// Returns true if the buyer may withdraw in this status.
    pub fn can_withdraw(&self) -> bool {
        self.is_active()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Countered => "countered",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
            OfferStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown offer status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for OfferStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OfferStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OfferStatus::default(), OfferStatus::Pending);
    }

    #[test]
    fn test_active_statuses() {
        assert!(OfferStatus::Pending.is_active());
        assert!(OfferStatus::Countered.is_active());
        assert!(!OfferStatus::Accepted.is_active());
        assert!(!OfferStatus::Rejected.is_active());
        assert!(!OfferStatus::Withdrawn.is_active());
        assert!(!OfferStatus::Expired.is_active());
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        for status in OfferStatus::ALL.into_iter().filter(OfferStatus::is_terminal) {
            assert!(!status.can_respond(), "{status} should not allow responses");
            assert!(!status.can_withdraw(), "{status} should not allow withdraw");
        }
    }

    #[test]
    fn test_round_trips_through_str() {
        for status in OfferStatus::ALL {
            assert_eq!(status.as_str().parse::<OfferStatus>().unwrap(), status);
        }
        assert_eq!("COUNTERED".parse::<OfferStatus>().unwrap(), OfferStatus::Countered);
        assert!("open".parse::<OfferStatus>().is_err());
    }

    #[test]
    fn test_serialization_is_lowercase() {
        let json = serde_json::to_string(&OfferStatus::Withdrawn).unwrap();
        assert_eq!(json, "\"withdrawn\"");
    }
}
