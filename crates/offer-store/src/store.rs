use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId, Version};
use domain::{Aggregate, Offer, OfferEvent, OfferEventType, OfferStatus};

use crate::{EventEnvelope, OfferQuery, Page, Result, StoreError};

/// The state a transition was decided against.
///
/// Writes only land if the stored offer still has this status and version,
/// so two racing transitions on one offer cannot both succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    pub status: OfferStatus,
    pub version: Version,
}

impl ExpectedState {
    /// Captures the status and version of an offer as read.
    pub fn of(offer: &Offer) -> Self {
        Self {
            status: offer.status(),
            version: offer.version(),
        }
    }
}

/// Core trait for offer storage.
///
/// Every write stores the materialized offer and appends exactly one log
/// event as a single atomic unit. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Inserts a new offer together with its opening event.
    ///
    /// Fails with `DuplicateActiveOffer` if the buyer already has a pending
    /// or countered offer on the listing.
    async fn insert_offer(&self, offer: &Offer, event: &OfferEvent) -> Result<()>;

    /// Replaces the stored offer with `offer` and appends `event`, provided
    /// the stored offer still matches `expected`.
    ///
    /// Fails with `StaleState` if another write got there first.
    async fn commit_transition(
        &self,
        offer: &Offer,
        event: &OfferEvent,
        expected: ExpectedState,
    ) -> Result<()>;

    /// Retrieves the materialized offer.
    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>>;

    /// Retrieves the offer's log in sequence order (oldest first).
    async fn get_events(&self, offer_id: OfferId) -> Result<Vec<EventEnvelope>>;

    /// Finds the buyer's pending or countered offer on a listing.
    async fn find_active_offer(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<Offer>>;

    /// Lists offers matching a query, newest first.
    async fn list_offers(&self, query: &OfferQuery) -> Result<Page<Offer>>;

    /// Lists open offers whose deadline passed before `now`, oldest deadline
    /// first.
    async fn list_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Offer>>;

    /// Checks that the backing storage is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Extension trait providing convenience methods for offer stores.
#[async_trait]
pub trait OfferStoreExt: OfferStore {
    /// Retrieves the offer, failing with `OfferNotFound` if it is missing.
    async fn require_offer(&self, offer_id: OfferId) -> Result<Offer> {
        self.get_offer(offer_id)
            .await?
            .ok_or(StoreError::OfferNotFound(offer_id))
    }

    /// Rebuilds the offer from its log alone, ignoring the materialized row.
    ///
    /// Returns None if the offer has no log.
    async fn replay_offer(&self, offer_id: OfferId) -> Result<Option<Offer>> {
        let events = self
            .get_events(offer_id)
            .await?
            .iter()
            .map(EventEnvelope::decode)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if events.is_empty() {
            return Ok(None);
        }
        Offer::replay(&events)
            .map(Some)
            .ok_or_else(|| StoreError::Decode(format!("log of offer {offer_id} has no opening event")))
    }
}

// Blanket implementation for all OfferStore implementations
impl<T: OfferStore + ?Sized> OfferStoreExt for T {}

/// Checks that an offer and the event being recorded with it line up.
///
/// `offer` is the state after applying `event`; `expected` is the state the
/// transition was decided against, or None for the opening event.
pub fn validate_write(
    offer: &Offer,
    event: &OfferEvent,
    expected: Option<ExpectedState>,
) -> std::result::Result<(), StoreError> {
    let opening = event.kind() == OfferEventType::Propose;
    match expected {
        None if !opening => {
            return Err(StoreError::InvalidWrite(format!(
                "{} cannot open an offer log",
                event.kind()
            )));
        }
        Some(_) if opening => {
            return Err(StoreError::InvalidWrite(
                "propose can only open an offer log".to_string(),
            ));
        }
        _ => {}
    }

    let previous = expected.map_or(Version::initial(), |state| state.version);
    if offer.version() != previous.next() {
        return Err(StoreError::InvalidWrite(format!(
            "offer {} is at version {} but the write expects {}",
            offer.id(),
            offer.version(),
            previous.next()
        )));
    }

    if let Some(state) = expected
        && state.status.is_terminal()
    {
        return Err(StoreError::InvalidWrite(format!(
            "offer {} is already {}",
            offer.id(),
            state.status
        )));
    }

    Ok(())
}
