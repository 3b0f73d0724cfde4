use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId};
use domain::{Aggregate, Offer, OfferEvent};
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, OfferQuery, Page, Result, StoreError,
    store::{ExpectedState, OfferStore, validate_write},
};

#[derive(Default)]
struct Tables {
    offers: HashMap<OfferId, Offer>,
    events: HashMap<OfferId, Vec<EventEnvelope>>,
}

/// In-memory offer store used by tests and by the server when no database
/// is configured.
///
/// Offers and events live behind one lock, so each write is atomic and the
/// one-active-offer rule is checked under the same lock that inserts.
#[derive(Clone, Default)]
pub struct InMemoryOfferStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOfferStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored offers.
    pub async fn offer_count(&self) -> usize {
        self.tables.read().await.offers.len()
    }

    /// Returns the total number of logged events.
    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.values().map(Vec::len).sum()
    }

    /// Clears all offers and events.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.offers.clear();
        tables.events.clear();
    }
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn insert_offer(&self, offer: &Offer, event: &OfferEvent) -> Result<()> {
        validate_write(offer, event, None)?;
        let envelope = EventEnvelope::record(offer.id(), offer.version(), event)?;

        let mut tables = self.tables.write().await;

        if tables.offers.contains_key(&offer.id()) {
            return Err(StoreError::OfferExists(offer.id()));
        }

        // Partial unique index simulation
        let duplicate = tables.offers.values().any(|existing| {
            existing.listing_id() == offer.listing_id()
                && existing.buyer_id() == offer.buyer_id()
                && existing.status().is_active()
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveOffer {
                listing_id: offer.listing_id(),
                buyer_id: offer.buyer_id(),
            });
        }

        tables.offers.insert(offer.id(), offer.clone());
        tables.events.insert(offer.id(), vec![envelope]);
        Ok(())
    }

    async fn commit_transition(
        &self,
        offer: &Offer,
        event: &OfferEvent,
        expected: ExpectedState,
    ) -> Result<()> {
        validate_write(offer, event, Some(expected))?;
        let envelope = EventEnvelope::record(offer.id(), offer.version(), event)?;

        let mut tables = self.tables.write().await;

        let stored = tables
            .offers
            .get_mut(&offer.id())
            .ok_or(StoreError::OfferNotFound(offer.id()))?;

        // Conditional update on (status, version)
        if stored.status() != expected.status || stored.version() != expected.version {
            return Err(StoreError::StaleState {
                offer_id: offer.id(),
                expected_status: expected.status,
                expected_version: expected.version,
            });
        }

        *stored = offer.clone();
        tables.events.entry(offer.id()).or_default().push(envelope);
        Ok(())
    }

    async fn get_offer(&self, offer_id: OfferId) -> Result<Option<Offer>> {
        Ok(self.tables.read().await.offers.get(&offer_id).cloned())
    }

    async fn get_events(&self, offer_id: OfferId) -> Result<Vec<EventEnvelope>> {
        let tables = self.tables.read().await;
        let mut events = tables.events.get(&offer_id).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn find_active_offer(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
    ) -> Result<Option<Offer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .offers
            .values()
            .find(|offer| {
                offer.listing_id() == listing_id
                    && offer.buyer_id() == buyer_id
                    && offer.status().is_active()
            })
            .cloned())
    }

    async fn list_offers(&self, query: &OfferQuery) -> Result<Page<Offer>> {
        let tables = self.tables.read().await;
        let mut matches: Vec<&Offer> = tables
            .offers
            .values()
            .filter(|offer| {
                query.matches(
                    offer.buyer_id(),
                    offer.seller_id(),
                    offer.listing_id(),
                    offer.status(),
                )
            })
            .collect();

        // Newest first, id as tie-breaker for a stable order
        matches.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then(b.id().cmp(&a.id()))
        });

        let total = matches.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit()).unwrap_or(usize::MAX);
        let items = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Offer>> {
        let tables = self.tables.read().await;
        let mut overdue: Vec<&Offer> = tables
            .offers
            .values()
            .filter(|offer| offer.is_overdue(now))
            .collect();
        overdue.sort_by_key(|offer| offer.expires_at());
        Ok(overdue
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::Version;
    use domain::{
        AcceptOffer, CounterOffer, Listing, OfferStatus, ProposeOffer, RejectOffer,
        WithdrawOffer,
    };
    use rust_decimal::Decimal;

    use crate::{OfferStoreExt, PartyRole};

    struct Fixture {
        store: InMemoryOfferStore,
        listing: Listing,
        buyer: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryOfferStore::new(),
                listing: Listing::new(ListingId::new(), UserId::new(), "Desk"),
                buyer: UserId::new(),
            }
        }

        async fn propose_as(&self, buyer: UserId) -> Result<Offer> {
            let cmd = ProposeOffer::new(self.listing.listing_id, buyer, Decimal::new(5000, 2), 2);
            let event = Offer::propose(OfferId::new(), &self.listing, &cmd, Utc::now()).unwrap();
            let offer = Offer::from_initial_event(&event).unwrap();
            self.store.insert_offer(&offer, &event).await?;
            Ok(offer)
        }

        async fn propose(&self) -> Offer {
            self.propose_as(self.buyer).await.unwrap()
        }

        async fn transition(
            &self,
            offer: &Offer,
            decide: impl FnOnce(&Offer) -> OfferEvent,
        ) -> Result<Offer> {
            let expected = ExpectedState::of(offer);
            let event = decide(offer);
            let mut next = offer.clone();
            next.apply(&event);
            self.store.commit_transition(&next, &event, expected).await?;
            Ok(next)
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let fx = Fixture::new();
        let offer = fx.propose().await;

        let loaded = fx.store.require_offer(offer.id()).await.unwrap();
        assert_eq!(loaded, offer);

        let events = fx.store.get_events(offer.id()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, Version::first());
    }

    #[tokio::test]
    async fn test_second_active_offer_is_rejected() {
        let fx = Fixture::new();
        fx.propose().await;

        let result = fx.propose_as(fx.buyer).await;
        assert!(matches!(
            result,
            Err(StoreError::DuplicateActiveOffer { .. })
        ));
        assert_eq!(fx.store.offer_count().await, 1);
        assert_eq!(fx.store.event_count().await, 1);

        // A different buyer is fine.
        fx.propose_as(UserId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_offer_allowed_after_terminal() {
        let fx = Fixture::new();
        let offer = fx.propose().await;
        let buyer = fx.buyer;
        fx.transition(&offer, |o| {
            o.withdraw(&WithdrawOffer::new(o.id(), buyer), Utc::now())
                .unwrap()
        })
        .await
        .unwrap();

        fx.propose().await;
        assert_eq!(fx.store.offer_count().await, 2);
    }

    #[tokio::test]
    async fn test_stale_write_loses() {
        let fx = Fixture::new();
        let offer = fx.propose().await;
        let seller = fx.listing.seller_id;

        fx.transition(&offer, |o| {
            o.accept(&AcceptOffer::new(o.id(), seller), Utc::now())
                .unwrap()
        })
        .await
        .unwrap();

        // Decided against the same stale read.
        let result = fx
            .transition(&offer, |o| {
                o.reject(&RejectOffer::new(o.id(), seller), Utc::now())
                    .unwrap()
            })
            .await;
        assert!(matches!(result, Err(StoreError::StaleState { .. })));

        let stored = fx.store.require_offer(offer.id()).await.unwrap();
        assert_eq!(stored.status(), OfferStatus::Accepted);
        assert_eq!(fx.store.get_events(offer.id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_matches_materialized_offer() {
        let fx = Fixture::new();
        let offer = fx.propose().await;
        let seller = fx.listing.seller_id;
        let offer = fx
            .transition(&offer, |o| {
                o.counter(
                    &CounterOffer::new(o.id(), seller, Decimal::new(5500, 2)),
                    Utc::now(),
                    Duration::hours(48),
                )
                .unwrap()
            })
            .await
            .unwrap();

        let replayed = fx.store.replay_offer(offer.id()).await.unwrap().unwrap();
        assert_eq!(replayed, fx.store.require_offer(offer.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_offers_by_role_and_status() {
        let fx = Fixture::new();
        let mine = fx.propose().await;
        let other = fx.propose_as(UserId::new()).await.unwrap();
        let seller = fx.listing.seller_id;

        let as_seller = fx
            .store
            .list_offers(&OfferQuery::for_party(seller).role(PartyRole::Seller))
            .await
            .unwrap();
        assert_eq!(as_seller.total, 2);

        let as_buyer = fx
            .store
            .list_offers(&OfferQuery::for_party(fx.buyer).role(PartyRole::Buyer))
            .await
            .unwrap();
        assert_eq!(as_buyer.items, vec![mine.clone()]);

        fx.transition(&other, |o| {
            o.reject(&RejectOffer::new(o.id(), seller), Utc::now())
                .unwrap()
        })
        .await
        .unwrap();
        let rejected = fx
            .store
            .list_offers(&OfferQuery::for_party(seller).status(OfferStatus::Rejected))
            .await
            .unwrap();
        assert_eq!(rejected.total, 1);
        assert_eq!(rejected.items[0].id(), other.id());
    }

    #[tokio::test]
    async fn test_list_offers_paginates_newest_first() {
        let fx = Fixture::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(fx.propose_as(UserId::new()).await.unwrap().id());
        }
        let seller = fx.listing.seller_id;

        let first = fx
            .store
            .list_offers(&OfferQuery::for_party(seller).page(1, 2))
            .await
            .unwrap();
        let third = fx
            .store
            .list_offers(&OfferQuery::for_party(seller).page(3, 2))
            .await
            .unwrap();

        assert_eq!(first.total, 5);
        assert_eq!(first.items.len(), 2);
        assert_eq!(third.items.len(), 1);
        assert!(first.items[0].created_at() >= first.items[1].created_at());
    }

    #[tokio::test]
    async fn test_list_overdue() {
        let fx = Fixture::new();
        let offer = fx.propose().await;
        let seller = fx.listing.seller_id;
        let now = Utc::now();
        fx.transition(&offer, |o| {
            o.counter(
                &CounterOffer::new(o.id(), seller, Decimal::new(5500, 2)),
                now,
                Duration::hours(1),
            )
            .unwrap()
        })
        .await
        .unwrap();

        assert!(fx.store.list_overdue(now, 10).await.unwrap().is_empty());
        let overdue = fx
            .store
            .list_overdue(now + Duration::hours(2), 10)
            .await
            .unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id(), offer.id());
    }
}
