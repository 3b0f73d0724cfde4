//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p offer-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, DurationRound, Utc};
use common::{ListingId, OfferId, UserId, Version};
use domain::{
    AcceptOffer, Actor, Aggregate, CounterOffer, Listing, Money, Offer, OfferEvent,
    OfferEventType, OfferStatus, ProposeOffer, RejectOffer, UnitPrice,
};
use offer_store::{
    ExpectedState, OfferQuery, OfferStore, OfferStoreExt, PartyRole, PostgresOfferStore,
    StoreError,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!("../../../migrations/001_create_offers.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOfferStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE offer_events, offers")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOfferStore::new(pool)
}

/// Postgres keeps microseconds; truncate so round trips compare equal.
fn now() -> chrono::DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .unwrap()
}

fn listing() -> Listing {
    Listing::new(ListingId::new(), UserId::new(), "Ceramic mugs")
        .with_floor_price(UnitPrice::new(Decimal::new(600, 2)).unwrap())
}

async fn propose(store: &PostgresOfferStore, listing: &Listing, buyer: UserId) -> Result<Offer, StoreError> {
    let cmd = ProposeOffer::new(listing.listing_id, buyer, Decimal::new(650, 2), 400)
        .with_message("bulk order");
    let event = Offer::propose(OfferId::new(), listing, &cmd, now()).unwrap();
    let offer = Offer::from_initial_event(&event).unwrap();
    store.insert_offer(&offer, &event).await?;
    Ok(offer)
}

async fn transition(
    store: &PostgresOfferStore,
    offer: &Offer,
    event: OfferEvent,
) -> Result<Offer, StoreError> {
    let expected = ExpectedState::of(offer);
    let mut next = offer.clone();
    next.apply(&event);
    store.commit_transition(&next, &event, expected).await?;
    Ok(next)
}

#[tokio::test]
async fn insert_and_read_back() {
    let store = get_test_store().await;
    let listing = listing();
    let offer = propose(&store, &listing, UserId::new()).await.unwrap();

    let loaded = store.require_offer(offer.id()).await.unwrap();
    assert_eq!(loaded, offer);
    assert_eq!(loaded.total_price(), Money::from_cents(260_000));

    let events = store.get_events(offer.id()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, OfferEventType::Propose);
    assert_eq!(events[0].sequence, Version::first());
    assert_eq!(events[0].actor, Actor::User(offer.buyer_id()));
    assert_eq!(events[0].message.as_deref(), Some("bulk order"));
    assert_eq!(
        events[0].terms.unwrap().total_price,
        Money::from_cents(260_000)
    );
}

#[tokio::test]
async fn partial_unique_index_blocks_second_active_offer() {
    let store = get_test_store().await;
    let listing = listing();
    let buyer = UserId::new();
    let offer = propose(&store, &listing, buyer).await.unwrap();

    let result = propose(&store, &listing, buyer).await;
    assert!(matches!(
        result,
        Err(StoreError::DuplicateActiveOffer { .. })
    ));

    // Nothing from the failed insert was persisted.
    let page = store
        .list_offers(&OfferQuery::for_party(buyer))
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    // Once the first offer is terminal the buyer may try again.
    let seller = listing.seller_id;
    let event = offer
        .reject(&RejectOffer::new(offer.id(), seller), now())
        .unwrap();
    transition(&store, &offer, event).await.unwrap();
    propose(&store, &listing, buyer).await.unwrap();
}

#[tokio::test]
async fn concurrent_proposals_yield_one_active_offer() {
    let store = get_test_store().await;
    let listing = listing();
    let buyer = UserId::new();

    let attempts = (0..5).map(|_| {
        let store = store.clone();
        let listing = listing.clone();
        tokio::spawn(async move { propose(&store, &listing, buyer).await })
    });
    let results = futures_util::future::join_all(attempts).await;

    let successes = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(Result::is_ok)
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn conditional_update_rejects_stale_state() {
    let store = get_test_store().await;
    let listing = listing();
    let offer = propose(&store, &listing, UserId::new()).await.unwrap();
    let seller = listing.seller_id;

    let accept = offer
        .accept(&AcceptOffer::new(offer.id(), seller), now())
        .unwrap();
    let reject = offer
        .reject(&RejectOffer::new(offer.id(), seller), now())
        .unwrap();

    transition(&store, &offer, accept).await.unwrap();
    let result = transition(&store, &offer, reject).await;
    assert!(matches!(result, Err(StoreError::StaleState { .. })));

    let stored = store.require_offer(offer.id()).await.unwrap();
    assert_eq!(stored.status(), OfferStatus::Accepted);
    assert_eq!(store.get_events(offer.id()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn replayed_log_matches_row() {
    let store = get_test_store().await;
    let listing = listing();
    let offer = propose(&store, &listing, UserId::new()).await.unwrap();
    let seller = listing.seller_id;
    let t = now();

    let counter = offer
        .counter(
            &CounterOffer::new(offer.id(), seller, Decimal::new(700, 2)).with_message("firm"),
            t,
            Duration::hours(48),
        )
        .unwrap();
    let offer = transition(&store, &offer, counter).await.unwrap();
    let accept = offer
        .accept(&AcceptOffer::new(offer.id(), offer.buyer_id()), t)
        .unwrap();
    let offer = transition(&store, &offer, accept).await.unwrap();

    let row = store.require_offer(offer.id()).await.unwrap();
    let replayed = store.replay_offer(offer.id()).await.unwrap().unwrap();
    assert_eq!(row, offer);
    assert_eq!(replayed, row);
    assert_eq!(row.total_price(), Money::from_cents(280_000));
    assert_eq!(row.counter_message(), Some("firm"));
}

#[tokio::test]
async fn event_log_is_append_only() {
    let store = get_test_store().await;
    let offer = propose(&store, &listing(), UserId::new()).await.unwrap();

    let update = sqlx::query("UPDATE offer_events SET message = 'edited' WHERE offer_id = $1")
        .bind(offer.id().as_uuid())
        .execute(store.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM offer_events WHERE offer_id = $1")
        .bind(offer.id().as_uuid())
        .execute(store.pool())
        .await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn list_offers_filters_and_paginates() {
    let store = get_test_store().await;
    let listing = listing();
    let seller = listing.seller_id;
    let mut offers = Vec::new();
    for _ in 0..3 {
        offers.push(propose(&store, &listing, UserId::new()).await.unwrap());
    }
    let event = offers[0]
        .reject(&RejectOffer::new(offers[0].id(), seller), now())
        .unwrap();
    transition(&store, &offers[0], event).await.unwrap();

    let all = store
        .list_offers(&OfferQuery::for_party(seller).role(PartyRole::Seller))
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert!(all.items[0].created_at() >= all.items[1].created_at());

    let open = store
        .list_offers(&OfferQuery::for_party(seller).status(OfferStatus::Pending))
        .await
        .unwrap();
    assert_eq!(open.total, 2);

    let second_page = store
        .list_offers(
            &OfferQuery::for_party(seller)
                .listing_id(listing.listing_id)
                .page(2, 2),
        )
        .await
        .unwrap();
    assert_eq!(second_page.total, 3);
    assert_eq!(second_page.items.len(), 1);

    let as_buyer = store
        .list_offers(&OfferQuery::for_party(seller).role(PartyRole::Buyer))
        .await
        .unwrap();
    assert_eq!(as_buyer.total, 0);
}

#[tokio::test]
async fn list_overdue_returns_lapsed_counters() {
    let store = get_test_store().await;
    let listing = listing();
    let offer = propose(&store, &listing, UserId::new()).await.unwrap();
    let t = now();
    let counter = offer
        .counter(
            &CounterOffer::new(offer.id(), listing.seller_id, Decimal::new(700, 2)),
            t,
            Duration::hours(1),
        )
        .unwrap();
    transition(&store, &offer, counter).await.unwrap();

    assert!(store.list_overdue(t, 10).await.unwrap().is_empty());
    let overdue = store
        .list_overdue(t + Duration::hours(2), 10)
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id(), offer.id());
}
