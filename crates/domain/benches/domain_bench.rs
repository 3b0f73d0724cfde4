use chrono::{Duration, Utc};
use common::{ListingId, OfferId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AcceptOffer, Aggregate, CounterOffer, Listing, Offer, OfferEvent, ProposeOffer, Quantity,
    UnitPrice, total_price,
};
use rust_decimal::Decimal;

fn open_offer() -> (Listing, UserId, Vec<OfferEvent>) {
    let seller = UserId::new();
    let buyer = UserId::new();
    let listing = Listing::new(ListingId::new(), seller, "Bench listing")
        .with_floor_price(UnitPrice::new(Decimal::new(100, 2)).unwrap());
    let cmd = ProposeOffer::new(listing.listing_id, buyer, Decimal::new(650, 2), 400);
    let event = Offer::propose(OfferId::new(), &listing, &cmd, Utc::now()).unwrap();
    (listing, buyer, vec![event])
}

fn bench_total_price(c: &mut Criterion) {
    let price = UnitPrice::new(Decimal::new(2675, 3)).unwrap();
    let quantity = Quantity::new(400).unwrap();

    c.bench_function("domain/total_price", |b| {
        b.iter(|| total_price(price, quantity).unwrap());
    });
}

fn bench_negotiation_cycle(c: &mut Criterion) {
    c.bench_function("domain/propose_counter_accept", |b| {
        b.iter(|| {
            let (listing, buyer, events) = open_offer();
            let now = Utc::now();
            let mut offer = Offer::from_initial_event(&events[0]).unwrap();

            let counter = CounterOffer::new(offer.id(), listing.seller_id, Decimal::new(700, 2));
            let event = offer.counter(&counter, now, Duration::hours(48)).unwrap();
            offer.apply(&event);

            let event = offer.accept(&AcceptOffer::new(offer.id(), buyer), now).unwrap();
            offer.apply(&event);
        });
    });
}

fn bench_replay_100_events(c: &mut Criterion) {
    let (listing, buyer, mut events) = open_offer();
    let now = Utc::now();
    let mut offer = Offer::from_initial_event(&events[0]).unwrap();
    for i in 0..99 {
        let actor = if i % 2 == 0 { listing.seller_id } else { buyer };
        let cmd = CounterOffer::new(offer.id(), actor, Decimal::new(600 + i, 2));
        let event = offer.counter(&cmd, now, Duration::hours(48)).unwrap();
        offer.apply(&event);
        events.push(event);
    }

    c.bench_function("domain/replay_100_events", |b| {
        b.iter(|| Offer::replay(&events).unwrap());
    });

    let payloads: Vec<serde_json::Value> = events
        .iter()
        .map(|event| serde_json::to_value(event).unwrap())
        .collect();

    c.bench_function("domain/decode_and_replay_100_events", |b| {
        b.iter(|| {
            let decoded: Vec<OfferEvent> = payloads
                .iter()
                .map(|payload| serde_json::from_value(payload.clone()).unwrap())
                .collect();
            Offer::replay(&decoded).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_total_price,
    bench_negotiation_cycle,
    bench_replay_100_events,
);
criterion_main!(benches);
