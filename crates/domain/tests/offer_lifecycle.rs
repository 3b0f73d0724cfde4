//! Integration tests for the Offer aggregate.
//!
//! These tests drive whole negotiations through the public API and check
//! the properties that must hold at every step: strict turn alternation,
//! monotonic rounds, consistent totals, absorbing terminal statuses, and
//! that replaying the log reproduces the materialized offer.

use chrono::{DateTime, Duration, Utc};
use common::{ListingId, OfferId, UserId, Version};
use domain::{
    AcceptOffer, Actor, Aggregate, CounterOffer, DEFAULT_COUNTER_WINDOW_HOURS, DomainEvent,
    ErrorKind, Listing, Money, Offer, OfferError, OfferEvent, OfferStatus, ProposeOffer,
    RejectOffer, UnitPrice, WithdrawOffer, total_price,
};
use rust_decimal::Decimal;

fn dollars(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn window() -> Duration {
    Duration::hours(DEFAULT_COUNTER_WINDOW_HOURS)
}

/// An offer together with the log that produced it.
struct Negotiation {
    offer: Offer,
    log: Vec<OfferEvent>,
    buyer: UserId,
    seller: UserId,
}

impl Negotiation {
    /// Scenario A: $6.50 × 400 against a $6.00 floor.
    fn open(now: DateTime<Utc>) -> Self {
        let seller = UserId::new();
        let buyer = UserId::new();
        let listing = Listing::new(ListingId::new(), seller, "Ceramic mugs")
            .with_floor_price(UnitPrice::new(dollars(600)).unwrap());
        let cmd = ProposeOffer::new(listing.listing_id, buyer, dollars(650), 400)
            .with_message("bulk order");
        let event = Offer::propose(OfferId::new(), &listing, &cmd, now).unwrap();
        let offer = Offer::from_initial_event(&event).unwrap();
        Self {
            offer,
            log: vec![event],
            buyer,
            seller,
        }
    }

    fn record(&mut self, result: Result<OfferEvent, OfferError>) -> Result<(), OfferError> {
        let event = result?;
        self.offer.apply(&event);
        self.log.push(event);
        Ok(())
    }

    fn counter(&mut self, actor: UserId, cents: i64, now: DateTime<Utc>) -> Result<(), OfferError> {
        let cmd = CounterOffer::new(self.offer.id(), actor, dollars(cents));
        let result = self.offer.counter(&cmd, now, window());
        self.record(result)
    }

    fn accept(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        let result = self.offer.accept(&AcceptOffer::new(self.offer.id(), actor), now);
        self.record(result)
    }

    fn reject(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        let cmd = RejectOffer::new(self.offer.id(), actor).with_message("too low");
        let result = self.offer.reject(&cmd, now);
        self.record(result)
    }

    fn withdraw(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<(), OfferError> {
        let result = self.offer.withdraw(&WithdrawOffer::new(self.offer.id(), actor), now);
        self.record(result)
    }

    fn assert_replay_matches(&self) {
        let replayed = Offer::replay(&self.log).unwrap();
        assert_eq!(replayed, self.offer);
        assert_eq!(replayed.version(), Version::new(self.log.len() as i64));
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn proposal_counter_accept() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);

        // A
        assert_eq!(n.offer.status(), OfferStatus::Pending);
        assert_eq!(n.offer.current_round(), 1);
        assert_eq!(n.offer.last_actor_id(), n.buyer);
        assert_eq!(n.offer.total_price(), Money::from_cents(260_000));

        // B
        n.counter(n.seller, 700, now).unwrap();
        assert_eq!(n.offer.status(), OfferStatus::Countered);
        assert_eq!(n.offer.current_round(), 2);
        assert_eq!(n.offer.last_actor_id(), n.seller);
        assert_eq!(n.offer.total_price(), Money::from_cents(280_000));
        assert_eq!(n.offer.expires_at(), Some(now + Duration::hours(48)));

        // C
        n.accept(n.buyer, now + Duration::hours(1)).unwrap();
        assert_eq!(n.offer.status(), OfferStatus::Accepted);
        assert_eq!(n.offer.last_actor_id(), n.buyer);
        assert_eq!(n.offer.total_price(), Money::from_cents(280_000));

        n.assert_replay_matches();
    }

    #[test]
    fn proposal_below_floor_is_bad_request() {
        let seller = UserId::new();
        let listing = Listing::new(ListingId::new(), seller, "Ceramic mugs")
            .with_floor_price(UnitPrice::new(dollars(600)).unwrap());
        let cmd = ProposeOffer::new(listing.listing_id, UserId::new(), dollars(400), 400);

        let err = Offer::propose(OfferId::new(), &listing, &cmd, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.to_string(), "minimum price is $6.00");
    }

    #[test]
    fn buyer_countering_own_proposal_is_forbidden() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);

        let err = n.counter(n.buyer, 640, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "it's not your turn");
        assert_eq!(n.log.len(), 1);
    }
}

mod properties {
    use super::*;

    #[test]
    fn last_actor_alternates_across_long_negotiation() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);
        let mut expected = n.buyer;

        for (i, cents) in [700, 660, 690, 670, 680].into_iter().enumerate() {
            let actor = if expected == n.buyer { n.seller } else { n.buyer };
            let before = n.offer.current_round();

            // The party who just moved may not move again.
            assert_eq!(
                n.counter(expected, cents, now),
                Err(OfferError::NotYourTurn)
            );

            n.counter(actor, cents, now).unwrap();
            assert_eq!(n.offer.last_actor_id(), actor);
            assert_eq!(n.offer.current_round(), before + 1);
            assert_eq!(n.offer.current_round(), i as u32 + 2);
            expected = actor;
        }

        let responder = if expected == n.buyer { n.seller } else { n.buyer };
        let round = n.offer.current_round();
        n.reject(responder, now).unwrap();
        assert_eq!(n.offer.current_round(), round);
        n.assert_replay_matches();
    }

    #[test]
    fn totals_are_consistent_on_offer_and_every_event() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);
        n.counter(n.seller, 700, now).unwrap();
        n.counter(n.buyer, 667, now).unwrap();
        n.accept(n.seller, now).unwrap();

        for event in &n.log {
            if let Some(terms) = event.terms() {
                assert_eq!(
                    terms.total_price,
                    total_price(terms.price_per_unit, terms.quantity).unwrap()
                );
            }
        }
        assert_eq!(
            n.offer.total_price(),
            total_price(n.offer.current_price(), n.offer.quantity()).unwrap()
        );
        assert_eq!(n.offer.total_price(), Money::from_cents(266_800));
    }

    #[test]
    fn terminal_statuses_are_absorbing() {
        let now = Utc::now();

        let mut accepted = Negotiation::open(now);
        accepted.accept(accepted.seller, now).unwrap();

        let mut rejected = Negotiation::open(now);
        rejected.reject(rejected.seller, now).unwrap();

        let mut withdrawn = Negotiation::open(now);
        withdrawn.withdraw(withdrawn.buyer, now).unwrap();

        for mut n in [accepted, rejected, withdrawn] {
            let status = n.offer.status();
            let version = n.offer.version();
            for result in [
                n.counter(n.buyer, 700, now),
                n.counter(n.seller, 700, now),
                n.accept(n.buyer, now),
                n.accept(n.seller, now),
                n.reject(n.buyer, now),
                n.reject(n.seller, now),
                n.withdraw(n.buyer, now),
                n.withdraw(n.seller, now),
            ] {
                let err = result.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::BadRequest, "{status}: {err}");
            }
            assert_eq!(n.offer.status(), status);
            assert_eq!(n.offer.version(), version);
        }
    }

    #[test]
    fn expiration_takes_precedence_over_other_checks() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);
        n.counter(n.seller, 700, now).unwrap();

        let late = now + window() + Duration::seconds(1);
        assert_eq!(n.accept(n.seller, late), Err(OfferError::Expired));
        assert_eq!(n.counter(n.buyer, 680, late), Err(OfferError::Expired));
        assert_eq!(n.reject(n.buyer, late), Err(OfferError::Expired));

        let event = n.offer.expire(late).unwrap();
        assert_eq!(event.actor(), Actor::System);
        assert_eq!(event.occurred_at(), late);
        n.record(Ok(event)).unwrap();

        assert_eq!(n.offer.status(), OfferStatus::Expired);
        assert_eq!(n.offer.last_actor_id(), n.seller);
        // Once expired, the usual status error applies.
        assert_eq!(
            n.accept(n.buyer, late).unwrap_err().kind(),
            ErrorKind::BadRequest
        );
        n.assert_replay_matches();
    }

    #[test]
    fn log_serialization_preserves_replay() {
        let now = Utc::now();
        let mut n = Negotiation::open(now);
        n.counter(n.seller, 700, now).unwrap();
        n.withdraw(n.buyer, now).unwrap();

        let json = serde_json::to_string(&n.log).unwrap();
        let decoded: Vec<OfferEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(Offer::replay(&decoded).unwrap(), n.offer);
    }
}
