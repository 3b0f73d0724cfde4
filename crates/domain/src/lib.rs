//! Domain layer for the offer negotiation engine.
//!
//! This crate provides the pure negotiation model:
//! - Aggregate trait for entities backed by an append-only event log
//! - DomainEvent trait for logged facts
//! - Offer aggregate with its turn-based state machine
//! - Money rounding shared by every total
//! - ErrorKind, the caller-facing error taxonomy

pub mod aggregate;
pub mod error;
pub mod offer;

pub use aggregate::{Aggregate, DomainEvent};
pub use error::ErrorKind;
pub use offer::{
    AcceptOffer, Actor, Command, CounterOffer, DEFAULT_COUNTER_WINDOW_HOURS, Listing,
    ListingStatus, MAX_MESSAGE_LEN, Money, Offer, OfferError, OfferEvent, OfferEventType,
    OfferSnapshot, OfferStatus, ProposeOffer, Quantity, RejectOffer, Terms, UnitPrice,
    WithdrawOffer, total_price,
};
