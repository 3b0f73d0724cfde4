//! Transactional storage for offers.
//!
//! Each offer is kept twice: as a materialized row holding its current state
//! and as an append-only log of every action taken on it. Every write touches
//! both in one atomic unit, guarded by a conditional update on the offer's
//! status and version.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventId};
pub use memory::InMemoryOfferStore;
pub use postgres::PostgresOfferStore;
pub use query::{OfferQuery, Page, PartyRole};
pub use store::{ExpectedState, OfferStore, OfferStoreExt, validate_write};
