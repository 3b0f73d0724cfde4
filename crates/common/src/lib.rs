//! Shared types for the offer negotiation engine.

mod types;

pub use types::{ListingId, OfferId, UserId, Version};
