//! Offer negotiation engine.
//!
//! [`NegotiationService`] runs the two-party protocol over an
//! [`offer_store::OfferStore`]:
//! 1. A buyer proposes a unit price and quantity on a listing
//! 2. Seller and buyer take turns countering with a new price
//! 3. Either side accepts or rejects when it is their turn
//! 4. The buyer may withdraw at any point while the offer is open
//!
//! A counter gives the other side a deadline. An action arriving after it
//! expires the offer instead. Notifications and the checkout handoff run in
//! the background once a write commits; they are best-effort and never fail
//! or delay an operation.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod service;
pub mod services;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CHECKOUT_WINDOW_HOURS, DEFAULT_DEDUP_WINDOW, DEFAULT_NOTIFICATION_TIMEOUT, NegotiationConfig,
};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, notifications_for};
pub use error::{NegotiationError, Result};
pub use service::NegotiationService;
pub use services::{
    CheckoutHandoff, CheckoutRequest, CollaboratorError, InMemoryCheckoutHandoff,
    InMemoryListingCatalog, InMemoryNotificationStore, ListingCatalog, Notification,
    NotificationCategory, NotificationData, NotificationStore,
};
pub use sweep::spawn_expiry_sweeper;
