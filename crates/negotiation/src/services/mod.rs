//! Collaborator traits and in-memory implementations.

pub mod checkout;
pub mod listing;
pub mod notification;

use thiserror::Error;

pub use checkout::{CheckoutHandoff, CheckoutRequest, InMemoryCheckoutHandoff};
pub use listing::{InMemoryListingCatalog, ListingCatalog};
pub use notification::{
    InMemoryNotificationStore, Notification, NotificationCategory, NotificationData,
    NotificationStore,
};

/// Failure reported by an outside service.
#[derive(Debug, Clone, Error)]
#[error("{service}: {reason}")]
pub struct CollaboratorError {
    pub service: &'static str,
    pub reason: String,
}

impl CollaboratorError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}
