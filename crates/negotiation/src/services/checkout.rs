//! Checkout handoff trait and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{ListingId, OfferId, UserId};
use domain::{Money, Quantity, UnitPrice};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;
use crate::config::CHECKOUT_WINDOW_HOURS;

/// What checkout needs to turn an accepted offer into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub offer_id: OfferId,
    pub buyer_id: UserId,
    pub listing_id: ListingId,
    pub listing_title: String,
    pub accepted_price: UnitPrice,
    pub quantity: Quantity,
    pub estimated_total: Money,

    /// The buyer must place the order before this.
    pub expires_at: DateTime<Utc>,
}

impl CheckoutRequest {
    /// Deadline for an offer accepted at `accepted_at`.
    pub fn deadline(accepted_at: DateTime<Utc>) -> DateTime<Utc> {
        accepted_at + Duration::hours(CHECKOUT_WINDOW_HOURS)
    }
}

/// Receives accepted offers.
#[async_trait]
pub trait CheckoutHandoff: Send + Sync {
    async fn begin_checkout(&self, request: CheckoutRequest) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Default)]
struct CheckoutState {
    requests: Vec<CheckoutRequest>,
    fail_on_begin: bool,
}

/// In-memory checkout for the binary and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutHandoff {
    state: Arc<RwLock<CheckoutState>>,
}

impl InMemoryCheckoutHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_begin(&self, fail: bool) {
        self.state.write().await.fail_on_begin = fail;
    }

    /// Returns every request received, oldest first.
    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.state.read().await.requests.clone()
    }
}

#[async_trait]
impl CheckoutHandoff for InMemoryCheckoutHandoff {
    async fn begin_checkout(&self, request: CheckoutRequest) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().await;
        if state.fail_on_begin {
            return Err(CollaboratorError::new("checkout", "checkout unavailable"));
        }
        state.requests.push(request);
        Ok(())
    }
}
