//! Notification store trait and in-memory implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId};
use domain::OfferEventType;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    OfferReceived,
    OfferCountered,
    OfferAccepted,
    OfferRejected,
    OfferWithdrawn,
    OfferExpired,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::OfferReceived => "offer_received",
            NotificationCategory::OfferCountered => "offer_countered",
            NotificationCategory::OfferAccepted => "offer_accepted",
            NotificationCategory::OfferRejected => "offer_rejected",
            NotificationCategory::OfferWithdrawn => "offer_withdrawn",
            NotificationCategory::OfferExpired => "offer_expired",
        }
    }
}

impl From<OfferEventType> for NotificationCategory {
    fn from(event_type: OfferEventType) -> Self {
        match event_type {
            OfferEventType::Propose => NotificationCategory::OfferReceived,
            OfferEventType::Counter => NotificationCategory::OfferCountered,
            OfferEventType::Accept => NotificationCategory::OfferAccepted,
            OfferEventType::Reject => NotificationCategory::OfferRejected,
            OfferEventType::Withdraw => NotificationCategory::OfferWithdrawn,
            OfferEventType::Expire => NotificationCategory::OfferExpired,
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub offer_id: OfferId,
    pub listing_id: ListingId,
}

/// A message for one user about one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub data: NotificationData,
    pub created_at: DateTime<Utc>,
}

/// Where notifications are delivered.
///
/// The store also answers the lookup used to suppress repeats.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Returns true if the recipient already got a notification of this
    /// category for this offer at or after `since`.
    async fn exists_since(
        &self,
        recipient_id: UserId,
        category: NotificationCategory,
        offer_id: OfferId,
        since: DateTime<Utc>,
    ) -> Result<bool, CollaboratorError>;

    async fn create(&self, notification: Notification) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Default)]
struct NotificationState {
    sent: Vec<Notification>,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory notification store for the binary and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationStore {
    state: Arc<RwLock<NotificationState>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every create call.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes every call wait this long before answering.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns every notification stored so far, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.sent.clone()
    }

    /// Returns the notifications a user received.
    pub async fn for_recipient(&self, recipient_id: UserId) -> Vec<Notification> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.sent.len()
    }

    async fn pause(&self) {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn exists_since(
        &self,
        recipient_id: UserId,
        category: NotificationCategory,
        offer_id: OfferId,
        since: DateTime<Utc>,
    ) -> Result<bool, CollaboratorError> {
        self.pause().await;
        let state = self.state.read().await;
        Ok(state.sent.iter().any(|n| {
            n.recipient_id == recipient_id
                && n.category == category
                && n.data.offer_id == offer_id
                && n.created_at >= since
        }))
    }

    async fn create(&self, notification: Notification) -> Result<(), CollaboratorError> {
        self.pause().await;
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(CollaboratorError::new(
                "notifications",
                "notification service unavailable",
            ));
        }
        state.sent.push(notification);
        Ok(())
    }
}
