//! Best-effort, de-duplicated notifications for offer transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::{Actor, DomainEvent, Offer, OfferEvent};

use crate::config::NegotiationConfig;
use crate::services::{
    CollaboratorError, Notification, NotificationCategory, NotificationData, NotificationStore,
};

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,

    /// An equivalent notification went out within the de-duplication window.
    Suppressed,
    Failed,
    TimedOut,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Suppressed => "suppressed",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::TimedOut => "timed_out",
        }
    }
}

/// Sends transition notifications without ever failing the transition.
///
/// Each notification first asks the store whether an equivalent one (same
/// recipient, category, and offer) was created within the window, and is
/// dropped if so. Store errors and slow stores are logged and counted.
/// Clones share the store.
pub struct NotificationDispatcher<N> {
    store: Arc<N>,
    dedup_window: Duration,
    timeout: Duration,
}

impl<N> Clone for NotificationDispatcher<N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dedup_window: self.dedup_window,
            timeout: self.timeout,
        }
    }
}

impl<N: NotificationStore> NotificationDispatcher<N> {
    pub fn new(store: N, config: &NegotiationConfig) -> Self {
        Self {
            store: Arc::new(store),
            dedup_window: config.dedup_window,
            timeout: config.notification_timeout,
        }
    }

    pub(crate) fn configure(&mut self, config: &NegotiationConfig) {
        self.dedup_window = config.dedup_window;
        self.timeout = config.notification_timeout;
    }

    /// Returns the underlying notification store.
    pub fn store(&self) -> &N {
        &self.store
    }

    /// Notifies everyone who should hear about `event`, which has just been
    /// applied to `offer`.
    pub async fn notify(&self, offer: &Offer, event: &OfferEvent) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        for notification in notifications_for(offer, event) {
            outcomes.push(self.dispatch(notification).await);
        }
        outcomes
    }

    /// Delivers one notification unless a recent equivalent exists.
    #[tracing::instrument(
        skip(self, notification),
        fields(
            recipient = %notification.recipient_id,
            category = %notification.category,
            offer_id = %notification.data.offer_id,
        )
    )]
    pub async fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        let outcome = match tokio::time::timeout(self.timeout, self.deliver(notification)).await
        {
            Ok(Ok(true)) => DispatchOutcome::Sent,
            Ok(Ok(false)) => {
                metrics::counter!("offer_notifications_suppressed_total").increment(1);
                tracing::debug!("equivalent notification sent recently, suppressed");
                DispatchOutcome::Suppressed
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "notification failed");
                DispatchOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "notification timed out");
                DispatchOutcome::TimedOut
            }
        };

        metrics::counter!("offer_notifications_total", "outcome" => outcome.as_str())
            .increment(1);
        outcome
    }

    /// Returns Ok(false) when suppressed.
    async fn deliver(&self, notification: Notification) -> Result<bool, CollaboratorError> {
        let since = window_start(notification.created_at, self.dedup_window);
        let seen = self
            .store
            .exists_since(
                notification.recipient_id,
                notification.category,
                notification.data.offer_id,
                since,
            )
            .await?;
        if seen {
            return Ok(false);
        }

        self.store.create(notification).await?;
        Ok(true)
    }
}

fn window_start(at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(window) {
        Ok(window) => at - window,
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}

/// Builds the notifications for a transition.
///
/// A user's action goes to the other party; a system expiry goes to both.
pub fn notifications_for(offer: &Offer, event: &OfferEvent) -> Vec<Notification> {
    let recipients: Vec<_> = match event.actor() {
        Actor::User(actor) => offer.counterparty(actor).into_iter().collect(),
        Actor::System => vec![offer.buyer_id(), offer.seller_id()],
    };

    let category = NotificationCategory::from(event.kind());
    let (title, message) = describe(offer, event);

    recipients
        .into_iter()
        .map(|recipient_id| Notification {
            recipient_id,
            category,
            title: title.to_string(),
            message: message.clone(),
            data: NotificationData {
                offer_id: offer.id(),
                listing_id: offer.listing_id(),
            },
            created_at: event.occurred_at(),
        })
        .collect()
}

fn describe(offer: &Offer, event: &OfferEvent) -> (&'static str, String) {
    match event {
        OfferEvent::Proposed(data) => (
            "New offer",
            format!(
                "You received an offer of {} x {} ({})",
                data.terms.price_per_unit, data.terms.quantity, data.terms.total_price
            ),
        ),
        OfferEvent::Countered(data) => (
            "Counteroffer",
            format!(
                "New price {} per unit ({}), round {}",
                data.terms.price_per_unit, data.terms.total_price, data.round
            ),
        ),
        OfferEvent::Accepted(data) => (
            "Offer accepted",
            format!(
                "Agreed at {} per unit ({})",
                data.terms.price_per_unit, data.terms.total_price
            ),
        ),
        OfferEvent::Rejected(data) => (
            "Offer declined",
            match &data.message {
                Some(reason) => format!("The offer was declined: {reason}"),
                None => "The offer was declined".to_string(),
            },
        ),
        OfferEvent::Withdrawn(_) => (
            "Offer withdrawn",
            format!("The buyer withdrew their offer of {}", offer.current_price()),
        ),
        OfferEvent::Expired(_) => (
            "Offer expired",
            "The offer expired before anyone responded".to_string(),
        ),
    }
}
