//! The negotiation service: every offer operation goes through here.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{OfferId, UserId};
use domain::{
    AcceptOffer, Aggregate, Command, CounterOffer, Offer, OfferError, OfferEvent, ProposeOffer,
    RejectOffer, WithdrawOffer,
};
use offer_store::{
    EventEnvelope, ExpectedState, OfferQuery, OfferStore, OfferStoreExt, Page, StoreError,
};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::clock::{Clock, SystemClock};
use crate::config::NegotiationConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{NegotiationError, Result};
use crate::services::{CheckoutHandoff, CheckoutRequest, ListingCatalog, NotificationStore};

/// What triggered an expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryTrigger {
    /// A counter, accept, or reject arrived after the deadline.
    Gate,
    Sweep,
}

impl ExpiryTrigger {
    fn as_str(self) -> &'static str {
        match self {
            ExpiryTrigger::Gate => "gate",
            ExpiryTrigger::Sweep => "sweep",
        }
    }
}

/// Runs offer negotiations.
///
/// Each mutating operation reads the offer, lets the aggregate decide the
/// event, and commits offer and event together with a conditional write.
/// Notifications and the checkout handoff are spawned once the write has
/// committed: the caller does not wait for them and they never fail the
/// operation.
pub struct NegotiationService<S, L, N, C> {
    store: S,
    listings: Arc<L>,
    dispatcher: NotificationDispatcher<N>,
    checkout: Arc<C>,
    clock: Arc<dyn Clock>,
    config: NegotiationConfig,
    side_effects: Mutex<JoinSet<()>>,
}

impl<S, L, N, C> NegotiationService<S, L, N, C>
where
    S: OfferStore,
    L: ListingCatalog + 'static,
    N: NotificationStore + 'static,
    C: CheckoutHandoff + 'static,
{
    /// Creates a service with default settings and the system clock.
    pub fn new(store: S, listings: L, notifications: N, checkout: C) -> Self {
        let config = NegotiationConfig::default();
        Self {
            store,
            listings: Arc::new(listings),
            dispatcher: NotificationDispatcher::new(notifications, &config),
            checkout: Arc::new(checkout),
            clock: Arc::new(SystemClock),
            config,
            side_effects: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_config(mut self, config: NegotiationConfig) -> Self {
        self.dispatcher.configure(&config);
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Waits for every notification and checkout handoff started so far.
    pub async fn flush_side_effects(&self) {
        let mut pending = std::mem::take(&mut *self.pending_side_effects());
        while pending.join_next().await.is_some() {}
    }

    /// Opens a negotiation on a listing.
    #[tracing::instrument(
        skip(self, cmd),
        fields(listing_id = %cmd.listing_id, buyer_id = %cmd.buyer_id)
    )]
    pub async fn propose(&self, cmd: ProposeOffer) -> Result<Offer> {
        let started = Instant::now();
        let result = self.open(&cmd).await;
        self.record_command::<ProposeOffer, _>(started, &result);

        let offer = result?;
        tracing::info!(
            offer_id = %offer.id(),
            price = %offer.offer_price(),
            quantity = %offer.quantity(),
            "offer proposed"
        );
        Ok(offer)
    }

    async fn open(&self, cmd: &ProposeOffer) -> Result<Offer> {
        let listing = self
            .listings
            .get_listing(cmd.listing_id)
            .await?
            .ok_or(NegotiationError::ListingNotFound(cmd.listing_id))?;

        let now = self.clock.now();
        let event = Offer::propose(OfferId::new(), &listing, cmd, now)?;

        // The index would catch this too; checking first spares a failed write.
        if self
            .store
            .find_active_offer(cmd.listing_id, cmd.buyer_id)
            .await?
            .is_some()
        {
            return Err(OfferError::DuplicateActiveOffer.into());
        }

        let offer = Offer::from_initial_event(&event).ok_or_else(|| {
            StoreError::InvalidWrite("propose did not open an offer".to_string())
        })?;
        self.store.insert_offer(&offer, &event).await?;

        metrics::counter!("offer_transitions_total", "event_type" => event.kind().as_str())
            .increment(1);
        self.notify(&offer, event);
        Ok(offer)
    }

    /// Answers the other party with a new unit price.
    #[tracing::instrument(skip(self, cmd), fields(offer_id = %cmd.offer_id, actor_id = %cmd.actor_id))]
    pub async fn counter(&self, cmd: CounterOffer) -> Result<Offer> {
        let window = self.config.counter_window;
        self.transition(cmd.offer_id, &cmd, |offer, now| {
            offer.counter(&cmd, now, window)
        })
        .await
    }

    /// Accepts the price currently on the table and hands off to checkout.
    #[tracing::instrument(skip(self, cmd), fields(offer_id = %cmd.offer_id, actor_id = %cmd.actor_id))]
    pub async fn accept(&self, cmd: AcceptOffer) -> Result<Offer> {
        let offer = self
            .transition(cmd.offer_id, &cmd, |offer, now| offer.accept(&cmd, now))
            .await?;
        self.hand_off_to_checkout(&offer);
        Ok(offer)
    }

    #[tracing::instrument(skip(self, cmd), fields(offer_id = %cmd.offer_id, actor_id = %cmd.actor_id))]
    pub async fn reject(&self, cmd: RejectOffer) -> Result<Offer> {
        self.transition(cmd.offer_id, &cmd, |offer, now| offer.reject(&cmd, now))
            .await
    }

    /// Lets the buyer walk away. Not subject to turn order or the deadline.
    #[tracing::instrument(skip(self, cmd), fields(offer_id = %cmd.offer_id, actor_id = %cmd.actor_id))]
    pub async fn withdraw(&self, cmd: WithdrawOffer) -> Result<Offer> {
        self.transition(cmd.offer_id, &cmd, |offer, now| offer.withdraw(&cmd, now))
            .await
    }

    /// Returns an offer to one of its parties.
    pub async fn get_offer(&self, offer_id: OfferId, viewer: UserId) -> Result<Offer> {
        let offer = self.store.require_offer(offer_id).await?;
        if !offer.is_party(viewer) {
            return Err(OfferError::NotAParty.into());
        }
        Ok(offer)
    }

    /// Returns an offer's log, oldest first, to one of its parties.
    pub async fn get_offer_history(
        &self,
        offer_id: OfferId,
        viewer: UserId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_offer(offer_id, viewer).await?;
        Ok(self.store.get_events(offer_id).await?)
    }

    /// Lists the caller's offers, newest first.
    pub async fn list_my_offers(&self, query: &OfferQuery) -> Result<Page<Offer>> {
        Ok(self.store.list_offers(query).await?)
    }

    /// Expires up to one batch of overdue offers; returns how many.
    ///
    /// Purely for read freshness: writes hit the same expiry on their own.
    #[tracing::instrument(skip(self))]
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let overdue = self.store.list_overdue(now, self.config.sweep_batch).await?;

        let mut expired = 0;
        for offer in overdue {
            if self.expire(offer, now, ExpiryTrigger::Sweep).await?.is_some() {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Shared path for counter, accept, reject, and withdraw.
    ///
    /// If the aggregate reports the offer overdue, the expiry is committed
    /// before the caller gets [`OfferError::Expired`].
    async fn transition<Cmd, F>(&self, offer_id: OfferId, cmd: &Cmd, decide: F) -> Result<Offer>
    where
        Cmd: Command,
        F: FnOnce(&Offer, DateTime<Utc>) -> std::result::Result<OfferEvent, OfferError>,
    {
        let started = Instant::now();
        let result = self.decide_and_commit(offer_id, decide).await;
        self.record_command::<Cmd, _>(started, &result);

        let (offer, event) = result?;
        tracing::info!(
            status = %offer.status(),
            round = offer.current_round(),
            version = %offer.version(),
            actor_id = %cmd.actor_id(),
            "offer {}",
            event.kind()
        );
        self.notify(&offer, event);
        Ok(offer)
    }

    async fn decide_and_commit<F>(
        &self,
        offer_id: OfferId,
        decide: F,
    ) -> Result<(Offer, OfferEvent)>
    where
        F: FnOnce(&Offer, DateTime<Utc>) -> std::result::Result<OfferEvent, OfferError>,
    {
        let offer = self.store.require_offer(offer_id).await?;
        let now = self.clock.now();

        let event = match decide(&offer, now) {
            Ok(event) => event,
            Err(OfferError::Expired) => {
                self.expire(offer, now, ExpiryTrigger::Gate).await?;
                return Err(OfferError::Expired.into());
            }
            Err(err) => return Err(err.into()),
        };

        let offer = self.commit(offer, &event).await?;
        Ok((offer, event))
    }

    /// Applies `event` and writes it, provided nobody else wrote first.
    async fn commit(&self, mut offer: Offer, event: &OfferEvent) -> Result<Offer> {
        let expected = ExpectedState::of(&offer);
        offer.apply(event);

        if let Err(err) = self.store.commit_transition(&offer, event, expected).await {
            if matches!(err, StoreError::StaleState { .. }) {
                metrics::counter!("offer_transition_conflicts_total").increment(1);
                tracing::debug!(offer_id = %offer.id(), "lost a race on the offer");
            }
            return Err(err.into());
        }

        metrics::counter!("offer_transitions_total", "event_type" => event.kind().as_str())
            .increment(1);
        Ok(offer)
    }

    /// Commits the expire event for an overdue offer and notifies both
    /// parties.
    ///
    /// Returns None if the offer is not overdue or another write moved it
    /// first.
    async fn expire(
        &self,
        offer: Offer,
        now: DateTime<Utc>,
        trigger: ExpiryTrigger,
    ) -> Result<Option<Offer>> {
        let Some(event) = offer.expire(now) else {
            return Ok(None);
        };

        let expired = match self.commit(offer, &event).await {
            Ok(expired) => expired,
            Err(err) if err.is_conflict() => return Ok(None),
            Err(err) => return Err(err),
        };

        metrics::counter!("offer_expirations_total", "trigger" => trigger.as_str()).increment(1);
        tracing::info!(offer_id = %expired.id(), trigger = trigger.as_str(), "offer expired");
        self.notify(&expired, event);
        Ok(Some(expired))
    }

    fn pending_side_effects(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.side_effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `task` in the background, reaping tasks that already finished.
    fn spawn_side_effect(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut pending = self.pending_side_effects();
        while pending.try_join_next().is_some() {}
        pending.spawn(task.in_current_span());
    }

    fn notify(&self, offer: &Offer, event: OfferEvent) {
        let dispatcher = self.dispatcher.clone();
        let offer = offer.clone();
        self.spawn_side_effect(async move {
            dispatcher.notify(&offer, &event).await;
        });
    }

    /// Tells checkout about an accepted offer in the background.
    fn hand_off_to_checkout(&self, offer: &Offer) {
        let listings = Arc::clone(&self.listings);
        let checkout = Arc::clone(&self.checkout);
        let timeout = self.config.notification_timeout;
        let offer = offer.clone();
        self.spawn_side_effect(async move {
            begin_checkout(listings.as_ref(), checkout.as_ref(), timeout, &offer).await;
        });
    }

    fn record_command<Cmd: Command, T>(&self, started: Instant, result: &Result<T>) {
        let action = Cmd::action().as_str();
        metrics::histogram!("offer_command_duration_seconds", "action" => action)
            .record(started.elapsed().as_secs_f64());
        if let Err(err) = result {
            metrics::counter!(
                "offer_command_failures_total",
                "action" => action,
                "kind" => err.kind().as_str()
            )
            .increment(1);
        }
    }
}

/// Hands an accepted offer to checkout. Failures are logged only.
async fn begin_checkout<L, C>(listings: &L, checkout: &C, timeout: Duration, offer: &Offer)
where
    L: ListingCatalog,
    C: CheckoutHandoff,
{
    let listing_title = match listings.get_listing(offer.listing_id()).await {
        Ok(Some(listing)) => listing.title,
        Ok(None) => {
            tracing::warn!(listing_id = %offer.listing_id(), "accepted offer on unknown listing");
            String::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not load listing for checkout");
            String::new()
        }
    };

    let request = CheckoutRequest {
        offer_id: offer.id(),
        buyer_id: offer.buyer_id(),
        listing_id: offer.listing_id(),
        listing_title,
        accepted_price: offer.current_price(),
        quantity: offer.quantity(),
        estimated_total: offer.total_price(),
        expires_at: CheckoutRequest::deadline(offer.updated_at()),
    };

    let outcome = tokio::time::timeout(timeout, checkout.begin_checkout(request)).await;
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(_) => "timed out".to_string(),
    };
    metrics::counter!("offer_checkout_handoff_failures_total").increment(1);
    tracing::warn!(offer_id = %offer.id(), error = %failure, "checkout handoff failed");
}
