//! Offer negotiation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ListingId, OfferId, UserId};
use domain::{
    AcceptOffer, Actor, CounterOffer, Offer, OfferEventType, OfferStatus, ProposeOffer,
    RejectOffer, WithdrawOffer,
};
use negotiation::{
    InMemoryCheckoutHandoff, InMemoryListingCatalog, InMemoryNotificationStore, NegotiationService,
};
use offer_store::{EventEnvelope, OfferQuery, OfferStore, Page, PartyRole};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Caller;
use crate::rate_limit::CallerLimiter;

/// The negotiation service as wired by the server.
pub type OfferService<S> = NegotiationService<
    S,
    InMemoryListingCatalog,
    InMemoryNotificationStore,
    InMemoryCheckoutHandoff,
>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OfferStore> {
    pub service: Arc<OfferService<S>>,
    pub listings: InMemoryListingCatalog,
    pub notifications: InMemoryNotificationStore,
    pub checkout: InMemoryCheckoutHandoff,
    pub limiter: Arc<CallerLimiter>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct ProposeRequest {
    pub listing_id: String,
    pub price_per_unit: Decimal,
    pub quantity: u32,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct CounterRequest {
    pub price_per_unit: Decimal,
    pub message: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RejectRequest {
    pub message: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListOffersParams {
    pub role: Option<PartyRole>,

    /// Comma-separated statuses.
    pub status: Option<String>,
    pub listing_id: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OfferResponse {
    pub id: OfferId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub status: OfferStatus,
    pub offer_price_per_unit: Decimal,
    pub counter_price_per_unit: Option<Decimal>,
    pub current_price_per_unit: Decimal,
    pub quantity: u32,
    pub total_price: Decimal,
    pub current_round: u32,
    pub last_actor_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub counter_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<&Offer> for OfferResponse {
    fn from(offer: &Offer) -> Self {
        use domain::Aggregate;

        Self {
            id: offer.id(),
            listing_id: offer.listing_id(),
            buyer_id: offer.buyer_id(),
            seller_id: offer.seller_id(),
            status: offer.status(),
            offer_price_per_unit: offer.offer_price().amount(),
            counter_price_per_unit: offer.counter_price().map(|p| p.amount()),
            current_price_per_unit: offer.current_price().amount(),
            quantity: offer.quantity().get(),
            total_price: offer.total_price().amount(),
            current_round: offer.current_round(),
            last_actor_id: offer.last_actor_id(),
            expires_at: offer.expires_at(),
            message: offer.message().map(str::to_string),
            counter_message: offer.counter_message().map(str::to_string),
            created_at: offer.created_at(),
            updated_at: offer.updated_at(),
            version: offer.version().as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct OfferEventResponse {
    pub sequence: i64,
    pub event_type: OfferEventType,
    pub actor: Actor,
    pub price_per_unit: Option<Decimal>,
    pub quantity: Option<u32>,
    pub total_price: Option<Decimal>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventEnvelope> for OfferEventResponse {
    fn from(event: EventEnvelope) -> Self {
        Self {
            sequence: event.sequence.as_i64(),
            event_type: event.event_type,
            actor: event.actor,
            price_per_unit: event.terms.map(|t| t.price_per_unit.amount()),
            quantity: event.terms.map(|t| t.quantity.get()),
            total_price: event.terms.map(|t| t.total_price.amount()),
            message: event.message,
            created_at: event.created_at,
        }
    }
}

// -- Handlers --

/// POST /offers: open a negotiation as the buyer.
#[tracing::instrument(skip(state, req))]
pub async fn propose<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(buyer): Caller,
    Json(req): Json<ProposeRequest>,
) -> Result<(StatusCode, Json<OfferResponse>), ApiError> {
    let listing_id = parse_id::<ListingId>("listing_id", &req.listing_id)?;
    let mut cmd = ProposeOffer::new(listing_id, buyer, req.price_per_unit, req.quantity);
    cmd.message = req.message;

    let offer = state.service.propose(cmd).await?;
    Ok((StatusCode::CREATED, Json(OfferResponse::from(&offer))))
}

/// POST /offers/{id}/counter
#[tracing::instrument(skip(state, req))]
pub async fn counter<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<CounterRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let mut cmd = CounterOffer::new(offer_id, actor, req.price_per_unit);
    cmd.message = req.message;

    let offer = state.service.counter(cmd).await?;
    Ok(Json(OfferResponse::from(&offer)))
}

/// POST /offers/{id}/accept
#[tracing::instrument(skip(state))]
pub async fn accept<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let offer = state.service.accept(AcceptOffer::new(offer_id, actor)).await?;
    Ok(Json(OfferResponse::from(&offer)))
}

/// POST /offers/{id}/reject: the body with a message is optional.
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    req: Option<Json<RejectRequest>>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let mut cmd = RejectOffer::new(offer_id, actor);
    cmd.message = req.message;

    let offer = state.service.reject(cmd).await?;
    Ok(Json(OfferResponse::from(&offer)))
}

/// POST /offers/{id}/withdraw
#[tracing::instrument(skip(state))]
pub async fn withdraw<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let offer = state
        .service
        .withdraw(WithdrawOffer::new(offer_id, actor))
        .await?;
    Ok(Json(OfferResponse::from(&offer)))
}

/// GET /offers/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(viewer): Caller,
    Path(id): Path<String>,
) -> Result<Json<OfferResponse>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let offer = state.service.get_offer(offer_id, viewer).await?;
    Ok(Json(OfferResponse::from(&offer)))
}

/// GET /offers/{id}/history: the negotiation log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(viewer): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<OfferEventResponse>>, ApiError> {
    let offer_id = parse_id::<OfferId>("offer id", &id)?;
    let events = state.service.get_offer_history(offer_id, viewer).await?;
    Ok(Json(events.into_iter().map(OfferEventResponse::from).collect()))
}

/// GET /offers: the caller's offers, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(party): Caller,
    Query(params): Query<ListOffersParams>,
) -> Result<Json<Page<OfferResponse>>, ApiError> {
    let query = build_query(party, params)?;
    let page = state.service.list_my_offers(&query).await?;
    Ok(Json(page.map(|offer| OfferResponse::from(&offer))))
}

fn build_query(party: UserId, params: ListOffersParams) -> Result<OfferQuery, ApiError> {
    let mut query = OfferQuery::for_party(party).role(params.role.unwrap_or_default());

    if let Some(raw) = params.status.as_deref() {
        let statuses = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<OfferStatus>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        query = query.statuses(statuses);
    }
    if let Some(raw) = params.listing_id.as_deref() {
        query = query.listing_id(parse_id("listing_id", raw)?);
    }

    Ok(query.page(
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(OfferQuery::DEFAULT_PER_PAGE),
    ))
}

pub(crate) fn parse_id<T: std::str::FromStr>(what: &str, raw: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}
