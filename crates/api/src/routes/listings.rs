//! Registration of listings in the local catalog.
//!
//! The server runs with an in-memory catalog; sellers register a listing
//! here before buyers can make offers on it.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ListingId;
use domain::{Listing, ListingStatus, UnitPrice};
use negotiation::ListingCatalog;
use offer_store::OfferStore;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::offers::{AppState, parse_id};
use crate::error::ApiError;
use crate::extract::Caller;

#[derive(Deserialize)]
pub struct ListingRequest {
    pub title: String,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default = "default_allow_offers")]
    pub allow_offers: bool,
    pub floor_price: Option<Decimal>,
}

fn default_allow_offers() -> bool {
    true
}

/// PUT /listings/{id}: create or replace a listing owned by the caller.
#[tracing::instrument(skip(state, req))]
pub async fn put<S: OfferStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(seller): Caller,
    Path(id): Path<String>,
    Json(req): Json<ListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    let listing_id = parse_id::<ListingId>("listing id", &id)?;

    let existing = state
        .listings
        .get_listing(listing_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Some(existing) = existing
        && existing.seller_id != seller
    {
        return Err(ApiError::Forbidden(
            "listing belongs to another seller".to_string(),
        ));
    }

    let mut listing = Listing::new(listing_id, seller, req.title)
        .with_status(req.status)
        .with_offers_allowed(req.allow_offers);
    if let Some(floor) = req.floor_price {
        let floor = UnitPrice::new(floor).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        listing = listing.with_floor_price(floor);
    }

    state.listings.insert(listing.clone()).await;
    tracing::info!(%listing_id, %seller, "listing registered");
    Ok(Json(listing))
}
