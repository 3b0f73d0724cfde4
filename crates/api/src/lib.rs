//! HTTP API server for offer negotiation.
//!
//! Exposes the negotiation operations as REST endpoints, with structured
//! logging (tracing), Prometheus metrics, and per-caller rate limiting.

pub mod config;
pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use negotiation::{
    InMemoryCheckoutHandoff, InMemoryListingCatalog, InMemoryNotificationStore, NegotiationService,
};
use offer_store::OfferStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::offers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OfferStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let limited = Router::new()
        .route(
            "/offers",
            post(routes::offers::propose::<S>).get(routes::offers::list::<S>),
        )
        .route("/offers/{id}", get(routes::offers::get::<S>))
        .route("/offers/{id}/history", get(routes::offers::history::<S>))
        .route("/offers/{id}/counter", post(routes::offers::counter::<S>))
        .route("/offers/{id}/accept", post(routes::offers::accept::<S>))
        .route("/offers/{id}/reject", post(routes::offers::reject::<S>))
        .route("/offers/{id}/withdraw", post(routes::offers::withdraw::<S>))
        .route("/listings/{id}", put(routes::listings::put::<S>))
        .route_layer(axum::middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit::limit_by_caller,
        ));

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .merge(limited)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store` with in-memory collaborators.
pub fn create_state<S: OfferStore + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    let listings = InMemoryListingCatalog::new();
    let notifications = InMemoryNotificationStore::new();
    let checkout = InMemoryCheckoutHandoff::new();

    let service = NegotiationService::new(
        store,
        listings.clone(),
        notifications.clone(),
        checkout.clone(),
    )
    .with_config(config.negotiation());

    Arc::new(AppState {
        service: Arc::new(service),
        listings,
        notifications,
        checkout,
        limiter: Arc::new(rate_limit::caller_limiter(config.rate_limit_per_minute)),
    })
}
