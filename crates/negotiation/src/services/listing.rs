//! Listing catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ListingId;
use domain::Listing;
use tokio::sync::RwLock;

use super::CollaboratorError;

/// Read access to the marketplace catalog.
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// Looks up a listing; None if the catalog has never heard of it.
    async fn get_listing(&self, listing_id: ListingId)
    -> Result<Option<Listing>, CollaboratorError>;
}

#[derive(Debug, Default)]
struct CatalogState {
    listings: HashMap<ListingId, Listing>,
    unavailable: bool,
}

/// In-memory catalog for the binary and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryListingCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryListingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a listing.
    pub async fn insert(&self, listing: Listing) {
        self.state
            .write()
            .await
            .listings
            .insert(listing.listing_id, listing);
    }

    /// Makes every lookup fail.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn listing_count(&self) -> usize {
        self.state.read().await.listings.len()
    }
}

#[async_trait]
impl ListingCatalog for InMemoryListingCatalog {
    async fn get_listing(
        &self,
        listing_id: ListingId,
    ) -> Result<Option<Listing>, CollaboratorError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(CollaboratorError::new("listing catalog", "catalog offline"));
        }
        Ok(state.listings.get(&listing_id).cloned())
    }
}
