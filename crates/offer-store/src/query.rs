use common::{ListingId, UserId};
use domain::OfferStatus;
use serde::{Deserialize, Serialize};

/// Which side of the negotiation the caller wants to see offers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    /// Offers the user made.
    Buyer,

    /// Offers made on the user's listings.
    Seller,

    /// Both.
    #[default]
    Any,
}

impl PartyRole {
    /// Returns true if `user` holds this role on the given parties.
    pub fn matches(&self, user: UserId, buyer_id: UserId, seller_id: UserId) -> bool {
        match self {
            PartyRole::Buyer => buyer_id == user,
            PartyRole::Seller => seller_id == user,
            PartyRole::Any => buyer_id == user || seller_id == user,
        }
    }
}

/// Builder for "my offers" listings.
///
/// Results are ordered newest first and paginated with 1-based pages.
#[derive(Debug, Clone)]
pub struct OfferQuery {
    /// The user whose offers are listed.
    pub party: UserId,
    pub role: PartyRole,

    /// Keep only these statuses; empty means all.
    pub statuses: Vec<OfferStatus>,
    pub listing_id: Option<ListingId>,
    pub page: u32,
    pub per_page: u32,
}

impl OfferQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Creates a query for all offers the user is a party to.
    pub fn for_party(party: UserId) -> Self {
        Self {
            party,
            role: PartyRole::Any,
            statuses: Vec::new(),
            listing_id: None,
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }

    /// Filters by the user's role.
    pub fn role(mut self, role: PartyRole) -> Self {
        self.role = role;
        self
    }

    /// Filters by a single status.
    pub fn status(mut self, status: OfferStatus) -> Self {
        self.statuses = vec![status];
        self
    }

    /// Filters by any of several statuses.
    pub fn statuses(mut self, statuses: Vec<OfferStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Filters by listing.
    pub fn listing_id(mut self, listing_id: ListingId) -> Self {
        self.listing_id = Some(listing_id);
        self
    }

    /// Selects a page; values are clamped to sane bounds.
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.clamp(1, Self::MAX_PER_PAGE);
        self
    }

    /// Number of rows to return.
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Returns true if an offer with these fields belongs in the results.
    pub fn matches(
        &self,
        buyer_id: UserId,
        seller_id: UserId,
        listing_id: ListingId,
        status: OfferStatus,
    ) -> bool {
        if !self.role.matches(self.party, buyer_id, seller_id) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&status) {
            return false;
        }
        if let Some(id) = self.listing_id
            && id != listing_id
        {
            return false;
        }
        true
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Maps the items, keeping the paging info.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}
