//! Value objects for the offer domain.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::OfferError;

/// Longest free-text message accepted on a proposal, counter, or rejection.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// A monetary amount rounded to cents.
///
/// Every `Money` value is produced by [`Money::round_half_up`], so totals on
/// the offer and on each logged event are computed by the same rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Number of decimal places every amount carries.
    pub const SCALE: u32 = 2;

    /// Rounds an exact amount to cents, midpoints away from zero.
    pub fn round_half_up(amount: Decimal) -> Self {
        let mut rounded =
            amount.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Self(rounded)
    }

    /// Creates an amount from a whole number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, Self::SCALE))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self::from_cents(0)
    }

    /// Returns the amount as a decimal with two places.
    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_sign_negative() {
            write!(f, "-${:.2}", self.0.abs())
        } else {
            write!(f, "${:.2}", self.0)
        }
    }
}

/// A strictly positive price for one unit of a listing.
///
/// Unit prices keep whatever precision the caller supplied; only totals are
/// rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct UnitPrice(Decimal);

impl UnitPrice {
    /// Creates a unit price, rejecting zero and negative amounts.
    pub fn new(amount: Decimal) -> Result<Self, OfferError> {
        if amount <= Decimal::ZERO {
            return Err(OfferError::InvalidPrice { price: amount });
        }
        Ok(Self(amount))
    }

    /// Returns the price as a decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for UnitPrice {
    type Error = OfferError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<UnitPrice> for Decimal {
    fn from(price: UnitPrice) -> Self {
        price.0
    }
}

impl std::fmt::Display for UnitPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.scale() <= Money::SCALE {
            write!(f, "${:.2}", self.0)
        } else {
            write!(f, "${}", self.0.normalize())
        }
    }
}

/// Number of units an offer covers (at least one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Creates a quantity, rejecting zero.
    pub fn new(units: u32) -> Result<Self, OfferError> {
        if units == 0 {
            return Err(OfferError::InvalidQuantity { quantity: units });
        }
        Ok(Self(units))
    }

    /// Returns the number of units.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = OfferError;

    fn try_from(units: u32) -> Result<Self, Self::Error> {
        Self::new(units)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Computes `round_half_up(price × quantity, 2)`.
///
/// This is the only place a total is ever derived.
pub fn total_price(price: UnitPrice, quantity: Quantity) -> Result<Money, OfferError> {
    price
        .amount()
        .checked_mul(Decimal::from(quantity.get()))
        .map(Money::round_half_up)
        .ok_or(OfferError::AmountOverflow)
}

/// Trims a free-text message; blank messages become `None`.
pub fn normalize_message(message: Option<String>) -> Result<Option<String>, OfferError> {
    let Some(message) = message else {
        return Ok(None);
    };
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(OfferError::MessageTooLong {
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(Some(trimmed.to_string()))
}
