//! Monetary helpers shared across the engine.
//!
//! All amounts in this crate are [`rust_decimal::Decimal`] values in major
//! currency units. Rounding happens once, at total finalization, to the
//! currency's minor-unit precision using half-up rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Currency descriptor for a cart.
///
/// Only the pieces the engine needs: the ISO 4217 code for display and the
/// minor-unit precision for final rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// ISO 4217 currency code, lowercase (e.g. "usd", "eur", "jpy").
    pub code: String,
    /// Number of minor-unit decimal places (2 for usd, 0 for jpy).
    pub precision: u32,
}

impl Currency {
    /// Creates a currency descriptor.
    #[must_use]
    pub fn new<S: Into<String>>(code: S, precision: u32) -> Self {
        Self { code: code.into().to_lowercase(), precision }
    }

    /// US dollars, two decimal places. The default for tests and examples.
    #[must_use]
    pub fn usd() -> Self {
        Self::new("usd", 2)
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

/// Rounds an amount to the currency's minor-unit precision, half-up.
#[must_use]
pub fn round_to_precision(amount: Decimal, currency: &Currency) -> Decimal {
    amount.round_dp_with_strategy(currency.precision, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamps a legitimately negative subtotal (discounts exceeding items) to
/// zero. Never used to mask arithmetic errors, which surface as
/// [`crate::error::CartCalcError::AmountOverflow`] instead.
#[must_use]
pub fn clamp_non_negative(amount: Decimal) -> Decimal {
    amount.max(Decimal::ZERO)
}
