//! Collaborator seams consumed by the engine, with shipped defaults.
//!
//! The engine never resolves a price, discount, tax amount, shipping rate,
//! or schedule date itself: it asks a collaborator. Each collaborator is a
//! trait, and each trait ships with a reference implementation so the crate
//! computes end-to-end out of the box:
//!
//! | Seam | Default |
//! |------|---------|
//! | [`PriceResolver`] | [`StandardPriceResolver`] |
//! | [`DiscountEngine`] | [`NoDiscounts`] |
//! | [`TaxEngine`] | [`FlatTax`] |
//! | [`ShippingEstimator`] | [`PerItemShipping`] |
//! | [`SchedulePlanner`] | [`CalendarSchedulePlanner`] |
//! | [`FeePolicy`] | [`DefaultFeePolicy`] |
//!
//! Collaborators are functions of `(item, mode)`: they receive the active
//! [`CalculationMode`] explicitly instead of reaching into ambient global
//! state, which is what makes multi-pass invocation safe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::calculator::CartView;
use crate::cart::{Cart, CartFee, LineItem};
use crate::context::CalculationMode;
use crate::error::{CartCalcError, Result};
use crate::schedule::{align_to_anchor_day, validate_schedule};
use crate::shipping::ShippingPackage;

// ============================================================================
// Price Resolution
// ============================================================================

/// Resolves the per-unit price of a line item under a calculation mode.
pub trait PriceResolver {
    /// Per-unit price of `item` when the active mode is `mode`.
    fn price_for(&self, item: &LineItem, mode: CalculationMode) -> Decimal;
}

/// The canonical per-mode price view for subscription commerce.
///
/// | Mode | Subscription item | One-off item |
/// |------|-------------------|--------------|
/// | `none` | sign-up fee, plus recurring price unless trialing | price |
/// | `combined_total` | sign-up fee + recurring price | price |
/// | `sign_up_fee_total` | sign-up fee only | 0 |
/// | `recurring_total` | recurring price | 0 |
/// | `free_trial_total` | 0 while trialing, else recurring price | price |
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPriceResolver;

impl PriceResolver for StandardPriceResolver {
    fn price_for(&self, item: &LineItem, mode: CalculationMode) -> Decimal {
        let Some(terms) = item.subscription.as_ref() else {
            return match mode {
                CalculationMode::RecurringTotal | CalculationMode::SignUpFeeTotal => Decimal::ZERO,
                _ => item.price,
            };
        };
        match mode {
            CalculationMode::None => {
                if terms.schedule.has_trial() {
                    terms.sign_up_fee
                } else {
                    terms.sign_up_fee + item.price
                }
            }
            CalculationMode::CombinedTotal => terms.sign_up_fee + item.price,
            CalculationMode::SignUpFeeTotal => terms.sign_up_fee,
            CalculationMode::RecurringTotal => item.price,
            CalculationMode::FreeTrialTotal => {
                if terms.schedule.has_trial() {
                    Decimal::ZERO
                } else {
                    item.price
                }
            }
        }
    }
}

// ============================================================================
// Discounts
// ============================================================================

/// Computes the discount total for one cart view.
///
/// Implementations consult the mode to decide whether a coupon applies to
/// the current pass. A recurring-percent coupon, for instance, applies
/// under `recurring_total` but not under `none` unless the cart is
/// trial-only.
pub trait DiscountEngine {
    /// Total discount for the view, before clamping against the items
    /// subtotal.
    ///
    /// # Errors
    ///
    /// Returns error if an applied coupon cannot be resolved.
    fn discount_for(&self, view: &CartView<'_>, mode: CalculationMode) -> Result<Decimal>;
}

/// Discount engine that applies nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscounts;

impl DiscountEngine for NoDiscounts {
    fn discount_for(&self, _view: &CartView<'_>, _mode: CalculationMode) -> Result<Decimal> {
        Ok(Decimal::ZERO)
    }
}

// ============================================================================
// Tax
// ============================================================================

/// Produces tax totals for one cart view. Consumed as opaque totals.
pub trait TaxEngine {
    /// Tax on the view's items given the post-discount taxable amount.
    ///
    /// # Errors
    ///
    /// Returns error if tax rates cannot be resolved.
    fn item_tax(
        &self,
        view: &CartView<'_>,
        taxable_amount: Decimal,
        mode: CalculationMode,
    ) -> Result<Decimal>;

    /// Tax on the view's shipping total.
    ///
    /// # Errors
    ///
    /// Returns error if tax rates cannot be resolved.
    fn shipping_tax(
        &self,
        view: &CartView<'_>,
        shipping_total: Decimal,
        mode: CalculationMode,
    ) -> Result<Decimal>;
}

/// Single-rate tax engine applying the same rate to items and shipping.
#[derive(Debug, Clone, Copy)]
pub struct FlatTax {
    /// Tax rate as a fraction (0.20 = 20%).
    pub rate: Decimal,
}

impl FlatTax {
    /// Creates a flat tax engine with the given fractional rate.
    #[must_use]
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    /// A tax engine that charges no tax.
    #[must_use]
    pub fn none() -> Self {
        Self { rate: Decimal::ZERO }
    }
}

impl TaxEngine for FlatTax {
    fn item_tax(
        &self,
        _view: &CartView<'_>,
        taxable_amount: Decimal,
        _mode: CalculationMode,
    ) -> Result<Decimal> {
        taxable_amount
            .checked_mul(self.rate)
            .ok_or_else(|| CartCalcError::AmountOverflow("item tax".to_owned()))
    }

    fn shipping_tax(
        &self,
        _view: &CartView<'_>,
        shipping_total: Decimal,
        _mode: CalculationMode,
    ) -> Result<Decimal> {
        shipping_total
            .checked_mul(self.rate)
            .ok_or_else(|| CartCalcError::AmountOverflow("shipping tax".to_owned()))
    }
}

// ============================================================================
// Shipping
// ============================================================================

/// Splits a cart into shipping packages and prices them.
///
/// The engine only *reshapes* packages (dropping trial or one-time-shipping
/// contents per pass); it never prices them.
pub trait ShippingEstimator {
    /// Splits the cart's shippable items into packages. This is the master
    /// packaging the synthesizer transforms per pass.
    fn packages_for(&self, cart: &Cart) -> Vec<ShippingPackage>;

    /// The chosen rate for one (already synthesized) package.
    ///
    /// # Errors
    ///
    /// Returns error if no rate can be resolved for the package.
    fn rate_for(&self, package: &ShippingPackage, cart: &Cart) -> Result<Decimal>;
}

/// Flat-rate shipping: one package for the whole cart, a fixed rate per
/// shippable line in the package.
#[derive(Debug, Clone, Copy)]
pub struct PerItemShipping {
    /// Rate charged per shippable line.
    pub rate_per_line: Decimal,
}

impl PerItemShipping {
    /// Creates a per-line flat-rate estimator.
    #[must_use]
    pub fn new(rate_per_line: Decimal) -> Self {
        Self { rate_per_line }
    }
}

impl ShippingEstimator for PerItemShipping {
    fn packages_for(&self, cart: &Cart) -> Vec<ShippingPackage> {
        let contents: Vec<usize> = cart
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.needs_shipping)
            .map(|(index, _)| index)
            .collect();
        if contents.is_empty() {
            return Vec::new();
        }
        vec![ShippingPackage::initial(0, contents, cart)]
    }

    fn rate_for(&self, package: &ShippingPackage, _cart: &Cart) -> Result<Decimal> {
        Decimal::from(package.contents.len())
            .checked_mul(self.rate_per_line)
            .ok_or_else(|| CartCalcError::AmountOverflow("shipping rate".to_owned()))
    }
}

// ============================================================================
// Schedule Planning
// ============================================================================

/// Derives subscription schedule dates, including billing-day
/// synchronization adjustments.
pub trait SchedulePlanner {
    /// When the item's trial ends, `None` for no trial or one-off items.
    ///
    /// # Errors
    ///
    /// Returns error if the item's schedule data is unusable.
    fn trial_end(&self, item: &LineItem, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;

    /// The item's next payment date after `start`.
    ///
    /// # Errors
    ///
    /// Returns error if the item's schedule data is unusable.
    fn next_payment(&self, item: &LineItem, start: DateTime<Utc>)
        -> Result<Option<DateTime<Utc>>>;

    /// When the subscription expires, `None` for open-ended schedules.
    ///
    /// # Errors
    ///
    /// Returns error if the item's schedule data is unusable.
    fn end_date(&self, item: &LineItem, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;

    /// The synchronized first-renewal instant feeding the grouping key.
    /// `Some` only for items synchronized to a billing anchor.
    fn first_renewal(&self, item: &LineItem, start: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Calendar-arithmetic schedule planner.
///
/// Advances dates with [`chrono`] month/year arithmetic and aligns
/// synchronized items to their day-of-month anchor (clamped to 28).
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarSchedulePlanner;

impl CalendarSchedulePlanner {
    fn validated_terms<'a>(
        item: &'a LineItem,
    ) -> Result<Option<&'a crate::cart::SubscriptionTerms>> {
        let Some(terms) = item.subscription.as_ref() else {
            return Ok(None);
        };
        validate_schedule(item.id.as_str(), &terms.schedule)?;
        Ok(Some(terms))
    }
}

impl SchedulePlanner for CalendarSchedulePlanner {
    fn trial_end(&self, item: &LineItem, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(Self::validated_terms(item)?.and_then(|terms| terms.schedule.trial_end(start)))
    }

    fn next_payment(
        &self,
        item: &LineItem,
        start: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(terms) = Self::validated_terms(item)? else {
            return Ok(None);
        };
        let renewal = terms.schedule.first_renewal(start);
        Ok(Some(match terms.sync_anchor_day {
            Some(anchor_day) => align_to_anchor_day(renewal, anchor_day),
            None => renewal,
        }))
    }

    fn end_date(&self, item: &LineItem, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(Self::validated_terms(item)?.and_then(|terms| terms.schedule.end_date(start)))
    }

    fn first_renewal(&self, item: &LineItem, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let terms = item.subscription.as_ref()?;
        let anchor_day = terms.sync_anchor_day?;
        Some(align_to_anchor_day(terms.schedule.first_renewal(start), anchor_day))
    }
}

// ============================================================================
// Fee Policy
// ============================================================================

/// Store policy hook over fee and shipping decisions.
///
/// The engine computes a default decision from the cart's contents and
/// hands it to the policy, which may override it.
pub trait FeePolicy {
    /// Whether the initial cart's fees should be suppressed.
    ///
    /// `default_decision` is `true` when the cart's total sign-up fee is
    /// zero and every subscription item has a trial period.
    fn suppress_initial_fees(&self, _cart: &Cart, default_decision: bool) -> bool {
        default_decision
    }

    /// Whether shipping should be charged with the initial order.
    ///
    /// `default_decision` is `false` when the cart contains a subscription
    /// with a free trial and no other item needs immediate shipping.
    fn charge_shipping_up_front(&self, _cart: &Cart, default_decision: bool) -> bool {
        default_decision
    }

    /// Whether a fee recurs with every renewal (and is therefore re-applied
    /// to each cohort cart).
    fn is_recurring_fee(&self, fee: &CartFee) -> bool {
        fee.recurring
    }
}

/// Fee policy that accepts every default decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFeePolicy;

impl FeePolicy for DefaultFeePolicy {}

// ============================================================================
// Test collaborators
// ============================================================================

/// Configurable collaborators for exercising failure and discount paths.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use crate::cart::ItemId;

    /// Schedule planner that fails for a configured set of items and
    /// otherwise defers to [`CalendarSchedulePlanner`].
    #[derive(Debug, Clone, Default)]
    pub struct FailingPlanner {
        /// Items whose schedule lookups fail.
        pub failing: Vec<ItemId>,
    }

    impl FailingPlanner {
        /// Creates a planner that fails for the given item IDs.
        #[must_use]
        pub fn failing_for(failing: Vec<ItemId>) -> Self {
            Self { failing }
        }

        fn check(&self, item: &LineItem) -> Result<()> {
            if self.failing.contains(&item.id) {
                return Err(CartCalcError::ScheduleUnavailable {
                    item_id: item.id.as_str().to_owned(),
                    reason: "simulated schedule failure".to_owned(),
                });
            }
            Ok(())
        }
    }

    impl SchedulePlanner for FailingPlanner {
        fn trial_end(
            &self,
            item: &LineItem,
            start: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>> {
            self.check(item)?;
            CalendarSchedulePlanner.trial_end(item, start)
        }

        fn next_payment(
            &self,
            item: &LineItem,
            start: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>> {
            self.check(item)?;
            CalendarSchedulePlanner.next_payment(item, start)
        }

        fn end_date(&self, item: &LineItem, start: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
            self.check(item)?;
            CalendarSchedulePlanner.end_date(item, start)
        }

        fn first_renewal(&self, item: &LineItem, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
            CalendarSchedulePlanner.first_renewal(item, start)
        }
    }

    /// Discount engine applying a fixed amount on every pass.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedDiscount {
        /// Discount applied to every view.
        pub amount: Decimal,
    }

    impl DiscountEngine for FixedDiscount {
        fn discount_for(&self, _view: &CartView<'_>, _mode: CalculationMode) -> Result<Decimal> {
            Ok(self.amount)
        }
    }
}
