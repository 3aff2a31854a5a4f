//! The totals calculator seam and its reference implementation.
//!
//! The engine invokes one [`TotalsCalculator`] for every pass: once for the
//! initial cart and once per cohort. The calculator receives a borrowed
//! [`CartView`] (the member items, the fees and coupons in force for this
//! pass, and the already-synthesized shipping packages) plus the shared
//! [`CalculationContext`], whose mode tells the price and discount
//! resolvers which view of each item to use.
//!
//! [`StandardTotalsCalculator`] is the shipped pipeline: items, discounts,
//! shipping, tax, fees, in that order, rounded once at the end. Hosts with
//! their own cart calculator implement [`TotalsCalculator`] instead and the
//! engine never knows the difference.

use rust_decimal::Decimal;
use tracing::debug;

use crate::cart::{Cart, CartFee, CartTotals, LineItem};
use crate::context::{CalculationContext, CalculationMode};
use crate::error::{CartCalcError, Result};
use crate::money::{clamp_non_negative, round_to_precision, Currency};
use crate::resolver::{DiscountEngine, PriceResolver, ShippingEstimator, TaxEngine};
use crate::shipping::ShippingPackage;

/// Borrowed view of the cart for one calculation pass.
///
/// For the initial pass `members` covers every item; for a cohort pass it
/// covers the cohort's member indices only.
#[derive(Debug, Clone, Copy)]
pub struct CartView<'a> {
    /// The master cart (the item arena).
    pub cart: &'a Cart,
    /// Arena indices of the items in this pass.
    pub members: &'a [usize],
    /// Fees in force for this pass.
    pub fees: &'a [CartFee],
    /// Coupon codes in force for this pass.
    pub coupons: &'a [String],
    /// Shipping packages already synthesized for this pass.
    pub packages: &'a [ShippingPackage],
}

impl<'a> CartView<'a> {
    /// Iterates the items in this pass.
    pub fn items(&self) -> impl Iterator<Item = &'a LineItem> + 'a {
        let cart = self.cart;
        self.members.iter().filter_map(move |&index| cart.items.get(index))
    }

    /// The cart's currency.
    #[must_use]
    pub fn currency(&self) -> &'a Currency {
        &self.cart.currency
    }
}

/// Computes the totals of one cart view under the active calculation mode.
pub trait TotalsCalculator {
    /// Calculates the view's totals.
    ///
    /// Implementations read the active mode from `ctx` so that price and
    /// discount resolution match the pass being computed.
    ///
    /// # Errors
    ///
    /// Returns error if any collaborator fails; the engine propagates this
    /// to the caller rather than totaling a partial snapshot.
    fn calculate(&self, view: &CartView<'_>, ctx: &CalculationContext) -> Result<CartTotals>;
}

/// The shipped totals pipeline.
///
/// Composes the four resolving collaborators into an explicit sequence:
/// item prices (per mode), discounts (clamped to the items subtotal),
/// shipping (skipped entirely for the fee-only and free-trial views),
/// taxes, then fees. The grand total is rounded to currency precision and
/// clamped to zero or above: a discount may legitimately exceed the
/// subtotal, but a cart never charges a negative amount.
#[derive(Debug, Clone)]
pub struct StandardTotalsCalculator<P, D, T, S> {
    prices: P,
    discounts: D,
    taxes: T,
    shipping: S,
}

impl<P, D, T, S> StandardTotalsCalculator<P, D, T, S>
where
    P: PriceResolver,
    D: DiscountEngine,
    T: TaxEngine,
    S: ShippingEstimator,
{
    /// Creates a calculator from its four collaborators.
    #[must_use]
    pub fn new(prices: P, discounts: D, taxes: T, shipping: S) -> Self {
        Self { prices, discounts, taxes, shipping }
    }

    fn items_subtotal(&self, view: &CartView<'_>, mode: CalculationMode) -> Result<Decimal> {
        let mut subtotal = Decimal::ZERO;
        for item in view.items() {
            let line = self
                .prices
                .price_for(item, mode)
                .checked_mul(Decimal::from(item.quantity))
                .ok_or_else(|| CartCalcError::AmountOverflow("items subtotal".to_owned()))?;
            subtotal = subtotal
                .checked_add(line)
                .ok_or_else(|| CartCalcError::AmountOverflow("items subtotal".to_owned()))?;
        }
        Ok(subtotal)
    }

    fn shipping_total(&self, view: &CartView<'_>, mode: CalculationMode) -> Result<Decimal> {
        // Fee-only and free-trial views never charge shipping.
        if matches!(
            mode,
            CalculationMode::SignUpFeeTotal | CalculationMode::FreeTrialTotal
        ) {
            return Ok(Decimal::ZERO);
        }
        let mut total = Decimal::ZERO;
        for package in view.packages {
            let rate = self.shipping.rate_for(package, view.cart)?;
            total = total
                .checked_add(rate)
                .ok_or_else(|| CartCalcError::AmountOverflow("shipping total".to_owned()))?;
        }
        Ok(total)
    }
}

impl<P, D, T, S> TotalsCalculator for StandardTotalsCalculator<P, D, T, S>
where
    P: PriceResolver,
    D: DiscountEngine,
    T: TaxEngine,
    S: ShippingEstimator,
{
    fn calculate(&self, view: &CartView<'_>, ctx: &CalculationContext) -> Result<CartTotals> {
        let mode = ctx.mode();

        let items_subtotal = self.items_subtotal(view, mode)?;
        let discount_total = self
            .discounts
            .discount_for(view, mode)?
            .max(Decimal::ZERO)
            .min(items_subtotal.max(Decimal::ZERO));
        let taxable = items_subtotal - discount_total;

        let shipping_total = self.shipping_total(view, mode)?;
        let tax_total = self.taxes.item_tax(view, taxable, mode)?;
        let shipping_tax_total = if shipping_total.is_zero() {
            Decimal::ZERO
        } else {
            self.taxes.shipping_tax(view, shipping_total, mode)?
        };
        let fee_total: Decimal = view.fees.iter().map(|fee| fee.amount).sum();

        let raw_total = taxable + tax_total + shipping_tax_total + shipping_total + fee_total;
        let total = clamp_non_negative(round_to_precision(raw_total, view.currency()));

        debug!(
            mode = %mode,
            items = %items_subtotal,
            discount = %discount_total,
            shipping = %shipping_total,
            total = %total,
            "pass calculated"
        );

        Ok(CartTotals {
            items_subtotal,
            discount_total,
            tax_total,
            shipping_total,
            shipping_tax_total,
            fee_total,
            total,
        })
    }
}
