//! Master cart data model.
//!
//! The [`Cart`] is the arena the whole engine works over: line items live
//! in a stable vector, and every derived view (cohort carts, shipping
//! packages) refers back to items by index instead of cloning them.
//!
//! After a calculation cycle the cart also carries the cycle's outputs:
//! the recurring cohort carts in stable order, the per-cohort shipping
//! packages, and any cohorts that were skipped because their schedule data
//! was unusable.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cohort::{CohortCart, CohortFailure};
use crate::error::{CartCalcError, Result};
use crate::grouping::GroupingKey;
use crate::money::Currency;
use crate::schedule::BillingSchedule;
use crate::shipping::{RecurringPackageCache, ShippingPackage};

/// Unique identifier for a cart line item.
///
/// Wraps the host platform's cart item key with type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new item ID after validation.
    ///
    /// # Errors
    ///
    /// Returns error if the ID is empty, exceeds 64 characters, or contains
    /// characters other than alphanumerics, hyphens, and underscores.
    pub fn new<S: Into<String>>(id: S) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CartCalcError::InvalidItemId("item id cannot be empty".to_owned()));
        }
        if id.len() > 64 {
            return Err(CartCalcError::InvalidItemId(
                "item id must be 64 characters or less".to_owned(),
            ));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CartCalcError::InvalidItemId(
                "item id can only contain alphanumeric characters, hyphens, and underscores"
                    .to_owned(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription terms attached to a line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionTerms {
    /// When the item bills.
    pub schedule: BillingSchedule,
    /// One-time fee charged with the initial order, per unit.
    pub sign_up_fee: Decimal,
    /// Day of month renewals are synchronized to, if the store bills this
    /// product on a fixed calendar day shared by all customers.
    pub sync_anchor_day: Option<u32>,
}

impl SubscriptionTerms {
    /// Creates terms with no sign-up fee and no synchronization.
    #[must_use]
    pub fn new(schedule: BillingSchedule) -> Self {
        Self { schedule, sign_up_fee: Decimal::ZERO, sync_anchor_day: None }
    }

    /// Returns a copy with the given per-unit sign-up fee.
    #[must_use]
    pub fn with_sign_up_fee(mut self, fee: Decimal) -> Self {
        self.sign_up_fee = fee;
        self
    }

    /// Returns a copy synchronized to the given day of month.
    #[must_use]
    pub fn synchronized_to(mut self, anchor_day: u32) -> Self {
        self.sync_anchor_day = Some(anchor_day);
        self
    }
}

/// A single line in the master cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Cart item identifier.
    pub id: ItemId,
    /// Product identifier (display/projection only).
    pub product_id: String,
    /// Display name.
    pub name: String,
    /// Quantity in the cart.
    pub quantity: u32,
    /// Per-unit price. For subscription items this is the recurring price;
    /// the sign-up fee lives on [`SubscriptionTerms`].
    pub price: Decimal,
    /// Subscription terms, `None` for one-off products.
    pub subscription: Option<SubscriptionTerms>,
    /// Whether this item requires shipping at all.
    pub needs_shipping: bool,
    /// Whether this item ships with the first order only, never with
    /// renewals.
    pub one_time_shipping: bool,
}

impl LineItem {
    /// Creates a one-off (non-subscription) line item.
    ///
    /// # Errors
    ///
    /// Returns error if `id` fails [`ItemId`] validation.
    pub fn one_off<S: Into<String>>(id: S, price: Decimal, quantity: u32) -> Result<Self> {
        let id = ItemId::new(id)?;
        Ok(Self {
            product_id: id.as_str().to_owned(),
            name: id.as_str().to_owned(),
            id,
            quantity,
            price,
            subscription: None,
            needs_shipping: false,
            one_time_shipping: false,
        })
    }

    /// Creates a subscription line item.
    ///
    /// # Errors
    ///
    /// Returns error if `id` fails [`ItemId`] validation.
    pub fn subscription<S: Into<String>>(
        id: S,
        price: Decimal,
        quantity: u32,
        terms: SubscriptionTerms,
    ) -> Result<Self> {
        let mut item = Self::one_off(id, price, quantity)?;
        item.subscription = Some(terms);
        Ok(item)
    }

    /// Returns a copy that requires shipping.
    #[must_use]
    pub fn shippable(mut self) -> Self {
        self.needs_shipping = true;
        self
    }

    /// Returns a copy that ships with the initial order only.
    #[must_use]
    pub fn with_one_time_shipping(mut self) -> Self {
        self.needs_shipping = true;
        self.one_time_shipping = true;
        self
    }

    /// Whether this item is a subscription.
    #[must_use]
    pub fn is_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether this item is a subscription with a free trial.
    #[must_use]
    pub fn has_free_trial(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|terms| terms.schedule.has_trial())
    }

    /// Recurring (or one-off) line total: price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Sign-up fee line total: fee × quantity, zero for one-off items.
    #[must_use]
    pub fn sign_up_fee_total(&self) -> Decimal {
        self.subscription
            .as_ref()
            .map_or(Decimal::ZERO, |terms| terms.sign_up_fee * Decimal::from(self.quantity))
    }
}

/// A fee applied to the cart (e.g. a handling or setup surcharge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartFee {
    /// Fee identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Fee amount.
    pub amount: Decimal,
    /// Whether this fee recurs with every renewal. Non-recurring fees are
    /// charged with the initial order only and never carry into cohort
    /// carts.
    pub recurring: bool,
}

impl CartFee {
    /// Creates a non-recurring fee.
    #[must_use]
    pub fn new<S: Into<String>>(id: S, amount: Decimal) -> Self {
        let id = id.into();
        Self { name: id.clone(), id, amount, recurring: false }
    }

    /// Returns a copy flagged as recurring.
    #[must_use]
    pub fn recurring(mut self) -> Self {
        self.recurring = true;
        self
    }
}

/// Computed totals for one cart view (the initial cart or one cohort).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Sum of line totals before discounts.
    pub items_subtotal: Decimal,
    /// Total discount applied to items.
    pub discount_total: Decimal,
    /// Tax on items (excluding shipping tax).
    pub tax_total: Decimal,
    /// Shipping cost.
    pub shipping_total: Decimal,
    /// Tax on shipping.
    pub shipping_tax_total: Decimal,
    /// Sum of applied fees.
    pub fee_total: Decimal,
    /// Grand total, rounded to currency precision, never negative.
    pub total: Decimal,
}

/// The master shopping cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    /// Currency all amounts are denominated in.
    pub currency: Currency,
    /// Line items, in the order they were added. Derived views refer to
    /// items by index into this vector.
    pub items: Vec<LineItem>,
    /// Applied coupon codes.
    pub coupons: Vec<String>,
    /// Applied fees.
    pub fees: Vec<CartFee>,
    /// Totals of the most recent calculation (the initial checkout charge).
    pub totals: CartTotals,

    pub(crate) recurring_carts: Vec<CohortCart>,
    pub(crate) recurring_shipping: RecurringPackageCache,
    pub(crate) cohort_failures: Vec<CohortFailure>,
    pub(crate) shipping_packages: Vec<ShippingPackage>,
}

impl Cart {
    /// Creates an empty cart in the given currency.
    #[must_use]
    pub fn new(currency: Currency) -> Self {
        Self { currency, ..Self::default() }
    }

    /// Appends a line item and returns its index in the item arena.
    pub fn add_item(&mut self, item: LineItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Appends a fee.
    pub fn add_fee(&mut self, fee: CartFee) {
        self.fees.push(fee);
    }

    // ========================================================================
    // Cart queries
    // ========================================================================

    /// Iterates subscription items with their arena indices.
    pub fn subscription_items(&self) -> impl Iterator<Item = (usize, &LineItem)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_subscription())
    }

    /// Whether any item in the cart is a subscription.
    #[must_use]
    pub fn contains_subscription(&self) -> bool {
        self.items.iter().any(LineItem::is_subscription)
    }

    /// Whether any item in the cart is a subscription with a free trial.
    #[must_use]
    pub fn contains_free_trial(&self) -> bool {
        self.items.iter().any(LineItem::has_free_trial)
    }

    /// Sum of sign-up fee line totals across the cart.
    #[must_use]
    pub fn sign_up_fee_total(&self) -> Decimal {
        self.items.iter().map(LineItem::sign_up_fee_total).sum()
    }

    /// Whether the cart contains subscriptions and every one of them is on
    /// a free trial. Carts with no subscription items return `false`.
    #[must_use]
    pub fn all_subscription_items_trialing(&self) -> bool {
        let mut any = false;
        for (_, item) in self.subscription_items() {
            any = true;
            if !item.has_free_trial() {
                return false;
            }
        }
        any
    }

    /// Whether anything in the cart must ship with the initial order: a
    /// one-off item that needs shipping, or a subscription that is not on a
    /// free trial.
    #[must_use]
    pub fn needs_immediate_shipping(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.needs_shipping && !item.has_free_trial())
    }

    /// Grand total of the most recent calculation.
    #[must_use]
    pub fn grand_total(&self) -> Decimal {
        self.totals.total
    }

    // ========================================================================
    // Cycle outputs
    // ========================================================================

    /// The recurring cohort carts produced by the last calculation cycle,
    /// in the order their cohorts were first encountered in the cart.
    #[must_use]
    pub fn recurring_carts(&self) -> &[CohortCart] {
        &self.recurring_carts
    }

    /// Looks up one cohort cart by grouping key.
    #[must_use]
    pub fn recurring_cart(&self, key: &GroupingKey) -> Option<&CohortCart> {
        self.recurring_carts.iter().find(|cohort| &cohort.key == key)
    }

    /// The per-cohort shipping packages cached by the last cycle.
    #[must_use]
    pub fn recurring_shipping_packages(&self) -> &RecurringPackageCache {
        &self.recurring_shipping
    }

    /// The initial cart's shipping packages after trial items were
    /// excluded.
    #[must_use]
    pub fn initial_shipping_packages(&self) -> &[ShippingPackage] {
        &self.shipping_packages
    }

    /// Cohorts skipped by the last cycle because their schedule data was
    /// unusable. Empty on a fully successful cycle.
    #[must_use]
    pub fn cohort_failures(&self) -> &[CohortFailure] {
        &self.cohort_failures
    }

    /// Clears all per-cycle outputs. Called by the engine at cycle start so
    /// stale results from an aborted cycle can never leak into the next.
    pub(crate) fn clear_cycle_outputs(&mut self) {
        self.recurring_carts.clear();
        self.recurring_shipping.clear();
        self.cohort_failures.clear();
        self.shipping_packages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::BillingPeriod;

    fn monthly() -> SubscriptionTerms {
        SubscriptionTerms::new(BillingSchedule::every(1, BillingPeriod::Month))
    }

    fn monthly_with_trial() -> SubscriptionTerms {
        SubscriptionTerms::new(
            BillingSchedule::every(1, BillingPeriod::Month).with_trial(1, BillingPeriod::Month),
        )
    }

    // ========================================================================
    // ItemId Tests
    // ========================================================================

    #[test]
    fn test_item_id_valid() {
        assert!(ItemId::new("item-1").is_ok());
        assert!(ItemId::new("a_b_c_123").is_ok());
    }

    #[test]
    fn test_item_id_rejects_empty() {
        assert!(ItemId::new("").is_err());
    }

    #[test]
    fn test_item_id_rejects_invalid_chars() {
        assert!(ItemId::new("item 1").is_err());
        assert!(ItemId::new("item/1").is_err());
    }

    #[test]
    fn test_item_id_rejects_overlong() {
        assert!(ItemId::new("a".repeat(65)).is_err());
    }

    // ========================================================================
    // Line Item Tests
    // ========================================================================

    #[test]
    fn test_line_totals() {
        let item = LineItem::subscription(
            "sub-1",
            Decimal::new(1000, 2),
            3,
            monthly().with_sign_up_fee(Decimal::new(500, 2)),
        )
        .unwrap();
        assert_eq!(item.line_total(), Decimal::new(3000, 2));
        assert_eq!(item.sign_up_fee_total(), Decimal::new(1500, 2));
    }

    #[test]
    fn test_one_off_has_no_fee_total() {
        let item = LineItem::one_off("simple", Decimal::new(2000, 2), 1).unwrap();
        assert!(!item.is_subscription());
        assert_eq!(item.sign_up_fee_total(), Decimal::ZERO);
    }

    // ========================================================================
    // Cart Query Tests
    // ========================================================================

    #[test]
    fn test_contains_subscription_and_trial() {
        let mut cart = Cart::new(Currency::usd());
        assert!(!cart.contains_subscription());

        cart.add_item(LineItem::one_off("simple", Decimal::new(2000, 2), 1).unwrap());
        assert!(!cart.contains_subscription());

        cart.add_item(
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly()).unwrap(),
        );
        assert!(cart.contains_subscription());
        assert!(!cart.contains_free_trial());

        cart.add_item(
            LineItem::subscription("sub-2", Decimal::new(1000, 2), 1, monthly_with_trial())
                .unwrap(),
        );
        assert!(cart.contains_free_trial());
    }

    #[test]
    fn test_all_subscription_items_trialing() {
        let mut cart = Cart::new(Currency::usd());
        assert!(!cart.all_subscription_items_trialing());

        cart.add_item(
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly_with_trial())
                .unwrap(),
        );
        assert!(cart.all_subscription_items_trialing());

        // One-off items do not break the all-trialing property.
        cart.add_item(LineItem::one_off("simple", Decimal::new(500, 2), 1).unwrap());
        assert!(cart.all_subscription_items_trialing());

        cart.add_item(
            LineItem::subscription("sub-2", Decimal::new(1000, 2), 1, monthly()).unwrap(),
        );
        assert!(!cart.all_subscription_items_trialing());
    }

    #[test]
    fn test_needs_immediate_shipping() {
        let mut cart = Cart::new(Currency::usd());
        cart.add_item(
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly_with_trial())
                .unwrap()
                .shippable(),
        );
        // Only a trialing subscription needs shipping: nothing ships now.
        assert!(!cart.needs_immediate_shipping());

        cart.add_item(LineItem::one_off("simple", Decimal::new(500, 2), 1).unwrap().shippable());
        assert!(cart.needs_immediate_shipping());
    }

    #[test]
    fn test_sign_up_fee_total_sums_across_items() {
        let mut cart = Cart::new(Currency::usd());
        cart.add_item(
            LineItem::subscription(
                "sub-1",
                Decimal::new(1000, 2),
                2,
                monthly().with_sign_up_fee(Decimal::new(250, 2)),
            )
            .unwrap(),
        );
        cart.add_item(
            LineItem::subscription("sub-2", Decimal::new(1000, 2), 1, monthly()).unwrap(),
        );
        assert_eq!(cart.sign_up_fee_total(), Decimal::new(500, 2));
    }
}
