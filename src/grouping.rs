//! Grouping engine: partitions subscription items into billing cohorts.
//!
//! Two subscription items belong in the same cohort exactly when they will
//! bill on an identical future schedule. That identity is captured by a
//! [`GroupingKey`] derived from the item's billing interval, period,
//! subscription length, and trial terms, plus (for synchronized products)
//! the computed first-renewal timestamp, so two synchronized products
//! renewing on different calendar days never share a cohort even when
//! their plans are otherwise identical.
//!
//! Grouping is deterministic and order-preserving: cohorts come out in the
//! order their key was first encountered in the cart, and members keep cart
//! insertion order within a cohort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, SubscriptionTerms};
use crate::error::{CartCalcError, Result};
use crate::resolver::SchedulePlanner;

/// Identifier of one billing cohort: a canonical rendering of a future
/// billing schedule.
///
/// Items with equal keys have identical recurring schedule semantics; the
/// derivation guarantees this, the grouping engine assumes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingKey(String);

impl GroupingKey {
    /// Creates a grouping key from a pre-derived string.
    ///
    /// Normally keys come from [`GroupingKey::derive`]; this constructor
    /// exists for deserialized lookups and tests.
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty or contains characters outside
    /// alphanumerics and underscores.
    pub fn new<S: Into<String>>(key: S) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CartCalcError::InvalidGroupingKey("key cannot be empty".to_owned()));
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CartCalcError::InvalidGroupingKey(
                "key can only contain alphanumeric characters and underscores".to_owned(),
            ));
        }
        Ok(Self(key))
    }

    /// Derives the key for a subscription item's terms.
    ///
    /// `first_renewal` is the synchronized first-renewal instant and must
    /// be `Some` only for synchronized products; it makes the key
    /// time-dependent by design (the schedule a customer joins *is*
    /// different on either side of the billing anchor).
    #[must_use]
    pub fn derive(terms: &SubscriptionTerms, first_renewal: Option<DateTime<Utc>>) -> Self {
        let schedule = &terms.schedule;
        let mut key = format!("{}_{}", schedule.interval, schedule.period);
        if schedule.length > 0 {
            key.push_str(&format!("_for_{}", schedule.length));
        }
        if schedule.trial_length > 0 {
            key.push_str(&format!(
                "_trial_{}_{}",
                schedule.trial_length, schedule.trial_period
            ));
        }
        if let Some(renewal) = first_renewal {
            key.push_str(&format!("_sync_{}", renewal.timestamp()));
        }
        Self(key)
    }

    /// Returns the inner string reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cohort as produced by the grouping pass: its key and the arena
/// indices of its member items in the master cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortSeed {
    /// The cohort's grouping key.
    pub key: GroupingKey,
    /// Indices of member items in `cart.items`, in cart insertion order.
    /// Never empty.
    pub member_indices: Vec<usize>,
}

/// Partitions the cart's subscription items into cohorts.
///
/// Non-subscription items are skipped. `start` is the calculation cycle's
/// single start instant; it feeds the synchronized first-renewal
/// computation so one cycle can never straddle a billing-day boundary
/// internally.
#[must_use]
pub fn group_items<P: SchedulePlanner>(
    cart: &Cart,
    planner: &P,
    start: DateTime<Utc>,
) -> Vec<CohortSeed> {
    let mut seeds: Vec<CohortSeed> = Vec::new();
    for (index, item) in cart.subscription_items() {
        let Some(terms) = item.subscription.as_ref() else {
            continue;
        };
        let key = GroupingKey::derive(terms, planner.first_renewal(item, start));
        match seeds.iter_mut().find(|seed| seed.key == key) {
            Some(seed) => seed.member_indices.push(index),
            None => seeds.push(CohortSeed { key, member_indices: vec![index] }),
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::LineItem;
    use crate::money::Currency;
    use crate::resolver::CalendarSchedulePlanner;
    use crate::schedule::{BillingPeriod, BillingSchedule};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn monthly() -> SubscriptionTerms {
        SubscriptionTerms::new(BillingSchedule::every(1, BillingPeriod::Month))
    }

    fn yearly() -> SubscriptionTerms {
        SubscriptionTerms::new(BillingSchedule::every(1, BillingPeriod::Year))
    }

    fn cart_with(items: Vec<LineItem>) -> Cart {
        let mut cart = Cart::new(Currency::usd());
        for item in items {
            cart.add_item(item);
        }
        cart
    }

    // ========================================================================
    // Key Derivation Tests
    // ========================================================================

    #[test]
    fn test_key_from_plain_schedule() {
        let key = GroupingKey::derive(&monthly(), None);
        assert_eq!(key.as_str(), "1_month");
    }

    #[test]
    fn test_key_includes_length_and_trial() {
        let terms = SubscriptionTerms::new(
            BillingSchedule::every(2, BillingPeriod::Week)
                .with_length(6)
                .with_trial(1, BillingPeriod::Month),
        );
        let key = GroupingKey::derive(&terms, None);
        assert_eq!(key.as_str(), "2_week_for_6_trial_1_month");
    }

    #[test]
    fn test_key_includes_sync_timestamp() {
        let renewal = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let key = GroupingKey::derive(&monthly(), Some(renewal));
        assert_eq!(key.as_str(), format!("1_month_sync_{}", renewal.timestamp()));
    }

    #[test]
    fn test_sign_up_fee_does_not_affect_key() {
        let with_fee = monthly().with_sign_up_fee(Decimal::new(999, 2));
        assert_eq!(GroupingKey::derive(&monthly(), None), GroupingKey::derive(&with_fee, None));
    }

    // ========================================================================
    // Grouping Tests
    // ========================================================================

    #[test]
    fn test_identical_schedules_share_a_cohort() {
        let cart = cart_with(vec![
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly()).unwrap(),
            LineItem::subscription("sub-2", Decimal::new(2500, 2), 1, monthly()).unwrap(),
        ]);
        let seeds = group_items(&cart, &CalendarSchedulePlanner, start());
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].member_indices, vec![0, 1]);
    }

    #[test]
    fn test_different_schedules_never_merge() {
        let cart = cart_with(vec![
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly()).unwrap(),
            LineItem::subscription("sub-2", Decimal::new(1000, 2), 1, yearly()).unwrap(),
        ]);
        let seeds = group_items(&cart, &CalendarSchedulePlanner, start());
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].member_indices, vec![0]);
        assert_eq!(seeds[1].member_indices, vec![1]);
    }

    #[test]
    fn test_non_subscription_items_are_skipped() {
        let cart = cart_with(vec![
            LineItem::one_off("simple", Decimal::new(2000, 2), 1).unwrap(),
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, monthly()).unwrap(),
        ]);
        let seeds = group_items(&cart, &CalendarSchedulePlanner, start());
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].member_indices, vec![1]);
    }

    #[test]
    fn test_cohorts_keep_first_encounter_order() {
        let cart = cart_with(vec![
            LineItem::subscription("sub-1", Decimal::new(1000, 2), 1, yearly()).unwrap(),
            LineItem::subscription("sub-2", Decimal::new(1000, 2), 1, monthly()).unwrap(),
            LineItem::subscription("sub-3", Decimal::new(1000, 2), 1, yearly()).unwrap(),
        ]);
        let seeds = group_items(&cart, &CalendarSchedulePlanner, start());
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].key.as_str(), "1_year");
        assert_eq!(seeds[0].member_indices, vec![0, 2]);
        assert_eq!(seeds[1].key.as_str(), "1_month");
    }

    #[test]
    fn test_synchronized_items_split_by_anchor_day() {
        let cart = cart_with(vec![
            LineItem::subscription(
                "sub-1",
                Decimal::new(1000, 2),
                1,
                monthly().synchronized_to(1),
            )
            .unwrap(),
            LineItem::subscription(
                "sub-2",
                Decimal::new(1000, 2),
                1,
                monthly().synchronized_to(15),
            )
            .unwrap(),
        ]);
        let seeds = group_items(&cart, &CalendarSchedulePlanner, start());
        assert_eq!(seeds.len(), 2);
    }

    // ========================================================================
    // Property Tests
    // ========================================================================

    fn arb_terms() -> impl Strategy<Value = SubscriptionTerms> {
        (
            1u32..4,
            prop_oneof![
                Just(BillingPeriod::Week),
                Just(BillingPeriod::Month),
                Just(BillingPeriod::Year),
            ],
            0u32..3,
            prop::bool::ANY,
        )
            .prop_map(|(interval, period, trial_length, limited)| {
                let mut schedule = BillingSchedule::every(interval, period)
                    .with_trial(trial_length, BillingPeriod::Week);
                if limited {
                    schedule = schedule.with_length(12);
                }
                SubscriptionTerms::new(schedule)
            })
    }

    fn arb_cart() -> impl Strategy<Value = Cart> {
        prop::collection::vec((prop::bool::ANY, arb_terms()), 0..12).prop_map(|specs| {
            let mut cart = Cart::new(Currency::usd());
            for (index, (is_subscription, terms)) in specs.into_iter().enumerate() {
                let id = format!("item-{index}");
                let item = if is_subscription {
                    LineItem::subscription(id, Decimal::new(1000, 2), 1, terms).unwrap()
                } else {
                    LineItem::one_off(id, Decimal::new(1000, 2), 1).unwrap()
                };
                cart.add_item(item);
            }
            cart
        })
    }

    proptest! {
        /// Every subscription item lands in exactly one cohort; the union
        /// of members equals the subscription item set.
        #[test]
        fn prop_grouping_partitions_subscription_items(cart in arb_cart()) {
            let seeds = group_items(&cart, &CalendarSchedulePlanner, start());

            let mut seen = std::collections::HashSet::new();
            for seed in &seeds {
                prop_assert!(!seed.member_indices.is_empty());
                for &index in &seed.member_indices {
                    prop_assert!(cart.items[index].is_subscription());
                    prop_assert!(seen.insert(index), "item {} in two cohorts", index);
                }
            }

            let subscription_count = cart.subscription_items().count();
            prop_assert_eq!(seen.len(), subscription_count);
        }

        /// Grouping the same cart twice yields identical keys and member
        /// ordering.
        #[test]
        fn prop_grouping_is_deterministic(cart in arb_cart()) {
            let first = group_items(&cart, &CalendarSchedulePlanner, start());
            let second = group_items(&cart, &CalendarSchedulePlanner, start());
            prop_assert_eq!(first, second);
        }
    }
}
