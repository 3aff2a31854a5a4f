//! Shipping package synthesis for multi-pass calculation.
//!
//! The external shipping estimator splits the master cart into packages
//! once. This module *reshapes* that packaging for each pass:
//!
//! - the initial pass must not ship free-trial items (nothing is charged
//!   for them now), and
//! - recurring passes must not ship items flagged one-time-shipping (they
//!   ship with the first order only).
//!
//! Reshaping never prices anything; package costs are adjusted by
//! subtracting the line totals of removed contents. Packages whose contents
//! are emptied by a pass are omitted entirely, not emitted empty.
//!
//! Synthesized recurring packages are cached per cohort for the duration of
//! a cycle in a [`RecurringPackageCache`] so repeated consultation (free
//! shipping eligibility re-checks, cart display projections) does not
//! re-derive them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::grouping::GroupingKey;

/// One shipping package: a subset of cart items that travel together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingPackage {
    /// Index of the package in the master cart's packaging it was derived
    /// from.
    pub source_index: usize,
    /// The cohort this package belongs to, `None` for the initial cart.
    pub cohort_key: Option<GroupingKey>,
    /// Arena indices of the items in this package.
    pub contents: Vec<usize>,
    /// Sum of the line totals of the contents.
    pub contents_cost: Decimal,
}

impl ShippingPackage {
    /// Creates an initial-cart package from arena indices, computing its
    /// contents cost from the cart.
    #[must_use]
    pub fn initial(source_index: usize, contents: Vec<usize>, cart: &Cart) -> Self {
        let contents_cost = contents
            .iter()
            .filter_map(|&index| cart.items.get(index))
            .map(crate::cart::LineItem::line_total)
            .sum();
        Self { source_index, cohort_key: None, contents, contents_cost }
    }

    /// The package's unique key.
    ///
    /// Initial-cart packages use their bare numeric index; cohort packages
    /// prefix it with the cohort key (`<cohort>_<index>`), which guarantees
    /// no collision between the two namespaces or between cohorts.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.cohort_key {
            Some(cohort) => format!("{}_{}", cohort, self.source_index),
            None => self.source_index.to_string(),
        }
    }
}

/// Reshapes master packages for the initial pass: free-trial items are
/// removed (they must not be shipped or charged now) and emptied packages
/// are dropped.
#[must_use]
pub fn synthesize_initial(master: &[ShippingPackage], cart: &Cart) -> Vec<ShippingPackage> {
    master
        .iter()
        .filter_map(|package| {
            let mut reshaped = package.clone();
            retain_contents(&mut reshaped, cart, |index| {
                !cart.items[index].has_free_trial()
            });
            (!reshaped.contents.is_empty()).then_some(reshaped)
        })
        .collect()
}

/// Reshapes master packages for one cohort's recurring pass.
///
/// Each source package yields a cohort-tagged copy containing only the
/// cohort's member items, minus any item flagged one-time-shipping; the
/// removed items' line totals are subtracted from the package cost.
/// Emptied packages are dropped.
#[must_use]
pub fn synthesize_cohort(
    master: &[ShippingPackage],
    cart: &Cart,
    cohort_key: &GroupingKey,
    member_indices: &[usize],
) -> Vec<ShippingPackage> {
    master
        .iter()
        .filter_map(|package| {
            let mut reshaped = package.clone();
            reshaped.cohort_key = Some(cohort_key.clone());
            retain_contents(&mut reshaped, cart, |index| {
                member_indices.contains(&index) && !cart.items[index].one_time_shipping
            });
            (!reshaped.contents.is_empty()).then_some(reshaped)
        })
        .collect()
}

/// Keeps only contents matching `keep`, subtracting removed line totals
/// from the package cost.
fn retain_contents<F: Fn(usize) -> bool>(package: &mut ShippingPackage, cart: &Cart, keep: F) {
    let mut removed_cost = Decimal::ZERO;
    package.contents.retain(|&index| {
        if keep(index) {
            true
        } else {
            if let Some(item) = cart.items.get(index) {
                removed_cost += item.line_total();
            }
            false
        }
    });
    package.contents_cost -= removed_cost;
}

/// Per-cohort shipping packages for the current calculation cycle.
///
/// Preserves cohort insertion order (the order cohorts were first
/// encountered in the cart), which determines how packages are presented
/// downstream. Cleared and rebuilt at the start of every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecurringPackageCache {
    entries: Vec<(GroupingKey, Vec<ShippingPackage>)>,
}

impl RecurringPackageCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the packages for a cohort, replacing any previous entry.
    pub fn insert(&mut self, key: GroupingKey, packages: Vec<ShippingPackage>) {
        match self.entries.iter_mut().find(|(existing, _)| existing == &key) {
            Some((_, existing_packages)) => *existing_packages = packages,
            None => self.entries.push((key, packages)),
        }
    }

    /// The packages cached for a cohort.
    #[must_use]
    pub fn get(&self, key: &GroupingKey) -> Option<&[ShippingPackage]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, packages)| packages.as_slice())
    }

    /// Iterates cohorts and their packages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&GroupingKey, &[ShippingPackage])> {
        self.entries.iter().map(|(key, packages)| (key, packages.as_slice()))
    }

    /// Number of cohorts with cached packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
