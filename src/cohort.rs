//! Cohort carts: disposable per-cohort views of the master cart.
//!
//! A [`CohortCart`] is not a copy of the cart. It holds the arena indices
//! of its member items plus its own schedule dates, fees, and computed
//! totals; item data is always read through the master cart. Cohort carts
//! are created fresh on every calculation cycle and never persisted across
//! requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, CartFee, CartTotals, ItemId, LineItem};
use crate::error::{CartCalcError, Result};
use crate::grouping::{CohortSeed, GroupingKey};
use crate::resolver::SchedulePlanner;
use crate::schedule::validate_schedule;

/// One cohort's cart view, carrying its own totals after its pass.
///
/// Owned by the engine for the duration of one calculation cycle, then
/// stored read-only on the master cart for display projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortCart {
    /// The cohort's grouping key.
    pub key: GroupingKey,
    /// Arena indices of member items in the master cart.
    pub member_indices: Vec<usize>,
    /// When this cycle's calculation started; the cohort's schedule dates
    /// are derived from this instant.
    pub start_date: DateTime<Utc>,
    /// When the members' trial ends, if they have one.
    pub trial_end_date: Option<DateTime<Utc>>,
    /// The cohort's next payment date.
    pub next_payment_date: Option<DateTime<Utc>>,
    /// When the members' subscription expires, `None` for open-ended.
    pub end_date: Option<DateTime<Utc>>,
    /// Fees applied to this cohort's renewals. Starts empty; the engine
    /// re-applies only fees the store's policy flags as recurring.
    pub fees: Vec<CartFee>,
    /// The cohort's computed totals after its pass.
    pub totals: CartTotals,
}

impl CohortCart {
    /// Iterates the cohort's member items by reading through the master
    /// cart's item arena.
    pub fn members<'a>(&'a self, cart: &'a Cart) -> impl Iterator<Item = &'a LineItem> + 'a {
        self.member_indices
            .iter()
            .filter_map(move |&index| cart.items.get(index))
    }

    /// The member item identifiers, in cohort order.
    #[must_use]
    pub fn member_ids(&self, cart: &Cart) -> Vec<ItemId> {
        self.members(cart).map(|item| item.id.clone()).collect()
    }

    /// The cohort's recurring grand total.
    #[must_use]
    pub fn total(&self) -> rust_decimal::Decimal {
        self.totals.total
    }
}

/// A cohort the engine skipped because its schedule data was unusable.
///
/// Recorded on the master cart so the failure is visible to the caller
/// while the remaining cohorts' totals stay valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortFailure {
    /// The skipped cohort's key.
    pub key: GroupingKey,
    /// Human-readable failure description.
    pub error: String,
}

/// Builds the cohort cart for one grouping seed.
///
/// Schedule dates come from the cohort's representative member, the first
/// in cart order; grouping guarantees all members share the schedule.
/// Fees start cleared; the engine re-applies recurring fees afterwards.
///
/// # Errors
///
/// Returns [`CartCalcError::EmptyCohort`] for a seed with no members (the
/// grouping engine never produces one), [`CartCalcError::InvalidSchedule`]
/// if any member's schedule fails validation, or the planner's error if
/// dates cannot be derived.
pub fn build_cohort_cart<P: SchedulePlanner>(
    cart: &Cart,
    seed: &CohortSeed,
    planner: &P,
    start: DateTime<Utc>,
) -> Result<CohortCart> {
    let Some(&representative_index) = seed.member_indices.first() else {
        return Err(CartCalcError::EmptyCohort(seed.key.as_str().to_owned()));
    };

    for &index in &seed.member_indices {
        let item = cart.items.get(index).ok_or_else(|| {
            CartCalcError::EmptyCohort(seed.key.as_str().to_owned())
        })?;
        if let Some(terms) = item.subscription.as_ref() {
            validate_schedule(item.id.as_str(), &terms.schedule)?;
        }
    }

    let representative = &cart.items[representative_index];
    Ok(CohortCart {
        key: seed.key.clone(),
        member_indices: seed.member_indices.clone(),
        start_date: start,
        trial_end_date: planner.trial_end(representative, start)?,
        next_payment_date: planner.next_payment(representative, start)?,
        end_date: planner.end_date(representative, start)?,
        fees: Vec::new(),
        totals: CartTotals::default(),
    })
}
