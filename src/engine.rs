//! The recurring totals engine: grouping, per-cohort passes, aggregation.
//!
//! [`RecurringTotalsEngine::run`] is the single entry point of a
//! calculation cycle. One cycle walks a fixed sequence:
//!
//! ```text
//! Idle ─► Guard ─► Initial pass ─► Grouping ─► Per-cohort passes ─► Reconcile ─► Idle
//!           │                         │
//!           │ re-entrant?             │ no subscription items?
//!           ▼                         ▼
//!       return current total      return baseline
//! ```
//!
//! The guard comes before everything else: computing a cohort's totals
//! re-enters the same collaborators (pricing, coupons, shipping) that
//! trigger total calculation in the first place, and any of them may call
//! `run` again. The guard detects that from the [`CalculationContext`]'s
//! cohort stack and returns without touching any state, which is the sole
//! mechanism bounding the recursion.
//!
//! Cohorts are processed strictly sequentially, in the order the grouping
//! pass first encountered their key. The context is a single shared
//! mutable view of the active mode; processing cohorts concurrently would
//! corrupt the mode seen by collaborators mid-pass.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{audit_log, CycleEvent, CycleEventType};
use crate::calculator::{CartView, TotalsCalculator};
use crate::cart::Cart;
use crate::cohort::{build_cohort_cart, CohortCart, CohortFailure};
use crate::context::{CalculationContext, CalculationMode};
use crate::error::Result;
use crate::grouping::{group_items, CohortSeed};
use crate::money::{clamp_non_negative, round_to_precision};
use crate::resolver::{FeePolicy, SchedulePlanner, ShippingEstimator};
use crate::shipping::{synthesize_cohort, synthesize_initial, ShippingPackage};

/// Orchestrates multi-pass totals calculation over one master cart.
///
/// Generic over its four collaborator seams so hosts can substitute their
/// own cart calculator, schedule arithmetic, fee policy, or shipping
/// packaging without touching the cycle logic.
#[derive(Debug, Clone)]
pub struct RecurringTotalsEngine<C, P, F, S> {
    calculator: C,
    planner: P,
    policy: F,
    estimator: S,
}

impl<C, P, F, S> RecurringTotalsEngine<C, P, F, S>
where
    C: TotalsCalculator,
    P: SchedulePlanner,
    F: FeePolicy,
    S: ShippingEstimator,
{
    /// Creates an engine from its collaborators.
    #[must_use]
    pub fn new(calculator: C, planner: P, policy: F, estimator: S) -> Self {
        Self { calculator, planner, policy, estimator }
    }

    /// Runs one calculation cycle and returns the finalized initial total.
    ///
    /// If the context reports a pass already in progress (or a non-neutral
    /// mode), this invocation is a side effect of that pass: the cart's
    /// current total is returned untouched and nothing is computed.
    ///
    /// On success the master cart carries the cycle's outputs: refreshed
    /// [`Cart::totals`], the recurring cohort carts, the per-cohort
    /// shipping packages, and any recorded cohort failures.
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator fails during the initial pass or a
    /// cohort pass. Cohorts whose *schedule data* is unusable do not error
    /// the cycle: they are skipped, recorded on the cart, and the remaining
    /// cohorts complete.
    pub fn run(&self, cart: &mut Cart, ctx: &CalculationContext) -> Result<Decimal> {
        if ctx.is_reentrant() || ctx.mode() != CalculationMode::None {
            return Ok(clamp_non_negative(cart.grand_total()));
        }

        let cycle_id = Uuid::new_v4();
        let start = Utc::now();
        cart.clear_cycle_outputs();
        audit_log(&CycleEvent::new(
            CycleEventType::CycleStarted {
                item_count: cart.items.len(),
                subscription_count: cart.subscription_items().count(),
            },
            cycle_id,
        ));

        // Initial pass: trial items never ship with the first order.
        let master_packages = self.estimator.packages_for(cart);
        let initial_packages = synthesize_initial(&master_packages, cart);
        cart.shipping_packages = initial_packages;
        let all_members: Vec<usize> = (0..cart.items.len()).collect();
        let initial_totals = {
            let view = CartView {
                cart: &*cart,
                members: &all_members,
                fees: &cart.fees,
                coupons: &cart.coupons,
                packages: &cart.shipping_packages,
            };
            self.calculator.calculate(&view, ctx)?
        };
        cart.totals = initial_totals;
        let baseline = clamp_non_negative(cart.totals.total);

        let seeds = group_items(cart, &self.planner, start);
        if seeds.is_empty() {
            cart.totals.total = baseline;
            audit_log(&CycleEvent::new(
                CycleEventType::CycleCompleted { total: baseline, cohort_count: 0 },
                cycle_id,
            ));
            return Ok(baseline);
        }
        debug!(cycle_id = %cycle_id, cohorts = seeds.len(), "recurring cohorts grouped");

        for seed in &seeds {
            ctx.push_cohort(seed.key.clone());
            let outcome = self.cohort_pass(cart, seed, ctx, start, &master_packages);
            let popped = ctx.pop_cohort();
            debug_assert_eq!(popped.as_ref(), Some(&seed.key));

            match outcome {
                Ok((cohort, packages)) => {
                    audit_log(&CycleEvent::new(
                        CycleEventType::CohortCalculated {
                            cohort_key: seed.key.as_str().to_owned(),
                            total: cohort.totals.total,
                        },
                        cycle_id,
                    ));
                    cart.recurring_shipping.insert(seed.key.clone(), packages);
                    cart.recurring_carts.push(cohort);
                }
                Err(err) if err.is_cohort_recoverable() => {
                    warn!(
                        cohort_key = %seed.key,
                        error = %err,
                        "skipping cohort with unusable schedule data"
                    );
                    audit_log(&CycleEvent::new(
                        CycleEventType::CohortSkipped {
                            cohort_key: seed.key.as_str().to_owned(),
                            error: err.to_string(),
                        },
                        cycle_id,
                    ));
                    cart.cohort_failures
                        .push(CohortFailure { key: seed.key.clone(), error: err.to_string() });
                }
                Err(err) => return Err(err),
            }
        }

        // A cart that is nothing but free trials charges no fees now unless
        // the store's policy says otherwise.
        let suppress_default =
            cart.sign_up_fee_total().is_zero() && cart.all_subscription_items_trialing();
        if self.policy.suppress_initial_fees(cart, suppress_default) {
            cart.totals.fee_total = Decimal::ZERO;
            audit_log(&CycleEvent::new(CycleEventType::InitialFeesSuppressed, cycle_id));
        }

        let charge_default = !(cart.contains_free_trial() && !cart.needs_immediate_shipping());
        if !self.policy.charge_shipping_up_front(cart, charge_default) {
            let deferred = cart.totals.shipping_total + cart.totals.shipping_tax_total;
            cart.totals.shipping_total = Decimal::ZERO;
            cart.totals.shipping_tax_total = Decimal::ZERO;
            if !deferred.is_zero() {
                audit_log(&CycleEvent::new(
                    CycleEventType::ShippingDeferred { amount: deferred },
                    cycle_id,
                ));
            }
        }

        let totals = &cart.totals;
        let raw = totals.items_subtotal - totals.discount_total
            + totals.tax_total
            + totals.shipping_tax_total
            + totals.shipping_total
            + totals.fee_total;
        let final_total = clamp_non_negative(round_to_precision(raw, &cart.currency));
        cart.totals.total = final_total;

        audit_log(&CycleEvent::new(
            CycleEventType::CycleCompleted {
                total: final_total,
                cohort_count: cart.recurring_carts.len(),
            },
            cycle_id,
        ));
        Ok(final_total)
    }

    /// One cohort's pass: build the cohort cart, re-apply recurring fees,
    /// synthesize its shipping packages, and invoke the totals calculator
    /// under the already-pushed `recurring_total` mode.
    fn cohort_pass(
        &self,
        cart: &Cart,
        seed: &CohortSeed,
        ctx: &CalculationContext,
        start: chrono::DateTime<Utc>,
        master_packages: &[ShippingPackage],
    ) -> Result<(CohortCart, Vec<ShippingPackage>)> {
        let mut cohort = build_cohort_cart(cart, seed, &self.planner, start)?;
        cohort.fees = cart
            .fees
            .iter()
            .filter(|fee| self.policy.is_recurring_fee(fee))
            .cloned()
            .collect();

        let packages = synthesize_cohort(master_packages, cart, &seed.key, &seed.member_indices);
        let view = CartView {
            cart,
            members: &seed.member_indices,
            fees: &cohort.fees,
            coupons: &cart.coupons,
            packages: &packages,
        };
        cohort.totals = self.calculator.calculate(&view, ctx)?;
        Ok((cohort, packages))
    }
}
