//! Calculation state shared across one totals cycle.
//!
//! Every collaborator that resolves a price, discount, or shipping rate
//! needs to know which *view* of the cart is being computed: the initial
//! checkout charge, a sign-up-fee-only preview, or one cohort's recurring
//! pass. That view is the [`CalculationMode`], and it is carried by a
//! [`CalculationContext`] handle created fresh for each independent
//! calculation request.
//!
//! The context also owns the re-entrancy stack: the ordered set of cohort
//! keys whose passes are currently in progress. The engine consults it
//! before doing anything, which is the sole mechanism preventing the
//! totals calculator's callbacks from recursively restarting the whole
//! cycle.
//!
//! The context is an explicit value handed into every collaborator call
//! rather than process-global state, so a stale mode from one request can
//! never leak into the next.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::grouping::GroupingKey;

/// The price/discount view active for the current calculation pass.
///
/// Exactly one mode is active at any instant; it is global to the current
/// calculation cycle, not per-item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMode {
    /// The initial/normal pass over the master cart.
    #[default]
    None,
    /// Sign-up fee plus the first recurring amount, combined.
    CombinedTotal,
    /// Sign-up fee only; shipping never applies to this view.
    SignUpFeeTotal,
    /// A cohort's own recurring pass.
    RecurringTotal,
    /// Initial pass when a trial exists but no fee; shipping never applies.
    FreeTrialTotal,
}

impl CalculationMode {
    /// Lowercase mode name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CombinedTotal => "combined_total",
            Self::SignUpFeeTotal => "sign_up_fee_total",
            Self::RecurringTotal => "recurring_total",
            Self::FreeTrialTotal => "free_trial_total",
        }
    }
}

impl std::fmt::Display for CalculationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct ContextInner {
    mode: CalculationMode,
    stack: Vec<GroupingKey>,
}

/// Shared calculation state for one totals cycle.
///
/// Cheap to clone: clones share the same underlying state, so the handle a
/// collaborator captured sees every mode change the engine makes. Create a
/// fresh context (or call [`reset`](Self::reset)) at the start of each
/// independent calculation request; stale state from an aborted cycle
/// would otherwise permanently disable recurring calculation.
///
/// # Examples
///
/// ```
/// use recurring_cart::context::{CalculationContext, CalculationMode};
///
/// let ctx = CalculationContext::new();
/// assert_eq!(ctx.mode(), CalculationMode::None);
/// assert!(!ctx.is_reentrant());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CalculationContext {
    inner: Arc<RwLock<ContextInner>>,
}

impl CalculationContext {
    /// Creates a context in the neutral state (`none` mode, empty stack).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently active mode.
    #[must_use]
    pub fn mode(&self) -> CalculationMode {
        self.inner.read().expect("context lock poisoned").mode
    }

    /// Sets the active mode and returns the mode that was active.
    ///
    /// Callers doing a one-off pass (e.g. a sign-up-fee preview) use the
    /// returned value to restore the previous mode manually afterwards.
    pub fn set_mode(&self, mode: CalculationMode) -> CalculationMode {
        let mut inner = self.inner.write().expect("context lock poisoned");
        std::mem::replace(&mut inner.mode, mode)
    }

    /// Pushes a cohort key onto the re-entrancy stack.
    ///
    /// The mode becomes [`CalculationMode::RecurringTotal`] for the
    /// duration of the cohort's pass.
    pub fn push_cohort(&self, key: GroupingKey) {
        let mut inner = self.inner.write().expect("context lock poisoned");
        inner.stack.push(key);
        inner.mode = CalculationMode::RecurringTotal;
    }

    /// Pops the most recently pushed cohort key (strict LIFO).
    ///
    /// The mode is restored from the new top of the stack:
    /// [`CalculationMode::RecurringTotal`] while any cohort pass remains in
    /// progress, [`CalculationMode::None`] once the stack is empty.
    pub fn pop_cohort(&self) -> Option<GroupingKey> {
        let mut inner = self.inner.write().expect("context lock poisoned");
        let popped = inner.stack.pop();
        inner.mode = if inner.stack.is_empty() {
            CalculationMode::None
        } else {
            CalculationMode::RecurringTotal
        };
        popped
    }

    /// The cohort key whose pass is currently in progress, if any.
    ///
    /// Shipping-method selection reads this to disambiguate recurring
    /// packages from initial-cart packages.
    #[must_use]
    pub fn current_cohort(&self) -> Option<GroupingKey> {
        self.inner
            .read()
            .expect("context lock poisoned")
            .stack
            .last()
            .cloned()
    }

    /// Number of cohort passes currently in progress.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.read().expect("context lock poisoned").stack.len()
    }

    /// Whether a calculation pass is already in progress.
    ///
    /// The engine checks this at the very start of a cycle: a `true` here
    /// means the present invocation is itself a side effect of an
    /// in-progress pass, and re-entering the whole algorithm would recurse
    /// forever.
    #[must_use]
    pub fn is_reentrant(&self) -> bool {
        !self.inner.read().expect("context lock poisoned").stack.is_empty()
    }

    /// Resets to the neutral state: `none` mode, empty stack.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("context lock poisoned");
        inner.mode = CalculationMode::None;
        inner.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> GroupingKey {
        GroupingKey::new(text).unwrap()
    }

    #[test]
    fn test_new_context_is_neutral() {
        let ctx = CalculationContext::new();
        assert_eq!(ctx.mode(), CalculationMode::None);
        assert!(!ctx.is_reentrant());
        assert!(ctx.current_cohort().is_none());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_set_mode_returns_previous() {
        let ctx = CalculationContext::new();
        let previous = ctx.set_mode(CalculationMode::SignUpFeeTotal);
        assert_eq!(previous, CalculationMode::None);
        assert_eq!(ctx.mode(), CalculationMode::SignUpFeeTotal);

        let previous = ctx.set_mode(previous);
        assert_eq!(previous, CalculationMode::SignUpFeeTotal);
        assert_eq!(ctx.mode(), CalculationMode::None);
    }

    #[test]
    fn test_push_sets_recurring_mode() {
        let ctx = CalculationContext::new();
        ctx.push_cohort(key("1_month"));
        assert_eq!(ctx.mode(), CalculationMode::RecurringTotal);
        assert!(ctx.is_reentrant());
        assert_eq!(ctx.current_cohort(), Some(key("1_month")));
    }

    #[test]
    fn test_pop_is_strict_lifo_and_restores_mode() {
        let ctx = CalculationContext::new();
        ctx.push_cohort(key("1_month"));
        ctx.push_cohort(key("1_year"));
        assert_eq!(ctx.depth(), 2);

        assert_eq!(ctx.pop_cohort(), Some(key("1_year")));
        assert_eq!(ctx.mode(), CalculationMode::RecurringTotal);
        assert_eq!(ctx.current_cohort(), Some(key("1_month")));

        assert_eq!(ctx.pop_cohort(), Some(key("1_month")));
        assert_eq!(ctx.mode(), CalculationMode::None);
        assert!(!ctx.is_reentrant());
    }

    #[test]
    fn test_pop_on_empty_stack() {
        let ctx = CalculationContext::new();
        assert!(ctx.pop_cohort().is_none());
        assert_eq!(ctx.mode(), CalculationMode::None);
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = CalculationContext::new();
        let handle = ctx.clone();
        ctx.push_cohort(key("1_month"));
        assert!(handle.is_reentrant());
        assert_eq!(handle.mode(), CalculationMode::RecurringTotal);
    }

    #[test]
    fn test_reset_clears_stale_state() {
        let ctx = CalculationContext::new();
        ctx.push_cohort(key("1_month"));
        ctx.set_mode(CalculationMode::CombinedTotal);

        ctx.reset();
        assert_eq!(ctx.mode(), CalculationMode::None);
        assert!(!ctx.is_reentrant());
        assert!(ctx.current_cohort().is_none());
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&CalculationMode::RecurringTotal).unwrap();
        assert_eq!(json, "\"recurring_total\"");
        let json = serde_json::to_string(&CalculationMode::None).unwrap();
        assert_eq!(json, "\"none\"");
    }
}
