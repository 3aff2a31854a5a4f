//! Error types for the recurring cart engine.
//!
//! This module defines all error types that can occur while grouping a cart
//! and computing its recurring totals. All errors implement the standard
//! [`std::error::Error`] trait via [`thiserror::Error`].
//!
//! # Error Categories
//!
//! - **Validation errors** ([`CartCalcError::InvalidItemId`],
//!   [`CartCalcError::InvalidSchedule`]): malformed cart data rejected up
//!   front
//! - **Schedule errors** ([`CartCalcError::ScheduleUnavailable`]): the
//!   schedule collaborator could not produce dates for a cohort's
//!   representative item; the affected cohort is skipped and the failure is
//!   recorded on the cart while the rest of the cycle completes
//! - **Collaborator errors** ([`CartCalcError::Collaborator`]): an external
//!   resolver (price, discount, tax, shipping) failed; these abort the
//!   cycle, since a partially-resolved total must fail visibly rather than
//!   silently use stale numbers
//! - **Arithmetic errors** ([`CartCalcError::AmountOverflow`]): a monetary
//!   computation exceeded [`rust_decimal::Decimal`] range
//!
//! # Examples
//!
//! ```
//! use recurring_cart::error::{CartCalcError, Result};
//!
//! fn validate_quantity(quantity: u32) -> Result<u32> {
//!     if quantity == 0 {
//!         return Err(CartCalcError::InvalidItemId(
//!             "quantity must be at least 1".to_owned(),
//!         ));
//!     }
//!     Ok(quantity)
//! }
//! ```

use thiserror::Error;

/// Result type alias for engine operations.
///
/// This is a convenience type that uses [`CartCalcError`] as the error
/// type. All fallible functions in this crate return this type.
pub type Result<T> = std::result::Result<T, CartCalcError>;

/// Errors that can occur while computing recurring cart totals.
///
/// All variants include contextual information about what went wrong. Note
/// that a detected re-entrant invocation of the engine is *not* an error:
/// the engine returns the cart's current total untouched, by design.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartCalcError {
    /// A cart item identifier failed validation.
    ///
    /// Item identifiers must be non-empty, at most 64 characters, and use
    /// only alphanumeric characters, hyphens, and underscores.
    #[error("invalid item id: {0}")]
    InvalidItemId(String),

    /// A subscription item carries an unusable billing schedule.
    ///
    /// Raised when an interval of zero, a subscription length shorter than
    /// one renewal, or a trial with no period is encountered. The cart
    /// should be corrected before totals are recalculated.
    #[error("invalid billing schedule on item '{item_id}': {reason}")]
    InvalidSchedule {
        /// Identifier of the offending item.
        item_id: String,
        /// Why the schedule was rejected.
        reason: String,
    },

    /// The schedule collaborator could not derive dates for a cohort.
    ///
    /// The cohort whose representative item triggered this is skipped and
    /// the failure recorded on the cart; remaining cohorts still complete.
    /// One corrupt item must not blank out the entire cart's totals.
    #[error("schedule dates unavailable for item '{item_id}': {reason}")]
    ScheduleUnavailable {
        /// Identifier of the representative item.
        item_id: String,
        /// Why dates could not be derived.
        reason: String,
    },

    /// An external collaborator (price, discount, tax, shipping) failed.
    ///
    /// These are propagated to the caller unchanged in meaning: cart totals
    /// must reflect a consistent snapshot or fail visibly.
    #[error("collaborator failure during {operation}: {reason}")]
    Collaborator {
        /// The operation being performed when the collaborator failed.
        operation: String,
        /// The collaborator's failure description.
        reason: String,
    },

    /// A grouping key failed validation.
    ///
    /// Keys are normally derived, not hand-written; this surfaces when a
    /// deserialized or caller-supplied key is malformed.
    #[error("invalid grouping key: {0}")]
    InvalidGroupingKey(String),

    /// A monetary computation overflowed.
    #[error("amount overflow during {0}")]
    AmountOverflow(String),

    /// A cohort cart was requested for a cohort with no members.
    ///
    /// The grouping engine never produces empty cohorts, so hitting this
    /// indicates the caller constructed a cohort seed by hand.
    #[error("cohort '{0}' has no member items")]
    EmptyCohort(String),
}

impl CartCalcError {
    /// Whether this error aborts only the cohort that raised it.
    ///
    /// Recoverable errors are recorded on the cart and the calculation
    /// cycle continues with the remaining cohorts. Everything else aborts
    /// the whole cycle.
    #[must_use]
    pub fn is_cohort_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ScheduleUnavailable { .. } | Self::InvalidSchedule { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = CartCalcError::InvalidSchedule {
            item_id: "item-1".to_owned(),
            reason: "interval must be at least 1".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("item-1"));
        assert!(msg.contains("interval must be at least 1"));
    }

    #[test]
    fn test_schedule_errors_are_cohort_recoverable() {
        let err = CartCalcError::ScheduleUnavailable {
            item_id: "item-1".to_owned(),
            reason: "no anchor day".to_owned(),
        };
        assert!(err.is_cohort_recoverable());

        let err = CartCalcError::InvalidSchedule {
            item_id: "item-1".to_owned(),
            reason: "zero interval".to_owned(),
        };
        assert!(err.is_cohort_recoverable());
    }

    #[test]
    fn test_collaborator_errors_abort_the_cycle() {
        let err = CartCalcError::Collaborator {
            operation: "tax".to_owned(),
            reason: "rate service unreachable".to_owned(),
        };
        assert!(!err.is_cohort_recoverable());

        let err = CartCalcError::AmountOverflow("items subtotal".to_owned());
        assert!(!err.is_cohort_recoverable());
    }
}
