//! Audit logging for calculation cycles.
//!
//! Provides structured audit events with a unique correlation ID per
//! cycle, so every cohort pass, policy decision, and skipped cohort can be
//! traced back to the request that triggered it.

use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of auditable cycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleEventType {
    /// A calculation cycle started.
    CycleStarted {
        /// Items in the master cart.
        item_count: usize,
        /// Subscription items among them.
        subscription_count: usize,
    },
    /// One cohort's pass completed.
    CohortCalculated {
        /// The cohort's grouping key.
        cohort_key: String,
        /// The cohort's recurring total.
        total: Decimal,
    },
    /// One cohort was skipped because its schedule data was unusable.
    CohortSkipped {
        /// The skipped cohort's grouping key.
        cohort_key: String,
        /// Why it was skipped.
        error: String,
    },
    /// The initial cart's fees were suppressed (trial-only cart).
    InitialFeesSuppressed,
    /// Shipping was deferred off the initial charge.
    ShippingDeferred {
        /// Shipping plus shipping tax removed from the initial total.
        amount: Decimal,
    },
    /// The calculation cycle completed.
    CycleCompleted {
        /// The finalized initial total.
        total: Decimal,
        /// Cohorts that completed their pass.
        cohort_count: usize,
    },
}

/// One audit record: what happened, when, and in which cycle.
///
/// # Examples
///
/// ```
/// use recurring_cart::audit::{audit_log, CycleEvent, CycleEventType};
/// use uuid::Uuid;
///
/// let event = CycleEvent::new(
///     CycleEventType::InitialFeesSuppressed,
///     Uuid::new_v4(),
/// );
/// audit_log(&event);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleEvent {
    /// When the event occurred.
    pub timestamp: SystemTime,
    /// What happened.
    pub event_type: CycleEventType,
    /// Correlation ID of the calculation cycle.
    pub cycle_id: Uuid,
}

impl CycleEvent {
    /// Creates an audit event stamped with the current time.
    #[must_use]
    pub fn new(event_type: CycleEventType, cycle_id: Uuid) -> Self {
        Self { timestamp: SystemTime::now(), event_type, cycle_id }
    }
}

/// Emits an audit record through `tracing` under the `audit` target.
pub fn audit_log(event: &CycleEvent) {
    tracing::info!(
        target: "audit",
        timestamp = ?event.timestamp,
        event_type = ?event.event_type,
        cycle_id = %event.cycle_id,
        "AUDIT"
    );
}
