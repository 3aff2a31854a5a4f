//! Billing schedule model for subscription line items.
//!
//! A [`BillingSchedule`] describes *when* an item bills: the recurring
//! period and interval, how many renewals the subscription runs for, and an
//! optional free-trial period. Monetary terms (recurring price, sign-up
//! fee) live on the line item itself.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CartCalcError, Result};

/// Calendar period a subscription bills on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Bills every N days.
    Day,
    /// Bills every N weeks.
    Week,
    /// Bills every N months.
    Month,
    /// Bills every N years.
    Year,
}

impl BillingPeriod {
    /// Returns the lowercase period name used in grouping keys and display.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Advances a date by `count` of this period.
    ///
    /// Month and year advancement clamps to the last valid day of the
    /// target month (Jan 31 + 1 month = Feb 28/29).
    #[must_use]
    pub fn advance(self, from: DateTime<Utc>, count: u32) -> DateTime<Utc> {
        match self {
            Self::Day => from + Duration::days(i64::from(count)),
            Self::Week => from + Duration::weeks(i64::from(count)),
            Self::Month => from + Months::new(count),
            Self::Year => from + Months::new(count.saturating_mul(12)),
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing schedule for one subscription line item.
///
/// Two items with identical schedules (and identical synchronized renewal
/// anchors) bill together and are grouped into the same cohort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingSchedule {
    /// Recurring billing period.
    pub period: BillingPeriod,
    /// Bill every `interval` periods (1 = every period).
    pub interval: u32,
    /// Total number of renewals, 0 = until cancelled.
    pub length: u32,
    /// Free-trial period unit.
    pub trial_period: BillingPeriod,
    /// Free-trial length in `trial_period` units, 0 = no trial.
    pub trial_length: u32,
}

impl BillingSchedule {
    /// Creates a schedule with no trial that bills every `interval`
    /// periods until cancelled.
    #[must_use]
    pub fn every(interval: u32, period: BillingPeriod) -> Self {
        Self { period, interval, length: 0, trial_period: period, trial_length: 0 }
    }

    /// Returns a copy of this schedule with a free trial attached.
    #[must_use]
    pub fn with_trial(mut self, trial_length: u32, trial_period: BillingPeriod) -> Self {
        self.trial_length = trial_length;
        self.trial_period = trial_period;
        self
    }

    /// Returns a copy of this schedule limited to `length` renewals.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Whether this schedule includes a free trial.
    #[must_use]
    pub fn has_trial(&self) -> bool {
        self.trial_length > 0
    }

    /// When the trial ends for a subscription starting at `start`, or
    /// `None` when there is no trial.
    #[must_use]
    pub fn trial_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.trial_length == 0 {
            return None;
        }
        Some(self.trial_period.advance(start, self.trial_length))
    }

    /// The first renewal date for a subscription starting at `start`.
    ///
    /// With a trial, the first charge lands at trial end; otherwise one
    /// billing interval after the start.
    #[must_use]
    pub fn first_renewal(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        self.trial_end(start)
            .unwrap_or_else(|| self.period.advance(start, self.interval))
    }

    /// When the subscription expires, or `None` for open-ended schedules.
    #[must_use]
    pub fn end_date(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.length == 0 {
            return None;
        }
        let renewals_end = self
            .period
            .advance(start, self.interval.saturating_mul(self.length));
        // A trial pushes the whole renewal run out behind it.
        match self.trial_end(start) {
            Some(trial_end) => {
                let shift = trial_end - start;
                Some(renewals_end + shift)
            }
            None => Some(renewals_end),
        }
    }
}

/// Validates a schedule attached to the given item.
///
/// # Errors
///
/// Returns [`CartCalcError::InvalidSchedule`] when the billing interval is
/// zero, which would make every renewal date equal to the start date.
pub fn validate_schedule(item_id: &str, schedule: &BillingSchedule) -> Result<()> {
    if schedule.interval == 0 {
        return Err(CartCalcError::InvalidSchedule {
            item_id: item_id.to_owned(),
            reason: "billing interval must be at least 1".to_owned(),
        });
    }
    Ok(())
}

/// Returns the day-of-month anchor for synchronized billing, clamped to 28
/// so every month of the year has the anchor day.
#[must_use]
pub fn clamp_anchor_day(day: u32) -> u32 {
    day.clamp(1, 28)
}

/// Moves `date` forward to the next occurrence of `anchor_day` in the
/// month, rolling into the next month when the day has already passed.
#[must_use]
pub fn align_to_anchor_day(date: DateTime<Utc>, anchor_day: u32) -> DateTime<Utc> {
    let target_day = clamp_anchor_day(anchor_day);
    let mut aligned = date;
    if date.day() >= target_day {
        aligned = aligned + Months::new(1);
    }
    aligned.with_day(target_day).unwrap_or(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    // ========================================================================
    // Period Advancement Tests
    // ========================================================================

    #[test]
    fn test_advance_days_and_weeks() {
        let start = date(2024, 3, 1);
        assert_eq!(BillingPeriod::Day.advance(start, 10), date(2024, 3, 11));
        assert_eq!(BillingPeriod::Week.advance(start, 2), date(2024, 3, 15));
    }

    #[test]
    fn test_advance_month_clamps_to_month_end() {
        let start = date(2024, 1, 31);
        assert_eq!(BillingPeriod::Month.advance(start, 1), date(2024, 2, 29));
    }

    #[test]
    fn test_advance_year() {
        let start = date(2024, 5, 10);
        assert_eq!(BillingPeriod::Year.advance(start, 1), date(2025, 5, 10));
    }

    // ========================================================================
    // Schedule Date Tests
    // ========================================================================

    #[test]
    fn test_trial_end_without_trial() {
        let schedule = BillingSchedule::every(1, BillingPeriod::Month);
        assert!(schedule.trial_end(date(2024, 1, 1)).is_none());
        assert!(!schedule.has_trial());
    }

    #[test]
    fn test_trial_end_with_trial() {
        let schedule =
            BillingSchedule::every(1, BillingPeriod::Month).with_trial(2, BillingPeriod::Week);
        assert!(schedule.has_trial());
        assert_eq!(schedule.trial_end(date(2024, 1, 1)), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_first_renewal_follows_trial() {
        let schedule =
            BillingSchedule::every(1, BillingPeriod::Month).with_trial(1, BillingPeriod::Week);
        assert_eq!(schedule.first_renewal(date(2024, 1, 1)), date(2024, 1, 8));
    }

    #[test]
    fn test_first_renewal_without_trial() {
        let schedule = BillingSchedule::every(3, BillingPeriod::Month);
        assert_eq!(schedule.first_renewal(date(2024, 1, 1)), date(2024, 4, 1));
    }

    #[test]
    fn test_end_date_open_ended() {
        let schedule = BillingSchedule::every(1, BillingPeriod::Month);
        assert!(schedule.end_date(date(2024, 1, 1)).is_none());
    }

    #[test]
    fn test_end_date_fixed_length() {
        let schedule = BillingSchedule::every(1, BillingPeriod::Month).with_length(12);
        assert_eq!(schedule.end_date(date(2024, 1, 1)), Some(date(2025, 1, 1)));
    }

    #[test]
    fn test_end_date_shifted_by_trial() {
        let schedule = BillingSchedule::every(1, BillingPeriod::Month)
            .with_length(1)
            .with_trial(1, BillingPeriod::Week);
        assert_eq!(schedule.end_date(date(2024, 1, 1)), Some(date(2024, 2, 8)));
    }

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut schedule = BillingSchedule::every(1, BillingPeriod::Month);
        schedule.interval = 0;
        let result = validate_schedule("item-1", &schedule);
        assert!(matches!(result, Err(CartCalcError::InvalidSchedule { .. })));
    }

    #[test]
    fn test_validate_accepts_reasonable_schedule() {
        let schedule =
            BillingSchedule::every(2, BillingPeriod::Week).with_trial(1, BillingPeriod::Month);
        assert!(validate_schedule("item-1", &schedule).is_ok());
    }

    // ========================================================================
    // Anchor Day Tests
    // ========================================================================

    #[test]
    fn test_anchor_day_clamped() {
        assert_eq!(clamp_anchor_day(0), 1);
        assert_eq!(clamp_anchor_day(15), 15);
        assert_eq!(clamp_anchor_day(31), 28);
    }

    #[test]
    fn test_align_to_future_anchor_in_same_month() {
        let aligned = align_to_anchor_day(date(2024, 3, 5), 15);
        assert_eq!(aligned, date(2024, 3, 15));
    }

    #[test]
    fn test_align_rolls_into_next_month() {
        let aligned = align_to_anchor_day(date(2024, 3, 20), 15);
        assert_eq!(aligned, date(2024, 4, 15));
    }
}
