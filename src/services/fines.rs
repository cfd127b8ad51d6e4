//! Late-return fine policy

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Flat per-day late fee. Any started day past the due date counts in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    per_day_rate: Decimal,
}

impl FinePolicy {
    pub fn new(per_day_rate: Decimal) -> Self {
        Self {
            per_day_rate: per_day_rate.max(Decimal::ZERO),
        }
    }

    /// Number of started days between `due` and `returned`, 0 if on time
    pub fn late_days(due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
        let late = returned - due;
        if late <= Duration::zero() {
            return 0;
        }
        let whole_days = late.num_days();
        if late > Duration::days(whole_days) {
            whole_days + 1
        } else {
            whole_days
        }
    }

    /// Fine owed for a loan due at `due` and returned at `returned`
    pub fn compute(&self, due: DateTime<Utc>, returned: DateTime<Utc>) -> Decimal {
        Decimal::from(Self::late_days(due, returned)) * self.per_day_rate
    }
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self::new(Decimal::from(5))
    }
}
