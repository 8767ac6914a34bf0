//! Time-of-day filter - blocks trading during configured no-trade windows.
//!
//! Lunch doldrums, end-of-session drift, overnight thin liquidity: periods
//! where patterns fail structurally. Windows are UTC wall-clock ranges and
//! may cross midnight.

use chrono::{DateTime, NaiveTime, Timelike, Utc};

use super::FilterDecision;

pub struct TimeOfDayFilter {
    pub enabled: bool,
    /// (start, end) pairs; start > end means the window crosses midnight
    pub blocked_windows: Vec<(NaiveTime, NaiveTime)>,
}

impl TimeOfDayFilter {
    pub const NAME: &'static str = "time-of-day";

    pub fn check(&self, now: DateTime<Utc>) -> FilterDecision {
        let current = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
            .unwrap_or(NaiveTime::MIN);

        for (start, end) in &self.blocked_windows {
            let inside = if start > end {
                // Crosses midnight, e.g. 18:00-08:30
                current >= *start || current <= *end
            } else {
                current >= *start && current <= *end
            };
            if inside {
                return FilterDecision::Block {
                    reason: format!(
                        "no-trade window {}-{}",
                        start.format("%H:%M"),
                        end.format("%H:%M")
                    ),
                };
            }
        }

        FilterDecision::Pass
    }
}
