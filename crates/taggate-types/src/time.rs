use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Length of every rolling window (tag density, quotas, IP throttling).
pub const HOUR_MS: i64 = 3_600_000;
pub const MONTH_MS: i64 = 2_628_000_000;
pub const SIX_MONTHS_MS: i64 = 15_770_000_000;
pub const YEAR_MS: i64 = 31_560_000_000;
pub const TWO_YEARS_MS: i64 = 63_120_000_000;

pub fn hour() -> TimeDelta {
    TimeDelta::milliseconds(HOUR_MS)
}

/// Premium deals. Each deal is identified by its exact duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deal {
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Deal {
    pub const ALL: [Deal; 4] = [Deal::Silver, Deal::Gold, Deal::Platinum, Deal::Diamond];

    pub fn duration_ms(self) -> i64 {
        match self {
            Deal::Silver => MONTH_MS,
            Deal::Gold => SIX_MONTHS_MS,
            Deal::Platinum => YEAR_MS,
            Deal::Diamond => TWO_YEARS_MS,
        }
    }

    pub fn duration(self) -> TimeDelta {
        TimeDelta::milliseconds(self.duration_ms())
    }

    /// Look up the deal whose duration is exactly `ms`.
    pub fn from_duration_ms(ms: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|deal| deal.duration_ms() == ms)
    }
}
