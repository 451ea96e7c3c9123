use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOURS_PER_PERSON_DAY: f64 = 8.;

/// Number of working hours that make up one person-day. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct HoursPerDay(f64);

impl HoursPerDay {
    pub fn new_opt(value: f64) -> Option<HoursPerDay> {
        if value.is_finite() && value > 0. {
            Some(HoursPerDay(value))
        } else {
            None
        }
    }
}

impl Default for HoursPerDay {
    fn default() -> Self {
        HoursPerDay(DEFAULT_HOURS_PER_PERSON_DAY)
    }
}

impl Display for HoursPerDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h", self.0)
    }
}

impl FromStr for HoursPerDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches("h");
        let v = s.parse::<f64>()?;
        HoursPerDay::new_opt(v).ok_or_else(|| anyhow!("Can't use {s} as hours per person-day"))
    }
}

impl TryFrom<f64> for HoursPerDay {
    type Error = anyhow::Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        HoursPerDay::new_opt(value)
            .ok_or_else(|| anyhow!("Hours per person-day must be positive, got {value}"))
    }
}

impl From<HoursPerDay> for f64 {
    fn from(value: HoursPerDay) -> Self {
        value.0
    }
}

impl Deref for HoursPerDay {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Elapsed time expressed as a multiple of [HoursPerDay].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ManHours(f64);

impl ManHours {
    /// Minutes are not expected to be normalized: `1h 90m` is the same as `2h 30m`.
    pub fn from_elapsed(hours: u32, minutes: u32, hours_per_day: HoursPerDay) -> ManHours {
        let total_hours = hours as f64 + minutes as f64 / 60.;
        ManHours(total_hours / *hours_per_day)
    }
}

impl Display for ManHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Deref for ManHours {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
