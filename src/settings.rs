//! Persistent settings stored as `settings.json` in the application directory.

use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    tracker::{DEFAULT_TICK_PERIOD, MAX_TICK_PERIOD},
    utils::man_hours::HoursPerDay,
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hours_per_person_day: HoursPerDay,
    /// How often a running tracker accrues time.
    pub tick_period_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hours_per_person_day: HoursPerDay::default(),
            tick_period_secs: DEFAULT_TICK_PERIOD.as_secs(),
        }
    }
}

impl Settings {
    /// Reads settings from `dir`. A missing file yields the defaults.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Settings>(&content)
                .with_context(|| format!("Malformed settings in {path:?}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {path:?}, using defaults");
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.validated()
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(dir.join(SETTINGS_FILE), content).await?;
        Ok(())
    }

    /// Applies values given for a single run on top of the stored ones.
    pub fn with_overrides(
        self,
        hours_per_person_day: Option<HoursPerDay>,
        tick_period_secs: Option<u64>,
    ) -> Result<Self> {
        Self {
            hours_per_person_day: hours_per_person_day.unwrap_or(self.hours_per_person_day),
            tick_period_secs: tick_period_secs.unwrap_or(self.tick_period_secs),
        }
        .validated()
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }

    fn validated(self) -> Result<Self> {
        if self.tick_period_secs == 0 {
            bail!("Tick period must be at least one second");
        }
        if self.tick_period() > MAX_TICK_PERIOD {
            bail!(
                "Tick period must be at most {}s",
                MAX_TICK_PERIOD.as_secs()
            );
        }
        Ok(self)
    }
}
