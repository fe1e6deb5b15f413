// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs not exposed as CLI flags (§3): failsafe duration and the
//! limits a tripped failsafe clamps to, loaded the same way
//! `mash-controller::TuningConfig` layers a TOML file over struct
//! defaults.

use std::path::Path;
use std::time::Duration;

use mash_core::arbitration::FailsafeLimits;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_failsafe_secs")]
    pub failsafe_secs: u64,
    #[serde(default)]
    pub failsafe_consumption_limit_mw: Option<i64>,
    #[serde(default)]
    pub failsafe_production_limit_mw: Option<i64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            failsafe_secs: default_failsafe_secs(),
            failsafe_consumption_limit_mw: Some(0),
            failsafe_production_limit_mw: None,
        }
    }
}

impl TuningConfig {
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn failsafe_duration(&self) -> Duration {
        Duration::from_secs(self.failsafe_secs)
    }

    pub fn failsafe_limits(&self) -> FailsafeLimits {
        FailsafeLimits {
            consumption_limit_mw: self.failsafe_consumption_limit_mw,
            production_limit_mw: self.failsafe_production_limit_mw,
        }
    }
}

fn default_failsafe_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_clamp_consumption_to_zero() {
        let cfg: TuningConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.failsafe_limits().consumption_limit_mw, Some(0));
    }

    #[test]
    fn file_can_override_the_production_limit() {
        let cfg: TuningConfig = toml::from_str("failsafe_production_limit_mw = 500").unwrap();
        assert_eq!(cfg.failsafe_limits().production_limit_mw, Some(500));
    }
}
