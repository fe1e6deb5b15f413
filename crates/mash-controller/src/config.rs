// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tuning knobs not exposed as CLI flags (§3): per-request timeout. Loaded
//! from an optional TOML file with hardcoded defaults when absent, the way
//! `hdds`'s `qos-loaders` layer a file format over struct defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self { request_timeout_ms: default_request_timeout_ms() }
    }
}

impl TuningConfig {
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_is_absent_fields() {
        let cfg: TuningConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.request_timeout_ms, 10_000);
    }

    #[test]
    fn file_can_override_the_request_timeout() {
        let cfg: TuningConfig = toml::from_str("request_timeout_ms = 5000").unwrap();
        assert_eq!(cfg.request_timeout_ms, 5000);
    }
}
