// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-zone device membership (§4.4, §4.7): one `FailsafeTimer` per joined
//! zone, keyed the same way `FileCertStore` keys cert material, plus the
//! atomic-JSON persistence pattern `mash-pki::store` already uses for
//! everything else this crate needs to survive a restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mash_core::arbitration::{FailsafeLimits, FailsafeSnapshot, FailsafeTimer};
use mash_core::ZoneType;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SnapshotDocument {
    version: u32,
    snapshots: Vec<FailsafeSnapshot>,
}

/// All zones this device currently holds material and a failsafe clock for.
/// Cert material itself still lives in `mash_pki::FileCertStore`; this adds
/// the runtime piece the store has no business knowing about.
pub struct ZoneMembership {
    path: PathBuf,
    timers: RwLock<HashMap<String, FailsafeTimer>>,
}

impl ZoneMembership {
    pub fn open(state_dir: &Path, default_limits: FailsafeLimits, duration_secs: u64) -> Result<Self> {
        let path = state_dir.join("failsafe.json");
        let timers = RwLock::new(HashMap::new());
        let membership = Self { path, timers };
        membership.restore(default_limits, duration_secs)?;
        Ok(membership)
    }

    fn restore(&self, default_limits: FailsafeLimits, duration_secs: u64) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read(&self.path)?;
        let doc: SnapshotDocument = serde_json::from_slice(&data)?;
        if doc.version != 1 {
            return Err(crate::error::DeviceError::UnsupportedStateVersion(doc.version));
        }
        let now = SystemTime::now();
        let mut timers = self.timers.write();
        for snapshot in doc.snapshots {
            let zone_id = snapshot.zone_id.clone();
            let zone_type_label = snapshot.zone_type.clone();
            let restored = FailsafeTimer::restore(snapshot, now).unwrap_or_else(|| {
                let zone_type = ZoneType::from_label(&zone_type_label).unwrap_or(ZoneType::Local);
                FailsafeTimer::new(zone_id.clone(), zone_type, std::time::Duration::from_secs(duration_secs), default_limits, now)
            });
            timers.insert(zone_id, restored);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let now = SystemTime::now();
        let timers = self.timers.read();
        let snapshots = timers.values().map(|t| t.save(now)).collect();
        let doc = SnapshotDocument { version: 1, snapshots };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Arms a new failsafe clock for a freshly joined zone (no-op if the
    /// zone is already tracked, e.g. after a restart beat this call to it).
    pub fn join(&self, zone_id: &str, zone_type: ZoneType, duration_secs: u64, limits: FailsafeLimits) {
        let mut timers = self.timers.write();
        timers.entry(zone_id.to_string()).or_insert_with(|| {
            FailsafeTimer::new(zone_id.to_string(), zone_type, std::time::Duration::from_secs(duration_secs), limits, SystemTime::now())
        });
    }

    pub fn leave(&self, zone_id: &str) {
        self.timers.write().remove(zone_id);
    }

    pub fn on_contact(&self, zone_id: &str) {
        if let Some(timer) = self.timers.write().get_mut(zone_id) {
            timer.on_contact(SystemTime::now());
        }
    }

    pub fn try_clear(&self, zone_id: &str, caller_zone_type: ZoneType) -> bool {
        self.timers
            .write()
            .get_mut(zone_id)
            .map(|t| t.try_clear(caller_zone_type, SystemTime::now()))
            .unwrap_or(false)
    }

    /// Ticks every tracked zone; returns the zones that tripped this tick
    /// along with the limits the caller should assert as an override.
    pub fn tick(&self) -> Vec<(String, FailsafeLimits)> {
        let now = SystemTime::now();
        let mut tripped = Vec::new();
        for (zone_id, timer) in self.timers.write().iter_mut() {
            if let Some(limits) = timer.tick(now) {
                tripped.push((zone_id.clone(), limits));
            }
        }
        tripped
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.timers.read().keys().cloned().collect()
    }
}
