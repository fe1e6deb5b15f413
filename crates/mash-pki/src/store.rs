// SPDX-License-Identifier: Apache-2.0 OR MIT

//! On-disk certificate store (§4.4): device side keeps one zone-CA cert and
//! one operational cert per zone, capped at `MAX_ZONES`; the controller side
//! additionally keeps its own Zone CA private key and a roster of
//! commissioned device records.

use std::fs;
use std::path::{Path, PathBuf};

use mash_core::ZoneType;
use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

/// Hard cap on zones a device or controller will hold material for (§4.4,
/// §9 open question: treated as the hard cap, not the typical {GRID,LOCAL}
/// deployment size).
pub const MAX_ZONES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneMeta {
    version: u32,
    zone_id: String,
    zone_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub subject_key_id_hex: String,
    pub device_type: String,
}

/// Device-side material for a single joined zone: the zone CA's cert (for
/// verifying peers claiming that zone) and this device's own operational
/// cert + key.
pub struct ZoneMaterial {
    pub zone_id: String,
    pub zone_type: ZoneType,
    pub zone_ca_cert_pem: String,
    pub operational_cert_pem: String,
    pub operational_key_pem: String,
}

/// Device-side cert store: zero to `MAX_ZONES` joined zones.
pub struct FileCertStore {
    root: PathBuf,
}

impl FileCertStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("zones"))?;
        Ok(Self { root })
    }

    fn zone_dir(&self, zone_id: &str) -> PathBuf {
        self.root.join("zones").join(zone_id)
    }

    pub fn list_zones(&self) -> Result<Vec<String>> {
        let dir = self.root.join("zones");
        let mut out = Vec::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                if entry.path().is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        out.push(name.to_string());
                    }
                }
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn store_zone(&self, material: &ZoneMaterial) -> Result<()> {
        let existing = self.list_zones()?;
        if !existing.contains(&material.zone_id) && existing.len() >= MAX_ZONES {
            return Err(PkiError::Exhausted(MAX_ZONES));
        }
        let dir = self.zone_dir(&material.zone_id);
        fs::create_dir_all(&dir)?;

        write_cert_file(&dir.join("operational.pem"), &material.operational_cert_pem)?;
        write_key_file(&dir.join("operational.key"), &material.operational_key_pem)?;
        write_cert_file(&dir.join("zone-ca.pem"), &material.zone_ca_cert_pem)?;

        let meta = ZoneMeta {
            version: 1,
            zone_id: material.zone_id.clone(),
            zone_type: material.zone_type.label().to_string(),
        };
        write_json_atomic(&dir.join("zone.json"), &meta)?;
        Ok(())
    }

    pub fn load_zone(&self, zone_id: &str) -> Result<ZoneMaterial> {
        let dir = self.zone_dir(zone_id);
        if !dir.exists() {
            return Err(PkiError::ZoneNotFound(zone_id.to_string()));
        }
        let meta: ZoneMeta = read_json(&dir.join("zone.json"))?;
        let zone_type =
            ZoneType::from_label(&meta.zone_type).ok_or_else(|| PkiError::Parse(meta.zone_type.clone()))?;
        Ok(ZoneMaterial {
            zone_id: meta.zone_id,
            zone_type,
            zone_ca_cert_pem: fs::read_to_string(dir.join("zone-ca.pem"))?,
            operational_cert_pem: fs::read_to_string(dir.join("operational.pem"))?,
            operational_key_pem: fs::read_to_string(dir.join("operational.key"))?,
        })
    }

    pub fn remove_zone(&self, zone_id: &str) -> Result<()> {
        let dir = self.zone_dir(zone_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Controller-side store: its own Zone CA (with private key), its own
/// operational cert, and the roster of commissioned device records.
pub struct ControllerCertStore {
    root: PathBuf,
}

impl ControllerCertStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("controller").join("devices"))?;
        Ok(Self { root })
    }

    fn controller_dir(&self) -> PathBuf {
        self.root.join("controller")
    }

    pub fn store_zone_ca(&self, zone_id: &str, zone_type: ZoneType, ca_cert_pem: &str, ca_key_pem: &str) -> Result<()> {
        let dir = self.controller_dir();
        write_cert_file(&dir.join("zone-ca.pem"), ca_cert_pem)?;
        write_key_file(&dir.join("zone-ca.key"), ca_key_pem)?;
        let meta = ZoneMeta {
            version: 1,
            zone_id: zone_id.to_string(),
            zone_type: zone_type.label().to_string(),
        };
        write_json_atomic(&dir.join("zone-ca.json"), &meta)?;
        Ok(())
    }

    pub fn load_zone_ca_pem(&self) -> Result<(String, String)> {
        let dir = self.controller_dir();
        Ok((
            fs::read_to_string(dir.join("zone-ca.pem"))?,
            fs::read_to_string(dir.join("zone-ca.key"))?,
        ))
    }

    pub fn store_own_operational_cert(&self, cert_pem: &str, key_pem: &str) -> Result<()> {
        let dir = self.controller_dir();
        write_cert_file(&dir.join("controller.pem"), cert_pem)?;
        write_key_file(&dir.join("controller.key"), key_pem)?;
        Ok(())
    }

    /// `Err` if `store_own_operational_cert` was never called for this store.
    pub fn load_own_operational_cert(&self) -> Result<(String, String)> {
        let dir = self.controller_dir();
        Ok((
            fs::read_to_string(dir.join("controller.pem"))?,
            fs::read_to_string(dir.join("controller.key"))?,
        ))
    }

    pub fn has_own_operational_cert(&self) -> bool {
        self.controller_dir().join("controller.pem").exists()
    }

    fn device_dir(&self, device_id: &str) -> PathBuf {
        self.controller_dir().join("devices").join(device_id)
    }

    pub fn add_device(&self, record: &DeviceRecord) -> Result<()> {
        let dir = self.device_dir(&record.device_id);
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir.join("info.json"), record)?;
        Ok(())
    }

    pub fn remove_device(&self, device_id: &str) -> Result<()> {
        let dir = self.device_dir(device_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        let dir = self.controller_dir().join("devices");
        let mut out = Vec::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let info = entry.path().join("info.json");
                if info.exists() {
                    out.push(read_json(&info)?);
                }
            }
        }
        Ok(out)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    set_perms(path, 0o644)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn write_cert_file(path: &Path, pem: &str) -> Result<()> {
    fs::write(path, pem)?;
    set_perms(path, 0o644)?;
    Ok(())
}

fn write_key_file(path: &Path, pem: &str) -> Result<()> {
    fs::write(path, pem)?;
    set_perms(path, 0o600)?;
    Ok(())
}

#[cfg(unix)]
fn set_perms(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_perms(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operational::{OperationalCert, OperationalCsr};
    use crate::zone_ca::ZoneCa;

    fn sample_material(zone_id: &str) -> ZoneMaterial {
        let ca = ZoneCa::generate(zone_id, ZoneType::Grid).unwrap();
        let csr = OperationalCsr::generate("device-1").unwrap();
        let cert = OperationalCert::issue(&ca, &csr.der).unwrap();
        ZoneMaterial {
            zone_id: zone_id.to_string(),
            zone_type: ZoneType::Grid,
            zone_ca_cert_pem: ca.cert_pem(),
            operational_cert_pem: cert.cert_pem(),
            operational_key_pem: csr.key_pair.serialize_pem(),
        }
    }

    #[test]
    fn stores_and_loads_a_zone_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCertStore::open(dir.path()).unwrap();
        store.store_zone(&sample_material("zone-a")).unwrap();
        let loaded = store.load_zone("zone-a").unwrap();
        assert_eq!(loaded.zone_id, "zone-a");
        assert_eq!(loaded.zone_type, ZoneType::Grid);
    }

    #[test]
    fn max_zones_cap_rejects_the_sixth_without_mutating_the_first_five() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCertStore::open(dir.path()).unwrap();
        for i in 0..MAX_ZONES {
            store.store_zone(&sample_material(&format!("zone-{i}"))).unwrap();
        }
        let err = store.store_zone(&sample_material("zone-overflow"));
        assert!(matches!(err, Err(PkiError::Exhausted(MAX_ZONES))));
        assert_eq!(store.list_zones().unwrap().len(), MAX_ZONES);
    }
}
