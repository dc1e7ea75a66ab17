//! Capability discovery
//!
//! Providers enumerate the host's devices from scratch on every call.

use crate::error::DiscoveryError;
use crate::types::CapabilitySnapshot;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of USB device entries in sysfs
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/usb/devices";

/// Source of capability snapshots
pub trait CapabilityProvider: Send + Sync {
    /// Enumerate capabilities present right now
    ///
    /// # Errors
    /// Returns error if enumeration cannot run
    fn discover(&self) -> Result<CapabilitySnapshot, DiscoveryError>;
}

/// USB devices read from sysfs
///
/// Each device directory carrying `idVendor` and `idProduct` yields the
/// capability `usb.<product>.<vendor>` in lowercase hex. Interface
/// directories have no id files and are skipped.
#[derive(Debug, Clone)]
pub struct SysfsUsbProvider {
    root: PathBuf,
}

impl SysfsUsbProvider {
    /// Create provider reading device entries under `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory being enumerated
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_id(path: &Path) -> Result<Option<String>, DiscoveryError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DiscoveryError::Enumerate {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let id = raw.trim();
        if id.len() != 4 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DiscoveryError::MalformedId {
                path: path.display().to_string(),
                value: raw,
            });
        }
        Ok(Some(id.to_ascii_lowercase()))
    }
}

impl Default for SysfsUsbProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl CapabilityProvider for SysfsUsbProvider {
    fn discover(&self) -> Result<CapabilitySnapshot, DiscoveryError> {
        let enumerate_err = |source| DiscoveryError::Enumerate {
            path: self.root.display().to_string(),
            source,
        };

        let mut capabilities = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(enumerate_err)? {
            let dir = entry.map_err(enumerate_err)?.path();
            if !dir.is_dir() {
                continue;
            }

            let vendor = Self::read_id(&dir.join("idVendor"))?;
            let product = Self::read_id(&dir.join("idProduct"))?;
            match (vendor, product) {
                (Some(vendor), Some(product)) => {
                    capabilities.push((format!("usb.{product}.{vendor}"), true));
                }
                _ => debug!(entry = %dir.display(), "skipping entry without device ids"),
            }
        }

        debug!(root = %self.root.display(), devices = capabilities.len(), "enumerated usb devices");
        Ok(capabilities.into_iter().collect())
    }
}
