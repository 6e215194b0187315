//! Backend selection: decides once, per adaptor, whether digital pins go
//! through the character-device or the legacy sysfs interface.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::backend::DigitalPinner;
use crate::backend::cdev::CdevPin;
use crate::backend::sysfs::{SYSFS_ROOT, SysfsPin};

pub const DEV_ROOT: &str = "/dev";

/// Caller preference for the pin backend. `Auto` probes for character-device
/// support and falls back to sysfs; a forced choice skips the probe entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPreference {
    #[default]
    Auto,
    Cdev,
    Sysfs,
}

/// Creates backend-specific pins and answers which backend is active.
/// Scoped to one adaptor instance, never process-global, so boards with
/// different backends can coexist in one process.
pub trait DigitalPinAccess: Send + Sync {
    fn create_pin(&self, chip: &str, line: u32) -> Box<dyn DigitalPinner>;
    fn is_supported(&self) -> bool;
    fn uses_cdev(&self) -> bool;
    fn uses_sysfs(&self) -> bool {
        !self.uses_cdev()
    }
}

pub struct CdevAccess {
    dev_root: PathBuf,
}

impl CdevAccess {
    pub fn new(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
        }
    }
}

impl DigitalPinAccess for CdevAccess {
    fn create_pin(&self, chip: &str, line: u32) -> Box<dyn DigitalPinner> {
        let chip = if chip.is_empty() { "gpiochip0" } else { chip };
        Box::new(CdevPin::new(&self.dev_root, chip, line))
    }

    fn is_supported(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.dev_root) else {
            return false;
        };
        entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
    }

    fn uses_cdev(&self) -> bool {
        true
    }
}

pub struct SysfsAccess {
    root: PathBuf,
}

impl SysfsAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DigitalPinAccess for SysfsAccess {
    fn create_pin(&self, _chip: &str, line: u32) -> Box<dyn DigitalPinner> {
        Box::new(SysfsPin::new(&self.root, line))
    }

    // assumed always present on Linux
    fn is_supported(&self) -> bool {
        true
    }

    fn uses_cdev(&self) -> bool {
        false
    }
}

/// Resolves the accesser for the default filesystem roots.
pub fn resolve_access(preference: AccessPreference) -> Box<dyn DigitalPinAccess> {
    resolve_access_at(preference, Path::new(DEV_ROOT), Path::new(SYSFS_ROOT))
}

/// Resolution against explicit roots; for a fixed filesystem state the same
/// preference always yields the same backend.
pub fn resolve_access_at(
    preference: AccessPreference,
    dev_root: &Path,
    sysfs_root: &Path,
) -> Box<dyn DigitalPinAccess> {
    match preference {
        AccessPreference::Cdev => Box::new(CdevAccess::new(dev_root)),
        AccessPreference::Sysfs => Box::new(SysfsAccess::new(sysfs_root)),
        AccessPreference::Auto => {
            let cdev = CdevAccess::new(dev_root);
            if cdev.is_supported() {
                debug!("using character-device access for digital pins");
                Box::new(cdev)
            } else {
                debug!("no gpiochip device found in {}, falling back to sysfs", dev_root.display());
                Box::new(SysfsAccess::new(sysfs_root))
            }
        }
    }
}
