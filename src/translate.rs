//! Pin-name translation: maps a board's human-facing pin label to the
//! addressing scheme of the active backend.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::access::DigitalPinAccess;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct CdevRef {
    pub chip: u32,
    pub line: u32,
}

/// Both encodings of one line: the legacy sysfs number and the (chip, line)
/// pair. Which one applies depends on the active backend.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct PinDefinition {
    pub sysfs: u32,
    pub cdev: CdevRef,
}

/// Per-board table, label to line; pure data supplied by platform packages.
pub type PinDefinitions = FxHashMap<String, PinDefinition>;

pub fn load_definitions<P: AsRef<Path>>(path: P) -> Result<PinDefinitions> {
    let contents = fs::read_to_string(&path).map_err(|e| {
        Error::Definitions(format!("failed to read {}: {e}", path.as_ref().display()))
    })?;
    serde_json::from_str(&contents).map_err(|e| Error::Definitions(format!("invalid json: {e}")))
}

/// Looks up `id` and returns the addressing for the active backend: an empty
/// chip name plus the sysfs line number, or `gpiochip<N>` plus the offset.
pub fn translate(
    definitions: &PinDefinitions,
    access: &dyn DigitalPinAccess,
    id: &str,
) -> Result<(String, u32)> {
    let def = definitions
        .get(id)
        .ok_or_else(|| Error::InvalidPin(id.to_string()))?;
    if access.uses_cdev() {
        Ok((format!("gpiochip{}", def.cdev.chip), def.cdev.line))
    } else {
        Ok((String::new(), def.sysfs))
    }
}
