//! Loop-back backend for tests: written values are stored per line and read
//! back, and lifecycle calls are counted so tests can assert on them.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::access::DigitalPinAccess;
use crate::backend::{DigitalPinner, clamp_bit};
use crate::config::{ConfigOption, LineConfig};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MockState {
    values: Mutex<FxHashMap<u32, i32>>,
    export_counts: Mutex<FxHashMap<u32, u32>>,
    unexport_counts: Mutex<FxHashMap<u32, u32>>,
    fail_unexport: Mutex<HashSet<u32>>,
}

impl MockState {
    pub fn value(&self, line: u32) -> i32 {
        self.values.lock().get(&line).copied().unwrap_or(0)
    }

    /// Simulates an externally driven input level.
    pub fn set_value(&self, line: u32, value: i32) {
        self.values.lock().insert(line, value);
    }

    pub fn export_count(&self, line: u32) -> u32 {
        self.export_counts.lock().get(&line).copied().unwrap_or(0)
    }

    pub fn unexport_count(&self, line: u32) -> u32 {
        self.unexport_counts.lock().get(&line).copied().unwrap_or(0)
    }

    pub fn fail_unexport(&self, line: u32) {
        self.fail_unexport.lock().insert(line);
    }
}

/// Pin accesser whose pins loop written values back to reads.
pub struct MockAccess {
    state: Arc<MockState>,
    report_cdev: bool,
}

impl Default for MockAccess {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MockAccess {
    pub fn new(report_cdev: bool) -> Self {
        Self {
            state: Arc::new(MockState::default()),
            report_cdev,
        }
    }

    pub fn state(&self) -> Arc<MockState> {
        self.state.clone()
    }
}

impl DigitalPinAccess for MockAccess {
    fn create_pin(&self, _chip: &str, line: u32) -> Box<dyn DigitalPinner> {
        Box::new(MockPin {
            line,
            cfg: LineConfig::new(format!("gpiokit{line}")),
            exported: false,
            state: self.state.clone(),
        })
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn uses_cdev(&self) -> bool {
        self.report_cdev
    }
}

struct MockPin {
    line: u32,
    cfg: LineConfig,
    exported: bool,
    state: Arc<MockState>,
}

impl DigitalPinner for MockPin {
    fn export(&mut self) -> Result<()> {
        *self
            .state
            .export_counts
            .lock()
            .entry(self.line)
            .or_default() += 1;
        self.exported = true;
        Ok(())
    }

    fn unexport(&mut self) -> Result<()> {
        if self.state.fail_unexport.lock().contains(&self.line) {
            return Err(Error::Io {
                path: format!("mock gpio{}", self.line),
                source: io::Error::other("simulated unexport failure"),
            });
        }
        *self
            .state
            .unexport_counts
            .lock()
            .entry(self.line)
            .or_default() += 1;
        self.exported = false;
        Ok(())
    }

    fn apply_options(&mut self, options: Vec<ConfigOption>) -> Result<()> {
        for option in options {
            option(&mut self.cfg);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<i32> {
        if !self.exported {
            return Err(Error::NotExported(self.line));
        }
        Ok(self.state.value(self.line))
    }

    fn write(&mut self, value: i32) -> Result<()> {
        if !self.exported {
            return Err(Error::NotExported(self.line));
        }
        self.state
            .values
            .lock()
            .insert(self.line, clamp_bit(value) as i32);
        Ok(())
    }

    fn direction(&self) -> &'static str {
        self.cfg.direction.as_str()
    }
}
