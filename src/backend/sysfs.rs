//! Legacy sysfs GPIO backend, driving the `/sys/class/gpio` file tree.
//!
//! Options this ABI cannot express (bias, drive, debounce, native edge
//! detection) are accepted and left unapplied; edge detection is only
//! available through the discrete polling fallback.

use std::fs;
use std::path::PathBuf;

use log::debug;

use crate::backend::{DigitalPinner, EdgePoller, clamp_bit};
use crate::config::{ConfigOption, Direction, EdgeDetect, LineConfig};
use crate::error::{Error, Result};

pub const SYSFS_ROOT: &str = "/sys/class/gpio";

pub struct SysfsPin {
    root: PathBuf,
    line: u32,
    cfg: LineConfig,
    exported: bool,
    poller: Option<EdgePoller>,
}

impl SysfsPin {
    pub fn new(root: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            root: root.into(),
            line,
            cfg: LineConfig::new(format!("gpiokit{line}")),
            exported: false,
            poller: None,
        }
    }

    fn line_path(&self, file: &str) -> PathBuf {
        self.root.join(format!("gpio{}", self.line)).join(file)
    }

    fn write_file(&self, path: PathBuf, contents: &str) -> Result<()> {
        fs::write(&path, contents).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn read_file(&self, path: PathBuf) -> Result<String> {
        fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes the files this ABI knows about: `direction` (with the initial
    /// value for outputs) and `active_low`. Does not touch the export state,
    /// so a live pin can be reconfigured in place.
    fn write_settings(&mut self) -> Result<()> {
        match self.cfg.direction {
            Direction::Input => {
                self.write_file(self.line_path("direction"), "in")?;
            }
            Direction::Output => {
                self.write_file(self.line_path("direction"), "out")?;
                let initial = clamp_bit(self.cfg.initial_output);
                self.write_file(self.line_path("value"), &initial.to_string())?;
            }
            Direction::Unset => {}
        }
        let active_low = if self.cfg.active_low { "1" } else { "0" };
        self.write_file(self.line_path("active_low"), active_low)
    }

    fn sync_poller(&mut self) {
        self.poller = None;
        if !self.exported || self.cfg.edge == EdgeDetect::None {
            return;
        }
        let Some(handler) = self.cfg.handler.clone() else {
            return;
        };
        if self.cfg.poll_interval.is_zero() {
            debug!(
                "gpio{}: edge detection on sysfs needs the polling fallback",
                self.line
            );
            return;
        }
        let value_path = self.line_path("value");
        let reader = Box::new(move || {
            fs::read_to_string(&value_path)
                .ok()
                .and_then(|s| s.trim().parse::<i32>().ok())
        });
        self.poller = Some(EdgePoller::spawn(
            self.line,
            self.cfg.poll_interval,
            self.cfg.poll_quit.clone(),
            self.cfg.edge,
            handler,
            reader,
        ));
    }
}

impl DigitalPinner for SysfsPin {
    fn export(&mut self) -> Result<()> {
        let export_path = self.root.join("export");
        if let Err(err) = self.write_file(export_path, &self.line.to_string()) {
            // EBUSY means the line is already exported, which is fine
            let busy = matches!(
                &err,
                Error::Io { source, .. } if source.raw_os_error() == Some(libc::EBUSY)
            );
            if !busy {
                return Err(err);
            }
            debug!("gpio{} was already exported", self.line);
        }
        self.exported = true;
        self.write_settings()?;
        self.sync_poller();
        Ok(())
    }

    fn unexport(&mut self) -> Result<()> {
        self.poller = None;
        self.exported = false;
        // an already unexported line surfaces the underlying not-found error
        self.write_file(self.root.join("unexport"), &self.line.to_string())
    }

    fn apply_options(&mut self, options: Vec<ConfigOption>) -> Result<()> {
        let mut changed = false;
        for option in options {
            changed |= option(&mut self.cfg);
        }
        if changed && self.exported {
            self.write_settings()?;
            self.sync_poller();
        }
        Ok(())
    }

    fn read(&mut self) -> Result<i32> {
        let path = self.line_path("value");
        let raw = self.read_file(path.clone())?;
        raw.trim().parse().map_err(|_| Error::Parse {
            path: path.display().to_string(),
            value: raw,
        })
    }

    fn write(&mut self, value: i32) -> Result<()> {
        let value = clamp_bit(value);
        self.write_file(self.line_path("value"), &value.to_string())
    }

    fn direction(&self) -> &'static str {
        self.cfg.direction.as_str()
    }
}
