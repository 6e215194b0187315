//! Character-device GPIO backend, using the kernel v2 line-request ABI
//! against `/dev/gpiochipN`.
//!
//! The chip descriptor is only held open for the duration of a line request;
//! the line descriptor returned by the kernel is the single long-lived
//! resource a pin owns.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;

use crate::backend::uapi::{self, LineFlags};
use crate::backend::{DigitalPinner, EdgePoller, clamp_bit};
use crate::config::{
    Bias, ConfigOption, Direction, Drive, EdgeDetect, EdgeEvent, EdgeEventHandler, LineConfig,
};
use crate::error::{Error, Result};

const EVENT_WAIT_TIMEOUT_MS: libc::c_int = 10;

pub struct CdevPin {
    chip: String,
    chip_path: PathBuf,
    line: u32,
    cfg: LineConfig,
    fd: Option<OwnedFd>,
    listener: Option<EdgeListener>,
    poller: Option<EdgePoller>,
}

impl CdevPin {
    pub fn new(dev_root: impl AsRef<Path>, chip: impl Into<String>, line: u32) -> Self {
        let chip = chip.into();
        Self {
            chip_path: dev_root.as_ref().join(&chip),
            chip,
            line,
            cfg: LineConfig::new(format!("gpiokit{line}")),
            fd: None,
            listener: None,
            poller: None,
        }
    }

    fn ioctl_err(&self, op: &'static str) -> impl FnOnce(Errno) -> Error {
        let chip = self.chip.clone();
        let line = self.line;
        move |source| Error::Ioctl {
            op,
            chip,
            line,
            source,
        }
    }

    /// Opens the chip, validates it and issues the v2 line request. The chip
    /// descriptor is closed again on every path out of here; only the line
    /// descriptor handed back by the kernel stays open.
    fn request_line(&mut self) -> Result<()> {
        let chip = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.chip_path)
            .map_err(|source| Error::Io {
                path: self.chip_path.display().to_string(),
                source,
            })?;

        let mut info = uapi::ChipInfo::zeroed();
        unsafe { uapi::gpio_get_chipinfo(chip.as_raw_fd(), &mut info) }
            .map_err(self.ioctl_err("chip-info"))?;
        if self.line >= info.lines {
            return Err(Error::InvalidLine {
                chip: self.chip.clone(),
                line: self.line,
                lines: info.lines,
            });
        }

        let mut request = build_request(&self.cfg, self.line);
        unsafe { uapi::gpio_v2_get_line(chip.as_raw_fd(), &mut request) }
            .map_err(self.ioctl_err("line-request"))?;

        debug!(
            "requested {} line {} as {:?} on {}",
            self.chip,
            self.line,
            LineFlags::from_bits_truncate(request.config.flags),
            uapi::name_to_string(&info.name),
        );
        self.fd = Some(unsafe { OwnedFd::from_raw_fd(request.fd) });
        Ok(())
    }

    fn start_event_delivery(&mut self) {
        self.listener = None;
        self.poller = None;
        if self.cfg.edge == EdgeDetect::None {
            return;
        }
        let Some(handler) = self.cfg.handler.clone() else {
            return;
        };
        let Some(fd) = &self.fd else {
            return;
        };
        let raw = fd.as_raw_fd();

        if self.cfg.poll_interval.is_zero() {
            self.listener = Some(EdgeListener::spawn(
                raw,
                self.line,
                handler,
                self.cfg.poll_quit.clone(),
            ));
        } else {
            let reader = Box::new(move || {
                let mut values = uapi::LineValues { bits: 0, mask: 1 };
                unsafe { uapi::gpio_v2_line_get_values(raw, &mut values) }
                    .ok()
                    .map(|_| (values.bits & 1) as i32)
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
}

impl DigitalPinner for CdevPin {
    fn export(&mut self) -> Result<()> {
        if self.fd.is_some() {
            return Ok(());
        }
        self.request_line()?;
        self.start_event_delivery();
        Ok(())
    }

    fn unexport(&mut self) -> Result<()> {
        // listener threads hold the raw descriptor, join them before closing
        self.listener = None;
        self.poller = None;
        if let Some(fd) = self.fd.take() {
            nix::unistd::close(fd.into_raw_fd()).map_err(self.ioctl_err("close"))?;
        }
        Ok(())
    }

    fn apply_options(&mut self, options: Vec<ConfigOption>) -> Result<()> {
        let mut changed = false;
        for option in options {
            changed |= option(&mut self.cfg);
        }
        // an in-use line cannot change flags, tear it down and request anew
        if changed && self.fd.is_some() {
            debug!("reconfiguring {} line {}", self.chip, self.line);
            self.unexport()?;
            self.export()?;
        }
        Ok(())
    }

    fn read(&mut self) -> Result<i32> {
        let Some(fd) = &self.fd else {
            return Err(Error::NotExported(self.line));
        };
        let mut values = uapi::LineValues { bits: 0, mask: 1 };
        unsafe { uapi::gpio_v2_line_get_values(fd.as_raw_fd(), &mut values) }
            .map_err(self.ioctl_err("get-values"))?;
        Ok((values.bits & 1) as i32)
    }

    fn write(&mut self, value: i32) -> Result<()> {
        let Some(fd) = &self.fd else {
            return Err(Error::NotExported(self.line));
        };
        let mut values = uapi::LineValues {
            bits: clamp_bit(value) as u64,
            mask: 1,
        };
        unsafe { uapi::gpio_v2_line_set_values(fd.as_raw_fd(), &mut values) }
            .map_err(self.ioctl_err("set-values"))?;
        Ok(())
    }

    fn direction(&self) -> &'static str {
        self.cfg.direction.as_str()
    }
}

impl Drop for CdevPin {
    fn drop(&mut self) {
        if self.fd.is_some() {
            let _ = self.unexport();
        }
    }
}

/// Derives the v2 request flag bitmask from a line configuration. Options
/// that do not apply to the configured direction are left out rather than
/// rejected.
fn line_flags(cfg: &LineConfig) -> LineFlags {
    let mut flags = LineFlags::empty();
    if cfg.active_low {
        flags |= LineFlags::ACTIVE_LOW;
    }
    match cfg.direction {
        Direction::Output => {
            flags |= LineFlags::OUTPUT;
            match cfg.drive {
                Drive::PushPull => {}
                Drive::OpenDrain => flags |= LineFlags::OPEN_DRAIN,
                Drive::OpenSource => flags |= LineFlags::OPEN_SOURCE,
            }
        }
        Direction::Input | Direction::Unset => {
            flags |= LineFlags::INPUT;
            match cfg.bias {
                Bias::Default => {}
                Bias::Disabled => flags |= LineFlags::BIAS_DISABLED,
                Bias::PullUp => flags |= LineFlags::BIAS_PULL_UP,
                Bias::PullDown => flags |= LineFlags::BIAS_PULL_DOWN,
            }
            // native edge flags only when not using the polling fallback
            if cfg.poll_interval.is_zero() {
                match cfg.edge {
                    EdgeDetect::None => {}
                    EdgeDetect::Rising => flags |= LineFlags::EDGE_RISING,
                    EdgeDetect::Falling => flags |= LineFlags::EDGE_FALLING,
                    EdgeDetect::Both => {
                        flags |= LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING;
                    }
                }
                if cfg.edge != EdgeDetect::None {
                    flags |= LineFlags::EVENT_CLOCK_REALTIME;
                }
            }
        }
    }
    flags
}

fn build_request(cfg: &LineConfig, line: u32) -> uapi::LineRequest {
    let mut request = uapi::LineRequest::zeroed();
    request.offsets[0] = line;
    request.num_lines = 1;
    uapi::copy_name(&cfg.label, &mut request.consumer);
    request.config.flags = line_flags(cfg).bits();

    let mut num_attrs = 0usize;
    if cfg.direction == Direction::Output {
        let attr = &mut request.config.attrs[num_attrs];
        attr.attr.id = uapi::LINE_ATTR_ID_OUTPUT_VALUES;
        attr.attr.value.values = clamp_bit(cfg.initial_output) as u64;
        attr.mask = 1;
        num_attrs += 1;
    }
    if cfg.direction != Direction::Output && !cfg.debounce.is_zero() {
        let attr = &mut request.config.attrs[num_attrs];
        attr.attr.id = uapi::LINE_ATTR_ID_DEBOUNCE;
        attr.attr.value.debounce_period_us = cfg.debounce.as_micros() as u32;
        attr.mask = 1;
        num_attrs += 1;
    }
    request.config.num_attrs = num_attrs as u32;
    request
}

/// Blocks on the line descriptor for native edge events and dispatches them
/// to the configured handler. Cancelled and joined on drop.
struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn spawn(
        fd: RawFd,
        line: u32,
        handler: EdgeEventHandler,
        quit: Option<Arc<AtomicBool>>,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();

        let handle = std::thread::spawn(move || {
            loop {
                if cancel_flag.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(quit) = &quit
                    && quit.load(Ordering::Relaxed)
                {
                    break;
                }

                let mut pfd = libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                let ready = unsafe { libc::poll(&mut pfd, 1, EVENT_WAIT_TIMEOUT_MS) };
                if ready < 0 {
                    let errno = Errno::last();
                    if errno != Errno::EINTR {
                        warn!("event wait failed for line {line}: {errno}");
                    }
                    continue;
                }
                if ready == 0 || pfd.revents & libc::POLLIN == 0 {
                    continue;
                }

                let mut event = uapi::LineEvent::zeroed();
                let wanted = size_of::<uapi::LineEvent>();
                let got = unsafe {
                    libc::read(
                        fd,
                        (&raw mut event).cast::<libc::c_void>(),
                        wanted,
                    )
                };
                if got != wanted as isize {
                    warn!("short event read for line {line}: {got} of {wanted} bytes");
                    continue;
                }

                let edge = match event.id {
                    uapi::LINE_EVENT_RISING_EDGE => EdgeDetect::Rising,
                    uapi::LINE_EVENT_FALLING_EDGE => EdgeDetect::Falling,
                    _ => continue,
                };
                handler(EdgeEvent {
                    line_offset: event.offset,
                    timestamp: Duration::from_nanos(event.timestamp_ns),
                    edge,
                    seqno: event.seqno,
                    line_seqno: event.line_seqno,
                });
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        with_active_low, with_debounce, with_direction_input, with_direction_output,
        with_edge_rising, with_open_drain, with_pull_up,
    };

    fn configured(options: Vec<ConfigOption>) -> LineConfig {
        let mut cfg = LineConfig::new("test");
        for option in options {
            option(&mut cfg);
        }
        cfg
    }

    #[test]
    fn input_flags_carry_bias_and_edges() {
        let handler: EdgeEventHandler = Arc::new(|_| {});
        let cfg = configured(vec![
            with_direction_input(),
            with_active_low(),
            with_pull_up(),
            with_edge_rising(handler),
        ]);
        let flags = line_flags(&cfg);
        assert!(flags.contains(
            LineFlags::INPUT
                | LineFlags::ACTIVE_LOW
                | LineFlags::BIAS_PULL_UP
                | LineFlags::EDGE_RISING
                | LineFlags::EVENT_CLOCK_REALTIME
        ));
        assert!(!flags.intersects(LineFlags::OUTPUT | LineFlags::EDGE_FALLING));
    }

    #[test]
    fn direction_mismatched_options_are_ignored() {
        // drive mode on an input must not leak into the bitmask
        let cfg = configured(vec![with_direction_input(), with_open_drain()]);
        assert!(!line_flags(&cfg).contains(LineFlags::OPEN_DRAIN));

        // bias on an output must not either
        let cfg = configured(vec![with_direction_output(0), with_pull_up()]);
        assert!(!line_flags(&cfg).contains(LineFlags::BIAS_PULL_UP));
    }

    #[test]
    fn output_request_carries_initial_value_attribute() {
        let cfg = configured(vec![with_direction_output(5)]);
        let request = build_request(&cfg, 17);
        assert_eq!(request.offsets[0], 17);
        assert_eq!(request.num_lines, 1);
        assert_eq!(request.config.num_attrs, 1);
        let attr = request.config.attrs[0];
        assert_eq!(attr.attr.id, uapi::LINE_ATTR_ID_OUTPUT_VALUES);
        // 5 clamps to 1
        assert_eq!(unsafe { attr.attr.value.values }, 1);
        assert_eq!(attr.mask, 1);
    }

    #[test]
    fn input_request_carries_debounce_attribute() {
        let cfg = configured(vec![
            with_direction_input(),
            with_debounce(Duration::from_millis(2)),
        ]);
        let request = build_request(&cfg, 4);
        assert_eq!(request.config.num_attrs, 1);
        let attr = request.config.attrs[0];
        assert_eq!(attr.attr.id, uapi::LINE_ATTR_ID_DEBOUNCE);
        assert_eq!(unsafe { attr.attr.value.debounce_period_us }, 2000);
    }

    #[test]
    fn apply_options_on_unrequested_pin_only_mutates_config() {
        let mut pin = CdevPin::new("/dev", "gpiochip0", 3);
        pin.apply_options(vec![with_direction_output(1), with_active_low()])
            .unwrap();
        assert_eq!(pin.direction(), "out");
        assert!(pin.cfg.active_low);
        assert!(pin.fd.is_none());
    }

    #[test]
    fn effective_change_on_live_pin_tears_down_and_rerequests() {
        // a regular file stands in for the chip node: the teardown succeeds,
        // the re-request then fails at the chip-info ioctl with ENOTTY
        let dir = tempfile::tempdir().unwrap();
        let chip_path = dir.path().join("gpiochip9");
        std::fs::write(&chip_path, b"").unwrap();
        let file = std::fs::File::open(&chip_path).unwrap();

        let mut pin = CdevPin::new(dir.path(), "gpiochip9", 0);
        pin.fd = Some(OwnedFd::from(file));

        let err = pin.apply_options(vec![with_active_low()]).unwrap_err();
        assert!(matches!(err, Error::Ioctl { op: "chip-info", .. }));
        assert!(pin.fd.is_none());
    }
}
