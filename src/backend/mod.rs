pub mod cdev;
pub mod mock;
pub mod sysfs;
pub mod uapi;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::warn;

use crate::config::{ConfigOption, EdgeDetect, EdgeEvent, EdgeEventHandler};
use crate::error::Result;

/// Uniform operations on one digital pin, regardless of which backend
/// instantiated it. Driver code programs against this trait and never
/// branches on the backend identity.
pub trait DigitalPinner: Send {
    /// Makes the line available: sysfs export or cdev line request.
    fn export(&mut self) -> Result<()>;
    /// Releases the line: sysfs unexport or closing the line descriptor.
    fn unexport(&mut self) -> Result<()>;
    /// Applies configuration mutations in sequence. If any of them changed
    /// the configuration of an already exported pin, the line is set up
    /// again under the new configuration.
    fn apply_options(&mut self, options: Vec<ConfigOption>) -> Result<()>;
    fn read(&mut self) -> Result<i32>;
    /// Writes the value, clamped to {0,1}, to the line.
    fn write(&mut self, value: i32) -> Result<()>;
    /// The currently configured direction ("in"/"out"), without any I/O.
    fn direction(&self) -> &'static str;
}

/// Normalizes a caller-supplied value to the {0,1} domain before it reaches
/// any kernel interface: negative becomes 0, anything above 1 becomes 1.
pub(crate) fn clamp_bit(value: i32) -> u8 {
    value.clamp(0, 1) as u8
}

pub(crate) fn edge_matches(configured: EdgeDetect, observed: EdgeDetect) -> bool {
    match configured {
        EdgeDetect::None => false,
        EdgeDetect::Rising => observed == EdgeDetect::Rising,
        EdgeDetect::Falling => observed == EdgeDetect::Falling,
        EdgeDetect::Both => matches!(observed, EdgeDetect::Rising | EdgeDetect::Falling),
    }
}

pub(crate) fn epoch_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Discrete software-polling fallback for edge detection.
///
/// Reads the line value at a fixed interval through a backend-supplied reader
/// and synthesizes [`EdgeEvent`]s on transitions. Used where native event
/// subscription is unavailable (sysfs always, cdev when requested).
pub(crate) struct EdgePoller {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgePoller {
    pub(crate) fn spawn(
        line: u32,
        interval: Duration,
        quit: Option<Arc<AtomicBool>>,
        edge: EdgeDetect,
        handler: EdgeEventHandler,
        mut read_value: Box<dyn FnMut() -> Option<i32> + Send>,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();

        let handle = std::thread::spawn(move || {
            let mut last: Option<i32> = None;
            let mut seqno: u32 = 0;
            loop {
                if cancel_flag.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(quit) = &quit
                    && quit.load(Ordering::Relaxed)
                {
                    break;
                }

                match read_value() {
                    None => warn!("edge poll read failed for line {line}"),
                    Some(value) => {
                        let observed = match (last, value) {
                            (Some(0), 1) => Some(EdgeDetect::Rising),
                            (Some(1), 0) => Some(EdgeDetect::Falling),
                            _ => None,
                        };
                        if let Some(observed) = observed
                            && edge_matches(edge, observed)
                        {
                            seqno += 1;
                            handler(EdgeEvent {
                                line_offset: line,
                                timestamp: epoch_time(),
                                edge: observed,
                                seqno,
                                line_seqno: seqno,
                            });
                        }
                        last = Some(value);
                    }
                }
                std::thread::sleep(interval);
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }
}

impl Drop for EdgePoller {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
