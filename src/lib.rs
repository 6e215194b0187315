//! Digital pin abstraction over the two Linux GPIO kernel interfaces.
//!
//! One uniform [`DigitalPinner`] contract is served by two backends: the
//! legacy sysfs file tree and the modern character-device v2 ABI. Which one
//! an adaptor uses is decided once by a filesystem capability probe (or a
//! forced preference), and a per-adaptor [`DigitalPinRegistry`] hands out
//! lazily created pins by board-specific logical id.

pub mod access;
pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod translate;

pub use access::{
    AccessPreference, CdevAccess, DigitalPinAccess, SysfsAccess, resolve_access,
    resolve_access_at,
};
pub use backend::DigitalPinner;
pub use backend::cdev::CdevPin;
pub use backend::mock::{MockAccess, MockState};
pub use backend::sysfs::SysfsPin;
pub use config::{
    Bias, ConfigOption, Direction, Drive, EdgeDetect, EdgeEvent, EdgeEventHandler, LineConfig,
    with_active_low, with_bias_disabled, with_debounce, with_direction_input,
    with_direction_output, with_edge_both, with_edge_falling, with_edge_rising, with_label,
    with_open_drain, with_open_source, with_poll_for_edge_detection, with_pull_down,
    with_pull_up,
};
pub use error::{Error, Result};
pub use registry::{DigitalPinProvider, DigitalPinRegistry, PinInitializer, SharedPin};
pub use translate::{CdevRef, PinDefinition, PinDefinitions, load_definitions, translate};
