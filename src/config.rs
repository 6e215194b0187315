use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Unset,
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Unset => "",
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

#[derive(Debug, Default, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Bias {
    #[default]
    Default,
    Disabled,
    PullUp,
    PullDown,
}

#[derive(Debug, Default, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Drive {
    #[default]
    PushPull,
    OpenDrain,
    OpenSource,
}

#[derive(Debug, Default, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeDetect {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

/// One observed transition on a line, as delivered to an [`EdgeEventHandler`].
#[derive(Debug, Clone)]
pub struct EdgeEvent {
    pub line_offset: u32,
    pub timestamp: Duration,
    pub edge: EdgeDetect,
    pub seqno: u32,
    pub line_seqno: u32,
}

pub type EdgeEventHandler = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// Desired electrical and logical behavior of one GPIO line.
///
/// Owned exclusively by the pin instance it was created for. Mutated through
/// [`ConfigOption`] closures; whether a mutation actually changed anything
/// decides if the backend has to re-request the line.
#[derive(Clone, Default)]
pub struct LineConfig {
    pub label: String,
    pub direction: Direction,
    pub initial_output: i32,
    pub active_low: bool,
    pub bias: Bias,
    pub drive: Drive,
    pub debounce: Duration,
    pub edge: EdgeDetect,
    pub handler: Option<EdgeEventHandler>,
    pub poll_interval: Duration,
    pub poll_quit: Option<Arc<AtomicBool>>,
}

impl LineConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }
}

/// A single configuration mutation, reporting whether it changed anything.
pub type ConfigOption = Box<dyn Fn(&mut LineConfig) -> bool + Send>;

pub fn with_label(label: impl Into<String>) -> ConfigOption {
    let label = label.into();
    Box::new(move |c| {
        let changed = c.label != label;
        c.label = label.clone();
        changed
    })
}

pub fn with_direction_input() -> ConfigOption {
    Box::new(|c| {
        let changed = c.direction != Direction::Input;
        c.direction = Direction::Input;
        changed
    })
}

pub fn with_direction_output(value: i32) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.direction != Direction::Output || c.initial_output != value;
        c.direction = Direction::Output;
        c.initial_output = value;
        changed
    })
}

pub fn with_active_low() -> ConfigOption {
    Box::new(|c| {
        let changed = !c.active_low;
        c.active_low = true;
        changed
    })
}

pub fn with_bias_disabled() -> ConfigOption {
    with_bias(Bias::Disabled)
}

pub fn with_pull_up() -> ConfigOption {
    with_bias(Bias::PullUp)
}

pub fn with_pull_down() -> ConfigOption {
    with_bias(Bias::PullDown)
}

fn with_bias(bias: Bias) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.bias != bias;
        c.bias = bias;
        changed
    })
}

pub fn with_open_drain() -> ConfigOption {
    with_drive(Drive::OpenDrain)
}

pub fn with_open_source() -> ConfigOption {
    with_drive(Drive::OpenSource)
}

fn with_drive(drive: Drive) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.drive != drive;
        c.drive = drive;
        changed
    })
}

pub fn with_debounce(period: Duration) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.debounce != period;
        c.debounce = period;
        changed
    })
}

pub fn with_edge_rising(handler: EdgeEventHandler) -> ConfigOption {
    with_edge(EdgeDetect::Rising, handler)
}

pub fn with_edge_falling(handler: EdgeEventHandler) -> ConfigOption {
    with_edge(EdgeDetect::Falling, handler)
}

pub fn with_edge_both(handler: EdgeEventHandler) -> ConfigOption {
    with_edge(EdgeDetect::Both, handler)
}

fn with_edge(edge: EdgeDetect, handler: EdgeEventHandler) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.edge != edge;
        c.edge = edge;
        c.handler = Some(handler.clone());
        changed
    })
}

/// Enables the discrete software-polling fallback for edge detection, for
/// backends or kernels without native event subscription. The poller stops
/// once `quit` is set.
pub fn with_poll_for_edge_detection(interval: Duration, quit: Arc<AtomicBool>) -> ConfigOption {
    Box::new(move |c| {
        let changed = c.poll_interval != interval;
        c.poll_interval = interval;
        c.poll_quit = Some(quit.clone());
        changed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(cfg: &mut LineConfig, option: ConfigOption) -> bool {
        option(cfg)
    }

    #[test]
    fn options_report_change_only_when_effective() {
        let mut cfg = LineConfig::new("test");

        assert!(apply(&mut cfg, with_direction_input()));
        assert!(!apply(&mut cfg, with_direction_input()));

        assert!(apply(&mut cfg, with_direction_output(1)));
        assert!(!apply(&mut cfg, with_direction_output(1)));
        assert!(apply(&mut cfg, with_direction_output(0)));

        assert!(apply(&mut cfg, with_active_low()));
        assert!(!apply(&mut cfg, with_active_low()));

        assert!(apply(&mut cfg, with_pull_up()));
        assert!(!apply(&mut cfg, with_pull_up()));
        assert!(apply(&mut cfg, with_pull_down()));
        assert!(apply(&mut cfg, with_bias_disabled()));

        assert!(apply(&mut cfg, with_open_drain()));
        assert!(!apply(&mut cfg, with_open_drain()));
        assert!(apply(&mut cfg, with_open_source()));

        assert!(apply(&mut cfg, with_debounce(Duration::from_millis(3))));
        assert!(!apply(&mut cfg, with_debounce(Duration::from_millis(3))));
    }

    #[test]
    fn edge_options_install_the_handler() {
        let mut cfg = LineConfig::new("test");
        let handler: EdgeEventHandler = Arc::new(|_| {});

        assert!(apply(&mut cfg, with_edge_rising(handler.clone())));
        assert_eq!(cfg.edge, EdgeDetect::Rising);
        assert!(cfg.handler.is_some());

        // same edge kind again is not a change
        assert!(!apply(&mut cfg, with_edge_rising(handler.clone())));
        assert!(apply(&mut cfg, with_edge_both(handler)));
        assert_eq!(cfg.edge, EdgeDetect::Both);
    }

    #[test]
    fn poll_option_records_interval_and_quit_flag() {
        let mut cfg = LineConfig::new("test");
        let quit = Arc::new(AtomicBool::new(false));

        assert!(apply(
            &mut cfg,
            with_poll_for_edge_detection(Duration::from_millis(10), quit.clone())
        ));
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
        assert!(cfg.poll_quit.is_some());
        assert!(!apply(
            &mut cfg,
            with_poll_for_edge_detection(Duration::from_millis(10), quit)
        ));
    }

    #[test]
    fn label_option_overrides_default() {
        let mut cfg = LineConfig::new("gpiokit13");
        assert!(apply(&mut cfg, with_label("relay")));
        assert_eq!(cfg.label, "relay");
        assert!(!apply(&mut cfg, with_label("relay")));
    }
}
