//! Raw GPIO character-device v2 uAPI: struct layouts, flag bits and ioctl
//! definitions from `linux/gpio.h` (kernel 5.10+).

use bitflags::bitflags;

pub const MAX_NAME_SIZE: usize = 32;
pub const MAX_LINES: usize = 64;
pub const MAX_ATTRS: usize = 10;

const GPIO_MAGIC: u8 = 0xB4;

bitflags! {
    /// `GPIO_V2_LINE_FLAG_*` request flag bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LineFlags: u64 {
        const USED = 1 << 0;
        const ACTIVE_LOW = 1 << 1;
        const INPUT = 1 << 2;
        const OUTPUT = 1 << 3;
        const EDGE_RISING = 1 << 4;
        const EDGE_FALLING = 1 << 5;
        const OPEN_DRAIN = 1 << 6;
        const OPEN_SOURCE = 1 << 7;
        const BIAS_PULL_UP = 1 << 8;
        const BIAS_PULL_DOWN = 1 << 9;
        const BIAS_DISABLED = 1 << 10;
        const EVENT_CLOCK_REALTIME = 1 << 11;
    }
}

pub const LINE_ATTR_ID_FLAGS: u32 = 1;
pub const LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;
pub const LINE_ATTR_ID_DEBOUNCE: u32 = 3;

pub const LINE_EVENT_RISING_EDGE: u32 = 1;
pub const LINE_EVENT_FALLING_EDGE: u32 = 2;

/// `struct gpiochip_info`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ChipInfo {
    pub name: [u8; MAX_NAME_SIZE],
    pub label: [u8; MAX_NAME_SIZE],
    pub lines: u32,
}

/// The union member of `struct gpio_v2_line_attribute`. `__aligned_u64` in
/// the kernel header, hence the forced alignment.
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub union LineAttributeValue {
    pub flags: u64,
    pub values: u64,
    pub debounce_period_us: u32,
}

/// `struct gpio_v2_line_attribute`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LineAttribute {
    pub id: u32,
    pub padding: u32,
    pub value: LineAttributeValue,
}

/// `struct gpio_v2_line_config_attribute`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LineConfigAttribute {
    pub attr: LineAttribute,
    pub mask: u64,
}

/// `struct gpio_v2_line_config`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LineConfig {
    pub flags: u64,
    pub num_attrs: u32,
    pub padding: [u32; 5],
    pub attrs: [LineConfigAttribute; MAX_ATTRS],
}

/// `struct gpio_v2_line_request`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LineRequest {
    pub offsets: [u32; MAX_LINES],
    pub consumer: [u8; MAX_NAME_SIZE],
    pub config: LineConfig,
    pub num_lines: u32,
    pub event_buffer_size: u32,
    pub padding: [u32; 5],
    pub fd: i32,
}

/// `struct gpio_v2_line_values`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct LineValues {
    pub bits: u64,
    pub mask: u64,
}

/// `struct gpio_v2_line_event`, as read from the line file descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LineEvent {
    pub timestamp_ns: u64,
    pub id: u32,
    pub offset: u32,
    pub seqno: u32,
    pub line_seqno: u32,
    pub padding: [u32; 6],
}

impl ChipInfo {
    pub fn zeroed() -> Self {
        // all-zero bytes are a valid value for every field
        unsafe { std::mem::zeroed() }
    }
}

impl LineRequest {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl LineEvent {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

nix::ioctl_read!(gpio_get_chipinfo, GPIO_MAGIC, 0x01, ChipInfo);
nix::ioctl_readwrite!(gpio_v2_get_line, GPIO_MAGIC, 0x07, LineRequest);
nix::ioctl_readwrite!(gpio_v2_line_get_values, GPIO_MAGIC, 0x0e, LineValues);
nix::ioctl_readwrite!(gpio_v2_line_set_values, GPIO_MAGIC, 0x0f, LineValues);

/// Extracts a NUL-terminated kernel string from a fixed-size byte field.
pub fn name_to_string(raw: &[u8; MAX_NAME_SIZE]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Copies a consumer label into a fixed-size field, leaving room for the
/// terminating NUL.
pub fn copy_name(label: &str, dest: &mut [u8; MAX_NAME_SIZE]) {
    let bytes = label.as_bytes();
    let len = bytes.len().min(MAX_NAME_SIZE - 1);
    dest[..len].copy_from_slice(&bytes[..len]);
}
