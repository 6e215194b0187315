//! Adaptor-level pin registry: lazily creates backend-specific pins per
//! logical id and owns their lifecycle between `connect` and `finalize`.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::access::DigitalPinAccess;
use crate::backend::DigitalPinner;
use crate::config::{ConfigOption, with_direction_input, with_direction_output};
use crate::error::{Error, Result};
use crate::translate::{PinDefinitions, translate};

/// A cached pin. The registry lock only covers the lookup; holders of a
/// shared pin serialize their I/O on the pin's own lock, so operations on
/// different pins do not block each other.
pub type SharedPin = Arc<Mutex<Box<dyn DigitalPinner>>>;

/// Runs once on every freshly created pin; the default exports it.
pub type PinInitializer = Box<dyn Fn(&mut dyn DigitalPinner) -> Result<()> + Send + Sync>;

/// The provider interface GPIO-based device drivers consume.
pub trait DigitalPinProvider {
    fn digital_pin(&self, id: &str, options: Vec<ConfigOption>) -> Result<SharedPin>;
}

pub struct DigitalPinRegistry {
    access: Box<dyn DigitalPinAccess>,
    definitions: PinDefinitions,
    initializer: PinInitializer,
    // None until connect() and after finalize()
    pins: Mutex<Option<FxHashMap<String, SharedPin>>>,
}

impl DigitalPinRegistry {
    pub fn new(access: Box<dyn DigitalPinAccess>, definitions: PinDefinitions) -> Self {
        Self {
            access,
            definitions,
            initializer: Box::new(|pin| pin.export()),
            pins: Mutex::new(None),
        }
    }

    /// Replaces the default export initializer, e.g. to pre-configure every
    /// pin an adaptor hands out.
    pub fn with_initializer(mut self, initializer: PinInitializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn access(&self) -> &dyn DigitalPinAccess {
        self.access.as_ref()
    }

    pub fn connect(&self) -> Result<()> {
        let mut pins = self.pins.lock();
        if pins.is_some() {
            return Err(Error::AlreadyConnected);
        }
        *pins = Some(FxHashMap::default());
        Ok(())
    }

    /// Releases every cached pin. One broken pin must not prevent cleanup of
    /// the others, so failures are collected and reported together. Calling
    /// this again without an intervening connect is a no-op.
    pub fn finalize(&self) -> Result<()> {
        let mut guard = self.pins.lock();
        let Some(pins) = guard.take() else {
            return Ok(());
        };
        let mut failures = Vec::new();
        for (id, pin) in pins {
            if let Err(err) = pin.lock().unexport() {
                warn!("failed to release pin {id}: {err}");
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Finalize(failures))
        }
    }

    pub fn digital_read(&self, id: &str) -> Result<i32> {
        let pin = self.digital_pin(id, vec![with_direction_input()])?;
        let value = pin.lock().read()?;
        Ok(value)
    }

    pub fn digital_write(&self, id: &str, value: i32) -> Result<()> {
        let pin = self.digital_pin(id, vec![with_direction_output(value)])?;
        pin.lock().write(value)
    }
}

impl DigitalPinProvider for DigitalPinRegistry {
    /// Returns the cached pin for `id` after applying any newly requested
    /// options, creating and initializing it on first access. The whole
    /// read-or-create sequence runs under one lock, so concurrent first
    /// accesses never double-create a pin.
    fn digital_pin(&self, id: &str, options: Vec<ConfigOption>) -> Result<SharedPin> {
        let mut guard = self.pins.lock();
        let pins = guard.as_mut().ok_or(Error::NotConnected)?;

        if let Some(pin) = pins.get(id) {
            if !options.is_empty() {
                pin.lock().apply_options(options)?;
            }
            return Ok(pin.clone());
        }

        let (chip, line) = translate(&self.definitions, self.access.as_ref(), id)?;
        let mut pin = self.access.create_pin(&chip, line);
        pin.apply_options(options)?;
        (self.initializer)(pin.as_mut())?;

        let shared: SharedPin = Arc::new(Mutex::new(pin));
        pins.insert(id.to_string(), shared.clone());
        Ok(shared)
    }
}
