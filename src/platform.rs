//! Platform seams: bus interrupt attachment, keypad writes, and the
//! watchdog/yield bracket the cooperative loop must service.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::capture::BusCapture;
use crate::config::PinConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("interrupt attach failed on pin {0}")]
    AttachFailed(u8),
    #[error("bus write rejected")]
    WriteRejected,
}

/// Physical bus access: edge-interrupt attachment on the clock line and
/// keypad key writes.
///
/// `attach` receives the shared capture ring; the implementation is
/// expected to invoke [`BusCapture::on_clock_edge`] from its clock-edge
/// interrupt handler with the sampled data-line level.
pub trait KeybusPort {
    fn attach(&mut self, pins: &PinConfig, capture: Arc<BusCapture>) -> Result<(), PortError>;

    fn detach(&mut self);

    /// Whether the bus can accept a keypad key right now.
    fn write_ready(&self) -> bool;

    /// Write one keypad key onto the bus for the given 1-based partition.
    fn write_key(&mut self, partition: u8, key: u8) -> Result<(), PortError>;
}

/// Watchdog and scheduler services. The main loop resets the watchdog
/// before and after potentially slow operations and yields once per
/// iteration so the idle task can run.
pub trait Watchdog {
    fn reset(&mut self);

    fn yield_now(&mut self);
}

/// No-op watchdog for hosts without one.
#[derive(Debug, Default)]
pub struct NullWatchdog;

impl Watchdog for NullWatchdog {
    fn reset(&mut self) {}

    fn yield_now(&mut self) {}
}

/// Shared log of keys written through a [`LoopbackPort`], for assertions
/// and simulator display.
pub type WriteLog = Arc<Mutex<Vec<(u8, u8)>>>;

/// In-memory port used by the simulator binary and integration tests.
/// Frames are injected directly into the capture ring (see
/// [`BusCapture::feed_frame`]); written keys are recorded in the shared
/// write log.
#[derive(Debug, Default)]
pub struct LoopbackPort {
    attached: bool,
    attach_count: u32,
    write_log: WriteLog,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared write log handle, cloned before the port is boxed into
    /// the driver.
    pub fn write_log(&self) -> WriteLog {
        Arc::clone(&self.write_log)
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn attach_count(&self) -> u32 {
        self.attach_count
    }
}

impl KeybusPort for LoopbackPort {
    fn attach(&mut self, pins: &PinConfig, _capture: Arc<BusCapture>) -> Result<(), PortError> {
        debug!(clock_pin = pins.clock, "loopback port attached");
        self.attached = true;
        self.attach_count += 1;
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn write_ready(&self) -> bool {
        self.attached
    }

    fn write_key(&mut self, partition: u8, key: u8) -> Result<(), PortError> {
        if !self.attached {
            return Err(PortError::WriteRejected);
        }
        let mut log = self.write_log.lock().expect("write log poisoned");
        log.push((partition, key));
        Ok(())
    }
}
