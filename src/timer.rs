use thiserror::Error;

/// Sample period for the bus data line after a clock edge.
pub const BIT_SAMPLE_PERIOD_US: u32 = 250;

/// Callback invoked from timer interrupt or high-priority context.
pub type TimerCallback = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The platform timer subsystem rejected the request. Retryable: on
    /// some platforms the timer service is not ready at process start.
    #[error("timer subsystem unavailable")]
    Unavailable,
}

/// Abstraction over the platform's periodic-interrupt timer so the rest
/// of the driver is independent of which underlying timer API the
/// platform offers.
///
/// Implementations guarantee the callback is invoked from interrupt or
/// high-priority context at the requested period, plus platform jitter.
pub trait BusTimer {
    fn start(
        &mut self,
        period_us: u32,
        callback: Option<TimerCallback>,
    ) -> Result<(), TimerError>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Paired, nestable critical-section bracket shared by the timer layer
/// and the capture ring while shared cursors are being torn down.
pub fn with_critical_section<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_| f())
}

/// Host-side stand-in: always starts, never fires its callback. Used by
/// simulation, standalone construction, and tests that only need the
/// pre-init probe to succeed.
#[derive(Debug, Default)]
pub struct SoftwareTimer {
    running: bool,
    period_us: u32,
}

impl SoftwareTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }
}

impl BusTimer for SoftwareTimer {
    fn start(
        &mut self,
        period_us: u32,
        _callback: Option<TimerCallback>,
    ) -> Result<(), TimerError> {
        self.period_us = period_us;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
