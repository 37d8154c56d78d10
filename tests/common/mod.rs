//! Shared fixtures: a controllable timer stub, a recording port, and a
//! counting watchdog.

use std::sync::{Arc, Mutex};

use keybus::config::PinConfig;
use keybus::capture::BusCapture;
use keybus::platform::{KeybusPort, PortError, Watchdog};
use keybus::timer::{BusTimer, TimerCallback, TimerError};
use keybus::{KeybusDriver, PanelConfig, SeriesType};

/// Timer stub that can be told to fail every start attempt, recording
/// call counts and timestamps set by the test clock.
#[derive(Debug, Default)]
pub struct StubTimerState {
    pub start_calls: u32,
    pub stop_calls: u32,
    pub fail_always: bool,
    pub running: bool,
}

pub struct StubTimer {
    pub state: Arc<Mutex<StubTimerState>>,
}

impl StubTimer {
    pub fn new(fail_always: bool) -> (Self, Arc<Mutex<StubTimerState>>) {
        let state = Arc::new(Mutex::new(StubTimerState {
            fail_always,
            ..StubTimerState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl BusTimer for StubTimer {
    fn start(
        &mut self,
        _period_us: u32,
        _callback: Option<TimerCallback>,
    ) -> Result<(), TimerError> {
        let mut state = self.state.lock().unwrap();
        state.start_calls += 1;
        if state.fail_always {
            return Err(TimerError::Unavailable);
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.stop_calls += 1;
        state.running = false;
    }

    fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }
}

/// Port stub recording attach/detach/write activity.
#[derive(Debug, Default)]
pub struct StubPortState {
    pub attach_calls: u32,
    pub detach_calls: u32,
    pub attached: bool,
    pub fail_attach: bool,
    pub writes: Vec<(u8, u8)>,
}

pub struct StubPort {
    pub state: Arc<Mutex<StubPortState>>,
}

impl StubPort {
    pub fn new() -> (Self, Arc<Mutex<StubPortState>>) {
        let state = Arc::new(Mutex::new(StubPortState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl KeybusPort for StubPort {
    fn attach(&mut self, _pins: &PinConfig, _capture: Arc<BusCapture>) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state.attach_calls += 1;
        if state.fail_attach {
            return Err(PortError::AttachFailed(0));
        }
        state.attached = true;
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.detach_calls += 1;
        state.attached = false;
    }

    fn write_ready(&self) -> bool {
        self.state.lock().unwrap().attached
    }

    fn write_key(&mut self, partition: u8, key: u8) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        if !state.attached {
            return Err(PortError::WriteRejected);
        }
        state.writes.push((partition, key));
        Ok(())
    }
}

/// Watchdog stub counting resets and yields.
#[derive(Debug, Default)]
pub struct StubWatchdogState {
    pub resets: u32,
    pub yields: u32,
}

pub struct StubWatchdog {
    pub state: Arc<Mutex<StubWatchdogState>>,
}

impl StubWatchdog {
    pub fn new() -> (Self, Arc<Mutex<StubWatchdogState>>) {
        let state = Arc::new(Mutex::new(StubWatchdogState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Watchdog for StubWatchdog {
    fn reset(&mut self) {
        self.state.lock().unwrap().resets += 1;
    }

    fn yield_now(&mut self) {
        self.state.lock().unwrap().yields += 1;
    }
}

/// Config with zeroed stabilization delay so tests reach the hardware
/// stages on the first polls.
pub fn fast_config(series: SeriesType) -> PanelConfig {
    let mut config = PanelConfig::new(series);
    config.timing.stabilization_delay_ms = 0;
    config
}

/// Driver wired to stubs, returning the observation handles.
pub fn stub_driver(
    config: PanelConfig,
    fail_timer: bool,
) -> (
    KeybusDriver,
    Arc<Mutex<StubTimerState>>,
    Arc<Mutex<StubPortState>>,
    Arc<Mutex<StubWatchdogState>>,
) {
    let (timer, timer_state) = StubTimer::new(fail_timer);
    let (port, port_state) = StubPort::new();
    let (watchdog, watchdog_state) = StubWatchdog::new();
    let driver = KeybusDriver::new(
        config,
        Box::new(timer),
        Box::new(port),
        Box::new(watchdog),
    )
    .expect("config should validate");
    (driver, timer_state, port_state, watchdog_state)
}
