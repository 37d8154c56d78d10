//! Staged hardware bring-up with bounded retries.
//!
//! The failure mode this module exists to prevent is an unbounded retry
//! loop that starves the cooperative scheduler and trips the platform
//! watchdog. Every stage carries an attempt ceiling and an elapsed-time
//! ceiling; either one trips the breaker into a terminal
//! `PermanentlyFailed` state, and every retry path returns to the caller
//! (which yields and resets the watchdog) instead of blocking.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capture::BusCapture;
use crate::config::PanelConfig;
use crate::event::{StatusEvent, MSG_NO_PANEL, MSG_TIMER_UNAVAILABLE, STATUS_ONLINE, STATUS_STANDALONE};
use crate::platform::{KeybusPort, Watchdog};
use crate::timer::{BusTimer, BIT_SAMPLE_PERIOD_US};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitState {
    NotStarted,
    StabilizationWait,
    TimerPreInit,
    AwaitingFirstPacket,
    Ready,
    PermanentlyFailed,
}

/// Per-stage retry accounting. Backoff grows linearly with the attempt
/// count; the breaker trips on whichever ceiling is reached first.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetryBudget {
    attempts: u32,
    first_attempt_ms: u64,
    next_attempt_ms: u64,
    max_attempts: u32,
    max_elapsed_ms: u64,
    backoff_ms: u64,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, max_elapsed_ms: u64, backoff_ms: u64) -> Self {
        Self {
            attempts: 0,
            first_attempt_ms: 0,
            next_attempt_ms: 0,
            max_attempts,
            max_elapsed_ms,
            backoff_ms,
        }
    }

    /// Whether the backoff window from the previous failure has passed.
    pub fn ready(&self, now_ms: u64) -> bool {
        now_ms >= self.next_attempt_ms
    }

    /// Record one failed attempt and schedule the next one.
    pub fn record_failure(&mut self, now_ms: u64) {
        if self.first_attempt_ms == 0 {
            self.first_attempt_ms = now_ms;
        }
        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt_ms = now_ms + self.backoff_ms.saturating_mul(u64::from(self.attempts));
    }

    pub fn exhausted(&self, now_ms: u64) -> bool {
        if self.attempts >= self.max_attempts {
            return true;
        }
        self.first_attempt_ms != 0
            && now_ms.saturating_sub(self.first_attempt_ms) >= self.max_elapsed_ms
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// The bring-up sequencer. Driven by the main loop once per tick; all
/// waits are wall-clock comparisons against the supplied `now_ms`.
#[derive(Debug)]
pub struct InitSequencer {
    state: InitState,
    standalone: bool,
    boot_ms: Option<u64>,
    stage_entered_ms: u64,
    attached: bool,
    stabilization_delay_ms: u64,
    stabilization_ceiling_ms: u64,
    first_packet_timeout_ms: u64,
    timer_budget: RetryBudget,
    packet_budget: RetryBudget,
    failure_reason: Option<&'static str>,
}

impl InitSequencer {
    pub fn new(config: &PanelConfig) -> Self {
        let timing = &config.timing;
        Self {
            state: InitState::NotStarted,
            standalone: config.standalone_mode,
            boot_ms: None,
            stage_entered_ms: 0,
            attached: false,
            stabilization_delay_ms: timing.stabilization_delay_ms,
            stabilization_ceiling_ms: timing.stabilization_ceiling_ms,
            first_packet_timeout_ms: timing.first_packet_timeout_ms,
            timer_budget: RetryBudget::new(
                timing.timer_max_attempts,
                timing.timer_max_elapsed_ms,
                timing.timer_retry_backoff_ms,
            ),
            packet_budget: RetryBudget::new(
                timing.packet_max_attempts,
                timing.packet_max_elapsed_ms,
                timing.packet_retry_backoff_ms,
            ),
            failure_reason: None,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InitState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state == InitState::PermanentlyFailed
    }

    pub fn awaiting_first_packet(&self) -> bool {
        self.state == InitState::AwaitingFirstPacket
    }

    pub fn failure_reason(&self) -> Option<&'static str> {
        self.failure_reason
    }

    pub fn timer_attempts(&self) -> u32 {
        self.timer_budget.attempts()
    }

    pub fn packet_attempts(&self) -> u32 {
        self.packet_budget.attempts()
    }

    /// Advance the bring-up by at most one step. Returns the system
    /// status notification when the sequence reaches `Ready` or trips
    /// into `PermanentlyFailed` (emitted exactly once).
    pub fn poll(
        &mut self,
        now_ms: u64,
        timer: &mut dyn BusTimer,
        port: &mut dyn KeybusPort,
        capture: &Arc<BusCapture>,
        watchdog: &mut dyn Watchdog,
        config: &PanelConfig,
    ) -> Option<StatusEvent> {
        // Stages fall through within one tick once their gate clears, so
        // a zero-delay configuration reaches the first hardware attempt
        // on the first poll.
        if self.state == InitState::NotStarted {
            if let Some(event) = self.start(now_ms) {
                return Some(event);
            }
        }
        if self.state == InitState::StabilizationWait {
            self.stabilization_wait(now_ms);
        }
        if self.state == InitState::TimerPreInit {
            if let Some(event) = self.timer_pre_init(now_ms, timer, port, capture, watchdog, config)
            {
                return Some(event);
            }
        }
        if self.state == InitState::AwaitingFirstPacket {
            return self.await_first_packet(now_ms, timer, port, capture, watchdog, config);
        }
        None
    }

    /// Called by the driver when the first valid frame decodes while
    /// awaiting packet verification. Timer success alone is not proof of
    /// connectivity; this is.
    pub fn mark_packet_received(&mut self, now_ms: u64) -> StatusEvent {
        info!(elapsed_ms = now_ms.saturating_sub(self.boot_ms.unwrap_or(0)), "keybus online");
        self.state = InitState::Ready;
        StatusEvent::SystemStatusChanged(STATUS_ONLINE.to_string())
    }

    fn start(&mut self, now_ms: u64) -> Option<StatusEvent> {
        if self.standalone {
            info!("standalone mode enabled - simulating successful hardware initialization");
            self.state = InitState::Ready;
            return Some(StatusEvent::SystemStatusChanged(STATUS_STANDALONE.to_string()));
        }
        self.boot_ms = Some(now_ms);
        self.stage_entered_ms = now_ms;
        self.state = InitState::StabilizationWait;
        debug!(
            delay_ms = self.stabilization_delay_ms,
            "waiting for system stabilization before hardware init"
        );
        None
    }

    fn stabilization_wait(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.stage_entered_ms);
        if elapsed >= self.stabilization_delay_ms {
            debug!(elapsed_ms = elapsed, "system stabilized - starting timer pre-initialization");
        } else if elapsed >= self.stabilization_ceiling_ms {
            warn!(
                elapsed_ms = elapsed,
                ceiling_ms = self.stabilization_ceiling_ms,
                "stabilization wait exceeded ceiling - forcing continuation"
            );
        } else {
            return;
        }
        self.stage_entered_ms = now_ms;
        self.state = InitState::TimerPreInit;
    }

    fn timer_pre_init(
        &mut self,
        now_ms: u64,
        timer: &mut dyn BusTimer,
        port: &mut dyn KeybusPort,
        capture: &Arc<BusCapture>,
        watchdog: &mut dyn Watchdog,
        config: &PanelConfig,
    ) -> Option<StatusEvent> {
        if !self.timer_budget.ready(now_ms) {
            return None;
        }

        watchdog.reset();
        // Probe only: verify the platform timer subsystem accepts a
        // periodic request, then release it until interrupt attach.
        match timer.start(BIT_SAMPLE_PERIOD_US, None) {
            Ok(()) => {
                timer.stop();
                if self.timer_budget.attempts() > 0 {
                    debug!(
                        attempts = self.timer_budget.attempts() + 1,
                        "timer pre-initialization successful after retries"
                    );
                }
                watchdog.reset();
                self.stage_entered_ms = now_ms;
                self.state = InitState::AwaitingFirstPacket;
                self.attach(now_ms, port, capture, watchdog, config)
            }
            Err(err) => {
                self.timer_budget.record_failure(now_ms);
                warn!(
                    attempt = self.timer_budget.attempts(),
                    max = self.timer_budget.max_attempts(),
                    %err,
                    "timer pre-initialization failed - will retry after backoff"
                );
                if self.timer_budget.exhausted(now_ms) {
                    return self.fail(MSG_TIMER_UNAVAILABLE, timer, port, capture);
                }
                None
            }
        }
    }

    fn attach(
        &mut self,
        now_ms: u64,
        port: &mut dyn KeybusPort,
        capture: &Arc<BusCapture>,
        watchdog: &mut dyn Watchdog,
        config: &PanelConfig,
    ) -> Option<StatusEvent> {
        watchdog.reset();
        match port.attach(&config.pins, Arc::clone(capture)) {
            Ok(()) => {
                capture.set_enabled(true);
                self.attached = true;
                self.stage_entered_ms = now_ms;
                debug!(
                    clock_pin = config.pins.clock,
                    read_pin = config.pins.data_read,
                    timeout_ms = self.first_packet_timeout_ms,
                    "interrupts attached - awaiting first valid frame"
                );
                watchdog.reset();
                None
            }
            Err(err) => {
                self.packet_budget.record_failure(now_ms);
                warn!(
                    attempt = self.packet_budget.attempts(),
                    max = self.packet_budget.max_attempts(),
                    %err,
                    "interrupt attach failed - will retry after backoff"
                );
                None
            }
        }
    }

    fn await_first_packet(
        &mut self,
        now_ms: u64,
        timer: &mut dyn BusTimer,
        port: &mut dyn KeybusPort,
        capture: &Arc<BusCapture>,
        watchdog: &mut dyn Watchdog,
        config: &PanelConfig,
    ) -> Option<StatusEvent> {
        if self.packet_budget.exhausted(now_ms) {
            return self.fail(MSG_NO_PANEL, timer, port, capture);
        }

        if !self.attached {
            if !self.packet_budget.ready(now_ms) {
                return None;
            }
            return self.attach(now_ms, port, capture, watchdog, config);
        }

        let elapsed = now_ms.saturating_sub(self.stage_entered_ms);
        if elapsed >= self.first_packet_timeout_ms {
            watchdog.reset();
            port.detach();
            capture.set_enabled(false);
            self.attached = false;
            self.packet_budget.record_failure(now_ms);
            warn!(
                attempt = self.packet_budget.attempts(),
                max = self.packet_budget.max_attempts(),
                elapsed_ms = elapsed,
                "no valid frame received - detaching before retry"
            );
            if self.packet_budget.exhausted(now_ms) {
                return self.fail(MSG_NO_PANEL, timer, port, capture);
            }
        }
        None
    }

    /// Terminal transition. Hardware is released, the reason is latched,
    /// and exactly one failure notification is returned; every later
    /// poll is a no-op.
    fn fail(
        &mut self,
        reason: &'static str,
        timer: &mut dyn BusTimer,
        port: &mut dyn KeybusPort,
        capture: &Arc<BusCapture>,
    ) -> Option<StatusEvent> {
        timer.stop();
        if self.attached {
            port.detach();
            self.attached = false;
        }
        capture.set_enabled(false);
        self.state = InitState::PermanentlyFailed;
        self.failure_reason = Some(reason);
        error!(
            reason,
            timer_attempts = self.timer_budget.attempts(),
            packet_attempts = self.packet_budget.attempts(),
            "hardware initialization permanently failed - stopping retries"
        );
        warn!("if no panel is connected, enable standalone_mode in the configuration");
        Some(StatusEvent::SystemStatusChanged(reason.to_string()))
    }
}
