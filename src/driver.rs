//! Driver orchestration: owns the capture ring, decoder, bring-up
//! sequencer, and status interpreters, and drives them once per
//! cooperative loop tick.

use core::fmt::Write as _;
use std::sync::Arc;

use arrayvec::ArrayString;
use heapless::Deque;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::capture::BusCapture;
use crate::config::{is_numeric_code, ConfigError, PanelConfig, SeriesType, ACCESS_CODE_LEN};
use crate::event::{EventBuffer, StatusEvent, STATUS_OFFLINE, STATUS_ONLINE};
use crate::init::{InitSequencer, InitState};
use crate::partition::{
    PartitionArmState, PartitionInterpreter, MAX_PARTITIONS, STATUS_ACCESS_CODE_PROMPT,
};
use crate::platform::{KeybusPort, LoopbackPort, NullWatchdog, Watchdog};
use crate::protocol::{DecodeStats, DecodedEvent, ProtocolDecoder};
use crate::timer::{BusTimer, SoftwareTimer};
use crate::zones::ZoneTracker;

/// Frames decoded per tick; pending frames beyond this wait for the next
/// tick so one poll stays inside its time budget.
pub const MAX_FRAMES_PER_POLL: usize = 8;
pub const MAX_WRITE_QUEUE: usize = 64;

// Keypad command keys, as written onto the bus.
const KEY_ARM_STAY: u8 = b's';
const KEY_ARM_AWAY: u8 = b'w';
const KEY_ARM_NIGHT: u8 = b'n';
const KEY_FIRE: u8 = b'f';
const KEY_PANIC: u8 = b'p';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid partition {0}")]
    InvalidPartition(u8),
    #[error("partition {0} not ready to arm")]
    NotReadyToArm(u8),
    #[error("partition {0} is not armed")]
    NotArmed(u8),
    #[error("access code must be 4 digits")]
    InvalidAccessCode,
    #[error("keypad write queue full")]
    WriteQueueFull,
}

/// Counter snapshot for diagnostics consumers.
#[derive(Debug, Clone, Serialize)]
pub struct DriverDiagnostics {
    pub init_state: InitState,
    pub failure_reason: Option<String>,
    pub timer_attempts: u32,
    pub packet_attempts: u32,
    pub decode: DecodeStats,
    pub buffer_overflows: u32,
    pub events_dropped: u32,
    pub link_up: bool,
    pub write_queue_depth: usize,
}

pub struct KeybusDriver {
    config: PanelConfig,
    timer: Box<dyn BusTimer>,
    port: Box<dyn KeybusPort>,
    watchdog: Box<dyn Watchdog>,
    capture: Arc<BusCapture>,
    decoder: ProtocolDecoder,
    init: InitSequencer,
    partitions: PartitionInterpreter,
    zones: ZoneTracker,
    trouble: bool,
    ac_trouble: bool,
    battery_trouble: bool,
    fire: [bool; MAX_PARTITIONS],
    write_queue: Deque<(u8, u8), MAX_WRITE_QUEUE>,
    link_up: bool,
    last_frame_ms: u64,
    events_dropped: u32,
}

impl KeybusDriver {
    pub fn new(
        config: PanelConfig,
        timer: Box<dyn BusTimer>,
        port: Box<dyn KeybusPort>,
        watchdog: Box<dyn Watchdog>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            series = config.series.label(),
            standalone = config.standalone_mode,
            "keybus driver constructed"
        );
        Ok(Self {
            capture: Arc::new(BusCapture::new(config.series)),
            decoder: ProtocolDecoder::new(config.series),
            init: InitSequencer::new(&config),
            partitions: PartitionInterpreter::new(config.series),
            zones: ZoneTracker::new(),
            trouble: false,
            ac_trouble: false,
            battery_trouble: false,
            fire: [false; MAX_PARTITIONS],
            write_queue: Deque::new(),
            link_up: false,
            last_frame_ms: 0,
            events_dropped: 0,
            config,
            timer,
            port,
            watchdog,
        })
    }

    /// Construct with inert platform pieces and `standalone_mode` forced
    /// on. No pin or timer API is ever touched.
    pub fn standalone(mut config: PanelConfig) -> Result<Self, ConfigError> {
        config.standalone_mode = true;
        Self::new(
            config,
            Box::new(SoftwareTimer::new()),
            Box::new(LoopbackPort::new()),
            Box::new(NullWatchdog),
        )
    }

    /// One cooperative loop tick: advance bring-up, drain captured
    /// frames, and return the change notifications. With nothing new on
    /// the bus this returns an empty buffer.
    pub fn poll(&mut self, now_ms: u64) -> EventBuffer {
        let mut events = EventBuffer::new();
        self.watchdog.reset();

        if self.init.is_failed() {
            // Terminal: a single failure notification was already
            // emitted; later polls are no-ops.
            return events;
        }

        if !self.init.is_ready() {
            if let Some(event) = self.init.poll(
                now_ms,
                self.timer.as_mut(),
                self.port.as_mut(),
                &self.capture,
                self.watchdog.as_mut(),
                &self.config,
            ) {
                self.push(&mut events, event);
            }
        }

        if self.config.standalone_mode {
            self.watchdog.yield_now();
            return events;
        }

        if self.init.awaiting_first_packet() || self.init.is_ready() {
            self.drain_frames(now_ms, &mut events);
            self.check_link(now_ms, &mut events);
            self.service_write_queue();
        }

        self.watchdog.reset();
        self.watchdog.yield_now();
        events
    }

    fn drain_frames(&mut self, now_ms: u64, events: &mut EventBuffer) {
        for _ in 0..MAX_FRAMES_PER_POLL {
            let frame = match self.capture.next_frame() {
                Ok(frame) => frame,
                // The only frame-poll error is WouldBlock.
                Err(_) => break,
            };
            if self.config.debug_level >= 2 {
                trace!(bytes = ?frame.as_bytes(), "captured frame");
            }

            let decoded = match self.decoder.decode(&frame) {
                Some(decoded) => decoded,
                None => continue,
            };

            if self.init.awaiting_first_packet() {
                // First valid frame: the panel is present and talking.
                self.link_up = true;
                let event = self.init.mark_packet_received(now_ms);
                self.push(events, event);
            } else if !self.link_up {
                self.link_up = true;
                self.push(
                    events,
                    StatusEvent::SystemStatusChanged(STATUS_ONLINE.to_string()),
                );
            }
            self.last_frame_ms = now_ms;

            for event in decoded {
                self.apply_decoded(event, now_ms, events);
            }
        }
    }

    fn check_link(&mut self, now_ms: u64, events: &mut EventBuffer) {
        if !self.init.is_ready() || !self.link_up {
            return;
        }
        let silent = now_ms.saturating_sub(self.last_frame_ms);
        if silent >= self.config.timing.link_timeout_ms {
            self.link_up = false;
            warn!(silent_ms = silent, "keybus silent - marking link down");
            self.push(
                events,
                StatusEvent::SystemStatusChanged(STATUS_OFFLINE.to_string()),
            );
        }
    }

    fn apply_decoded(&mut self, event: DecodedEvent, now_ms: u64, events: &mut EventBuffer) {
        match event {
            DecodedEvent::PartitionStatus { partition, raw } => {
                self.apply_partition_status(partition, raw, now_ms, events);
            }
            DecodedEvent::ZoneOpenBitmap { group, zones } => {
                self.zones.apply_open(group, zones, events);
            }
            DecodedEvent::ZoneAlarmBitmap { group, zones } => {
                self.zones.apply_alarm(group, zones, events);
            }
            DecodedEvent::Trouble(active) => {
                if active != self.trouble {
                    self.trouble = active;
                    self.push(events, StatusEvent::TroubleStatusChanged(active));
                }
            }
            DecodedEvent::AcPowerTrouble(active) => {
                if active != self.ac_trouble {
                    self.ac_trouble = active;
                    if active {
                        self.push(
                            events,
                            StatusEvent::PartitionMessageChanged {
                                partition: 1,
                                message: "AC power failure".to_string(),
                            },
                        );
                    }
                }
            }
            DecodedEvent::BatteryTrouble(active) => {
                if active != self.battery_trouble {
                    self.battery_trouble = active;
                    if active {
                        self.push(
                            events,
                            StatusEvent::PartitionMessageChanged {
                                partition: 1,
                                message: "Battery trouble".to_string(),
                            },
                        );
                    }
                }
            }
            DecodedEvent::Fire { partition, active } => {
                if partition == 0 || partition as usize > MAX_PARTITIONS {
                    return;
                }
                let index = (partition - 1) as usize;
                if self.fire[index] != active {
                    self.fire[index] = active;
                    self.push(events, StatusEvent::FireStatusChanged { partition, active });
                }
            }
        }
    }

    fn apply_partition_status(
        &mut self,
        partition: u8,
        raw: u8,
        now_ms: u64,
        events: &mut EventBuffer,
    ) {
        if partition == 0 || partition as usize > self.config.series.partition_count() {
            return;
        }
        let index = (partition - 1) as usize;
        let change = self.partitions.apply(index, raw, now_ms);

        if change.raw_changed {
            if self.config.enable_status_messages {
                let mut message = ArrayString::<64>::new();
                let _ = write!(message, "{raw:02X}: {}", self.partitions.message_for(raw));
                self.push(
                    events,
                    StatusEvent::PartitionMessageChanged {
                        partition,
                        message: message.to_string(),
                    },
                );
            }
            if raw == STATUS_ACCESS_CODE_PROMPT && self.config.series == SeriesType::PowerSeries {
                self.answer_access_code_prompt(partition);
            }
        }

        if let Some(state) = change.new_state {
            self.push(events, StatusEvent::PartitionStatusChanged { partition, state });
        }
    }

    /// The panel is asking for an access code. Answer automatically when
    /// one is configured, mirroring keypad behavior.
    fn answer_access_code_prompt(&mut self, partition: u8) {
        let code = self.config.access_code.clone();
        if code.len() == ACCESS_CODE_LEN && is_numeric_code(&code) && self.port.write_ready() {
            debug!(partition, "answering access code prompt");
            let _ = self.enqueue_keys(partition, code.as_bytes());
        }
    }

    fn service_write_queue(&mut self) {
        if !self.init.is_ready() {
            return;
        }
        while self.port.write_ready() {
            let (partition, key) = match self.write_queue.pop_front() {
                Some(entry) => entry,
                None => break,
            };
            if let Err(err) = self.port.write_key(partition, key) {
                warn!(%err, "keypad write failed - dropping key");
                break;
            }
        }
    }

    fn enqueue_keys(&mut self, partition: u8, keys: &[u8]) -> Result<(), DriverError> {
        for &key in keys {
            self.write_queue
                .push_back((partition, key))
                .map_err(|_| DriverError::WriteQueueFull)?;
        }
        Ok(())
    }

    fn partition_index(&self, partition: u8) -> Result<usize, DriverError> {
        if partition == 0 || partition as usize > self.config.series.partition_count() {
            return Err(DriverError::InvalidPartition(partition));
        }
        Ok((partition - 1) as usize)
    }

    pub fn arm_stay(&mut self, partition: u8) -> Result<(), DriverError> {
        self.arm(partition, KEY_ARM_STAY)
    }

    pub fn arm_away(&mut self, partition: u8) -> Result<(), DriverError> {
        self.arm(partition, KEY_ARM_AWAY)
    }

    pub fn arm_night(&mut self, partition: u8) -> Result<(), DriverError> {
        self.arm(partition, KEY_ARM_NIGHT)
    }

    fn arm(&mut self, partition: u8, key: u8) -> Result<(), DriverError> {
        let index = self.partition_index(partition)?;
        if self.config.standalone_mode {
            debug!(partition, "arm request ignored in standalone mode");
            return Ok(());
        }
        let state = self.partitions.state(index);
        if state.is_armed() || state == PartitionArmState::ExitDelay {
            return Err(DriverError::NotReadyToArm(partition));
        }
        self.enqueue_keys(partition, &[key])
    }

    pub fn disarm(&mut self, partition: u8, code: &str) -> Result<(), DriverError> {
        let index = self.partition_index(partition)?;
        if code.len() != ACCESS_CODE_LEN || !is_numeric_code(code) {
            return Err(DriverError::InvalidAccessCode);
        }
        if self.config.standalone_mode {
            debug!(partition, "disarm request ignored in standalone mode");
            return Ok(());
        }
        let state = self.partitions.state(index);
        if !(state.is_armed()
            || state == PartitionArmState::ExitDelay
            || state == PartitionArmState::AlarmActive)
        {
            return Err(DriverError::NotArmed(partition));
        }
        self.enqueue_keys(partition, code.as_bytes())
    }

    pub fn trigger_fire(&mut self, partition: u8) -> Result<(), DriverError> {
        self.partition_index(partition)?;
        if self.config.standalone_mode {
            return Ok(());
        }
        self.enqueue_keys(partition, &[KEY_FIRE])
    }

    pub fn trigger_panic(&mut self, partition: u8) -> Result<(), DriverError> {
        self.partition_index(partition)?;
        if self.config.standalone_mode {
            return Ok(());
        }
        self.enqueue_keys(partition, &[KEY_PANIC])
    }

    /// Raw keypad passthrough.
    pub fn write_keys(&mut self, partition: u8, keys: &str) -> Result<(), DriverError> {
        self.partition_index(partition)?;
        if self.config.standalone_mode {
            return Ok(());
        }
        self.enqueue_keys(partition, keys.as_bytes())
    }

    /// Detach interrupts and release the timer. The driver reports no
    /// further status until reconstructed.
    pub fn stop(&mut self) {
        self.timer.stop();
        self.port.detach();
        self.capture.reset();
        self.link_up = false;
        debug!("keybus driver stopped");
    }

    fn push(&mut self, events: &mut EventBuffer, event: StatusEvent) {
        if events.push(event).is_err() {
            self.events_dropped = self.events_dropped.saturating_add(1);
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Shared handle to the capture ring, for interrupt wiring and for
    /// frame injection in simulation.
    pub fn capture(&self) -> Arc<BusCapture> {
        Arc::clone(&self.capture)
    }

    /// Semantic state of a 1-based partition.
    pub fn partition_state(&self, partition: u8) -> Option<PartitionArmState> {
        self.partition_index(partition)
            .ok()
            .map(|index| self.partitions.state(index))
    }

    pub fn zone_open(&self, zone: u8) -> bool {
        self.zones.zone_open(zone)
    }

    pub fn zone_alarm(&self, zone: u8) -> bool {
        self.zones.zone_alarm(zone)
    }

    pub fn diagnostics(&self) -> DriverDiagnostics {
        DriverDiagnostics {
            init_state: self.init.state(),
            failure_reason: self.init.failure_reason().map(str::to_string),
            timer_attempts: self.init.timer_attempts(),
            packet_attempts: self.init.packet_attempts(),
            decode: self.decoder.stats(),
            buffer_overflows: self.capture.overflow_count(),
            events_dropped: self.events_dropped,
            link_up: self.link_up,
            write_queue_depth: self.write_queue.len(),
        }
    }
}
