use serde::{Deserialize, Serialize};
use thiserror::Error;

// Default wiring matches the reference ESP32 module layout.
pub const DEFAULT_CLOCK_PIN: u8 = 18;
pub const DEFAULT_READ_PIN: u8 = 19;
pub const DEFAULT_WRITE_PIN: u8 = 21;
pub const DEFAULT_PC16_PIN: u8 = 17;

pub const ACCESS_CODE_LEN: usize = 4;

/// Supported panel families. The two series differ in framing, checksum
/// rules, auxiliary pin requirements, and bring-up timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesType {
    PowerSeries,
    Classic,
}

impl SeriesType {
    /// Fixed frame length on the wire, in bytes.
    pub fn frame_bytes(self) -> usize {
        match self {
            SeriesType::PowerSeries => crate::protocol::POWER_SERIES_FRAME_BYTES,
            SeriesType::Classic => crate::protocol::CLASSIC_FRAME_BYTES,
        }
    }

    /// Fixed frame length on the wire, in bits. A capture row is complete
    /// only once exactly this many bits have been shifted in.
    pub fn frame_bits(self) -> u16 {
        (self.frame_bytes() * 8) as u16
    }

    /// Partitions reported by this series.
    pub fn partition_count(self) -> usize {
        match self {
            SeriesType::PowerSeries => crate::partition::MAX_PARTITIONS,
            SeriesType::Classic => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeriesType::PowerSeries => "PowerSeries",
            SeriesType::Classic => "Classic",
        }
    }
}

/// Bus pin assignments. The PC-16 auxiliary pin is required for Classic
/// series panels and unused on PowerSeries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    pub clock: u8,
    pub data_read: u8,
    pub data_write: u8,
    pub pc16: Option<u8>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            clock: DEFAULT_CLOCK_PIN,
            data_read: DEFAULT_READ_PIN,
            data_write: DEFAULT_WRITE_PIN,
            pc16: None,
        }
    }
}

impl PinConfig {
    fn assigned(&self) -> [Option<u8>; 4] {
        [
            Some(self.clock),
            Some(self.data_read),
            Some(self.data_write),
            self.pc16,
        ]
    }
}

/// Bring-up and retry timing. All waits are enforced by wall-clock
/// comparison against the caller-supplied tick time, never by iteration
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay after boot before touching platform timer/interrupt
    /// facilities.
    pub stabilization_delay_ms: u64,
    /// Hard ceiling on the stabilization wait; the transition is forced
    /// (with a warning) once this elapses.
    pub stabilization_ceiling_ms: u64,
    /// Base for the linear backoff between timer pre-init attempts.
    pub timer_retry_backoff_ms: u64,
    pub timer_max_attempts: u32,
    pub timer_max_elapsed_ms: u64,
    /// Window in which the first valid frame must arrive after interrupt
    /// attach before the attempt is counted as failed.
    pub first_packet_timeout_ms: u64,
    /// Base for the linear backoff between first-packet attempts.
    pub packet_retry_backoff_ms: u64,
    pub packet_max_attempts: u32,
    pub packet_max_elapsed_ms: u64,
    /// Silence on an initialized bus longer than this marks the link down.
    pub link_timeout_ms: u64,
}

impl TimingConfig {
    /// Series defaults. Classic panels settle slower, so every window is
    /// stretched relative to PowerSeries.
    pub fn for_series(series: SeriesType) -> Self {
        match series {
            SeriesType::PowerSeries => Self {
                stabilization_delay_ms: 3_000,
                stabilization_ceiling_ms: 30_000,
                timer_retry_backoff_ms: 1_000,
                timer_max_attempts: 10,
                timer_max_elapsed_ms: 120_000,
                first_packet_timeout_ms: 30_000,
                packet_retry_backoff_ms: 2_000,
                packet_max_attempts: 5,
                packet_max_elapsed_ms: 180_000,
                link_timeout_ms: 3_000,
            },
            SeriesType::Classic => Self {
                stabilization_delay_ms: 4_000,
                stabilization_ceiling_ms: 30_000,
                timer_retry_backoff_ms: 1_000,
                timer_max_attempts: 10,
                timer_max_elapsed_ms: 120_000,
                first_packet_timeout_ms: 45_000,
                packet_retry_backoff_ms: 2_500,
                packet_max_attempts: 5,
                packet_max_elapsed_ms: 240_000,
                link_timeout_ms: 3_000,
            },
        }
    }
}

/// Driver configuration, immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub series: SeriesType,
    pub pins: PinConfig,
    /// Opaque access code forwarded unmodified for disarm writes and
    /// access-code prompts. Not validated beyond the numeric check used
    /// before writing it onto the bus.
    pub access_code: String,
    /// Bypass all hardware interaction and synthesize a successful
    /// bring-up. For bench setups with no panel attached.
    pub standalone_mode: bool,
    /// 0-3, controls log verbosity only.
    pub debug_level: u8,
    /// Emit a PartitionMessageChanged for every raw status byte change.
    pub enable_status_messages: bool,
    pub timing: TimingConfig,
}

impl PanelConfig {
    pub fn new(series: SeriesType) -> Self {
        let pins = PinConfig {
            pc16: match series {
                SeriesType::Classic => Some(DEFAULT_PC16_PIN),
                SeriesType::PowerSeries => None,
            },
            ..PinConfig::default()
        };
        Self {
            series,
            pins,
            access_code: String::new(),
            standalone_mode: false,
            debug_level: 0,
            enable_status_messages: true,
            timing: TimingConfig::for_series(series),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series == SeriesType::Classic && self.pins.pc16.is_none() {
            return Err(ConfigError::MissingPc16Pin);
        }
        let pins = self.pins.assigned();
        for (i, a) in pins.iter().enumerate() {
            for b in pins.iter().skip(i + 1) {
                if let (Some(a), Some(b)) = (a, b) {
                    if a == b {
                        return Err(ConfigError::PinConflict(*a));
                    }
                }
            }
        }
        if self.debug_level > 3 {
            return Err(ConfigError::InvalidDebugLevel(self.debug_level));
        }
        if !self.access_code.is_empty() && !is_numeric_code(&self.access_code) {
            return Err(ConfigError::InvalidAccessCode);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Classic series requires a PC-16 auxiliary pin")]
    MissingPc16Pin,
    #[error("pin {0} assigned to more than one bus line")]
    PinConflict(u8),
    #[error("debug level {0} out of range 0-3")]
    InvalidDebugLevel(u8),
    #[error("access code must be numeric")]
    InvalidAccessCode,
}

/// True if the code is non-empty and entirely ASCII digits.
pub fn is_numeric_code(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit())
}
