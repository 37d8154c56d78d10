//! Partition status interpretation layered on top of decoded status
//! bytes.
//!
//! The key policy is two-phase arming: a byte indicating "exit delay in
//! progress" surfaces as `ExitDelay`, and the final armed variant is
//! latched only when the panel reports the delay has concluded. Mapping
//! bytes 1:1 would misreport transient pending states as immediately
//! armed.

use serde::Serialize;
use tracing::debug;

use crate::config::SeriesType;

pub const MAX_PARTITIONS: usize = 8;

// PowerSeries status codes understood by the interpreter. The full
// code-to-text table lives in `status_text`.
pub const STATUS_READY: u8 = 0x01;
pub const STATUS_ARMED_STAY: u8 = 0x04;
pub const STATUS_ARMED_AWAY: u8 = 0x05;
pub const STATUS_ARMED_NIGHT: u8 = 0x06;
pub const STATUS_EXIT_DELAY: u8 = 0x08;
pub const STATUS_QUICK_EXIT: u8 = 0x0B;
pub const STATUS_ENTRY_DELAY: u8 = 0x0C;
pub const STATUS_ALARM: u8 = 0x11;
pub const STATUS_DISARMED_3D: u8 = 0x3D;
pub const STATUS_DISARMED_3E: u8 = 0x3E;
pub const STATUS_ACCESS_CODE_PROMPT: u8 = 0x9F;

// Classic lamp bits, keypad order.
pub const LAMP_READY: u8 = 0x01;
pub const LAMP_ARMED: u8 = 0x02;
pub const LAMP_MEMORY: u8 = 0x04;
pub const LAMP_BYPASS: u8 = 0x08;
pub const LAMP_TROUBLE: u8 = 0x10;

/// Semantic partition state, matching panel lamp semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionArmState {
    Ready,
    ExitDelay,
    ArmedStay,
    ArmedAway,
    ArmedNight,
    AlarmActive,
    Disarmed,
    Trouble,
}

impl PartitionArmState {
    pub fn is_armed(self) -> bool {
        matches!(
            self,
            PartitionArmState::ArmedStay
                | PartitionArmState::ArmedAway
                | PartitionArmState::ArmedNight
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            PartitionArmState::Ready => "ready",
            PartitionArmState::ExitDelay => "exit delay",
            PartitionArmState::ArmedStay => "armed stay",
            PartitionArmState::ArmedAway => "armed away",
            PartitionArmState::ArmedNight => "armed night",
            PartitionArmState::AlarmActive => "alarm",
            PartitionArmState::Disarmed => "disarmed",
            PartitionArmState::Trouble => "trouble",
        }
    }
}

/// Per-partition tracked state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PartitionStatus {
    pub raw_status: u8,
    pub state: PartitionArmState,
    pub last_change_ms: u64,
}

impl PartitionStatus {
    fn new() -> Self {
        Self {
            raw_status: 0,
            state: PartitionArmState::Ready,
            last_change_ms: 0,
        }
    }
}

#[derive(Debug)]
pub struct PartitionInterpreter {
    series: SeriesType,
    partitions: [PartitionStatus; MAX_PARTITIONS],
}

/// Outcome of applying one decoded status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Raw byte differs from the stored one.
    pub raw_changed: bool,
    /// Semantic state transitioned; `None` when unchanged.
    pub new_state: Option<PartitionArmState>,
}

impl PartitionInterpreter {
    pub fn new(series: SeriesType) -> Self {
        Self {
            series,
            partitions: [PartitionStatus::new(); MAX_PARTITIONS],
        }
    }

    pub fn partition(&self, index: usize) -> &PartitionStatus {
        &self.partitions[index]
    }

    pub fn state(&self, index: usize) -> PartitionArmState {
        self.partitions[index].state
    }

    /// Apply a decoded raw status byte for partition `index` (0-based).
    /// Returns what changed; an unchanged byte reports nothing.
    pub fn apply(&mut self, index: usize, raw: u8, now_ms: u64) -> StatusChange {
        let entry = &mut self.partitions[index];
        if entry.raw_status == raw && entry.last_change_ms != 0 {
            return StatusChange {
                raw_changed: false,
                new_state: None,
            };
        }

        let previous = entry.state;
        let next = match self.series {
            SeriesType::PowerSeries => power_series_state(previous, raw),
            SeriesType::Classic => classic_state(previous, raw),
        };

        entry.raw_status = raw;
        if entry.last_change_ms == 0 {
            entry.last_change_ms = now_ms;
        }
        let new_state = if next != previous {
            debug!(
                partition = index + 1,
                from = previous.label(),
                to = next.label(),
                raw,
                "partition state transition"
            );
            entry.state = next;
            entry.last_change_ms = now_ms;
            Some(next)
        } else {
            None
        };

        StatusChange {
            raw_changed: true,
            new_state,
        }
    }

    /// Human-readable text for a raw status byte, for partition message
    /// notifications.
    pub fn message_for(&self, raw: u8) -> &'static str {
        match self.series {
            SeriesType::PowerSeries => status_text(raw),
            SeriesType::Classic => classic_lamp_text(raw),
        }
    }
}

/// PowerSeries code interpretation. Pending and armed codes move the
/// state; informational codes hold it. There is no path from `ExitDelay`
/// back to `Ready` without an explicit disarm code.
fn power_series_state(previous: PartitionArmState, code: u8) -> PartitionArmState {
    match code {
        STATUS_READY => match previous {
            PartitionArmState::Ready | PartitionArmState::Disarmed | PartitionArmState::Trouble => {
                PartitionArmState::Ready
            }
            // Armed, pending, or alarming partitions ignore a transient
            // ready code; only a disarm code releases them.
            other => other,
        },
        STATUS_ARMED_STAY => PartitionArmState::ArmedStay,
        STATUS_ARMED_AWAY => PartitionArmState::ArmedAway,
        STATUS_ARMED_NIGHT | 0x09 | 0x16 => PartitionArmState::ArmedNight,
        STATUS_EXIT_DELAY | STATUS_QUICK_EXIT => PartitionArmState::ExitDelay,
        STATUS_ALARM => PartitionArmState::AlarmActive,
        STATUS_DISARMED_3D | STATUS_DISARMED_3E => PartitionArmState::Disarmed,
        0xC8 | 0xB9 => PartitionArmState::Trouble,
        // Entry delay, alarm memory, menus, prompts: message-only codes.
        _ => previous,
    }
}

/// Classic lamp interpretation. Ready and armed lit together is the exit
/// delay (pending) pattern; once ready drops, bypass distinguishes stay
/// from away, and the memory lamp while armed indicates a tripped alarm.
fn classic_state(previous: PartitionArmState, lights: u8) -> PartitionArmState {
    let ready = lights & LAMP_READY != 0;
    let armed = lights & LAMP_ARMED != 0;
    let memory = lights & LAMP_MEMORY != 0;
    let bypass = lights & LAMP_BYPASS != 0;
    let trouble = lights & LAMP_TROUBLE != 0;

    if armed && memory && !ready {
        PartitionArmState::AlarmActive
    } else if armed && ready {
        PartitionArmState::ExitDelay
    } else if armed && bypass {
        PartitionArmState::ArmedStay
    } else if armed {
        PartitionArmState::ArmedAway
    } else if ready {
        match previous {
            // Lamps cannot distinguish a fresh ready from post-disarm,
            // so latch the disarmed report.
            PartitionArmState::ExitDelay
            | PartitionArmState::ArmedStay
            | PartitionArmState::ArmedAway
            | PartitionArmState::ArmedNight
            | PartitionArmState::AlarmActive
            | PartitionArmState::Disarmed => PartitionArmState::Disarmed,
            _ => PartitionArmState::Ready,
        }
    } else if trouble {
        PartitionArmState::Trouble
    } else {
        previous
    }
}

fn classic_lamp_text(lights: u8) -> &'static str {
    let ready = lights & LAMP_READY != 0;
    let armed = lights & LAMP_ARMED != 0;
    if armed && ready {
        "Exit delay in progress"
    } else if armed && lights & LAMP_MEMORY != 0 {
        "Alarm"
    } else if armed && lights & LAMP_BYPASS != 0 {
        "Armed: Stay"
    } else if armed {
        "Armed: Away"
    } else if ready {
        "Ready"
    } else if lights & LAMP_TROUBLE != 0 {
        "Trouble"
    } else {
        "Not ready"
    }
}

/// PowerSeries status byte to keypad message text.
pub fn status_text(status_code: u8) -> &'static str {
    match status_code {
        0x01 => "Ready",
        0x02 => "Stay zones open",
        0x03 => "Zones open",
        0x04 => "Armed: Stay",
        0x05 => "Armed: Away",
        0x06 => "Armed: Night",
        0x07 => "Failed to arm",
        0x08 => "Exit delay in progress",
        0x09 => "Arming: No entry delay",
        0x0B => "Quick exit in progress",
        0x0C => "Entry delay in progress",
        0x0D => "Entry delay after alarm",
        0x10 => "Keypad lockout",
        0x11 => "Partition in alarm",
        0x14 => "Auto-arm in progress",
        0x15 => "Arming with bypassed zones",
        0x16 => "Armed: No entry delay",
        0x17 => "Power failure",
        0x22 => "Recent closing",
        0x33 => "Command output in progress",
        0x3D => "Disarmed after alarm",
        0x3E => "Disarmed",
        0x40 => "Keypad blanked",
        0x8A => "Activate stay/away zones",
        0x8B => "Quick exit",
        0x8E => "Invalid option",
        0x8F => "Invalid access code",
        0x9E => "Enter * function code",
        0x9F => "Enter access code",
        0xA0 => "Zone bypass programming",
        0xA1 => "Trouble menu",
        0xA2 => "Alarm memory",
        0xA3 => "Door chime enabled",
        0xA4 => "Door chime disabled",
        0xA5 => "Enter master code",
        0xA6 => "Access codes",
        0xA7 => "Enter new 4-digit code",
        0xA9 => "User function",
        0xAA => "Time and date",
        0xAB => "Auto-arm time",
        0xAC => "Auto-arm enabled",
        0xAD => "Auto-arm disabled",
        0xAF => "System test",
        0xB0 => "Enable DLS",
        0xB2 => "Command output",
        0xB7 => "Enter installer code",
        0xB8 => "Enter * function code while armed",
        0xB9 => "Zone tamper menu",
        0xBA => "Zones with low batteries",
        0xC6 => "Zone fault menu",
        0xC8 => "Service required",
        0xD0 => "Keypads with low batteries",
        0xD1 => "Wireless keys with low batteries",
        0xE4 => "Installer programming",
        0xE5 => "Keypad slot assignment",
        0xE6 => "Input: 2 digits",
        0xE7 => "Input: 3 digits",
        0xE8 => "Input: 4 digits",
        0xEA => "Code: 2 digits",
        0xEB => "Code: 4 digits",
        0xEC => "Input: 6 digits",
        0xED => "Input: 32 digits",
        0xEE => "Input: 1 option per zone",
        0xF8 => "Keypad programming",
        0xFF => "Disabled",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_series_exit_delay_holds_through_ready_code() {
        let mut interp = PartitionInterpreter::new(SeriesType::PowerSeries);
        interp.apply(0, STATUS_EXIT_DELAY, 10);
        assert_eq!(interp.state(0), PartitionArmState::ExitDelay);

        // A transient ready code must not silently revert the pending
        // state.
        interp.apply(0, STATUS_READY, 20);
        assert_eq!(interp.state(0), PartitionArmState::ExitDelay);

        interp.apply(0, STATUS_DISARMED_3E, 30);
        assert_eq!(interp.state(0), PartitionArmState::Disarmed);
    }

    #[test]
    fn classic_lamp_patterns() {
        assert_eq!(
            classic_state(PartitionArmState::Ready, LAMP_READY | LAMP_ARMED),
            PartitionArmState::ExitDelay
        );
        assert_eq!(
            classic_state(PartitionArmState::ExitDelay, LAMP_ARMED | LAMP_BYPASS),
            PartitionArmState::ArmedStay
        );
        assert_eq!(
            classic_state(PartitionArmState::ExitDelay, LAMP_ARMED),
            PartitionArmState::ArmedAway
        );
        assert_eq!(
            classic_state(PartitionArmState::ArmedAway, LAMP_ARMED | LAMP_MEMORY),
            PartitionArmState::AlarmActive
        );
        assert_eq!(
            classic_state(PartitionArmState::ArmedAway, LAMP_READY),
            PartitionArmState::Disarmed
        );
    }

    #[test]
    fn repeated_byte_reports_nothing() {
        let mut interp = PartitionInterpreter::new(SeriesType::PowerSeries);
        let first = interp.apply(0, STATUS_EXIT_DELAY, 10);
        assert!(first.raw_changed);
        assert_eq!(first.new_state, Some(PartitionArmState::ExitDelay));

        let second = interp.apply(0, STATUS_EXIT_DELAY, 20);
        assert!(!second.raw_changed);
        assert_eq!(second.new_state, None);
    }

    #[test]
    fn status_text_covers_common_codes() {
        assert_eq!(status_text(0x01), "Ready");
        assert_eq!(status_text(0x08), "Exit delay in progress");
        assert_eq!(status_text(0x9F), "Enter access code");
        assert_eq!(status_text(0x42), "Unknown");
    }
}
