use heapless::Vec;
use serde::Serialize;

use crate::partition::PartitionArmState;

/// Upper bound on notifications one poll can emit. Sized so a first
/// bitmap report covering all 64 zones still fits.
pub const MAX_EVENTS_PER_POLL: usize = 96;

/// Bounded buffer of change notifications returned from `poll()`.
/// Dispatch order across event kinds is unspecified.
pub type EventBuffer = Vec<StatusEvent, MAX_EVENTS_PER_POLL>;

// System status strings. The terminal failure reasons double as the
// payload of the single notification emitted on permanent failure.
pub const STATUS_ONLINE: &str = "online";
pub const STATUS_OFFLINE: &str = "offline";
pub const STATUS_STANDALONE: &str = "online (standalone mode)";
pub const MSG_TIMER_UNAVAILABLE: &str = "timer subsystem unavailable";
pub const MSG_NO_PANEL: &str = "no panel detected";

/// Typed status-change notifications emitted to collaborators. Each
/// carries only the changed value; an unchanged state is never
/// re-notified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatusEvent {
    SystemStatusChanged(String),
    PartitionStatusChanged {
        partition: u8,
        state: PartitionArmState,
    },
    PartitionMessageChanged {
        partition: u8,
        message: String,
    },
    TroubleStatusChanged(bool),
    FireStatusChanged {
        partition: u8,
        active: bool,
    },
    ZoneStatusChanged {
        zone: u8,
        open: bool,
    },
    ZoneAlarmChanged {
        zone: u8,
        active: bool,
    },
}
