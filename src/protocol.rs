//! Frame validation and decoding for the two supported panel series.
//!
//! Malformed frames are counted and discarded; they are never fatal and
//! are not retried — the next frame is simply awaited.

use heapless::Vec;
use serde::Serialize;
use static_assertions::const_assert;

use crate::capture::{CapturedFrame, FRAME_BYTES};
use crate::config::SeriesType;
use crate::partition::MAX_PARTITIONS;

/// PowerSeries frames: `[cmd, payload x8, checksum]`.
pub const POWER_SERIES_FRAME_BYTES: usize = 10;
/// Classic frames: `[lights, open zones, alarm zones, flags, checksum]`.
pub const CLASSIC_FRAME_BYTES: usize = 5;

const_assert!(POWER_SERIES_FRAME_BYTES <= FRAME_BYTES);
const_assert!(CLASSIC_FRAME_BYTES <= FRAME_BYTES);

// PowerSeries command codes.
pub const CMD_PARTITION_STATUS_LOW: u8 = 0x05; // partitions 1-4
pub const CMD_PARTITION_STATUS_HIGH: u8 = 0x1B; // partitions 5-8
pub const CMD_ZONE_OPEN: u8 = 0x27;
pub const CMD_ZONE_ALARM: u8 = 0x3A;
pub const CMD_SYSTEM_FLAGS: u8 = 0xA5;

// System flag bits carried by CMD_SYSTEM_FLAGS byte 1 and the Classic
// flags byte.
pub const FLAG_TROUBLE: u8 = 0x01;
pub const FLAG_AC_TROUBLE: u8 = 0x02;
pub const FLAG_BATTERY_TROUBLE: u8 = 0x04;
const CLASSIC_FLAG_FIRE: u8 = 0x02;
const CLASSIC_FLAG_AC: u8 = 0x04;
const CLASSIC_FLAG_BATTERY: u8 = 0x08;

/// Upper bound on events a single frame can expand to (a system-flags
/// frame fans out to per-partition fire flags).
pub const MAX_EVENTS_PER_FRAME: usize = 16;

pub type FrameEvents = Vec<DecodedEvent, MAX_EVENTS_PER_FRAME>;

/// Semantic events extracted from validated frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Raw per-partition status. For PowerSeries `raw` is the status
    /// code byte; for Classic it is the lamp byte.
    PartitionStatus { partition: u8, raw: u8 },
    /// Open/closed bitmap for one group of eight zones.
    ZoneOpenBitmap { group: u8, zones: u8 },
    /// Alarm bitmap for one group of eight zones.
    ZoneAlarmBitmap { group: u8, zones: u8 },
    Trouble(bool),
    AcPowerTrouble(bool),
    BatteryTrouble(bool),
    Fire { partition: u8, active: bool },
}

/// Decode counters exposed through driver diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DecodeStats {
    pub frames_decoded: u32,
    pub checksum_errors: u32,
    pub runt_frames: u32,
    pub unknown_commands: u32,
}

#[derive(Debug)]
pub struct ProtocolDecoder {
    series: SeriesType,
    stats: DecodeStats,
}

impl ProtocolDecoder {
    pub fn new(series: SeriesType) -> Self {
        Self {
            series,
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Validate framing and expand one captured row into events. Returns
    /// `None` for malformed rows, which are counted and skipped.
    pub fn decode(&mut self, frame: &CapturedFrame) -> Option<FrameEvents> {
        if frame.bit_count != self.series.frame_bits() {
            self.stats.runt_frames = self.stats.runt_frames.saturating_add(1);
            return None;
        }

        let events = match self.series {
            SeriesType::PowerSeries => self.decode_power_series(frame.as_bytes()),
            SeriesType::Classic => self.decode_classic(frame.as_bytes()),
        };
        if events.is_some() {
            self.stats.frames_decoded = self.stats.frames_decoded.saturating_add(1);
        }
        events
    }

    fn decode_power_series(&mut self, bytes: &[u8]) -> Option<FrameEvents> {
        let expected = power_series_checksum(&bytes[..POWER_SERIES_FRAME_BYTES - 1]);
        if bytes[POWER_SERIES_FRAME_BYTES - 1] != expected {
            self.stats.checksum_errors = self.stats.checksum_errors.saturating_add(1);
            return None;
        }

        let mut events = FrameEvents::new();
        match bytes[0] {
            CMD_PARTITION_STATUS_LOW => partition_status_pairs(bytes, 1, &mut events),
            CMD_PARTITION_STATUS_HIGH => partition_status_pairs(bytes, 5, &mut events),
            CMD_ZONE_OPEN => {
                let _ = events.push(DecodedEvent::ZoneOpenBitmap {
                    group: bytes[1] & 0x07,
                    zones: bytes[2],
                });
            }
            CMD_ZONE_ALARM => {
                let _ = events.push(DecodedEvent::ZoneAlarmBitmap {
                    group: bytes[1] & 0x07,
                    zones: bytes[2],
                });
            }
            CMD_SYSTEM_FLAGS => {
                let flags = bytes[1];
                let _ = events.push(DecodedEvent::Trouble(flags & FLAG_TROUBLE != 0));
                let _ = events.push(DecodedEvent::AcPowerTrouble(flags & FLAG_AC_TROUBLE != 0));
                let _ =
                    events.push(DecodedEvent::BatteryTrouble(flags & FLAG_BATTERY_TROUBLE != 0));
                let fire_bitmap = bytes[2];
                for partition in 0..MAX_PARTITIONS as u8 {
                    let _ = events.push(DecodedEvent::Fire {
                        partition: partition + 1,
                        active: fire_bitmap & (1 << partition) != 0,
                    });
                }
            }
            _ => {
                self.stats.unknown_commands = self.stats.unknown_commands.saturating_add(1);
            }
        }
        Some(events)
    }

    fn decode_classic(&mut self, bytes: &[u8]) -> Option<FrameEvents> {
        let expected = classic_checksum(&bytes[..CLASSIC_FRAME_BYTES - 1]);
        if bytes[CLASSIC_FRAME_BYTES - 1] != expected {
            self.stats.checksum_errors = self.stats.checksum_errors.saturating_add(1);
            return None;
        }

        let flags = bytes[3];
        let mut events = FrameEvents::new();
        let _ = events.push(DecodedEvent::PartitionStatus {
            partition: 1,
            raw: bytes[0],
        });
        let _ = events.push(DecodedEvent::ZoneOpenBitmap {
            group: 0,
            zones: bytes[1],
        });
        let _ = events.push(DecodedEvent::ZoneAlarmBitmap {
            group: 0,
            zones: bytes[2],
        });
        let _ = events.push(DecodedEvent::Trouble(flags & FLAG_TROUBLE != 0));
        let _ = events.push(DecodedEvent::Fire {
            partition: 1,
            active: flags & CLASSIC_FLAG_FIRE != 0,
        });
        let _ = events.push(DecodedEvent::AcPowerTrouble(flags & CLASSIC_FLAG_AC != 0));
        let _ = events.push(DecodedEvent::BatteryTrouble(flags & CLASSIC_FLAG_BATTERY != 0));
        Some(events)
    }
}

/// Status pairs `(lights, code)` for four consecutive partitions. A code
/// byte of zero means the partition is not reported in this frame.
fn partition_status_pairs(bytes: &[u8], first_partition: u8, events: &mut FrameEvents) {
    for slot in 0..4u8 {
        let code = bytes[2 + (slot as usize) * 2];
        if code == 0 {
            continue;
        }
        let _ = events.push(DecodedEvent::PartitionStatus {
            partition: first_partition + slot,
            raw: code,
        });
    }
}

/// Additive 8-bit checksum over every byte before the checksum slot.
pub fn power_series_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// XOR checksum over every byte before the checksum slot.
pub fn classic_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum ^ *b)
}

/// Panel-side encoder for PowerSeries frames. `payload` fills bytes 1..9;
/// missing bytes are zero. Used by the simulator and tests.
pub fn encode_power_series(cmd: u8, payload: &[u8]) -> [u8; POWER_SERIES_FRAME_BYTES] {
    let mut frame = [0u8; POWER_SERIES_FRAME_BYTES];
    frame[0] = cmd;
    for (dst, src) in frame[1..POWER_SERIES_FRAME_BYTES - 1].iter_mut().zip(payload) {
        *dst = *src;
    }
    frame[POWER_SERIES_FRAME_BYTES - 1] =
        power_series_checksum(&frame[..POWER_SERIES_FRAME_BYTES - 1]);
    frame
}

/// Panel-side encoder for Classic lamp frames.
pub fn encode_classic(
    lights: u8,
    open_zones: u8,
    alarm_zones: u8,
    flags: u8,
) -> [u8; CLASSIC_FRAME_BYTES] {
    let mut frame = [lights, open_zones, alarm_zones, flags, 0];
    frame[CLASSIC_FRAME_BYTES - 1] = classic_checksum(&frame[..CLASSIC_FRAME_BYTES - 1]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_rules_differ_between_series() {
        assert_eq!(power_series_checksum(&[0x05, 0x81, 0x01]), 0x87);
        assert_eq!(classic_checksum(&[0x05, 0x81, 0x01]), 0x85);
    }

    #[test]
    fn encoders_produce_valid_checksums() {
        let frame = encode_power_series(CMD_ZONE_OPEN, &[0x00, 0x05]);
        assert_eq!(
            frame[POWER_SERIES_FRAME_BYTES - 1],
            power_series_checksum(&frame[..POWER_SERIES_FRAME_BYTES - 1])
        );

        let frame = encode_classic(0x81, 0x01, 0x00, 0x00);
        assert_eq!(
            frame[CLASSIC_FRAME_BYTES - 1],
            classic_checksum(&frame[..CLASSIC_FRAME_BYTES - 1])
        );
    }
}
