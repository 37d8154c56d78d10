//! Zone open/alarm bitmap tracking. Consumers are notified per zone and
//! only on change, never on every poll.

use crate::event::{EventBuffer, StatusEvent};

/// Zone groups of eight zones each, 64 zones total.
pub const ZONE_GROUPS: usize = 8;
pub const MAX_ZONES: usize = ZONE_GROUPS * 8;

#[derive(Debug, Default)]
pub struct ZoneTracker {
    open: [u8; ZONE_GROUPS],
    alarm: [u8; ZONE_GROUPS],
}

impl ZoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone_open(&self, zone: u8) -> bool {
        bit_for_zone(&self.open, zone)
    }

    pub fn zone_alarm(&self, zone: u8) -> bool {
        bit_for_zone(&self.alarm, zone)
    }

    /// Apply a new open-zone bitmap for one group, emitting a
    /// ZoneStatusChanged for every zone whose bit flipped.
    pub fn apply_open(&mut self, group: u8, zones: u8, events: &mut EventBuffer) -> u32 {
        diff_group(&mut self.open, group, zones, events, |zone, set| {
            StatusEvent::ZoneStatusChanged { zone, open: set }
        })
    }

    /// Apply a new alarm bitmap for one group, emitting ZoneAlarmChanged
    /// per flipped bit.
    pub fn apply_alarm(&mut self, group: u8, zones: u8, events: &mut EventBuffer) -> u32 {
        diff_group(&mut self.alarm, group, zones, events, |zone, set| {
            StatusEvent::ZoneAlarmChanged { zone, active: set }
        })
    }
}

fn bit_for_zone(groups: &[u8; ZONE_GROUPS], zone: u8) -> bool {
    if zone == 0 || zone as usize > MAX_ZONES {
        return false;
    }
    let index = (zone - 1) as usize;
    groups[index / 8] & (1 << (index % 8)) != 0
}

fn diff_group(
    groups: &mut [u8; ZONE_GROUPS],
    group: u8,
    zones: u8,
    events: &mut EventBuffer,
    make_event: impl Fn(u8, bool) -> StatusEvent,
) -> u32 {
    let group = group as usize;
    if group >= ZONE_GROUPS {
        return 0;
    }

    let changed = groups[group] ^ zones;
    if changed == 0 {
        return 0;
    }
    groups[group] = zones;

    let mut emitted = 0;
    for bit in 0..8u8 {
        if changed & (1 << bit) != 0 {
            let zone = (group as u8) * 8 + bit + 1;
            if events.push(make_event(zone, zones & (1 << bit) != 0)).is_ok() {
                emitted += 1;
            }
        }
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_bitmap_diffs_per_zone() {
        let mut tracker = ZoneTracker::new();
        let mut events = EventBuffer::new();

        // Zones 1 and 3 open.
        assert_eq!(tracker.apply_open(0, 0b0000_0101, &mut events), 2);
        assert!(tracker.zone_open(1));
        assert!(!tracker.zone_open(2));
        assert!(tracker.zone_open(3));

        // Unchanged bitmap emits nothing.
        events.clear();
        assert_eq!(tracker.apply_open(0, 0b0000_0101, &mut events), 0);
        assert!(events.is_empty());

        // Zone 1 closes.
        assert_eq!(tracker.apply_open(0, 0b0000_0100, &mut events), 1);
        assert_eq!(
            events[0],
            StatusEvent::ZoneStatusChanged { zone: 1, open: false }
        );
    }

    #[test]
    fn group_offsets_map_to_zone_numbers() {
        let mut tracker = ZoneTracker::new();
        let mut events = EventBuffer::new();

        tracker.apply_alarm(2, 0b1000_0000, &mut events);
        assert_eq!(
            events[0],
            StatusEvent::ZoneAlarmChanged { zone: 24, active: true }
        );
        assert!(tracker.zone_alarm(24));
    }

    #[test]
    fn out_of_range_group_ignored() {
        let mut tracker = ZoneTracker::new();
        let mut events = EventBuffer::new();
        assert_eq!(tracker.apply_open(8, 0xFF, &mut events), 0);
        assert!(events.is_empty());
    }
}
