use keybus::capture::{CapturedFrame, FRAME_BYTES};
use keybus::protocol::{
    encode_classic, encode_power_series, DecodedEvent, ProtocolDecoder, CMD_PARTITION_STATUS_HIGH,
    CMD_PARTITION_STATUS_LOW, CMD_SYSTEM_FLAGS, CMD_ZONE_ALARM, CMD_ZONE_OPEN,
    POWER_SERIES_FRAME_BYTES,
};
use keybus::SeriesType;

fn frame_from(bytes: &[u8]) -> CapturedFrame {
    let mut frame = CapturedFrame {
        bytes: [0; FRAME_BYTES],
        bit_count: (bytes.len() * 8) as u16,
    };
    frame.bytes[..bytes.len()].copy_from_slice(bytes);
    frame
}

#[test]
fn power_series_partition_status_pairs() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);
    // Partitions 1 and 2 reported; 3 and 4 absent (code 0).
    let raw = encode_power_series(CMD_PARTITION_STATUS_LOW, &[0x81, 0x01, 0x81, 0x08]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();

    assert_eq!(
        events.as_slice(),
        &[
            DecodedEvent::PartitionStatus { partition: 1, raw: 0x01 },
            DecodedEvent::PartitionStatus { partition: 2, raw: 0x08 },
        ]
    );

    // The high command maps to partitions 5-8.
    let raw = encode_power_series(CMD_PARTITION_STATUS_HIGH, &[0x81, 0x05]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();
    assert_eq!(
        events.as_slice(),
        &[DecodedEvent::PartitionStatus { partition: 5, raw: 0x05 }]
    );
}

#[test]
fn power_series_zone_bitmaps() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);

    let raw = encode_power_series(CMD_ZONE_OPEN, &[0x02, 0b1001_0000]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();
    assert_eq!(
        events.as_slice(),
        &[DecodedEvent::ZoneOpenBitmap { group: 2, zones: 0b1001_0000 }]
    );

    let raw = encode_power_series(CMD_ZONE_ALARM, &[0x00, 0x01]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();
    assert_eq!(
        events.as_slice(),
        &[DecodedEvent::ZoneAlarmBitmap { group: 0, zones: 0x01 }]
    );
}

#[test]
fn power_series_system_flags_fan_out() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);
    // Trouble + battery trouble, fire on partitions 1 and 3.
    let raw = encode_power_series(CMD_SYSTEM_FLAGS, &[0x05, 0b0000_0101]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();

    assert!(events.contains(&DecodedEvent::Trouble(true)));
    assert!(events.contains(&DecodedEvent::AcPowerTrouble(false)));
    assert!(events.contains(&DecodedEvent::BatteryTrouble(true)));
    assert!(events.contains(&DecodedEvent::Fire { partition: 1, active: true }));
    assert!(events.contains(&DecodedEvent::Fire { partition: 2, active: false }));
    assert!(events.contains(&DecodedEvent::Fire { partition: 3, active: true }));
}

#[test]
fn checksum_failure_is_counted_not_fatal() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);
    let mut raw = encode_power_series(CMD_ZONE_OPEN, &[0x00, 0x01]);
    raw[POWER_SERIES_FRAME_BYTES - 1] ^= 0xFF;

    assert!(decoder.decode(&frame_from(&raw)).is_none());
    assert_eq!(decoder.stats().checksum_errors, 1);
    assert_eq!(decoder.stats().frames_decoded, 0);

    // The next well-formed frame decodes normally.
    let good = encode_power_series(CMD_ZONE_OPEN, &[0x00, 0x01]);
    assert!(decoder.decode(&frame_from(&good)).is_some());
    assert_eq!(decoder.stats().frames_decoded, 1);
}

#[test]
fn wrong_length_row_is_a_runt() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);
    let classic_sized = encode_classic(0x81, 0, 0, 0);
    assert!(decoder.decode(&frame_from(&classic_sized)).is_none());
    assert_eq!(decoder.stats().runt_frames, 1);
}

#[test]
fn unknown_command_is_counted_and_ignored() {
    let mut decoder = ProtocolDecoder::new(SeriesType::PowerSeries);
    let raw = encode_power_series(0x77, &[0x01, 0x02]);
    let events = decoder.decode(&frame_from(&raw)).unwrap();
    assert!(events.is_empty());
    assert_eq!(decoder.stats().unknown_commands, 1);
    // Valid framing still counts as a decoded frame (panel is talking).
    assert_eq!(decoder.stats().frames_decoded, 1);
}

#[test]
fn classic_frame_expands_to_full_status() {
    let mut decoder = ProtocolDecoder::new(SeriesType::Classic);
    // Ready lamp, zone 2 open, no alarms, trouble flag set.
    let raw = encode_classic(0x81, 0b0000_0010, 0x00, 0x01);
    let events = decoder.decode(&frame_from(&raw)).unwrap();

    assert!(events.contains(&DecodedEvent::PartitionStatus { partition: 1, raw: 0x81 }));
    assert!(events.contains(&DecodedEvent::ZoneOpenBitmap { group: 0, zones: 0b0000_0010 }));
    assert!(events.contains(&DecodedEvent::ZoneAlarmBitmap { group: 0, zones: 0x00 }));
    assert!(events.contains(&DecodedEvent::Trouble(true)));
    assert!(events.contains(&DecodedEvent::Fire { partition: 1, active: false }));
}

#[test]
fn classic_xor_checksum_enforced() {
    let mut decoder = ProtocolDecoder::new(SeriesType::Classic);
    let mut raw = encode_classic(0x81, 0x00, 0x00, 0x00);
    raw[4] = raw[4].wrapping_add(1);
    assert!(decoder.decode(&frame_from(&raw)).is_none());
    assert_eq!(decoder.stats().checksum_errors, 1);
}
