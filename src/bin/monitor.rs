use clap::{App, Arg};
use colored::*;
use std::time::Duration;
use tokio::time;
use tracing::info;

use keybus::platform::{LoopbackPort, NullWatchdog};
use keybus::protocol::{
    encode_classic, encode_power_series, CMD_PARTITION_STATUS_LOW, CMD_ZONE_ALARM, CMD_ZONE_OPEN,
};
use keybus::timer::SoftwareTimer;
use keybus::{KeybusDriver, PanelConfig, SeriesType, StatusEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("keybus-monitor")
        .version("0.1.0")
        .author("Panel Interface Engineering Team")
        .about("Keybus driver monitor - runs the driver standalone or against a simulated panel")
        .arg(
            Arg::with_name("series")
                .short("s")
                .long("series")
                .value_name("SERIES")
                .help("Panel series")
                .takes_value(true)
                .possible_values(&["powerseries", "classic"])
                .default_value("powerseries"),
        )
        .arg(
            Arg::with_name("standalone")
                .long("standalone")
                .help("Run in standalone mode (no panel, no simulation)")
                .conflicts_with("simulate"),
        )
        .arg(
            Arg::with_name("simulate")
                .long("simulate")
                .help("Feed a scripted panel session through the loopback port"),
        )
        .arg(
            Arg::with_name("json")
                .short("j")
                .long("json")
                .help("Emit events as JSON lines"),
        )
        .arg(
            Arg::with_name("debug-level")
                .short("d")
                .long("debug-level")
                .value_name("LEVEL")
                .help("Driver log verbosity")
                .takes_value(true)
                .possible_values(&["0", "1", "2", "3"])
                .default_value("1"),
        )
        .arg(
            Arg::with_name("ticks")
                .short("t")
                .long("ticks")
                .value_name("TICKS")
                .help("Number of 50ms loop ticks to run")
                .takes_value(true)
                .default_value("200"),
        )
        .get_matches();

    let debug_level: u8 = matches.value_of("debug-level").unwrap_or("1").parse()?;
    init_tracing(debug_level);

    let series = match matches.value_of("series") {
        Some("classic") => SeriesType::Classic,
        _ => SeriesType::PowerSeries,
    };
    let ticks: u64 = matches.value_of("ticks").unwrap_or("200").parse()?;
    let json = matches.is_present("json");
    let simulate = matches.is_present("simulate");

    let mut config = PanelConfig::new(series);
    config.debug_level = debug_level;
    if simulate {
        // Keep the scripted session short-lived.
        config.timing.stabilization_delay_ms = 200;
        config.timing.link_timeout_ms = 2_000;
    }

    println!("{}", "keybus-monitor".bold());
    println!("  series:     {}", series.label());
    println!(
        "  mode:       {}",
        if simulate {
            "simulated panel"
        } else {
            "standalone"
        }
    );
    println!();

    let mut driver = if simulate {
        KeybusDriver::new(
            config,
            Box::new(SoftwareTimer::new()),
            Box::new(LoopbackPort::new()),
            Box::new(NullWatchdog),
        )?
    } else {
        KeybusDriver::standalone(config)?
    };

    let capture = driver.capture();
    let tick_ms: u64 = 50;
    let mut interval = time::interval(Duration::from_millis(tick_ms));

    for tick in 0..ticks {
        interval.tick().await;
        let now_ms = tick * tick_ms;

        if simulate {
            for frame in scripted_frames(series, now_ms) {
                capture.feed_frame(&frame);
            }
        }

        for event in driver.poll(now_ms) {
            print_event(now_ms, &event, json);
        }
    }

    info!("monitor finished");
    println!();
    println!("{}", "diagnostics:".bold());
    println!("{}", serde_json::to_string_pretty(&driver.diagnostics())?);
    Ok(())
}

fn init_tracing(debug_level: u8) {
    let level = match debug_level {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Scripted panel session: bring-up, a zone opening, an arming cycle
/// through exit delay, an alarm, and a disarm.
fn scripted_frames(series: SeriesType, now_ms: u64) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    match series {
        SeriesType::PowerSeries => {
            let status = |code: u8| {
                encode_power_series(CMD_PARTITION_STATUS_LOW, &[0x81, code]).to_vec()
            };
            match now_ms {
                500 => frames.push(status(0x01)),
                2_000 => frames.push(
                    encode_power_series(CMD_ZONE_OPEN, &[0x00, 0b0000_0010]).to_vec(),
                ),
                3_000 => frames.push(status(0x08)),
                4_000 => frames.push(status(0x08)),
                5_000 => frames.push(status(0x05)),
                6_000 => {
                    frames.push(status(0x11));
                    frames.push(
                        encode_power_series(CMD_ZONE_ALARM, &[0x00, 0b0000_0010]).to_vec(),
                    );
                }
                7_000 => frames.push(status(0x3E)),
                // Keep the link alive between scripted beats.
                ms if ms >= 500 && ms % 1_000 == 500 => frames.push(status(0x00)),
                _ => {}
            }
        }
        SeriesType::Classic => {
            let lamps =
                |lights: u8, zones: u8, alarms: u8| encode_classic(lights, zones, alarms, 0).to_vec();
            match now_ms {
                500 => frames.push(lamps(0x81, 0x00, 0x00)),
                2_000 => frames.push(lamps(0x81, 0x02, 0x00)),
                3_000 => frames.push(lamps(0x8B, 0x00, 0x00)),
                4_000 => frames.push(lamps(0x8B, 0x00, 0x00)),
                5_000 => frames.push(lamps(0x82, 0x00, 0x00)),
                6_000 => frames.push(lamps(0x86, 0x02, 0x02)),
                7_000 => frames.push(lamps(0x81, 0x00, 0x00)),
                ms if ms >= 500 && ms % 1_000 == 500 => frames.push(lamps(0x81, 0x00, 0x00)),
                _ => {}
            }
        }
    }
    frames
}

fn print_event(now_ms: u64, event: &StatusEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    let stamp = format!("[{now_ms:>6}ms]").dimmed();
    let line = match event {
        StatusEvent::SystemStatusChanged(status) => {
            format!("system status: {}", status).cyan()
        }
        StatusEvent::PartitionStatusChanged { partition, state } => {
            let text = format!("partition {}: {}", partition, state.label());
            match state {
                keybus::PartitionArmState::AlarmActive => text.red().bold(),
                s if s.is_armed() => text.green(),
                _ => text.normal(),
            }
        }
        StatusEvent::PartitionMessageChanged { partition, message } => {
            format!("partition {} message: {}", partition, message).dimmed()
        }
        StatusEvent::TroubleStatusChanged(active) => {
            format!("trouble: {}", active).yellow()
        }
        StatusEvent::FireStatusChanged { partition, active } => {
            format!("partition {} fire: {}", partition, active).red()
        }
        StatusEvent::ZoneStatusChanged { zone, open } => {
            format!("zone {}: {}", zone, if *open { "open" } else { "closed" }).normal()
        }
        StatusEvent::ZoneAlarmChanged { zone, active } => {
            format!("zone {} alarm: {}", zone, active).red()
        }
    };
    println!("{stamp} {line}");
}
