//! # Keybus Driver
//!
//! An embedded-style driver for a proprietary two-wire security-panel bus,
//! providing staged hardware bring-up, interrupt-to-main-loop frame
//! capture, protocol decoding, and partition/zone state tracking.
//!
//! ## Features
//!
//! - **Staged hardware bring-up**: stabilization wait, timer
//!   pre-initialization, and first-packet verification, each under a
//!   bounded retry budget with a circuit breaker
//! - **Lock-free frame capture**: single-writer/single-reader ring shared
//!   between interrupt context and the cooperative main loop
//! - **Two panel series**: PowerSeries command frames and Classic lamp
//!   frames, with distinct checksum rules and timing defaults
//! - **Two-phase arming interpretation**: exit-delay pending states are
//!   surfaced before the final armed-stay/armed-away latch
//! - **Standalone mode**: full bypass of hardware interaction for bench
//!   setups without a connected panel
//! - **Watchdog-aware**: every retry path yields and resets the platform
//!   watchdog; no wait is unbounded
//!
//! ## Quick Start
//!
//! ```rust
//! use keybus::{KeybusDriver, PanelConfig, SeriesType};
//!
//! // Bench setup without a connected panel
//! let config = PanelConfig::new(SeriesType::PowerSeries);
//! let mut driver = KeybusDriver::standalone(config).unwrap();
//!
//! // First poll reaches Ready and reports the synthesized bring-up
//! for event in driver.poll(0) {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`driver`] - Main orchestrator and public API
//! - [`init`] - Hardware initialization state machine
//! - [`capture`] - Interrupt-context frame capture ring
//! - [`protocol`] - Per-series frame validation and decoding
//! - [`partition`] - Partition status interpretation
//! - [`zones`] - Zone bitmap tracking
//! - [`timer`] - Platform timer compatibility layer
//! - [`platform`] - Bus port, watchdog, and loopback implementations
//! - [`event`] - Typed status-change notifications
//! - [`config`] - Panel configuration and series defaults

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod config;
pub mod driver;
pub mod event;
pub mod init;
pub mod partition;
pub mod platform;
pub mod protocol;
pub mod timer;
pub mod zones;

// Re-export main public types for convenience
pub use config::{PanelConfig, PinConfig, SeriesType, TimingConfig};
pub use driver::{DriverDiagnostics, DriverError, KeybusDriver};
pub use event::{EventBuffer, StatusEvent};
pub use init::InitState;
pub use partition::PartitionArmState;
