//! Quadcorder firmware library.
//!
//! Everything that can run on the host lives here: debounced inputs, the
//! keypad scanner, the BLE session state machine, the cooperative
//! scheduler and the three applications built on it. The `firmware`
//! module (feature `embedded`) binds these to the nRF52840, the
//! SoftDevice and the attached peripherals.
//!
//! Usage: `cargo test --lib` on the host, `cargo run --release --features
//! embedded --bin <quadcorder|beacon|console>` on target.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod app;
pub mod ble;
pub mod config;
pub mod error;
pub mod gps;
pub mod input;
pub mod mailbox;
pub mod nav;
pub mod scheduler;
pub mod timer;
pub mod ui;

#[cfg(feature = "embedded")]
pub mod firmware;

/// Milliseconds since boot.
pub type Millis = u64;

pub use error::{Error, Result};
