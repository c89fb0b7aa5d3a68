//! ble-thermometer - BLE health thermometer firmware core.
//!
//! Everything with real logic lives here and builds for the host, so it can
//! be unit tested without hardware:
//!
//! - [`signal`]: interrupt-to-task signal word
//! - [`queue`]: bounded indication queue
//! - [`session`]: per-connection state
//! - [`sensor`] / [`discovery`]: the two state machines
//! - [`dispatch`]: the event loop body tying them together
//!
//! The board support (Embassy tasks, SoftDevice, Si7021, SSD1306) lives in
//! the `embedded` binary and talks to the core through [`platform`].

#![cfg_attr(not(test), no_std)]

// Must come first: the logging macros are textually scoped.
mod fmt;

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod gatt;
pub mod indicate;
pub mod measurement;
pub mod platform;
pub mod power;
pub mod queue;
pub mod sensor;
pub mod session;
pub mod signal;

pub use dispatch::{App, Event, StatusKind};
pub use error::Error;
pub use signal::{Signal, SIGNALS};
