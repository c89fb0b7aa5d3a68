//! Collaborator interfaces for abstraction and testability.
//!
//! The core never talks to hardware or the radio stack directly. Every
//! request goes through one of these traits and completes later through a
//! [`crate::signal::Signal`] or a stack [`crate::dispatch::Event`], so the
//! real board drivers can be swapped for [`mock::MockPlatform`] in tests.

use crate::config::ConnectionParameters;
use crate::error::Error;
use crate::gatt::{Characteristic, Uuid};

/// One-shot delays on the low-frequency timer.
pub trait DelayTimer {
    /// Arm a delay; expiry arrives as `Signal::DelayElapsed`.
    fn request_delay(&mut self, micros: u32) -> Result<(), Error>;
}

/// Si7021-style command/response sensor on I²C.
pub trait TemperatureSensor {
    /// Drive the sensor enable line and route the bus pins.
    fn power_on(&mut self);
    fn power_off(&mut self);
    /// Start the measurement command write; completion is `Signal::TransferComplete`.
    fn start_measurement(&mut self) -> Result<(), Error>;
    /// Start the result read; completion is `Signal::TransferComplete`.
    fn start_read(&mut self) -> Result<(), Error>;
    /// Result of the last completed read.
    fn reading_celsius(&mut self) -> Result<i32, Error>;
}

/// Energy-mode requirements.
pub trait PowerModes {
    /// Keep the MCU in a mode where I²C keeps running.
    fn acquire_active_mode(&mut self);
    fn release_active_mode(&mut self);
}

/// Push buttons, active level already normalised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    Button0,
    Button1,
}

pub trait Buttons {
    fn is_pressed(&self, button: Button) -> bool;
}

/// Rows of the status display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayRow {
    Name,
    Address,
    Connection,
    Passkey,
    Action,
    Temperature,
    Button,
}

impl DisplayRow {
    pub const COUNT: usize = 7;

    pub const fn index(self) -> usize {
        self as usize
    }
}

pub trait StatusDisplay {
    fn show(&mut self, row: DisplayRow, text: &str);
    fn clear(&mut self, row: DisplayRow);
    /// Periodic refresh (panel VCOM toggle / flush).
    fn refresh(&mut self);
}

/// Requests the core issues to the BLE stack.
///
/// Every call is fire-and-forget: the result is only logged by the caller.
pub trait BleStack {
    fn identity_address(&mut self) -> Result<([u8; 6], u8), Error>;

    // Advertising (server)
    fn create_advertiser(&mut self) -> Result<u8, Error>;
    fn start_advertising(&mut self, advertiser: u8, interval_min: u32, interval_max: u32) -> Result<(), Error>;
    fn stop_advertising(&mut self, advertiser: u8) -> Result<(), Error>;

    // Scanning (client)
    fn start_scanning(&mut self) -> Result<(), Error>;
    fn stop_scanning(&mut self) -> Result<(), Error>;
    fn connect(&mut self, address: &[u8; 6], address_type: u8) -> Result<(), Error>;

    fn set_connection_parameters(&mut self, connection: u8, params: &ConnectionParameters) -> Result<(), Error>;

    // Local GATT database (server)
    fn write_local_value(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), Error>;
    fn send_indication(&mut self, connection: u8, characteristic: Characteristic, value: &[u8]) -> Result<(), Error>;

    // Remote GATT database (client)
    fn discover_service(&mut self, connection: u8, uuid: &Uuid) -> Result<(), Error>;
    fn discover_characteristic(&mut self, connection: u8, service: u32, uuid: &Uuid) -> Result<(), Error>;
    fn enable_indications(&mut self, connection: u8, characteristic: u16) -> Result<(), Error>;
    fn read_remote_value(&mut self, connection: u8, characteristic: u16) -> Result<(), Error>;
    fn confirm_indication(&mut self, connection: u8) -> Result<(), Error>;

    // Security
    fn configure_security(&mut self) -> Result<(), Error>;
    fn delete_bondings(&mut self) -> Result<(), Error>;
    fn confirm_bonding(&mut self, connection: u8, accept: bool) -> Result<(), Error>;
    fn confirm_passkey(&mut self, connection: u8, accept: bool) -> Result<(), Error>;

    // Soft timers
    fn start_soft_timer(&mut self, handle: u8, period_ms: u32) -> Result<(), Error>;
}

/// Everything the dispatcher and the state machines need.
pub trait Platform: DelayTimer + TemperatureSensor + PowerModes + Buttons + StatusDisplay + BleStack {}

impl<T> Platform for T where T: DelayTimer + TemperatureSensor + PowerModes + Buttons + StatusDisplay + BleStack {}
