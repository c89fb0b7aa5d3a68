//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, BLE link parameters, sensor constants and GATT
//! identifiers live here so they can be tuned in one place.

use crate::gatt::Uuid;

// Role

/// Which side of the link this build plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Peripheral exposing the thermometer and button characteristics.
    Server,
    /// Central that discovers a server and subscribes to its indications.
    Client,
}

/// Role used by the firmware binary.
pub const DEVICE_ROLE: Role = Role::Server;

/// Address the client connects to when it shows up in a scan report.
pub const SERVER_ADDRESS: [u8; 6] = [0xC4, 0x1E, 0x5F, 0x36, 0x0B, 0x00];

// Timing

/// Period of the free-running tick that starts each measurement (ms).
pub const TIMER_PERIOD_MS: u32 = 3000;

/// Si7021 power-up time before the first command (µs).
pub const SENSOR_POWER_ON_DELAY_US: u32 = 80_000;

/// Worst-case 14-bit temperature conversion time (µs).
pub const SENSOR_CONVERSION_DELAY_US: u32 = 10_800;

/// Shortest one-shot delay the timer can resolve: one tick of the 32.768 kHz
/// clock divided by 4 (µs).
pub const MIN_DELAY_US: u32 = 122;

/// Longest one-shot delay: one full timer period (µs).
pub const MAX_DELAY_US: u32 = TIMER_PERIOD_MS * 1000;

/// Stack soft timer driving display refresh.
pub const DISPLAY_REFRESH_TIMER: u8 = 1;

/// Display refresh period (ms).
pub const DISPLAY_REFRESH_MS: u32 = 1000;

// BLE

/// Advertising interval range (in 0.625 ms units). 400 = 250 ms.
pub const ADV_INTERVAL_MIN: u32 = 400;
pub const ADV_INTERVAL_MAX: u32 = 400;

/// Connection interval range (in 1.25 ms units). 60 = 75 ms.
pub const CONN_INTERVAL_MIN: u16 = 60;
pub const CONN_INTERVAL_MAX: u16 = 60;

/// Peripheral latency in connection events. 4 × 75 ms = 300 ms.
pub const CONN_LATENCY: u16 = 4;

/// Supervision timeout (in 10 ms units). 226 = 2260 ms.
pub const CONN_SUPERVISION_TIMEOUT: u16 = 226;

/// Maximum connection event length (in 0.625 ms units).
pub const CONN_MAX_CE_LENGTH: u16 = 60;

/// Link parameters requested after a connection opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
    pub max_ce_length: u16,
}

pub const CONNECTION_PARAMETERS: ConnectionParameters = ConnectionParameters {
    interval_min: CONN_INTERVAL_MIN,
    interval_max: CONN_INTERVAL_MAX,
    latency: CONN_LATENCY,
    supervision_timeout: CONN_SUPERVISION_TIMEOUT,
    max_ce_length: CONN_MAX_CE_LENGTH,
};

// Indication queue

/// Number of indications that can wait for the transport.
pub const QUEUE_CAPACITY: usize = 16;

/// Largest characteristic value carried by a queued indication.
pub const INDICATION_PAYLOAD_MAX: usize = 5;

// Si7021 temperature sensor

/// 7-bit I²C address.
pub const SI7021_ADDRESS: u8 = 0x40;

/// "Measure temperature, no hold master mode".
pub const SI7021_MEASURE_TEMPERATURE: u8 = 0xF3;

/// Result length (big-endian raw code).
pub const SI7021_RESULT_LEN: usize = 2;

// GATT

/// Health Thermometer service.
pub const HTM_SERVICE_UUID: Uuid = Uuid::Short(0x1809);

/// Temperature Measurement characteristic.
pub const TEMPERATURE_MEASUREMENT_UUID: Uuid = Uuid::Short(0x2A1C);

/// Button state service, 00000001-38c8-433e-87ec-652a2d136289.
pub const BUTTON_SERVICE_UUID: Uuid = Uuid::Long([
    0x89, 0x62, 0x13, 0x2d, 0x2a, 0x65, 0xec, 0x87, 0x3e, 0x43, 0xc8, 0x38, 0x01, 0x00, 0x00, 0x00,
]);

/// Button state characteristic, 00000002-38c8-433e-87ec-652a2d136289.
pub const BUTTON_STATE_UUID: Uuid = Uuid::Long([
    0x89, 0x62, 0x13, 0x2d, 0x2a, 0x65, 0xec, 0x87, 0x3e, 0x43, 0xc8, 0x38, 0x02, 0x00, 0x00, 0x00,
]);

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Button 0          → P0.11
//   Button 1          → P0.12
//   Sensor enable     → P0.03
//   Sensor I²C SDA    → P0.26
//   Sensor I²C SCL    → P0.27
//   Display I²C SDA   → P0.30
//   Display I²C SCL   → P0.31

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 20;

/// Name shown on the first display row.
pub const DEVICE_NAME: &str = "Thermometer";
