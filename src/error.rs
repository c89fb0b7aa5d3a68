//! Unified error type for ble-thermometer.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (feature `defmt`) for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The BLE stack rejected a request.
    Stack(StackError),

    // Indication queue
    /// Every queue slot is occupied.
    QueueFull,

    /// Characteristic value does not fit an indication slot.
    PayloadTooLong,

    // Timing
    /// One-shot delay outside the range the timer can resolve.
    DelayOutOfRange,

    // Sensor
    /// I²C transaction to the temperature sensor failed.
    Sensor(SensorError),

    // Generic
    /// The request is not available in this build or role.
    Unsupported,
}

/// Subset of BLE stack failures we propagate (keeps the enum `Copy`-friendly).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Raw status code returned by the stack.
    Status(u16),
    /// The request needs an open connection.
    NotConnected,
    /// The stack cannot accept the request right now.
    Busy,
}

/// Temperature sensor transport failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Bus-level failure (arbitration, overrun, DMA).
    Bus,
    /// The sensor did not acknowledge its address.
    Nack,
    /// A transfer was requested while the sensor is unpowered.
    NotPowered,
}

// Convenience conversions

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Error::Stack(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Error::Sensor(e)
    }
}
