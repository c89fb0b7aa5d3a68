//! Power mode management.
//!
//! The MCU drops to its deepest sleep tier whenever the task context idles.
//! The sensor I²C transfer needs the peripheral clock running, so the sensor
//! state machine holds an [`ActiveModeLock`] for exactly the duration of each
//! bus transaction.
//!
//! nRF52840 power modes:
//! - System ON, constant latency: HFCLK and bus peripherals kept running
//! - System ON, low power: CPU sleeping, peripherals gated (~2 µA)

use crate::platform::PowerModes;

/// Single owner of the active-mode request.
///
/// Acquire and release are idempotent. A second acquire while held, or a
/// release while not held, never reaches the platform, so requests to
/// [`PowerModes`] always come in matched pairs.
#[derive(Debug, Default)]
pub struct ActiveModeLock {
    held: bool,
}

impl ActiveModeLock {
    pub const fn new() -> Self {
        Self { held: false }
    }

    /// Request active mode if not already held.
    pub fn acquire<P: PowerModes + ?Sized>(&mut self, power: &mut P) {
        if self.held {
            warn!("power: active mode already held");
            return;
        }
        power.acquire_active_mode();
        self.held = true;
        trace!("power: active mode acquired");
    }

    /// Drop the active-mode request if held. Safe on every exit path.
    pub fn release<P: PowerModes + ?Sized>(&mut self, power: &mut P) {
        if !self.held {
            return;
        }
        power.release_active_mode();
        self.held = false;
        trace!("power: active mode released");
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}
