//! GPIO button input with async debouncing.
//!
//! Two buttons (active-low with internal pull-up):
//!   - PB0 - confirm passkey / mirror into the button characteristic
//!   - PB1 - read the remote button characteristic (client role)
//!
//! Each button is handled by an async task that waits for either edge,
//! debounces it, latches the settled level and raises the button's signal.

use core::sync::atomic::{AtomicBool, Ordering};

use ble_thermometer::config::BUTTON_DEBOUNCE_MS;
use ble_thermometer::platform::{Button, Buttons};
use ble_thermometer::Signal;
use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{Duration, Timer};

use super::{raise, Board};

/// Debounced level per button, `true` = pressed.
static PRESSED: [AtomicBool; 2] = [AtomicBool::new(false), AtomicBool::new(false)];

fn index(button: Button) -> usize {
    match button {
        Button::Button0 => 0,
        Button::Button1 => 1,
    }
}

fn edge_signal(button: Button) -> Signal {
    match button {
        Button::Button0 => Signal::Button0Edge,
        Button::Button1 => Signal::Button1Edge,
    }
}

/// Run a single button loop.
///
/// Waits for any edge, debounces, and raises a signal only when the settled
/// level differs from the last one reported.
#[embassy_executor::task(pool_size = 2)]
pub async fn button_task(pin: AnyPin, button: Button) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let slot = &PRESSED[index(button)];

    loop {
        btn.wait_for_any_edge().await;

        // Debounce: wait and re-check.
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        let pressed = btn.is_low();
        if slot.swap(pressed, Ordering::Relaxed) != pressed {
            info!("Button: {} pressed={}", button, pressed);
            raise(edge_signal(button));
        }
    }
}

impl Buttons for Board {
    fn is_pressed(&self, button: Button) -> bool {
        PRESSED[index(button)].load(Ordering::Relaxed)
    }
}
