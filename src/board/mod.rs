//! nRF52840 board support.
//!
//! [`Board`] implements every collaborator trait the core needs. Requests are
//! fire-and-forget: each one either touches hardware directly (GPIO, power
//! mode) or hands work to an async task, which later reports back by raising
//! a bit in [`SIGNALS`] or pushing an [`Event`] into [`STACK_EVENTS`].

pub mod buttons;
pub mod display;
pub mod power;
pub mod sensor;
pub mod stack;
pub mod timer;

use ble_thermometer::{Event, Signal, SIGNALS};
use defmt::warn;
use embassy_nrf::gpio::Output;
use embassy_nrf::peripherals::TWISPI1;
use embassy_nrf::twim::Twim;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal as WakeSignal;
use nrf_softdevice::Softdevice;

use self::display::StatusScreen;
use self::stack::{Bonder, Server};

/// Stack events waiting for the application task.
pub static STACK_EVENTS: Channel<CriticalSectionRawMutex, Event, 8> = Channel::new();

/// Wakes the application task after a bit was raised in [`SIGNALS`].
pub static WAKE: WakeSignal<CriticalSectionRawMutex, ()> = WakeSignal::new();

/// Raise a hardware signal and wake the application task.
pub fn raise(signal: Signal) {
    SIGNALS.raise(signal);
    WAKE.signal(());
}

/// Queue a stack event without blocking.
pub fn post(event: Event) {
    if STACK_EVENTS.try_send(event).is_err() {
        warn!("board: stack event queue full, event dropped");
    }
}

/// Everything the core talks to.
pub struct Board {
    pub(crate) sd: &'static Softdevice,
    pub(crate) server: &'static Server,
    pub(crate) bonder: &'static Bonder,
    pub(crate) sensor_enable: Output<'static>,
    pub(crate) screen: StatusScreen<Twim<'static, TWISPI1>>,
}

impl Board {
    pub fn new(
        sd: &'static Softdevice,
        server: &'static Server,
        bonder: &'static Bonder,
        sensor_enable: Output<'static>,
        screen: StatusScreen<Twim<'static, TWISPI1>>,
    ) -> Self {
        Self {
            sd,
            server,
            bonder,
            sensor_enable,
            screen,
        }
    }
}
