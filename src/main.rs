//! Firmware entry point for the nRF52840 thermometer.
//!
//! Brings up the HAL and the SoftDevice, spawns the board tasks and then runs
//! the application loop: every stack event and every raised signal is handed
//! to [`App`] on this one task.

#![no_std]
#![no_main]

mod board;

use ble_thermometer::config::{DEVICE_NAME, DEVICE_ROLE};
use ble_thermometer::platform::Button;
use ble_thermometer::{App, Event, SIGNALS};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{Level, Output, OutputDrive, Pin};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, twim};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::board::display::StatusScreen;
use crate::board::stack::{Bonder, Server};
use crate::board::{Board, STACK_EVENTS, WAKE};

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
    TWISPI1 => twim::InterruptHandler<peripherals::TWISPI1>;
});

static SERVER: StaticCell<Server> = StaticCell::new();
static BONDER: StaticCell<Bonder> = StaticCell::new();

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 2,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 1,
            central_sec_count: 1,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr().cast_mut(),
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(raw::BLE_GATTS_VLOC_STACK as u8),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("ble-thermometer starting, role {}", DEVICE_ROLE);

    // Priorities 0, 1 and 4 belong to the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);
    interrupt::TWISPI0.set_priority(Priority::P3);
    interrupt::TWISPI1.set_priority(Priority::P3);

    let sd = Softdevice::enable(&softdevice_config());
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));
    let bonder: &'static Bonder = BONDER.init(Bonder::new());

    // Si7021: enable line plus its own bus.
    let sensor_enable = Output::new(p.P0_03, Level::Low, OutputDrive::Standard);
    let mut sensor_bus_config = twim::Config::default();
    sensor_bus_config.frequency = twim::Frequency::K400;
    let sensor_bus = twim::Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, sensor_bus_config);

    // SSD1306 on the second bus.
    let display_bus = twim::Twim::new(p.TWISPI1, Irqs, p.P0_30, p.P0_31, twim::Config::default());
    let screen = StatusScreen::new(display_bus);

    unwrap!(spawner.spawn(board::stack::softdevice_task(sd, server)));
    unwrap!(spawner.spawn(board::stack::advertising_task(sd, server, bonder)));
    unwrap!(spawner.spawn(board::stack::central_task(sd, bonder)));
    unwrap!(spawner.spawn(board::timer::period_task()));
    unwrap!(spawner.spawn(board::timer::delay_task()));
    unwrap!(spawner.spawn(board::timer::soft_timer_task()));
    unwrap!(spawner.spawn(board::sensor::sensor_task(sensor_bus)));
    unwrap!(spawner.spawn(board::buttons::button_task(p.P0_11.degrade(), Button::Button0)));
    unwrap!(spawner.spawn(board::buttons::button_task(p.P0_12.degrade(), Button::Button1)));

    let mut board = Board::new(sd, server, bonder, sensor_enable, screen);
    let mut app: App = App::new(DEVICE_ROLE);
    app.handle(Event::Boot, &mut board);

    loop {
        match select(STACK_EVENTS.receive(), WAKE.wait()).await {
            Either::First(event) => app.handle(event, &mut board),
            Either::Second(()) => {}
        }
        // Stack events may have raised signals too; drain them either way.
        app.run_signals(&SIGNALS, &mut board);
    }
}
