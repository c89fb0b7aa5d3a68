//! Power mode requests through the SoftDevice.
//!
//! The POWER peripheral belongs to the SoftDevice while it is enabled, so the
//! constant-latency request goes through `sd_power_mode_set`.

use ble_thermometer::platform::PowerModes;
use defmt::error;
use nrf_softdevice::raw;

use super::Board;

fn set_mode(mode: u32) {
    let ret = unsafe { raw::sd_power_mode_set(mode as u8) };
    if ret != raw::NRF_SUCCESS {
        error!("power: sd_power_mode_set({}) failed: {}", mode, ret);
    }
}

impl PowerModes for Board {
    fn acquire_active_mode(&mut self) {
        set_mode(raw::NRF_POWER_MODES_NRF_POWER_MODE_CONSTLAT);
    }

    fn release_active_mode(&mut self) {
        set_mode(raw::NRF_POWER_MODES_NRF_POWER_MODE_LOWPWR);
    }
}
