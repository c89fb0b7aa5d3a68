//! Si7021 temperature sensor on TWIM0.
//!
//! The enable line is driven synchronously from [`Board`]; bus transfers run
//! in [`sensor_task`], which raises `TransferComplete` when each one ends,
//! successfully or not.

use core::cell::Cell;

use ble_thermometer::config::{SI7021_ADDRESS, SI7021_MEASURE_TEMPERATURE, SI7021_RESULT_LEN};
use ble_thermometer::error::{Error, SensorError};
use ble_thermometer::measurement::si7021_celsius;
use ble_thermometer::platform::TemperatureSensor;
use ble_thermometer::Signal;
use defmt::{debug, error};
use embassy_nrf::peripherals::TWISPI0;
use embassy_nrf::twim::{self, Twim};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal as Request;

use super::{raise, Board};

#[derive(Clone, Copy, defmt::Format)]
enum Transfer {
    /// Write the measure command.
    Measure,
    /// Read back the raw result.
    Read,
}

static TRANSFER: Request<CriticalSectionRawMutex, Transfer> = Request::new();

/// Result of the last read: raw code or the bus error.
static LAST_RESULT: Mutex<CriticalSectionRawMutex, Cell<Result<u16, SensorError>>> =
    Mutex::new(Cell::new(Err(SensorError::NotPowered)));

fn bus_error(e: twim::Error) -> SensorError {
    match e {
        twim::Error::AddressNack | twim::Error::DataNack => SensorError::Nack,
        _ => SensorError::Bus,
    }
}

#[embassy_executor::task]
pub async fn sensor_task(mut twim: Twim<'static, TWISPI0>) -> ! {
    loop {
        let transfer = TRANSFER.wait().await;
        debug!("si7021: {}", transfer);
        match transfer {
            Transfer::Measure => {
                let command = [SI7021_MEASURE_TEMPERATURE];
                if let Err(e) = twim.write(SI7021_ADDRESS, &command).await {
                    error!("si7021: command write failed: {}", e);
                }
            }
            Transfer::Read => {
                let mut buf = [0u8; SI7021_RESULT_LEN];
                let result = twim
                    .read(SI7021_ADDRESS, &mut buf)
                    .await
                    .map(|_| u16::from_be_bytes(buf))
                    .map_err(bus_error);
                if let Err(e) = result {
                    error!("si7021: result read failed: {}", e);
                }
                LAST_RESULT.lock(|r| r.set(result));
            }
        }
        raise(Signal::TransferComplete);
    }
}

impl TemperatureSensor for Board {
    fn power_on(&mut self) {
        self.sensor_enable.set_high();
    }

    fn power_off(&mut self) {
        self.sensor_enable.set_low();
    }

    fn start_measurement(&mut self) -> Result<(), Error> {
        if self.sensor_enable.is_set_low() {
            return Err(SensorError::NotPowered.into());
        }
        LAST_RESULT.lock(|r| r.set(Err(SensorError::Bus)));
        TRANSFER.signal(Transfer::Measure);
        Ok(())
    }

    fn start_read(&mut self) -> Result<(), Error> {
        if self.sensor_enable.is_set_low() {
            return Err(SensorError::NotPowered.into());
        }
        TRANSFER.signal(Transfer::Read);
        Ok(())
    }

    fn reading_celsius(&mut self) -> Result<i32, Error> {
        let raw = LAST_RESULT.lock(|r| r.get())?;
        Ok(si7021_celsius(raw))
    }
}
