//! Periodic measurement tick and one-shot delays.

use ble_thermometer::config::{MAX_DELAY_US, MIN_DELAY_US, TIMER_PERIOD_MS};
use ble_thermometer::error::Error;
use ble_thermometer::platform::DelayTimer;
use ble_thermometer::{Event, Signal};
use defmt::{debug, trace};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal as Request;
use embassy_time::{Duration, Ticker, Timer};

use super::{post, raise, Board};

/// Pending one-shot delay (µs). A new request replaces an unexpired one.
static DELAY: Request<CriticalSectionRawMutex, u32> = Request::new();

/// Stack-style soft timer (handle, period in ms). Restarting replaces the
/// running one.
static SOFT_TIMER: Request<CriticalSectionRawMutex, (u8, u32)> = Request::new();

pub fn start_soft_timer(handle: u8, period_ms: u32) {
    SOFT_TIMER.signal((handle, period_ms));
}

/// Raise `PeriodElapsed` once per timer period.
#[embassy_executor::task]
pub async fn period_task() -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(TIMER_PERIOD_MS as u64));
    loop {
        ticker.next().await;
        trace!("timer: period");
        raise(Signal::PeriodElapsed);
    }
}

/// Serve one-shot delay requests.
#[embassy_executor::task]
pub async fn delay_task() -> ! {
    loop {
        let micros = DELAY.wait().await;
        Timer::after(Duration::from_micros(micros as u64)).await;
        raise(Signal::DelayElapsed);
    }
}

/// Post `Event::SoftTimer` every period once started.
#[embassy_executor::task]
pub async fn soft_timer_task() -> ! {
    let (mut handle, mut period_ms) = SOFT_TIMER.wait().await;
    loop {
        let mut ticker = Ticker::every(Duration::from_millis(period_ms as u64));
        loop {
            match select(ticker.next(), SOFT_TIMER.wait()).await {
                Either::First(()) => post(Event::SoftTimer { handle }),
                Either::Second((h, p)) => {
                    debug!("timer: soft timer {} restarted, {} ms", h, p);
                    handle = h;
                    period_ms = p;
                    break;
                }
            }
        }
    }
}

impl DelayTimer for Board {
    fn request_delay(&mut self, micros: u32) -> Result<(), Error> {
        if !(MIN_DELAY_US..=MAX_DELAY_US).contains(&micros) {
            return Err(Error::DelayOutOfRange);
        }
        DELAY.signal(micros);
        Ok(())
    }
}
