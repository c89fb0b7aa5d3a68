//! Temperature acquisition state machine.
//!
//! One measurement per timer period:
//!
//! ```text
//! Idle --PeriodElapsed--> AwaitingPowerOnDelay --DelayElapsed--> AwaitingWriteComplete
//!   ^                                                                  |
//!   |                                                           TransferComplete
//!   |                                                                  v
//! AwaitingReadComplete <--DelayElapsed-- AwaitingReadDelay <-----------+
//!   |
//!   +--TransferComplete--> Idle (reading indicated or queued)
//! ```
//!
//! Outside Idle every sensor signal first checks the guard (connected and
//! temperature indications enabled). A failed guard aborts the cycle: the
//! active-mode lock is released, the sensor is powered off and the display
//! row is blanked.

use core::fmt::Write;

use crate::config::{SENSOR_CONVERSION_DELAY_US, SENSOR_POWER_ON_DELAY_US};
use crate::gatt::Characteristic;
use crate::indicate::{self, Delivery};
use crate::measurement;
use crate::platform::{DisplayRow, Platform};
use crate::power::ActiveModeLock;
use crate::queue::IndicationQueue;
use crate::session::ConnectionSession;
use crate::signal::Signal;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorState {
    #[default]
    Idle,
    AwaitingPowerOnDelay,
    AwaitingWriteComplete,
    AwaitingReadDelay,
    AwaitingReadComplete,
}

impl SensorState {
    /// The signal that advances this state, if any.
    fn awaits(self) -> Option<Signal> {
        match self {
            SensorState::Idle => Some(Signal::PeriodElapsed),
            SensorState::AwaitingPowerOnDelay | SensorState::AwaitingReadDelay => Some(Signal::DelayElapsed),
            SensorState::AwaitingWriteComplete | SensorState::AwaitingReadComplete => {
                Some(Signal::TransferComplete)
            }
        }
    }
}

/// Outcome of a completed cycle, for the caller's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub celsius: i32,
    pub delivery: Delivery,
}

#[derive(Debug, Default)]
pub struct SensorMachine {
    state: SensorState,
    lock: ActiveModeLock,
}

impl SensorMachine {
    pub const fn new() -> Self {
        Self {
            state: SensorState::Idle,
            lock: ActiveModeLock::new(),
        }
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    pub fn lock_held(&self) -> bool {
        self.lock.is_held()
    }

    /// Feed one signal. Button edges and other unrelated signals are ignored.
    ///
    /// Returns the reading when this signal completed a cycle.
    pub fn handle<P, const N: usize>(
        &mut self,
        signal: Signal,
        platform: &mut P,
        session: &mut ConnectionSession,
        queue: &mut IndicationQueue<N>,
    ) -> Option<Reading>
    where
        P: Platform + ?Sized,
    {
        if !matches!(
            signal,
            Signal::PeriodElapsed | Signal::DelayElapsed | Signal::TransferComplete
        ) {
            return None;
        }

        if self.state == SensorState::Idle {
            self.start_cycle(signal, platform, session);
            return None;
        }

        if !session.sensor_guard() {
            self.abort(platform);
            return None;
        }

        if self.state.awaits() != Some(signal) {
            return None;
        }

        let mut reading = None;
        let next = match self.state {
            SensorState::AwaitingPowerOnDelay => {
                self.lock.acquire(platform);
                if let Err(e) = platform.start_measurement() {
                    error!("sensor: measurement write failed: {:?}", e);
                }
                SensorState::AwaitingWriteComplete
            }
            SensorState::AwaitingWriteComplete => {
                self.lock.release(platform);
                if let Err(e) = platform.request_delay(SENSOR_CONVERSION_DELAY_US) {
                    error!("sensor: conversion delay failed: {:?}", e);
                }
                SensorState::AwaitingReadDelay
            }
            SensorState::AwaitingReadDelay => {
                self.lock.acquire(platform);
                if let Err(e) = platform.start_read() {
                    error!("sensor: result read failed: {:?}", e);
                }
                SensorState::AwaitingReadComplete
            }
            SensorState::AwaitingReadComplete => {
                self.lock.release(platform);
                platform.power_off();
                reading = Self::publish(platform, session, queue);
                SensorState::Idle
            }
            SensorState::Idle => SensorState::Idle,
        };
        self.transition(next);
        reading
    }

    fn start_cycle<P>(&mut self, signal: Signal, platform: &mut P, session: &ConnectionSession)
    where
        P: Platform + ?Sized,
    {
        if signal != Signal::PeriodElapsed {
            return;
        }
        if !session.is_connected() {
            platform.clear(DisplayRow::Temperature);
            return;
        }
        platform.power_on();
        if let Err(e) = platform.request_delay(SENSOR_POWER_ON_DELAY_US) {
            error!("sensor: power-on delay failed: {:?}", e);
        }
        self.transition(SensorState::AwaitingPowerOnDelay);
    }

    /// Guard failed mid-cycle: undo everything the cycle holds.
    fn abort<P>(&mut self, platform: &mut P)
    where
        P: Platform + ?Sized,
    {
        warn!("sensor: guard failed in {:?}, back to idle", self.state);
        self.lock.release(platform);
        platform.power_off();
        platform.clear(DisplayRow::Temperature);
        self.transition(SensorState::Idle);
    }

    fn publish<P, const N: usize>(
        platform: &mut P,
        session: &mut ConnectionSession,
        queue: &mut IndicationQueue<N>,
    ) -> Option<Reading>
    where
        P: Platform + ?Sized,
    {
        let celsius = match platform.reading_celsius() {
            Ok(c) => c,
            Err(e) => {
                error!("sensor: reading unavailable: {:?}", e);
                return None;
            }
        };
        info!("sensor: {} C", celsius);

        let value = measurement::encode_temperature(celsius);
        if let Err(e) = platform.write_local_value(Characteristic::TemperatureMeasurement, &value) {
            error!("sensor: local value write failed: {:?}", e);
        }

        let mut text: heapless::String<16> = heapless::String::new();
        let _ = write!(text, "Temp={}", celsius);
        platform.show(DisplayRow::Temperature, &text);

        let delivery = indicate::send_or_enqueue(
            platform,
            session,
            queue,
            Characteristic::TemperatureMeasurement,
            &value,
        );
        Some(Reading { celsius, delivery })
    }

    fn transition(&mut self, next: SensorState) {
        if next != self.state {
            debug!("sensor: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{Call, MockPlatform};
    use crate::platform::StatusDisplay;

    const CYCLE: [Signal; 5] = [
        Signal::PeriodElapsed,
        Signal::DelayElapsed,
        Signal::TransferComplete,
        Signal::DelayElapsed,
        Signal::TransferComplete,
    ];

    struct Rig {
        machine: SensorMachine,
        platform: MockPlatform,
        session: ConnectionSession,
        queue: IndicationQueue,
    }

    impl Rig {
        fn ready() -> Self {
            let mut session = ConnectionSession::new();
            session.open(1);
            session.set_indications(Characteristic::TemperatureMeasurement, true);
            Self {
                machine: SensorMachine::new(),
                platform: MockPlatform::new(),
                session,
                queue: IndicationQueue::new(),
            }
        }

        fn feed(&mut self, signal: Signal) -> Option<Reading> {
            self.machine
                .handle(signal, &mut self.platform, &mut self.session, &mut self.queue)
        }

        fn lock_balance(&self) -> (usize, usize) {
            (
                self.platform.count(&Call::AcquireActive),
                self.platform.count(&Call::ReleaseActive),
            )
        }
    }

    #[test]
    fn full_cycle_visits_every_state_once() {
        let mut rig = Rig::ready();
        let expected = [
            SensorState::AwaitingPowerOnDelay,
            SensorState::AwaitingWriteComplete,
            SensorState::AwaitingReadDelay,
            SensorState::AwaitingReadComplete,
            SensorState::Idle,
        ];

        let mut reading = None;
        for (signal, state) in CYCLE.into_iter().zip(expected) {
            reading = rig.feed(signal);
            assert_eq!(rig.machine.state(), state);
        }

        assert_eq!(rig.lock_balance(), (2, 2));
        assert!(!rig.machine.lock_held());
        assert_eq!(
            reading,
            Some(Reading {
                celsius: 23,
                delivery: Delivery::Sent
            })
        );
    }

    #[test]
    fn full_cycle_collaborator_trace() {
        let mut rig = Rig::ready();
        for s in CYCLE {
            rig.feed(s);
        }
        let payload = measurement::encode_temperature(23).to_vec();
        assert_eq!(
            rig.platform.calls,
            vec![
                Call::SensorPowerOn,
                Call::Delay(SENSOR_POWER_ON_DELAY_US),
                Call::AcquireActive,
                Call::SensorWrite,
                Call::ReleaseActive,
                Call::Delay(SENSOR_CONVERSION_DELAY_US),
                Call::AcquireActive,
                Call::SensorRead,
                Call::ReleaseActive,
                Call::SensorPowerOff,
                Call::WriteLocal(Characteristic::TemperatureMeasurement, payload.clone()),
                Call::SendIndication(Characteristic::TemperatureMeasurement, payload),
            ]
        );
        assert_eq!(rig.platform.row(DisplayRow::Temperature), Some("Temp=23"));
        assert!(rig.session.indication_in_flight());
    }

    #[test]
    fn disconnect_while_writing_releases_lock() {
        let mut rig = Rig::ready();
        rig.feed(Signal::PeriodElapsed);
        rig.feed(Signal::DelayElapsed);
        assert_eq!(rig.machine.state(), SensorState::AwaitingWriteComplete);
        assert!(rig.machine.lock_held());

        rig.session.close();
        rig.feed(Signal::TransferComplete);

        assert_eq!(rig.machine.state(), SensorState::Idle);
        assert!(!rig.machine.lock_held());
        assert_eq!(rig.lock_balance(), (1, 1));
        assert_eq!(rig.platform.count(&Call::SensorPowerOff), 1);
        assert_eq!(rig.platform.indications(), 0);
    }

    #[test]
    fn guard_failure_on_unrelated_signal_still_aborts() {
        let mut rig = Rig::ready();
        rig.feed(Signal::PeriodElapsed);
        rig.feed(Signal::DelayElapsed);

        rig.session
            .set_indications(Characteristic::TemperatureMeasurement, false);
        rig.feed(Signal::PeriodElapsed);

        assert_eq!(rig.machine.state(), SensorState::Idle);
        assert_eq!(rig.lock_balance(), (1, 1));
    }

    #[test]
    fn guard_failure_in_every_state_balances_lock() {
        for steps in 1..CYCLE.len() {
            let mut rig = Rig::ready();
            for s in &CYCLE[..steps] {
                rig.feed(*s);
            }
            rig.session.close();
            rig.feed(CYCLE[steps]);

            assert_eq!(rig.machine.state(), SensorState::Idle, "after {} steps", steps);
            let (acquired, released) = rig.lock_balance();
            assert_eq!(acquired, released, "after {} steps", steps);
            assert_eq!(rig.platform.row(DisplayRow::Temperature), None);
        }
    }

    #[test]
    fn idle_without_connection_blanks_display() {
        let mut rig = Rig::ready();
        rig.session.close();
        rig.platform.show(DisplayRow::Temperature, "Temp=20");

        rig.feed(Signal::PeriodElapsed);

        assert_eq!(rig.machine.state(), SensorState::Idle);
        assert_eq!(rig.platform.row(DisplayRow::Temperature), None);
        assert!(!rig.platform.calls.contains(&Call::SensorPowerOn));
    }

    #[test]
    fn unexpected_signal_keeps_state() {
        let mut rig = Rig::ready();
        rig.feed(Signal::PeriodElapsed);

        rig.feed(Signal::TransferComplete);
        rig.feed(Signal::Button0Edge);
        assert_eq!(rig.machine.state(), SensorState::AwaitingPowerOnDelay);

        rig.feed(Signal::DelayElapsed);
        assert_eq!(rig.machine.state(), SensorState::AwaitingWriteComplete);
    }

    #[test]
    fn idle_ignores_delay_and_transfer() {
        let mut rig = Rig::ready();
        rig.feed(Signal::DelayElapsed);
        rig.feed(Signal::TransferComplete);
        assert_eq!(rig.machine.state(), SensorState::Idle);
        assert!(rig.platform.calls.is_empty());
    }

    #[test]
    fn second_reading_queues_while_in_flight() {
        let mut rig = Rig::ready();
        for s in CYCLE {
            rig.feed(s);
        }
        rig.platform.reading = 24;
        let mut last = None;
        for s in CYCLE {
            last = rig.feed(s);
        }

        assert_eq!(last.map(|r| r.delivery), Some(Delivery::Queued));
        assert_eq!(rig.queue.depth(), 1);
        assert_eq!(rig.platform.indications(), 1);
        assert_eq!(
            rig.queue.peek().map(|e| e.payload().to_vec()),
            Some(measurement::encode_temperature(24).to_vec())
        );
    }
}
