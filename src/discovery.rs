//! Remote GATT discovery (client role).
//!
//! Walks the server's temperature service and then its button service, one
//! GATT procedure at a time: discover service, discover characteristic,
//! enable indications. Each step is issued only after the stack reports the
//! previous procedure complete. A closed connection returns to
//! `NoConnection` from any state and restarts scanning.
//!
//! States are named after the procedure currently outstanding.

use crate::config::{BUTTON_SERVICE_UUID, BUTTON_STATE_UUID, HTM_SERVICE_UUID, TEMPERATURE_MEASUREMENT_UUID};
use crate::gatt::{Characteristic, Uuid};
use crate::platform::{DisplayRow, Platform};
use crate::session::ConnectionSession;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryState {
    #[default]
    NoConnection,
    DiscoveringTemperatureService,
    DiscoveringTemperatureCharacteristic,
    EnablingTemperatureIndications,
    DiscoveringButtonService,
    DiscoveringButtonCharacteristic,
    /// Both subscriptions requested; steady state until the link closes.
    IndicationsActive,
}

impl DiscoveryState {
    pub const ALL: [DiscoveryState; 7] = [
        DiscoveryState::NoConnection,
        DiscoveryState::DiscoveringTemperatureService,
        DiscoveryState::DiscoveringTemperatureCharacteristic,
        DiscoveryState::EnablingTemperatureIndications,
        DiscoveryState::DiscoveringButtonService,
        DiscoveryState::DiscoveringButtonCharacteristic,
        DiscoveryState::IndicationsActive,
    ];
}

/// One remote service and the characteristic inside it.
struct Target {
    characteristic: Characteristic,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
}

const TEMPERATURE: Target = Target {
    characteristic: Characteristic::TemperatureMeasurement,
    service_uuid: HTM_SERVICE_UUID,
    characteristic_uuid: TEMPERATURE_MEASUREMENT_UUID,
};

const BUTTON: Target = Target {
    characteristic: Characteristic::ButtonState,
    service_uuid: BUTTON_SERVICE_UUID,
    characteristic_uuid: BUTTON_STATE_UUID,
};

#[derive(Debug, Default)]
pub struct DiscoveryMachine {
    state: DiscoveryState,
}

impl DiscoveryMachine {
    pub const fn new() -> Self {
        Self {
            state: DiscoveryState::NoConnection,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Link up: start with the temperature service.
    pub fn connection_opened<P: Platform + ?Sized>(&mut self, connection: u8, platform: &mut P) {
        if self.state != DiscoveryState::NoConnection {
            warn!("discovery: connection opened in {:?}", self.state);
        }
        if let Err(e) = platform.discover_service(connection, &TEMPERATURE.service_uuid) {
            error!("discovery: temperature service request failed: {:?}", e);
        }
        self.transition(DiscoveryState::DiscoveringTemperatureService);
    }

    /// Cache a service handle reported by the stack.
    pub fn service_discovered(&mut self, uuid: &Uuid, service: u32, session: &mut ConnectionSession) {
        for target in [&TEMPERATURE, &BUTTON] {
            if *uuid == target.service_uuid {
                debug!("discovery: {:?} service handle {}", target.characteristic, service);
                session.remote_mut(target.characteristic).service = Some(service);
            }
        }
    }

    /// Cache a characteristic handle reported by the stack.
    pub fn characteristic_discovered(&mut self, uuid: &Uuid, characteristic: u16, session: &mut ConnectionSession) {
        for target in [&TEMPERATURE, &BUTTON] {
            if *uuid == target.characteristic_uuid {
                debug!("discovery: {:?} characteristic handle {}", target.characteristic, characteristic);
                session.remote_mut(target.characteristic).characteristic = Some(characteristic);
            }
        }
    }

    /// The outstanding GATT procedure finished; issue the next one.
    pub fn procedure_completed<P: Platform + ?Sized>(
        &mut self,
        result: u16,
        platform: &mut P,
        session: &ConnectionSession,
    ) {
        let Some(connection) = session.connection_handle() else {
            return;
        };
        if result != 0 {
            warn!("discovery: procedure completed with 0x{:x} in {:?}", result, self.state);
        }

        let next = match self.state {
            DiscoveryState::NoConnection | DiscoveryState::IndicationsActive => return,
            DiscoveryState::DiscoveringTemperatureService => {
                Self::discover_characteristic(&TEMPERATURE, connection, platform, session)
                    .then_some(DiscoveryState::DiscoveringTemperatureCharacteristic)
            }
            DiscoveryState::DiscoveringTemperatureCharacteristic => {
                Self::enable_indications(&TEMPERATURE, connection, platform, session)
                    .then_some(DiscoveryState::EnablingTemperatureIndications)
            }
            DiscoveryState::EnablingTemperatureIndications => {
                if let Err(e) = platform.discover_service(connection, &BUTTON.service_uuid) {
                    error!("discovery: button service request failed: {:?}", e);
                }
                Some(DiscoveryState::DiscoveringButtonService)
            }
            DiscoveryState::DiscoveringButtonService => {
                Self::discover_characteristic(&BUTTON, connection, platform, session)
                    .then_some(DiscoveryState::DiscoveringButtonCharacteristic)
            }
            DiscoveryState::DiscoveringButtonCharacteristic => {
                Self::enable_indications(&BUTTON, connection, platform, session)
                    .then_some(DiscoveryState::IndicationsActive)
            }
        };

        if let Some(next) = next {
            self.transition(next);
        }
    }

    /// Link gone: back to the start and scan again.
    pub fn connection_closed<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        if let Err(e) = platform.start_scanning() {
            error!("discovery: restart scanning failed: {:?}", e);
        }
        platform.clear(DisplayRow::Temperature);
        platform.clear(DisplayRow::Button);
        self.transition(DiscoveryState::NoConnection);
    }

    /// Returns `false` when the service handle is still unknown.
    fn discover_characteristic<P: Platform + ?Sized>(
        target: &Target,
        connection: u8,
        platform: &mut P,
        session: &ConnectionSession,
    ) -> bool {
        let Some(service) = session.remote(target.characteristic).service else {
            error!("discovery: no {:?} service handle", target.characteristic);
            return false;
        };
        if let Err(e) = platform.discover_characteristic(connection, service, &target.characteristic_uuid) {
            error!("discovery: {:?} characteristic request failed: {:?}", target.characteristic, e);
        }
        true
    }

    /// Returns `false` when the characteristic handle is still unknown.
    fn enable_indications<P: Platform + ?Sized>(
        target: &Target,
        connection: u8,
        platform: &mut P,
        session: &ConnectionSession,
    ) -> bool {
        let Some(handle) = session.remote(target.characteristic).characteristic else {
            error!("discovery: no {:?} characteristic handle", target.characteristic);
            return false;
        };
        if let Err(e) = platform.enable_indications(connection, handle) {
            error!("discovery: enable {:?} indications failed: {:?}", target.characteristic, e);
        }
        true
    }

    fn transition(&mut self, next: DiscoveryState) {
        if next != self.state {
            debug!("discovery: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
