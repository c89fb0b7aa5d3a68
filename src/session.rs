//! Per-connection session state.
//!
//! One [`ConnectionSession`] is owned by the dispatcher and lent to the state
//! machines. Identity fields survive disconnects; everything else is reset
//! by [`ConnectionSession::close`].

use crate::gatt::{Characteristic, RemoteHandles};

/// Link id the session stores for a stack connection handle, or `None` if
/// the handle does not fit.
pub fn link_id(conn_handle: u16) -> Option<u8> {
    u8::try_from(conn_handle).ok()
}

#[derive(Debug, Default)]
pub struct ConnectionSession {
    local_address: [u8; 6],
    address_type: u8,
    advertising_handle: Option<u8>,

    connection_handle: Option<u8>,
    bonded: bool,
    passkey_pending: bool,

    htm_indication_enabled: bool,
    button_indication_enabled: bool,
    indication_in_flight: bool,

    button_pressed: bool,

    temperature: RemoteHandles,
    button: RemoteHandles,
}

impl ConnectionSession {
    pub const fn new() -> Self {
        Self {
            local_address: [0; 6],
            address_type: 0,
            advertising_handle: None,
            connection_handle: None,
            bonded: false,
            passkey_pending: false,
            htm_indication_enabled: false,
            button_indication_enabled: false,
            indication_in_flight: false,
            button_pressed: false,
            temperature: RemoteHandles::new(),
            button: RemoteHandles::new(),
        }
    }

    // Identity

    pub fn set_identity(&mut self, address: [u8; 6], address_type: u8) {
        self.local_address = address;
        self.address_type = address_type;
    }

    pub fn local_address(&self) -> [u8; 6] {
        self.local_address
    }

    pub fn address_type(&self) -> u8 {
        self.address_type
    }

    pub fn set_advertising_handle(&mut self, handle: u8) {
        self.advertising_handle = Some(handle);
    }

    pub fn advertising_handle(&self) -> Option<u8> {
        self.advertising_handle
    }

    // Connection lifecycle

    pub fn open(&mut self, connection: u8) {
        self.connection_handle = Some(connection);
    }

    /// Forget everything tied to the link. Identity and the advertising
    /// handle are kept.
    pub fn close(&mut self) {
        *self = Self {
            local_address: self.local_address,
            address_type: self.address_type,
            advertising_handle: self.advertising_handle,
            ..Self::new()
        };
    }

    pub fn is_connected(&self) -> bool {
        self.connection_handle.is_some()
    }

    /// Valid only while connected.
    pub fn connection_handle(&self) -> Option<u8> {
        self.connection_handle
    }

    // Security

    pub fn set_bonded(&mut self, bonded: bool) {
        self.bonded = bonded;
    }

    pub fn is_bonded(&self) -> bool {
        self.bonded
    }

    pub fn set_passkey_pending(&mut self, pending: bool) {
        self.passkey_pending = pending;
    }

    pub fn passkey_pending(&self) -> bool {
        self.passkey_pending
    }

    // Indications

    pub fn set_indications(&mut self, characteristic: Characteristic, enabled: bool) {
        match characteristic {
            Characteristic::TemperatureMeasurement => self.htm_indication_enabled = enabled,
            Characteristic::ButtonState => self.button_indication_enabled = enabled,
        }
    }

    pub fn indications_enabled(&self, characteristic: Characteristic) -> bool {
        match characteristic {
            Characteristic::TemperatureMeasurement => self.htm_indication_enabled,
            Characteristic::ButtonState => self.button_indication_enabled,
        }
    }

    /// Mark the transport busy. Returns `false` if an indication was already
    /// outstanding, in which case nothing changes.
    pub fn begin_indication(&mut self) -> bool {
        if self.indication_in_flight {
            return false;
        }
        self.indication_in_flight = true;
        true
    }

    /// Confirmation received or acknowledgement timed out.
    pub fn end_indication(&mut self) {
        self.indication_in_flight = false;
    }

    pub fn indication_in_flight(&self) -> bool {
        self.indication_in_flight
    }

    /// Acknowledgement timeout: the peer is treated as gone for indications
    /// until the link closes.
    pub fn indication_timed_out(&mut self) {
        self.indication_in_flight = false;
        self.htm_indication_enabled = false;
        self.button_indication_enabled = false;
    }

    /// Guard for every productive sensor transition.
    pub fn sensor_guard(&self) -> bool {
        self.is_connected() && self.htm_indication_enabled
    }

    // Button

    pub fn set_button_pressed(&mut self, pressed: bool) {
        self.button_pressed = pressed;
    }

    pub fn button_pressed(&self) -> bool {
        self.button_pressed
    }

    // Discovered remote handles (client role)

    pub fn remote(&self, characteristic: Characteristic) -> &RemoteHandles {
        match characteristic {
            Characteristic::TemperatureMeasurement => &self.temperature,
            Characteristic::ButtonState => &self.button,
        }
    }

    pub fn remote_mut(&mut self, characteristic: Characteristic) -> &mut RemoteHandles {
        match characteristic {
            Characteristic::TemperatureMeasurement => &mut self.temperature,
            Characteristic::ButtonState => &mut self.button,
        }
    }

    /// Which remote characteristic a value handle belongs to.
    pub fn remote_characteristic(&self, handle: u16) -> Option<Characteristic> {
        if self.temperature.characteristic == Some(handle) {
            Some(Characteristic::TemperatureMeasurement)
        } else if self.button.characteristic == Some(handle) {
            Some(Characteristic::ButtonState)
        } else {
            None
        }
    }
}
