//! Event dispatcher.
//!
//! Every stack event and every hardware signal ends up in [`App::handle`],
//! which runs to completion in the single task context. Simple level flags
//! (indication enables, bonding, button level) are applied to the session
//! directly; sequenced work goes to the sensor and discovery state machines.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::config::{
    Role, ADV_INTERVAL_MAX, ADV_INTERVAL_MIN, CONNECTION_PARAMETERS, DEVICE_NAME, DISPLAY_REFRESH_MS,
    DISPLAY_REFRESH_TIMER, QUEUE_CAPACITY, SERVER_ADDRESS,
};
use crate::discovery::{DiscoveryMachine, DiscoveryState};
use crate::error::Error;
use crate::gatt::{cccd_indications, Characteristic, Uuid};
use crate::indicate::{self, Delivery};
use crate::measurement;
use crate::platform::{Button, DisplayRow, Platform};
use crate::queue::IndicationQueue;
use crate::sensor::{SensorMachine, SensorState};
use crate::session::ConnectionSession;
use crate::signal::{Signal, SignalFlags};

/// Largest remote characteristic value the client keeps.
pub const MAX_VALUE_LEN: usize = 8;

/// What a characteristic status event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusKind {
    /// The peer wrote the client characteristic configuration descriptor.
    ClientConfig(u16),
    /// The peer confirmed the outstanding indication.
    Confirmation,
}

/// Inbound events, from the BLE stack or from the signal word.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Boot,
    ConnectionOpened {
        connection: u8,
    },
    ConnectionClosed {
        reason: u16,
    },
    ConnectionParameters {
        interval: u16,
        latency: u16,
        timeout: u16,
    },
    SoftTimer {
        handle: u8,
    },
    CharacteristicStatus {
        characteristic: Characteristic,
        status: StatusKind,
    },
    IndicationTimeout,
    ServiceDiscovered {
        uuid: Uuid,
        service: u32,
    },
    CharacteristicDiscovered {
        uuid: Uuid,
        characteristic: u16,
    },
    ProcedureCompleted {
        result: u16,
    },
    CharacteristicValue {
        characteristic: u16,
        value: Vec<u8, MAX_VALUE_LEN>,
        indicated: bool,
    },
    ScanReport {
        address: [u8; 6],
        address_type: u8,
    },
    BondingConfirmRequest,
    Bonded,
    PasskeyConfirmRequest {
        passkey: u32,
    },
    BondingFailed {
        reason: u16,
    },
    Signal(Signal),
}

/// Log a failed collaborator call and carry on.
fn check<T>(what: &'static str, result: Result<T, Error>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            error!("{} failed: {:?}", what, e);
            None
        }
    }
}

pub struct App<const N: usize = QUEUE_CAPACITY> {
    role: Role,
    session: ConnectionSession,
    queue: IndicationQueue<N>,
    sensor: SensorMachine,
    discovery: DiscoveryMachine,
}

impl<const N: usize> App<N> {
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            session: ConnectionSession::new(),
            queue: IndicationQueue::new(),
            sensor: SensorMachine::new(),
            discovery: DiscoveryMachine::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn queue(&self) -> &IndicationQueue<N> {
        &self.queue
    }

    pub fn sensor_state(&self) -> SensorState {
        self.sensor.state()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Drain every pending signal, one at a time.
    pub fn run_signals<P: Platform + ?Sized>(&mut self, flags: &SignalFlags, platform: &mut P) {
        while let Some(signal) = flags.take() {
            self.handle(Event::Signal(signal), platform);
        }
    }

    pub fn handle<P: Platform + ?Sized>(&mut self, event: Event, platform: &mut P) {
        match event {
            Event::Boot => self.on_boot(platform),
            Event::ConnectionOpened { connection } => self.on_open(connection, platform),
            Event::ConnectionClosed { reason } => self.on_close(reason, platform),
            Event::ConnectionParameters {
                interval,
                latency,
                timeout,
            } => {
                info!(
                    "link: interval {} latency {} timeout {}",
                    interval, latency, timeout
                );
            }
            Event::SoftTimer { handle } => {
                if handle == DISPLAY_REFRESH_TIMER {
                    platform.refresh();
                }
            }
            Event::CharacteristicStatus {
                characteristic,
                status,
            } => self.on_characteristic_status(characteristic, status),
            Event::IndicationTimeout => {
                warn!("indication: confirmation timed out");
                self.session.indication_timed_out();
            }
            Event::ServiceDiscovered { uuid, service } => {
                if self.role == Role::Client {
                    self.discovery
                        .service_discovered(&uuid, service, &mut self.session);
                }
            }
            Event::CharacteristicDiscovered {
                uuid,
                characteristic,
            } => {
                if self.role == Role::Client {
                    self.discovery
                        .characteristic_discovered(&uuid, characteristic, &mut self.session);
                }
            }
            Event::ProcedureCompleted { result } => {
                if self.role == Role::Client {
                    self.discovery
                        .procedure_completed(result, platform, &self.session);
                }
            }
            Event::CharacteristicValue {
                characteristic,
                value,
                indicated,
            } => self.on_remote_value(characteristic, &value, indicated, platform),
            Event::ScanReport {
                address,
                address_type,
            } => self.on_scan_report(address, address_type, platform),
            Event::BondingConfirmRequest => {
                if let Some(connection) = self.session.connection_handle() {
                    check("confirm bonding", platform.confirm_bonding(connection, true));
                }
            }
            Event::Bonded => {
                info!("security: bonded");
                self.session.set_bonded(true);
                self.session.set_passkey_pending(false);
                platform.show(DisplayRow::Connection, "Bonded");
                platform.clear(DisplayRow::Passkey);
                platform.clear(DisplayRow::Action);
            }
            Event::PasskeyConfirmRequest { passkey } => {
                info!("security: confirm passkey {}", passkey);
                self.session.set_passkey_pending(true);
                let mut text: String<16> = String::new();
                let _ = write!(text, "Passkey {:06}", passkey);
                platform.show(DisplayRow::Passkey, &text);
                platform.show(DisplayRow::Action, "Confirm with PB0");
            }
            Event::BondingFailed { reason } => {
                warn!("security: bonding failed 0x{:x}", reason);
                self.session.set_bonded(false);
                self.session.set_passkey_pending(false);
                platform.show(DisplayRow::Connection, "Bonding Failed");
                platform.clear(DisplayRow::Passkey);
                platform.clear(DisplayRow::Action);
            }
            Event::Signal(signal) => self.on_signal(signal, platform),
        }
    }

    fn on_boot<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        info!("boot: {:?}", self.role);

        if let Some((address, address_type)) = check("identity address", platform.identity_address()) {
            self.session.set_identity(address, address_type);
        }

        check("delete bondings", platform.delete_bondings());
        check("configure security", platform.configure_security());

        match self.role {
            Role::Server => {
                if let Some(handle) = check("create advertiser", platform.create_advertiser()) {
                    self.session.set_advertising_handle(handle);
                }
                self.start_advertising(platform);
                platform.show(DisplayRow::Connection, "Advertising");
            }
            Role::Client => {
                check("start scanning", platform.start_scanning());
                platform.show(DisplayRow::Connection, "Discovering");
            }
        }

        check(
            "start display timer",
            platform.start_soft_timer(DISPLAY_REFRESH_TIMER, DISPLAY_REFRESH_MS),
        );

        platform.show(DisplayRow::Name, DEVICE_NAME);
        let a = self.session.local_address();
        let mut text: String<18> = String::new();
        let _ = write!(
            text,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        );
        platform.show(DisplayRow::Address, &text);
    }

    fn on_open<P: Platform + ?Sized>(&mut self, connection: u8, platform: &mut P) {
        info!("link: opened, handle {}", connection);
        self.session.open(connection);

        match self.role {
            Role::Server => {
                if let Some(advertiser) = self.session.advertising_handle() {
                    check("stop advertising", platform.stop_advertising(advertiser));
                }
                check(
                    "set connection parameters",
                    platform.set_connection_parameters(connection, &CONNECTION_PARAMETERS),
                );
            }
            Role::Client => self.discovery.connection_opened(connection, platform),
        }
        platform.show(DisplayRow::Connection, "Connected");
    }

    fn on_close<P: Platform + ?Sized>(&mut self, reason: u16, platform: &mut P) {
        info!("link: closed, reason 0x{:x}", reason);
        if !self.queue.is_empty() {
            warn!("link: discarding {} queued indications", self.queue.depth());
        }
        self.session.close();
        self.queue.clear();

        platform.clear(DisplayRow::Passkey);
        platform.clear(DisplayRow::Action);

        match self.role {
            Role::Server => {
                self.start_advertising(platform);
                platform.clear(DisplayRow::Temperature);
                platform.show(DisplayRow::Connection, "Advertising");
            }
            Role::Client => {
                self.discovery.connection_closed(platform);
                platform.show(DisplayRow::Connection, "Discovering");
            }
        }
    }

    fn start_advertising<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        let Some(advertiser) = self.session.advertising_handle() else {
            error!("advertising: no advertiser handle");
            return;
        };
        check(
            "start advertising",
            platform.start_advertising(advertiser, ADV_INTERVAL_MIN, ADV_INTERVAL_MAX),
        );
    }

    fn on_characteristic_status(&mut self, characteristic: Characteristic, status: StatusKind) {
        match status {
            StatusKind::ClientConfig(value) => {
                let enabled = cccd_indications(value);
                info!("gatt: {:?} indications {}", characteristic, enabled);
                self.session.set_indications(characteristic, enabled);
            }
            StatusKind::Confirmation => {
                trace!("gatt: {:?} indication confirmed", characteristic);
                self.session.end_indication();
            }
        }
    }

    fn on_remote_value<P: Platform + ?Sized>(
        &mut self,
        handle: u16,
        value: &[u8],
        indicated: bool,
        platform: &mut P,
    ) {
        if self.role != Role::Client {
            return;
        }

        let mut text: String<24> = String::new();
        match self.session.remote_characteristic(handle) {
            Some(Characteristic::TemperatureMeasurement) => match measurement::decode_temperature(value) {
                Some(celsius) => {
                    info!("remote: {} C", celsius);
                    let _ = write!(text, "Temp={}", celsius);
                    platform.show(DisplayRow::Temperature, &text);
                }
                None => warn!("remote: malformed temperature ({} bytes)", value.len()),
            },
            Some(Characteristic::ButtonState) => match measurement::decode_button(value) {
                Some(pressed) => {
                    let label = if pressed { "Button Pressed" } else { "Button Released" };
                    platform.show(DisplayRow::Button, label);
                }
                None => warn!("remote: empty button value"),
            },
            None => debug!("remote: value for unknown handle {}", handle),
        }

        if indicated {
            if let Some(connection) = self.session.connection_handle() {
                check("confirm indication", platform.confirm_indication(connection));
            }
        }
    }

    fn on_scan_report<P: Platform + ?Sized>(&mut self, address: [u8; 6], address_type: u8, platform: &mut P) {
        if self.role != Role::Client || self.session.is_connected() || address != SERVER_ADDRESS {
            return;
        }
        info!("scan: server found");
        check("stop scanning", platform.stop_scanning());
        check("connect", platform.connect(&address, address_type));
    }

    fn on_signal<P: Platform + ?Sized>(&mut self, signal: Signal, platform: &mut P) {
        match signal {
            Signal::PeriodElapsed | Signal::DelayElapsed | Signal::TransferComplete => {
                if self.role != Role::Server {
                    return;
                }
                if signal == Signal::PeriodElapsed {
                    indicate::drain_one(platform, &mut self.session, &mut self.queue);
                }
                self.sensor
                    .handle(signal, platform, &mut self.session, &mut self.queue);
            }
            Signal::Button0Edge => self.on_button0(platform),
            Signal::Button1Edge => self.on_button1(platform),
        }
    }

    fn on_button0<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        let pressed = platform.is_pressed(Button::Button0);

        if self.session.passkey_pending() {
            if pressed {
                if let Some(connection) = self.session.connection_handle() {
                    check("confirm passkey", platform.confirm_passkey(connection, true));
                }
                self.session.set_passkey_pending(false);
                platform.clear(DisplayRow::Action);
            }
            return;
        }

        if self.role != Role::Server {
            return;
        }

        self.session.set_button_pressed(pressed);
        let value = measurement::encode_button(pressed);
        check(
            "write button value",
            platform.write_local_value(Characteristic::ButtonState, &value),
        );
        platform.show(
            DisplayRow::Button,
            if pressed { "Button Pressed" } else { "Button Released" },
        );

        let session = &self.session;
        if session.is_connected() && session.is_bonded() && session.indications_enabled(Characteristic::ButtonState) {
            let delivery = indicate::send_or_enqueue(
                platform,
                &mut self.session,
                &mut self.queue,
                Characteristic::ButtonState,
                &value,
            );
            if delivery == Delivery::Dropped {
                warn!("button: indication dropped");
            }
        }
    }

    fn on_button1<P: Platform + ?Sized>(&mut self, platform: &mut P) {
        if self.role != Role::Client || !platform.is_pressed(Button::Button1) {
            return;
        }
        let Some(connection) = self.session.connection_handle() else {
            return;
        };
        match self.session.remote(Characteristic::ButtonState).characteristic {
            Some(handle) => {
                check("read button", platform.read_remote_value(connection, handle));
            }
            None => warn!("button: remote handle not discovered yet"),
        }
    }
}
