//! S140 SoftDevice glue: GATT database and remote clients, advertising,
//! scanning, bonding and the [`BleStack`] implementation.
//!
//! Link-level outcomes the async wrappers do not surface (indication
//! confirmations and timeouts, disconnect reasons, remote indications) are
//! read from the raw event stream in [`softdevice_task`].

use core::cell::RefCell;
use core::sync::atomic::{AtomicU16, Ordering};

use ble_thermometer::config::{
    ConnectionParameters, BUTTON_SERVICE_UUID, BUTTON_STATE_UUID, CONNECTION_PARAMETERS, DEVICE_NAME,
    HTM_SERVICE_UUID, TEMPERATURE_MEASUREMENT_UUID,
};
use ble_thermometer::error::{Error, StackError};
use ble_thermometer::gatt::{advertises_service, Characteristic, Uuid};
use ble_thermometer::platform::BleStack;
use ble_thermometer::session::link_id;
use ble_thermometer::{Event, StatusKind};
use defmt::{debug, error, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal as Request;
use heapless::Vec;
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList, ServiceUuid16,
};
use nrf_softdevice::ble::gatt_server::{self, IndicateValueError};
use nrf_softdevice::ble::peripheral::{self, ConnectableAdvertisement};
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    central, gatt_client, Address, AddressType, Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode,
};
use nrf_softdevice::{raw, RawError, Softdevice};

use super::{post, Board};

/// Bonds kept in RAM.
const MAX_BONDS: usize = 4;

/// CCCD value reported when the peer turns indications on.
const CCCD_INDICATE: u16 = 0x0002;

/// Remote values larger than this are truncated.
const REMOTE_VALUE_MAX: usize = 8;

/// Service ids reported for the two remote services.
const THERMOMETER_SERVICE: u32 = 1;
const BUTTON_SERVICE: u32 = 2;

/// ATT status reported when a remote lookup fails.
const ATTRIBUTE_NOT_FOUND: u16 = raw::BLE_GATT_STATUS_ATTERR_ATTRIBUTE_NOT_FOUND as u16;
const UNLIKELY_ERROR: u16 = raw::BLE_GATT_STATUS_ATTERR_UNLIKELY_ERROR as u16;

#[nrf_softdevice::gatt_service(uuid = "1809")]
pub struct HealthThermometerService {
    #[characteristic(uuid = "2a1c", read, indicate)]
    pub temperature_measurement: [u8; 5],
}

#[nrf_softdevice::gatt_service(uuid = "00000001-38c8-433e-87ec-652a2d136289")]
pub struct ButtonService {
    #[characteristic(uuid = "00000002-38c8-433e-87ec-652a2d136289", read, indicate)]
    pub state: u8,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub htm: HealthThermometerService,
    pub button: ButtonService,
}

impl Server {
    fn value_handle(&self, characteristic: Characteristic) -> u16 {
        match characteristic {
            Characteristic::TemperatureMeasurement => self.htm.temperature_measurement_value_handle,
            Characteristic::ButtonState => self.button.state_value_handle,
        }
    }

    fn characteristic(&self, value_handle: u16) -> Option<Characteristic> {
        [Characteristic::TemperatureMeasurement, Characteristic::ButtonState]
            .into_iter()
            .find(|c| self.value_handle(*c) == value_handle)
    }
}

/// Health Thermometer service on a remote server.
#[nrf_softdevice::gatt_client(uuid = "1809")]
pub struct ThermometerClient {
    #[characteristic(uuid = "2a1c", read, indicate)]
    pub temperature_measurement: [u8; 5],
}

/// Button service on a remote server.
#[nrf_softdevice::gatt_client(uuid = "00000001-38c8-433e-87ec-652a2d136289")]
pub struct ButtonClient {
    #[characteristic(uuid = "00000002-38c8-433e-87ec-652a2d136289", read, indicate)]
    pub state: u8,
}

/// Remote services found on the current link.
#[derive(Default)]
struct RemoteServices {
    thermometer: Option<ThermometerClient>,
    button: Option<ButtonClient>,
}

impl RemoteServices {
    fn value_handle(&self, uuid: &Uuid) -> Option<u16> {
        if *uuid == TEMPERATURE_MEASUREMENT_UUID {
            self.thermometer.as_ref().map(|c| c.temperature_measurement_value_handle)
        } else if *uuid == BUTTON_STATE_UUID {
            self.button.as_ref().map(|c| c.state_value_handle)
        } else {
            None
        }
    }

    fn cccd_handle(&self, value_handle: u16) -> Option<u16> {
        let thermometer = self
            .thermometer
            .as_ref()
            .filter(|c| c.temperature_measurement_value_handle == value_handle)
            .map(|c| c.temperature_measurement_cccd_handle);
        let button = self
            .button
            .as_ref()
            .filter(|c| c.state_value_handle == value_handle)
            .map(|c| c.state_cccd_handle);
        thermometer.or(button)
    }
}

static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_16(ServiceList::Complete, &[ServiceUuid16::HEALTH_THERMOMETER])
    .full_name(DEVICE_NAME)
    .build();

static SCAN_DATA: [u8; 0] = [];

#[derive(Clone, Copy)]
enum Advertising {
    Start { interval: u32 },
    Stop,
}

static ADVERTISING: Request<CriticalSectionRawMutex, Advertising> = Request::new();

/// Work for [`central_task`], in the order the core issued it.
#[derive(Clone, Copy)]
enum CentralRequest {
    Scan,
    StopScan,
    Connect { address: [u8; 6], address_type: u8 },
    DiscoverService(Uuid),
    DiscoverCharacteristic(Uuid),
    EnableIndications(u16),
    Read(u16),
}

static CENTRAL: Channel<CriticalSectionRawMutex, CentralRequest, 4> = Channel::new();

/// Set by the raw event handler when the link drops.
static LINK_DOWN: Request<CriticalSectionRawMutex, ()> = Request::new();

/// Attribute of the last remote indication, for its confirmation.
static INDICATED_HANDLE: AtomicU16 = AtomicU16::new(0);

/// The open link, if any.
static CONNECTION: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

fn with_connection<R>(f: impl FnOnce(&Connection) -> R) -> Result<R, Error> {
    CONNECTION.lock(|c| match c.borrow().as_ref() {
        Some(conn) => Ok(f(conn)),
        None => Err(StackError::NotConnected.into()),
    })
}

/// Publish a fresh link to the core. Returns `false` if its handle cannot
/// be represented.
fn open_link(conn: &Connection) -> bool {
    let Some(handle) = conn.handle() else {
        warn!("BLE: link closed before it was reported");
        return false;
    };
    let Some(connection) = link_id(handle) else {
        error!("BLE: connection handle {} does not fit a link id", handle);
        return false;
    };
    LINK_DOWN.reset();
    CONNECTION.lock(|c| c.replace(Some(conn.clone())));
    post(Event::ConnectionOpened { connection });
    true
}

fn close_link() {
    CONNECTION.lock(|c| c.replace(None));
}

// Bonding

struct PeerBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

pub struct Bonder {
    peers: RefCell<Vec<PeerBond, MAX_BONDS>>,
}

impl Bonder {
    pub fn new() -> Self {
        Self {
            peers: RefCell::new(Vec::new()),
        }
    }

    fn clear(&self) {
        self.peers.borrow_mut().clear();
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::DisplayOnly
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        let value = passkey
            .iter()
            .fold(0u32, |acc, d| acc * 10 + d.wrapping_sub(b'0') as u32);
        post(Event::PasskeyConfirmRequest { passkey: value });
    }

    fn on_bonded(&self, _conn: &Connection, master_id: MasterId, key: EncryptionInfo, peer_id: IdentityKey) {
        {
            let mut peers = self.peers.borrow_mut();
            if let Some(existing) = peers.iter_mut().find(|p| p.master_id == master_id) {
                existing.key = key;
                existing.peer_id = peer_id;
            } else {
                if peers.is_full() {
                    peers.remove(0);
                }
                let _ = peers.push(PeerBond {
                    master_id,
                    key,
                    peer_id,
                });
            }
        }
        post(Event::Bonded);
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.peers
            .borrow()
            .iter()
            .find_map(|p| (p.master_id == master_id).then_some(p.key))
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
    }
}

// Raw events

fn on_raw_event(server: &Server, evt: *const raw::ble_evt_t) {
    // SAFETY: the SoftDevice passes a valid event for the duration of the call.
    let evt = unsafe { &*evt };
    match u32::from(evt.header.evt_id) {
        raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_HVC => {
            let handle = unsafe { evt.evt.gatts_evt.params.hvc.handle };
            match server.characteristic(handle) {
                Some(characteristic) => post(Event::CharacteristicStatus {
                    characteristic,
                    status: StatusKind::Confirmation,
                }),
                None => debug!("BLE: confirmation for unknown handle {}", handle),
            }
        }
        raw::BLE_GATTS_EVTS_BLE_GATTS_EVT_TIMEOUT => post(Event::IndicationTimeout),
        raw::BLE_GAP_EVTS_BLE_GAP_EVT_DISCONNECTED => {
            let reason = unsafe { evt.evt.gap_evt.params.disconnected.reason };
            LINK_DOWN.signal(());
            post(Event::ConnectionClosed {
                reason: u16::from(reason),
            });
        }
        raw::BLE_GATTC_EVTS_BLE_GATTC_EVT_HVX => {
            let hvx = unsafe { &evt.evt.gattc_evt.params.hvx };
            let data = unsafe { hvx.data.as_slice(usize::from(hvx.len)) };
            let indicated = u32::from(hvx.type_) == raw::BLE_GATT_HVX_INDICATION;
            if indicated {
                INDICATED_HANDLE.store(hvx.handle, Ordering::Relaxed);
            }
            let value = Vec::from_slice(&data[..data.len().min(REMOTE_VALUE_MAX)]).unwrap_or_default();
            post(Event::CharacteristicValue {
                characteristic: hvx.handle,
                value,
                indicated,
            });
        }
        _ => {}
    }
}

// Tasks

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    sd.run_with_callback(|evt| on_raw_event(server, evt)).await
}

fn on_server_event(event: ServerEvent) {
    let (characteristic, indications) = match event {
        ServerEvent::Htm(HealthThermometerServiceEvent::TemperatureMeasurementCccdWrite { indications }) => {
            (Characteristic::TemperatureMeasurement, indications)
        }
        ServerEvent::Button(ButtonServiceEvent::StateCccdWrite { indications }) => {
            (Characteristic::ButtonState, indications)
        }
    };
    post(Event::CharacteristicStatus {
        characteristic,
        status: StatusKind::ClientConfig(if indications { CCCD_INDICATE } else { 0 }),
    });
}

/// Advertise on request, then serve the GATT database until the link drops.
#[embassy_executor::task]
pub async fn advertising_task(sd: &'static Softdevice, server: &'static Server, bonder: &'static Bonder) -> ! {
    loop {
        let Advertising::Start { interval } = ADVERTISING.wait().await else {
            continue;
        };

        let config = peripheral::Config {
            interval,
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };

        let conn = match select(
            peripheral::advertise_pairable(sd, adv, &config, bonder),
            ADVERTISING.wait(),
        )
        .await
        {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(e)) => {
                error!("advertising failed: {}", e);
                continue;
            }
            Either::Second(Advertising::Stop) => {
                debug!("advertising stopped");
                continue;
            }
            Either::Second(restart) => {
                ADVERTISING.signal(restart);
                continue;
            }
        };

        if !open_link(&conn) {
            let _ = conn.disconnect();
            continue;
        }

        // The close itself is reported from the raw event stream.
        let _ = gatt_server::run(&conn, server, on_server_event).await;
        close_link();
    }
}

/// Scan, connect and run remote GATT procedures on request.
#[embassy_executor::task]
pub async fn central_task(sd: &'static Softdevice, bonder: &'static Bonder) -> ! {
    let mut pending = None;
    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => CENTRAL.receive().await,
        };
        pending = match request {
            CentralRequest::Scan => scan(sd).await,
            CentralRequest::StopScan => None,
            CentralRequest::Connect { address, address_type } => match connect(sd, bonder, address, address_type).await {
                Some(conn) => {
                    let next = serve(&conn).await;
                    close_link();
                    next
                }
                // Keep looking for the server.
                None => Some(CentralRequest::Scan),
            },
            _ => {
                warn!("BLE: remote procedure requested without a link");
                None
            }
        };
    }
}

/// Report thermometers until another request arrives, which is returned.
async fn scan(sd: &Softdevice) -> Option<CentralRequest> {
    info!("BLE scan starting");
    let config = central::ScanConfig::default();
    let mut last_seen: Option<[u8; 6]> = None;

    let scanning = central::scan(sd, &config, |params| {
        let data = unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        if !advertises_service(data, &HTM_SERVICE_UUID) {
            return None;
        }
        let address = Address::from_raw(params.peer_addr);
        let bytes = address.bytes();
        if last_seen != Some(bytes) {
            last_seen = Some(bytes);
            post(Event::ScanReport {
                address: bytes,
                address_type: address.address_type() as u8,
            });
        }
        None::<()>
    });

    match select(scanning, CENTRAL.receive()).await {
        Either::First(Ok(())) => None,
        Either::First(Err(_)) => {
            warn!("BLE scan ended with error");
            None
        }
        Either::Second(CentralRequest::StopScan) => {
            debug!("BLE scan stopped");
            None
        }
        Either::Second(next) => Some(next),
    }
}

async fn connect(
    sd: &'static Softdevice,
    bonder: &'static Bonder,
    address: [u8; 6],
    address_type: u8,
) -> Option<Connection> {
    let Ok(kind) = AddressType::try_from(address_type) else {
        error!("BLE: invalid address type {}", address_type);
        return None;
    };
    let peer = Address::new(kind, address);
    let whitelist = [&peer];
    let params = CONNECTION_PARAMETERS;
    let conn_cfg = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: params.interval_min,
            max_conn_interval: params.interval_max,
            slave_latency: params.latency,
            conn_sup_timeout: params.supervision_timeout,
        },
        ..Default::default()
    };

    let conn = match central::connect_with_security(sd, &conn_cfg, bonder).await {
        Ok(conn) => conn,
        Err(_) => {
            warn!("BLE: connect failed");
            return None;
        }
    };
    if !open_link(&conn) {
        let _ = conn.disconnect();
        return None;
    }
    Some(conn)
}

/// Run remote procedures until the link drops. A scan or connect request
/// that arrives meanwhile is handed back to the caller.
async fn serve(conn: &Connection) -> Option<CentralRequest> {
    let mut remote = RemoteServices::default();
    loop {
        let request = match select(CENTRAL.receive(), LINK_DOWN.wait()).await {
            Either::First(request) => request,
            Either::Second(()) => return None,
        };
        match request {
            CentralRequest::Scan | CentralRequest::Connect { .. } => return Some(request),
            CentralRequest::StopScan => {}
            CentralRequest::DiscoverService(uuid) => {
                let found = if uuid == HTM_SERVICE_UUID {
                    match gatt_client::discover::<ThermometerClient>(conn).await {
                        Ok(client) => {
                            remote.thermometer = Some(client);
                            Some(THERMOMETER_SERVICE)
                        }
                        Err(_) => None,
                    }
                } else {
                    match gatt_client::discover::<ButtonClient>(conn).await {
                        Ok(client) => {
                            remote.button = Some(client);
                            Some(BUTTON_SERVICE)
                        }
                        Err(_) => None,
                    }
                };
                match found {
                    Some(service) => {
                        post(Event::ServiceDiscovered { uuid, service });
                        post(Event::ProcedureCompleted { result: 0 });
                    }
                    None => {
                        warn!("BLE: service {} not found", uuid);
                        post(Event::ProcedureCompleted {
                            result: ATTRIBUTE_NOT_FOUND,
                        });
                    }
                }
            }
            CentralRequest::DiscoverCharacteristic(uuid) => match remote.value_handle(&uuid) {
                Some(characteristic) => {
                    post(Event::CharacteristicDiscovered { uuid, characteristic });
                    post(Event::ProcedureCompleted { result: 0 });
                }
                None => post(Event::ProcedureCompleted {
                    result: ATTRIBUTE_NOT_FOUND,
                }),
            },
            CentralRequest::EnableIndications(handle) => {
                let result = match remote.cccd_handle(handle) {
                    Some(cccd) => match gatt_client::write(conn, cccd, &CCCD_INDICATE.to_le_bytes()).await {
                        Ok(()) => 0,
                        Err(_) => {
                            warn!("BLE: CCCD write to {} failed", cccd);
                            UNLIKELY_ERROR
                        }
                    },
                    None => ATTRIBUTE_NOT_FOUND,
                };
                post(Event::ProcedureCompleted { result });
            }
            CentralRequest::Read(handle) => {
                let mut buf = [0u8; REMOTE_VALUE_MAX];
                match gatt_client::read(conn, handle, &mut buf).await {
                    Ok(len) => post(Event::CharacteristicValue {
                        characteristic: handle,
                        value: Vec::from_slice(&buf[..len.min(REMOTE_VALUE_MAX)]).unwrap_or_default(),
                        indicated: false,
                    }),
                    Err(_) => warn!("BLE: read of {} failed", handle),
                }
            }
        }
    }
}

fn indicate_error(e: IndicateValueError) -> Error {
    match e {
        IndicateValueError::Disconnected => StackError::NotConnected.into(),
        IndicateValueError::Raw(RawError::Busy) => StackError::Busy.into(),
        IndicateValueError::Raw(other) => StackError::Status(other as u32 as u16).into(),
    }
}

fn request(request: CentralRequest) -> Result<(), Error> {
    CENTRAL.try_send(request).map_err(|_| StackError::Busy.into())
}

impl BleStack for Board {
    fn identity_address(&mut self) -> Result<([u8; 6], u8), Error> {
        let address = nrf_softdevice::ble::get_address(self.sd);
        Ok((address.bytes(), address.address_type() as u8))
    }

    fn create_advertiser(&mut self) -> Result<u8, Error> {
        // One advertising set, owned by `advertising_task`.
        Ok(0)
    }

    fn start_advertising(&mut self, _advertiser: u8, interval_min: u32, _interval_max: u32) -> Result<(), Error> {
        ADVERTISING.signal(Advertising::Start { interval: interval_min });
        Ok(())
    }

    fn stop_advertising(&mut self, _advertiser: u8) -> Result<(), Error> {
        ADVERTISING.signal(Advertising::Stop);
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), Error> {
        request(CentralRequest::Scan)
    }

    fn stop_scanning(&mut self) -> Result<(), Error> {
        request(CentralRequest::StopScan)
    }

    fn connect(&mut self, address: &[u8; 6], address_type: u8) -> Result<(), Error> {
        request(CentralRequest::Connect {
            address: *address,
            address_type,
        })
    }

    fn set_connection_parameters(&mut self, _connection: u8, params: &ConnectionParameters) -> Result<(), Error> {
        let raw_params = raw::ble_gap_conn_params_t {
            min_conn_interval: params.interval_min,
            max_conn_interval: params.interval_max,
            slave_latency: params.latency,
            conn_sup_timeout: params.supervision_timeout,
        };
        with_connection(|conn| conn.set_conn_params(raw_params))?
            .map_err(|_| Error::from(StackError::Busy))?;
        info!(
            "BLE: requested interval {} latency {} timeout {}",
            params.interval_min, params.latency, params.supervision_timeout
        );
        Ok(())
    }

    fn write_local_value(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), Error> {
        gatt_server::set_value(self.sd, self.server.value_handle(characteristic), value)
            .map_err(|_| Error::from(StackError::Busy))
    }

    fn send_indication(&mut self, _connection: u8, characteristic: Characteristic, value: &[u8]) -> Result<(), Error> {
        // Confirmation or timeout arrives later through `on_raw_event`.
        let handle = self.server.value_handle(characteristic);
        with_connection(|conn| gatt_server::indicate_value(conn, handle, value))?.map_err(indicate_error)
    }

    fn discover_service(&mut self, _connection: u8, uuid: &Uuid) -> Result<(), Error> {
        if *uuid != HTM_SERVICE_UUID && *uuid != BUTTON_SERVICE_UUID {
            return Err(Error::Unsupported);
        }
        request(CentralRequest::DiscoverService(*uuid))
    }

    fn discover_characteristic(&mut self, _connection: u8, _service: u32, uuid: &Uuid) -> Result<(), Error> {
        request(CentralRequest::DiscoverCharacteristic(*uuid))
    }

    fn enable_indications(&mut self, _connection: u8, characteristic: u16) -> Result<(), Error> {
        request(CentralRequest::EnableIndications(characteristic))
    }

    fn read_remote_value(&mut self, _connection: u8, characteristic: u16) -> Result<(), Error> {
        request(CentralRequest::Read(characteristic))
    }

    fn confirm_indication(&mut self, _connection: u8) -> Result<(), Error> {
        let conn_handle = with_connection(|conn| conn.handle())?.ok_or(StackError::NotConnected)?;
        let handle = INDICATED_HANDLE.load(Ordering::Relaxed);
        // SAFETY: plain SVC call with value arguments.
        let ret = unsafe { raw::sd_ble_gattc_hv_confirm(conn_handle, handle) };
        if ret != raw::NRF_SUCCESS {
            return Err(StackError::Status(ret as u16).into());
        }
        Ok(())
    }

    fn configure_security(&mut self) -> Result<(), Error> {
        // The bonder is handed to every pairable advertisement and connect.
        Ok(())
    }

    fn delete_bondings(&mut self) -> Result<(), Error> {
        self.bonder.clear();
        Ok(())
    }

    fn confirm_bonding(&mut self, _connection: u8, accept: bool) -> Result<(), Error> {
        debug!("BLE: bonding request accepted={}", accept);
        Ok(())
    }

    fn confirm_passkey(&mut self, _connection: u8, accept: bool) -> Result<(), Error> {
        // Display-only: the peer enters the passkey, nothing to reply.
        if !accept {
            warn!("BLE: passkey rejection not supported, disconnect instead");
            with_connection(|conn| conn.disconnect())?.map_err(|_| Error::from(StackError::Busy))?;
        }
        Ok(())
    }

    fn start_soft_timer(&mut self, handle: u8, period_ms: u32) -> Result<(), Error> {
        super::timer::start_soft_timer(handle, period_ms);
        Ok(())
    }
}
