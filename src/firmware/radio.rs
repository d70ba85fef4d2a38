//! SoftDevice S140 behind the [`Radio`] trait.
//!
//! The scheduler side ([`SoftdeviceRadio`]) only queues [`RadioCommand`]s
//! and never blocks. [`run`] owns the SoftDevice futures: it advertises,
//! scans, connects and serves the GATT table concurrently, executes
//! queued commands, and reports every outcome as a [`RadioEvent`] on the
//! event channel.

use core::cell::RefCell;

use embassy_futures::select::{select4, Either4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use nrf_softdevice::ble::{central, gatt_client, gatt_server, peripheral};
use nrf_softdevice::ble::{Address as SdAddress, AddressType, Connection};
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;

use crate::ble::radio::{Radio, ScanParams};
use crate::ble::session::LinkSide;
use crate::ble::{nus, AddrKind, Address, AdvData, AttValue, AttrHandle, CharacteristicInfo};
use crate::ble::{ConnHandle, HandleRange, NusHandles, RadioEvent, ScanReport, Uuid};
use crate::ble::ATT_VALUE_LEN;
use crate::error::RadioError;

pub const COMMAND_DEPTH: usize = 8;
pub const EVENT_DEPTH: usize = 16;

/// GATT status reported when the SoftDevice call itself failed.
const STATUS_UNKNOWN: u16 = 0x0101;
/// GATT status for a service that is not on the peer.
const STATUS_ATTRIBUTE_NOT_FOUND: u16 = 0x010A;

const CCCD_UUID: Uuid = Uuid::Uuid16(0x2902);
const PROP_WRITE: u8 = 0x08;
const PROP_NOTIFY: u8 = 0x10;

/// Advertising/scan timing unit (µs).
const UNIT_US: u32 = 625;

#[nrf_softdevice::gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NusService {
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    rx: heapless::Vec<u8, ATT_VALUE_LEN>,
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    tx: heapless::Vec<u8, ATT_VALUE_LEN>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    nus: NusService,
}

#[nrf_softdevice::gatt_client(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NusClient {
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write)]
    rx: heapless::Vec<u8, ATT_VALUE_LEN>,
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    tx: heapless::Vec<u8, ATT_VALUE_LEN>,
}

/// One queued radio operation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioCommand {
    Advertise { data: AdvData, interval_us: u32 },
    StopAdvertising,
    ScanStart(ScanParams),
    ScanStop,
    Connect(Address),
    CancelConnect,
    Disconnect(ConnHandle),
    DiscoverServices { conn: ConnHandle, uuid: Uuid },
    DiscoverCharacteristics { conn: ConnHandle, range: HandleRange, uuid: Uuid },
    DiscoverDescriptors { conn: ConnHandle, range: HandleRange },
    Read { conn: ConnHandle, value_handle: AttrHandle },
    Write { conn: ConnHandle, value_handle: AttrHandle, data: AttValue },
    Notify { conn: ConnHandle, value_handle: AttrHandle, data: AttValue },
}

/// Channels and shared state between the scheduler and [`run`].
pub struct RadioLink {
    commands: Channel<CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>,
    events: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_DEPTH>,
    rx_value: Mutex<CriticalSectionRawMutex, RefCell<AttValue>>,
}

impl RadioLink {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            events: Channel::new(),
            rx_value: Mutex::new(RefCell::new(AttValue::new())),
        }
    }

    /// Scheduler-side handle.
    pub fn radio(&'static self, server: &Server) -> SoftdeviceRadio {
        SoftdeviceRadio {
            link: self,
            handles: NusHandles {
                tx: AttrHandle(server.nus.tx_value_handle),
                rx: AttrHandle(server.nus.rx_value_handle),
            },
        }
    }

    pub async fn next_event(&self) -> RadioEvent {
        self.events.receive().await
    }

    pub fn try_event(&self) -> Option<RadioEvent> {
        self.events.try_receive().ok()
    }

    fn emit(&self, event: RadioEvent) {
        if self.events.try_send(event).is_err() {
            warn!("radio: event channel full, dropping");
        }
    }
}

impl Default for RadioLink {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SoftdeviceRadio {
    link: &'static RadioLink,
    handles: NusHandles,
}

impl SoftdeviceRadio {
    fn queue(&mut self, command: RadioCommand) -> Result<(), RadioError> {
        self.link
            .commands
            .try_send(command)
            .map_err(|_| RadioError::QueueFull)
    }
}

fn att_value(data: &[u8]) -> Result<AttValue, RadioError> {
    AttValue::from_slice(data).map_err(|_| RadioError::Raw(raw::NRF_ERROR_DATA_SIZE))
}

impl Radio for SoftdeviceRadio {
    fn advertise(&mut self, adv_data: &[u8], interval_us: u32) -> Result<(), RadioError> {
        let data = AdvData::from_slice(adv_data).map_err(|_| RadioError::Raw(raw::NRF_ERROR_DATA_SIZE))?;
        self.queue(RadioCommand::Advertise { data, interval_us })
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        self.queue(RadioCommand::StopAdvertising)
    }

    fn scan_start(&mut self, params: ScanParams) -> Result<(), RadioError> {
        self.queue(RadioCommand::ScanStart(params))
    }

    fn scan_stop(&mut self) -> Result<(), RadioError> {
        self.queue(RadioCommand::ScanStop)
    }

    fn connect(&mut self, peer: Address) -> Result<(), RadioError> {
        self.queue(RadioCommand::Connect(peer))
    }

    fn cancel_connect(&mut self) -> Result<(), RadioError> {
        self.queue(RadioCommand::CancelConnect)
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError> {
        self.queue(RadioCommand::Disconnect(conn))
    }

    fn discover_services(&mut self, conn: ConnHandle, uuid: Uuid) -> Result<(), RadioError> {
        self.queue(RadioCommand::DiscoverServices { conn, uuid })
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
        uuid: Uuid,
    ) -> Result<(), RadioError> {
        self.queue(RadioCommand::DiscoverCharacteristics { conn, range, uuid })
    }

    fn discover_descriptors(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), RadioError> {
        self.queue(RadioCommand::DiscoverDescriptors { conn, range })
    }

    fn read(&mut self, conn: ConnHandle, value_handle: AttrHandle) -> Result<(), RadioError> {
        self.queue(RadioCommand::Read { conn, value_handle })
    }

    fn write(
        &mut self,
        conn: ConnHandle,
        value_handle: AttrHandle,
        data: &[u8],
    ) -> Result<(), RadioError> {
        let data = att_value(data)?;
        self.queue(RadioCommand::Write { conn, value_handle, data })
    }

    fn notify(
        &mut self,
        conn: ConnHandle,
        value_handle: AttrHandle,
        data: &[u8],
    ) -> Result<(), RadioError> {
        let data = att_value(data)?;
        self.queue(RadioCommand::Notify { conn, value_handle, data })
    }

    fn local_value(&mut self, attr: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError> {
        if attr != self.handles.rx {
            return Err(RadioError::InvalidHandle);
        }
        Ok(self.link.rx_value.lock(|value| {
            let value = value.borrow();
            let n = value.len().min(buf.len());
            buf[..n].copy_from_slice(&value[..n]);
            n
        }))
    }

    fn register_nus(&mut self) -> Result<NusHandles, RadioError> {
        // The table is built once at boot by `enable`.
        Ok(self.handles)
    }
}

/// Enable the SoftDevice and register the GATT table.
pub fn enable(name: &'static str) -> (&'static Softdevice, &'static Server) {
    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: name.as_ptr() as _,
            current_len: name.len() as u16,
            max_len: name.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&config);
    static SERVER: StaticCell<Server> = StaticCell::new();
    let server = SERVER.init(defmt::unwrap!(Server::new(sd)));
    let sd: &'static Softdevice = sd;
    (sd, server)
}

fn to_sd(addr: Address) -> SdAddress {
    let kind = match addr.kind {
        AddrKind::Public => AddressType::Public,
        AddrKind::Random => AddressType::RandomStatic,
    };
    SdAddress::new(kind, addr.bytes)
}

fn from_sd(addr: SdAddress) -> Address {
    let kind = match addr.address_type() {
        AddressType::Public => AddrKind::Public,
        _ => AddrKind::Random,
    };
    Address::new(kind, addr.bytes())
}

fn handle_of(conn: &Connection) -> ConnHandle {
    ConnHandle(conn.handle().unwrap_or(raw::BLE_CONN_HANDLE_INVALID as u16))
}

fn units(us: u32) -> u32 {
    us / UNIT_US
}

/// What the SoftDevice is currently doing on our behalf.
struct State {
    advertising: Option<(AdvData, u32)>,
    scanning: Option<ScanParams>,
    connecting: Option<Address>,
    link: Option<(Connection, LinkSide)>,
    client: Option<NusClient>,
}

impl State {
    fn conn(&self, handle: ConnHandle) -> Option<&Connection> {
        self.link
            .as_ref()
            .map(|(conn, _)| conn)
            .filter(|conn| handle_of(conn) == handle)
    }
}

enum Outcome {
    Command(RadioCommand),
    Accepted(Result<Connection, peripheral::AdvertiseError>),
    Connected(Result<Connection, central::ConnectError>),
    Scan(Result<(), central::ScanError>),
    LinkClosed,
}

/// Radio task body. Never returns.
pub async fn run(sd: &'static Softdevice, server: &'static Server, link: &'static RadioLink) -> ! {
    let mut state = State {
        advertising: None,
        scanning: None,
        connecting: None,
        link: None,
        client: None,
    };

    loop {
        let outcome = match select4(
            link.commands.receive(),
            advertise(sd, &state),
            central_activity(sd, &state, link),
            serve(server, &state, link),
        )
        .await
        {
            Either4::First(command) => Outcome::Command(command),
            Either4::Second(result) => Outcome::Accepted(result),
            Either4::Third(Ok(conn)) => Outcome::Connected(Ok(conn)),
            Either4::Third(Err(CentralError::Connect(e))) => Outcome::Connected(Err(e)),
            Either4::Third(Err(CentralError::Scan(e))) => Outcome::Scan(Err(e)),
            Either4::Fourth(()) => Outcome::LinkClosed,
        };

        match outcome {
            Outcome::Command(command) => execute(&mut state, command, link).await,
            Outcome::Accepted(Ok(conn)) => {
                state.advertising = None;
                link.emit(RadioEvent::CentralConnect {
                    conn: handle_of(&conn),
                    peer: from_sd(conn.peer_address()),
                });
                state.link = Some((conn, LinkSide::Peripheral));
            }
            Outcome::Accepted(Err(e)) => {
                warn!("radio: advertising failed: {}", e);
                state.advertising = None;
            }
            Outcome::Connected(Ok(conn)) => {
                state.connecting = None;
                link.emit(RadioEvent::PeripheralConnect {
                    conn: handle_of(&conn),
                    peer: from_sd(conn.peer_address()),
                });
                state.link = Some((conn, LinkSide::Central));
            }
            Outcome::Connected(Err(e)) => {
                warn!("radio: connect failed: {}", e);
                state.connecting = None;
            }
            Outcome::Scan(result) => {
                if let Err(e) = result {
                    warn!("radio: scan failed: {}", e);
                }
                state.scanning = None;
                link.emit(RadioEvent::ScanDone);
            }
            Outcome::LinkClosed => {
                if let Some((conn, side)) = state.link.take() {
                    let conn_handle = handle_of(&conn);
                    let peer = from_sd(conn.peer_address());
                    let event = match side {
                        LinkSide::Peripheral => RadioEvent::CentralDisconnect { conn: conn_handle, peer },
                        LinkSide::Central => RadioEvent::PeripheralDisconnect { conn: conn_handle, peer },
                    };
                    link.emit(event);
                }
                state.client = None;
            }
        }
    }
}

async fn advertise(
    sd: &'static Softdevice,
    state: &State,
) -> Result<Connection, peripheral::AdvertiseError> {
    let Some((data, interval_us)) = &state.advertising else {
        return core::future::pending().await;
    };
    let config = peripheral::Config {
        interval: units(*interval_us).max(32),
        ..Default::default()
    };
    let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
        adv_data: data,
        scan_data: &[],
    };
    peripheral::advertise_connectable(sd, adv, &config).await
}

enum CentralError {
    Connect(central::ConnectError),
    Scan(central::ScanError),
}

/// Connect if a connect is pending, otherwise scan if scanning is on.
async fn central_activity(
    sd: &'static Softdevice,
    state: &State,
    link: &RadioLink,
) -> Result<Connection, CentralError> {
    if let Some(peer) = state.connecting {
        let peer = to_sd(peer);
        let whitelist = [&peer];
        let config = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                ..Default::default()
            },
            ..Default::default()
        };
        return central::connect(sd, &config).await.map_err(CentralError::Connect);
    }

    let Some(params) = state.scanning else {
        return core::future::pending().await;
    };
    let config = central::ScanConfig {
        active: params.active,
        interval: units(params.interval_us),
        window: units(params.window_us),
        ..Default::default()
    };
    let result = central::scan(sd, &config, |params| {
        let data =
            unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        let mut adv = AdvData::new();
        let _ = adv.extend_from_slice(&data[..data.len().min(adv.capacity())]);
        link.emit(RadioEvent::ScanResult(ScanReport {
            addr: from_sd(SdAddress::from_raw(params.peer_addr)),
            adv_type: params.type_.connectable() as u8,
            rssi: params.rssi,
            data: adv,
        }));
        None::<()>
    })
    .await;
    match result {
        Ok(()) => core::future::pending().await,
        Err(e) => Err(CentralError::Scan(e)),
    }
}

/// Resolves when the current link closes. Serves the GATT table while we
/// are the peripheral.
async fn serve(server: &'static Server, state: &State, link: &RadioLink) {
    match &state.link {
        None => core::future::pending().await,
        Some((conn, LinkSide::Peripheral)) => {
            let conn_handle = handle_of(conn);
            let rx = AttrHandle(server.nus.rx_value_handle);
            let _ = gatt_server::run(conn, server, |event| match event {
                ServerEvent::Nus(NusServiceEvent::RxWrite(value)) => {
                    link.rx_value.lock(|slot| *slot.borrow_mut() = value);
                    link.emit(RadioEvent::ServerWrite {
                        conn: conn_handle,
                        attr: rx,
                    });
                }
                ServerEvent::Nus(NusServiceEvent::TxCccdWrite { notifications }) => {
                    debug!("radio: notifications {}", notifications);
                }
            })
            .await;
        }
        Some((conn, LinkSide::Central)) => {
            while conn.is_connected() {
                Timer::after(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn execute(state: &mut State, command: RadioCommand, link: &RadioLink) {
    debug!("radio: {}", command);
    match command {
        RadioCommand::Advertise { data, interval_us } => {
            state.advertising = Some((data, interval_us));
        }
        RadioCommand::StopAdvertising => state.advertising = None,
        RadioCommand::ScanStart(params) => state.scanning = Some(params),
        RadioCommand::ScanStop => {
            if state.scanning.take().is_some() {
                link.emit(RadioEvent::ScanDone);
            }
        }
        RadioCommand::Connect(peer) => state.connecting = Some(peer),
        RadioCommand::CancelConnect => state.connecting = None,
        RadioCommand::Disconnect(handle) => {
            if let Some(conn) = state.conn(handle) {
                if conn.disconnect().is_err() {
                    debug!("radio: already disconnected");
                }
            }
        }
        RadioCommand::DiscoverServices { conn, uuid } => {
            let status = match state.conn(conn) {
                Some(c) if uuid == nus::SERVICE_UUID => {
                    match gatt_client::discover::<NusClient>(c).await {
                        Ok(client) => {
                            state.client = Some(client);
                            link.emit(RadioEvent::ServiceResult {
                                conn,
                                range: HandleRange::ALL,
                                uuid,
                            });
                            0
                        }
                        Err(_) => STATUS_ATTRIBUTE_NOT_FOUND,
                    }
                }
                Some(_) => STATUS_ATTRIBUTE_NOT_FOUND,
                None => STATUS_UNKNOWN,
            };
            link.emit(RadioEvent::ServiceDone { conn, status });
        }
        RadioCommand::DiscoverCharacteristics { conn, uuid, .. } => {
            if let Some(client) = &state.client {
                let found = if uuid == nus::RX_UUID {
                    Some((client.rx_value_handle, PROP_WRITE))
                } else if uuid == nus::TX_UUID {
                    Some((client.tx_value_handle, PROP_NOTIFY))
                } else {
                    None
                };
                if let Some((value_handle, properties)) = found {
                    link.emit(RadioEvent::CharacteristicResult {
                        conn,
                        info: CharacteristicInfo {
                            def_handle: AttrHandle(value_handle.saturating_sub(1)),
                            value_handle: AttrHandle(value_handle),
                            properties,
                            uuid,
                        },
                    });
                }
            }
            let status = if state.client.is_some() { 0 } else { STATUS_UNKNOWN };
            link.emit(RadioEvent::CharacteristicDone { conn, status });
        }
        RadioCommand::DiscoverDescriptors { conn, .. } => {
            let status = match &state.client {
                Some(client) => {
                    link.emit(RadioEvent::DescriptorResult {
                        conn,
                        handle: AttrHandle(client.tx_cccd_handle),
                        uuid: CCCD_UUID,
                    });
                    0
                }
                None => STATUS_UNKNOWN,
            };
            link.emit(RadioEvent::DescriptorDone { conn, status });
        }
        RadioCommand::Read { conn, value_handle } => {
            let mut buf = [0u8; ATT_VALUE_LEN];
            let status = match state.conn(conn) {
                Some(c) => match gatt_client::read(c, value_handle.0, &mut buf).await {
                    Ok(n) => {
                        let mut data = AttValue::new();
                        let _ = data.extend_from_slice(&buf[..n.min(buf.len())]);
                        link.emit(RadioEvent::ReadResult {
                            conn,
                            value_handle,
                            data,
                        });
                        0
                    }
                    Err(_) => STATUS_UNKNOWN,
                },
                None => STATUS_UNKNOWN,
            };
            link.emit(RadioEvent::ReadDone {
                conn,
                value_handle,
                status,
            });
        }
        RadioCommand::Write {
            conn,
            value_handle,
            data,
        } => {
            let status = match state.conn(conn) {
                Some(c) => match gatt_client::write(c, value_handle.0, &data).await {
                    Ok(()) => 0,
                    Err(_) => STATUS_UNKNOWN,
                },
                None => STATUS_UNKNOWN,
            };
            link.emit(RadioEvent::WriteDone {
                conn,
                value_handle,
                status,
            });
        }
        RadioCommand::Notify {
            conn,
            value_handle,
            data,
        } => {
            if let Some(c) = state.conn(conn) {
                if gatt_server::notify_value(c, value_handle.0, &data).is_err() {
                    warn!("radio: notify failed");
                }
            }
        }
    }
}
