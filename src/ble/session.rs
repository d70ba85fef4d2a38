//! BLE session state machine.
//!
//! [`BleSession::on_radio_event`] runs in the stack's callback context
//! and applies structural changes (connection, scan, discovery cursor)
//! at once. It also stamps a single pending copy of the event, which the
//! scheduler drains later for logging and application logic. A second
//! event before the drain overwrites the first.

use heapless::String;

use crate::ble::adv;
use crate::ble::discovery::{DiscoveryCursor, DiscoveryPhase, Step};
use crate::ble::nus::{self, Message};
use crate::ble::radio::{Radio, ScanParams};
use crate::ble::{
    Address, AttValue, AttrHandle, ConnHandle, NusHandles, RadioEvent, Role, ScanReport, Uuid,
    ATT_VALUE_LEN,
};
use crate::config::ADV_INTERVAL_US;
use crate::error::{DiscoveryError, Error, Result};
use crate::Millis;

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Which side of the link we are on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkSide {
    /// A central connected to us.
    Peripheral,
    /// We connected to a peripheral.
    Central,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Link {
    pub conn: ConnHandle,
    pub peer: Address,
    pub side: LinkSide,
}

/// What the status LED should be doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    /// Disconnected.
    Blinking,
    /// Connected.
    Off,
}

/// Advertising behaviour around connection changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Re-advertise when a central drops us.
    pub readvertise_on_disconnect: bool,
    /// Keep advertising while a central is connected.
    pub advertise_while_connected: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            readvertise_on_disconnect: true,
            advertise_while_connected: false,
        }
    }
}

pub struct BleSession {
    name: String<32>,
    role: Role,
    policy: ReconnectPolicy,

    link: Option<Link>,
    advertising: bool,
    scanning: bool,
    last_scan: Option<ScanReport>,
    scan_count: u32,

    nus: Option<NusHandles>,
    cursor: Option<DiscoveryCursor>,
    discovery_failure: Option<DiscoveryError>,
    write_status: Option<u16>,
    last_read: Option<(AttrHandle, AttValue)>,
    last_notify: Option<(AttrHandle, AttValue)>,
    message: Option<Message>,

    pending: Option<RadioEvent>,
    disconnect_at: Option<(ConnHandle, Millis)>,
}

impl BleSession {
    pub fn new(name: &str) -> Self {
        Self::with_policy(name, ReconnectPolicy::default())
    }

    pub fn with_policy(name: &str, policy: ReconnectPolicy) -> Self {
        let mut n = String::new();
        for ch in name.chars() {
            if n.push(ch).is_err() {
                break;
            }
        }
        Self {
            name: n,
            role: Role::Uninitialized,
            policy,
            link: None,
            advertising: false,
            scanning: false,
            last_scan: None,
            scan_count: 0,
            nus: None,
            cursor: None,
            discovery_failure: None,
            write_status: None,
            last_read: None,
            last_notify: None,
            message: None,
            pending: None,
            disconnect_at: None,
        }
    }

    fn set_role(&mut self, role: Role) {
        if self.role != role {
            debug!("ble role: {} -> {}", self.role, role);
            self.role = role;
        }
    }

    fn require_link(&self) -> Result<Link> {
        self.link.ok_or(Error::NotConnected)
    }

    // Operations

    /// Register the UART service and remember its handles.
    pub fn register(&mut self, radio: &mut impl Radio) -> Result<NusHandles> {
        self.set_role(Role::Server);
        let handles = radio.register_nus()?;
        self.nus = Some(handles);
        Ok(handles)
    }

    /// Advertise our name, connectable.
    pub fn advertise(&mut self, radio: &mut impl Radio) -> Result<()> {
        self.set_role(Role::Broadcaster);
        let data = adv::build(&self.name);
        radio.advertise(&data, ADV_INTERVAL_US)?;
        self.advertising = true;
        Ok(())
    }

    pub fn stop_advertising(&mut self, radio: &mut impl Radio) -> Result<()> {
        self.set_role(Role::Broadcaster);
        radio.stop_advertising()?;
        self.advertising = false;
        Ok(())
    }

    /// Start a continuous scan. Resets the result counter.
    pub fn scan(&mut self, radio: &mut impl Radio) -> Result<()> {
        self.set_role(Role::Observer);
        self.scan_count = 0;
        radio.scan_start(ScanParams::default())?;
        self.scanning = true;
        Ok(())
    }

    pub fn stop_scan(&mut self, radio: &mut impl Radio) -> Result<()> {
        self.set_role(Role::Observer);
        radio.scan_stop()?;
        self.scanning = false;
        Ok(())
    }

    /// Connect to `peer`. The scan is stopped once the request is issued.
    pub fn connect(&mut self, radio: &mut impl Radio, peer: Address) -> Result<()> {
        self.set_role(Role::Central);
        radio.connect(peer)?;
        if self.scanning {
            // The connect is already in flight, so its link must still be driven.
            if let Err(e) = radio.scan_stop() {
                warn!("ble: scan stop after connect failed: {}", e);
            }
            self.scanning = false;
        }
        Ok(())
    }

    pub fn cancel_connect(&mut self, radio: &mut impl Radio) -> Result<()> {
        self.set_role(Role::Central);
        radio.cancel_connect()?;
        Ok(())
    }

    /// Drop the current link.
    pub fn disconnect(&mut self, radio: &mut impl Radio) -> Result<()> {
        let link = self.require_link()?;
        self.set_role(Role::Central);
        self.disconnect_at = None;
        radio.disconnect(link.conn)?;
        Ok(())
    }

    /// Disconnect at `at` from [`BleSession::housekeeping`], without
    /// blocking the loop in between.
    pub fn schedule_disconnect(&mut self, at: Millis) -> Result<()> {
        let link = self.require_link()?;
        self.disconnect_at = Some((link.conn, at));
        Ok(())
    }

    /// Start discovery of service `uuid` on the current link.
    pub fn discover_service(&mut self, radio: &mut impl Radio, uuid: Uuid) -> Result<()> {
        let link = self.require_link()?;
        self.set_role(Role::Client);
        self.discovery_failure = None;
        self.cursor = Some(DiscoveryCursor::services(link.conn, uuid));
        radio.discover_services(link.conn, uuid)?;
        Ok(())
    }

    /// Look for `uuid` inside the service found by the previous step.
    pub fn discover_characteristic(&mut self, radio: &mut impl Radio, uuid: Uuid) -> Result<()> {
        let mut cursor = self.cursor.ok_or(Error::NoDiscovery)?;
        let range = cursor.begin_characteristics(uuid)?;
        self.set_role(Role::Client);
        radio.discover_characteristics(cursor.conn(), range, uuid)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    pub fn discover_descriptors(&mut self, radio: &mut impl Radio) -> Result<()> {
        let mut cursor = self.cursor.ok_or(Error::NoDiscovery)?;
        let range = cursor.begin_descriptors()?;
        self.set_role(Role::Client);
        radio.discover_descriptors(cursor.conn(), range)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Write to an explicit handle on the current link.
    pub fn write(
        &mut self,
        radio: &mut impl Radio,
        value_handle: AttrHandle,
        data: &[u8],
    ) -> Result<()> {
        let link = self.require_link()?;
        self.set_role(Role::Client);
        self.write_status = None;
        radio.write(link.conn, value_handle, data)?;
        Ok(())
    }

    /// Write to the characteristic the cursor resolved.
    pub fn write_discovered(&mut self, radio: &mut impl Radio, data: &[u8]) -> Result<()> {
        let info = self
            .cursor
            .as_ref()
            .and_then(DiscoveryCursor::characteristic)
            .ok_or(Error::NoDiscovery)?;
        self.write(radio, info.value_handle, data)
    }

    pub fn read(&mut self, radio: &mut impl Radio, value_handle: AttrHandle) -> Result<()> {
        let link = self.require_link()?;
        self.set_role(Role::Client);
        radio.read(link.conn, value_handle)?;
        Ok(())
    }

    /// Notify `text` plus a newline on the UART TX characteristic.
    pub fn send(&mut self, radio: &mut impl Radio, text: &str) -> Result<()> {
        let handles = self.nus.ok_or(Error::NotRegistered)?;
        let packet = nus::encode(text)?;
        self.set_role(Role::Server);
        let link = self.require_link()?;
        radio.notify(link.conn, handles.tx, &packet)?;
        Ok(())
    }

    /// Periodic work: issue a due scheduled disconnect.
    ///
    /// Returns `true` if a disconnect was issued.
    pub fn housekeeping(&mut self, now: Millis, radio: &mut impl Radio) -> bool {
        let Some((conn, at)) = self.disconnect_at else {
            return false;
        };
        if now < at {
            return false;
        }
        self.disconnect_at = None;
        if self.link.map(|l| l.conn) != Some(conn) {
            return false;
        }
        self.set_role(Role::Central);
        match radio.disconnect(conn) {
            Ok(()) => true,
            Err(e) => {
                warn!("scheduled disconnect failed: {}", e);
                false
            }
        }
    }

    // Callback side

    /// Apply one event from the radio stack.
    pub fn on_radio_event(&mut self, event: RadioEvent, radio: &mut impl Radio) {
        if let Some(lost) = self.pending.replace(event.clone()) {
            debug!("ble: pending {} overwritten", lost.id().name());
        }

        match event {
            RadioEvent::CentralConnect { conn, peer } => {
                self.connected(conn, peer, LinkSide::Peripheral);
                // The stack stops advertising on connect.
                self.advertising = false;
                if self.policy.advertise_while_connected {
                    self.readvertise(radio);
                }
            }
            RadioEvent::PeripheralConnect { conn, peer } => {
                self.connected(conn, peer, LinkSide::Central);
            }
            RadioEvent::CentralDisconnect { conn, .. } => {
                if self.disconnected(conn) && self.policy.readvertise_on_disconnect {
                    self.readvertise(radio);
                }
            }
            RadioEvent::PeripheralDisconnect { conn, .. } => {
                let _ = self.disconnected(conn);
            }
            RadioEvent::ServerWrite { attr, .. } => {
                if self.nus.map(|h| h.rx) == Some(attr) {
                    let mut buf = [0u8; ATT_VALUE_LEN];
                    match radio.local_value(attr, &mut buf) {
                        Ok(n) => {
                            let message = nus::decode(&buf[..n.min(buf.len())]);
                            debug!("ble: received [{}]", message.as_str());
                            self.message = Some(message);
                        }
                        Err(e) => warn!("ble: rx read failed: {}", e),
                    }
                }
            }
            RadioEvent::ServerReadRequest { .. } | RadioEvent::ConnectionUpdate { .. } => {}
            RadioEvent::ScanResult(report) => {
                self.scan_count = self.scan_count.wrapping_add(1);
                self.last_scan = Some(report);
            }
            RadioEvent::ScanDone => {
                self.scanning = false;
                self.scan_count = 0;
            }
            RadioEvent::ReadResult {
                value_handle, data, ..
            } => {
                self.last_read = Some((value_handle, data));
            }
            RadioEvent::Notify {
                value_handle, data, ..
            } => {
                self.last_notify = Some((value_handle, data));
            }
            RadioEvent::ReadDone { status, .. } => {
                if status != 0 {
                    warn!("ble: read failed, status {}", status);
                }
            }
            RadioEvent::WriteDone { conn, status, .. } => {
                if self.link.map(|l| l.conn) == Some(conn) {
                    self.write_status = Some(status);
                }
            }
            ref discovery @ (RadioEvent::ServiceResult { .. }
            | RadioEvent::ServiceDone { .. }
            | RadioEvent::CharacteristicResult { .. }
            | RadioEvent::CharacteristicDone { .. }
            | RadioEvent::DescriptorResult { .. }
            | RadioEvent::DescriptorDone { .. }) => {
                self.apply_discovery(discovery);
            }
        }
    }

    fn apply_discovery(&mut self, event: &RadioEvent) {
        let Some(cursor) = self.cursor.as_mut() else {
            return;
        };
        if let Step::Failed(e) = cursor.apply(event) {
            warn!("ble: discovery failed: {}", e);
            self.cursor = None;
            self.discovery_failure = Some(e);
        }
    }

    fn connected(&mut self, conn: ConnHandle, peer: Address, side: LinkSide) {
        self.link = Some(Link { conn, peer, side });
        self.discovery_failure = None;
        self.write_status = None;
    }

    /// Returns `false` when `conn` is not the current link.
    fn disconnected(&mut self, conn: ConnHandle) -> bool {
        if self.link.map(|l| l.conn) != Some(conn) {
            debug!("ble: disconnect for unknown link {}", conn.0);
            return false;
        }
        self.link = None;
        // Handles are reused, so nothing discovered survives the link.
        self.cursor = None;
        if let Some((pending, _)) = self.disconnect_at {
            if pending == conn {
                self.disconnect_at = None;
            }
        }
        true
    }

    fn readvertise(&mut self, radio: &mut impl Radio) {
        if let Err(e) = self.advertise(radio) {
            warn!("ble: re-advertise failed: {}", e);
        }
    }

    // Scheduler side

    /// Take the buffered event, at most once.
    pub fn take_pending(&mut self) -> Option<RadioEvent> {
        self.pending.take()
    }

    /// Take the most recent scan result, at most once.
    pub fn take_scan_result(&mut self) -> Option<ScanReport> {
        self.last_scan.take()
    }

    /// Take the latest text written to the UART RX characteristic.
    pub fn take_message(&mut self) -> Option<Message> {
        self.message.take()
    }

    /// Take the reason the last discovery chain ended in failure.
    pub fn take_discovery_failure(&mut self) -> Option<DiscoveryError> {
        self.discovery_failure.take()
    }

    /// Take the status of the last acknowledged write on this link.
    pub fn take_write_status(&mut self) -> Option<u16> {
        self.write_status.take()
    }

    pub fn take_read(&mut self) -> Option<(AttrHandle, AttValue)> {
        self.last_read.take()
    }

    pub fn take_notification(&mut self) -> Option<(AttrHandle, AttValue)> {
        self.last_notify.take()
    }

    // Accessors

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn link(&self) -> Option<Link> {
        self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn has_scan_result(&self) -> bool {
        self.last_scan.is_some()
    }

    pub fn scan_count(&self) -> u32 {
        self.scan_count
    }

    /// Scan activity spinner, one step per result.
    pub fn spinner(&self) -> char {
        SPINNER[(self.scan_count % SPINNER.len() as u32) as usize]
    }

    pub fn nus(&self) -> Option<NusHandles> {
        self.nus
    }

    pub fn discovery(&self) -> Option<DiscoveryPhase> {
        self.cursor.map(|c| c.phase())
    }

    pub fn cursor(&self) -> Option<&DiscoveryCursor> {
        self.cursor.as_ref()
    }

    pub fn indicator(&self) -> Indicator {
        if self.is_connected() {
            Indicator::Off
        } else {
            Indicator::Blinking
        }
    }

    pub fn disconnect_due(&self) -> Option<Millis> {
        self.disconnect_at.map(|(_, at)| at)
    }
}
