//! Bluetooth Low Energy subsystem.
//!
//! The radio stack (SoftDevice S140 on target, a recording fake in tests)
//! sits behind the [`radio::Radio`] trait and reports back through
//! [`RadioEvent`]s. [`session::BleSession`] applies each event to the
//! connection and discovery state as it arrives and keeps one lossy
//! pending copy for the scheduler to drain.
//!
//! 1. **Advertising** - flags + complete local name ([`adv`]).
//! 2. **GATT server** - Nordic UART service, text commands ([`nus`]).
//! 3. **GATT client** - connect, discover, write "find me" ([`client`]).

pub mod adv;
pub mod client;
pub mod discovery;
pub mod nus;
pub mod radio;
pub mod session;

use heapless::Vec;

/// Advertising / scan response payloads are at most 31 bytes.
pub const ADV_DATA_LEN: usize = 31;

/// Largest attribute value carried in an event.
pub const ATT_VALUE_LEN: usize = 20;

pub type AdvData = Vec<u8, ADV_DATA_LEN>;
pub type AttValue = Vec<u8, ATT_VALUE_LEN>;

/// Connection handle assigned by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Attribute handle in a GATT table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrHandle(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrKind {
    Public,
    Random,
}

/// Peer device address, little-endian bytes as on air.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub kind: AddrKind,
    pub bytes: [u8; 6],
}

impl Address {
    pub const fn new(kind: AddrKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Uuid16(u16),
    /// Big-endian, as written in the canonical string form.
    Uuid128([u8; 16]),
}

/// First and last handle of a discovered service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start: AttrHandle,
    pub end: AttrHandle,
}

impl HandleRange {
    /// Every handle on the peer.
    pub const ALL: HandleRange = HandleRange {
        start: AttrHandle(0x0001),
        end: AttrHandle(0xFFFF),
    };
}

/// One characteristic reported during discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicInfo {
    pub def_handle: AttrHandle,
    pub value_handle: AttrHandle,
    pub properties: u8,
    pub uuid: Uuid,
}

/// One advertisement seen while scanning.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanReport {
    pub addr: Address,
    pub adv_type: u8,
    pub rssi: i8,
    pub data: AdvData,
}

/// Characteristic handles of the local GATT server, keyed by purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NusHandles {
    /// Notify characteristic (we send).
    pub tx: AttrHandle,
    /// Write characteristic (peer sends).
    pub rx: AttrHandle,
}

/// The last kind of operation the session issued. Diagnostic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Uninitialized,
    Broadcaster,
    Observer,
    Central,
    Peripheral,
    Server,
    Client,
}

/// Everything the radio stack reports asynchronously.
///
/// "Central" events mean a central connected to us (we are the
/// peripheral); "Peripheral" events mean our own connect succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    CentralConnect { conn: ConnHandle, peer: Address },
    CentralDisconnect { conn: ConnHandle, peer: Address },
    ServerWrite { conn: ConnHandle, attr: AttrHandle },
    ServerReadRequest { conn: ConnHandle, attr: AttrHandle },
    ScanResult(ScanReport),
    ScanDone,
    PeripheralConnect { conn: ConnHandle, peer: Address },
    PeripheralDisconnect { conn: ConnHandle, peer: Address },
    ServiceResult { conn: ConnHandle, range: HandleRange, uuid: Uuid },
    ServiceDone { conn: ConnHandle, status: u16 },
    CharacteristicResult { conn: ConnHandle, info: CharacteristicInfo },
    CharacteristicDone { conn: ConnHandle, status: u16 },
    DescriptorResult { conn: ConnHandle, handle: AttrHandle, uuid: Uuid },
    DescriptorDone { conn: ConnHandle, status: u16 },
    ReadResult { conn: ConnHandle, value_handle: AttrHandle, data: AttValue },
    ReadDone { conn: ConnHandle, value_handle: AttrHandle, status: u16 },
    WriteDone { conn: ConnHandle, value_handle: AttrHandle, status: u16 },
    Notify { conn: ConnHandle, value_handle: AttrHandle, data: AttValue },
    ConnectionUpdate { conn: ConnHandle, status: u16 },
}

/// Payload-free tag of a [`RadioEvent`], for logs and matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventId {
    CentralConnect,
    CentralDisconnect,
    ServerWrite,
    ServerReadRequest,
    ScanResult,
    ScanDone,
    PeripheralConnect,
    PeripheralDisconnect,
    ServiceResult,
    ServiceDone,
    CharacteristicResult,
    CharacteristicDone,
    DescriptorResult,
    DescriptorDone,
    ReadResult,
    ReadDone,
    WriteDone,
    Notify,
    ConnectionUpdate,
}

impl EventId {
    pub fn name(self) -> &'static str {
        match self {
            EventId::CentralConnect => "Central Connect",
            EventId::CentralDisconnect => "Central Disconnect",
            EventId::ServerWrite => "S Write",
            EventId::ServerReadRequest => "S Read request",
            EventId::ScanResult => "Scan result",
            EventId::ScanDone => "Scan done",
            EventId::PeripheralConnect => "Periph connect",
            EventId::PeripheralDisconnect => "Periph disconnect",
            EventId::ServiceResult => "C Service result",
            EventId::ServiceDone => "C Service done",
            EventId::CharacteristicResult => "C Characteristic result",
            EventId::CharacteristicDone => "C Characteristic done",
            EventId::DescriptorResult => "C Descriptor result",
            EventId::DescriptorDone => "C Descriptor done",
            EventId::ReadResult => "C Read result",
            EventId::ReadDone => "C Read done",
            EventId::WriteDone => "C Write done",
            EventId::Notify => "C Notify",
            EventId::ConnectionUpdate => "C Connection update",
        }
    }
}

impl RadioEvent {
    pub fn id(&self) -> EventId {
        match self {
            RadioEvent::CentralConnect { .. } => EventId::CentralConnect,
            RadioEvent::CentralDisconnect { .. } => EventId::CentralDisconnect,
            RadioEvent::ServerWrite { .. } => EventId::ServerWrite,
            RadioEvent::ServerReadRequest { .. } => EventId::ServerReadRequest,
            RadioEvent::ScanResult(_) => EventId::ScanResult,
            RadioEvent::ScanDone => EventId::ScanDone,
            RadioEvent::PeripheralConnect { .. } => EventId::PeripheralConnect,
            RadioEvent::PeripheralDisconnect { .. } => EventId::PeripheralDisconnect,
            RadioEvent::ServiceResult { .. } => EventId::ServiceResult,
            RadioEvent::ServiceDone { .. } => EventId::ServiceDone,
            RadioEvent::CharacteristicResult { .. } => EventId::CharacteristicResult,
            RadioEvent::CharacteristicDone { .. } => EventId::CharacteristicDone,
            RadioEvent::DescriptorResult { .. } => EventId::DescriptorResult,
            RadioEvent::DescriptorDone { .. } => EventId::DescriptorDone,
            RadioEvent::ReadResult { .. } => EventId::ReadResult,
            RadioEvent::ReadDone { .. } => EventId::ReadDone,
            RadioEvent::WriteDone { .. } => EventId::WriteDone,
            RadioEvent::Notify { .. } => EventId::Notify,
            RadioEvent::ConnectionUpdate { .. } => EventId::ConnectionUpdate,
        }
    }

    /// Connection the event belongs to, if any.
    pub fn conn(&self) -> Option<ConnHandle> {
        match self {
            RadioEvent::ScanResult(_) | RadioEvent::ScanDone => None,
            RadioEvent::CentralConnect { conn, .. }
            | RadioEvent::CentralDisconnect { conn, .. }
            | RadioEvent::ServerWrite { conn, .. }
            | RadioEvent::ServerReadRequest { conn, .. }
            | RadioEvent::PeripheralConnect { conn, .. }
            | RadioEvent::PeripheralDisconnect { conn, .. }
            | RadioEvent::ServiceResult { conn, .. }
            | RadioEvent::ServiceDone { conn, .. }
            | RadioEvent::CharacteristicResult { conn, .. }
            | RadioEvent::CharacteristicDone { conn, .. }
            | RadioEvent::DescriptorResult { conn, .. }
            | RadioEvent::DescriptorDone { conn, .. }
            | RadioEvent::ReadResult { conn, .. }
            | RadioEvent::ReadDone { conn, .. }
            | RadioEvent::WriteDone { conn, .. }
            | RadioEvent::Notify { conn, .. }
            | RadioEvent::ConnectionUpdate { conn, .. } => Some(*conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_ids() {
        assert_eq!(RadioEvent::ScanDone.id().name(), "Scan done");
        let ev = RadioEvent::ServiceDone {
            conn: ConnHandle(1),
            status: 0,
        };
        assert_eq!(ev.id(), EventId::ServiceDone);
        assert_eq!(ev.conn(), Some(ConnHandle(1)));
        assert_eq!(RadioEvent::ScanDone.conn(), None);
    }

    #[test]
    fn full_range_covers_every_handle() {
        assert_eq!(HandleRange::ALL.start, AttrHandle(1));
        assert_eq!(HandleRange::ALL.end, AttrHandle(0xFFFF));
    }
}
