//! The contract between the session and the underlying BLE stack.
//!
//! Every method only *issues* an operation; outcomes come back later as
//! [`RadioEvent`](crate::ble::RadioEvent)s. Implementations must not block.

use crate::ble::{Address, AttrHandle, ConnHandle, HandleRange, NusHandles, Uuid};
use crate::config::{SCAN_INTERVAL_US, SCAN_WINDOW_US};
use crate::error::RadioError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    pub interval_us: u32,
    pub window_us: u32,
    /// Request scan responses.
    pub active: bool,
}

impl Default for ScanParams {
    /// Continuous active scan.
    fn default() -> Self {
        Self {
            interval_us: SCAN_INTERVAL_US,
            window_us: SCAN_WINDOW_US,
            active: true,
        }
    }
}

pub trait Radio {
    /// Start (or restart) connectable advertising with `adv_data`.
    fn advertise(&mut self, adv_data: &[u8], interval_us: u32) -> Result<(), RadioError>;

    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Scan until [`Radio::scan_stop`]. Each advertisement arrives as a
    /// `ScanResult`; stopping yields `ScanDone`.
    fn scan_start(&mut self, params: ScanParams) -> Result<(), RadioError>;

    fn scan_stop(&mut self) -> Result<(), RadioError>;

    fn connect(&mut self, peer: Address) -> Result<(), RadioError>;

    fn cancel_connect(&mut self) -> Result<(), RadioError>;

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError>;

    fn discover_services(&mut self, conn: ConnHandle, uuid: Uuid) -> Result<(), RadioError>;

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
        uuid: Uuid,
    ) -> Result<(), RadioError>;

    fn discover_descriptors(&mut self, conn: ConnHandle, range: HandleRange)
        -> Result<(), RadioError>;

    fn read(&mut self, conn: ConnHandle, value_handle: AttrHandle) -> Result<(), RadioError>;

    /// Write with response.
    fn write(
        &mut self,
        conn: ConnHandle,
        value_handle: AttrHandle,
        data: &[u8],
    ) -> Result<(), RadioError>;

    fn notify(&mut self, conn: ConnHandle, value_handle: AttrHandle, data: &[u8])
        -> Result<(), RadioError>;

    /// Copy the current value of a local attribute into `buf`.
    fn local_value(&mut self, attr: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// Register the Nordic UART service in the local GATT table.
    fn register_nus(&mut self) -> Result<NusHandles, RadioError>;
}
