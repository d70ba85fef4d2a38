//! Unified error type for the Quadcorder firmware.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The radio stack rejected or failed an operation.
    Radio(RadioError),

    /// The operation needs a live connection and there is none.
    NotConnected,

    /// A discovery step was requested with no discovery in progress.
    NoDiscovery,

    /// A discovery phase ended without the handle we asked for.
    Discovery(DiscoveryError),

    /// The GATT server has not been registered yet.
    NotRegistered,

    /// Outgoing message does not fit in one NUS packet.
    MessageTooLong,

    // Navigation
    /// Entered code is not in the target table.
    UnknownTarget,

    // Generic
    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Subset of radio-stack failures we propagate (keeps the enum `Copy`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Raw error code from the stack.
    Raw(u32),
    /// The stack is busy with a conflicting operation.
    Busy,
    /// The command queue to the stack is full.
    QueueFull,
    /// The connection or attribute handle is not known to the stack.
    InvalidHandle,
}

/// Terminal discovery failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryError {
    /// "Done" event carried a non-zero status.
    Status(u16),
    /// Status was zero but the requested UUID was never reported.
    NotFound,
}

// Convenience conversions

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Error::Radio(e)
    }
}

impl From<DiscoveryError> for Error {
    fn from(e: DiscoveryError) -> Self {
        Error::Discovery(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
