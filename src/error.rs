//! Error types for ledger-gno

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("device access not granted: {0}")]
    Permission(String),

    #[error("device enumeration failed: {0}")]
    Discovery(String),

    #[error("no Ledger device found")]
    DeviceNotFound,

    #[error("the device is already open")]
    SessionAlreadyOpen,

    #[error("transport error: {0}")]
    Transport(String),

    #[cfg(feature = "usb")]
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("account derivation failed at index {index}: {reason}")]
    Derivation { index: u32, reason: String },

    #[error("device returned status {0:#06x}")]
    DeviceStatus(u16),

    #[error("invalid response from device")]
    InvalidResponse,
}

impl Error {
    /// True for the session-already-open race. The orchestrator keeps it out
    /// of the logs but still schedules a retry, the same recovery path as any
    /// other attempt failure.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Error::SessionAlreadyOpen)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
