//! Rust client for connecting Ledger hardware wallets and discovering Gno
//! accounts.
//!
//! The core of the crate is a deterministic connection orchestrator: it
//! requests permission for the device class, waits for a device to appear,
//! opens a transport session, derives accounts at a fixed set of derivation
//! indices, and recovers from transient failures with an automatic retry
//! loop. UI layers observe the lifecycle through a state subscription and
//! only ever act on the final result.
//!
//! # Examples
//!
//! ```no_run
//! use ledger_gno::{ConnectionState, Connector, DeviceHub};
//!
//! async fn connect<H: DeviceHub>(hub: H) {
//!     let mut connector = Connector::new(hub);
//!     connector.start().await;
//!
//!     match connector.current_state() {
//!         ConnectionState::Succeeded => {
//!             let wallet = connector.result().expect("succeeded implies accounts");
//!             for account in wallet.accounts() {
//!                 println!("{}: {}", account.index, account.address);
//!             }
//!         }
//!         ConnectionState::PermissionDenied => {
//!             // Surface a retry action to the user; retry_permission()
//!             // re-runs the request.
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! With the `usb` feature enabled, `UsbHub` provides the hidapi-backed
//! device hub for physical Ledger devices.

pub mod apdu;
mod connector;
mod deriver;
mod error;
mod hub;
mod retry;
mod types;
#[cfg(feature = "usb")]
mod usb;

pub use apdu::ApduTransport;
pub use connector::{ConnectionState, Connector};
pub use deriver::{AppSigner, account_path, derive_accounts};
pub use error::{Error, Result};
pub use hub::DeviceHub;
pub use types::{
    ACCOUNT_HRP, APDU_TIMEOUT_MS, COIN_TYPE, DEFAULT_ACCOUNT_INDICES, DerivedAccount,
    DerivedWallet, DeviceDescriptor, LEDGER_HID_USAGE_PAGE, LEDGER_USB_VID, RETRY_DELAY_MS,
};
#[cfg(feature = "usb")]
pub use usb::{UsbHub, UsbSession};
