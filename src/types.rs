//! Common types used throughout ledger-gno

use serde::{Deserialize, Serialize};

/// A device visible in an enumeration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
    pub serial: Option<String>,
}

/// One account derived from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAccount {
    /// Derivation index the account was materialized at.
    pub index: u32,
    /// Bech32 address reported by the device.
    pub address: String,
    /// Hex-encoded compressed secp256k1 public key.
    pub public_key: String,
}

/// Immutable result of a successful connection: the accounts derived from one
/// device, in the order the derivation indices were supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedWallet {
    device: DeviceDescriptor,
    accounts: Vec<DerivedAccount>,
}

impl DerivedWallet {
    pub fn new(device: DeviceDescriptor, accounts: Vec<DerivedAccount>) -> Self {
        Self { device, accounts }
    }

    /// The device the accounts were derived from.
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Derived accounts, preserving derivation-index input order.
    pub fn accounts(&self) -> &[DerivedAccount] {
        &self.accounts
    }
}

/// Ledger USB vendor id.
pub const LEDGER_USB_VID: u16 = 0x2c97;

/// Vendor-defined HID usage page of the Ledger APDU interface.
pub const LEDGER_HID_USAGE_PAGE: u16 = 0xffa0;

/// Derivation indices requested when none are supplied.
pub const DEFAULT_ACCOUNT_INDICES: &[u32] = &[0, 1, 2, 3, 4];

/// Delay before a failed connection attempt is retried.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Read timeout for a single APDU exchange.
pub const APDU_TIMEOUT_MS: i32 = 5_000;

/// Bech32 human-readable prefix of derived account addresses.
pub const ACCOUNT_HRP: &str = "g";

/// BIP-44 coin type used for account paths.
pub const COIN_TYPE: u32 = 118;
