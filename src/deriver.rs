//! Account derivation against an open transport session

use log::debug;

use crate::apdu::{self, ApduTransport};
use crate::error::{Error, Result};
use crate::types::{ACCOUNT_HRP, COIN_TYPE, DerivedAccount};

const HARDENED: u32 = 0x8000_0000;

/// BIP-44 path for an account derivation index: `m/44'/118'/0'/0/index`.
pub fn account_path(index: u32) -> [u32; 5] {
    [HARDENED | 44, HARDENED | COIN_TYPE, HARDENED, 0, index]
}

/// Signer bound to an open transport session.
///
/// Borrows the session for its whole lifetime, so it cannot outlive the
/// caller's ownership of the transport.
pub struct AppSigner<'a, T: ApduTransport> {
    transport: &'a mut T,
    indices: &'a [u32],
    accounts: Vec<DerivedAccount>,
}

impl<'a, T: ApduTransport> AppSigner<'a, T> {
    /// Binds a signer to the session for the given derivation indices.
    pub fn new(transport: &'a mut T, indices: &'a [u32]) -> Self {
        Self {
            transport,
            indices,
            accounts: Vec::new(),
        }
    }

    /// Materializes one account per configured index, in input order.
    pub fn init_accounts(&mut self) -> Result<()> {
        self.accounts.clear();
        for &index in self.indices {
            let account = self.derive_one(index)?;
            debug!(
                "derived account {index}: {address}",
                address = account.address
            );
            self.accounts.push(account);
        }
        Ok(())
    }

    /// Accounts materialized by [`AppSigner::init_accounts`].
    pub fn accounts(&self) -> &[DerivedAccount] {
        &self.accounts
    }

    fn derive_one(&mut self, index: u32) -> Result<DerivedAccount> {
        let request = apdu::get_addr_secp256k1(ACCOUNT_HRP, &account_path(index));
        let response = self
            .transport
            .exchange(&request)
            .map_err(|e| derivation_error(index, &e))?;
        let data = apdu::expect_ok(&response).map_err(|e| derivation_error(index, &e))?;
        let (pubkey, address) = apdu::parse_get_addr(data)?;

        let (hrp, _data, _variant) =
            bech32::decode(address).map_err(|_| Error::InvalidResponse)?;
        if hrp != ACCOUNT_HRP {
            return Err(Error::InvalidResponse);
        }

        Ok(DerivedAccount {
            index,
            address: address.to_string(),
            public_key: hex::encode(pubkey),
        })
    }
}

fn derivation_error(index: u32, source: &Error) -> Error {
    match source {
        Error::DeviceStatus(apdu::SW_USER_DECLINED) => Error::Derivation {
            index,
            reason: "user declined on device".to_string(),
        },
        other => Error::Derivation {
            index,
            reason: other.to_string(),
        },
    }
}

/// Derives accounts for `indices` over an open session, preserving order.
pub fn derive_accounts<T: ApduTransport>(
    transport: &mut T,
    indices: &[u32],
) -> Result<Vec<DerivedAccount>> {
    let mut signer = AppSigner::new(transport, indices);
    signer.init_accounts()?;
    Ok(signer.accounts().to_vec())
}
