//! Ledger APDU layer: HID report framing and the Cosmos-app commands
//!
//! The wire format is the Ledger HID transport: fixed 64-byte reports, each
//! carrying a channel id, a tag byte and a big-endian sequence index; the
//! first report of a message additionally carries the total payload length.

use crate::error::{Error, Result};

/// Fixed HID report size used by Ledger devices.
pub const REPORT_SIZE: usize = 64;

/// Channel identifier used for APDU traffic.
pub const CHANNEL: u16 = 0x0101;

/// Tag marking an APDU payload report.
const TAG_APDU: u8 = 0x05;

/// Cosmos app command class.
pub const CLA_COSMOS: u8 = 0x55;

/// `GET_ADDR_SECP256K1`: derive and return public key plus bech32 address.
pub const INS_GET_ADDR_SECP256K1: u8 = 0x04;

/// Status word for a successful command.
pub const SW_OK: u16 = 0x9000;

/// Status word when the user declined the request on the device.
pub const SW_USER_DECLINED: u16 = 0x6986;

// channel + tag + sequence (+ length on the first report)
const FIRST_HEADER: usize = 7;
const CONT_HEADER: usize = 5;

/// Blocking request/response exchange of a single APDU.
///
/// Implemented by transport sessions. The account deriver is generic over
/// this trait, so derivation logic can be exercised without a device.
pub trait ApduTransport {
    /// Sends one APDU and returns the raw response, status word included.
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;
}

/// Splits an APDU payload into HID reports.
pub fn frame_request(channel: u16, apdu: &[u8]) -> Vec<[u8; REPORT_SIZE]> {
    let mut reports = Vec::new();
    let mut offset = 0;
    let mut sequence: u16 = 0;

    while offset < apdu.len() || reports.is_empty() {
        let mut report = [0u8; REPORT_SIZE];
        report[0..2].copy_from_slice(&channel.to_be_bytes());
        report[2] = TAG_APDU;
        report[3..5].copy_from_slice(&sequence.to_be_bytes());

        let body = if sequence == 0 {
            report[5..7].copy_from_slice(&(apdu.len() as u16).to_be_bytes());
            &mut report[FIRST_HEADER..]
        } else {
            &mut report[CONT_HEADER..]
        };

        let take = body.len().min(apdu.len() - offset);
        body[..take].copy_from_slice(&apdu[offset..offset + take]);
        offset += take;
        sequence += 1;
        reports.push(report);
    }

    reports
}

/// Incremental reassembly of a response spread over HID reports.
pub struct Reassembler {
    channel: u16,
    expected: Option<usize>,
    next_sequence: u16,
    payload: Vec<u8>,
}

impl Reassembler {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            expected: None,
            next_sequence: 0,
            payload: Vec::new(),
        }
    }

    /// Feeds one report. Returns `true` once the full payload has arrived.
    pub fn push(&mut self, report: &[u8]) -> Result<bool> {
        if report.len() < CONT_HEADER {
            return Err(Error::InvalidResponse);
        }
        let channel = u16::from_be_bytes([report[0], report[1]]);
        let sequence = u16::from_be_bytes([report[3], report[4]]);
        if channel != self.channel || report[2] != TAG_APDU || sequence != self.next_sequence {
            return Err(Error::InvalidResponse);
        }

        let body = if sequence == 0 {
            if report.len() < FIRST_HEADER {
                return Err(Error::InvalidResponse);
            }
            let length = u16::from_be_bytes([report[5], report[6]]) as usize;
            self.expected = Some(length);
            &report[FIRST_HEADER..]
        } else {
            &report[CONT_HEADER..]
        };

        let expected = self.expected.ok_or(Error::InvalidResponse)?;
        let missing = expected - self.payload.len();
        self.payload.extend_from_slice(&body[..missing.min(body.len())]);
        self.next_sequence += 1;
        Ok(self.payload.len() == expected)
    }

    /// Consumes the reassembler, yielding the collected payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Splits a raw response into data and status word, mapping any non-OK
/// status word to an error.
pub fn expect_ok(response: &[u8]) -> Result<&[u8]> {
    if response.len() < 2 {
        return Err(Error::InvalidResponse);
    }
    let (data, sw_bytes) = response.split_at(response.len() - 2);
    let sw = u16::from_be_bytes([sw_bytes[0], sw_bytes[1]]);
    if sw != SW_OK {
        return Err(Error::DeviceStatus(sw));
    }
    Ok(data)
}

/// Encodes a `GET_ADDR_SECP256K1` command for the given HRP and BIP-32 path.
///
/// P1 is left at zero: the address is derived without on-screen confirmation.
pub fn get_addr_secp256k1(hrp: &str, path: &[u32; 5]) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + hrp.len() + path.len() * 4);
    data.push(hrp.len() as u8);
    data.extend_from_slice(hrp.as_bytes());
    for component in path {
        data.extend_from_slice(&component.to_le_bytes());
    }

    let mut apdu = vec![
        CLA_COSMOS,
        INS_GET_ADDR_SECP256K1,
        0x00,
        0x00,
        data.len() as u8,
    ];
    apdu.extend_from_slice(&data);
    apdu
}

/// Parses a `GET_ADDR_SECP256K1` response into compressed public key and
/// address.
pub fn parse_get_addr(data: &[u8]) -> Result<(&[u8], &str)> {
    if data.len() <= 33 {
        return Err(Error::InvalidResponse);
    }
    let (pubkey, address) = data.split_at(33);
    let address = std::str::from_utf8(address).map_err(|_| Error::InvalidResponse)?;
    Ok((pubkey, address))
}
