//! USB HID transport backend for Ledger devices

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use log::{debug, info};

use crate::apdu::{self, ApduTransport, REPORT_SIZE, Reassembler};
use crate::deriver;
use crate::error::{Error, Result};
use crate::hub::DeviceHub;
use crate::types::{
    APDU_TIMEOUT_MS, DerivedWallet, DeviceDescriptor, LEDGER_HID_USAGE_PAGE, LEDGER_USB_VID,
};

/// [`DeviceHub`] backend over USB HID.
///
/// Tracks session exclusivity itself: opening a second session while one is
/// outstanding fails with `Error::SessionAlreadyOpen` rather than relying on
/// platform-specific open errors.
pub struct UsbHub {
    api: Option<HidApi>,
    session_open: bool,
}

/// One open HID channel to a Ledger device.
pub struct UsbSession {
    device: HidDevice,
    descriptor: DeviceDescriptor,
}

impl UsbHub {
    pub fn new() -> Self {
        Self {
            api: None,
            session_open: false,
        }
    }

    fn api(&mut self) -> Result<&mut HidApi> {
        if self.api.is_none() {
            self.api = Some(HidApi::new()?);
        }
        match self.api.as_mut() {
            Some(api) => Ok(api),
            None => Err(Error::Transport("HID backend unavailable".to_string())),
        }
    }

    fn ledger_devices(api: &HidApi) -> Vec<&hidapi::DeviceInfo> {
        api.device_list()
            .filter(|d| {
                d.vendor_id() == LEDGER_USB_VID
                    && (d.usage_page() == LEDGER_HID_USAGE_PAGE || d.interface_number() == 0)
            })
            .collect()
    }

    fn describe(info: &hidapi::DeviceInfo) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            product: info.product_string().map(str::to_string),
            serial: info.serial_number().map(str::to_string),
        }
    }
}

impl Default for UsbHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceHub for UsbHub {
    type Session = UsbSession;

    async fn request_access(&mut self) -> Result<()> {
        let api = self.api()?;
        api.refresh_devices()?;
        let Some(device_info) = Self::ledger_devices(api).into_iter().next() else {
            return Err(Error::DeviceNotFound);
        };
        let path = device_info.path().to_owned();

        // Probe-open to validate the grant, then release immediately.
        let probe = api
            .open_path(&path)
            .map_err(|e| Error::Permission(e.to_string()))?;
        drop(probe);
        info!("device access validated");
        Ok(())
    }

    async fn list_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let api = self
            .api()
            .map_err(|e| Error::Discovery(e.to_string()))?;
        api.refresh_devices()
            .map_err(|e| Error::Discovery(e.to_string()))?;
        Ok(Self::ledger_devices(api)
            .into_iter()
            .map(Self::describe)
            .collect())
    }

    async fn open_session(&mut self) -> Result<UsbSession> {
        if self.session_open {
            return Err(Error::SessionAlreadyOpen);
        }
        let api = self.api()?;
        api.refresh_devices()?;
        let Some(device_info) = Self::ledger_devices(api).into_iter().next() else {
            return Err(Error::DeviceNotFound);
        };
        let descriptor = Self::describe(device_info);
        let path = device_info.path().to_owned();

        let device = api.open_path(&path)?;
        self.session_open = true;
        debug!("transport session opened: {:?}", descriptor.product);
        Ok(UsbSession { device, descriptor })
    }

    async fn close_session(&mut self, session: UsbSession) -> Result<()> {
        // hidapi releases the handle on drop.
        drop(session);
        self.session_open = false;
        debug!("transport session closed");
        Ok(())
    }

    async fn derive_accounts(
        &mut self,
        session: &mut UsbSession,
        indices: &[u32],
    ) -> Result<DerivedWallet> {
        let accounts = deriver::derive_accounts(session, indices)?;
        Ok(DerivedWallet::new(session.descriptor.clone(), accounts))
    }
}

impl ApduTransport for UsbSession {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        for report in apdu::frame_request(apdu::CHANNEL, request) {
            // Leading report id byte, as required by HID.
            let mut buf = [0u8; REPORT_SIZE + 1];
            buf[1..].copy_from_slice(&report);
            self.device.write(&buf)?;
        }

        let mut reassembler = Reassembler::new(apdu::CHANNEL);
        loop {
            let mut report = [0u8; REPORT_SIZE];
            let n = self.device.read_timeout(&mut report, APDU_TIMEOUT_MS)?;
            if n == 0 {
                return Err(Error::Transport(
                    "timed out waiting for device response".to_string(),
                ));
            }
            if reassembler.push(&report[..n])? {
                return Ok(reassembler.into_payload());
            }
        }
    }
}
