//! Device-class access seam

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DerivedWallet, DeviceDescriptor};

/// Boundary to the hardware-wallet device class.
///
/// One implementor per transport backend. The connection orchestrator drives
/// this seam and owns every session it opens; implementations never keep a
/// session alive past `close_session`.
#[async_trait]
pub trait DeviceHub: Send {
    /// Open transport channel to one device.
    type Session: Send;

    /// Requests authorization to access the device class.
    ///
    /// On success the grant holds for the process lifetime. Implementations
    /// open a transport purely to validate the grant and release it before
    /// returning; no partial state survives a failure.
    async fn request_access(&mut self) -> Result<()>;

    /// Takes a snapshot of currently reachable devices.
    ///
    /// An empty snapshot is a normal outcome, distinct from a failed query.
    /// Each call re-queries; no session is opened.
    async fn list_devices(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Opens a transport session to the first reachable device.
    ///
    /// At most one session may be open at a time; a second open while one is
    /// outstanding fails with `Error::SessionAlreadyOpen`.
    async fn open_session(&mut self) -> Result<Self::Session>;

    /// Releases a transport session.
    async fn close_session(&mut self, session: Self::Session) -> Result<()>;

    /// Derives one account per index against an open session, preserving
    /// input order. Must not retain the session past the call.
    async fn derive_accounts(
        &mut self,
        session: &mut Self::Session,
        indices: &[u32],
    ) -> Result<DerivedWallet>;
}
