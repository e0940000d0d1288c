//! Connection orchestrator state machine
//!
//! Drives the full hardware-wallet connection lifecycle: permission request,
//! device discovery, transport session, account derivation, and the automatic
//! retry loop. External collaborators observe progress through
//! [`Connector::watch_state`] and never mutate it.
//!
//! ```text
//! Init --start()--> RequestingPermission
//! RequestingPermission --granted--> AwaitingDevice
//! RequestingPermission --denied--> PermissionDenied
//! PermissionDenied --retry_permission()--> RequestingPermission
//! AwaitingDevice --no device--> PermissionDenied
//! AwaitingDevice --derivation ok--> Succeeded
//! AwaitingDevice --session/derivation error--> Failed
//! Failed --after RETRY_DELAY_MS, automatically--> AwaitingDevice
//! ```

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::hub::DeviceHub;
use crate::retry::RetryTicket;
use crate::types::{DEFAULT_ACCOUNT_INDICES, DerivedWallet, RETRY_DELAY_MS};

/// Connection lifecycle state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created, nothing started yet.
    Init,
    /// Waiting on the user/OS authorization prompt.
    RequestingPermission,
    /// Authorization was refused, or no device was present. Recoverable via
    /// [`Connector::retry_permission`].
    PermissionDenied,
    /// Authorized; waiting for a device to appear.
    AwaitingDevice,
    /// Session open; deriving accounts.
    LoadingAccounts,
    /// The attempt failed; a retry is scheduled.
    Failed,
    /// Accounts derived; terminal.
    Succeeded,
}

enum Attempt {
    Succeeded,
    NoDevice,
    Failed,
}

/// Hardware-wallet connection orchestrator.
///
/// Owns the device hub, the current [`ConnectionState`] and, once the state
/// is [`ConnectionState::Succeeded`], the derived accounts. The `&mut self`
/// receivers on [`Connector::start`] and [`Connector::retry_permission`]
/// guarantee a single pipeline: two connection attempts cannot race.
///
/// Reaching `Succeeded` ends this component's job; what to do with the
/// result belongs to the caller.
pub struct Connector<H: DeviceHub> {
    hub: H,
    state: watch::Sender<ConnectionState>,
    indices: Vec<u32>,
    wallet: Option<DerivedWallet>,
}

impl<H: DeviceHub> Connector<H> {
    /// Creates an orchestrator deriving the default account indices.
    pub fn new(hub: H) -> Self {
        Self::with_indices(hub, DEFAULT_ACCOUNT_INDICES.to_vec())
    }

    /// Creates an orchestrator deriving the given indices, in order.
    pub fn with_indices(hub: H, indices: Vec<u32>) -> Self {
        Self {
            hub,
            state: watch::Sender::new(ConnectionState::Init),
            indices,
            wallet: None,
        }
    }

    /// Current lifecycle state.
    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Derived accounts; `Some` exactly when the state is `Succeeded`.
    pub fn result(&self) -> Option<&DerivedWallet> {
        self.wallet.as_ref()
    }

    /// Starts the connection pipeline.
    ///
    /// No-op unless the state is `Init`, so a second call cannot spawn a
    /// duplicate pipeline. Returns once a resting state is reached:
    /// `PermissionDenied` (awaiting an explicit retry) or `Succeeded`.
    /// Transient failures retry automatically, indefinitely; abandoning the
    /// connection is done by dropping the returned future, which also
    /// cancels any scheduled retry.
    pub async fn start(&mut self) {
        if self.current_state() != ConnectionState::Init {
            debug!("start ignored: connection already in progress");
            return;
        }
        self.request_permission().await;
    }

    /// Re-runs the permission request after a denial.
    ///
    /// No-op unless the state is `PermissionDenied`.
    pub async fn retry_permission(&mut self) {
        if self.current_state() != ConnectionState::PermissionDenied {
            debug!(
                "retry_permission ignored in state {:?}",
                self.current_state()
            );
            return;
        }
        self.request_permission().await;
    }

    async fn request_permission(&mut self) {
        self.transition(ConnectionState::RequestingPermission);
        match self.hub.request_access().await {
            Ok(()) => {
                info!("device access granted");
                self.run_attempts().await;
            }
            Err(e) => {
                info!("device access not granted: {e}");
                self.transition(ConnectionState::PermissionDenied);
            }
        }
    }

    /// Attempt loop: one `attempt_connection` per entry into
    /// `AwaitingDevice`, re-entered by each fired retry ticket.
    async fn run_attempts(&mut self) {
        loop {
            self.transition(ConnectionState::AwaitingDevice);
            match self.attempt_connection().await {
                Attempt::Succeeded | Attempt::NoDevice => return,
                Attempt::Failed => {
                    self.transition(ConnectionState::Failed);
                    let ticket = RetryTicket::after(Duration::from_millis(RETRY_DELAY_MS));
                    ticket.fired().await;
                }
            }
        }
    }

    async fn attempt_connection(&mut self) -> Attempt {
        match self.hub.list_devices().await {
            Ok(devices) if devices.is_empty() => {
                debug!("no compatible device present");
                self.transition(ConnectionState::PermissionDenied);
                return Attempt::NoDevice;
            }
            Ok(devices) => debug!("{} device(s) reachable", devices.len()),
            Err(e) => {
                warn!("device enumeration failed: {e}");
                self.transition(ConnectionState::PermissionDenied);
                return Attempt::NoDevice;
            }
        }

        match self.load_accounts().await {
            Ok(wallet) => {
                info!("derived {} account(s)", wallet.accounts().len());
                self.wallet = Some(wallet);
                self.transition(ConnectionState::Succeeded);
                Attempt::Succeeded
            }
            Err(e) => {
                if !e.is_benign_race() {
                    warn!("connection attempt failed: {e}");
                }
                Attempt::Failed
            }
        }
    }

    /// Opens a session, derives accounts, and releases the session on both
    /// the success and the error path.
    async fn load_accounts(&mut self) -> Result<DerivedWallet> {
        let mut session = self.hub.open_session().await?;
        self.transition(ConnectionState::LoadingAccounts);
        match self.hub.derive_accounts(&mut session, &self.indices).await {
            Ok(wallet) => {
                self.hub.close_session(session).await?;
                Ok(wallet)
            }
            Err(e) => {
                if let Err(close_err) = self.hub.close_session(session).await {
                    debug!("transport release after failure also failed: {close_err}");
                }
                Err(e)
            }
        }
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("connection state {previous:?} -> {next:?}");
        }
    }
}
