//! Orchestrator state machine tests, driven by a scripted in-memory hub.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledger_gno::{
    ConnectionState, Connector, DerivedAccount, DerivedWallet, DeviceDescriptor, DeviceHub, Error,
    Result,
};

/// Call counters shared between a test and its hub.
#[derive(Default)]
struct HubLog {
    access_calls: usize,
    list_calls: usize,
    open_calls: usize,
    close_calls: usize,
    derive_calls: usize,
    open_now: usize,
    open_peak: usize,
}

/// Scripted `DeviceHub`: each queue holds the outcomes of the next calls to
/// one operation; an empty queue means success with defaults.
struct ScriptedHub {
    log: Arc<Mutex<HubLog>>,
    access: VecDeque<Result<()>>,
    devices: VecDeque<Result<Vec<DeviceDescriptor>>>,
    opens: VecDeque<Result<()>>,
    derives: VecDeque<Result<()>>,
    derive_always_fails: bool,
}

struct MockSession {
    descriptor: DeviceDescriptor,
}

fn nano() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: 0x2c97,
        product_id: 0x5011,
        product: Some("Nano S Plus".to_string()),
        serial: Some("0001".to_string()),
    }
}

fn derivation_error() -> Error {
    Error::Derivation {
        index: 0,
        reason: "device rejected the request".to_string(),
    }
}

impl ScriptedHub {
    fn new() -> (Self, Arc<Mutex<HubLog>>) {
        let log = Arc::new(Mutex::new(HubLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                access: VecDeque::new(),
                devices: VecDeque::new(),
                opens: VecDeque::new(),
                derives: VecDeque::new(),
                derive_always_fails: false,
            },
            log,
        )
    }
}

#[async_trait]
impl DeviceHub for ScriptedHub {
    type Session = MockSession;

    async fn request_access(&mut self) -> Result<()> {
        self.log.lock().unwrap().access_calls += 1;
        self.access.pop_front().unwrap_or(Ok(()))
    }

    async fn list_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        self.log.lock().unwrap().list_calls += 1;
        self.devices.pop_front().unwrap_or_else(|| Ok(vec![nano()]))
    }

    async fn open_session(&mut self) -> Result<MockSession> {
        let mut log = self.log.lock().unwrap();
        log.open_calls += 1;
        self.opens.pop_front().unwrap_or(Ok(()))?;
        log.open_now += 1;
        log.open_peak = log.open_peak.max(log.open_now);
        Ok(MockSession { descriptor: nano() })
    }

    async fn close_session(&mut self, session: MockSession) -> Result<()> {
        drop(session);
        let mut log = self.log.lock().unwrap();
        log.close_calls += 1;
        log.open_now -= 1;
        Ok(())
    }

    async fn derive_accounts(
        &mut self,
        session: &mut MockSession,
        indices: &[u32],
    ) -> Result<DerivedWallet> {
        self.log.lock().unwrap().derive_calls += 1;
        if self.derive_always_fails {
            return Err(derivation_error());
        }
        self.derives.pop_front().unwrap_or(Ok(()))?;
        let accounts = indices
            .iter()
            .map(|&index| DerivedAccount {
                index,
                address: format!("g1mockaccount{index}"),
                public_key: format!("{index:066}"),
            })
            .collect();
        Ok(DerivedWallet::new(session.descriptor.clone(), accounts))
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn empty_discovery_is_permission_denied_not_failed() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.devices.push_back(Ok(vec![]));
    let mut connector = Connector::new(hub);

    connector.start().await;

    assert_eq!(connector.current_state(), ConnectionState::PermissionDenied);
    assert!(connector.result().is_none());
    let log = log.lock().unwrap();
    assert_eq!(log.list_calls, 1);
    assert_eq!(log.open_calls, 0);
}

#[tokio::test]
async fn discovery_failure_is_permission_denied() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.devices
        .push_back(Err(Error::Discovery("enumeration backend gone".into())));
    let mut connector = Connector::new(hub);

    connector.start().await;

    assert_eq!(connector.current_state(), ConnectionState::PermissionDenied);
    assert_eq!(log.lock().unwrap().open_calls, 0);
}

#[tokio::test]
async fn permission_denied_then_granted_retry_succeeds() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.access
        .push_back(Err(Error::Permission("user dismissed the prompt".into())));
    let mut connector = Connector::new(hub);

    connector.start().await;
    assert_eq!(connector.current_state(), ConnectionState::PermissionDenied);
    assert!(connector.result().is_none());

    connector.retry_permission().await;

    assert_eq!(connector.current_state(), ConnectionState::Succeeded);
    let wallet = connector.result().expect("succeeded implies a wallet");
    let indices: Vec<u32> = wallet.accounts().iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    let log = log.lock().unwrap();
    assert_eq!(log.access_calls, 2);
    assert_eq!(log.close_calls, 1);
    assert_eq!(log.open_now, 0);
}

#[tokio::test]
async fn start_is_a_no_op_outside_init() {
    init_logging();
    let (hub, log) = ScriptedHub::new();
    let mut connector = Connector::new(hub);

    connector.start().await;
    assert_eq!(connector.current_state(), ConnectionState::Succeeded);

    connector.start().await;
    connector.retry_permission().await;

    assert_eq!(connector.current_state(), ConnectionState::Succeeded);
    assert_eq!(log.lock().unwrap().access_calls, 1);
}

#[tokio::test]
async fn retry_permission_requires_a_denied_state() {
    init_logging();
    let (hub, log) = ScriptedHub::new();
    let mut connector = Connector::new(hub);

    connector.retry_permission().await;

    assert_eq!(connector.current_state(), ConnectionState::Init);
    assert_eq!(log.lock().unwrap().access_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn session_already_open_retries_once_after_fixed_delay() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.opens.push_back(Err(Error::SessionAlreadyOpen));
    let mut connector = Connector::new(hub);

    let started = tokio::time::Instant::now();
    connector.start().await;

    assert_eq!(connector.current_state(), ConnectionState::Succeeded);
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
    let log = log.lock().unwrap();
    assert_eq!(log.list_calls, 2);
    assert_eq!(log.open_calls, 2);
    assert_eq!(log.derive_calls, 1);
    assert_eq!(log.close_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn derivation_failure_retries_and_closes_the_session() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.derives.push_back(Err(derivation_error()));
    let mut connector = Connector::new(hub);

    connector.start().await;

    assert_eq!(connector.current_state(), ConnectionState::Succeeded);
    let log = log.lock().unwrap();
    assert_eq!(log.derive_calls, 2);
    // The failed attempt released its transport before the retry ran.
    assert_eq!(log.close_calls, 2);
    assert_eq!(log.open_peak, 1);
    assert_eq!(log.open_now, 0);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_session_is_ever_open() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.opens.push_back(Err(Error::SessionAlreadyOpen));
    hub.derives.push_back(Err(derivation_error()));
    hub.derives.push_back(Err(derivation_error()));
    let mut connector = Connector::new(hub);

    connector.start().await;

    assert_eq!(connector.current_state(), ConnectionState::Succeeded);
    let log = log.lock().unwrap();
    assert_eq!(log.open_calls, 4);
    assert_eq!(log.close_calls, 3);
    assert_eq!(log.open_peak, 1);
    assert_eq!(log.open_now, 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_while_failed_cancels_the_scheduled_retry() {
    init_logging();
    let (mut hub, log) = ScriptedHub::new();
    hub.derive_always_fails = true;
    let mut connector = Connector::new(hub);

    {
        let pipeline = connector.start();
        tokio::pin!(pipeline);
        tokio::select! {
            () = &mut pipeline => panic!("pipeline cannot finish while derivation keeps failing"),
            () = tokio::time::sleep(Duration::from_millis(1100)) => {}
        }
    }

    // Attempts ran at 0 ms and 1000 ms; the third ticket was pending when
    // the pipeline future was dropped.
    assert_eq!(connector.current_state(), ConnectionState::Failed);
    assert_eq!(log.lock().unwrap().derive_calls, 2);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(log.lock().unwrap().derive_calls, 2);
    assert!(connector.result().is_none());
}

#[tokio::test]
async fn derivation_order_follows_input_indices() {
    init_logging();
    let (hub, _log) = ScriptedHub::new();
    let mut connector = Connector::with_indices(hub, vec![7, 0, 3]);

    connector.start().await;

    let wallet = connector.result().expect("succeeded implies a wallet");
    let indices: Vec<u32> = wallet.accounts().iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![7, 0, 3]);
}

#[tokio::test]
async fn state_subscription_observes_the_terminal_state() {
    init_logging();
    let (hub, _log) = ScriptedHub::new();
    let mut connector = Connector::new(hub);
    let mut states = connector.watch_state();

    assert_eq!(*states.borrow(), ConnectionState::Init);
    connector.start().await;

    states.changed().await.expect("sender is still alive");
    assert_eq!(*states.borrow_and_update(), ConnectionState::Succeeded);
}
