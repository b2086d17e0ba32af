use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::chain::TxSigner;
use crate::config::SessionConfig;
use crate::game::{ActionKind, GameAction, GameEntity};
use crate::settlement::SessionSettler;

use super::error::SessionError;
use super::transport::{SessionTransport, TransportError, WsTransport};
use super::types::{
    ActionAck, ActionParams, Allocation, AuthChallenge, AuthVerifyParams, SessionCloseParams,
    SessionCreateParams, SessionCreated,
};

/// Observable snapshot of the off-chain session. Owned and mutated only
/// by the [`SessionManager`]; everyone else receives clones.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub connected: bool,
    pub session_active: bool,
    pub session_id: Option<String>,
    /// Accepted actions in the current session.
    pub action_count: u64,
    pub action_breakdown: BTreeMap<ActionKind, u64>,
    /// Estimated gas savings versus settling each action on-chain.
    pub estimated_savings_usd: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Connected,
    SessionOpen,
    Settling,
}

type Listener = Box<dyn Fn(&SessionState) + Send + Sync>;

/// Seam between the manager and the concrete WebSocket transport;
/// tests substitute a scripted connector.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn SessionTransport>, TransportError>;
}

pub struct WsConnector {
    pub request_timeout: Duration,
}

#[async_trait]
impl TransportConnector for WsConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn SessionTransport>, TransportError> {
        let transport = WsTransport::connect(endpoint, self.request_timeout).await?;
        Ok(Arc::new(transport))
    }
}

/// Owns exactly one logical off-chain session per connected wallet.
///
/// Lifecycle: `disconnected → connecting → connected → session-open →
/// (settling) → connected`. `disconnect` is reachable from every state.
/// All operations are driven from a single UI caller; state snapshots
/// are pushed to registered listeners after every accepted transition.
pub struct SessionManager {
    endpoint: Url,
    application: String,
    /// Used when the service ack does not carry its own savings figure.
    fallback_savings_per_action: Decimal,
    connector: Box<dyn TransportConnector>,
    transport: Mutex<Option<Arc<dyn SessionTransport>>>,
    phase: Mutex<Phase>,
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<Listener>>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        let connector = Box::new(WsConnector {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        });
        Self::with_connector(config, connector)
    }

    pub fn with_connector(
        config: &SessionConfig,
        connector: Box<dyn TransportConnector>,
    ) -> Result<Self, SessionError> {
        let endpoint = Url::parse(config.ws_url.trim())
            .map_err(|err| SessionError::Endpoint(format!("{}: {err}", config.ws_url)))?;
        Ok(Self {
            endpoint,
            application: config.application.clone(),
            fallback_savings_per_action: config.fallback_savings_per_action_usd,
            connector,
            transport: Mutex::new(None),
            phase: Mutex::new(Phase::Disconnected),
            state: Mutex::new(SessionState::default()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Register a state listener. The current snapshot is pushed to the
    /// new listener immediately so it never starts blind.
    pub fn on_state(&self, listener: impl Fn(&SessionState) + Send + Sync + 'static) {
        let snapshot = self.state.lock().clone();
        listener(&snapshot);
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Establish the transport and prove the signer's identity via
    /// challenge/response. Idempotent while already connected: repeated
    /// calls refresh nothing and never spawn a second transport.
    pub async fn connect(&self, signer: &dyn TxSigner) -> Result<(), SessionError> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Disconnected {
                debug!(target: "session::manager", "already connected; connect is a no-op");
                return Ok(());
            }
            *phase = Phase::Connecting;
        }

        let transport = match self.connector.connect(&self.endpoint).await {
            Ok(transport) => transport,
            Err(err) => {
                *self.phase.lock() = Phase::Disconnected;
                return Err(SessionError::Auth(format!("transport setup failed: {err}")));
            }
        };

        if let Err(err) = self.authenticate(transport.as_ref(), signer).await {
            transport.shutdown().await;
            *self.phase.lock() = Phase::Disconnected;
            return Err(err);
        }

        *self.transport.lock() = Some(transport);
        *self.phase.lock() = Phase::Connected;
        self.state.lock().connected = true;
        info!(target: "session::manager", endpoint = %self.endpoint, "session endpoint authenticated");
        self.emit();
        Ok(())
    }

    async fn authenticate(
        &self,
        transport: &dyn SessionTransport,
        signer: &dyn TxSigner,
    ) -> Result<(), SessionError> {
        let address = signer.address().to_string();

        let raw = transport
            .request("auth.request", json!({ "address": address }))
            .await
            .map_err(|err| SessionError::Auth(format!("challenge request failed: {err}")))?;
        let challenge: AuthChallenge = serde_json::from_value(raw)
            .map_err(|err| SessionError::Auth(format!("malformed challenge: {err}")))?;

        let signature = signer
            .sign_message(challenge.challenge.as_bytes())
            .await
            .map_err(|err| SessionError::Auth(format!("signer rejected the challenge: {err}")))?;

        let verify = AuthVerifyParams {
            address,
            challenge: challenge.challenge,
            signature: format!("0x{}", hex::encode(signature)),
        };
        let verify = serde_json::to_value(&verify).map_err(TransportError::Json)?;
        transport
            .request("auth.verify", verify)
            .await
            .map_err(|err| SessionError::Auth(format!("verification failed: {err}")))?;
        Ok(())
    }

    /// Open one application session scoped to `owner`.
    pub async fn create_game_session(&self, owner: Address) -> Result<(), SessionError> {
        let transport = self.active_transport()?;
        {
            let phase = self.phase.lock();
            match *phase {
                Phase::Connected => {}
                Phase::SessionOpen | Phase::Settling => {
                    return Err(SessionError::Session("a session is already open".into()));
                }
                _ => return Err(SessionError::NotConnected),
            }
        }

        let params = SessionCreateParams {
            owner: owner.to_string(),
            application: self.application.clone(),
        };
        let params = serde_json::to_value(&params).map_err(TransportError::Json)?;
        let raw = transport
            .request("session.create", params)
            .await
            .map_err(session_reject)?;
        let created: SessionCreated = serde_json::from_value(raw)
            .map_err(|err| SessionError::Session(format!("malformed create response: {err}")))?;

        {
            let mut state = self.state.lock();
            state.session_active = true;
            state.session_id = Some(created.session_id.clone());
            state.action_count = 0;
            state.action_breakdown.clear();
            state.estimated_savings_usd = Decimal::ZERO;
        }
        *self.phase.lock() = Phase::SessionOpen;
        info!(
            target: "session::manager",
            session_id = %created.session_id,
            owner = %owner,
            "game session opened"
        );
        self.emit();
        Ok(())
    }

    /// Send one off-chain state update. Counters are updated only after
    /// the service acknowledges the action (pessimistic rule): a failed
    /// round trip leaves the tracked state untouched.
    pub async fn submit_game_action(
        &self,
        action: &GameAction,
        entities: &[GameEntity],
        owner: Address,
    ) -> Result<(), SessionError> {
        let transport = self.active_transport()?;
        let session_id = self.open_session_id()?;

        let params = ActionParams {
            session_id: &session_id,
            owner: owner.to_string(),
            kind: action.kind,
            entity_id: &action.entity_id,
            amount: action.amount,
            entities,
        };
        let params = serde_json::to_value(&params).map_err(TransportError::Json)?;
        let raw = transport.request("session.action", params).await?;
        let ack: ActionAck = serde_json::from_value(raw)
            .map_err(|err| SessionError::Session(format!("malformed action ack: {err}")))?;
        if !ack.accepted {
            return Err(SessionError::Session(
                "action rejected by the session service".into(),
            ));
        }

        {
            let mut state = self.state.lock();
            state.action_count += 1;
            *state.action_breakdown.entry(action.kind).or_insert(0) += 1;
            state.estimated_savings_usd += ack
                .estimated_savings_usd
                .unwrap_or(self.fallback_savings_per_action);
        }
        self.emit();
        Ok(())
    }

    /// Close the session with a final allocation set. Terminal on
    /// success: no further actions are valid until a new session opens.
    pub async fn settle_session(
        &self,
        owner: Address,
        final_allocations: &[Allocation],
    ) -> Result<(), SessionError> {
        let transport = self.active_transport()?;
        let session_id = self.open_session_id()?;
        *self.phase.lock() = Phase::Settling;

        let params = SessionCloseParams {
            session_id: &session_id,
            owner: owner.to_string(),
            allocations: final_allocations,
        };
        let params = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(err) => {
                *self.phase.lock() = Phase::SessionOpen;
                return Err(SessionError::Settlement(format!(
                    "failed to encode close request: {err}"
                )));
            }
        };

        match transport.request("session.close", params).await {
            Ok(_) => {
                {
                    let mut state = self.state.lock();
                    state.session_active = false;
                    state.session_id = None;
                    state.action_count = 0;
                    state.action_breakdown.clear();
                    state.estimated_savings_usd = Decimal::ZERO;
                }
                *self.phase.lock() = Phase::Connected;
                info!(
                    target: "session::manager",
                    session_id = %session_id,
                    "session closed"
                );
                self.emit();
                Ok(())
            }
            Err(err) => {
                // The session is still open on the service side as far as
                // we know; leave the local state where it was.
                *self.phase.lock() = Phase::SessionOpen;
                warn!(
                    target: "session::manager",
                    session_id = %session_id,
                    error = %err,
                    "session close failed"
                );
                Err(SessionError::Settlement(err.to_string()))
            }
        }
    }

    /// Tear the transport down unconditionally and reset to
    /// disconnected. Safe to call repeatedly and from any state.
    pub async fn disconnect(&self) {
        let transport = self.transport.lock().take();
        if let Some(transport) = transport {
            transport.shutdown().await;
        }
        *self.phase.lock() = Phase::Disconnected;
        *self.state.lock() = SessionState::default();
        info!(target: "session::manager", "disconnected");
        self.emit();
    }

    fn active_transport(&self) -> Result<Arc<dyn SessionTransport>, SessionError> {
        self.transport
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)
    }

    fn open_session_id(&self) -> Result<String, SessionError> {
        let phase = *self.phase.lock();
        if !matches!(phase, Phase::SessionOpen | Phase::Settling) {
            return Err(SessionError::NoSession);
        }
        self.state
            .lock()
            .session_id
            .clone()
            .ok_or(SessionError::NoSession)
    }

    fn emit(&self) {
        let snapshot = self.state.lock().clone();
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            listener(&snapshot);
        }
    }
}

fn session_reject(err: TransportError) -> SessionError {
    match err {
        TransportError::Response { message, .. } => SessionError::Session(message),
        other => SessionError::Transport(other),
    }
}

#[async_trait]
impl SessionSettler for SessionManager {
    fn snapshot(&self) -> SessionState {
        self.state()
    }

    async fn close_session(
        &self,
        owner: Address,
        final_allocations: Vec<Allocation>,
    ) -> Result<(), SessionError> {
        self.settle_session(owner, &final_allocations).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;
    use serde_json::{Value, json};

    use super::*;
    use crate::chain::testutil::MockSigner;

    struct ScriptedTransport {
        requests: Mutex<Vec<(String, Value)>>,
        responses: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
        shutdowns: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(HashMap::new()),
                shutdowns: AtomicUsize::new(0),
            })
        }

        fn script(&self, method: &str, response: Result<Value, TransportError>) {
            self.responses
                .lock()
                .entry(method.to_string())
                .or_default()
                .push_back(response);
        }

        fn methods(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .map(|(method, _)| method.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SessionTransport for ScriptedTransport {
        async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
            self.requests.lock().push((method.to_string(), params));
            self.responses
                .lock()
                .get_mut(method)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Ok(Value::Null))
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedConnector {
        transport: Arc<ScriptedTransport>,
        connects: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TransportConnector for ScriptedConnector {
        async fn connect(
            &self,
            _endpoint: &Url,
        ) -> Result<Arc<dyn SessionTransport>, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TransportError::Handshake("refused".into()));
            }
            Ok(self.transport.clone())
        }
    }

    fn manager_with(
        transport: Arc<ScriptedTransport>,
        fail_connect: bool,
    ) -> (SessionManager, Arc<ScriptedTransport>) {
        let connector = Box::new(ScriptedConnector {
            transport: transport.clone(),
            connects: AtomicUsize::new(0),
            fail: fail_connect,
        });
        let manager =
            SessionManager::with_connector(&SessionConfig::default(), connector).expect("manager");
        (manager, transport)
    }

    fn script_auth(transport: &ScriptedTransport) {
        transport.script("auth.request", Ok(json!({"challenge": "prove-it"})));
        transport.script("auth.verify", Ok(json!({})));
    }

    fn script_session(transport: &ScriptedTransport) {
        transport.script("session.create", Ok(json!({"sessionId": "sess-1"})));
    }

    fn owner() -> Address {
        Address::repeat_byte(0x42)
    }

    async fn connected_manager() -> (SessionManager, Arc<ScriptedTransport>, MockSigner) {
        let transport = ScriptedTransport::new();
        script_auth(&transport);
        let (manager, transport) = manager_with(transport, false);
        let signer = MockSigner::new();
        manager.connect(&signer).await.expect("connect");
        (manager, transport, signer)
    }

    async fn open_manager() -> (SessionManager, Arc<ScriptedTransport>) {
        let (manager, transport, _signer) = connected_manager().await;
        script_session(&transport);
        manager.create_game_session(owner()).await.expect("create");
        (manager, transport)
    }

    fn action() -> GameAction {
        GameAction {
            kind: ActionKind::Deposit,
            entity_id: "plot-1".into(),
            amount: Some(dec!(1.5)),
        }
    }

    #[tokio::test]
    async fn connect_authenticates_with_challenge_response() {
        let (manager, transport, signer) = connected_manager().await;
        assert_eq!(transport.methods(), ["auth.request", "auth.verify"]);
        assert_eq!(signer.signed.lock().as_slice(), [b"prove-it".to_vec()]);
        assert!(manager.state().connected);
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_connected() {
        let transport = ScriptedTransport::new();
        script_auth(&transport);
        let connector = Box::new(ScriptedConnector {
            transport: transport.clone(),
            connects: AtomicUsize::new(0),
            fail: false,
        });
        let manager =
            SessionManager::with_connector(&SessionConfig::default(), connector).expect("manager");
        let signer = MockSigner::new();
        manager.connect(&signer).await.expect("first connect");
        manager.connect(&signer).await.expect("second connect");
        // Only one transport was ever spawned.
        assert_eq!(transport.methods().len(), 2);
    }

    #[tokio::test]
    async fn signer_rejection_fails_auth_and_tears_down() {
        let transport = ScriptedTransport::new();
        script_auth(&transport);
        let (manager, transport) = manager_with(transport, false);
        let mut signer = MockSigner::new();
        signer.fail_sign = true;

        let err = manager.connect(&signer).await.expect_err("auth failure");
        assert!(matches!(err, SessionError::Auth(_)));
        assert!(!manager.state().connected);
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_transport_failure_is_auth_error() {
        let (manager, _transport) = manager_with(ScriptedTransport::new(), true);
        let signer = MockSigner::new();
        let err = manager.connect(&signer).await.expect_err("refused");
        assert!(matches!(err, SessionError::Auth(_)));
    }

    #[tokio::test]
    async fn create_session_requires_connection() {
        let (manager, _transport) = manager_with(ScriptedTransport::new(), false);
        let err = manager
            .create_game_session(owner())
            .await
            .expect_err("not connected");
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[tokio::test]
    async fn create_session_emits_fresh_session_id() {
        let (manager, _transport) = open_manager().await;
        let state = manager.state();
        assert!(state.session_active);
        assert_eq!(state.session_id.as_deref(), Some("sess-1"));
        assert_eq!(state.action_count, 0);
    }

    #[tokio::test]
    async fn second_create_while_open_is_rejected() {
        let (manager, transport) = open_manager().await;
        script_session(&transport);
        let err = manager
            .create_game_session(owner())
            .await
            .expect_err("already open");
        assert!(matches!(err, SessionError::Session(_)));
    }

    #[tokio::test]
    async fn accepted_action_updates_counters_and_savings() {
        let (manager, transport) = open_manager().await;
        transport.script(
            "session.action",
            Ok(json!({"accepted": true, "estimatedSavingsUsd": "0.40"})),
        );
        transport.script("session.action", Ok(json!({"accepted": true})));

        manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect("first action");
        manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect("second action");

        let state = manager.state();
        assert_eq!(state.action_count, 2);
        assert_eq!(state.action_breakdown[&ActionKind::Deposit], 2);
        // 0.40 from the ack plus the configured fallback for the second.
        assert_eq!(
            state.estimated_savings_usd,
            dec!(0.40) + SessionConfig::default().fallback_savings_per_action_usd
        );
    }

    #[tokio::test]
    async fn failed_submit_leaves_counters_untouched() {
        let (manager, transport) = open_manager().await;
        transport.script("session.action", Err(TransportError::Timeout));

        let err = manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect_err("timeout");
        assert!(matches!(err, SessionError::Transport(_)));

        let state = manager.state();
        assert_eq!(state.action_count, 0);
        assert_eq!(state.estimated_savings_usd, Decimal::ZERO);
    }

    #[tokio::test]
    async fn rejected_action_leaves_counters_untouched() {
        let (manager, transport) = open_manager().await;
        transport.script("session.action", Ok(json!({"accepted": false})));

        let err = manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect_err("rejected");
        assert!(matches!(err, SessionError::Session(_)));
        assert_eq!(manager.state().action_count, 0);
    }

    #[tokio::test]
    async fn settle_closes_session_terminally() {
        let (manager, transport) = open_manager().await;
        transport.script("session.close", Ok(json!({})));

        manager
            .settle_session(owner(), &[])
            .await
            .expect("settle");
        let state = manager.state();
        assert!(!state.session_active);
        assert!(state.session_id.is_none());

        // No further actions until a new session is created.
        let err = manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect_err("closed");
        assert!(matches!(err, SessionError::NoSession));
    }

    #[tokio::test]
    async fn failed_settle_keeps_session_open() {
        let (manager, transport) = open_manager().await;
        transport.script(
            "session.close",
            Err(TransportError::Response {
                code: -32000,
                message: "close rejected".into(),
            }),
        );

        let err = manager
            .settle_session(owner(), &[])
            .await
            .expect_err("close failed");
        assert!(matches!(err, SessionError::Settlement(_)));
        assert!(manager.state().session_active);

        // The session survives and still accepts actions.
        transport.script("session.action", Ok(json!({"accepted": true})));
        manager
            .submit_game_action(&action(), &[], owner())
            .await
            .expect("still open");
    }

    #[tokio::test]
    async fn disconnect_is_safe_from_any_state_and_repeatable() {
        let (manager, transport) = open_manager().await;
        manager.disconnect().await;
        manager.disconnect().await;

        let state = manager.state();
        assert!(!state.connected);
        assert!(!state.session_active);
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listeners_receive_snapshots_on_transitions() {
        let transport = ScriptedTransport::new();
        script_auth(&transport);
        script_session(&transport);
        let (manager, _transport) = manager_with(transport, false);

        let seen: Arc<Mutex<Vec<SessionState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on_state(move |state| sink.lock().push(state.clone()));

        let signer = MockSigner::new();
        manager.connect(&signer).await.expect("connect");
        manager.create_game_session(owner()).await.expect("create");

        let snapshots = seen.lock();
        // Initial snapshot on registration, then connect and create.
        assert_eq!(snapshots.len(), 3);
        assert!(!snapshots[0].connected);
        assert!(snapshots[1].connected);
        assert_eq!(snapshots[2].session_id.as_deref(), Some("sess-1"));
    }
}
