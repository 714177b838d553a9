//! Public client: credential checks, strategy selection and lifecycle.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::sanitize_token;
use crate::error::ClientError;
use crate::http::HttpClient;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::snapshot::{ConfigSnapshot, ConfigValue};
use crate::source::RemoteSource;
use crate::status::{StatusSnapshot, SyncState, SyncStatus};
use crate::store::{ConfigStore, SnapshotWatch};
use crate::sync::config::SyncConfig;
use crate::sync::poll::{PollCadence, PollStrategy, PollTarget};
use crate::sync::stream::StreamStrategy;
use crate::validation::{validate_init_response, InitResponse, Plan};

/// Identity used to authenticate against the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    environment: Option<String>,
}

impl Credentials {
    /// Token-only credentials.
    pub fn new(access_token: &str) -> Result<Self, ClientError> {
        let access_token =
            sanitize_token(access_token).ok_or(ClientError::MissingCredential("access token"))?;
        Ok(Self {
            access_token,
            environment: None,
        })
    }

    /// Credentials scoped to `environment`; both values must be non-blank.
    pub fn with_environment(access_token: &str, environment: &str) -> Result<Self, ClientError> {
        let mut credentials = Self::new(access_token)?;
        let environment =
            sanitize_token(environment).ok_or(ClientError::MissingCredential("environment"))?;
        credentials.environment = Some(environment);
        Ok(credentials)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("environment", &self.environment)
            .finish()
    }
}

#[derive(Debug)]
enum ActiveStrategy {
    Poll(Arc<PollStrategy>),
    Stream(Arc<StreamStrategy>),
}

impl ActiveStrategy {
    fn cancel(&self) {
        match self {
            ActiveStrategy::Poll(poll) => poll.cancel(),
            ActiveStrategy::Stream(stream) => stream.cancel(),
        }
    }
}

/// Keeps a local snapshot of a remote key/value configuration in sync.
///
/// Construct with [`VarsyncClient::new`] (token-only, server-paced polling) or
/// [`VarsyncClient::with_environment`] (handshake, then polling or streaming
/// depending on the plan), then call [`VarsyncClient::init`]. Reads never block
/// on the network; they fail with [`ClientError::NotInitialized`] until the
/// first snapshot has been applied.
pub struct VarsyncClient {
    credentials: Credentials,
    config: SyncConfig,
    source: Arc<dyn RemoteSource>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<ConfigStore>,
    status: Arc<SyncStatus>,
    active: Mutex<Option<ActiveStrategy>>,
}

impl fmt::Debug for VarsyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarsyncClient")
            .field("credentials", &self.credentials)
            .field("state", &self.status.state())
            .field("initialized", &self.store.is_initialized())
            .finish()
    }
}

impl VarsyncClient {
    /// Token-only client talking to `config.api_url`.
    pub fn new(access_token: &str, config: SyncConfig) -> Result<Self, ClientError> {
        Self::connect(Credentials::new(access_token)?, config)
    }

    /// Environment-scoped client talking to `config.api_url`.
    pub fn with_environment(
        access_token: &str,
        environment: &str,
        config: SyncConfig,
    ) -> Result<Self, ClientError> {
        Self::connect(
            Credentials::with_environment(access_token, environment)?,
            config,
        )
    }

    fn connect(credentials: Credentials, config: SyncConfig) -> Result<Self, ClientError> {
        let http = HttpClient::new(&config.api_url, credentials.access_token(), config.http)?;
        Ok(Self::with_source(credentials, config, Arc::new(http)))
    }

    /// Builds a client over an arbitrary [`RemoteSource`].
    pub fn with_source(
        credentials: Credentials,
        config: SyncConfig,
        source: Arc<dyn RemoteSource>,
    ) -> Self {
        Self {
            credentials,
            config: config.sanitise(),
            source,
            scheduler: Arc::new(TokioScheduler),
            store: Arc::new(ConfigStore::new()),
            status: SyncStatus::new(),
            active: Mutex::new(None),
        }
    }

    /// Replaces the scheduler driving the poll loop.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Starts synchronization.
    ///
    /// Token-only clients fetch once inline and then poll at the server's
    /// pace. When that first fetch fails, `init` still succeeds and the loop
    /// keeps running, but the client stays uninitialized for good: every
    /// accessor returns [`ClientError::NotInitialized`]. Environment-scoped
    /// clients fail when the handshake does, after which `init` may be retried.
    ///
    /// Returns [`ClientError::AlreadyStarted`] once synchronization is running
    /// or the client has been shut down.
    pub async fn init(&self) -> Result<(), ClientError> {
        match self.credentials.environment() {
            None => self.init_token_only().await,
            Some(environment) => self.init_environment(environment).await,
        }
    }

    async fn init_token_only(&self) -> Result<(), ClientError> {
        if !self
            .status
            .transition(SyncState::Uninitialized, SyncState::Polling)
        {
            return Err(ClientError::AlreadyStarted);
        }
        let poll = PollStrategy::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.status),
            Arc::clone(&self.scheduler),
            PollTarget::Bootstrap,
            PollCadence::ServerPaced {
                initial: self.config.poll_interval,
            },
            self.config.min_poll_interval,
        );
        if let Err(err) = poll.poll_once().await {
            self.store.block_initialization();
            warn!(error = %err, "varsync initial fetch failed; client stays uninitialized");
        }

        let mut active = self.lock_active();
        if self.status.state() != SyncState::Polling {
            return Ok(());
        }
        poll.start(poll.current_interval());
        *active = Some(ActiveStrategy::Poll(poll));
        info!(
            initialized = self.store.is_initialized(),
            "varsync polling started"
        );
        Ok(())
    }

    async fn init_environment(&self, environment: &str) -> Result<(), ClientError> {
        if !self
            .status
            .transition(SyncState::Uninitialized, SyncState::Handshaking)
        {
            return Err(ClientError::AlreadyStarted);
        }
        let (plan, snapshot) = match self.handshake(environment).await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(environment, error = %err, "varsync handshake failed");
                self.status.record_failure(&err);
                self.status
                    .transition(SyncState::Handshaking, SyncState::Uninitialized);
                return Err(err);
            }
        };
        self.store.replace(snapshot);
        self.status.record_success();

        let poll = PollStrategy::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.status),
            Arc::clone(&self.scheduler),
            PollTarget::Environment(environment.to_string()),
            PollCadence::FixedRate(self.config.poll_interval),
            self.config.min_poll_interval,
        );

        let mut active = self.lock_active();
        let next = if plan.streams_updates() {
            SyncState::Streaming
        } else {
            SyncState::Polling
        };
        if !self.status.transition(SyncState::Handshaking, next) {
            return Ok(());
        }
        let strategy = if plan.streams_updates() {
            let stream = StreamStrategy::new(
                Arc::clone(&self.source),
                Arc::clone(&self.store),
                Arc::clone(&self.status),
                environment,
                poll,
            );
            stream.start();
            ActiveStrategy::Stream(stream)
        } else {
            poll.start(poll.current_interval());
            ActiveStrategy::Poll(poll)
        };
        *active = Some(strategy);
        info!(environment, plan = %plan, "varsync initialized");
        Ok(())
    }

    async fn handshake(&self, environment: &str) -> Result<(Plan, ConfigSnapshot), ClientError> {
        let raw = self.source.handshake(environment).await?;
        match validate_init_response(&raw)? {
            InitResponse::Valid { plan, config } => Ok((plan, config)),
            InitResponse::Invalid { error } => Err(ClientError::HandshakeRejected(error)),
        }
    }

    /// Returns the value for `key`; `Ok(None)` when the key is absent.
    pub fn get(&self, key: &str) -> Result<Option<ConfigValue>, ClientError> {
        self.store.get(key)
    }

    /// Returns the whole current snapshot.
    pub fn get_all(&self) -> Result<Arc<ConfigSnapshot>, ClientError> {
        self.store.get_all()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    /// Watches snapshot changes; see [`ConfigStore::subscribe`].
    pub fn subscribe(&self) -> SnapshotWatch {
        self.store.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.status.state()
    }

    /// Point-in-time sync health.
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot(self.store.is_initialized())
    }

    /// Cancels the active strategy. The last snapshot stays readable.
    pub fn shutdown(&self) {
        let mut active = self.lock_active();
        if self.status.state() == SyncState::Stopped {
            return;
        }
        self.status.set_state(SyncState::Stopped);
        if let Some(strategy) = active.take() {
            strategy.cancel();
        }
        info!("varsync stopped");
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveStrategy>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for VarsyncClient {
    fn drop(&mut self) {
        if let Some(strategy) = self.lock_active().take() {
            strategy.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tracing_test::traced_test;

    use crate::source::PushEvent;
    use crate::sync::test_support::{ScriptedSource, Step};

    const INTERVAL: Duration = Duration::from_secs(1);

    fn test_config() -> SyncConfig {
        SyncConfig {
            poll_interval: INTERVAL,
            min_poll_interval: Duration::from_millis(10),
            enforce_limits: false,
            ..SyncConfig::default()
        }
    }

    fn token_client(source: &Arc<ScriptedSource>) -> VarsyncClient {
        VarsyncClient::with_source(
            Credentials::new("tok").unwrap(),
            test_config(),
            source.clone(),
        )
    }

    fn env_client(source: &Arc<ScriptedSource>) -> VarsyncClient {
        VarsyncClient::with_source(
            Credentials::with_environment("tok", "production").unwrap(),
            test_config(),
            source.clone(),
        )
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn blank_credentials_are_rejected() {
        assert!(matches!(
            Credentials::new("  "),
            Err(ClientError::MissingCredential("access token"))
        ));
        assert!(matches!(
            Credentials::with_environment("tok", ""),
            Err(ClientError::MissingCredential("environment"))
        ));
        let credentials = Credentials::with_environment(" tok ", " dev ").unwrap();
        assert_eq!(credentials.access_token(), "tok");
        assert_eq!(credentials.environment(), Some("dev"));
        assert!(!format!("{credentials:?}").contains("tok\""));
    }

    #[test]
    fn constructor_fails_before_any_network_call() {
        assert!(matches!(
            VarsyncClient::new("", SyncConfig::default()),
            Err(ClientError::MissingCredential(_))
        ));
        assert!(matches!(
            VarsyncClient::with_environment("tok", "  ", SyncConfig::default()),
            Err(ClientError::MissingCredential("environment"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn accessors_fail_before_init() {
        let source = ScriptedSource::new();
        let client = token_client(&source);
        assert!(matches!(client.get("x"), Err(ClientError::NotInitialized)));
        assert!(matches!(client.get_all(), Err(ClientError::NotInitialized)));
        assert_eq!(client.state(), SyncState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn token_only_init_reads_bootstrap() {
        let source = ScriptedSource::new();
        source.script_bootstrap([Step::ok(json!({
            "config": {"x": "1", "y": true},
            "pollIntervalInMs": 1000
        }))]);
        let client = token_client(&source);

        client.init().await.unwrap();
        assert!(client.is_initialized());
        assert_eq!(client.get("x").unwrap(), Some(ConfigValue::from("1")));
        assert_eq!(client.get("y").unwrap(), Some(ConfigValue::from(true)));
        assert_eq!(client.get("z").unwrap(), None);
        assert_eq!(client.state(), SyncState::Polling);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(source.bootstrap_calls(), 3);
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_are_woken_by_polled_changes() {
        let source = ScriptedSource::new();
        source.script_bootstrap([
            Step::ok(json!({"config": {"x": "1"}, "pollIntervalInMs": 1000})),
            Step::ok(json!({"config": {"x": "2"}, "pollIntervalInMs": 1000})),
        ]);
        let client = token_client(&source);
        let mut updates = client.subscribe();

        client.init().await.unwrap();
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();

        updates.changed().await.expect("client alive");
        let seen = updates.borrow_and_update().clone().expect("initialized");
        assert_eq!(seen.get("x"), Some(&ConfigValue::from("2")));
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn invalid_bootstrap_leaves_store_uninitialized() {
        let source = ScriptedSource::new();
        source.script_bootstrap([
            Step::ok(json!({"config": {"x": 5}, "pollIntervalInMs": 1000})),
            Step::ok(json!({"config": {"x": "5"}, "pollIntervalInMs": 1000})),
        ]);
        let client = token_client(&source);

        client.init().await.expect("bootstrap failures do not fail init");
        assert!(matches!(client.get("x"), Err(ClientError::NotInitialized)));
        assert!(logs_contain("varsync initial fetch failed"));
        assert_eq!(client.status().failed_syncs, 1);

        tokio::time::sleep(3 * INTERVAL + Duration::from_millis(100)).await;
        assert!(source.bootstrap_calls() >= 3, "loop keeps polling");
        assert!(client.status().successful_syncs >= 2);
        assert!(!client.is_initialized());
        assert!(matches!(client.get("x"), Err(ClientError::NotInitialized)));
        assert!(matches!(client.get_all(), Err(ClientError::NotInitialized)));
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_handshake_surfaces_server_error() {
        let source = ScriptedSource::new();
        source.script_handshake([
            Step::ok(json!({"isValid": false, "error": "bad token"})),
            Step::ok(json!({"isValid": true, "plan": "free", "config": {}})),
        ]);
        let client = env_client(&source);

        let err = client.init().await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeRejected(_)));
        assert!(err.to_string().contains("bad token"));
        assert_eq!(client.state(), SyncState::Uninitialized);
        assert!(!client.is_initialized());

        client.init().await.expect("init can be retried");
        assert_eq!(client.state(), SyncState::Polling);
        assert_eq!(source.handshake_calls(), 2);
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_handshake_is_invalid_response() {
        let source = ScriptedSource::new();
        source.script_handshake([Step::ok(json!({"isValid": true, "plan": "enterprise"}))]);
        let client = env_client(&source);

        let err = client.init().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
        assert_eq!(client.state(), SyncState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_transport_failure_propagates() {
        let source = ScriptedSource::new();
        source.script_handshake([Step::fail()]);
        let client = env_client(&source);

        assert!(matches!(
            client.init().await,
            Err(ClientError::Transport(_))
        ));
        assert_eq!(client.status().failed_syncs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn free_plan_polls_environment() {
        let source = ScriptedSource::new();
        source.script_handshake([Step::ok(json!({
            "isValid": true,
            "plan": "free",
            "config": {"theme": "dark"}
        }))]);
        source.script_environment([Step::ok(json!({"theme": "light"}))]);
        let client = env_client(&source);

        client.init().await.unwrap();
        assert_eq!(client.get("theme").unwrap(), Some(ConfigValue::from("dark")));
        assert_eq!(client.state(), SyncState::Polling);
        assert_eq!(source.environment_calls(), 0);

        tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(client.get("theme").unwrap(), Some(ConfigValue::from("light")));
        assert_eq!(source.subscribe_calls(), 0);
        assert!(source
            .environments_seen()
            .iter()
            .all(|environment| environment == "production"));
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn pro_plan_streams_then_falls_back() {
        let source = ScriptedSource::new();
        source.script_handshake([Step::ok(json!({
            "isValid": true,
            "plan": "pro",
            "config": {"beta": false}
        }))]);
        source.script_environment([Step::ok(json!({"beta": "polled"}))]);
        let push = source.push_channel();
        let client = env_client(&source);

        client.init().await.unwrap();
        assert_eq!(client.get("beta").unwrap(), Some(ConfigValue::from(false)));
        settle().await;
        assert_eq!(client.state(), SyncState::Streaming);

        push.send(PushEvent::Message(r#"{"beta":true}"#.into()))
            .await
            .unwrap();
        settle().await;
        assert_eq!(client.get("beta").unwrap(), Some(ConfigValue::from(true)));

        push.send(PushEvent::Error("stream reset".into()))
            .await
            .unwrap();
        settle().await;
        assert_eq!(client.state(), SyncState::Polling);

        tokio::time::sleep(INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(client.get("beta").unwrap(), Some(ConfigValue::from("polled")));
        assert_eq!(source.subscribe_calls(), 1);
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn second_init_is_rejected() {
        let source = ScriptedSource::new();
        source.script_bootstrap([Step::ok(json!({"config": {}, "pollIntervalInMs": 1000}))]);
        let client = token_client(&source);

        client.init().await.unwrap();
        assert!(matches!(
            client.init().await,
            Err(ClientError::AlreadyStarted)
        ));
        assert_eq!(source.bootstrap_calls(), 1);
        client.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polling_and_keeps_snapshot() {
        let source = ScriptedSource::new();
        source.script_bootstrap([Step::ok(json!({
            "config": {"x": "1"},
            "pollIntervalInMs": 1000
        }))]);
        let client = token_client(&source);

        client.init().await.unwrap();
        client.shutdown();
        client.shutdown();
        assert_eq!(client.state(), SyncState::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.bootstrap_calls(), 1);
        assert_eq!(client.get("x").unwrap(), Some(ConfigValue::from("1")));
        assert!(matches!(
            client.init().await,
            Err(ClientError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_sync_health() {
        let source = ScriptedSource::new();
        source.script_bootstrap([Step::ok(json!({"config": {}, "pollIntervalInMs": 1000}))]);
        let client = token_client(&source);

        client.init().await.unwrap();
        let status = client.status().to_json();
        assert_eq!(status["state"], "polling");
        assert_eq!(status["initialized"], true);
        assert_eq!(status["successfulSyncs"], 1);
        client.shutdown();
    }
}
