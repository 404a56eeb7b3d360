//! Connection lifecycle manager.
//!
//! Drives `Idle -> Connecting -> Connected | Error` and the disconnect path,
//! which is reachable from every state and always wins over an in-flight
//! connect.
//!
//! Concurrency model:
//! - All state lives in one `Session` behind a std mutex that is never held
//!   across an await. Every transition is therefore atomic with respect to
//!   other tasks.
//! - Concurrent `connect` calls join the one in-flight attempt (a spawned
//!   task shared through `futures::future::Shared`).
//! - Each disconnect bumps a generation counter and cancels the attempt's
//!   `CancellationToken`. Results carrying an older generation are dropped.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::domain::connection::{
    AttemptId, AttemptOutcome, ChannelName, ConnectionSnapshot, ConnectionState, ConnectionStatus,
    EntityType, RealtimeEvent, SubscriptionRecord, SubscriptionState,
};
use crate::domain::foundation::{AuthError, ErrorCode, TransitionError, UserContext};
use crate::ports::{
    AuthorizationResolver, ChannelHandle, ChannelTransport, HandlerError, RealtimeEventHandler,
    UserContextProvider,
};

use super::signals::{Operation, OperationErrors, OperationFlags, SessionSignals};
use super::RealtimeError;

/// Tunables for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Entity types to subscribe, in order.
    pub entity_types: Vec<EntityType>,
    /// Bounded wait for a subscription confirmation. `None` waits forever.
    pub subscribe_timeout: Option<Duration>,
    pub max_recorded_errors: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            entity_types: EntityType::ALL.to_vec(),
            subscribe_timeout: None,
            max_recorded_errors: 20,
        }
    }
}

impl From<&RealtimeConfig> for ConnectionSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            entity_types: config.entity_types.clone(),
            subscribe_timeout: config.subscribe_timeout(),
            max_recorded_errors: config.max_recorded_errors,
        }
    }
}

/// Result of a connect, shared by every caller that joined the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    /// `None` when the session was already connected and nothing ran.
    pub attempt: Option<AttemptId>,
    pub status: ConnectionStatus,
    pub subscribed: Vec<EntityType>,
    pub failed: Vec<(EntityType, String)>,
    /// A disconnect cancelled the attempt before it finished.
    pub superseded: bool,
}

impl ConnectReport {
    fn from_state(attempt: Option<AttemptId>, state: &ConnectionState) -> Self {
        let registry = state.registry();
        let subscriptions = registry.snapshot();
        Self {
            attempt,
            status: state.status(),
            subscribed: subscriptions
                .values()
                .filter(|r| r.is_subscribed())
                .map(|r| r.entity_type)
                .collect(),
            failed: subscriptions
                .values()
                .filter(|r| r.state == SubscriptionState::Error)
                .map(|r| (r.entity_type, r.last_error.clone().unwrap_or_default()))
                .collect(),
            superseded: false,
        }
    }

    pub fn all_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// The error reported on the connect error channel for this outcome.
    fn first_failure(&self) -> Option<RealtimeError> {
        if self.superseded {
            return None;
        }
        if let Some((entity_type, reason)) = self.failed.first() {
            return Some(RealtimeError::subscription_failed(*entity_type, reason.clone()));
        }
        if self.status == ConnectionStatus::Error {
            return Some(RealtimeError::Forbidden(NOTHING_AUTHORIZED.to_string()));
        }
        None
    }
}

const NOTHING_AUTHORIZED: &str = "no entity type has an authorized channel";

type ConnectOutcome = Result<ConnectReport, RealtimeError>;
type SharedConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

struct PendingConnect {
    generation: u64,
    outcome: SharedConnect,
}

struct Session {
    state: ConnectionState,
    /// Bumped by every disconnect; results from older generations are stale.
    generation: u64,
    cancel: CancellationToken,
    pending: Option<PendingConnect>,
    handles: HashMap<EntityType, Vec<Arc<dyn ChannelHandle>>>,
    /// User the open channels were resolved for.
    user: Option<UserContext>,
}

enum ConnectStart {
    Await(SharedConnect),
    Done(ConnectOutcome),
    WaitForDisconnect,
}

/// What the resolver allowed for one entity type.
enum Resolved {
    Channels(Vec<ChannelName>),
    NotAuthorized,
    Denied(String),
}

struct Inner {
    transport: Arc<dyn ChannelTransport>,
    resolver: Arc<dyn AuthorizationResolver>,
    users: Arc<dyn UserContextProvider>,
    events: Arc<dyn RealtimeEventHandler>,
    settings: ConnectionSettings,
    signals: Arc<SessionSignals>,
    session: Mutex<Session>,
    next_attempt: AtomicU64,
    snapshots: watch::Sender<ConnectionSnapshot>,
}

/// Handle to the session's realtime connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        resolver: Arc<dyn AuthorizationResolver>,
        users: Arc<dyn UserContextProvider>,
        events: Arc<dyn RealtimeEventHandler>,
        settings: ConnectionSettings,
        signals: Arc<SessionSignals>,
    ) -> Self {
        let state = ConnectionState::new(settings.max_recorded_errors);
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                transport,
                resolver,
                users,
                events,
                settings,
                signals,
                session: Mutex::new(Session {
                    state,
                    generation: 0,
                    cancel: CancellationToken::new(),
                    pending: None,
                    handles: HashMap::new(),
                    user: None,
                }),
                next_attempt: AtomicU64::new(0),
                snapshots,
            }),
        }
    }

    /// Subscribes every configured entity type the current user may see.
    ///
    /// Resolves once each entity type is `Subscribed` or `Error`. Partial
    /// failure is reported in the returned report, not as an error. Fails
    /// with `AuthenticationRequired` before any transport call when nobody
    /// is signed in, and with `TransportFatal` when the attempt had to be
    /// aborted.
    pub async fn connect(&self) -> Result<ConnectReport, RealtimeError> {
        let _flag = self.inner.signals.begin(Operation::Connect);
        let result = self.inner.connect().await;
        self.inner
            .signals
            .record_error(Operation::Connect, outcome_error(&result));
        result
    }

    /// Tears down every subscription and returns to `Idle`.
    ///
    /// The status flips to `Disconnecting` and any in-flight connect is
    /// cancelled as soon as this is called, before the returned future is
    /// first polled. Unsubscribe failures are logged, never returned.
    pub fn disconnect(&self) -> impl Future<Output = Result<(), RealtimeError>> + Send + 'static {
        let flag = self.inner.signals.begin(Operation::Disconnect);
        let teardown = self.inner.begin_teardown();
        let inner = Arc::clone(&self.inner);
        async move {
            let _flag = flag;
            inner.finish_teardown(teardown).await;
            let result = Ok(());
            inner.signals.record(Operation::Disconnect, &result);
            result
        }
    }

    /// Disconnect followed by connect, reported as one operation.
    pub async fn refresh_connection(&self) -> Result<ConnectReport, RealtimeError> {
        let _flag = self.inner.signals.begin(Operation::Refresh);
        tracing::info!("Refreshing realtime connection");
        let teardown = self.inner.begin_teardown();
        self.inner.finish_teardown(teardown).await;
        let result = self.inner.connect().await;
        self.inner
            .signals
            .record_error(Operation::Refresh, outcome_error(&result));
        result
    }

    /// Clears an `Error` status back to `Idle`, closing any channels still open.
    pub async fn acknowledge_error(&self) -> Result<(), RealtimeError> {
        let handles = {
            let mut session = self.inner.session();
            let status = session.state.status();
            if status != ConnectionStatus::Error {
                return Err(RealtimeError::InvalidTransition(TransitionError {
                    from: format!("{:?}", status),
                    to: format!("{:?}", ConnectionStatus::Idle),
                }));
            }
            supersede(&mut session);
            let handles = drain_handles(&mut session);
            session.state.transition(ConnectionStatus::Idle)?;
            session.state.clear_errors();
            session.user = None;
            self.inner.publish(&session);
            handles
        };
        tracing::info!(channels = handles.len(), "Connection error acknowledged");
        self.inner.unsubscribe_all(handles).await;
        Ok(())
    }

    /// Re-derives channels for `user`.
    ///
    /// Does nothing while idle. A logout disconnects; a different user
    /// triggers a refresh so channels authorized only for the previous user
    /// are closed.
    pub async fn sync_user_context(&self, user: Option<UserContext>) -> Result<(), RealtimeError> {
        let (status, current) = {
            let session = self.inner.session();
            (session.state.status(), session.user.clone())
        };
        if !status.is_active() {
            return Ok(());
        }
        match user {
            None => {
                tracing::info!("User signed out, disconnecting");
                self.disconnect().await
            }
            Some(user) if current.as_ref() == Some(&user) => Ok(()),
            Some(user) => {
                tracing::info!(user_id = %user.id, role = %user.role, "User changed, re-deriving channels");
                self.refresh_connection().await.map(|_| ())
            }
        }
    }

    /// Spawns a task that calls `sync_user_context` on every user change.
    ///
    /// The task holds only a weak reference and stops once the manager is
    /// dropped and the next change arrives, or when the provider goes away.
    pub fn spawn_user_watch(&self) -> JoinHandle<()> {
        let mut changes = self.inner.users.changes();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let user = changes.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = ConnectionManager { inner };
                if let Err(e) = manager.sync_user_context(user).await {
                    tracing::warn!(error = %e, "Failed to re-derive channels after user change");
                }
            }
            tracing::debug!("User watch stopped");
        })
    }

    /// Current snapshot of status, records and recorded failures.
    pub fn connection_state(&self) -> ConnectionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn flags(&self) -> OperationFlags {
        self.inner.signals.flags()
    }

    pub fn last_errors(&self) -> OperationErrors {
        self.inner.signals.errors()
    }
}

fn outcome_error(result: &ConnectOutcome) -> Option<RealtimeError> {
    match result {
        Ok(report) => report.first_failure(),
        Err(e) => Some(e.clone()),
    }
}

/// Invalidates every attempt of the current generation.
fn supersede(session: &mut Session) {
    session.generation += 1;
    session.cancel.cancel();
    session.cancel = CancellationToken::new();
    session.pending = None;
}

fn drain_handles(session: &mut Session) -> Vec<Arc<dyn ChannelHandle>> {
    session.handles.drain().flat_map(|(_, handles)| handles).collect()
}

struct Teardown {
    handles: Vec<Arc<dyn ChannelHandle>>,
    generation: u64,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.snapshots.send_replace(session.state.snapshot());
    }

    async fn connect(self: &Arc<Self>) -> ConnectOutcome {
        loop {
            let mut snapshots = self.snapshots.subscribe();
            // The sender lives in `self`, so this only returns once the status moved on.
            let _ = snapshots
                .wait_for(|s| s.status != ConnectionStatus::Disconnecting)
                .await;

            match self.join_or_start() {
                ConnectStart::Await(outcome) => return outcome.await,
                ConnectStart::Done(outcome) => return outcome,
                ConnectStart::WaitForDisconnect => continue,
            }
        }
    }

    fn join_or_start(self: &Arc<Self>) -> ConnectStart {
        let user = self.users.current();
        let mut session = self.session();

        match session.state.status() {
            ConnectionStatus::Disconnecting => return ConnectStart::WaitForDisconnect,
            ConnectionStatus::Connected => {
                tracing::debug!("Already connected");
                return ConnectStart::Done(Ok(ConnectReport::from_state(None, &session.state)));
            }
            _ => {}
        }

        if let Some(pending) = &session.pending {
            if pending.generation == session.generation {
                tracing::debug!("Joining in-flight connect attempt");
                return ConnectStart::Await(pending.outcome.clone());
            }
        }

        let Some(user) = user else {
            session.state.record_failure(
                ErrorCode::AuthenticationRequired,
                None,
                "connect requested without a signed-in user",
            );
            self.publish(&session);
            tracing::warn!("Connect skipped: no signed-in user");
            return ConnectStart::Done(Err(RealtimeError::AuthenticationRequired));
        };

        if let Err(e) = session.state.transition(ConnectionStatus::Connecting) {
            return ConnectStart::Done(Err(e.into()));
        }

        let attempt = AttemptId::new(self.next_attempt.fetch_add(1, Ordering::SeqCst) + 1);
        let generation = session.generation;
        let cancel = session.cancel.clone();
        session.user = Some(user.clone());
        self.publish(&session);

        tracing::info!(attempt = %attempt, user_id = %user.id, "Connecting");
        let task = tokio::spawn(Arc::clone(self).run_attempt(attempt, generation, user, cancel));
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                Err(RealtimeError::Internal(format!("connect task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        session.pending = Some(PendingConnect {
            generation,
            outcome: outcome.clone(),
        });
        ConnectStart::Await(outcome)
    }

    async fn run_attempt(
        self: Arc<Self>,
        attempt: AttemptId,
        generation: u64,
        user: UserContext,
        cancel: CancellationToken,
    ) -> ConnectOutcome {
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.superseded(attempt)),
            resolved = self.resolve_all(&user) => resolved,
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return self.abort_attempt(attempt, generation, e).await,
        };

        // Open every handle before subscribing anything, so a fatal
        // transport error aborts with no subscribe request sent.
        let mut opened = Vec::with_capacity(resolved.len());
        for (entity_type, resolution) in resolved {
            let handles = match &resolution {
                Resolved::Channels(channels) => {
                    let mut handles = Vec::with_capacity(channels.len());
                    for channel in channels {
                        match self.transport.channel(channel) {
                            Ok(handle) => handles.push(handle),
                            Err(e) => {
                                return self.abort_attempt(attempt, generation, e.into()).await
                            }
                        }
                    }
                    handles
                }
                _ => Vec::new(),
            };
            opened.push((entity_type, resolution, handles));
        }

        let Some((work, stale)) = self.register_attempt(attempt, generation, opened) else {
            return Ok(self.superseded(attempt));
        };
        self.unsubscribe_all(stale).await;

        let router: Arc<dyn RealtimeEventHandler> = Arc::new(EventRouter {
            inner: Arc::downgrade(&self),
        });
        let subscriptions = work.into_iter().map(|(entity_type, handles)| {
            let inner = Arc::clone(&self);
            let router = Arc::clone(&router);
            async move {
                let outcome = inner.subscribe_entity(entity_type, &handles, router).await;
                match outcome {
                    Ok(outcome) => {
                        inner.complete(entity_type, attempt, generation, outcome);
                        None
                    }
                    Err(fatal) => Some(fatal),
                }
            }
        });

        let fatal = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(attempt = %attempt, "Connect attempt cancelled");
                return Ok(self.superseded(attempt));
            }
            results = join_all(subscriptions) => results.into_iter().flatten().next(),
        };
        if let Some(fatal) = fatal {
            return self.abort_attempt(attempt, generation, fatal).await;
        }

        self.finish_attempt(attempt, generation)
    }

    async fn resolve_all(
        &self,
        user: &UserContext,
    ) -> Result<Vec<(EntityType, Resolved)>, RealtimeError> {
        let lookups = self.settings.entity_types.iter().map(|&entity_type| async move {
            let names = self
                .resolver
                .authorized_channel_names(entity_type, Some(user))
                .await;
            (entity_type, names)
        });

        let mut resolved = Vec::with_capacity(self.settings.entity_types.len());
        for (entity_type, names) in join_all(lookups).await {
            let resolution = match names {
                Ok(names) if names.is_empty() => Resolved::NotAuthorized,
                Ok(names) => {
                    let channels = names
                        .into_iter()
                        .map(ChannelName::new)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| {
                            RealtimeError::TransportFatal(format!(
                                "malformed channel name for {}: {}",
                                entity_type, e
                            ))
                        })?;
                    Resolved::Channels(channels)
                }
                Err(AuthError::AuthenticationRequired) => {
                    return Err(RealtimeError::AuthenticationRequired)
                }
                Err(e) => Resolved::Denied(e.to_string()),
            };
            resolved.push((entity_type, resolution));
        }
        Ok(resolved)
    }

    /// Writes pending records for this attempt.
    ///
    /// Returns the subscriptions to run and the handles to close, or `None`
    /// when a disconnect already superseded the attempt.
    #[allow(clippy::type_complexity)]
    fn register_attempt(
        &self,
        attempt: AttemptId,
        generation: u64,
        opened: Vec<(EntityType, Resolved, Vec<Arc<dyn ChannelHandle>>)>,
    ) -> Option<(
        Vec<(EntityType, Vec<Arc<dyn ChannelHandle>>)>,
        Vec<Arc<dyn ChannelHandle>>,
    )> {
        let mut session = self.session();
        if session.generation != generation {
            return None;
        }

        let mut work = Vec::new();
        let mut stale = Vec::new();
        for (entity_type, resolution, handles) in opened {
            match resolution {
                Resolved::NotAuthorized => {
                    tracing::debug!(entity_type = %entity_type, "No authorized channel, skipping");
                    session.state.registry_mut().remove(entity_type);
                    stale.extend(session.handles.remove(&entity_type).unwrap_or_default());
                }
                Resolved::Denied(reason) => {
                    tracing::warn!(entity_type = %entity_type, reason = %reason, "Channel authorization failed");
                    stale.extend(session.handles.remove(&entity_type).unwrap_or_default());
                    let mut record = SubscriptionRecord::pending(entity_type, Vec::new(), attempt);
                    // A fresh pending record always accepts the failure.
                    let _ = record.mark_failed(reason.clone());
                    session.state.registry_mut().upsert(record);
                    session
                        .state
                        .record_failure(ErrorCode::Forbidden, Some(entity_type), reason);
                }
                Resolved::Channels(channels) => {
                    let keep = session
                        .state
                        .registry()
                        .get(entity_type)
                        .is_some_and(|r| r.is_subscribed() && r.is_live_on(&channels));
                    if keep {
                        tracing::debug!(entity_type = %entity_type, "Keeping live subscription");
                        continue;
                    }
                    stale.extend(session.handles.remove(&entity_type).unwrap_or_default());
                    session
                        .state
                        .registry_mut()
                        .upsert(SubscriptionRecord::pending(entity_type, channels, attempt));
                    session.handles.insert(entity_type, handles.clone());
                    work.push((entity_type, handles));
                }
            }
        }
        self.publish(&session);
        Some((work, stale))
    }

    /// Subscribes every channel of one entity type.
    ///
    /// `Err` only for fatal transport errors.
    async fn subscribe_entity(
        &self,
        entity_type: EntityType,
        handles: &[Arc<dyn ChannelHandle>],
        router: Arc<dyn RealtimeEventHandler>,
    ) -> Result<AttemptOutcome, RealtimeError> {
        let all = join_all(handles.iter().map(|h| h.subscribe(Arc::clone(&router))));
        let results = match self.settings.subscribe_timeout {
            Some(limit) => match tokio::time::timeout(limit, all).await {
                Ok(results) => results,
                Err(_) => {
                    return Ok(AttemptOutcome::Failed(format!(
                        "no confirmation within {}s",
                        limit.as_secs_f64()
                    )))
                }
            },
            None => all.await,
        };

        for result in results {
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!(entity_type = %entity_type, error = %e, "Fatal transport error");
                    return Err(e.into());
                }
                Err(e) => return Ok(AttemptOutcome::Failed(e.to_string())),
            }
        }
        Ok(AttemptOutcome::Subscribed)
    }

    fn complete(
        &self,
        entity_type: EntityType,
        attempt: AttemptId,
        generation: u64,
        outcome: AttemptOutcome,
    ) {
        let mut session = self.session();
        if session.generation != generation {
            tracing::debug!(entity_type = %entity_type, attempt = %attempt, "Ignoring result of cancelled attempt");
            return;
        }
        let failure = match &outcome {
            AttemptOutcome::Failed(reason) => Some(reason.clone()),
            AttemptOutcome::Subscribed => None,
        };
        if !session
            .state
            .registry_mut()
            .complete_attempt(entity_type, attempt, outcome)
        {
            tracing::debug!(entity_type = %entity_type, attempt = %attempt, "Ignoring stale subscription result");
            return;
        }
        match failure {
            Some(reason) => {
                tracing::warn!(entity_type = %entity_type, reason = %reason, "Channel subscription failed");
                session.state.record_failure(
                    ErrorCode::ChannelSubscriptionFailed,
                    Some(entity_type),
                    reason,
                );
            }
            None => tracing::debug!(entity_type = %entity_type, "Channel subscribed"),
        }
        self.publish(&session);
    }

    fn finish_attempt(&self, attempt: AttemptId, generation: u64) -> ConnectOutcome {
        let mut session = self.session();
        if session.generation != generation {
            drop(session);
            return Ok(self.superseded(attempt));
        }
        let status = session.state.settle();
        if status == ConnectionStatus::Error && session.state.registry().is_empty() {
            session
                .state
                .record_failure(ErrorCode::Forbidden, None, NOTHING_AUTHORIZED);
        }
        session.pending = None;
        self.publish(&session);

        let report = ConnectReport::from_state(Some(attempt), &session.state);
        tracing::info!(
            attempt = %attempt,
            status = %report.status,
            subscribed = report.subscribed.len(),
            failed = report.failed.len(),
            "Connect attempt finished"
        );
        Ok(report)
    }

    async fn abort_attempt(
        &self,
        attempt: AttemptId,
        generation: u64,
        error: RealtimeError,
    ) -> ConnectOutcome {
        let handles = {
            let mut session = self.session();
            if session.generation != generation {
                drop(session);
                return Ok(self.superseded(attempt));
            }
            let handles = drain_handles(&mut session);
            session.state.registry_mut().drain();
            session.state.record_failure(error.code(), None, error.to_string());
            session.state.transition(ConnectionStatus::Error)?;
            session.pending = None;
            self.publish(&session);
            handles
        };
        tracing::error!(attempt = %attempt, error = %error, "Connect attempt aborted");
        self.unsubscribe_all(handles).await;
        Err(error)
    }

    fn superseded(&self, attempt: AttemptId) -> ConnectReport {
        ConnectReport {
            attempt: Some(attempt),
            status: self.session().state.status(),
            subscribed: Vec::new(),
            failed: Vec::new(),
            superseded: true,
        }
    }

    fn begin_teardown(&self) -> Teardown {
        let mut session = self.session();
        let from = session.state.status();
        supersede(&mut session);
        let handles = drain_handles(&mut session);
        if let Err(e) = session.state.transition(ConnectionStatus::Disconnecting) {
            tracing::error!(error = %e, "Disconnect rejected by state machine");
        }
        session.state.registry_mut().drain();
        session.user = None;
        self.publish(&session);
        tracing::debug!(from = %from, channels = handles.len(), "Disconnect started");
        Teardown {
            handles,
            generation: session.generation,
        }
    }

    async fn finish_teardown(&self, teardown: Teardown) {
        self.unsubscribe_all(teardown.handles).await;

        let mut session = self.session();
        if session.generation != teardown.generation {
            tracing::debug!("A newer disconnect owns the teardown");
            return;
        }
        if let Err(e) = session.state.transition(ConnectionStatus::Idle) {
            tracing::error!(error = %e, "Could not return to idle");
            return;
        }
        self.publish(&session);
        tracing::info!("Disconnected");
    }

    async fn unsubscribe_all(&self, handles: Vec<Arc<dyn ChannelHandle>>) {
        if handles.is_empty() {
            return;
        }
        let results = join_all(handles.iter().map(|h| h.unsubscribe())).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(channel = %handle.name(), error = %e, "Unsubscribe failed");
            }
        }
    }

    /// True when `event` arrived on a channel of a current record.
    fn accepts(&self, event: &RealtimeEvent) -> bool {
        self.session()
            .state
            .registry()
            .get(event.entity_type)
            .is_some_and(|r| {
                r.state != SubscriptionState::Error && r.channels.contains(&event.channel)
            })
    }
}

/// Forwards events from live channels to the session's event handler.
struct EventRouter {
    inner: Weak<Inner>,
}

#[async_trait]
impl RealtimeEventHandler for EventRouter {
    async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        if !inner.accepts(&event) {
            tracing::debug!(
                channel = %event.channel,
                entity_type = %event.entity_type,
                "Dropping event from inactive channel"
            );
            return Ok(());
        }
        inner.events.handle(event).await
    }

    fn name(&self) -> &'static str {
        "ConnectionManager"
    }
}
