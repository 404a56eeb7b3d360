//! In-memory channel transport.
//!
//! Each channel can be told how to answer subscribe requests: confirm at
//! once, fail, or hold the request until the test releases it. The
//! transport counts subscribe and unsubscribe calls, tracks which
//! subscriptions are live, and delivers emitted events to live subscribers.
//!
//! A subscribe future that is dropped while held never becomes live, and an
//! unsubscribed handle ignores a confirmation that arrives afterwards.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};

use crate::domain::connection::{ChannelName, RealtimeEvent};
use crate::ports::{ChannelHandle, ChannelTransport, RealtimeEventHandler, TransportError};

/// How a channel answers subscribe requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmMode {
    #[default]
    Confirm,
    Fail(String),
    /// Wait until `release` or `release_with_error` is called.
    Hold,
}

type HeldReply = oneshot::Sender<Result<(), TransportError>>;

#[derive(Default)]
struct TransportState {
    default_mode: ConfirmMode,
    modes: HashMap<ChannelName, ConfirmMode>,
    fatal: HashSet<ChannelName>,
    failing_unsubscribe: HashSet<ChannelName>,
    subscribe_calls: HashMap<ChannelName, usize>,
    unsubscribe_calls: HashMap<ChannelName, usize>,
    held: HashMap<ChannelName, Vec<HeldReply>>,
    live: BTreeMap<ChannelName, Vec<(u64, Arc<dyn RealtimeEventHandler>)>>,
    next_subscription: u64,
}

impl TransportState {
    fn mode_for(&self, channel: &ChannelName) -> ConfirmMode {
        self.modes
            .get(channel)
            .cloned()
            .unwrap_or_else(|| self.default_mode.clone())
    }
}

struct Shared {
    state: Mutex<TransportState>,
    changed: Notify,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory `ChannelTransport` for tests and the demo binary.
///
/// # Example
///
/// ```ignore
/// let transport = InMemoryChannelTransport::new()
///     .with_mode("storefront:orders:alice", ConfirmMode::Fail("denied".into()));
///
/// // ... connect ...
///
/// assert_eq!(transport.subscribe_count("storefront:cart:alice"), 1);
/// transport.emit(event).await;
/// ```
#[derive(Clone)]
pub struct InMemoryChannelTransport {
    shared: Arc<Shared>,
}

impl InMemoryChannelTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TransportState::default()),
                changed: Notify::new(),
            }),
        }
    }

    fn name(channel: &str) -> Option<ChannelName> {
        ChannelName::new(channel).ok()
    }

    /// Sets the answer for one channel. Invalid names are ignored.
    pub fn with_mode(self, channel: &str, mode: ConfirmMode) -> Self {
        self.set_mode(channel, mode);
        self
    }

    /// Sets the answer for channels without an explicit mode.
    pub fn with_default_mode(self, mode: ConfirmMode) -> Self {
        self.shared.state().default_mode = mode;
        self
    }

    /// Makes `channel()` fail fatally for this name.
    pub fn with_fatal_channel(self, channel: &str) -> Self {
        if let Some(name) = Self::name(channel) {
            self.shared.state().fatal.insert(name);
        }
        self
    }

    /// Makes unsubscribe fail for this name. The subscription is still dropped.
    pub fn with_failing_unsubscribe(self, channel: &str) -> Self {
        if let Some(name) = Self::name(channel) {
            self.shared.state().failing_unsubscribe.insert(name);
        }
        self
    }

    pub fn set_mode(&self, channel: &str, mode: ConfirmMode) {
        if let Some(name) = Self::name(channel) {
            self.shared.state().modes.insert(name, mode);
        }
    }

    /// Confirms every held request on `channel`. Returns how many were released.
    pub fn release(&self, channel: &str) -> usize {
        self.answer_held(channel, || Ok(()))
    }

    /// Fails every held request on `channel`.
    pub fn release_with_error(&self, channel: &str, reason: &str) -> usize {
        let Some(name) = Self::name(channel) else {
            return 0;
        };
        let error = TransportError::subscription_failed(&name, reason);
        self.answer_held(channel, || Err(error.clone()))
    }

    fn answer_held(
        &self,
        channel: &str,
        reply: impl Fn() -> Result<(), TransportError>,
    ) -> usize {
        let Some(name) = Self::name(channel) else {
            return 0;
        };
        let waiters = self.shared.state().held.remove(&name).unwrap_or_default();
        let count = waiters.len();
        for waiter in waiters {
            // The requester may have given up already.
            let _ = waiter.send(reply());
        }
        count
    }

    /// Delivers `event` to every live subscriber of its channel.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn emit(&self, event: RealtimeEvent) -> usize {
        let handlers: Vec<Arc<dyn RealtimeEventHandler>> = self
            .shared
            .state()
            .live
            .get(&event.channel)
            .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in &handlers {
            if let Err(e) = handler.handle(event.clone()).await {
                tracing::warn!(
                    channel = %event.channel,
                    handler = handler.name(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }
        handlers.len()
    }

    // === Test Helpers ===

    pub fn subscribe_count(&self, channel: &str) -> usize {
        Self::name(channel)
            .and_then(|n| self.shared.state().subscribe_calls.get(&n).copied())
            .unwrap_or(0)
    }

    pub fn total_subscribe_count(&self) -> usize {
        self.shared.state().subscribe_calls.values().sum()
    }

    pub fn unsubscribe_count(&self, channel: &str) -> usize {
        Self::name(channel)
            .and_then(|n| self.shared.state().unsubscribe_calls.get(&n).copied())
            .unwrap_or(0)
    }

    /// Number of live subscriptions on `channel`.
    pub fn live_count(&self, channel: &str) -> usize {
        Self::name(channel)
            .and_then(|n| self.shared.state().live.get(&n).map(Vec::len))
            .unwrap_or(0)
    }

    /// Channels with at least one live subscription.
    pub fn live_channels(&self) -> BTreeSet<String> {
        self.shared
            .state()
            .live
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Number of requests currently held on `channel`.
    pub fn held_count(&self, channel: &str) -> usize {
        Self::name(channel)
            .and_then(|n| self.shared.state().held.get(&n).map(Vec::len))
            .unwrap_or(0)
    }

    /// Waits until at least `count` requests are held on `channel`.
    pub async fn wait_for_held(&self, channel: &str, count: usize) {
        loop {
            let notified = self.shared.changed.notified();
            if self.held_count(channel) >= count {
                return;
            }
            notified.await;
        }
    }
}

impl Default for InMemoryChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTransport for InMemoryChannelTransport {
    fn channel(&self, name: &ChannelName) -> Result<Arc<dyn ChannelHandle>, TransportError> {
        if self.shared.state().fatal.contains(name) {
            return Err(TransportError::fatal(format!("channel '{}' rejected", name)));
        }
        Ok(Arc::new(InMemoryChannel {
            name: name.clone(),
            shared: self.shared.clone(),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

struct InMemoryChannel {
    name: ChannelName,
    shared: Arc<Shared>,
    subscription: Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl InMemoryChannel {
    fn subscription(&self) -> MutexGuard<'_, Option<u64>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChannelHandle for InMemoryChannel {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    async fn subscribe(&self, handler: Arc<dyn RealtimeEventHandler>) -> Result<(), TransportError> {
        let waiter = {
            let mut state = self.shared.state();
            *state.subscribe_calls.entry(self.name.clone()).or_default() += 1;
            match state.mode_for(&self.name) {
                ConfirmMode::Confirm => None,
                ConfirmMode::Fail(reason) => {
                    return Err(TransportError::subscription_failed(&self.name, reason));
                }
                ConfirmMode::Hold => {
                    let (tx, rx) = oneshot::channel();
                    state.held.entry(self.name.clone()).or_default().push(tx);
                    Some(rx)
                }
            }
        };
        self.shared.changed.notify_waiters();

        if let Some(rx) = waiter {
            match rx.await {
                Ok(reply) => reply?,
                Err(_) => return Err(TransportError::Closed(self.name.to_string())),
            }
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.name.to_string()));
        }

        let id = {
            let mut state = self.shared.state();
            state.next_subscription += 1;
            let id = state.next_subscription;
            state
                .live
                .entry(self.name.clone())
                .or_default()
                .push((id, handler));
            id
        };
        *self.subscription() = Some(id);
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let id = self.subscription().take();
        let failing = {
            let mut state = self.shared.state();
            *state.unsubscribe_calls.entry(self.name.clone()).or_default() += 1;
            if let Some(id) = id {
                if let Some(subs) = state.live.get_mut(&self.name) {
                    subs.retain(|(sub, _)| *sub != id);
                }
            }
            state.failing_unsubscribe.contains(&self.name)
        };
        self.shared.changed.notify_waiters();

        if failing {
            return Err(TransportError::Closed(self.name.to_string()));
        }
        Ok(())
    }
}
