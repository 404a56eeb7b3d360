//! Operation flags and per-operation last errors, published on watch channels.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::RealtimeError;

/// Caller-visible long-running operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Disconnect,
    Refresh,
    ForceRefresh,
}

/// Which operations are currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperationFlags {
    pub is_connecting: bool,
    pub is_disconnecting: bool,
    pub is_refreshing: bool,
    pub is_refreshing_user_data: bool,
}

/// Last error of each operation; cleared when the operation next succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationErrors {
    pub connect: Option<RealtimeError>,
    pub disconnect: Option<RealtimeError>,
    pub refresh: Option<RealtimeError>,
    pub force_refresh: Option<RealtimeError>,
}

impl OperationErrors {
    pub fn get(&self, op: Operation) -> Option<&RealtimeError> {
        self.slot(op).as_ref()
    }

    fn slot(&self, op: Operation) -> &Option<RealtimeError> {
        match op {
            Operation::Connect => &self.connect,
            Operation::Disconnect => &self.disconnect,
            Operation::Refresh => &self.refresh,
            Operation::ForceRefresh => &self.force_refresh,
        }
    }

    fn slot_mut(&mut self, op: Operation) -> &mut Option<RealtimeError> {
        match op {
            Operation::Connect => &mut self.connect,
            Operation::Disconnect => &mut self.disconnect,
            Operation::Refresh => &mut self.refresh,
            Operation::ForceRefresh => &mut self.force_refresh,
        }
    }
}

#[derive(Debug, Default)]
struct Running {
    connect: usize,
    disconnect: usize,
    refresh: usize,
    force_refresh: usize,
}

impl Running {
    fn counter(&mut self, op: Operation) -> &mut usize {
        match op {
            Operation::Connect => &mut self.connect,
            Operation::Disconnect => &mut self.disconnect,
            Operation::Refresh => &mut self.refresh,
            Operation::ForceRefresh => &mut self.force_refresh,
        }
    }

    fn flags(&self) -> OperationFlags {
        OperationFlags {
            is_connecting: self.connect > 0,
            is_disconnecting: self.disconnect > 0,
            is_refreshing: self.refresh > 0,
            is_refreshing_user_data: self.force_refresh > 0,
        }
    }
}

/// Shared by the connection manager and the cache coordinator of one session.
#[derive(Debug)]
pub struct SessionSignals {
    running: Mutex<Running>,
    flags: watch::Sender<OperationFlags>,
    errors: watch::Sender<OperationErrors>,
}

impl SessionSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: Mutex::new(Running::default()),
            flags: watch::channel(OperationFlags::default()).0,
            errors: watch::channel(OperationErrors::default()).0,
        })
    }

    fn running(&self) -> MutexGuard<'_, Running> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raises the flag for `op` until the returned guard is dropped.
    pub fn begin(self: &Arc<Self>, op: Operation) -> OperationGuard {
        let mut running = self.running();
        *running.counter(op) += 1;
        self.flags.send_replace(running.flags());
        OperationGuard {
            signals: Arc::clone(self),
            op,
        }
    }

    fn end(&self, op: Operation) {
        let mut running = self.running();
        let counter = running.counter(op);
        *counter = counter.saturating_sub(1);
        self.flags.send_replace(running.flags());
    }

    /// Stores the outcome of `op` on its error channel.
    pub fn record<T>(&self, op: Operation, result: &Result<T, RealtimeError>) {
        let error = result.as_ref().err().cloned();
        self.errors.send_modify(|errors| *errors.slot_mut(op) = error);
    }

    pub fn record_error(&self, op: Operation, error: Option<RealtimeError>) {
        self.errors.send_modify(|errors| *errors.slot_mut(op) = error);
    }

    pub fn flags(&self) -> OperationFlags {
        *self.flags.borrow()
    }

    pub fn watch_flags(&self) -> watch::Receiver<OperationFlags> {
        self.flags.subscribe()
    }

    pub fn errors(&self) -> OperationErrors {
        self.errors.borrow().clone()
    }

    pub fn watch_errors(&self) -> watch::Receiver<OperationErrors> {
        self.errors.subscribe()
    }
}

/// Lowers its operation's flag on drop.
#[must_use = "the flag is lowered as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OperationGuard {
    signals: Arc<SessionSignals>,
    op: Operation,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.signals.end(self.op);
    }
}
