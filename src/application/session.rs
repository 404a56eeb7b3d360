//! StorefrontSession - one client session's realtime and cache engine.
//!
//! Owns the connection manager, the cache coordinator and the mutation
//! handlers, all sharing one set of operation signals. Callers obtain it at
//! session start and call `shutdown` at session end.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::IdempotentHandler;
use crate::config::AppConfig;
use crate::domain::cache::InvalidationRules;
use crate::domain::connection::ConnectionSnapshot;
use crate::ports::{
    AuthorizationResolver, CacheStore, ChannelTransport, InventoryApi, Pickup, PickupApi,
    ProcessedEventStore, Profile, ProfileApi, RealtimeEventHandler, StockLevel,
    UserContextProvider,
};

use super::handlers::mutation::{
    ReschedulePickupCommand, ReschedulePickupHandler, UpdateProfileCommand, UpdateProfileHandler,
    UpdateStockCommand, UpdateStockHandler,
};
use super::{
    CacheCoordinator, ConnectReport, ConnectionManager, ConnectionSettings, InvalidationSummary,
    OperationErrors, OperationFlags, RealtimeError, SessionSignals,
};

/// External collaborators of a session.
pub struct SessionPorts {
    pub transport: Arc<dyn ChannelTransport>,
    pub resolver: Arc<dyn AuthorizationResolver>,
    pub users: Arc<dyn UserContextProvider>,
    pub store: Arc<dyn CacheStore>,
    pub processed_events: Arc<dyn ProcessedEventStore>,
    pub inventory: Arc<dyn InventoryApi>,
    pub pickups: Arc<dyn PickupApi>,
    pub profiles: Arc<dyn ProfileApi>,
}

pub struct StorefrontSession {
    connection: ConnectionManager,
    cache: Arc<CacheCoordinator>,
    signals: Arc<SessionSignals>,
    update_stock: UpdateStockHandler,
    reschedule_pickup: ReschedulePickupHandler,
    update_profile: UpdateProfileHandler,
    user_watch: Mutex<Option<JoinHandle<()>>>,
}

impl StorefrontSession {
    pub fn new(config: &AppConfig, ports: SessionPorts) -> Self {
        Self::with_rules(config, ports, InvalidationRules::storefront_defaults())
    }

    pub fn with_rules(config: &AppConfig, ports: SessionPorts, rules: InvalidationRules) -> Self {
        let signals = SessionSignals::new();
        let cache = Arc::new(CacheCoordinator::new(ports.store, rules, Arc::clone(&signals)));

        let events: Arc<dyn RealtimeEventHandler> = Arc::new(IdempotentHandler::new(
            Arc::clone(&cache),
            ports.processed_events,
        ));
        let connection = ConnectionManager::new(
            ports.transport,
            ports.resolver,
            ports.users,
            events,
            ConnectionSettings::from(&config.realtime),
            Arc::clone(&signals),
        );

        Self {
            update_stock: UpdateStockHandler::new(Arc::clone(&cache), ports.inventory),
            reschedule_pickup: ReschedulePickupHandler::new(Arc::clone(&cache), ports.pickups),
            update_profile: UpdateProfileHandler::new(Arc::clone(&cache), ports.profiles),
            connection,
            cache,
            signals,
            user_watch: Mutex::new(None),
        }
    }

    /// Starts following user changes. Calling it again has no effect.
    pub fn start(&self) {
        let mut watch = self.user_watch.lock().unwrap_or_else(PoisonError::into_inner);
        if watch.is_none() {
            *watch = Some(self.connection.spawn_user_watch());
            tracing::debug!("Session started");
        }
    }

    /// Stops following user changes and disconnects.
    pub async fn shutdown(&self) -> Result<(), RealtimeError> {
        let watch = self
            .user_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = watch {
            handle.abort();
        }
        self.connection.disconnect().await?;
        tracing::info!("Session shut down");
        Ok(())
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub async fn connect(&self) -> Result<ConnectReport, RealtimeError> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        self.connection.disconnect().await
    }

    pub async fn refresh_connection(&self) -> Result<ConnectReport, RealtimeError> {
        self.connection.refresh_connection().await
    }

    pub async fn force_refresh_user_data(&self) -> Result<InvalidationSummary, RealtimeError> {
        self.cache.force_refresh_user_data().await
    }

    pub async fn update_stock(&self, cmd: UpdateStockCommand) -> Result<StockLevel, RealtimeError> {
        self.update_stock.handle(cmd).await
    }

    pub async fn reschedule_pickup(
        &self,
        cmd: ReschedulePickupCommand,
    ) -> Result<Pickup, RealtimeError> {
        self.reschedule_pickup.handle(cmd).await
    }

    pub async fn update_profile(&self, cmd: UpdateProfileCommand) -> Result<Profile, RealtimeError> {
        self.update_profile.handle(cmd).await
    }

    pub fn connection_state(&self) -> ConnectionSnapshot {
        self.connection.connection_state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.connection.watch_connection_state()
    }

    pub fn flags(&self) -> OperationFlags {
        self.signals.flags()
    }

    pub fn watch_flags(&self) -> watch::Receiver<OperationFlags> {
        self.signals.watch_flags()
    }

    pub fn last_errors(&self) -> OperationErrors {
        self.signals.errors()
    }

    pub fn watch_errors(&self) -> watch::Receiver<OperationErrors> {
        self.signals.watch_errors()
    }
}
