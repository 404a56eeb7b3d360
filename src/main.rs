//! Demo: one storefront session against the in-memory adapters.
//!
//! Connects a customer, delivers a couple of change events, runs one
//! failing and one successful stock update, then prints the final state.

use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;

use storefront_sync::adapters::{
    ConfirmMode, InMemoryCacheStore, InMemoryChannelTransport, InMemoryProcessedEventStore,
    InMemoryStorefront, RoleBasedAuthorizationResolver, StaticUserContextProvider,
};
use storefront_sync::application::{
    RealtimeError, SessionPorts, StorefrontSession, UpdateStockCommand,
};
use storefront_sync::config::AppConfig;
use storefront_sync::domain::cache::CacheKey;
use storefront_sync::domain::connection::{ChangeKind, ChannelName, EntityType, RealtimeEvent};
use storefront_sync::domain::foundation::{EventId, UserContext, UserId, UserRole};
use storefront_sync::ports::RemoteError;
use storefront_sync::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = telemetry::init_tracing(&config.logging) {
        eprintln!("Failed to initialise tracing: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = %e.code(), "Demo failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &AppConfig) -> Result<(), RealtimeError> {
    let prefix = &config.realtime.channel_prefix;
    let user = UserContext::new(UserId::new("alice")?, UserRole::Customer);
    let orders_channel = format!("{}:orders:{}", prefix, user.id);

    // Orders is refused by the transport to show a partial connection.
    let transport = InMemoryChannelTransport::new()
        .with_mode(&orders_channel, ConfirmMode::Fail("channel quota exceeded".into()));
    let store = Arc::new(InMemoryCacheStore::new());
    let backend = Arc::new(InMemoryStorefront::new().with_stock("sku-1", 100));
    let users = Arc::new(StaticUserContextProvider::signed_in(user));

    let session = StorefrontSession::new(
        config,
        SessionPorts {
            transport: Arc::new(transport.clone()),
            resolver: Arc::new(RoleBasedAuthorizationResolver::new(prefix.clone())),
            users,
            store: store.clone(),
            processed_events: Arc::new(InMemoryProcessedEventStore::with_capacity(
                config.cache.event_dedup_capacity,
            )),
            inventory: backend.clone(),
            pickups: backend.clone(),
            profiles: backend.clone(),
        },
    );
    session.start();

    let report = session.connect().await?;
    tracing::info!(
        subscribed = ?report.subscribed,
        failed = ?report.failed,
        all_connected = report.all_connected(),
        "Connect finished"
    );

    store.seed(&"products/sku-1".parse::<CacheKey>()?, json!({ "name": "Espresso beans" }));
    store.seed(&"cart/alice".parse::<CacheKey>()?, json!({ "items": ["sku-1"] }));
    let products = ChannelName::new(format!("{}:products", prefix))?;
    let event = RealtimeEvent::new(EntityType::Products, products, ChangeKind::Update)
        .with_event_id(EventId::from_string("demo-1"))
        .with_record_id("sku-1");
    transport.emit(event.clone()).await;
    transport.emit(event).await;
    tracing::info!(stale = ?store.stale_keys(), "Product change delivered twice");

    let stock_key: CacheKey = "inventory/sku-1".parse()?;
    store.seed(&stock_key, json!({ "product_id": "sku-1", "quantity": 100 }));
    backend.fail_next(RemoteError::unavailable("inventory service timed out"));
    let command = UpdateStockCommand {
        product_id: "sku-1".to_string(),
        quantity: 95,
    };
    if let Err(e) = session.update_stock(command.clone()).await {
        tracing::warn!(error = %e, cached = ?store.value(&stock_key), "Stock update rolled back");
    }
    let level = session.update_stock(command).await?;
    tracing::info!(quantity = level.quantity, "Stock update confirmed");

    let snapshot = session.connection_state();
    match serde_json::to_string_pretty(&snapshot) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::warn!(error = %e, "Could not render connection state"),
    }

    session.shutdown().await
}
