//! UpdateStockHandler - Optimistic stock level change.

use serde_json::json;
use std::sync::Arc;

use crate::application::{CacheCoordinator, RealtimeError};
use crate::domain::cache::{domains, CacheKey, MutationKind, MutationPlan, MutationResponse};
use crate::domain::foundation::ValidationError;
use crate::ports::{InventoryApi, RemoteError, StockLevel};

/// Command to set a product's stock quantity.
#[derive(Debug, Clone)]
pub struct UpdateStockCommand {
    pub product_id: String,
    pub quantity: u32,
}

/// Cache key holding a product's stock level.
pub fn stock_key(product_id: &str) -> Result<CacheKey, ValidationError> {
    CacheKey::new([domains::INVENTORY, product_id])
}

/// Handler for stock updates.
pub struct UpdateStockHandler {
    coordinator: Arc<CacheCoordinator>,
    inventory: Arc<dyn InventoryApi>,
}

impl UpdateStockHandler {
    pub fn new(coordinator: Arc<CacheCoordinator>, inventory: Arc<dyn InventoryApi>) -> Self {
        Self {
            coordinator,
            inventory,
        }
    }

    pub async fn handle(&self, cmd: UpdateStockCommand) -> Result<StockLevel, RealtimeError> {
        // 1. Build the plan
        let key = stock_key(&cmd.product_id)?;
        let plan = MutationPlan::new(MutationKind::UpdateStock).with_optimistic(
            key.clone(),
            json!({ "product_id": cmd.product_id, "quantity": cmd.quantity }),
        );

        // 2. Run it; the coordinator rolls back on failure
        let inventory = Arc::clone(&self.inventory);
        self.coordinator
            .run_mutation(plan, move || async move {
                let level = inventory.update_stock(&cmd.product_id, cmd.quantity).await?;
                let authoritative = json!({
                    "product_id": level.product_id,
                    "quantity": level.quantity,
                    "updated_at": level.updated_at.as_datetime().to_rfc3339(),
                });
                Ok::<_, RemoteError>(MutationResponse::new(level, vec![(key, authoritative)]))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryCacheStore;
    use crate::application::SessionSignals;
    use crate::domain::cache::InvalidationRules;
    use crate::domain::foundation::Timestamp;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockInventoryApi {
        fail_with: Option<RemoteError>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl MockInventoryApi {
        fn new() -> Self {
            Self {
                fail_with: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: RemoteError) -> Self {
            Self {
                fail_with: Some(error),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InventoryApi for MockInventoryApi {
        async fn update_stock(&self, product_id: &str, quantity: u32) -> Result<StockLevel, RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((product_id.to_string(), quantity));
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            Ok(StockLevel {
                product_id: product_id.to_string(),
                quantity,
                updated_at: Timestamp::now(),
            })
        }
    }

    fn handler(api: MockInventoryApi) -> (Arc<InMemoryCacheStore>, Arc<MockInventoryApi>, UpdateStockHandler) {
        let store = Arc::new(InMemoryCacheStore::new());
        let api = Arc::new(api);
        let coordinator = Arc::new(CacheCoordinator::new(
            store.clone(),
            InvalidationRules::default(),
            SessionSignals::new(),
        ));
        let handler = UpdateStockHandler::new(coordinator, api.clone());
        (store, api, handler)
    }

    fn command(quantity: u32) -> UpdateStockCommand {
        UpdateStockCommand {
            product_id: "sku-1".to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn writes_server_stock_level() {
        let (store, api, handler) = handler(MockInventoryApi::new());

        let level = handler.handle(command(95)).await.unwrap();

        assert_eq!(level.quantity, 95);
        assert_eq!(api.calls.lock().unwrap().as_slice(), &[("sku-1".to_string(), 95)]);
        let cached = store.value(&stock_key("sku-1").unwrap()).unwrap();
        assert_eq!(cached["quantity"], 95);
        assert!(cached["updated_at"].is_string());
    }

    #[tokio::test]
    async fn rejected_update_restores_cached_quantity() {
        let (store, _api, handler) = handler(MockInventoryApi::failing(RemoteError::rejected(
            "stock locked",
        )));
        let key = stock_key("sku-1").unwrap();
        store.seed(&key, json!({ "product_id": "sku-1", "quantity": 100 }));

        let result = handler.handle(command(95)).await;

        assert!(matches!(
            result,
            Err(RealtimeError::MutationFailed {
                kind: MutationKind::UpdateStock,
                ..
            })
        ));
        assert_eq!(store.value(&key).unwrap()["quantity"], 100);
    }

    #[tokio::test]
    async fn empty_product_id_is_rejected_without_remote_call() {
        let (_store, api, handler) = handler(MockInventoryApi::new());

        let result = handler
            .handle(UpdateStockCommand {
                product_id: String::new(),
                quantity: 1,
            })
            .await;

        assert!(matches!(result, Err(RealtimeError::Validation(_))));
        assert!(api.calls.lock().unwrap().is_empty());
    }
}
