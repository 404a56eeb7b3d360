//! Cache coordinator - optimistic mutations and invalidation fan-out.
//!
//! A mutation runs as:
//!
//! 1. Cancel in-flight fetches for every touched key, snapshot its current
//!    entry (value and freshness) and claim it.
//! 2. Write the optimistic values.
//! 3. Await the remote call.
//! 4. Settle each key: confirmed keys take the server value, unconfirmed
//!    ones are marked stale, and on failure the key goes back to its base.
//! 5. On success, invalidate the related patterns.
//!
//! Overlapping mutations stack their claims per key. Only the newest
//! claimant writes; an older one settling underneath it hands its result
//! up as the newer claim's rollback base. Steps 1-2 and 4 run under one
//! async lock so a settle never interleaves with another mutation's
//! snapshot. A mutation dropped before settling is rolled back as failed.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::domain::cache::{
    merge_patterns, CacheKey, InvalidationRequest, InvalidationRules, KeyOutcome, KeyOwners, KeyPattern,
    MutationContext, MutationId, MutationPlan, MutationResponse, StoreWrite,
};
use crate::domain::connection::{EntityType, RealtimeEvent};
use crate::ports::{CacheError, CacheStore, HandlerError, RealtimeEventHandler, RemoteError};

use super::signals::{Operation, SessionSignals};
use super::RealtimeError;

/// What one invalidation pass did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvalidationSummary {
    pub source: Option<EntityType>,
    /// Patterns actually sent to the store, after merging.
    pub patterns: Vec<KeyPattern>,
    /// Keys that went from fresh to stale. Empty for a repeated event.
    pub newly_stale: Vec<CacheKey>,
}

/// Rolls a claimed mutation back if it is dropped before settling.
struct Unsettled {
    store: Arc<dyn CacheStore>,
    owners: Arc<Mutex<KeyOwners>>,
    id: MutationId,
    keys: BTreeSet<CacheKey>,
    armed: bool,
}

impl Unsettled {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Unsettled {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        let outcomes: Vec<_> = std::mem::take(&mut self.keys)
            .into_iter()
            .map(|key| (key, KeyOutcome::Failed))
            .collect();
        let store = Arc::clone(&self.store);
        let owners = Arc::clone(&self.owners);
        match Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(mutation_id = %id, "Mutation dropped before settling, rolling back");
                handle.spawn(async move {
                    let mut owners = owners.lock().await;
                    apply_outcomes(store.as_ref(), &mut owners, id, outcomes).await;
                });
            }
            Err(_) => {
                tracing::error!(mutation_id = %id, "Mutation dropped outside a runtime, optimistic values left in cache");
            }
        }
    }
}

/// Settles `id`'s claims and performs the writes it is still entitled to.
async fn apply_outcomes(
    store: &dyn CacheStore,
    owners: &mut KeyOwners,
    id: MutationId,
    outcomes: Vec<(CacheKey, KeyOutcome)>,
) {
    for (key, outcome) in outcomes {
        let Some(write) = owners.settle(id, &key, outcome) else {
            tracing::debug!(mutation_id = %id, key = %key, "Key held by a newer mutation, handed over");
            continue;
        };
        let written = match write {
            StoreWrite::Set(value) => store.set(&key, value).await,
            StoreWrite::Restore(entry) => store.restore(&key, entry).await,
            StoreWrite::Invalidate => match store.invalidate(&key.as_pattern()).await {
                Err(e) if !e.is_conflict() => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = written {
            tracing::error!(mutation_id = %id, key = %key, error = %e, "Settling write failed");
        }
    }
}

pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    rules: InvalidationRules,
    owners: Arc<Mutex<KeyOwners>>,
    next_mutation: AtomicU64,
    signals: Arc<SessionSignals>,
}

impl CacheCoordinator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        rules: InvalidationRules,
        signals: Arc<SessionSignals>,
    ) -> Self {
        Self {
            store,
            rules,
            owners: Arc::new(Mutex::new(KeyOwners::new())),
            next_mutation: AtomicU64::new(0),
            signals,
        }
    }

    /// Runs `remote` as an optimistic mutation described by `plan`.
    ///
    /// On `Err(MutationFailed)` every touched key no newer mutation holds is
    /// back to the entry it had before the optimistic write, stale flag
    /// included. Dropping the returned future before it completes rolls
    /// the mutation back the same way.
    pub async fn run_mutation<T, F, Fut>(&self, plan: MutationPlan, remote: F) -> Result<T, RealtimeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MutationResponse<T>, RemoteError>>,
    {
        let id = MutationId::new(self.next_mutation.fetch_add(1, Ordering::SeqCst) + 1);
        let keys = plan.touched_keys();
        let mut unsettled = Unsettled {
            store: Arc::clone(&self.store),
            owners: Arc::clone(&self.owners),
            id,
            keys: keys.clone(),
            armed: false,
        };

        let context = {
            let mut owners = self.owners.lock().await;
            let context = self.begin(id, &plan, &keys).await?;
            owners.claim(&context);
            unsettled.arm();
            tracing::debug!(mutation_id = %id, kind = %plan.kind, keys = keys.len(), "Mutation started");

            if let Err(e) = self.apply_optimistic(&plan).await {
                tracing::warn!(mutation_id = %id, error = %e, "Optimistic write failed, rolling back");
                apply_outcomes(self.store.as_ref(), &mut owners, id, context.into_failure()).await;
                unsettled.disarm();
                return Err(e.into());
            }
            context
        };

        let kind = context.kind();
        match remote().await {
            Ok(response) => {
                let related = context.related().to_vec();
                {
                    let mut owners = self.owners.lock().await;
                    let outcomes = context.into_success(response.authoritative);
                    apply_outcomes(self.store.as_ref(), &mut owners, id, outcomes).await;
                    unsettled.disarm();
                }
                if let Err(e) = self.invalidate_patterns(&merge_patterns(&related)).await {
                    tracing::warn!(mutation_id = %id, error = %e, "Related invalidation failed");
                }
                tracing::info!(mutation_id = %id, kind = %kind, "Mutation succeeded");
                Ok(response.output)
            }
            Err(e) => {
                tracing::warn!(mutation_id = %id, kind = %kind, error = %e, "Mutation failed, rolling back");
                let mut owners = self.owners.lock().await;
                apply_outcomes(self.store.as_ref(), &mut owners, id, context.into_failure()).await;
                unsettled.disarm();
                Err(RealtimeError::mutation_failed(kind, e.to_string()))
            }
        }
    }

    async fn begin(
        &self,
        id: MutationId,
        plan: &MutationPlan,
        keys: &BTreeSet<CacheKey>,
    ) -> Result<MutationContext, RealtimeError> {
        for key in keys {
            let cancelled = self.store.cancel_in_flight(&key.as_pattern()).await?;
            if cancelled > 0 {
                tracing::debug!(mutation_id = %id, key = %key, cancelled, "Cancelled in-flight fetches");
            }
        }
        let mut snapshot = BTreeMap::new();
        for key in keys {
            snapshot.insert(key.clone(), self.store.entry(key).await?);
        }
        Ok(MutationContext::capture(id, plan, snapshot))
    }

    async fn apply_optimistic(&self, plan: &MutationPlan) -> Result<(), CacheError> {
        for (key, value) in &plan.optimistic {
            self.store.set(key, value.clone()).await?;
        }
        Ok(())
    }

    /// Marks every pattern of `request` stale.
    pub async fn invalidate(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationSummary, RealtimeError> {
        let patterns = request.merged_patterns();
        let newly_stale = self.invalidate_patterns(&patterns).await?;
        Ok(InvalidationSummary {
            source: request.source_entity_type,
            patterns,
            newly_stale,
        })
    }

    async fn invalidate_patterns(&self, patterns: &[KeyPattern]) -> Result<Vec<CacheKey>, RealtimeError> {
        let mut newly_stale = Vec::new();
        for pattern in patterns {
            match self.store.invalidate(pattern).await {
                Ok(keys) => newly_stale.extend(keys),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(pattern = %pattern, "Concurrent invalidation, already stale");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(newly_stale)
    }

    /// Applies the fan-out rule for `event`.
    pub async fn handle_event(
        &self,
        event: &RealtimeEvent,
    ) -> Result<InvalidationSummary, RealtimeError> {
        let request = self.rules.request_for(event);
        let summary = self.invalidate(&request).await?;
        tracing::debug!(
            event_id = %event.event_id,
            entity_type = %event.entity_type,
            patterns = summary.patterns.len(),
            newly_stale = summary.newly_stale.len(),
            "Invalidated cache for event"
        );
        Ok(summary)
    }

    /// Cancels in-flight fetches for every user-scoped domain, then marks
    /// those domains stale.
    pub async fn force_refresh_user_data(&self) -> Result<InvalidationSummary, RealtimeError> {
        let _flag = self.signals.begin(Operation::ForceRefresh);
        let result = self.refresh_user_data().await;
        self.signals.record(Operation::ForceRefresh, &result);
        result
    }

    async fn refresh_user_data(&self) -> Result<InvalidationSummary, RealtimeError> {
        let request = self.rules.user_data_request();
        for pattern in request.merged_patterns() {
            self.store.cancel_in_flight(&pattern).await?;
        }
        let summary = self.invalidate(&request).await?;
        tracing::info!(newly_stale = summary.newly_stale.len(), "User data refresh requested");
        Ok(summary)
    }

    /// True while no mutation holds a claim and none is settling.
    pub fn is_idle(&self) -> bool {
        self.owners.try_lock().is_ok_and(|owners| owners.is_empty())
    }
}

#[async_trait]
impl RealtimeEventHandler for CacheCoordinator {
    async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError> {
        self.handle_event(&event)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::new(self.name(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "CacheCoordinator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryCacheStore;
    use crate::domain::cache::MutationKind;
    use crate::domain::connection::{ChangeKind, ChannelName};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn key(s: &str) -> CacheKey {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<InMemoryCacheStore>, CacheCoordinator) {
        let store = Arc::new(InMemoryCacheStore::new());
        let coordinator = CacheCoordinator::new(
            store.clone(),
            InvalidationRules::storefront_defaults(),
            SessionSignals::new(),
        );
        (store, coordinator)
    }

    fn stock_plan(value: u32) -> MutationPlan {
        MutationPlan::new(MutationKind::UpdateStock)
            .with_optimistic(key("inventory/sku-1"), json!({ "quantity": value }))
    }

    #[tokio::test]
    async fn failed_mutation_restores_prior_value() {
        let (store, coordinator) = setup();
        store.seed(&key("inventory/sku-1"), json!({ "quantity": 100 }));

        let result: Result<(), _> = coordinator
            .run_mutation(stock_plan(95), || async {
                Err(RemoteError::unavailable("timeout"))
            })
            .await;

        assert!(matches!(result, Err(RealtimeError::MutationFailed { .. })));
        assert_eq!(store.value(&key("inventory/sku-1")), Some(json!({ "quantity": 100 })));
        assert!(store.stale_keys().is_empty());
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn failed_mutation_restores_staleness() {
        let (store, coordinator) = setup();
        let k = key("profile/u1");
        store.seed(&k, json!(0));
        store.invalidate(&k.as_pattern()).await.unwrap();
        let plan = MutationPlan::new(MutationKind::UpdateProfile)
            .with_related(vec![])
            .with_optimistic(k.clone(), json!(1));

        let result: Result<(), _> = coordinator
            .run_mutation(plan, || async { Err(RemoteError::unavailable("timeout")) })
            .await;

        assert!(result.is_err());
        assert_eq!(store.value(&k), Some(json!(0)));
        assert!(store.is_stale(&k));
    }

    #[tokio::test]
    async fn dropped_mutation_is_rolled_back() {
        let (store, coordinator) = setup();
        store.seed(&key("inventory/sku-1"), json!({ "quantity": 100 }));

        let run = coordinator.run_mutation::<(), _, _>(stock_plan(95), || std::future::pending());
        assert!(tokio::time::timeout(Duration::from_millis(20), run).await.is_err());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !coordinator.is_idle() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(store.value(&key("inventory/sku-1")), Some(json!({ "quantity": 100 })));
    }

    #[tokio::test]
    async fn failed_mutation_removes_key_that_was_absent() {
        let (store, coordinator) = setup();

        let _ = coordinator
            .run_mutation::<(), _, _>(stock_plan(95), || async {
                Err(RemoteError::rejected("no such product"))
            })
            .await;

        assert_eq!(store.value(&key("inventory/sku-1")), None);
    }

    #[tokio::test]
    async fn optimistic_value_visible_during_remote_call() {
        let (store, coordinator) = setup();
        store.seed(&key("inventory/sku-1"), json!({ "quantity": 100 }));
        let observed = Mutex::new(None);

        coordinator
            .run_mutation(stock_plan(95), || async {
                *observed.lock().unwrap() = store.value(&key("inventory/sku-1"));
                Ok(MutationResponse::new((), vec![]))
            })
            .await
            .unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(json!({ "quantity": 95 })));
    }

    #[tokio::test]
    async fn success_writes_authoritative_value_and_invalidates_related() {
        let (store, coordinator) = setup();
        store.seed(&key("inventory/sku-1"), json!({ "quantity": 100 }));
        store.seed(&key("products/list"), json!([]));
        store.seed(&key("dashboard/summary"), json!({}));
        store.seed(&key("cart/u1"), json!([]));

        let output = coordinator
            .run_mutation(stock_plan(95), || async {
                Ok(MutationResponse::new(
                    "ok",
                    vec![(key("inventory/sku-1"), json!({ "quantity": 94 }))],
                ))
            })
            .await
            .unwrap();

        assert_eq!(output, "ok");
        assert_eq!(store.value(&key("inventory/sku-1")), Some(json!({ "quantity": 94 })));
        assert!(store.is_stale(&key("products/list")));
        assert!(store.is_stale(&key("dashboard/summary")));
        assert!(!store.is_stale(&key("cart/u1")));
        // Covered by the related `inventory` pattern.
        assert!(store.is_stale(&key("inventory/sku-1")));
    }

    #[tokio::test]
    async fn unconfirmed_optimistic_key_is_marked_stale() {
        let (store, coordinator) = setup();
        let plan = MutationPlan::new(MutationKind::UpdateProfile)
            .with_related(vec![])
            .with_optimistic(key("profile/u1"), json!({ "display_name": "B" }));

        coordinator
            .run_mutation(plan, || async { Ok(MutationResponse::new((), vec![])) })
            .await
            .unwrap();

        assert!(store.is_stale(&key("profile/u1")));
    }

    #[tokio::test]
    async fn begin_cancels_in_flight_fetch() {
        let (store, coordinator) = setup();
        let k = key("inventory/sku-1");
        let ticket = store.begin_fetch(&k);

        coordinator
            .run_mutation(stock_plan(95), || async {
                Ok(MutationResponse::new((), vec![(key("inventory/sku-1"), json!({ "quantity": 95 }))]))
            })
            .await
            .unwrap();

        assert!(!store.complete_fetch(&k, ticket, json!({ "quantity": 100 })));
        assert_eq!(store.value(&k), Some(json!({ "quantity": 95 })));
    }

    #[tokio::test]
    async fn unavailable_store_fails_before_remote_call() {
        let (store, coordinator) = setup();
        store.set_unavailable(true);
        let mut called = false;

        let result: Result<(), _> = coordinator
            .run_mutation(stock_plan(95), || {
                called = true;
                async { Ok(MutationResponse::new((), vec![])) }
            })
            .await;

        assert!(matches!(result, Err(RealtimeError::Cache(_))));
        assert!(!called);
        assert!(coordinator.is_idle());
    }

    fn event(entity_type: EntityType, id: &str) -> RealtimeEvent {
        RealtimeEvent::new(
            entity_type,
            ChannelName::new(format!("storefront:{}", entity_type.slug())).unwrap(),
            ChangeKind::Update,
        )
        .with_event_id(crate::domain::foundation::EventId::from_string(id))
    }

    #[tokio::test]
    async fn repeated_event_triggers_no_second_refetch() {
        let (store, coordinator) = setup();
        store.seed(&key("orders/list/u1"), json!([]));
        store.seed(&key("dashboard/summary"), json!({}));

        let first = coordinator.handle_event(&event(EntityType::Orders, "e1")).await.unwrap();
        let second = coordinator.handle_event(&event(EntityType::Orders, "e1")).await.unwrap();

        assert_eq!(first.newly_stale.len(), 2);
        assert!(second.newly_stale.is_empty());
        assert_eq!(store.refetch_count(&key("orders/list/u1")), 1);
    }

    #[tokio::test]
    async fn conflict_is_absorbed() {
        let (store, coordinator) = setup();
        store.seed(&key("cart/u1"), json!([]));
        store.inject_conflicts(1);

        let summary = coordinator.handle_event(&event(EntityType::Cart, "e1")).await.unwrap();

        assert!(summary.newly_stale.is_empty());
        assert!(store.is_stale(&key("cart/u1")));
    }

    #[tokio::test]
    async fn force_refresh_marks_user_domains_and_records_outcome() {
        let (store, coordinator) = setup();
        store.seed(&key("profile/u1"), json!({}));
        store.seed(&key("products/list"), json!([]));
        store.begin_fetch(&key("cart/u1"));

        let summary = coordinator.force_refresh_user_data().await.unwrap();

        assert_eq!(summary.newly_stale, vec![key("profile/u1")]);
        assert!(!store.is_stale(&key("products/list")));
        assert_eq!(store.in_flight_count(), 0);
        assert!(!coordinator.signals.flags().is_refreshing_user_data);
        assert!(coordinator.signals.errors().force_refresh.is_none());
    }

    #[tokio::test]
    async fn force_refresh_failure_is_recorded() {
        let (store, coordinator) = setup();
        store.set_unavailable(true);

        assert!(coordinator.force_refresh_user_data().await.is_err());
        assert!(matches!(
            coordinator.signals.errors().force_refresh,
            Some(RealtimeError::Cache(_))
        ));
    }
}
