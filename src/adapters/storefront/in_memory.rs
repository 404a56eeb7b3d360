//! In-memory storefront backend.
//!
//! Implements the inventory, pickup and profile APIs over plain maps. Calls
//! can be made to fail, or be held at the gate until the test opens it,
//! which lets a test observe the cache while a mutation is in flight.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    InventoryApi, Pickup, PickupApi, Profile, ProfileApi, RemoteError, StockLevel,
};

#[derive(Debug, Default)]
struct Backend {
    stock: HashMap<String, StockLevel>,
    pickups: HashMap<String, Pickup>,
    profiles: HashMap<UserId, Profile>,
    failures: VecDeque<RemoteError>,
    calls: usize,
}

/// In-memory `InventoryApi`, `PickupApi` and `ProfileApi`.
#[derive(Debug)]
pub struct InMemoryStorefront {
    backend: Mutex<Backend>,
    gate: watch::Sender<bool>,
}

impl Default for InMemoryStorefront {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorefront {
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend::default()),
            gate: watch::channel(true).0,
        }
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_stock(self, product_id: &str, quantity: u32) -> Self {
        self.backend().stock.insert(
            product_id.to_string(),
            StockLevel {
                product_id: product_id.to_string(),
                quantity,
                updated_at: Timestamp::now(),
            },
        );
        self
    }

    pub fn with_pickup(self, pickup: Pickup) -> Self {
        self.backend()
            .pickups
            .insert(pickup.pickup_id.clone(), pickup);
        self
    }

    /// The next call fails with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.backend().failures.push_back(error);
    }

    /// Holds every call until `open_gate` is called.
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    async fn pass_gate(&self) -> Result<(), RemoteError> {
        self.backend().calls += 1;
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the wait can only end with the gate open.
        let _ = gate.wait_for(|open| *open).await;
        match self.backend().failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // === Test Helpers ===

    pub fn stock(&self, product_id: &str) -> Option<u32> {
        self.backend().stock.get(product_id).map(|s| s.quantity)
    }

    pub fn call_count(&self) -> usize {
        self.backend().calls
    }
}

#[async_trait]
impl InventoryApi for InMemoryStorefront {
    async fn update_stock(&self, product_id: &str, quantity: u32) -> Result<StockLevel, RemoteError> {
        self.pass_gate().await?;
        let level = StockLevel {
            product_id: product_id.to_string(),
            quantity,
            updated_at: Timestamp::now(),
        };
        self.backend()
            .stock
            .insert(product_id.to_string(), level.clone());
        Ok(level)
    }
}

#[async_trait]
impl PickupApi for InMemoryStorefront {
    async fn reschedule_pickup(
        &self,
        pickup_id: &str,
        scheduled_for: Timestamp,
    ) -> Result<Pickup, RemoteError> {
        self.pass_gate().await?;
        let mut backend = self.backend();
        let pickup = backend
            .pickups
            .get_mut(pickup_id)
            .ok_or_else(|| RemoteError::rejected(format!("unknown pickup '{}'", pickup_id)))?;
        if scheduled_for.is_before(&Timestamp::now()) {
            return Err(RemoteError::rejected("pickup slot is in the past"));
        }
        pickup.scheduled_for = scheduled_for;
        Ok(pickup.clone())
    }
}

#[async_trait]
impl ProfileApi for InMemoryStorefront {
    async fn update_profile(&self, profile: Profile) -> Result<Profile, RemoteError> {
        self.pass_gate().await?;
        self.backend()
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(profile)
    }
}
