//! ReschedulePickupHandler - Optimistic move of a pickup appointment.

use serde_json::json;
use std::sync::Arc;

use crate::application::{CacheCoordinator, RealtimeError};
use crate::domain::cache::{domains, CacheKey, MutationKind, MutationPlan, MutationResponse};
use crate::domain::foundation::{Timestamp, ValidationError};
use crate::ports::{Pickup, PickupApi, RemoteError};

/// Command to move a pickup to a new slot.
#[derive(Debug, Clone)]
pub struct ReschedulePickupCommand {
    pub pickup_id: String,
    pub order_id: String,
    pub scheduled_for: Timestamp,
}

pub fn pickup_key(pickup_id: &str) -> Result<CacheKey, ValidationError> {
    CacheKey::new([domains::PICKUPS, pickup_id])
}

fn pickup_value(pickup_id: &str, order_id: &str, scheduled_for: &Timestamp) -> serde_json::Value {
    json!({
        "pickup_id": pickup_id,
        "order_id": order_id,
        "scheduled_for": scheduled_for.as_datetime().to_rfc3339(),
    })
}

/// Handler for pickup reschedules.
pub struct ReschedulePickupHandler {
    coordinator: Arc<CacheCoordinator>,
    pickups: Arc<dyn PickupApi>,
}

impl ReschedulePickupHandler {
    pub fn new(coordinator: Arc<CacheCoordinator>, pickups: Arc<dyn PickupApi>) -> Self {
        Self {
            coordinator,
            pickups,
        }
    }

    pub async fn handle(&self, cmd: ReschedulePickupCommand) -> Result<Pickup, RealtimeError> {
        let key = pickup_key(&cmd.pickup_id)?;
        let plan = MutationPlan::new(MutationKind::ReschedulePickup).with_optimistic(
            key.clone(),
            pickup_value(&cmd.pickup_id, &cmd.order_id, &cmd.scheduled_for),
        );

        let pickups = Arc::clone(&self.pickups);
        self.coordinator
            .run_mutation(plan, move || async move {
                let pickup = pickups
                    .reschedule_pickup(&cmd.pickup_id, cmd.scheduled_for)
                    .await?;
                let authoritative =
                    pickup_value(&pickup.pickup_id, &pickup.order_id, &pickup.scheduled_for);
                Ok::<_, RemoteError>(MutationResponse::new(pickup, vec![(key, authoritative)]))
            })
            .await
    }
}
