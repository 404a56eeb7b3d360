//! Remote storefront APIs called by optimistic mutations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};

/// Errors from a remote storefront call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The backend rejected the request (validation, conflict, permission).
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Remote service unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Stock level as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: String,
    pub quantity: u32,
    pub updated_at: Timestamp,
}

/// A pickup appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    pub pickup_id: String,
    pub order_id: String,
    pub scheduled_for: Timestamp,
}

/// Customer profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub phone: Option<String>,
}

#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn update_stock(&self, product_id: &str, quantity: u32) -> Result<StockLevel, RemoteError>;
}

#[async_trait]
pub trait PickupApi: Send + Sync {
    async fn reschedule_pickup(
        &self,
        pickup_id: &str,
        scheduled_for: Timestamp,
    ) -> Result<Pickup, RemoteError>;
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn update_profile(&self, profile: Profile) -> Result<Profile, RemoteError>;
}
