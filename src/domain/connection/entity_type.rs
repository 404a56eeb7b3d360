//! Logical data domains that carry their own realtime channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// A storefront data domain with its own realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Cart,
    Orders,
    Products,
    Inventory,
    Pickups,
}

impl EntityType {
    /// Every entity type, in a stable order.
    pub const ALL: [EntityType; 5] = [
        EntityType::Cart,
        EntityType::Orders,
        EntityType::Products,
        EntityType::Inventory,
        EntityType::Pickups,
    ];

    /// Stable lowercase identifier used in channel names and cache keys.
    pub fn slug(&self) -> &'static str {
        match self {
            EntityType::Cart => "cart",
            EntityType::Orders => "orders",
            EntityType::Products => "products",
            EntityType::Inventory => "inventory",
            EntityType::Pickups => "pickups",
        }
    }

    /// Returns true when the data in this domain belongs to one user.
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            EntityType::Cart | EntityType::Orders | EntityType::Pickups
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.slug() == s.trim())
            .ok_or_else(|| {
                ValidationError::invalid_format("entity_type", format!("unknown entity type '{}'", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_round_trips_through_from_str() {
        for entity_type in EntityType::ALL {
            assert_eq!(entity_type.slug().parse::<EntityType>().unwrap(), entity_type);
        }
    }

    #[test]
    fn from_str_rejects_unknown_names() {
        assert!("wishlist".parse::<EntityType>().is_err());
    }

    #[test]
    fn user_scoped_domains() {
        assert!(EntityType::Cart.is_user_scoped());
        assert!(EntityType::Orders.is_user_scoped());
        assert!(!EntityType::Products.is_user_scoped());
        assert!(!EntityType::Inventory.is_user_scoped());
    }

    #[test]
    fn deserializes_from_snake_case_json() {
        let t: EntityType = serde_json::from_str("\"pickups\"").unwrap();
        assert_eq!(t, EntityType::Pickups);
    }
}
