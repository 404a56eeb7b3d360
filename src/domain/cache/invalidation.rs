//! Fan-out of one inbound event into the cache domains it affects.

use std::collections::HashMap;

use crate::domain::connection::{EntityType, RealtimeEvent};

use super::KeyPattern;

/// Cache domain names.
pub mod domains {
    pub const CART: &str = "cart";
    pub const ORDERS: &str = "orders";
    pub const PRODUCTS: &str = "products";
    pub const INVENTORY: &str = "inventory";
    pub const PICKUPS: &str = "pickups";
    pub const PROFILE: &str = "profile";
    pub const DASHBOARD: &str = "dashboard";

    /// Domains holding data that belongs to the signed-in user.
    pub const USER_SCOPED: [&str; 5] = [PROFILE, CART, ORDERS, PICKUPS, DASHBOARD];
}

/// The key patterns one event (or one refresh request) must mark stale.
///
/// Ephemeral: built, handed to the coordinator, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    /// `None` when the request was raised locally rather than by an event.
    pub source_entity_type: Option<EntityType>,
    pub affected_key_patterns: Vec<KeyPattern>,
}

impl InvalidationRequest {
    pub fn new(source_entity_type: Option<EntityType>, affected_key_patterns: Vec<KeyPattern>) -> Self {
        Self {
            source_entity_type,
            affected_key_patterns,
        }
    }

    /// Patterns with duplicates and covered patterns removed.
    ///
    /// Order of first appearance is kept. A pattern is dropped when a
    /// broader pattern anywhere in the request already covers it.
    pub fn merged_patterns(&self) -> Vec<KeyPattern> {
        merge_patterns(self.affected_key_patterns.iter())
    }
}

/// Merges overlapping patterns from any number of sources.
pub fn merge_patterns<'a>(patterns: impl IntoIterator<Item = &'a KeyPattern>) -> Vec<KeyPattern> {
    let all: Vec<&KeyPattern> = patterns.into_iter().collect();
    let mut merged: Vec<KeyPattern> = Vec::new();
    for (i, candidate) in all.iter().enumerate() {
        let covered_elsewhere = all.iter().enumerate().any(|(j, other)| {
            // Strictly broader, or an identical pattern seen earlier.
            (other.covers(candidate) && !candidate.covers(other)) || (j < i && *other == *candidate)
        });
        if !covered_elsewhere {
            merged.push((*candidate).clone());
        }
    }
    merged
}

/// Which cache domains each entity type's events invalidate.
#[derive(Debug, Clone)]
pub struct InvalidationRules {
    rules: HashMap<EntityType, Vec<KeyPattern>>,
}

impl InvalidationRules {
    /// Rules with no fan-out at all.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// The storefront's cross-domain dependencies.
    pub fn storefront_defaults() -> Self {
        use domains::*;
        let p = KeyPattern::for_domain;
        Self::empty()
            .with_rule(EntityType::Cart, vec![p(CART)])
            .with_rule(EntityType::Orders, vec![p(ORDERS), p(DASHBOARD), p(PICKUPS)])
            .with_rule(EntityType::Products, vec![p(PRODUCTS), p(CART)])
            .with_rule(EntityType::Inventory, vec![p(INVENTORY), p(PRODUCTS), p(DASHBOARD)])
            .with_rule(EntityType::Pickups, vec![p(PICKUPS), p(ORDERS), p(DASHBOARD)])
    }

    /// Replaces the fan-out for one entity type.
    pub fn with_rule(mut self, entity_type: EntityType, patterns: Vec<KeyPattern>) -> Self {
        self.rules.insert(entity_type, patterns);
        self
    }

    pub fn patterns_for(&self, entity_type: EntityType) -> &[KeyPattern] {
        self.rules
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn request_for(&self, event: &RealtimeEvent) -> InvalidationRequest {
        InvalidationRequest::new(
            Some(event.entity_type),
            self.patterns_for(event.entity_type).to_vec(),
        )
    }

    /// Request covering every user-scoped domain.
    pub fn user_data_request(&self) -> InvalidationRequest {
        InvalidationRequest::new(
            None,
            domains::USER_SCOPED
                .into_iter()
                .map(KeyPattern::for_domain)
                .collect(),
        )
    }
}

impl Default for InvalidationRules {
    fn default() -> Self {
        Self::storefront_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::{ChangeKind, ChannelName};

    fn pattern(s: &str) -> KeyPattern {
        s.parse().unwrap()
    }

    #[test]
    fn order_event_fans_out_to_orders_and_dashboard() {
        let rules = InvalidationRules::storefront_defaults();
        let event = RealtimeEvent::new(
            EntityType::Orders,
            ChannelName::new("storefront:orders:u1").unwrap(),
            ChangeKind::Update,
        );

        let request = rules.request_for(&event);

        assert_eq!(request.source_entity_type, Some(EntityType::Orders));
        assert!(request.affected_key_patterns.contains(&pattern("orders")));
        assert!(request.affected_key_patterns.contains(&pattern("dashboard")));
    }

    #[test]
    fn unknown_rule_yields_empty_request() {
        let rules = InvalidationRules::empty();
        assert!(rules.patterns_for(EntityType::Cart).is_empty());
    }

    #[test]
    fn merged_patterns_drop_duplicates_and_covered() {
        let request = InvalidationRequest::new(
            None,
            vec![
                pattern("orders/list"),
                pattern("dashboard"),
                pattern("orders"),
                pattern("dashboard"),
                pattern("cart/items"),
            ],
        );

        assert_eq!(
            request.merged_patterns(),
            vec![pattern("dashboard"), pattern("orders"), pattern("cart/items")]
        );
    }

    #[test]
    fn merge_across_requests_collapses_overlap() {
        let a = InvalidationRequest::new(Some(EntityType::Orders), vec![pattern("orders"), pattern("dashboard")]);
        let b = InvalidationRequest::new(Some(EntityType::Inventory), vec![pattern("dashboard"), pattern("inventory")]);

        let merged = merge_patterns(
            a.affected_key_patterns
                .iter()
                .chain(b.affected_key_patterns.iter()),
        );

        assert_eq!(
            merged,
            vec![pattern("orders"), pattern("dashboard"), pattern("inventory")]
        );
    }

    #[test]
    fn user_data_request_covers_user_domains() {
        let request = InvalidationRules::default().user_data_request();
        assert_eq!(request.source_entity_type, None);
        assert_eq!(request.affected_key_patterns.len(), domains::USER_SCOPED.len());
        assert!(request.affected_key_patterns.contains(&pattern("profile")));
        assert!(!request.affected_key_patterns.contains(&pattern("products")));
    }
}
