//! Role-based channel authorization.
//!
//! Customers see their own cart, orders and pickups plus the public product
//! feed. Vendors and admins additionally see stock levels and the store-wide
//! order feed.

use async_trait::async_trait;

use crate::domain::connection::EntityType;
use crate::domain::foundation::{AuthError, UserContext};
use crate::ports::AuthorizationResolver;

/// Resolves channel names from the user's id and role.
///
/// Names are `<prefix>:<entity>` for shared feeds and
/// `<prefix>:<entity>:<user id>` for per-user feeds. The user id is used
/// verbatim, so an id the transport cannot accept yields a name that the
/// connection manager rejects as a fatal transport error.
#[derive(Debug, Clone)]
pub struct RoleBasedAuthorizationResolver {
    prefix: String,
}

impl RoleBasedAuthorizationResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn shared(&self, entity_type: EntityType) -> String {
        format!("{}:{}", self.prefix, entity_type.slug())
    }

    fn per_user(&self, entity_type: EntityType, user: &UserContext) -> String {
        format!("{}:{}:{}", self.prefix, entity_type.slug(), user.id)
    }

    /// Channel names for `entity_type`; empty when the role may not see it.
    pub fn channels_for(&self, entity_type: EntityType, user: &UserContext) -> Vec<String> {
        let staff = user.role.is_staff();
        match entity_type {
            EntityType::Cart | EntityType::Pickups => vec![self.per_user(entity_type, user)],
            EntityType::Orders if staff => vec![
                self.per_user(entity_type, user),
                self.shared(entity_type),
            ],
            EntityType::Orders => vec![self.per_user(entity_type, user)],
            EntityType::Products => vec![self.shared(entity_type)],
            EntityType::Inventory if staff => vec![self.shared(entity_type)],
            EntityType::Inventory => Vec::new(),
        }
    }
}

impl Default for RoleBasedAuthorizationResolver {
    fn default() -> Self {
        Self::new("storefront")
    }
}

#[async_trait]
impl AuthorizationResolver for RoleBasedAuthorizationResolver {
    async fn authorized_channel_names(
        &self,
        entity_type: EntityType,
        user: Option<&UserContext>,
    ) -> Result<Vec<String>, AuthError> {
        let user = user.ok_or(AuthError::AuthenticationRequired)?;
        Ok(self.channels_for(entity_type, user))
    }
}
