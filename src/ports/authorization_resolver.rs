//! AuthorizationResolver port - Interface to the external channel policy.
//!
//! The policy itself lives outside this crate. The connection manager only
//! asks which channel names the current user may subscribe to for one entity
//! type, and validates the returned names before touching the transport.

use async_trait::async_trait;

use crate::domain::connection::EntityType;
use crate::domain::foundation::{AuthError, UserContext};

/// Port for resolving authorized channel names.
///
/// Implementations must fail with `AuthError::AuthenticationRequired` when
/// `user` is `None`. An empty list means the user may not see the entity type.
#[async_trait]
pub trait AuthorizationResolver: Send + Sync {
    async fn authorized_channel_names(
        &self,
        entity_type: EntityType,
        user: Option<&UserContext>,
    ) -> Result<Vec<String>, AuthError>;
}
