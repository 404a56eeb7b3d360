//! UpdateProfileHandler - Optimistic profile edit.

use serde_json::json;
use std::sync::Arc;

use crate::application::{CacheCoordinator, RealtimeError};
use crate::domain::cache::{domains, CacheKey, MutationKind, MutationPlan, MutationResponse};
use crate::domain::foundation::{UserId, ValidationError};
use crate::ports::{Profile, ProfileApi, RemoteError};

const MAX_DISPLAY_NAME_LEN: usize = 80;

/// Command to replace the signed-in user's profile fields.
#[derive(Debug, Clone)]
pub struct UpdateProfileCommand {
    pub user_id: UserId,
    pub display_name: String,
    pub phone: Option<String>,
}

impl UpdateProfileCommand {
    fn validate(&self) -> Result<(), ValidationError> {
        let name = self.display_name.trim();
        if name.is_empty() {
            return Err(ValidationError::empty_field("display_name"));
        }
        if name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(ValidationError::too_long(
                "display_name",
                MAX_DISPLAY_NAME_LEN,
                name.len(),
            ));
        }
        Ok(())
    }

    fn into_profile(self) -> Profile {
        Profile {
            user_id: self.user_id,
            display_name: self.display_name.trim().to_string(),
            phone: self.phone,
        }
    }
}

pub fn profile_key(user_id: &UserId) -> Result<CacheKey, ValidationError> {
    CacheKey::new([domains::PROFILE, user_id.as_str()])
}

fn profile_value(profile: &Profile) -> serde_json::Value {
    json!({
        "user_id": profile.user_id.as_str(),
        "display_name": profile.display_name,
        "phone": profile.phone,
    })
}

pub struct UpdateProfileHandler {
    coordinator: Arc<CacheCoordinator>,
    profiles: Arc<dyn ProfileApi>,
}

impl UpdateProfileHandler {
    pub fn new(coordinator: Arc<CacheCoordinator>, profiles: Arc<dyn ProfileApi>) -> Self {
        Self {
            coordinator,
            profiles,
        }
    }

    pub async fn handle(&self, cmd: UpdateProfileCommand) -> Result<Profile, RealtimeError> {
        cmd.validate()?;
        let key = profile_key(&cmd.user_id)?;
        let profile = cmd.into_profile();
        let plan = MutationPlan::new(MutationKind::UpdateProfile)
            .with_optimistic(key.clone(), profile_value(&profile));

        let profiles = Arc::clone(&self.profiles);
        self.coordinator
            .run_mutation(plan, move || async move {
                let saved = profiles.update_profile(profile).await?;
                let authoritative = profile_value(&saved);
                Ok::<_, RemoteError>(MutationResponse::new(saved, vec![(key, authoritative)]))
            })
            .await
    }
}
