//! Channel name value object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

const MAX_CHANNEL_LEN: usize = 128;

/// A validated publish/subscribe topic name.
///
/// Allowed characters are lowercase ASCII letters, digits, `:`, `_` and `-`.
/// Anything else is rejected here so that a malformed name never reaches
/// the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::empty_field("channel"));
        }
        if name.len() > MAX_CHANNEL_LEN {
            return Err(ValidationError::too_long("channel", MAX_CHANNEL_LEN, name.len()));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ':' | '_' | '-')))
        {
            return Err(ValidationError::invalid_format(
                "channel",
                format!("unexpected character '{}' in '{}'", bad, name),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelName> for String {
    fn from(value: ChannelName) -> Self {
        value.0
    }
}
