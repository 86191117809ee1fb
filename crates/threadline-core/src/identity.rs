//! The local user identity.
//!
//! The durable user id doubles as the auth token: it is sent as `X-User-Id`
//! on every remote call. Obtaining it is the auth endpoint's job (see
//! [`ApiClient::login`](crate::api::ApiClient::login)); the session only
//! checks that one is present.

use threadline_config::IdentityConfig;

/// Header carrying the local user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The signed-in local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub phone: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            phone: None,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Build from the `[identity]` config section. `None` when no user id is set.
    pub fn from_config(config: &IdentityConfig) -> Option<Self> {
        let user_id = config.user_id.as_deref()?.trim();
        if user_id.is_empty() {
            return None;
        }
        Some(Self {
            user_id: user_id.to_string(),
            phone: config.phone.clone(),
            name: config.name.clone(),
        })
    }

    /// An identity with a blank user id is treated as absent.
    pub fn is_usable(&self) -> bool {
        !self.user_id.trim().is_empty()
    }
}
