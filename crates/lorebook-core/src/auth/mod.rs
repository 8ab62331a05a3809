//! Authentication state consulted before talking to the remote.

use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// Source of truth for whether remote operations may run.
///
/// Implementations must be cheap to query; the sync engine asks before
/// every pass and every queue flush.
pub trait AuthState: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn current_user(&self) -> Option<AuthUser>;
}

/// Auth state backed by a static access token.
///
/// Considered authenticated whenever the token is non-empty.
#[derive(Clone)]
pub struct TokenAuth {
    token: Option<String>,
    user: Option<AuthUser>,
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = (!token.trim().is_empty()).then_some(token);
        Self { token, user: None }
    }

    /// Auth state with no credentials
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            token: None,
            user: None,
        }
    }

    /// Auth state for the token in a remote config, if any
    #[must_use]
    pub fn from_config(config: Option<&RemoteConfig>) -> Self {
        config.map_or_else(Self::anonymous, |config| {
            Self::new(config.token.clone()).with_user(AuthUser {
                id: config.owner.clone(),
                email: None,
            })
        })
    }

    #[must_use]
    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = Some(user);
        self
    }
}

impl AuthState for TokenAuth {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn current_user(&self) -> Option<AuthUser> {
        if self.is_authenticated() {
            self.user.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_not_authenticated() {
        assert!(!TokenAuth::new("  ").is_authenticated());
        assert!(!TokenAuth::anonymous().is_authenticated());
        assert!(TokenAuth::new("ghp_x").is_authenticated());
    }

    #[test]
    fn from_config_uses_owner_as_user() {
        let config = RemoteConfig::new("lore-keeper", "notes", "ghp_x");
        let auth = TokenAuth::from_config(Some(&config));
        assert!(auth.is_authenticated());
        assert_eq!(auth.current_user().unwrap().id, "lore-keeper");

        let auth = TokenAuth::from_config(None);
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", TokenAuth::new("ghp_secret"));
        assert!(!rendered.contains("ghp_secret"));
    }
}
