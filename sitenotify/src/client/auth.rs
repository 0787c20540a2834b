//! Authentication state management.

use crate::models::UserId;

/// Session credentials for the notification API.
#[derive(Clone)]
pub struct AuthInfo {
    /// Bearer token.
    pub token: String,
    /// Authenticated user.
    pub user_id: UserId,
}

impl AuthInfo {
    /// Create new auth info.
    pub fn new(token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    /// Check if auth looks valid.
    pub fn is_valid(&self) -> bool {
        self.has_token() && !self.user_id.is_empty()
    }

    /// Whether a non-blank bearer token is present.
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Bearer token, if one is present.
    pub fn credential(&self) -> Option<&str> {
        self.has_token().then_some(self.token.as_str())
    }
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("user_id", &self.user_id)
            .field("token", &if self.has_token() { "***" } else { "" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_info_validity() {
        let valid = AuthInfo::new("token123", "12345");
        assert!(valid.is_valid());
        assert_eq!(valid.credential(), Some("token123"));

        let empty_token = AuthInfo::new(" ", "12345");
        assert!(!empty_token.is_valid());
        assert_eq!(empty_token.credential(), None);

        let empty_uid = AuthInfo::new("token123", "");
        assert!(!empty_uid.is_valid());
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = AuthInfo::new("secret", "1");
        assert!(!format!("{:?}", auth).contains("secret"));
    }
}
