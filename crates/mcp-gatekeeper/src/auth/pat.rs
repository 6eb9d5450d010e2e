//! Personal access token verification capability.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// User record returned by a [`PatVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable user identifier. Must be non-empty.
    pub user_id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl UserInfo {
    /// Create user info with only an id.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            username: None,
            name: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Application-supplied PAT check.
///
/// Receives the token with the configured prefix already stripped. May perform
/// network or database I/O. `None` rejects the token.
#[async_trait::async_trait]
pub trait PatVerifier: Send + Sync {
    /// Look up the owner of `token`.
    async fn verify(&self, token: &str) -> Option<UserInfo>;
}

#[async_trait::async_trait]
impl<F, Fut> PatVerifier for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<UserInfo>> + Send,
{
    async fn verify(&self, token: &str) -> Option<UserInfo> {
        self(token.to_owned()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_verifier() {
        let verifier = |token: String| async move {
            (token == "good").then(|| UserInfo::new("u-1").with_email("u@example.com"))
        };

        let user = verifier.verify("good").await.unwrap();
        assert_eq!(user.user_id, "u-1");
        assert_eq!(user.email.as_deref(), Some("u@example.com"));
        assert!(verifier.verify("bad").await.is_none());
    }

    #[test]
    fn test_user_info_from_json() {
        let user: UserInfo =
            serde_json::from_str(r#"{"user_id":"42","name":"Demo User"}"#).unwrap();
        assert_eq!(user.user_id, "42");
        assert_eq!(user.name.as_deref(), Some("Demo User"));
        assert!(user.email.is_none());
    }
}
