//! Access tokens attached to control-plane calls.
//!
//! A [`Credential`] is an immutable value handed to each call. Nothing in this
//! crate mutates a shared client to switch identity, so one credential can be
//! shared read-only by concurrent tasks.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    principal: String,
    token: String,
}

impl Credential {
    pub fn new(principal: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            token: token.into(),
        }
    }

    /// Identity the token acts as (usually an email address).
    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn bearer_token(&self) -> &str {
        &self.token
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Capability to mint access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token for the end user on whose behalf the current request runs.
    async fn end_user(&self) -> Result<Credential>;

    /// Token for the platform's own service identity.
    async fn service(&self) -> Result<Credential>;

    /// Token acting as an arbitrary user. Only used by admin or automated
    /// bulk operations.
    async fn impersonate(&self, email: &str) -> Result<Credential>;
}

/// Credentials read from environment variables, for operator tooling.
///
/// * `COMPUTE_USER_EMAIL` / `COMPUTE_USER_TOKEN`
/// * `COMPUTE_SERVICE_ACCOUNT` / `COMPUTE_SERVICE_TOKEN`
/// * `COMPUTE_IMPERSONATION_TOKEN` - pre-minted delegated token; when unset
///   impersonation is refused.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    user: Option<Credential>,
    service: Option<Credential>,
    impersonation_token: Option<String>,
}

impl EnvCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = lookup("COMPUTE_USER_TOKEN").map(|token| {
            Credential::new(
                lookup("COMPUTE_USER_EMAIL").unwrap_or_else(|| "unknown-user".to_string()),
                token,
            )
        });
        let service = lookup("COMPUTE_SERVICE_TOKEN").map(|token| {
            Credential::new(
                lookup("COMPUTE_SERVICE_ACCOUNT")
                    .unwrap_or_else(|| "service-account".to_string()),
                token,
            )
        });
        Self {
            user,
            service,
            impersonation_token: lookup("COMPUTE_IMPERSONATION_TOKEN"),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn end_user(&self) -> Result<Credential> {
        self.user
            .clone()
            .ok_or_else(|| OrchestratorError::Credential("COMPUTE_USER_TOKEN is not set".into()))
    }

    async fn service(&self) -> Result<Credential> {
        self.service.clone().ok_or_else(|| {
            OrchestratorError::Credential("COMPUTE_SERVICE_TOKEN is not set".into())
        })
    }

    async fn impersonate(&self, email: &str) -> Result<Credential> {
        self.impersonation_token
            .as_ref()
            .map(|token| Credential::new(email, token.clone()))
            .ok_or_else(|| {
                OrchestratorError::Credential(format!(
                    "cannot impersonate {email}: COMPUTE_IMPERSONATION_TOKEN is not set"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::new("alice@example.org", "ya29.secret");
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("alice@example.org"));
        assert!(!rendered.contains("ya29.secret"));
    }

    #[tokio::test]
    async fn test_env_credentials() {
        let creds = EnvCredentials::from_lookup(|key| match key {
            "COMPUTE_USER_TOKEN" => Some("user-token".to_string()),
            "COMPUTE_USER_EMAIL" => Some("alice@example.org".to_string()),
            "COMPUTE_SERVICE_TOKEN" => Some("svc-token".to_string()),
            _ => None,
        });

        let user = creds.end_user().await.unwrap();
        assert_eq!(user.principal(), "alice@example.org");
        assert_eq!(user.bearer_token(), "user-token");

        let service = creds.service().await.unwrap();
        assert_eq!(service.principal(), "service-account");

        let err = creds.impersonate("bob@example.org").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Credential(_)));
    }
}
