//! Bearer token supply
//!
//! Token issuance and storage live outside this crate; the client only asks
//! a [`TokenProvider`] for the current token before each call.

use async_trait::async_trait;

use super::{ReportError, ReportResult};

/// Supplies the bearer token attached to report API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token (may refresh behind the scenes)
    async fn token(&self) -> ReportResult<String>;
}

/// A fixed token, typically read from the environment
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> ReportResult<String> {
        if self.0.trim().is_empty() {
            return Err(ReportError::AuthError("API token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}
