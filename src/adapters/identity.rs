//! Static Token Identity Provider
//!
//! Resolves bearer tokens from the `[[identity.tokens]]` config table.
//! Meant for development, tests and single-tenant deployments; a real
//! identity service plugs in behind the same port.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::config::IdentityConfig;
use crate::domain::error::{EngineError, EngineResult};
use crate::ports::identity::{Identity, IdentityProvider};

/// Token table keyed by bearer token.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenProvider {
    pub fn new(tokens: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Build from the `[identity]` config section.
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.tokens.iter().map(|t| {
            (
                t.token.clone(),
                Identity {
                    user_id: t.user_id.clone(),
                    email: t.email.clone(),
                    claims: t.claims.clone(),
                },
            )
        }))
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, credential: &str) -> EngineResult<Identity> {
        self.tokens.get(credential).cloned().ok_or_else(|| {
            debug!("Unknown bearer token presented");
            EngineError::NotEligible("unknown or expired credential".to_string())
        })
    }
}
