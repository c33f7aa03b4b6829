//! Identity Port - Caller Identity Assertion
//!
//! Resolves an opaque credential (bearer token, session cookie) into an
//! asserted identity. The engine never accepts a caller-supplied user id
//! without going through an implementation of this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::caller::Claim;
use crate::domain::error::EngineResult;
use crate::domain::market::UserId;

/// Identity asserted by the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  /// Stable user id.
  pub user_id: UserId,
  /// Verified e-mail, if the provider supplies one.
  pub email: Option<String>,
  /// Role and membership claims.
  pub claims: Vec<Claim>,
}

/// Trait for identity providers.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
  /// Resolve a credential to an identity.
  ///
  /// # Errors
  /// `NotEligible` when the credential is unknown or expired.
  async fn resolve(&self, credential: &str) -> EngineResult<Identity>;
}
