//! Eligibility Policy - Identity Assertion to Caller
//!
//! A caller may trade when the identity provider asserts a verified
//! e-mail on an allowed domain, or when the user is on the configured
//! bypass allow-list. Role and membership claims pass through unchanged.

use std::collections::HashSet;

use tracing::debug;

use crate::config::IdentityConfig;
use crate::domain::caller::{Caller, Claim};
use crate::domain::market::UserId;
use crate::ports::identity::Identity;

/// Decides trading eligibility from an asserted identity.
#[derive(Debug, Clone, Default)]
pub struct EligibilityPolicy {
  /// Lower-cased e-mail domains. Empty accepts any verified domain.
  allowed_domains: Vec<String>,
  bypass_users: HashSet<UserId>,
}

impl EligibilityPolicy {
  pub fn new(allowed_domains: Vec<String>, bypass_users: impl IntoIterator<Item = UserId>) -> Self {
    Self {
      allowed_domains: allowed_domains
        .into_iter()
        .map(|d| d.trim_start_matches('@').to_ascii_lowercase())
        .collect(),
      bypass_users: bypass_users.into_iter().collect(),
    }
  }

  /// Build from the `[identity]` config section.
  pub fn from_config(config: &IdentityConfig) -> Self {
    Self::new(
      config.allowed_email_domains.clone(),
      config.bypass_users.iter().cloned(),
    )
  }

  /// Turn an identity into a caller with its eligibility decided.
  pub fn assess(&self, identity: Identity) -> Caller {
    let eligible = self.bypass_users.contains(&identity.user_id)
      || (identity.claims.contains(&Claim::Verified)
        && identity
          .email
          .as_deref()
          .is_some_and(|email| self.domain_allowed(email)));
    debug!(user = %identity.user_id, eligible, "Identity assessed");
    Caller::new(identity.user_id, eligible, identity.claims)
  }

  fn domain_allowed(&self, email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
      return false;
    };
    self.allowed_domains.is_empty()
      || self
        .allowed_domains
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(domain))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity(user: &str, email: Option<&str>, claims: Vec<Claim>) -> Identity {
    Identity {
      user_id: user.to_string(),
      email: email.map(str::to_string),
      claims,
    }
  }

  #[test]
  fn test_verified_allowed_domain_is_eligible() {
    let policy = EligibilityPolicy::new(vec!["Example.edu".into()], []);
    let caller = policy.assess(identity("a", Some("a@example.EDU"), vec![Claim::Verified]));
    assert!(caller.eligible);
  }

  #[test]
  fn test_unverified_or_foreign_domain_is_not() {
    let policy = EligibilityPolicy::new(vec!["example.edu".into()], []);
    assert!(!policy.assess(identity("a", Some("a@example.edu"), vec![])).eligible);
    assert!(
      !policy
        .assess(identity("b", Some("b@other.org"), vec![Claim::Verified]))
        .eligible
    );
    assert!(!policy.assess(identity("c", None, vec![Claim::Verified])).eligible);
  }

  #[test]
  fn test_bypass_list_and_open_domains() {
    let policy = EligibilityPolicy::new(vec!["example.edu".into()], ["guest".to_string()]);
    assert!(policy.assess(identity("guest", None, vec![])).eligible);

    let open = EligibilityPolicy::default();
    assert!(open.assess(identity("d", Some("d@any.io"), vec![Claim::Verified])).eligible);
  }

  #[test]
  fn test_claims_pass_through() {
    let policy = EligibilityPolicy::default();
    let caller = policy.assess(identity("root", None, vec![Claim::Admin]));
    assert!(!caller.eligible);
    assert!(caller.is_admin());
  }
}
