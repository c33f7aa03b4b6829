//! Asserted caller identity.
//!
//! The engine never trusts a bare user id: every operation receives a
//! [`Caller`] built by the eligibility policy from an identity assertion.
//! Privileged operations check explicit claims carried here rather than a
//! built-in allow-list.

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::market::{ScopeId, UserId};

/// Role and membership claims asserted by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "claim", content = "scope")]
pub enum Claim {
    /// Membership verified upstream (e.g. e-mail confirmed).
    Verified,
    /// May manage any market and run bulk settlement jobs.
    Admin,
    /// Member of a community scope.
    ScopeMember(ScopeId),
}

/// A caller whose identity and eligibility have been asserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    /// Whether the caller passed the eligibility policy.
    pub eligible: bool,
    pub claims: Vec<Claim>,
}

impl Caller {
    pub fn new(user_id: impl Into<UserId>, eligible: bool, claims: Vec<Claim>) -> Self {
        Self {
            user_id: user_id.into(),
            eligible,
            claims,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.claims.contains(&Claim::Admin)
    }

    /// Members of a scope and admins may use scoped wallets.
    pub fn is_member_of(&self, scope: &ScopeId) -> bool {
        self.is_admin()
            || self
                .claims
                .iter()
                .any(|c| matches!(c, Claim::ScopeMember(s) if s == scope))
    }

    pub fn ensure_eligible(&self) -> EngineResult<()> {
        if self.eligible {
            Ok(())
        } else {
            Err(EngineError::NotEligible(format!(
                "user {} has not passed the eligibility check",
                self.user_id
            )))
        }
    }

    /// Global scope is open to every eligible caller.
    pub fn ensure_scope_access(&self, scope: Option<&ScopeId>) -> EngineResult<()> {
        match scope {
            Some(s) if !self.is_member_of(s) => Err(EngineError::Forbidden(format!(
                "user {} is not a member of scope {s}",
                self.user_id
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_membership() {
        let caller = Caller::new("u", true, vec![Claim::ScopeMember("club".into())]);
        assert!(caller.ensure_scope_access(Some(&"club".to_string())).is_ok());
        assert!(caller.ensure_scope_access(None).is_ok());
        assert!(matches!(
            caller.ensure_scope_access(Some(&"other".to_string())),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_claim_is_explicit() {
        let plain = Caller::new("admin-looking-name", true, vec![Claim::Verified]);
        assert!(!plain.is_admin());
        let admin = Caller::new("x", true, vec![Claim::Admin]);
        assert!(admin.is_admin());
        assert!(admin.is_member_of(&"any".to_string()));
    }

    #[test]
    fn test_ineligible_caller_rejected() {
        let caller = Caller::new("u", false, vec![]);
        assert!(matches!(caller.ensure_eligible(), Err(EngineError::NotEligible(_))));
    }
}
