//! Authentication identity types.

use crate::db::{Role, User};
use crate::jwt::Claims;

/// Identity resolved for the current request. Built fresh per request by the
/// credential filter chain and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    /// Subject (username)
    pub subject: String,
    pub role: Role,
}

impl SecurityContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            role: claims.role,
        }
    }

    /// Authorities granted to this identity.
    pub fn authorities(&self) -> [Role; 1] {
        [self.role]
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.authorities().iter().any(|granted| roles.contains(granted))
    }
}

/// An authenticated principal about to receive a token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// Principal carrying the account's persisted role.
    pub fn from_account(user: &User) -> Self {
        Self::new(user.username.clone(), user.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_any_role() {
        let ctx = SecurityContext {
            subject: "alice".into(),
            role: Role::User,
        };
        assert!(ctx.has_any_role(&[Role::User, Role::Admin]));
        assert!(!ctx.has_any_role(&[Role::Admin]));
        assert!(!ctx.has_any_role(&[]));
    }
}
