// SPDX-License-Identifier: MIT OR Apache-2.0

//! The authenticated identity a request carries past stage 11.

use std::sync::Arc;

/// A capability that can verify signatures for the key that authenticated
/// a request. Held by [`AuthenticatedPrincipal`] so later pipeline stages
/// (or the proxy director) can re-verify without re-fetching key material.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signed_data: &[u8], signature: &[u8]) -> crate::error::Result<()>;
}

/// A total order over access levels: `None < CloudProvider < Reader <
/// Operator < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    None,
    CloudProvider,
    Reader,
    Operator,
    Admin,
}

impl Role {
    /// Clamp the lower of `self` and `other` — used when combining a
    /// user's role with their signing key's role.
    pub fn min(self, other: Role) -> Role {
        std::cmp::min(self, other)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::None
    }
}

/// The identity attached to a request once authentication succeeds.
#[derive(Clone)]
pub struct AuthenticatedPrincipal {
    pub user_id: String,
    pub identity: String,
    pub role: Role,
    pub verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl AuthenticatedPrincipal {
    pub fn anonymous() -> Self {
        Self {
            user_id: String::new(),
            identity: String::new(),
            role: Role::None,
            verifier: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.role > Role::None
    }
}

impl std::fmt::Debug for AuthenticatedPrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedPrincipal")
            .field("user_id", &self.user_id)
            .field("identity", &self.identity)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_is_total() {
        assert!(Role::None < Role::CloudProvider);
        assert!(Role::CloudProvider < Role::Reader);
        assert!(Role::Reader < Role::Operator);
        assert!(Role::Operator < Role::Admin);
    }

    #[test]
    fn min_picks_lower_role() {
        assert_eq!(Role::Admin.min(Role::Reader), Role::Reader);
        assert_eq!(Role::None.min(Role::Admin), Role::None);
    }

    #[test]
    fn anonymous_principal_is_not_authenticated() {
        assert!(!AuthenticatedPrincipal::anonymous().is_authenticated());
    }
}
