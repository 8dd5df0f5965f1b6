// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage 11 (SAML branch): a slot for an external SAML identity provider.
//!
//! The identity-provider integration itself is an external collaborator;
//! this crate only needs somewhere to call into one.

use crate::error::Result;
use crate::pipeline::principal::AuthenticatedPrincipal;
use async_trait::async_trait;

#[async_trait]
pub trait SamlVerifier: Send + Sync {
    /// Resolve a SAML assertion, previously established out-of-band, into
    /// an authenticated principal.
    async fn resolve(&self, assertion_ref: &str) -> Result<AuthenticatedPrincipal>;
}
