// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fixed authentication interceptor chain.
//!
//! Every accepted gRPC call — unary or streaming — runs through the same
//! eleven ordered stages before a business handler (or the proxy
//! director) ever sees it. The order is load-bearing: panic recovery
//! (stage 8) must be installed before identity verification (stages 9–11)
//! runs, and the signature/JWT/SAML stage must come last so everything
//! above it (logging, auditing, metrics) observes every call, including
//! ones that ultimately fail authentication.

pub mod context;
pub mod jwt;
pub mod principal;
pub mod saml;
pub mod signature;

pub use context::{CallContext, RequestTags};
pub use principal::{AuthenticatedPrincipal, Role, SignatureVerifier};
pub use signature::{PrincipalStore, PublicKeyRecord, UserRecord};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::runtime::MetricsCollector;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// One identity-verification slot (stage 11): either an OIDC bearer
/// token or a previously-resolved SAML assertion reference. Exactly one
/// is populated per call.
pub enum IdentityClaim {
    None,
    Bearer(String),
    SamlAssertion(String),
}

/// Everything the pipeline needs to know about one inbound call before
/// it can authenticate it.
pub struct IncomingCall {
    pub method: String,
    pub peer_address: String,
    pub metadata: HashMap<String, String>,
    pub fingerprint: Option<String>,
    pub signature: Option<Vec<u8>>,
    pub signed_data: Vec<u8>,
    pub identity: IdentityClaim,
    pub body_fields: Vec<(String, String)>,
    pub sensitive_fields: Vec<&'static str>,
}

/// The assembled chain. Constructed once per server and shared (as an
/// `Arc`) across every connection.
pub struct AuthPipeline {
    config: Arc<GatewayConfig>,
    metrics: Arc<MetricsCollector>,
    principal_store: Arc<dyn PrincipalStore>,
    jwks: jwt::JwksCache,
    saml: Option<Arc<dyn saml::SamlVerifier>>,
}

impl AuthPipeline {
    pub fn new(
        config: Arc<GatewayConfig>,
        metrics: Arc<MetricsCollector>,
        principal_store: Arc<dyn PrincipalStore>,
        saml: Option<Arc<dyn saml::SamlVerifier>>,
    ) -> Self {
        Self {
            config,
            metrics,
            principal_store,
            jwks: jwt::JwksCache::new(),
            saml,
        }
    }

    /// Run the full chain and return the populated [`CallContext`].
    ///
    /// A `Result::Err` here is always one of `InvalidSignature`,
    /// `Unauthenticated`, `PermissionDenied` or `Internal` (a recovered
    /// panic) — the propagation policy in which these surface directly
    /// as gRPC status errors.
    pub async fn authenticate(&self, call: IncomingCall) -> Result<CallContext> {
        // Stage 1: tagging.
        let mut ctx = CallContext::new(call.method.clone(), call.peer_address.clone());

        // Stage 2: log-level override.
        if let Some(level) = call.metadata.get("x-log-level") {
            ctx.log_level_override = crate::runtime::LogLevel::from_str(level);
        }

        // Stage 3: structured request log, regardless of outcome.
        tracing::info!(method = %ctx.method, peer = %ctx.peer_address, "accepted call");

        // Stage 4: user-agent and peer-address extraction.
        if let Some(ua) = call.metadata.get("user-agent") {
            ctx.tags.set("user_agent", ua.clone());
        }
        ctx.tags.set("peer", ctx.peer_address.clone());

        // Stage 5: audit-data capture (fingerprint of the call for an
        // external audit sink to persist; persistence itself is out of
        // scope).
        ctx.tags.set(
            "audit_fingerprint",
            format!("{}:{}", ctx.method, ctx.peer_address),
        );

        // Stage 6: body-to-tags rewriter. Errors here are logged and
        // swallowed — they must never block the call.
        let body_refs: Vec<(&str, &str)> = call
            .body_fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        ctx.tags.set(
            "body_summary",
            context::summarize_body(&body_refs, &call.sensitive_fields),
        );

        // Stage 7: Prometheus counter/histogram. Final status is not yet
        // known, so outcome is recorded by the caller once the whole
        // chain (including the downstream call) completes; we only
        // stamp the start here.
        let start = ctx.started_at;

        // Stage 8: panic recovery wraps everything from here on.
        ctx.auth_enabled = self.config.auth.enabled;
        let result = AssertUnwindSafe(self.run_protected(&mut ctx, &call))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(error = %message, method = %ctx.method, "panic recovered in auth pipeline");
                Err(GatewayError::Internal(format!("recovered panic: {message}")))
            }
        };

        self.metrics.record_request(
            &ctx.method,
            &ctx.peer_address,
            outcome.is_ok(),
            start.elapsed(),
        );
        outcome?;
        Ok(ctx)
    }

    /// Stages 9–11, run under stage 8's panic-recovery umbrella.
    async fn run_protected(&self, ctx: &mut CallContext, call: &IncomingCall) -> Result<()> {
        // Stage 9: auth-config signaling.
        if !ctx.auth_enabled {
            ctx.principal = AuthenticatedPrincipal::anonymous();
            return Ok(());
        }

        // Stage 10: PGP signature check.
        let fingerprint = call
            .fingerprint
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidSignature("request is unsigned".to_string()))?;
        let signature = call
            .signature
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidSignature("request is unsigned".to_string()))?;

        let mut principal = signature::verify(
            self.principal_store.as_ref(),
            fingerprint,
            &call.signed_data,
            signature,
            self.config.auth.suspended,
        )?;

        // Stage 11: identity verification — exactly one of OIDC or SAML.
        principal = match &call.identity {
            IdentityClaim::Bearer(token) => {
                jwt::verify(&self.jwks, token, &self.config.auth.auth0).await?
            }
            IdentityClaim::SamlAssertion(assertion) => {
                let verifier = self.saml.as_ref().ok_or_else(|| {
                    GatewayError::Internal("no SAML verifier configured".to_string())
                })?;
                verifier.resolve(assertion).await?
            }
            IdentityClaim::None => principal,
        };

        ctx.principal = principal;
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
