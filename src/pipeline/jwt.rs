// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage 11 (OIDC branch): JWT validation against a cached JWKS.

use crate::config::Auth0Config;
use crate::error::{GatewayError, Result};
use crate::pipeline::principal::{AuthenticatedPrincipal, Role};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const JWKS_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    #[allow(dead_code)]
    exp: u64,
}

/// Fetches and caches a JWKS document for an Auth0-style domain.
///
/// The TTL and dedup-on-miss behavior mirror the backend cache's use of
/// `moka::future::Cache::get_with` elsewhere in this crate: concurrent
/// validations during a cold cache share one fetch.
pub struct JwksCache {
    http: reqwest::Client,
    cache: Cache<String, Arc<JwkSet>>,
}

impl JwksCache {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            cache: Cache::builder().time_to_live(JWKS_TTL).build(),
        }
    }

    async fn fetch(&self, domain: &str) -> Result<Arc<JwkSet>> {
        let domain = domain.to_string();
        let http = self.http.clone();
        self.cache
            .try_get_with(domain.clone(), async move {
                let url = format!("https://{domain}/.well-known/jwks.json");
                let jwks: JwkSet = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Unauthenticated(format!("jwks fetch failed: {e}")))?
                    .json()
                    .await
                    .map_err(|e| {
                        GatewayError::Unauthenticated(format!("jwks decode failed: {e}"))
                    })?;
                Ok(Arc::new(jwks))
            })
            .await
            .map_err(|e: Arc<GatewayError>| {
                GatewayError::Unauthenticated(format!("jwks unavailable: {e}"))
            })
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `token` against the cached JWKS for `config.domain` and
/// derive an [`AuthenticatedPrincipal`] with `Reader` role (JWT-derived
/// principals are never granted more than read access by this stage;
/// elevation happens only through the PGP path's key-role lookup).
pub async fn verify(jwks: &JwksCache, token: &str, config: &Auth0Config) -> Result<AuthenticatedPrincipal> {
    let header = decode_header(token)
        .map_err(|e| GatewayError::Unauthenticated(format!("malformed token header: {e}")))?;
    let kid = header
        .kid
        .ok_or_else(|| GatewayError::Unauthenticated("token header missing kid".to_string()))?;

    let jwk_set = jwks.fetch(&config.domain).await?;
    let jwk = jwk_set
        .find(&kid)
        .ok_or_else(|| GatewayError::Unauthenticated(format!("unknown signing key: {kid}")))?;

    let decoding_key = DecodingKey::from_jwk(jwk)
        .map_err(|e| GatewayError::Unauthenticated(format!("invalid jwk: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&config.client_id]);
    validation.set_issuer(&[format!("https://{}/", config.domain)]);
    validation.leeway = CLOCK_SKEW.as_secs();

    let data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| GatewayError::Unauthenticated(format!("token validation failed: {e}")))?;

    if !config.allow_unverified_email && data.claims.email_verified != Some(true) {
        return Err(GatewayError::Unauthenticated(
            "email not verified".to_string(),
        ));
    }

    Ok(AuthenticatedPrincipal {
        user_id: data.claims.sub.clone(),
        identity: data.claims.email.unwrap_or(data.claims.sub),
        role: Role::Reader,
        verifier: None,
    })
}
