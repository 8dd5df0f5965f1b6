// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stage 10: PGP request-signature verification.

use super::principal::{AuthenticatedPrincipal, Role, SignatureVerifier};
use crate::error::{GatewayError, Result};
use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::sync::Arc;
use std::time::SystemTime;

/// A public-key record, as held by the out-of-scope resource store.
#[derive(Debug, Clone)]
pub struct PublicKeyRecord {
    pub user_id: String,
    pub role: Role,
    pub expiration: Option<SystemTime>,
    pub confirmed: bool,
    pub armored_key: String,
}

/// A user record, as held by the out-of-scope resource store.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub identity: String,
    pub role: Role,
}

/// Read-only lookup surface the signature stage needs from the resource
/// store. The store itself — persistence, schema, tenancy — is an
/// external collaborator; this trait is the narrow slice the pipeline
/// calls into.
pub trait PrincipalStore: Send + Sync {
    fn public_key(&self, fingerprint: &str) -> Option<PublicKeyRecord>;
    fn user(&self, user_id: &str) -> Option<UserRecord>;
}

struct PgpVerifier {
    public_key: SignedPublicKey,
}

impl SignatureVerifier for PgpVerifier {
    fn verify(&self, signed_data: &[u8], signature: &[u8]) -> Result<()> {
        let (sig, _) = StandaloneSignature::from_armor_single(signature)
            .map_err(|e| GatewayError::InvalidSignature(format!("malformed signature: {e}")))?;
        sig.verify(&self.public_key, signed_data)
            .map_err(|e| GatewayError::InvalidSignature(format!("signature check failed: {e}")))
    }
}

/// Verify a detached PGP signature over `signed_data` and, on success,
/// derive the resulting [`AuthenticatedPrincipal`].
///
/// `suspended` implements the deployment-wide clamp: when true, the
/// derived role is always `Reader` regardless of the key/user roles.
pub fn verify(
    store: &dyn PrincipalStore,
    fingerprint: &str,
    signed_data: &[u8],
    signature: &[u8],
    suspended: bool,
) -> Result<AuthenticatedPrincipal> {
    let key_record = store
        .public_key(fingerprint)
        .ok_or_else(|| GatewayError::InvalidSignature(format!("unknown key: {fingerprint}")))?;

    if !key_record.confirmed {
        return Err(GatewayError::InvalidSignature(
            "key is not confirmed".to_string(),
        ));
    }
    if let Some(expiration) = key_record.expiration {
        if expiration < SystemTime::now() {
            return Err(GatewayError::InvalidSignature("key has expired".to_string()));
        }
    }

    let user_record = store
        .user(&key_record.user_id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown user: {}", key_record.user_id)))?;

    let (public_key, _) = SignedPublicKey::from_armor_single(key_record.armored_key.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(format!("malformed public key: {e}")))?;

    let verifier = PgpVerifier { public_key };
    verifier.verify(signed_data, signature)?;

    let mut role = user_record.role.min(key_record.role);
    if suspended {
        role = role.min(Role::Reader);
    }

    Ok(AuthenticatedPrincipal {
        user_id: key_record.user_id,
        identity: user_record.identity,
        role,
        verifier: Some(Arc::new(verifier)),
    })
}
