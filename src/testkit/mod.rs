// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures and in-memory doubles for integration tests.
//!
//! Everything here runs without Docker, a real socket, or any external
//! process: a scripted node-directory event stream, in-memory
//! principal/secrets stores, and a fresh PGP keypair for signature
//! tests.

use crate::directory::{DirectoryEvent, IdentityEvent, NodeDirectory};
use crate::pipeline::{PrincipalStore, PublicKeyRecord, Role, UserRecord};
use crate::proxy::{ClusterSecrets, ClusterSecretsStore};
use crate::error::{GatewayError, Result};
use futures::stream::{self, Iter as StreamIter};
use parking_lot::Mutex;
use pgp::composed::{KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey};
use pgp::crypto::hash::HashAlgorithm;
use pgp::types::{KeyTrait, SecretKeyTrait};
use std::collections::HashMap;
use std::vec::IntoIter;

/// A canned sequence of node-directory events, replayed into a
/// [`NodeDirectory`] via [`crate::directory::run_watcher`] without a real
/// resource-store connection.
pub struct ScriptedEvents(Vec<DirectoryEvent>);

impl ScriptedEvents {
    pub fn new(events: Vec<DirectoryEvent>) -> Self {
        Self(events)
    }

    /// One identity upsert followed by `Bootstrapped`, the minimal
    /// script most routing tests need.
    pub fn single_node(cluster: &str, machine_id: &str, name: &str, address: &str) -> Self {
        Self(vec![
            DirectoryEvent::Identity {
                machine_id: machine_id.to_string(),
                event: IdentityEvent::Upserted {
                    cluster: cluster.to_string(),
                    name: name.to_string(),
                    address: address.to_string(),
                },
            },
            DirectoryEvent::Bootstrapped,
        ])
    }

    pub fn into_stream(self) -> StreamIter<IntoIter<DirectoryEvent>> {
        stream::iter(self.0)
    }

    /// Replay directly into a fresh directory, returning it once the
    /// script has drained.
    pub async fn populate(self) -> Result<NodeDirectory> {
        let directory = NodeDirectory::new();
        crate::directory::run_watcher(directory.clone(), self.into_stream()).await?;
        Ok(directory)
    }
}

/// An in-memory [`PrincipalStore`] double, populated by tests directly
/// rather than fronting a real resource store.
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    keys: Mutex<HashMap<String, PublicKeyRecord>>,
    users: Mutex<HashMap<String, UserRecord>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, fingerprint: &str, record: PublicKeyRecord) {
        self.keys.lock().insert(fingerprint.to_string(), record);
    }

    pub fn insert_user(&self, user_id: &str, record: UserRecord) {
        self.users.lock().insert(user_id.to_string(), record);
    }
}

impl PrincipalStore for InMemoryPrincipalStore {
    fn public_key(&self, fingerprint: &str) -> Option<PublicKeyRecord> {
        self.keys.lock().get(fingerprint).cloned()
    }

    fn user(&self, user_id: &str) -> Option<UserRecord> {
        self.users.lock().get(user_id).cloned()
    }
}

/// An in-memory [`ClusterSecretsStore`] double holding one CA and
/// endpoint list per cluster name.
#[derive(Default)]
pub struct InMemoryClusterSecretsStore {
    secrets: Mutex<HashMap<String, (String, String)>>,
    endpoints: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryClusterSecretsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cluster(&self, cluster: &str, ca_cert_pem: String, ca_key_pem: String, endpoints: Vec<String>) {
        self.secrets
            .lock()
            .insert(cluster.to_string(), (ca_cert_pem, ca_key_pem));
        self.endpoints.lock().insert(cluster.to_string(), endpoints);
    }
}

impl ClusterSecretsStore for InMemoryClusterSecretsStore {
    fn secrets(&self, cluster: &str) -> Result<ClusterSecrets> {
        let (ca_cert_pem, ca_key_pem) = self
            .secrets
            .lock()
            .get(cluster)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("no secrets for cluster {cluster}")))?;
        Ok(ClusterSecrets { ca_cert_pem, ca_key_pem })
    }

    fn endpoints(&self, cluster: &str) -> Result<Vec<String>> {
        self.endpoints
            .lock()
            .get(cluster)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("no endpoints for cluster {cluster}")))
    }
}

/// A self-signed cluster CA, built the same way the proxy's own
/// certificate-minting tests do.
pub fn self_signed_cluster_ca() -> (String, String) {
    use rcgen::{CertificateParams, IsCa, KeyPair};

    let key = KeyPair::generate().expect("key generation");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("empty SAN list");
    params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).expect("self-signing");
    (cert.pem(), key.serialize_pem())
}

/// A freshly generated PGP keypair plus the user fixture it belongs to,
/// for stage-10 signature-pipeline tests. Generated per call rather than
/// hardcoded so every test run exercises real key material.
pub struct PgpFixture {
    pub user_id: String,
    pub fingerprint: String,
    pub armored_public_key: String,
    secret_key: SignedSecretKey,
}

impl PgpFixture {
    pub fn generate(user_id: &str) -> Self {
        let mut params = SecretKeyParamsBuilder::default();
        params
            .key_type(KeyType::EdDSA)
            .can_create_certificates(false)
            .can_sign(true)
            .primary_user_id(user_id.to_string());
        let secret_key_params = params.build().expect("valid key params");
        let secret_key = secret_key_params.generate().expect("key generation");
        let signed_secret_key = secret_key.sign(String::new).expect("self-signing secret key");

        let public_key = signed_secret_key.public_key();
        let signed_public_key = public_key
            .sign(&signed_secret_key, String::new)
            .expect("self-signing public key");

        let fingerprint = signed_public_key
            .fingerprint()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        let armored_public_key = signed_public_key
            .to_armored_string(None)
            .expect("armoring public key");

        Self {
            user_id: user_id.to_string(),
            fingerprint,
            armored_public_key,
            secret_key: signed_secret_key,
        }
    }

    /// Produce a detached armored signature over `data`, as a principal
    /// store's signing client would send alongside a request.
    pub fn sign(&self, data: &[u8]) -> String {
        use pgp::composed::StandaloneSignature;

        let signature = self
            .secret_key
            .create_signature(String::new, HashAlgorithm::SHA2_256, data)
            .expect("signing");
        let standalone = StandaloneSignature::new(signature);
        standalone.to_armored_string(None).expect("armoring signature")
    }

    pub fn public_key_record(&self, role: Role) -> PublicKeyRecord {
        PublicKeyRecord {
            user_id: self.user_id.clone(),
            role,
            expiration: None,
            confirmed: true,
            armored_key: self.armored_public_key.clone(),
        }
    }
}

/// A loopback in-memory transport pair, for exercising a local backend
/// without a real socket (spec §4.4, reused directly).
pub fn loopback_transport() -> (crate::transport::LocalListener, crate::transport::LocalDialer) {
    crate::transport::pair()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_events_populate_a_directory() {
        let directory = ScriptedEvents::single_node("prod", "m-1", "worker-1", "10.0.0.5")
            .populate()
            .await
            .unwrap();
        assert_eq!(directory.resolve("prod", "worker-1").address, "10.0.0.5");
    }

    #[test]
    fn in_memory_principal_store_round_trips() {
        let store = InMemoryPrincipalStore::new();
        store.insert_user(
            "u1",
            UserRecord {
                identity: "alice".to_string(),
                role: Role::Admin,
            },
        );
        let user = store.user("u1").unwrap();
        assert_eq!(user.identity, "alice");
    }

    #[test]
    fn in_memory_secrets_store_reports_missing_clusters() {
        let store = InMemoryClusterSecretsStore::new();
        assert!(store.secrets("unknown").is_err());
    }

    #[test]
    fn pgp_fixture_signs_and_is_self_consistent() {
        let fixture = PgpFixture::generate("alice@example.test");
        let signature = fixture.sign(b"hello world");
        assert!(signature.contains("BEGIN PGP SIGNATURE"));
        assert!(!fixture.fingerprint.is_empty());
    }
}
