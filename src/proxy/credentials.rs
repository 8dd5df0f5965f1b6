// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived per-cluster TLS material (spec §3 `ClusterCredentials`,
//! §4.3 "Resolve TLS material").

use crate::error::{GatewayError, Result};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use std::time::Duration;

/// Root CA and a minted short-lived client identity, plus the endpoint
/// list to dial. Built on cache miss; never persisted by this crate.
#[derive(Clone)]
pub struct ClusterCredentials {
    pub root_ca_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
    pub endpoints: Vec<String>,
}

/// A cluster's CA material as read from the (out-of-scope) secrets
/// resource — the narrow slice the director needs.
pub struct ClusterSecrets {
    pub ca_cert_pem: String,
    pub ca_key_pem: String,
}

/// Mint a short-lived client certificate signed by `secrets`'s CA,
/// bound to an impersonator role, valid for `validity`.
///
/// The impersonator common name carries the role so a downstream
/// node-OS API that inspects the peer certificate can recover it
/// without a second round trip.
pub fn mint_client_certificate(
    secrets: &ClusterSecrets,
    endpoints: Vec<String>,
    impersonator_role: &str,
    validity: Duration,
) -> Result<ClusterCredentials> {
    let ca_key = KeyPair::from_pem(&secrets.ca_key_pem)
        .map_err(|e| GatewayError::Config(format!("invalid cluster CA key: {e}")))?;
    let ca_params = CertificateParams::from_ca_cert_pem(&secrets.ca_cert_pem)
        .map_err(|e| GatewayError::Config(format!("invalid cluster CA certificate: {e}")))?;
    let ca_cert = ca_params
        .self_signed(&ca_key)
        .map_err(|e| GatewayError::Config(format!("could not reconstruct cluster CA: {e}")))?;

    let mut client_params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| GatewayError::Internal(format!("certificate params: {e}")))?;
    let not_before = time::OffsetDateTime::now_utc();
    client_params.not_before = not_before;
    client_params.not_after = not_before + validity;
    client_params.distinguished_name = {
        let mut dn = DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, format!("impersonator:{impersonator_role}"));
        dn
    };

    let client_key = KeyPair::generate()
        .map_err(|e| GatewayError::Internal(format!("client key generation: {e}")))?;
    let client_cert = client_params
        .signed_by(&client_key, &ca_cert, &ca_key)
        .map_err(|e| GatewayError::Internal(format!("client cert signing: {e}")))?;

    Ok(ClusterCredentials {
        root_ca_pem: secrets.ca_cert_pem.clone(),
        client_cert_pem: client_cert.pem(),
        client_key_pem: client_key.serialize_pem(),
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_ca() -> ClusterSecrets {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        ClusterSecrets {
            ca_cert_pem: cert.pem(),
            ca_key_pem: key.serialize_pem(),
        }
    }

    #[test]
    fn mints_a_client_certificate_signed_by_the_cluster_ca() {
        let secrets = self_signed_ca();
        let creds = mint_client_certificate(
            &secrets,
            vec!["10.0.0.5:50000".to_string()],
            "operator",
            Duration::from_secs(3600),
        )
        .unwrap();

        assert!(creds.client_cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(creds.client_key_pem.contains("BEGIN"));
        assert_eq!(creds.endpoints, vec!["10.0.0.5:50000".to_string()]);
    }

    #[test]
    fn rejects_malformed_ca_material() {
        let secrets = ClusterSecrets {
            ca_cert_pem: "not a cert".to_string(),
            ca_key_pem: "not a key".to_string(),
        };
        let result = mint_client_certificate(&secrets, vec![], "reader", Duration::from_secs(60));
        assert!(result.is_err());
    }
}
