// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialing a node-OS API channel (spec §4.3 "Dial an HTTP/2 channel").

use crate::error::{GatewayError, Result};
use crate::proxy::credentials::ClusterCredentials;
use crate::runtime::{ExponentialBackoff, RetryConfig};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

const INITIAL_STREAM_WINDOW: u32 = 65_535 * 32;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_BACKOFF: Duration = Duration::from_secs(15);

fn retry_config() -> RetryConfig<crate::runtime::DefaultRetryPolicy, ExponentialBackoff> {
    RetryConfig::builder()
        .max_retries(3)
        .backoff(ExponentialBackoff::new(Duration::from_millis(200)).with_max_delay(MAX_BACKOFF))
        .build()
}

fn endpoint_for(address: &str, tls: Option<ClientTlsConfig>) -> Result<Endpoint> {
    let uri: http::Uri = format!("https://{address}")
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid endpoint {address}: {e}")))?;
    let mut endpoint = Channel::builder(uri)
        .connect_timeout(CONNECT_TIMEOUT)
        .initial_stream_window_size(Some(INITIAL_STREAM_WINDOW))
        .initial_connection_window_size(Some(INITIAL_STREAM_WINDOW));
    if let Some(tls) = tls {
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| GatewayError::Config(format!("tls config: {e}")))?;
    }
    Ok(endpoint)
}

/// Dial a cluster-scoped backend with mutual TLS, round-robining over
/// every endpoint `credentials` lists.
pub async fn dial_cluster(credentials: &ClusterCredentials) -> Result<Channel> {
    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&credentials.root_ca_pem))
        .identity(Identity::from_pem(
            &credentials.client_cert_pem,
            &credentials.client_key_pem,
        ));

    let mut endpoints = Vec::with_capacity(credentials.endpoints.len());
    for address in &credentials.endpoints {
        endpoints.push(endpoint_for(address, Some(tls.clone()))?);
    }
    if endpoints.is_empty() {
        return Err(GatewayError::Config(
            "cluster has no known endpoints".to_string(),
        ));
    }

    dial_with_retry(endpoints).await
}

/// Dial a machine-scoped backend directly, skipping certificate
/// verification (spec §4.3: "If keyed by machine, use insecure TLS").
///
/// tonic's `ClientTlsConfig` has no skip-verify escape hatch, so this
/// uses a raw-`rustls` connector idiom (`NoVerifier` +
/// `tokio_rustls::TlsConnector` behind a `tower::service_fn`) instead of
/// `Channel::balance_list`, which only accepts endpoints dialed through
/// tonic's own connector. Round-robin across the address list is
/// implemented as ordered failover with a rotating start index: each
/// retry attempt advances to the next address, so repeated dials spread
/// across the list the same way a balancer would, without requiring a
/// custom `tower::discover::Discover` implementation for one cached
/// channel per call.
pub async fn dial_machine(addresses: &[String]) -> Result<Channel> {
    if addresses.is_empty() {
        return Err(GatewayError::NotFound(
            "no resolved addresses for machine backend".to_string(),
        ));
    }

    let start = ROUND_ROBIN.fetch_add(1, Ordering::Relaxed) % addresses.len();
    let policy = retry_config();
    let addresses = addresses.to_vec();
    policy
        .execute(|| {
            let addresses = addresses.clone();
            async move {
                let mut last_err = None;
                for offset in 0..addresses.len() {
                    let address = &addresses[(start + offset) % addresses.len()];
                    match dial_insecure(address).await {
                        Ok(channel) => return Ok(channel),
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err.unwrap_or(GatewayError::Unavailable(
                    "no machine endpoints reachable".to_string(),
                )))
            }
        })
        .await
}

static ROUND_ROBIN: AtomicUsize = AtomicUsize::new(0);

async fn dial_insecure(address: &str) -> Result<Channel> {
    let host = address
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| address.to_string());

    let mut tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    tls_config
        .dangerous()
        .set_certificate_verifier(Arc::new(NoVerifier));
    tls_config.alpn_protocols = vec![b"h2".to_vec()];
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

    let endpoint = Endpoint::from_shared(format!("http://{address}"))
        .map_err(|e| GatewayError::Config(format!("invalid machine endpoint {address}: {e}")))?
        .connect_timeout(CONNECT_TIMEOUT)
        .initial_stream_window_size(Some(INITIAL_STREAM_WINDOW))
        .initial_connection_window_size(Some(INITIAL_STREAM_WINDOW));

    endpoint
        .connect_with_connector(tower::service_fn(move |uri: http::Uri| {
            let connector = connector.clone();
            let host = host.clone();
            async move {
                let target = format!(
                    "{}:{}",
                    uri.host().unwrap_or("127.0.0.1"),
                    uri.port_u16().unwrap_or(50000)
                );
                let tcp = tokio::net::TcpStream::connect(target).await?;
                let server_name = ServerName::try_from(host.clone())
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
                let tls_stream = connector.connect(server_name, tcp).await?;
                Ok::<_, std::io::Error>(TokioIo::new(tls_stream))
            }
        }))
        .await
        .map_err(GatewayError::Transport)
}

/// Accepts any server certificate. Used only for machine-scoped dials,
/// which authenticate the node out of band via its resolved address
/// rather than its certificate.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

async fn dial_with_retry(endpoints: Vec<Endpoint>) -> Result<Channel> {
    let policy = retry_config();
    policy
        .execute(|| {
            let endpoints = endpoints.clone();
            async move {
                Channel::balance_list(endpoints.into_iter())
                    .connect()
                    .await
                    .map_err(GatewayError::Transport)
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_for_rejects_malformed_address() {
        let result = endpoint_for("not a valid host :::", None);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dial_machine_rejects_empty_address_list() {
        let result = dial_machine(&[]).await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }
}
