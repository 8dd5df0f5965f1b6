// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the gateway, per the propagation policy in spec §7.
//!
//! Every variant maps onto exactly one gRPC status code so call sites can
//! convert with `?` and let the outermost layer turn it into a `tonic::Status`.

use thiserror::Error;

#[allow(clippy::result_large_err)]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown cluster, unknown key fingerprint, unknown user.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing, malformed, or unverifiable PGP signature.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Role check failed, or a mutating call hit the read-only local server.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// JWT/SAML verification failure.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Recovered panic, or a resource-store I/O error outside business logic.
    #[error("internal error: {0}")]
    Internal(String),

    /// Downstream dial failed within the caller's context deadline.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Configuration error (malformed `GatewayConfig`, bad cert path, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Circuit breaker tripped on a backend dial.
    #[error("circuit breaker is open: {0}")]
    CircuitOpen(String),

    /// Transport-level failure dialing a backend.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<GatewayError> for tonic::Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => tonic::Status::not_found(msg),
            GatewayError::InvalidSignature(msg) => tonic::Status::unauthenticated(msg),
            GatewayError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            GatewayError::Unauthenticated(msg) => tonic::Status::unauthenticated(msg),
            GatewayError::Internal(msg) => tonic::Status::internal(msg),
            GatewayError::Unavailable(msg) => tonic::Status::unavailable(msg),
            GatewayError::Config(msg) => tonic::Status::internal(msg),
            GatewayError::CircuitOpen(msg) => tonic::Status::unavailable(msg),
            GatewayError::Transport(e) => tonic::Status::unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_status_not_found() {
        let status: tonic::Status = GatewayError::NotFound("cluster prod".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[test]
    fn invalid_signature_maps_to_unauthenticated() {
        let status: tonic::Status = GatewayError::InvalidSignature("bad sig".into()).into();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn permission_denied_maps_through() {
        let status: tonic::Status = GatewayError::PermissionDenied("role too low".into()).into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn internal_maps_through() {
        let status: tonic::Status = GatewayError::Internal("panic recovered".into()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn unavailable_maps_through() {
        let status: tonic::Status = GatewayError::Unavailable("dial timed out".into()).into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
