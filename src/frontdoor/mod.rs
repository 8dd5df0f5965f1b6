// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP/2 demultiplexer mounted in front of the gRPC proxy and any
//! plain-HTTP handlers (SPEC_FULL §6).
//!
//! One TCP listener, one TLS-or-h2c-terminated connection per accept,
//! inspected per request: `Content-Type: application/grpc*` routes to
//! the gRPC service, everything else to the HTTP service. Both services
//! are injected as trait objects; this module wires the branch only.

use bytes::Bytes;
use http::{HeaderValue, Request};
use http_body_util::combinators::BoxBody;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type Body = BoxBody<Bytes, BoxError>;

/// A boxed request handler, either the gRPC service stack or an
/// external HTTP collaborator (spec.md §6: `/image/*`, `/omnictl/*`,
/// health, SAML/OIDC, debug, static).
pub type BoxedService = Box<
    dyn Service<
            Request<Body>,
            Response = http::Response<Body>,
            Error = BoxError,
            Future = Pin<Box<dyn std::future::Future<Output = Result<http::Response<Body>, BoxError>> + Send>>,
        > + Send,
>;

fn is_grpc(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(|v| v.starts_with("application/grpc"))
        .unwrap_or(false)
}

/// Branches each request to `grpc` or `http` based on its content type.
/// Neither inner service is ever handed a request meant for the other.
pub struct Demux {
    grpc: BoxedService,
    http: BoxedService,
}

impl Demux {
    pub fn new(grpc: BoxedService, http: BoxedService) -> Self {
        Self { grpc, http }
    }
}

impl Service<Request<Body>> for Demux {
    type Response = http::Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.grpc.poll_ready(cx) {
            Poll::Ready(Ok(())) => self.http.poll_ready(cx),
            other => other,
        }
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if is_grpc(&request) {
            self.grpc.call(request)
        } else {
            self.http.call(request)
        }
    }
}

/// Never actually constructed; documents the `Infallible`-compatible
/// shape a caller's plain-HTTP handler stack needs to satisfy if it has
/// no fallible branches of its own.
pub fn infallible_ok<T>(value: T) -> Result<T, Infallible> {
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Empty};

    fn empty_body() -> Body {
        Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
    }

    #[test]
    fn grpc_content_type_is_detected() {
        let request = Request::builder()
            .header(http::header::CONTENT_TYPE, "application/grpc+proto")
            .body(empty_body())
            .unwrap();
        assert!(is_grpc(&request));
    }

    #[test]
    fn plain_http_is_not_grpc() {
        let request = Request::builder()
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(empty_body())
            .unwrap();
        assert!(!is_grpc(&request));
    }

    #[test]
    fn missing_content_type_is_not_grpc() {
        let request = Request::builder().body(empty_body()).unwrap();
        assert!(!is_grpc(&request));
    }
}
