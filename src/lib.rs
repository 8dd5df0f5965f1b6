// SPDX-License-Identifier: MIT OR Apache-2.0

//! # talos-gateway
//!
//! The gRPC front door for a Kubernetes-cluster management control plane.
//!
//! A single HTTP/2 port demultiplexes gRPC and plain HTTP traffic, runs
//! every gRPC call through a fixed authentication pipeline, resolves
//! `cluster`/`node` routing metadata against a live node directory, and
//! proxies the call to the right backend over a short-lived mTLS
//! connection. See `SPEC_FULL.md` for the full module-by-module contract.
//!
//! ## Module Overview
//!
//! - [`frontdoor`] — HTTP/2 demux in front of everything else
//! - [`pipeline`] — the fixed authentication interceptor chain
//! - [`directory`] — the live view of known cluster nodes
//! - [`proxy`] — routing decisions, backend dialing and cert minting
//! - [`transport`] — the in-process loopback transport
//! - [`lifecycle`] — panic-safe task supervision and cert hot-reload
//! - [`config`] — the configuration surface
//! - [`runtime`] — resilience (retry, circuit breaker) and observability
//! - [`error`] — the error taxonomy
//! - [`testkit`] — fixtures and doubles for integration tests
//!
//! ## Disclaimer
//!
//! This project is **NOT** affiliated with Sidero Labs or Talos Linux.
//! Provided AS-IS, without warranty of any kind.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod directory;
pub mod error;
pub mod frontdoor;
pub mod lifecycle;
pub mod pipeline;
pub mod proxy;
pub mod runtime;
pub mod testkit;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use runtime::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, CustomRetryPolicy,
    DefaultRetryPolicy, ExponentialBackoff, FixedBackoff, InterceptorMetrics, LinearBackoff,
    LogLevel, LoggingConfig, LoggingInterceptor, NoBackoff, NoRetryPolicy, RequestLogger,
    RequestSpan, RetryConfig, RetryConfigBuilder, RetryPolicy,
};
