// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes one RPC to a local handler or a remote Talos backend (spec
//! §4.3 "Proxy Director & Per-Cluster Backend").
//!
//! [`ProxyDirector::route`] is called once per streaming RPC, before any
//! message is read, and implements the whole contract end to end:
//! decision order, backend acquisition (cached or freshly dialed,
//! single-flight on miss), and the per-call header rewrite.

pub mod backend;
pub mod cache;
pub mod credentials;
pub mod dial;
pub mod director;

pub use backend::{HeaderRewrite, TalosBackend};
pub use cache::BackendCache;
pub use credentials::{ClusterCredentials, ClusterSecrets};
pub use director::{BackendKey, RoutingDecision};

use crate::config::GatewayConfig;
use crate::directory::NodeDirectory;
use crate::error::{GatewayError, Result};
use crate::pipeline::Role;
use crate::runtime::MetricsCollector;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up the cluster CA material and endpoint list a cluster-scoped
/// dial needs. Implemented by whatever owns the (out-of-scope) resource
/// store; the director only needs this narrow slice.
pub trait ClusterSecretsStore: Send + Sync {
    fn secrets(&self, cluster: &str) -> Result<ClusterSecrets>;
    fn endpoints(&self, cluster: &str) -> Result<Vec<String>>;
}

/// The outcome of routing one call: either handle it locally, or send
/// it to `backend` with the given header rewrite applied.
pub enum RouteOutcome {
    Local,
    Remote {
        backend: Arc<TalosBackend>,
        headers: HeaderRewrite,
    },
}

/// Ties the node directory, the decision logic, the backend cache and
/// the dialers together into the single per-RPC entry point.
pub struct ProxyDirector {
    directory: NodeDirectory,
    cache: BackendCache,
    secrets: Arc<dyn ClusterSecretsStore>,
    config: Arc<GatewayConfig>,
    metrics: Arc<MetricsCollector>,
}

impl ProxyDirector {
    pub fn new(
        directory: NodeDirectory,
        secrets: Arc<dyn ClusterSecretsStore>,
        config: Arc<GatewayConfig>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            directory,
            cache: BackendCache::new(metrics.clone()),
            secrets,
            config,
            metrics,
        }
    }

    /// Evict a cache entry on a Cluster/ClusterSecrets/ClusterEndpoint
    /// Destroyed-or-Updated event, or a Machine Destroyed event (spec
    /// §4.3 "Cache invalidation"). The resource watcher calls this; it
    /// owns no knowledge of cache keys beyond the name it was told.
    pub async fn invalidate_cluster(&self, cluster: &str) {
        self.cache.invalidate(&BackendKey::Cluster(cluster.to_string()).cache_key()).await;
    }

    pub async fn invalidate_machine(&self, machine_id: &str) {
        self.cache.invalidate(&BackendKey::Machine(machine_id.to_string()).cache_key()).await;
    }

    /// Route one RPC given its fully-qualified method and lowercased
    /// inbound metadata, resolving nodes and rewriting headers for a
    /// remote decision.
    pub async fn route(
        &self,
        method: &str,
        metadata: &HashMap<String, String>,
        caller_role: Role,
    ) -> Result<RouteOutcome> {
        let decision = director::decide(method, metadata);
        let key = match decision {
            RoutingDecision::Local => return Ok(RouteOutcome::Local),
            RoutingDecision::Remote(key) => key,
        };

        let cluster = match &key {
            BackendKey::Cluster(name) => name.clone(),
            BackendKey::Machine(_) => String::new(),
        };

        let backend = self
            .cache
            .get_or_dial(key.cache_key(), || async {
                self.build_backend(&key).await
            })
            .await?;

        let (single, many) = self.resolve_nodes(&cluster, metadata);
        let headers = backend::rewrite_headers(caller_role, method, single.as_ref(), &many);

        Ok(RouteOutcome::Remote { backend, headers })
    }

    async fn build_backend(&self, key: &BackendKey) -> Result<TalosBackend> {
        match key {
            BackendKey::Cluster(cluster) => {
                let secrets = self.secrets.secrets(cluster)?;
                let endpoints = self.secrets.endpoints(cluster)?;
                if endpoints.is_empty() {
                    return Err(GatewayError::NotFound(format!(
                        "cluster {cluster} has no known endpoints"
                    )));
                }
                let credentials = credentials::mint_client_certificate(
                    &secrets,
                    endpoints,
                    "operator",
                    self.config.certificate_validity,
                )?;
                let channel = dial::dial_cluster(&credentials).await?;
                Ok(TalosBackend::new(
                    channel,
                    Some(credentials),
                    self.metrics.clone(),
                ))
            }
            BackendKey::Machine(nodes) => {
                let addresses: Vec<String> = nodes
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|token| self.directory.resolve("", token).get_address().to_string())
                    .filter(|addr| !addr.is_empty())
                    .collect();
                let channel = dial::dial_machine(&addresses).await?;
                Ok(TalosBackend::new(channel, None, self.metrics.clone()))
            }
        }
    }

    fn resolve_nodes(
        &self,
        cluster: &str,
        metadata: &HashMap<String, String>,
    ) -> (Option<crate::directory::NodeInfo>, Vec<crate::directory::NodeInfo>) {
        let single = metadata
            .get("node")
            .map(|token| self.resolve_or_passthrough(cluster, token));

        let many = metadata
            .get("nodes")
            .map(|tokens| {
                tokens
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(|token| self.resolve_or_passthrough(cluster, token))
                    .collect()
            })
            .unwrap_or_default();

        (single, many)
    }

    /// Resolve `token` against the directory, falling back to a verbatim
    /// passthrough when the directory has no entry for it at all (as
    /// opposed to an ambiguous match, which the directory already
    /// represents as a passthrough itself).
    fn resolve_or_passthrough(&self, cluster: &str, token: &str) -> crate::directory::NodeInfo {
        let resolved = self.directory.resolve(cluster, token);
        if resolved == crate::directory::NodeInfo::default() {
            crate::directory::NodeInfo::unresolved(token)
        } else {
            resolved
        }
    }
}
