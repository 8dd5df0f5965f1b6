// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-RPC routing decision (spec §4.3, "Decision order").

use std::collections::HashMap;

/// Namespaces served by the local control-plane process itself.
const LOCAL_NAMESPACES: &[&str] = &["auth", "config", "management", "oidc", "omni"];

/// The key a remote backend is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendKey {
    Cluster(String),
    Machine(String),
}

impl BackendKey {
    /// The cache key string, e.g. `cluster-prod` or `machine-worker-1,worker-2`.
    pub fn cache_key(&self) -> String {
        match self {
            BackendKey::Cluster(name) => format!("cluster-{name}"),
            BackendKey::Machine(nodes) => format!("machine-{nodes}"),
        }
    }
}

/// The director's output for one call: where to send it, and to which
/// backend if remote. This core only ever operates in one-to-one mode,
/// so there is always exactly one backend when `Remote` is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Local,
    Remote(BackendKey),
}

fn local_namespace(method: &str) -> bool {
    let service = method.trim_start_matches('/').split('/').next().unwrap_or("");
    let namespace = service.split('.').next().unwrap_or("");
    LOCAL_NAMESPACES.contains(&namespace)
}

/// Decide where `method` should be routed given the inbound gRPC
/// metadata. `metadata` is a simple lowercased key/value view; callers
/// extract it from `tonic::metadata::MetadataMap` before calling in.
pub fn decide(method: &str, metadata: &HashMap<String, String>) -> RoutingDecision {
    if local_namespace(method) {
        return RoutingDecision::Local;
    }

    if metadata.get("runtime").map(String::as_str) != Some("talos") {
        return RoutingDecision::Local;
    }

    if let Some(cluster) = metadata.get("cluster").or_else(|| metadata.get("context")) {
        return RoutingDecision::Remote(BackendKey::Cluster(cluster.clone()));
    }

    let mut nodes: Vec<&str> = Vec::new();
    if let Some(single) = metadata.get("node") {
        nodes.push(single.as_str());
    }
    if let Some(many) = metadata.get("nodes") {
        nodes.extend(many.split(','));
    }
    nodes.sort_unstable();
    nodes.dedup();

    RoutingDecision::Remote(BackendKey::Machine(nodes.join(",")))
}
