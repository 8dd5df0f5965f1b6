// SPDX-License-Identifier: MIT OR Apache-2.0

//! A dialed channel to one or more node-OS endpoints, plus the
//! credentials used to open it (spec §3 `BackendCacheEntry`, §4.3
//! "Per-call header rewrite").

use crate::directory::NodeInfo;
use crate::pipeline::Role;
use crate::proxy::credentials::ClusterCredentials;
use crate::runtime::MetricsCollector;
use std::sync::Arc;
use tonic::transport::Channel;

/// Methods that may be carried out at `admin` role even on a cluster
/// whose nodes are all below Talos 1.4.0, where the per-version
/// `operator` shortcut does not apply.
const PRIVILEGED_METHODS: &[&str] = &[
    "machine.MachineService/Reboot",
    "machine.MachineService/Shutdown",
    "machine.MachineService/EtcdAlarmList",
    "machine.MachineService/EtcdAlarmDisarm",
    "machine.MachineService/EtcdDefragment",
    "machine.MachineService/EtcdStatus",
    "machine.MachineService/PacketCapture",
    "machine.MachineService/Restart",
    "machine.MachineService/ServiceStart",
    "machine.MachineService/ServiceStop",
    "machine.MachineService/ServiceRestart",
];

/// A dialed channel to one or more Talos nodes, reached either through a
/// cluster (mTLS) or a direct machine address (skip-verify).
pub struct TalosBackend {
    pub channel: Channel,
    pub credentials: Option<ClusterCredentials>,
    metrics: Arc<MetricsCollector>,
}

impl TalosBackend {
    pub fn new(channel: Channel, credentials: Option<ClusterCredentials>, metrics: Arc<MetricsCollector>) -> Self {
        metrics.adjust_active_backend_clients(1);
        Self {
            channel,
            credentials,
            metrics,
        }
    }

    /// Compute the minimum Talos version and the `talos-role` header for
    /// one call, given the caller's role and the resolved nodes.
    pub fn compute_role_header(caller_role: Role, method: &str, resolved: &[NodeInfo]) -> &'static str {
        if caller_role < Role::Operator {
            return "reader";
        }

        let min_version = resolved
            .iter()
            .filter(|n| !n.talos_version.is_empty())
            .map(|n| n.talos_version.as_str())
            .min_by(|a, b| compare_versions(a, b));

        if let Some(version) = min_version {
            if compare_versions(version, "1.4.0") != std::cmp::Ordering::Less {
                return "operator";
            }
        }

        if PRIVILEGED_METHODS.contains(&method) {
            return "admin";
        }

        "reader"
    }
}

impl Drop for TalosBackend {
    fn drop(&mut self) {
        self.metrics.adjust_active_backend_clients(-1);
    }
}

/// Compare two `major.minor.patch` version strings numerically.
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    parse(a).cmp(&parse(b))
}

/// Rewrite the `node`/`nodes` headers to the resolved addresses and set
/// `talos-role` / `resolved-nodes`. Unresolved tokens (those the
/// directory could not map) are passed through verbatim.
pub struct HeaderRewrite {
    pub node: Option<String>,
    pub nodes: Option<String>,
    pub talos_role: &'static str,
    pub resolved_nodes: String,
}

pub fn rewrite_headers(
    caller_role: Role,
    method: &str,
    single: Option<&NodeInfo>,
    many: &[NodeInfo],
) -> HeaderRewrite {
    let mut all: Vec<NodeInfo> = Vec::new();
    if let Some(node) = single {
        all.push(node.clone());
    }
    all.extend(many.iter().cloned());

    let talos_role = TalosBackend::compute_role_header(caller_role, method, &all);
    let resolved_nodes = all
        .iter()
        .map(|n| n.get_address().to_string())
        .collect::<Vec<_>>()
        .join(",");

    HeaderRewrite {
        node: single.map(|n| n.get_address().to_string()),
        nodes: if many.is_empty() {
            None
        } else {
            Some(
                many.iter()
                    .map(|n| n.get_address().to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        },
        talos_role,
        resolved_nodes,
    }
}
