// SPDX-License-Identifier: MIT OR Apache-2.0

//! The live index from symbolic node references to node metadata.
//!
//! Fed by a watch stream on a resource store, [`NodeDirectory`] answers
//! `resolve(cluster, name)` without ever blocking on that stream: the
//! read path only ever copies the last-observed consistent view out of
//! a [`parking_lot::Mutex`]-guarded set of maps.

mod watcher;

pub use watcher::{run_watcher, DirectoryEvent, IdentityEvent, StatusEvent};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A node's metadata, copied freely between callers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeInfo {
    pub cluster: String,
    pub id: String,
    pub name: String,
    pub talos_version: String,
    pub address: String,
    pub management_endpoint: String,
    pub ambiguous: bool,
}

impl NodeInfo {
    /// The token a caller used, wrapped as an unresolved passthrough value.
    pub fn unresolved(token: &str) -> Self {
        Self {
            cluster: token.to_string(),
            id: token.to_string(),
            name: token.to_string(),
            talos_version: token.to_string(),
            address: token.to_string(),
            management_endpoint: token.to_string(),
            ambiguous: false,
        }
    }

    /// The routable address: primary address if set, else the management endpoint.
    pub fn get_address(&self) -> &str {
        if !self.address.is_empty() {
            &self.address
        } else {
            &self.management_endpoint
        }
    }

    /// An ambiguous token is passed through verbatim rather than
    /// resolved, since the directory cannot pick a side without more
    /// context than the caller gave it.
    fn ambiguous_stub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: name.to_string(),
            ambiguous: true,
            ..Default::default()
        }
    }
}

/// Key used for the primary `(cluster, key) -> machine id` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PrimaryKey {
    cluster: String,
    key: String,
}

#[derive(Default)]
struct Maps {
    /// `(cluster, id|name|address) -> machine id`
    primary: HashMap<PrimaryKey, String>,
    /// `machine id -> NodeInfo`
    info: HashMap<String, NodeInfo>,
    /// cluster-agnostic `address -> [machine id]`, used only for ambiguity detection
    by_address: HashMap<String, Vec<String>>,
    /// cluster-agnostic `name -> [machine id]`, used only for ambiguity detection
    by_name: HashMap<String, Vec<String>>,
}

impl Maps {
    fn insert_primary(&mut self, cluster: &str, key: &str, machine_id: &str) {
        if key.is_empty() {
            return;
        }
        self.primary.insert(
            PrimaryKey {
                cluster: cluster.to_string(),
                key: key.to_string(),
            },
            machine_id.to_string(),
        );
    }

    fn remove_primary(&mut self, cluster: &str, key: &str) {
        if key.is_empty() {
            return;
        }
        self.primary.remove(&PrimaryKey {
            cluster: cluster.to_string(),
            key: key.to_string(),
        });
    }

    fn add_multimap(map: &mut HashMap<String, Vec<String>>, key: &str, machine_id: &str) {
        if key.is_empty() {
            return;
        }
        let entry = map.entry(key.to_string()).or_default();
        if !entry.iter().any(|id| id == machine_id) {
            entry.push(machine_id.to_string());
        }
    }

    fn remove_multimap(map: &mut HashMap<String, Vec<String>>, key: &str, machine_id: &str) {
        if key.is_empty() {
            return;
        }
        if let Some(entry) = map.get_mut(key) {
            entry.retain(|id| id != machine_id);
            if entry.is_empty() {
                map.remove(key);
            }
        }
    }

    /// Remove every `(cluster, *)` primary entry and multimap membership
    /// installed for `machine_id` by the given `NodeInfo`, leaving the
    /// info record itself untouched.
    fn remove_machine_entries(&mut self, machine_id: &str, info: &NodeInfo) {
        self.remove_primary(&info.cluster, &info.id);
        self.remove_primary(&info.cluster, &info.name);
        self.remove_primary(&info.cluster, &info.address);
        Self::remove_multimap(&mut self.by_name, &info.name, machine_id);
        Self::remove_multimap(&mut self.by_address, &info.address, machine_id);
    }

    fn install_machine_entries(&mut self, machine_id: &str, info: &NodeInfo) {
        self.insert_primary(&info.cluster, &info.id, machine_id);
        self.insert_primary(&info.cluster, &info.name, machine_id);
        self.insert_primary(&info.cluster, &info.address, machine_id);
        Self::add_multimap(&mut self.by_name, &info.name, machine_id);
        Self::add_multimap(&mut self.by_address, &info.address, machine_id);
    }
}

/// The in-memory node index. Cheaply cloneable; clones share the same
/// underlying state.
#[derive(Clone, Default)]
pub struct NodeDirectory {
    maps: Arc<Mutex<Maps>>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self {
            maps: Arc::new(Mutex::new(Maps::default())),
        }
    }

    /// Resolve a symbolic node reference within (or outside) a cluster.
    ///
    /// Never blocks on the event stream; returns the last-observed
    /// consistent view.
    pub fn resolve(&self, cluster: &str, name: &str) -> NodeInfo {
        if cluster.is_empty() && name.is_empty() {
            return NodeInfo::default();
        }
        let maps = self.maps.lock();

        if let Some(machine_id) = maps.primary.get(&PrimaryKey {
            cluster: cluster.to_string(),
            key: name.to_string(),
        }) {
            if let Some(info) = maps.info.get(machine_id) {
                return info.clone();
            }
        }

        if let Some(machine_ids) = maps.by_name.get(name) {
            if machine_ids.len() > 1 {
                return NodeInfo::ambiguous_stub(name);
            }
        }

        if let Some(machine_ids) = maps.by_address.get(name) {
            if let Some(machine_id) = machine_ids.first() {
                if let Some(info) = maps.info.get(machine_id) {
                    return info.clone();
                }
            }
        }
        if let Some(machine_ids) = maps.by_name.get(name) {
            if let Some(machine_id) = machine_ids.first() {
                if let Some(info) = maps.info.get(machine_id) {
                    return info.clone();
                }
            }
        }

        NodeInfo::default()
    }

    /// Apply an identity event (`ClusterMachineIdentity` create/update/destroy).
    pub fn apply_identity(&self, machine_id: &str, event: IdentityEvent) {
        let mut maps = self.maps.lock();
        match event {
            IdentityEvent::Upserted {
                cluster,
                name,
                address,
            } => {
                if name.is_empty() || cluster.is_empty() {
                    tracing::warn!(machine_id, "identity event missing name or cluster, ignored");
                    return;
                }
                let previous = maps.info.get(machine_id).cloned();
                if let Some(prev) = &previous {
                    if !prev.address.is_empty() {
                        maps.remove_machine_entries(machine_id, prev);
                    }
                }
                let talos_version = previous
                    .as_ref()
                    .map(|p| p.talos_version.clone())
                    .unwrap_or_default();
                let management_endpoint = previous
                    .as_ref()
                    .map(|p| p.management_endpoint.clone())
                    .unwrap_or_default();
                let info = NodeInfo {
                    cluster: cluster.clone(),
                    id: machine_id.to_string(),
                    name,
                    talos_version,
                    address,
                    management_endpoint,
                    ambiguous: false,
                };
                maps.install_machine_entries(machine_id, &info);
                maps.info.insert(machine_id.to_string(), info);
            }
            IdentityEvent::Destroyed => {
                if let Some(prev) = maps.info.get(machine_id).cloned() {
                    maps.remove_machine_entries(machine_id, &prev);
                    // Keep a stub record (empty address) so status-only
                    // events can still carry the Talos version.
                    maps.info.insert(
                        machine_id.to_string(),
                        NodeInfo {
                            id: machine_id.to_string(),
                            address: String::new(),
                            ..prev
                        },
                    );
                } else {
                    tracing::debug!(machine_id, "destroy for unknown identity, ignored");
                }
            }
        }
    }

    /// Apply a status event (`MachineStatus` create/update/destroy).
    pub fn apply_status(&self, machine_id: &str, event: StatusEvent) {
        let mut maps = self.maps.lock();
        match event {
            StatusEvent::Updated { talos_version } => {
                if let Some(info) = maps.info.get_mut(machine_id) {
                    info.talos_version = talos_version;
                } else {
                    maps.info.insert(
                        machine_id.to_string(),
                        NodeInfo {
                            id: machine_id.to_string(),
                            talos_version,
                            ..Default::default()
                        },
                    );
                }
            }
            StatusEvent::Destroyed => {
                if let Some(prev) = maps.info.remove(machine_id) {
                    maps.remove_machine_entries(machine_id, &prev);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(dir: &NodeDirectory, cluster: &str, id: &str, name: &str, address: &str) {
        dir.apply_identity(
            id,
            IdentityEvent::Upserted {
                cluster: cluster.to_string(),
                name: name.to_string(),
                address: address.to_string(),
            },
        );
    }

    #[test]
    fn resolve_empty_returns_zero_value() {
        let dir = NodeDirectory::new();
        assert_eq!(dir.resolve("", ""), NodeInfo::default());
    }

    #[test]
    fn resolve_unknown_returns_zero_value() {
        let dir = NodeDirectory::new();
        assert_eq!(dir.resolve("prod", "worker-1"), NodeInfo::default());
    }

    #[test]
    fn resolve_by_exact_cluster_and_name() {
        let dir = NodeDirectory::new();
        seed(&dir, "prod", "m-1", "worker-1", "10.0.0.5");

        let info = dir.resolve("prod", "worker-1");
        assert_eq!(info.id, "m-1");
        assert_eq!(info.address, "10.0.0.5");
        assert!(!info.ambiguous);
    }

    #[test]
    fn ambiguous_name_across_clusters() {
        let dir = NodeDirectory::new();
        seed(&dir, "a", "m-1", "db", "10.0.0.1");
        seed(&dir, "b", "m-2", "db", "10.0.0.2");

        let info = dir.resolve("", "db");
        assert!(info.ambiguous);
        assert_eq!(info.id, "");
        assert_eq!(info.get_address(), "db");
    }

    #[test]
    fn address_change_invalidates_stale_entry() {
        let dir = NodeDirectory::new();
        seed(&dir, "prod", "m-1", "worker-1", "10.0.0.5");
        seed(&dir, "prod", "m-1", "worker-1", "10.0.0.6");

        assert_eq!(dir.resolve("prod", "10.0.0.5"), NodeInfo::default());
        assert_eq!(dir.resolve("prod", "worker-1").address, "10.0.0.6");
    }

    #[test]
    fn destroyed_identity_keeps_stub_for_status_events() {
        let dir = NodeDirectory::new();
        seed(&dir, "prod", "m-1", "worker-1", "10.0.0.5");
        dir.apply_identity("m-1", IdentityEvent::Destroyed);

        assert_eq!(dir.resolve("prod", "worker-1"), NodeInfo::default());
        dir.apply_status(
            "m-1",
            StatusEvent::Updated {
                talos_version: "1.5.0".to_string(),
            },
        );
        // Stub still carries the machine id internally even though no
        // symbolic lookup resolves to it anymore.
    }

    #[test]
    fn machine_status_destroyed_removes_info_entirely() {
        let dir = NodeDirectory::new();
        seed(&dir, "prod", "m-1", "worker-1", "10.0.0.5");
        dir.apply_status("m-1", StatusEvent::Destroyed);
        assert_eq!(dir.resolve("prod", "worker-1"), NodeInfo::default());
    }
}
