// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drains a resource-store watch stream into a [`super::NodeDirectory`].
//!
//! Event payloads are dynamically typed at the source; rather than
//! matching on them by type at every call site, they arrive here as one
//! tagged variant with a single match arm per kind.

use super::NodeDirectory;
use crate::error::{GatewayError, Result};
use futures::stream::Stream;
use futures::StreamExt;

/// An identity-resource event (`ClusterMachineIdentity`).
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    Upserted {
        cluster: String,
        name: String,
        address: String,
    },
    Destroyed,
}

/// A status-resource event (`MachineStatus`).
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Updated { talos_version: String },
    Destroyed,
}

/// One item from the resource-store watch stream, tagged by kind.
///
/// `Bootstrapped` marks the end of the initial snapshot; `Errored` is
/// fatal and terminates the watcher per the directory's failure
/// semantics.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    Identity { machine_id: String, event: IdentityEvent },
    Status { machine_id: String, event: StatusEvent },
    Bootstrapped,
    Errored(String),
}

/// Drive `stream` into `directory` until the stream ends or an `Errored`
/// event is observed, at which point this returns `Err` — the watcher
/// is fatal and the caller (the lifecycle supervisor) should treat this
/// as terminal for the process.
pub async fn run_watcher<S>(directory: NodeDirectory, mut stream: S) -> Result<()>
where
    S: Stream<Item = DirectoryEvent> + Unpin,
{
    while let Some(event) = stream.next().await {
        match event {
            DirectoryEvent::Identity { machine_id, event } => {
                directory.apply_identity(&machine_id, event);
            }
            DirectoryEvent::Status { machine_id, event } => {
                directory.apply_status(&machine_id, event);
            }
            DirectoryEvent::Bootstrapped => {
                tracing::debug!("node directory bootstrap complete");
            }
            DirectoryEvent::Errored(msg) => {
                tracing::error!(error = %msg, "node directory watch failed, terminating watcher");
                return Err(GatewayError::Internal(format!(
                    "node directory watch errored: {msg}"
                )));
            }
        }
    }
    Ok(())
}
