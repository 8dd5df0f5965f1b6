// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watches a TLS key/cert pair on disk and hot-swaps the serving
//! certificate without interrupting the accept loop (spec §4.5).

use crate::error::{GatewayError, Result};
use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustls::sign::CertifiedKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Loads `cert_path`/`key_path` into a `CertifiedKey` rustls can serve
/// directly from a `ResolvesServerCert` implementation.
fn load_certified_key(cert_path: &Path, key_path: &Path) -> Result<CertifiedKey> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| GatewayError::Config(format!("reading {}: {e}", cert_path.display())))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| GatewayError::Config(format!("reading {}: {e}", key_path.display())))?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Config(format!("parsing {}: {e}", cert_path.display())))?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| GatewayError::Config(format!("parsing {}: {e}", key_path.display())))?
        .ok_or_else(|| GatewayError::Config(format!("no private key in {}", key_path.display())))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| GatewayError::Config(format!("unsupported key type: {e}")))?;

    Ok(CertifiedKey::new(certs, signing_key))
}

/// Holds the currently-serving certificate behind an RCU-style swap; a
/// server's `ResolvesServerCert` reads through this on every handshake.
#[derive(Clone)]
pub struct CertHandle {
    current: Arc<ArcSwap<CertifiedKey>>,
}

impl CertHandle {
    pub fn current(&self) -> Arc<CertifiedKey> {
        self.current.load_full()
    }
}

/// Watches the parent directory of `cert_path`/`key_path` (not the
/// files themselves, so a rename-then-create on reload is still
/// observed) and reloads on every filesystem event that touches either
/// path. A reload failure logs at Error level and leaves the previous
/// certificate in place; the watch itself is never torn down.
pub async fn watch(cert_path: PathBuf, key_path: PathBuf) -> Result<(CertHandle, RecommendedWatcher)> {
    let initial = load_certified_key(&cert_path, &key_path)?;
    let handle = CertHandle {
        current: Arc::new(ArcSwap::new(Arc::new(initial))),
    };

    let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(16);
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
        let _ = tx.blocking_send(event);
    })
    .map_err(|e| GatewayError::Config(format!("cert watcher init: {e}")))?;

    let parent = cert_path
        .parent()
        .ok_or_else(|| GatewayError::Config("cert path has no parent directory".to_string()))?;
    watcher
        .watch(parent, RecursiveMode::NonRecursive)
        .map_err(|e| GatewayError::Config(format!("watching {}: {e}", parent.display())))?;

    let reload_handle = handle.clone();
    let watch_cert = cert_path.clone();
    let watch_key = key_path.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(event) = event else { continue };
            if !relevant(&event, &watch_cert, &watch_key) {
                continue;
            }
            match load_certified_key(&watch_cert, &watch_key) {
                Ok(fresh) => {
                    reload_handle.current.store(Arc::new(fresh));
                    tracing::info!("certificate reloaded");
                }
                Err(e) => {
                    tracing::error!(error = %e, "certificate reload failed, retaining previous certificate");
                }
            }
        }
    });

    Ok((handle, watcher))
}

fn relevant(event: &Event, cert_path: &Path, key_path: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p == cert_path || p == key_path)
}
