// SPDX-License-Identifier: MIT OR Apache-2.0

//! A panic-catching task group sharing one root cancellation (spec
//! §4.5 Lifecycle Supervisor).

use crate::error::GatewayError;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as SyncMutex};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared cancellation signal every supervised task observes.
#[derive(Clone, Default)]
pub struct RootContext {
    token: CancellationToken,
}

impl RootContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Schedules subsystems under one root context, recovering panics and
/// cancelling every sibling as soon as one task returns an error.
///
/// An optional concurrency limit bounds how many `go`-scheduled tasks
/// may run at once; tasks submitted past the limit queue on an internal
/// semaphore rather than failing.
pub struct Supervisor {
    root: RootContext,
    first_error: Arc<Mutex<Option<GatewayError>>>,
    handles: SyncMutex<Vec<JoinHandle<()>>>,
    concurrency: Option<Arc<Semaphore>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            root: RootContext::new(),
            first_error: Arc::new(Mutex::new(None)),
            handles: SyncMutex::new(Vec::new()),
            concurrency: None,
        }
    }

    /// Bound the number of `go`-scheduled tasks that may run concurrently.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency = Some(Arc::new(Semaphore::new(limit)));
        self
    }

    pub fn root(&self) -> RootContext {
        self.root.clone()
    }

    /// Schedule `f`. A panic inside `f` is recovered and folded into a
    /// `GatewayError::Internal` that cancels the root context exactly
    /// like any other task error would.
    pub fn go<F, Fut>(&self, f: F)
    where
        F: FnOnce(RootContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
    {
        let root = self.root.clone();
        let first_error = self.first_error.clone();
        let permit_source = self.concurrency.clone();

        let handle = tokio::spawn(async move {
            let _permit = match &permit_source {
                Some(sem) => Some(sem.clone().acquire_owned().await.expect("semaphore open")),
                None => None,
            };

            let task_root = root.clone();
            let result = AssertUnwindSafe(f(task_root)).catch_unwind().await;

            let outcome = match result {
                Ok(inner) => inner,
                Err(payload) => Err(GatewayError::Internal(format!(
                    "task panicked: {}",
                    panic_message(&payload)
                ))),
            };

            if let Err(e) = outcome {
                let mut slot = first_error.lock().await;
                if slot.is_none() {
                    *slot = Some(e);
                }
                root.cancel();
            }
        });

        self.handles.lock().expect("handles mutex poisoned").push(handle);
    }

    /// Wait for every scheduled task to finish, returning the first
    /// error any of them produced (panics included).
    pub async fn wait(&self) -> Result<(), GatewayError> {
        let handles: Vec<_> = self.handles.lock().expect("handles mutex poisoned").drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.first_error.lock().await.take().map_or(Ok(()), Err)
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_ok_when_all_tasks_succeed() {
        let supervisor = Supervisor::new();
        supervisor.go(|_root| async { Ok(()) });
        supervisor.go(|_root| async { Ok(()) });
        assert!(supervisor.wait().await.is_ok());
    }

    #[tokio::test]
    async fn first_error_cancels_root_and_is_returned() {
        let supervisor = Supervisor::new();
        let root = supervisor.root();
        supervisor.go(|_root| async { Err(GatewayError::Internal("boom".to_string())) });
        supervisor.go(move |_root| async move {
            root.cancelled().await;
            Ok(())
        });
        let result = supervisor.wait().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn panics_are_recovered_as_internal_errors() {
        let supervisor = Supervisor::new();
        supervisor.go(|_root| async { panic!("surprise") });
        let result = supervisor.wait().await;
        assert!(matches!(result, Err(GatewayError::Internal(_))));
    }

    #[tokio::test]
    async fn concurrency_limit_is_accepted() {
        let supervisor = Supervisor::new().with_concurrency_limit(1);
        supervisor.go(|_root| async { Ok(()) });
        supervisor.go(|_root| async { Ok(()) });
        assert!(supervisor.wait().await.is_ok());
    }
}
