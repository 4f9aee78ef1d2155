//! Task-lifecycle manager for the worker process: a shared
//! `CancellationToken`, tracked `JoinHandle`s, and graceful shutdown on
//! SIGTERM/Ctrl-C. Grounded on the teacher's `automation/mod.rs::Runtime`,
//! unchanged in shape -- only the business-specific `run_token_refresh_loop`
//! companion function was dropped, since this crate's only background task
//! is the orchestrator's own visibility-renewal loop
//! ([`crate::orchestrator`]), which owns its own cancellation token per job
//! rather than sharing the worker-wide one.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Task-lifecycle manager that owns a `CancellationToken` shared by all
/// spawned tasks and collects their `JoinHandle`s for graceful shutdown.
/// It does not own specific business dependencies -- those are passed
/// when spawning individual tasks.
pub struct Runtime {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Runtime {
    /// Create a new runtime with a fresh cancellation token.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Return a clone of the cancellation token for passing to tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a worker task with a descriptive name.
    ///
    /// The task's `JoinHandle` is tracked for shutdown. The task should
    /// check `CancellationToken::is_cancelled()` in its loop to exit
    /// gracefully when shutdown is initiated.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::info!(task = %name, "spawning worker task");
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    /// Return the number of spawned tasks.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Initiate graceful shutdown.
    ///
    /// 1. Cancels the token, signaling all tasks to stop.
    /// 2. Awaits all `JoinHandle`s with a 30-second timeout.
    /// 3. If timeout is exceeded, logs a warning (caller decides whether
    ///    to force-exit).
    pub async fn shutdown(&mut self) {
        tracing::info!("initiating graceful shutdown");
        self.cancel.cancel();

        let timeout_duration = Duration::from_secs(30);
        let handles: Vec<_> = self.handles.drain(..).collect();

        let shutdown = async {
            for (name, handle) in handles {
                match handle.await {
                    Ok(()) => tracing::info!(task = %name, "task completed cleanly"),
                    Err(e) => tracing::warn!(task = %name, error = %e, "task panicked during shutdown"),
                }
            }
        };

        if tokio::time::timeout(timeout_duration, shutdown).await.is_err() {
            tracing::warn!("shutdown timeout exceeded (30s), some tasks may still be running");
        } else {
            tracing::info!("graceful shutdown complete");
        }
    }

    /// Block until a shutdown signal is received, then gracefully stop
    /// all tasks. The typical entry point for the `storyforge worker`
    /// command: spawn all tasks, call this, and they're stopped and
    /// awaited by the time it returns.
    pub async fn run_until_shutdown(mut self) {
        wait_for_shutdown_signal().await;
        self.shutdown().await;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for an OS shutdown signal (Ctrl+C or SIGTERM).
///
/// On Unix, listens for both Ctrl+C and SIGTERM. On Windows, listens for
/// Ctrl+C only (SIGTERM is not available).
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler, using Ctrl+C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl+C");
                } else {
                    tracing::info!("received Ctrl+C");
                }
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl+C handler error");
                }
                tracing::info!("received Ctrl+C");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
        } else {
            tracing::info!("received Ctrl+C");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawn_and_cancel() {
        let mut runtime = Runtime::new();
        let cancel = runtime.cancel_token();
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        runtime.spawn("test-task", async move {
            ran_clone.store(true, Ordering::SeqCst);
            cancel.cancelled().await;
        });

        assert_eq!(runtime.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ran.load(Ordering::SeqCst));

        runtime.shutdown().await;
        assert_eq!(runtime.task_count(), 0);
    }

    #[tokio::test]
    async fn multiple_tasks_all_stopped() {
        let mut runtime = Runtime::new();
        let counter = Arc::new(AtomicU32::new(0));

        for i in 0..5 {
            let cancel = runtime.cancel_token();
            let counter_clone = counter.clone();
            runtime.spawn(format!("task-{i}"), async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                cancel.cancelled().await;
            });
        }

        assert_eq!(runtime.task_count(), 5);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        runtime.shutdown().await;
        assert_eq!(runtime.task_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_completes_quickly_for_fast_tasks() {
        let mut runtime = Runtime::new();
        let cancel = runtime.cancel_token();

        runtime.spawn("quick-task", async move {
            cancel.cancelled().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        let start = tokio::time::Instant::now();
        runtime.shutdown().await;
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn shutdown_handles_already_completed_tasks() {
        let mut runtime = Runtime::new();

        runtime.spawn("instant-task", async {});

        tokio::time::sleep(Duration::from_millis(20)).await;

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_token_is_shared() {
        let runtime = Runtime::new();
        let t1 = runtime.cancel_token();
        let t2 = runtime.cancel_token();

        assert!(!t1.is_cancelled());
        assert!(!t2.is_cancelled());

        t1.cancel();

        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn default_impl() {
        let runtime = Runtime::default();
        assert_eq!(runtime.task_count(), 0);
        assert!(!runtime.cancel_token().is_cancelled());
    }
}
