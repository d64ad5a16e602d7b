//! The active-process registry: a mutex-guarded map of live child processes
//! the orchestrator may terminate on `stop()`.
//!
//! Re-architected per spec.md §9's redesign flag ("Ad-hoc process registry
//! map" → "a registry abstraction with explicit acquire/release guarded by
//! a mutex, and a `terminateAll(grace, force)` operation that is
//! idempotent").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;

/// A handle to a single supervised child process, keyed in the registry
/// under a string like `sqli-crawl` or `xss-<url-hash>`.
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub(crate) child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    pub fn new(child: Arc<Mutex<Child>>, pid: Option<u32>) -> Self {
        Self { pid, child }
    }
}

/// Mutex-guarded map of live child processes.
#[derive(Default)]
pub struct ActiveProcessRegistry {
    inner: Mutex<HashMap<String, ProcessHandle>>,
}

impl ActiveProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, key: impl Into<String>, handle: ProcessHandle) {
        let mut guard = self.inner.lock().await;
        guard.insert(key.into(), handle);
    }

    pub async fn deregister(&self, key: &str) -> Option<ProcessHandle> {
        let mut guard = self.inner.lock().await;
        guard.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Terminate every currently-registered process: send a graceful
    /// termination signal to all of them, wait `grace`, then forcefully
    /// kill whatever is still alive. Idempotent: iterating an empty
    /// registry is a no-op. The registry is empty when this returns.
    pub async fn terminate_all(&self, grace: Duration, force_grace: Duration) {
        let handles: Vec<(String, ProcessHandle)> = {
            let mut guard = self.inner.lock().await;
            guard.drain().collect()
        };

        if handles.is_empty() {
            return;
        }

        for (_, handle) in &handles {
            graceful_signal(handle.pid);
        }
        tokio::time::sleep(grace).await;

        for (key, handle) in handles {
            let mut child = handle.child.lock().await;
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(err) = child.start_kill() {
                        tracing::warn!(%key, error = %err, "failed to force-kill child during terminate_all");
                    }
                    let _ = tokio::time::timeout(force_grace, child.wait()).await;
                }
            }
        }
    }
}

/// Best-effort graceful termination signal. On unix this is `SIGTERM` via
/// `libc::kill`; non-unix targets have no portable graceful-signal API for
/// an arbitrary child process, so the "graceful" step there is a no-op and
/// the forceful kill in `terminate_all` does the work (documented as an
/// Open Question resolution in DESIGN.md).
pub(crate) fn graceful_signal(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: libc::kill with SIGTERM is the standard way to ask a
            // process to exit gracefully; pid is a value we obtained from
            // `Child::id()` for a process this registry itself spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
