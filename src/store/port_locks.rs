// ABOUTME: Short-lived (host, port) reservations shared by concurrent reconciliations.
// ABOUTME: Guards release on drop, so every exit path of a deploy frees its port.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Who holds a port lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockHolder {
    /// Hostname of the controller that took the lock.
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = Utc::now() - self.acquired_at;
        age.to_std().map(|age| age >= max_age).unwrap_or(false)
    }
}

struct Entry {
    token: u64,
    holder: LockHolder,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<(String, u16), Entry>>,
    next_token: AtomicU64,
    acquired: AtomicU64,
}

/// Table of held port locks. Cloning shares the table.
#[derive(Clone, Default)]
pub struct PortLocks {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PortLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLocks")
            .field("held", &self.held())
            .finish()
    }
}

impl PortLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-if-absent. Returns `None` when someone else holds the port.
    pub fn try_acquire(&self, host: &str, port: u16) -> Option<PortLockGuard> {
        let mut entries = self.inner.entries.lock();
        let key = (host.to_string(), port);
        if entries.contains_key(&key) {
            return None;
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            Entry {
                token,
                holder: LockHolder::current(),
            },
        );
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(host, port, "port lock acquired");

        Some(PortLockGuard {
            locks: self.clone(),
            host: host.to_string(),
            port,
            token,
        })
    }

    pub fn is_locked(&self, host: &str, port: u16) -> bool {
        self.inner
            .entries
            .lock()
            .contains_key(&(host.to_string(), port))
    }

    pub fn holder(&self, host: &str, port: u16) -> Option<LockHolder> {
        self.inner
            .entries
            .lock()
            .get(&(host.to_string(), port))
            .map(|e| e.holder.clone())
    }

    /// Number of locks currently held.
    pub fn held(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Number of locks ever handed out.
    pub fn acquired_total(&self) -> u64 {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    /// Drop locks older than `max_age`. A guard whose lock was purged
    /// leaves any newer lock on the same port alone when it drops.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|(host, port), entry| {
            let stale = entry.holder.is_stale(max_age);
            if stale {
                tracing::warn!(
                    host = host.as_str(),
                    port,
                    holder = entry.holder.holder.as_str(),
                    pid = entry.holder.pid,
                    since = %entry.holder.acquired_at,
                    "breaking stale port lock"
                );
            }
            !stale
        });
        before - entries.len()
    }

    fn release(&self, host: &str, port: u16, token: u64) {
        let mut entries = self.inner.entries.lock();
        let key = (host.to_string(), port);
        if entries.get(&key).is_some_and(|e| e.token == token) {
            entries.remove(&key);
            tracing::debug!(host, port, "port lock released");
        }
    }
}

/// A held port lock that releases on drop.
pub struct PortLockGuard {
    locks: PortLocks,
    host: String,
    port: u16,
    token: u64,
}

impl std::fmt::Debug for PortLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLockGuard")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl PortLockGuard {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.host, self.port, self.token);
    }
}
