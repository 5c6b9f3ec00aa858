//! Engine session pool
//!
//! Keeps resolved [`StackHandle`]s per stack identity so repeated requests
//! skip `create_or_select_stack`. The engine stays the only thing that
//! serializes operations on a stack; the pool only caches the binding.

use sitestack_engine::{ProvisioningEngine, ResourceGraph, Result, StackHandle, StackIdentity};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct PooledSession {
    handle: StackHandle,
    last_used: Instant,
}

/// Idle-expiring pool of engine sessions keyed by stack identity
#[derive(Debug)]
pub struct SessionPool {
    ttl: Duration,
    sessions: Mutex<HashMap<StackIdentity, PooledSession>>,
}

impl SessionPool {
    /// Sessions idle for longer than `ttl` are released
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<StackIdentity, PooledSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pooled handle for `identity`, resolving a new one on a miss
    ///
    /// A hit rebinds `program`, since the caller's spec may have changed.
    pub async fn acquire(
        &self,
        engine: &dyn ProvisioningEngine,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle> {
        let (cached, stale) = {
            let mut sessions = self.sessions();
            match sessions.remove(identity) {
                Some(session) if session.last_used.elapsed() <= self.ttl => {
                    (Some(session.handle), None)
                }
                Some(session) => (None, Some(session.handle)),
                None => (None, None),
            }
        };

        if let Some(stale) = stale {
            tracing::debug!("Releasing idle session for {}", identity);
            if let Err(e) = engine.release(&stale).await {
                tracing::warn!("Failed to release session for {}: {}", identity, e);
            }
        }

        let handle = match cached {
            Some(handle) => {
                tracing::debug!("Reusing pooled session for {}", identity);
                engine.install_program(&handle, program).await?;
                handle
            }
            None => engine.create_or_select_stack(identity, program).await?,
        };

        self.sessions().insert(
            identity.clone(),
            PooledSession {
                handle: handle.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(handle)
    }

    /// Drop the pooled handle without releasing it
    pub fn forget(&self, identity: &StackIdentity) -> bool {
        self.sessions().remove(identity).is_some()
    }

    /// Release every session idle for longer than the TTL
    pub async fn evict_idle(&self, engine: &dyn ProvisioningEngine) -> usize {
        let expired: Vec<StackHandle> = {
            let mut sessions = self.sessions();
            let ttl = self.ttl;
            let idle: Vec<StackIdentity> = sessions
                .iter()
                .filter(|(_, s)| s.last_used.elapsed() > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            idle.iter()
                .filter_map(|id| sessions.remove(id))
                .map(|s| s.handle)
                .collect()
        };

        for handle in &expired {
            if let Err(e) = engine.release(handle).await {
                tracing::warn!("Failed to release session for {}: {}", handle.identity(), e);
            }
        }
        if !expired.is_empty() {
            tracing::debug!("Evicted {} idle sessions", expired.len());
        }
        expired.len()
    }

    /// Release every session
    pub async fn shutdown(&self, engine: &dyn ProvisioningEngine) {
        let all: Vec<StackHandle> = self.sessions().drain().map(|(_, s)| s.handle).collect();
        for handle in &all {
            if let Err(e) = engine.release(handle).await {
                tracing::warn!("Failed to release session for {}: {}", handle.identity(), e);
            }
        }
        tracing::info!("Released {} pooled sessions", all.len());
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
