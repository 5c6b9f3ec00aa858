//! sitestackd
//!
//! HTTP front-end over the stack lifecycle manager.
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | POST | /bucket/ | up |
//! | DELETE | /bucket/ | destroy |
//! | POST | /bucket/refresh | refresh |
//! | POST | /bucket/cancel | cancel |

pub mod handlers;
pub mod response;
pub mod routes;
pub mod settings;
pub mod state;

pub use response::{ApiError, DispatchError, MessageResponse};
pub use routes::create_app;
pub use settings::{EngineKind, ErrorMode, Settings};
pub use state::AppState;

use sitestack_core::{SessionPool, StackLifecycleManager};
use sitestack_engine::{MemoryEngine, ProvisioningEngine, PulumiCli, PulumiEngine};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The engine selected by `settings`
pub fn build_engine(settings: &Settings) -> Arc<dyn ProvisioningEngine> {
    match settings.engine {
        EngineKind::Memory => Arc::new(MemoryEngine::new()),
        EngineKind::Pulumi => Arc::new(
            PulumiEngine::new(settings.work_dir())
                .with_cli(PulumiCli::new(settings.pulumi_bin.clone())),
        ),
    }
}

/// Lifecycle manager wired up from `settings`
pub fn build_manager(settings: &Settings) -> StackLifecycleManager {
    let manager =
        StackLifecycleManager::new(build_engine(settings)).with_settings(settings.provider());
    match settings.session_ttl() {
        Some(ttl) => manager.with_pool(SessionPool::new(ttl)),
        None => manager,
    }
}

/// Periodically release idle pooled sessions
///
/// Returns `None` when the manager has no pool.
pub fn spawn_evictor(manager: Arc<StackLifecycleManager>) -> Option<JoinHandle<()>> {
    let ttl = manager.pool()?.ttl();
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl);
        interval.tick().await;
        loop {
            interval.tick().await;
            manager.evict_idle().await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_build_manager_without_pool() {
        let settings =
            Settings::parse_from(["sitestackd", "--engine", "memory", "--session-ttl", "0"]);
        let manager = build_manager(&settings);
        assert_eq!(manager.engine().name(), "memory");
        assert!(manager.pool().is_none());
    }

    #[test]
    fn test_build_manager_with_pool() {
        let settings = Settings::parse_from([
            "sitestackd",
            "--engine",
            "pulumi",
            "--session-ttl",
            "60",
            "--work-dir",
            "/tmp/sitestack-test",
        ]);
        let manager = build_manager(&settings);
        assert_eq!(manager.engine().name(), "pulumi");
        assert!(manager.pool().is_some());
    }
}
