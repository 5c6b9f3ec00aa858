//! sitestack core
//!
//! Turns a caller's [`ResourceSpec`] into a configured stack and runs
//! lifecycle verbs against it.
//!
//! - [`website`]: the static website resource graph
//! - [`config`]: provider settings and per-stack configuration
//! - [`lifecycle`]: [`StackLifecycleManager`], resolve + run
//! - [`pool`]: optional reuse of engine sessions between requests

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod spec;
pub mod website;

pub use config::{ProviderSettings, spec_from_config, stack_config};
pub use error::{ErrorKind, LifecycleError, Result};
pub use lifecycle::{LifecycleAction, LifecycleResult, ManagedStack, StackLifecycleManager};
pub use pool::SessionPool;
pub use spec::{ResourceSpec, validate_bucket_name};
pub use website::bucket_website;
