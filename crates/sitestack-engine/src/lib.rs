//! sitestack provisioning engine
//!
//! This crate provides the provisioning engine abstraction for sitestack:
//! a declarative resource graph, the [`ProvisioningEngine`] trait that turns
//! the graph into remote state, and two engines implementing it.
//!
//! # Engines
//!
//! - **memory**: in-process engine with real stack semantics, for tests and local runs
//! - **pulumi**: drives the `pulumi` CLI against a generated YAML program
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │             sitestack-core (lifecycle)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ResourceGraph + ConfigMap
//! ┌─────────────────▼───────────────────────────────┐
//! │               sitestack-engine                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Engine Abstraction               │   │
//! │  │  trait ProvisioningEngine { ... }         │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Graph Model  │  │ Stack State  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ MemoryEngine  │ │ PulumiEngine  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod graph;
pub mod memory;
pub mod pulumi;
pub mod state;

// Re-exports
pub use action::{ChangeKind, OperationResult, Plan, PlanSummary, ResourceChange, UpResult};
pub use engine::{
    ConfigMap, ConfigValue, NoProgress, OutputValue, Outputs, ProgressSink, ProvisioningEngine,
    StackHandle, StackIdentity, TracingProgress,
};
pub use error::{EngineError, Result};
pub use graph::{GraphError, Resource, ResourceGraph, escape_literal, reference};
pub use memory::{ApplyOrder, MemoryEngine};
pub use pulumi::{PulumiCli, PulumiEngine};
pub use state::{ResourceState, ResourceStatus, StackState, StackStatus};
