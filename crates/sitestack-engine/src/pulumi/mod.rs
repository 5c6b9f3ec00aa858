//! Pulumi provisioning engine
//!
//! Drives the `pulumi` CLI against a generated YAML program. Each stack gets
//! its own workspace directory (`<work_dir>/<project>/<stack>`); the
//! directory path is the session reference carried by [`StackHandle`].
//!
//! Credentials and the state backend are whatever the `pulumi` process
//! finds in its environment (`PULUMI_ACCESS_TOKEN`, `PULUMI_BACKEND_URL`,
//! `PULUMI_CONFIG_PASSPHRASE`, AWS profile, ...).

pub mod cli;
pub mod program;

pub use cli::PulumiCli;

use crate::action::{OperationResult, PlanSummary, UpResult};
use crate::engine::{
    ConfigMap, OutputValue, Outputs, ProgressSink, ProvisioningEngine, StackHandle, StackIdentity,
};
use crate::error::Result;
use crate::graph::ResourceGraph;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;

/// Pulumi provisioning engine
pub struct PulumiEngine {
    cli: PulumiCli,
    work_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(rename = "resourceChanges", default)]
    resource_changes: BTreeMap<String, usize>,
}

impl PulumiEngine {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli: PulumiCli::default(),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_cli(mut self, cli: PulumiCli) -> Self {
        self.cli = cli;
        self
    }

    /// Workspace directory for a stack
    pub fn workspace(&self, identity: &StackIdentity) -> PathBuf {
        self.work_dir.join(&identity.project).join(&identity.stack)
    }

    async fn write_program(dir: &Path, project: &str, program: &ResourceGraph) -> Result<()> {
        let rendered = program::render(project, program)?;
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created workspace directory: {}", dir.display());
        }
        fs::write(dir.join(program::PROJECT_FILE), rendered).await?;
        Ok(())
    }

    async fn outputs(&self, stack: &StackHandle) -> Result<Outputs> {
        let output = self
            .cli
            .run(
                Path::new(stack.session()),
                &["stack", "output", "--json", "--show-secrets", "--stack", stack.name()],
            )
            .await?;

        if output.trim().is_empty() {
            return Ok(Outputs::new());
        }

        let values: BTreeMap<String, serde_json::Value> = serde_json::from_str(&output)?;
        Ok(values
            .into_iter()
            .map(|(k, v)| (k, OutputValue::new(v)))
            .collect())
    }

    /// Change counts of the most recent operation
    async fn last_summary(&self, stack: &StackHandle) -> Result<PlanSummary> {
        let output = self
            .cli
            .run(
                Path::new(stack.session()),
                &["stack", "history", "--json", "--page-size", "1", "--stack", stack.name()],
            )
            .await?;

        let history: Vec<HistoryEntry> = if output.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&output)?
        };
        Ok(history
            .first()
            .map(|e| summary_from_changes(&e.resource_changes))
            .unwrap_or_default())
    }
}

fn summary_from_changes(changes: &BTreeMap<String, usize>) -> PlanSummary {
    let count = |key: &str| changes.get(key).copied().unwrap_or(0);
    PlanSummary {
        create: count("create"),
        update: count("update") + count("replace"),
        delete: count("delete"),
        same: count("same"),
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiEngine {
    fn name(&self) -> &str {
        "pulumi"
    }

    async fn create_or_select_stack(
        &self,
        identity: &StackIdentity,
        program: &ResourceGraph,
    ) -> Result<StackHandle> {
        let dir = self.workspace(identity);
        Self::write_program(&dir, &identity.project, program).await?;

        self.cli
            .run(&dir, &["stack", "select", identity.stack.as_str(), "--create"])
            .await?;
        tracing::info!("Created/Selected stack {}", identity);

        Ok(StackHandle::new(
            identity.clone(),
            dir.display().to_string(),
        ))
    }

    async fn install_program(&self, stack: &StackHandle, program: &ResourceGraph) -> Result<()> {
        Self::write_program(Path::new(stack.session()), &stack.identity().project, program).await
    }

    async fn set_config(&self, stack: &StackHandle, config: &ConfigMap) -> Result<()> {
        if config.is_empty() {
            return Ok(());
        }

        let pairs: Vec<(&str, String)> = config
            .iter()
            .map(|(key, value)| {
                let flag = if value.secret { "--secret" } else { "--plaintext" };
                (flag, format!("{}={}", key, value.value))
            })
            .collect();

        let mut args = vec!["config", "set-all", "--stack", stack.name()];
        for (flag, pair) in &pairs {
            args.push(*flag);
            args.push(pair.as_str());
        }

        self.cli.run(Path::new(stack.session()), &args).await?;
        Ok(())
    }

    async fn up(&self, stack: &StackHandle, progress: &dyn ProgressSink) -> Result<UpResult> {
        let start = Instant::now();
        let dir = Path::new(stack.session());
        self.cli
            .stream(
                dir,
                &["up", "--yes", "--skip-preview", "--stack", stack.name()],
                progress,
            )
            .await?;

        let outputs = self.outputs(stack).await?;
        let summary = self.last_summary(stack).await?;
        Ok(UpResult {
            outputs,
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn refresh(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        let start = Instant::now();
        self.cli
            .stream(
                Path::new(stack.session()),
                &["refresh", "--yes", "--skip-preview", "--stack", stack.name()],
                progress,
            )
            .await?;

        let summary = self.last_summary(stack).await?;
        Ok(OperationResult {
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn destroy(
        &self,
        stack: &StackHandle,
        progress: &dyn ProgressSink,
    ) -> Result<OperationResult> {
        let start = Instant::now();
        self.cli
            .stream(
                Path::new(stack.session()),
                &["destroy", "--yes", "--skip-preview", "--stack", stack.name()],
                progress,
            )
            .await?;

        let summary = self.last_summary(stack).await?;
        Ok(OperationResult {
            summary,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn cancel(&self, stack: &StackHandle) -> Result<()> {
        self.cli
            .run(
                Path::new(stack.session()),
                &["cancel", "--yes", "--stack", stack.name()],
            )
            .await?;
        Ok(())
    }
}
