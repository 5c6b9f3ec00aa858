//! Daemon settings
//!
//! Every flag can also be set through a `SITESTACK_*` environment variable.

use clap::{Parser, ValueEnum};
use sitestack_core::ProviderSettings;
use sitestack_core::config::{DEFAULT_PROFILE, DEFAULT_REGION};
use sitestack_engine::StackIdentity;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which provisioning engine backs the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EngineKind {
    /// Drive the pulumi CLI
    #[default]
    Pulumi,
    /// Keep stacks in process memory
    Memory,
}

/// How failures are rendered to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ErrorMode {
    /// Every failure is a 500 with only an `error` field
    #[default]
    Uniform,
    /// Status code follows the error kind, body carries `kind`
    Tagged,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sitestackd")]
#[command(version, about = "HTTP front-end for static website stacks", long_about = None)]
pub struct Settings {
    /// Address to listen on
    #[arg(long, env = "SITESTACK_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Project every request operates on
    #[arg(long, env = "SITESTACK_PROJECT", default_value = "sitestack")]
    pub project: String,

    /// Stack every request operates on
    #[arg(long, env = "SITESTACK_STACK", default_value = "dev")]
    pub stack: String,

    /// Provisioning engine
    #[arg(long, env = "SITESTACK_ENGINE", value_enum, default_value_t = EngineKind::Pulumi)]
    pub engine: EngineKind,

    /// Directory holding per-stack pulumi workspaces
    #[arg(long, env = "SITESTACK_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// pulumi executable
    #[arg(long, env = "SITESTACK_PULUMI_BIN", default_value = "pulumi")]
    pub pulumi_bin: PathBuf,

    /// Provider profile set on every stack
    #[arg(long, env = "SITESTACK_AWS_PROFILE", default_value = DEFAULT_PROFILE)]
    pub aws_profile: String,

    /// Provider region set on every stack
    #[arg(long, env = "SITESTACK_AWS_REGION", default_value = DEFAULT_REGION)]
    pub aws_region: String,

    /// Error rendering
    #[arg(long, env = "SITESTACK_ERROR_MODE", value_enum, default_value_t = ErrorMode::Uniform)]
    pub error_mode: ErrorMode,

    /// Seconds an idle engine session is kept; 0 resolves on every request
    #[arg(long, env = "SITESTACK_SESSION_TTL", default_value_t = 0)]
    pub session_ttl: u64,
}

impl Settings {
    pub fn identity(&self) -> StackIdentity {
        StackIdentity::new(&self.project, &self.stack)
    }

    pub fn provider(&self) -> ProviderSettings {
        ProviderSettings {
            profile: self.aws_profile.clone(),
            region: self.aws_region.clone(),
        }
    }

    /// `None` when pooling is disabled
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl > 0).then(|| Duration::from_secs(self.session_ttl))
    }

    /// Configured work dir, or `<data dir>/sitestack`
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("sitestack")
        })
    }
}
