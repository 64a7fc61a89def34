use crate::ingest::message::{RunStart, Status};
use crate::ingest::options::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::runtime::ci::{CiMetadata, CiProvider};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_PORTAL_URL: &str = "https://report-api.quollabore.com/";
pub const DEFAULT_ENVIRONMENT: &str = "prod";
pub const PROVIDER: &str = "cypress";
const DEFAULT_PARALLEL_TOTAL: u32 = 1;
const DEFAULT_SHARD_INDEX: u32 = 0;

pub const ENV_TOKEN: &str = "Q_INGEST_TOKEN";
pub const ENV_PROJECT_ID: &str = "Q_PROJECT_ID";
pub const ENV_ENVIRONMENT: &str = "Q_ENV";
pub const ENV_PORTAL_URL: &str = "Q_PORTAL_URL";
pub const ENV_PARALLEL_TOTAL: &str = "PARALLEL_TOTAL";
pub const ENV_SHARD_INDEX: &str = "CYPRESS_NODE_INDEX";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "Q_REQUEST_TIMEOUT_SECS";

/// Source of environment variables consulted when resolving a configuration.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Resolved reporter configuration.
///
/// All instances must be constructed via [`ReporterConfig::builder`] so the
/// credential checks run before any lifecycle event is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    token: String,
    project_id: String,
    environment: String,
    portal_url: String,
    parallel_total: u32,
    shard_index: u32,
    ci_provider: CiProvider,
    ci: CiMetadata,
    request_timeout: Duration,
}

impl ReporterConfig {
    /// Returns a builder whose setters act as explicit overrides of the environment.
    pub fn builder() -> ReporterConfigBuilder {
        ReporterConfigBuilder::default()
    }

    /// Resolves a configuration purely from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    /// Static bearer token sent with every ingestion request.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Ingestion endpoint every protocol message is POSTed to.
    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    /// Total number of parallel shards in the run.
    pub fn parallel_total(&self) -> u32 {
        self.parallel_total
    }

    /// Index of the shard this process executes.
    pub fn shard_index(&self) -> u32 {
        self.shard_index
    }

    pub fn ci_provider(&self) -> CiProvider {
        self.ci_provider
    }

    pub fn ci(&self) -> &CiMetadata {
        &self.ci
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Builds the `run` body of the run-start message.
    pub fn run_start(&self) -> RunStart {
        RunStart {
            provider: PROVIDER.to_owned(),
            project_id: self.project_id.clone(),
            environment: self.environment.clone(),
            ci_job_id: self.ci.ci_job_id.clone(),
            git_branch: self.ci.git_branch.clone(),
            git_commit_sha: self.ci.git_commit_sha.clone(),
            git_commit_msg: self.ci.git_commit_msg.clone(),
            git_actor: self.ci.git_actor.clone(),
            parallel_total: self.parallel_total,
            status: Status::Running,
        }
    }

    /// Only missing credentials are fatal; every other field is forwarded as
    /// resolved.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            bail!("{ENV_TOKEN} is not set");
        }
        if self.project_id.is_empty() {
            bail!("{ENV_PROJECT_ID} is not set");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReporterConfigBuilder {
    token: Option<String>,
    project_id: Option<String>,
    environment: Option<String>,
    portal_url: Option<String>,
    parallel_total: Option<u32>,
    shard_index: Option<u32>,
    ci_job_id: Option<String>,
    git_branch: Option<String>,
    git_commit_sha: Option<String>,
    git_commit_msg: Option<String>,
    git_actor: Option<String>,
    request_timeout: Option<Duration>,
}

impl ReporterConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = Some(url.into());
        self
    }

    pub fn parallel_total(mut self, total: u32) -> Self {
        self.parallel_total = Some(total);
        self
    }

    pub fn shard_index(mut self, index: u32) -> Self {
        self.shard_index = Some(index);
        self
    }

    pub fn ci_job_id(mut self, id: impl Into<String>) -> Self {
        self.ci_job_id = Some(id.into());
        self
    }

    pub fn git_branch(mut self, branch: impl Into<String>) -> Self {
        self.git_branch = Some(branch.into());
        self
    }

    pub fn git_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.git_commit_sha = Some(sha.into());
        self
    }

    pub fn git_commit_msg(mut self, message: impl Into<String>) -> Self {
        self.git_commit_msg = Some(message.into());
        self
    }

    pub fn git_actor(mut self, actor: impl Into<String>) -> Self {
        self.git_actor = Some(actor.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ReporterConfig> {
        self.build_with_env(&ProcessEnv)
    }

    /// Resolves every field as override, then environment, then CI detection
    /// or default.
    pub fn build_with_env(self, env: &dyn EnvSource) -> Result<ReporterConfig> {
        let (ci_provider, detected) = CiMetadata::detect(env);
        tracing::debug!(provider = ?ci_provider, "detected CI provider");

        let ci = CiMetadata {
            ci_job_id: self.ci_job_id.unwrap_or(detected.ci_job_id),
            git_branch: self.git_branch.unwrap_or(detected.git_branch),
            git_commit_sha: self.git_commit_sha.unwrap_or(detected.git_commit_sha),
            git_commit_msg: self.git_commit_msg.unwrap_or(detected.git_commit_msg),
            git_actor: self.git_actor.unwrap_or(detected.git_actor),
        };

        // A zero timeout falls back to the default.
        let request_timeout = self
            .request_timeout
            .unwrap_or_else(|| {
                Duration::from_secs(env_number(
                    env,
                    ENV_REQUEST_TIMEOUT_SECS,
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                ))
            });
        let request_timeout = if request_timeout.is_zero() {
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        } else {
            request_timeout
        };

        let config = ReporterConfig {
            token: trimmed(self.token.or_else(|| env.var(ENV_TOKEN))),
            project_id: trimmed(self.project_id.or_else(|| env.var(ENV_PROJECT_ID))),
            environment: self
                .environment
                .or_else(|| env_non_empty(env, ENV_ENVIRONMENT))
                .map(|value| value.trim().to_owned())
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_owned()),
            portal_url: self
                .portal_url
                .or_else(|| env_non_empty(env, ENV_PORTAL_URL))
                .map(|value| value.trim().to_owned())
                .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_owned()),
            parallel_total: self.parallel_total.unwrap_or_else(|| {
                env_number(env, ENV_PARALLEL_TOTAL, DEFAULT_PARALLEL_TOTAL)
            }),
            shard_index: self
                .shard_index
                .unwrap_or_else(|| env_number(env, ENV_SHARD_INDEX, DEFAULT_SHARD_INDEX)),
            ci_provider,
            ci,
            request_timeout,
        };

        config.validate()?;
        Ok(config)
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|value| value.trim().to_owned()).unwrap_or_default()
}

fn env_non_empty(env: &dyn EnvSource, name: &str) -> Option<String> {
    env.var(name).filter(|value| !value.trim().is_empty())
}

/// Parses a numeric variable, falling back to `default` when absent or invalid.
fn env_number<T: std::str::FromStr>(env: &dyn EnvSource, name: &str, default: T) -> T {
    env.var(name)
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}
