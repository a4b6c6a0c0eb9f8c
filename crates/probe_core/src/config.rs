//! Run configuration loaded from `infraprobe.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use probe_iac::TerraformTimeouts;

use crate::credentials::VariableNames;
use crate::error::{ProbeError, ProbeResult};
use crate::naming::DEFAULT_RUN_ID_LENGTH;
use crate::retry::RetryConfig;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "infraprobe.yaml";

/// Longest run id that still leaves room in a 24-character storage account name.
pub const MAX_RUN_ID_LENGTH: usize = 16;

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub variables: VariableNames,
    pub run_id_length: usize,
    pub terraform: TerraformSettings,
    pub timeouts: StageTimeouts,
    /// Destroy attempts during teardown
    pub teardown: RetryConfig,
    /// Per-check read retries during verification
    pub verification: RetryConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            variables: VariableNames::default(),
            run_id_length: DEFAULT_RUN_ID_LENGTH,
            terraform: TerraformSettings::default(),
            timeouts: StageTimeouts::default(),
            teardown: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
            },
            verification: RetryConfig::default(),
        }
    }
}

/// How terraform is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformSettings {
    pub binary: String,
    /// Run inside this container image instead of the host binary
    pub image: Option<String>,
    pub tag: String,
    pub stream_logs: bool,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            image: None,
            tag: "latest".to_string(),
            stream_logs: false,
        }
    }
}

/// Stage timeouts in seconds. `run` of 0 means no overall deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub init: u64,
    pub apply: u64,
    pub output: u64,
    pub destroy: u64,
    /// Single resource API read
    pub read: u64,
    pub run: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        let tf = TerraformTimeouts::default();
        Self {
            init: tf.init,
            apply: tf.apply,
            output: tf.output,
            destroy: tf.destroy,
            read: 30,
            run: 0,
        }
    }
}

impl StageTimeouts {
    pub fn terraform(&self) -> TerraformTimeouts {
        TerraformTimeouts {
            init: self.init,
            apply: self.apply,
            output: self.output,
            destroy: self.destroy,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run > 0).then(|| Duration::from_secs(self.run))
    }
}

impl ProbeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        let config: ProbeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load(path: &Path) -> ProbeResult<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load `path` if given, else `infraprobe.yaml` in `dir` if present,
    /// else defaults.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> ProbeResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.run_id_length == 0 || self.run_id_length > MAX_RUN_ID_LENGTH {
            return Err(ProbeError::Config(format!(
                "run_id_length must be between 1 and {}",
                MAX_RUN_ID_LENGTH
            )));
        }
        if self.terraform.binary.trim().is_empty() {
            return Err(ProbeError::Config("terraform.binary must not be empty".to_string()));
        }
        for (name, retry) in [("teardown", &self.teardown), ("verification", &self.verification)] {
            if retry.max_attempts == 0 {
                return Err(ProbeError::Config(format!("{}.max_attempts must be at least 1", name)));
            }
            if retry.backoff_multiplier < 1.0 {
                return Err(ProbeError::Config(format!(
                    "{}.backoff_multiplier must be at least 1.0",
                    name
                )));
            }
        }
        if self.timeouts.read == 0 {
            return Err(ProbeError::Config("timeouts.read must be positive".to_string()));
        }

        let vars = &self.variables;
        let mut names = vec![
            &vars.subscription,
            &vars.client_id,
            &vars.client_secret,
            &vars.tenant_id,
            &vars.postfix,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(ProbeError::Config("variable names must not be empty".to_string()));
        }
        names.sort();
        names.dedup();
        if names.len() != 5 {
            return Err(ProbeError::Config("variable names must be distinct".to_string()));
        }
        Ok(())
    }
}
