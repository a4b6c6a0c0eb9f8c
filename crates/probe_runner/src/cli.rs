//! CLI-based runner for host processes and Docker/Podman containers.
//!
//! Host commands are spawned directly. Commands carrying a
//! [`ContainerConfig`](crate::config::ContainerConfig) are translated into a
//! `docker run` / `podman run` invocation with the working directory mounted.
//!
//! A command that times out or whose future is dropped is interrupted first
//! (SIGINT on the host, `stop` for a container) and only killed once the
//! grace period runs out, so the provisioning tool can persist its state.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, RunConfig, MASK};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Time an interrupted process gets to exit before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(60);

/// CLI runner options.
#[derive(Debug, Clone)]
pub struct CliRunnerOptions {
    /// Preferred container runtime (if not set, auto-detect)
    pub preferred_runtime: Option<ContainerRuntime>,
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
    /// CI mode (timestamp streamed lines)
    pub ci_mode: bool,
    /// Grace period between interrupting and killing a process
    pub stop_grace: Duration,
}

impl Default for CliRunnerOptions {
    fn default() -> Self {
        Self {
            preferred_runtime: None,
            dry_run: false,
            ci_mode: std::env::var("CI").is_ok(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl CliRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ci_mode(mut self) -> Self {
        self.ci_mode = true;
        self
    }

    pub fn prefer_docker(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Docker);
        self
    }

    pub fn prefer_podman(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Podman);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Program, arguments and container name for one execution.
#[derive(Debug)]
struct Invocation {
    program: String,
    args: Vec<String>,
    container: Option<(ContainerRuntime, String)>,
}

/// A spawned child that is stopped gracefully when abandoned.
struct RunningProcess {
    child: Option<Child>,
    container: Option<(ContainerRuntime, String)>,
    grace: Duration,
    stopping: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RunningProcess {
    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = match self.child.as_mut() {
            Some(child) => child.wait().await?,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "process already released",
                ))
            }
        };
        self.child = None;
        Ok(status)
    }

    /// Interrupt the process and wait until it is gone.
    async fn stop(mut self) {
        if let Some(child) = self.child.take() {
            graceful_stop(child, self.container.take(), self.grace).await;
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let stop = handle.spawn(graceful_stop(child, self.container.take(), self.grace));
                self.stopping.lock().push(stop);
            }
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill abandoned process: {}", e);
                }
            }
        }
    }
}

async fn graceful_stop(
    mut child: Child,
    container: Option<(ContainerRuntime, String)>,
    grace: Duration,
) {
    match &container {
        Some((runtime, name)) => {
            info!("Stopping container {}", name);
            let seconds = grace.as_secs().to_string();
            let stopped = Command::new(runtime.command())
                .args(["stop", "--time", seconds.as_str(), name.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !matches!(stopped, Ok(status) if status.success()) {
                warn!("Failed to stop container {}", name);
            }
        }
        None => interrupt(&mut child).await,
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => debug!("Interrupted process exited"),
        Err(_) => {
            warn!(
                "Process still running {}s after interrupt, killing",
                grace.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process: {}", e);
            }
        }
    }
}

#[cfg(unix)]
async fn interrupt(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // The child leads its own process group; signal the whole group.
    debug!("Sending SIGINT to process group {}", pid);
    let group = format!("-{}", pid);
    let sent = Command::new("kill")
        .args(["-INT", "--", group.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if !matches!(sent, Ok(status) if status.success()) {
        warn!("Failed to interrupt process {}", pid);
    }
}

#[cfg(not(unix))]
async fn interrupt(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill process: {}", e);
    }
}

/// CLI-based command runner.
pub struct CliRunner {
    options: CliRunnerOptions,
    stopping: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CliRunner {
    pub fn new(options: CliRunnerOptions) -> Self {
        Self {
            options,
            stopping: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Detect an available container runtime, honouring the preference.
    pub async fn detect_runtime(options: &CliRunnerOptions) -> RunnerResult<ContainerRuntime> {
        if let Some(preferred) = options.preferred_runtime {
            if Self::program_responds(preferred.command()).await {
                return Ok(preferred);
            }
            warn!(
                "Preferred runtime {} not available, trying alternatives",
                preferred
            );
        }

        for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
            if Self::program_responds(runtime.command()).await {
                return Ok(runtime);
            }
        }

        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is available".to_string(),
        ))
    }

    async fn program_responds(program: &str) -> bool {
        Command::new(program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build the program and argument list for a spec.
    fn build_invocation(
        &self,
        spec: &CommandSpec,
        runtime: Option<ContainerRuntime>,
    ) -> RunnerResult<Invocation> {
        let Some(container) = &spec.container else {
            return Ok(Invocation {
                program: spec.program.clone(),
                args: spec.args.clone(),
                container: None,
            });
        };
        let runtime = runtime.ok_or_else(|| {
            RunnerError::RuntimeNotAvailable("no container runtime resolved".to_string())
        })?;

        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(dir) = &spec.workdir {
            if !dir.is_absolute() {
                return Err(RunnerError::InvalidMount(format!(
                    "working directory must be absolute: {}",
                    dir.display()
                )));
            }
            args.push("-v".to_string());
            args.push(format!("{}:{}", dir.to_string_lossy(), container.workdir));
        }
        args.push("-w".to_string());
        args.push(container.workdir.clone());

        for mount in &container.mounts {
            args.push("-v".to_string());
            args.push(mount.to_volume_arg());
        }

        // Values are inherited from the runtime client's environment.
        for key in spec.env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        if let Some(user) = &container.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }

        if let Some(network) = &container.network_mode {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        let prefix = container.name_prefix.as_deref().unwrap_or("infraprobe");
        let name = format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        args.push("--name".to_string());
        args.push(name.clone());

        args.push(container.full_image());
        args.extend(spec.args.iter().cloned());

        Ok(Invocation {
            program: runtime.command().to_string(),
            args,
            container: Some((runtime, name)),
        })
    }

    /// Format a command line for logging with secret values masked.
    fn format_command(program: &str, args: &[String], spec: &CommandSpec) -> String {
        let mut cmd = program.to_string();
        for arg in args {
            let shown = match arg.split_once('=') {
                Some((key, _)) if spec.secret_keys.contains(key) => format!("{}={}", key, MASK),
                _ => arg.clone(),
            };
            if shown.contains(' ') || shown.contains('=') {
                cmd.push_str(&format!(" '{}'", shown));
            } else {
                cmd.push_str(&format!(" {}", shown));
            }
        }
        cmd
    }

    async fn pull_if_missing(&self, runtime: ContainerRuntime, image: &str) -> RunnerResult<()> {
        let present = Command::new(runtime.command())
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?
            .success();
        if present {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let output = Command::new(runtime.command())
            .args(["pull", image])
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RunnerError::ExecutionFailed(format!(
                "image pull failed for {}: {}",
                image,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    /// Collect a child stream line by line, optionally echoing each line.
    fn collect_stream<R>(reader: R, stream: LogStream, echo: bool, ci_mode: bool) -> JoinHandle<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut output = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if echo {
                    if ci_mode {
                        println!(
                            "[{}] [{}] {}",
                            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                            stream,
                            line
                        );
                    } else {
                        match stream {
                            LogStream::Stdout => println!("{}", line),
                            LogStream::Stderr => eprintln!("{}", line),
                        }
                    }
                }
                output.push_str(&line);
                output.push('\n');
            }
            output
        })
    }

    async fn execute(
        &self,
        invocation: Invocation,
        spec: &CommandSpec,
        run_config: &RunConfig,
    ) -> RunnerResult<(i64, String, String)> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group: a terminal Ctrl-C reaches only us, and we
        // forward a single interrupt.
        #[cfg(unix)]
        cmd.process_group(0);

        if spec.container.is_none() {
            if let Some(dir) = &spec.workdir {
                cmd.current_dir(dir);
            }
        }

        let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: invocation.program.clone(),
            message: e.to_string(),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr not captured".to_string()))?;

        let stdout_handle =
            Self::collect_stream(stdout, LogStream::Stdout, run_config.stream_logs, self.options.ci_mode);
        let stderr_handle =
            Self::collect_stream(stderr, LogStream::Stderr, run_config.stream_logs, self.options.ci_mode);

        let mut process = RunningProcess {
            child: Some(child),
            container: invocation.container,
            grace: self.options.stop_grace,
            stopping: self.stopping.clone(),
        };

        let status = if run_config.timeout_seconds > 0 {
            let limit = Duration::from_secs(run_config.timeout_seconds);
            let waited = tokio::time::timeout(limit, process.wait()).await;
            match waited {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "{} exceeded {}s, stopping",
                        invocation.program, run_config.timeout_seconds
                    );
                    process.stop().await;
                    stdout_handle.abort();
                    stderr_handle.abort();
                    return Err(RunnerError::Timeout(run_config.timeout_seconds));
                }
            }
        } else {
            process.wait().await?
        };

        let stdout_output = stdout_handle.await.unwrap_or_default();
        let stderr_output = stderr_handle.await.unwrap_or_default();
        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        Ok((exit_code, stdout_output, stderr_output))
    }
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        Ok(Command::new(program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false))
    }

    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig) -> RunnerResult<ExecutionResult> {
        let runtime = match &spec.container {
            Some(_) if !self.options.dry_run => Some(Self::detect_runtime(&self.options).await?),
            Some(_) => Some(self.options.preferred_runtime.unwrap_or(ContainerRuntime::Docker)),
            None => None,
        };
        let invocation = self.build_invocation(spec, runtime)?;
        let program = invocation.program.clone();
        let cmd_str = Self::format_command(&program, &invocation.args, spec);

        debug!("Command: {}", cmd_str);
        if !spec.env.is_empty() {
            debug!("Environment: {:?}", spec.masked_env());
        }

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            let now = Utc::now();
            return Ok(ExecutionResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                started_at: now,
                finished_at: now,
                duration_ms: 0,
            });
        }

        if let (Some(runtime), Some(container)) = (runtime, &spec.container) {
            if run_config.pull_image {
                self.pull_if_missing(runtime, &container.full_image()).await?;
            }
        }

        let started_at = Utc::now();
        let (exit_code, stdout, stderr) = self.execute(invocation, spec, run_config).await?;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            debug!("{} completed successfully in {}ms", program, duration_ms);
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                program, exit_code, duration_ms
            );
        }

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }

    async fn settle(&self) {
        let pending = std::mem::take(&mut *self.stopping.lock());
        if !pending.is_empty() {
            info!("Waiting for {} interrupted process(es) to exit", pending.len());
        }
        for stop in pending {
            if let Err(e) = stop.await {
                warn!("Process stop task failed: {}", e);
            }
        }
    }
}
