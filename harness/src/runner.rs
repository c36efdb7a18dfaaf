use crate::check::{CheckError, CheckSpec, InvocationResult};
use crate::report::{CheckReport, HarnessReport};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Harness setup errors
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration rejected by [`HarnessConfig::validate`]
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// How to launch the program under test
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Program to execute (path or name looked up on PATH)
    pub program: String,
    /// Arguments placed before the subcommand, e.g. a script path
    pub leading_args: Vec<String>,
    /// Working directory for the child, inherited when unset
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the child
    pub env_vars: Vec<(String, String)>,
    /// Kill the child and fail the check after this long; wait forever when unset
    pub timeout: Option<Duration>,
    /// How many times to run the whole check table
    pub repeat: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: "pipeline".to_string(),
            leading_args: Vec::new(),
            working_dir: None,
            env_vars: Vec::new(),
            timeout: Some(Duration::from_secs(120)),
            repeat: 1,
        }
    }
}

impl HarnessConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_leading_arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("Program cannot be empty".to_string());
        }

        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Working directory '{}' does not exist",
                    dir.display()
                ));
            }
        }

        if self.env_vars.iter().any(|(key, _)| key.is_empty() || key.contains('=')) {
            return Err("Environment variable names must be non-empty and contain no '='".to_string());
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.repeat == 0 {
            return Err("Repeat count must be at least 1".to_string());
        }

        Ok(())
    }

    fn command_line(&self, subcommand: &str) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.leading_args.iter().map(String::as_str));
        parts.push(subcommand);
        parts.join(" ")
    }
}

/// Runs the program once with `subcommand` as its final argument and captures
/// what it printed.
///
/// The child is killed if the configured timeout elapses first.
pub async fn invoke(
    config: &HarnessConfig,
    subcommand: &str,
) -> Result<InvocationResult, CheckError> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.leading_args)
        .arg(subcommand)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    for (key, value) in &config.env_vars {
        cmd.env(key, value);
    }

    debug!("Running: {}", config.command_line(subcommand));
    let start = Instant::now();
    let child = cmd.spawn().map_err(|e| CheckError::LaunchFailure {
        program: config.program.clone(),
        reason: e.to_string(),
    })?;

    let output = match config.timeout {
        Some(limit) => match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(CheckError::Timeout {
                    subcommand: subcommand.to_string(),
                    timeout: limit,
                });
            }
        },
        None => child.wait_with_output().await?,
    };

    Ok(InvocationResult {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Invokes the program for one check and verifies its contract.
pub async fn run_check(
    config: &HarnessConfig,
    spec: &CheckSpec,
) -> Result<InvocationResult, CheckError> {
    attempt(config, spec).await.map_err(|(e, _)| e)
}

/// Like `run_check`, but a failure keeps the invocation when the program ran.
async fn attempt(
    config: &HarnessConfig,
    spec: &CheckSpec,
) -> Result<InvocationResult, (CheckError, Option<InvocationResult>)> {
    let result = invoke(config, &spec.subcommand)
        .await
        .map_err(|e| (e, None))?;
    match spec.verify(&result) {
        Ok(()) => Ok(result),
        Err(e) => Err((e, Some(result))),
    }
}

/// Runs every check in order, `config.repeat` times over. A failing check does
/// not stop the ones after it.
pub async fn run_checks(
    config: &HarnessConfig,
    specs: &[CheckSpec],
) -> HarnessResult<HarnessReport> {
    config
        .validate()
        .map_err(|message| HarnessError::InvalidConfig { message })?;

    let mut report = HarnessReport::new(config.command_line("").trim_end());

    for iteration in 1..=config.repeat {
        for spec in specs {
            let check = match attempt(config, spec).await {
                Ok(result) => CheckReport::passed(spec.clone(), iteration, result),
                Err((e, result)) => CheckReport::failed(spec.clone(), iteration, &e, result),
            };

            if check.passed {
                info!("PASS {} (run {})", spec.subcommand, iteration);
            } else {
                warn!(
                    "FAIL {} (run {}): {}",
                    spec.subcommand,
                    iteration,
                    check.error.as_deref().unwrap_or("unknown error")
                );
            }

            report.push(check);
        }
    }

    Ok(report)
}
