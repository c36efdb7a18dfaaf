use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Why a single check failed
#[derive(Error, Debug)]
pub enum CheckError {
    /// The program could not be started
    #[error("Failed to launch '{program}': {reason}")]
    LaunchFailure { program: String, reason: String },

    /// The program ran but did not exit with code 0
    #[error("'{subcommand}' exited with {}{}", describe_code(.code), describe_stderr(.stderr))]
    NonZeroExit {
        subcommand: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Exit code was 0 but stdout lacked the expected text
    #[error("'{subcommand}' stdout does not contain {expected:?}")]
    OutputMismatch {
        subcommand: String,
        expected: String,
    },

    /// The program was killed after exceeding the configured timeout
    #[error("'{subcommand}' timed out after {timeout:?}")]
    Timeout {
        subcommand: String,
        timeout: Duration,
    },

    /// IO error while waiting on the child
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Coarse classification of a [`CheckError`], kept in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LaunchFailure,
    NonZeroExit,
    OutputMismatch,
    Timeout,
    Io,
}

impl CheckError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::LaunchFailure { .. } => FailureKind::LaunchFailure,
            CheckError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            CheckError::OutputMismatch { .. } => FailureKind::OutputMismatch,
            CheckError::Timeout { .. } => FailureKind::Timeout,
            CheckError::Io(_) => FailureKind::Io,
        }
    }
}

/// Everything captured from one run of the program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Exit code, absent when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured standard output, decoded as UTF-8 (lossy)
    pub stdout: String,
    /// Captured standard error; recorded but never asserted on
    pub stderr: String,
    /// Wall-clock time from spawn to exit, in milliseconds
    pub duration_ms: u64,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One row of the contract table: a subcommand and the text its stdout must
/// contain, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub subcommand: String,
    pub expected_stdout: Option<String>,
}

impl CheckSpec {
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
            expected_stdout: None,
        }
    }

    pub fn expecting(mut self, substring: impl Into<String>) -> Self {
        self.expected_stdout = Some(substring.into());
        self
    }

    /// Checks a captured result against this contract. Exit status is checked
    /// before output.
    pub fn verify(&self, result: &InvocationResult) -> Result<(), CheckError> {
        if !result.success() {
            return Err(CheckError::NonZeroExit {
                subcommand: self.subcommand.clone(),
                code: result.exit_code,
                stderr: result.stderr.clone(),
            });
        }

        if let Some(expected) = &self.expected_stdout {
            if !result.stdout.contains(expected.as_str()) {
                return Err(CheckError::OutputMismatch {
                    subcommand: self.subcommand.clone(),
                    expected: expected.clone(),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expected_stdout {
            Some(expected) => write!(f, "{} (expects {:?})", self.subcommand, expected),
            None => write!(f, "{}", self.subcommand),
        }
    }
}

/// Parses `subcommand` or `subcommand=expected text`.
impl FromStr for CheckSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (subcommand, expected) = match s.split_once('=') {
            Some((sub, expected)) => (sub.trim(), Some(expected)),
            None => (s.trim(), None),
        };

        if subcommand.is_empty() {
            return Err(format!("Check '{}' has an empty subcommand", s));
        }
        if subcommand.chars().any(char::is_whitespace) {
            return Err(format!("Subcommand '{}' must be a single word", subcommand));
        }

        let spec = CheckSpec::new(subcommand);
        Ok(match expected {
            Some(text) if !text.is_empty() => spec.expecting(text),
            _ => spec,
        })
    }
}

/// The pipeline's smoke contract
pub fn default_checks() -> Vec<CheckSpec> {
    vec![
        CheckSpec::new("extract").expecting("Extracting data..."),
        CheckSpec::new("transform_load").expecting("Transforming data..."),
        CheckSpec::new("general_query"),
    ]
}
