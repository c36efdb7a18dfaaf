use crate::check::{CheckError, CheckSpec, FailureKind, InvocationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub spec: CheckSpec,
    /// 1-based pass over the check table
    pub iteration: usize,
    pub passed: bool,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    /// Absent when the program never produced a result (launch failure, timeout)
    pub invocation: Option<InvocationResult>,
}

impl CheckReport {
    pub fn passed(spec: CheckSpec, iteration: usize, invocation: InvocationResult) -> Self {
        Self {
            spec,
            iteration,
            passed: true,
            failure: None,
            error: None,
            invocation: Some(invocation),
        }
    }

    pub fn failed(
        spec: CheckSpec,
        iteration: usize,
        error: &CheckError,
        invocation: Option<InvocationResult>,
    ) -> Self {
        Self {
            spec,
            iteration,
            passed: false,
            failure: Some(error.kind()),
            error: Some(error.to_string()),
            invocation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessReport {
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub checks: Vec<CheckReport>,
}

impl HarnessReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            command: command.into(),
            checks: Vec::new(),
        }
    }

    pub fn push(&mut self, check: CheckReport) {
        self.checks.push(check);
    }

    /// True when every check passed. An empty report counts as passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&CheckReport> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Smoke checks for `{}`", self.command)?;
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            write!(f, "  [{}] {}", status, check.spec)?;
            if check.iteration > 1 {
                write!(f, " (run {})", check.iteration)?;
            }
            if let Some(invocation) = &check.invocation {
                write!(f, " in {}ms", invocation.duration_ms)?;
            }
            writeln!(f)?;
            if let Some(error) = &check.error {
                writeln!(f, "         {}", error)?;
            }
        }

        let failed = self.failures().len();
        write!(
            f,
            "{} passed, {} failed",
            self.checks.len() - failed,
            failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(code: i32, stdout: &str) -> InvocationResult {
        InvocationResult {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 12,
        }
    }

    fn sample_report() -> HarnessReport {
        let mut report = HarnessReport::new("pipeline");
        report.push(CheckReport::passed(
            CheckSpec::new("extract").expecting("Extracting data..."),
            1,
            invocation(0, "Extracting data..."),
        ));
        let spec = CheckSpec::new("transform_load").expecting("Transforming data...");
        let result = invocation(2, "");
        let error = spec.verify(&result).unwrap_err();
        report.push(CheckReport::failed(spec, 1, &error, Some(result)));
        report
    }

    #[test]
    fn test_empty_report_passes() {
        let report = HarnessReport::new("pipeline");
        assert!(report.passed());
        assert!(report.failures().is_empty());
    }

    #[test]
    fn test_report_failures() {
        let report = sample_report();
        assert!(!report.passed());

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].spec.subcommand, "transform_load");
        assert_eq!(failures[0].failure, Some(FailureKind::NonZeroExit));
    }

    #[test]
    fn test_report_display_names_failed_check() {
        let text = sample_report().to_string();
        assert!(text.contains("[PASS] extract"));
        assert!(text.contains("[FAIL] transform_load"));
        assert!(text.contains("code 2"));
        assert!(text.ends_with("1 passed, 1 failed"));
    }

    #[test]
    fn test_report_json() {
        let json = sample_report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["command"], "pipeline");
        assert_eq!(value["checks"][0]["passed"], true);
        assert_eq!(value["checks"][1]["failure"], "non_zero_exit");
        assert_eq!(value["checks"][1]["invocation"]["exit_code"], 2);
    }
}
