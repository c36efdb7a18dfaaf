use clap::Parser;
use harness::{default_checks, run_checks, CheckSpec, HarnessConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Smoke-test a pipeline CLI by running each subcommand once")]
struct Cli {
    /// Program under test
    #[arg(short, long, default_value = "pipeline")]
    program: String,
    /// Argument placed before the subcommand (repeatable), e.g. a script path
    #[arg(short, long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    /// Check to run as SUBCOMMAND or SUBCOMMAND=EXPECTED_STDOUT (repeatable);
    /// defaults to the extract / transform_load / general_query table
    #[arg(short, long = "check")]
    checks: Vec<CheckSpec>,
    /// Extra environment variable for the program, as KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,
    /// Working directory for the program
    #[arg(short, long)]
    workdir: Option<PathBuf>,
    /// Per-invocation timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,
    /// Wait for the program indefinitely
    #[arg(long, conflicts_with = "timeout_secs")]
    no_timeout: bool,
    /// Run the whole check table this many times
    #[arg(short, long, default_value = "1")]
    repeat: usize,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl Cli {
    fn config(&self) -> HarnessConfig {
        let timeout = if self.no_timeout {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        };

        let mut config = HarnessConfig::new(&self.program)
            .with_timeout(timeout)
            .with_repeat(self.repeat);
        for arg in &self.args {
            config = config.with_leading_arg(arg);
        }
        for (key, value) in &self.env {
            config = config.with_env(key, value);
        }
        if let Some(dir) = &self.workdir {
            config = config.with_working_dir(dir);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    let checks = if cli.checks.is_empty() {
        default_checks()
    } else {
        cli.checks.clone()
    };

    let report = match run_checks(&config, &checks).await {
        Ok(report) => report,
        Err(e) => {
            error!("Harness setup failed: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    if cli.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return ExitCode::from(2);
            }
        }
    } else {
        println!("{}", report);
    }

    if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
