pub mod check;
pub mod report;
pub mod runner;

pub use check::{default_checks, CheckError, CheckSpec, FailureKind, InvocationResult};
pub use report::{CheckReport, HarnessReport};
pub use runner::{invoke, run_check, run_checks, HarnessConfig, HarnessError, HarnessResult};
