use crate::config::PipelineConfig;
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to read config file '{path}': {reason}")]
    ConfigFile { path: String, reason: String },

    #[error("Unknown stage: {name}")]
    UnknownStage { name: String },

    #[error("No record found with ID {id}.")]
    RecordNotFound { id: i64 },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// One step of the pipeline, addressable by its subcommand name.
///
/// Stages write their user-facing progress lines to `out`; diagnostics go
/// through `tracing`.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn run(&self, config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()>;
}

pub struct StageRegistry {
    stages: BTreeMap<String, Box<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, stage: Box<dyn Stage>) {
        let name = stage.name().to_string();
        self.stages.insert(name, stage);
    }

    pub fn get_stage(&self, name: &str) -> Option<&dyn Stage> {
        self.stages.get(name).map(|s| s.as_ref())
    }

    pub fn list_stages(&self) -> Vec<&str> {
        self.stages.keys().map(|s| s.as_str()).collect()
    }

    pub fn run(
        &self,
        name: &str,
        config: &PipelineConfig,
        out: &mut dyn Write,
    ) -> PipelineResult<()> {
        match self.stages.get(name) {
            Some(stage) => stage.run(config, out),
            None => Err(PipelineError::UnknownStage {
                name: name.to_string(),
            }),
        }
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GreetStage;

    impl Stage for GreetStage {
        fn name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Say hello"
        }

        fn run(&self, _config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()> {
            writeln!(out, "hello")?;
            Ok(())
        }
    }

    #[test]
    fn test_stage_registry() {
        let mut registry = StageRegistry::new();
        registry.register(Box::new(GreetStage));

        assert_eq!(registry.list_stages(), vec!["greet"]);
        assert!(registry.get_stage("greet").is_some());
        assert!(registry.get_stage("nonexistent").is_none());

        let mut out = Vec::new();
        registry
            .run("greet", &PipelineConfig::default(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::new();
        let mut out = Vec::new();
        let result = registry.run("bogus", &PipelineConfig::default(), &mut out);
        assert!(matches!(
            result,
            Err(PipelineError::UnknownStage { ref name }) if name == "bogus"
        ));
    }

    #[test]
    fn test_default_registry_names() {
        let registry = crate::default_registry();
        assert_eq!(
            registry.list_stages(),
            vec!["extract", "general_query", "transform_load"]
        );
    }
}
