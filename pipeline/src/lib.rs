pub mod config;
pub mod extract;
pub mod query;
pub mod records;
pub mod stage;
pub mod transform;
pub mod types;

pub use config::PipelineConfig;
pub use extract::ExtractStage;
pub use query::{log_query, run_query, QueryOutcome, QueryStage};
pub use stage::{PipelineError, PipelineResult, Stage, StageRegistry};
pub use transform::{load_dataset, LoadSummary, TransformLoadStage};
pub use records::RecordCommand;
pub use types::HousingRecord;

/// Registry with every stage the CLI exposes, keyed by subcommand name.
pub fn default_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry.register(Box::new(ExtractStage::new()));
    registry.register(Box::new(TransformLoadStage::new()));
    registry.register(Box::new(QueryStage::new()));
    registry
}
