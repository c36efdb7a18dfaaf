use crate::config::PipelineConfig;
use crate::extract::ExtractStage;
use crate::stage::{PipelineResult, Stage};
use crate::types::{
    HousingRecord, CREATE_HOUSING_TABLE, DROP_HOUSING_TABLE, INSERT_HOUSING_RECORD,
};
use rusqlite::{params, Connection};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Replaces the housing table with the records read from `reader`.
///
/// Records that fail to parse are skipped and logged; the rest are inserted in
/// a single transaction. Rows without an `id` column get their 1-based
/// position in the file.
pub fn load_records<R: Read>(conn: &mut Connection, reader: R) -> PipelineResult<LoadSummary> {
    let tx = conn.transaction()?;
    tx.execute(DROP_HOUSING_TABLE, [])?;
    tx.execute(CREATE_HOUSING_TABLE, [])?;

    let mut summary = LoadSummary::default();
    {
        let mut stmt = tx.prepare(INSERT_HOUSING_RECORD)?;
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        for (index, result) in rdr.deserialize::<HousingRecord>().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    warn!("Skipping CSV record {}: {}", index + 1, err);
                    summary.skipped += 1;
                    continue;
                }
            };

            let id = record.id.unwrap_or(index as i64 + 1);
            stmt.execute(params![
                id,
                record.MedInc,
                record.HouseAge,
                record.AveRooms,
                record.AveBedrms,
                record.Population,
                record.AveOccup,
                record.Latitude,
                record.Longitude,
                record.MedHouseVal,
            ])?;
            summary.loaded += 1;
        }
    }
    tx.commit()?;

    Ok(summary)
}

/// Loads the CSV file at `dataset` into the database at `database`.
pub fn load_dataset(dataset: &Path, database: &Path) -> PipelineResult<LoadSummary> {
    let file = std::fs::File::open(dataset)?;
    let mut conn = Connection::open(database)?;
    let summary = load_records(&mut conn, file)?;
    info!(
        "Loaded {} rows ({} skipped) from {} into {}",
        summary.loaded,
        summary.skipped,
        dataset.display(),
        database.display()
    );
    Ok(summary)
}

pub struct TransformLoadStage;

impl TransformLoadStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TransformLoadStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TransformLoadStage {
    fn name(&self) -> &str {
        "transform_load"
    }

    fn description(&self) -> &str {
        "Load the downloaded dataset into SQLite"
    }

    fn run(&self, config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()> {
        config.validated()?;

        if !config.dataset_path.exists() {
            info!(
                "Dataset {} not found, extracting first",
                config.dataset_path.display()
            );
            ExtractStage::new().run(config, out)?;
        }

        writeln!(out, "Transforming data...")?;
        let summary = load_dataset(&config.dataset_path, &config.database_path)?;
        writeln!(
            out,
            "Loaded {} rows into {} ({} skipped)",
            summary.loaded,
            config.database_path.display(),
            summary.skipped
        )?;
        Ok(())
    }
}
