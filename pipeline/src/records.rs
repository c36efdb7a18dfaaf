//! Typed single-record operations on the housing table.

use crate::config::PipelineConfig;
use crate::stage::{PipelineError, PipelineResult, Stage};
use crate::transform::load_dataset;
use crate::types::{HousingRecord, CREATE_HOUSING_TABLE, INSERT_HOUSING_RECORD};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::io::Write;
use std::path::PathBuf;

const SELECT_COLUMNS: &str = "SELECT id, MedInc, HouseAge, AveRooms, AveBedrms, Population, \
     AveOccup, Latitude, Longitude, MedHouseVal FROM tbl_housing_data";

fn from_row(row: &Row<'_>) -> rusqlite::Result<HousingRecord> {
    Ok(HousingRecord {
        id: row.get(0)?,
        MedInc: row.get(1)?,
        HouseAge: row.get(2)?,
        AveRooms: row.get(3)?,
        AveBedrms: row.get(4)?,
        Population: row.get(5)?,
        AveOccup: row.get(6)?,
        Latitude: row.get(7)?,
        Longitude: row.get(8)?,
        MedHouseVal: row.get(9)?,
    })
}

pub fn ensure_table(conn: &Connection) -> PipelineResult<()> {
    conn.execute(CREATE_HOUSING_TABLE, [])?;
    Ok(())
}

/// Inserts `record` and returns its id. A missing id becomes one past the
/// current maximum.
pub fn insert_record(conn: &Connection, record: &HousingRecord) -> PipelineResult<i64> {
    let id = match record.id {
        Some(id) => id,
        None => conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM tbl_housing_data",
            [],
            |row| row.get(0),
        )?,
    };

    conn.execute(
        INSERT_HOUSING_RECORD,
        params![
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
        ],
    )?;
    Ok(id)
}

/// Overwrites the fields of row `id` that are `Some` in `changes`; `None`
/// fields keep their stored value. Returns false when no row has that id.
pub fn update_record(conn: &Connection, id: i64, changes: &HousingRecord) -> PipelineResult<bool> {
    let updated = conn.execute(
        "UPDATE tbl_housing_data SET
            MedInc = COALESCE(?2, MedInc),
            HouseAge = COALESCE(?3, HouseAge),
            AveRooms = COALESCE(?4, AveRooms),
            AveBedrms = COALESCE(?5, AveBedrms),
            Population = COALESCE(?6, Population),
            AveOccup = COALESCE(?7, AveOccup),
            Latitude = COALESCE(?8, Latitude),
            Longitude = COALESCE(?9, Longitude),
            MedHouseVal = COALESCE(?10, MedHouseVal)
         WHERE id = ?1",
        params![
            id,
            changes.MedInc,
            changes.HouseAge,
            changes.AveRooms,
            changes.AveBedrms,
            changes.Population,
            changes.AveOccup,
            changes.Latitude,
            changes.Longitude,
            changes.MedHouseVal,
        ],
    )?;
    Ok(updated > 0)
}

pub fn select_record(conn: &Connection, id: i64) -> PipelineResult<Option<HousingRecord>> {
    let record = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn select_all_records(conn: &Connection) -> PipelineResult<Vec<HousingRecord>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
    let records = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Returns false when no row has that id.
pub fn delete_record(conn: &Connection, id: i64) -> PipelineResult<bool> {
    let deleted = conn.execute("DELETE FROM tbl_housing_data WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Record-management commands. Unlike the pipeline stages these carry their
/// own arguments, so the CLI runs them directly rather than via the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCommand {
    Init { csv_path: PathBuf },
    Create { record: HousingRecord },
    Update { id: i64, changes: HousingRecord },
    Read { id: Option<i64> },
    Delete { id: i64 },
}

impl Stage for RecordCommand {
    fn name(&self) -> &str {
        match self {
            RecordCommand::Init { .. } => "init",
            RecordCommand::Create { .. } => "create_record",
            RecordCommand::Update { .. } => "update_record",
            RecordCommand::Read { .. } => "read",
            RecordCommand::Delete { .. } => "delete_record",
        }
    }

    fn description(&self) -> &str {
        match self {
            RecordCommand::Init { .. } => "Create the database and load a CSV file",
            RecordCommand::Create { .. } => "Create a new record",
            RecordCommand::Update { .. } => "Update an existing record",
            RecordCommand::Read { .. } => "Read one record, or all of them",
            RecordCommand::Delete { .. } => "Delete a record",
        }
    }

    fn run(&self, config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()> {
        config.validated()?;

        if let RecordCommand::Init { csv_path } = self {
            writeln!(out, "Initializing...")?;
            let summary = load_dataset(csv_path, &config.database_path)?;
            writeln!(
                out,
                "Database initialized and data loaded from {} ({} rows)",
                csv_path.display(),
                summary.loaded
            )?;
            return Ok(());
        }

        let conn = Connection::open(&config.database_path)?;
        ensure_table(&conn)?;

        match self {
            RecordCommand::Init { .. } => {}
            RecordCommand::Create { record } => {
                writeln!(out, "Creating Records...")?;
                let id = insert_record(&conn, record)?;
                writeln!(out, "Record with ID {} created successfully.", id)?;
            }
            RecordCommand::Update { id, changes } => {
                writeln!(out, "Updating Record(s)...")?;
                if update_record(&conn, *id, changes)? {
                    writeln!(out, "Record with ID {} updated successfully.", id)?;
                } else {
                    writeln!(out, "No record found with ID {}.", id)?;
                }
            }
            RecordCommand::Read { id: Some(id) } => {
                writeln!(out, "Retrieving Record...")?;
                let record =
                    select_record(&conn, *id)?.ok_or(PipelineError::RecordNotFound { id: *id })?;
                writeln!(out, "Record with ID {}: {:?}", id, record)?;
            }
            RecordCommand::Read { id: None } => {
                writeln!(out, "Retrieving All Record(s)...")?;
                for record in select_all_records(&conn)? {
                    writeln!(out, "{:?}", record)?;
                }
            }
            RecordCommand::Delete { id } => {
                if delete_record(&conn, *id)? {
                    writeln!(out, "Record with ID {} deleted successfully.", id)?;
                } else {
                    writeln!(out, "No record found with ID {}.", id)?;
                }
            }
        }

        Ok(())
    }
}
