use crate::config::PipelineConfig;
use crate::stage::{PipelineResult, Stage};
use crate::types::CREATE_HOUSING_TABLE;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// A `SELECT` returned this many rows.
    Rows(usize),
    /// Any other statement batch; rows changed by the last statement.
    Changed(u64),
}

fn is_read_query(query: &str) -> bool {
    query.trim_start().to_lowercase().starts_with("select")
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(blob) => format!("<{} byte blob>", blob.len()),
    }
}

/// Runs `query` against `conn`. Reads print one `Result:` line per row to
/// `out`; everything else runs as a statement batch.
pub fn run_query(
    conn: &Connection,
    query: &str,
    out: &mut dyn Write,
) -> PipelineResult<QueryOutcome> {
    if !is_read_query(query) {
        conn.execute_batch(query)?;
        return Ok(QueryOutcome::Changed(conn.changes()));
    }

    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query([])?;
    let mut count = 0;

    while let Some(row) = rows.next()? {
        let mut fields = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            fields.push(format!("{}={}", column, render_value(row.get_ref(i)?)));
        }
        writeln!(out, "Result: {}", fields.join(", "))?;
        count += 1;
    }

    Ok(QueryOutcome::Rows(count))
}

/// Appends `query` to the Markdown log at `log_file` as a fenced SQL block.
pub fn log_query(query: &str, log_file: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file)?;
    writeln!(file, "```sql\n{}\n```\n", query)
}

pub struct QueryStage;

impl QueryStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QueryStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for QueryStage {
    fn name(&self) -> &str {
        "general_query"
    }

    fn description(&self) -> &str {
        "Run a SQL query against the housing database"
    }

    fn run(&self, config: &PipelineConfig, out: &mut dyn Write) -> PipelineResult<()> {
        config.validated()?;
        writeln!(out, "Querying data...")?;

        let conn = Connection::open(&config.database_path)?;
        conn.execute(CREATE_HOUSING_TABLE, [])?;

        let query = config.default_query.trim();
        debug!("Running query: {}", query);
        match run_query(&conn, query, out)? {
            QueryOutcome::Rows(n) => writeln!(out, "{} row(s) returned", n)?,
            QueryOutcome::Changed(n) => writeln!(out, "{} row(s) affected", n)?,
        }

        if let Err(e) = log_query(query, &config.query_log_path) {
            warn!(
                "Failed to write query log {}: {}",
                config.query_log_path.display(),
                e
            );
        }

        Ok(())
    }
}
