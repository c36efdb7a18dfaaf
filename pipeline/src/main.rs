use clap::{Args, Parser, Subcommand};
use pipeline::{
    default_registry, HousingRecord, PipelineConfig, PipelineError, RecordCommand, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Extract, transform/load and query the housing dataset")]
struct Cli {
    /// TOML config file (defaults to ./pipeline.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the dataset
    Extract {
        /// Source URL of the CSV file
        #[arg(long)]
        url: Option<String>,
        /// Where to store the downloaded file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load the dataset into the SQLite database
    #[command(name = "transform_load")]
    TransformLoad {
        /// CSV file to load
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },
    /// Run a SQL query against the database
    #[command(name = "general_query")]
    GeneralQuery {
        /// SQL to execute (defaults to the configured query)
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Create the database and load a local CSV file into it
    Init {
        /// CSV file to load
        csv_path: PathBuf,
    },
    /// Insert one record
    #[command(name = "create_record")]
    CreateRecord {
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Replace the values of the record with the given id
    #[command(name = "update_record")]
    UpdateRecord {
        id: i64,
        #[command(flatten)]
        fields: RecordFields,
    },
    /// Print the record with the given id, or every record
    Read { id: Option<i64> },
    /// Delete the record with the given id
    #[command(name = "delete_record")]
    DeleteRecord { id: i64 },
    /// List the pipeline stages
    Stages,
}

#[derive(Args)]
struct RecordFields {
    #[arg(value_name = "MedInc", allow_negative_numbers = true)]
    med_inc: f64,
    #[arg(value_name = "HouseAge", allow_negative_numbers = true)]
    house_age: f64,
    #[arg(value_name = "AveRooms", allow_negative_numbers = true)]
    ave_rooms: f64,
    #[arg(value_name = "AveBedrms", allow_negative_numbers = true)]
    ave_bedrms: f64,
    #[arg(value_name = "Population", allow_negative_numbers = true)]
    population: f64,
    #[arg(value_name = "AveOccup", allow_negative_numbers = true)]
    ave_occup: f64,
    #[arg(value_name = "Latitude", allow_negative_numbers = true)]
    latitude: f64,
    #[arg(value_name = "Longitude", allow_negative_numbers = true)]
    longitude: f64,
    #[arg(value_name = "MedHouseVal", allow_negative_numbers = true)]
    med_house_val: f64,
}

impl From<RecordFields> for HousingRecord {
    fn from(fields: RecordFields) -> Self {
        HousingRecord {
            id: None,
            MedInc: Some(fields.med_inc),
            HouseAge: Some(fields.house_age),
            AveRooms: Some(fields.ave_rooms),
            AveBedrms: Some(fields.ave_bedrms),
            Population: Some(fields.population),
            AveOccup: Some(fields.ave_occup),
            Latitude: Some(fields.latitude),
            Longitude: Some(fields.longitude),
            MedHouseVal: Some(fields.med_house_val),
        }
    }
}

/// What a parsed command resolves to once CLI flags are folded into the config.
enum Action {
    Stage(&'static str),
    Record(RecordCommand),
    ListStages,
}

impl Commands {
    fn resolve(self, mut config: PipelineConfig) -> (Action, PipelineConfig) {
        let action = match self {
            Commands::Extract { url, output } => {
                if let Some(url) = url {
                    config = config.with_source_url(url);
                }
                if let Some(output) = output {
                    config = config.with_dataset_path(output);
                }
                Action::Stage("extract")
            }
            Commands::TransformLoad { dataset } => {
                if let Some(dataset) = dataset {
                    config = config.with_dataset_path(dataset);
                }
                Action::Stage("transform_load")
            }
            Commands::GeneralQuery { query } => {
                if let Some(query) = query {
                    config = config.with_query(query);
                }
                Action::Stage("general_query")
            }
            Commands::Init { csv_path } => Action::Record(RecordCommand::Init { csv_path }),
            Commands::CreateRecord { fields } => Action::Record(RecordCommand::Create {
                record: fields.into(),
            }),
            Commands::UpdateRecord { id, fields } => Action::Record(RecordCommand::Update {
                id,
                changes: fields.into(),
            }),
            Commands::Read { id } => Action::Record(RecordCommand::Read { id }),
            Commands::DeleteRecord { id } => Action::Record(RecordCommand::Delete { id }),
            Commands::Stages => Action::ListStages,
        };
        (action, config)
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let (action, config) = cli
        .command
        .resolve(PipelineConfig::load(cli.config.as_deref())?);

    let registry = default_registry();
    let start = Instant::now();
    let mut stdout = io::stdout().lock();
    match action {
        Action::Stage(name) => registry.run(name, &config, &mut stdout)?,
        Action::Record(command) => command.run(&config, &mut stdout)?,
        Action::ListStages => {
            for name in registry.list_stages() {
                if let Some(stage) = registry.get_stage(name) {
                    writeln!(stdout, "{:<16}{}", name, stage.description())?;
                }
            }
            return Ok(());
        }
    }
    let elapsed = start.elapsed();
    info!("Command finished in {:?}", elapsed);
    writeln!(stdout, "Time taken: {:?}", elapsed)?;

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
