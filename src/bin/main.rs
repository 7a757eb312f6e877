//! rowmap CLI - load CSV files into SQLite tables from a mapping spec
//!
//! Usage:
//!   rowmap load --db <path> --csv <path> --spec <path>
//!   rowmap check --spec <path> [--csv <path>] [--print]
//!   rowmap schema --db <path> --table <name>
//!
//! Examples:
//!   rowmap load --db results.db --csv scores.csv --spec scores.yaml
//!   rowmap check --spec scores.yaml --csv scores.csv --print
//!   rowmap -v schema --db results.db --table measure

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rowmap::config::Settings;
use rowmap::input::read_csv;
use rowmap::load::{input_warnings, load, preflight, LoadOptions, LoadWarning};
use rowmap::logging::{init_logging, LogConfig, LogFormat};
use rowmap::metadata::SchemaProvider;
use rowmap::session::Session;
use rowmap::spec::{MappingSpec, SpecFormat};

#[derive(Parser)]
#[command(name = "rowmap")]
#[command(about = "rowmap - declarative CSV to SQLite loader")]
#[command(version)]
struct Cli {
    /// Settings file (default: $ROWMAP_CONFIG, ./rowmap.toml, user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file into a table
    Load {
        /// SQLite database (must already exist); falls back to database.path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Input CSV file with a header row
        #[arg(long)]
        csv: PathBuf,

        /// Mapping spec (.yaml, .yml, .json or .toml)
        #[arg(long)]
        spec: PathBuf,
    },

    /// Validate a mapping spec without touching a database
    Check {
        /// Mapping spec to validate
        #[arg(long)]
        spec: PathBuf,

        /// Also check field references against this CSV header
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the normalized spec
        #[arg(long)]
        print: bool,
    },

    /// Show the introspected schema of a table
    Schema {
        /// SQLite database; falls back to database.path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Table name
        #[arg(long)]
        table: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&cli, &settings) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Load { db, csv, spec } => cmd_load(&settings, db, &csv, &spec),
        Commands::Check { spec, csv, print } => cmd_check(&settings, &spec, csv.as_deref(), print),
        Commands::Schema { db, table } => cmd_schema(&settings, db, &table),
    }
}

fn setup_logging(cli: &Cli, settings: &Settings) -> Result<(), String> {
    let level = settings.logging.level().map_err(|e| e.to_string())?;
    let format = match cli.log_format {
        Some(f) => f,
        None => settings.logging.format().map_err(|e| e.to_string())?,
    };
    let config = LogConfig::from_verbosity(cli.verbose, level)
        .with_format(format)
        .with_timestamps(settings.logging.timestamps);
    init_logging(&config).map_err(|e| e.to_string())
}

/// `--db` wins over the configured path.
fn database_path(settings: &Settings, db: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(db) = db {
        return Ok(db);
    }
    match settings.database.resolved_path() {
        Ok(Some(path)) => Ok(path),
        Ok(None) => Err("no database given: pass --db or set database.path".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn cmd_load(settings: &Settings, db: Option<PathBuf>, csv: &Path, spec: &Path) -> ExitCode {
    let db = match database_path(settings, db) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let input = match settings.input.input_options() {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let options = LoadOptions::default()
        .with_input(input)
        .with_session(settings.database.session_options());

    match load(&db, csv, spec, &options) {
        Ok(report) => {
            println!(
                "Loaded {} rows into '{}'.",
                report.rows_written, report.table
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_check(settings: &Settings, spec_path: &Path, csv: Option<&Path>, print: bool) -> ExitCode {
    let spec = match MappingSpec::load(spec_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut warnings = Vec::new();
    if let Some(csv) = csv {
        let result = settings
            .input
            .input_options()
            .map_err(|e| e.to_string())
            .and_then(|opts| read_csv(csv, &opts).map_err(|e| e.to_string()))
            .and_then(|input| {
                preflight(&spec, &input).map_err(|e| e.to_string())?;
                Ok(input)
            });
        match result {
            Ok(input) => warnings = input_warnings(&spec, input.header()),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    match write_check(&mut stdout, &mut stderr, &spec, &warnings, print) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Warnings go to `err` so `--print` output stays a clean spec document.
fn write_check(
    out: &mut impl Write,
    err: &mut impl Write,
    spec: &MappingSpec,
    warnings: &[LoadWarning],
    print: bool,
) -> Result<(), String> {
    for warning in warnings {
        writeln!(err, "warning: {}", warning).map_err(|e| e.to_string())?;
    }
    if print {
        let text = spec.render(SpecFormat::Yaml).map_err(|e| e.to_string())?;
        write!(out, "{}", text).map_err(|e| e.to_string())
    } else {
        writeln!(
            out,
            "Spec OK: table '{}', mode {}, {} column(s)",
            spec.table,
            spec.mode.name(),
            spec.columns.len()
        )
        .map_err(|e| e.to_string())
    }
}

fn cmd_schema(settings: &Settings, db: Option<PathBuf>, table: &str) -> ExitCode {
    let db = match database_path(settings, db) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let session = match Session::open(&db, &settings.database.session_options()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match session.table_schema(table) {
        Ok(schema) => {
            print!("{}", schema);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
