//! reltab CLI: run one table operator over CSV files and print CSV.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use reltab_core::config::EngineConfig;
use reltab_core::field::FieldSpec;
use reltab_core::key::KeySpec;
use reltab_core::{Table, TableRef};
use reltab_io::{CsvSource, CsvWriter};
use reltab_operators::{complement, intersection, Distinct, Duplicates, IntervalCollapse, Sort, Unique};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "reltab")]
#[command(about = "Lazy relational operators over CSV tables", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON engine config; fields left out keep their env/default values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Field delimiter for input and output
    #[arg(short, long, global = true, default_value_t = ',')]
    delimiter: char,

    /// Parse numeric fields as numbers and empty fields as missing
    #[arg(long, global = true)]
    infer: bool,

    /// Rows held in memory per sort chunk (overrides config)
    #[arg(long, global = true)]
    buffer_rows: Option<usize>,

    /// Directory for sort spill files (overrides config)
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort rows by key fields, or by whole rows
    Sort {
        input: PathBuf,

        /// Key field; repeat for a compound key
        #[arg(short, long)]
        key: Vec<String>,

        #[arg(short, long)]
        reverse: bool,
    },

    /// Keep the first row of each distinct key
    Distinct {
        input: PathBuf,

        #[arg(short, long)]
        key: Vec<String>,

        /// Append a field with the number of rows per key
        #[arg(long)]
        count: Option<String>,
    },

    /// Keep rows whose key occurs once
    Unique {
        input: PathBuf,

        #[arg(short, long)]
        key: Vec<String>,
    },

    /// Keep rows whose key occurs more than once
    Duplicates {
        input: PathBuf,

        #[arg(short, long)]
        key: Vec<String>,
    },

    /// Rows of A not in B
    Complement {
        a: PathBuf,
        b: PathBuf,

        /// Drop every copy of a row found in B
        #[arg(long)]
        strict: bool,

        /// Match B's fields to A's by name
        #[arg(long)]
        by_name: bool,
    },

    /// Rows in both A and B
    Intersect {
        a: PathBuf,
        b: PathBuf,

        #[arg(long)]
        by_name: bool,
    },

    /// Merge overlapping intervals
    Collapse {
        input: PathBuf,

        #[arg(long, default_value = "start")]
        start: String,

        #[arg(long, default_value = "stop")]
        stop: String,

        /// Collapse separately per value of this field
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli.global)?;
    EngineConfig::install_global(config)?;

    let delimiter = delimiter_byte(cli.global.delimiter)?;
    let open = |path: &Path| -> TableRef {
        Arc::new(
            CsvSource::new(path)
                .delimiter(delimiter)
                .infer_types(cli.global.infer),
        )
    };

    let table: TableRef = match cli.command {
        Commands::Sort {
            input,
            key,
            reverse,
        } => Sort::new(open(&input))
            .key_opt(key_spec(key))
            .reverse(reverse)
            .into_ref(),
        Commands::Distinct { input, key, count } => {
            let op = Distinct::new(open(&input), key_spec(key));
            match count {
                Some(field) => op.count(field).into_ref(),
                None => op.into_ref(),
            }
        }
        Commands::Unique { input, key } => Unique::new(open(&input), key_spec(key)).into_ref(),
        Commands::Duplicates { input, key } => Duplicates::new(open(&input), key_spec(key)).into_ref(),
        Commands::Complement {
            a,
            b,
            strict,
            by_name,
        } => complement(open(&a), open(&b))
            .strict(strict)
            .by_name(by_name)
            .into_ref(),
        Commands::Intersect { a, b, by_name } => intersection(open(&a), open(&b))
            .by_name(by_name)
            .into_ref(),
        Commands::Collapse {
            input,
            start,
            stop,
            key,
        } => {
            let op = IntervalCollapse::new(open(&input)).interval(start, stop);
            match key {
                Some(k) => op.key(k).into_ref(),
                None => op.into_ref(),
            }
        }
    };

    write_stdout(table.as_ref(), delimiter)?;
    Ok(())
}

/// Defaults, then environment, then the JSON file, then flags.
fn load_config(args: &GlobalArgs) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            let base = serde_json::to_value(EngineConfig::from_env())?;
            merge_json(base, serde_json::from_str(&text)?)?
        }
        None => EngineConfig::from_env(),
    };
    if let Some(rows) = args.buffer_rows {
        config.buffer_rows = rows;
    }
    if let Some(dir) = &args.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn merge_json(mut base: serde_json::Value, overlay: serde_json::Value) -> Result<EngineConfig, serde_json::Error> {
    match (base.as_object_mut(), overlay) {
        (Some(fields), serde_json::Value::Object(overlay)) => fields.extend(overlay),
        (_, overlay) => return serde_json::from_value(overlay),
    }
    serde_json::from_value(base)
}

fn delimiter_byte(c: char) -> Result<u8, String> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| format!("delimiter must be a single ASCII character, got {c:?}"))
}

/// No fields means whole rows; several fields make a compound key.
fn key_spec(fields: Vec<String>) -> Option<KeySpec> {
    match fields.len() {
        0 => None,
        1 => fields.into_iter().next().map(KeySpec::from),
        _ => Some(FieldSpec::from(fields).into()),
    }
}

fn write_stdout(table: &dyn Table, delimiter: u8) -> Result<u64, Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut writer = CsvWriter::to_writer(stdout.lock(), delimiter);
    let rows = writer.write_table(table)?;
    tracing::debug!(rows, operator = table.name(), "wrote table");
    Ok(rows)
}
