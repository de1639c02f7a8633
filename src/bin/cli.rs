//! Tabula CLI
//!
//! Command-line inspection and maintenance for a Tabula table root.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tabula::table::{analyze, TableInfo};
use tabula::{Config, Record, Schema, TableManager, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// Tabula CLI
#[derive(Parser, Debug)]
#[command(name = "tabula-cli")]
#[command(about = "Inspect and maintain Tabula tables")]
#[command(version)]
struct Args {
    /// Table root directory (overrides data_dir from --config)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Config file with key = value lines
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List user tables with their row counts
    Tables,

    /// Create a table
    Create {
        /// Table name
        name: String,

        /// Schema text, e.g. "Id:int,Name:string:16"
        schema: String,
    },

    /// Drop a table and its files
    Drop {
        /// Table name
        name: String,
    },

    /// Print every record of a table
    Show {
        /// Table name
        name: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query a field index
    Search {
        /// Table name
        table: String,

        /// Field to search
        field: String,

        #[command(subcommand)]
        query: Query,
    },

    /// List blob files no record references
    Orphans {
        /// Table name
        table: String,
    },

    /// Cross-check catalog, files, blobs, and indexes
    Diagnose {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum Query {
    /// Keys equal to KEY
    Exact { key: String },

    /// Keys starting with PREFIX
    Prefix { prefix: String },

    /// Keys within [--min, --max]
    Range {
        #[arg(long)]
        min: Option<String>,

        #[arg(long)]
        max: Option<String>,
    },

    /// Keys above KEY
    Gt {
        key: String,

        #[arg(long)]
        inclusive: bool,
    },

    /// Keys below KEY
    Lt {
        key: String,

        #[arg(long)]
        inclusive: bool,
    },

    /// First K keys in order
    Top {
        k: usize,

        #[arg(long)]
        desc: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tabula=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> tabula::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = args.root {
        config.data_dir = root;
    }

    tracing::debug!("Tabula CLI v{}", tabula::VERSION);
    let mut manager = TableManager::open(config)?;

    match args.command {
        Commands::Tables => {
            for info in manager.all_table_info()? {
                println!("{}\t{} rows\t{}", info.name, info.row_count, info.schema);
            }
        }

        Commands::Create { name, schema } => {
            let schema = Schema::parse(&schema)?;
            manager.create_table(&name, &schema)?;
            println!("created {}", name);
        }

        Commands::Drop { name } => {
            manager.drop_table(&name)?;
            println!("dropped {}", name);
        }

        Commands::Show { name, json } => {
            let info = manager.table_info(&name)?;
            let records = manager.get_all_records(&name)?;
            if json {
                let rows: Vec<serde_json::Value> =
                    records.iter().map(|r| record_json(&info, r)).collect();
                println!("{}", to_pretty(&rows));
            } else {
                let header: Vec<&str> = info.schema.fields().iter().map(|f| f.name.as_str()).collect();
                println!("#\t{}", header.join("\t"));
                for (i, record) in records.iter().enumerate() {
                    println!("{}\t{}", i, record_line(record));
                }
            }
        }

        Commands::Search { table, field, query } => {
            let ids = match query {
                Query::Exact { key } => manager.search_exact(&table, &field, &key)?,
                Query::Prefix { prefix } => manager.search_prefix(&table, &field, &prefix)?,
                Query::Range { min, max } => {
                    manager.search_range(&table, &field, min.as_deref(), max.as_deref())?
                }
                Query::Gt { key, inclusive } => manager.search_greater_than(&table, &field, &key, inclusive)?,
                Query::Lt { key, inclusive } => manager.search_less_than(&table, &field, &key, inclusive)?,
                Query::Top { k, desc } => manager.search_top_k(&table, &field, k, desc)?,
            };
            for id in ids {
                let record = manager.get_record(&table, id)?;
                println!("{}\t{}", id, record_line(&record));
            }
        }

        Commands::Orphans { table } => {
            for orphan in manager.list_orphan_blobs(&table)? {
                println!("{}", orphan.path.display());
            }
        }

        Commands::Diagnose { json } => {
            let report = analyze(&mut manager)?;
            if json {
                println!("{}", to_pretty(&report));
            } else {
                println!("root: {} ({} catalog rows)", report.root.display(), report.catalog_rows);
                for issue in &report.catalog_issues {
                    println!("  catalog error: {}", issue);
                }
                for table in &report.tables {
                    println!("{}: {} rows, {} bytes", table.name, table.row_count, table.data_file_len);
                    for e in &table.errors {
                        println!("  error: {}", e);
                    }
                    for w in &table.warnings {
                        println!("  warning: {}", w);
                    }
                    for index in &table.indexes {
                        println!(
                            "  index {}: {} keys, height {}, built in {}us",
                            index.field, index.keys, index.height, index.build_micros
                        );
                    }
                }
                if !report.has_errors() && !report.has_warnings() {
                    println!("no issues found");
                }
            }
        }
    }

    Ok(())
}

fn record_line(record: &Record) -> String {
    record
        .iter()
        .map(|v| v.as_ref().map(ToString::to_string).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\t")
}

fn record_json(info: &TableInfo, record: &Record) -> serde_json::Value {
    let mut row = serde_json::Map::new();
    for (field, value) in info.schema.fields().iter().zip(record) {
        let value = match value {
            None => serde_json::Value::Null,
            Some(Value::Integer(i)) => json!(i),
            Some(Value::Boolean(b)) => json!(b),
            Some(other) => json!(other.to_string()),
        };
        row.insert(field.name.clone(), value);
    }
    serde_json::Value::Object(row)
}

fn to_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}
