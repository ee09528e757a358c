//! fedq CLI: validate a VDB, explain or run a query against it.

use clap::{Parser, Subcommand};
use fedq_core::config::EngineConfig;
use fedq_core::types::Scalar;
use fedq_exec::{Bindings, Engine};
use fedq_meta::VdbMetaData;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "fedq")]
#[command(about = "fedq: federated query engine over a VDB of physical and virtual models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Path to the VDB YAML descriptor
    #[arg(long)]
    vdb: PathBuf,

    /// Buffer memory cap in bytes (overrides config)
    #[arg(long)]
    memory_cap: Option<usize>,

    /// Rows pulled through the plan per processing step (overrides config)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum rows returned; 0 means unlimited (overrides config)
    #[arg(long)]
    row_limit: Option<u64>,

    /// Fail instead of truncating when the row limit is passed
    #[arg(long)]
    fail_on_row_limit: bool,

    /// Ceiling on optimizer rule executions (overrides config)
    #[arg(long)]
    max_rule_iterations: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a VDB and report validation problems
    Validate {
        /// Path to the VDB YAML descriptor
        #[arg(long)]
        vdb: PathBuf,
    },

    /// Show the optimized plan and the commands sent to each source
    Explain {
        #[command(flatten)]
        engine: EngineArgs,

        /// SQL query text
        sql: String,
    },

    /// Run a query and print its rows
    Query {
        #[command(flatten)]
        engine: EngineArgs,

        /// SQL query text
        sql: String,

        /// Values for `?` parameters, in order (JSON literals or plain text)
        #[arg(long = "bind")]
        bind: Vec<String>,

        /// Print rows as JSON arrays instead of tab-separated text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { vdb } => match validate_vdb(&vdb) {
            Ok(true) => println!("✓ VDB is valid"),
            Ok(false) => std::process::exit(1),
            Err(e) => {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Explain { engine, sql } => {
            if let Err(e) = explain_query(&engine, &sql) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Query {
            engine,
            sql,
            bind,
            json,
        } => {
            if let Err(e) = run_query(&engine, &sql, &bind, json) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Prints the report; `Ok(false)` when it contains errors.
fn validate_vdb(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let vdb = VdbMetaData::from_path(path)?;
    let mut store = fedq_meta::load_store(&vdb)?;
    let report = fedq_meta::vdb::validate(&vdb, &mut store);
    if report.has_items() {
        println!("{}", report);
    }
    Ok(!report.has_errors())
}

fn build_engine(args: &EngineArgs) -> Result<Engine, Box<dyn std::error::Error>> {
    let vdb = VdbMetaData::from_path(&args.vdb)?;

    let mut config = EngineConfig::from_env();
    if let Some(cap) = args.memory_cap {
        config.buffer_mem_cap_bytes = cap;
    }
    if let Some(n) = args.batch_size {
        config.processor_batch_size = n;
    }
    if let Some(limit) = args.row_limit {
        config.user_row_limit = limit;
    }
    if args.fail_on_row_limit {
        config.exception_on_row_limit = true;
    }
    if let Some(n) = args.max_rule_iterations {
        config.optimizer_max_iterations = n;
    }
    debug!(?config, "engine config");

    Ok(Engine::from_vdb(vdb, config)?)
}

fn explain_query(args: &EngineArgs, sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(args)?;
    let plan = engine.plan(sql)?;

    println!("=== Plan ===");
    print!("{}", plan.tree.explain());
    println!();
    println!("=== Processing ===");
    print!("{}", plan.program.explain());
    println!();
    println!("=== Source commands ===");
    for (model, command) in plan.program.root.access_commands() {
        println!("{}: {}", model, command);
    }
    println!();
    println!("rule executions: {}", plan.stats.iterations());
    println!("fingerprint: {}", plan.program.fingerprint()?);
    if !plan.program.references.is_empty() {
        println!("parameters: {}", plan.program.references.len());
    }
    Ok(())
}

fn run_query(
    args: &EngineArgs,
    sql: &str,
    bind: &[String],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(args)?;
    let bindings = Bindings::positional(bind.iter().map(|b| parse_binding(b)).collect());
    let work = engine.work_context();
    let (fields, rows) = engine.execute_all(sql, &work, bindings)?;

    if json {
        for row in &rows {
            let values: Vec<serde_json::Value> = row.iter().map(scalar_to_json).collect();
            println!("{}", serde_json::Value::Array(values));
        }
    } else {
        let header: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        println!("{}", header.join("\t"));
        for row in &rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            println!("{}", cells.join("\t"));
        }
    }
    eprintln!("{} row(s)", rows.len());
    Ok(())
}

/// JSON literals keep their type; anything else binds as a string.
fn parse_binding(text: &str) -> Scalar {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Null) => Scalar::Null,
        Ok(serde_json::Value::Bool(b)) => Scalar::Bool(b),
        Ok(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(v) => i32::try_from(v).map(Scalar::I32).unwrap_or(Scalar::I64(v)),
            None => n.as_f64().map(Scalar::F64).unwrap_or(Scalar::Null),
        },
        Ok(serde_json::Value::String(s)) => Scalar::Str(s),
        _ => Scalar::Str(text.to_string()),
    }
}

fn scalar_to_json(value: &Scalar) -> serde_json::Value {
    match value {
        Scalar::Null => serde_json::Value::Null,
        Scalar::Bool(b) => (*b).into(),
        Scalar::I32(v) => (*v).into(),
        Scalar::I64(v) => (*v).into(),
        Scalar::F32(v) => (*v as f64).into(),
        Scalar::F64(v) => (*v).into(),
        other => other.to_string().into(),
    }
}
