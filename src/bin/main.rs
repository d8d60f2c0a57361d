//! ObjectQL CLI - Compile JSON queries to REST, GraphQL and OData
//!
//! Usage:
//!   objectql validate <query.json>
//!   objectql plan <query.json>
//!   objectql encode <query.json> [--target <target>] [--output <format>]
//!
//! Examples:
//!   objectql encode orders.json --target odata
//!   objectql encode orders.json --target graphql --config objectql.toml
//!   RUST_LOG=objectql=debug objectql plan orders.json

use clap::{Parser, Subcommand, ValueEnum};
use objectql::adapter::Target;
use objectql::compile::{self, CompileError, CompileOptions};
use objectql::config::Settings;
use objectql::Query;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "objectql")]
#[command(about = "ObjectQL - Plan a query once, encode it for REST, GraphQL or OData")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to OBJECTQL_CONFIG, ./objectql.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a query and report every error
    Validate {
        /// Path to the query JSON file
        file: PathBuf,
    },

    /// Print the logical plan for a query
    Plan {
        /// Path to the query JSON file
        file: PathBuf,
    },

    /// Encode a query for a target protocol
    Encode {
        /// Path to the query JSON file
        file: PathBuf,

        /// Protocol to encode for
        #[arg(short, long, default_value = "rest")]
        target: TargetArg,

        /// Output format
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum TargetArg {
    Rest,
    Graphql,
    Odata,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Rest => Target::Rest,
            TargetArg::Graphql => Target::GraphQL,
            TargetArg::Odata => Target::OData,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Wire form only
    Text,
    /// Wire form with target and fingerprint
    Verbose,
    /// Structured JSON
    Json,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let options = match load_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Validate { file } => cmd_validate(file, &options),
        Commands::Plan { file } => cmd_plan(file, &options),
        Commands::Encode {
            file,
            target,
            output,
        } => cmd_encode(file, options.with_target(target.into()), output),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_options(config: Option<&Path>) -> Result<CompileOptions, CompileError> {
    let settings = match config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    Ok(CompileOptions::from_settings(&settings))
}

fn read_query(file: &Path) -> Option<Query> {
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file.display(), e);
            return None;
        }
    };

    match Query::from_json(&source) {
        Ok(query) => Some(query),
        Err(e) => {
            eprintln!("Parse error in '{}': {}", file.display(), e);
            None
        }
    }
}

fn report(e: &CompileError) {
    match e {
        CompileError::ValidationError(errors) => {
            eprintln!("Validation failed with {} error(s):", errors.len());
            for error in errors {
                eprintln!("  {}", error);
            }
        }
        other => eprintln!("{}", other),
    }
}

fn cmd_validate(file: PathBuf, options: &CompileOptions) -> ExitCode {
    let Some(query) = read_query(&file) else {
        return ExitCode::FAILURE;
    };

    match compile::validate(&query, options) {
        Ok(()) => {
            println!("✓ {} is valid", file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_plan(file: PathBuf, options: &CompileOptions) -> ExitCode {
    let Some(query) = read_query(&file) else {
        return ExitCode::FAILURE;
    };

    let plan = match compile::plan(&query, options) {
        Ok(plan) => plan,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&plan) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error serializing plan: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_encode(file: PathBuf, options: CompileOptions, output: OutputFormat) -> ExitCode {
    let Some(query) = read_query(&file) else {
        return ExitCode::FAILURE;
    };

    let compiled = match compile::compile(&query, &options) {
        Ok(compiled) => compiled,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };

    match output {
        OutputFormat::Text => println!("{}", compiled.query),
        OutputFormat::Verbose => {
            println!("# Source: {}", file.display());
            println!("# Target: {}", compiled.target);
            println!("# Fingerprint: {}", compiled.fingerprint);
            println!();
            println!("{}", compiled.query);
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&compiled.query) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
