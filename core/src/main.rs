//! sqlmap command line
//!
//! Loads settings and mapper files, then lists statements or renders one
//! statement for a JSON parameter without touching a database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::Table;
use sqlmap_core::executor::{BoundStatement, fingerprint};
use sqlmap_core::session::wrap_collection;
use sqlmap_core::{Configuration, MapperSpec, RowBounds, Settings, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "sqlmap")]
#[command(about = "Inspect SQL mapper definitions", long_about = None)]
struct Cli {
    /// Settings file (TOML); SQLMAP_CONFIG overrides it
    #[arg(long, short, default_value = "sqlmap.toml")]
    config: PathBuf,

    /// Mapper definition files (JSON)
    #[arg(long = "mapper", short, required = true)]
    mappers: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every loaded statement
    Statements,

    /// Show the SQL, bindings and cache key for one statement
    Render {
        /// Fully qualified statement id
        statement: String,

        /// Parameter object as JSON
        #[arg(long, short, default_value = "null")]
        params: String,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load_from_path(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let config = load_configuration(settings, &cli.mappers)?;

    match cli.command {
        Commands::Statements => print_statements(&config),
        Commands::Render {
            statement,
            params,
            offset,
            limit,
        } => {
            let bounds = RowBounds::new(offset, limit.unwrap_or(RowBounds::DEFAULT.limit));
            render(&config, &statement, &params, bounds)
        }
    }
}

fn load_configuration(settings: Settings, mappers: &[PathBuf]) -> Result<Arc<Configuration>> {
    let mut builder = Configuration::builder(settings);
    for path in mappers {
        let spec = read_mapper(path)?;
        builder = builder
            .add_mapper(&spec)
            .with_context(|| format!("compiling mapper {}", path.display()))?;
    }

    let config = builder.build()?;
    info!(statements = config.statement_ids().len(), "Configuration loaded");
    Ok(config)
}

fn read_mapper(path: &Path) -> Result<MapperSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading mapper {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing mapper {}", path.display()))
}

fn print_statements(config: &Configuration) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Statement", "Kind", "Type", "Cache", "Dynamic"]);
    for id in config.statement_ids() {
        let ms = config.statement(id)?;
        table.add_row(vec![
            ms.id.clone(),
            format!("{:?}", ms.kind).to_lowercase(),
            format!("{:?}", ms.statement_type).to_lowercase(),
            ms.cache.clone().unwrap_or_else(|| "-".into()),
            ms.sql_source.is_dynamic().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn render(config: &Configuration, id: &str, params: &str, bounds: RowBounds) -> Result<()> {
    let ms = config.statement(id)?;
    let json: serde_json::Value = serde_json::from_str(params).context("parsing --params")?;
    let parameter = wrap_collection(&Value::from_json(json));

    let bound_sql = ms.bound_sql(&parameter, config.settings().database_id.as_deref())?;
    let stmt = BoundStatement::prepare(&ms, &bound_sql, config.type_handlers())?;
    let key = fingerprint(config, &ms, bounds, &bound_sql)?;

    println!("{} {}", "Statement:".bright_green(), ms.id.bright_cyan());
    println!("{} {}", "SQL:".bright_green(), stmt.sql);

    if !stmt.params.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["#", "Property", "Mode", "Value", "Type"]);
        for (i, param) in stmt.params.iter().enumerate() {
            table.add_row(vec![
                (i + 1).to_string(),
                param.property.clone(),
                param.mode.to_string(),
                param.value.to_string(),
                param.value.type_name().to_string(),
            ]);
        }
        println!("{table}");
    }

    println!("{} {}", "Cache key:".bright_green(), key.to_string().bright_yellow());
    Ok(())
}
