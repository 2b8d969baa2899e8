//! # sbx: command line client for the SBX row API
//!
//! - `sbx find <model> [--where EXPR] [--key K]... [--fetch M]...`: query rows.
//! - `sbx delete <model> --key K...`: delete rows by key.
//! - `sbx run <script> [--params JSON]`: run a cloud script.
//!
//! Settings come from `sbx.toml` (or `--config`) and the `SBX_*` environment
//! variables.

mod filter;

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbx_client::{ClientConfig, SbxService};
use sbx_core::{compile, Action, QueryBuilder};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "sbx", version, about = "Query an SBX backend", long_about = None)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "sbx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find rows of a model.
    Find {
        model: String,

        /// Filter expression, e.g. `age >= 30 AND name STARTSWITH "Am"`.
        #[arg(long = "where")]
        filter: Option<String>,

        /// Row keys to look up (repeatable). Excludes `--where`.
        #[arg(long = "key", conflicts_with = "filter")]
        keys: Vec<String>,

        /// Referenced models to resolve (repeatable).
        #[arg(long)]
        fetch: Vec<String>,

        /// Rows per page (1-250).
        #[arg(long, default_value_t = 100)]
        page_size: u32,

        /// Load only this page instead of every page.
        #[arg(long)]
        page: Option<u32>,

        /// Print the request body instead of sending it.
        #[arg(long)]
        dry_run: bool,

        /// Print rows as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Delete rows by key.
    Delete {
        model: String,

        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },

    /// Run a cloud script and print its response.
    Run {
        script: String,

        /// Script parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sbx_cli=info,sbx_client=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(cli)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = ClientConfig::load(&cli.config)?.with_env()?;

    match cli.command {
        Commands::Find {
            model,
            filter,
            keys,
            fetch,
            page_size,
            page,
            dry_run,
            json,
        } => {
            let args = FindArgs {
                filter,
                keys,
                fetch,
                page_size,
            };

            if dry_run {
                let mut query = QueryBuilder::new(Action::Find, config.domain, model);
                args.apply(&mut query)?;
                query.set_page(page.unwrap_or(1));
                println!("{}", serde_json::to_string_pretty(&request_body(&query)?)?);
                return Ok(());
            }

            let svc = SbxService::from_config(&config)?;
            let mut find = svc.find(model);
            args.apply(find.query_mut())?;

            let (rows, error) = match page {
                Some(n) => {
                    let response = find.load_page(n).await?;
                    if !response.success {
                        return Err(sbx_core::Error::Server(response.error).into());
                    }
                    tracing::info!("page {} of {:?}", n, response.total_pages);
                    (response.results.unwrap_or_default(), None)
                }
                None => {
                    let out = find.load_all().await;
                    (out.rows, out.error)
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", render_table(&rows));
            }

            if let Some(e) = error {
                return Err(format!("incomplete result, {} rows loaded: {}", rows.len(), e).into());
            }
        }

        Commands::Delete { model, keys } => {
            let svc = SbxService::from_config(&config)?;
            let mut query = svc.delete(&model);
            for key in &keys {
                query.add_key(key)?;
            }
            svc.execute(&query).await?;
            println!("Deleted {} row(s) from {}", keys.len(), model);
        }

        Commands::Run { script, params } => {
            let params: Value = serde_json::from_str(&params)
                .map_err(|e| format!("--params is not valid JSON: {}", e))?;
            let svc = SbxService::from_config(&config)?;

            let request = svc.run_cloud_script::<Value>(&script, params);
            let pending = request.send().ok_or("script is already running")?;

            tokio::select! {
                result = pending => {
                    println!("{}", serde_json::to_string_pretty(&result?)?);
                }
                _ = tokio::signal::ctrl_c() => {
                    request.cancel();
                    return Err(format!("script {} cancelled", script).into());
                }
            }
        }
    }

    Ok(())
}

struct FindArgs {
    filter: Option<String>,
    keys: Vec<String>,
    fetch: Vec<String>,
    page_size: u32,
}

impl FindArgs {
    fn apply(&self, query: &mut QueryBuilder) -> CliResult<()> {
        if self.filter.is_some() && !self.keys.is_empty() {
            return Err("--where and --key cannot be combined".into());
        }
        query.set_page_size(self.page_size);
        query.set_fetch(
            self.fetch
                .iter()
                .flat_map(|m| m.split(','))
                .map(str::trim)
                .filter(|m| !m.is_empty()),
        );

        if let Some(expr) = &self.filter {
            for group in filter::parse(expr)? {
                query.new_group(group.combinator)?;
                for condition in group.conditions {
                    query.push_condition(condition)?;
                }
            }
        }
        for key in &self.keys {
            query.add_key(key)?;
        }
        Ok(())
    }
}

/// The body the HTTP transport would send for `query`.
fn request_body(query: &QueryBuilder) -> CliResult<Value> {
    let wire = compile(query);
    let mut body = wire.to_json()?;
    if !wire.fetch.is_empty() {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("fetch".into(), serde_json::json!(wire.fetch));
        }
    }
    Ok(body)
}

fn render_table(rows: &[Value]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }

    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            columns.extend(obj.keys().map(String::as_str));
        }
    }
    let mut header: Vec<&str> = Vec::with_capacity(columns.len());
    if columns.remove("_KEY") {
        header.push("_KEY");
    }
    header.extend(columns);

    let mut builder = Builder::default();
    builder.push_record(header.iter().map(|c| c.to_string()));
    for row in rows {
        builder.push_record(header.iter().map(|c| cell(row.get(*c))));
    }

    let mut table = builder.build();
    table.with(Style::modern());
    table.to_string()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
