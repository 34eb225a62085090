//! starport-db - operator tool for the Starport database layer
//!
//! Compiles templates for a backend, checks connectivity, installs the
//! store schema and runs ad-hoc template queries.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use starport_db::dialect::dialect_for;
use starport_db::template::TemplateCompiler;
use starport_db::{BackendKind, Connection, ConnectionConfig, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "starport-db")]
#[command(about = "Starport database layer operator tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to connect: a YAML config file, optionally overridden by flags
#[derive(clap::Args)]
struct Target {
    /// Connection config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend kind (postgres, sqlite, mysql)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Connection URL or database path
    #[arg(short, long)]
    target: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template to a backend's native SQL
    Compile {
        /// Template with {N} placeholders
        template: String,

        /// Backend kind
        #[arg(short, long, default_value = "postgres")]
        backend: BackendKind,
    },

    /// Open a connection and run a trivial statement
    Ping {
        #[command(flatten)]
        target: Target,
    },

    /// Create the game store tables
    Install {
        #[command(flatten)]
        target: Target,
    },

    /// Run a template query and print the rows
    Query {
        /// Template with {N} placeholders
        template: String,

        /// Bind values in placeholder order (`null`, `true`, `42`, `1.5`, `text:42`, ...)
        #[arg(long = "bind")]
        binds: Vec<String>,

        #[command(flatten)]
        target: Target,
    },
}

fn load_config(target: Target) -> anyhow::Result<ConnectionConfig> {
    let mut config = match &target.config {
        Some(path) => read_config(path)?,
        None => ConnectionConfig::default(),
    };
    if let Some(backend) = target.backend {
        config.backend = backend;
    }
    if let Some(url) = target.target {
        config.target = url;
    }
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<ConnectionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a bind argument; `text:` forces a string
fn parse_bind(raw: &str) -> Value<'_> {
    if let Some(text) = raw.strip_prefix("text:") {
        return Value::Text(text);
    }
    match raw {
        "null" | "NULL" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Int64(n)
            } else if let Ok(x) = raw.parse::<f64>() {
                Value::Float64(x)
            } else {
                Value::Text(raw)
            }
        }
    }
}

fn open(target: Target) -> anyhow::Result<Connection> {
    let config = load_config(target)?;
    let conn = Connection::open(config.clone())
        .with_context(|| format!("opening {} at {}", config.backend, config.redacted_target()))?;
    Ok(conn)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { template, backend } => {
            let compiler = TemplateCompiler::new(dialect_for(backend).placeholder_style());
            let compiled = compiler.compile(&template)?;
            println!("{}", compiled.sql());
            if !compiled.placeholders().is_empty() {
                let order: Vec<String> = compiled
                    .placeholders()
                    .iter()
                    .map(|i| format!("{{{}}}", i))
                    .collect();
                eprintln!("binds: {}", order.join(" "));
            }
        }

        Commands::Ping { target } => {
            let mut conn = open(target)?;
            let started = Instant::now();
            let mut cursor = conn.query("SELECT 1", &[])?;
            cursor.advance()?;
            let one = cursor.get_i64(0)?;
            cursor.finalize();
            println!(
                "{} ok ({} µs, SELECT 1 = {})",
                conn.kind(),
                started.elapsed().as_micros(),
                one
            );
            conn.close()?;
        }

        Commands::Install { target } => {
            let mut conn = open(target)?;
            starport_store::schema::install(&mut conn)?;
            println!("schema installed on {}", conn.kind());
            conn.close()?;
        }

        Commands::Query {
            template,
            binds,
            target,
        } => {
            let mut conn = open(target)?;
            let params: Vec<Value<'_>> = binds.iter().map(|b| parse_bind(b)).collect();

            let mut cursor = conn.query(&template, &params)?;
            let header = (0..cursor.column_count())
                .map(|i| cursor.column_name(i).map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", header.join("\t"));

            let mut rows = 0usize;
            while cursor.advance()? {
                let line = (0..cursor.column_count())
                    .map(|i| cursor.cell(i).map(|c| c.to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                println!("{}", line.join("\t"));
                rows += 1;
            }
            cursor.finalize();
            eprintln!("({} rows)", rows);
            conn.close()?;
        }
    }

    Ok(())
}
