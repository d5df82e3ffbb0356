//! DataKit CLI
//!
//! Command-line interface for querying a DataKit server:
//! - Find entities matching predicates
//! - Fetch a single entity by id
//! - Count matches
//! - Generate a default config file

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use datakit::config::{generate_default_config, Config, LoggingConfig, QueryConfig};
use datakit::query::{apply_predicate, CachePolicy, Query, QueryExecutor};
use datakit::transport::HttpTransport;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "datakit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query entities stored on a DataKit server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Application secret (overrides config)
    #[arg(long, global = true)]
    secret: Option<String>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache policy (ignore_cache, cache_only, cache_else_network, network_then_cache)
    #[arg(long, global = true)]
    cache_policy: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print all matching entities as a JSON array
    Find(FilterArgs),

    /// Print the first matching entity, or null
    First(FilterArgs),

    /// Print the entity with the given id, or null
    Get {
        /// Entity collection
        entity: String,
        /// Entity id
        id: String,
    },

    /// Print the number of matching entities
    Count(FilterArgs),

    /// Write a default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Entity collection
    entity: String,

    /// Predicate every result must match, e.g. "age >= 18"
    #[arg(short = 'w', long = "where", value_name = "EXPR")]
    filters: Vec<String>,

    /// Predicates combined into one OR group
    #[arg(long, value_name = "EXPR")]
    or: Vec<String>,

    /// Predicates combined into one AND group
    #[arg(long, value_name = "EXPR")]
    and: Vec<String>,

    /// Sort ascending by key
    #[arg(long, value_name = "KEY", conflicts_with = "desc")]
    asc: Option<String>,

    /// Sort descending by key
    #[arg(long, value_name = "KEY")]
    desc: Option<String>,

    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<u32>,

    /// Number of results to skip
    #[arg(short, long)]
    skip: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Wrote default config to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    // Discovery is reported once the subscriber exists
    let (mut config, discovery) = match &cli.config {
        Some(path) => (Config::load_with_env(path)?, None),
        None => {
            let (config, discovery) = Config::discover();
            (config, Some(discovery))
        }
    };
    if let Some(url) = &cli.url {
        config.remote.base_url = url.clone();
    }
    if let Some(secret) = &cli.secret {
        config.remote.secret = Some(secret.clone());
    }
    if let Some(policy) = &cli.cache_policy {
        config.query.cache_policy = CachePolicy::from_str(policy)
            .ok_or_else(|| anyhow!("Unknown cache policy: {}", policy))?;
    }

    init_logging(&config.logging);
    if let Some(discovery) = &discovery {
        discovery.log();
    }
    tracing::debug!("Using DataKit server at {}", config.remote.base_url);

    let transport = Arc::new(HttpTransport::new(config.remote.http_transport())?);
    let executor = QueryExecutor::new(transport, tokio::runtime::Handle::current())
        .with_cache(Arc::new(config.cache.build()));

    match &cli.command {
        Commands::Find(args) => {
            let query = build_query(args, &config.query)?;
            print_json(&executor.find_all(&query).await?)?;
        }
        Commands::First(args) => {
            let query = build_query(args, &config.query)?;
            print_json(&executor.find_one(&query).await?)?;
        }
        Commands::Get { entity, id } => {
            let mut query = Query::new(entity.as_str())?;
            query.set_cache_policy(config.query.cache_policy);
            print_json(&executor.find_by_id(&query, id).await?)?;
        }
        Commands::Count(args) => {
            let query = build_query(args, &config.query)?;
            println!("{}", executor.count_all(&query).await?);
        }
        // Handled before loading config
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("datakit={}", logging.level)),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries results, so logs go to stderr
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Build a query from command-line filters
fn build_query(args: &FilterArgs, defaults: &QueryConfig) -> anyhow::Result<Query> {
    let mut query = Query::new(args.entity.as_str())?;
    query
        .set_cache_policy(defaults.cache_policy)
        .set_limit(args.limit.unwrap_or(defaults.default_limit));

    if let Some(skip) = args.skip {
        query.set_skip(skip);
    }
    if let Some(key) = &args.asc {
        query.order_ascending_by(key.as_str());
    }
    if let Some(key) = &args.desc {
        query.order_descending_by(key.as_str());
    }

    for expr in &args.filters {
        apply_predicate(&mut query, expr)?;
    }
    if !args.or.is_empty() {
        let mut scope = query.or();
        for expr in &args.or {
            apply_predicate(&mut scope, expr)?;
        }
    }
    if !args.and.is_empty() {
        let mut scope = query.and();
        for expr in &args.and {
            apply_predicate(&mut scope, expr)?;
        }
    }

    Ok(query)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
