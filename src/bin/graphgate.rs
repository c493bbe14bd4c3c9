//! Binary entry point for the graphgate server and its operator commands.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use graphgate::{
    backend::neo4j::Neo4jConnector,
    config::{ConfigOverrides, GatewayConfig},
    connection::ConnectionManager,
    query::{QueryGateway, QueryResults},
    server,
    stats::{GraphStats, StatsCollector, StatsReport},
};
use serde_json::{Map, Value};

#[derive(Parser, Debug)]
#[command(
    name = "graphgate",
    version,
    about = "Validated HTTP access layer over a Bolt graph database",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct BackendArgs {
    #[arg(
        long,
        global = true,
        env = "GRAPHGATE_CONFIG",
        value_name = "FILE",
        help = "TOML configuration file"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "NEO4J_URI", help = "Backend Bolt URI")]
    uri: Option<String>,

    #[arg(long, global = true, env = "NEO4J_USER", help = "Backend username")]
    user: Option<String>,

    #[arg(
        long,
        global = true,
        env = "NEO4J_PASSWORD",
        hide_env_values = true,
        help = "Backend password"
    )]
    password: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "MS",
        help = "Per-statement deadline in milliseconds"
    )]
    statement_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Serve the HTTP API")]
    Serve(ServeCmd),

    #[command(about = "Print node/relationship counts, labels and relationship types")]
    Stats,

    #[command(about = "Run a raw statement and print its rows")]
    Query(QueryCmd),

    #[command(about = "Print the resolved configuration (password redacted)")]
    Config,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, help = "Interface to bind")]
    host: Option<IpAddr>,

    #[arg(long, help = "Port to bind")]
    port: Option<u16>,

    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        help = "Allow cross-origin requests from ORIGIN (repeatable)"
    )]
    allow_origins: Vec<String>,
}

#[derive(Args, Debug)]
struct QueryCmd {
    #[arg(value_name = "STATEMENT")]
    statement: String,

    #[arg(long, value_name = "JSON", help = "Statement parameters as a JSON object")]
    params: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    server::install_tracing_subscriber();

    let mut overrides = ConfigOverrides {
        uri: cli.backend.uri,
        user: cli.backend.user,
        password: cli.backend.password,
        statement_timeout_ms: cli.backend.statement_timeout_ms,
        ..ConfigOverrides::default()
    };
    if let Command::Serve(cmd) = &cli.command {
        overrides.host = cmd.host;
        overrides.port = cmd.port;
        overrides.allow_origins = cmd.allow_origins.clone();
    }
    let mut config = GatewayConfig::load(cli.backend.config.as_deref())?;
    config.apply(overrides)?;

    match cli.command {
        Command::Serve(_) => server::serve(config).await?,
        Command::Stats => {
            let connections = connect(&config);
            let outcome = StatsCollector::new(Arc::clone(&connections)).get_stats().await;
            connections.shutdown().await;
            let report = StatsReport { stats: outcome? };
            emit(&cli.format, &report, |_| print_stats_text(&report.stats))?;
        }
        Command::Query(cmd) => {
            let parameters = parse_params(cmd.params.as_deref())?;
            let connections = connect(&config);
            let outcome = QueryGateway::new(Arc::clone(&connections))
                .execute(&cmd.statement, parameters)
                .await;
            connections.shutdown().await;
            let results = outcome?;
            emit(&cli.format, &results, |_| print_query_text(&results))?;
        }
        Command::Config => {
            let redacted = config.redacted();
            emit(&cli.format, &redacted, |_| print_config_text(&redacted))?;
        }
    }

    Ok(())
}

fn connect(config: &GatewayConfig) -> Arc<ConnectionManager<Neo4jConnector>> {
    Arc::new(ConnectionManager::new(
        Neo4jConnector::new(config.backend.clone()),
        config.statement_timeout(),
    ))
}

fn parse_params(raw: Option<&str>) -> Result<Map<String, Value>, Box<dyn Error>> {
    match raw {
        None => Ok(Map::new()),
        Some(text) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            _ => Err("--params must be a JSON object".into()),
        },
    }
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_stats_text(stats: &GraphStats) {
    println!(
        "Graph: nodes={} relationships={}",
        stats.node_count, stats.relationship_count
    );
    println!("Labels: {}", join_or_none(&stats.labels));
    println!("Relationship types: {}", join_or_none(&stats.relationship_types));
}

fn print_query_text(results: &QueryResults) {
    for row in &results.results {
        println!("{}", Value::Object(row.clone()));
    }
    let noun = if results.count == 1 { "row" } else { "rows" };
    println!("({} {noun})", results.count);
}

fn print_config_text(config: &GatewayConfig) {
    println!("[backend]");
    println!("uri = {}", config.backend.uri);
    println!("user = {}", config.backend.user);
    println!("password = {}", config.backend.password);
    println!("max_connections = {}", config.backend.max_connections);
    println!("fetch_size = {}", config.backend.fetch_size);
    println!("statement_timeout_ms = {}", config.backend.statement_timeout_ms);
    println!();
    println!("[server]");
    println!("host = {}", config.server.host);
    println!("port = {}", config.server.port);
    println!("allow_origins = {}", join_or_none(&config.server.allow_origins));
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}
