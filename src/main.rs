use anyhow::{bail, Context, Result};
use azrec::azure::client::ArmClient;
use azrec::config::ProviderConfig;
use azrec::resource::id::ResourceId;
use azrec::resource::route_table::RouteTables;
use azrec::resource::servicebus::TopicAuthorizationRules;
use azrec::resource::Reconcile;
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Declarative reconciliation for Azure resources
#[derive(Parser, Debug)]
#[command(name = "azrec", version, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update resources from desired-state files
    Apply {
        /// Resource kind the files describe
        #[arg(short, long, value_enum)]
        kind: ResourceKind,

        /// Desired-state files (JSON, or YAML by extension)
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Treat the resources as brand new: fail when a counterpart
        /// already exists remotely instead of updating it
        #[arg(long)]
        new: bool,
    },
    /// Print the current state of a resource as JSON
    Read {
        /// ARM resource identifier
        id: String,
    },
    /// Delete a resource
    Delete {
        /// ARM resource identifier
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResourceKind {
    RouteTable,
    TopicRule,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = ProviderConfig::load();
    let client = config.build_client()?;

    match args.command {
        Command::Apply { kind, files, new } => apply(client, kind, &files, new).await,
        Command::Read { id } => read(client, &id).await,
        Command::Delete { id } => delete(client, &id).await,
    }
}

async fn apply(client: ArmClient, kind: ResourceKind, files: &[PathBuf], new: bool) -> Result<()> {
    match kind {
        ResourceKind::RouteTable => apply_all(RouteTables::new(client), files, new).await,
        ResourceKind::TopicRule => {
            apply_all(TopicAuthorizationRules::new(client), files, new).await
        }
    }
}

/// Apply every desired-state file through one handler, concurrently
async fn apply_all<H>(handler: H, files: &[PathBuf], new: bool) -> Result<()>
where
    H: Reconcile,
    H::Desired: DeserializeOwned,
{
    let tasks = files.iter().map(|path| {
        let handler = &handler;
        async move {
            let desired: H::Desired = load_desired(path)?;

            let id = if new {
                handler.create(&desired).await
            } else {
                handler.update(&desired).await
            }
            .with_context(|| format!("Failed to apply {}", path.display()))?;

            println!("{id}");
            Ok::<_, anyhow::Error>(())
        }
    });

    futures::future::try_join_all(tasks).await?;
    Ok(())
}

/// Parse a desired-state file, selecting the format by extension
fn load_desired<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} as YAML", path.display())),
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {} as JSON", path.display())),
    }
}

async fn read(client: ArmClient, id: &str) -> Result<()> {
    match provider_of(id)?.as_str() {
        "Microsoft.Network" => print_state(RouteTables::new(client).read(id).await?),
        "Microsoft.ServiceBus" => print_state(TopicAuthorizationRules::new(client).read(id).await?),
        other => bail!("unsupported provider {other:?} in resource id"),
    }
}

async fn delete(client: ArmClient, id: &str) -> Result<()> {
    match provider_of(id)?.as_str() {
        "Microsoft.Network" => RouteTables::new(client).delete(id).await?,
        "Microsoft.ServiceBus" => TopicAuthorizationRules::new(client).delete(id).await?,
        other => bail!("unsupported provider {other:?} in resource id"),
    }

    tracing::info!("deleted {}", id);
    Ok(())
}

fn provider_of(id: &str) -> Result<String> {
    let parsed = ResourceId::parse(id)?;
    parsed
        .provider
        .context("resource id carries no provider segment")
}

fn print_state<T: Serialize>(state: Option<T>) -> Result<()> {
    match state {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => {
            tracing::warn!("resource no longer exists");
            println!("null");
        }
    }
    Ok(())
}
