//! rsacl binary
//!
//! Runs the closure cache builder over an in-process tuple store.
//!
//! # Usage
//!
//! ```bash
//! # Seed tuples, build the cache and keep it fresh until Ctrl+C
//! rsacl --config config.yaml --seed tuples.txt
//!
//! # One-shot checks against the seeded store
//! rsacl --seed tuples.txt --check 'doc:readme#viewer@alice'
//!
//! # Environment variables only
//! RSACL_USER_RELATIONS__WORKERS=8 rsacl
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use rsacl_domain::{Acl, TupleRelationChecker};
use rsacl_server::observability::{describe_metrics, init_logging, LoggingConfig};
use rsacl_server::{
    BuilderConfig, CacheBuildOrchestrator, CheckHandler, CheckRequest, DataStoreClosureCache,
    DataStoreTupleReader, ServerConfig, WriteHandler,
};
use rsacl_storage::{DataStore, MemoryDataStore};

/// rsacl - relation closure cache for tuple-based access control
#[derive(Parser, Debug)]
#[command(name = "rsacl")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// File of tuples to write on startup, one `ns:obj#rel@subject` per line
    #[arg(short, long)]
    seed: Option<String>,

    /// Check `ns:obj#rel@user`, print the answer and exit (repeatable)
    #[arg(long = "check", value_name = "TUPLE")]
    checks: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = &args.config {
        ServerConfig::load(config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from(&config.logging));
    describe_metrics();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rsacl");

    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            run(MemoryDataStore::new_shared(), &config, &args).await
        }
        other => {
            error!("Unknown storage backend: {}", other);
            anyhow::bail!("Unknown storage backend: {}", other);
        }
    }
}

async fn run<S>(storage: Arc<S>, config: &ServerConfig, args: &Args) -> anyhow::Result<()>
where
    S: DataStore + 'static,
{
    let reader = Arc::new(DataStoreTupleReader::new(Arc::clone(&storage)));
    let cache = Arc::new(DataStoreClosureCache::new(Arc::clone(&storage)));
    let checker = Arc::new(TupleRelationChecker::new(Arc::clone(&reader)));
    let orchestrator = Arc::new(CacheBuildOrchestrator::new(
        BuilderConfig::from(&config.user_relations),
        reader,
        Arc::new(config.relation_config()),
        cache,
        checker,
    ));
    orchestrator.start();

    if let Some(path) = &args.seed {
        let acls = read_seed(Path::new(path))?;
        let writer = WriteHandler::new(Arc::clone(&storage), Arc::clone(&orchestrator));
        for acl in &acls {
            writer.write(acl).await?;
        }
        info!(tuples = acls.len(), path = %path, "Seeded tuples");
    }

    if let Err(e) = orchestrator.first_time_build().await {
        error!(error = %e, "First-time closure build failed");
    }

    if args.checks.is_empty() {
        shutdown_signal().await;
    } else {
        let handler = CheckHandler::new(Arc::clone(&orchestrator));
        for check in &args.checks {
            let request = parse_check(check)?;
            let response = handler.check(&request).await?;
            println!(
                "{check}: {} ({:?})",
                if response.allowed { "allowed" } else { "denied" },
                response.source
            );
        }
    }

    orchestrator.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Reads tuples from `path`, skipping blank lines and `//` comments.
fn read_seed(path: &Path) -> anyhow::Result<Vec<Acl>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("//"))
        .map(|(number, line)| {
            Acl::parse(line).with_context(|| format!("{}:{number}", path.display()))
        })
        .collect()
}

/// Parses `ns:obj#rel@user` into a check request.
fn parse_check(value: &str) -> anyhow::Result<CheckRequest> {
    let acl = Acl::parse(value).with_context(|| format!("invalid check: {value}"))?;
    let user = acl
        .principal()
        .with_context(|| format!("check subject must be a user: {value}"))?;
    Ok(CheckRequest::new(user, &acl.namespace, &acl.object, &acl.relation))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
