use clap::Parser;

use lumber_config_hcl::HclParser;
use lumber_engine::bootstrap::{ConsumerOutcome, Engine};
use lumber_engine::config::{ConfigParser, LumberConfig, TomlParser};
use lumber_engine::registry::ComponentRegistry;

#[derive(Parser)]
#[command(name = "lumber-server", about = "Per-partition log ingestion and upload")]
struct Cli {
    /// Path to the configuration file (.toml or .hcl).
    #[arg(long, default_value = "lumber.toml", env = "LUMBER_CONFIG")]
    config: String,
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    registry
        .register_source("lines", lumber_source_lines::create)
        .register_transformer("passthrough", lumber_transform_passthrough::create)
        .register_transformer("key-filter", lumber_transform_key_filter::create)
        .register_parser("json", lumber_parser_json::create)
        .register_storage("file", lumber_storage_file::create)
        .register_storage("memory", lumber_storage_memory::create)
        .register_upload("local", lumber_upload_local::create);
    registry
}

/// Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to register SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let parsers: [&dyn ConfigParser; 2] = [&TomlParser, &HclParser];
    let config = match LumberConfig::load_with(&cli.config, &parsers) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    tracing::info!(partitions = config.partitions.len(), "bootstrapping engine");
    let engine = match Engine::bootstrap(&config, &registry()) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap engine");
            std::process::exit(1);
        }
    };

    tracing::info!("lumber-server started, press Ctrl+C to stop");
    let exits = engine.run_until(shutdown_signal()).await;

    let mut failed = false;
    for exit in &exits {
        match exit.outcome {
            ConsumerOutcome::Finished(ref report) => tracing::info!(
                consumer = %exit.name,
                exit = ?report.exit,
                ticks = report.ticks,
                written = report.written,
                dropped = report.dropped,
                filtered = report.filtered,
                "consumer summary"
            ),
            ConsumerOutcome::Failed(ref e) => {
                failed = true;
                tracing::error!(consumer = %exit.name, error = %e, "consumer failed");
            }
            ConsumerOutcome::Aborted => {
                tracing::warn!(consumer = %exit.name, "consumer aborted")
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}
