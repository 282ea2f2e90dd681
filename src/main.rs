//! # crudkit
//!
//! Demo catalog server: loads settings, builds the repository factory for the
//! configured backend and serves the catalog resources over HTTP.

#![deny(unsafe_code)]

mod catalog;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crudkit_store::RepositoryFactory;
use secrecy::SecretString;

use crate::settings::Settings;

/// Catalog server over the crudkit repository layer.
#[derive(Parser, Debug)]
#[command(name = "crudkit", about = "Catalog CRUD/search server")]
struct Cli {
    /// Settings file (defaults to `~/.crudkit/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Storage backend: relational, tables or memory.
    #[arg(long)]
    backend: Option<String>,

    /// Database path (relational) or account label (tables).
    #[arg(long)]
    connection_string: Option<String>,

    /// Default log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Human-readable logs instead of JSON lines.
    #[arg(long)]
    plain_logs: bool,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(backend) = self.backend {
            settings.storage.backend = backend;
        }
        if let Some(conn) = self.connection_string {
            settings.storage.connection_string = Some(SecretString::from(conn));
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        if self.plain_logs {
            settings.log_json = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let path = cli.config.take().unwrap_or_else(settings::settings_path);
    let mut settings = settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    crudkit_telemetry::init_telemetry(&settings.telemetry_config());

    let storage = settings.storage_config()?;
    let factory = Arc::new(
        RepositoryFactory::from_config(&storage, catalog::register)
            .context("Failed to configure storage backend")?,
    );
    tracing::info!(backend = %storage.backend, "storage configured");

    let routes = catalog::routes(&factory, &settings);
    let handle = crudkit_server::start(settings.server_config(), routes)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = handle.port, "crudkit ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "crudkit",
            "--port",
            "9999",
            "--backend",
            "relational",
            "--connection-string",
            "/tmp/catalog.db",
            "--plain-logs",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(!settings.log_json);
        let storage = settings.storage_config().unwrap();
        assert_eq!(storage.backend, crudkit_store::BackendType::Relational);
        assert!(storage.connection_string.is_some());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
