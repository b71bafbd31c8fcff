// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mobile mock backend server binary

use clap::Parser;
use mb_logging::CliLoggingArgs;
use mb_rest_server::{RegistryMode, Server, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file, layered under MOCK_BACKEND_* environment variables
    #[arg(long, env = "MOCK_BACKEND_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address for the server
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Scenario YAML file or directory of files
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// How unknown scenario names are treated
    #[arg(long, value_enum)]
    registry_mode: Option<RegistryMode>,

    /// Enable CORS for development
    #[arg(long)]
    cors: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.logging.init("mb-rest-server")?;

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(path) = args.scenarios {
        config.scenarios.config_path = path;
    }
    if let Some(mode) = args.registry_mode {
        config.scenarios.registry_mode = mode;
    }
    config.enable_cors |= args.cors;
    config.validate()?;

    tracing::info!(
        scenarios = %config.scenarios.config_path.display(),
        registry_mode = ?config.scenarios.registry_mode,
        "Starting mobile mock backend"
    );

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
