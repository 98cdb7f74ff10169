//! remote-unpack server
//!
//! # Usage
//!
//! ```bash
//! ru-server
//! ru-server --host 0.0.0.0 --port 1337 --destination /srv/unpacked
//! ru-server --config /etc/remote-unpack.json
//! RUST_LOG=debug ru-server --unrar /opt/rar/unrar
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use remote_unpack::config::Config;
use remote_unpack::extraction::{Extractor, NoOpExtractor, UnrarExtractor};
use remote_unpack::logging::init_tracing;
use remote_unpack::server::{Server, wait_for_signal};

/// Remote unpack server
#[derive(Parser, Debug)]
#[command(name = "ru-server", version)]
#[command(about = "List directories and unpack RAR archives for remote clients")]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long, env = "RU_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the unrar executable
    #[arg(long)]
    unrar: Option<PathBuf>,

    /// Extract every archive into this directory instead of next to it
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Protocol version to accept
    #[arg(long)]
    protocol: Option<String>,

    /// Close each connection after its first request
    #[arg(long)]
    single_shot: bool,
}

impl Args {
    fn into_config(self) -> remote_unpack::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(unrar) = self.unrar {
            config.tools.unrar_path = Some(unrar);
        }
        if let Some(destination) = self.destination {
            config.unpack.destination = Some(destination);
        }
        if let Some(protocol) = self.protocol {
            config.protocol_version = protocol;
        }
        if self.single_shot {
            config.server.persistent_connections = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn select_extractor(config: &Config) -> Arc<dyn Extractor> {
    let grace = config.unpack.terminate_grace;
    if let Some(path) = &config.tools.unrar_path {
        return Arc::new(UnrarExtractor::new(path.clone()).with_terminate_grace(grace));
    }
    if config.tools.search_path
        && let Some(unrar) = UnrarExtractor::from_path()
    {
        info!(path = %unrar.binary_path().display(), "found unrar in PATH");
        return Arc::new(unrar.with_terminate_grace(grace));
    }
    warn!("unrar not found, unpack requests will fail until it is installed");
    Arc::new(NoOpExtractor)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");
    let args = Args::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let server = match Server::bind(&config, select_extractor(&config)).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, addr = %config.server.bind_address(), "failed to bind");
            eprintln!("Could not listen on {}: {e}", config.server.bind_address());
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        println!("Shutting down server...");
        shutdown.cancel();
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
