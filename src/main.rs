use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use grpcweb_gateway::config::{load_config, validate_config, ConfigError, GatewayConfig, TlsConfig};
use grpcweb_gateway::lifecycle::{wait_for_signal, Shutdown};
use grpcweb_gateway::net;
use grpcweb_gateway::observability::{logging, metrics};
use grpcweb_gateway::rpc::ServiceRegistry;
use grpcweb_gateway::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "grpcweb-gateway", version)]
#[command(about = "Serve gRPC, gRPC-Web, websocket RPC and a static client bundle on one port", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:10000
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding the client bundle
    #[arg(long)]
    assets: Option<PathBuf>,

    /// PEM certificate chain; enables TLS together with --key
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(assets) = &self.assets {
            config.assets.root = assets.clone();
        }
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            match config.listener.tls.as_mut() {
                Some(tls) => {
                    tls.cert_path = cert.clone();
                    tls.key_path = key.clone();
                }
                None => config.listener.tls = Some(TlsConfig::new(cert, key)),
            }
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("grpcweb-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("grpcweb-gateway: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        assets = ?config.assets.root,
        origins = ?config.cors.allowed_origins,
        "grpcweb-gateway starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    // Services are registered by embedders; the standalone binary serves the
    // bundle and answers RPCs with UNIMPLEMENTED.
    let registry = ServiceRegistry::default();
    let server = HttpServer::new(config, registry)?;
    let listener = net::bind(&server.config().listener).await?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        tracing::info!(signal, "Shutdown signal received");
        shutdown.trigger();
    });

    server.run(listener, stop).await?;
    Ok(())
}
