// src/main.rs

use axum::serve;
use key_rotation_manager::{
    cli::{Cli, Commands, KeyCommands},
    config::load_config,
    resolve_config_path, run, AppConfig, AppError, KeyRegistry,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(json_logs: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse_args();
    init_tracing(cli.json_logs);

    match cli.command {
        None => serve_app(cli.config, None).await,
        Some(Commands::Serve { port }) => serve_app(cli.config, port).await,
        Some(Commands::Config { file, verbose }) => validate_config(file.or(cli.config), verbose),
        Some(Commands::Keys {
            action: KeyCommands::List,
        }) => list_keys(cli.config),
    }
}

async fn serve_app(config_path: Option<PathBuf>, port: Option<u16>) -> Result<(), AppError> {
    let (app, config) = run(config_path).await.map_err(|e| {
        eprintln!("Application setup error: {e}");
        e
    })?;

    let addr = bind_address(&config, port)?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(server.address = %addr, error = ?e, "Failed to bind to address. Exiting.");
        AppError::from(e)
    })?;
    info!(server.address = %addr, "Server listening");

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = ?e, "Server run loop encountered an error. Exiting.");
            AppError::from(e)
        })?;

    info!("Server shut down gracefully.");
    Ok(())
}

fn bind_address(config: &AppConfig, port: Option<u16>) -> Result<SocketAddr, AppError> {
    let port = port.unwrap_or(config.server.port);
    format!("{}:{}", config.server.host, port)
        .parse::<SocketAddr>()
        .map_err(|e| {
            AppError::config_validation(
                format!("Invalid bind address {}:{}: {e}", config.server.host, port),
                Some("server.host"),
            )
        })
}

fn validate_config(file: Option<PathBuf>, verbose: bool) -> Result<(), AppError> {
    let path = resolve_config_path(file);
    let config = load_config(&path)?;

    println!("Configuration is valid: {}", path.display());
    println!(
        "  services: {}  failure threshold: {}  block duration: {}s",
        config.service_names().join(", "),
        config.rotation.failure_threshold,
        config.rotation.block_duration_secs
    );

    if verbose {
        let rendered = serde_yaml::to_string(&config).map_err(|e| AppError::internal(e.to_string()))?;
        println!("{rendered}");
    }
    Ok(())
}

fn list_keys(config_path: Option<PathBuf>) -> Result<(), AppError> {
    let config = load_config(&resolve_config_path(config_path))?;
    let registry = KeyRegistry::from_config(&config);

    for name in config.service_names() {
        let status = registry.service_status(&name);
        println!("{name}: {} key(s)", status.total_keys);
        for key in &status.keys {
            println!("  [{}] {}", key.index, key.key_preview);
        }
    }
    Ok(())
}
