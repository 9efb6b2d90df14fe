//! Serve command - Run the shadow server

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shadowvm_config::{Config, ServerSection};
use shadowvm_server::analysis::builtin::{EventCounts, register_builtins};
use shadowvm_server::{AnalysisRegistry, ServerConfig, ShadowServer};

/// Serve command arguments
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen port, overrides `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address, overrides `server.address`
    #[arg(long)]
    pub address: Option<String>,

    /// Log every request (needs log level debug)
    #[arg(long)]
    pub debug: bool,
}

/// Runtime server settings from the `[server]` section
pub fn server_config(section: &ServerSection) -> ServerConfig {
    ServerConfig {
        address: section.address.clone(),
        port: section.port,
        debug: section.debug,
        buffer_size: section.buffer_size,
        max_message_size: section.max_message_size,
        nodelay: section.nodelay,
        keepalive: section.keepalive,
        socket_buffer_size: section.socket_buffer_size,
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs, config: Config) -> Result<()> {
    let mut server_config = server_config(&config.server);
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(address) = args.address {
        server_config.address = address;
    }
    server_config.debug |= args.debug;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        address = %server_config.bind_address(),
        "ShadowVM starting"
    );

    let counts = EventCounts::new();
    let mut registry = AnalysisRegistry::new();
    register_builtins(&mut registry, &counts);

    let server = ShadowServer::new(server_config, registry);
    let metrics = server.metrics();
    let cancel = CancellationToken::new();
    let mut server_task = tokio::spawn(server.run(cancel.clone()));

    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping server...");
            cancel.cancel();
            server_task
                .await
                .context("server task panicked")?
                .context("server error")?;
        }
        result = &mut server_task => {
            // Only returns early on bind failure
            if let Err(e) = result.context("server task panicked")? {
                error!(error = %e, "server error");
                return Err(e.into());
            }
        }
    }

    let metrics = metrics.snapshot();
    let counts = counts.snapshot();
    info!(
        sessions = metrics.connections_total,
        failed = metrics.sessions_failed,
        messages = metrics.messages_received,
        analysis_errors = metrics.analysis_errors,
        events_counted = counts.total_invocations(),
        objects_freed = counts.frees,
        "ShadowVM shutdown complete"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
