//! mpv-remote - Rust Implementation
//!
//! Remote-control HTTP bridge for a running mpv player.

use mpv_remote::{api, config, notify, player, snapshot, system};

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::CliArgs::parse(std::env::args().skip(1))?;
    if cli.help {
        println!("{}", config::USAGE);
        return Ok(());
    }

    // Load configuration
    let config = config::load_config(&cli)?;

    // Initialize logging
    let default_filter = if config.verbose {
        "mpv_remote=debug,tower_http=debug"
    } else {
        "mpv_remote=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting mpv-remote v{} ({})",
        env!("MPVR_VERSION"),
        env!("MPVR_GIT_SHA")
    );
    tracing::info!("Configuration loaded, socket: {}", config.socket);

    // Connect to mpv
    let client = player::mpv::MpvClient::connect(
        &config.socket,
        player::mpv::MpvOptions {
            response_timeout: config.response_timeout(),
            ..Default::default()
        },
    )
    .await
    .context("Failed to start mpv connection")?;
    let player: player::SharedPlayer = Arc::new(client);

    let shutdown = CancellationToken::new();

    // OSD queue and change-event translation
    let osd = notify::OsdDispatcher::spawn(
        player.clone(),
        config.osd_messages,
        config.osd_queue_capacity,
        shutdown.clone(),
    );
    let translator = notify::NotificationTranslator::new(player.clone(), osd.clone());
    let translator_task = tokio::spawn(translator.run(shutdown.clone()));
    tracing::info!("Notification translator started");

    // Snapshot aggregator
    let aggregator = Arc::new(snapshot::Aggregator::new(
        player.clone(),
        Arc::new(snapshot::SnapshotCache::new()),
        config.status_deadline(),
    ));

    // Bind the first free port in the configured range
    let listener = bind_first_free(&config).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", local_addr);

    let remote_ip = advertised_ip(&config).await;
    let state = api::AppState::new(
        player,
        aggregator,
        Arc::new(system::ShellSystemActions::from_env()),
        Arc::new(config),
    );
    let app = api::router(state);

    osd.send(
        notify::OsdMessage::new(
            notify::OsdKind::Startup,
            format!("Remote access on: {}:{}", remote_ip, local_addr.port()),
        )
        .with_duration(Duration::from_secs(5)),
    )
    .await;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stopping background tasks...");
    shutdown.cancel();
    if let Err(e) = translator_task.await {
        tracing::warn!("Notification translator ended abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

fn listen_ip(config: &config::Config) -> Result<IpAddr> {
    match config.address.as_deref() {
        Some(address) if !address.is_empty() => address
            .parse()
            .with_context(|| format!("Invalid listen address: {}", address)),
        _ => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
    }
}

async fn bind_first_free(config: &config::Config) -> Result<TcpListener> {
    let ip = listen_ip(config)?;
    for port in config.ports() {
        match TcpListener::bind(SocketAddr::new(ip, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::debug!("Port {} unavailable: {}", port, e),
        }
    }
    anyhow::bail!(
        "There is no free port available between {} and {}, mpv-remote not started check your settings.",
        config.webport,
        config.webportrangeend
    )
}

/// Address shown to the user: the configured one, else the LAN address of the
/// default route, else loopback
async fn advertised_ip(config: &config::Config) -> IpAddr {
    if let Ok(ip) = listen_ip(config) {
        if !ip.is_unspecified() {
            return ip;
        }
    }
    // Connecting a UDP socket sends nothing; it only selects the outgoing interface
    let probe = async {
        let socket = tokio::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).await?;
        socket.local_addr().map(|addr| addr.ip())
    };
    match probe.await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!("Could not determine LAN address: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
