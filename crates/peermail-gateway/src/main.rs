//! peermail gateway binary.
//!
//! - SMTP ingress and POP3 egress on loopback by default
//! - Optional direct-TCP peer listener plus configured dial targets
//! - Ctrl+C / SIGTERM destroys every room before exit

use std::sync::Arc;

use futures_util::future::select_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use peermail_core::address::RoomId;
use peermail_core::error::{PeerMailError, Result};
use peermail_gateway::app_state::AppState;
use peermail_gateway::smtp::MailSink;
use peermail_gateway::transport::tcp;
use peermail_gateway::{config, pop3, smtp};

const DEFAULT_CONFIG: &str = "peermail.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = config::load_from_file(&path)?;
    let smtp_addr = cfg.smtp.listen_addr()?;
    let pop3_addr = cfg.pop3.listen_addr()?;
    let hostname: Arc<str> = Arc::from(cfg.smtp.hostname.as_str());
    let max_message_bytes = cfg.smtp.max_message_bytes;

    let (state, events) = AppState::new(cfg)?;
    tracing::info!(config = %path, smtp = %smtp_addr, pop3 = %pop3_addr, "peermail-gateway starting");

    let inbound = tokio::spawn(state.inbound().run(events));

    let sink: Arc<dyn MailSink> = state.router();
    let mut surfaces: Vec<JoinHandle<Result<()>>> = vec![
        tokio::spawn(smtp::server::run(smtp_addr, hostname, max_message_bytes, sink)),
        tokio::spawn(pop3::server::run(pop3_addr, state.mailbox())),
    ];

    if let Some(listen) = &state.cfg().peers.listen {
        let listener = TcpListener::bind(listen.as_str()).await?;
        surfaces.push(tokio::spawn(tcp::listen(listener, state.rooms())));
    }

    let mut dialers = Vec::new();
    for target in &state.cfg().peers.dial {
        let room_id = RoomId::parse(&target.room)?;
        tracing::info!(room = %room_id, addr = %target.addr, "dialing peer");
        dialers.push(tokio::spawn(tcp::dial_loop(
            state.rooms(),
            room_id,
            target.addr.clone(),
        )));
    }

    let outcome = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        (res, idx, _) = select_all(surfaces.iter_mut()) => match res {
            Ok(Ok(())) => {
                tracing::warn!(surface = idx, "listener exited");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(surface = idx, error = %e, "listener failed");
                Err(e)
            }
            Err(e) => Err(PeerMailError::Internal(format!("listener task failed: {e}"))),
        },
    };

    for task in &surfaces {
        task.abort();
    }
    for task in &dialers {
        task.abort();
    }
    state.rooms().destroy_all();
    inbound.abort();
    tracing::info!("peermail-gateway stopped");

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("signal received, starting graceful shutdown");
}
