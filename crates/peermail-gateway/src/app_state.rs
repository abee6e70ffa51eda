//! Shared application state for the peermail gateway.
//!
//! Wires the room registry, gate, mailbox and both pipelines from one
//! validated config. Startup errors are returned, never panicked on.

use std::sync::Arc;

use tokio::sync::mpsc;

use peermail_core::error::Result;

use crate::config::GatewayConfig;
use crate::gate::{GateEngine, JsonFileStore, Whitelist};
use crate::mailbox::{InMemoryMailbox, Mailbox};
use crate::pipeline::{InboundPipeline, Router};
use crate::room::{RoomEvent, RoomRegistry};

/// Room event channel depth shared by every room.
const ROOM_EVENT_QUEUE: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<GatewayConfig>,
    rooms: Arc<RoomRegistry>,
    gate: Arc<GateEngine>,
    whitelist: Arc<Whitelist>,
    mailbox: Arc<dyn Mailbox>,
    router: Arc<Router>,
    inbound: Arc<InboundPipeline>,
}

impl AppState {
    /// Build state backed by the configured JSON files and an in-memory
    /// mailbox. The returned receiver feeds `InboundPipeline::run`.
    pub fn new(cfg: GatewayConfig) -> Result<(Self, mpsc::Receiver<RoomEvent>)> {
        cfg.validate()?;
        let gate = GateEngine::new(Box::new(JsonFileStore::new(cfg.gate.rules_path.clone())));
        let whitelist = Whitelist::new(Box::new(JsonFileStore::new(cfg.gate.whitelist_path.clone())));

        // surface unreadable stores at boot rather than on first message
        let rules = gate.list()?;
        let allowed = whitelist.list()?;
        tracing::info!(rules = rules.len(), whitelist = allowed.len(), "gate loaded");

        Ok(Self::with_parts(
            cfg,
            gate,
            whitelist,
            Arc::new(InMemoryMailbox::new()),
        ))
    }

    /// Build state from explicit collaborators.
    pub fn with_parts(
        cfg: GatewayConfig,
        gate: GateEngine,
        whitelist: Whitelist,
        mailbox: Arc<dyn Mailbox>,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(ROOM_EVENT_QUEUE);
        let rooms = Arc::new(RoomRegistry::new(tx));
        let gate = Arc::new(gate);
        let whitelist = Arc::new(whitelist);

        let router = Arc::new(Router::new(Arc::clone(&rooms), cfg.peers.ack_timeout()));
        let inbound = Arc::new(InboundPipeline::new(
            Arc::clone(&rooms),
            Arc::clone(&gate),
            Arc::clone(&whitelist),
            Arc::clone(&mailbox),
        ));

        let state = Self {
            cfg: Arc::new(cfg),
            rooms,
            gate,
            whitelist,
            mailbox,
            router,
            inbound,
        };
        (state, rx)
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.cfg
    }

    pub fn rooms(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.rooms)
    }

    pub fn gate(&self) -> Arc<GateEngine> {
        Arc::clone(&self.gate)
    }

    pub fn whitelist(&self) -> Arc<Whitelist> {
        Arc::clone(&self.whitelist)
    }

    pub fn mailbox(&self) -> Arc<dyn Mailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    pub fn inbound(&self) -> Arc<InboundPipeline> {
        Arc::clone(&self.inbound)
    }
}
