#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use peermail_core::address::RoomId;
use peermail_core::protocol::{decode_packet, encode_packet, PeerPacket};
use peermail_gateway::app_state::AppState;
use peermail_gateway::config;
use peermail_gateway::gate::{
    GateAction, GateConditions, GateDecision, GateEngine, GateRule, MemoryStore, Whitelist,
};
use peermail_gateway::mailbox::{InMemoryMailbox, Mailbox};
use peermail_gateway::room::RoomEvent;

struct Remote {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    wr: WriteHalf<DuplexStream>,
}

impl Remote {
    /// Next packet, or `None` if nothing arrives within a second.
    async fn next_packet(&mut self) -> Option<PeerPacket> {
        match tokio::time::timeout(Duration::from_secs(1), self.lines.next_line()).await {
            Ok(line) => Some(decode_packet(&line.unwrap().unwrap()).unwrap()),
            Err(_) => None,
        }
    }
}

fn room_id() -> RoomId {
    RoomId::parse(&"ef".repeat(32)).unwrap()
}

struct Fixture {
    state: AppState,
    mailbox: Arc<InMemoryMailbox>,
    remote: Remote,
    events: tokio::sync::mpsc::Receiver<RoomEvent>,
}

fn fixture() -> Fixture {
    let cfg = config::load_from_str("version: 1\n").unwrap();
    let gate = GateEngine::new(Box::new(MemoryStore::<GateRule>::new()));
    let whitelist = Whitelist::new(Box::new(MemoryStore::<String>::new()));
    let mailbox = Arc::new(InMemoryMailbox::new());
    let (state, events) = AppState::with_parts(cfg, gate, whitelist, mailbox.clone());

    let room = state.rooms().get_or_create(&room_id());
    let (local, remote) = tokio::io::duplex(64 * 1024);
    room.add_peer("p1", local).unwrap();
    let (rd, wr) = tokio::io::split(remote);

    Fixture {
        state,
        mailbox,
        remote: Remote {
            lines: BufReader::new(rd).lines(),
            wr,
        },
        events,
    }
}

fn message(id: &str, from: &str, subject: &str) -> RoomEvent {
    RoomEvent::Message {
        room: room_id(),
        peer: "p1".into(),
        id: id.into(),
        raw: format!("From: Someone <{from}>\r\nSubject: {subject}\r\n\r\nbody").into_bytes(),
    }
}

#[tokio::test]
async fn whitelisted_sender_is_stored_and_acked() {
    let mut f = fixture();
    f.state.whitelist().add("@friends.test").unwrap();

    let decision = f
        .state
        .inbound()
        .handle_event(message("m1", "ann@friends.test", "hi"))
        .await;
    assert_eq!(decision, Some(GateDecision::Accept));
    assert!(f.mailbox.message_content("m1").await.unwrap().is_some());
    assert_eq!(f.remote.next_packet().await, Some(PeerPacket::ack("m1")));
}

#[tokio::test]
async fn rejected_message_is_dropped_without_ack() {
    let mut f = fixture();
    f.state
        .gate()
        .add(
            GateAction::Reject,
            GateConditions {
                subject_contains: Some("LOTTERY".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let decision = f
        .state
        .inbound()
        .handle_event(message("m1", "x@spam.test", "you won the lottery"))
        .await;
    assert_eq!(decision, Some(GateDecision::Reject));
    assert!(f.mailbox.is_empty());
    assert_eq!(f.remote.next_packet().await, None);
}

#[tokio::test]
async fn unmatched_message_is_held_then_released() {
    let mut f = fixture();
    let inbound = f.state.inbound();

    let decision = inbound
        .handle_event(message("m1", "new@unknown.test", "hello"))
        .await;
    assert_eq!(decision, Some(GateDecision::Pending));
    assert!(f.mailbox.is_empty());
    // held messages are acked so the sender stops waiting
    assert_eq!(f.remote.next_packet().await, Some(PeerPacket::ack("m1")));

    let held = inbound.held();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].from, "new@unknown.test");
    assert_eq!(held[0].subject, "hello");

    assert!(inbound.release_held("m1").await.unwrap());
    assert!(!inbound.release_held("m1").await.unwrap());
    assert!(f.mailbox.message_content("m1").await.unwrap().is_some());

    inbound
        .handle_event(message("m2", "new@unknown.test", "again"))
        .await;
    assert!(inbound.discard_held("m2"));
    assert!(inbound.held().is_empty());
}

#[tokio::test]
async fn non_message_events_have_no_decision() {
    let f = fixture();
    let ev = RoomEvent::Ack {
        room: room_id(),
        peer: "p1".into(),
        id: "nobody".into(),
        settled: false,
    };
    assert_eq!(f.state.inbound().handle_event(ev).await, None);
}

#[tokio::test]
async fn running_pipeline_acks_wire_messages() {
    let mut f = fixture();
    f.state
        .gate()
        .add(
            GateAction::Accept,
            GateConditions {
                from_domain: Some("*.corp.test".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let runner = tokio::spawn(f.state.inbound().run(f.events));

    let raw = b"From: dev@eu.corp.test\r\nSubject: build\r\n\r\ngreen";
    let line = encode_packet(&PeerPacket::message("w1", raw)).unwrap();
    f.remote.wr.write_all(line.as_bytes()).await.unwrap();
    f.remote.wr.flush().await.unwrap();

    assert_eq!(f.remote.next_packet().await, Some(PeerPacket::ack("w1")));
    assert_eq!(
        f.mailbox.message_content("w1").await.unwrap(),
        Some(raw.to_vec())
    );
    runner.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_backed_gate_decides_off_the_event_loop() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "version: 1\ngate:\n  rules_path: \"{}\"\n  whitelist_path: \"{}\"\n",
        dir.path().join("rules.json").display(),
        dir.path().join("whitelist.json").display(),
    );
    let cfg = config::load_from_str(&yaml).unwrap();
    let (state, _events) = AppState::new(cfg).unwrap();

    state.whitelist().add("ann@friends.test").unwrap();
    state
        .gate()
        .add(
            GateAction::Reject,
            GateConditions {
                subject_contains: Some("LOTTERY".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(dir.path().join("whitelist.json").exists());
    assert!(dir.path().join("rules.json").exists());

    let room = state.rooms().get_or_create(&room_id());
    let (local, remote) = tokio::io::duplex(64 * 1024);
    room.add_peer("p1", local).unwrap();
    let (rd, wr) = tokio::io::split(remote);
    let mut remote = Remote {
        lines: BufReader::new(rd).lines(),
        wr,
    };

    let inbound = state.inbound();
    let accepted = inbound
        .handle_event(message("m1", "ann@friends.test", "hi"))
        .await;
    assert_eq!(accepted, Some(GateDecision::Accept));
    assert_eq!(remote.next_packet().await, Some(PeerPacket::ack("m1")));
    assert!(state.mailbox().message_content("m1").await.unwrap().is_some());

    let rejected = inbound
        .handle_event(message("m2", "x@spam.test", "lottery inside"))
        .await;
    assert_eq!(rejected, Some(GateDecision::Reject));
    assert!(state.mailbox().message_content("m2").await.unwrap().is_none());

    let held = inbound
        .handle_event(message("m3", "new@unknown.test", "hello"))
        .await;
    assert_eq!(held, Some(GateDecision::Pending));
    assert_eq!(inbound.held().len(), 1);
}
