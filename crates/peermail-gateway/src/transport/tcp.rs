//! Direct TCP peer substrate.
//!
//! Wire: the connecting side writes the 64-hex room id followed by `\n`,
//! then both sides speak the room's packet protocol. No authentication or
//! encryption happens here; run it over a trusted network or a tunnel.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use peermail_core::address::{RoomId, ROOM_ID_HEX_LEN};
use peermail_core::error::{PeerMailError, Result};

use crate::room::RoomRegistry;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const REDIAL_EVERY: Duration = Duration::from_secs(5);

/// Read the hello line one byte at a time so nothing after it is consumed.
pub async fn read_hello<R: AsyncRead + Unpin>(rd: &mut R) -> Result<RoomId> {
    let mut buf = Vec::with_capacity(ROOM_ID_HEX_LEN + 2);
    loop {
        let b = rd.read_u8().await?;
        if b == b'\n' {
            break;
        }
        if buf.len() > ROOM_ID_HEX_LEN + 1 {
            return Err(PeerMailError::BadRequest("hello line too long".into()));
        }
        buf.push(b);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let s = std::str::from_utf8(&buf)
        .map_err(|_| PeerMailError::BadRequest("hello is not utf-8".into()))?;
    RoomId::parse(s.trim())
}

/// Accept inbound peers and route each to the room its hello names.
pub async fn listen(listener: TcpListener, rooms: Arc<RoomRegistry>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "peer listener up");
    }
    loop {
        let (mut stream, peer_addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "peer accept failed");
                continue;
            }
        };
        let rooms = Arc::clone(&rooms);
        tokio::spawn(async move {
            let room_id = match tokio::time::timeout(HELLO_TIMEOUT, read_hello(&mut stream)).await {
                Ok(Ok(id)) => id,
                Ok(Err(e)) => {
                    warn!(%peer_addr, error = %e, "peer hello rejected");
                    return;
                }
                Err(_) => {
                    warn!(%peer_addr, "peer hello timed out");
                    return;
                }
            };
            let room = rooms.get_or_create(&room_id);
            if let Err(e) = room.add_peer(peer_addr.to_string(), stream) {
                warn!(%peer_addr, room = %room_id, error = %e, "peer not added");
            }
        });
    }
}

async fn dial_once(room_id: &RoomId, addr: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{room_id}\n").as_bytes()).await?;
    stream.flush().await?;
    Ok(stream)
}

/// Keep one outbound connection to `addr` joined to `room_id`, redialing
/// whenever it drops. Runs until aborted.
pub async fn dial_loop(rooms: Arc<RoomRegistry>, room_id: RoomId, addr: String) {
    let peer_id = format!("dial:{addr}");
    let mut tick = tokio::time::interval(REDIAL_EVERY);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let room = rooms.get_or_create(&room_id);
        if room.peers().contains(&peer_id) {
            continue;
        }
        match dial_once(&room_id, &addr).await {
            Ok(stream) => {
                if let Err(e) = room.add_peer(peer_id.clone(), stream) {
                    warn!(room = %room_id, %addr, error = %e, "dialed peer not added");
                }
            }
            Err(e) => debug!(room = %room_id, %addr, error = %e, "dial failed"),
        }
    }
}
