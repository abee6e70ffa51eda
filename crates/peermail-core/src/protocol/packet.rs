//! Peer wire packets (newline-delimited JSON).
//!
//! `{"type":"MESSAGE","id":"..","mime":"<base64>"}` or `{"type":"ACK","id":".."}`.
//! Decoding is strict: unknown fields are rejected and an unknown `type` is
//! reported as `UnknownPacket` rather than being folded into a generic
//! parse failure.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{PeerMailError, Result};

/// Tagged union exchanged between room peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", deny_unknown_fields)]
pub enum PeerPacket {
    /// A message, `mime` is the base64 of the raw RFC 5322 content.
    Message { id: String, mime: String },
    /// Acknowledgement of a previously received message id.
    Ack { id: String },
}

impl PeerPacket {
    /// Build a MESSAGE packet from raw message bytes.
    pub fn message(id: impl Into<String>, raw: &[u8]) -> Self {
        PeerPacket::Message {
            id: id.into(),
            mime: STANDARD.encode(raw),
        }
    }

    pub fn ack(id: impl Into<String>) -> Self {
        PeerPacket::Ack { id: id.into() }
    }

    /// Correlation id carried by either variant.
    pub fn id(&self) -> &str {
        match self {
            PeerPacket::Message { id, .. } | PeerPacket::Ack { id } => id,
        }
    }
}

/// Decode the base64 `mime` field of a MESSAGE packet.
pub fn decode_mime(mime: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(mime.trim())
        .map_err(|e| PeerMailError::MalformedPacket(format!("mime is not base64: {e}")))
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Decode one line (without its trailing newline).
pub fn decode_packet(line: &str) -> Result<PeerPacket> {
    match serde_json::from_str::<PeerPacket>(line) {
        Ok(p) => {
            if p.id().is_empty() {
                return Err(PeerMailError::MalformedPacket("empty id".into()));
            }
            Ok(p)
        }
        Err(e) => {
            // distinguish "valid JSON, unknown type" from plain garbage
            if let Ok(TypeProbe { kind: Some(kind) }) = serde_json::from_str::<TypeProbe>(line) {
                if kind != "MESSAGE" && kind != "ACK" {
                    return Err(PeerMailError::UnknownPacket(kind));
                }
            }
            Err(PeerMailError::MalformedPacket(e.to_string()))
        }
    }
}

/// Encode a packet as one wire line, including the trailing `\n`.
pub fn encode_packet(packet: &PeerPacket) -> Result<String> {
    let mut s = serde_json::to_string(packet)
        .map_err(|e| PeerMailError::Internal(format!("packet encode failed: {e}")))?;
    s.push('\n');
    Ok(s)
}
