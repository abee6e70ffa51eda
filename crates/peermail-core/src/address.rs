//! Address codec: `local-part@<64-hex room id>`.
//!
//! This is the only place that decides whether an address is routable. The
//! room id doubles as the peer topic, so it must be exactly 32 bytes of hex.

use std::fmt;

use crate::error::{PeerMailError, Result};

/// Hex length of a room id (256 bits).
pub const ROOM_ID_HEX_LEN: usize = 64;

/// Validated, lowercased 64-hex room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// Validate and normalize a room id (case-insensitive input, lowercase output).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != ROOM_ID_HEX_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PeerMailError::InvalidAddress(format!(
                "room id must be {ROOM_ID_HEX_LEN} hex characters"
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Binary form of the id, used as the discovery topic.
    pub fn topic(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // length and alphabet were checked in `parse`
        if hex::decode_to_slice(&self.0, &mut out).is_err() {
            tracing::error!(room = %self.0, "room id failed hex decode after validation");
        }
        out
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed mail address. Produced by [`parse_address`], never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub user: String,
    pub room_id: RoomId,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.room_id)
    }
}

/// Parse `user@roomid`, splitting at the last `@`.
pub fn parse_address(address: &str) -> Result<Address> {
    let (user, room) = address
        .rsplit_once('@')
        .ok_or_else(|| PeerMailError::InvalidAddress(format!("missing '@': {address}")))?;

    if user.is_empty() {
        return Err(PeerMailError::InvalidAddress(format!("empty local part: {address}")));
    }

    let room_id = RoomId::parse(room)?;
    Ok(Address {
        user: user.to_string(),
        room_id,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn hex64(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    #[test]
    fn accepts_64_hex_and_lowercases() {
        let addr = parse_address(&format!("alice@{}", hex64('A'))).unwrap();
        assert_eq!(addr.user, "alice");
        assert_eq!(addr.room_id.as_str(), hex64('a'));
    }

    #[test]
    fn rejects_wrong_lengths() {
        let short = format!("u@{}", &hex64('a')[..63]);
        let long = format!("u@{}a", hex64('a'));
        assert!(parse_address(&short).is_err());
        assert!(parse_address(&long).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let mut room = hex64('0');
        room.replace_range(10..11, "g");
        assert!(parse_address(&format!("u@{room}")).is_err());
    }

    #[test]
    fn rejects_empty_user_and_missing_at() {
        assert!(parse_address(&format!("@{}", hex64('f'))).is_err());
        assert!(parse_address(&hex64('f')).is_err());
    }

    #[test]
    fn splits_at_last_at_sign() {
        let addr = parse_address(&format!("a@b@{}", hex64('1'))).unwrap();
        assert_eq!(addr.user, "a@b");
    }

    #[test]
    fn topic_is_binary_decoding() {
        let room = RoomId::parse(&format!("ff{}", "00".repeat(31))).unwrap();
        let topic = room.topic();
        assert_eq!(topic[0], 0xff);
        assert!(topic[1..].iter().all(|b| *b == 0));
    }
}
