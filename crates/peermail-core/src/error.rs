//! Shared error type across peermail crates.

use thiserror::Error;

/// Stable error codes (used in logs and by callers that branch on the kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed request.
    BadRequest,
    /// Address is not `user@<64-hex room id>`.
    InvalidAddress,
    /// Send attempted while the room has no connected peers.
    NoPeers,
    /// No acknowledgement arrived before the deadline.
    AckTimeout,
    /// Room was torn down while the send was in flight.
    RoomDestroyed,
    /// A send with the same id is already awaiting its acknowledgement.
    DuplicateSend,
    /// Peer line could not be decoded.
    MalformedPacket,
    /// Peer packet carried a `type` we do not speak.
    UnknownPacket,
    /// Persistence failed.
    Storage,
    /// Config rejected.
    Config,
    /// Socket / stream failure.
    Io,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InvalidAddress => "INVALID_ADDRESS",
            ErrorCode::NoPeers => "NO_PEERS",
            ErrorCode::AckTimeout => "ACK_TIMEOUT",
            ErrorCode::RoomDestroyed => "ROOM_DESTROYED",
            ErrorCode::DuplicateSend => "DUPLICATE_SEND",
            ErrorCode::MalformedPacket => "MALFORMED_PACKET",
            ErrorCode::UnknownPacket => "UNKNOWN_PACKET",
            ErrorCode::Storage => "STORAGE",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Io => "IO",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PeerMailError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum PeerMailError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no peers connected")]
    NoPeers,
    #[error("acknowledgement timeout for message {0}")]
    AckTimeout(String),
    #[error("room destroyed")]
    RoomDestroyed,
    #[error("message {0} is already awaiting acknowledgement")]
    DuplicateSend(String),
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("unknown packet type: {0}")]
    UnknownPacket(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl PeerMailError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PeerMailError::BadRequest(_) => ErrorCode::BadRequest,
            PeerMailError::InvalidAddress(_) => ErrorCode::InvalidAddress,
            PeerMailError::NoPeers => ErrorCode::NoPeers,
            PeerMailError::AckTimeout(_) => ErrorCode::AckTimeout,
            PeerMailError::RoomDestroyed => ErrorCode::RoomDestroyed,
            PeerMailError::DuplicateSend(_) => ErrorCode::DuplicateSend,
            PeerMailError::MalformedPacket(_) => ErrorCode::MalformedPacket,
            PeerMailError::UnknownPacket(_) => ErrorCode::UnknownPacket,
            PeerMailError::Storage(_) => ErrorCode::Storage,
            PeerMailError::Config(_) => ErrorCode::Config,
            PeerMailError::Io(_) => ErrorCode::Io,
            PeerMailError::Internal(_) => ErrorCode::Internal,
        }
    }
}
