//! Session error types.

use paperchat_protocol::DecodeError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while running a chat session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The query was blank after trimming. Rejected before any network use.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A query is already awaiting its terminal event.
    #[error("a query is already in flight")]
    QueryInFlight,

    /// `send` was called without a ready channel.
    #[error("not connected")]
    NotConnected,

    /// Connect or send failed, or the channel closed mid-query.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reported an explicit error for the query.
    #[error("server error: {0}")]
    Server(String),

    /// An inbound frame could not be decoded. Transient; the query survives.
    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),

    /// A fragment arrived while no assistant turn was open.
    #[error("no assistant turn is open")]
    NoOpenTurn,
}
