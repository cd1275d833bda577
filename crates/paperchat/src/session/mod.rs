//! Streaming chat session engine.
//!
//! Turns the answer service's event stream into an ordered transcript plus a
//! live set of executing pipeline stages.

pub mod controller;
pub mod error;
pub mod stages;
pub mod transcript;
pub mod transport;

pub use controller::{ChatSession, SessionStatus, SessionUpdate, SessionView};
pub use error::SessionError;
pub use stages::StageTracker;
pub use transcript::{Role, Transcript, Turn};
pub use transport::{Inbound, TransportConfig, WsTransport};
