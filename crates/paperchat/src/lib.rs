//! Paperchat client library.
//!
//! Provides the streaming chat session engine and the document store client
//! used by the `paperchat` binary.

pub mod config;
pub mod docstore;
pub mod session;
