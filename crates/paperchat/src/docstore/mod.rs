//! Document store client.

pub mod client;
pub mod error;

pub use client::{DocStoreClient, DocumentInfo, UploadReceipt};
pub use error::{DocStoreError, DocStoreResult};
