//! # Upload Module
//!
//! Moves stored rows to the remote endpoint.
//!
//! This module handles:
//! - Single-row HTTP requests through the modem ([`UploadSession`])
//! - Oldest-first draining of the durable log ([`UploadDrain`])

pub mod drain;
pub mod session;

pub use drain::{DrainReport, UploadDrain};
pub use session::{SessionSettings, UploadSession};

use async_trait::async_trait;

use crate::error::Result;

/// Sends one stored row to the endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowUploader: Send {
    async fn send(&mut self, row: &str) -> Result<()>;
}
