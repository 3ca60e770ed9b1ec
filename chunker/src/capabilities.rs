//! External capabilities the pipeline depends on.
//!
//! Handles are built once at start-up and passed in, usually as
//! `Arc<dyn OcrProvider>` / `Arc<dyn ExtractionProvider>`. Tests substitute
//! in-memory implementations.

use crate::blocks::Block;
use anyhow::Result;
use async_trait::async_trait;

/// Optical character recognition over raw document bytes.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Returns the flat list of blocks for the whole document.
    async fn detect_blocks(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<Block>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub system_instruction: String,
    pub user_content: String,
    pub temperature: f32,
}

/// Structured extraction, typically a chat-completion model in JSON mode.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Returns the model's text payload, or `None` when it produced nothing.
    async fn complete(&self, request: &ExtractionRequest) -> Result<Option<String>>;
}
