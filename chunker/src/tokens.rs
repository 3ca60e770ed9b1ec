use crate::error::IngestError;
use tiktoken_rs::CoreBPE;

/// Counts tokens with the `cl100k_base` encoding.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn new() -> Result<Self, IngestError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| IngestError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
