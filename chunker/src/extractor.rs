use crate::capabilities::{ExtractionProvider, ExtractionRequest};
use crate::config::DEFAULT_TEMPERATURE;
use crate::error::IngestError;
use crate::schema::{self, ExtractedChunk};
use std::sync::Arc;

pub const CHUNKING_PROMPT: &str = r#"You are a document analyzer specialized in extracting structured information from text.
Given the following text, split it into chunks with context maps that help identify queryable fields.
Focus on identifying:
1. Entities (people, products, organizations)
2. Numerical values with their context, normalized type and unit
3. Dates and temporal information
4. Relationships between entities and between chunks

Return a JSON object with a "chunks" array, in document order. Each chunk has:
- text: the original text segment, copied verbatim from the input
- confidence: your confidence in this chunk's annotations, between 0 and 1
- language: ISO 639-1 language code of the segment (optional)
- topics: short topic labels (optional)
- entities: identified entities with "text", "type" and optional "role"
- values: numeric values with "value", "type" (one of currency, percentage, quantity, other), optional "unit" and "context"
- dates: dates as "YYYY-MM-DD" with a "type", plus an optional "period" string on the chunk
- context_maps: array of {"domain", "confidence", "field_mappings"}; field_mappings maps a queryable field name to a list of {"detected_value", "context_terms", "confidence"}
- parent: index of an enclosing chunk, e.g. the table a row belongs to (optional)
- related: list of {"chunk": index, "relation": one of supports, contradicts, elaborates, references, "confidence"} (optional)
All confidence values must be between 0 and 1.

Example input:
"TABLE JOHN $500 02/03"

RETURN ONLY THE JSON OUTPUT, NO OTHER TEXT.

Example output:
{
  "chunks": [{
    "text": "TABLE JOHN $500 02/03",
    "confidence": 0.97,
    "language": "en",
    "topics": ["sales"],
    "values": [{
      "value": 500,
      "type": "currency",
      "unit": "USD",
      "context": "item_price"
    }],
    "entities": [
      {"text": "JOHN", "type": "person", "role": "sales_person"},
      {"text": "TABLE", "type": "product", "category": "furniture"}
    ],
    "dates": [{"date": "2024-02-03", "type": "transaction_date"}],
    "context_maps": [{
      "domain": "sales",
      "confidence": 0.98,
      "field_mappings": {
        "product": [{"detected_value": "TABLE", "context_terms": ["item", "furniture", "product"], "confidence": 0.95}],
        "sales_person": [{"detected_value": "JOHN", "context_terms": ["responsible", "seller"], "confidence": 0.96}],
        "sale_amount": [{"detected_value": 500, "context_terms": ["price", "amount"], "confidence": 0.99}]
      }
    }]
  }]
}"#;

/// Sends reconstructed text to the extraction capability and validates the answer.
pub struct ChunkExtractor {
    provider: Arc<dyn ExtractionProvider>,
    temperature: f32,
}

impl ChunkExtractor {
    pub fn new(provider: Arc<dyn ExtractionProvider>) -> Self {
        Self {
            provider,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn request_for(&self, text: &str) -> ExtractionRequest {
        ExtractionRequest {
            system_instruction: CHUNKING_PROMPT.to_string(),
            user_content: text.to_string(),
            temperature: self.temperature,
        }
    }

    pub async fn extract(&self, text: &str) -> Result<Vec<ExtractedChunk>, IngestError> {
        if text.trim().is_empty() {
            log::info!("No text to chunk, skipping extraction");
            return Ok(Vec::new());
        }

        log::info!("Starting to chunk document ({} bytes)", text.len());
        let response = self
            .provider
            .complete(&self.request_for(text))
            .await
            .map_err(IngestError::ExtractionRequest)?;

        let payload = match response {
            Some(payload) if !payload.trim().is_empty() => payload,
            _ => return Err(IngestError::ExtractionEmptyResponse),
        };

        let chunks = schema::parse_response(&payload).map_err(|e| {
            log::error!("Extraction response rejected: {}", e);
            IngestError::from(e)
        })?;

        log::info!("Extracted {} chunks", chunks.len());
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Option<String>,
        seen: Mutex<Vec<ExtractionRequest>>,
    }

    impl Canned {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExtractionProvider for Canned {
        async fn complete(&self, request: &ExtractionRequest) -> anyhow::Result<Option<String>> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ExtractionProvider for Failing {
        async fn complete(&self, _request: &ExtractionRequest) -> anyhow::Result<Option<String>> {
            anyhow::bail!("503 upstream unavailable")
        }
    }

    #[tokio::test]
    async fn sends_prompt_and_text_at_low_temperature() {
        let provider = Canned::new(Some(r#"{"chunks": []}"#));
        let extractor = ChunkExtractor::new(provider.clone());

        let chunks = extractor.extract("TABLE JOHN $500").await.unwrap();
        assert!(chunks.is_empty());

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system_instruction, CHUNKING_PROMPT);
        assert_eq!(seen[0].user_content, "TABLE JOHN $500");
        assert!(seen[0].temperature <= 0.2);
    }

    #[tokio::test]
    async fn empty_reply_is_its_own_error() {
        for reply in [None, Some(""), Some("  \n")] {
            let extractor = ChunkExtractor::new(Canned::new(reply));
            assert!(matches!(
                extractor.extract("some text").await,
                Err(IngestError::ExtractionEmptyResponse)
            ));
        }
    }

    #[tokio::test]
    async fn malformed_reply_is_schema_error() {
        let extractor = ChunkExtractor::new(Canned::new(Some("```json\n{\"chunks\": []}\n```")));
        assert!(matches!(
            extractor.extract("some text").await,
            Err(IngestError::ExtractionSchema(SchemaError::InvalidJson(_)))
        ));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let extractor = ChunkExtractor::new(Arc::new(Failing));
        let err = extractor.extract("some text").await.unwrap_err();
        assert!(matches!(err, IngestError::ExtractionRequest(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn blank_text_skips_the_call() {
        let provider = Canned::new(None);
        let extractor = ChunkExtractor::new(provider.clone());
        assert!(extractor.extract("   ").await.unwrap().is_empty());
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn prompt_example_satisfies_schema() {
        let example = CHUNKING_PROMPT
            .split("Example output:\n")
            .nth(1)
            .unwrap();
        let chunks = schema::parse_response(example).unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
