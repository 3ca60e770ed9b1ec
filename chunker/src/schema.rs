//! Wire schema of the extraction response and its validation.
//!
//! The extractor is asked for `{"chunks": [...]}`. Every chunk is decoded and
//! checked here; one bad chunk rejects the whole response.

use crate::error::SchemaError;
use crate::models::{ExtractedEntity, ExtractedValue, RelationType};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedChunk {
    pub text: String,
    pub confidence: f64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub entities: Option<Vec<ExtractedEntity>>,
    #[serde(default)]
    pub values: Vec<ExtractedValue>,
    #[serde(default)]
    pub dates: Vec<ExtractedDate>,
    #[serde(default)]
    pub period: Option<String>,
    pub context_maps: Vec<ExtractedContextMap>,
    /// Index of the enclosing chunk in the same response.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub related: Vec<ExtractedRelation>,
    #[serde(default)]
    pub cell_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedDate {
    pub date: NaiveDate,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedContextMap {
    pub domain: String,
    pub confidence: f64,
    pub field_mappings: HashMap<String, Vec<ExtractedCandidate>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedCandidate {
    pub detected_value: Value,
    pub context_terms: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedRelation {
    pub chunk: usize,
    pub relation: RelationType,
    pub confidence: f64,
}

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").expect("valid regex"))
}

/// Parses a raw extraction payload into validated chunks.
pub fn parse_response(payload: &str) -> Result<Vec<ExtractedChunk>, SchemaError> {
    let mut root: Value = serde_json::from_str(payload)?;

    let raw_chunks = match root.get_mut("chunks").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => return Err(SchemaError::MissingChunks),
    };

    let total = raw_chunks.len();
    let mut chunks = Vec::with_capacity(total);
    for (index, raw) in raw_chunks.into_iter().enumerate() {
        let chunk: ExtractedChunk =
            serde_json::from_value(raw).map_err(|e| SchemaError::chunk(index, e.to_string()))?;
        chunk.validate(index, total)?;
        chunks.push(chunk);
    }

    Ok(chunks)
}

fn check_confidence(index: usize, what: &str, value: f64) -> Result<(), SchemaError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SchemaError::chunk(
            index,
            format!("{what} confidence {value} outside [0, 1]"),
        ))
    }
}

impl ExtractedChunk {
    fn validate(&self, index: usize, total: usize) -> Result<(), SchemaError> {
        if self.text.trim().is_empty() {
            return Err(SchemaError::chunk(index, "empty text"));
        }
        check_confidence(index, "chunk", self.confidence)?;

        if let Some(language) = &self.language {
            if !language_pattern().is_match(language) {
                return Err(SchemaError::chunk(
                    index,
                    format!("malformed language code {language:?}"),
                ));
            }
        }

        if let Some(value) = self.values.iter().find(|v| !v.value.is_finite()) {
            return Err(SchemaError::chunk(
                index,
                format!("non-finite numeric value {}", value.value),
            ));
        }

        for map in &self.context_maps {
            if map.domain.trim().is_empty() {
                return Err(SchemaError::chunk(index, "context map with empty domain"));
            }
            check_confidence(index, "context map", map.confidence)?;

            for (field, candidates) in &map.field_mappings {
                if field.trim().is_empty() {
                    return Err(SchemaError::chunk(index, "empty field mapping key"));
                }
                for candidate in candidates {
                    check_confidence(index, field, candidate.confidence)?;
                }
            }
        }

        let check_index = |target: usize, what: &str| {
            if target >= total || target == index {
                Err(SchemaError::chunk(
                    index,
                    format!("{what} index {target} does not name another chunk"),
                ))
            } else {
                Ok(())
            }
        };

        if let Some(parent) = self.parent {
            check_index(parent, "parent")?;
        }
        for relation in &self.related {
            check_index(relation.chunk, "related")?;
            check_confidence(index, "relation", relation.confidence)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueType;

    const WELL_FORMED: &str = r#"{
        "chunks": [{
            "text": "TABLE JOHN $500 02/03",
            "confidence": 0.97,
            "language": "en",
            "values": [{"value": 500, "type": "currency", "unit": "USD", "context": "item_price"}],
            "entities": [
                {"text": "JOHN", "type": "person", "role": "sales_person"},
                {"text": "TABLE", "type": "product", "category": "furniture"}
            ],
            "dates": [{"date": "2024-02-03", "type": "transaction_date"}],
            "context_maps": [{
                "domain": "sales",
                "confidence": 0.98,
                "field_mappings": {
                    "sales_person": [{"detected_value": "JOHN", "context_terms": ["seller"], "confidence": 0.96}],
                    "sale_amount": [{"detected_value": 500, "context_terms": ["price"], "confidence": 0.99}]
                }
            }]
        }]
    }"#;

    fn rejection(payload: &str) -> SchemaError {
        parse_response(payload).expect_err("payload should be rejected")
    }

    #[test]
    fn accepts_well_formed_response() {
        let chunks = parse_response(WELL_FORMED).unwrap();
        assert_eq!(chunks.len(), 1);

        let chunk = &chunks[0];
        assert_eq!(chunk.values[0].value_type, ValueType::Currency);
        assert_eq!(
            chunk.dates[0].date,
            NaiveDate::from_ymd_opt(2024, 2, 3).unwrap()
        );
        let mappings = &chunk.context_maps[0].field_mappings;
        assert_eq!(mappings["sale_amount"][0].detected_value, 500);
    }

    #[test]
    fn missing_chunks_key_is_rejected() {
        assert!(matches!(
            rejection(r#"{"items": []}"#),
            SchemaError::MissingChunks
        ));
        assert!(matches!(
            rejection(r#"{"chunks": {"text": "x"}}"#),
            SchemaError::MissingChunks
        ));
        assert!(matches!(rejection("[]"), SchemaError::MissingChunks));
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(matches!(
            rejection("Here are your chunks: {"),
            SchemaError::InvalidJson(_)
        ));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let payload = WELL_FORMED.replace("\"confidence\": 0.97", "\"confidence\": 1.5");
        match rejection(&payload) {
            SchemaError::InvalidChunk { index, reason } => {
                assert_eq!(index, 0);
                assert!(reason.contains("1.5"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_candidate_confidence_is_checked() {
        let payload = WELL_FORMED.replace("\"confidence\": 0.99", "\"confidence\": -0.1");
        assert!(matches!(
            rejection(&payload),
            SchemaError::InvalidChunk { .. }
        ));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let payload = r#"{"chunks": [{"text": "no confidence", "context_maps": []}]}"#;
        assert!(matches!(
            rejection(payload),
            SchemaError::InvalidChunk { index: 0, .. }
        ));
    }

    #[test]
    fn malformed_field_mapping_is_rejected() {
        let payload = r#"{"chunks": [{
            "text": "x", "confidence": 0.5,
            "context_maps": [{"domain": "sales", "confidence": 0.5, "field_mappings": {"amount": "500"}}]
        }]}"#;
        assert!(matches!(
            rejection(payload),
            SchemaError::InvalidChunk { .. }
        ));
    }

    #[test]
    fn unknown_value_type_and_bad_dates_are_rejected() {
        let payload = WELL_FORMED.replace("\"type\": \"currency\"", "\"type\": \"money\"");
        assert!(matches!(rejection(&payload), SchemaError::InvalidChunk { .. }));

        let payload = WELL_FORMED.replace("2024-02-03", "02/03");
        assert!(matches!(rejection(&payload), SchemaError::InvalidChunk { .. }));

        let payload = WELL_FORMED.replace("\"language\": \"en\"", "\"language\": \"English\"");
        assert!(matches!(rejection(&payload), SchemaError::InvalidChunk { .. }));
    }

    #[test]
    fn second_bad_chunk_rejects_everything() {
        let payload = r#"{"chunks": [
            {"text": "fine", "confidence": 0.9, "context_maps": []},
            {"text": "self reference", "confidence": 0.9, "context_maps": [], "parent": 1}
        ]}"#;
        match rejection(payload) {
            SchemaError::InvalidChunk { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn arbitrary_field_names_are_tolerated() {
        let payload = r#"{"chunks": [{
            "text": "Dosage 20mg", "confidence": 0.8,
            "context_maps": [{"domain": "pharmacy", "confidence": 0.7,
                "field_mappings": {"dosage_mg": [{"detected_value": {"amount": 20}, "context_terms": [], "confidence": 0.7}]}}],
            "related": []
        }]}"#;
        let chunks = parse_response(payload).unwrap();
        assert!(chunks[0].context_maps[0].field_mappings.contains_key("dosage_mg"));
    }
}
