use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub raw_text: String,
    pub metadata: DocumentMetadata,
    pub chunks: Vec<Chunk>,
    pub relationships: RelationshipGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub created_at: DateTime<Utc>,
    pub file_size: u64,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub total_token_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// Filled in by a separate embedding step.
    pub embedding: Option<Vec<f32>>,
    pub location: ChunkLocation,
    pub metadata: ChunkMetadata,
}

/// Byte offsets into the parent document's `raw_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkLocation {
    pub start_index: usize,
    pub end_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub token_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<ExtractedEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_context: Option<TemporalContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numerical_values: Option<NumericalValues>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_details: Vec<ExtractedValue>,
    pub source_document: SourceDocument,
    pub context_maps: Vec<ContextMap>,
}

impl ChunkMetadata {
    /// Every candidate recorded for `field` across this chunk's context maps.
    pub fn field_candidates<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = (&'a ContextMap, &'a FieldCandidate)> + 'a {
        self.context_maps.iter().flat_map(move |map| {
            map.field_mappings
                .get(field)
                .into_iter()
                .flatten()
                .map(move |candidate| (map, candidate))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Anything else the extractor attached, e.g. `category`.
    #[serde(flatten)]
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub date_references: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Currency,
    Percentage,
    Quantity,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericalValues {
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub value: f64,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Weak back-reference to the owning document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMap {
    pub domain: String,
    pub confidence: f64,
    /// Keys are domain field names chosen by the extractor.
    pub field_mappings: HashMap<String, Vec<FieldCandidate>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCandidate {
    pub detected_value: Value,
    pub context_terms: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Supports,
    Contradicts,
    Elaborates,
    References,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedChunk {
    pub chunk_id: String,
    pub relation_type: RelationType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRelationship {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_chunks: Vec<String>,
    #[serde(default)]
    pub related_chunks: Vec<RelatedChunk>,
}

/// Adjacency map from chunk id to its links. Links are ids only, so cycles are fine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGraph {
    edges: HashMap<String, ChunkRelationship>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&ChunkRelationship> {
        self.edges.get(chunk_id)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn entry(&mut self, chunk_id: &str) -> &mut ChunkRelationship {
        self.edges.entry(chunk_id.to_string()).or_default()
    }

    /// Chains previous/next links through `ids` in order.
    pub fn link_sequence(&mut self, ids: &[String]) {
        for id in ids {
            self.entry(id);
        }
        for pair in ids.windows(2) {
            self.entry(&pair[0]).next_chunk = Some(pair[1].clone());
            self.entry(&pair[1]).previous_chunk = Some(pair[0].clone());
        }
    }

    pub fn set_parent(&mut self, child: &str, parent: &str) {
        self.entry(child).parent_chunk = Some(parent.to_string());
        let siblings = &mut self.entry(parent).child_chunks;
        if !siblings.iter().any(|c| c == child) {
            siblings.push(child.to_string());
        }
    }

    pub fn relate(&mut self, from: &str, related: RelatedChunk) {
        self.entry(from).related_chunks.push(related);
    }

    /// Ids reachable from `chunk_id` over any single edge, without duplicates.
    pub fn neighbours(&self, chunk_id: &str) -> Vec<&str> {
        let Some(rel) = self.edges.get(chunk_id) else {
            return Vec::new();
        };

        let mut out: Vec<&str> = Vec::new();
        let candidates = rel
            .previous_chunk
            .iter()
            .chain(rel.next_chunk.iter())
            .chain(rel.parent_chunk.iter())
            .chain(rel.child_chunks.iter())
            .chain(rel.related_chunks.iter().map(|r| &r.chunk_id));
        for id in candidates {
            if !out.contains(&id.as_str()) {
                out.push(id);
            }
        }
        out
    }
}

impl Document {
    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn relationships_of(&self, id: &str) -> Option<&ChunkRelationship> {
        self.relationships.get(id)
    }

    /// Text slice a chunk's location points at.
    pub fn located_text(&self, chunk: &Chunk) -> Option<&str> {
        self.raw_text
            .get(chunk.location.start_index..chunk.location.end_index)
    }

    /// All chunks carrying `field` in a context map, with the matching candidate.
    pub fn field_matches<'a>(&'a self, field: &'a str) -> Vec<(&'a Chunk, &'a FieldCandidate)> {
        self.chunks
            .iter()
            .flat_map(|chunk| {
                chunk
                    .metadata
                    .field_candidates(field)
                    .map(move |(_, candidate)| (chunk, candidate))
            })
            .collect()
    }
}
