use crate::models::*;
use crate::reconstructor::{ReconstructedText, PAGE_BREAK};
use crate::schema::ExtractedChunk;
use crate::tokens::TokenCounter;
use chrono::Utc;
use std::path::Path;
use uuid::Uuid;

/// What the caller told us about the uploaded file.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
}

/// A chunk whose text was not found in the raw text and got a fallback location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationResolutionWarning {
    pub chunk_index: usize,
    pub chunk_id: String,
    pub fallback_start: usize,
    pub fallback_end: usize,
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub document: Document,
    pub warnings: Vec<LocationResolutionWarning>,
}

/// Finds chunk segments in the raw text, in document order.
///
/// Each chunk is searched for at or after the end of the previous match,
/// then anywhere. Unmatched chunks take the next `len` bytes from the cursor.
struct LocationResolver<'a> {
    raw: &'a str,
    cursor: usize,
}

impl<'a> LocationResolver<'a> {
    fn new(raw: &'a str) -> Self {
        Self { raw, cursor: 0 }
    }

    /// Returns `(start, end, found)`.
    fn resolve(&mut self, segment: &str) -> (usize, usize, bool) {
        let found = self.raw[self.cursor..]
            .find(segment)
            .map(|offset| self.cursor + offset)
            .or_else(|| self.raw.find(segment));

        if let Some(start) = found {
            let end = start + segment.len();
            self.cursor = self.cursor.max(end);
            return (start, end, true);
        }

        let start = self.cursor;
        let mut end = (start + segment.len()).min(self.raw.len());
        while !self.raw.is_char_boundary(end) {
            end -= 1;
        }
        self.cursor = end;
        (start, end, false)
    }

    fn page_of(&self, start: usize) -> usize {
        self.raw[..start].matches(PAGE_BREAK).count() + 1
    }
}

pub struct DocumentAssembler<'a> {
    tokens: &'a TokenCounter,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(tokens: &'a TokenCounter) -> Self {
        Self { tokens }
    }

    pub fn assemble(
        &self,
        source: DocumentSource,
        reconstructed: ReconstructedText,
        extracted: Vec<ExtractedChunk>,
    ) -> Assembly {
        let document_id = Uuid::new_v4().to_string();
        let raw_text = reconstructed.text;

        let source_document = SourceDocument {
            id: document_id.clone(),
            file_name: source.file_name.clone(),
            mime_type: source.mime_type.clone(),
        };

        let chunk_ids: Vec<String> = extracted
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let mut relationships = RelationshipGraph::new();
        relationships.link_sequence(&chunk_ids);

        let mut resolver = LocationResolver::new(&raw_text);
        let mut warnings = Vec::new();
        let mut chunks = Vec::with_capacity(extracted.len());

        for (index, (raw, id)) in extracted.into_iter().zip(&chunk_ids).enumerate() {
            let (start_index, end_index, found) = resolver.resolve(&raw.text);
            if !found {
                log::warn!(
                    "Chunk {} not found in raw text, using fallback location {}..{}",
                    index,
                    start_index,
                    end_index
                );
                warnings.push(LocationResolutionWarning {
                    chunk_index: index,
                    chunk_id: id.clone(),
                    fallback_start: start_index,
                    fallback_end: end_index,
                });
            }

            if let Some(parent) = raw.parent {
                relationships.set_parent(id, &chunk_ids[parent]);
            }
            for relation in &raw.related {
                relationships.relate(
                    id,
                    RelatedChunk {
                        chunk_id: chunk_ids[relation.chunk].clone(),
                        relation_type: relation.relation,
                        confidence: relation.confidence,
                    },
                );
            }

            let location = ChunkLocation {
                start_index,
                end_index,
                page_number: Some(resolver.page_of(start_index)),
                cell_reference: raw.cell_reference.clone(),
            };

            chunks.push(Chunk {
                id: id.clone(),
                metadata: self.chunk_metadata(&raw, source_document.clone()),
                text: raw.text,
                embedding: None,
                location,
            });
        }

        log::info!(
            "Assembled document {} with {} chunks ({} unresolved locations)",
            document_id,
            chunks.len(),
            warnings.len()
        );

        let document = Document {
            id: document_id,
            file_type: file_type(&source.file_name, &source.mime_type),
            file_name: source.file_name,
            metadata: DocumentMetadata {
                created_at: Utc::now(),
                file_size: source.file_size,
                mime_type: source.mime_type,
                page_count: Some(reconstructed.page_count),
                total_token_count: self.tokens.count(&raw_text),
            },
            raw_text,
            chunks,
            relationships,
        };

        Assembly { document, warnings }
    }

    fn chunk_metadata(&self, raw: &ExtractedChunk, source_document: SourceDocument) -> ChunkMetadata {
        let temporal_context = if raw.dates.is_empty() && raw.period.is_none() {
            None
        } else {
            Some(TemporalContext {
                period: raw.period.clone(),
                date_references: raw.dates.iter().map(|d| d.date).collect(),
            })
        };

        let context_maps = raw
            .context_maps
            .iter()
            .map(|map| ContextMap {
                domain: map.domain.clone(),
                confidence: map.confidence,
                field_mappings: map
                    .field_mappings
                    .iter()
                    .map(|(field, candidates)| {
                        let candidates: Vec<FieldCandidate> = candidates
                            .iter()
                            .map(|c| FieldCandidate {
                                detected_value: c.detected_value.clone(),
                                context_terms: c.context_terms.clone(),
                                confidence: c.confidence,
                            })
                            .collect();
                        (field.clone(), candidates)
                    })
                    .collect(),
            })
            .collect();

        ChunkMetadata {
            token_count: self.tokens.count(&raw.text),
            language_code: raw.language.clone(),
            confidence: raw.confidence,
            topics: raw.topics.clone(),
            entities: raw.entities.clone(),
            temporal_context,
            numerical_values: summarize_values(&raw.values),
            value_details: raw.values.clone(),
            source_document,
            context_maps,
        }
    }
}

/// Collapses per-value annotations into one record; mixed types become `Other`.
fn summarize_values(values: &[ExtractedValue]) -> Option<NumericalValues> {
    let first = values.first()?;

    let value_type = if values.iter().all(|v| v.value_type == first.value_type) {
        first.value_type
    } else {
        ValueType::Other
    };

    let unit = first
        .unit
        .as_ref()
        .filter(|unit| values.iter().all(|v| v.unit.as_ref() == Some(*unit)))
        .cloned();

    Some(NumericalValues {
        values: values.iter().map(|v| v.value).collect(),
        unit,
        value_type,
    })
}

fn file_type(file_name: &str, mime_type: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| {
            mime_type
                .rsplit('/')
                .next()
                .unwrap_or(mime_type)
                .to_lowercase()
        })
}
