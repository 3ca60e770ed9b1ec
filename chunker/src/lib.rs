//! Reading-order reconstruction of OCR output and structured chunking of the
//! recovered text.
//!
//! ```text
//! bytes ──▶ OcrProvider ──▶ TextReconstructor ──▶ ChunkExtractor ──▶ DocumentAssembler ──▶ Document
//! ```

pub mod assembly;
pub mod blocks;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod openai_service;
pub mod pipeline;
pub mod reconstructor;
pub mod schema;
pub mod textract_service;
pub mod tokens;

pub use assembly::{Assembly, DocumentAssembler, DocumentSource, LocationResolutionWarning};
pub use blocks::{Block, BlockType, DetectDocumentTextResponse};
pub use capabilities::{ExtractionProvider, ExtractionRequest, OcrProvider};
pub use config::Config;
pub use error::{IngestError, SchemaError};
pub use extractor::ChunkExtractor;
pub use models::*;
pub use openai_service::OpenAiService;
pub use pipeline::{DocumentPipeline, UploadedFile};
pub use reconstructor::{ReconstructedText, TextReconstructor};
pub use textract_service::TextractService;
pub use tokens::TokenCounter;
