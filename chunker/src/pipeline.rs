use crate::assembly::{Assembly, DocumentAssembler, DocumentSource};
use crate::capabilities::{ExtractionProvider, OcrProvider};
use crate::config::Config;
use crate::error::IngestError;
use crate::extractor::ChunkExtractor;
use crate::openai_service::OpenAiService;
use crate::reconstructor::{ReconstructedText, TextReconstructor};
use crate::textract_service::TextractService;
use crate::tokens::TokenCounter;
use std::sync::Arc;

/// One uploaded document as handed over by the calling surface.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// OCR, then extraction, then assembly, strictly in that order.
///
/// Holds no per-document state, so one pipeline can serve concurrent
/// uploads. Dropping the future returned by [`DocumentPipeline::process`]
/// abandons whichever capability call is in flight.
pub struct DocumentPipeline {
    ocr: Arc<dyn OcrProvider>,
    extractor: ChunkExtractor,
    reconstructor: TextReconstructor,
    tokens: TokenCounter,
}

impl DocumentPipeline {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        extraction: Arc<dyn ExtractionProvider>,
        config: &Config,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            ocr,
            extractor: ChunkExtractor::new(extraction)
                .with_temperature(config.extraction_temperature),
            reconstructor: TextReconstructor::new(config.line_threshold),
            tokens: TokenCounter::new()?,
        })
    }

    /// Wires Textract and OpenAI from configuration.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        log::info!("Initializing document pipeline...");
        let ocr = Arc::new(TextractService::new(config)?);
        let extraction = Arc::new(OpenAiService::new(config)?);
        Self::new(ocr, extraction, config)
    }

    pub async fn reconstruct(&self, upload: &UploadedFile) -> Result<ReconstructedText, IngestError> {
        log::info!("OCR started for {}", upload.file_name);
        let blocks = self
            .ocr
            .detect_blocks(&upload.bytes, &upload.mime_type)
            .await
            .map_err(IngestError::Reconstruction)?;
        log::info!("OCR finished: {} blocks", blocks.len());

        Ok(self.reconstructor.reconstruct(&blocks))
    }

    pub async fn process(&self, upload: UploadedFile) -> Result<Assembly, IngestError> {
        let reconstructed = self.reconstruct(&upload).await?;
        let extracted = self.extractor.extract(&reconstructed.text).await?;

        let source = DocumentSource {
            file_size: upload.bytes.len() as u64,
            file_name: upload.file_name,
            mime_type: upload.mime_type,
        };

        Ok(DocumentAssembler::new(&self.tokens).assemble(source, reconstructed, extracted))
    }
}
