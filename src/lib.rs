//! Report Pipeline - turns uploaded spreadsheets into analyzed PDF reports
//!
//! Provides:
//! - Schema catalog of report types
//! - File ingestion (CSV, TSV, XLSX, JSON, JSONL)
//! - Schema validation and data normalization
//! - AI analysis through an OpenAI-compatible service
//! - Chart rendering, report composition and PDF output
//! - Email delivery
//! - Job orchestration with a bounded worker pool

pub mod catalog;
pub mod delivery;
pub mod export;
pub mod import;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod validation;

// Re-export commonly used types
pub use catalog::{CatalogError, ReportSchema, SchemaCatalog};
pub use delivery::{DeliveryConfig, DeliveryDispatcher, DeliveryError, LogTransport, MailTransport};
#[cfg(feature = "api-backend")]
pub use delivery::HttpMailTransport;
pub use export::{
    BrandingConfig, ChartRenderer, ExportError, PdfEmitter, PdfOutput, ReportComposer,
};
pub use import::{FileIngestor, FileKind, IngestError};
pub use llm::{AnalysisClient, AnalysisConfig, AnalysisError, AnalysisService};
#[cfg(feature = "api-backend")]
pub use llm::GroqClient;
pub use models::{
    AnalysisResult, CellValue, DeliveryRecord, NormalizedTable, RawTable, ReportDocument,
};
pub use normalize::{DataNormalizer, ExchangeRateTable, NormalizeError};
pub use pipeline::{
    ErrorKind, JobId, JobStatus, JobStatusView, PipelineConfig, PipelineContext, PipelineError,
    PipelineService, UploadRequest,
};
pub use validation::{SchemaValidator, ValidationReport, Violation};
