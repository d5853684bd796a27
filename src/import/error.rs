//! Error types for file ingestion

use std::path::PathBuf;

use thiserror::Error;

use super::FileKind;

/// Errors that can occur while turning uploaded bytes into a raw table
#[derive(Error, Debug)]
pub enum IngestError {
    /// Bytes cannot be parsed as the declared format
    #[error("Unreadable {kind} file: {reason}")]
    UnreadableFile { kind: FileKind, reason: String },

    /// Parsing succeeded but produced no data rows
    #[error("File contains no data rows")]
    EmptyFile,

    /// Upload exceeds the configured size ceiling
    #[error("File is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },

    /// File extension or declared kind is not supported
    #[error("Unsupported file type: {0}")]
    UnsupportedKind(String),

    /// File could not be read from disk
    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    pub(crate) fn unreadable(kind: FileKind, reason: impl Into<String>) -> Self {
        IngestError::UnreadableFile {
            kind,
            reason: reason.into(),
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            IngestError::UnreadableFile { kind, reason } => format!(
                "The uploaded file could not be read as {kind}: {reason}\n\n\
                Hint: Check that the file extension matches its contents."
            ),
            IngestError::EmptyFile => "The uploaded file has no data rows.\n\n\
                Hint: Make sure the sheet has a header row followed by at least one row of data."
                .to_string(),
            IngestError::FileTooLarge { limit, .. } => format!(
                "The uploaded file is too large (limit {} MB).\n\n\
                Hint: Split the data into several smaller files.",
                limit / (1024 * 1024)
            ),
            IngestError::UnsupportedKind(kind) => format!(
                "Unsupported file type '{kind}'.\n\n\
                Hint: Upload a .csv, .tsv, .xlsx, .json or .jsonl file."
            ),
            _ => self.to_string(),
        }
    }
}
