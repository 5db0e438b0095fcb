//! Error types for the docmerge library

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a merge run, used to tag failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Preparing,
    TableOfContents,
    Concatenating,
    PageNumbering,
    Finalizing,
    Done,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::Preparing => "preparing",
            MergeStage::TableOfContents => "table of contents",
            MergeStage::Concatenating => "concatenating",
            MergeStage::PageNumbering => "page numbering",
            MergeStage::Finalizing => "finalizing",
            MergeStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Main error type for the docmerge library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The PDF is encrypted and no password was supplied
    #[error("'{file}' is encrypted and needs a password")]
    NeedsPassword { file: String },

    /// The supplied password did not decrypt the PDF
    #[error("wrong password for '{file}'")]
    WrongPassword { file: String },

    /// The caller declined to supply a password
    #[error("cancelled, no password for file '{file}'")]
    PasswordCancelled { file: String },

    /// Encrypted input reached a surface that cannot prompt for passwords
    #[error("encrypted PDF '{file}' encountered; interactive password input is not supported")]
    EncryptedInputRejected { file: String },

    /// Every Word -> PDF backend failed
    #[error("could not convert Word file '{file}': all conversion backends failed")]
    ConversionBackendFailed { file: String },

    /// Input is neither a Word document nor a PDF
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),

    /// A conversion reported success but produced nothing usable
    #[error("output is empty or missing: {}", .0.display())]
    EmptyOrMissingOutput(PathBuf),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Nothing to merge
    #[error("No input files provided")]
    NoInputs,

    /// A page's number cannot be written in the requested format
    #[error("page {page} cannot be numbered in {format} format: number out of range")]
    PageNumberOutOfRange { page: usize, format: String },

    /// A merge stage failed for a specific file or artifact
    #[error("{stage} failed for '{subject}': {source}")]
    Stage {
        stage: MergeStage,
        subject: String,
        #[source]
        source: Box<Error>,
    },

    /// Word document writing error
    #[error("Word document error: {0}")]
    Docx(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Wrap this error with the stage and subject it occurred in.
    ///
    /// Password decisions already name their file and pass through untouched.
    pub fn in_stage(self, stage: MergeStage, subject: impl Into<String>) -> Self {
        match self {
            Error::PasswordCancelled { .. }
            | Error::EncryptedInputRejected { .. }
            | Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                subject: subject.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_names_file_and_stage() {
        let err = Error::ConversionBackendFailed { file: "a.docx".into() }
            .in_stage(MergeStage::Preparing, "a.docx");
        let msg = err.to_string();
        assert!(msg.contains("preparing"), "{msg}");
        assert!(msg.contains("a.docx"), "{msg}");
        assert!(matches!(err.root(), Error::ConversionBackendFailed { .. }));
    }

    #[test]
    fn test_cancellation_is_not_rewrapped() {
        let err = Error::PasswordCancelled { file: "x.pdf".into() }
            .in_stage(MergeStage::Preparing, "x.pdf");
        assert!(matches!(err, Error::PasswordCancelled { .. }));
    }
}
