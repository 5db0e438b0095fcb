//! docmerge library
//!
//! Converts Word documents to PDF and back, and merges Word/PDF files into a
//! single PDF. This library provides functionality to:
//! - Convert Word to PDF through a chain of external backends
//! - Extract the text of a PDF into a Word document
//! - Open encrypted PDFs, asking a caller-supplied resolver for passwords
//! - Merge documents with an optional table of contents and page numbers
//! - Serve all of the above over HTTP
//!
//! # Example
//!
//! ```no_run
//! use docmerge::merger::{merge_documents, MergeOptions, SourceItem};
//! use docmerge::numbering::PageNumberFormat;
//! use docmerge::password::RejectEncrypted;
//! use std::path::Path;
//!
//! let items = vec![
//!     SourceItem::new("1. intro.docx"),
//!     SourceItem::new("2. advanced.pdf"),
//! ];
//! let options = MergeOptions {
//!     generate_toc: true,
//!     add_page_numbers: true,
//!     page_number_format: PageNumberFormat::Roman,
//!     start_page_number: 1,
//! };
//!
//! merge_documents(&items, Path::new("merged.pdf"), &options, &mut RejectEncrypted)
//!     .expect("Failed to merge documents");
//! ```

pub mod convert;
pub mod error;
pub mod layout;
pub mod merger;
pub mod numbering;
pub mod password;
pub mod pdf;
pub mod server;

// Re-export commonly used items
pub use error::{Error, MergeStage, Result};
pub use merger::{merge_documents, MergeOptions, Merger, SourceItem};
