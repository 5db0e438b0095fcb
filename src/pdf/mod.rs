//! PDF manipulation module

pub mod fonts;
pub mod merge;
pub mod metadata;
pub mod page_numbers;
pub mod reader;
pub mod toc;

// Re-export commonly used items
pub use merge::concatenate;
pub use metadata::{count_pages, extract_metadata, page_count, PdfMetadata};
pub use page_numbers::{number_pages, PageNumberStyle};
pub use reader::{LopdfOpener, PdfOpener};
pub use toc::{build_toc, plan_entries, TocEntry};
