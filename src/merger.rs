//! The merge pipeline
//!
//! A run moves through its stages strictly in order:
//!
//! ```text
//! preparing -> table of contents? -> concatenating -> page numbering? -> finalizing -> done
//! ```
//!
//! Any failure ends the run with an error naming the stage and the file it
//! concerns. Scratch files live in a per-run temporary directory that is
//! removed however the run ends, and the output path is only written once
//! the merged document is complete.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use lopdf::Document;
use serde::Deserialize;
use tempfile::{NamedTempFile, TempDir};
use tracing::{info, warn};

use crate::convert::{Converter, DocumentKind, WordToPdf};
use crate::error::{Error, MergeStage, Result};
use crate::numbering::PageNumberFormat;
use crate::password::{PasswordPrompt, PasswordResolver};
use crate::pdf::metadata::set_document_info;
use crate::pdf::reader::{display_name, LopdfOpener, PdfOpener};
use crate::pdf::{concatenate, number_pages, plan_entries, toc};

/// One input to a merge, in the order it should appear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub path: PathBuf,
    /// Shown in the table of contents
    pub title: String,
}

impl SourceItem {
    /// An item titled after its file stem
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| display_name(&path));
        Self { path, title }
    }

    pub fn with_title(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
        }
    }
}

/// Options for one merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Prepend a table of contents
    pub generate_toc: bool,
    /// Number every page of the result
    pub add_page_numbers: bool,
    pub page_number_format: PageNumberFormat,
    /// Number printed on the first page; at least 1
    pub start_page_number: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            generate_toc: false,
            add_page_numbers: false,
            page_number_format: PageNumberFormat::Arabic,
            start_page_number: 1,
        }
    }
}

impl MergeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.start_page_number < 1 {
            return Err(Error::General(format!(
                "start page number must be at least 1, got {}",
                self.start_page_number
            )));
        }
        let max = self.page_number_format.max_number();
        if self.add_page_numbers && self.start_page_number > max {
            return Err(Error::General(format!(
                "start page number {} is too large for {} page numbers (at most {})",
                self.start_page_number, self.page_number_format, max
            )));
        }
        Ok(())
    }
}

/// An input opened and decrypted, ready to be merged
#[derive(Debug)]
pub struct PreparedDocument {
    pub title: String,
    pub document: Document,
}

impl PreparedDocument {
    /// Pages actually reachable through the page tree
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub output: PathBuf,
    pub total_pages: usize,
    /// Pages taken by the table of contents (0 when disabled)
    pub toc_pages: usize,
    /// Title and page count of each input, in order
    pub documents: Vec<(String, usize)>,
}

/// Called on every stage transition with a short description
pub type StageObserver = Box<dyn Fn(MergeStage, &str) + Send + Sync>;

/// Runs merges
///
/// The converter and the PDF opener are replaceable so that the pipeline can
/// be driven without an office suite installed.
pub struct Merger {
    converter: Box<dyn WordToPdf>,
    opener: Box<dyn PdfOpener>,
    observer: Option<StageObserver>,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            converter: Box::new(Converter::new()),
            opener: Box::new(LopdfOpener),
            observer: None,
        }
    }
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter(mut self, converter: impl WordToPdf + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_opener(mut self, opener: impl PdfOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(MergeStage, &str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn enter(&self, stage: MergeStage, detail: &str) {
        info!(%stage, "{}", detail);
        if let Some(observer) = &self.observer {
            observer(stage, detail);
        }
    }

    /// Merge `items` into a single PDF at `output`
    pub fn run(
        &self,
        items: &[SourceItem],
        output: &Path,
        options: &MergeOptions,
        resolver: &mut dyn PasswordResolver,
    ) -> Result<MergeReport> {
        options.validate()?;
        if items.is_empty() {
            return Err(Error::NoInputs);
        }

        // Removed on drop, whichever way this function returns
        let workdir = TempDir::new()?;

        let mut prepared = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let name = display_name(&item.path);
            self.enter(
                MergeStage::Preparing,
                &format!("preparing {} ({}/{})", name, index + 1, items.len()),
            );
            let document = self
                .prepare(index, item, workdir.path(), resolver)
                .map_err(|e| e.in_stage(MergeStage::Preparing, &name))?;
            prepared.push(document);
        }

        let documents: Vec<(String, usize)> = prepared
            .iter()
            .map(|p| (p.title.clone(), p.page_count()))
            .collect();

        let toc = if options.generate_toc {
            self.enter(MergeStage::TableOfContents, "building table of contents");
            let entries = plan_entries(documents.iter().map(|(title, pages)| (title.as_str(), *pages)));
            Some(toc::build_toc(&entries).map_err(|e| e.in_stage(MergeStage::TableOfContents, "table of contents"))?)
        } else {
            None
        };
        let toc_pages = toc.as_ref().map(|doc| doc.get_pages().len()).unwrap_or(0);

        self.enter(MergeStage::Concatenating, "concatenating documents");
        let parts: Vec<Document> = toc
            .into_iter()
            .chain(prepared.into_iter().map(|p| p.document))
            .collect();
        let mut merged = concatenate(parts).map_err(|e| e.in_stage(MergeStage::Concatenating, "merged document"))?;

        if options.add_page_numbers {
            self.enter(MergeStage::PageNumbering, "adding page numbers");
            number_pages(&mut merged, options.page_number_format, options.start_page_number)
                .map_err(|e| e.in_stage(MergeStage::PageNumbering, "merged document"))?;
        }

        self.enter(MergeStage::Finalizing, &format!("writing {}", output.display()));
        let total_pages = merged.get_pages().len();
        self.finalize(merged, workdir.path(), output)
            .map_err(|e| e.in_stage(MergeStage::Finalizing, output.display().to_string()))?;

        self.enter(MergeStage::Done, &format!("merged {} pages", total_pages));
        Ok(MergeReport {
            output: output.to_path_buf(),
            total_pages,
            toc_pages,
            documents,
        })
    }

    /// Convert if needed, open and decrypt one input
    fn prepare(
        &self,
        index: usize,
        item: &SourceItem,
        workdir: &Path,
        resolver: &mut dyn PasswordResolver,
    ) -> Result<PreparedDocument> {
        let name = display_name(&item.path);

        let pdf_path = match DocumentKind::from_path(&item.path)? {
            DocumentKind::Word => {
                if !item.path.exists() {
                    return Err(Error::FileNotFound(item.path.clone()));
                }
                let converted = workdir.join(format!("temp_{}.pdf", index));
                if !self.converter.convert(&item.path, &converted) {
                    return Err(Error::ConversionBackendFailed { file: name });
                }
                converted
            }
            DocumentKind::Pdf => item.path.clone(),
        };

        let document = self.open_resolving_password(&pdf_path, &name, resolver)?;
        if document.get_pages().is_empty() {
            return Err(Error::EmptyPdf(item.path.clone()));
        }

        Ok(PreparedDocument {
            title: item.title.clone(),
            document,
        })
    }

    /// Open a PDF, asking `resolver` for passwords until one works or it
    /// declines
    fn open_resolving_password(
        &self,
        path: &Path,
        name: &str,
        resolver: &mut dyn PasswordResolver,
    ) -> Result<Document> {
        match self.opener.open(path, None) {
            Err(Error::NeedsPassword { .. }) => {}
            other => return other,
        }

        let mut attempt = 1;
        loop {
            let prompt = PasswordPrompt {
                file_name: name.to_string(),
                attempt,
            };
            let Some(password) = resolver.resolve(&prompt)? else {
                return Err(Error::PasswordCancelled {
                    file: name.to_string(),
                });
            };

            match self.opener.open(path, Some(&password)) {
                Err(Error::WrongPassword { .. }) => {
                    warn!(file = name, attempt, "wrong password");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Save into the work directory, then move the finished file into place
    fn finalize(&self, mut merged: Document, workdir: &Path, output: &Path) -> Result<()> {
        set_document_info(&mut merged, None);
        merged.compress();

        let staged = workdir.join("merged.pdf");
        merged.save(&staged)?;
        copy_atomically(&staged, output)
    }
}

/// Copy `from` to `to` so that `to` is either untouched or complete
///
/// The copy is written next to the destination and renamed over it.
pub fn copy_atomically(from: &Path, to: &Path) -> Result<()> {
    let parent = match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(parent)?;
    io::copy(&mut File::open(from)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(to).map_err(|e| Error::Io(e.error))?;

    if fs::metadata(to)?.len() == 0 {
        return Err(Error::EmptyOrMissingOutput(to.to_path_buf()));
    }
    Ok(())
}

/// Merge with the default converter and reader
pub fn merge_documents(
    items: &[SourceItem],
    output: &Path,
    options: &MergeOptions,
    resolver: &mut dyn PasswordResolver,
) -> Result<MergeReport> {
    Merger::new().run(items, output, options, resolver)
}
