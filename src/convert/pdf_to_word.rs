//! PDF -> Word conversion
//!
//! Only the text survives: each source page becomes a run of paragraphs,
//! one per extracted line, and pages are separated by page breaks.

use std::fs::File;
use std::path::Path;

use docx_rs::{BreakType, Docx, Paragraph, Run};
use lopdf::Document;
use tracing::{info, warn};

use crate::convert::is_usable_output;
use crate::error::{Error, Result};
use crate::pdf::reader::{LopdfOpener, PdfOpener};

/// Convert `pdf` to a `.docx` at `docx`
///
/// Encrypted input needs `password`; without one this fails with
/// [`Error::NeedsPassword`].
pub fn convert(pdf: &Path, docx: &Path, password: Option<&str>) -> Result<()> {
    let doc = LopdfOpener.open(pdf, password)?;
    let pages = page_lines(&doc);

    let file = File::create(docx)?;
    build_docx(&pages)
        .build()
        .pack(file)
        .map_err(|e| Error::Docx(e.to_string()))?;

    if !is_usable_output(docx) {
        return Err(Error::EmptyOrMissingOutput(docx.to_path_buf()));
    }

    info!(input = %pdf.display(), output = %docx.display(), pages = pages.len(), "converted PDF to Word");
    Ok(())
}

/// Non-empty text lines of every page, in page order
pub fn page_lines(doc: &Document) -> Vec<Vec<String>> {
    doc.get_pages()
        .keys()
        .map(|&number| match doc.extract_text(&[number]) {
            Ok(text) => text
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(page = number, error = %e, "could not extract text, page left blank");
                Vec::new()
            }
        })
        .collect()
}

fn build_docx(pages: &[Vec<String>]) -> Docx {
    let mut docx = Docx::new();

    for (i, lines) in pages.iter().enumerate() {
        if i > 0 {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
        }
        for line in lines {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
        }
    }

    docx
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};
    use tempfile::TempDir;

    fn text_pdf(pages: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = format!("BT\n/F1 12 Tf\n72 720 Td\n({}) Tj\nET\n", text);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_page_lines_follow_page_order() {
        let doc = text_pdf(&["First page", "Second page"]);
        let pages = page_lines(&doc);
        assert_eq!(pages.len(), 2);
        assert!(pages[0].join(" ").contains("First page"));
        assert!(pages[1].join(" ").contains("Second page"));
    }

    #[test]
    fn test_convert_writes_docx() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("notes.pdf");
        let docx = dir.path().join("notes.docx");
        text_pdf(&["Hello world", "Goodbye"]).save(&pdf).unwrap();

        convert(&pdf, &docx, None).unwrap();

        let bytes = std::fs::read(&docx).unwrap();
        // A .docx is a zip archive
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_convert_missing_input() {
        let dir = TempDir::new().unwrap();
        let result = convert(&dir.path().join("missing.pdf"), &dir.path().join("out.docx"), None);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
        assert!(!dir.path().join("out.docx").exists());
    }
}
