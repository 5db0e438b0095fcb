//! Document information: page counts, the Info dictionary

use std::path::Path;

use chrono::{DateTime, Local};
use lopdf::{Dictionary, Document, Object};

use crate::error::{Error, Result};
use crate::pdf::reader;

/// Producer string written into merged documents
pub const PRODUCER: &str = concat!("docmerge ", env!("CARGO_PKG_VERSION"));

/// Count pages by reading the Count field from the Pages dictionary
///
/// Falls back to walking the page tree when Count is missing or malformed.
pub fn page_count(doc: &Document) -> usize {
    count_pages_from_catalog(doc).unwrap_or_else(|| doc.get_pages().len())
}

fn count_pages_from_catalog(doc: &Document) -> Option<usize> {
    let catalog = doc.catalog().ok()?;
    let pages_id = catalog.get(b"Pages").and_then(Object::as_reference).ok()?;
    let pages = doc.get_dictionary(pages_id).ok()?;
    match pages.get(b"Count").ok()? {
        Object::Integer(n) if *n >= 0 => Some(*n as usize),
        _ => None,
    }
}

/// What `docmerge info` reports about a PDF
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Producer application (if present)
    pub producer: Option<String>,
    /// Whether the file declares encryption
    pub encrypted: bool,
}

/// Extract metadata from a PDF file
///
/// Encrypted files need `password`; without one this fails with
/// [`Error::NeedsPassword`].
pub fn extract_metadata(path: &Path, password: Option<&str>) -> Result<PdfMetadata> {
    let encrypted = path.exists() && reader::is_encrypted(path)?;
    let doc = match password {
        Some(password) => reader::open_with_password(path, password)?,
        None => reader::open(path)?,
    };

    let page_count = page_count(&doc);
    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    let info = info_dictionary(&doc);
    let field = |key: &[u8]| info.and_then(|dict| text_field(dict, key));

    Ok(PdfMetadata {
        page_count,
        title: field(b"Title"),
        author: field(b"Author"),
        producer: field(b"Producer"),
        encrypted,
    })
}

/// Count the number of pages in an unencrypted PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    let doc = reader::open(path)?;
    let page_count = page_count(&doc);

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a text string: UTF-16BE with BOM, otherwise byte-per-char
fn text_field(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).ok()?.as_str().ok()?;
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units).ok();
    }
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Some(text),
        Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Encode text as a PDF text string
///
/// ASCII stays a literal; anything else is UTF-16BE with a byte-order mark.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

/// PDF date string: `D:YYYYMMDDHHmmSS+HH'mm'`
pub fn pdf_date(time: DateTime<Local>) -> String {
    let offset = time.format("%z").to_string();
    let (hours, minutes) = offset.split_at(offset.len().min(3));
    format!("D:{}{}'{}'", time.format("%Y%m%d%H%M%S"), hours, minutes)
}

/// Replace the Info dictionary of a freshly assembled document
pub fn set_document_info(doc: &mut Document, title: Option<&str>) {
    let now = pdf_date(Local::now());

    let mut info = Dictionary::new();
    if let Some(title) = title {
        info.set("Title", text_string(title));
    }
    info.set("Producer", Object::string_literal(PRODUCER));
    info.set("CreationDate", Object::string_literal(now.clone()));
    info.set("ModDate", Object::string_literal(now));

    let info_id = doc.add_object(Object::Dictionary(info));
    doc.trailer.set("Info", Object::Reference(info_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lopdf::dictionary;
    use tempfile::TempDir;

    fn two_page_doc() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..2 {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => 2 }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_count_pages_nonexistent_file() {
        let result = count_pages(Path::new("nonexistent.pdf"));
        assert!(matches!(result.unwrap_err(), Error::FileNotFound(_)));
    }

    #[test]
    fn test_extract_metadata_nonexistent_file() {
        let result = extract_metadata(Path::new("nonexistent.pdf"), None);
        assert!(matches!(result.unwrap_err(), Error::FileNotFound(_)));
    }

    #[test]
    fn test_info_round_trip_with_cjk_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("info.pdf");
        let mut doc = two_page_doc();
        set_document_info(&mut doc, Some("合併文件"));
        doc.save(&path).unwrap();

        let meta = extract_metadata(&path, None).unwrap();
        assert_eq!(meta.page_count, 2);
        assert_eq!(meta.title.as_deref(), Some("合併文件"));
        assert_eq!(meta.producer.as_deref(), Some(PRODUCER));
        assert!(meta.author.is_none());
        assert!(!meta.encrypted);
        assert_eq!(count_pages(&path).unwrap(), 2);
    }

    #[test]
    fn test_page_count_falls_back_to_tree() {
        let mut doc = two_page_doc();
        let pages_id = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
        doc.get_dictionary_mut(pages_id).unwrap().remove(b"Count");
        assert_eq!(page_count(&doc), 2);
    }

    #[test]
    fn test_pdf_date_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let date = pdf_date(time);
        assert!(date.starts_with("D:20240309140507"), "{date}");
        assert!(date.ends_with('\''), "{date}");
    }
}
