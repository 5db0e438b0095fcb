//! Page-number overlays written directly into PDF pages
//!
//! Each page gets its own Form XObject sized to the page's MediaBox holding
//! a single centred label. The original content streams are left as they
//! are, bracketed by a `q`/`Q` pair so any transformation they leave behind
//! does not move the label, and the overlay is drawn after them.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::layout::PageDimensions;
use crate::numbering::PageNumberFormat;
use crate::pdf::fonts::{add_helvetica, escape_pdf_string, helvetica_text_width};

/// Resource name prefix for the overlay XObject
const XOBJECT_NAME: &str = "PageNumber";

/// Typography of the page label
#[derive(Debug, Clone, Copy)]
pub struct PageNumberStyle {
    /// Font size in points
    pub font_size: f32,
    /// Baseline distance from the bottom edge of the page, in points
    pub bottom_offset: f32,
}

impl Default for PageNumberStyle {
    fn default() -> Self {
        Self {
            font_size: 10.0,
            bottom_offset: 20.0,
        }
    }
}

/// Write a page number onto every page of `doc`
///
/// Page `i` (0-based, in page order) is labelled `start + i` in `format`.
pub fn number_pages(doc: &mut Document, format: PageNumberFormat, start: u32) -> Result<()> {
    number_pages_with_style(doc, format, start, &PageNumberStyle::default())
}

/// [`number_pages`] with explicit typography
pub fn number_pages_with_style(
    doc: &mut Document,
    format: PageNumberFormat,
    start: u32,
    style: &PageNumberStyle,
) -> Result<()> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    // Checked up front so a failure leaves the document untouched
    let numbers = (0..pages.len())
        .map(|i| page_number(format, start, i))
        .collect::<Result<Vec<u32>>>()?;

    let font_id = add_helvetica(doc);

    for (i, (page_id, number)) in pages.into_iter().zip(numbers).enumerate() {
        let label = format.label(number);
        let media_box = page_media_box(doc, page_id);
        let (x, y) = label_origin(&label, style, media_box);
        debug!(page = i + 1, %label, x, y, "adding page number");

        isolate_page_content(doc, page_id)?;

        let content = label_content(&label, style, x, y);
        let xobject_id = create_label_xobject(doc, content, font_id, media_box);
        let name = add_xobject_to_page_resources(doc, page_id, xobject_id)?;

        let invoke = format!("q\n/{} Do\nQ\n", name);
        let invoke_id = doc.add_object(Stream::new(Dictionary::new(), invoke.into_bytes()));
        append_content_to_page(doc, page_id, invoke_id)?;
    }

    Ok(())
}

/// The number printed on page `index` (0-based)
///
/// Fails when the number overflows or is beyond what `format` can write.
pub fn page_number(format: PageNumberFormat, start: u32, index: usize) -> Result<u32> {
    u32::try_from(index)
        .ok()
        .and_then(|offset| start.checked_add(offset))
        .filter(|&number| number <= format.max_number())
        .ok_or_else(|| Error::PageNumberOutOfRange {
            page: index + 1,
            format: format.to_string(),
        })
}

/// Baseline origin for `label` so it sits centred near the bottom edge
///
/// `media_box` is `[llx lly urx ury]`; the origin need not be at zero.
pub fn label_origin(label: &str, style: &PageNumberStyle, media_box: [f32; 4]) -> (f32, f32) {
    let [llx, lly, urx, _] = media_box;
    let width = urx - llx;
    let text_width = helvetica_text_width(label, style.font_size);
    (llx + (width - text_width) / 2.0, lly + style.bottom_offset)
}

/// The page's MediaBox, looking through the page tree if inherited
pub fn page_media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = Some(page_id);
    // Bounded to survive cyclic Parent links
    for _ in 0..64 {
        let Some(node_id) = current else { break };
        let Ok(node) = doc.get_dictionary(node_id) else { break };

        if let Ok(value) = node.get(b"MediaBox") {
            if let Some(rect) = resolve_rect(doc, value) {
                return rect;
            }
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    // No usable MediaBox anywhere: assume US Letter
    PageDimensions::letter().media_box().map(|v| v as f32)
}

fn resolve_rect(doc: &Document, value: &Object) -> Option<[f32; 4]> {
    let value = match value {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let items = value.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }

    let mut rect = [0.0f32; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = match item {
            Object::Integer(n) => *n as f32,
            Object::Real(r) => *r,
            _ => return None,
        };
    }

    // Normalise so that [0],[1] is the lower-left corner
    Some([
        rect[0].min(rect[2]),
        rect[1].min(rect[3]),
        rect[0].max(rect[2]),
        rect[1].max(rect[3]),
    ])
}

/// Content stream operators drawing the label
fn label_content(label: &str, style: &PageNumberStyle, x: f32, y: f32) -> String {
    let mut content = String::new();
    content.push_str("0 g\n");
    content.push_str("BT\n");
    content.push_str(&format!("/F1 {} Tf\n", style.font_size));
    content.push_str(&format!("1 0 0 1 {:.2} {:.2} Tm\n", x, y));
    content.push_str(&format!("({}) Tj\n", escape_pdf_string(label)));
    content.push_str("ET\n");
    content
}

/// Create a Form XObject covering the page's MediaBox
fn create_label_xobject(
    doc: &mut Document,
    content: String,
    font_id: ObjectId,
    media_box: [f32; 4],
) -> ObjectId {
    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));

    let mut xobject_dict = Dictionary::new();
    xobject_dict.set("Type", Object::Name(b"XObject".to_vec()));
    xobject_dict.set("Subtype", Object::Name(b"Form".to_vec()));
    xobject_dict.set("FormType", Object::Integer(1));
    xobject_dict.set(
        "BBox",
        Object::Array(media_box.iter().map(|&v| Object::Real(v)).collect()),
    );
    xobject_dict.set(
        "Matrix",
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );
    xobject_dict.set("Resources", Object::Dictionary(resources));

    let xobject_stream = Stream {
        dict: xobject_dict,
        content: content.into_bytes(),
        allows_compression: true,
        start_position: None,
    };

    doc.add_object(Object::Stream(xobject_stream))
}

/// Wrap the page's existing content streams in a `q`/`Q` pair
fn isolate_page_content(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let existing = doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();

    let mut streams = match existing {
        Some(Object::Reference(id)) => vec![Object::Reference(id)],
        Some(Object::Array(items)) => items,
        _ => return Ok(()),
    };

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    streams.insert(0, Object::Reference(save_id));
    streams.push(Object::Reference(restore_id));

    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Array(streams));
    Ok(())
}

/// Register the XObject in the page's own Resources and return its name
fn add_xobject_to_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    xobject_id: ObjectId,
) -> Result<String> {
    // Resources may be shared by reference; the page gets its own copy
    let mut resources = {
        let page_dict = doc.get_dictionary(page_id)?;
        match page_dict.get(b"Resources") {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(res_id)) => match doc.get_object(*res_id) {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            },
            _ => Dictionary::new(),
        }
    };

    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(xo)) => xo.clone(),
        Ok(Object::Reference(xo_id)) => match doc.get_object(*xo_id) {
            Ok(Object::Dictionary(xo)) => xo.clone(),
            _ => Dictionary::new(),
        },
        _ => Dictionary::new(),
    };

    let name = unique_name(&xobjects, XOBJECT_NAME);
    xobjects.set(name.as_bytes().to_vec(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    doc.get_dictionary_mut(page_id)?
        .set("Resources", Object::Dictionary(resources));

    Ok(name)
}

fn unique_name(existing: &Dictionary, base: &str) -> String {
    if !existing.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !existing.has(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

/// Append a content stream to a page's Contents
///
/// Drawn after the original content so the label is not covered by
/// background fills.
fn append_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let page_dict = doc.get_dictionary_mut(page_id)?;
    let existing_content = page_dict.get(b"Contents").ok().cloned();

    match existing_content {
        Some(Object::Reference(content_id)) => {
            page_dict.set(
                "Contents",
                Object::Array(vec![
                    Object::Reference(content_id),
                    Object::Reference(new_content_id),
                ]),
            );
        }
        Some(Object::Array(mut content_array)) => {
            content_array.push(Object::Reference(new_content_id));
            page_dict.set("Contents", Object::Array(content_array));
        }
        _ => {
            page_dict.set("Contents", Object::Array(vec![Object::Reference(new_content_id)]));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Pages of differing widths, each with a one-line content stream
    fn doc_with_widths(widths: &[i64]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for (i, &w) in widths.iter().enumerate() {
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                format!("0 0 m {} 100 l S % page {}", w, i).into_bytes(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), w.into(), 800.into()],
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => widths.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    /// Content of the overlay XObject registered on a page
    fn overlay_content(doc: &Document, page_id: ObjectId) -> String {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let xobject_id = xobjects.get(XOBJECT_NAME.as_bytes()).unwrap().as_reference().unwrap();
        let stream = doc.get_object(xobject_id).unwrap().as_stream().unwrap();
        String::from_utf8_lossy(&stream.content).into_owned()
    }

    #[test]
    fn test_roman_labels_centred_per_page() {
        let widths = [400, 612, 900];
        let mut doc = doc_with_widths(&widths);
        number_pages(&mut doc, PageNumberFormat::Roman, 5).unwrap();

        let style = PageNumberStyle::default();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for ((page_id, expected), width) in pages.iter().zip(["V", "VI", "VII"]).zip(widths) {
            let content = overlay_content(&doc, *page_id);
            assert!(content.contains(&format!("({}) Tj", expected)), "{content}");

            let (x, y) = label_origin(expected, &style, [0.0, 0.0, width as f32, 800.0]);
            let text_width = helvetica_text_width(expected, style.font_size);
            assert!((x + text_width / 2.0 - width as f32 / 2.0).abs() < 1e-3);
            assert!(content.contains(&format!("1 0 0 1 {:.2} {:.2} Tm", x, y)), "{content}");
        }
    }

    #[test]
    fn test_arabic_labels_and_original_content_kept() {
        let mut doc = doc_with_widths(&[595, 595]);
        let before: Vec<Vec<u8>> = doc
            .get_pages()
            .values()
            .map(|&id| doc.get_page_content(id).unwrap())
            .collect();

        number_pages(&mut doc, PageNumberFormat::Arabic, 1).unwrap();

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for (i, page_id) in pages.iter().enumerate() {
            assert!(overlay_content(&doc, *page_id).contains(&format!("({}) Tj", i + 1)));

            let after = String::from_utf8_lossy(&doc.get_page_content(*page_id).unwrap()).into_owned();
            let original = String::from_utf8_lossy(&before[i]).into_owned();
            assert!(after.starts_with("q\n"));
            assert!(after.contains(&original));
            assert!(after.trim_end().ends_with("Q"));
            assert!(after.contains(&format!("/{} Do", XOBJECT_NAME)));
        }
    }

    #[test]
    fn test_page_number_out_of_range() {
        assert_eq!(page_number(PageNumberFormat::Arabic, 7, 2).unwrap(), 9);
        assert_eq!(page_number(PageNumberFormat::Roman, 3998, 1).unwrap(), 3999);
        assert!(matches!(
            page_number(PageNumberFormat::Roman, 3999, 1),
            Err(Error::PageNumberOutOfRange { page: 2, .. })
        ));
        assert!(matches!(
            page_number(PageNumberFormat::Arabic, u32::MAX, 1),
            Err(Error::PageNumberOutOfRange { page: 2, .. })
        ));
    }

    #[test]
    fn test_overflowing_start_leaves_document_untouched() {
        let mut doc = doc_with_widths(&[300, 300]);
        let objects_before = doc.objects.len();

        let result = number_pages(&mut doc, PageNumberFormat::Arabic, u32::MAX);
        assert!(matches!(result, Err(Error::PageNumberOutOfRange { page: 2, .. })));
        assert_eq!(doc.objects.len(), objects_before);

        let result = number_pages(&mut doc, PageNumberFormat::Roman, 3999);
        assert!(matches!(result, Err(Error::PageNumberOutOfRange { .. })));
        assert_eq!(doc.objects.len(), objects_before);
    }

    #[test]
    fn test_label_origin_respects_offset_media_box() {
        let style = PageNumberStyle::default();
        let (x, y) = label_origin("1", &style, [100.0, 50.0, 300.0, 250.0]);
        let text_width = helvetica_text_width("1", style.font_size);
        assert!((x - (100.0 + (200.0 - text_width) / 2.0)).abs() < 1e-3);
        assert!((y - 70.0).abs() < 1e-3);
    }

    #[test]
    fn test_inherited_media_box_is_found() {
        let mut doc = doc_with_widths(&[500]);
        let page_id = *doc.get_pages().values().next().unwrap();
        let pages_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Parent")
            .unwrap()
            .as_reference()
            .unwrap();
        doc.get_dictionary_mut(page_id).unwrap().remove(b"MediaBox");
        doc.get_dictionary_mut(pages_id)
            .unwrap()
            .set("MediaBox", vec![0.into(), 0.into(), 321.into(), 456.into()]);

        assert_eq!(page_media_box(&doc, page_id), [0.0, 0.0, 321.0, 456.0]);
    }

    #[test]
    fn test_unique_name_avoids_collisions() {
        let mut dict = Dictionary::new();
        assert_eq!(unique_name(&dict, "PageNumber"), "PageNumber");
        dict.set("PageNumber", Object::Null);
        dict.set("PageNumber1", Object::Null);
        assert_eq!(unique_name(&dict, "PageNumber"), "PageNumber2");
    }
}
