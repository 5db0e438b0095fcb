//! Table-of-contents page generation
//!
//! The TOC is a small A4 document: a "目錄" heading followed by one line per
//! merged document giving its title and the page it starts on. Lines flow
//! onto further pages when the bottom margin is reached.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::Result;
use crate::layout::{Length, PageDimensions};
use crate::pdf::fonts::{add_traditional_chinese, ucs2_hex};

/// Heading drawn at the top of the first TOC page
pub const TOC_HEADING: &str = "目錄";

/// Titles longer than this many characters are shortened
pub const MAX_TITLE_CHARS: usize = 50;

/// One line of the table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub start_page: u32,
}

/// Compute the starting page of each document
///
/// Counting begins with the TOC page itself as page 1, so the first document
/// starts on page 2 and each later one after the pages of all before it.
pub fn plan_entries<'a, I>(documents: I) -> Vec<TocEntry>
where
    I: IntoIterator<Item = (&'a str, usize)>,
{
    let mut pages_before: u32 = 1;
    documents
        .into_iter()
        .map(|(title, page_count)| {
            let entry = TocEntry {
                title: title.to_string(),
                start_page: pages_before + 1,
            };
            pages_before += page_count as u32;
            entry
        })
        .collect()
}

/// Shorten titles beyond [`MAX_TITLE_CHARS`] to 47 characters plus "..."
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() > MAX_TITLE_CHARS {
        let head: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

/// Geometry of the generated pages, in points from the bottom-left corner
#[derive(Debug, Clone, Copy)]
pub struct TocLayout {
    pub page: PageDimensions,
    pub heading_x: f64,
    pub heading_y: f64,
    pub heading_font_size: f64,
    pub first_entry_y: f64,
    pub continuation_y: f64,
    pub line_pitch: f64,
    pub bottom_limit: f64,
    pub entry_x: f64,
    pub number_x: f64,
    pub entry_font_size: f64,
}

impl Default for TocLayout {
    fn default() -> Self {
        Self {
            page: PageDimensions::a4(),
            heading_x: Length::from_cm(4.0).pt(),
            heading_y: Length::from_cm(27.0).pt(),
            heading_font_size: 24.0,
            first_entry_y: Length::from_cm(25.0).pt(),
            continuation_y: Length::from_cm(27.0).pt(),
            line_pitch: Length::from_cm(0.8).pt(),
            bottom_limit: Length::from_cm(2.0).pt(),
            entry_x: Length::from_cm(2.0).pt(),
            number_x: Length::from_cm(16.0).pt(),
            entry_font_size: 12.0,
        }
    }
}

/// Where an entry lands: page index and baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: usize,
    pub y: f64,
}

/// Assign each of `count` entries a page and baseline
pub fn paginate(count: usize, layout: &TocLayout) -> Vec<Placement> {
    let mut placements = Vec::with_capacity(count);
    let mut page = 0;
    let mut y = layout.first_entry_y;
    let mut page_full = false;

    for _ in 0..count {
        if page_full {
            page += 1;
            y = layout.continuation_y;
            page_full = false;
        }
        placements.push(Placement { page, y });
        y -= layout.line_pitch;
        if y < layout.bottom_limit {
            page_full = true;
        }
    }

    placements
}

/// Build the table-of-contents document
pub fn build_toc(entries: &[TocEntry]) -> Result<Document> {
    build_toc_with_layout(entries, &TocLayout::default())
}

/// Build the table-of-contents document with explicit geometry
pub fn build_toc_with_layout(entries: &[TocEntry], layout: &TocLayout) -> Result<Document> {
    let placements = paginate(entries.len(), layout);
    let page_count = placements.last().map(|p| p.page + 1).unwrap_or(1);

    let mut contents = vec![String::new(); page_count];
    contents[0].push_str(&text_run(
        TOC_HEADING,
        layout.heading_font_size,
        layout.heading_x,
        layout.heading_y,
    ));

    for (index, (entry, placement)) in entries.iter().zip(&placements).enumerate() {
        let line = format!("{}. {}", index + 1, truncate_title(&entry.title));
        let content = &mut contents[placement.page];
        content.push_str(&text_run(&line, layout.entry_font_size, layout.entry_x, placement.y));
        content.push_str(&text_run(
            &entry.start_page.to_string(),
            layout.entry_font_size,
            layout.number_x,
            placement.y,
        ));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = add_traditional_chinese(&mut doc);

    let [llx, lly, urx, ury] = layout.page.media_box();
    let media_box = Object::Array(vec![
        Object::Real(llx as f32),
        Object::Real(lly as f32),
        Object::Real(urx as f32),
        Object::Real(ury as f32),
    ]);

    let kids: Vec<Object> = contents
        .into_iter()
        .map(|content| {
            let page_id = add_page(&mut doc, pages_id, font_id, media_box.clone(), content);
            Object::Reference(page_id)
        })
        .collect();

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    Ok(doc)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    media_box: Object,
    content: String,
) -> ObjectId {
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set("MediaBox", media_box);
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Reference(content_id));

    doc.add_object(Object::Dictionary(page))
}

/// A single left-aligned text run in content stream syntax
fn text_run(text: &str, font_size: f64, x: f64, y: f64) -> String {
    format!(
        "BT\n/F1 {} Tf\n1 0 0 1 {:.2} {:.2} Tm\n{} Tj\nET\n",
        font_size,
        x,
        y,
        ucs2_hex(text)
    )
}
