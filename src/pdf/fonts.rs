//! Font dictionaries used by generated pages
//!
//! Neither font is embedded. Helvetica is one of the 14 standard PDF fonts;
//! the Traditional Chinese font relies on the viewer's Adobe-CNS1 support.

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Add a Helvetica Type1 font and return its object ID
pub fn add_helvetica(doc: &mut Document) -> ObjectId {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));

    doc.add_object(Object::Dictionary(font))
}

/// Helvetica advance width in 1/1000 em
///
/// Covers the glyphs page labels are made of; anything else gets the
/// digit width.
fn helvetica_char_width(c: char) -> u32 {
    match c {
        ' ' | '.' | 'I' => 278,
        'L' => 556,
        'V' | 'X' => 667,
        'C' | 'D' => 722,
        'M' => 833,
        _ => 556,
    }
}

/// Width of `text` set in Helvetica at `font_size`, in points
pub fn helvetica_text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(helvetica_char_width).sum();
    units as f32 * font_size / 1000.0
}

/// Add a Traditional Chinese CID-keyed font and return its object ID
///
/// Uses the predefined `UniCNS-UCS2-H` CMap so text is written as UCS-2
/// big-endian code units.
pub fn add_traditional_chinese(doc: &mut Document) -> ObjectId {
    let mut descriptor = Dictionary::new();
    descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
    descriptor.set("FontName", Object::Name(b"MSung-Light".to_vec()));
    descriptor.set("Flags", Object::Integer(6));
    descriptor.set(
        "FontBBox",
        Object::Array(vec![
            Object::Integer(-160),
            Object::Integer(-259),
            Object::Integer(1015),
            Object::Integer(888),
        ]),
    );
    descriptor.set("ItalicAngle", Object::Integer(0));
    descriptor.set("Ascent", Object::Integer(880));
    descriptor.set("Descent", Object::Integer(-120));
    descriptor.set("CapHeight", Object::Integer(880));
    descriptor.set("StemV", Object::Integer(93));
    let descriptor_id = doc.add_object(Object::Dictionary(descriptor));

    let mut system_info = Dictionary::new();
    system_info.set("Registry", Object::string_literal("Adobe"));
    system_info.set("Ordering", Object::string_literal("CNS1"));
    system_info.set("Supplement", Object::Integer(0));

    let mut cid_font = Dictionary::new();
    cid_font.set("Type", Object::Name(b"Font".to_vec()));
    cid_font.set("Subtype", Object::Name(b"CIDFontType0".to_vec()));
    cid_font.set("BaseFont", Object::Name(b"MSung-Light".to_vec()));
    cid_font.set("CIDSystemInfo", Object::Dictionary(system_info));
    cid_font.set("FontDescriptor", Object::Reference(descriptor_id));
    cid_font.set("DW", Object::Integer(1000));
    // CIDs 1-95 are the proportional Latin range (ASCII 0x20-0x7E)
    cid_font.set(
        "W",
        Object::Array(vec![Object::Integer(1), Object::Integer(95), Object::Integer(500)]),
    );
    let cid_font_id = doc.add_object(Object::Dictionary(cid_font));

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type0".to_vec()));
    font.set("BaseFont", Object::Name(b"MSung-Light-UniCNS-UCS2-H".to_vec()));
    font.set("Encoding", Object::Name(b"UniCNS-UCS2-H".to_vec()));
    font.set("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)]));

    doc.add_object(Object::Dictionary(font))
}

/// Encode text as a PDF hex string of UCS-2 code units: `<...>`
///
/// Characters outside the Basic Multilingual Plane become `?`.
pub fn ucs2_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4 + 2);
    out.push('<');
    for c in text.chars() {
        let unit = u16::try_from(u32::from(c)).unwrap_or(u16::from(b'?'));
        out.push_str(&format!("{:04X}", unit));
    }
    out.push('>');
    out
}

/// Escape special characters in PDF literal strings
pub fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}
