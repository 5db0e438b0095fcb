//! Opening PDFs, with password handling for encrypted documents
//!
//! Opening never retries on its own. An encrypted file opened without a
//! password fails with [`Error::NeedsPassword`]; a password that does not
//! decrypt it fails with [`Error::WrongPassword`]. Every attempt loads the
//! file afresh, so a failed attempt leaves nothing behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use lopdf::{Document, Object, ObjectId, Reader};
use tracing::debug;

use crate::error::{Error, Result};

/// Something that can turn a PDF path into a readable document
///
/// The merge orchestrator goes through this seam so alternative readers can
/// be plugged in.
pub trait PdfOpener: Send + Sync {
    /// Open `path`, decrypting with `password` when one is given
    fn open(&self, path: &Path, password: Option<&str>) -> Result<Document>;
}

/// The lopdf-backed reader
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfOpener;

impl PdfOpener for LopdfOpener {
    fn open(&self, path: &Path, password: Option<&str>) -> Result<Document> {
        match password {
            Some(password) => open_with_password(path, password),
            None => open(path),
        }
    }
}

/// Open an unencrypted PDF
///
/// Fails with [`Error::NeedsPassword`] if the document is encrypted.
pub fn open(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    match Document::load(path) {
        Ok(doc) if doc.is_encrypted() => Err(Error::NeedsPassword {
            file: display_name(path),
        }),
        Ok(doc) => Ok(doc),
        Err(e) => {
            if looks_encrypted(path)? {
                debug!(file = %path.display(), error = %e, "encrypted document could not be loaded without a password");
                Err(Error::NeedsPassword {
                    file: display_name(path),
                })
            } else {
                Err(Error::Pdf(e))
            }
        }
    }
}

/// Open a PDF, decrypting it with `password`
///
/// An unencrypted document opens normally and the password is ignored.
/// The returned document no longer references its encryption dictionary.
pub fn open_with_password(path: &Path, password: &str) -> Result<Document> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let bytes = fs::read(path)?;
    if !declares_encryption(&bytes) {
        return Ok(Document::load_mem(&bytes)?);
    }

    let mut doc = load_undecrypted(&bytes)?;
    if !doc.is_encrypted() {
        return Err(Error::General(format!(
            "'{}' declares encryption but has no usable encryption dictionary",
            display_name(path)
        )));
    }

    if let Err(e) = doc.authenticate_password(password) {
        debug!(file = %path.display(), error = %e, "password rejected");
        return Err(Error::WrongPassword {
            file: display_name(path),
        });
    }

    doc.decrypt(password)?;
    strip_encryption(&mut doc);
    doc.encryption_state = None;
    Ok(doc)
}

/// Parse every object of an encrypted file without decrypting anything
///
/// lopdf only parses the objects of an encrypted file when the empty
/// password opens it. To reach them with any other password, the trailer's
/// `/Encrypt` key is renamed to a name of the same length (so every xref
/// offset stays valid) and object streams are renamed while loading so the
/// reader does not try to unpack their still-encrypted data. Both are put
/// back afterwards, leaving a document that `Document::decrypt` can finish.
fn load_undecrypted(bytes: &[u8]) -> Result<Document> {
    let masked = mask_encrypt_key(bytes);

    let mut doc = Reader {
        buffer: &masked,
        document: Document::new(),
        encryption_state: None,
        raw_objects: BTreeMap::new(),
    }
    .read(Some(mask_object_stream as ObjectFilter))?;

    if let Some(encrypt) = doc.trailer.remove(&MASKED_ENCRYPT_KEY[1..]) {
        doc.trailer.set("Encrypt", encrypt);
    }

    for object in doc.objects.values_mut() {
        if let Object::Stream(stream) = object {
            if stream.dict.has_type(MASKED_OBJECT_STREAM) {
                stream.dict.set("Type", Object::Name(b"ObjStm".to_vec()));
            }
        }
    }

    Ok(doc)
}

type ObjectFilter = fn(ObjectId, &mut Object) -> Option<(ObjectId, Object)>;

const ENCRYPT_KEY: &[u8] = b"/Encrypt";
const MASKED_ENCRYPT_KEY: &[u8] = b"/Encrypx";
const MASKED_OBJECT_STREAM: &[u8] = b"EncryptedObjStm";

fn mask_object_stream(id: ObjectId, object: &mut Object) -> Option<(ObjectId, Object)> {
    if let Object::Stream(stream) = object {
        if stream.dict.has_type(b"ObjStm") {
            stream.dict.set("Type", Object::Name(MASKED_OBJECT_STREAM.to_vec()));
        }
    }
    Some((id, std::mem::replace(object, Object::Null)))
}

/// Replace each `/Encrypt` name token with [`MASKED_ENCRYPT_KEY`]
///
/// Only whole tokens are touched, so `/EncryptMetadata` survives.
fn mask_encrypt_key(bytes: &[u8]) -> Vec<u8> {
    let mut masked = bytes.to_vec();
    let mut from = 0;
    while let Some(found) = find(&masked[from..], ENCRYPT_KEY) {
        let start = from + found;
        let end = start + ENCRYPT_KEY.len();
        if masked.get(end).map_or(true, |&b| is_delimiter(b)) {
            masked[start..end].copy_from_slice(MASKED_ENCRYPT_KEY);
        }
        from = end;
    }
    masked
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn is_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || b"()<>[]{}/%".contains(&byte)
}

/// Whether the file declares an encryption dictionary
pub fn is_encrypted(path: &Path) -> Result<bool> {
    looks_encrypted(path)
}

/// Drop the trailer's `/Encrypt` entry and the dictionary it points to
///
/// Applied to documents whose objects have already been decrypted in memory.
pub fn strip_encryption(doc: &mut Document) {
    if let Ok(Object::Reference(id)) = doc.trailer.get(b"Encrypt") {
        let id = *id;
        doc.objects.remove(&id);
    }
    doc.trailer.remove(b"Encrypt");
}

/// Scan the raw bytes for an `/Encrypt` key
///
/// Encrypted documents whose cross-reference data cannot be parsed without
/// the key still carry this marker in their trailer.
fn looks_encrypted(path: &Path) -> Result<bool> {
    Ok(declares_encryption(&fs::read(path)?))
}

fn declares_encryption(bytes: &[u8]) -> bool {
    find(bytes, ENCRYPT_KEY).is_some()
}

/// The file name shown to users and password prompts
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
