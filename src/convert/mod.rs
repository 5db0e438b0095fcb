//! Word -> PDF conversion through a chain of external backends
//!
//! Backends are tried in a fixed order and the first one that leaves a
//! non-empty PDF at the requested path wins. A failing backend is logged and
//! skipped; only when every backend has failed does the caller see a failure.

pub mod pdf_to_word;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pdf::reader::display_name;

/// What kind of document a path denotes, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `.doc` or `.docx`
    Word,
    /// `.pdf`
    Pdf,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "doc" | "docx" => Ok(DocumentKind::Word),
            "pdf" => Ok(DocumentKind::Pdf),
            _ => Err(Error::UnsupportedFileType(path.to_path_buf())),
        }
    }
}

/// One way of turning a Word document into a PDF
pub trait ConversionBackend: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Convert `input` into a PDF at `output`
    ///
    /// Both paths are absolute. Returning `Ok` is not enough for the chain
    /// to accept the result; the output must also exist and be non-empty.
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// The capability the merge orchestrator needs from a converter
pub trait WordToPdf: Send + Sync {
    /// Convert `word` to `pdf`, reporting only whether it worked
    fn convert(&self, word: &Path, pdf: &Path) -> bool;
}

impl<T: WordToPdf + ?Sized> WordToPdf for Arc<T> {
    fn convert(&self, word: &Path, pdf: &Path) -> bool {
        (**self).convert(word, pdf)
    }
}

/// Ordered chain of conversion backends
pub struct Converter {
    backends: Vec<Box<dyn ConversionBackend>>,
}

impl Default for Converter {
    /// docx2pdf, then Word automation (Windows only), then LibreOffice
    fn default() -> Self {
        let mut backends: Vec<Box<dyn ConversionBackend>> = vec![Box::new(Docx2PdfBackend)];
        if cfg!(windows) {
            backends.push(Box::new(WordAutomationBackend));
        }
        backends.push(Box::new(LibreOfficeBackend::default()));
        Self { backends }
    }
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A converter trying exactly `backends`, in order
    pub fn with_backends(backends: Vec<Box<dyn ConversionBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Convert, failing with [`Error::ConversionBackendFailed`] when every
    /// backend has been exhausted
    pub fn convert_checked(&self, word: &Path, pdf: &Path) -> Result<()> {
        let input = std::path::absolute(word)?;
        let output = std::path::absolute(pdf)?;

        if !input.exists() {
            return Err(Error::FileNotFound(input));
        }

        for backend in &self.backends {
            debug!(backend = backend.name(), input = %input.display(), "trying conversion backend");

            match backend.convert(&input, &output) {
                Ok(()) if is_usable_output(&output) => {
                    info!(
                        backend = backend.name(),
                        input = %input.display(),
                        output = %output.display(),
                        "converted Word document to PDF"
                    );
                    return Ok(());
                }
                Ok(()) => {
                    warn!(backend = backend.name(), output = %output.display(), "backend produced no output");
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "conversion backend failed");
                }
            }

            // An empty leftover would look like success to the next check
            if output.exists() && !is_usable_output(&output) {
                let _ = fs::remove_file(&output);
            }
        }

        warn!(input = %input.display(), "all conversion backends failed");
        Err(Error::ConversionBackendFailed {
            file: display_name(word),
        })
    }
}

impl WordToPdf for Converter {
    fn convert(&self, word: &Path, pdf: &Path) -> bool {
        self.convert_checked(word, pdf).is_ok()
    }
}

/// The output exists and has at least one byte
pub fn is_usable_output(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Run a command, turning a non-zero exit into an error carrying stderr
fn run(command: &mut Command) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command.output()?;

    if !output.status.success() {
        return Err(Error::General(format!(
            "{} exited with status {:?}: {}",
            program,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// The `docx2pdf` command-line tool
#[derive(Debug, Clone, Copy, Default)]
pub struct Docx2PdfBackend;

impl ConversionBackend for Docx2PdfBackend {
    fn name(&self) -> &'static str {
        "docx2pdf"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        run(Command::new("docx2pdf").arg(input).arg(output))
    }
}

/// Microsoft Word driven over COM through PowerShell
///
/// The document is closed and Word quit in `finally` blocks, so the
/// instance goes away even when opening or saving fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordAutomationBackend;

/// `wdExportFormatPDF`
const WORD_EXPORT_FORMAT_PDF: u32 = 17;

impl WordAutomationBackend {
    fn script() -> String {
        format!(
            r#"$ErrorActionPreference = 'Stop'
$word = New-Object -ComObject Word.Application
$word.Visible = $false
try {{
    $doc = $word.Documents.Open($env:DOCMERGE_IN)
    try {{
        $doc.ExportAsFixedFormat($env:DOCMERGE_OUT, {format})
    }} finally {{
        $doc.Close([ref]$false)
    }}
}} finally {{
    $word.Quit()
    [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($word)
}}
"#,
            format = WORD_EXPORT_FORMAT_PDF
        )
    }
}

impl ConversionBackend for WordAutomationBackend {
    fn name(&self) -> &'static str {
        "word-automation"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        if !cfg!(windows) {
            return Err(Error::General("Word automation is only available on Windows".to_string()));
        }

        // Paths travel through the environment to avoid quoting them into the script
        run(Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(Self::script())
            .env("DOCMERGE_IN", input)
            .env("DOCMERGE_OUT", output))
    }
}

/// LibreOffice in headless mode
#[derive(Debug, Clone, Default)]
pub struct LibreOfficeBackend {
    /// Use this executable instead of searching for one
    pub executable: Option<PathBuf>,
}

impl LibreOfficeBackend {
    /// Well-known install locations for the current platform
    fn known_locations() -> Vec<PathBuf> {
        let paths: &[&str] = if cfg!(windows) {
            &[
                r"C:\Program Files\LibreOffice\program\soffice.exe",
                r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
            ]
        } else if cfg!(target_os = "macos") {
            &["/Applications/LibreOffice.app/Contents/MacOS/soffice"]
        } else {
            &[
                "/usr/bin/soffice",
                "/usr/lib/libreoffice/program/soffice",
                "/opt/libreoffice/program/soffice",
                "/snap/bin/libreoffice",
            ]
        };
        paths.iter().map(PathBuf::from).collect()
    }

    /// Find `soffice`: the configured executable, known locations, then `PATH`
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(executable) = &self.executable {
            return executable.is_file().then(|| executable.clone());
        }

        if let Some(found) = Self::known_locations().into_iter().find(|p| p.is_file()) {
            return Some(found);
        }

        let names: &[&str] = if cfg!(windows) {
            &["soffice.exe", "soffice.com"]
        } else {
            &["soffice", "libreoffice"]
        };
        let path_var = env::var_os("PATH").unwrap_or_else(OsString::new);
        env::split_paths(&path_var)
            .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }
}

impl ConversionBackend for LibreOfficeBackend {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let soffice = self
            .locate()
            .ok_or_else(|| Error::General("LibreOffice (soffice) not found".to_string()))?;

        let output_parent = output
            .parent()
            .ok_or_else(|| Error::General(format!("invalid output path: {}", output.display())))?;

        // LibreOffice names its output after the input stem; a private
        // directory keeps it from overwriting a neighbouring file.
        let outdir = TempDir::new_in(output_parent)?;

        run(Command::new(&soffice)
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(outdir.path())
            .arg(input))?;

        let stem = input
            .file_stem()
            .ok_or_else(|| Error::General(format!("invalid input path: {}", input.display())))?;
        let mut produced = outdir.path().join(stem);
        produced.set_extension("pdf");

        if !produced.exists() {
            return Err(Error::EmptyOrMissingOutput(produced));
        }
        fs::rename(&produced, output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Outcome {
        Writes(&'static [u8]),
        WritesNothing,
        Fails,
    }

    struct FakeBackend {
        name: &'static str,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn boxed(name: &'static str, outcome: Outcome, calls: &Arc<AtomicUsize>) -> Box<dyn ConversionBackend> {
            Box::new(FakeBackend {
                name,
                outcome,
                calls: Arc::clone(calls),
            })
        }
    }

    impl ConversionBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn convert(&self, input: &Path, output: &Path) -> Result<()> {
            assert!(input.is_absolute() && output.is_absolute());
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Writes(bytes) => Ok(fs::write(output, bytes)?),
                Outcome::WritesNothing => Ok(fs::write(output, b"")?),
                Outcome::Fails => Err(Error::General(format!("{} unavailable", self.name))),
            }
        }
    }

    fn word_input(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("report.docx");
        fs::write(&path, b"not really a docx").unwrap();
        path
    }

    #[test]
    fn test_first_success_stops_the_chain() {
        let dir = TempDir::new().unwrap();
        let input = word_input(&dir);
        let output = dir.path().join("report.pdf");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let converter = Converter::with_backends(vec![
            FakeBackend::boxed("one", Outcome::Writes(b"%PDF-1.5"), &first),
            FakeBackend::boxed("two", Outcome::Writes(b"%PDF-1.5"), &second),
        ]);

        assert!(WordToPdf::convert(&converter, &input, &output));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&output).unwrap(), b"%PDF-1.5");
    }

    #[test]
    fn test_failures_and_empty_output_fall_through() {
        let dir = TempDir::new().unwrap();
        let input = word_input(&dir);
        let output = dir.path().join("report.pdf");
        let calls = Arc::new(AtomicUsize::new(0));

        let converter = Converter::with_backends(vec![
            FakeBackend::boxed("broken", Outcome::Fails, &calls),
            FakeBackend::boxed("empty", Outcome::WritesNothing, &calls),
            FakeBackend::boxed("works", Outcome::Writes(b"%PDF"), &calls),
        ]);

        converter.convert_checked(&input, &output).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(is_usable_output(&output));
    }

    #[test]
    fn test_all_backends_failing_reports_false() {
        let dir = TempDir::new().unwrap();
        let input = word_input(&dir);
        let output = dir.path().join("report.pdf");
        let calls = Arc::new(AtomicUsize::new(0));

        let converter = Converter::with_backends(vec![
            FakeBackend::boxed("broken", Outcome::Fails, &calls),
            FakeBackend::boxed("empty", Outcome::WritesNothing, &calls),
        ]);

        assert!(!WordToPdf::convert(&converter, &input, &output));
        match converter.convert_checked(&input, &output) {
            Err(Error::ConversionBackendFailed { file }) => assert_eq!(file, "report.docx"),
            other => panic!("expected ConversionBackendFailed, got {:?}", other),
        }
        // The empty file from the second backend is not left behind
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_is_not_sent_to_backends() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let converter =
            Converter::with_backends(vec![FakeBackend::boxed("one", Outcome::Writes(b"x"), &calls)]);

        let result = converter.convert_checked(&dir.path().join("missing.docx"), &dir.path().join("out.pdf"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_chain_order() {
        let names = Converter::new().backend_names();
        assert_eq!(names.first(), Some(&"docx2pdf"));
        assert_eq!(names.last(), Some(&"libreoffice"));
        assert_eq!(names.contains(&"word-automation"), cfg!(windows));
    }

    #[test]
    fn test_document_kind_from_path() {
        assert_eq!(DocumentKind::from_path(Path::new("a.DOCX")).unwrap(), DocumentKind::Word);
        assert_eq!(DocumentKind::from_path(Path::new("a.doc")).unwrap(), DocumentKind::Word);
        assert_eq!(DocumentKind::from_path(Path::new("dir/b.Pdf")).unwrap(), DocumentKind::Pdf);
        assert!(matches!(
            DocumentKind::from_path(Path::new("notes.txt")),
            Err(Error::UnsupportedFileType(_))
        ));
        assert!(DocumentKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_word_automation_script_tears_down_word() {
        let script = WordAutomationBackend::script();
        assert!(script.contains("finally"));
        assert!(script.contains("$word.Quit()"));
        assert!(script.contains("ExportAsFixedFormat($env:DOCMERGE_OUT, 17)"));
    }

    #[test]
    fn test_libreoffice_missing_executable() {
        let backend = LibreOfficeBackend {
            executable: Some(PathBuf::from("/definitely/not/here/soffice")),
        };
        assert!(backend.locate().is_none());

        let dir = TempDir::new().unwrap();
        let input = word_input(&dir);
        assert!(backend.convert(&input, &dir.path().join("out.pdf")).is_err());
    }
}
