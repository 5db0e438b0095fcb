//! docmerge CLI tool
//!
//! Converts between Word and PDF, merges Word/PDF files into one PDF, and
//! serves the same operations over HTTP.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docmerge::convert::{pdf_to_word, Converter};
use docmerge::merger::{MergeOptions, MergeReport, Merger, SourceItem};
use docmerge::numbering::PageNumberFormat;
use docmerge::password::{password_channel, PasswordRequest, RejectEncrypted};
use docmerge::pdf::extract_metadata;
use docmerge::server::{serve, ServerConfig};

/// docmerge - Convert Word and PDF files and merge them into one PDF
#[derive(Parser)]
#[command(name = "docmerge")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge chapters with a table of contents and page numbers
    docmerge merge -o book.pdf --toc --page-numbers \"chapters/*.docx\" appendix.pdf

    # Roman page numbers starting at V
    docmerge merge -o front.pdf --page-numbers --format roman --start 5 preface.pdf

    # Convert a Word document to PDF and open it
    docmerge word-to-pdf report.docx --open

    # Run the HTTP API on port 9000
    docmerge serve --port 9000")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Word document (.doc/.docx) to PDF
    WordToPdf {
        /// Input Word file
        input: PathBuf,

        /// Output PDF path (defaults to the input name with .pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Convert a PDF to a Word document (.docx)
    PdfToWord {
        /// Input PDF file
        input: PathBuf,

        /// Output .docx path (defaults to the input name with .docx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Password for an encrypted PDF
        #[arg(long)]
        password: Option<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Merge Word and PDF files into one PDF
    Merge {
        /// Input files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Prepend a table of contents
        #[arg(long)]
        toc: bool,

        /// Add page numbers to every page
        #[arg(long)]
        page_numbers: bool,

        /// Page number format: arabic or roman
        #[arg(long, default_value = "arabic", value_parser = parse_format)]
        format: PageNumberFormat,

        /// Number of the first page
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        start: u32,

        /// Fail on encrypted PDFs instead of asking for a password
        #[arg(long)]
        no_prompt: bool,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF
    Info {
        /// Input PDF file
        input: PathBuf,

        /// Password for an encrypted PDF
        #[arg(long)]
        password: Option<String>,
    },

    /// Serve the HTTP API
    Serve {
        /// Configuration file (defaults to ./docmerge.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::WordToPdf { input, output, open } => cmd_word_to_pdf(input, output, open),
        Commands::PdfToWord {
            input,
            output,
            password,
            open,
        } => cmd_pdf_to_word(input, output, password, open),
        Commands::Merge {
            inputs,
            output,
            toc,
            page_numbers,
            format,
            start,
            no_prompt,
            open,
        } => {
            let options = MergeOptions {
                generate_toc: toc,
                add_page_numbers: page_numbers,
                page_number_format: format,
                start_page_number: start,
            };
            cmd_merge(inputs, output, options, no_prompt, open)
        }
        Commands::Info { input, password } => cmd_info(input, password),
        Commands::Serve { config, host, port } => cmd_serve(config, host, port),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn parse_format(value: &str) -> std::result::Result<PageNumberFormat, String> {
    value.parse().map_err(|e: docmerge::Error| e.to_string())
}

fn init_logging() {
    // Use RUST_LOG if set; otherwise only warnings, progress goes to stderr directly
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docmerge=warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).compact())
        .with(filter)
        .init();
}

/// Expand glob patterns in place, keeping the order patterns were given in
///
/// Each pattern's own matches are sorted.
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = Vec::new();
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            matched.sort();
            paths.extend(matched);
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

fn require_input(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    Ok(())
}

fn cmd_word_to_pdf(input: PathBuf, output: Option<PathBuf>, open: bool) -> Result<()> {
    require_input(&input)?;
    let output = output.unwrap_or_else(|| input.with_extension("pdf"));

    eprintln!("Converting {} to PDF...", input.display());
    Converter::new().convert_checked(&input, &output)?;
    eprintln!("Created: {}", output.display());

    if open {
        open_file(&output)?;
    }
    Ok(())
}

fn cmd_pdf_to_word(input: PathBuf, output: Option<PathBuf>, password: Option<String>, open: bool) -> Result<()> {
    require_input(&input)?;
    let output = output.unwrap_or_else(|| input.with_extension("docx"));

    eprintln!("Converting {} to Word...", input.display());
    pdf_to_word::convert(&input, &output, password.as_deref())?;
    eprintln!("Created: {}", output.display());

    if open {
        open_file(&output)?;
    }
    Ok(())
}

fn cmd_merge(inputs: Vec<String>, output: PathBuf, options: MergeOptions, no_prompt: bool, open: bool) -> Result<()> {
    let inputs = expand_globs(inputs)?;
    for path in &inputs {
        require_input(path)?;
    }

    eprintln!("Merging {} files...", inputs.len());
    let items: Vec<SourceItem> = inputs.into_iter().map(SourceItem::new).collect();

    let merger = Merger::new().with_observer(|stage, detail| eprintln!("[{}] {}", stage, detail));

    let report = if no_prompt {
        merger.run(&items, &output, &options, &mut RejectEncrypted)?
    } else {
        run_with_prompts(merger, items, output.clone(), options)?
    };

    eprintln!(
        "Merged {} documents ({} pages) to: {}",
        report.documents.len(),
        report.total_pages,
        report.output.display()
    );

    if open {
        open_file(&output)?;
    }
    Ok(())
}

/// Run the merge on a worker thread, answering its password requests here
fn run_with_prompts(
    merger: Merger,
    items: Vec<SourceItem>,
    output: PathBuf,
    options: MergeOptions,
) -> Result<MergeReport> {
    let (mut resolver, mut requests) = password_channel();

    let worker = thread::spawn(move || merger.run(&items, &output, &options, &mut resolver));

    // Ends when the worker finishes and drops its resolver
    while let Some(request) = requests.blocking_recv() {
        let password = prompt_password(&request)?;
        request.answer(password);
    }

    let report = worker.join().map_err(|_| anyhow!("merge worker panicked"))??;
    Ok(report)
}

/// Ask on the terminal; an empty line declines
fn prompt_password(request: &PasswordRequest) -> Result<Option<String>> {
    let prompt = &request.prompt;
    if prompt.is_retry() {
        eprint!("Wrong password for {}. Try again (empty to cancel): ", prompt.file_name);
    } else {
        eprint!("Password for {} (empty to cancel): ", prompt.file_name);
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']);
    Ok((!password.is_empty()).then(|| password.to_string()))
}

fn cmd_info(input: PathBuf, password: Option<String>) -> Result<()> {
    require_input(&input)?;

    let metadata = extract_metadata(&input, password.as_deref())?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);
    println!("Encrypted: {}", if metadata.encrypted { "yes" } else { "no" });

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    if let Some(producer) = metadata.producer {
        println!("Producer: {}", producer);
    }

    Ok(())
}

fn cmd_serve(config: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut server_config = ServerConfig::load(config.as_deref())?;
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(server_config))?;
    Ok(())
}
