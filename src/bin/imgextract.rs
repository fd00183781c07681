//! CLI binary for edgequake-imgextract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` / `RecognitionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_imgextract::{
    extract_to_archive, extract_to_file, AspectMode, CanvasRequest, ExtractionConfig,
    ExtractionProgressCallback, NamedImage, ProgressCallback, RecognitionConfig, Recognizer,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. The number of images is unknown until the
/// parser finishes, so the bar is a spinner with a running count; images
/// complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos:>4} images  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, base_name: &str) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(base_name.to_string());
    }

    fn on_image_complete(&self, index: usize, bytes: usize) {
        self.bar.println(format!(
            "  {} Image {:>4}  {}",
            green("✓"),
            index + 1,
            dim(&format!("{bytes:>8} bytes")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar
            .println(format!("  {} Image {:>4}  {}", red("✗"), index + 1, red(&msg)));
    }

    fn on_extraction_complete(&self, found: usize, extracted: usize) {
        self.bar.finish_and_clear();
        let failed = found.saturating_sub(extracted);
        if failed == 0 {
            eprintln!(
                "{} {} images extracted",
                green("✔"),
                bold(&extracted.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images extracted  ({} not extracted)",
                if extracted == 0 { red("✘") } else { cyan("⚠") },
                bold(&extracted.to_string()),
                found,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every embedded image into report.zip
  imgextract extract report.pdf

  # Letterbox every image onto a 640x480 transparent canvas
  imgextract extract --resize report.pdf -o thumbs.zip

  # Stretch to 1024x768 instead of preserving the aspect ratio
  imgextract extract --resize --width 1024 --height 768 --stretch report.pdf

  # Extract from a URL and print a JSON summary
  imgextract extract https://example.com/brochure.pdf --json

  # Recognise text in scanned pages, keeping confident results only
  imgextract ocr page-1.png page-2.png --threshold 0.8

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or containing directory)
  RUST_LOG                Override log filtering (e.g. edgequake_imgextract=debug)
"#;

/// Extract embedded images from documents and recognise text in images.
#[derive(Parser, Debug)]
#[command(
    name = "imgextract",
    version,
    about = "Extract embedded images from documents into a zip, or OCR image batches",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMGEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMGEXTRACT_QUIET")]
    quiet: bool,

    /// Print machine-readable JSON instead of human output.
    #[arg(long, global = true, env = "IMGEXTRACT_JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the images of a document into a zip archive.
    Extract(ExtractArgs),
    /// Recognise text in one or more image files.
    Ocr(OcrArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local document path or HTTP/HTTPS URL.
    input: String,

    /// Archive path. Default: `<document-name>.zip` in the current directory.
    #[arg(short, long, env = "IMGEXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// Scale every image onto a fixed-size transparent canvas.
    #[arg(long, env = "IMGEXTRACT_RESIZE")]
    resize: bool,

    /// Canvas width in pixels (with --resize).
    #[arg(long, env = "IMGEXTRACT_WIDTH", default_value_t = 640)]
    width: u32,

    /// Canvas height in pixels (with --resize).
    #[arg(long, env = "IMGEXTRACT_HEIGHT", default_value_t = 480)]
    height: u32,

    /// Fill the canvas exactly instead of preserving the aspect ratio.
    #[arg(long, env = "IMGEXTRACT_STRETCH")]
    stretch: bool,

    /// Number of images processed at once.
    #[arg(short, long, env = "IMGEXTRACT_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Deflate level for archive entries (0–9).
    #[arg(long, env = "IMGEXTRACT_COMPRESSION_LEVEL",
          value_parser = clap::value_parser!(i64).range(0..=9))]
    compression_level: Option<i64>,

    /// User password for encrypted documents.
    #[arg(long, env = "IMGEXTRACT_PASSWORD")]
    password: Option<String>,

    /// Path to libpdfium (file or containing directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "IMGEXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress output.
    #[arg(long, env = "IMGEXTRACT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// Image files to recognise, processed in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Minimum mean confidence (0.0–1.0) for a result to be printed.
    #[arg(long, env = "IMGEXTRACT_OCR_THRESHOLD", default_value_t = 0.5)]
    threshold: f32,

    /// Directory containing the tesseract language models.
    #[arg(long, env = "IMGEXTRACT_TESSDATA", default_value = "tessdata")]
    tessdata: PathBuf,

    /// `+`-separated tesseract language codes.
    #[arg(long, env = "IMGEXTRACT_OCR_LANGUAGES", default_value = "eng+por+fra+spa+ita")]
    languages: String,

    /// tesseract executable.
    #[arg(long, env = "IMGEXTRACT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress && !cli.json,
        Command::Ocr(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ctrl-C → cooperative cancellation ────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} interrupted, finishing in-flight work… (Ctrl-C again to abort)",
                    cyan("⚠")
                );
                cancel.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} aborted", red("✘"));
                std::process::exit(130);
            }
        });
    }

    match cli.command {
        Command::Extract(ref args) => run_extract(&cli, args, show_progress, &cancel).await,
        Command::Ocr(ref args) => run_ocr(&cli, args, &cancel).await,
    }
}

async fn run_extract(
    cli: &Cli,
    args: &ExtractArgs,
    show_progress: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;

    let resize = if args.resize {
        let mode = if args.stretch {
            AspectMode::Stretch
        } else {
            AspectMode::Fit
        };
        Some(CanvasRequest::new(args.width, args.height, mode).context("Invalid canvas")?)
    } else {
        None
    };

    let (output, path) = match args.output {
        Some(ref path) => {
            let output = extract_to_file(&args.input, path, resize, &config, cancel)
                .await
                .context("Extraction failed")?;
            (output, path.clone())
        }
        None => {
            let output = extract_to_archive(&args.input, resize, &config, cancel)
                .await
                .context("Extraction failed")?;
            let path = PathBuf::from(&output.file_name);
            if !output.bytes.is_empty() {
                tokio::fs::write(&path, &output.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            (output, path)
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    if output.bytes.is_empty() {
        eprintln!("{} no images archived, nothing written", cyan("⚠"));
        return Ok(());
    }

    let stats = &output.extraction;
    eprintln!(
        "{}  {}/{} images  {}ms{}  →  {}",
        if stats.images_failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        output.archive.entries_written,
        stats.images_found,
        stats.duration_ms,
        if stats.cancelled { "  (cancelled)" } else { "" },
        bold(&path.display().to_string()),
    );
    if !show_progress && stats.images_failed > 0 {
        eprintln!("  {} images failed", stats.images_failed);
    }
    Ok(())
}

async fn run_ocr(cli: &Cli, args: &OcrArgs, cancel: &CancellationToken) -> Result<()> {
    let config = RecognitionConfig {
        confidence_threshold: args.threshold,
        tessdata_dir: args.tessdata.clone(),
        languages: args.languages.clone(),
        tesseract_binary: args.tesseract.clone(),
        ..RecognitionConfig::default()
    };
    config.validate().context("Invalid OCR configuration")?;

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        images.push(NamedImage::from_bytes(name, &bytes)?);
    }

    let recognizer = Recognizer::from_config(&config);
    let mut stream = recognizer.recognize(images, config.confidence_threshold, cancel)?;

    while let Some(record) = stream.next().await {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string(&record).context("Failed to serialise result")?
            );
        } else {
            println!(
                "{} {}",
                bold(&format!("── {} ", record.source_name)),
                dim(&format!("(confidence {:.2})", record.confidence))
            );
            println!("{}\n", record.text);
        }
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(args: &ExtractArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(args.concurrency)
        .download_timeout_secs(args.download_timeout);

    if let Some(level) = args.compression_level {
        builder = builder.compression_level(level);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
