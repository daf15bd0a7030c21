//! CLI binary for edgequake-compress.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CompressionConfig`, runs one input or a batch, and writes the results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_compress::{
    batch_output_names, batch_with, format_bytes, output_file_name, probe, write_payload, CompressedFile,
    CompressionConfig, CompressionProgressCallback, Compressor, ConnectionStatus, Payload,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

/// Terminal progress bar with one log line per finished input. Inputs finish
/// out of order, so lines carry the input index.
struct CliProgressCallback {
    bar: ProgressBar,
    inputs: Vec<String>,
    saved: AtomicUsize,
}

impl CliProgressCallback {
    fn new(inputs: &[String]) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(inputs.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Compressing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            inputs: inputs.to_vec(),
            saved: AtomicUsize::new(0),
        })
    }

    fn label(&self, index: usize) -> &str {
        self.inputs.get(index).map(String::as_str).unwrap_or("?")
    }
}

impl CompressionProgressCallback for CliProgressCallback {
    fn on_item_start(&self, _index: usize, _total: usize, input: &str) {
        self.bar.set_message(input.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, original: usize, compressed: usize) {
        self.saved
            .fetch_add(original.saturating_sub(compressed), Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            self.label(index),
            dim(&format!(
                "{} → {}",
                format_bytes(original),
                format_bytes(compressed)
            )),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            self.label(index),
            red(first_line),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        let saved = format_bytes(self.saved.load(Ordering::SeqCst));
        if failed == 0 {
            eprintln!(
                "{} {} files compressed, {} saved",
                green("✔"),
                bold(&success_count.to_string()),
                saved
            );
        } else {
            eprintln!(
                "{} {}/{} files compressed  ({} failed), {} saved",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
                saved
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a PDF (summary JSON on stdout)
  edgecompress lease.pdf

  # Shrink an image and write it next to you
  edgecompress photo.png -o photo.min.jpg

  # Compress a folder's worth of files, 8 at a time
  edgecompress --out-dir compressed/ --concurrency 8 scans/*.png docs/*.pdf

  # Local fallbacks only, no network
  edgecompress --offline report.pdf

  # Compress a knowledge-base context before an LLM call
  edgecompress --prompt "When is rent due?" kb.txt

  # Check the API key and endpoint
  edgecompress --probe

ENVIRONMENT VARIABLES:
  SCALEDOWN_API_KEY   API key for the remote compression service
  SCALEDOWN_API_URL   Override the remote endpoint
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory) for PDF text
  RUST_LOG            Override log filtering (e.g. edgequake_compress=debug)

Without an API key every input is processed locally: images are re-encoded
as JPEG (max 1200 px wide), PDFs are split into headed sections, and other
files are cut to a 1000-byte excerpt.
"#;

/// Shrink images, PDFs and text files.
#[derive(Parser, Debug)]
#[command(
    name = "edgecompress",
    version,
    about = "Shrink images, PDFs and text with remote delegation and local fallbacks",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Write the payload of a single input to this file.
    #[arg(short, long, conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Write each payload into this directory as <stem>.min.<ext> or
    /// <stem>.summary.json.
    #[arg(long, env = "EDGECOMPRESS_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Media type for every input, overriding detection (e.g. application/pdf).
    #[arg(long)]
    media_type: Option<String>,

    /// Print the full result as JSON instead of the payload.
    #[arg(long, env = "EDGECOMPRESS_JSON")]
    json: bool,

    /// Never contact the remote service.
    #[arg(long, env = "EDGECOMPRESS_OFFLINE")]
    offline: bool,

    /// Check the remote endpoint and exit.
    #[arg(long)]
    probe: bool,

    /// Compress the inputs as context for this prompt instead of as files.
    #[arg(long)]
    prompt: Option<String>,

    /// API key for the remote compression service.
    #[arg(long, env = "SCALEDOWN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote compression endpoint.
    #[arg(long, env = "SCALEDOWN_API_URL", default_value = edgequake_compress::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Remote request timeout in seconds.
    #[arg(long, env = "EDGECOMPRESS_TIMEOUT", default_value_t = 20)]
    timeout: u64,

    /// Number of inputs compressed concurrently.
    #[arg(short, long, env = "EDGECOMPRESS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGECOMPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGECOMPRESS_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDGECOMPRESS_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for batches.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.inputs.len() > 1;
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

    let config = build_config(&cli, None)?;

    // ── Probe-only mode ──────────────────────────────────────────────────
    if cli.probe {
        let status = probe(&config).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to serialise status")?
            );
        } else {
            let mark = match status {
                ConnectionStatus::Connected => green("✔"),
                ConnectionStatus::NotConfigured => cyan("○"),
                _ => red("✘"),
            };
            println!("{} {}  {}", mark, bold(&config.endpoint), status);
        }
        if matches!(
            status,
            ConnectionStatus::Connected | ConnectionStatus::NotConfigured
        ) {
            return Ok(());
        }
        bail!("Remote endpoint check failed: {status}");
    }

    if cli.inputs.is_empty() {
        bail!("No inputs given. Pass one or more file paths or URLs.");
    }
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("--output takes a single input; use --out-dir for several");
    }

    // ── Build compressor ─────────────────────────────────────────────────
    let progress_cb = show_progress.then(|| CliProgressCallback::new(&cli.inputs));
    let config = build_config(
        &cli,
        progress_cb
            .clone()
            .map(|cb| cb as Arc<dyn CompressionProgressCallback>),
    )?;
    let compressor = if config.delegation_configured() {
        Compressor::connect(config).await
    } else {
        Compressor::new(config)
    }
    .context("Failed to initialise compressor")?;

    // ── Context compression mode ─────────────────────────────────────────
    if let Some(ref prompt) = cli.prompt {
        return run_context(&cli, &compressor, prompt).await;
    }

    // ── Single input ─────────────────────────────────────────────────────
    if cli.inputs.len() == 1 {
        let input = &cli.inputs[0];
        let file = compressor
            .compress_file(input, cli.media_type.as_deref())
            .await
            .with_context(|| format!("Failed to compress '{input}'"))?;
        return emit_single(&cli, &file).await;
    }

    // ── Batch ────────────────────────────────────────────────────────────
    let out_dir = cli.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let items = batch_with(
        Arc::new(compressor),
        cli.inputs.clone(),
        cli.media_type.clone(),
    )
    .await;

    let names = batch_output_names(&items);
    let mut failures = 0usize;
    let mut reports = Vec::new();
    for (item, name) in items.into_iter().zip(names) {
        match item.outcome {
            Ok(file) => {
                let name = name.unwrap_or_else(|| output_file_name(&file.name, &file.result));
                let path = out_dir.join(name);
                write_payload(&path, &file.result.payload)
                    .await
                    .with_context(|| format!("Failed to write '{}'", path.display()))?;
                if cli.json {
                    reports.push(serde_json::json!({
                        "input": item.input,
                        "output": path.display().to_string(),
                        "original_size": file.result.original_size,
                        "compressed_size": file.result.compressed_size,
                        "ratio": file.result.ratio,
                        "strategy": file.result.strategy,
                    }));
                } else if !cli.quiet && !show_progress {
                    eprintln!(
                        "{} {}  {}  →  {}",
                        green("✓"),
                        item.input,
                        dim(&file.result.describe()),
                        bold(&path.display().to_string())
                    );
                }
            }
            Err(e) => {
                failures += 1;
                if cli.json {
                    reports.push(serde_json::json!({
                        "input": item.input,
                        "error": e.to_string(),
                    }));
                } else if !show_progress {
                    eprintln!("{} {}  {}", red("✗"), item.input, red(&e.to_string()));
                }
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise results")?
        );
    }
    if failures > 0 {
        bail!("{failures} of {} inputs failed", cli.inputs.len());
    }
    Ok(())
}

/// Write or print the result of a single input.
async fn emit_single(cli: &Cli, file: &CompressedFile) -> Result<()> {
    let target = match (&cli.output, &cli.out_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(dir)) => Some(dir.join(output_file_name(&file.name, &file.result))),
        // Binary payloads never go to the terminal.
        (None, None) if matches!(file.result.payload, Payload::Binary { .. }) => {
            Some(PathBuf::from(output_file_name(&file.name, &file.result)))
        }
        (None, None) => None,
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(file).context("Failed to serialise output")?
        );
    }

    match target {
        Some(path) => {
            write_payload(&path, &file.result.payload)
                .await
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            report(cli, file, Some(path.as_path()));
        }
        None => {
            if !cli.json {
                let bytes = file
                    .result
                    .payload
                    .to_file_bytes()
                    .context("Failed to serialise summary")?;
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(&bytes)
                    .context("Failed to write to stdout")?;
                handle.write_all(b"\n").ok();
            }
            report(cli, file, None);
        }
    }
    Ok(())
}

fn report(cli: &Cli, file: &CompressedFile, path: Option<&Path>) {
    if cli.quiet || cli.json {
        return;
    }
    let dest = path
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!("{} {}  {}{}", green("✔"), file.name, dim(&file.result.describe()), dest);
    for fallback in &file.result.fallbacks {
        eprintln!("   {} {}", cyan("↳"), dim(&fallback.to_string()));
    }
}

/// Compress the inputs, read as text, as context for `prompt`.
async fn run_context(cli: &Cli, compressor: &Compressor, prompt: &str) -> Result<()> {
    let mut parts = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let text = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read context from '{input}'"))?;
        parts.push(text);
    }
    let context = parts.join("\n\n");

    let outcome = compressor.compress_context(&context, prompt).await;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise output")?
        );
    } else {
        println!("{}", outcome.text);
        if !cli.quiet {
            if outcome.delegated {
                eprintln!(
                    "{} {} → {} tokens",
                    green("✔"),
                    outcome.original_tokens,
                    outcome.compressed_tokens
                );
            } else {
                eprintln!("{} context not compressed (remote unavailable)", cyan("⚠"));
            }
        }
    }
    Ok(())
}

/// Map CLI args to `CompressionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CompressionConfig> {
    let mut builder = CompressionConfig::builder()
        .endpoint(cli.endpoint.clone())
        .delegation(!cli.offline)
        .request_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
