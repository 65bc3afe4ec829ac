//! ferment - Inspect raw Protocol Buffers captures without a schema
//!
//! This tool splits captured wire bytes into fields and renders them as an
//! indented tree, guessing which length-delimited payloads are nested
//! messages, text or binary.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use ferment_core::{Inspector, InspectorConfig, StatsVisitor};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Extensions read as raw wire bytes in directory mode
const RAW_EXTENSIONS: [&str; 4] = ["bin", "pb", "raw", "dat"];

/// Extension read as hex text
const HEX_EXTENSION: &str = "hex";

/// Inspect raw Protocol Buffers captures without a schema
#[derive(Parser, Debug)]
#[command(name = "ferment")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Directory to write one dump per capture into (prints to stdout if omitted)
    #[arg(short, long, env = "FERMENT_OUTPUT")]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "tree", env = "FERMENT_FORMAT")]
    format: OutputFormat,

    /// Deepest level at which payloads are tried as nested messages
    #[arg(long, default_value = "16", env = "FERMENT_MAX_DEPTH")]
    max_depth: usize,

    /// Render every payload as a message or hex, never as text
    #[arg(long)]
    no_text: bool,

    /// Number of leading bytes to drop before decoding (e.g. framing headers)
    #[arg(long, default_value = "0", env = "FERMENT_SKIP")]
    skip: usize,

    /// Dry run - don't write files, just show what would be written
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files without prompting
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single capture file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of captures to process
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Capture given inline as hex (whitespace and a 0x prefix are ignored)
    #[arg(long)]
    hex: Option<String>,
}

/// Output format for dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Indented field tree
    Tree,
    /// Counts per wire shape
    Stats,
}

/// Tracks written captures for deduplication
#[derive(Default)]
struct CaptureRegistry {
    /// Content hashes already dumped
    hashes: HashSet<String>,
    /// Maps dump filename -> output paths handed out for it
    names: HashMap<String, Vec<PathBuf>>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    conflicts_renamed: usize,
    failed: usize,
    written: usize,
}

impl CaptureRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the capture (first 8 chars of blake3)
    fn content_hash(data: &[u8]) -> String {
        let hash = blake3::hash(data);
        hash.to_hex()[..8].to_string()
    }

    /// Register a capture and return the dump path, or `None` for a
    /// capture whose bytes were already seen
    fn register(&mut self, filename: &str, content_hash: &str, output_dir: &Path) -> Option<PathBuf> {
        if !self.hashes.insert(content_hash.to_string()) {
            debug!("Skipping duplicate: {} (hash: {})", filename, content_hash);
            self.stats.duplicates_skipped += 1;
            return None;
        }

        let variants = self.names.entry(filename.to_string()).or_default();
        let output_path = if variants.is_empty() {
            output_dir.join(filename)
        } else {
            let new_name = Self::add_suffix(filename, &format!("~{}", content_hash));
            info!(
                "Conflict resolved: {} -> {} (content differs)",
                filename, new_name
            );
            self.stats.conflicts_renamed += 1;
            output_dir.join(new_name)
        };
        variants.push(output_path.clone());

        Some(output_path)
    }

    /// Add a suffix before the .txt extension
    fn add_suffix(filename: &str, suffix: &str) -> String {
        if let Some(stem) = filename.strip_suffix(".txt") {
            format!("{}{}.txt", stem, suffix)
        } else {
            format!("{}{}", filename, suffix)
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} found, {} duplicates skipped, {} conflicts renamed, {} failed, {} written",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.conflicts_renamed,
            self.stats.failed,
            self.stats.written
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory).map(drop)
    } else if let Some(ref hex) = cli.input.hex {
        let data = parse_hex(hex)?;
        let mut registry = CaptureRegistry::new();
        registry.stats.total_found += 1;
        process_capture(&cli, "inline.txt", &data, &mut registry)?;
        finish(&cli, &registry);
        Ok(())
    } else {
        bail!("One of --file, --directory or --hex must be specified")
    }
}

/// Process a single capture file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut registry = CaptureRegistry::new();
    registry.stats.total_found += 1;
    let data = load_capture(file)?;
    process_capture(cli, &dump_name(file), &data, &mut registry)?;
    finish(cli, &registry);

    Ok(())
}

/// Process a directory of captures recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<RegistryStats> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = CaptureRegistry::new();
    let mut captures_processed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if !is_capture(path) {
            trace!("Skipping non-capture: {}", path.display());
            continue;
        }

        debug!("Processing capture: {}", path.display());
        registry.stats.total_found += 1;
        let result = load_capture(path)
            .and_then(|data| process_capture(cli, &dump_name(path), &data, &mut registry));
        if let Err(e) = result {
            // Log error but continue with other files
            warn!("Error processing {}: {:#}", path.display(), e);
            registry.stats.failed += 1;
        }
        captures_processed += 1;
    }

    info!("Processed {} captures", captures_processed);
    finish(cli, &registry);

    Ok(registry.stats)
}

fn finish(cli: &Cli, registry: &CaptureRegistry) {
    if cli.output.is_some() && !cli.dry_run {
        registry.print_summary();
    }
}

/// Returns true for files that directory mode should decode
fn is_capture(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => {
            let ext = ext.to_lowercase();
            ext == HEX_EXTENSION || RAW_EXTENSIONS.contains(&ext.as_str())
        }
    }
}

/// Read a capture, decoding hex text for `.hex` files
fn load_capture(path: &Path) -> Result<Vec<u8>> {
    trace!("Reading {}", path.display());
    let is_hex = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(HEX_EXTENSION))
        .unwrap_or(false);

    if is_hex {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read hex capture: {}", path.display()))?;
        parse_hex(&text).with_context(|| format!("Invalid hex in {}", path.display()))
    } else {
        fs::read(path).with_context(|| format!("Failed to read capture: {}", path.display()))
    }
}

/// Converts hex text to bytes, ignoring whitespace and a `0x` prefix
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.replace(['\t', '\n', '\r', ' '], "");
    let digits = text.strip_prefix("0x").unwrap_or(&text);

    if !digits.is_ascii() {
        bail!("hex input contains non-ASCII characters");
    }
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits ({})", digits.len());
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?} at position {}", &digits[i..i + 2], i))
        })
        .collect()
}

/// Dump filename for a capture path: `capture.bin` -> `capture.txt`
fn dump_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("capture");
    format!("{}.txt", stem)
}

/// Render one capture
fn render(cli: &Cli, data: &[u8]) -> Result<String> {
    if cli.skip > data.len() {
        bail!(
            "Cannot skip {} bytes of a {}-byte capture",
            cli.skip,
            data.len()
        );
    }
    let data = &data[cli.skip..];

    let config = InspectorConfig::new()
        .max_depth(cli.max_depth)
        .render_text(!cli.no_text);
    let inspector = Inspector::from_bytes(data)
        .context("Capture is not a well-formed protobuf message")?
        .with_config(config);

    match cli.format {
        OutputFormat::Tree => Ok(inspector.render()),
        OutputFormat::Stats => {
            let mut stats = StatsVisitor::default();
            inspector.walk(&mut stats)?;
            Ok(format!(
                "bytes: {}\nfields: {}\nvarints: {}\nfixed32: {}\nfixed64: {}\nmessages: {}\ntexts: {}\nbinaries: {}\nmax depth: {}\n",
                data.len(),
                inspector.fields().len(),
                stats.varints,
                stats.fixed32s,
                stats.fixed64s,
                stats.messages,
                stats.texts,
                stats.binaries,
                stats.max_depth
            ))
        }
    }
}

/// Decode one capture and print or write its dump
fn process_capture(
    cli: &Cli,
    filename: &str,
    data: &[u8],
    registry: &mut CaptureRegistry,
) -> Result<()> {
    trace!("Decoding {} ({} bytes)", filename, data.len());
    let content = render(cli, data)?;

    let Some(output_dir) = &cli.output else {
        if cli.input.directory.is_some() {
            println!("== {}", filename);
        }
        print!("{}", content);
        return Ok(());
    };

    let content_hash = CaptureRegistry::content_hash(data);
    let Some(output_path) = registry.register(filename, &content_hash, output_dir) else {
        return Ok(());
    };

    if cli.dry_run {
        println!("Would write: {}", output_path.display());
        if cli.verbose > 0 {
            println!("---");
            print!("{}", content);
            println!("---");
        }
        return Ok(());
    }

    match write_dump_file(&output_path, &content, cli.force) {
        Ok(()) => {
            println!("Wrote {}", output_path.display());
            registry.stats.written += 1;
        }
        Err(e) => {
            error!("Failed to write {}: {:#}", output_path.display(), e);
            registry.stats.failed += 1;
        }
    }

    Ok(())
}

/// Write a dump file, creating parent directories as needed
fn write_dump_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}
