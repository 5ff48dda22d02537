//! Command-line interface for archive relocation.
//!
//! This CLI tool rewrites a ZIP archive according to a relocation
//! configuration, and can inspect an archive to show what would change.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use relocator::{
    AuxiliarySpec, Compression, DefaultFetcher, RelocateConfig, Relocator, RewriteRule, Stage,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "relocate")]
#[command(version, about = "Move a directory inside a ZIP archive and rewrite references to it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an archive
    Run {
        /// Archive to transform
        input: PathBuf,

        /// Output archive
        #[arg(short, long, default_value = "modified.zip")]
        out: PathBuf,

        #[command(flatten)]
        overrides: ConfigArgs,

        /// HTTP timeout for auxiliary fetches, in seconds (0 disables)
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how an archive would be transformed
    Inspect {
        /// Archive to inspect
        input: PathBuf,

        #[command(flatten)]
        overrides: ConfigArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        overrides: ConfigArgs,
    },
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source directory prefix, e.g. "public/"
    #[arg(long)]
    source: Option<String>,

    /// Destination directory prefix, e.g. "img/"
    #[arg(long)]
    dest: Option<String>,

    /// Text extension to rewrite (repeatable, replaces the configured set)
    #[arg(long = "text-ext")]
    text_ext: Vec<String>,

    /// Auxiliary entry as NAME=LOCATOR (repeatable); LOCATOR may be a URL or a local path
    #[arg(long = "aux")]
    aux: Vec<String>,

    /// Drop the configured auxiliary entries
    #[arg(long)]
    no_default_aux: bool,

    /// Store entries without compression
    #[arg(long)]
    store: bool,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            out,
            overrides,
            timeout,
            json,
        } => handle_run(input, out, overrides, timeout, json),
        Commands::Inspect {
            input,
            overrides,
            json,
        } => handle_inspect(input, overrides, json),
        Commands::Config { overrides } => handle_config(overrides),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_run(
    input: PathBuf,
    out: PathBuf,
    overrides: ConfigArgs,
    timeout: u64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&overrides)?;
    let archive = std::fs::read(&input)?;

    let timeout = (timeout > 0).then(|| Duration::from_secs(timeout));
    let relocator = Relocator::new(config, DefaultFetcher::with_timeout(timeout)?)?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })?;

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };
    let stage_spinner = spinner.clone();
    let on_stage = move |stage: &Stage| stage_spinner.set_message(stage.to_string());

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(relocator.transform_with(archive, &on_stage, cancel_flag));

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            spinner.abandon_with_message("failed");
            return Err(e.into());
        }
    };
    spinner.finish_and_clear();

    std::fs::write(&out, &output.archive)?;
    info!(path = %out.display(), "output written");

    let stats = &output.stats;
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
    } else {
        println!("Wrote {} ({} bytes)", out.display(), stats.bytes_written);
        println!("  entries read:        {}", stats.entries_read);
        println!("  entries relocated:   {}", stats.entries_relocated);
        println!(
            "  references rewritten: {} in {} text entries",
            stats.references_rewritten, stats.text_entries_rewritten
        );
        println!("  auxiliaries added:   {}", stats.auxiliaries_injected);
        println!("  duration:            {:.2?}", stats.duration);
    }

    Ok(())
}

fn handle_inspect(
    input: PathBuf,
    overrides: ConfigArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&overrides)?;
    let archive = std::fs::read(&input)?;
    let info = relocator::inspect(&archive, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!(
        "{}: {} entries, {} bytes ({} uncompressed)",
        input.display(),
        info.entries,
        info.compressed_bytes,
        info.uncompressed_estimate
    );
    for entry in &info.entry_list {
        if entry.path == entry.destination {
            println!("  {:<9} {}", entry.kind, entry.path);
        } else {
            println!("  {:<9} {} -> {}", entry.kind, entry.path, entry.destination);
        }
    }
    for name in &info.auxiliaries {
        println!("  {:<9} + {}", "auxiliary", name);
    }

    Ok(())
}

fn handle_config(overrides: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&overrides)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Build the effective configuration: file (or defaults), then flags.
fn resolve_config(args: &ConfigArgs) -> Result<RelocateConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RelocateConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => RelocateConfig::default(),
    };

    if args.source.is_some() || args.dest.is_some() {
        let source = args
            .source
            .clone()
            .unwrap_or_else(|| config.rule.source_prefix().to_string());
        let dest = args
            .dest
            .clone()
            .unwrap_or_else(|| config.rule.dest_prefix().to_string());
        config.rule = RewriteRule::new(source, dest)?;
    }

    if !args.text_ext.is_empty() {
        config.text_extensions = args
            .text_ext
            .iter()
            .map(|ext| {
                if ext.starts_with('.') {
                    ext.clone()
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();
    }

    if args.no_default_aux {
        config.auxiliaries.clear();
    }
    for spec in &args.aux {
        config.auxiliaries.push(parse_aux(spec)?);
    }

    if args.store {
        config.options.compression = Compression::Stored;
    }

    config.validate()?;
    Ok(config)
}

/// Parse `NAME=LOCATOR`. A locator that is not a URL is taken as a local
/// file path.
fn parse_aux(spec: &str) -> Result<AuxiliarySpec, Box<dyn std::error::Error>> {
    let (name, locator) = spec
        .split_once('=')
        .ok_or_else(|| format!("auxiliary '{}' must look like NAME=LOCATOR", spec))?;

    let url = match Url::parse(locator) {
        // Single-letter schemes are Windows drive letters, not URLs
        Ok(url) if url.scheme().len() > 1 => url,
        _ => {
            let path = Path::new(locator).canonicalize().map_err(|e| {
                warn!(locator, "auxiliary locator is neither a URL nor a readable path");
                format!("auxiliary locator '{}': {}", locator, e)
            })?;
            Url::from_file_path(&path)
                .map_err(|_| format!("auxiliary locator '{}' is not an absolute path", locator))?
        }
    };

    Ok(AuxiliarySpec::new(url, name))
}
