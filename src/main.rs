//! digestflow - Concurrent content digests for whole directory trees.
//!
//! Usage:
//!   digestflow [PATHS]...          Digest every file under PATHS
//!   digestflow duplicates [PATH]   Group files with identical content
//!   digestflow --help              Show help

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use digestflow_pipeline::{DigestConfig, DigestReport, DigestTable, ErrorPolicy, TreeDigester};

#[derive(Parser)]
#[command(
    name = "digestflow",
    version,
    about = "Concurrent content digests for whole directory trees",
    long_about = "digestflow computes a BLAKE3 digest of every regular file under \
                  the given paths.\n\n\
                  The first unreadable file cancels the whole run unless \
                  --keep-going is set."
)]
struct Cli {
    /// Paths to digest (defaults to current directory)
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    walk: WalkArgs,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep going past unreadable files and report them at the end
    #[arg(short = 'k', long)]
    keep_going: bool,

    /// Verbose logging (overridden by DIGESTFLOW_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args, Clone)]
struct WalkArgs {
    /// Maximum concurrent digest workers (0 = unbounded)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    workers: usize,

    /// Give up after this long (e.g., "500ms", "30s", "5m")
    #[arg(short, long, global = true)]
    timeout: Option<String>,

    /// Include hidden files
    #[arg(long, overrides_with = "no_hidden", global = true)]
    hidden: bool,

    /// Skip hidden files
    #[arg(long, global = true)]
    no_hidden: bool,

    /// Skip entries whose name matches this glob (repeatable)
    #[arg(short, long = "ignore", value_name = "PATTERN", global = true)]
    ignore: Vec<String>,

    /// Maximum depth to descend
    #[arg(short = 'd', long, global = true)]
    max_depth: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Find files with identical content
    Duplicates {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum number of duplicate groups to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Some(Command::Duplicates { ref path, top }) => {
            run_duplicates(path, top, &cli).await?;
        }
        None => {
            run_digest(&cli).await?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("DIGESTFLOW_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("digestflow=debug,digestflow_pipeline=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Build the run configuration shared by every command.
fn build_config(root: PathBuf, args: &WalkArgs, policy: ErrorPolicy) -> Result<DigestConfig> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    DigestConfig::builder()
        .root(root)
        .include_hidden(!args.no_hidden || args.hidden)
        .max_depth(args.max_depth)
        .ignore_patterns(args.ignore.clone())
        .max_workers(args.workers)
        .error_policy(policy)
        .timeout(timeout)
        .build()
        .context("Invalid configuration")
}

/// Digest every path and print the table.
async fn run_digest(cli: &Cli) -> Result<()> {
    let policy = if cli.keep_going {
        ErrorPolicy::CollectAll
    } else {
        ErrorPolicy::FailFast
    };
    let config = build_config(cli.paths[0].clone(), &cli.walk, policy)?;
    let digester = TreeDigester::new(config);

    if cli.verbose {
        let mut progress_rx = digester.subscribe();
        tokio::spawn(async move {
            while let Ok(progress) = progress_rx.recv().await {
                tracing::debug!(
                    files = progress.files_digested,
                    failed = progress.files_failed,
                    bytes = progress.bytes_digested,
                    "progress"
                );
            }
        });
    }

    let report = digester
        .start_roots(&cli.paths, None)?
        .collect_report()
        .await
        .context("Digest failed")?;

    emit(&render_table(&report.table, cli.format, &report)?, cli)?;

    if !report.is_complete() {
        for failure in &report.failures {
            eprintln!("error: {}: {}", failure.path.display(), failure.message);
        }
        bail!("{} file(s) could not be read", report.failures.len());
    }

    eprintln!(
        "{} files, {} hashed",
        report.table.len(),
        format_size(report.bytes_hashed)
    );

    Ok(())
}

/// Digest one tree and print groups of identical files.
async fn run_duplicates(path: &PathBuf, top_n: usize, cli: &Cli) -> Result<()> {
    let config = build_config(path.clone(), &cli.walk, ErrorPolicy::FailFast)?;

    eprintln!("Digesting {}...", path.display());

    let table = TreeDigester::new(config)
        .digest_all()
        .await
        .context("Digest failed")?;

    let groups: Vec<_> = table.duplicate_groups().into_iter().take(top_n).collect();

    let rendered = match cli.format {
        OutputFormat::Text => {
            let mut out = String::new();
            if groups.is_empty() {
                writeln!(out, "No duplicate files found.")?;
            }
            for (i, group) in groups.iter().enumerate() {
                writeln!(out, "Group {} ({} files, {})", i + 1, group.count(), group.hash)?;
                for path in &group.paths {
                    writeln!(out, "  {}", path.display())?;
                }
            }
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&groups)? + "\n",
    };

    emit(&rendered, cli)
}

fn render_table(table: &DigestTable, format: OutputFormat, report: &DigestReport) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for (path, hash) in table.iter() {
                writeln!(out, "{hash}  {}", path.display())?;
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)? + "\n"),
    }
}

/// Write to `--output` or stdout.
fn emit(rendered: &str, cli: &Cli) -> Result<()> {
    match &cli.output {
        Some(output_path) => {
            std::fs::write(output_path, rendered)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Wrote {}", output_path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Parse a duration string (e.g., "250ms", "30s", "5m", "1h").
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num, multiplier) = if let Some(num) = s.strip_suffix("ms") {
        (num.parse::<f64>()?, 0.001)
    } else if let Some(num) = s.strip_suffix('s') {
        (num.parse::<f64>()?, 1.0)
    } else if let Some(num) = s.strip_suffix('m') {
        (num.parse::<f64>()?, 60.0)
    } else if let Some(num) = s.strip_suffix('h') {
        (num.parse::<f64>()?, 60.0 * 60.0)
    } else {
        (s.parse::<f64>()?, 1.0) // Default to seconds
    };

    match Duration::try_from_secs_f64(num * multiplier) {
        Ok(duration) => Ok(duration),
        Err(e) => bail!("Invalid duration {s:?}: {e}"),
    }
}
