use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use logcluster::analyzer::{Analyzer, ClusterSummary};
use logcluster::config::AnalyzerConfig;
use logcluster::identifiers::{Identifiers, IdentifiersConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "logcluster", version, about = "Online clustering of log lines into generalized patterns")]
struct Cli {
    /// Input files (`-` for stdin). Reads stdin when none are given.
    #[arg(required = false)]
    input: Vec<String>,

    /// Cluster count above which merges are attempted
    #[arg(long = "soft-limit", alias = "minlimit", default_value_t = AnalyzerConfig::default().soft_limit)]
    soft_limit: usize,
    /// Cluster count above which the least recently matched cluster is evicted
    #[arg(long = "hard-limit", alias = "maxlimit", default_value_t = AnalyzerConfig::default().hard_limit)]
    hard_limit: usize,
    /// Minimum token similarity for alignment, within (0, 1)
    #[arg(long = "min-similarity", alias = "minsimilarity", default_value_t = AnalyzerConfig::default().min_similarity)]
    min_similarity: f64,
    /// Minimum literal share of a merged cluster, within (0, 1)
    #[arg(long = "min-precision", alias = "minprecision", default_value_t = AnalyzerConfig::default().min_precision)]
    min_precision: f64,

    /// Identifier configuration file (`NAME pattern` per line)
    #[arg(long = "identifiers")]
    identifiers: Option<PathBuf>,
    /// Gap representation in cluster text output
    #[arg(long = "gap-marker", alias = "gapmarker", default_value = "@@")]
    gap_marker: String,

    /// Print the anchored regex of every cluster
    #[arg(long = "print-regex", alias = "printclustersregex", default_value_t = false)]
    print_regex: bool,
    /// Print every cluster as text with gap markers (default output)
    #[arg(long = "print-text", alias = "printclusterstext", default_value_t = false)]
    print_text: bool,
    /// Print per-cluster statistics
    #[arg(long = "print-summary", alias = "printsummary", default_value_t = false)]
    print_summary: bool,
    /// Summary output format
    #[arg(long = "format", value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print a dot to stderr per input line
    #[arg(long = "progress", alias = "printprogress", default_value_t = false)]
    progress: bool,
    /// Log merges and evictions to stderr
    #[arg(long = "debug", default_value_t = false)]
    debug: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    config: &'a AnalyzerConfig,
    lines: u64,
    clusters: Vec<ClusterSummary>,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = AnalyzerConfig {
        soft_limit: cli.soft_limit,
        hard_limit: cli.hard_limit,
        min_similarity: cli.min_similarity,
        min_precision: cli.min_precision,
    };
    let identifiers = match &cli.identifiers {
        Some(path) => {
            let raw = IdentifiersConfig::load(path)?;
            Identifiers::compile(&raw).with_context(|| format!("invalid identifiers in {}", path.display()))?
        }
        None => Identifiers::default(),
    };
    tracing::debug!(?config, identifiers = identifiers.len(), "starting analysis");
    let mut analyzer = Analyzer::with_identifiers(config, identifiers).context("invalid analyzer configuration")?;

    let inputs = if cli.input.is_empty() { vec!["-".to_string()] } else { cli.input.clone() };
    let mut progress = io::stderr();
    for path in &inputs {
        let reader = open_input(path)?;
        for line in reader.lines() {
            let line = line.with_context(|| format!("failed to read {path}"))?;
            analyzer.analyze_line(&line)?;
            if cli.progress {
                let _ = progress.write_all(b".");
                let _ = progress.flush();
            }
        }
    }
    if cli.progress {
        let _ = writeln!(progress);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let print_text = cli.print_text || !(cli.print_regex || cli.print_summary);
    if cli.print_regex {
        for cluster in analyzer.clusters() {
            writeln!(out, "{}", cluster.pattern())?;
        }
    }
    if print_text {
        for cluster in analyzer.clusters() {
            writeln!(out, "{}", cluster.to_text(&cli.gap_marker))?;
        }
    }
    if cli.print_summary {
        let clusters = analyzer.summaries(&cli.gap_marker);
        match cli.format {
            Format::Json => {
                let report = Report { config: analyzer.config(), lines: analyzer.lines_seen(), clusters };
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            }
            Format::Text => {
                writeln!(out, "{} lines, {} clusters", analyzer.lines_seen(), clusters.len())?;
                for c in &clusters {
                    writeln!(out, "{:<8} {:<8} {}", c.match_count, c.last_seen_line, c.text)?;
                }
            }
        }
    }
    Ok(())
}
