mod config_loader;

use std::process::ExitCode;

use clap::Parser;
use depgraph_core::config::{Config, ConfigJson};
use depgraph_core::output;
use logger::{Logger, StdioLogger};

/// Walks a source repository and emits its file-level dependency graph.
#[derive(Parser, Debug)]
#[command(name = "depgraph", version, about, long_about = None)]
struct CliArgs {
    /// Repository root to analyze.
    repository_path: String,

    /// Write the graph here instead of the configured `output_file`.
    #[arg(short, long)]
    output: Option<String>,

    /// Output format: json or js.
    #[arg(short, long)]
    format: Option<String>,

    /// Explicit config file path (skips the default `.depgraphrc*` search).
    #[arg(short, long)]
    config: Option<String>,

    /// Include external/standard-library packages as graph nodes.
    #[arg(long)]
    include_external: bool,

    /// Comma-separated glob patterns to exclude, in addition to the defaults.
    #[arg(long)]
    exclude_patterns: Option<String>,

    /// Maximum file size in bytes to analyze.
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Print a human-readable summary after analysis.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the human-readable summary; only the output file is written.
    #[arg(short, long)]
    quiet: bool,

    /// Disable the content-addressed cache for this run.
    #[arg(long)]
    no_cache: bool,
}

impl CliArgs {
    fn as_overlay(&self) -> ConfigJson {
        ConfigJson {
            max_file_size: self.max_file_size,
            exclude_patterns: self.exclude_patterns.as_ref().map(|s| {
                s.split(',').map(|p| p.trim().to_string()).collect()
            }),
            include_external: if self.include_external { Some(true) } else { None },
            output_format: self.format.clone(),
            output_file: self.output.clone(),
            cache: self.no_cache.then(|| depgraph_core::config::CacheJson {
                enabled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("depgraph: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> anyhow::Result<()> {
    let rc_config = config_loader::load(args.config.as_deref())?;
    let env_config = ConfigJson::from_env(std::env::vars());

    let mut merged = ConfigJson::default();
    if let Some(rc) = rc_config {
        merged = merged.merge(rc);
    }
    merged = merged.merge(env_config);
    merged = merged.merge(args.as_overlay());

    let config = Config::try_from(merged)?;

    let stdio_logger = StdioLogger::new();
    let null_logger = NullLogger;
    let start = std::time::Instant::now();

    let outcome = if args.quiet {
        depgraph_core::analyze(&args.repository_path, &config, &null_logger)
    } else {
        depgraph_core::analyze(&args.repository_path, &config, &stdio_logger)
    }
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let wire = output::to_wire(&outcome.graph, &outcome.metadata, &config);
    let serialized = match config.output_format {
        depgraph_core::config::OutputFormat::Json => serde_json::to_string_pretty(&wire)?,
        depgraph_core::config::OutputFormat::Js => {
            format!("module.exports = {};\n", serde_json::to_string_pretty(&wire)?)
        }
    };

    let output_path = args.output.clone().unwrap_or_else(|| config.output_file.clone());
    std::fs::write(&output_path, serialized)
        .map_err(|e| anyhow::anyhow!("writing output file {output_path}: {e}"))?;

    if !args.quiet {
        println!(
            "analyzed {} in {}ms: {} nodes, {} edges, {} cycles, {} errors -> {}",
            outcome.metadata.repository_path,
            start.elapsed().as_millis(),
            outcome.graph.nodes.len(),
            outcome.graph.edges.len(),
            outcome.graph.cycles.len(),
            outcome.metadata.errors.len(),
            output_path,
        );
        if args.verbose {
            println!(
                "cache: {} hits / {} misses ({:.1}% hit rate)",
                outcome.metadata.cache_hits,
                outcome.metadata.cache_misses,
                outcome.metadata.cache_hit_rate * 100.0,
            );
            for error in &outcome.metadata.errors {
                println!(
                    "  [{}] {}: {}",
                    error.kind,
                    error.file.as_deref().unwrap_or("<repository>"),
                    error.message,
                );
            }
        }
    }

    Ok(())
}

struct NullLogger;
impl Logger for &NullLogger {
    fn log(&self, _message: impl Into<String>) {}
}
