//! Orchestrator (spec §4.H): sequences repo-root validation, repo-level
//! cache lookup, scanning, bounded-concurrency parse+resolve, graph
//! assembly, and repo-level cache storage. Only [`AnalyzerError::Fatal`]
//! aborts the run; everything else is downgraded to an [`ErrorRecord`] in
//! [`AnalysisMetadata::errors`] (spec §7).

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahashmap::AHashSet;
use logger::Logger;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::{self, CacheManager};
use crate::config::Config;
use crate::error::{now_ms, AnalyzerError, ErrorKind, ErrorRecord};
use crate::graph::{Builder, BuilderConfig, Graph};
use crate::model::{AnalysisMetadata, FileDescriptor, ParseResult, ResolvedReference, ScanStats};
use crate::parser::{self, Registry};
use crate::resolver::{self, ResolverContext};
use crate::scanner::{self, ScannerConfig};
use crate::validator;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(30);
const RETRYABLE_ERRNOS: &[i32] = &[13, 11, 16, 23, 24]; // EACCES, EAGAIN, EBUSY, ENFILE, EMFILE
const MAX_RETRIES: u32 = 3;

pub struct AnalysisOutcome {
    pub graph: Graph,
    pub metadata: AnalysisMetadata,
}

/// Runs a full analysis of `repository_path` under `config`, logging
/// progress through `logger` (spec §4.H, step by step).
pub fn analyze(
    repository_path: &str,
    config: &Config,
    logger: impl Logger,
) -> Result<AnalysisOutcome, AnalyzerError> {
    let start = Instant::now();
    let mut errors: Vec<ErrorRecord> = Vec::new();

    // Step 1: validate root. Failure here is fatal (spec §7).
    let root = validator::validate_repository_root(repository_path)
        .map_err(|e| AnalyzerError::Fatal(format!("repository root rejected: {e}")))?;
    logger.log(format!("validated repository root {}", root.display()));

    // Step 2: initialize cache, compute repo key, check for a hit.
    let cache = CacheManager::new(
        config.cache_dir.clone(),
        config.cache_max_age_ms,
        config.cache_max_size_bytes,
        config.cache_enabled,
    );
    if let Err(e) = cache.cleanup_expired() {
        logger.warn(format!("cache cleanup_expired failed: {e}"));
        errors.push(cache_error_record(e.to_string()));
    }
    if let Err(e) = cache.enforce_size_limit() {
        logger.warn(format!("cache enforce_size_limit failed: {e}"));
        errors.push(cache_error_record(e.to_string()));
    }

    let repo_key = cache::repo_key(
        &root,
        config.include_external,
        &config.exclude_patterns,
        &config.include_extensions,
        config.max_file_size,
    );

    if let Some(cached_graph) = cache.get::<Graph>(&repo_key) {
        logger.log("repo-level cache hit; analysis short-circuited".to_string());
        return Ok(AnalysisOutcome {
            graph: cached_graph,
            metadata: build_metadata(&root, start, ScanStats::default(), errors, &cache),
        });
    }

    // Step 3: scan.
    let scanner_config = ScannerConfig {
        max_file_size: config.max_file_size,
        exclude_patterns: config.exclude_patterns.clone(),
        include_extensions: config.include_extensions.clone(),
        follow_symlinks: config.follow_symlinks,
        max_depth: config.max_depth,
    };
    let scan_outcome = scanner::scan(&root, &scanner_config);
    errors.extend(scan_outcome.errors.clone());
    logger.log(format!(
        "scanned {} files ({} skipped, {} directories) in {}ms",
        scan_outcome.stats.files_scanned,
        scan_outcome.stats.files_skipped,
        scan_outcome.stats.directories_scanned,
        scan_outcome.stats.wall_time_ms,
    ));

    if scan_outcome.descriptors.is_empty() {
        let graph = Builder::new(&root, BuilderConfig { include_external: config.include_external }).build();
        return Ok(AnalysisOutcome {
            graph,
            metadata: build_metadata(&root, start, scan_outcome.stats, errors, &cache),
        });
    }

    // Step 4: partition into batches of `concurrency`, parse+resolve each
    // batch concurrently, await the batch before starting the next.
    let scanned_paths: AHashSet<PathBuf> =
        scan_outcome.descriptors.iter().map(|d| d.absolute_path.clone()).collect();
    let registry = Registry::with_builtins();
    let concurrency = config.concurrency.clamp(1, 20);
    let ctx = ResolverContext { repo_root: &root, scanned_paths: &scanned_paths };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .map_err(|e| AnalyzerError::Fatal(format!("failed to build worker pool: {e}")))?;

    let mut parse_results: Vec<ParseResult> = Vec::with_capacity(scan_outcome.descriptors.len());

    for batch in scan_outcome.descriptors.chunks(concurrency) {
        let batch_outcomes: Vec<(ParseResult, Vec<ErrorRecord>)> = pool.install(|| {
            batch
                .par_iter()
                .map(|descriptor| {
                    parse_one(descriptor, &registry, &cache, &ctx, config.max_file_size, DEFAULT_FILE_TIMEOUT)
                })
                .collect()
        });
        for (result, recs) in batch_outcomes {
            parse_results.push(result);
            errors.extend(recs);
        }
    }

    // Step 5: graph assembly.
    let mut builder = Builder::new(&root, BuilderConfig { include_external: config.include_external });
    builder.assemble_nodes(&scan_outcome.descriptors, &parse_results);
    for (descriptor, parse_result) in scan_outcome.descriptors.iter().zip(parse_results.iter()) {
        let id = *builder
            .path_to_id()
            .get(&descriptor.absolute_path)
            .expect("every descriptor receives a node id during assemble_nodes");
        builder.emit_edges(id, parse_result);
    }
    let graph = builder.build();
    logger.log(format!(
        "built graph: {} nodes, {} edges, {} cycles",
        graph.nodes.len(),
        graph.edges.len(),
        graph.cycles.len(),
    ));

    // Step 6: store under the repo cache key.
    if let Err(e) = cache.set(&repo_key, &graph) {
        logger.warn(format!("repo cache write failed: {e}"));
        errors.push(cache_error_record(e.to_string()));
    }

    Ok(AnalysisOutcome { graph, metadata: build_metadata(&root, start, scan_outcome.stats, errors, &cache) })
}

fn build_metadata(
    root: &Path,
    start: Instant,
    scan_stats: ScanStats,
    errors: Vec<ErrorRecord>,
    cache: &CacheManager,
) -> AnalysisMetadata {
    let cache_stats = cache.stats();
    AnalysisMetadata {
        repository_path: root.display().to_string(),
        analysis_time_ms: start.elapsed().as_millis(),
        timestamp_ms: now_ms(),
        version: CURRENT_VERSION.to_string(),
        scan_stats,
        errors,
        cache_hits: cache_stats.hits,
        cache_misses: cache_stats.misses,
        cache_hit_rate: cache_stats.hit_rate(),
        parsers: vec!["javascript".to_string(), "python".to_string(), "json".to_string()],
    }
}

fn cache_error_record(message: String) -> ErrorRecord {
    ErrorRecord { file: None, kind: ErrorKind::Cache, message, line: None, column: None, timestamp_ms: now_ms() }
}

/// What a single file's parse+resolve pass produces, cached at file
/// granularity keyed on (path, size, mtime) (spec §4.G).
#[derive(Serialize, Deserialize)]
struct FileCacheEntry {
    resolved: Vec<ResolvedReference>,
    parser_name: String,
    error: Option<String>,
}

/// Parses and resolves one file, consulting/populating the file-level cache
/// first, and enforcing the per-file timeout (spec §5: 30s default; on
/// timeout the file is recorded as an error and still appears with zero
/// dependencies).
fn parse_one(
    descriptor: &FileDescriptor,
    registry: &Registry,
    cache: &CacheManager,
    ctx: &ResolverContext,
    max_file_size: u64,
    timeout: Duration,
) -> (ParseResult, Vec<ErrorRecord>) {
    let key = cache::file_key(&descriptor.absolute_path, descriptor.size, descriptor.modified_ns);

    if let Some(entry) = cache.get::<FileCacheEntry>(&key) {
        let parse_result =
            parser::to_parse_result(descriptor.clone(), entry.resolved, entry.parser_name, entry.error);
        return (parse_result, Vec::new());
    }
    cache.record_plain_miss();

    let started = Instant::now();
    let (resolved, parser_name, error, mut recs) = do_parse(descriptor, registry, ctx, max_file_size);
    let elapsed = started.elapsed();

    if elapsed > timeout {
        let rec = file_error_record(
            descriptor,
            ErrorKind::Io,
            format!("parse exceeded the {:?} budget (took {:?})", timeout, elapsed),
            None,
            None,
        );
        return (
            parser::to_parse_result(descriptor.clone(), Vec::new(), String::new(), Some(rec.message.clone())),
            vec![rec],
        );
    }

    if error.is_none() {
        let entry = FileCacheEntry { resolved: resolved.clone(), parser_name: parser_name.clone(), error: None };
        if let Err(e) = cache.set(&key, &entry) {
            recs.push(file_error_record(descriptor, ErrorKind::Cache, e.to_string(), None, None));
        }
    }
    (parser::to_parse_result(descriptor.clone(), resolved, parser_name, error), recs)
}

#[allow(clippy::type_complexity)]
fn do_parse(
    descriptor: &FileDescriptor,
    registry: &Registry,
    ctx: &ResolverContext,
    max_file_size: u64,
) -> (Vec<ResolvedReference>, String, Option<String>, Vec<ErrorRecord>) {
    let mut recs = Vec::new();

    let bytes = match read_with_retry(&descriptor.absolute_path) {
        Ok(b) => b,
        Err(e) => {
            let rec = file_error_record(descriptor, ErrorKind::Io, e.to_string(), None, None);
            recs.push(rec.clone());
            return (Vec::new(), String::new(), Some(rec.message), recs);
        }
    };

    let content = match validator::sanitize_content(&bytes, max_file_size as usize) {
        Ok(c) => c,
        Err(e) => {
            let rec = file_error_record(descriptor, ErrorKind::Validation, e.to_string(), None, None);
            recs.push(rec.clone());
            return (Vec::new(), String::new(), Some(rec.message), recs);
        }
    };

    let (references, parser_name) = match registry.parse(descriptor, &content) {
        Ok(r) => r,
        Err(e) => {
            let rec = file_error_record(descriptor, ErrorKind::Parse, e.to_string(), None, None);
            recs.push(rec.clone());
            return (Vec::new(), String::new(), Some(rec.message), recs);
        }
    };

    let resolved: Vec<ResolvedReference> = references
        .into_iter()
        .map(|mut reference| {
            reference.source_file = descriptor.relative_path.clone();
            match descriptor.extension.as_str() {
                ".py" | ".pyw" => resolver::resolve_python(reference, &descriptor.absolute_path, ctx),
                _ => resolver::resolve_javascript(reference, &descriptor.absolute_path, ctx),
            }
        })
        .collect();

    (resolved, parser_name, None, recs)
}

fn file_error_record(
    descriptor: &FileDescriptor,
    kind: ErrorKind,
    message: String,
    line: Option<usize>,
    column: Option<usize>,
) -> ErrorRecord {
    ErrorRecord {
        file: Some(descriptor.relative_path.clone()),
        kind,
        message,
        line,
        column,
        timestamp_ms: now_ms(),
    }
}

/// `io` errors with codes EACCES/EMFILE/ENFILE/EAGAIN/EBUSY (or messages
/// mentioning timeout/network/connection) are retried up to 3 times with
/// linear backoff; `ENOENT` is surfaced immediately, never retried (spec §7).
fn read_with_retry(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut attempt = 0u32;
    loop {
        match std::fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                if e.kind() == IoErrorKind::NotFound || attempt >= MAX_RETRIES || !is_retryable(&e) {
                    return Err(e);
                }
                attempt += 1;
                std::thread::sleep(Duration::from_secs(attempt as u64));
            }
        }
    }
}

fn is_retryable(e: &std::io::Error) -> bool {
    if let Some(code) = e.raw_os_error() {
        if RETRYABLE_ERRNOS.contains(&code) {
            return true;
        }
    }
    let msg = e.to_string().to_lowercase();
    msg.contains("timeout") || msg.contains("network") || msg.contains("connection")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Config, ConfigJson};
    use logger::VecLogger;
    use test_tmpdir::map;

    fn config_for(tmp: &test_tmpdir::TmpDir, include_external: bool) -> Config {
        let mut c = Config::try_from(ConfigJson { include_external: Some(include_external), ..Default::default() })
            .unwrap();
        c.cache_enabled = false;
        c.cache_dir = tmp.root_join(".depgraph-cache");
        c
    }

    #[test]
    fn js_chain_scenario() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "index.js" => "import {h} from './utils/helper'; import 'lodash';",
            "utils/helper.js" => "import {f} from './formatter';",
            "utils/formatter.js" => "export const f = 1;"
        });
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(outcome.graph.nodes.len(), 3);
        assert_eq!(outcome.graph.edges.len(), 2);
        assert_eq!(outcome.graph.cycles.len(), 0);
    }

    #[test]
    fn cycle_scenario() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "a.js" => "import './b';",
            "b.js" => "import './a';"
        });
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(outcome.graph.nodes.len(), 2);
        assert_eq!(outcome.graph.edges.len(), 2);
        assert_eq!(outcome.graph.cycles.len(), 1);
        assert_eq!(outcome.graph.cycles[0].first(), outcome.graph.cycles[0].last());
    }

    #[test]
    fn missing_scenario() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "index.js" => "import './missing'; import './present';",
            "present.js" => "export const x = 1;"
        });
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(outcome.graph.nodes.len(), 3);
        assert_eq!(outcome.graph.edges.len(), 2);
        assert_eq!(
            outcome.graph.nodes.iter().filter(|n| n.is_missing).count(),
            1
        );
    }

    #[test]
    fn python_mixed_scenario() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "main.py" => "import os\nfrom utils.helper import process_data\nfrom .local_mod import x\n",
            "utils/helper.py" => "def process_data(): pass\n",
            "local_mod.py" => "x = 1\n"
        });
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(outcome.graph.nodes.len(), 3);
        assert_eq!(outcome.graph.edges.len(), 2);
    }

    #[test]
    fn exclude_scenario_keeps_node_modules_out() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "node_modules/pkg/index.js" => "module.exports = {};",
            "src/index.js" => "export const a = 1;"
        });
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert!(outcome.graph.nodes.iter().all(|n| !n.path.contains("node_modules")));
        assert!(outcome.graph.nodes.iter().any(|n| n.path == "src/index.js"));
    }

    #[test]
    fn scoped_external_with_flag_on() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "index.js" => "import x from '@babel/core';"
        });
        let config = config_for(&tmp, true);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(outcome.graph.nodes.len(), 2);
        assert_eq!(outcome.graph.edges.len(), 1);
        let external = outcome.graph.nodes.iter().find(|n| n.is_external).unwrap();
        assert_eq!(external.package, Some("@babel/core".to_string()));
    }

    #[test]
    fn empty_repository_yields_empty_graph() {
        let tmp = test_tmpdir::TmpDir::new();
        let config = config_for(&tmp, false);
        let logger = VecLogger::new();
        let outcome = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert!(outcome.graph.nodes.is_empty());
        assert!(outcome.graph.edges.is_empty());
    }

    #[test]
    fn repo_cache_hit_is_idempotent() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "index.js" => "import './util';",
            "util.js" => "export const a = 1;"
        });
        let mut config = config_for(&tmp, false);
        config.cache_enabled = true;

        let logger = VecLogger::new();
        let first = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();
        let second = analyze(tmp.root().to_str().unwrap(), &config, &logger).unwrap();

        assert_eq!(first.graph.nodes.len(), second.graph.nodes.len());
        assert_eq!(first.graph.edges.len(), second.graph.edges.len());
        assert!(second.metadata.cache_hits >= 1);
    }

    #[test]
    fn fatal_on_nonexistent_root() {
        let logger = VecLogger::new();
        let config = Config::try_from(ConfigJson::default()).unwrap();
        let result = analyze("/this/path/does/not/exist/hopefully", &config, &logger);
        assert!(result.is_err());
    }
}
