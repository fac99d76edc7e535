//! Data model from spec §3: `FileDescriptor`, `Reference`,
//! `ResolvedReference`, `ParseResult`, plus the metadata wrapper returned by
//! the orchestrator. `Node`/`Edge`/`Graph` live in [`crate::graph`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ErrorRecord;

/// Identity of a scanned file, immutable after creation by the Scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub basename: String,
    pub extension: String,
    pub size: u64,
    pub modified_ns: i128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    Import,
    SideEffectImport,
    Require,
    DynamicImport,
    FromImport,
    RelativeImport,
    Importlib,
    Standard,
}

/// A raw import discovered by a parser, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub module: String,
    pub kind: ReferenceKind,
    pub line: usize,
    pub column: usize,
    pub raw_text: String,
    pub source_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Local,
    External,
    StandardLibrary,
    Missing,
    Unresolved,
}

/// A [`Reference`] after the Resolver has classified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub classification: Classification,
    pub resolved_key: String,
    pub package: Option<String>,
}

/// Per-file parser output: the file it came from, its resolved references,
/// and bookkeeping about the parse itself.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub descriptor: FileDescriptor,
    pub resolved: Vec<ResolvedReference>,
    pub parser_name: String,
    pub counts_by_classification: ahashmap::AHashMap<Classification, usize>,
    pub error: Option<String>,
}

/// Stats emitted by the Scanner (spec §4.B).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub directories_scanned: usize,
    pub total_size: u64,
    pub wall_time_ms: u128,
}

/// Cache counters from spec §4.G.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Everything the Orchestrator emits alongside the [`crate::graph::Graph`]
/// itself (spec §4.H step 7).
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    pub repository_path: String,
    pub analysis_time_ms: u128,
    pub timestamp_ms: u128,
    pub version: String,
    pub scan_stats: ScanStats,
    pub errors: Vec<ErrorRecord>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub parsers: Vec<String>,
}
