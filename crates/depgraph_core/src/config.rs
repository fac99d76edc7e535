//! Configuration (spec §6, ambient): a JSON-serializable proxy config
//! validated into the runtime `Config`, mirroring how the teacher's own
//! `UnusedFinderJSONConfig` / `UnusedFinderConfig` split works.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_MAX_AGE_MS, DEFAULT_MAX_SIZE_BYTES};
use crate::scanner::{default_exclude_patterns, default_include_extensions};

const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;
const HARD_MAX_FILE_SIZE: u64 = 104_857_600;
const DEFAULT_MAX_DEPTH: usize = 50;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("max_file_size must be between 1 and {HARD_MAX_FILE_SIZE}, got {0}")]
    MaxFileSizeOutOfRange(u64),
    #[error("concurrency must be between 1 and 20, got {0}")]
    ConcurrencyOutOfRange(u32),
    #[error("output_format must be \"json\" or \"js\", got {0:?}")]
    InvalidOutputFormat(String),
}

/// JSON-facing proxy; every field is optional so it can be produced from a
/// partial `.depgraphrc`, environment variables, or CLI flags and merged in
/// that order over the defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigJson {
    pub max_file_size: Option<u64>,
    pub exclude_patterns: Option<Vec<String>>,
    pub include_extensions: Option<Vec<String>>,
    pub include_external: Option<bool>,
    pub follow_symlinks: Option<bool>,
    pub max_depth: Option<usize>,
    pub concurrency: Option<u32>,
    pub cache: Option<CacheJson>,
    pub output_format: Option<String>,
    pub output_file: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheJson {
    pub enabled: Option<bool>,
    pub max_age_ms: Option<u128>,
    pub max_size_bytes: Option<u64>,
    pub dir: Option<String>,
}

impl ConfigJson {
    /// `later` wins field-by-field; used to fold the merge chain
    /// defaults -> rc file -> env -> CLI flags (spec §6).
    pub fn merge(self, later: ConfigJson) -> ConfigJson {
        ConfigJson {
            max_file_size: later.max_file_size.or(self.max_file_size),
            exclude_patterns: later.exclude_patterns.or(self.exclude_patterns),
            include_extensions: later.include_extensions.or(self.include_extensions),
            include_external: later.include_external.or(self.include_external),
            follow_symlinks: later.follow_symlinks.or(self.follow_symlinks),
            max_depth: later.max_depth.or(self.max_depth),
            concurrency: later.concurrency.or(self.concurrency),
            cache: match (self.cache, later.cache) {
                (Some(a), Some(b)) => Some(CacheJson {
                    enabled: b.enabled.or(a.enabled),
                    max_age_ms: b.max_age_ms.or(a.max_age_ms),
                    max_size_bytes: b.max_size_bytes.or(a.max_size_bytes),
                    dir: b.dir.or(a.dir),
                }),
                (a, b) => b.or(a),
            },
            output_format: later.output_format.or(self.output_format),
            output_file: later.output_file.or(self.output_file),
        }
    }

    /// Parses a `DEPGRAPH_`-prefixed environment snapshot into overrides.
    /// Keys are `_`-separated and lowercased (e.g. `DEPGRAPH_MAX_FILE_SIZE`);
    /// values are parsed as JSON first, falling back to bool/number/string
    /// heuristics.
    pub fn from_env<I: IntoIterator<Item = (String, String)>>(vars: I) -> ConfigJson {
        let mut out = ConfigJson::default();
        for (key, value) in vars {
            let Some(suffix) = key.strip_prefix("DEPGRAPH_") else {
                continue;
            };
            let parsed = parse_env_value(&value);
            match suffix.to_lowercase().as_str() {
                "max_file_size" => out.max_file_size = parsed.as_u64(),
                "include_external" => out.include_external = parsed.as_bool(),
                "follow_symlinks" => out.follow_symlinks = parsed.as_bool(),
                "max_depth" => out.max_depth = parsed.as_u64().map(|v| v as usize),
                "concurrency" => out.concurrency = parsed.as_u64().map(|v| v as u32),
                "output_format" => out.output_format = Some(value),
                "output_file" => out.output_file = Some(value),
                "exclude_patterns" => {
                    out.exclude_patterns = Some(value.split(',').map(str::to_string).collect())
                }
                "include_extensions" => {
                    out.include_extensions = Some(value.split(',').map(str::to_string).collect())
                }
                _ => {}
            }
        }
        out
    }
}

fn parse_env_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_file_size: u64,
    pub exclude_patterns: Vec<String>,
    pub include_extensions: Vec<String>,
    pub include_external: bool,
    pub follow_symlinks: bool,
    pub max_depth: usize,
    pub concurrency: usize,
    pub cache_enabled: bool,
    pub cache_max_age_ms: u128,
    pub cache_max_size_bytes: u64,
    pub cache_dir: std::path::PathBuf,
    pub output_format: OutputFormat,
    pub output_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Js,
}

impl TryFrom<ConfigJson> for Config {
    type Error = ConfigError;

    fn try_from(value: ConfigJson) -> Result<Self, Self::Error> {
        let max_file_size = value.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE);
        if max_file_size == 0 || max_file_size > HARD_MAX_FILE_SIZE {
            return Err(ConfigError::MaxFileSizeOutOfRange(max_file_size));
        }

        let concurrency = value
            .concurrency
            .unwrap_or_else(|| (num_cpus() as u32).min(4));
        if !(1..=20).contains(&concurrency) {
            return Err(ConfigError::ConcurrencyOutOfRange(concurrency));
        }

        let output_format = match value.output_format.as_deref().unwrap_or("json") {
            "json" => OutputFormat::Json,
            "js" => OutputFormat::Js,
            other => return Err(ConfigError::InvalidOutputFormat(other.to_string())),
        };

        let cache = value.cache.unwrap_or_default();

        Ok(Config {
            max_file_size,
            exclude_patterns: value.exclude_patterns.unwrap_or_else(default_exclude_patterns),
            include_extensions: value
                .include_extensions
                .unwrap_or_else(default_include_extensions),
            include_external: value.include_external.unwrap_or(false),
            follow_symlinks: value.follow_symlinks.unwrap_or(false),
            max_depth: value.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            concurrency: concurrency as usize,
            cache_enabled: cache.enabled.unwrap_or(true),
            cache_max_age_ms: cache.max_age_ms.unwrap_or(DEFAULT_MAX_AGE_MS),
            cache_max_size_bytes: cache.max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES),
            cache_dir: cache
                .dir
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join(".depgraph/cache")),
            output_format,
            output_file: value.output_file.unwrap_or_else(|| "network-data.json".to_string()),
        })
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

trait JsonValueExt {
    fn as_u64(&self) -> Option<u64>;
    fn as_bool(&self) -> Option<bool>;
}

impl JsonValueExt for serde_json::Value {
    fn as_u64(&self) -> Option<u64> {
        match self {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
    fn as_bool(&self) -> Option<bool> {
        match self {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::try_from(ConfigJson::default()).unwrap();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let json = ConfigJson {
            concurrency: Some(21),
            ..Default::default()
        };
        assert_eq!(
            Config::try_from(json),
            Err(ConfigError::ConcurrencyOutOfRange(21))
        );
    }

    #[test]
    fn merge_prefers_later_values() {
        let defaults = ConfigJson {
            max_file_size: Some(1024),
            include_external: Some(false),
            ..Default::default()
        };
        let cli = ConfigJson {
            include_external: Some(true),
            ..Default::default()
        };
        let merged = defaults.merge(cli);
        assert_eq!(merged.max_file_size, Some(1024));
        assert_eq!(merged.include_external, Some(true));
    }

    #[test]
    fn env_vars_are_parsed_with_fallback_heuristics() {
        let json = ConfigJson::from_env([
            ("DEPGRAPH_INCLUDE_EXTERNAL".to_string(), "true".to_string()),
            ("DEPGRAPH_MAX_FILE_SIZE".to_string(), "2048".to_string()),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(json.include_external, Some(true));
        assert_eq!(json.max_file_size, Some(2048));
    }
}
