//! File Scanner (spec §4.B): depth-first traversal with glob-based
//! exclusion and extension-based inclusion, bounded-concurrency candidate
//! validation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use glob::Pattern;
use path_slash::PathExt as _;
use rayon::prelude::*;

use crate::error::ErrorRecord;
use crate::model::{FileDescriptor, ScanStats};
use crate::validator;

const DEFAULT_VALIDATION_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub max_file_size: u64,
    pub exclude_patterns: Vec<String>,
    pub include_extensions: Vec<String>,
    pub follow_symlinks: bool,
    pub max_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1_048_576,
            exclude_patterns: default_exclude_patterns(),
            include_extensions: default_include_extensions(),
            follow_symlinks: false,
            max_depth: 50,
        }
    }
}

pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        "node_modules/**".to_string(),
        ".git/**".to_string(),
        "dist/**".to_string(),
        "build/**".to_string(),
        "coverage/**".to_string(),
        ".nyc_output/**".to_string(),
        "**/*.min.js".to_string(),
    ]
}

pub fn default_include_extensions() -> Vec<String> {
    vec![
        ".js".to_string(),
        ".jsx".to_string(),
        ".ts".to_string(),
        ".tsx".to_string(),
        ".py".to_string(),
    ]
}

/// A set of compiled exclude globs, rooted at the repository root (spec
/// §4.B "Glob semantics").
///
/// Each configured pattern is compiled both as written (anchored against the
/// full relative path) and, unless it already starts with `**/`, with an
/// implicit `**/` prefix — so a bare pattern like `node_modules/**` excludes
/// `node_modules` at any depth, not only at the repository root. This
/// mirrors every real tool's `.gitignore`-style expectation of its own
/// default excludes and is required by spec §8's glob-boundary property
/// (`foo/node_modules/bar.js` excluded, `foo/bar/node_modulesX/x.js` not).
pub struct ExcludeGlobs {
    patterns: Vec<(Pattern, Option<Pattern>)>,
}

impl ExcludeGlobs {
    pub fn compile(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                let anchored = Pattern::new(p).ok()?;
                let deep = if p.starts_with("**/") {
                    None
                } else {
                    Pattern::new(&format!("**/{p}")).ok()
                };
                Some((anchored, deep))
            })
            .collect();
        Self { patterns }
    }

    /// `relative_path` must already be `/`-separated.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|(anchored, deep)| {
            anchored.matches(relative_path) || deep.as_ref().is_some_and(|d| d.matches(relative_path))
        })
    }
}

pub struct ScanOutcome {
    pub descriptors: Vec<FileDescriptor>,
    pub stats: ScanStats,
    pub errors: Vec<ErrorRecord>,
}

pub fn scan(root: &Path, config: &ScannerConfig) -> ScanOutcome {
    let start = Instant::now();
    let excludes = ExcludeGlobs::compile(&config.exclude_patterns);

    let mut directories_scanned = 0usize;
    let mut files_skipped = 0usize;
    let mut errors = Vec::new();

    let max_depth = config.max_depth;
    let follow_symlinks = config.follow_symlinks;

    let walker = jwalk::WalkDir::new(root)
        .follow_links(follow_symlinks)
        .max_depth(if max_depth == 0 { usize::MAX } else { max_depth });

    let mut candidates: Vec<(PathBuf, String)> = Vec::new();

    for entry_result in walker {
        match entry_result {
            Ok(entry) => {
                let path = entry.path();
                if path == root {
                    continue;
                }
                let relative = match path.strip_prefix(root) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let relative_slash = match relative.to_slash() {
                    Some(s) => s.to_string(),
                    None => continue,
                };

                if excludes.is_excluded(&relative_slash) {
                    continue;
                }

                if entry.file_type().is_dir() {
                    directories_scanned += 1;
                    continue;
                }

                if !entry.file_type().is_file() {
                    if entry.file_type().is_symlink() && follow_symlinks {
                        if let Ok(target_meta) = std::fs::metadata(&path) {
                            if target_meta.is_file() {
                                candidates.push((path, relative_slash));
                            }
                        }
                    }
                    continue;
                }

                candidates.push((path, relative_slash));
            }
            Err(e) => {
                errors.push(ErrorRecord {
                    file: None,
                    kind: crate::error::ErrorKind::Io,
                    message: e.to_string(),
                    line: None,
                    column: None,
                    timestamp_ms: crate::error::now_ms(),
                });
            }
        }
    }

    let max_file_size = validator::clamp_max_file_size(config.max_file_size);
    let include_extensions = &config.include_extensions;

    let mut descriptors = Vec::new();
    let mut total_size = 0u64;

    for batch in candidates.chunks(DEFAULT_VALIDATION_BATCH_SIZE) {
        let results: Vec<Option<FileDescriptor>> = batch
            .par_iter()
            .map(|(path, relative_slash)| {
                build_descriptor(path, relative_slash, max_file_size, include_extensions)
            })
            .collect();

        for (result, (path, _)) in results.into_iter().zip(batch.iter()) {
            match result {
                Some(descriptor) => {
                    total_size += descriptor.size;
                    descriptors.push(descriptor);
                }
                None => {
                    files_skipped += 1;
                    let _ = path;
                }
            }
        }
    }

    descriptors.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    ScanOutcome {
        stats: ScanStats {
            files_scanned: descriptors.len(),
            files_skipped,
            directories_scanned,
            total_size,
            wall_time_ms: start.elapsed().as_millis(),
        },
        descriptors,
        errors,
    }
}

fn build_descriptor(
    path: &Path,
    relative_slash: &str,
    max_file_size: u64,
    include_extensions: &[String],
) -> Option<FileDescriptor> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    if std::fs::File::open(path).is_err() {
        return None;
    }

    let basename = validator::path_basename(path);
    let extension = extension_of(&basename);
    let modified_ns = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0);

    let descriptor = FileDescriptor {
        absolute_path: path.to_path_buf(),
        relative_path: relative_slash.to_string(),
        basename,
        extension,
        size: metadata.len(),
        modified_ns,
    };

    validator::validate_file(&descriptor, max_file_size, include_extensions).ok()?;

    Some(descriptor)
}

/// Lowercased extension including the leading dot, e.g. `.tsx`. Returns an
/// empty string for extensionless files.
pub fn extension_of(basename: &str) -> String {
    match basename.rfind('.') {
        Some(idx) if idx > 0 => basename[idx..].to_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_tmpdir::map;

    #[test]
    fn glob_boundary_excludes_node_modules_but_not_lookalike() {
        let excludes = ExcludeGlobs::compile(&default_exclude_patterns());
        assert!(excludes.is_excluded("foo/node_modules/bar.js"));
        assert!(!excludes.is_excluded("foo/bar/node_modulesX/x.js"));
    }

    #[test]
    fn scans_simple_tree_and_respects_excludes() {
        let tmp = test_tmpdir::TmpDir::new_with_content(&map! {
            "src/index.js" => "import './util';",
            "src/util.js" => "export const a = 1;",
            "node_modules/pkg/index.js" => "module.exports = {};"
        });
        let outcome = scan(tmp.root(), &ScannerConfig::default());
        let paths: Vec<_> = outcome.descriptors.iter().map(|d| d.relative_path.clone()).collect();
        assert!(paths.contains(&"src/index.js".to_string()));
        assert!(paths.contains(&"src/util.js".to_string()));
        assert!(!paths.iter().any(|p| p.contains("node_modules")));
    }

    #[test]
    fn extension_of_handles_dotfiles_and_missing_ext() {
        assert_eq!(extension_of("index.ts"), ".ts");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".gitignore"), "");
    }
}
