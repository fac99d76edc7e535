//! Input Validator (spec §4.A): path, size, content, and encoding safety
//! rules, applied in order with first-failure-wins semantics.

use std::path::{Path, PathBuf};

use crate::model::FileDescriptor;

const MAX_PATH_LEN: usize = 4096;
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
const HARD_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
const MAX_IMPORT_LEN: usize = 500;

#[cfg(not(target_os = "windows"))]
const BLOCKED_PREFIXES: &[&str] = &["/etc", "/proc", "/sys", "/dev", "/root", "/boot"];
#[cfg(target_os = "windows")]
const BLOCKED_PREFIXES: &[&str] = &[];

const WINDOWS_RESERVED_SYMBOLS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];
const IMPORT_STRIP_SYMBOLS: &[char] = &['<', '>', '"', '|', '?', '*'];

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Why a candidate file or path was rejected. Callers convert this into a
/// dropped file / skipped reference rather than aborting the run, except at
/// the repository root where validation failure is fatal (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyPath,
    PathTooLong,
    ContainsNul,
    ContainsControlOrReservedChar,
    BlockedSystemPrefix(String),
    SuspiciousTraversal,
    NotResolvable(String),
    FileTooLarge { size: u64, max: u64 },
    ExtensionNotAllowed(String),
    ReservedDeviceName(String),
    ContentTooLarge,
    InvalidUtf8,
    BinaryContent,
    ImportTooShort,
    ImportTooLong,
    ImportContainsTraversal,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyPath => write!(f, "path is empty"),
            ValidationError::PathTooLong => write!(f, "path exceeds {MAX_PATH_LEN} bytes"),
            ValidationError::ContainsNul => write!(f, "path contains a NUL byte"),
            ValidationError::ContainsControlOrReservedChar => {
                write!(f, "path contains a control character or a reserved symbol")
            }
            ValidationError::BlockedSystemPrefix(p) => {
                write!(f, "path resolves under blocked system prefix {p}")
            }
            ValidationError::SuspiciousTraversal => {
                write!(f, "path contains a suspicious traversal sequence")
            }
            ValidationError::NotResolvable(reason) => write!(f, "path not resolvable: {reason}"),
            ValidationError::FileTooLarge { size, max } => {
                write!(f, "file size {size} exceeds max {max}")
            }
            ValidationError::ExtensionNotAllowed(ext) => write!(f, "extension {ext:?} not allowed"),
            ValidationError::ReservedDeviceName(name) => {
                write!(f, "basename {name:?} is an OS-reserved device name")
            }
            ValidationError::ContentTooLarge => write!(f, "content exceeds max length"),
            ValidationError::InvalidUtf8 => write!(f, "content is not valid UTF-8"),
            ValidationError::BinaryContent => write!(f, "content looks binary"),
            ValidationError::ImportTooShort => write!(f, "import string is empty after trimming"),
            ValidationError::ImportTooLong => write!(f, "import string exceeds {MAX_IMPORT_LEN} chars"),
            ValidationError::ImportContainsTraversal => {
                write!(f, "import string contains a triple-dot or /../ sequence")
            }
        }
    }
}

fn has_traversal_marker(s: &str) -> bool {
    let lower = s.to_lowercase();
    lower.contains("../")
        || lower.contains("..\\")
        || lower.contains("%2e%2e")
        || lower.contains("..%2f")
        || lower.contains("%2e%2e%2f")
}

/// Rule 1+2+3: validate a repository root path and return its sanitized
/// absolute canonical form.
pub fn validate_repository_root(path: &str) -> Result<PathBuf, ValidationError> {
    validate_path_string(path)?;

    if has_traversal_marker(path) {
        return Err(ValidationError::SuspiciousTraversal);
    }

    let canonical = std::fs::canonicalize(path)
        .map_err(|e| ValidationError::NotResolvable(e.to_string()))?;

    let canonical_str = canonical.to_string_lossy();
    for prefix in BLOCKED_PREFIXES {
        if canonical_str.starts_with(prefix) {
            return Err(ValidationError::BlockedSystemPrefix((*prefix).to_string()));
        }
    }

    Ok(canonical)
}

fn validate_path_string(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::EmptyPath);
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::PathTooLong);
    }
    if path.contains('\0') {
        return Err(ValidationError::ContainsNul);
    }
    if path.chars().any(|c| c.is_control()) || path.chars().any(|c| WINDOWS_RESERVED_SYMBOLS.contains(&c)) {
        return Err(ValidationError::ContainsControlOrReservedChar);
    }
    Ok(())
}

/// Rule 4: validate a scanned file candidate. Returns `Ok(())` if the file
/// should be kept, or a skip reason otherwise.
pub fn validate_file(
    descriptor: &FileDescriptor,
    max_file_size: u64,
    allowed_extensions: &[String],
) -> Result<(), ValidationError> {
    let effective_max = max_file_size.min(HARD_MAX_FILE_SIZE);
    if descriptor.size > effective_max {
        return Err(ValidationError::FileTooLarge {
            size: descriptor.size,
            max: effective_max,
        });
    }
    if !allowed_extensions.iter().any(|e| e == &descriptor.extension) {
        return Err(ValidationError::ExtensionNotAllowed(descriptor.extension.clone()));
    }
    let stem = descriptor
        .basename
        .split('.')
        .next()
        .unwrap_or(&descriptor.basename)
        .to_uppercase();
    if WINDOWS_RESERVED_NAMES.contains(&stem.as_str()) {
        return Err(ValidationError::ReservedDeviceName(descriptor.basename.clone()));
    }
    Ok(())
}

pub fn clamp_max_file_size(requested: u64) -> u64 {
    if requested == 0 {
        DEFAULT_MAX_FILE_SIZE
    } else {
        requested.min(HARD_MAX_FILE_SIZE)
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }
    if bytes.is_empty() {
        return false;
    }
    let suspicious = bytes
        .iter()
        .filter(|&&b| (0x00..=0x08).contains(&b) || (0x0E..=0x1F).contains(&b) || b == 0x7F)
        .count();
    (suspicious as f64 / bytes.len() as f64) > 0.01
}

/// Rule 5: validate and decode file content into text.
pub fn sanitize_content(bytes: &[u8], max_content_len: usize) -> Result<String, ValidationError> {
    if is_binary(bytes) {
        return Err(ValidationError::BinaryContent);
    }
    let stripped: Vec<u8> = bytes.iter().copied().filter(|&b| b != 0).collect();
    if stripped.len() > max_content_len {
        return Err(ValidationError::ContentTooLarge);
    }
    String::from_utf8(stripped).map_err(|_| ValidationError::InvalidUtf8)
}

/// Rule 6: validate and sanitize a raw import module string.
pub fn sanitize_import(raw: &str) -> Result<String, ValidationError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() && !IMPORT_STRIP_SYMBOLS.contains(c))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::ImportTooShort);
    }
    if trimmed.len() > MAX_IMPORT_LEN {
        return Err(ValidationError::ImportTooLong);
    }
    if has_suspicious_import_traversal(trimmed) {
        return Err(ValidationError::ImportContainsTraversal);
    }
    Ok(trimmed.to_string())
}

/// A leading run of `../` or `./` segments is ordinary relative-import
/// notation (even several levels deep, e.g. `../../utils`); what rule 6
/// actually guards against is a literal `...` sequence, or a `..` segment
/// appearing *after* the leading relative prefix has been consumed (i.e.
/// traversal embedded mid-path, such as `./a/../../etc/passwd`).
fn has_suspicious_import_traversal(s: &str) -> bool {
    if s.contains("...") {
        return true;
    }
    let mut rest = s;
    loop {
        if let Some(r) = rest.strip_prefix("../") {
            rest = r;
            continue;
        }
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
            continue;
        }
        break;
    }
    rest.split('/').any(|seg| seg == "..")
}

pub fn path_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert_eq!(validate_path_string(""), Err(ValidationError::EmptyPath));
    }

    #[test]
    fn rejects_reserved_symbol() {
        assert_eq!(
            validate_path_string("foo<bar"),
            Err(ValidationError::ContainsControlOrReservedChar)
        );
    }

    #[test]
    fn rejects_traversal_marker() {
        assert!(has_traversal_marker("../../etc/passwd"));
        assert!(has_traversal_marker("foo%2e%2e/bar"));
        assert!(!has_traversal_marker("foo/bar/baz"));
    }

    #[test]
    fn blocks_system_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let ok = validate_repository_root(dir.path().to_str().unwrap());
        assert!(ok.is_ok());
    }

    #[test]
    fn detects_binary_content() {
        assert!(is_binary(b"hello\0world"));
        assert!(!is_binary(b"hello world"));
    }

    #[test]
    fn sanitizes_import_strips_reserved_symbols() {
        let s = sanitize_import("./foo<bar>baz").unwrap();
        assert_eq!(s, "./foobarbaz");
    }

    #[test]
    fn rejects_import_with_embedded_traversal() {
        assert_eq!(
            sanitize_import("./a/../../etc/passwd"),
            Err(ValidationError::ImportContainsTraversal)
        );
    }

    #[test]
    fn allows_ordinary_multi_level_relative_import() {
        assert_eq!(sanitize_import("../../utils/helper").unwrap(), "../../utils/helper");
    }

    #[test]
    fn rejects_overlong_import() {
        let long = "a".repeat(600);
        assert_eq!(sanitize_import(&long), Err(ValidationError::ImportTooLong));
    }

    #[test]
    fn clamps_max_file_size_to_hard_ceiling() {
        assert_eq!(clamp_max_file_size(1_000_000_000), HARD_MAX_FILE_SIZE);
        assert_eq!(clamp_max_file_size(0), DEFAULT_MAX_FILE_SIZE);
    }
}
