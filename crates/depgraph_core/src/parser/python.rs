//! Python parser (spec §4.D). Line-anchored regex extraction after
//! stripping `#` comments and triple-quoted docstrings.

use once_cell::sync::Lazy;
use regex::Regex;

use super::LanguageParser;
use crate::model::{Reference, ReferenceKind};
use crate::validator;

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn name(&self) -> &str {
        "python"
    }

    fn extensions(&self) -> &[&str] {
        &[".py", ".pyw"]
    }

    fn parse(&self, content: &str) -> Vec<Reference> {
        extract(content)
    }
}

static IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\s*import\s+({IDENT}(?:\.{IDENT})*)")).unwrap());

static FROM_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\s*from\s+({IDENT}(?:\.{IDENT})*)\s+import\b")).unwrap());

static RELATIVE_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*from\s+(\.+)({IDENT}(?:\.{IDENT})*)?\s+import\b")).unwrap()
});

static DUNDER_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"__import__\(\s*['"]([^'"]+)['"]"#).unwrap());

static IMPORTLIB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"importlib\.import_module\(\s*['"]([^'"]+)['"]"#).unwrap());

pub fn extract(content: &str) -> Vec<Reference> {
    let cleaned = clean(content);
    let mut refs = Vec::new();

    for (line_idx, line) in cleaned.lines().enumerate() {
        let line_no = line_idx + 1;

        if let Some(caps) = RELATIVE_IMPORT_RE.captures(line) {
            let dots = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let tail = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let module = format!("{dots}{tail}");
            push(&mut refs, &module, ReferenceKind::RelativeImport, line_no, line);
            continue;
        }

        if let Some(caps) = FROM_IMPORT_RE.captures(line) {
            let module = caps.get(1).unwrap().as_str().to_string();
            push(&mut refs, &module, ReferenceKind::FromImport, line_no, line);
            continue;
        }

        if let Some(caps) = IMPORT_RE.captures(line) {
            let module = caps.get(1).unwrap().as_str().to_string();
            push(&mut refs, &module, ReferenceKind::Import, line_no, line);
        }

        if let Some(caps) = DUNDER_IMPORT_RE.captures(line) {
            let module = caps.get(1).unwrap().as_str().to_string();
            push(&mut refs, &module, ReferenceKind::DynamicImport, line_no, line);
        }

        if let Some(caps) = IMPORTLIB_RE.captures(line) {
            let module = caps.get(1).unwrap().as_str().to_string();
            push(&mut refs, &module, ReferenceKind::DynamicImport, line_no, line);
        }
    }

    super::dedup_references(refs)
}

fn push(refs: &mut Vec<Reference>, module: &str, kind: ReferenceKind, line: usize, raw_line: &str) {
    if module.contains('\n') || module.contains('\r') {
        return;
    }
    if !is_valid_module_identifier(module, kind) {
        return;
    }
    let Ok(sanitized) = validator::sanitize_import(module) else {
        return;
    };
    refs.push(Reference {
        module: sanitized,
        kind,
        line,
        column: 1,
        raw_text: raw_line.trim().to_string(),
        source_file: String::new(),
    });
}

/// Each dot-separated segment of a module identifier must match
/// `[A-Za-z_][A-Za-z0-9_]*`; relative imports may have an empty tail (bare
/// `from . import x`) or leading dots with no further segments.
fn is_valid_module_identifier(module: &str, kind: ReferenceKind) -> bool {
    let without_dots = module.trim_start_matches('.');
    if without_dots.is_empty() {
        return kind == ReferenceKind::RelativeImport;
    }
    without_dots.split('.').all(is_valid_segment)
}

fn is_valid_segment(seg: &str) -> bool {
    let mut chars = seg.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strips `#` comments (outside strings) and triple-quoted docstrings
/// (`'''`/`"""`), preserving line structure.
fn clean(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = chars.clone();

    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        SingleQuote,
        DoubleQuote,
        TripleSingle,
        TripleDouble,
    }

    let mut state = State::Code;
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let next2 = (chars.get(i + 1).copied(), chars.get(i + 2).copied());

        match state {
            State::Code => {
                if c == '#' {
                    state = State::LineComment;
                    out[i] = ' ';
                } else if c == '\'' && next2 == (Some('\''), Some('\'')) {
                    state = State::TripleSingle;
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    out[i + 2] = ' ';
                    i += 3;
                    continue;
                } else if c == '"' && next2 == (Some('"'), Some('"')) {
                    state = State::TripleDouble;
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    out[i + 2] = ' ';
                    i += 3;
                    continue;
                } else if c == '\'' {
                    state = State::SingleQuote;
                } else if c == '"' {
                    state = State::DoubleQuote;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                } else {
                    out[i] = ' ';
                }
            }
            State::SingleQuote => {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    state = State::Code;
                }
            }
            State::DoubleQuote => {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == '"' {
                    state = State::Code;
                }
            }
            State::TripleSingle => {
                if c == '\'' && next2 == (Some('\''), Some('\'')) {
                    state = State::Code;
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    out[i + 2] = ' ';
                    i += 3;
                    continue;
                }
                if c != '\n' {
                    out[i] = ' ';
                }
            }
            State::TripleDouble => {
                if c == '"' && next2 == (Some('"'), Some('"')) {
                    state = State::Code;
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    out[i + 2] = ' ';
                    i += 3;
                    continue;
                }
                if c != '\n' {
                    out[i] = ' ';
                }
            }
        }
        i += 1;
    }

    out.into_iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extracts_absolute_and_from_imports() {
        let refs = extract("import os\nfrom utils.helper import process_data\n");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.module == "os" && r.kind == ReferenceKind::Import));
        assert!(refs
            .iter()
            .any(|r| r.module == "utils.helper" && r.kind == ReferenceKind::FromImport));
    }

    #[test]
    fn extracts_relative_import_with_dot_count() {
        let refs = extract("from .local_mod import x\n");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].module, ".local_mod");
        assert_eq!(refs[0].kind, ReferenceKind::RelativeImport);
    }

    #[test]
    fn extracts_dynamic_imports() {
        let refs = extract("x = __import__('os')\ny = importlib.import_module('sys')\n");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.kind == ReferenceKind::DynamicImport));
    }

    #[test]
    fn ignores_imports_inside_comments_and_docstrings() {
        let refs = extract(
            "\"\"\"\nimport ghost\n\"\"\"\n# import also_ghost\nimport real\n",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].module, "real");
    }

    #[test]
    fn bare_relative_import_with_no_tail() {
        let refs = extract("from . import x\n");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].module, ".");
    }
}
