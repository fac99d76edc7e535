//! JavaScript/TypeScript family parser (spec §4.D). Regex-over-raw-source
//! approximation: comments and interpolated template literals are blanked
//! out before the keyword scan runs, so neither can produce a false match.
//! `regex` has no look-around, so keyword anchors are located with plain
//! patterns and the surrounding syntax (bindings, parens, quotes) is walked
//! by hand from each anchor.

use once_cell::sync::Lazy;
use regex::Regex;

use super::LanguageParser;
use crate::model::{Reference, ReferenceKind};
use crate::validator;

pub struct JavaScriptParser;

impl LanguageParser for JavaScriptParser {
    fn name(&self) -> &str {
        "javascript"
    }

    fn extensions(&self) -> &[&str] {
        &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"]
    }

    fn parse(&self, content: &str) -> Vec<Reference> {
        extract(content)
    }
}

static IMPORT_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bimport\b").unwrap());
static REQUIRE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\brequire\b").unwrap());
static FROM_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfrom\b").unwrap());

pub fn extract(content: &str) -> Vec<Reference> {
    let cleaned = clean(content);
    let chars: Vec<char> = cleaned.chars().collect();
    // `cleaned` only blanks comments and interpolated template bodies, so the
    // *contents* of an ordinary '/"/` string survive untouched for
    // `extract_quoted` to read back a real import target. That means the
    // literal word "import" or "require" spelled out inside some unrelated
    // string (`const s = "import './ghost'"`) still produces a keyword
    // match here — `inert` marks every index lexically inside a string or
    // comment so such matches can be told apart from a real statement anchor
    // without blanking the very quotes a genuine import needs intact.
    let inert = inert_mask(content);

    let mut refs = Vec::new();

    for m in IMPORT_KEYWORD.find_iter(&cleaned) {
        let start = char_index_of_byte(&cleaned, m.start());
        if inert.get(start).copied().unwrap_or(false) {
            continue;
        }
        let after = char_index_of_byte(&cleaned, m.end());
        if let Some(reference) = parse_import_occurrence(&chars, after) {
            refs.push(reference);
        }
    }

    for m in REQUIRE_KEYWORD.find_iter(&cleaned) {
        let start = char_index_of_byte(&cleaned, m.start());
        if inert.get(start).copied().unwrap_or(false) {
            continue;
        }
        let after = char_index_of_byte(&cleaned, m.end());
        if let Some(reference) = parse_require_occurrence(&chars, after) {
            refs.push(reference);
        }
    }

    super::dedup_references(refs)
}

/// Marks every char index lexically inside a line/block comment, a
/// single/double-quoted string, or a template literal body (excluding any
/// live `${...}` interpolation) — i.e. everywhere a keyword anchor match
/// would be spurious. Computed over the *original* content so indices line
/// up with `clean`'s output, which preserves length 1:1.
fn inert_mask(content: &str) -> Vec<bool> {
    let chars: Vec<char> = content.chars().collect();
    let mut inert = vec![false; chars.len()];
    let mut state = State::Code;
    let mut template_depth_stack: Vec<i32> = Vec::new();

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            State::Code => {
                if c == '/' && next == Some('/') {
                    state = State::LineComment;
                    inert[i] = true;
                    i += 1;
                    continue;
                } else if c == '/' && next == Some('*') {
                    state = State::BlockComment;
                    inert[i] = true;
                    inert[i + 1] = true;
                    i += 2;
                    continue;
                } else if c == '\'' {
                    state = State::SingleQuote;
                    inert[i] = true;
                } else if c == '"' {
                    state = State::DoubleQuote;
                    inert[i] = true;
                } else if c == '`' {
                    state = State::Template;
                    inert[i] = true;
                }
                i += 1;
            }
            State::LineComment => {
                inert[i] = true;
                if c == '\n' {
                    state = State::Code;
                }
                i += 1;
            }
            State::BlockComment => {
                inert[i] = true;
                if c == '*' && next == Some('/') {
                    inert[i + 1] = true;
                    state = State::Code;
                    i += 2;
                    continue;
                }
                i += 1;
            }
            State::SingleQuote => {
                inert[i] = true;
                if c == '\\' && next.is_some() {
                    inert[i + 1] = true;
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    state = State::Code;
                }
                i += 1;
            }
            State::DoubleQuote => {
                inert[i] = true;
                if c == '\\' && next.is_some() {
                    inert[i + 1] = true;
                    i += 2;
                    continue;
                }
                if c == '"' {
                    state = State::Code;
                }
                i += 1;
            }
            State::Template => {
                inert[i] = true;
                if c == '\\' && next.is_some() {
                    inert[i + 1] = true;
                    i += 2;
                    continue;
                }
                if c == '`' {
                    state = State::Code;
                    i += 1;
                    continue;
                }
                if c == '$' && next == Some('{') {
                    template_depth_stack.push(1);
                    state = State::TemplateExpr;
                    i += 2;
                    continue;
                }
                i += 1;
            }
            State::TemplateExpr => {
                // Live code inside `${...}` — never inert, e.g. a nested
                // `import(...)` call inside an interpolation stays scannable.
                if c == '{' {
                    if let Some(top) = template_depth_stack.last_mut() {
                        *top += 1;
                    }
                } else if c == '}' {
                    if let Some(top) = template_depth_stack.last_mut() {
                        *top -= 1;
                        if *top == 0 {
                            template_depth_stack.pop();
                            state = State::Template;
                        }
                    }
                }
                i += 1;
            }
        }
    }

    inert
}

fn char_index_of_byte(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx].chars().count()
}

/// `chars[after]` is the first character following the `import` keyword.
/// Dispatches to side-effect import, dynamic import, or named/default
/// import (which requires a `from` clause further on), per spec §4.D's
/// precedence table.
fn parse_import_occurrence(chars: &[char], after: usize) -> Option<Reference> {
    let pos = skip_whitespace(chars, after);
    if pos >= chars.len() {
        return None;
    }

    if chars[pos] == '(' {
        return parse_dynamic_import(chars, pos);
    }

    if is_quote(chars[pos]) && chars[pos] != '`' {
        let (module, _raw, end) = extract_quoted(chars, pos)?;
        return build_reference(chars, after, end, module, ReferenceKind::SideEffectImport);
    }

    // Named/default/namespace import: scan forward for `from`, bounded by
    // the statement terminator so an unrelated later `from` in the file
    // can't be picked up.
    let stop = find_statement_end(chars, pos);
    let window: String = chars[pos..stop].iter().collect();
    let from_match = FROM_KEYWORD.find(&window)?;
    let from_end_in_window = from_match.end();
    let from_end_chars = pos + window[..from_end_in_window].chars().count();

    let module_pos = skip_whitespace(chars, from_end_chars);
    if module_pos >= chars.len() || !is_quote(chars[module_pos]) {
        return None;
    }
    if chars[module_pos] == '`' {
        return None; // template literal target; never statically resolvable here
    }
    let (module, _raw, end) = extract_quoted(chars, module_pos)?;
    build_reference(chars, after, end, module, ReferenceKind::Import)
}

fn parse_dynamic_import(chars: &[char], open_paren: usize) -> Option<Reference> {
    let arg_start = skip_whitespace(chars, open_paren + 1);
    if arg_start >= chars.len() || !is_quote(chars[arg_start]) {
        return None;
    }
    let (module, _raw, content_end) = extract_quoted(chars, arg_start)?;
    if module.contains("${") {
        return None; // interpolated template literal, not statically resolvable
    }
    let close = skip_whitespace(chars, content_end);
    if close >= chars.len() || chars[close] != ')' {
        return None;
    }
    build_reference(chars, open_paren, content_end, module, ReferenceKind::DynamicImport)
}

fn parse_require_occurrence(chars: &[char], after: usize) -> Option<Reference> {
    let open = skip_whitespace(chars, after);
    if open >= chars.len() || chars[open] != '(' {
        return None;
    }
    let arg_start = skip_whitespace(chars, open + 1);
    if arg_start >= chars.len() || !is_quote(chars[arg_start]) || chars[arg_start] == '`' {
        return None;
    }
    let (module, _raw, content_end) = extract_quoted(chars, arg_start)?;
    let close = skip_whitespace(chars, content_end);
    if close >= chars.len() || chars[close] != ')' {
        return None;
    }
    build_reference(chars, after, content_end, module, ReferenceKind::Require)
}

fn build_reference(
    chars: &[char],
    match_start: usize,
    match_end: usize,
    module: String,
    kind: ReferenceKind,
) -> Option<Reference> {
    if module.contains('\n') || module.contains('\r') {
        return None;
    }
    let sanitized = validator::sanitize_import(&module).ok()?;
    let (line, column) = line_col(chars, match_start);
    let raw_text: String = chars[match_start..match_end].iter().collect();
    Some(Reference {
        module: sanitized,
        kind,
        line,
        column,
        raw_text,
        source_file: String::new(),
    })
}

fn find_statement_end(chars: &[char], from: usize) -> usize {
    let mut i = from;
    let mut depth = 0i32;
    while i < chars.len() {
        match chars[i] {
            ';' if depth == 0 => return i,
            '\n' if depth == 0 => return i,
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

fn skip_whitespace(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"' || c == '`'
}

/// `chars[start]` must be an opening quote. Returns (unescaped content,
/// raw matched text including quotes, index just past the closing quote).
fn extract_quoted(chars: &[char], start: usize) -> Option<(String, String, usize)> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut content = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                content.push(chars[i]);
                content.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => {
                let raw: String = chars[start..=i].iter().collect();
                return Some((unescape(&content), raw, i + 1));
            }
            c => {
                content.push(c);
                i += 1;
            }
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn line_col(chars: &[char], idx: usize) -> (usize, usize) {
    let mut line = 1usize;
    let mut last_newline = None;
    for (i, &c) in chars.iter().enumerate().take(idx) {
        if c == '\n' {
            line += 1;
            last_newline = Some(i);
        }
    }
    let column = match last_newline {
        Some(nl) => idx - nl,
        None => idx + 1,
    };
    (line, column)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
    Template,
    TemplateExpr,
}

/// Blanks comments and interpolated template literals while preserving
/// string length and every literal `\n`, so byte offsets in the cleaned
/// text still correspond to lines/columns in the original. Ordinary
/// single/double-quoted strings and non-interpolated template bodies are
/// left untouched here, since a real import's own target string must
/// survive intact for [`extract_quoted`] to read back — false keyword
/// matches hiding inside *other* strings are filtered separately via
/// [`inert_mask`].
fn clean(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out: Vec<char> = chars.clone();
    let mut state = State::Code;
    let mut template_depth_stack: Vec<i32> = Vec::new();
    let mut current_template_start: Option<usize> = None;
    let mut current_template_has_interp = false;

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            State::Code => {
                if c == '/' && next == Some('/') {
                    state = State::LineComment;
                    out[i] = ' ';
                    i += 1;
                    continue;
                } else if c == '/' && next == Some('*') {
                    state = State::BlockComment;
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    i += 2;
                    continue;
                } else if c == '\'' {
                    state = State::SingleQuote;
                } else if c == '"' {
                    state = State::DoubleQuote;
                } else if c == '`' {
                    state = State::Template;
                    current_template_start = Some(i);
                    current_template_has_interp = false;
                }
                i += 1;
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                } else {
                    out[i] = ' ';
                }
                i += 1;
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    state = State::Code;
                    i += 2;
                    continue;
                }
                if c != '\n' {
                    out[i] = ' ';
                }
                i += 1;
            }
            State::SingleQuote => {
                if c == '\\' && next.is_some() {
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    state = State::Code;
                }
                i += 1;
            }
            State::DoubleQuote => {
                if c == '\\' && next.is_some() {
                    i += 2;
                    continue;
                }
                if c == '"' {
                    state = State::Code;
                }
                i += 1;
            }
            State::Template => {
                if c == '\\' && next.is_some() {
                    i += 2;
                    continue;
                }
                if c == '`' {
                    if current_template_has_interp {
                        if let Some(start) = current_template_start {
                            blank_span(&mut out, &chars, start, i + 1);
                        }
                    }
                    current_template_start = None;
                    state = State::Code;
                    i += 1;
                    continue;
                }
                if c == '$' && next == Some('{') {
                    current_template_has_interp = true;
                    template_depth_stack.push(1);
                    state = State::TemplateExpr;
                    i += 2;
                    continue;
                }
                i += 1;
            }
            State::TemplateExpr => {
                if c == '{' {
                    if let Some(top) = template_depth_stack.last_mut() {
                        *top += 1;
                    }
                } else if c == '}' {
                    if let Some(top) = template_depth_stack.last_mut() {
                        *top -= 1;
                        if *top == 0 {
                            template_depth_stack.pop();
                            state = State::Template;
                        }
                    }
                }
                i += 1;
            }
        }
    }

    out.into_iter().collect()
}

fn blank_span(out: &mut [char], original: &[char], start: usize, end: usize) {
    for idx in start..end.min(original.len()) {
        if original[idx] != '\n' {
            out[idx] = ' ';
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extracts_named_import() {
        let refs = extract("import { h } from './utils/helper';\nimport 'lodash';");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.module == "./utils/helper" && r.kind == ReferenceKind::Import));
        assert!(refs.iter().any(|r| r.module == "lodash" && r.kind == ReferenceKind::SideEffectImport));
    }

    #[test]
    fn extracts_require_and_dynamic_import() {
        let refs = extract("const x = require('./a');\nconst y = import('./b');");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.kind == ReferenceKind::Require && r.module == "./a"));
        assert!(refs.iter().any(|r| r.kind == ReferenceKind::DynamicImport && r.module == "./b"));
    }

    #[test]
    fn ignores_imports_inside_comments_and_strings() {
        let refs = extract(
            "// import './ghost' from nowhere\nconst s = \"import './also-ghost'\";\nimport './real';",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].module, "./real");
    }

    #[test]
    fn skips_interpolated_template_literal_dynamic_import() {
        let refs = extract("const mod = `${base}/thing`;\nimport(`${base}/thing`);");
        assert!(refs.is_empty());
    }

    #[test]
    fn deduplicates_same_module_and_kind() {
        let refs = extract("import './a';\nimport './a';");
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn line_numbers_account_for_block_comments() {
        let refs = extract("/* header\nspanning two lines */\nimport './a';");
        assert_eq!(refs[0].line, 3);
    }
}
