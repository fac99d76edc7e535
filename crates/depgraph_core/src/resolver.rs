//! Module Resolver (spec §4.E): classifies each [`Reference`] and computes
//! its `resolved_key`.

use std::path::{Path, PathBuf};

use ahashmap::AHashSet;
use path_clean::PathClean;

use crate::model::{Classification, Reference, ResolvedReference};

const JS_CANDIDATE_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".json"];
const JS_INDEX_FILES: &[&str] = &["index.js", "index.ts", "index.jsx", "index.tsx"];
const REJECTED_SCHEMES: &[&str] = &["data:", "http:", "https:", "file:"];

const PYTHON_STDLIB: &[&str] = &[
    "os", "sys", "json", "datetime", "time", "math", "random", "collections", "itertools",
    "functools", "operator", "re", "string", "io", "pathlib", "urllib", "http", "email", "html",
    "xml", "csv", "configparser", "logging", "unittest", "doctest", "argparse", "subprocess",
    "threading", "multiprocessing", "asyncio", "socket", "ssl", "hashlib", "hmac", "secrets",
    "sqlite3", "pickle", "copyreg", "copy", "pprint", "reprlib", "enum", "numbers", "cmath",
    "decimal", "fractions", "statistics", "array", "weakref", "types", "gc", "inspect", "site",
    "importlib", "pkgutil", "modulefinder", "runpy", "ast", "symtable", "symbol", "token",
    "keyword", "tokenize", "tabnanny", "pyclbr", "py_compile", "compileall", "dis", "pickletools",
    "platform", "errno", "ctypes",
];

/// Everything the Resolver needs about the run to classify references: the
/// repo root and the set of canonical absolute paths the Scanner kept.
pub struct ResolverContext<'a> {
    pub repo_root: &'a Path,
    pub scanned_paths: &'a AHashSet<PathBuf>,
}

pub fn resolve_javascript(
    reference: Reference,
    source_absolute_path: &Path,
    ctx: &ResolverContext,
) -> ResolvedReference {
    let module = reference.module.clone();

    if let Some(stripped) = module.strip_prefix('/') {
        let root = clean_join(ctx.repo_root, stripped);
        return classify_js_candidates(reference, root, ctx);
    }

    if module.starts_with("./") || module.starts_with("../") {
        let base = source_absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.repo_root.to_path_buf());
        let root = clean_join(&base, &module);
        return classify_js_candidates(reference, root, ctx);
    }

    if is_scheme_like(&module) {
        let resolved_key = format!("unresolved:{module}");
        return ResolvedReference {
            reference,
            classification: Classification::Unresolved,
            resolved_key,
            package: None,
        };
    }

    let package = scoped_or_first_segment(&module);
    ResolvedReference {
        reference,
        classification: Classification::External,
        resolved_key: format!("external:{module}"),
        package: Some(package),
    }
}

fn classify_js_candidates(
    reference: Reference,
    root: PathBuf,
    ctx: &ResolverContext,
) -> ResolvedReference {
    for candidate in js_candidates(&root) {
        if ctx.scanned_paths.contains(&candidate) {
            return ResolvedReference {
                reference,
                classification: Classification::Local,
                resolved_key: candidate.display().to_string(),
                package: None,
            };
        }
    }
    ResolvedReference {
        reference,
        classification: Classification::Missing,
        resolved_key: format!("missing:{}", root.display()),
        package: None,
    }
}

fn js_candidates(root: &Path) -> Vec<PathBuf> {
    let mut out = vec![root.to_path_buf()];
    for ext in JS_CANDIDATE_EXTENSIONS {
        out.push(append_ext(root, ext));
    }
    for index_file in JS_INDEX_FILES {
        out.push(root.join(index_file));
    }
    out
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(ext);
    PathBuf::from(s)
}

fn clean_join(base: &Path, rel: &str) -> PathBuf {
    base.join(rel).clean()
}

fn is_scheme_like(module: &str) -> bool {
    if REJECTED_SCHEMES.iter().any(|s| module.starts_with(s)) {
        return true;
    }
    let top_segment = module.split('/').next().unwrap_or(module);
    top_segment.contains(':')
}

fn scoped_or_first_segment(module: &str) -> String {
    let segments: Vec<&str> = module.split('/').collect();
    if module.starts_with('@') && segments.len() >= 2 {
        format!("{}/{}", segments[0], segments[1])
    } else {
        segments.first().copied().unwrap_or(module).to_string()
    }
}

/// Resolves a single relative/absolute/external Python reference. `source_absolute_path`
/// is the file the import appears in.
pub fn resolve_python(
    reference: Reference,
    source_absolute_path: &Path,
    ctx: &ResolverContext,
) -> ResolvedReference {
    let module = reference.module.clone();

    if reference.kind == crate::model::ReferenceKind::RelativeImport {
        return resolve_python_relative(reference, &module, source_absolute_path, ctx);
    }

    resolve_python_absolute(reference, &module, source_absolute_path, ctx)
}

fn resolve_python_relative(
    reference: Reference,
    module: &str,
    source_absolute_path: &Path,
    ctx: &ResolverContext,
) -> ResolvedReference {
    let dot_count = module.chars().take_while(|&c| c == '.').count();
    let tail = &module[dot_count..];
    let levels_up = dot_count.saturating_sub(1);

    let mut dir = source_absolute_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.repo_root.to_path_buf());

    let mut reached_root_early = false;
    for _ in 0..levels_up {
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => {
                reached_root_early = true;
                break;
            }
        }
    }

    if reached_root_early {
        return ResolvedReference {
            reference,
            classification: Classification::Missing,
            resolved_key: format!("missing:{module}"),
            package: None,
        };
    }

    if tail.is_empty() {
        return ResolvedReference {
            reference,
            classification: Classification::Local,
            resolved_key: dir.display().to_string(),
            package: None,
        };
    }

    let relative_file = tail.replace('.', "/") + ".py";
    let candidate = dir.join(&relative_file).clean();

    if ctx.scanned_paths.contains(&candidate) {
        ResolvedReference {
            reference,
            classification: Classification::Local,
            resolved_key: candidate.display().to_string(),
            package: None,
        }
    } else {
        ResolvedReference {
            reference,
            classification: Classification::Missing,
            resolved_key: format!("missing:{}", candidate.display()),
            package: None,
        }
    }
}

fn resolve_python_absolute(
    reference: Reference,
    module: &str,
    source_absolute_path: &Path,
    ctx: &ResolverContext,
) -> ResolvedReference {
    let top_level = module.split('.').next().unwrap_or(module);

    if PYTHON_STDLIB.contains(&top_level) {
        return ResolvedReference {
            reference,
            classification: Classification::StandardLibrary,
            resolved_key: format!("standard:{module}"),
            package: None,
        };
    }

    let project_root = repo_root::find_ancestor_with_markers(
        source_absolute_path.parent().unwrap_or(ctx.repo_root),
        &["setup.py", "pyproject.toml", "requirements.txt", ".git"],
    )
    .unwrap_or_else(|| {
        source_absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.repo_root.to_path_buf())
    });

    let relative_file = module.replace('.', "/") + ".py";
    let candidate = project_root.join(&relative_file).clean();

    if ctx.scanned_paths.contains(&candidate) {
        ResolvedReference {
            reference,
            classification: Classification::Local,
            resolved_key: candidate.display().to_string(),
            package: None,
        }
    } else {
        ResolvedReference {
            reference,
            classification: Classification::External,
            resolved_key: format!("external:{module}"),
            package: Some(top_level.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ReferenceKind;

    fn reference(module: &str, kind: ReferenceKind) -> Reference {
        Reference {
            module: module.to_string(),
            kind,
            line: 1,
            column: 1,
            raw_text: module.to_string(),
            source_file: "index.js".to_string(),
        }
    }

    #[test]
    fn resolves_relative_js_import_to_scanned_file() {
        let root = PathBuf::from("/repo");
        let scanned: AHashSet<PathBuf> = [root.join("utils/helper.js")].into_iter().collect();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_javascript(
            reference("./utils/helper", ReferenceKind::Import),
            &root.join("index.js"),
            &ctx,
        );
        assert_eq!(r.classification, Classification::Local);
        assert_eq!(r.resolved_key, root.join("utils/helper.js").display().to_string());
    }

    #[test]
    fn missing_when_no_candidate_exists() {
        let root = PathBuf::from("/repo");
        let scanned: AHashSet<PathBuf> = AHashSet::default();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_javascript(
            reference("./missing", ReferenceKind::Import),
            &root.join("index.js"),
            &ctx,
        );
        assert_eq!(r.classification, Classification::Missing);
    }

    #[test]
    fn scoped_external_package_name() {
        let root = PathBuf::from("/repo");
        let scanned = AHashSet::default();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_javascript(
            reference("@babel/core", ReferenceKind::SideEffectImport),
            &root.join("index.js"),
            &ctx,
        );
        assert_eq!(r.classification, Classification::External);
        assert_eq!(r.package, Some("@babel/core".to_string()));
    }

    #[test]
    fn rejects_url_schemes_as_unresolved() {
        let root = PathBuf::from("/repo");
        let scanned = AHashSet::default();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_javascript(
            reference("https://example.com/x.js", ReferenceKind::DynamicImport),
            &root.join("index.js"),
            &ctx,
        );
        assert_eq!(r.classification, Classification::Unresolved);
    }

    #[test]
    fn python_stdlib_classified_and_dropped_later_by_graph_builder() {
        let root = PathBuf::from("/repo");
        let scanned = AHashSet::default();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_python(reference("os", ReferenceKind::Import), &root.join("main.py"), &ctx);
        assert_eq!(r.classification, Classification::StandardLibrary);
    }

    #[test]
    fn python_relative_import_resolves_against_scanned_set() {
        let root = PathBuf::from("/repo");
        let scanned: AHashSet<PathBuf> = [root.join("local_mod.py")].into_iter().collect();
        let ctx = ResolverContext {
            repo_root: &root,
            scanned_paths: &scanned,
        };
        let r = resolve_python(
            reference(".local_mod", ReferenceKind::RelativeImport),
            &root.join("main.py"),
            &ctx,
        );
        assert_eq!(r.classification, Classification::Local);
        assert_eq!(r.resolved_key, root.join("local_mod.py").display().to_string());
    }
}
