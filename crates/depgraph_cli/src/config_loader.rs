//! Resolves the config-file half of the merge chain from spec §6: the first
//! of `.depgraphrc`, `.depgraphrc.json`, `.depgraphrc.js`,
//! `depgraph.config.js`, or the `depgraph` key of `package.json` found in the
//! current directory (or an explicit `--config` path).
//!
//! We don't embed a JS engine (that's explicitly out of scope, see
//! DESIGN.md), so `.js`-suffixed config files are accepted only when they're
//! a single object literal assigned via `module.exports =` or
//! `export default` — the object body itself is parsed as JSON.

use std::path::Path;

use depgraph_core::config::ConfigJson;

const RC_CANDIDATES: &[&str] =
    &[".depgraphrc", ".depgraphrc.json", ".depgraphrc.js", "depgraph.config.js"];

pub fn load(explicit_path: Option<&str>) -> anyhow::Result<Option<ConfigJson>> {
    if let Some(path) = explicit_path {
        return parse_rc_file(Path::new(path)).map(Some);
    }

    for candidate in RC_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_file() {
            return parse_rc_file(path).map(Some);
        }
    }

    if let Some(config) = load_from_package_json(Path::new("package.json"))? {
        return Ok(Some(config));
    }

    Ok(None)
}

fn parse_rc_file(path: &Path) -> anyhow::Result<ConfigJson> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
    let json_text = strip_js_wrapper(&raw);
    serde_json::from_str(json_text)
        .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))
}

fn load_from_package_json(path: &Path) -> anyhow::Result<Option<ConfigJson>> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    match value.get("depgraph") {
        Some(section) => Ok(Some(serde_json::from_value(section.clone())?)),
        None => Ok(None),
    }
}

/// Strips a leading `module.exports =` / `export default` and trailing `;`
/// from a `.js` config file so the remaining object literal can be parsed as
/// JSON. `.json`/extension-less files pass through unchanged.
fn strip_js_wrapper(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("module.exports")
        .or_else(|| trimmed.strip_prefix("export default"))
        .map(|rest| rest.trim_start().trim_start_matches('='))
        .map(str::trim_start)
        .unwrap_or(trimmed);
    without_prefix.trim_end().trim_end_matches(';').trim()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_module_exports_wrapper() {
        let raw = "module.exports = {\"includeExternal\": true};";
        assert_eq!(strip_js_wrapper(raw), "{\"includeExternal\": true}");
    }

    #[test]
    fn strips_export_default_wrapper() {
        let raw = "export default {\"includeExternal\": true}";
        assert_eq!(strip_js_wrapper(raw), "{\"includeExternal\": true}");
    }

    #[test]
    fn passes_plain_json_through() {
        let raw = "{\"includeExternal\": true}";
        assert_eq!(strip_js_wrapper(raw), "{\"includeExternal\": true}");
    }
}
