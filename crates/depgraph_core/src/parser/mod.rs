//! Parser Registry (spec §4.C): extension → language parser dispatch.

pub mod javascript;
pub mod python;

use crate::model::{FileDescriptor, ParseResult, Reference};

/// Capability a language parser must satisfy to be registered (spec §9
/// "dynamic extension via plugin-provided parsers").
pub trait LanguageParser: Send + Sync {
    fn name(&self) -> &str;
    fn extensions(&self) -> &[&str];
    fn parse(&self, content: &str) -> Vec<Reference>;
}

pub struct JsonParser;

impl LanguageParser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }
    fn extensions(&self) -> &[&str] {
        &[".json"]
    }
    fn parse(&self, _content: &str) -> Vec<Reference> {
        Vec::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no parser registered for extension {0:?}")]
    NoParser(String),
    #[error("parser {name:?} declares no extensions")]
    EmptyExtensionList { name: String },
}

/// Maps a file extension to the parser responsible for it. Built-ins are
/// registered in [`Registry::with_builtins`]; callers may register
/// additional parsers before the first `parse` call.
pub struct Registry {
    by_extension: std::collections::HashMap<String, std::sync::Arc<dyn LanguageParser>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            by_extension: std::collections::HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(std::sync::Arc::new(javascript::JavaScriptParser))
            .expect("built-in javascript parser is well-formed");
        registry
            .register(std::sync::Arc::new(python::PythonParser))
            .expect("built-in python parser is well-formed");
        registry
            .register(std::sync::Arc::new(JsonParser))
            .expect("built-in json parser is well-formed");
        registry
    }

    pub fn register(
        &mut self,
        parser: std::sync::Arc<dyn LanguageParser>,
    ) -> Result<(), RegistryError> {
        if parser.extensions().is_empty() {
            return Err(RegistryError::EmptyExtensionList {
                name: parser.name().to_string(),
            });
        }
        for ext in parser.extensions() {
            self.by_extension.insert(ext.to_string(), parser.clone());
        }
        Ok(())
    }

    pub fn parser_for(&self, extension: &str) -> Option<&std::sync::Arc<dyn LanguageParser>> {
        self.by_extension.get(extension)
    }

    pub fn parse(
        &self,
        descriptor: &FileDescriptor,
        content: &str,
    ) -> Result<(Vec<Reference>, String), RegistryError> {
        let parser = self
            .parser_for(&descriptor.extension)
            .ok_or_else(|| RegistryError::NoParser(descriptor.extension.clone()))?;
        Ok((parser.parse(content), parser.name().to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Deduplicates references within a single file on (module, kind), per spec
/// §4.D's shared parser obligations. First occurrence wins.
pub fn dedup_references(refs: Vec<Reference>) -> Vec<Reference> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        let key = (r.module.clone(), r.kind);
        if seen.insert(key) {
            out.push(r);
        }
    }
    out
}

/// Builds the `ParseResult` wrapper the Orchestrator streams to the Graph
/// Builder, given a descriptor and the resolved references already computed
/// by [`crate::resolver`].
pub fn to_parse_result(
    descriptor: FileDescriptor,
    resolved: Vec<crate::model::ResolvedReference>,
    parser_name: String,
    error: Option<String>,
) -> ParseResult {
    let mut counts_by_classification = ahashmap::AHashMap::default();
    for r in &resolved {
        *counts_by_classification.entry(r.classification).or_insert(0) += 1;
    }
    ParseResult {
        descriptor,
        resolved,
        parser_name,
        counts_by_classification,
        error,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dispatches_by_extension() {
        let registry = Registry::with_builtins();
        assert!(registry.parser_for(".ts").is_some());
        assert!(registry.parser_for(".py").is_some());
        assert!(registry.parser_for(".json").is_some());
        assert!(registry.parser_for(".rs").is_none());
    }

    #[test]
    fn rejects_parser_with_no_extensions() {
        struct Empty;
        impl LanguageParser for Empty {
            fn name(&self) -> &str {
                "empty"
            }
            fn extensions(&self) -> &[&str] {
                &[]
            }
            fn parse(&self, _content: &str) -> Vec<Reference> {
                Vec::new()
            }
        }
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(std::sync::Arc::new(Empty)),
            Err(RegistryError::EmptyExtensionList { .. })
        ));
    }
}
