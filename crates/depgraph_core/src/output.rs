//! Output schema (spec §6): the camelCase wire object the CLI writes to its
//! output file and the HTTP front-end returns from `POST /analyze`. Kept
//! separate from the snake_case internal model (`graph`, `model`) so callers
//! serializing for a browser-side viewer (`network-data.json`, vis.js-shaped)
//! aren't coupled to internal field names.

use serde::Serialize;

use crate::config::Config;
use crate::error::ErrorRecord;
use crate::graph::{Graph, GraphMetrics, Node, NodeClassification};
use crate::model::{AnalysisMetadata, ReferenceKind, ScanStats};

#[derive(Debug, Serialize)]
pub struct WireOutput {
    pub nodes: Vec<WireNode>,
    pub edges: Vec<WireEdge>,
    pub metadata: WireMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub id: usize,
    pub label: String,
    pub path: String,
    pub full_path: Option<String>,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub extension: String,
    pub size: u64,
    pub dependencies: usize,
    pub parser: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_external: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEdge {
    pub from: usize,
    pub to: usize,
    pub label: String,
    #[serde(rename = "type")]
    pub edge_type: &'static str,
    pub import_type: ReferenceKind,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashes: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConfigSummary {
    pub include_external: bool,
    pub max_file_size: u64,
    pub exclude_patterns: Vec<String>,
    pub include_extensions: Vec<String>,
    pub concurrency: usize,
    pub cache_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCacheSummary {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    pub repository_path: String,
    pub circular_dependencies: Vec<Vec<usize>>,
    pub metrics: GraphMetrics,
    pub analysis_time: u128,
    pub timestamp: u128,
    pub version: String,
    pub config: WireConfigSummary,
    pub stats: ScanStats,
    pub errors: Vec<ErrorRecord>,
    pub cache: WireCacheSummary,
    pub parsers: Vec<String>,
}

/// Assembles the wire object from the internal [`Graph`] and
/// [`AnalysisMetadata`] the orchestrator returns, plus the [`Config`] used to
/// produce them (echoed back for reproducibility, spec §6 `metadata.config`).
pub fn to_wire(graph: &Graph, metadata: &AnalysisMetadata, config: &Config) -> WireOutput {
    let classifications: Vec<NodeClassification> = graph.nodes.iter().map(|n| n.classification).collect();

    let nodes = graph.nodes.iter().map(wire_node).collect();
    let edges = graph
        .edges
        .iter()
        .map(|e| wire_edge(e, classifications.get(e.to).copied()))
        .collect();

    WireOutput {
        nodes,
        edges,
        metadata: WireMetadata {
            repository_path: metadata.repository_path.clone(),
            circular_dependencies: graph.cycles.clone(),
            metrics: graph.metrics.clone(),
            analysis_time: metadata.analysis_time_ms,
            timestamp: metadata.timestamp_ms,
            version: metadata.version.clone(),
            config: WireConfigSummary {
                include_external: config.include_external,
                max_file_size: config.max_file_size,
                exclude_patterns: config.exclude_patterns.clone(),
                include_extensions: config.include_extensions.clone(),
                concurrency: config.concurrency,
                cache_enabled: config.cache_enabled,
            },
            stats: metadata.scan_stats.clone(),
            errors: metadata.errors.clone(),
            cache: WireCacheSummary {
                hits: metadata.cache_hits,
                misses: metadata.cache_misses,
                hit_rate: metadata.cache_hit_rate,
            },
            parsers: metadata.parsers.clone(),
        },
    }
}

fn wire_node(node: &Node) -> WireNode {
    WireNode {
        id: node.id,
        label: node.label.clone(),
        path: node.path.clone(),
        full_path: node.full_path.clone(),
        node_type: node.classification.as_str(),
        extension: node.extension.clone(),
        size: node.size,
        dependencies: node.dependencies,
        parser: node.parser.clone(),
        is_external: node.is_external,
        is_missing: node.is_missing,
        package: node.package.clone(),
    }
}

/// Color/dash hints are informational (spec §6); missing and external
/// targets get a distinguishing color, dynamic imports get a dashed edge.
fn wire_edge(edge: &crate::graph::Edge, target: Option<NodeClassification>) -> WireEdge {
    let color = match target {
        Some(NodeClassification::Missing) => Some("#e74c3c"),
        Some(NodeClassification::External) => Some("#f39c12"),
        _ => None,
    };
    let dashes = matches!(edge.kind, ReferenceKind::DynamicImport).then_some(true);

    WireEdge {
        from: edge.from,
        to: edge.to,
        label: edge.module.clone(),
        edge_type: "dependency",
        import_type: edge.kind,
        line: edge.line,
        column: edge.column,
        color,
        dashes,
    }
}
