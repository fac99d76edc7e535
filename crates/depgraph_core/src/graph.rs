//! Graph Builder (spec §4.F): two-phase construction (node assembly, edge
//! emission), cycle detection, and degree metrics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahashmap::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::model::{Classification, FileDescriptor, ParseResult, ReferenceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeClassification {
    SourceJs,
    SourceTs,
    SourcePython,
    Json,
    External,
    Missing,
}

impl NodeClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeClassification::SourceJs => "source-js",
            NodeClassification::SourceTs => "source-ts",
            NodeClassification::SourcePython => "source-python",
            NodeClassification::Json => "json",
            NodeClassification::External => "external",
            NodeClassification::Missing => "missing",
        }
    }

    pub fn from_extension(extension: &str) -> NodeClassification {
        match extension {
            ".js" | ".jsx" | ".mjs" | ".cjs" => NodeClassification::SourceJs,
            ".ts" | ".tsx" => NodeClassification::SourceTs,
            ".py" | ".pyw" => NodeClassification::SourcePython,
            ".json" => NodeClassification::Json,
            _ => NodeClassification::Missing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub label: String,
    pub path: String,
    pub full_path: Option<String>,
    pub classification: NodeClassification,
    pub extension: String,
    pub size: u64,
    pub dependencies: usize,
    pub parser: Option<String>,
    pub is_external: bool,
    pub is_missing: bool,
    pub package: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub module: String,
    pub kind: ReferenceKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_counts_by_classification: BTreeMap<String, usize>,
    pub max_in_degree: usize,
    pub max_in_degree_nodes: Vec<usize>,
    pub max_out_degree: usize,
    pub max_out_degree_nodes: Vec<usize>,
    pub isolated_node_count: usize,
    pub average_in_degree: f64,
    pub average_out_degree: f64,
    pub cycle_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub cycles: Vec<Vec<usize>>,
    pub metrics: GraphMetrics,
}

pub struct BuilderConfig {
    pub include_external: bool,
}

pub struct Builder<'a> {
    repo_root: &'a Path,
    config: BuilderConfig,
    nodes: Vec<Node>,
    path_to_id: AHashMap<PathBuf, usize>,
    external_to_id: AHashMap<String, usize>,
    edges: Vec<Edge>,
    edge_keys: AHashSet<(usize, usize, ReferenceKind, String)>,
}

impl<'a> Builder<'a> {
    pub fn new(repo_root: &'a Path, config: BuilderConfig) -> Self {
        Self {
            repo_root,
            config,
            nodes: Vec::new(),
            path_to_id: AHashMap::default(),
            external_to_id: AHashMap::default(),
            edges: Vec::new(),
            edge_keys: AHashSet::default(),
        }
    }

    /// Phase 1: assigns ids 0..N-1 in scanner discovery order.
    pub fn assemble_nodes(&mut self, descriptors: &[FileDescriptor], parse_results: &[ParseResult]) {
        let deps_by_path: AHashMap<&str, (usize, &str)> = parse_results
            .iter()
            .map(|r| {
                (
                    r.descriptor.relative_path.as_str(),
                    (r.resolved.len(), r.parser_name.as_str()),
                )
            })
            .collect();

        for descriptor in descriptors {
            let id = self.nodes.len();
            let (dependencies, parser) = deps_by_path
                .get(descriptor.relative_path.as_str())
                .map(|(n, p)| (*n, Some(p.to_string())))
                .unwrap_or((0, None));

            self.nodes.push(Node {
                id,
                label: descriptor.basename.clone(),
                path: descriptor.relative_path.clone(),
                full_path: Some(descriptor.absolute_path.display().to_string()),
                classification: NodeClassification::from_extension(&descriptor.extension),
                extension: descriptor.extension.clone(),
                size: descriptor.size,
                dependencies,
                parser,
                is_external: false,
                is_missing: false,
                package: None,
            });
            self.path_to_id.insert(descriptor.absolute_path.clone(), id);
        }
    }

    fn next_id(&self) -> usize {
        self.nodes.len()
    }

    fn synthesize_missing(&mut self, absolute_path: &Path) -> usize {
        if let Some(&id) = self.path_to_id.get(absolute_path) {
            return id;
        }
        let id = self.next_id();
        self.nodes.push(Node {
            id,
            label: absolute_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| absolute_path.display().to_string()),
            path: absolute_path
                .strip_prefix(self.repo_root)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| absolute_path.display().to_string()),
            full_path: Some(absolute_path.display().to_string()),
            classification: NodeClassification::Missing,
            extension: String::new(),
            size: 0,
            dependencies: 0,
            parser: None,
            is_external: false,
            is_missing: true,
            package: None,
        });
        self.path_to_id.insert(absolute_path.to_path_buf(), id);
        id
    }

    fn synthesize_external(&mut self, module: &str, package: Option<String>) -> usize {
        if let Some(&id) = self.external_to_id.get(module) {
            return id;
        }
        let id = self.next_id();
        self.nodes.push(Node {
            id,
            label: module.to_string(),
            path: module.to_string(),
            full_path: None,
            classification: NodeClassification::External,
            extension: String::new(),
            size: 0,
            dependencies: 0,
            parser: None,
            is_external: true,
            is_missing: false,
            package,
        });
        self.external_to_id.insert(module.to_string(), id);
        id
    }

    /// Phase 2: for each resolved reference, emit (or drop) an edge.
    pub fn emit_edges(&mut self, source_id: usize, parse_result: &ParseResult) {
        for resolved in &parse_result.resolved {
            match resolved.classification {
                Classification::Local => {
                    let path = PathBuf::from(&resolved.resolved_key);
                    let target_id = self
                        .path_to_id
                        .get(&path)
                        .copied()
                        .unwrap_or_else(|| self.synthesize_missing(&path));
                    self.push_edge(source_id, target_id, resolved);
                }
                Classification::External => {
                    if self.config.include_external {
                        let target_id =
                            self.synthesize_external(&resolved.reference.module, resolved.package.clone());
                        self.push_edge(source_id, target_id, resolved);
                    }
                }
                Classification::StandardLibrary => {
                    if self.config.include_external {
                        let target_id = self.synthesize_external(
                            &resolved.reference.module,
                            resolved.package.clone().or_else(|| {
                                resolved.reference.module.split('.').next().map(str::to_string)
                            }),
                        );
                        self.push_edge(source_id, target_id, resolved);
                    }
                }
                Classification::Missing | Classification::Unresolved => {
                    let path = resolved
                        .resolved_key
                        .strip_prefix("missing:")
                        .or_else(|| resolved.resolved_key.strip_prefix("unresolved:"))
                        .unwrap_or(&resolved.resolved_key);
                    let target_id = self.synthesize_missing(Path::new(path));
                    self.push_edge(source_id, target_id, resolved);
                }
            }
        }
    }

    fn push_edge(&mut self, from: usize, to: usize, resolved: &crate::model::ResolvedReference) {
        let key = (from, to, resolved.reference.kind, resolved.reference.module.clone());
        if self.edge_keys.insert(key) {
            self.edges.push(Edge {
                from,
                to,
                module: resolved.reference.module.clone(),
                kind: resolved.reference.kind,
                line: resolved.reference.line,
                column: resolved.reference.column,
            });
        }
    }

    pub fn build(mut self) -> Graph {
        self.edges.sort_by(|a, b| {
            (a.from, a.to, a.kind as u8, &a.module).cmp(&(b.from, b.to, b.kind as u8, &b.module))
        });

        let cycles = detect_cycles(self.nodes.len(), &self.edges);
        let metrics = compute_metrics(&self.nodes, &self.edges, cycles.len());

        Graph {
            nodes: self.nodes,
            edges: self.edges,
            cycles,
            metrics,
        }
    }

    pub fn path_to_id(&self) -> &AHashMap<PathBuf, usize> {
        &self.path_to_id
    }
}

fn detect_cycles(node_count: usize, edges: &[Edge]) -> Vec<Vec<usize>> {
    let mut adjacency: AHashMap<usize, Vec<usize>> = AHashMap::default();
    for edge in edges {
        adjacency.entry(edge.from).or_default().push(edge.to);
    }

    let mut visited = vec![false; node_count];
    let mut on_stack = vec![false; node_count];
    let mut stack: Vec<usize> = Vec::new();
    let mut seen_canonical: AHashSet<Vec<usize>> = AHashSet::default();
    let mut cycles = Vec::new();

    for start in 0..node_count {
        if !visited[start] {
            dfs_visit(
                start,
                &adjacency,
                &mut visited,
                &mut on_stack,
                &mut stack,
                &mut seen_canonical,
                &mut cycles,
            );
        }
    }

    cycles
}

#[allow(clippy::too_many_arguments)]
fn dfs_visit(
    node: usize,
    adjacency: &AHashMap<usize, Vec<usize>>,
    visited: &mut [bool],
    on_stack: &mut [bool],
    stack: &mut Vec<usize>,
    seen_canonical: &mut AHashSet<Vec<usize>>,
    cycles: &mut Vec<Vec<usize>>,
) {
    visited[node] = true;
    on_stack[node] = true;
    stack.push(node);

    if let Some(neighbors) = adjacency.get(&node) {
        for &next in neighbors {
            if on_stack[next] {
                if let Some(start_idx) = stack.iter().position(|&n| n == next) {
                    let body = &stack[start_idx..];
                    // A self-loop (`next == node`) yields a body of length 1 —
                    // only one distinct id, which fails the "≥ 2 distinct ids"
                    // cycle invariant. Not a cycle in the graph sense here.
                    if body.len() < 2 {
                        continue;
                    }
                    let mut cycle = body.to_vec();
                    cycle.push(next);
                    let canonical = canonicalize_cycle(&cycle);
                    if seen_canonical.insert(canonical) {
                        cycles.push(cycle);
                    }
                }
            } else if !visited[next] {
                dfs_visit(next, adjacency, visited, on_stack, stack, seen_canonical, cycles);
            }
        }
    }

    stack.pop();
    on_stack[node] = false;
}

/// Rotates the cycle (without its closing repeat) so its smallest id comes
/// first, preserving direction, so the same cycle found from different DFS
/// entry points dedupes to one canonical key.
fn canonicalize_cycle(cycle_with_repeat: &[usize]) -> Vec<usize> {
    let body = &cycle_with_repeat[..cycle_with_repeat.len() - 1];
    let min_idx = body
        .iter()
        .enumerate()
        .min_by_key(|(_, &v)| v)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut out = Vec::with_capacity(body.len());
    out.extend_from_slice(&body[min_idx..]);
    out.extend_from_slice(&body[..min_idx]);
    out
}

fn compute_metrics(nodes: &[Node], edges: &[Edge], cycle_count: usize) -> GraphMetrics {
    let mut in_degree = vec![0usize; nodes.len()];
    let mut out_degree = vec![0usize; nodes.len()];
    for edge in edges {
        out_degree[edge.from] += 1;
        in_degree[edge.to] += 1;
    }

    let mut node_counts_by_classification = BTreeMap::new();
    for node in nodes {
        *node_counts_by_classification
            .entry(node.classification.as_str().to_string())
            .or_insert(0) += 1;
    }

    let max_in_degree = in_degree.iter().copied().max().unwrap_or(0);
    let max_out_degree = out_degree.iter().copied().max().unwrap_or(0);
    let max_in_degree_nodes: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == max_in_degree && max_in_degree > 0).collect();
    let max_out_degree_nodes: Vec<usize> = (0..nodes.len()).filter(|&i| out_degree[i] == max_out_degree && max_out_degree > 0).collect();

    let isolated_node_count = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0 && out_degree[i] == 0)
        .count();

    let average_in_degree = if nodes.is_empty() {
        0.0
    } else {
        in_degree.iter().sum::<usize>() as f64 / nodes.len() as f64
    };
    let average_out_degree = if nodes.is_empty() {
        0.0
    } else {
        out_degree.iter().sum::<usize>() as f64 / nodes.len() as f64
    };

    GraphMetrics {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        node_counts_by_classification,
        max_in_degree,
        max_in_degree_nodes,
        max_out_degree,
        max_out_degree_nodes,
        isolated_node_count,
        average_in_degree,
        average_out_degree,
        cycle_count,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Reference, ReferenceKind, ResolvedReference};

    fn descriptor(relative: &str, root: &Path) -> FileDescriptor {
        FileDescriptor {
            absolute_path: root.join(relative),
            relative_path: relative.to_string(),
            basename: relative.rsplit('/').next().unwrap_or(relative).to_string(),
            extension: format!(".{}", relative.rsplit('.').next().unwrap()),
            size: 10,
            modified_ns: 0,
        }
    }

    #[test]
    fn detects_simple_two_node_cycle() {
        let edges = vec![
            Edge { from: 0, to: 1, module: "./b".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
            Edge { from: 1, to: 0, module: "./a".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
        ];
        let cycles = detect_cycles(2, &edges);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec![0, 1, 0]);
    }

    #[test]
    fn self_loop_is_not_recorded_as_a_cycle() {
        let edges = vec![
            Edge { from: 0, to: 0, module: "./a".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
        ];
        let cycles = detect_cycles(1, &edges);
        assert!(cycles.is_empty());
    }

    #[test]
    fn cycle_found_from_either_entry_point_dedupes() {
        let edges = vec![
            Edge { from: 0, to: 1, module: "a".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
            Edge { from: 1, to: 2, module: "b".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
            Edge { from: 2, to: 0, module: "c".into(), kind: ReferenceKind::Import, line: 1, column: 1 },
        ];
        let cycles = detect_cycles(3, &edges);
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn builds_three_node_chain_with_no_cycle() {
        let root = PathBuf::from("/repo");
        let descriptors = vec![
            descriptor("index.js", &root),
            descriptor("utils/helper.js", &root),
            descriptor("utils/formatter.js", &root),
        ];
        let mut builder = Builder::new(&root, BuilderConfig { include_external: false });
        builder.assemble_nodes(&descriptors, &[]);

        let resolved_to_helper = ResolvedReference {
            reference: Reference {
                module: "./utils/helper".into(),
                kind: ReferenceKind::Import,
                line: 1,
                column: 1,
                raw_text: String::new(),
                source_file: "index.js".into(),
            },
            classification: Classification::Local,
            resolved_key: root.join("utils/helper.js").display().to_string(),
            package: None,
        };
        let pr = ParseResult {
            descriptor: descriptors[0].clone(),
            resolved: vec![resolved_to_helper],
            parser_name: "javascript".into(),
            counts_by_classification: ahashmap::AHashMap::default(),
            error: None,
        };
        builder.emit_edges(0, &pr);
        let graph = builder.build();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.cycles.len(), 0);
    }
}
