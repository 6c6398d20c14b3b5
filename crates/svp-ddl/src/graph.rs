//! Column dependency graph and level assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::ast::DdlNode;

/// Column names referenced by one emitted node, plus the flags the
/// constant-detection rule needs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColReferences {
    pub columns: BTreeSet<String>,
    pub error: Option<String>,
    pub constant: bool,
}

/// Recursive reference extraction over the emitted node.
pub fn column_references(node: &DdlNode) -> ColReferences {
    match node {
        DdlNode::Number { .. } | DdlNode::Text { .. } | DdlNode::Logical { .. } => ColReferences {
            constant: true,
            ..ColReferences::default()
        },
        DdlNode::Cell { column, error, .. } => ColReferences {
            columns: if column.is_empty() {
                BTreeSet::new()
            } else {
                BTreeSet::from([column.clone()])
            },
            error: error.clone(),
            constant: false,
        },
        DdlNode::ReferenceNode { column, error, .. } => ColReferences {
            columns: if column.is_empty() {
                BTreeSet::new()
            } else {
                BTreeSet::from([column.clone()])
            },
            error: error.clone(),
            constant: false,
        },
        DdlNode::CellRange { columns, error, .. } => ColReferences {
            columns: columns.iter().cloned().collect(),
            error: error.clone(),
            constant: false,
        },
        DdlNode::Function { arguments, .. } => {
            let mut merged = ColReferences::default();
            for argument in arguments {
                let refs = column_references(argument);
                merged.columns.extend(refs.columns);
                if merged.error.is_none() {
                    merged.error = refs.error;
                }
            }
            merged
        }
        DdlNode::BinaryExpression { left, right, .. } => {
            let mut merged = column_references(left);
            let refs = column_references(right);
            merged.columns.extend(refs.columns);
            if merged.error.is_none() {
                merged.error = refs.error;
            }
            merged.constant = false;
            merged
        }
        DdlNode::UnaryExpression { operand, .. } => {
            let mut refs = column_references(operand);
            refs.constant = false;
            refs
        }
    }
}

/// A column counts as a constant (level 0, no edges) when its references
/// carry an error, it is a literal, it references nothing, or its single
/// reference points outside the declared column set.
fn is_constant(refs: &ColReferences, declared: &BTreeSet<&str>) -> bool {
    refs.error.is_some()
        || refs.constant
        || refs.columns.is_empty()
        || (refs.columns.len() == 1
            && !declared.contains(refs.columns.iter().next().unwrap().as_str()))
}

/// Build the directed dependency graph: one vertex per declared column, one
/// edge `col → ref` per referenced declared column. References to
/// undeclared columns are dropped.
pub fn dependency_graph(cols: &BTreeMap<String, DdlNode>) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let declared: BTreeSet<&str> = cols.keys().map(String::as_str).collect();

    let mut indices: BTreeMap<&str, NodeIndex> = BTreeMap::new();
    for name in cols.keys() {
        indices.insert(name, graph.add_node(name.clone()));
    }

    for (name, node) in cols {
        let refs = column_references(node);
        if is_constant(&refs, &declared) {
            continue;
        }
        for referenced in &refs.columns {
            if let Some(&target) = indices.get(referenced.as_str()) {
                graph.add_edge(indices[name.as_str()], target, ());
            }
        }
    }

    graph
}

pub fn has_cyclic_dependencies(graph: &DiGraph<String, ()>) -> bool {
    is_cyclic_directed(graph)
}

/// Level of every column: 0 for leaves, otherwise the sum over successors
/// of `1 + level(successor)`.
///
/// This is NOT the longest-path depth: a node with several independent
/// subtrees lands on a higher level than any of them, which keeps emission
/// order total and groups unrelated subtrees apart. Downstream consumers
/// depend on these exact numbers; change them only together with the
/// golden outputs in `builder::tests`.
///
/// Callers must have rejected cyclic graphs first.
pub fn priority_levels(graph: &DiGraph<String, ()>) -> BTreeMap<String, u64> {
    debug_assert!(!is_cyclic_directed(graph));

    fn level(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        memo: &mut HashMap<NodeIndex, u64>,
    ) -> u64 {
        if let Some(&cached) = memo.get(&node) {
            return cached;
        }
        let value = graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|successor| 1 + level(graph, successor, memo))
            .sum();
        memo.insert(node, value);
        value
    }

    let mut memo = HashMap::new();
    graph
        .node_indices()
        .map(|index| (graph[index].clone(), level(graph, index, &mut memo)))
        .collect()
}
