// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural validation of render path graphs.
//!
//! Validation runs once per compile, before scheduling. It checks the
//! graph as loaded from the authoring host (which may bypass the per-edit
//! checks in [`Graph::connect`] by deserializing directly) and reports the
//! first error found in a deterministic left-to-right, depth-first scan.

use crate::graph::Graph;
use crate::node::{Node, NodeId, NodeKind};
use crate::socket::{SocketDirection, SocketType};
use std::collections::HashSet;
use std::ops::Deref;

/// Structural error in a render path graph; always fatal to compilation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// No Begin node
    #[error("render path has no Begin node")]
    MissingBegin,

    /// More than one Begin node
    #[error("render path has more than one Begin node")]
    MultipleBegin,

    /// Required input with neither an edge nor a literal default
    #[error("input '{socket}' of node '{node}' is not connected and has no default")]
    DanglingSocket {
        /// Name of the offending node
        node: String,
        /// Name of the unbound input socket
        socket: String,
    },

    /// Edge whose end types do not agree
    #[error("connection type mismatch: {from} -> {to}")]
    TypeMismatch {
        /// Producing end, as `node.socket`
        from: String,
        /// Consuming end, as `node.socket`
        to: String,
    },

    /// Edge referencing a node or socket that does not exist, or running
    /// in the wrong direction
    #[error("broken connection: {reason}")]
    BrokenConnection {
        /// What failed to resolve
        reason: String,
    },

    /// Stage chain that loops back on itself
    #[error("stage cycle through node '{node}'")]
    Cycle {
        /// Node where the cycle closed
        node: String,
    },

    /// Malformed control flow construct
    #[error("invalid control flow at node '{node}': {reason}")]
    InvalidControlFlow {
        /// Name of the offending node
        node: String,
        /// What is malformed
        reason: String,
    },

    /// Parameter value outside the accepted vocabulary
    #[error("invalid parameter '{socket}' on node '{node}': {reason}")]
    InvalidParameter {
        /// Name of the offending node
        node: String,
        /// Name of the parameter socket
        socket: String,
        /// What is wrong with the value
        reason: String,
    },
}

/// A graph that passed [`validate`].
///
/// Borrowing wrapper proving the structural checks ran; the scheduler and
/// allocator only accept this type.
#[derive(Debug, Clone, Copy)]
pub struct ValidGraph<'a> {
    graph: &'a Graph,
    begin: NodeId,
}

impl<'a> ValidGraph<'a> {
    /// The underlying graph
    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// The single Begin node
    pub fn begin(&self) -> NodeId {
        self.begin
    }
}

impl Deref for ValidGraph<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

/// Validate a graph, returning a proof wrapper or the first error found.
pub fn validate(graph: &Graph) -> Result<ValidGraph<'_>, GraphError> {
    let begin = single_begin(graph)?;
    check_connections(graph)?;
    check_stage_acyclic(graph, begin)?;
    check_required_inputs(graph, begin)?;

    tracing::debug!(
        "validated graph '{}': {} nodes, {} connections",
        graph.name,
        graph.node_count(),
        graph.connection_count()
    );
    Ok(ValidGraph { graph, begin })
}

fn single_begin(graph: &Graph) -> Result<NodeId, GraphError> {
    let mut begins = graph.nodes_of_kind(NodeKind::Begin);
    let first = begins.next().ok_or(GraphError::MissingBegin)?;
    if begins.next().is_some() {
        return Err(GraphError::MultipleBegin);
    }
    Ok(first.id)
}

fn check_connections(graph: &Graph) -> Result<(), GraphError> {
    for connection in graph.connections() {
        let from_node = graph.node(connection.from_node).ok_or_else(|| {
            GraphError::BrokenConnection {
                reason: format!("missing producer node {:?}", connection.from_node),
            }
        })?;
        let to_node = graph.node(connection.to_node).ok_or_else(|| {
            GraphError::BrokenConnection {
                reason: format!("missing consumer node {:?}", connection.to_node),
            }
        })?;
        let from = from_node.socket(&connection.from_socket).ok_or_else(|| {
            GraphError::BrokenConnection {
                reason: format!("missing socket on node '{}'", from_node.name),
            }
        })?;
        let to = to_node.socket(&connection.to_socket).ok_or_else(|| {
            GraphError::BrokenConnection {
                reason: format!("missing socket on node '{}'", to_node.name),
            }
        })?;

        if from.direction != SocketDirection::Output || to.direction != SocketDirection::Input {
            return Err(GraphError::BrokenConnection {
                reason: format!(
                    "connection '{}.{}' -> '{}.{}' does not run output-to-input",
                    from_node.name, from.name, to_node.name, to.name
                ),
            });
        }

        if !from.socket_type.can_connect_to(&to.socket_type) {
            return Err(GraphError::TypeMismatch {
                from: format!("{}.{}", from_node.name, from.name),
                to: format!("{}.{}", to_node.name, to.name),
            });
        }
    }
    Ok(())
}

/// Stage successors of a node: consumers of its Stage outputs, outputs in
/// declaration order and consumers in insertion order.
fn stage_successors<'a>(graph: &'a Graph, node: &'a Node) -> Vec<NodeId> {
    let mut out = Vec::new();
    for socket in &node.outputs {
        if socket.socket_type == SocketType::Stage {
            out.extend(graph.consumers_of(socket.id).map(|c| c.to_node));
        }
    }
    out
}

fn check_stage_acyclic(graph: &Graph, begin: NodeId) -> Result<(), GraphError> {
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    visit_stage(graph, begin, &mut visiting, &mut visited)
}

fn visit_stage(
    graph: &Graph,
    node_id: NodeId,
    visiting: &mut HashSet<NodeId>,
    visited: &mut HashSet<NodeId>,
) -> Result<(), GraphError> {
    if visiting.contains(&node_id) {
        let name = graph
            .node(node_id)
            .map_or_else(|| format!("{node_id:?}"), |n| n.name.clone());
        return Err(GraphError::Cycle { node: name });
    }
    if visited.contains(&node_id) {
        return Ok(());
    }

    visiting.insert(node_id);
    if let Some(node) = graph.node(node_id) {
        for successor in stage_successors(graph, node) {
            visit_stage(graph, successor, visiting, visited)?;
        }
    }
    visiting.remove(&node_id);
    visited.insert(node_id);
    Ok(())
}

/// Nodes used by the compile: reachable from Begin along Stage edges, plus
/// the closure of producers feeding any used node's non-Stage inputs.
/// Nodes outside this set are unreachable and exempt from input checks.
fn used_nodes(graph: &Graph, begin: NodeId) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = vec![begin];

    while let Some(node_id) = queue.pop() {
        if !seen.insert(node_id) {
            continue;
        }
        order.push(node_id);

        let Some(node) = graph.node(node_id) else {
            continue;
        };

        // Producers bound to non-Stage inputs, in declaration order
        for input in &node.inputs {
            if input.socket_type == SocketType::Stage {
                continue;
            }
            if let Some(connection) = graph.producer_of(input.id) {
                queue.push(connection.from_node);
            }
        }
        // Downstream stage chain; pushed last so the walk stays depth-first
        for successor in stage_successors(graph, node).into_iter().rev() {
            queue.push(successor);
        }
    }
    order
}

fn check_required_inputs(graph: &Graph, begin: NodeId) -> Result<(), GraphError> {
    for node_id in used_nodes(graph, begin) {
        let Some(node) = graph.node(node_id) else {
            continue;
        };
        for input in &node.inputs {
            if !input.required || input.default_value.is_some() {
                continue;
            }
            if graph.producer_of(input.id).is_none() {
                return Err(GraphError::DanglingSocket {
                    node: node.name.clone(),
                    socket: input.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::node::Node;
    use crate::socket::SocketValue;

    fn minimal_path() -> (Graph, NodeId) {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        (graph, begin)
    }

    #[test]
    fn test_missing_begin() {
        let graph = Graph::new("empty");
        assert_eq!(validate(&graph).unwrap_err(), GraphError::MissingBegin);
    }

    #[test]
    fn test_multiple_begin() {
        let (mut graph, _) = minimal_path();
        graph.add(NodeKind::Begin);
        assert_eq!(validate(&graph).unwrap_err(), GraphError::MultipleBegin);
    }

    #[test]
    fn test_dangling_required_input_names_node_and_socket() {
        let (mut graph, begin) = minimal_path();
        let draw = graph.add_node(Node::of_kind(NodeKind::DrawMeshes).with_name("opaque"));
        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();

        // Context has no default and no edge
        let err = validate(&graph).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingSocket {
                node: "opaque".to_string(),
                socket: "Context".to_string(),
            }
        );
    }

    #[test]
    fn test_unreachable_node_with_dangling_inputs_passes() {
        let (mut graph, _begin) = minimal_path();
        // Not connected to the stage chain at all
        graph.add(NodeKind::DrawMeshes);
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn test_type_mismatch_on_deserialized_edge() {
        let (mut graph, begin) = minimal_path();
        let draw = graph.add(NodeKind::DrawWorld);

        // A hand-built edge the per-edit checks never saw: Stage output
        // into the String ID input of a Target node.
        let target = graph.add(NodeKind::Target);
        let from = graph.node(begin).unwrap().output_named("Stage").unwrap().id;
        let to = graph.node(target).unwrap().input_named("ID").unwrap().id;
        graph.insert_connection_raw(Connection::new(begin, from, target, to));
        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();

        let err = validate(&graph).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn test_stage_cycle() {
        let (mut graph, begin) = minimal_path();
        let a = graph.add(NodeKind::DrawWorld);
        let b = graph.add(NodeKind::MergeStages);

        graph.connect_named(begin, "Stage", b, "Stage 1").unwrap();
        graph.connect_named(b, "Stage", a, "Stage").unwrap();
        graph.connect_named(a, "Stage", b, "Stage 2").unwrap();

        let err = validate(&graph).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn test_target_producer_is_checked() {
        let (mut graph, begin) = minimal_path();
        let set = graph.add(NodeKind::SetTarget);
        // Target node used by the pass but missing its ID parameter
        let target = graph.add(NodeKind::Target);
        graph
            .node_mut(target)
            .map(|n| {
                n.set_input_value("Width", SocketValue::Int(256));
                n.set_input_value("Height", SocketValue::Int(256));
            })
            .unwrap();

        graph.connect_named(begin, "Stage", set, "Stage").unwrap();
        graph.connect_named(target, "Target", set, "Target").unwrap();

        let err = validate(&graph).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingSocket {
                node: "Target".to_string(),
                socket: "ID".to_string(),
            }
        );
    }

    #[test]
    fn test_valid_minimal_path() {
        let (mut graph, begin) = minimal_path();
        let world = graph.add(NodeKind::DrawWorld);
        graph.connect_named(begin, "Stage", world, "Stage").unwrap();

        let valid = validate(&graph).unwrap();
        assert_eq!(valid.begin(), begin);
    }
}
