// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared helpers for compiler tests.

use renderpath_graph::{Graph, NodeId, NodeKind, SocketValue, ValidGraph};

pub(crate) fn valid(graph: &Graph) -> ValidGraph<'_> {
    renderpath_graph::validate(graph).unwrap()
}

/// A parameterless pass node usable anywhere on a stage chain.
pub(crate) fn pass(graph: &mut Graph) -> NodeId {
    graph.add(NodeKind::DrawWorld)
}

pub(crate) fn wire(graph: &mut Graph, from: NodeId, output: &str, to: NodeId, input: &str) {
    graph.connect_named(from, output, to, input).unwrap();
}

/// A Target node with its parameters authored.
pub(crate) fn target(
    graph: &mut Graph,
    id: &str,
    width: i32,
    height: i32,
    format: &str,
) -> NodeId {
    let node_id = graph.add(NodeKind::Target);
    let node = graph.node_mut(node_id).unwrap();
    node.set_input_value("ID", SocketValue::String(id.into()));
    node.set_input_value("Width", SocketValue::Int(width));
    node.set_input_value("Height", SocketValue::Int(height));
    node.set_input_value("Format", SocketValue::String(format.into()));
    node_id
}
