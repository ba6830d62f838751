// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed readers for node-local parameters.
//!
//! A node parameter is an input socket bound to a literal default; the
//! readers here resolve one by name and coerce it to the expected type.
//! Inputs that may instead be wired to a producer node (Target references,
//! the constant nodes) are resolved by their callers before falling back
//! to these literal readers.

use renderpath_graph::{Graph, GraphError, Node, SocketValue};

fn literal<'n>(graph: &Graph, node: &'n Node, name: &str) -> Result<&'n SocketValue, GraphError> {
    let socket = node
        .input_named(name)
        .ok_or_else(|| GraphError::DanglingSocket {
            node: node.name.clone(),
            socket: name.to_string(),
        })?;
    if graph.producer_of(socket.id).is_some() {
        return Err(GraphError::InvalidParameter {
            node: node.name.clone(),
            socket: name.to_string(),
            reason: "expected a literal value, not a connection".to_string(),
        });
    }
    socket
        .default_value
        .as_ref()
        .ok_or_else(|| GraphError::DanglingSocket {
            node: node.name.clone(),
            socket: name.to_string(),
        })
}

fn coerce<T>(
    node: &Node,
    name: &str,
    value: Option<T>,
    expected: &str,
) -> Result<T, GraphError> {
    value.ok_or_else(|| GraphError::InvalidParameter {
        node: node.name.clone(),
        socket: name.to_string(),
        reason: format!("expected a {expected} value"),
    })
}

pub(crate) fn string_param(graph: &Graph, node: &Node, name: &str) -> Result<String, GraphError> {
    let value = literal(graph, node, name)?;
    coerce(node, name, value.as_str().map(str::to_owned), "string")
}

pub(crate) fn int_param(graph: &Graph, node: &Node, name: &str) -> Result<i32, GraphError> {
    let value = literal(graph, node, name)?;
    coerce(node, name, value.as_int(), "integer")
}

pub(crate) fn float_param(graph: &Graph, node: &Node, name: &str) -> Result<f32, GraphError> {
    let value = literal(graph, node, name)?;
    coerce(node, name, value.as_float(), "float")
}

pub(crate) fn bool_param(graph: &Graph, node: &Node, name: &str) -> Result<bool, GraphError> {
    let value = literal(graph, node, name)?;
    coerce(node, name, value.as_bool(), "boolean")
}

pub(crate) fn color_param(graph: &Graph, node: &Node, name: &str) -> Result<[f32; 4], GraphError> {
    let value = literal(graph, node, name)?;
    coerce(node, name, value.as_color(), "color")
}

/// Resolve the producer node wired into a named input, if any.
pub(crate) fn input_producer<'g>(
    graph: &'g Graph,
    node: &Node,
    name: &str,
) -> Option<&'g Node> {
    graph.input_producer(node.id, name)
}

/// Resolve the producer node wired into a named input, failing with the
/// node and socket identity when the input is unconnected.
pub(crate) fn require_input_producer<'g>(
    graph: &'g Graph,
    node: &Node,
    name: &str,
) -> Result<&'g Node, GraphError> {
    input_producer(graph, node, name).ok_or_else(|| GraphError::DanglingSocket {
        node: node.name.clone(),
        socket: name.to_string(),
    })
}
