// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.

use crate::connection::{Connection, ConnectionId};
use crate::node::{Node, NodeId, NodeKind};
use crate::socket::{SocketDirection, SocketId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A render path node graph.
///
/// Nodes and connections are kept in insertion order; every query that
/// feeds the compiler iterates in that order, which makes compilation of
/// an unchanged graph deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between sockets
    connections: IndexMap<ConnectionId, Connection>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Add a node of the given kind and return its ID
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        self.add_node(Node::of_kind(kind))
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.connections.retain(|_, c| !c.involves_node(node_id));
        self.nodes.swap_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all nodes of a kind, in insertion order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a connection between sockets
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_socket: SocketId,
        to_node: NodeId,
        to_socket: SocketId,
    ) -> Result<ConnectionId, ConnectError> {
        let source_node = self
            .nodes
            .get(&from_node)
            .ok_or(ConnectError::NodeNotFound(from_node))?;
        let target_node = self
            .nodes
            .get(&to_node)
            .ok_or(ConnectError::NodeNotFound(to_node))?;

        let source = source_node
            .socket(&from_socket)
            .ok_or(ConnectError::SocketNotFound(from_socket))?;
        let target = target_node
            .socket(&to_socket)
            .ok_or(ConnectError::SocketNotFound(to_socket))?;

        if source.direction != SocketDirection::Output
            || target.direction != SocketDirection::Input
        {
            return Err(ConnectError::WrongDirection);
        }

        if !source.can_connect(target) {
            return Err(ConnectError::IncompatibleSockets);
        }

        // Inputs accept a single producer
        if self.connections.values().any(|c| c.to_socket == to_socket) {
            return Err(ConnectError::SocketAlreadyConnected(to_socket));
        }

        if from_node == to_node {
            return Err(ConnectError::SelfLoop);
        }

        let connection = Connection::new(from_node, from_socket, to_node, to_socket);
        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Add a connection between named sockets.
    ///
    /// Convenience for authoring hosts and tests; resolves the producing
    /// output and consuming input by name on the given nodes.
    pub fn connect_named(
        &mut self,
        from_node: NodeId,
        from_socket: &str,
        to_node: NodeId,
        to_socket: &str,
    ) -> Result<ConnectionId, ConnectError> {
        let from = self
            .nodes
            .get(&from_node)
            .ok_or(ConnectError::NodeNotFound(from_node))?
            .output_named(from_socket)
            .ok_or_else(|| ConnectError::SocketNameNotFound(from_socket.to_string()))?
            .id;
        let to = self
            .nodes
            .get(&to_node)
            .ok_or(ConnectError::NodeNotFound(to_node))?
            .input_named(to_socket)
            .ok_or_else(|| ConnectError::SocketNameNotFound(to_socket.to_string()))?
            .id;
        self.connect(from_node, from, to_node, to)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.swap_remove(&connection_id)
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections in insertion order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the connection producing into an input socket, if any
    pub fn producer_of(&self, input: SocketId) -> Option<&Connection> {
        self.connections.values().find(|c| c.to_socket == input)
    }

    /// Get the connections consuming an output socket, in insertion order.
    ///
    /// Insertion order is the tie-break for sibling stage chains with no
    /// declared priority.
    pub fn consumers_of(&self, output: SocketId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.from_socket == output)
    }

    /// Get the node producing into a named input of `node_id`, if the
    /// input is connected.
    pub fn input_producer(&self, node_id: NodeId, input: &str) -> Option<&Node> {
        let socket = self.node(node_id)?.input_named(input)?;
        let connection = self.producer_of(socket.id)?;
        self.node(connection.from_node)
    }

    #[cfg(test)]
    pub(crate) fn insert_connection_raw(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when creating a connection
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Node not found
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Socket not found
    #[error("socket not found: {0:?}")]
    SocketNotFound(SocketId),

    /// Socket name not found
    #[error("no socket named '{0}'")]
    SocketNameNotFound(String),

    /// Connection must run output-to-input
    #[error("connections run from an output to an input")]
    WrongDirection,

    /// Socket types do not agree
    #[error("incompatible socket types")]
    IncompatibleSockets,

    /// Input already has a producer
    #[error("input already connected: {0:?}")]
    SocketAlreadyConnected(SocketId),

    /// Self-loop not allowed
    #[error("self-loop not allowed")]
    SelfLoop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stage_chain() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let draw = graph.add(NodeKind::DrawMeshes);

        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();
        assert_eq!(graph.connection_count(), 1);

        let stage_in = graph.node(draw).unwrap().input_named("Stage").unwrap().id;
        let producer = graph.producer_of(stage_in).unwrap();
        assert_eq!(producer.from_node, begin);
    }

    #[test]
    fn test_connect_rejects_type_mismatch() {
        let mut graph = Graph::new("path");
        let target = graph.add(NodeKind::Target);
        let draw = graph.add(NodeKind::DrawMeshes);

        // Target output into a Stage input
        let err = graph
            .connect_named(target, "Target", draw, "Stage")
            .unwrap_err();
        assert!(matches!(err, ConnectError::IncompatibleSockets));
    }

    #[test]
    fn test_input_accepts_single_producer() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let world = graph.add(NodeKind::DrawWorld);
        let draw = graph.add(NodeKind::DrawMeshes);

        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();
        let err = graph
            .connect_named(world, "Stage", draw, "Stage")
            .unwrap_err();
        assert!(matches!(err, ConnectError::SocketAlreadyConnected(_)));
    }

    #[test]
    fn test_connect_rejects_self_loop() {
        let mut graph = Graph::new("path");
        let merge = graph.add(NodeKind::MergeStages);
        let err = graph
            .connect_named(merge, "Stage", merge, "Stage 1")
            .unwrap_err();
        assert!(matches!(err, ConnectError::SelfLoop));
    }

    #[test]
    fn test_consumers_keep_insertion_order() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let a = graph.add(NodeKind::DrawWorld);
        let b = graph.add(NodeKind::DrawWorld);

        graph.connect_named(begin, "Stage", a, "Stage").unwrap();
        graph.connect_named(begin, "Stage", b, "Stage").unwrap();

        let out = graph.node(begin).unwrap().output_named("Stage").unwrap().id;
        let order: Vec<NodeId> = graph.consumers_of(out).map(|c| c.to_node).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_remove_node_drops_connections() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let draw = graph.add(NodeKind::DrawMeshes);
        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();

        graph.remove_node(draw);
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut graph = Graph::new("deferred");
        let begin = graph.add(NodeKind::Begin);
        let draw = graph.add(NodeKind::DrawMeshes);
        graph.connect_named(begin, "Stage", draw, "Stage").unwrap();

        let ron_str =
            ron::ser::to_string_pretty(&graph, ron::ser::PrettyConfig::default()).unwrap();
        let loaded: Graph = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded.name, "deferred");
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.connection_count(), 1);
    }
}
