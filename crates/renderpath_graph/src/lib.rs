// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render path node graph.
//!
//! This crate provides the graph model consumed by the render path
//! compiler:
//! - Typed input/output sockets (Stage, Target, scalars)
//! - A closed node-kind vocabulary with per-kind socket signatures
//! - Connection validation at edit time
//! - Structural validation at compile time
//! - Serialization support for authoring hosts
//!
//! ## Architecture
//!
//! A [`Graph`] is a set of [`Node`]s joined by [`Connection`]s between
//! sockets. Stage-typed connections carry control flow (the order render
//! passes execute in); Target-typed connections reference render target
//! declarations; the scalar types carry literal parameters. [`validate`]
//! checks the structure once per compile and hands the compiler a
//! [`ValidGraph`] proof.

pub mod connection;
pub mod graph;
pub mod node;
pub mod socket;
pub mod validate;

pub use connection::{Connection, ConnectionId};
pub use graph::{ConnectError, Graph};
pub use node::{Node, NodeCategory, NodeId, NodeKind};
pub use socket::{Socket, SocketDirection, SocketId, SocketType, SocketValue};
pub use validate::{validate, GraphError, ValidGraph};
