// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command emission: lowering scheduled steps into backend-agnostic
//! commands.
//!
//! Emitted command order equals step order; this layer performs no
//! reordering. It produces the command list and nothing else; issuing the
//! actual GPU clears, draws and binds is the rendering backend's job.
//! Shader and material context strings pass through as opaque
//! identifiers.

use crate::alloc::{DepthHandle, ResourceTable, TargetHandle};
use crate::error::CompileError;
use crate::params::{bool_param, color_param, float_param, int_param, require_input_producer, string_param};
use crate::schedule::{LoopCount, Step};
use renderpath_graph::{Graph, GraphError, Node, NodeId, NodeKind, ValidGraph};
use serde::{Deserialize, Serialize};

/// Clear color: a literal, or the world background resolved at execution
/// time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClearColor {
    /// Literal RGBA value
    Value([f32; 4]),
    /// The world background color
    Background,
}

/// Reference to a bindable render resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    /// The window framebuffer
    Framebuffer,
    /// A single color target
    Target(TargetHandle),
    /// A geometry buffer: ordered color attachments
    GBuffer(Vec<TargetHandle>),
    /// A depth buffer bound for sampling
    Depth(DepthHandle),
}

/// Mesh draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawOrder {
    /// Near geometry first
    FrontToBack,
    /// Far geometry first
    BackToFront,
}

impl DrawOrder {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "front_to_back" => Some(Self::FrontToBack),
            "back_to_front" => Some(Self::BackToFront),
            _ => None,
        }
    }
}

/// One backend-agnostic command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Clear enabled channels of the current target
    Clear {
        /// Color clear, if enabled
        color: Option<ClearColor>,
        /// Depth clear, if enabled
        depth: Option<f32>,
        /// Stencil clear, if enabled
        stencil: Option<i32>,
    },
    /// Set the active render target
    SetTarget {
        /// Destination resource
        target: TargetRef,
    },
    /// Bind a resource to a named shader constant
    Bind {
        /// Bound resource
        target: TargetRef,
        /// Shader constant name
        constant: String,
    },
    /// Draw meshes of a context
    DrawMeshes {
        /// Mesh context name
        context: String,
        /// Draw order
        order: DrawOrder,
    },
    /// Draw decals of a context
    DrawDecals {
        /// Decal context name
        context: String,
    },
    /// Draw a full-screen quad with a shader context
    DrawQuad {
        /// Shader context name
        shader_context: String,
    },
    /// Draw a full-screen quad with a material context
    DrawMaterialQuad {
        /// Material context name
        material_context: String,
    },
    /// Draw the world skydome
    DrawWorld,
    /// Copy a source target into the current target
    Copy {
        /// Source resource
        source: TargetRef,
    },
    /// Blend a source target onto the current target
    Blend {
        /// Source resource
        source: TargetRef,
    },
    /// Call a host function
    CallFunction {
        /// Host function name
        function: String,
    },
    /// Conditional on a host function result
    Branch {
        /// Host function queried for the condition
        function: String,
        /// Commands when the function returns true
        true_commands: Vec<Command>,
        /// Commands when the function returns false
        false_commands: Vec<Command>,
    },
    /// Repeated body
    Loop {
        /// Repeat count; `Lamps` is resolved by the backend
        count: LoopCount,
        /// Body commands
        body: Vec<Command>,
    },
    /// Per-eye bodies, compiled once per eye
    Stereo {
        /// Left eye commands
        left: Vec<Command>,
        /// Right eye commands
        right: Vec<Command>,
    },
}

/// Lower scheduled steps into the flat command list.
pub fn emit(
    graph: &ValidGraph<'_>,
    steps: &[Step],
    resources: &ResourceTable,
) -> Result<Vec<Command>, CompileError> {
    let emitter = Emitter {
        graph: graph.graph(),
        resources,
    };
    let commands = emitter.lower_steps(steps)?;
    tracing::debug!("emitted {} top-level commands", commands.len());
    Ok(commands)
}

struct Emitter<'g> {
    graph: &'g Graph,
    resources: &'g ResourceTable,
}

impl<'g> Emitter<'g> {
    fn lower_steps(&self, steps: &[Step]) -> Result<Vec<Command>, CompileError> {
        let mut commands = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                Step::Pass(node_id) => self.lower_pass(*node_id, &mut commands)?,
                Step::Branch {
                    function,
                    true_steps,
                    false_steps,
                } => commands.push(Command::Branch {
                    function: function.clone(),
                    true_commands: self.lower_steps(true_steps)?,
                    false_commands: self.lower_steps(false_steps)?,
                }),
                Step::Merge { left, right } => {
                    commands.extend(self.lower_steps(left)?);
                    commands.extend(self.lower_steps(right)?);
                }
                Step::Loop { count, body } => commands.push(Command::Loop {
                    count: *count,
                    body: self.lower_steps(body)?,
                }),
                Step::Stereo { body } => commands.push(Command::Stereo {
                    left: self.lower_steps(body)?,
                    right: self.lower_steps(body)?,
                }),
            }
        }
        Ok(commands)
    }

    fn lower_pass(&self, node_id: NodeId, commands: &mut Vec<Command>) -> Result<(), CompileError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| GraphError::BrokenConnection {
                reason: format!("missing pass node {node_id:?}"),
            })
            .map_err(CompileError::Graph)?;

        match node.kind {
            NodeKind::ClearTarget => {
                let color = if bool_param(self.graph, node, "Color")? {
                    Some(self.clear_color(node)?)
                } else {
                    None
                };
                let depth = bool_param(self.graph, node, "Depth")?
                    .then(|| float_param(self.graph, node, "Depth Value"))
                    .transpose()?;
                let stencil = bool_param(self.graph, node, "Stencil")?
                    .then(|| int_param(self.graph, node, "Stencil Value"))
                    .transpose()?;
                commands.push(Command::Clear {
                    color,
                    depth,
                    stencil,
                });
            }
            NodeKind::SetTarget => commands.push(Command::SetTarget {
                target: self.target_ref(node, "Target")?,
            }),
            NodeKind::BindTarget => commands.push(Command::Bind {
                target: self.target_ref(node, "Target")?,
                constant: string_param(self.graph, node, "Constant")?,
            }),
            NodeKind::DrawMeshes => {
                let context = string_param(self.graph, node, "Context")?;
                let order_str = string_param(self.graph, node, "Order")?;
                let order = DrawOrder::parse(&order_str).ok_or_else(|| {
                    CompileError::Graph(GraphError::InvalidParameter {
                        node: node.name.clone(),
                        socket: "Order".to_string(),
                        reason: format!("unknown draw order '{order_str}'"),
                    })
                })?;
                commands.push(Command::DrawMeshes { context, order });
            }
            NodeKind::DrawDecals => commands.push(Command::DrawDecals {
                context: string_param(self.graph, node, "Context")?,
            }),
            NodeKind::DrawQuad => commands.push(Command::DrawQuad {
                shader_context: string_param(self.graph, node, "Shader Context")?,
            }),
            NodeKind::DrawMaterialQuad => commands.push(Command::DrawMaterialQuad {
                material_context: string_param(self.graph, node, "Material Context")?,
            }),
            NodeKind::DrawWorld => commands.push(Command::DrawWorld),
            NodeKind::CopyPass => {
                commands.push(Command::SetTarget {
                    target: self.target_ref(node, "Target")?,
                });
                commands.push(Command::Copy {
                    source: self.target_ref(node, "Color")?,
                });
            }
            NodeKind::BlendPass => {
                commands.push(Command::SetTarget {
                    target: self.target_ref(node, "Target")?,
                });
                commands.push(Command::Blend {
                    source: self.target_ref(node, "Color")?,
                });
            }
            NodeKind::CallFunction => commands.push(Command::CallFunction {
                function: string_param(self.graph, node, "Function")?,
            }),
            _ => {
                return Err(CompileError::Graph(GraphError::InvalidControlFlow {
                    node: node.name.clone(),
                    reason: "node kind is not a pass".to_string(),
                }))
            }
        }
        Ok(())
    }

    /// The clear color is a literal, or wired from the BackgroundColor
    /// constant node and deferred to execution time.
    fn clear_color(&self, node: &Node) -> Result<ClearColor, CompileError> {
        match crate::params::input_producer(self.graph, node, "Color Value") {
            Some(producer) if producer.kind == NodeKind::BackgroundColor => {
                Ok(ClearColor::Background)
            }
            Some(producer) => Err(CompileError::Graph(GraphError::InvalidParameter {
                node: node.name.clone(),
                socket: "Color Value".to_string(),
                reason: format!("'{}' cannot produce a clear color", producer.name),
            })),
            None => Ok(ClearColor::Value(color_param(
                self.graph,
                node,
                "Color Value",
            )?)),
        }
    }

    /// Resolve a Target-typed input to the physical resource it names.
    /// When a node carries both an explicit target edge and an implicit
    /// composite default, the explicit edge wins.
    fn target_ref(&self, node: &Node, input: &str) -> Result<TargetRef, CompileError> {
        let producer = require_input_producer(self.graph, node, input)
            .map_err(CompileError::Graph)?;
        match producer.kind {
            NodeKind::Framebuffer => Ok(TargetRef::Framebuffer),
            NodeKind::Target => {
                let physical = self.resources.target_for_node(producer.id).ok_or_else(|| {
                    CompileError::Graph(GraphError::BrokenConnection {
                        reason: format!("target '{}' was never allocated", producer.name),
                    })
                })?;
                Ok(TargetRef::Target(physical.handle))
            }
            NodeKind::GBuffer => {
                let members = self.resources.gbuffer_members(producer.id).ok_or_else(|| {
                    CompileError::Graph(GraphError::BrokenConnection {
                        reason: format!("geometry buffer '{}' was never allocated", producer.name),
                    })
                })?;
                Ok(TargetRef::GBuffer(members.to_vec()))
            }
            NodeKind::DepthBuffer => {
                let depth = self.resources.depth_for_node(producer.id).ok_or_else(|| {
                    CompileError::Graph(GraphError::BrokenConnection {
                        reason: format!("depth buffer '{}' was never allocated", producer.name),
                    })
                })?;
                Ok(TargetRef::Depth(depth.handle))
            }
            _ => Err(CompileError::Graph(GraphError::InvalidParameter {
                node: node.name.clone(),
                socket: input.to_string(),
                reason: format!("'{}' cannot be bound as a render target", producer.name),
            })),
        }
    }
}
