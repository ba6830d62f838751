// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the render path graph.

use crate::socket::{Socket, SocketId, SocketType, SocketValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node; stable across edits of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Node menu category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Pipeline commands (draws, clears, target binds)
    Command,
    /// Render target declarations
    Target,
    /// Scene constants (screen size, background color, lamp count)
    Constant,
    /// Control flow (branches, merges, loops)
    Logic,
}

/// The closed set of render path node kinds.
///
/// The node vocabulary is fixed and known when this tool is built, so
/// kinds are a tagged enumeration rather than an open registry of
/// string-keyed classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Start of the render path; carries the path configuration
    Begin,
    /// Draw meshes of a named context
    DrawMeshes,
    /// Draw decals of a named context
    DrawDecals,
    /// Clear the current target
    ClearTarget,
    /// Set the active render target
    SetTarget,
    /// Bind a render target to a named shader constant
    BindTarget,
    /// Draw a full-screen quad using a shader context
    DrawQuad,
    /// Draw a full-screen quad using a material context
    DrawMaterialQuad,
    /// Draw the world skydome
    DrawWorld,
    /// Copy a render target into the current target
    CopyPass,
    /// Blend a render target onto the current target
    BlendPass,
    /// Call a host function
    CallFunction,
    /// Branch on a host function result
    BranchFunction,
    /// Join two stage chains
    MergeStages,
    /// Loop nested stages over a closed integer range
    LoopStages,
    /// Loop nested stages once per visible lamp
    LoopLamps,
    /// Draw nested stages once per eye
    DrawStereo,
    /// Declare a render target
    Target,
    /// Declare a depth buffer shareable between targets
    DepthBuffer,
    /// Compose targets into a geometry buffer
    GBuffer,
    /// Reference the window framebuffer
    Framebuffer,
    /// Reference the screen dimensions
    Screen,
    /// Reference the world background color
    BackgroundColor,
    /// Reference the number of visible lamps
    LampCount,
}

impl NodeKind {
    /// Every node kind, in menu order
    pub const ALL: [NodeKind; 24] = [
        Self::Begin,
        Self::DrawMeshes,
        Self::DrawDecals,
        Self::ClearTarget,
        Self::SetTarget,
        Self::BindTarget,
        Self::DrawQuad,
        Self::DrawMaterialQuad,
        Self::DrawWorld,
        Self::CopyPass,
        Self::BlendPass,
        Self::Target,
        Self::DepthBuffer,
        Self::GBuffer,
        Self::Framebuffer,
        Self::Screen,
        Self::BackgroundColor,
        Self::LampCount,
        Self::CallFunction,
        Self::BranchFunction,
        Self::MergeStages,
        Self::LoopStages,
        Self::LoopLamps,
        Self::DrawStereo,
    ];

    /// Get the menu category
    pub fn category(&self) -> NodeCategory {
        match self {
            Self::Begin
            | Self::DrawMeshes
            | Self::DrawDecals
            | Self::ClearTarget
            | Self::SetTarget
            | Self::BindTarget
            | Self::DrawQuad
            | Self::DrawMaterialQuad
            | Self::DrawWorld
            | Self::CopyPass
            | Self::BlendPass => NodeCategory::Command,
            Self::Target | Self::DepthBuffer | Self::GBuffer | Self::Framebuffer => {
                NodeCategory::Target
            }
            Self::Screen | Self::BackgroundColor | Self::LampCount => NodeCategory::Constant,
            Self::CallFunction
            | Self::BranchFunction
            | Self::MergeStages
            | Self::LoopStages
            | Self::LoopLamps
            | Self::DrawStereo => NodeCategory::Logic,
        }
    }

    /// Get the display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Begin => "Begin",
            Self::DrawMeshes => "Draw Meshes",
            Self::DrawDecals => "Draw Decals",
            Self::ClearTarget => "Clear Target",
            Self::SetTarget => "Set Target",
            Self::BindTarget => "Bind Target",
            Self::DrawQuad => "Draw Quad",
            Self::DrawMaterialQuad => "Draw Material Quad",
            Self::DrawWorld => "Draw World",
            Self::CopyPass => "Copy",
            Self::BlendPass => "Blend",
            Self::CallFunction => "Call Function",
            Self::BranchFunction => "Branch Function",
            Self::MergeStages => "Merge Stages",
            Self::LoopStages => "Loop Stages",
            Self::LoopLamps => "Loop Lamps",
            Self::DrawStereo => "Draw Stereo",
            Self::Target => "Target",
            Self::DepthBuffer => "Depth Buffer",
            Self::GBuffer => "GBuffer",
            Self::Framebuffer => "Framebuffer",
            Self::Screen => "Screen",
            Self::BackgroundColor => "Background Color",
            Self::LampCount => "Lamp Count",
        }
    }

    /// Input socket signature for this kind
    fn inputs(&self) -> Vec<Socket> {
        use SocketType::*;
        match self {
            Self::Begin => vec![
                Socket::input("ID", String).with_default(SocketValue::String("path".into())),
                Socket::input("Mesh", String).with_default(SocketValue::String("mesh".into())),
                Socket::input("Shadows", String)
                    .with_default(SocketValue::String("shadowmap".into())),
                Socket::input("Translucent", String)
                    .with_default(SocketValue::String("translucent".into())),
                Socket::input("Overlay", String)
                    .with_default(SocketValue::String("overlay".into())),
                Socket::input("HDR Space", Bool).with_default(SocketValue::Bool(true)),
            ],
            Self::DrawMeshes => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Context", String).required(),
                Socket::input("Order", String)
                    .with_default(SocketValue::String("front_to_back".into())),
            ],
            Self::DrawDecals => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Context", String).required(),
            ],
            Self::ClearTarget => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Color", Bool).with_default(SocketValue::Bool(false)),
                Socket::input("Color Value", SocketType::Color)
                    .with_default(SocketValue::Color([0.0, 0.0, 0.0, 1.0])),
                Socket::input("Depth", Bool).with_default(SocketValue::Bool(false)),
                Socket::input("Depth Value", Float).with_default(SocketValue::Float(1.0)),
                Socket::input("Stencil", Bool).with_default(SocketValue::Bool(false)),
                Socket::input("Stencil Value", Int).with_default(SocketValue::Int(0)),
            ],
            Self::SetTarget => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Target", Target).required(),
            ],
            Self::BindTarget => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Target", Target).required(),
                Socket::input("Constant", String).required(),
            ],
            Self::DrawQuad => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Shader Context", String).required(),
            ],
            Self::DrawMaterialQuad => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Material Context", String).required(),
            ],
            Self::DrawWorld => vec![Socket::input("Stage", Stage).required()],
            Self::CopyPass | Self::BlendPass => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Target", Target).required(),
                Socket::input("Color", Target).required(),
            ],
            Self::CallFunction | Self::BranchFunction => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("Function", String).required(),
            ],
            Self::MergeStages => vec![
                Socket::input("Stage 1", Stage).required(),
                Socket::input("Stage 2", Stage).required(),
            ],
            Self::LoopStages => vec![
                Socket::input("Stage", Stage).required(),
                Socket::input("From", Int).with_default(SocketValue::Int(0)),
                Socket::input("To", Int).with_default(SocketValue::Int(0)),
            ],
            Self::LoopLamps | Self::DrawStereo => {
                vec![Socket::input("Stage", Stage).required()]
            }
            Self::Target => vec![
                Socket::input("ID", String).required(),
                Socket::input("Width", Int).required(),
                Socket::input("Height", Int).required(),
                Socket::input("Depth Buffer", SocketType::Target),
                Socket::input("Format", String)
                    .with_default(SocketValue::String("RGBA32".into())),
                Socket::input("Ping Pong", Bool).with_default(SocketValue::Bool(false)),
            ],
            Self::DepthBuffer => vec![
                Socket::input("ID", String).required(),
                Socket::input("Stencil", Bool).with_default(SocketValue::Bool(false)),
            ],
            Self::GBuffer => vec![
                Socket::input("Target 0", Target).required(),
                Socket::input("Target 1", Target),
                Socket::input("Target 2", Target),
                Socket::input("Target 3", Target),
                Socket::input("Target 4", Target),
            ],
            Self::Framebuffer | Self::BackgroundColor | Self::LampCount => vec![],
            Self::Screen => {
                vec![Socket::input("Scale", Float).with_default(SocketValue::Float(1.0))]
            }
        }
    }

    /// Output socket signature for this kind
    fn outputs(&self) -> Vec<Socket> {
        use SocketType::*;
        match self {
            Self::Begin
            | Self::DrawMeshes
            | Self::DrawDecals
            | Self::ClearTarget
            | Self::SetTarget
            | Self::BindTarget
            | Self::DrawQuad
            | Self::DrawMaterialQuad
            | Self::DrawWorld
            | Self::CopyPass
            | Self::BlendPass
            | Self::CallFunction
            | Self::MergeStages => vec![Socket::output("Stage", Stage)],
            Self::BranchFunction => vec![
                Socket::output("True", Stage),
                Socket::output("False", Stage),
            ],
            Self::LoopStages | Self::LoopLamps => vec![
                Socket::output("Complete", Stage),
                Socket::output("Loop", Stage),
            ],
            Self::DrawStereo => vec![
                Socket::output("Complete", Stage),
                Socket::output("Per Eye", Stage),
            ],
            Self::Target | Self::DepthBuffer | Self::Framebuffer => {
                vec![Socket::output("Target", Target)]
            }
            Self::GBuffer => vec![Socket::output("Targets", Target)],
            Self::Screen => vec![
                Socket::output("Width", Int),
                Socket::output("Height", Int),
            ],
            Self::BackgroundColor => vec![Socket::output("Color", Color)],
            Self::LampCount => vec![Socket::output("Count", Int)],
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node kind
    pub kind: NodeKind,
    /// Display name (can be customized by the author)
    pub name: String,
    /// Input sockets
    pub inputs: Vec<Socket>,
    /// Output sockets
    pub outputs: Vec<Socket>,
}

impl Node {
    /// Create a new node with the socket signature of the given kind
    pub fn of_kind(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            name: kind.label().to_string(),
            inputs: kind.inputs(),
            outputs: kind.outputs(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the literal value of a named input and return the node.
    ///
    /// This is how node-local parameters are authored; an unconnected
    /// input with a literal default is a bound parameter.
    pub fn with_input_value(mut self, name: &str, value: SocketValue) -> Self {
        self.set_input_value(name, value);
        self
    }

    /// Set the literal value of a named input. Returns false if no input
    /// with that name exists.
    pub fn set_input_value(&mut self, name: &str, value: SocketValue) -> bool {
        match self.inputs.iter_mut().find(|s| s.name == name) {
            Some(socket) => {
                socket.default_value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Get an input socket by index
    pub fn input(&self, index: usize) -> Option<&Socket> {
        self.inputs.get(index)
    }

    /// Get an output socket by index
    pub fn output(&self, index: usize) -> Option<&Socket> {
        self.outputs.get(index)
    }

    /// Get an input socket by name
    pub fn input_named(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Get an output socket by name
    pub fn output_named(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// Get a socket by ID
    pub fn socket(&self, socket_id: &SocketId) -> Option<&Socket> {
        self.inputs
            .iter()
            .find(|s| s.id == *socket_id)
            .or_else(|| self.outputs.iter().find(|s| s.id == *socket_id))
    }

    /// Get all sockets
    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}
