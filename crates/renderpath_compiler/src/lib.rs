// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render path compiler.
//!
//! Compiles a validated render path node graph into an executable,
//! backend-agnostic program:
//! - Scheduling: depth-first stage walk into structured steps
//! - Allocation: concrete backing storage for targets and depth buffers
//! - Emission: the flat command list the rendering backend executes
//!
//! ## Architecture
//!
//! [`compile`] runs the phases as a single-threaded, synchronous pipeline
//! with no suspension points; it either returns a [`CompiledPath`] or
//! fails fast with the first error encountered. The compiled path is an
//! immutable artifact safe to share read-only across frames; only the
//! per-target ping-pong flip state mutates per frame, and advancing it is
//! the frame loop's responsibility.

pub mod alloc;
pub mod emit;
pub mod error;
mod params;
pub mod schedule;
#[cfg(test)]
mod testutil;

pub use alloc::{
    allocate, DepthBufferAlloc, DepthHandle, PhysicalTarget, PingPong, ResourceTable,
    ScreenSize, SizeExpr, TargetFormat, TargetHandle,
};
pub use emit::{emit, ClearColor, Command, DrawOrder, TargetRef};
pub use error::{AllocError, CompileError};
pub use schedule::{schedule, LoopCount, Step};

use crate::params::{bool_param, string_param};
use renderpath_graph::{validate, Graph, GraphError, ValidGraph};
use serde::{Deserialize, Serialize};

/// Render path configuration carried by the Begin node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Path identifier
    pub id: String,
    /// Mesh draw context name
    pub mesh_context: String,
    /// Shadow map draw context name
    pub shadows_context: String,
    /// Translucent draw context name
    pub translucent_context: String,
    /// Overlay draw context name
    pub overlay_context: String,
    /// Whether intermediate targets live in HDR space
    pub hdr: bool,
}

fn path_config(graph: &ValidGraph<'_>) -> Result<PathConfig, GraphError> {
    let begin = graph
        .node(graph.begin())
        .ok_or_else(|| GraphError::BrokenConnection {
            reason: "begin node disappeared during compilation".to_string(),
        })?;
    Ok(PathConfig {
        id: string_param(graph.graph(), begin, "ID")?,
        mesh_context: string_param(graph.graph(), begin, "Mesh")?,
        shadows_context: string_param(graph.graph(), begin, "Shadows")?,
        translucent_context: string_param(graph.graph(), begin, "Translucent")?,
        overlay_context: string_param(graph.graph(), begin, "Overlay")?,
        hdr: bool_param(graph.graph(), begin, "HDR Space")?,
    })
}

/// A compiled render path: immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPath {
    /// Path configuration from the Begin node
    pub config: PathConfig,
    /// Structured step list in scheduled order
    pub steps: Vec<Step>,
    /// Resolved resource table for the backend
    pub resources: ResourceTable,
    /// Flat command list, in step order
    pub commands: Vec<Command>,
}

/// Compile a render path graph into an executable program.
///
/// Runs validation, scheduling, allocation and emission in order and
/// reports exactly one root cause on failure. `screen` may be `None` when
/// every target size is literal; a screen-relative target size then fails
/// with [`AllocError::UnresolvedScale`], and the compile is safe to retry
/// once the backend supplies the screen size.
pub fn compile(graph: &Graph, screen: Option<ScreenSize>) -> Result<CompiledPath, CompileError> {
    tracing::debug!("compiling render path graph '{}'", graph.name);

    let valid = validate(graph)?;
    let config = path_config(&valid).map_err(CompileError::Graph)?;
    let steps = schedule(&valid)?;
    let resources = allocate(&valid, &steps, screen)?;
    let commands = emit(&valid, &steps, &resources)?;

    tracing::debug!(
        "compiled render path '{}': {} commands, {} target slots",
        config.id,
        commands.len(),
        resources.targets().count()
    );
    Ok(CompiledPath {
        config,
        steps,
        resources,
        commands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{target, wire};
    use renderpath_graph::{NodeKind, SocketValue};

    /// A small deferred path: fill a geometry buffer, accumulate lighting
    /// per lamp into a ping-pong target, composite to the framebuffer.
    fn deferred_path() -> Graph {
        let mut graph = Graph::new("deferred");
        let begin = graph.add(NodeKind::Begin);
        graph
            .node_mut(begin)
            .unwrap()
            .set_input_value("ID", SocketValue::String("deferred".into()));

        let depth = graph.add(NodeKind::DepthBuffer);
        graph
            .node_mut(depth)
            .unwrap()
            .set_input_value("ID", SocketValue::String("main_depth".into()));
        let albedo = target(&mut graph, "albedo", 1280, 720, "RGBA32");
        let normals = target(&mut graph, "normals", 1280, 720, "RGBA64");
        wire(&mut graph, depth, "Target", albedo, "Depth Buffer");
        wire(&mut graph, depth, "Target", normals, "Depth Buffer");

        let gbuffer = graph.add(NodeKind::GBuffer);
        wire(&mut graph, albedo, "Target", gbuffer, "Target 0");
        wire(&mut graph, normals, "Target", gbuffer, "Target 1");

        // Geometry buffer fill
        let set_gbuffer = graph.add(NodeKind::SetTarget);
        let clear = graph.add(NodeKind::ClearTarget);
        {
            let node = graph.node_mut(clear).unwrap();
            node.set_input_value("Color", SocketValue::Bool(true));
            node.set_input_value("Depth", SocketValue::Bool(true));
        }
        let fill = graph.add(NodeKind::DrawMeshes);
        graph
            .node_mut(fill)
            .unwrap()
            .set_input_value("Context", SocketValue::String("mesh".into()));
        wire(&mut graph, begin, "Stage", set_gbuffer, "Stage");
        wire(&mut graph, gbuffer, "Targets", set_gbuffer, "Target");
        wire(&mut graph, set_gbuffer, "Stage", clear, "Stage");
        wire(&mut graph, clear, "Stage", fill, "Stage");

        // Lighting accumulation, once per visible lamp
        let accum = target(&mut graph, "accum", 1280, 720, "RGBA64");
        graph
            .node_mut(accum)
            .unwrap()
            .set_input_value("Ping Pong", SocketValue::Bool(true));
        let lamps = graph.add(NodeKind::LoopLamps);
        let set_accum = graph.add(NodeKind::SetTarget);
        let bind_gbuffer = graph.add(NodeKind::BindTarget);
        graph
            .node_mut(bind_gbuffer)
            .unwrap()
            .set_input_value("Constant", SocketValue::String("gbuffer".into()));
        let light = graph.add(NodeKind::DrawQuad);
        graph
            .node_mut(light)
            .unwrap()
            .set_input_value("Shader Context", SocketValue::String("deferred_light".into()));
        wire(&mut graph, fill, "Stage", lamps, "Stage");
        wire(&mut graph, lamps, "Loop", set_accum, "Stage");
        wire(&mut graph, accum, "Target", set_accum, "Target");
        wire(&mut graph, set_accum, "Stage", bind_gbuffer, "Stage");
        wire(&mut graph, gbuffer, "Targets", bind_gbuffer, "Target");
        wire(&mut graph, bind_gbuffer, "Stage", light, "Stage");

        // Composite to the window
        let framebuffer = graph.add(NodeKind::Framebuffer);
        let set_window = graph.add(NodeKind::SetTarget);
        let composite = graph.add(NodeKind::DrawMaterialQuad);
        graph
            .node_mut(composite)
            .unwrap()
            .set_input_value("Material Context", SocketValue::String("compositor".into()));
        wire(&mut graph, lamps, "Complete", set_window, "Stage");
        wire(&mut graph, framebuffer, "Target", set_window, "Target");
        wire(&mut graph, set_window, "Stage", composite, "Stage");

        graph
    }

    #[test]
    fn test_compile_deferred_path() {
        let graph = deferred_path();
        let compiled = compile(&graph, None).unwrap();

        assert_eq!(compiled.config.id, "deferred");
        assert_eq!(compiled.config.mesh_context, "mesh");
        assert!(compiled.config.hdr);

        // albedo, normals, accum (+ the accum ping-pong partner handle)
        assert_eq!(compiled.resources.targets().count(), 3);
        assert_eq!(compiled.resources.depth_buffers().count(), 1);
        assert!(compiled
            .resources
            .target("accum")
            .unwrap()
            .ping_pong
            .is_some());

        let gbuffer_handles = vec![
            compiled.resources.target("albedo").unwrap().handle,
            compiled.resources.target("normals").unwrap().handle,
        ];
        assert_eq!(
            compiled.commands,
            vec![
                Command::SetTarget {
                    target: TargetRef::GBuffer(gbuffer_handles.clone()),
                },
                Command::Clear {
                    color: Some(ClearColor::Value([0.0, 0.0, 0.0, 1.0])),
                    depth: Some(1.0),
                    stencil: None,
                },
                Command::DrawMeshes {
                    context: "mesh".to_string(),
                    order: DrawOrder::FrontToBack,
                },
                Command::Loop {
                    count: LoopCount::Lamps,
                    body: vec![
                        Command::SetTarget {
                            target: TargetRef::Target(
                                compiled.resources.target("accum").unwrap().handle
                            ),
                        },
                        Command::Bind {
                            target: TargetRef::GBuffer(gbuffer_handles),
                            constant: "gbuffer".to_string(),
                        },
                        Command::DrawQuad {
                            shader_context: "deferred_light".to_string(),
                        },
                    ],
                },
                Command::SetTarget {
                    target: TargetRef::Framebuffer,
                },
                Command::DrawMaterialQuad {
                    material_context: "compositor".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_recompilation_is_byte_identical() {
        let graph = deferred_path();
        let first = compile(&graph, None).unwrap();
        let second = compile(&graph, None).unwrap();

        assert_eq!(first, second);
        let first_ron = ron::to_string(&first.commands).unwrap();
        let second_ron = ron::to_string(&second.commands).unwrap();
        assert_eq!(first_ron, second_ron);
    }

    #[test]
    fn test_compiled_path_serializes() {
        let graph = deferred_path();
        let compiled = compile(&graph, None).unwrap();

        let ron_str = ron::to_string(&compiled).unwrap();
        let loaded: CompiledPath = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, compiled);
    }

    #[test]
    fn test_first_error_wins() {
        // Both a dangling input and a reversed loop range; validation's
        // dangling check runs before scheduling sees the loop.
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let draw = graph.add(NodeKind::DrawMeshes);
        let looper = graph.add(NodeKind::LoopStages);
        graph.node_mut(looper).unwrap().set_input_value("From", SocketValue::Int(3));
        graph.node_mut(looper).unwrap().set_input_value("To", SocketValue::Int(1));
        wire(&mut graph, begin, "Stage", draw, "Stage");
        wire(&mut graph, draw, "Stage", looper, "Stage");

        let err = compile(&graph, None).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Graph(renderpath_graph::GraphError::DanglingSocket { .. })
        ));
    }
}
