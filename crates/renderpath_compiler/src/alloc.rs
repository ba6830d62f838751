// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render target allocation: concrete backing storage for the abstract
//! Target, GBuffer and DepthBuffer declarations referenced by the
//! scheduled steps.
//!
//! Allocation resolves screen-relative sizes against the runtime screen
//! size supplied by the backend. The graph itself never changes when the
//! window does; only this step re-resolves.

use crate::error::{AllocError, CompileError};
use crate::params::{bool_param, float_param, int_param, input_producer, string_param};
use crate::schedule::Step;
use indexmap::IndexMap;
use renderpath_graph::{Graph, GraphError, Node, NodeId, NodeKind, SocketType, ValidGraph};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Runtime screen dimensions supplied by the rendering backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Screen width in pixels
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
}

/// A target dimension: literal, or a scale of the screen dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizeExpr {
    /// Literal size in pixels
    Absolute(u32),
    /// `scale x screen dimension`, resolved at allocation time
    ScreenRelative(f32),
}

impl SizeExpr {
    fn resolve(&self, screen_dim: Option<u32>, target: &str) -> Result<u32, AllocError> {
        match self {
            Self::Absolute(size) => Ok(*size),
            Self::ScreenRelative(scale) => {
                let dim = screen_dim.ok_or_else(|| AllocError::UnresolvedScale {
                    target: target.to_string(),
                })?;
                Ok((scale * dim as f32).round() as u32)
            }
        }
    }
}

/// Pixel format of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    /// 8-bit RGBA
    Rgba32,
    /// 16-bit float RGBA
    Rgba64,
    /// 32-bit float RGBA
    Rgba128,
    /// 16-bit float RG
    Rg32,
    /// 32-bit float RG
    Rg64,
    /// 8-bit R
    R8,
    /// 16-bit float R
    R16,
    /// 32-bit float R
    R32,
    /// 16-bit depth
    Depth16,
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RGBA32" => Ok(Self::Rgba32),
            "RGBA64" => Ok(Self::Rgba64),
            "RGBA128" => Ok(Self::Rgba128),
            "RG32" => Ok(Self::Rg32),
            "RG64" => Ok(Self::Rg64),
            "R8" => Ok(Self::R8),
            "R16" => Ok(Self::R16),
            "R32" => Ok(Self::R32),
            "DEPTH16" => Ok(Self::Depth16),
            other => Err(other.to_string()),
        }
    }
}

/// Handle to a physical color target buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHandle(pub u32);

/// Handle to a physical depth buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthHandle(pub u32);

/// Double-buffer state for a ping-pong target.
///
/// Two physical buffers back one logical target so it can be read
/// (previous pass) and written (current pass) at once. The frame loop
/// advances the pointer; no two frames may flip the same target
/// concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPong {
    /// The two physical buffers
    pub buffers: [TargetHandle; 2],
    active: usize,
}

impl PingPong {
    fn new(first: TargetHandle, second: TargetHandle) -> Self {
        Self {
            buffers: [first, second],
            active: 0,
        }
    }

    /// The buffer written by the current pass
    pub fn write(&self) -> TargetHandle {
        self.buffers[self.active]
    }

    /// The buffer read by the current pass
    pub fn read(&self) -> TargetHandle {
        self.buffers[self.active ^ 1]
    }

    /// Swap the read/write pointers; called once per read+write
    /// transition
    pub fn flip(&mut self) {
        self.active ^= 1;
    }

    /// Index of the active write buffer
    pub fn parity(&self) -> usize {
        self.active
    }
}

/// Concrete backing storage for one target slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalTarget {
    /// Primary handle (the write buffer for ping-pong targets)
    pub handle: TargetHandle,
    /// Slot ID as authored on the Target node
    pub id: String,
    /// Resolved width in pixels
    pub width: u32,
    /// Resolved height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TargetFormat,
    /// Shared depth buffer, if the target declares one
    pub depth: Option<DepthHandle>,
    /// Double-buffer state, if the target is ping-pong
    pub ping_pong: Option<PingPong>,
}

/// One allocated depth buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthBufferAlloc {
    /// Physical handle
    pub handle: DepthHandle,
    /// Depth buffer ID as authored
    pub id: String,
    /// Whether a stencil component is attached
    pub stencil: bool,
}

/// Resolved resource table handed to the rendering backend.
///
/// Immutable after allocation except for per-frame ping-pong flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceTable {
    targets: IndexMap<String, PhysicalTarget>,
    target_slots: IndexMap<NodeId, String>,
    depth_buffers: IndexMap<NodeId, DepthBufferAlloc>,
    gbuffers: IndexMap<NodeId, Vec<TargetHandle>>,
    flips_per_frame: IndexMap<String, u32>,
}

impl ResourceTable {
    /// Get a physical target by slot ID
    pub fn target(&self, slot: &str) -> Option<&PhysicalTarget> {
        self.targets.get(slot)
    }

    /// Get a mutable physical target by slot ID (for ping-pong flips)
    pub fn target_mut(&mut self, slot: &str) -> Option<&mut PhysicalTarget> {
        self.targets.get_mut(slot)
    }

    /// Get the physical target backing a Target node
    pub fn target_for_node(&self, node_id: NodeId) -> Option<&PhysicalTarget> {
        self.targets.get(self.target_slots.get(&node_id)?)
    }

    /// Get the depth buffer allocated for a DepthBuffer node
    pub fn depth_for_node(&self, node_id: NodeId) -> Option<&DepthBufferAlloc> {
        self.depth_buffers.get(&node_id)
    }

    /// Get the ordered member handles of a GBuffer node
    pub fn gbuffer_members(&self, node_id: NodeId) -> Option<&[TargetHandle]> {
        self.gbuffers.get(&node_id).map(Vec::as_slice)
    }

    /// All physical targets, in allocation order
    pub fn targets(&self) -> impl Iterator<Item = &PhysicalTarget> {
        self.targets.values()
    }

    /// All depth buffers, in allocation order
    pub fn depth_buffers(&self) -> impl Iterator<Item = &DepthBufferAlloc> {
        self.depth_buffers.values()
    }

    /// Ping-pong flip transitions one run of the command list performs
    /// on a slot
    pub fn flips_per_frame(&self, slot: &str) -> u32 {
        self.flips_per_frame.get(slot).copied().unwrap_or(0)
    }
}

/// Allocate backing storage for every resource reachable from the
/// scheduled steps.
pub fn allocate(
    graph: &ValidGraph<'_>,
    steps: &[Step],
    screen: Option<ScreenSize>,
) -> Result<ResourceTable, CompileError> {
    let mut allocator = Allocator {
        graph: graph.graph(),
        screen,
        table: ResourceTable::default(),
        next_target: 0,
        next_depth: 0,
    };

    allocator.visit_steps(steps)?;
    allocator.scan_flips(steps);

    tracing::debug!(
        "allocated {} target slots, {} depth buffers",
        allocator.table.targets.len(),
        allocator.table.depth_buffers.len()
    );
    Ok(allocator.table)
}

struct Allocator<'g> {
    graph: &'g Graph,
    screen: Option<ScreenSize>,
    table: ResourceTable,
    next_target: u32,
    next_depth: u32,
}

impl<'g> Allocator<'g> {
    fn fresh_target(&mut self) -> TargetHandle {
        let handle = TargetHandle(self.next_target);
        self.next_target += 1;
        handle
    }

    fn fresh_depth(&mut self) -> DepthHandle {
        let handle = DepthHandle(self.next_depth);
        self.next_depth += 1;
        handle
    }

    fn visit_steps(&mut self, steps: &[Step]) -> Result<(), CompileError> {
        for step in steps {
            match step {
                Step::Pass(node_id) => self.visit_pass(*node_id)?,
                Step::Branch {
                    true_steps,
                    false_steps,
                    ..
                } => {
                    self.visit_steps(true_steps)?;
                    self.visit_steps(false_steps)?;
                }
                Step::Merge { left, right } => {
                    self.visit_steps(left)?;
                    self.visit_steps(right)?;
                }
                Step::Loop { body, .. } | Step::Stereo { body } => self.visit_steps(body)?,
            }
        }
        Ok(())
    }

    /// Register every resource node wired into a pass's Target inputs.
    fn visit_pass(&mut self, node_id: NodeId) -> Result<(), CompileError> {
        let Some(node) = self.graph.node(node_id) else {
            return Ok(());
        };
        for input in &node.inputs {
            if input.socket_type != SocketType::Target {
                continue;
            }
            let Some(producer) = self
                .graph
                .producer_of(input.id)
                .and_then(|c| self.graph.node(c.from_node))
            else {
                continue;
            };
            self.register_resource(producer)?;
        }
        Ok(())
    }

    fn register_resource(&mut self, node: &Node) -> Result<(), CompileError> {
        match node.kind {
            NodeKind::Target => {
                self.register_target(node)?;
            }
            NodeKind::GBuffer => self.register_gbuffer(node)?,
            NodeKind::DepthBuffer => {
                self.register_depth(node)?;
            }
            NodeKind::Framebuffer => {}
            _ => {
                return Err(CompileError::Graph(GraphError::InvalidParameter {
                    node: node.name.clone(),
                    socket: "Target".to_string(),
                    reason: "node kind cannot be bound as a render target".to_string(),
                }))
            }
        }
        Ok(())
    }

    fn register_target(&mut self, node: &Node) -> Result<TargetHandle, CompileError> {
        if let Some(slot) = self.table.target_slots.get(&node.id) {
            if let Some(existing) = self.table.targets.get(slot) {
                return Ok(existing.handle);
            }
        }

        let id = string_param(self.graph, node, "ID")?;
        let format_str = string_param(self.graph, node, "Format")?;
        let format = TargetFormat::from_str(&format_str).map_err(|format| {
            AllocError::UnknownFormat {
                target: id.clone(),
                format,
            }
        })?;

        // Same slot declared before: formats must agree, storage is shared
        if let Some(existing) = self.table.targets.get(&id) {
            if existing.format != format {
                return Err(CompileError::Alloc(AllocError::FormatConflict {
                    id,
                    first: existing.format,
                    second: format,
                }));
            }
            let handle = existing.handle;
            self.table.target_slots.insert(node.id, id);
            return Ok(handle);
        }

        let width = self
            .size_expr(node, "Width")?
            .resolve(self.screen.map(|s| s.width), &id)
            .map_err(CompileError::Alloc)?;
        let height = self
            .size_expr(node, "Height")?
            .resolve(self.screen.map(|s| s.height), &id)
            .map_err(CompileError::Alloc)?;

        let depth = match input_producer(self.graph, node, "Depth Buffer") {
            Some(producer) if producer.kind == NodeKind::DepthBuffer => {
                Some(self.register_depth_by_id(producer.id)?)
            }
            Some(producer) => {
                return Err(CompileError::Graph(GraphError::InvalidParameter {
                    node: node.name.clone(),
                    socket: "Depth Buffer".to_string(),
                    reason: format!("'{}' is not a depth buffer", producer.name),
                }))
            }
            None => None,
        };

        let ping_pong = bool_param(self.graph, node, "Ping Pong")?;
        let handle = self.fresh_target();
        let ping_pong = ping_pong.then(|| {
            let second = self.fresh_target();
            PingPong::new(handle, second)
        });

        self.table.targets.insert(
            id.clone(),
            PhysicalTarget {
                handle,
                id: id.clone(),
                width,
                height,
                format,
                depth,
                ping_pong,
            },
        );
        self.table.target_slots.insert(node.id, id);
        Ok(handle)
    }

    /// Width/Height are literal ints, or wired from a Screen node whose
    /// Scale parameter gives the screen-relative factor.
    fn size_expr(&self, node: &Node, input: &str) -> Result<SizeExpr, CompileError> {
        match input_producer(self.graph, node, input) {
            Some(producer) if producer.kind == NodeKind::Screen => {
                let scale = float_param(self.graph, producer, "Scale")?;
                Ok(SizeExpr::ScreenRelative(scale))
            }
            Some(producer) => Err(CompileError::Graph(GraphError::InvalidParameter {
                node: node.name.clone(),
                socket: input.to_string(),
                reason: format!("'{}' cannot produce a target dimension", producer.name),
            })),
            None => {
                let size = int_param(self.graph, node, input)?;
                Ok(SizeExpr::Absolute(size.max(0) as u32))
            }
        }
    }

    fn register_depth(&mut self, node: &Node) -> Result<DepthHandle, CompileError> {
        if let Some(existing) = self.table.depth_buffers.get(&node.id) {
            return Ok(existing.handle);
        }
        let id = string_param(self.graph, node, "ID")?;
        let stencil = bool_param(self.graph, node, "Stencil")?;
        let handle = self.fresh_depth();
        self.table
            .depth_buffers
            .insert(node.id, DepthBufferAlloc { handle, id, stencil });
        Ok(handle)
    }

    fn register_depth_by_id(&mut self, node_id: NodeId) -> Result<DepthHandle, CompileError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| GraphError::BrokenConnection {
                reason: format!("missing depth buffer node {node_id:?}"),
            })
            .map_err(CompileError::Graph)?;
        self.register_depth(node)
    }

    fn register_gbuffer(&mut self, node: &Node) -> Result<(), CompileError> {
        if self.table.gbuffers.contains_key(&node.id) {
            return Ok(());
        }
        let mut members = Vec::new();
        for input in &node.inputs {
            let Some(producer) = self
                .graph
                .producer_of(input.id)
                .and_then(|c| self.graph.node(c.from_node))
            else {
                continue;
            };
            if producer.kind != NodeKind::Target {
                return Err(CompileError::Graph(GraphError::InvalidParameter {
                    node: node.name.clone(),
                    socket: input.name.clone(),
                    reason: format!("'{}' cannot be a geometry buffer member", producer.name),
                }));
            }
            members.push(self.register_target(producer)?);
        }
        self.table.gbuffers.insert(node.id, members);
        Ok(())
    }

    /// Count the read+write transitions each ping-pong slot goes through
    /// in one run of the command list: the active destination is also
    /// bound as a source within a single pass sequence. Loop and stereo
    /// bodies are scanned once.
    fn scan_flips(&mut self, steps: &[Step]) {
        let mut scan = FlipScan {
            current: None,
            flipped: false,
        };
        self.scan_steps(steps, &mut scan);
    }

    fn scan_steps(&mut self, steps: &[Step], scan: &mut FlipScan) {
        for step in steps {
            match step {
                Step::Pass(node_id) => self.scan_pass(*node_id, scan),
                Step::Branch {
                    true_steps,
                    false_steps,
                    ..
                } => {
                    self.scan_steps(true_steps, scan);
                    self.scan_steps(false_steps, scan);
                }
                Step::Merge { left, right } => {
                    self.scan_steps(left, scan);
                    self.scan_steps(right, scan);
                }
                Step::Loop { body, .. } | Step::Stereo { body } => self.scan_steps(body, scan),
            }
        }
    }

    fn scan_pass(&mut self, node_id: NodeId, scan: &mut FlipScan) {
        let Some(node) = self.graph.node(node_id) else {
            return;
        };
        match node.kind {
            NodeKind::SetTarget => {
                scan.current = self.slot_of_input(node, "Target");
                scan.flipped = false;
            }
            NodeKind::CopyPass | NodeKind::BlendPass => {
                scan.current = self.slot_of_input(node, "Target");
                scan.flipped = false;
                self.note_source(node, "Color", scan);
            }
            NodeKind::BindTarget => self.note_source(node, "Target", scan),
            _ => {}
        }
    }

    fn note_source(&mut self, node: &Node, input: &str, scan: &mut FlipScan) {
        let Some(slot) = self.slot_of_input(node, input) else {
            return;
        };
        let is_ping_pong = self
            .table
            .targets
            .get(&slot)
            .is_some_and(|t| t.ping_pong.is_some());
        if is_ping_pong && !scan.flipped && scan.current.as_deref() == Some(slot.as_str()) {
            *self.table.flips_per_frame.entry(slot).or_insert(0) += 1;
            scan.flipped = true;
        }
    }

    fn slot_of_input(&self, node: &Node, input: &str) -> Option<String> {
        let producer = input_producer(self.graph, node, input)?;
        self.table.target_slots.get(&producer.id).cloned()
    }
}

struct FlipScan {
    current: Option<String>,
    flipped: bool,
}
