// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage scheduling: ordering pass nodes into structured steps.
//!
//! The scheduler walks the Stage chain depth-first from the Begin node and
//! produces a list of [`Step`]s. Control constructs stay structured:
//! branches, merges, loops and stereo bodies become nested step lists
//! rather than being flattened or unrolled, so the compiled program is
//! independent of runtime parameters such as the visible lamp count.

use crate::params::{int_param, string_param};
use renderpath_graph::{Graph, GraphError, Node, NodeId, NodeKind, ValidGraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Repeat count of a loop step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopCount {
    /// Closed integer range; the body repeats `to - from` times
    Fixed {
        /// Inclusive start of the range
        from: i32,
        /// Exclusive end of the range
        to: i32,
    },
    /// Once per visible lamp; the count is resolved by the backend at
    /// execution time, not during compilation
    Lamps,
}

impl LoopCount {
    /// Number of body repetitions, if known at compile time
    pub fn iterations(&self) -> Option<u32> {
        match self {
            Self::Fixed { from, to } => Some((to - from).max(0) as u32),
            Self::Lamps => None,
        }
    }
}

/// One scheduled step: a single pass node or a structured control node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// A single pass node
    Pass(NodeId),
    /// Conditional on a host function result
    Branch {
        /// Host function queried for the condition
        function: String,
        /// Steps of the True chain
        true_steps: Vec<Step>,
        /// Steps of the False chain
        false_steps: Vec<Step>,
    },
    /// Two sibling stage chains rejoining; both execute, in order
    Merge {
        /// Steps of the first-declared chain
        left: Vec<Step>,
        /// Steps of the second-declared chain
        right: Vec<Step>,
    },
    /// Repeated body
    Loop {
        /// Repeat count
        count: LoopCount,
        /// Steps of the loop body
        body: Vec<Step>,
    },
    /// Body compiled once per eye
    Stereo {
        /// Steps of the per-eye body
        body: Vec<Step>,
    },
}

/// Where a stage chain walk stopped
enum ChainEnd {
    /// The chain terminated (no further Stage consumers)
    Done,
    /// The chain arrived at a MergeStages node
    AtMerge(NodeId),
}

/// Order the validated graph into structured steps.
///
/// Deterministic: sibling edges with no declared priority are walked in
/// the author's declaration order, so repeated calls on an unchanged
/// graph yield an identical step list.
pub fn schedule(graph: &ValidGraph<'_>) -> Result<Vec<Step>, GraphError> {
    let mut scheduler = Scheduler {
        graph: graph.graph(),
        visited: HashSet::new(),
        merge_arrivals: HashMap::new(),
    };

    let begin = graph
        .node(graph.begin())
        .ok_or_else(|| GraphError::BrokenConnection {
            reason: "begin node disappeared between validation and scheduling".to_string(),
        })?;

    let mut steps = Vec::new();
    match scheduler.walk_output(begin, "Stage", &mut steps)? {
        ChainEnd::Done => {
            tracing::debug!("scheduled {} top-level steps", steps.len());
            Ok(steps)
        }
        ChainEnd::AtMerge(merge) => Err(GraphError::InvalidControlFlow {
            node: scheduler.node_name(merge),
            reason: "only one stage path reaches the merge".to_string(),
        }),
    }
}

struct Scheduler<'g> {
    graph: &'g Graph,
    visited: HashSet<NodeId>,
    merge_arrivals: HashMap<NodeId, u8>,
}

impl<'g> Scheduler<'g> {
    fn node_name(&self, node_id: NodeId) -> String {
        self.graph
            .node(node_id)
            .map_or_else(|| format!("{node_id:?}"), |n| n.name.clone())
    }

    /// Walk every chain hanging off a named Stage output.
    fn walk_output(
        &mut self,
        node: &Node,
        output: &str,
        steps: &mut Vec<Step>,
    ) -> Result<ChainEnd, GraphError> {
        let socket = node
            .output_named(output)
            .ok_or_else(|| GraphError::BrokenConnection {
                reason: format!("node '{}' has no output '{output}'", node.name),
            })?;

        let consumers: Vec<NodeId> = self
            .graph
            .consumers_of(socket.id)
            .map(|c| c.to_node)
            .collect();

        match consumers.as_slice() {
            [] => Ok(ChainEnd::Done),
            [next] => self.walk_node(*next, steps),
            _ => self.walk_siblings(node, &consumers, steps),
        }
    }

    /// Walk parallel sibling chains fanning out from one Stage output.
    /// They must either all terminate, or be exactly two chains rejoining
    /// at the same merge.
    fn walk_siblings(
        &mut self,
        origin: &Node,
        consumers: &[NodeId],
        steps: &mut Vec<Step>,
    ) -> Result<ChainEnd, GraphError> {
        let mut chains = Vec::with_capacity(consumers.len());
        for next in consumers {
            let mut sub = Vec::new();
            let end = self.walk_node(*next, &mut sub)?;
            chains.push((sub, end));
        }

        if chains.iter().all(|(_, end)| matches!(end, ChainEnd::Done)) {
            for (sub, _) in chains {
                steps.extend(sub);
            }
            return Ok(ChainEnd::Done);
        }

        if chains.len() == 2 {
            let (right, right_end) = chains.pop().ok_or_else(|| self.sibling_error(origin))?;
            let (left, left_end) = chains.pop().ok_or_else(|| self.sibling_error(origin))?;
            if let (ChainEnd::AtMerge(a), ChainEnd::AtMerge(b)) = (&left_end, &right_end) {
                if a == b {
                    let merge = *a;
                    steps.push(Step::Merge { left, right });
                    return self.resume_after_merge(merge, steps);
                }
            }
        }

        Err(self.sibling_error(origin))
    }

    fn sibling_error(&self, origin: &Node) -> GraphError {
        GraphError::InvalidControlFlow {
            node: origin.name.clone(),
            reason: "sibling stage chains must all terminate or rejoin at a single merge"
                .to_string(),
        }
    }

    /// Continue the walk past a merge whose two arrivals are accounted for.
    fn resume_after_merge(
        &mut self,
        merge: NodeId,
        steps: &mut Vec<Step>,
    ) -> Result<ChainEnd, GraphError> {
        self.visited.insert(merge);
        let node = self
            .graph
            .node(merge)
            .ok_or_else(|| GraphError::BrokenConnection {
                reason: format!("missing merge node {merge:?}"),
            })?;
        self.walk_output(node, "Stage", steps)
    }

    fn walk_node(&mut self, node_id: NodeId, steps: &mut Vec<Step>) -> Result<ChainEnd, GraphError> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| GraphError::BrokenConnection {
                reason: format!("missing node {node_id:?}"),
            })?;

        if node.kind == NodeKind::MergeStages {
            let arrivals = self.merge_arrivals.entry(node_id).or_insert(0);
            *arrivals += 1;
            if *arrivals > 2 {
                return Err(GraphError::InvalidControlFlow {
                    node: node.name.clone(),
                    reason: "more than two stage paths reach the merge".to_string(),
                });
            }
            return Ok(ChainEnd::AtMerge(node_id));
        }

        if !self.visited.insert(node_id) {
            return Err(GraphError::InvalidControlFlow {
                node: node.name.clone(),
                reason: "stage path re-enters an already scheduled node".to_string(),
            });
        }

        match node.kind {
            NodeKind::BranchFunction => {
                let function = string_param(self.graph, node, "Function")?;
                let mut true_steps = Vec::new();
                let true_end = self.walk_output(node, "True", &mut true_steps)?;
                let mut false_steps = Vec::new();
                let false_end = self.walk_output(node, "False", &mut false_steps)?;

                steps.push(Step::Branch {
                    function,
                    true_steps,
                    false_steps,
                });
                self.join_arms(node, true_end, false_end, steps)
            }
            NodeKind::LoopStages => {
                let from = int_param(self.graph, node, "From")?;
                let to = int_param(self.graph, node, "To")?;
                if from > to {
                    return Err(GraphError::InvalidControlFlow {
                        node: node.name.clone(),
                        reason: format!("loop range {from}..{to} is reversed"),
                    });
                }
                let body = self.walk_body(node, "Loop")?;
                steps.push(Step::Loop {
                    count: LoopCount::Fixed { from, to },
                    body,
                });
                self.walk_output(node, "Complete", steps)
            }
            NodeKind::LoopLamps => {
                let body = self.walk_body(node, "Loop")?;
                steps.push(Step::Loop {
                    count: LoopCount::Lamps,
                    body,
                });
                self.walk_output(node, "Complete", steps)
            }
            NodeKind::DrawStereo => {
                let body = self.walk_body(node, "Per Eye")?;
                steps.push(Step::Stereo { body });
                self.walk_output(node, "Complete", steps)
            }
            NodeKind::DrawMeshes
            | NodeKind::DrawDecals
            | NodeKind::ClearTarget
            | NodeKind::SetTarget
            | NodeKind::BindTarget
            | NodeKind::DrawQuad
            | NodeKind::DrawMaterialQuad
            | NodeKind::DrawWorld
            | NodeKind::CopyPass
            | NodeKind::BlendPass
            | NodeKind::CallFunction => {
                steps.push(Step::Pass(node_id));
                self.walk_output(node, "Stage", steps)
            }
            NodeKind::Begin
            | NodeKind::MergeStages
            | NodeKind::Target
            | NodeKind::DepthBuffer
            | NodeKind::GBuffer
            | NodeKind::Framebuffer
            | NodeKind::Screen
            | NodeKind::BackgroundColor
            | NodeKind::LampCount => Err(GraphError::InvalidControlFlow {
                node: node.name.clone(),
                reason: "node kind cannot appear on a stage chain".to_string(),
            }),
        }
    }

    /// Walk a nested body chain; it must terminate rather than escape
    /// into a merge outside the construct.
    fn walk_body(&mut self, node: &Node, output: &str) -> Result<Vec<Step>, GraphError> {
        let mut body = Vec::new();
        match self.walk_output(node, output, &mut body)? {
            ChainEnd::Done => Ok(body),
            ChainEnd::AtMerge(merge) => Err(GraphError::InvalidControlFlow {
                node: self.node_name(merge),
                reason: format!("'{}' body escapes into a merge", node.name),
            }),
        }
    }

    fn join_arms(
        &mut self,
        branch: &Node,
        true_end: ChainEnd,
        false_end: ChainEnd,
        steps: &mut Vec<Step>,
    ) -> Result<ChainEnd, GraphError> {
        match (true_end, false_end) {
            (ChainEnd::Done, ChainEnd::Done) => Ok(ChainEnd::Done),
            (ChainEnd::AtMerge(a), ChainEnd::AtMerge(b)) if a == b => {
                self.resume_after_merge(a, steps)
            }
            (ChainEnd::AtMerge(_), ChainEnd::AtMerge(_)) => {
                Err(GraphError::InvalidControlFlow {
                    node: branch.name.clone(),
                    reason: "branch arms rejoin at different merges".to_string(),
                })
            }
            (ChainEnd::AtMerge(merge), ChainEnd::Done)
            | (ChainEnd::Done, ChainEnd::AtMerge(merge)) => {
                Err(GraphError::InvalidControlFlow {
                    node: self.node_name(merge),
                    reason: "only one stage path reaches the merge".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pass, valid, wire};
    use renderpath_graph::{Graph, SocketValue};

    #[test]
    fn test_linear_chain_order() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let a = pass(&mut graph);
        let b = pass(&mut graph);
        wire(&mut graph, begin, "Stage", a, "Stage");
        wire(&mut graph, a, "Stage", b, "Stage");

        let steps = schedule(&valid(&graph)).unwrap();
        assert_eq!(steps, vec![Step::Pass(a), Step::Pass(b)]);
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let a = pass(&mut graph);
        let b = pass(&mut graph);
        wire(&mut graph, begin, "Stage", a, "Stage");
        wire(&mut graph, begin, "Stage", b, "Stage");

        let first = schedule(&valid(&graph)).unwrap();
        let second = schedule(&valid(&graph)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![Step::Pass(a), Step::Pass(b)]);
    }

    #[test]
    fn test_merge_waits_for_both_paths() {
        // Build the same fan-out/merge shape with the two edges into the
        // merge declared in either order; the continuation must come
        // after both chains in both cases.
        for swap in [false, true] {
            let mut graph = Graph::new("path");
            let begin = graph.add(NodeKind::Begin);
            let a = pass(&mut graph);
            let b = pass(&mut graph);
            let merge = graph.add(NodeKind::MergeStages);
            let after = pass(&mut graph);

            wire(&mut graph, begin, "Stage", a, "Stage");
            wire(&mut graph, begin, "Stage", b, "Stage");
            if swap {
                wire(&mut graph, b, "Stage", merge, "Stage 2");
                wire(&mut graph, a, "Stage", merge, "Stage 1");
            } else {
                wire(&mut graph, a, "Stage", merge, "Stage 1");
                wire(&mut graph, b, "Stage", merge, "Stage 2");
            }
            wire(&mut graph, merge, "Stage", after, "Stage");

            let steps = schedule(&valid(&graph)).unwrap();
            assert_eq!(
                steps,
                vec![
                    Step::Merge {
                        left: vec![Step::Pass(a)],
                        right: vec![Step::Pass(b)],
                    },
                    Step::Pass(after),
                ]
            );
        }
    }

    #[test]
    fn test_one_sided_merge_is_invalid() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let merge = graph.add(NodeKind::MergeStages);
        // The second path into the merge hangs off an unreachable node,
        // so it is never produced at schedule time.
        let orphan = pass(&mut graph);
        wire(&mut graph, begin, "Stage", merge, "Stage 1");
        wire(&mut graph, orphan, "Stage", merge, "Stage 2");

        let err = schedule(&valid(&graph)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidControlFlow { .. }));
    }

    #[test]
    fn test_branch_arms_rejoin() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let branch = graph.add(NodeKind::BranchFunction);
        graph
            .node_mut(branch)
            .unwrap()
            .set_input_value("Function", SocketValue::String("use_ssao".into()));
        let t = pass(&mut graph);
        let f = pass(&mut graph);
        let merge = graph.add(NodeKind::MergeStages);
        let after = pass(&mut graph);

        wire(&mut graph, begin, "Stage", branch, "Stage");
        wire(&mut graph, branch, "True", t, "Stage");
        wire(&mut graph, branch, "False", f, "Stage");
        wire(&mut graph, t, "Stage", merge, "Stage 1");
        wire(&mut graph, f, "Stage", merge, "Stage 2");
        wire(&mut graph, merge, "Stage", after, "Stage");

        let steps = schedule(&valid(&graph)).unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Branch {
                    function: "use_ssao".to_string(),
                    true_steps: vec![Step::Pass(t)],
                    false_steps: vec![Step::Pass(f)],
                },
                Step::Pass(after),
            ]
        );
    }

    #[test]
    fn test_loop_stages_range() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let looper = graph.add(NodeKind::LoopStages);
        graph.node_mut(looper).unwrap().set_input_value("From", SocketValue::Int(0));
        graph.node_mut(looper).unwrap().set_input_value("To", SocketValue::Int(3));
        let body = pass(&mut graph);
        let after = pass(&mut graph);

        wire(&mut graph, begin, "Stage", looper, "Stage");
        wire(&mut graph, looper, "Loop", body, "Stage");
        wire(&mut graph, looper, "Complete", after, "Stage");

        let steps = schedule(&valid(&graph)).unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Loop {
                    count: LoopCount::Fixed { from: 0, to: 3 },
                    body: vec![Step::Pass(body)],
                },
                Step::Pass(after),
            ]
        );
        let Step::Loop { count, .. } = &steps[0] else {
            panic!("expected loop step");
        };
        assert_eq!(count.iterations(), Some(3));
    }

    #[test]
    fn test_empty_loop_range() {
        assert_eq!(LoopCount::Fixed { from: 2, to: 2 }.iterations(), Some(0));
    }

    #[test]
    fn test_reversed_loop_range_is_invalid() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let looper = graph.add(NodeKind::LoopStages);
        graph.node_mut(looper).unwrap().set_input_value("From", SocketValue::Int(3));
        graph.node_mut(looper).unwrap().set_input_value("To", SocketValue::Int(1));
        wire(&mut graph, begin, "Stage", looper, "Stage");

        let err = schedule(&valid(&graph)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidControlFlow { .. }));
    }

    #[test]
    fn test_loop_lamps_defers_count() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let lamps = graph.add(NodeKind::LoopLamps);
        let body = pass(&mut graph);

        wire(&mut graph, begin, "Stage", lamps, "Stage");
        wire(&mut graph, lamps, "Loop", body, "Stage");

        let steps = schedule(&valid(&graph)).unwrap();
        assert_eq!(
            steps,
            vec![Step::Loop {
                count: LoopCount::Lamps,
                body: vec![Step::Pass(body)],
            }]
        );
        assert_eq!(LoopCount::Lamps.iterations(), None);
    }

    #[test]
    fn test_stereo_body() {
        let mut graph = Graph::new("path");
        let begin = graph.add(NodeKind::Begin);
        let stereo = graph.add(NodeKind::DrawStereo);
        let eye = pass(&mut graph);
        let after = pass(&mut graph);

        wire(&mut graph, begin, "Stage", stereo, "Stage");
        wire(&mut graph, stereo, "Per Eye", eye, "Stage");
        wire(&mut graph, stereo, "Complete", after, "Stage");

        let steps = schedule(&valid(&graph)).unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Stereo {
                    body: vec![Step::Pass(eye)],
                },
                Step::Pass(after),
            ]
        );
    }
}
