// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::AstContext;
use crate::defects::DefectKind;
use crate::program_point::ProgramPoint;
use crate::program_state::ProgramState;
use crate::utils;
use crate::value_factory::ValueFactory;
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// Identifies a node of the exploded graph.
pub type NodeId = NodeIndex;

/// A vertex of the exploded graph: a program point paired with an interned
/// state, optionally tagged as a sink with a defect category.
#[derive(Clone, Debug)]
pub struct ExplodedNode {
    pub point: ProgramPoint,
    pub state: Rc<ProgramState>,
    pub state_id: u32,
    pub defect: Option<DefectKind>,
}

impl ExplodedNode {
    pub fn is_sink(&self) -> bool {
        self.defect.is_some()
    }
}

/// The DAG of reached analysis states. Nodes are deduplicated by
/// (program point, interned state id): two predecessors reaching the same
/// pair converge on one node, which is what bounds exploration beyond the
/// block revisit cap.
#[derive(Default)]
pub struct ExplodedGraph {
    graph: DiGraph<ExplodedNode, ()>,
    index: HashMap<(ProgramPoint, u32), NodeId>,
    sink_index: HashMap<(ProgramPoint, u32, DefectKind), NodeId>,
    sinks: Vec<NodeId>,
}

impl std::fmt::Debug for ExplodedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplodedGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl ExplodedGraph {
    pub fn new() -> ExplodedGraph {
        ExplodedGraph::default()
    }

    /// Interns a (point, state) pair: returns the existing node when one
    /// exists, along with whether the node is fresh.
    pub fn get_or_add(
        &mut self,
        point: ProgramPoint,
        state: Rc<ProgramState>,
        state_id: u32,
    ) -> (NodeId, bool) {
        if let Some(id) = self.index.get(&(point, state_id)) {
            return (*id, false);
        }
        let id = self.graph.add_node(ExplodedNode {
            point,
            state,
            state_id,
            defect: None,
        });
        self.index.insert((point, state_id), id);
        (id, true)
    }

    /// Interns a sink. Sinks are kept in their own index, keyed also by the
    /// defect, so a witness never collides with a live node at the same
    /// point and state; that would hand successors to a sink.
    pub fn get_or_add_sink(
        &mut self,
        point: ProgramPoint,
        state: Rc<ProgramState>,
        state_id: u32,
        defect: DefectKind,
    ) -> (NodeId, bool) {
        if let Some(id) = self.sink_index.get(&(point, state_id, defect)) {
            return (*id, false);
        }
        let id = self.graph.add_node(ExplodedNode {
            point,
            state,
            state_id,
            defect: Some(defect),
        });
        self.sink_index.insert((point, state_id, defect), id);
        self.sinks.push(id);
        (id, true)
    }

    pub fn add_edge(&mut self, pred: NodeId, succ: NodeId) {
        if !self.graph.contains_edge(pred, succ) {
            self.graph.add_edge(pred, succ, ());
        }
    }

    /// Tags a node as a sink. Sinks terminate their path: the engine never
    /// generates successors from them.
    pub fn mark_sink(&mut self, id: NodeId, defect: DefectKind) {
        if let Some(node) = self.graph.node_weight_mut(id) {
            if node.defect.is_none() {
                node.defect = Some(defect);
                self.sinks.push(id);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> &ExplodedNode {
        &self.graph[id]
    }

    pub fn lookup(&self, point: ProgramPoint, state_id: u32) -> Option<NodeId> {
        self.index.get(&(point, state_id)).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    pub fn sinks(&self) -> &[NodeId] {
        &self.sinks
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect()
    }

    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .neighbors_directed(id, Direction::Incoming)
            .collect()
    }

    /// The sink nodes grouped by defect category, for consumers that only
    /// care about what was witnessed.
    pub fn defects(&self) -> Vec<(DefectKind, NodeId)> {
        self.sinks
            .iter()
            .filter_map(|id| self.node(*id).defect.map(|d| (d, *id)))
            .sorted()
            .collect()
    }

    /// Retains only the nodes from which a sink is reachable, i.e. the
    /// witness paths. Nodes holding constraints that merely explain a path
    /// are dropped along with everything else off-path; this is a known
    /// limitation of the trimmed export.
    pub fn trim_to_sinks(&self) -> ExplodedGraph {
        let mut retained: HashSet<NodeId> = HashSet::new();
        let mut worklist: VecDeque<NodeId> = self.sinks.iter().copied().collect();
        while let Some(id) = worklist.pop_front() {
            if retained.insert(id) {
                for pred in self.graph.neighbors_directed(id, Direction::Incoming) {
                    worklist.push_back(pred);
                }
            }
        }
        let mut trimmed = ExplodedGraph::new();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for id in self.graph.node_indices().sorted() {
            if !retained.contains(&id) {
                continue;
            }
            let node = &self.graph[id];
            let (new_id, _) = trimmed.get_or_add(node.point, node.state.clone(), node.state_id);
            if let Some(defect) = node.defect {
                trimmed.mark_sink(new_id, defect);
            }
            remap.insert(id, new_id);
        }
        for edge in self.graph.edge_references() {
            if let (Some(a), Some(b)) = (remap.get(&edge.source()), remap.get(&edge.target())) {
                trimmed.add_edge(*a, *b);
            }
        }
        trimmed
    }

    /// A compact rendering of a state for graph labels.
    fn describe_state(
        &self,
        state: &ProgramState,
        factory: &ValueFactory,
        ast: &AstContext,
    ) -> String {
        let mut parts: Vec<String> = vec![];
        for (region, val) in state
            .store
            .iter_bindings()
            .sorted_by_key(|(region, _)| region.0)
        {
            parts.push(format!(
                "{} = {}",
                factory.regions.describe(*region, ast),
                factory.describe(val, ast)
            ));
        }
        for (sym, facts) in state.constraints.iter().sorted_by_key(|(sym, _)| sym.0) {
            if let Some(eq) = facts.equality() {
                parts.push(format!("sym{} == {}", sym.0, factory.basic_values.int(eq)));
            }
            for ne in facts.disequalities().sorted() {
                parts.push(format!("sym{} != {}", sym.0, factory.basic_values.int(ne)));
            }
            if let Some((lo, hi)) = facts.range() {
                if lo > i128::MIN || hi < i128::MAX {
                    parts.push(format!("sym{} in [{}, {}]", sym.0, lo, hi));
                }
            }
        }
        parts.join("; ")
    }

    /// The textual visualization export: one `node` line per node with the
    /// point and state in the label, one `edge` line per transition; sinks
    /// are styled distinctly.
    pub fn to_dot(&self, factory: &ValueFactory, ast: &AstContext) -> String {
        let mut out = String::new();
        for id in self.graph.node_indices().sorted() {
            let node = &self.graph[id];
            let label = utils::escape_label(&format!(
                "{}\n{}",
                node.point,
                self.describe_state(&node.state, factory, ast)
            ));
            match node.defect {
                Some(defect) => out.push_str(&format!(
                    "node {} [label=\"{}\", style=filled, color=red, sink=\"{}\"]\n",
                    id.index(),
                    label,
                    defect
                )),
                None => out.push_str(&format!("node {} [label=\"{}\"]\n", id.index(), label)),
            }
        }
        for edge in self
            .graph
            .edge_references()
            .sorted_by_key(|e| (e.source(), e.target()))
        {
            out.push_str(&format!(
                "edge {} -> {}\n",
                edge.source().index(),
                edge.target().index()
            ));
        }
        out
    }

    /// A JSON dump of the graph for downstream tooling.
    pub fn to_json(&self, factory: &ValueFactory, ast: &AstContext) -> String {
        #[derive(Serialize)]
        struct NodeExport {
            id: usize,
            point: String,
            state_id: u32,
            state: String,
            sink: Option<&'static str>,
        }
        #[derive(Serialize)]
        struct GraphExport {
            nodes: Vec<NodeExport>,
            edges: Vec<(usize, usize)>,
        }
        let nodes = self
            .graph
            .node_indices()
            .sorted()
            .map(|id| {
                let node = &self.graph[id];
                NodeExport {
                    id: id.index(),
                    point: node.point.to_string(),
                    state_id: node.state_id,
                    state: self.describe_state(&node.state, factory, ast),
                    sink: node.defect.map(DefectKind::as_str),
                }
            })
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index()))
            .sorted()
            .collect();
        serde_json::to_string_pretty(&GraphExport { nodes, edges })
            .unwrap_or_else(|_| "{}".to_owned())
    }
}
