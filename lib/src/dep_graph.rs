/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The dependence graph: nodes (one per real instruction, plus synthetic
//! separator and empty nodes) and typed, latency-carrying edges, held in
//! index-addressed arenas scoped to one region.

use log::{debug, trace};
use smallvec::SmallVec;
use std::fmt;

use crate::data_structures::{
  BlockIx, EdgeIx, InstIx, Map, NodeIx, PerClass, TypedIxVec,
};
use crate::interface::{InsnDesc, InsnProps, InstRegUses, MemOperand, OpClass};

//=============================================================================
// Dependence vocabulary

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepType {
  /// Write, then read.
  True,
  /// Write, then write.
  Output,
  /// Read, then write.
  Anti,
  /// Branch, return and call ordering.
  Control,
  /// Memory ordering that isn't a plain register-like hazard: accesses
  /// against calls, inline asm, ambiguous instructions.
  MemAccess,
  /// Ordering against a memory barrier or an atomic.
  Membar,
  /// Ordering against an instruction that may raise an exception.
  Throw,
  /// Ordering against a separator or an empty node.
  Separator,
  /// Not a dependence.  Never stored in a graph.
  None,
}

impl DepType {
  /// Can a True edge replace this one in place?
  fn is_weaker_than_true(self) -> bool {
    match self {
      DepType::Anti | DepType::Output => true,
      _ => false,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
  /// A real instruction.
  Normal,
  /// Bounds the graph: everything before it precedes it, everything after
  /// it follows it.
  Separator,
  /// Stands for blocks outside the region that lie between two region
  /// members.
  Empty,
}

/// Scheduling states, in the only order a node may pass through them
/// during one scheduling pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScheduleState {
  Normal,
  Candidate,
  Waiting,
  Ready,
  Scheduled,
}

#[derive(Clone, Debug)]
pub struct DepLink {
  pub from: NodeIx,
  pub to: NodeIx,
  pub ty: DepType,
  pub latency: u32,
}

/// Register pressure bookkeeping for one node, present only when
/// scheduling for pressure.
#[derive(Clone, Debug, Default)]
pub struct RegPressure {
  /// Net change of live registers per class if the node were scheduled now.
  pub pressure_delta: PerClass<i32>,
  /// Defined registers that are never read afterwards.
  pub dead_defs: u32,
  /// Number of calls on the longest path to this node.
  pub call_count: u32,
  /// Longest path from a root.
  pub depth: u32,
  /// Propagated priority; higher is more urgent.
  pub priority: u32,
  /// Edges from the node whose ancestors last raised `priority`.
  pub proximity: u32,
  /// Reads or writes a real register.
  pub has_fixed_reg: bool,
}

#[derive(Clone)]
pub struct DepNode {
  pub node_type: NodeType,
  /// The instruction, for Normal nodes.
  pub insn: Option<InstIx>,
  /// The block the node comes from.
  pub block: BlockIx,
  pub class: OpClass,
  pub props: InsnProps,
  pub regs: InstRegUses,
  pub mem: Option<MemOperand>,
  /// Node defining the memory operand's base register, if in the graph.
  pub base_def: Option<NodeIx>,
  pub index_def: Option<NodeIx>,
  /// Alias-analysis objects the access may touch.
  pub alias_objects: Option<SmallVec<[u32; 2]>>,

  pub preds: SmallVec<[EdgeIx; 4]>,
  pub succs: SmallVec<[EdgeIx; 4]>,

  // Scheduling state.
  pub e_start: u32,
  pub l_start: u32,
  pub delay: u32,
  pub sched_cycle: u32,
  /// Predecessors not scheduled yet.
  pub unresolved_preds: u32,
  state: ScheduleState,

  // Pseudo instructions that travel with this node.
  pub comments: SmallVec<[InstIx; 1]>,
  pub cfis: SmallVec<[InstIx; 1]>,
  pub clinits: SmallVec<[InstIx; 1]>,

  /// The other half of a combinable load or store pair.
  pub pair: Option<NodeIx>,

  pub reg_pressure: Option<RegPressure>,
}

impl DepNode {
  fn new(node_type: NodeType, block: BlockIx) -> Self {
    Self {
      node_type,
      insn: None,
      block,
      class: OpClass::Nop,
      props: InsnProps::default(),
      regs: InstRegUses::default(),
      mem: None,
      base_def: None,
      index_def: None,
      alias_objects: None,
      preds: SmallVec::new(),
      succs: SmallVec::new(),
      e_start: 0,
      l_start: 0,
      delay: 0,
      sched_cycle: 0,
      unresolved_preds: 0,
      state: ScheduleState::Normal,
      comments: SmallVec::new(),
      cfis: SmallVec::new(),
      clinits: SmallVec::new(),
      pair: None,
      reg_pressure: None,
    }
  }

  pub fn new_insn(
    iix: InstIx, block: BlockIx, desc: &InsnDesc, regs: InstRegUses,
  ) -> Self {
    let mut node = DepNode::new(NodeType::Normal, block);
    node.insn = Some(iix);
    node.class = desc.class;
    node.props = desc.props;
    node.regs = regs;
    node.mem = desc.mem.clone();
    node.alias_objects = desc.alias_objects.clone();
    node
  }

  pub fn new_separator(block: BlockIx) -> Self {
    DepNode::new(NodeType::Separator, block)
  }

  pub fn new_empty(block: BlockIx, regs: InstRegUses) -> Self {
    let mut node = DepNode::new(NodeType::Empty, block);
    node.regs = regs;
    node
  }

  pub fn is_real(&self) -> bool {
    self.node_type == NodeType::Normal
  }

  pub fn state(&self) -> ScheduleState {
    self.state
  }

  /// Move to `state`, which must not come before the current one.
  pub fn set_state(&mut self, state: ScheduleState) {
    assert!(
      state >= self.state,
      "DepNode::set_state: {:?} -> {:?} goes backwards",
      self.state,
      state
    );
    self.state = state;
  }

  /// Whether this node reads or writes a real register.
  pub fn has_fixed_reg(&self) -> bool {
    self.regs.used.iter().chain(self.regs.defined.iter()).any(|r| r.is_real())
  }
}

//=============================================================================
// The graph

pub struct DepGraph {
  pub nodes: TypedIxVec<NodeIx, DepNode>,
  pub edges: TypedIxVec<EdgeIx, DepLink>,
  /// Pseudo instructions with no real instruction to bind to: those before
  /// the first one of a block, and those after the last one.
  pub leading: Map<BlockIx, Vec<InstIx>>,
  pub trailing: Map<BlockIx, Vec<InstIx>>,
  edge_lookup: Map<(NodeIx, NodeIx), EdgeIx>,
  insn_to_node: Map<InstIx, NodeIx>,
}

impl DepGraph {
  pub fn new() -> Self {
    Self {
      nodes: TypedIxVec::new(),
      edges: TypedIxVec::new(),
      leading: Map::default(),
      trailing: Map::default(),
      edge_lookup: Map::default(),
      insn_to_node: Map::default(),
    }
  }

  pub fn add_node(&mut self, node: DepNode) -> NodeIx {
    let nix = NodeIx::new(self.nodes.len());
    if let Some(iix) = node.insn {
      let prev = self.insn_to_node.insert(iix, nix);
      assert!(prev.is_none(), "DepGraph::add_node: {:?} added twice", iix);
    }
    self.nodes.push(node);
    nix
  }

  pub fn num_nodes(&self) -> u32 {
    self.nodes.len()
  }

  pub fn num_edges(&self) -> u32 {
    self.edges.len()
  }

  pub fn find_edge(&self, from: NodeIx, to: NodeIx) -> Option<EdgeIx> {
    self.edge_lookup.get(&(from, to)).cloned()
  }

  /// Add a dependence from `from` to `to`.  Nodes are created in program
  /// order and edges always point forwards, so the graph stays acyclic.
  /// At most one edge links two nodes: a True dependence replaces an Anti or
  /// Output one, and otherwise the larger latency wins.
  pub fn add_dep(
    &mut self, from: NodeIx, to: NodeIx, ty: DepType, latency: u32,
  ) -> EdgeIx {
    assert!(ty != DepType::None, "DepGraph::add_dep: DepType::None");
    assert!(from < to, "DepGraph::add_dep: backwards edge {:?} -> {:?}", from, to);
    if let Some(eix) = self.find_edge(from, to) {
      let edge = &mut self.edges[eix];
      if ty == DepType::True && edge.ty.is_weaker_than_true() {
        trace!("  upgrade {:?}: {:?} -> True", eix, edge.ty);
        edge.ty = DepType::True;
        edge.latency = latency;
      } else if latency > edge.latency {
        edge.latency = latency;
      }
      return eix;
    }
    let eix = EdgeIx::new(self.edges.len());
    trace!("  dep {:?}: {:?} -> {:?} {:?} lat {}", eix, from, to, ty, latency);
    self.edges.push(DepLink { from, to, ty, latency });
    self.edge_lookup.insert((from, to), eix);
    self.nodes[from].succs.push(eix);
    self.nodes[to].preds.push(eix);
    eix
  }

  pub fn edge(&self, eix: EdgeIx) -> &DepLink {
    &self.edges[eix]
  }

  /// The dependence type between two nodes, or `DepType::None`.
  pub fn dep_type(&self, from: NodeIx, to: NodeIx) -> DepType {
    match self.find_edge(from, to) {
      Some(eix) => self.edges[eix].ty,
      None => DepType::None,
    }
  }

  pub fn pred_nodes<'a>(
    &'a self, nix: NodeIx,
  ) -> impl Iterator<Item = &'a DepLink> + 'a {
    self.nodes[nix].preds.iter().map(move |e| &self.edges[*e])
  }

  pub fn succ_nodes<'a>(
    &'a self, nix: NodeIx,
  ) -> impl Iterator<Item = &'a DepLink> + 'a {
    self.nodes[nix].succs.iter().map(move |e| &self.edges[*e])
  }

  /// Forget every scheduling decision, so that another pass can run.
  pub fn reset_schedule_state(&mut self) {
    for node in self.nodes.iter_mut() {
      node.state = ScheduleState::Normal;
      node.e_start = 0;
      node.l_start = 0;
      node.sched_cycle = 0;
      node.unresolved_preds = node.preds.len() as u32;
    }
  }

  pub fn dump(&self, title: &str) {
    debug!("DepGraph {}: {} nodes, {} edges", title, self.num_nodes(), self.num_edges());
    for nix in self.nodes.range() {
      trace!("  {:?} {:?}", nix, self.nodes[nix]);
    }
  }
}

impl fmt::Debug for DepNode {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self.node_type {
      NodeType::Normal => write!(
        fmt,
        "{:?} {:?} in {:?} delay={} state={:?} npreds={} nsuccs={}",
        self.insn.unwrap_or(InstIx::max_value()),
        self.class,
        self.block,
        self.delay,
        self.state,
        self.preds.len(),
        self.succs.len()
      ),
      _ => write!(
        fmt,
        "{:?} in {:?} npreds={} nsuccs={}",
        self.node_type,
        self.block,
        self.preds.len(),
        self.succs.len()
      ),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn graph(n: u32) -> DepGraph {
    let mut g = DepGraph::new();
    for i in 0..n {
      g.add_node(DepNode::new_insn(
        InstIx::new(i),
        BlockIx::new(0),
        &InsnDesc::new(OpClass::Alu),
        InstRegUses::default(),
      ));
    }
    g
  }

  #[test]
  fn upgrade_in_place() {
    let mut g = graph(2);
    let (a, b) = (NodeIx::new(0), NodeIx::new(1));
    let e1 = g.add_dep(a, b, DepType::Anti, 0);
    let e2 = g.add_dep(a, b, DepType::True, 3);
    assert_eq!(e1, e2);
    assert_eq!(g.num_edges(), 1);
    assert_eq!(g.edge(e1).ty, DepType::True);
    assert_eq!(g.edge(e1).latency, 3);
    assert_eq!(g.nodes[a].succs.len(), 1);
    assert_eq!(g.nodes[b].preds.len(), 1);
  }

  #[test]
  fn no_downgrade() {
    let mut g = graph(2);
    let (a, b) = (NodeIx::new(0), NodeIx::new(1));
    g.add_dep(a, b, DepType::True, 3);
    g.add_dep(a, b, DepType::Output, 1);
    assert_eq!(g.dep_type(a, b), DepType::True);
    assert_eq!(g.edges[EdgeIx::new(0)].latency, 3);
    // Not a weaker register hazard: the type stays, the latency grows.
    let c = NodeIx::new(1);
    let mut g2 = graph(2);
    g2.add_dep(a, c, DepType::Control, 0);
    g2.add_dep(a, c, DepType::True, 2);
    assert_eq!(g2.dep_type(a, c), DepType::Control);
    assert_eq!(g2.edges[EdgeIx::new(0)].latency, 2);
  }

  #[test]
  #[should_panic]
  fn none_is_not_a_dependence() {
    let mut g = graph(2);
    g.add_dep(NodeIx::new(0), NodeIx::new(1), DepType::None, 0);
  }

  #[test]
  #[should_panic]
  fn edges_point_forwards() {
    let mut g = graph(2);
    g.add_dep(NodeIx::new(1), NodeIx::new(0), DepType::True, 1);
  }

  #[test]
  fn state_moves_forwards() {
    let mut g = graph(1);
    let n = NodeIx::new(0);
    g.nodes[n].set_state(ScheduleState::Candidate);
    g.nodes[n].set_state(ScheduleState::Ready);
    g.nodes[n].set_state(ScheduleState::Scheduled);
    assert_eq!(g.nodes[n].state(), ScheduleState::Scheduled);
    g.reset_schedule_state();
    assert_eq!(g.nodes[n].state(), ScheduleState::Normal);
  }

  #[test]
  #[should_panic]
  fn state_cannot_go_back() {
    let mut g = graph(1);
    let n = NodeIx::new(0);
    g.nodes[n].set_state(ScheduleState::Scheduled);
    g.nodes[n].set_state(ScheduleState::Candidate);
  }
}
