/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The function-wide control dependence graph: one node per block, control
//! dependence edges, and the regions blocks are grouped into.  Each node
//! also carries the dependence summary of its block, used while building an
//! inter-block dependence graph.

use smallvec::SmallVec;
use std::fmt;

use crate::data_structures::{
  BlockIx, CdgEdgeIx, Map, NodeIx, Reg, RegionIx, Set, TypedIxVec,
};

/// Condition value of a control dependence that no branch outcome selects,
/// such as one created by an exception edge.
pub const NO_COND: i32 = -1;

//=============================================================================
// Dependence summaries

fn add_unique(v: &mut SmallVec<[NodeIx; 2]>, n: NodeIx) {
  if !v.contains(&n) {
    v.push(n);
  }
}

fn merge_list(into: &mut Vec<NodeIx>, from: &[NodeIx]) {
  for n in from {
    if !into.contains(n) {
      into.push(*n);
    }
  }
}

fn merge_set(into: &mut SmallVec<[NodeIx; 2]>, from: &SmallVec<[NodeIx; 2]>) {
  for n in from.iter() {
    add_unique(into, *n);
  }
}

/// What the dependence rules need to know about the nodes built so far.
/// Within a block there is one latest definition per register; where
/// control flow merges inside a region there can be one per incoming path.
#[derive(Clone, Debug, Default)]
pub struct DepSummary {
  pub latest_def: Map<Reg, SmallVec<[NodeIx; 2]>>,
  pub pending_uses: Map<Reg, SmallVec<[NodeIx; 4]>>,

  pub stack_defs: Vec<NodeIx>,
  pub stack_uses: Vec<NodeIx>,
  pub heap_defs: Vec<NodeIx>,
  pub heap_uses: Vec<NodeIx>,

  /// Instructions defining a register live into an exception handler.
  pub ambiguous: Vec<NodeIx>,
  pub may_throws: Vec<NodeIx>,

  pub last_call: SmallVec<[NodeIx; 2]>,
  pub last_membar: SmallVec<[NodeIx; 2]>,
  pub last_frame_def: SmallVec<[NodeIx; 2]>,
  /// Stores setting up stack arguments since the last call.
  pub stack_arg_setups: Vec<NodeIx>,

  /// The latest separator or barrier-like empty node.  Every later node
  /// depends on it.
  pub last_separator: SmallVec<[NodeIx; 2]>,

  /// Nodes since `last_separator`.
  pub window: Vec<NodeIx>,

  /// Real nodes added since the last separator.
  pub node_sum: u32,

  /// Nodes of this block, in program order.
  pub nodes: Vec<NodeIx>,
}

impl DepSummary {
  pub fn new() -> Self {
    Self::default()
  }

  /// The state at a control flow merge: anything reaching along any of the
  /// incoming paths.  `nodes` is per block and is not merged.
  pub fn merge(&mut self, other: &DepSummary) {
    for (reg, defs) in other.latest_def.iter() {
      merge_set(self.latest_def.entry(*reg).or_default(), defs);
    }
    for (reg, uses) in other.pending_uses.iter() {
      let mine = self.pending_uses.entry(*reg).or_default();
      for u in uses.iter() {
        if !mine.contains(u) {
          mine.push(*u);
        }
      }
    }
    merge_list(&mut self.stack_defs, &other.stack_defs);
    merge_list(&mut self.stack_uses, &other.stack_uses);
    merge_list(&mut self.heap_defs, &other.heap_defs);
    merge_list(&mut self.heap_uses, &other.heap_uses);
    merge_list(&mut self.ambiguous, &other.ambiguous);
    merge_list(&mut self.may_throws, &other.may_throws);
    merge_set(&mut self.last_call, &other.last_call);
    merge_set(&mut self.last_membar, &other.last_membar);
    merge_set(&mut self.last_frame_def, &other.last_frame_def);
    merge_list(&mut self.stack_arg_setups, &other.stack_arg_setups);
    merge_set(&mut self.last_separator, &other.last_separator);
    merge_list(&mut self.window, &other.window);
    self.node_sum = self.node_sum.max(other.node_sum);
  }

  /// Everything before a full ordering point is reachable through it, so
  /// the lists can start afresh.
  pub fn clear_for_barrier(&mut self, barrier: NodeIx) {
    self.stack_defs.clear();
    self.stack_uses.clear();
    self.heap_defs.clear();
    self.heap_uses.clear();
    self.ambiguous.clear();
    self.may_throws.clear();
    self.stack_arg_setups.clear();
    self.window.clear();
    self.last_separator.clear();
    self.last_separator.push(barrier);
    self.node_sum = 0;
  }
}

//=============================================================================
// The control dependence graph

#[derive(Clone, Debug)]
pub struct CdgEdge {
  pub from: BlockIx,
  pub to: BlockIx,
  /// Which outcome of `from`'s branch creates the dependence, or NO_COND.
  pub cond: i32,
}

#[derive(Clone)]
pub struct CdgNode {
  pub block: BlockIx,
  pub region: Option<RegionIx>,
  /// Control dependence edges ending at this node.
  pub in_edges: Vec<CdgEdgeIx>,
  /// Control dependence edges starting at this node.
  pub out_edges: Vec<CdgEdgeIx>,
  /// Earlier members of the same region reaching this block without
  /// passing through another member.
  pub region_preds: Vec<BlockIx>,
  /// Blocks outside the region on paths from `region_preds` to this block.
  pub between: Vec<BlockIx>,
  /// Dependence summary at the end of this block, while its region's graph
  /// is being built.
  pub summary: Option<DepSummary>,
}

impl CdgNode {
  pub fn new(block: BlockIx) -> Self {
    Self {
      block,
      region: None,
      in_edges: Vec::new(),
      out_edges: Vec::new(),
      region_preds: Vec::new(),
      between: Vec::new(),
      summary: None,
    }
  }
}

#[derive(Clone)]
pub struct CdgRegion {
  pub id: RegionIx,
  /// Members in topological order; the first is the root.
  pub members: Vec<BlockIx>,
  /// The shared control dependence set, sorted.
  pub cd_set: Vec<(BlockIx, i32)>,
  pub loop_header: Option<BlockIx>,
}

impl CdgRegion {
  pub fn root(&self) -> BlockIx {
    self.members[0]
  }

  pub fn is_single_block(&self) -> bool {
    self.members.len() == 1
  }

  pub fn contains(&self, bix: BlockIx) -> bool {
    self.members.contains(&bix)
  }

  pub fn position(&self, bix: BlockIx) -> Option<usize> {
    self.members.iter().position(|b| *b == bix)
  }
}

impl fmt::Debug for CdgRegion {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?} {:?} cd={:?}", self.id, self.members, self.cd_set)?;
    if let Some(hdr) = self.loop_header {
      write!(fmt, " loop={:?}", hdr)?;
    }
    Ok(())
  }
}

pub struct Fcdg {
  pub nodes: TypedIxVec<BlockIx, CdgNode>,
  pub edges: TypedIxVec<CdgEdgeIx, CdgEdge>,
  pub regions: TypedIxVec<RegionIx, CdgRegion>,
}

impl Fcdg {
  pub fn region_of(&self, bix: BlockIx) -> Option<RegionIx> {
    self.nodes[bix].region
  }

  pub fn region(&self, rix: RegionIx) -> &CdgRegion {
    &self.regions[rix]
  }

  /// The control dependences of a block, sorted.
  pub fn cd_set(&self, bix: BlockIx) -> Vec<(BlockIx, i32)> {
    let mut set: Vec<(BlockIx, i32)> = self.nodes[bix]
      .in_edges
      .iter()
      .map(|e| (self.edges[*e].from, self.edges[*e].cond))
      .collect();
    set.sort();
    set.dedup();
    set
  }

  pub fn is_control_dependent(&self, bix: BlockIx, on: BlockIx) -> bool {
    self.nodes[bix].in_edges.iter().any(|e| self.edges[*e].from == on)
  }

  /// Throw away the dependence summaries of a region's members.
  pub fn clear_summaries(&mut self, rix: RegionIx) {
    let members = self.regions[rix].members.clone();
    for bix in members {
      self.nodes[bix].summary = None;
    }
  }

  /// Blocks that belong to some region.
  pub fn covered_blocks(&self) -> Set<BlockIx> {
    let mut set = Set::empty();
    for region in self.regions.iter() {
      for bix in region.members.iter() {
        set.insert(*bix);
      }
    }
    set
  }
}

#[test]
fn summary_merge_collects_every_path() {
  let x1 = Reg::new_real(crate::data_structures::RegClass::I64, 1);
  let mut a = DepSummary::new();
  a.latest_def.entry(x1).or_default().push(NodeIx::new(1));
  a.heap_defs.push(NodeIx::new(1));
  a.node_sum = 3;
  let mut b = DepSummary::new();
  b.latest_def.entry(x1).or_default().push(NodeIx::new(2));
  b.heap_defs.push(NodeIx::new(1));
  b.node_sum = 5;
  a.merge(&b);
  assert_eq!(a.latest_def[&x1].as_slice(), &[NodeIx::new(1), NodeIx::new(2)]);
  assert_eq!(a.heap_defs, vec![NodeIx::new(1)]);
  assert_eq!(a.node_sum, 5);

  a.clear_for_barrier(NodeIx::new(7));
  assert!(a.heap_defs.is_empty());
  assert_eq!(a.last_separator.as_slice(), &[NodeIx::new(7)]);
  // Register state survives a barrier.
  assert_eq!(a.latest_def[&x1].len(), 2);
}
