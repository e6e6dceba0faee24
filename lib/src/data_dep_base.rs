/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The dependence rules shared by the intra-block and inter-block graph
//! builders.  For each new node the rules run in a fixed order: registers,
//! memory, control, exceptions, calls, barriers.  They read and update a
//! `DepSummary` describing everything built so far.

use log::trace;
use smallvec::{smallvec, SmallVec};

use crate::cdg::DepSummary;
use crate::data_structures::{BlockIx, InstIx, NodeIx, Reg, Set};
use crate::dep_graph::{DepGraph, DepNode, DepType};
use crate::interface::{
  AddrMode, InsnDesc, InstRegUses, MemAccess, MemRegion, MemoryModel,
};
use crate::machine::MachineDesc;

fn push_unique(v: &mut SmallVec<[Reg; 8]>, r: Reg) {
  if !v.contains(&r) {
    v.push(r);
  }
}

/// The register a load writes or a store reads.
pub fn data_reg(node: &DepNode) -> Option<Reg> {
  let op = node.mem.as_ref()?;
  if op.is_load() {
    node.regs.defined.first().cloned()
  } else {
    node
      .regs
      .used
      .iter()
      .find(|r| Some(**r) != op.base && Some(**r) != op.index)
      .cloned()
  }
}

/// The memory model's view of a node's access.
pub fn mem_access(node: &DepNode) -> Option<MemAccess> {
  node.mem.as_ref().map(|op| MemAccess {
    op,
    base_def: node.base_def,
    index_def: node.index_def,
    data: data_reg(node),
  })
}

pub struct RuleEngine<'a> {
  pub machine: &'a MachineDesc,
  pub mem_model: &'a dyn MemoryModel,
  /// Real nodes between separators.  Zero means no separators.
  pub separator_window: u32,
}

impl<'a> RuleEngine<'a> {
  pub fn new(
    machine: &'a MachineDesc, mem_model: &'a dyn MemoryModel,
    separator_window: u32,
  ) -> Self {
    Self { machine, mem_model, separator_window }
  }

  fn add_deps(&self, g: &mut DepGraph, deps: Vec<(NodeIx, DepType)>, to: NodeIx) {
    for (from, ty) in deps {
      if from == to {
        continue;
      }
      let latency = match ty {
        DepType::True => self.machine.latency(g.nodes[from].class),
        DepType::Output => 1,
        _ => 0,
      };
      g.add_dep(from, to, ty, latency);
    }
  }

  // Edges from a full ordering point are typed after what it is.
  fn ordering_type(g: &DepGraph, barrier: NodeIx) -> DepType {
    if g.nodes[barrier].is_real() {
      DepType::Membar
    } else {
      DepType::Separator
    }
  }

  fn add_from_separators(&self, g: &mut DepGraph, st: &DepSummary, nix: NodeIx) {
    let deps = st
      .last_separator
      .iter()
      .map(|s| (*s, Self::ordering_type(g, *s)))
      .collect();
    self.add_deps(g, deps, nix);
  }

  // Make `nix` follow everything in the window.  Depending on the nodes
  // with no successors is enough; the rest reach one of them.
  fn control_all(&self, g: &mut DepGraph, st: &DepSummary, nix: NodeIx, ty: DepType) {
    let deps = st
      .window
      .iter()
      .filter(|w| **w != nix && g.nodes[**w].succs.is_empty())
      .map(|w| (*w, ty))
      .collect();
    self.add_deps(g, deps, nix);
  }

  // The registers the rules see: calls read and write every caller-saved
  // register, and inline asm reads and writes everything it mentions.
  fn effective_regs(
    &self, node: &DepNode, clobbers: &[Reg],
  ) -> (SmallVec<[Reg; 8]>, SmallVec<[Reg; 8]>) {
    let mut uses: SmallVec<[Reg; 8]> = SmallVec::new();
    let mut defs: SmallVec<[Reg; 8]> = SmallVec::new();
    for r in node.regs.used.iter() {
      push_unique(&mut uses, *r);
    }
    for r in node.regs.defined.iter() {
      push_unique(&mut defs, *r);
    }
    if node.props.is_call {
      for r in self.mem_model.caller_saved_regs() {
        push_unique(&mut uses, *r);
        push_unique(&mut defs, *r);
      }
    }
    if node.props.is_inline_asm {
      for r in node.regs.defined.iter().chain(clobbers.iter()) {
        push_unique(&mut uses, *r);
      }
      for r in clobbers {
        push_unique(&mut defs, *r);
      }
    }
    (uses, defs)
  }

  //---------------------------------------------------------------------------
  // Registers

  fn register_rules(
    &self, g: &mut DepGraph, st: &mut DepSummary, nix: NodeIx, uses: &[Reg],
    defs: &[Reg],
  ) {
    // Forwarding into a store only reaches the value it writes, not its
    // address.
    let is_store = g.nodes[nix].mem.as_ref().map_or(false, |op| op.is_store());
    let data = data_reg(&g.nodes[nix]);
    for u in uses {
      if let Some(ds) = st.latest_def.get(u) {
        for d in ds.iter() {
          if *d == nix {
            continue;
          }
          let (from_class, to_class) = (g.nodes[*d].class, g.nodes[nix].class);
          let latency = if is_store && data != Some(*u) {
            self.machine.latency(from_class)
          } else {
            self.machine.true_latency(from_class, to_class)
          };
          g.add_dep(*d, nix, DepType::True, latency);
        }
      }
    }
    let mut deps = Vec::new();
    for r in defs {
      if let Some(us) = st.pending_uses.get(r) {
        for u in us.iter() {
          deps.push((*u, DepType::Anti));
        }
      }
      if let Some(ds) = st.latest_def.get(r) {
        for d in ds.iter() {
          deps.push((*d, DepType::Output));
        }
      }
    }
    self.add_deps(g, deps, nix);

    for u in uses {
      let pending = st.pending_uses.entry(*u).or_default();
      if !pending.contains(&nix) {
        pending.push(nix);
      }
    }
    for r in defs {
      st.latest_def.insert(*r, smallvec![nix]);
      st.pending_uses.remove(r);
    }
  }

  //---------------------------------------------------------------------------
  // Memory

  // The dependence an earlier node `p` in a memory list imposes on `x`, if
  // any.  Calls and asm in the lists have no operand and conflict with
  // everything.
  fn mem_conflict(&self, g: &DepGraph, p: NodeIx, x: NodeIx) -> Option<DepType> {
    let (pn, xn) = (&g.nodes[p], &g.nodes[x]);
    let xop = xn.mem.as_ref()?;
    let pop = match pn.mem.as_ref() {
      Some(op) => op,
      None => return Some(DepType::MemAccess),
    };
    if pop.is_load() && xop.is_load() {
      return None;
    }
    if pop.independent || xop.independent || pop.callee_save != xop.callee_save
    {
      return None;
    }
    if let (Some(a), Some(b)) = (pop.symbol, xop.symbol) {
      if a != b {
        return None;
      }
    }
    if let (Some(a), Some(b)) = (&pn.alias_objects, &xn.alias_objects) {
      if !a.iter().any(|o| b.contains(o)) {
        return None;
      }
    }
    let (pa, xa) = (mem_access(pn)?, mem_access(xn)?);
    if !self.mem_model.may_overlap(&pa, &xa) {
      return None;
    }
    Some(match (pop.is_store(), xop.is_store()) {
      (true, false) => DepType::True,
      (false, true) => DepType::Anti,
      _ => DepType::Output,
    })
  }

  fn mem_rules(&self, g: &mut DepGraph, st: &mut DepSummary, nix: NodeIx) {
    let (region, is_store, independent) = match g.nodes[nix].mem.as_ref() {
      Some(op) => {
        if op.mode == AddrMode::Unresolved {
          panic!("mem_rules: unresolved memory operand at {:?}", g.nodes[nix].insn);
        }
        (op.region, op.is_store(), op.independent)
      }
      None => return,
    };
    if independent {
      return;
    }
    let (defs, uses) = match region {
      MemRegion::Stack => (&st.stack_defs, &st.stack_uses),
      MemRegion::Heap => (&st.heap_defs, &st.heap_uses),
    };
    let mut deps = Vec::new();
    for p in defs.iter() {
      if let Some(ty) = self.mem_conflict(g, *p, nix) {
        deps.push((*p, ty));
      }
    }
    if is_store {
      for p in uses.iter() {
        if let Some(ty) = self.mem_conflict(g, *p, nix) {
          deps.push((*p, ty));
        }
      }
    }
    self.add_deps(g, deps, nix);

    match (region, is_store) {
      (MemRegion::Stack, true) => st.stack_defs.push(nix),
      (MemRegion::Stack, false) => st.stack_uses.push(nix),
      (MemRegion::Heap, true) => st.heap_defs.push(nix),
      (MemRegion::Heap, false) => st.heap_uses.push(nix),
    }
    let setup = match g.nodes[nix].mem.as_ref() {
      Some(op) => self.mem_model.is_stack_arg_setup(op),
      None => false,
    };
    if setup {
      st.stack_arg_setups.push(nix);
    }
  }

  //---------------------------------------------------------------------------
  // Exceptions

  fn throw_rules(
    &self, g: &mut DepGraph, st: &mut DepSummary, nix: NodeIx, defs: &[Reg],
    eh_live: &Set<Reg>,
  ) {
    let node = &g.nodes[nix];
    let may_throw = node.props.may_throw;
    let ambiguous = defs.iter().any(|r| eh_live.contains(*r));
    let is_store = node.mem.as_ref().map_or(false, |op| op.is_store());
    let frame_def = defs.iter().any(|r| self.mem_model.is_frame_reg(*r));

    let mut deps = Vec::new();
    if may_throw {
      for a in st.ambiguous.iter() {
        deps.push((*a, DepType::Throw));
      }
      for s in st.stack_defs.iter().chain(st.heap_defs.iter()) {
        deps.push((*s, DepType::Throw));
      }
      for f in st.last_frame_def.iter() {
        deps.push((*f, DepType::Throw));
      }
    }
    if may_throw || ambiguous || is_store || frame_def {
      for t in st.may_throws.iter() {
        deps.push((*t, DepType::Throw));
      }
    }
    self.add_deps(g, deps, nix);

    if may_throw {
      st.may_throws.push(nix);
    }
    if ambiguous {
      st.ambiguous.push(nix);
    }
    if frame_def {
      st.last_frame_def = smallvec![nix];
    }
  }

  //---------------------------------------------------------------------------
  // Calls

  fn call_rules(&self, g: &mut DepGraph, st: &mut DepSummary, nix: NodeIx) {
    let mut deps = Vec::new();
    for s in st.stack_arg_setups.iter() {
      deps.push((*s, DepType::MemAccess));
    }
    for c in st.last_call.iter() {
      deps.push((*c, DepType::Control));
    }
    for p in st
      .stack_defs
      .iter()
      .chain(st.stack_uses.iter())
      .chain(st.heap_defs.iter())
      .chain(st.heap_uses.iter())
    {
      deps.push((*p, DepType::MemAccess));
    }
    self.add_deps(g, deps, nix);

    // The call reads and writes memory: later accesses order against it
    // and need not look further back.
    st.stack_arg_setups.clear();
    st.last_call = smallvec![nix];
    st.stack_uses.clear();
    st.heap_uses.clear();
    st.stack_defs = vec![nix];
    st.heap_defs = vec![nix];
  }

  //---------------------------------------------------------------------------
  // Barriers

  fn full_barrier(&self, g: &mut DepGraph, st: &mut DepSummary, nix: NodeIx) {
    let ty = Self::ordering_type(g, nix);
    self.control_all(g, st, nix, ty);
    st.clear_for_barrier(nix);
    if g.nodes[nix].is_real() {
      st.last_membar = smallvec![nix];
    }
  }

  //---------------------------------------------------------------------------
  // Pairs

  fn try_pair(&self, g: &mut DepGraph, st: &DepSummary, nix: NodeIx) {
    let prev = match st.nodes.last() {
      Some(p) if g.nodes[*p].is_real() => *p,
      _ => return,
    };
    if g.nodes[prev].pair.is_some() || g.find_edge(prev, nix).is_some() {
      return;
    }
    let ok = match (mem_access(&g.nodes[prev]), mem_access(&g.nodes[nix])) {
      (Some(a), Some(b)) => self.mem_model.is_combinable_pair(&a, &b),
      _ => false,
    };
    if ok {
      trace!("  pair {:?} + {:?}", prev, nix);
      g.nodes[prev].pair = Some(nix);
      g.nodes[nix].pair = Some(prev);
    }
  }

  //---------------------------------------------------------------------------
  // Entry points

  /// Add the node of instruction `iix` with all of its dependences.
  /// `eh_live` holds the registers live into an exception handler of the
  /// instruction's block.
  pub fn add_insn_node(
    &self, g: &mut DepGraph, st: &mut DepSummary, iix: InstIx, block: BlockIx,
    desc: &InsnDesc, regs: InstRegUses, eh_live: &Set<Reg>,
  ) -> NodeIx {
    if self.separator_window > 0 && st.node_sum >= self.separator_window {
      self.add_separator(g, st, block);
    }

    let mut node = DepNode::new_insn(iix, block, desc, regs);
    // The address registers as they are before this instruction writes
    // anything.  With more than one reaching definition the base value is
    // unknown, and only comparable to itself.
    let resolve = |r: Option<Reg>, next: NodeIx| -> Option<NodeIx> {
      let r = r?;
      match st.latest_def.get(&r) {
        Some(ds) if ds.len() == 1 => Some(ds[0]),
        Some(ds) if ds.len() > 1 => Some(next),
        _ => None,
      }
    };
    let next = NodeIx::new(g.num_nodes());
    if let Some(op) = node.mem.as_ref() {
      node.base_def = resolve(op.base, next);
      node.index_def = resolve(op.index, next);
    }
    let (uses, defs) = self.effective_regs(&node, &desc.clobbers);
    let props = node.props;
    let nix = g.add_node(node);
    debug_assert!(nix == next);

    self.add_from_separators(g, st, nix);
    self.register_rules(g, st, nix, &uses, &defs);
    self.mem_rules(g, st, nix);
    if props.is_control_flow() {
      self.control_all(g, st, nix, DepType::Control);
    }
    self.throw_rules(g, st, nix, &defs, eh_live);
    if props.is_call {
      self.call_rules(g, st, nix);
    }
    let membar_like = props.is_barrier
      || props.is_atomic
      || (props.is_inline_asm && props.asm_touches_memory);
    if props.is_inline_asm && !props.asm_touches_memory {
      // Still ordered against calls, which may change what it reads.
      let deps = st.last_call.iter().map(|c| (*c, DepType::MemAccess)).collect();
      self.add_deps(g, deps, nix);
    }
    if membar_like {
      self.full_barrier(g, st, nix);
    } else {
      if g.nodes[nix].mem.is_some() {
        self.try_pair(g, st, nix);
      }
      st.window.push(nix);
    }
    st.nodes.push(nix);
    st.node_sum += 1;
    nix
  }

  /// Add a separator: it follows everything so far, and everything later
  /// follows it.
  pub fn add_separator(
    &self, g: &mut DepGraph, st: &mut DepSummary, block: BlockIx,
  ) -> NodeIx {
    let sep = g.add_node(DepNode::new_separator(block));
    trace!("  separator {:?} after {} nodes", sep, st.node_sum);
    self.add_from_separators(g, st, sep);
    self.control_all(g, st, sep, DepType::Separator);
    st.clear_for_barrier(sep);
    st.nodes.push(sep);
    sep
  }

  /// Add a node standing for blocks outside the region: it reads and
  /// writes their registers, and if `barrier` is set orders everything.
  pub fn add_empty(
    &self, g: &mut DepGraph, st: &mut DepSummary, block: BlockIx,
    regs: InstRegUses, barrier: bool,
  ) -> NodeIx {
    let uses: SmallVec<[Reg; 8]> = regs.used.iter().cloned().collect();
    let defs: SmallVec<[Reg; 8]> = regs.defined.iter().cloned().collect();
    let nix = g.add_node(DepNode::new_empty(block, regs));
    trace!("  empty {:?} barrier={}", nix, barrier);
    self.add_from_separators(g, st, nix);
    self.register_rules(g, st, nix, &uses, &defs);
    if barrier {
      self.full_barrier(g, st, nix);
    } else {
      st.window.push(nix);
    }
    st.nodes.push(nix);
    nix
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::{sp, AArch64MemoryModel};
  use crate::interface::{Function, PseudoKind};
  use crate::test_func::*;

  fn build_with(
    insns: Vec<TInsn>, window: u32, eh_live: &Set<Reg>,
  ) -> DepGraph {
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, window);
    let mut f = TFunc::new();
    let b = f.block(insns, &[]);
    let mut g = DepGraph::new();
    let mut st = DepSummary::new();
    for iix in f.block_insns(b) {
      let insn = f.get_insn(iix);
      let desc = f.insn_desc(insn);
      if desc.is_pseudo() {
        continue;
      }
      engine.add_insn_node(&mut g, &mut st, iix, b, &desc, f.get_regs(insn), eh_live);
    }
    g
  }

  fn build(insns: Vec<TInsn>) -> DepGraph {
    build_with(insns, 0, &Set::empty())
  }

  fn n(i: u32) -> NodeIx {
    NodeIx::new(i)
  }

  #[test]
  fn register_dependences() {
    let g = build(vec![
      alu("d1", x(1), &[]),
      alu("d2", x(2), &[x(1)]),
      alu("d3", x(1), &[x(3)]),
      alu("d4", x(1), &[]),
    ]);
    assert_eq!(g.dep_type(n(0), n(1)), DepType::True);
    assert_eq!(g.dep_type(n(1), n(2)), DepType::Anti);
    assert_eq!(g.dep_type(n(0), n(2)), DepType::Output);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::Output);
    // d4 only needs to follow the latest def, d3.
    assert_eq!(g.dep_type(n(0), n(3)), DepType::None);
    assert_eq!(g.edges[g.find_edge(n(0), n(1)).unwrap()].latency, 1);
  }

  #[test]
  fn store_data_is_forwarded_but_its_address_is_not() {
    let g = build(vec![
      load("l1", x(1), x(0), 0),
      store("data", x(1), x(9), 0),
      load("l2", x(2), x(0), 8),
      store("addr", x(3), x(2), 0),
    ]);
    let latency = |a, b| g.edges[g.find_edge(n(a), n(b)).unwrap()].latency;
    assert_eq!(g.dep_type(n(0), n(1)), DepType::True);
    assert_eq!(latency(0, 1), 2);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::True);
    assert_eq!(latency(2, 3), 3);
  }

  #[test]
  fn multiply_chains_forward() {
    let g = build(vec![
      mul("m1", x(1), &[x(0)]),
      mul("m2", x(2), &[x(1)]),
      alu("a", x(3), &[x(2)]),
    ]);
    let latency = |a, b| g.edges[g.find_edge(n(a), n(b)).unwrap()].latency;
    assert_eq!(latency(0, 1), 1);
    assert_eq!(latency(1, 2), 3);
  }

  #[test]
  fn read_and_write_of_same_register() {
    let g = build(vec![
      alu("a", x(1), &[]),
      alu("inc", x(1), &[x(1)]),
      alu("use", x(2), &[x(1)]),
    ]);
    // True wins over the Output edge between a and inc.
    assert_eq!(g.dep_type(n(0), n(1)), DepType::True);
    assert_eq!(g.dep_type(n(1), n(2)), DepType::True);
    assert_eq!(g.num_edges(), 2);
  }

  #[test]
  fn memory_dependences() {
    let g = build(vec![
      store("s0", x(1), x(0), 0),
      load("l8", x(2), x(0), 8),
      load("l0", x(3), x(0), 0),
      store("s8", x(4), x(0), 8),
      store("s16", x(5), x(0), 16),
    ]);
    assert_eq!(g.dep_type(n(0), n(1)), DepType::None);
    assert_eq!(g.dep_type(n(0), n(2)), DepType::True);
    assert_eq!(g.dep_type(n(1), n(3)), DepType::Anti);
    assert_eq!(g.dep_type(n(0), n(3)), DepType::None);
    assert_eq!(g.dep_type(n(3), n(4)), DepType::None);
  }

  #[test]
  fn redefined_base_is_not_comparable() {
    let g = build(vec![
      store("s", x(1), x(0), 0),
      alu("mov", x(0), &[x(7)]),
      load("l", x(2), x(0), 8),
    ]);
    assert_eq!(g.dep_type(n(0), n(2)), DepType::True);
  }

  #[test]
  fn stack_and_heap_are_disjoint() {
    let g = build(vec![store("s", x(1), sp(), 0), load("l", x(2), x(0), 0)]);
    assert_eq!(g.dep_type(n(0), n(1)), DepType::None);
  }

  #[test]
  fn alias_objects_separate_accesses() {
    let mut s = store("s", x(1), x(0), 0);
    s.desc.alias_objects = Some(smallvec![1]);
    let mut l = load("l", x(2), x(3), 0);
    l.desc.alias_objects = Some(smallvec![2]);
    let mut l2 = load("l2", x(4), x(5), 0);
    l2.desc.alias_objects = Some(smallvec![1, 2]);
    let g = build(vec![s, l, l2]);
    assert_eq!(g.dep_type(n(0), n(1)), DepType::None);
    assert_eq!(g.dep_type(n(0), n(2)), DepType::True);
  }

  #[test]
  fn calls() {
    let g = build(vec![
      alu("arg", x(0), &[]),
      store("heap", x(21), x(19), 0),
      store("stackarg", x(22), sp(), 0),
      call("bl1", &[x(0)], &[x(0)]),
      load("after", x(23), x(19), 8),
      call("bl2", &[], &[]),
      alu("unrelated", x(24), &[]),
    ]);
    assert_eq!(g.dep_type(n(0), n(3)), DepType::True);
    assert_eq!(g.dep_type(n(1), n(3)), DepType::MemAccess);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::MemAccess);
    assert_eq!(g.dep_type(n(3), n(4)), DepType::MemAccess);
    // Calls clobber every caller-saved register, so they are also ordered
    // through the registers; the strongest edge is kept.
    assert!(g.find_edge(n(3), n(5)).is_some());
    assert_eq!(g.nodes[n(6)].preds.len(), 0);
  }

  #[test]
  fn branch_follows_everything() {
    let g = build(vec![
      alu("a", x(1), &[]),
      alu("b", x(2), &[x(1)]),
      alu("c", x(3), &[]),
      branch("br", &[]),
    ]);
    assert_eq!(g.dep_type(n(1), n(3)), DepType::Control);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::Control);
    // a reaches br through b.
    assert_eq!(g.dep_type(n(0), n(3)), DepType::None);
  }

  #[test]
  fn barriers_order_everything() {
    let g = build(vec![
      load("l", x(1), x(0), 0),
      barrier("dmb"),
      alu("a", x(2), &[]),
    ]);
    assert_eq!(g.dep_type(n(0), n(1)), DepType::Membar);
    assert_eq!(g.dep_type(n(1), n(2)), DepType::Membar);
  }

  #[test]
  fn separators_bound_the_graph() {
    let insns = (0..5).map(|i| alu("a", x(i), &[])).collect();
    let g = build_with(insns, 2, &Set::empty());
    // a a SEP a a SEP a
    assert_eq!(g.num_nodes(), 7);
    assert!(!g.nodes[n(2)].is_real());
    assert!(!g.nodes[n(5)].is_real());
    assert_eq!(g.dep_type(n(0), n(2)), DepType::Separator);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::Separator);
    assert_eq!(g.dep_type(n(2), n(5)), DepType::Separator);
    assert_eq!(g.dep_type(n(5), n(6)), DepType::Separator);
  }

  #[test]
  fn throws_and_ambiguous_definitions() {
    let eh_live = Set::unit(x(5));
    let g = build_with(
      vec![
        alu("amb", x(5), &[]),
        throwing("t", &[]),
        alu("amb2", x(5), &[x(6)]),
        alu("other", x(7), &[]),
        store("st", x(1), x(0), 0),
      ],
      0,
      &eh_live,
    );
    assert_eq!(g.dep_type(n(0), n(1)), DepType::Throw);
    assert_eq!(g.dep_type(n(1), n(2)), DepType::Throw);
    assert_eq!(g.dep_type(n(1), n(3)), DepType::None);
    assert_eq!(g.dep_type(n(1), n(4)), DepType::Throw);
  }

  #[test]
  fn pairs_are_linked() {
    let g = build(vec![
      load("l1", x(1), x(0), 8),
      load("l2", x(2), x(0), 16),
      alu("a", x(3), &[]),
    ]);
    assert_eq!(g.nodes[n(0)].pair, Some(n(1)));
    assert_eq!(g.nodes[n(1)].pair, Some(n(0)));
    assert_eq!(g.nodes[n(2)].pair, None);
  }

  #[test]
  #[should_panic]
  fn unresolved_operands_are_fatal() {
    let mut l = load("l", x(1), x(0), 0);
    if let Some(op) = l.desc.mem.as_mut() {
      op.mode = AddrMode::Unresolved;
    }
    build(vec![store("s", x(2), x(0), 0), l]);
  }

  #[test]
  fn pseudos_get_no_nodes() {
    let g = build(vec![pseudo("c", PseudoKind::Comment), alu("a", x(1), &[])]);
    assert_eq!(g.num_nodes(), 1);
  }
}
