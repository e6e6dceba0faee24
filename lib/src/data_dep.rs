/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Dependence graph construction, for one block or for a whole region.

use smallvec::SmallVec;

use crate::analysis::AnalysisInfo;
use crate::cdg::{DepSummary, Fcdg};
use crate::data_dep_base::RuleEngine;
use crate::data_structures::{BlockIx, InstIx, NodeIx, RegionIx};
use crate::dep_graph::DepGraph;
use crate::interface::{Function, InsnDesc, InstRegUses, PseudoKind};

// Add the nodes of one block, in program order, binding pseudo
// instructions to the real instruction they travel with.
fn add_block_nodes<F: Function>(
  func: &F, ainfo: &AnalysisInfo, engine: &RuleEngine, g: &mut DepGraph,
  st: &mut DepSummary, bix: BlockIx,
) {
  let eh_live = &ainfo.liveness.eh_live[bix];
  let mut pending = SmallVec::<[InstIx; 2]>::new();
  let mut last_real: Option<NodeIx> = None;
  for iix in func.block_insns(bix) {
    let desc = func.insn_desc(func.get_insn(iix));
    match desc.pseudo {
      Some(kind) if kind.binds_forward() => pending.push(iix),
      Some(kind) => match last_real {
        Some(nix) => {
          let node = &mut g.nodes[nix];
          match kind {
            PseudoKind::ClinitCompanion => node.clinits.push(iix),
            _ => node.cfis.push(iix),
          }
        }
        None => {
          let leading = g.leading.entry(bix).or_default();
          leading.extend(pending.drain(..));
          leading.push(iix);
        }
      },
      None => {
        let nix = engine.add_insn_node(
          g,
          st,
          iix,
          bix,
          &desc,
          ainfo.reg_uses[iix].clone(),
          eh_live,
        );
        g.nodes[nix].comments.extend(pending.drain(..));
        last_real = Some(nix);
      }
    }
  }
  if !pending.is_empty() {
    g.trailing.entry(bix).or_default().extend(pending.drain(..));
  }
}

/// Build the dependence graph of a single block.
#[inline(never)]
pub fn build_block_graph<F: Function>(
  func: &F, ainfo: &AnalysisInfo, engine: &RuleEngine, bix: BlockIx,
) -> DepGraph {
  let mut g = DepGraph::new();
  let mut st = DepSummary::new();
  add_block_nodes(func, ainfo, engine, &mut g, &mut st, bix);
  g.reset_schedule_state();
  g.dump(&format!("of {:?}", bix));
  g
}

/// Registers touched by a set of blocks, and whether anything in them must
/// be treated as a full ordering point.
fn summarize_blocks<F: Function>(
  func: &F, ainfo: &AnalysisInfo, blocks: &[BlockIx],
) -> (InstRegUses, bool) {
  let mut regs = InstRegUses::default();
  let mut barrier = false;
  for bix in blocks {
    for iix in func.block_insns(*bix) {
      let desc: InsnDesc = func.insn_desc(func.get_insn(iix));
      if desc.is_pseudo() {
        continue;
      }
      let props = desc.props;
      if desc.mem.is_some()
        || props.is_call
        || props.is_barrier
        || props.may_throw
        || props.is_inline_asm
        || props.is_atomic
      {
        barrier = true;
      }
      let ru = &ainfo.reg_uses[iix];
      for r in ru.used.iter() {
        if !regs.used.contains(r) {
          regs.used.push(*r);
        }
      }
      for r in ru.defined.iter() {
        if !regs.defined.contains(r) {
          regs.defined.push(*r);
        }
      }
    }
  }
  (regs, barrier)
}

/// Build one graph over all the members of a region.  Each member starts
/// from the merged summaries of the members reaching it, preceded by an
/// empty node for whatever non-member blocks lie on the way.
#[inline(never)]
pub fn build_region_graph<F: Function>(
  func: &F, ainfo: &AnalysisInfo, fcdg: &mut Fcdg, engine: &RuleEngine,
  rix: RegionIx,
) -> DepGraph {
  let members = fcdg.region(rix).members.clone();
  let mut g = DepGraph::new();
  for (pos, bix) in members.iter().enumerate() {
    let mut st = DepSummary::new();
    for pred in fcdg.nodes[*bix].region_preds.iter() {
      if let Some(sum) = fcdg.nodes[*pred].summary.as_ref() {
        st.merge(sum);
      }
    }
    let between = &fcdg.nodes[*bix].between;
    if pos > 0 && !between.is_empty() {
      let (regs, barrier) = summarize_blocks(func, ainfo, between);
      engine.add_empty(&mut g, &mut st, *bix, regs, barrier);
    }
    add_block_nodes(func, ainfo, engine, &mut g, &mut st, *bix);
    fcdg.nodes[*bix].summary = Some(st);
  }
  fcdg.clear_summaries(rix);
  g.reset_schedule_state();
  g.dump(&format!("of {:?} {:?}", rix, members));
  g
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::AArch64MemoryModel;
  use crate::analysis::run_analysis;
  use crate::control_dep::build_fcdg;
  use crate::dep_graph::{DepType, NodeType};
  use crate::machine::MachineDesc;
  use crate::test_func::*;

  #[test]
  fn pseudos_bind_to_their_neighbours() {
    let mut f = TFunc::new();
    let b = f.block(
      vec![
        pseudo("cfi0", PseudoKind::Cfi),
        pseudo("c1", PseudoKind::Comment),
        alu("a", x(1), &[]),
        pseudo("cfi1", PseudoKind::Cfi),
        pseudo("clinit", PseudoKind::ClinitCompanion),
        pseudo("dbg", PseudoKind::Debug),
        alu("b", x(2), &[]),
        pseudo("c2", PseudoKind::Comment),
      ],
      &[],
    );
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let g = build_block_graph(&f, &ainfo, &engine, b);
    assert_eq!(g.num_nodes(), 2);
    let (n0, n1) = (NodeIx::new(0), NodeIx::new(1));
    assert_eq!(g.leading[&b], vec![InstIx::new(0)]);
    assert_eq!(g.nodes[n0].comments.as_slice(), &[InstIx::new(1)]);
    assert_eq!(g.nodes[n0].cfis.as_slice(), &[InstIx::new(3)]);
    assert_eq!(g.nodes[n0].clinits.as_slice(), &[InstIx::new(4)]);
    assert_eq!(g.nodes[n1].comments.as_slice(), &[InstIx::new(5)]);
    assert_eq!(g.trailing[&b], vec![InstIx::new(7)]);
    assert_eq!(g.nodes[n0].unresolved_preds, 0);
  }

  #[test]
  fn region_graph_spans_the_diamond() {
    let mut f = TFunc::new();
    f.block(vec![alu("a", x(1), &[]), branch("b0", &[x(1)])], &[1, 2]);
    f.block(vec![alu("c", x(2), &[]), branch("b1", &[])], &[3]);
    f.block(vec![alu("d", x(3), &[]), branch("b2", &[])], &[3]);
    f.block(vec![alu("e", x(4), &[x(1), x(2)]), ret("r", &[x(4)])], &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let mut fcdg = build_fcdg(&ainfo.cfg_info);
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let rix = fcdg.region_of(BlockIx::new(0)).expect("region");
    let g = build_region_graph(&f, &ainfo, &mut fcdg, &engine, rix);

    // a, b0, EMPTY, e, r
    assert_eq!(g.num_nodes(), 5);
    let n = NodeIx::new;
    assert_eq!(g.nodes[n(2)].node_type, NodeType::Empty);
    assert_eq!(g.nodes[n(2)].block, BlockIx::new(3));
    assert!(g.nodes[n(2)].regs.defined.contains(&x(2)));
    assert_eq!(g.dep_type(n(0), n(3)), DepType::True);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::True);
    assert_eq!(g.dep_type(n(3), n(4)), DepType::True);
    // Summaries only live while the graph is built.
    assert!(fcdg.nodes[BlockIx::new(3)].summary.is_none());
  }

  #[test]
  fn memory_in_between_blocks_is_a_barrier() {
    let mut f = TFunc::new();
    f.block(vec![alu("a", x(1), &[]), branch("b0", &[x(1)])], &[1, 2]);
    f.block(vec![store("s", x(2), x(9), 0), branch("b1", &[])], &[3]);
    f.block(vec![branch("b2", &[])], &[3]);
    f.block(vec![load("l", x(4), x(10), 0), ret("r", &[x(4)])], &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let mut fcdg = build_fcdg(&ainfo.cfg_info);
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let rix = fcdg.region_of(BlockIx::new(0)).expect("region");
    let g = build_region_graph(&f, &ainfo, &mut fcdg, &engine, rix);
    let n = NodeIx::new;
    assert_eq!(g.nodes[n(2)].node_type, NodeType::Empty);
    // The empty node follows everything in b0, and the load follows it.
    assert_eq!(g.dep_type(n(1), n(2)), DepType::Separator);
    assert_eq!(g.dep_type(n(2), n(3)), DepType::Separator);
  }
}
