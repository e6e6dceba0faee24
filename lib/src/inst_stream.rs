/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Turning scheduled node orders back into an instruction stream.

use log::trace;

use crate::data_structures::{BlockIx, InstIx, NodeIx, TypedIxVec};
use crate::dep_graph::DepGraph;
use crate::interface::Function;

/// The new contents of a block, given the order chosen for the nodes
/// placed in it.  Pseudo instructions come along with the node they were
/// bound to: comments and debug markers first, then the instruction, then
/// its CFI and clinit companions.
pub(crate) fn emit_block_order(
  g: &DepGraph, bix: BlockIx, order: &[NodeIx],
) -> Vec<InstIx> {
  let mut out = Vec::with_capacity(order.len());
  if let Some(leading) = g.leading.get(&bix) {
    out.extend(leading.iter().cloned());
  }
  for nix in order {
    let node = &g.nodes[*nix];
    let iix = match node.insn {
      Some(iix) => iix,
      None => continue,
    };
    out.extend(node.comments.iter().cloned());
    out.push(iix);
    out.extend(node.cfis.iter().cloned());
    out.extend(node.clinits.iter().cloned());
  }
  if let Some(trailing) = g.trailing.get(&bix) {
    out.extend(trailing.iter().cloned());
  }
  out
}

/// What the instruction stream of each block becomes: `None` leaves the
/// block as it is.
pub(crate) type BlockLayout = TypedIxVec<BlockIx, Option<Vec<InstIx>>>;

/// Build the final instruction vector.  Returns it together with the start
/// of every block in it, and the original index of every instruction.
#[inline(never)]
pub(crate) fn materialize<F: Function>(
  func: &F, layout: &BlockLayout,
) -> (Vec<F::Inst>, TypedIxVec<BlockIx, InstIx>, TypedIxVec<InstIx, InstIx>) {
  let mut insns: Vec<F::Inst> = Vec::with_capacity(func.insns().len());
  let mut target_map = TypedIxVec::<BlockIx, InstIx>::new();
  let mut orig_insn_map = TypedIxVec::<InstIx, InstIx>::new();

  let mut curB = BlockIx::new(0);
  for bix in func.blocks() {
    debug_assert!(bix == curB);
    target_map.push(InstIx::new(insns.len() as u32));
    match &layout[bix] {
      Some(new_order) => {
        trace!("materialize: {:?} rewritten, {} insns", bix, new_order.len());
        for iix in new_order {
          insns.push(func.get_insn(*iix).clone());
          orig_insn_map.push(*iix);
        }
      }
      None => {
        for iix in func.block_insns(bix) {
          insns.push(func.get_insn(iix).clone());
          orig_insn_map.push(iix);
        }
      }
    }
    curB = curB.plus(1);
  }

  (insns, target_map, orig_insn_map)
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::AArch64MemoryModel;
  use crate::analysis::run_analysis;
  use crate::data_dep::build_block_graph;
  use crate::data_dep_base::RuleEngine;
  use crate::interface::PseudoKind;
  use crate::machine::MachineDesc;
  use crate::test_func::*;

  #[test]
  fn attachments_travel_with_their_instruction() {
    let mut f = TFunc::new();
    let b = f.block(
      vec![
        pseudo("c0", PseudoKind::Comment),
        alu("a", x(1), &[]),
        pseudo("cfi", PseudoKind::Cfi),
        alu("b", x(2), &[]),
        pseudo("c1", PseudoKind::Comment),
      ],
      &[],
    );
    f.block(vec![ret("r", &[])], &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let g = build_block_graph(&f, &ainfo, &engine, b);

    // Swap the two real instructions.
    let order = vec![NodeIx::new(1), NodeIx::new(0)];
    let new_order = emit_block_order(&g, b, &order);
    let names: Vec<&str> = new_order.iter().map(|i| f.name_of(*i)).collect();
    assert_eq!(names, vec!["b", "c0", "a", "cfi", "c1"]);

    let mut layout = BlockLayout::new();
    layout.push(Some(new_order));
    layout.push(None);
    let (insns, target_map, orig) = materialize(&f, &layout);
    assert_eq!(insns.len(), 6);
    assert_eq!(target_map[BlockIx::new(1)], InstIx::new(5));
    assert_eq!(orig[InstIx::new(0)], InstIx::new(3));
    assert_eq!(orig[InstIx::new(5)], InstIx::new(5));
    assert_eq!(insns[0].name, "b");
  }
}
