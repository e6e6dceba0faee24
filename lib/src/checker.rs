/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Checker: verifies that a schedule is a legal reordering of the input.
//!
//! Two things are checked:
//!
//!   - for each scheduled unit (a block, or a region), every node of its
//!     dependence graph is placed exactly once, in a member of the unit no
//!     later than the one it came from, and every edge goes from an earlier
//!     to a later position.  Positions are compared by member order first
//!     (members are in topological order), then by place within the
//!     member's order;
//!
//!   - for the whole function, the output holds every input instruction,
//!     real or pseudo, exactly once.
//!
//! Separator and empty nodes take part in the first check like real nodes:
//! they never move, so an instruction that jumped over one is caught by
//! the edge that connects them.

use log::debug;

use crate::data_structures::{BlockIx, InstIx, Map, NodeIx, TypedIxVec};
use crate::dep_graph::{DepGraph, DepType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckerError {
  /// An input instruction is missing from the output.
  MissingInsn { insn: InstIx },
  /// An input instruction appears more than once in the output.
  DuplicatedInsn { insn: InstIx, count: u32 },
  /// A node of a scheduled unit was not placed.
  NodeNotPlaced { node: NodeIx },
  /// A node was placed more than once.
  NodePlacedTwice { node: NodeIx },
  /// A node was placed outside its unit, or below its original block.
  IllegalMotion { node: NodeIx, from: BlockIx, to: BlockIx },
  /// A dependence edge points backwards in the final order.
  EdgeViolated {
    from: NodeIx,
    to: NodeIx,
    ty: DepType,
    from_insn: Option<InstIx>,
    to_insn: Option<InstIx>,
  },
}

#[derive(Clone, Debug)]
pub struct CheckerErrors {
  pub errors: Vec<CheckerError>,
}

pub struct CheckerContext {
  errors: Vec<CheckerError>,
}

impl CheckerContext {
  pub fn new() -> Self {
    Self { errors: Vec::new() }
  }

  /// Check the placement of a unit's nodes.  `members` are the unit's
  /// blocks in topological order, and `placed` the node order chosen for
  /// each of them.
  pub fn check_unit(
    &mut self, g: &DepGraph, members: &[BlockIx],
    placed: &[(BlockIx, Vec<NodeIx>)],
  ) {
    let member_pos = |b: BlockIx| members.iter().position(|m| *m == b);
    let mut pos = Map::<NodeIx, (usize, usize)>::default();
    for (bix, order) in placed {
      let bpos = match member_pos(*bix) {
        Some(p) => p,
        None => {
          for nix in order {
            self.errors.push(CheckerError::IllegalMotion {
              node: *nix,
              from: g.nodes[*nix].block,
              to: *bix,
            });
          }
          continue;
        }
      };
      for (i, nix) in order.iter().enumerate() {
        if pos.insert(*nix, (bpos, i)).is_some() {
          self.errors.push(CheckerError::NodePlacedTwice { node: *nix });
        }
        let from = g.nodes[*nix].block;
        match member_pos(from) {
          Some(fpos) if fpos >= bpos => {}
          _ => self.errors.push(CheckerError::IllegalMotion {
            node: *nix,
            from,
            to: *bix,
          }),
        }
      }
    }

    for nix in g.nodes.range() {
      if !pos.contains_key(&nix) {
        self.errors.push(CheckerError::NodeNotPlaced { node: nix });
      }
    }

    for link in g.edges.iter() {
      if let (Some(a), Some(b)) = (pos.get(&link.from), pos.get(&link.to)) {
        if a >= b {
          self.errors.push(CheckerError::EdgeViolated {
            from: link.from,
            to: link.to,
            ty: link.ty,
            from_insn: g.nodes[link.from].insn,
            to_insn: g.nodes[link.to].insn,
          });
        }
      }
    }
  }

  /// Check that the output, given as the original index of each output
  /// instruction, is a permutation of the `num_insns` input instructions.
  pub fn check_permutation(
    &mut self, num_insns: u32, orig_insn_map: &TypedIxVec<InstIx, InstIx>,
  ) {
    let mut counts = vec![0u32; num_insns as usize];
    for iix in orig_insn_map.iter() {
      match counts.get_mut(iix.get() as usize) {
        Some(c) => *c += 1,
        None => self.errors.push(CheckerError::MissingInsn { insn: *iix }),
      }
    }
    for (i, c) in counts.iter().enumerate() {
      let insn = InstIx::new(i as u32);
      match *c {
        1 => {}
        0 => self.errors.push(CheckerError::MissingInsn { insn }),
        count => {
          self.errors.push(CheckerError::DuplicatedInsn { insn, count })
        }
      }
    }
  }

  pub fn run(self) -> Result<(), CheckerErrors> {
    if self.errors.is_empty() {
      Ok(())
    } else {
      debug!("checker: {} errors", self.errors.len());
      for err in self.errors.iter() {
        debug!("  {:?}", err);
      }
      Err(CheckerErrors { errors: self.errors })
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::dep_graph::DepNode;
  use crate::interface::{InsnDesc, InstRegUses, OpClass};

  fn chain(blocks: &[u32]) -> DepGraph {
    let mut g = DepGraph::new();
    for (i, b) in blocks.iter().enumerate() {
      g.add_node(DepNode::new_insn(
        InstIx::new(i as u32),
        BlockIx::new(*b),
        &InsnDesc::new(OpClass::Alu),
        InstRegUses::default(),
      ));
    }
    for i in 1..blocks.len() as u32 {
      g.add_dep(NodeIx::new(i - 1), NodeIx::new(i), DepType::True, 1);
    }
    g
  }

  #[test]
  fn accepts_a_legal_order() {
    let g = chain(&[0, 0, 1]);
    let (b0, b1) = (BlockIx::new(0), BlockIx::new(1));
    let n = NodeIx::new;
    let mut ctx = CheckerContext::new();
    // n2 is hoisted into b0.
    ctx.check_unit(&g, &[b0, b1], &[(b0, vec![n(0), n(1), n(2)]), (b1, vec![])]);
    assert!(ctx.run().is_ok());
  }

  #[test]
  fn rejects_backward_edges_and_sinking() {
    let g = chain(&[0, 0, 1]);
    let (b0, b1) = (BlockIx::new(0), BlockIx::new(1));
    let n = NodeIx::new;
    let mut ctx = CheckerContext::new();
    ctx.check_unit(&g, &[b0, b1], &[(b0, vec![n(1)]), (b1, vec![n(0), n(2)])]);
    let errors = ctx.run().unwrap_err().errors;
    assert!(errors.contains(&CheckerError::IllegalMotion {
      node: n(0),
      from: b0,
      to: b1
    }));
    assert!(errors.iter().any(|e| match e {
      CheckerError::EdgeViolated { from, to, .. } => *from == n(0) && *to == n(1),
      _ => false,
    }));
  }

  #[test]
  fn rejects_lost_nodes() {
    let g = chain(&[0, 0]);
    let b0 = BlockIx::new(0);
    let mut ctx = CheckerContext::new();
    ctx.check_unit(&g, &[b0], &[(b0, vec![NodeIx::new(1)])]);
    let errors = ctx.run().unwrap_err().errors;
    assert_eq!(errors, vec![CheckerError::NodeNotPlaced { node: NodeIx::new(0) }]);
  }

  #[test]
  fn permutations() {
    let ok = TypedIxVec::from_vec(vec![InstIx::new(2), InstIx::new(0), InstIx::new(1)]);
    let mut ctx = CheckerContext::new();
    ctx.check_permutation(3, &ok);
    assert!(ctx.run().is_ok());

    let bad = TypedIxVec::from_vec(vec![InstIx::new(0), InstIx::new(0), InstIx::new(1)]);
    let mut ctx = CheckerContext::new();
    ctx.check_permutation(3, &bad);
    let errors = ctx.run().unwrap_err().errors;
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&CheckerError::MissingInsn { insn: InstIx::new(2) }));
    assert!(errors.contains(&CheckerError::DuplicatedInsn {
      insn: InstIx::new(0),
      count: 2
    }));
  }
}
