/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Control-flow analysis results for a Function: predecessors, successors,
//! retreating edges, dominators, post-dominators, loops, and live register
//! sets.

use log::debug;
use std::fmt;

use crate::data_structures::{
  BlockIx, InstIx, Queue, Reg, Set, TypedIxVec,
};
use crate::interface::{Function, InstRegUses};

#[derive(Clone, Debug)]
pub enum AnalysisError {
  /// The entry block index is not a block of the function.
  EntryOutOfRange(BlockIx),

  /// A successor edge points outside the function.
  SuccOutOfRange { from: BlockIx, to: BlockIx },

  /// Blocks must cover the instruction vector in order, without gaps.
  BlockLayout(BlockIx),
}

impl fmt::Display for AnalysisError {
  fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AnalysisError::EntryOutOfRange(bix) => {
        write!(fmt, "entry block {:?} does not exist", bix)
      }
      AnalysisError::SuccOutOfRange { from, to } => {
        write!(fmt, "block {:?} has successor {:?}, which doesn't exist", from, to)
      }
      AnalysisError::BlockLayout(bix) => {
        write!(fmt, "instructions of block {:?} do not follow its predecessor in layout", bix)
      }
    }
  }
}

//=============================================================================
// CFGInfo contains CFG-related info computed from a Function.

pub struct CFGInfo {
  // All these TypedIxVecs contain one element per Block in the Function.

  // Normal successors in branch order, and the inverted map.
  pub succ_map: TypedIxVec<BlockIx, Vec<BlockIx>>,
  pub pred_map: TypedIxVec<BlockIx, Vec<BlockIx>>,

  // Exception edges, kept apart from the normal ones.
  pub eh_succ_map: TypedIxVec<BlockIx, Vec<BlockIx>>,

  // Predecessors over normal and exception edges.
  pub full_pred_map: TypedIxVec<BlockIx, Vec<BlockIx>>,

  // Blocks reachable from the entry, over normal and exception edges.
  pub reachable: TypedIxVec<BlockIx, bool>,

  // Reachable blocks in reverse postorder (a topological order once the
  // retreating edges are ignored).
  pub rpo: Vec<BlockIx>,
  pub rpo_index: TypedIxVec<BlockIx, u32>,

  // Edges m->n where n is on the DFS stack when m is visited.  Ignoring them
  // leaves an acyclic graph.
  pub retreating_edges: Set<(BlockIx, BlockIx)>,

  // This maps from a Block to the set of Blocks it is dominated by
  pub dom_map: TypedIxVec<BlockIx, Set<BlockIx>>,

  // This maps from a Block to the set of Blocks it is post-dominated by, in
  // the graph without retreating edges and with a virtual exit below every
  // block that has no remaining successors.
  pub pdom_map: TypedIxVec<BlockIx, Set<BlockIx>>,

  // Innermost natural loop (by header) and loop depth.
  pub loop_header: TypedIxVec<BlockIx, Option<BlockIx>>,
  pub depth_map: TypedIxVec<BlockIx, u32>,

  // Blocks on a cycle that is not a natural loop.
  pub irreducible: TypedIxVec<BlockIx, bool>,
}

impl CFGInfo {
  #[inline(never)]
  pub fn create<F: Function>(func: &F) -> Result<Self, AnalysisError> {
    let nBlocks = func.blocks().len() as u32;

    // === BEGIN check the block layout and compute successor and
    // predecessor maps ===
    //
    let entry = func.entry_block();
    if entry.get() >= nBlocks {
      return Err(AnalysisError::EntryOutOfRange(entry));
    }

    let mut next_start = 0u32;
    for bix in func.blocks() {
      let range = func.block_insns(bix);
      if range.start().get() != next_start {
        return Err(AnalysisError::BlockLayout(bix));
      }
      next_start = range.start().get() + range.len() as u32;
    }

    let mut succ_map = TypedIxVec::<BlockIx, Vec<BlockIx>>::new();
    let mut eh_succ_map = TypedIxVec::<BlockIx, Vec<BlockIx>>::new();
    for bix in func.blocks() {
      let mut succs = Vec::new();
      for s in func.block_succs(bix).iter() {
        if s.get() >= nBlocks {
          return Err(AnalysisError::SuccOutOfRange { from: bix, to: *s });
        }
        // A conditional branch with both arms to the same block is a single
        // CFG edge.
        if !succs.contains(s) {
          succs.push(*s);
        }
      }
      let mut eh_succs = Vec::new();
      for s in func.block_eh_succs(bix).iter() {
        if s.get() >= nBlocks {
          return Err(AnalysisError::SuccOutOfRange { from: bix, to: *s });
        }
        if !eh_succs.contains(s) {
          eh_succs.push(*s);
        }
      }
      succ_map.push(succs);
      eh_succ_map.push(eh_succs);
    }

    // Now invert the mapping
    let mut pred_map = TypedIxVec::<BlockIx, Vec<BlockIx>>::new();
    pred_map.resize(nBlocks, Vec::new());
    for (src, dst_set) in (0..).zip(succ_map.iter()) {
      for dst in dst_set.iter() {
        pred_map[*dst].push(BlockIx::new(src));
      }
    }

    // Stay sane ..
    assert!(pred_map.len() == nBlocks);
    assert!(succ_map.len() == nBlocks);
    //
    // === END compute successor and predecessor maps ===

    // === BEGIN compute reachability, postorder and retreating edges ===
    //
    // Iterative DFS over normal and exception edges, with an explicit
    // stack.  This is per Fig 7.12 of Muchnick 1997.
    //
    let mut visited = TypedIxVec::<BlockIx, bool>::new();
    visited.resize(nBlocks, false);
    let mut on_stack = TypedIxVec::<BlockIx, bool>::new();
    on_stack.resize(nBlocks, false);
    let mut post_ord = Vec::<BlockIx>::new();
    let mut retreating_edges = Set::<(BlockIx, BlockIx)>::empty();

    let all_succs = |bix: BlockIx| -> Vec<BlockIx> {
      let mut v = succ_map[bix].clone();
      for s in eh_succ_map[bix].iter() {
        if !v.contains(s) {
          v.push(*s);
        }
      }
      v
    };

    let mut stack: Vec<(BlockIx, usize)> = vec![(entry, 0)];
    visited[entry] = true;
    on_stack[entry] = true;
    while let Some((bix, next)) = stack.pop() {
      let succs = all_succs(bix);
      if next < succs.len() {
        stack.push((bix, next + 1));
        let succ = succs[next];
        if !visited[succ] {
          visited[succ] = true;
          on_stack[succ] = true;
          stack.push((succ, 0));
        } else if on_stack[succ] {
          retreating_edges.insert((bix, succ));
        }
      } else {
        on_stack[bix] = false;
        post_ord.push(bix);
      }
    }

    let rpo: Vec<BlockIx> = post_ord.iter().rev().cloned().collect();
    let mut rpo_index = TypedIxVec::<BlockIx, u32>::new();
    rpo_index.resize(nBlocks, u32::max_value());
    for (i, bix) in rpo.iter().enumerate() {
      rpo_index[*bix] = i as u32;
    }
    let reachable = visited;
    //
    // === END compute reachability, postorder and retreating edges ===

    // === BEGIN compute dominator sets ===
    //
    let mut full_pred_map = pred_map.clone();
    for (src, dst_set) in (0..).zip(eh_succ_map.iter()) {
      for dst in dst_set.iter() {
        if !full_pred_map[*dst].contains(&BlockIx::new(src)) {
          full_pred_map[*dst].push(BlockIx::new(src));
        }
      }
    }
    let dom_map = calc_dominators(&full_pred_map, &rpo, &reachable, entry);
    assert!(dom_map.len() == nBlocks);
    //
    // === END compute dominator sets ===

    // === BEGIN compute post-dominator sets ===
    //
    // Over the acyclic graph: retreating edges are ignored, so no control
    // dependence is ever created on a back edge.
    let mut acyclic_succs = TypedIxVec::<BlockIx, Vec<BlockIx>>::new();
    for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
      let succs: Vec<BlockIx> = all_succs(bix)
        .into_iter()
        .filter(|s| !retreating_edges.contains((bix, *s)))
        .collect();
      acyclic_succs.push(succs);
    }
    let pdom_map = calc_post_dominators(&acyclic_succs, &rpo, &reachable);
    //
    // === END compute post-dominator sets ===

    // === BEGIN compute loops
    //
    // A "back edge" m->n is some edge m->n where n dominates m.  'n' is
    // the loop header node.  Natural loops per Fig 7.21 of Muchnick 1997.
    let mut natural_loops = Vec::<(BlockIx, Set<BlockIx>)>::new();
    let mut irreducible = TypedIxVec::<BlockIx, bool>::new();
    irreducible.resize(nBlocks, false);
    for (bixM, bixN) in retreating_edges.to_vec() {
      if !dom_map[bixM].contains(bixN) {
        // Retreating but not a back edge: the cycle has more than one entry.
        // Everything on it reaches bixM from bixN.
        let fwd = reach_set(bixN, |b| all_succs(b));
        let bwd = reach_set(bixM, |b| full_pred_map[b].clone());
        for b in fwd.to_vec() {
          if bwd.contains(b) {
            irreducible[b] = true;
          }
        }
        continue;
      }
      let mut Loop = Set::<BlockIx>::two(bixM, bixN);
      let mut Stack = Vec::<BlockIx>::new();
      if bixM != bixN {
        Stack.push(bixM);
        while let Some(bixP) = Stack.pop() {
          for bixQ in full_pred_map[bixP].iter() {
            if reachable[*bixQ] && !Loop.contains(*bixQ) {
              Loop.insert(*bixQ);
              Stack.push(*bixQ);
            }
          }
        }
      }
      // Several back edges to one header make one loop.
      if let Some(existing) =
        natural_loops.iter_mut().find(|(hdr, _)| *hdr == bixN)
      {
        existing.1.union(&Loop);
      } else {
        natural_loops.push((bixN, Loop));
      }
    }

    // Order by increasing size; then the first loop containing a block is
    // its innermost one, and the number of loops containing it is its depth
    // (loops are either disjoint or nested).
    natural_loops.sort_by(|(h1, s1), (h2, s2)| {
      s1.card().cmp(&s2.card()).then(h1.cmp(h2))
    });
    let mut loop_header = TypedIxVec::<BlockIx, Option<BlockIx>>::new();
    loop_header.resize(nBlocks, None);
    let mut depth_map = TypedIxVec::<BlockIx, u32>::new();
    depth_map.resize(nBlocks, 0);
    for (hdr, blocks) in natural_loops.iter() {
      for b in blocks.iter() {
        if loop_header[*b].is_none() {
          loop_header[*b] = Some(*hdr);
        }
        depth_map[*b] += 1;
      }
    }
    //
    // === END compute loops

    debug!(
      "CFGInfo: {} blocks, {} reachable, {} retreating edges, {} loops",
      nBlocks,
      rpo.len(),
      retreating_edges.card(),
      natural_loops.len()
    );

    Ok(CFGInfo {
      succ_map,
      pred_map,
      eh_succ_map,
      full_pred_map,
      reachable,
      rpo,
      rpo_index,
      retreating_edges,
      dom_map,
      pdom_map,
      loop_header,
      depth_map,
      irreducible,
    })
  }

  pub fn num_blocks(&self) -> u32 {
    self.succ_map.len()
  }

  pub fn dominates(&self, a: BlockIx, b: BlockIx) -> bool {
    self.dom_map[b].contains(a)
  }

  pub fn post_dominates(&self, a: BlockIx, b: BlockIx) -> bool {
    self.pdom_map[b].contains(a)
  }

  /// Successors over normal and exception edges, minus retreating edges.
  pub fn acyclic_succs(&self, bix: BlockIx) -> Vec<BlockIx> {
    let mut v = Vec::new();
    for s in self.succ_map[bix].iter().chain(self.eh_succ_map[bix].iter()) {
      if !self.retreating_edges.contains((bix, *s)) && !v.contains(s) {
        v.push(*s);
      }
    }
    v
  }
}

fn reach_set<G>(start: BlockIx, next: G) -> Set<BlockIx>
where
  G: Fn(BlockIx) -> Vec<BlockIx>,
{
  let mut seen = Set::unit(start);
  let mut stack = vec![start];
  while let Some(b) = stack.pop() {
    for n in next(b) {
      if !seen.contains(n) {
        seen.insert(n);
        stack.push(n);
      }
    }
  }
  seen
}

// Calculate the dominance relationship, given |pred_map| and a start node
// |start|.  The resulting vector maps each block to the set of blocks that
// dominate it.  This algorithm is from Fig 7.14 of Muchnick 1997.  The
// algorithm is described as simple but not as performant as some others.
// Unreachable blocks are dominated by nothing but themselves.
#[inline(never)]
fn calc_dominators(
  pred_map: &TypedIxVec<BlockIx, Vec<BlockIx>>, rpo: &Vec<BlockIx>,
  reachable: &TypedIxVec<BlockIx, bool>, start: BlockIx,
) -> TypedIxVec<BlockIx, Set<BlockIx>> {
  debug!("calc_dominators: begin");
  let nBlocks = pred_map.len();
  let mut dom_map = TypedIxVec::<BlockIx, Set<BlockIx>>::new();
  let N: Set<BlockIx> = Set::from_vec(rpo.clone());
  dom_map.resize(nBlocks, Set::<BlockIx>::empty());
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    dom_map[bix] = if bix == start || !reachable[bix] {
      Set::unit(bix)
    } else {
      N.clone()
    };
  }
  let mut nnn = 0;
  loop {
    nnn += 1;
    let mut change = false;
    for bixN in rpo.iter() {
      if *bixN == start {
        continue;
      }
      let mut T = N.clone();
      for bixP in pred_map[*bixN].iter() {
        if reachable[*bixP] {
          T.intersect(&dom_map[*bixP]);
        }
      }
      T.insert(*bixN);
      if !T.equals(&dom_map[*bixN]) {
        change = true;
        dom_map[*bixN] = T;
      }
    }
    if !change {
      break;
    }
  }
  debug!("calc_dominators: end after {} rounds", nnn);
  dom_map
}

// The mirror image of |calc_dominators|, over |succ_map| (which must be
// acyclic).  Blocks with no successors sit directly above the virtual exit.
#[inline(never)]
fn calc_post_dominators(
  succ_map: &TypedIxVec<BlockIx, Vec<BlockIx>>, rpo: &Vec<BlockIx>,
  reachable: &TypedIxVec<BlockIx, bool>,
) -> TypedIxVec<BlockIx, Set<BlockIx>> {
  debug!("calc_post_dominators: begin");
  let nBlocks = succ_map.len();
  let N: Set<BlockIx> = Set::from_vec(rpo.clone());
  let mut pdom_map = TypedIxVec::<BlockIx, Set<BlockIx>>::new();
  pdom_map.resize(nBlocks, Set::<BlockIx>::empty());
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    pdom_map[bix] = Set::unit(bix);
  }
  // The graph is acyclic, so one pass in postorder (successors first)
  // reaches the fixpoint.
  for bixN in rpo.iter().rev() {
    let succs: Vec<BlockIx> = succ_map[*bixN]
      .iter()
      .filter(|s| reachable[**s])
      .cloned()
      .collect();
    if succs.is_empty() {
      continue;
    }
    let mut T = N.clone();
    for s in succs.iter() {
      T.intersect(&pdom_map[*s]);
    }
    T.insert(*bixN);
    pdom_map[*bixN] = T;
  }
  debug!("calc_post_dominators: end");
  pdom_map
}

//=============================================================================
// Computation of live-in and live-out sets

pub struct Liveness {
  pub livein: TypedIxVec<BlockIx, Set<Reg>>,
  pub liveout: TypedIxVec<BlockIx, Set<Reg>>,
  /// Registers live into some exception handler of the block.
  pub eh_live: TypedIxVec<BlockIx, Set<Reg>>,
}

// Returned TypedIxVecs contain one element per block
#[inline(never)]
fn calc_def_and_use<F: Function>(
  f: &F, reg_uses: &TypedIxVec<InstIx, InstRegUses>,
) -> (TypedIxVec<BlockIx, Set<Reg>>, TypedIxVec<BlockIx, Set<Reg>>) {
  let mut def_sets = TypedIxVec::new();
  let mut use_sets = TypedIxVec::new();
  for b in f.blocks() {
    let mut def = Set::empty();
    let mut uce = Set::empty();
    for iix in f.block_insns(b) {
      let ru = &reg_uses[iix];
      // Add to |uce|, any registers for which the first event in this block
      // is a read.
      for u in ru.used.iter() {
        if !def.contains(*u) {
          uce.insert(*u);
        }
      }
      for d in ru.defined.iter() {
        def.insert(*d);
      }
    }
    def_sets.push(def);
    use_sets.push(uce);
  }
  (def_sets, use_sets)
}

#[inline(never)]
pub fn calc_liveness<F: Function>(
  f: &F, reg_uses: &TypedIxVec<InstIx, InstRegUses>, cfg_info: &CFGInfo,
) -> Liveness {
  debug!("calc_liveness: begin");
  let nBlocks = cfg_info.num_blocks();
  let (def_sets, use_sets) = calc_def_and_use(f, reg_uses);
  let func_liveouts = f.func_liveouts();

  let mut liveouts = TypedIxVec::<BlockIx, Set<Reg>>::new();
  liveouts.resize(nBlocks, Set::empty());

  let succs_of = |bix: BlockIx| {
    cfg_info.succ_map[bix].iter().chain(cfg_info.eh_succ_map[bix].iter())
  };

  // Initialise the work queue so as to do a reverse preorder traversal
  // through the graph, after which blocks are re-evaluated on demand.
  let mut workQ = Queue::<BlockIx>::new();
  let mut in_queue = TypedIxVec::<BlockIx, bool>::new();
  in_queue.resize(nBlocks, false);
  for bix in cfg_info.rpo.iter().rev() {
    workQ.push_back(*bix);
    in_queue[*bix] = true;
  }
  // Unreachable blocks still get sets, so that nothing downstream has to
  // special-case them.
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    if !cfg_info.reachable[bix] {
      workQ.push_back(bix);
      in_queue[bix] = true;
    }
  }

  let mut nEvals = 0;
  while let Some(bixI) = workQ.pop_front() {
    in_queue[bixI] = false;
    let mut set = Set::<Reg>::empty();
    let mut has_succ = false;
    for bixJ in succs_of(bixI) {
      has_succ = true;
      let mut liveinJ = liveouts[*bixJ].clone();
      liveinJ.remove(&def_sets[*bixJ]);
      liveinJ.union(&use_sets[*bixJ]);
      set.union(&liveinJ);
    }
    if !has_succ {
      set.union(&func_liveouts);
    }
    nEvals += 1;

    if !set.equals(&liveouts[bixI]) {
      liveouts[bixI] = set;
      // Add |bixI|'s predecessors to the work queue, since their liveout
      // values might be affected.
      for bixJ in cfg_info.full_pred_map[bixI].iter() {
        if !in_queue[*bixJ] {
          workQ.push_back(*bixJ);
          in_queue[*bixJ] = true;
        }
      }
    }
  }

  let mut liveins = TypedIxVec::<BlockIx, Set<Reg>>::new();
  liveins.resize(nBlocks, Set::empty());
  for bixI in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    let mut liveinI = liveouts[bixI].clone();
    liveinI.remove(&def_sets[bixI]);
    liveinI.union(&use_sets[bixI]);
    liveins[bixI] = liveinI;
  }

  let mut eh_live = TypedIxVec::<BlockIx, Set<Reg>>::new();
  for bixI in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    let mut set = Set::empty();
    for h in cfg_info.eh_succ_map[bixI].iter() {
      set.union(&liveins[*h]);
    }
    eh_live.push(set);
  }

  debug!("calc_liveness: end after {} evaluations", nEvals);
  Liveness { livein: liveins, liveout: liveouts, eh_live }
}

//=============================================================================
// Top level for the analysis phase.

pub struct AnalysisInfo {
  pub cfg_info: CFGInfo,
  pub reg_uses: TypedIxVec<InstIx, InstRegUses>,
  pub liveness: Liveness,
  /// Number of real (non-pseudo) instructions per block.
  pub real_insn_counts: TypedIxVec<BlockIx, u32>,
}

#[inline(never)]
pub fn run_analysis<F: Function>(
  func: &F,
) -> Result<AnalysisInfo, AnalysisError> {
  let cfg_info = CFGInfo::create(func)?;

  let mut reg_uses = TypedIxVec::<InstIx, InstRegUses>::new();
  for insn in func.insns() {
    reg_uses.push(func.get_regs(insn));
  }

  let mut real_insn_counts = TypedIxVec::<BlockIx, u32>::new();
  for bix in func.blocks() {
    let n = func
      .block_insns(bix)
      .into_iter()
      .filter(|iix| !func.insn_desc(func.get_insn(*iix)).is_pseudo())
      .count();
    real_insn_counts.push(n as u32);
  }

  let liveness = calc_liveness(func, &reg_uses, &cfg_info);

  Ok(AnalysisInfo { cfg_info, reg_uses, liveness, real_insn_counts })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::test_func::*;

  #[test]
  fn liveness_follows_loops_and_handlers() {
    let mut f = TFunc::new();
    f.block(
      vec![alu("d1", v(1), &[]), alu("d3", v(3), &[]), branch("b0", &[])],
      &[1],
    );
    f.block_eh(
      vec![
        alu("u", v(3), &[v(3)]),
        throwing("t", &[]),
        branch("b1", &[v(3)]),
      ],
      &[1, 2],
      &[3],
    );
    f.block(vec![ret("r", &[v(3)])], &[]);
    f.block(vec![ret("h", &[v(1)])], &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let (b0, b1) = (BlockIx::new(0), BlockIx::new(1));
    assert_eq!(ainfo.cfg_info.full_pred_map[b1], vec![b0, b1]);
    assert_eq!(ainfo.cfg_info.full_pred_map[BlockIx::new(3)], vec![b1]);

    let live = &ainfo.liveness;
    // v1 only reaches the handler, over the exception edge.
    assert!(live.livein[b1].equals(&Set::from_vec(vec![v(1), v(3)])));
    assert!(live.liveout[b0].equals(&Set::from_vec(vec![v(1), v(3)])));
    assert_eq!(live.livein[b0].card(), 0);
    assert!(live.eh_live[b1].contains(v(1)));
    assert!(!live.eh_live[b1].contains(v(3)));
  }
}
