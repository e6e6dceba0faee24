/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Control dependence analysis: build the FCDG and partition the reachable
//! blocks into regions of control equivalent blocks.

use log::{debug, trace};

use crate::analysis::CFGInfo;
use crate::cdg::{CdgEdge, CdgNode, CdgRegion, Fcdg, NO_COND};
use crate::data_structures::{
  BlockIx, CdgEdgeIx, Map, RegionIx, Set, TypedIxVec,
};

// The condition value of the edge bixA -> bixS.  Branch outcomes are
// numbered by successor position; an exception edge, or the only normal
// edge of a block, isn't selected by a branch outcome.
fn edge_cond(cfg_info: &CFGInfo, bixA: BlockIx, bixS: BlockIx) -> i32 {
  let succs = &cfg_info.succ_map[bixA];
  if succs.len() < 2 {
    return NO_COND;
  }
  match succs.iter().position(|s| *s == bixS) {
    Some(pos) => pos as i32,
    None => NO_COND,
  }
}

/// Follow single-successor, single-predecessor edges from `bix`.  The
/// result starts with `bix` itself.
pub fn find_fallthrough_path(cfg_info: &CFGInfo, bix: BlockIx) -> Vec<BlockIx> {
  let mut path = vec![bix];
  let mut cur = bix;
  loop {
    if cfg_info.succ_map[cur].len() != 1 || !cfg_info.eh_succ_map[cur].is_empty()
    {
      break;
    }
    let next = cfg_info.succ_map[cur][0];
    if cfg_info.retreating_edges.contains((cur, next))
      || cfg_info.pred_map[next].len() != 1
      || path.contains(&next)
    {
      break;
    }
    path.push(next);
    cur = next;
  }
  path
}

#[inline(never)]
pub fn build_fcdg(cfg_info: &CFGInfo) -> Fcdg {
  let nBlocks = cfg_info.num_blocks();

  let mut nodes = TypedIxVec::<BlockIx, CdgNode>::new();
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    nodes.push(CdgNode::new(bix));
  }
  let mut edges = TypedIxVec::<CdgEdgeIx, CdgEdge>::new();

  // === BEGIN control dependence edges ===
  //
  // For an edge A -> S where S does not post-dominate A, every block that
  // post-dominates S but not A is control dependent on A (Ferrante,
  // Ottenstein and Warren).  Post-dominance is over the graph without
  // retreating edges, so no dependence arises from a back edge.
  let mut seen = Set::<(BlockIx, BlockIx, i32)>::empty();
  for bixA in cfg_info.rpo.iter() {
    for bixS in cfg_info.acyclic_succs(*bixA) {
      if cfg_info.post_dominates(bixS, *bixA) {
        continue;
      }
      let cond = edge_cond(cfg_info, *bixA, bixS);
      for bixY in cfg_info.pdom_map[bixS].to_vec() {
        if cfg_info.pdom_map[*bixA].contains(bixY) {
          continue;
        }
        if seen.contains((*bixA, bixY, cond)) {
          continue;
        }
        seen.insert((*bixA, bixY, cond));
        let eix = CdgEdgeIx::new(edges.len());
        trace!("  cd {:?}: {:?} -> {:?} cond {}", eix, bixA, bixY, cond);
        edges.push(CdgEdge { from: *bixA, to: bixY, cond });
        nodes[*bixA].out_edges.push(eix);
        nodes[bixY].in_edges.push(eix);
      }
    }
  }
  //
  // === END control dependence edges ===

  // === BEGIN group blocks ===
  //
  // Same control dependence set and same innermost loop.  Blocks on an
  // irreducible cycle stay alone.  Groups come out in reverse postorder,
  // so each is in topological order.
  let mut cd_sets = TypedIxVec::<BlockIx, Vec<(BlockIx, i32)>>::new();
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    let mut set: Vec<(BlockIx, i32)> = nodes[bix]
      .in_edges
      .iter()
      .map(|e| (edges[*e].from, edges[*e].cond))
      .collect();
    set.sort();
    set.dedup();
    cd_sets.push(set);
  }

  type Key = (Vec<(BlockIx, i32)>, Option<BlockIx>, Option<BlockIx>);
  let mut groups = Vec::<Vec<BlockIx>>::new();
  let mut group_keys = Map::<Key, usize>::default();
  for bix in cfg_info.rpo.iter() {
    let alone = if cfg_info.irreducible[*bix] { Some(*bix) } else { None };
    let key = (cd_sets[*bix].clone(), cfg_info.loop_header[*bix], alone);
    match group_keys.get(&key) {
      Some(gix) => groups[*gix].push(*bix),
      None => {
        group_keys.insert(key, groups.len());
        groups.push(vec![*bix]);
      }
    }
  }

  // Split groups whose root doesn't dominate everything: the remainder is
  // grouped again under its own first block.
  let mut split_groups = Vec::<Vec<BlockIx>>::new();
  for group in groups {
    let mut rest = group;
    while !rest.is_empty() {
      let root = rest[0];
      let (dominated, others): (Vec<BlockIx>, Vec<BlockIx>) =
        rest.into_iter().partition(|b| cfg_info.dominates(root, *b));
      split_groups.push(dominated);
      rest = others;
    }
  }

  // Extend along fallthrough chains: a block alone in its group joins the
  // group of its single predecessor in the same loop.
  let mut group_of = TypedIxVec::<BlockIx, Option<usize>>::new();
  group_of.resize(nBlocks, None);
  for (gix, group) in split_groups.iter().enumerate() {
    for bix in group.iter() {
      group_of[*bix] = Some(gix);
    }
  }
  for bix in cfg_info.rpo.iter() {
    let path = find_fallthrough_path(cfg_info, *bix);
    for pair in path.windows(2) {
      let (from, to) = (pair[0], pair[1]);
      let (gFrom, gTo) = match (group_of[from], group_of[to]) {
        (Some(a), Some(b)) => (a, b),
        _ => continue,
      };
      if gFrom == gTo
        || split_groups[gTo].len() != 1
        || cfg_info.irreducible[to]
        || cfg_info.irreducible[from]
        || cfg_info.loop_header[from] != cfg_info.loop_header[to]
      {
        continue;
      }
      debug!("build_fcdg: fallthrough {:?} joins {:?}", to, from);
      split_groups[gTo].clear();
      split_groups[gFrom].push(to);
      split_groups[gFrom].sort_by_key(|b| cfg_info.rpo_index[*b]);
      group_of[to] = Some(gFrom);
    }
  }
  //
  // === END group blocks ===

  let mut regions = TypedIxVec::<RegionIx, CdgRegion>::new();
  for group in split_groups.into_iter().filter(|g| !g.is_empty()) {
    let rix = RegionIx::new(regions.len());
    let root = group[0];
    for bix in group.iter() {
      nodes[*bix].region = Some(rix);
    }
    regions.push(CdgRegion {
      id: rix,
      cd_set: cd_sets[root].clone(),
      loop_header: cfg_info.loop_header[root],
      members: group,
    });
  }

  let mut fcdg = Fcdg { nodes, edges, regions };
  compute_region_paths(cfg_info, &mut fcdg);

  debug!(
    "build_fcdg: {} blocks, {} cd edges, {} regions",
    nBlocks,
    fcdg.edges.len(),
    fcdg.regions.len()
  );
  for region in fcdg.regions.iter() {
    if !region.is_single_block() {
      debug!("  {:?}", region);
    }
  }
  fcdg
}

// For every non-root member M of a multi-block region, find the earlier
// members reaching it without passing through another member, and the
// blocks outside the region lying on those paths.  The walks follow every
// edge, retreating and exception edges included, so inner loops between
// two members are covered whole.
fn compute_region_paths(cfg_info: &CFGInfo, fcdg: &mut Fcdg) {
  let nBlocks = cfg_info.num_blocks();
  let mut full_preds = TypedIxVec::<BlockIx, Vec<BlockIx>>::new();
  full_preds.resize(nBlocks, Vec::new());
  for bix in BlockIx::new(0).dotdot(BlockIx::new(nBlocks)) {
    for s in cfg_info.succ_map[bix].iter().chain(cfg_info.eh_succ_map[bix].iter())
    {
      if !full_preds[*s].contains(&bix) {
        full_preds[*s].push(bix);
      }
    }
  }
  let full_succs = |bix: BlockIx| -> Vec<BlockIx> {
    cfg_info.succ_map[bix]
      .iter()
      .chain(cfg_info.eh_succ_map[bix].iter())
      .cloned()
      .collect()
  };

  for rix in fcdg.regions.range() {
    let members = fcdg.regions[rix].members.clone();
    if members.len() < 2 {
      continue;
    }
    let memberSet = Set::from_vec(members.clone());
    for (pos, bixM) in members.iter().enumerate().skip(1) {
      // Backwards from M, stopping at members.
      let mut bwd = Set::<BlockIx>::empty();
      let mut hits = Set::<BlockIx>::empty();
      let mut stack = vec![*bixM];
      while let Some(b) = stack.pop() {
        for p in full_preds[b].iter() {
          if !cfg_info.reachable[*p] {
            continue;
          }
          if memberSet.contains(*p) {
            hits.insert(*p);
          } else if !bwd.contains(*p) {
            bwd.insert(*p);
            stack.push(*p);
          }
        }
      }
      let preds: Vec<BlockIx> = members[..pos]
        .iter()
        .filter(|b| hits.contains(**b))
        .cloned()
        .collect();

      // Forwards from those members, stopping at members.
      let mut fwd = Set::<BlockIx>::empty();
      let mut stack = preds.clone();
      while let Some(b) = stack.pop() {
        for s in full_succs(b) {
          if !memberSet.contains(s) && !fwd.contains(s) {
            fwd.insert(s);
            stack.push(s);
          }
        }
      }
      let mut between = bwd;
      between.intersect(&fwd);

      trace!(
        "  region {:?} member {:?}: preds {:?} between {:?}",
        rix,
        bixM,
        preds,
        between
      );
      fcdg.nodes[*bixM].region_preds = preds;
      fcdg.nodes[*bixM].between = between.to_vec();
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::analysis::CFGInfo;
  use crate::test_func::*;

  fn fcdg_of(f: &TFunc) -> (CFGInfo, Fcdg) {
    let cfg_info = CFGInfo::create(f).expect("cfg");
    let fcdg = build_fcdg(&cfg_info);
    (cfg_info, fcdg)
  }

  fn check_partition(cfg_info: &CFGInfo, fcdg: &Fcdg) {
    for bix in cfg_info.rpo.iter() {
      let owners = fcdg.regions.iter().filter(|r| r.contains(*bix)).count();
      assert_eq!(owners, 1, "{:?} is in {} regions", bix, owners);
    }
    assert_eq!(fcdg.covered_blocks().card(), cfg_info.rpo.len());
    for region in fcdg.regions.iter() {
      let root = region.root();
      for (i, m) in region.members.iter().enumerate() {
        assert!(cfg_info.dominates(root, *m));
        if i > 0 {
          assert!(cfg_info.rpo_index[region.members[i - 1]] < cfg_info.rpo_index[*m]);
          assert!(root != *m);
        }
      }
    }
  }

  fn diamond() -> TFunc {
    let mut f = TFunc::new();
    f.block(vec![alu("a", x(1), &[]), branch("b0", &[x(1)])], &[1, 2]);
    f.block(vec![alu("c", x(2), &[]), branch("b1", &[])], &[3]);
    f.block(vec![alu("d", x(2), &[]), branch("b2", &[])], &[3]);
    f.block(vec![ret("r", &[x(2)])], &[]);
    f
  }

  #[test]
  fn diamond_regions() {
    let f = diamond();
    let (cfg_info, fcdg) = fcdg_of(&f);
    check_partition(&cfg_info, &fcdg);
    let (b0, b1, b2, b3) =
      (BlockIx::new(0), BlockIx::new(1), BlockIx::new(2), BlockIx::new(3));
    assert_eq!(fcdg.cd_set(b1), vec![(b0, 0)]);
    assert_eq!(fcdg.cd_set(b2), vec![(b0, 1)]);
    assert!(fcdg.cd_set(b3).is_empty());
    assert_eq!(fcdg.region_of(b0), fcdg.region_of(b3));
    assert_ne!(fcdg.region_of(b1), fcdg.region_of(b2));
    assert_eq!(fcdg.nodes[b3].region_preds, vec![b0]);
    assert_eq!(fcdg.nodes[b3].between, vec![b1, b2]);
    assert!(fcdg.is_control_dependent(b1, b0));
  }

  #[test]
  fn loops_do_not_share_regions_with_their_outside() {
    // b0 -> b1 (header) -> b2 -> b1, b1 -> b3
    let mut f = TFunc::new();
    f.block(vec![branch("b0", &[])], &[1]);
    f.block(vec![branch("b1", &[])], &[2, 3]);
    f.block(vec![branch("b2", &[])], &[1]);
    f.block(vec![ret("r", &[])], &[]);
    let (cfg_info, fcdg) = fcdg_of(&f);
    check_partition(&cfg_info, &fcdg);
    let b1 = BlockIx::new(1);
    assert_eq!(cfg_info.loop_header[b1], Some(b1));
    assert_eq!(cfg_info.loop_header[BlockIx::new(2)], Some(b1));
    assert_ne!(fcdg.region_of(BlockIx::new(0)), fcdg.region_of(b1));
    // No dependence on the back edge.
    assert!(fcdg.edges.iter().all(|e| e.from != BlockIx::new(2)));
  }

  #[test]
  fn fallthrough_chains_stay_together() {
    let mut f = TFunc::new();
    f.block(vec![branch("b0", &[])], &[1]);
    f.block(vec![branch("b1", &[])], &[2]);
    f.block(vec![ret("r", &[])], &[]);
    let (cfg_info, fcdg) = fcdg_of(&f);
    check_partition(&cfg_info, &fcdg);
    assert_eq!(
      find_fallthrough_path(&cfg_info, BlockIx::new(0)),
      vec![BlockIx::new(0), BlockIx::new(1), BlockIx::new(2)]
    );
    assert_eq!(fcdg.regions.len(), 1);
    assert_eq!(fcdg.regions[RegionIx::new(0)].members.len(), 3);
  }

  #[test]
  fn unreachable_blocks_are_skipped() {
    let mut f = TFunc::new();
    f.block(vec![ret("r", &[])], &[]);
    f.block(vec![ret("dead", &[])], &[]);
    let (cfg_info, fcdg) = fcdg_of(&f);
    check_partition(&cfg_info, &fcdg);
    assert!(fcdg.region_of(BlockIx::new(1)).is_none());
  }

  #[test]
  fn exception_edges_create_dependence() {
    // b0 may throw to b2; b1 is then no longer equivalent to b0.
    let mut f = TFunc::new();
    f.block_eh(vec![throwing("t", &[]), branch("b0", &[])], &[1], &[2]);
    f.block(vec![ret("r", &[])], &[]);
    f.block(vec![ret("h", &[])], &[]);
    let (cfg_info, fcdg) = fcdg_of(&f);
    check_partition(&cfg_info, &fcdg);
    assert_eq!(fcdg.cd_set(BlockIx::new(1)), vec![(BlockIx::new(0), NO_COND)]);
    assert_ne!(fcdg.region_of(BlockIx::new(0)), fcdg.region_of(BlockIx::new(1)));
  }
}
