/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Exhaustive enumeration of the legal orders of small windows of a block,
//! to see how far the pressure scheduler is from the best peak pressure.
//! Only for testing and tuning: the enumeration is capped, and nothing it
//! finds is ever used as output.

use log::debug;

use crate::data_structures::{Map, NodeIx, PerClass, Reg, Set};
use crate::dep_graph::DepGraph;
use crate::reg_pressure::PressureTracker;

pub struct BruteForceResult {
  pub best: Vec<NodeIx>,
  pub best_max: PerClass<u32>,
  /// Orders completed or abandoned.
  pub series: u32,
  /// Every order was looked at.
  pub complete: bool,
}

fn score(max: &PerClass<u32>) -> u32 {
  max.iter().sum()
}

struct Search<'a> {
  g: &'a DepGraph,
  window: &'a [NodeIx],
  preds_left: Vec<u32>,
  succs: Vec<Vec<usize>>,
  done: Vec<bool>,
  prefix: Vec<NodeIx>,
  series: u32,
  max_series: u32,
  best: Option<(Vec<NodeIx>, PerClass<u32>)>,
}

impl<'a> Search<'a> {
  fn new(g: &'a DepGraph, window: &'a [NodeIx], max_series: u32) -> Self {
    let mut pos = Map::<NodeIx, usize>::default();
    for (i, nix) in window.iter().enumerate() {
      pos.insert(*nix, i);
    }
    let mut preds_left = vec![0; window.len()];
    let mut succs = vec![Vec::new(); window.len()];
    for (i, nix) in window.iter().enumerate() {
      for link in g.succ_nodes(*nix) {
        if let Some(j) = pos.get(&link.to) {
          succs[i].push(*j);
          preds_left[*j] += 1;
        }
      }
    }
    Self {
      g,
      window,
      preds_left,
      succs,
      done: vec![false; window.len()],
      prefix: Vec::with_capacity(window.len()),
      series: 0,
      max_series,
      best: None,
    }
  }

  fn dfs(&mut self, tracker: &PressureTracker) {
    if self.series >= self.max_series {
      return;
    }
    if let Some((_, best_max)) = self.best.as_ref() {
      // The peak never comes down again.
      if score(&tracker.max) >= score(best_max) {
        self.series += 1;
        return;
      }
    }
    if self.prefix.len() == self.window.len() {
      self.series += 1;
      self.best = Some((self.prefix.clone(), tracker.max));
      return;
    }
    for i in 0..self.window.len() {
      if self.done[i] || self.preds_left[i] > 0 {
        continue;
      }
      let nix = self.window[i];
      self.done[i] = true;
      for j in self.succs[i].clone() {
        self.preds_left[j] -= 1;
      }
      self.prefix.push(nix);
      let mut next = tracker.clone();
      next.apply(self.g, nix);
      self.dfs(&next);
      self.prefix.pop();
      for j in self.succs[i].clone() {
        self.preds_left[j] += 1;
      }
      self.done[i] = false;
    }
  }
}

/// The order of `window` with the lowest peak pressure, starting from
/// `tracker`.  Edges from nodes outside the window are taken as satisfied.
pub fn best_pressure_order(
  g: &DepGraph, window: &[NodeIx], tracker: &PressureTracker, max_series: u32,
) -> BruteForceResult {
  let mut search = Search::new(g, window, max_series);
  let mut start = tracker.clone();
  start.reset_max();
  search.dfs(&start);
  let complete = search.series < max_series;
  let (best, best_max) = match search.best {
    Some(b) => b,
    None => (window.to_vec(), start.max),
  };
  BruteForceResult { best, best_max, series: search.series, complete }
}

/// Walk `order` in windows of `window_size` nodes, and count the windows
/// where enumeration finds a lower peak than `order` has.
pub fn check_windows(
  g: &DepGraph, order: &[NodeIx], livein: &Set<Reg>, liveout: &Set<Reg>,
  window_size: usize, max_series: u32,
) -> u32 {
  let mut tracker = PressureTracker::new(g, livein, liveout);
  let mut worse = 0;
  for chunk in order.chunks(window_size.max(1)) {
    let found = best_pressure_order(g, chunk, &tracker, max_series);
    let mut mine = tracker.clone();
    mine.reset_max();
    for nix in chunk {
      mine.apply(g, *nix);
    }
    if score(&found.best_max) < score(&mine.max) {
      debug!(
        "check_windows: window at {:?}: {:?} could be {:?} ({} orders{})",
        chunk[0],
        mine.max,
        found.best_max,
        found.series,
        if found.complete { "" } else { ", capped" }
      );
      worse += 1;
    }
    tracker = mine;
  }
  worse
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::AArch64MemoryModel;
  use crate::analysis::run_analysis;
  use crate::data_dep::build_block_graph;
  use crate::data_dep_base::RuleEngine;
  use crate::data_structures::{BlockIx, RegClass};
  use crate::machine::MachineDesc;
  use crate::reg_pressure::schedule_for_pressure;
  use crate::test_func::*;

  fn setup() -> (DepGraph, Set<Reg>, Set<Reg>) {
    let mut f = TFunc::new();
    let b = f.block(
      vec![
        load("l1", v(1), x(0), 0),
        load("l2", v(2), x(0), 8),
        load("l3", v(3), x(0), 16),
        load("l4", v(4), x(0), 24),
        alu("a5", v(5), &[v(1), v(2)]),
        alu("a6", v(6), &[v(3), v(4)]),
        store("s5", v(5), x(0), 32),
        store("s6", v(6), x(0), 40),
      ],
      &[],
    );
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let g = build_block_graph(&f, &ainfo, &engine, b);
    let livein = ainfo.liveness.livein[BlockIx::new(0)].clone();
    let liveout = ainfo.liveness.liveout[BlockIx::new(0)].clone();
    (g, livein, liveout)
  }

  #[test]
  fn finds_the_best_peak() {
    let (g, livein, liveout) = setup();
    let all: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    let tracker = PressureTracker::new(&g, &livein, &liveout);
    let res = best_pressure_order(&g, &all, &tracker, 100_000);
    assert!(res.complete);
    assert_eq!(res.best_max[RegClass::I64.rc_to_usize()], 3);
    assert_eq!(res.best.len(), all.len());
  }

  #[test]
  fn heuristic_matches_enumeration() {
    let (mut g, livein, liveout) = setup();
    let res = schedule_for_pressure(&mut g, &livein, &liveout).expect("sched");
    assert_eq!(check_windows(&g, &res.order, &livein, &liveout, 8, 100_000), 0);
    // The input order loses against enumeration.
    let input: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    assert_eq!(check_windows(&g, &input, &livein, &liveout, 8, 100_000), 1);
  }

  #[test]
  fn enumeration_is_capped() {
    let (g, livein, liveout) = setup();
    let all: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    let tracker = PressureTracker::new(&g, &livein, &liveout);
    let res = best_pressure_order(&g, &all, &tracker, 1);
    assert!(!res.complete);
    assert_eq!(res.series, 1);
  }
}
