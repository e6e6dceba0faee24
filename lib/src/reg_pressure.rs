/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Scheduling a block for register pressure rather than latency.  Used
//! before register allocation.  Live registers are counted per class,
//! starting from the block's live-in set; a node that ends live ranges is
//! preferred over one that starts them.  When every ready node would raise
//! the pressure, the unscheduled ancestors of the node that would end the
//! most live ranges get their priority bumped, so that it becomes ready
//! soon.
//!
//! The result is only kept if its peak pressure is strictly better than the
//! input order's.

use log::{debug, trace};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::data_structures::{
  Map, NodeIx, PerClass, Reg, Set, NUM_REG_CLASSES,
};
use crate::dep_graph::{DepGraph, DepNode, RegPressure, ScheduleState};
use crate::interface::SchedError;

fn distinct(regs: &[Reg]) -> SmallVec<[Reg; 4]> {
  let mut out = SmallVec::<[Reg; 4]>::new();
  for r in regs {
    if !out.contains(r) {
      out.push(*r);
    }
  }
  out
}

//=============================================================================
// Pressure tracking

/// A register value: the register, and the node defining it or `None` for
/// the value live into the block.
type Value = (Reg, Option<NodeIx>);

/// Live registers at the current point of a (partial) order.
#[derive(Clone)]
pub struct PressureTracker {
  live: Set<Reg>,
  /// The value each real node reads, for every register it reads.
  reads: Rc<Map<NodeIx, SmallVec<[Value; 4]>>>,
  /// Reads of each value not issued yet.  Live-out values carry one extra
  /// read that never happens.
  remaining: Map<Value, u32>,
  pub cur: PerClass<u32>,
  pub max: PerClass<u32>,
}

impl PressureTracker {
  /// Nodes are in program order, so a forward walk finds the definition
  /// each read sees.
  pub fn new(g: &DepGraph, livein: &Set<Reg>, liveout: &Set<Reg>) -> Self {
    let mut reaching = Map::<Reg, NodeIx>::default();
    let mut reads = Map::default();
    let mut remaining = Map::<Value, u32>::default();
    for nix in g.nodes.range() {
      let node = &g.nodes[nix];
      if !node.is_real() {
        continue;
      }
      let values: SmallVec<[Value; 4]> = distinct(&node.regs.used)
        .iter()
        .map(|r| (*r, reaching.get(r).cloned()))
        .collect();
      for v in values.iter() {
        *remaining.entry(*v).or_insert(0) += 1;
      }
      reads.insert(nix, values);
      for r in distinct(&node.regs.defined) {
        reaching.insert(r, nix);
      }
    }
    for r in liveout.iter() {
      *remaining.entry((*r, reaching.get(r).cloned())).or_insert(0) += 1;
    }
    let mut cur = [0; NUM_REG_CLASSES];
    for r in livein.iter() {
      cur[r.get_class().rc_to_usize()] += 1;
    }
    Self {
      live: livein.clone(),
      reads: Rc::new(reads),
      remaining,
      cur,
      max: cur,
    }
  }

  fn remaining(&self, v: Value) -> u32 {
    self.remaining.get(&v).cloned().unwrap_or(0)
  }

  fn reads(&self, nix: NodeIx) -> &[Value] {
    match self.reads.get(&nix) {
      Some(vs) => &vs[..],
      None => &[],
    }
  }

  /// Change in live registers per class if `nix` were issued now, and how
  /// many of its definitions would be dead.
  pub fn effect(&self, g: &DepGraph, nix: NodeIx) -> (PerClass<i32>, u32) {
    let mut delta = [0i32; NUM_REG_CLASSES];
    let mut dead = 0;
    let node = &g.nodes[nix];
    if !node.is_real() {
      return (delta, dead);
    }
    let mut ended = SmallVec::<[Reg; 4]>::new();
    for (r, def) in self.reads(nix) {
      if self.remaining((*r, *def)) == 1 && self.live.contains(*r) {
        delta[r.get_class().rc_to_usize()] -= 1;
        ended.push(*r);
      }
    }
    for r in distinct(&node.regs.defined) {
      if self.remaining((r, Some(nix))) == 0 {
        dead += 1;
      } else if !self.live.contains(r) || ended.contains(&r) {
        delta[r.get_class().rc_to_usize()] += 1;
      }
    }
    (delta, dead)
  }

  /// Start measuring the peak afresh from the current point.
  pub fn reset_max(&mut self) {
    self.max = self.cur;
  }

  /// Number of live ranges `nix` ends, whether or not they have started.
  pub fn kills(&self, nix: NodeIx) -> u32 {
    self.reads(nix).iter().filter(|v| self.remaining(**v) == 1).count() as u32
  }

  pub fn apply(&mut self, g: &DepGraph, nix: NodeIx) {
    let node = &g.nodes[nix];
    if !node.is_real() {
      return;
    }
    let reads = Rc::clone(&self.reads);
    let values: &[Value] = match reads.get(&nix) {
      Some(vs) => &vs[..],
      None => &[],
    };
    for v in values {
      let left = self.remaining(*v).saturating_sub(1);
      self.remaining.insert(*v, left);
      if left == 0 && self.live.contains(v.0) {
        self.live.delete(v.0);
        self.cur[v.0.get_class().rc_to_usize()] -= 1;
      }
    }
    for r in distinct(&node.regs.defined) {
      if self.remaining((r, Some(nix))) > 0 && !self.live.contains(r) {
        self.live.insert(r);
        self.cur[r.get_class().rc_to_usize()] += 1;
      }
    }
    for i in 0..NUM_REG_CLASSES {
      self.max[i] = self.max[i].max(self.cur[i]);
    }
  }
}

/// Peak pressure per class of issuing `order` from the block's entry.
pub fn simulate_pressure(
  g: &DepGraph, order: &[NodeIx], livein: &Set<Reg>, liveout: &Set<Reg>,
) -> PerClass<u32> {
  let mut tracker = PressureTracker::new(g, livein, liveout);
  for nix in order {
    tracker.apply(g, *nix);
  }
  tracker.max
}

/// Is `a` no worse than `b` in every class and better in at least one?
pub fn strictly_better(a: &PerClass<u32>, b: &PerClass<u32>) -> bool {
  a.iter().zip(b.iter()).all(|(x, y)| x <= y)
    && a.iter().zip(b.iter()).any(|(x, y)| x < y)
}

//=============================================================================
// The scheduler

pub struct PressureResult {
  pub order: Vec<NodeIx>,
  /// The produced order wasn't better, and `order` is the input order.
  pub fell_back: bool,
  pub max_before: PerClass<u32>,
  pub max_after: PerClass<u32>,
}

// Static properties: longest path from a root, and the number of calls on
// the longest path to a leaf.
fn init_sidecars(g: &mut DepGraph) {
  for nix in g.nodes.range() {
    let depth = g
      .pred_nodes(nix)
      .map(|link| g.nodes[link.from].reg_pressure.as_ref().map_or(0, |rp| rp.depth + 1))
      .max()
      .unwrap_or(0);
    let has_fixed_reg = g.nodes[nix].has_fixed_reg();
    g.nodes[nix].reg_pressure =
      Some(RegPressure { depth, has_fixed_reg, ..RegPressure::default() });
  }
  for nix in g.nodes.range().into_iter().rev() {
    let below = g
      .succ_nodes(nix)
      .map(|link| g.nodes[link.to].reg_pressure.as_ref().map_or(0, |rp| rp.call_count))
      .max()
      .unwrap_or(0);
    let own = if g.nodes[nix].props.is_call { 1 } else { 0 };
    if let Some(rp) = g.nodes[nix].reg_pressure.as_mut() {
      rp.call_count = below + own;
    }
  }
}

fn sidecar(node: &DepNode) -> RegPressure {
  node.reg_pressure.clone().unwrap_or_default()
}

// Raise every unscheduled ancestor of `target` to priority `prio`.  Breadth
// first, so each ancestor records its shortest distance to `target`.
fn boost_ancestors(g: &mut DepGraph, target: NodeIx, prio: u32) {
  let mut queue = VecDeque::new();
  queue.push_back((target, 0));
  let mut seen = Set::<NodeIx>::empty();
  while let Some((nix, dist)) = queue.pop_front() {
    let preds: Vec<NodeIx> = g.pred_nodes(nix).map(|l| l.from).collect();
    for p in preds {
      if seen.contains(p) || g.nodes[p].state() == ScheduleState::Scheduled {
        continue;
      }
      seen.insert(p);
      if let Some(rp) = g.nodes[p].reg_pressure.as_mut() {
        if rp.priority < prio {
          rp.priority = prio;
          rp.proximity = dist + 1;
        }
      }
      queue.push_back((p, dist + 1));
    }
  }
}

fn increases(delta: &PerClass<i32>) -> bool {
  delta.iter().any(|d| *d > 0)
}

/// `Greater` if `a` should be issued before `b`.
fn compare(g: &DepGraph, a: NodeIx, b: NodeIx) -> Ordering {
  let (na, nb) = (&g.nodes[a], &g.nodes[b]);
  let (ra, rb) = (sidecar(na), sidecar(nb));
  let inc = |rp: &RegPressure| increases(&rp.pressure_delta);
  ra.priority
    .cmp(&rb.priority)
    .then_with(|| inc(&rb).cmp(&inc(&ra)))
    .then_with(|| ra.call_count.cmp(&rb.call_count))
    .then_with(|| rb.depth.cmp(&ra.depth))
    .then_with(|| rb.proximity.cmp(&ra.proximity))
    .then_with(|| na.succs.len().cmp(&nb.succs.len()))
    .then_with(|| rb.has_fixed_reg.cmp(&ra.has_fixed_reg))
    .then_with(|| b.cmp(&a))
}

/// Schedule a single-block graph for register pressure.
#[inline(never)]
pub fn schedule_for_pressure(
  g: &mut DepGraph, livein: &Set<Reg>, liveout: &Set<Reg>,
) -> Result<PressureResult, SchedError> {
  let input: Vec<NodeIx> = g.nodes.range().into_iter().collect();
  let max_before = simulate_pressure(g, &input, livein, liveout);

  init_sidecars(g);
  let mut tracker = PressureTracker::new(g, livein, liveout);
  let mut order = Vec::with_capacity(input.len());
  let mut next_prio = 1;
  for nix in input.iter() {
    g.nodes[*nix].set_state(ScheduleState::Candidate);
  }

  while order.len() < input.len() {
    let mut ready = Vec::new();
    for nix in input.iter() {
      let node = &mut g.nodes[*nix];
      if node.state() == ScheduleState::Candidate && node.unresolved_preds == 0
      {
        node.set_state(ScheduleState::Ready);
      }
      if node.state() == ScheduleState::Ready {
        ready.push(*nix);
      }
    }
    if ready.is_empty() {
      return Err(SchedError::Internal(format!(
        "pressure scheduler stalled with {} of {} nodes scheduled",
        order.len(),
        input.len()
      )));
    }

    // Separators and empty nodes cost nothing.
    let free = ready.iter().find(|n| !g.nodes[**n].is_real()).cloned();
    let chosen = match free {
      Some(nix) => nix,
      None => {
        for nix in ready.iter() {
          let (delta, dead) = tracker.effect(g, *nix);
          if let Some(rp) = g.nodes[*nix].reg_pressure.as_mut() {
            rp.pressure_delta = delta;
            rp.dead_defs = dead;
          }
        }
        let all_increase = ready.iter().all(|n| {
          g.nodes[*n]
            .reg_pressure
            .as_ref()
            .map_or(false, |rp| increases(&rp.pressure_delta))
        });
        if all_increase {
          let target = input
            .iter()
            .filter(|n| g.nodes[**n].state() == ScheduleState::Candidate)
            .max_by(|a, b| {
              let (ka, kb) = (tracker.kills(**a), tracker.kills(**b));
              ka.cmp(&kb).then_with(|| b.cmp(a))
            })
            .cloned();
          if let Some(t) = target {
            if tracker.kills(t) > 0 {
              trace!("  boost ancestors of {:?} to {}", t, next_prio);
              boost_ancestors(g, t, next_prio);
              next_prio += 1;
            }
          }
        }
        let mut best = ready[0];
        for nix in ready.iter().skip(1) {
          if compare(g, *nix, best) == Ordering::Greater {
            best = *nix;
          }
        }
        best
      }
    };

    trace!("  pressure pick {:?} live {:?}", chosen, tracker.cur);
    tracker.apply(g, chosen);
    g.nodes[chosen].set_state(ScheduleState::Scheduled);
    let succs: Vec<NodeIx> = g.succ_nodes(chosen).map(|l| l.to).collect();
    for s in succs {
      let node = &mut g.nodes[s];
      if node.unresolved_preds == 0 {
        return Err(SchedError::Internal(format!(
          "{:?}: more predecessors scheduled than it has",
          s
        )));
      }
      node.unresolved_preds -= 1;
    }
    order.push(chosen);
  }

  let max_after = tracker.max;
  let fell_back = !strictly_better(&max_after, &max_before);
  debug!(
    "schedule_for_pressure: max {:?} -> {:?}{}",
    max_before,
    max_after,
    if fell_back { ", keeping the input order" } else { "" }
  );
  Ok(PressureResult {
    order: if fell_back { input } else { order },
    fell_back,
    max_before,
    max_after,
  })
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
  use crate::test_func::*;

  fn four_loads() -> Vec<TInsn> {
    vec![
      load("l1", v(1), x(0), 0),
      load("l2", v(2), x(0), 8),
      load("l3", v(3), x(0), 16),
      load("l4", v(4), x(0), 24),
      alu("a5", v(5), &[v(1), v(2)]),
      alu("a6", v(6), &[v(3), v(4)]),
      store("s5", v(5), x(0), 32),
      store("s6", v(6), x(0), 40),
    ]
  }

  fn graph_of(insns: Vec<TInsn>) -> (DepGraph, Set<Reg>, Set<Reg>) {
    let mut f = TFunc::new();
    let b = f.block(insns, &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let g = build_block_graph(&f, &ainfo, &engine, b);
    let livein = ainfo.liveness.livein[BlockIx::new(0)].clone();
    let liveout = ainfo.liveness.liveout[BlockIx::new(0)].clone();
    (g, livein, liveout)
  }

  fn i64_max(p: &PerClass<u32>) -> u32 {
    p[RegClass::I64.rc_to_usize()]
  }

  #[test]
  fn interleaves_to_shorten_live_ranges() {
    let (mut g, livein, liveout) = graph_of(four_loads());
    assert!(livein.contains(x(0)));
    let res = schedule_for_pressure(&mut g, &livein, &liveout).expect("sched");
    assert!(!res.fell_back);
    assert_eq!(i64_max(&res.max_before), 5);
    assert_eq!(i64_max(&res.max_after), 3);
    let insns: Vec<u32> =
      res.order.iter().map(|n| g.nodes[*n].insn.unwrap().get()).collect();
    assert_eq!(insns, vec![0, 1, 4, 6, 2, 3, 5, 7]);
  }

  #[test]
  fn keeps_input_order_unless_strictly_better() {
    let (mut g, livein, liveout) = graph_of(vec![
      load("l", v(1), x(0), 0),
      alu("a", v(2), &[v(1)]),
      store("s", v(2), x(0), 8),
    ]);
    let res = schedule_for_pressure(&mut g, &livein, &liveout).expect("sched");
    assert!(res.fell_back);
    assert_eq!(res.order, vec![NodeIx::new(0), NodeIx::new(1), NodeIx::new(2)]);
  }

  #[test]
  fn dead_definitions_do_not_count() {
    let (g, livein, liveout) =
      graph_of(vec![alu("dead", v(1), &[]), alu("used", v(2), &[]), store("s", v(2), x(0), 0)]);
    let tracker = PressureTracker::new(&g, &livein, &liveout);
    let (delta, dead) = tracker.effect(&g, NodeIx::new(0));
    assert_eq!(dead, 1);
    assert_eq!(delta[RegClass::I64.rc_to_usize()], 0);
    let (delta, dead) = tracker.effect(&g, NodeIx::new(1));
    assert_eq!(dead, 0);
    assert_eq!(delta[RegClass::I64.rc_to_usize()], 1);
  }

  #[test]
  fn redefined_registers_are_separate_values() {
    let (g, livein, liveout) = graph_of(vec![
      alu("d1", v(1), &[]),
      alu("u1", v(2), &[v(1)]),
      alu("d4", v(4), &[]),
      alu("u4", v(5), &[v(2), v(4)]),
      alu("d2", v(1), &[]),
      alu("u2", v(3), &[v(1), v(5)]),
      store("s", v(3), x(0), 0),
    ]);
    let tracker = PressureTracker::new(&g, &livein, &liveout);
    // u1 ends the first value of v1 even though v1 is read again later.
    assert_eq!(tracker.kills(NodeIx::new(1)), 1);
    let mut after_d1 = tracker.clone();
    after_d1.apply(&g, NodeIx::new(0));
    let (delta, _) = after_d1.effect(&g, NodeIx::new(1));
    assert_eq!(delta[RegClass::I64.rc_to_usize()], 0);

    // x0, v2 and v4 at most; v1 is dead between u1 and d2.
    let input: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    let max = simulate_pressure(&g, &input, &livein, &liveout);
    assert_eq!(i64_max(&max), 3);
  }

  #[test]
  fn dead_definition_before_a_live_one() {
    let (g, livein, liveout) = graph_of(vec![
      alu("dead", v(1), &[]),
      alu("d", v(1), &[]),
      alu("u", v(2), &[v(1)]),
      store("s", v(2), x(0), 0),
    ]);
    let tracker = PressureTracker::new(&g, &livein, &liveout);
    let (delta, dead) = tracker.effect(&g, NodeIx::new(0));
    assert_eq!(dead, 1);
    assert_eq!(delta[RegClass::I64.rc_to_usize()], 0);
    let (delta, dead) = tracker.effect(&g, NodeIx::new(1));
    assert_eq!(dead, 0);
    assert_eq!(delta[RegClass::I64.rc_to_usize()], 1);
  }

  #[test]
  fn nearer_ancestors_go_first() {
    let (mut g, _, _) = graph_of(vec![
      alu("p1", v(1), &[]),
      alu("p2", v(2), &[]),
      alu("m", v(3), &[v(1)]),
      alu("t", v(4), &[v(3), v(2)]),
      store("s", v(4), x(0), 0),
    ]);
    let n = NodeIx::new;
    init_sidecars(&mut g);
    boost_ancestors(&mut g, n(3), 1);
    let prox = |g: &DepGraph, i| sidecar(&g.nodes[n(i)]).proximity;
    assert_eq!((prox(&g, 0), prox(&g, 1), prox(&g, 2)), (2, 1, 1));
    assert_eq!(sidecar(&g.nodes[n(4)]).priority, 0);
    // Same priority and depth; p2 feeds t directly.
    assert_eq!(compare(&g, n(1), n(0)), Ordering::Greater);
  }

  #[test]
  fn live_out_registers_stay_live() {
    let mut f = TFunc::new();
    f.liveouts = Set::unit(v(1));
    let b = f.block(vec![alu("d", v(1), &[]), alu("u", v(2), &[v(1)])], &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let g = build_block_graph(&f, &ainfo, &engine, b);
    let order = vec![NodeIx::new(0), NodeIx::new(1)];
    let max = simulate_pressure(
      &g,
      &order,
      &ainfo.liveness.livein[b],
      &ainfo.liveness.liveout[b],
    );
    // v2 is dead; v1 is live to the end.
    assert_eq!(i64_max(&max), 1);
  }
}
