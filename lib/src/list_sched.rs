/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The cycle-driven list scheduler.  A backward pass computes each node's
//! delay (the longest latency-weighted path to the end of the graph); then
//! for every cycle the best ready node whose units are free is issued, until
//! nothing more fits and the clock moves on.
//!
//! In a region, members are scheduled in order with one clock.  While a
//! member is scheduled, hoistable nodes of later members are candidates too,
//! and are used to fill cycles its own nodes leave empty.

use log::{debug, trace};
use std::cmp::Ordering;

use crate::data_structures::{BlockIx, NodeIx, Reg, Set};
use crate::dep_graph::{DepGraph, DepNode, DepType, ScheduleState};
use crate::interface::{OpClass, PriorityPolicy, SchedError};
use crate::machine::{MachineDesc, ResourceTable};

/// Cycles without issuing anything before the scheduler gives up.  No
/// latency or unit occupancy comes anywhere near this.
const MAX_IDLE_CYCLES: u32 = 256;

//=============================================================================
// Priorities

/// Fill in `delay` and `l_start` for every node.  Edges point forwards, so
/// one walk in reverse index order sees every successor first.
#[inline(never)]
pub fn compute_priorities(machine: &MachineDesc, g: &mut DepGraph) {
  let mut critical = 0;
  for nix in g.nodes.range().into_iter().rev() {
    let mut delay = if g.nodes[nix].is_real() {
      machine.latency(g.nodes[nix].class)
    } else {
      0
    };
    for link in g.succ_nodes(nix) {
      delay = delay.max(link.latency + g.nodes[link.to].delay);
    }
    g.nodes[nix].delay = delay;
    critical = critical.max(delay);
  }
  for node in g.nodes.iter_mut() {
    node.l_start = critical - node.delay;
  }
}

/// Can this node be moved up into an earlier member of its region?
pub fn is_hoistable(node: &DepNode) -> bool {
  let p = &node.props;
  node.is_real()
    && !p.is_control_flow()
    && !p.is_call
    && !p.is_atomic
    && !p.is_barrier
    && !p.is_inline_asm
    && !p.may_throw
    && node.class != OpClass::Clinit
    && node.cfis.is_empty()
    && node.clinits.is_empty()
}

/// Issue `order` in sequence on an empty machine and return the number of
/// cycles until the last result is available.
pub fn simulate_order(
  machine: &MachineDesc, g: &DepGraph, order: &[NodeIx],
) -> u32 {
  let mut rt = ResourceTable::new(machine);
  let mut issued = vec![None; g.num_nodes() as usize];
  let mut not_before = 0;
  let mut end = 0;
  for nix in order {
    let node = &g.nodes[*nix];
    let mut start = not_before;
    for link in g.pred_nodes(*nix) {
      if let Some(c) = issued[link.from.get() as usize] {
        start = start.max(c + link.latency);
      }
    }
    while rt.cycle() < start {
      rt.advance();
    }
    if node.is_real() {
      let res = machine.reservation(node.class);
      while !rt.occupy(res) {
        rt.advance();
      }
      not_before = rt.cycle() + res.forced_gap;
      end = end.max(rt.cycle() + res.latency);
    }
    issued[nix.get() as usize] = Some(rt.cycle());
  }
  end
}

//=============================================================================
// The scheduler

pub struct ListScheduler<'a> {
  machine: &'a MachineDesc,
  policy: PriorityPolicy,
  rt: ResourceTable,
  /// Nothing is issued before this cycle.
  gap_until: u32,
  /// The last real node issued.
  last: Option<NodeIx>,
  /// Base, offset and size of the last memory access issued.
  last_mem: Option<(Reg, i64, u32)>,
  pub num_moved: u32,
}

impl<'a> ListScheduler<'a> {
  pub fn new(machine: &'a MachineDesc, policy: PriorityPolicy) -> Self {
    Self {
      machine,
      policy,
      rt: ResourceTable::new(machine),
      gap_until: 0,
      last: None,
      last_mem: None,
      num_moved: 0,
    }
  }

  /// Schedule every node of a single-block graph.
  #[inline(never)]
  pub fn schedule_block(
    &mut self, g: &mut DepGraph,
  ) -> Result<Vec<NodeIx>, SchedError> {
    compute_priorities(self.machine, g);
    let own: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    self.run(g, &own, &[], &[])
  }

  /// Schedule a region's graph member by member.  `hoist_ok[i]` says whether
  /// nodes of later members may move into `members[i]`.  Returns the new
  /// node order of each member.
  #[inline(never)]
  pub fn schedule_region(
    &mut self, g: &mut DepGraph, members: &[BlockIx], hoist_ok: &[bool],
  ) -> Result<Vec<(BlockIx, Vec<NodeIx>)>, SchedError> {
    compute_priorities(self.machine, g);
    let mut result = Vec::with_capacity(members.len());
    for (pos, bix) in members.iter().enumerate() {
      let own: Vec<NodeIx> = g
        .nodes
        .range()
        .into_iter()
        .filter(|n| {
          let node = &g.nodes[*n];
          node.block == *bix && node.state() != ScheduleState::Scheduled
        })
        .collect();
      let foreign: Vec<NodeIx> = if hoist_ok[pos] {
        let later = &members[pos + 1..];
        g.nodes
          .range()
          .into_iter()
          .filter(|n| {
            let node = &g.nodes[*n];
            later.contains(&node.block)
              && node.state() != ScheduleState::Scheduled
              && is_hoistable(node)
          })
          .collect()
      } else {
        Vec::new()
      };
      // The block's branches stay at its end.
      let tail: Vec<NodeIx> = own
        .iter()
        .cloned()
        .filter(|n| g.nodes[*n].props.is_control_flow())
        .collect();
      trace!(
        "schedule_region: {:?}: {} own, {} foreign, tail {:?}",
        bix,
        own.len(),
        foreign.len(),
        tail
      );
      let order = self.run(g, &own, &foreign, &tail)?;
      for nix in order.iter() {
        if g.nodes[*nix].block != *bix {
          debug!("schedule_region: {:?} moves up into {:?}", nix, bix);
          self.num_moved += 1;
        }
      }
      result.push((*bix, order));
    }
    Ok(result)
  }

  //---------------------------------------------------------------------------
  // One run: schedule all of `own`, plus whatever of `foreign` fits.  Nodes
  // of `tail` go last, once everything else of `own` is out.

  fn run(
    &mut self, g: &mut DepGraph, own: &[NodeIx], foreign: &[NodeIx],
    tail: &[NodeIx],
  ) -> Result<Vec<NodeIx>, SchedError> {
    for nix in own.iter().chain(foreign.iter()) {
      let node = &mut g.nodes[*nix];
      if node.state() < ScheduleState::Candidate {
        node.set_state(ScheduleState::Candidate);
      }
    }
    let own_set = Set::from_vec(own.to_vec());
    let tail_set = Set::from_vec(tail.to_vec());
    let mut own_left = own.len();
    let mut tail_left = tail
      .iter()
      .filter(|n| g.nodes[**n].state() != ScheduleState::Scheduled)
      .count();
    let mut out = Vec::with_capacity(own.len());
    let mut idle = 0;

    while own_left > 0 {
      let tail_open = own_left == tail_left;
      if self.policy == PriorityPolicy::DependenceOrder {
        let nix = self.select_by_order(g, own, &tail_set, tail_open)?;
        self.issue(g, nix, &mut out, false)?;
        own_left -= 1;
        if tail_set.contains(nix) {
          tail_left -= 1;
        }
        continue;
      }

      let cycle = self.rt.cycle();
      self.promote(g, own);
      self.promote(g, foreign);

      let choice = if cycle >= self.gap_until {
        self
          .select(g, own, &tail_set, tail_open)
          .or_else(|| self.select(g, foreign, &tail_set, tail_open))
      } else {
        None
      };

      match choice {
        Some(nix) => {
          idle = 0;
          self.issue(g, nix, &mut out, true)?;
          if own_set.contains(nix) {
            own_left -= 1;
          }
          if tail_set.contains(nix) {
            tail_left -= 1;
          }
          if let Some(partner) = self.fusable_partner(g, nix, &own_set, foreign)
          {
            trace!("  fuse {:?} with {:?}", partner, nix);
            self.issue(g, partner, &mut out, false)?;
            if own_set.contains(partner) {
              own_left -= 1;
            }
          }
        }
        None => {
          if !self.anything_pending(g, own) {
            return Err(SchedError::Internal(format!(
              "list scheduler stalled at cycle {} with {} nodes left",
              cycle, own_left
            )));
          }
          idle += 1;
          if idle > MAX_IDLE_CYCLES {
            return Err(SchedError::Internal(format!(
              "list scheduler made no progress for {} cycles",
              idle
            )));
          }
          self.rt.advance();
        }
      }
    }
    Ok(out)
  }

  // Candidates whose predecessors are all out become Ready once their
  // earliest cycle has come and their units are free, and wait until then.
  fn promote(&self, g: &mut DepGraph, nodes: &[NodeIx]) {
    let cycle = self.rt.cycle();
    for nix in nodes {
      let node = &mut g.nodes[*nix];
      let state = node.state();
      let pending =
        state == ScheduleState::Candidate || state == ScheduleState::Waiting;
      if node.unresolved_preds != 0 || !pending {
        continue;
      }
      let units_free = !node.is_real()
        || self.rt.is_free(self.machine.reservation(node.class));
      if node.e_start <= cycle && units_free {
        node.set_state(ScheduleState::Ready);
      } else if state == ScheduleState::Candidate {
        node.set_state(ScheduleState::Waiting);
      }
    }
  }

  // Could an unscheduled node of `own` still become ready?
  fn anything_pending(&self, g: &DepGraph, own: &[NodeIx]) -> bool {
    own.iter().any(|n| {
      let node = &g.nodes[*n];
      match node.state() {
        ScheduleState::Ready | ScheduleState::Waiting => true,
        _ => false,
      }
    })
  }

  fn is_selectable(
    &self, g: &DepGraph, nix: NodeIx, tail: &Set<NodeIx>, tail_open: bool,
  ) -> bool {
    let node = &g.nodes[nix];
    if node.state() != ScheduleState::Ready {
      return false;
    }
    if !tail_open && tail.contains(nix) {
      return false;
    }
    !node.is_real() || self.rt.is_free(self.machine.reservation(node.class))
  }

  fn select(
    &self, g: &DepGraph, cands: &[NodeIx], tail: &Set<NodeIx>,
    tail_open: bool,
  ) -> Option<NodeIx> {
    let ready: Vec<NodeIx> = cands
      .iter()
      .cloned()
      .filter(|n| self.is_selectable(g, *n, tail, tail_open))
      .collect();
    let usage = self.unit_usage(g, &ready);
    let mut best: Option<NodeIx> = None;
    for nix in ready {
      best = match best {
        None => Some(nix),
        Some(b) => {
          if self.compare(g, nix, b, &usage) == Ordering::Greater {
            Some(nix)
          } else {
            Some(b)
          }
        }
      };
    }
    best
  }

  // Dependence-order self test: the ready node that comes last in program
  // order, ignoring latencies and units.
  fn select_by_order(
    &self, g: &mut DepGraph, own: &[NodeIx], tail: &Set<NodeIx>,
    tail_open: bool,
  ) -> Result<NodeIx, SchedError> {
    let pick = own
      .iter()
      .rev()
      .find(|n| {
        let node = &g.nodes[**n];
        node.state() != ScheduleState::Scheduled
          && node.unresolved_preds == 0
          && (tail_open || !tail.contains(**n))
      })
      .cloned();
    match pick {
      Some(nix) => {
        g.nodes[nix].set_state(ScheduleState::Ready);
        Ok(nix)
      }
      None => Err(SchedError::Internal(
        "dependence order: no ready node".to_string(),
      )),
    }
  }

  // How many of the ready nodes could use each unit.
  fn unit_usage(&self, g: &DepGraph, ready: &[NodeIx]) -> Vec<u32> {
    let mut usage = vec![0; self.machine.num_units()];
    if self.policy != PriorityPolicy::CriticalPath {
      return usage;
    }
    for nix in ready {
      let node = &g.nodes[*nix];
      if !node.is_real() {
        continue;
      }
      let res = self.machine.reservation(node.class);
      for (u, count) in usage.iter_mut().enumerate() {
        if res.may_use(u as u32) {
          *count += 1;
        }
      }
    }
    usage
  }

  fn unit_pressure(&self, node: &DepNode, usage: &[u32]) -> u32 {
    if !node.is_real() {
      return 0;
    }
    let res = self.machine.reservation(node.class);
    (0..usage.len())
      .filter(|u| res.may_use(*u as u32))
      .map(|u| usage[u])
      .max()
      .unwrap_or(0)
  }

  fn num_choices(&self, node: &DepNode) -> usize {
    if node.is_real() {
      self.machine.reservation(node.class).num_choices()
    } else {
      0
    }
  }

  // Loads before stores, and the access right next to the last one first.
  fn mem_rank(&self, node: &DepNode) -> u32 {
    match node.mem.as_ref() {
      None => 0,
      Some(op) => {
        let near = match (op.base, self.last_mem) {
          (Some(base), Some((last_base, off, size))) => {
            base == last_base && (op.offset - off).abs() == size as i64
          }
          _ => false,
        };
        (if near { 2 } else { 0 }) + (if op.is_load() { 1 } else { 0 })
      }
    }
  }

  // How the node depends on the last one issued: true over anti or output
  // over any other edge over none.
  fn dep_rank(&self, g: &DepGraph, nix: NodeIx) -> u32 {
    let last = match self.last {
      Some(last) => last,
      None => return 0,
    };
    match g.dep_type(last, nix) {
      DepType::True => 3,
      DepType::Anti | DepType::Output => 2,
      DepType::None => 0,
      _ => 1,
    }
  }

  /// `Greater` if `a` should be issued before `b`.
  fn compare(
    &self, g: &DepGraph, a: NodeIx, b: NodeIx, usage: &[u32],
  ) -> Ordering {
    let (na, nb) = (&g.nodes[a], &g.nodes[b]);
    match self.policy {
      PriorityPolicy::CriticalPath => nb
        .l_start
        .cmp(&na.l_start)
        .then_with(|| {
          self.unit_pressure(na, usage).cmp(&self.unit_pressure(nb, usage))
        })
        .then_with(|| self.num_choices(nb).cmp(&self.num_choices(na)))
        .then_with(|| na.succs.len().cmp(&nb.succs.len()))
        .then_with(|| b.cmp(&a)),
      _ => na
        .delay
        .cmp(&nb.delay)
        .then_with(|| self.mem_rank(na).cmp(&self.mem_rank(nb)))
        .then_with(|| self.dep_rank(g, a).cmp(&self.dep_rank(g, b)))
        .then_with(|| na.succs.len().cmp(&nb.succs.len()))
        .then_with(|| b.cmp(&a)),
    }
  }

  // The other half of a load/store pair, if it can go out right now as
  // part of the same instruction.
  fn fusable_partner(
    &self, g: &DepGraph, nix: NodeIx, own: &Set<NodeIx>, foreign: &[NodeIx],
  ) -> Option<NodeIx> {
    let partner = g.nodes[nix].pair?;
    let node = &g.nodes[partner];
    let candidate = own.contains(partner) || foreign.contains(&partner);
    if candidate
      && node.state() != ScheduleState::Scheduled
      && node.unresolved_preds == 0
      && node.e_start <= self.rt.cycle()
    {
      Some(partner)
    } else {
      None
    }
  }

  fn issue(
    &mut self, g: &mut DepGraph, nix: NodeIx, out: &mut Vec<NodeIx>,
    use_units: bool,
  ) -> Result<(), SchedError> {
    let cycle = self.rt.cycle();
    let (is_real, class) = (g.nodes[nix].is_real(), g.nodes[nix].class);
    if is_real && use_units {
      let res = self.machine.reservation(class);
      if !self.rt.occupy(res) {
        return Err(SchedError::Internal(format!(
          "{:?}: units busy at cycle {}",
          nix, cycle
        )));
      }
      if res.forced_gap > 0 {
        self.gap_until = cycle + res.forced_gap;
      }
    }
    trace!("  issue {:?} at cycle {}", nix, cycle);
    {
      let node = &mut g.nodes[nix];
      if node.state() < ScheduleState::Ready {
        node.set_state(ScheduleState::Ready);
      }
      node.set_state(ScheduleState::Scheduled);
      node.sched_cycle = cycle;
    }
    let succs: Vec<(NodeIx, u32)> =
      g.succ_nodes(nix).map(|link| (link.to, link.latency)).collect();
    for (to, latency) in succs {
      let succ = &mut g.nodes[to];
      if succ.unresolved_preds == 0 {
        return Err(SchedError::Internal(format!(
          "{:?}: more predecessors scheduled than it has",
          to
        )));
      }
      succ.unresolved_preds -= 1;
      succ.e_start = succ.e_start.max(cycle + latency);
    }
    if is_real {
      self.last = Some(nix);
      if let Some(op) = g.nodes[nix].mem.as_ref() {
        self.last_mem = op.base.map(|base| (base, op.offset, op.size));
      }
    }
    out.push(nix);
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::AArch64MemoryModel;
  use crate::analysis::run_analysis;
  use crate::control_dep::build_fcdg;
  use crate::data_dep::{build_block_graph, build_region_graph};
  use crate::data_dep_base::RuleEngine;
  use crate::test_func::*;

  fn block_graph(insns: Vec<TInsn>) -> DepGraph {
    let mut f = TFunc::new();
    let b = f.block(insns, &[]);
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    build_block_graph(&f, &ainfo, &engine, b)
  }

  fn insn_order(g: &DepGraph, order: &[NodeIx]) -> Vec<u32> {
    order.iter().filter_map(|n| g.nodes[*n].insn).map(|i| i.get()).collect()
  }

  fn respects_edges(g: &DepGraph, order: &[NodeIx]) -> bool {
    let pos = |n: NodeIx| order.iter().position(|m| *m == n);
    g.edges.iter().all(|e| match (pos(e.from), pos(e.to)) {
      (Some(a), Some(b)) => a < b,
      _ => true,
    })
  }

  #[test]
  fn delays() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      load("l", x(1), x(0), 0),
      alu("use", x(2), &[x(1)]),
      alu("other", x(3), &[]),
    ]);
    compute_priorities(&machine, &mut g);
    let n = NodeIx::new;
    assert_eq!(g.nodes[n(0)].delay, 4);
    assert_eq!(g.nodes[n(1)].delay, 1);
    assert_eq!(g.nodes[n(0)].l_start, 0);
    assert_eq!(g.nodes[n(2)].l_start, 3);
  }

  #[test]
  fn hides_load_latency() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      load("l", x(1), x(0), 0),
      alu("use", x(2), &[x(1)]),
      alu("a3", x(3), &[]),
      alu("a4", x(4), &[]),
    ]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let order = sched.schedule_block(&mut g).expect("schedule");
    assert_eq!(insn_order(&g, &order), vec![0, 2, 3, 1]);
    assert_eq!(g.nodes[NodeIx::new(1)].sched_cycle, 3);
    assert!(respects_edges(&g, &order));
    assert!(simulate_order(&machine, &g, &order) <= 4);
    let input: Vec<NodeIx> = g.nodes.range().into_iter().collect();
    assert_eq!(simulate_order(&machine, &g, &input), 5);
  }

  #[test]
  fn critical_path_policy() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      alu("a", x(3), &[]),
      mul("m1", x(1), &[x(0)]),
      mul("m2", x(2), &[x(1)]),
      store("s", x(2), x(9), 0),
    ]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::CriticalPath);
    let order = sched.schedule_block(&mut g).expect("schedule");
    assert_eq!(insn_order(&g, &order)[0], 1);
    assert!(respects_edges(&g, &order));
  }

  #[test]
  fn dependence_order_picks_the_last_ready_node() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      alu("a", x(1), &[]),
      alu("b", x(2), &[]),
      alu("c", x(3), &[x(1)]),
    ]);
    let mut sched =
      ListScheduler::new(&machine, PriorityPolicy::DependenceOrder);
    let order = sched.schedule_block(&mut g).expect("schedule");
    assert_eq!(insn_order(&g, &order), vec![1, 0, 2]);
  }

  #[test]
  fn pairs_issue_together() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      alu("a", x(5), &[x(6)]),
      load("l1", x(1), x(0), 8),
      load("l2", x(2), x(0), 16),
    ]);
    assert_eq!(g.nodes[NodeIx::new(1)].pair, Some(NodeIx::new(2)));
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let order = sched.schedule_block(&mut g).expect("schedule");
    assert_eq!(insn_order(&g, &order), vec![1, 2, 0]);
    assert_eq!(g.nodes[NodeIx::new(2)].sched_cycle, 0);
  }

  #[test]
  fn prefers_the_consumer_of_the_last_result() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      alu("z", x(4), &[]),
      alu("a", x(1), &[]),
      alu("b", x(2), &[x(1)]),
      alu("c", x(3), &[x(4)]),
    ]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let order = sched.schedule_block(&mut g).expect("schedule");
    // b and c tie on delay; b reads what a, issued last, just wrote.
    assert_eq!(insn_order(&g, &order), vec![0, 1, 2, 3]);
    assert!(respects_edges(&g, &order));
  }

  #[test]
  fn prefers_the_adjacent_access() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      load("l0", x(1), x(0), 0),
      alu("pad", x(5), &[]),
      load("far", x(2), x(0), 32),
      alu("pad2", x(6), &[]),
      load("near", x(3), x(0), 8),
    ]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let order = sched.schedule_block(&mut g).expect("schedule");
    // Both loads share the base; only `near` follows on from l0.
    assert_eq!(insn_order(&g, &order), vec![0, 1, 4, 3, 2]);
    let cycle = |n: u32| g.nodes[NodeIx::new(n)].sched_cycle;
    assert!(cycle(4) < cycle(2));
  }

  #[test]
  fn busy_units_keep_a_node_waiting() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![
      load("l1", x(1), x(0), 0),
      load("l2", x(2), x(0), 32),
    ]);
    compute_priorities(&machine, &mut g);
    let (n0, n1) = (NodeIx::new(0), NodeIx::new(1));
    for nix in [n0, n1].iter() {
      g.nodes[*nix].set_state(ScheduleState::Candidate);
    }
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let mut out = Vec::new();
    sched.issue(&mut g, n0, &mut out, true).expect("issue");
    // There is a single load unit.
    sched.promote(&mut g, &[n1]);
    assert_eq!(g.nodes[n1].state(), ScheduleState::Waiting);
    sched.rt.advance();
    sched.promote(&mut g, &[n1]);
    assert_eq!(g.nodes[n1].state(), ScheduleState::Ready);
  }

  #[test]
  fn forced_gap_keeps_the_cycle_to_itself() {
    let machine = MachineDesc::aarch64_generic();
    let mut adrp = alu("adrp", x(1), &[]);
    adrp.desc.class = OpClass::Adrp;
    let mut g = block_graph(vec![adrp, alu("a", x(2), &[]), alu("b", x(3), &[])]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let order = sched.schedule_block(&mut g).expect("schedule");
    assert_eq!(insn_order(&g, &order), vec![0, 1, 2]);
    assert_eq!(g.nodes[NodeIx::new(0)].sched_cycle, 0);
    assert_eq!(g.nodes[NodeIx::new(1)].sched_cycle, 1);
    assert_eq!(g.nodes[NodeIx::new(2)].sched_cycle, 1);
  }

  #[test]
  fn stalls_are_errors() {
    let machine = MachineDesc::aarch64_generic();
    let mut g = block_graph(vec![alu("a", x(1), &[]), alu("b", x(2), &[x(1)])]);
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    // Only b is scheduled; its predecessor never will be.
    let res = sched.run(&mut g, &[NodeIx::new(1)], &[], &[]);
    match res {
      Err(SchedError::Internal(_)) => {}
      _ => panic!("expected an internal error"),
    }
  }

  fn hoisting_diamond() -> TFunc {
    let mut f = TFunc::new();
    f.block(
      vec![
        load("l", x(1), x(0), 0),
        alu("use", x(2), &[x(1)]),
        branch("b0", &[]),
      ],
      &[1, 2],
    );
    f.block(vec![branch("b1", &[])], &[3]);
    f.block(vec![branch("b2", &[])], &[3]);
    f.block(vec![alu("late", x(7), &[x(8)]), ret("r", &[x(7)])], &[]);
    f
  }

  #[test]
  fn region_hoists_into_empty_cycles() {
    let f = hoisting_diamond();
    let ainfo = run_analysis(&f).expect("analysis");
    let mut fcdg = build_fcdg(&ainfo.cfg_info);
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let rix = fcdg.region_of(BlockIx::new(0)).expect("region");
    let mut g = build_region_graph(&f, &ainfo, &mut fcdg, &engine, rix);
    let members = fcdg.region(rix).members.clone();
    assert_eq!(members, vec![BlockIx::new(0), BlockIx::new(3)]);

    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let orders = sched
      .schedule_region(&mut g, &members, &[true, true])
      .expect("schedule");
    assert_eq!(insn_order(&g, &orders[0].1), vec![0, 5, 1, 2]);
    assert_eq!(insn_order(&g, &orders[1].1), vec![6]);
    assert_eq!(sched.num_moved, 1);
    // The branch closes the block, after everything else in it.
    assert_eq!(*orders[0].1.last().unwrap(), NodeIx::new(2));
  }

  fn two_branch_diamond() -> TFunc {
    let mut f = TFunc::new();
    f.block(
      vec![alu("a", x(1), &[]), branch("bcond", &[x(1)]), branch("b", &[])],
      &[1, 2],
    );
    f.block(vec![branch("b1", &[])], &[3]);
    f.block(vec![branch("b2", &[])], &[3]);
    f.block(vec![ret("r", &[x(1)])], &[]);
    f
  }

  #[test]
  fn region_keeps_every_branch_at_the_end() {
    let f = two_branch_diamond();
    let ainfo = run_analysis(&f).expect("analysis");
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    for policy in [PriorityPolicy::Delay, PriorityPolicy::DependenceOrder].iter()
    {
      let mut fcdg = build_fcdg(&ainfo.cfg_info);
      let rix = fcdg.region_of(BlockIx::new(0)).expect("region");
      let mut g = build_region_graph(&f, &ainfo, &mut fcdg, &engine, rix);
      let members = fcdg.region(rix).members.clone();
      assert_eq!(members, vec![BlockIx::new(0), BlockIx::new(3)]);
      let mut sched = ListScheduler::new(&machine, *policy);
      let orders = sched
        .schedule_region(&mut g, &members, &[true, true])
        .expect("schedule");
      assert_eq!(insn_order(&g, &orders[0].1), vec![0, 1, 2]);
      assert_eq!(insn_order(&g, &orders[1].1), vec![5]);
      assert!(respects_edges(&g, &orders[0].1));
    }
  }

  #[test]
  fn region_without_hoisting_keeps_blocks() {
    let f = hoisting_diamond();
    let ainfo = run_analysis(&f).expect("analysis");
    let mut fcdg = build_fcdg(&ainfo.cfg_info);
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    let engine = RuleEngine::new(&machine, &mm, 0);
    let rix = fcdg.region_of(BlockIx::new(0)).expect("region");
    let mut g = build_region_graph(&f, &ainfo, &mut fcdg, &engine, rix);
    let members = fcdg.region(rix).members.clone();
    let mut sched = ListScheduler::new(&machine, PriorityPolicy::Delay);
    let orders = sched
      .schedule_region(&mut g, &members, &[false, false])
      .expect("schedule");
    assert_eq!(insn_order(&g, &orders[0].1), vec![0, 1, 2]);
    assert_eq!(insn_order(&g, &orders[1].1), vec![5, 6]);
    assert_eq!(sched.num_moved, 0);
  }
}
