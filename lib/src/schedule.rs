/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

//! Top level driver: analyse the function, schedule it block by block or
//! region by region, check the result and rebuild the instruction stream.

use log::{debug, info};

use crate::analysis::{run_analysis, AnalysisInfo};
use crate::cdg::Fcdg;
use crate::checker::CheckerContext;
use crate::control_dep::build_fcdg;
use crate::data_dep::{build_block_graph, build_region_graph};
use crate::data_dep_base::RuleEngine;
use crate::data_structures::{BlockIx, NodeIx, RegionIx};
use crate::dep_graph::DepGraph;
use crate::inst_stream::{emit_block_order, materialize, BlockLayout};
use crate::interface::{
  Function, MemoryModel, Options, PriorityPolicy, SchedError, ScheduleResult,
  ScheduleStats, Strategy,
};
use crate::list_sched::{simulate_order, ListScheduler};
use crate::machine::MachineDesc;
use crate::reg_pressure::schedule_for_pressure;

struct Scheduler<'a, F: Function> {
  func: &'a F,
  machine: &'a MachineDesc,
  opts: &'a Options,
  ainfo: AnalysisInfo,
  engine: RuleEngine<'a>,
  layout: BlockLayout,
  stats: ScheduleStats,
  checker: Option<CheckerContext>,
}

impl<'a, F: Function> Scheduler<'a, F> {
  fn input_order(g: &DepGraph) -> Vec<NodeIx> {
    g.nodes.range().into_iter().collect()
  }

  fn record_cycles(&mut self, g: &DepGraph, after: &[NodeIx]) {
    let before = simulate_order(self.machine, g, &Self::input_order(g));
    let after = simulate_order(self.machine, g, after);
    self.stats.cycles_before += before as u64;
    self.stats.cycles_after += after as u64;
  }

  fn place(&mut self, g: &DepGraph, members: &[BlockIx], placed: &[(BlockIx, Vec<NodeIx>)]) {
    if let Some(checker) = self.checker.as_mut() {
      checker.check_unit(g, members, placed);
    }
    if self.opts.simulate_only {
      return;
    }
    for (bix, order) in placed {
      self.layout[*bix] = Some(emit_block_order(g, *bix, order));
    }
  }

  #[inline(never)]
  fn schedule_local(&mut self, bix: BlockIx) -> Result<(), SchedError> {
    let num_real = self.ainfo.real_insn_counts[bix];
    if num_real == 0 {
      return Ok(());
    }
    self.stats.num_regions += 1;
    if num_real > self.opts.max_region_insns {
      debug!("schedule_local: {:?}: {} insns, skipped", bix, num_real);
      self.stats.num_skipped += 1;
      return Ok(());
    }

    let mut g = build_block_graph(self.func, &self.ainfo, &self.engine, bix);
    let order = if self.opts.reg_pressure && !self.func.is_cold_block(bix) {
      let livein = &self.ainfo.liveness.livein[bix];
      let liveout = &self.ainfo.liveness.liveout[bix];
      let res = schedule_for_pressure(&mut g, livein, liveout)?;
      self.stats.num_pressure_scheduled += 1;
      if res.fell_back {
        self.stats.num_pressure_fallbacks += 1;
      }
      debug!(
        "schedule_local: {:?}: pressure {:?} -> {:?}{}",
        bix,
        res.max_before,
        res.max_after,
        if res.fell_back { ", kept input order" } else { "" }
      );
      if self.opts.brute_force {
        self.brute_force_check(&g, bix, &res.order);
      }
      res.order
    } else {
      let mut sched = ListScheduler::new(self.machine, self.opts.policy);
      sched.schedule_block(&mut g)?
    };

    self.record_cycles(&g, &order);
    self.stats.num_local_blocks += 1;
    self.place(&g, &[bix], &[(bix, order)]);
    Ok(())
  }

  #[cfg(feature = "fuzzing")]
  fn brute_force_check(&self, g: &DepGraph, bix: BlockIx, order: &[NodeIx]) {
    let worse = crate::brute_force::check_windows(
      g,
      order,
      &self.ainfo.liveness.livein[bix],
      &self.ainfo.liveness.liveout[bix],
      self.opts.brute_force_window as usize,
      self.opts.max_series_count,
    );
    if worse > 0 {
      info!("brute force: {:?}: {} windows could do better", bix, worse);
    }
  }

  #[cfg(not(feature = "fuzzing"))]
  fn brute_force_check(&self, _g: &DepGraph, bix: BlockIx, _order: &[NodeIx]) {
    debug!("brute force: {:?}: needs the fuzzing feature", bix);
  }

  /// Whether nodes of later members may be hoisted into `bix`.
  fn may_receive(&self, bix: BlockIx) -> bool {
    self.opts.policy != PriorityPolicy::DependenceOrder
      && !self.func.is_cold_block(bix)
      && self.ainfo.cfg_info.eh_succ_map[bix].is_empty()
  }

  #[inline(never)]
  fn schedule_region(
    &mut self, fcdg: &mut Fcdg, rix: RegionIx,
  ) -> Result<(), SchedError> {
    let members = fcdg.region(rix).members.clone();
    if members.len() == 1 {
      return self.schedule_local(members[0]);
    }
    let num_real: u32 =
      members.iter().map(|b| self.ainfo.real_insn_counts[*b]).sum();
    if num_real == 0 {
      return Ok(());
    }
    self.stats.num_regions += 1;
    if num_real > self.opts.max_region_insns {
      debug!("schedule_region: {:?}: {} insns, skipped", rix, num_real);
      self.stats.num_skipped += 1;
      return Ok(());
    }

    let mut g =
      build_region_graph(self.func, &self.ainfo, fcdg, &self.engine, rix);
    let hoist_ok: Vec<bool> =
      members.iter().map(|b| self.may_receive(*b)).collect();
    let mut sched = ListScheduler::new(self.machine, self.opts.policy);
    let placed = sched.schedule_region(&mut g, &members, &hoist_ok)?;
    debug!(
      "schedule_region: {:?}: {} members, {} nodes, {} moved",
      rix,
      members.len(),
      g.num_nodes(),
      sched.num_moved
    );

    let flat: Vec<NodeIx> =
      placed.iter().flat_map(|(_, order)| order.iter().cloned()).collect();
    self.record_cycles(&g, &flat);
    self.stats.num_global_regions += 1;
    self.stats.num_moved += sched.num_moved;
    self.place(&g, &members, &placed);
    Ok(())
  }
}

#[inline(never)]
pub(crate) fn run<F: Function>(
  func: &F, machine: &MachineDesc, mem_model: &dyn MemoryModel,
  opts: &Options,
) -> Result<ScheduleResult<F>, SchedError> {
  info!(
    "schedule: {} blocks, {} insns, {:?} / {:?}{}",
    func.blocks().len(),
    func.insns().len(),
    opts.strategy,
    opts.policy,
    if opts.reg_pressure { ", pressure" } else { "" }
  );

  let ainfo = run_analysis(func)?;
  let mut layout = BlockLayout::new();
  for _ in func.blocks() {
    layout.push(None);
  }

  let mut sched = Scheduler {
    func,
    machine,
    opts,
    ainfo,
    engine: RuleEngine::new(machine, mem_model, opts.separator_window),
    layout,
    stats: ScheduleStats::default(),
    checker: if opts.run_checker { Some(CheckerContext::new()) } else { None },
  };

  if opts.skip {
    info!("schedule: skipped");
  } else if opts.strategy == Strategy::Global && !opts.reg_pressure {
    let mut fcdg = build_fcdg(&sched.ainfo.cfg_info);
    for rix in fcdg.regions.range() {
      sched.schedule_region(&mut fcdg, rix)?;
    }
  } else {
    for bix in func.blocks() {
      if sched.ainfo.cfg_info.reachable[bix] {
        sched.schedule_local(bix)?;
      }
    }
  }

  let (insns, target_map, orig_insn_map) = materialize(func, &sched.layout);

  if let Some(mut checker) = sched.checker.take() {
    checker.check_permutation(func.insns().len() as u32, &orig_insn_map);
    checker.run().map_err(SchedError::Checker)?;
  }

  let stats = sched.stats;
  info!(
    "schedule: {} units ({} global, {} local, {} skipped), {} moved, \
     cycles {} -> {}",
    stats.num_regions,
    stats.num_global_regions,
    stats.num_local_blocks,
    stats.num_skipped,
    stats.num_moved,
    stats.cycles_before,
    stats.cycles_after
  );

  Ok(ScheduleResult { insns, target_map, orig_insn_map, stats })
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::aarch64::AArch64MemoryModel;
  use crate::data_structures::InstIx;
  use crate::interface::PseudoKind;
  use crate::test_func::*;

  fn sched(f: &TFunc, opts: &Options) -> ScheduleResult<TFunc> {
    let machine = MachineDesc::aarch64_generic();
    let mm = AArch64MemoryModel::new();
    run(f, &machine, &mm, opts).expect("schedule")
  }

  fn names(res: &ScheduleResult<TFunc>) -> Vec<&'static str> {
    res.insns.iter().map(|i| i.name).collect()
  }

  fn checked() -> Options {
    Options { run_checker: true, ..Options::default() }
  }

  fn load_use_block() -> TFunc {
    let mut f = TFunc::new();
    f.block(
      vec![
        load("l1", x(1), x(0), 0),
        alu("a1", x(2), &[x(1)]),
        load("l2", x(3), x(0), 64),
        alu("a2", x(4), &[x(3)]),
        ret("r", &[x(2), x(4)]),
      ],
      &[],
    );
    f
  }

  #[test]
  fn local_scheduling_hides_latency() {
    let f = load_use_block();
    let res = sched(&f, &checked());
    assert_eq!(names(&res), vec!["l1", "l2", "a1", "a2", "r"]);
    assert_eq!(res.stats.num_local_blocks, 1);
    assert!(res.stats.cycles_after < res.stats.cycles_before);
    assert_eq!(res.orig_insn_map[InstIx::new(1)], InstIx::new(2));
  }

  #[test]
  fn skip_and_simulate_keep_the_input() {
    let f = load_use_block();
    let input = vec!["l1", "a1", "l2", "a2", "r"];

    let res = sched(&f, &Options { skip: true, ..checked() });
    assert_eq!(names(&res), input);
    assert_eq!(res.stats.num_regions, 0);

    let res = sched(&f, &Options { simulate_only: true, ..checked() });
    assert_eq!(names(&res), input);
    assert!(res.stats.cycles_after < res.stats.cycles_before);
  }

  #[test]
  fn oversized_blocks_are_left_alone() {
    let f = load_use_block();
    let res = sched(&f, &Options { max_region_insns: 4, ..checked() });
    assert_eq!(names(&res), vec!["l1", "a1", "l2", "a2", "r"]);
    assert_eq!(res.stats.num_skipped, 1);
    let res = sched(&f, &Options { max_region_insns: 5, ..checked() });
    assert_eq!(res.stats.num_skipped, 0);
  }

  #[test]
  fn pseudos_survive() {
    let mut f = TFunc::new();
    f.block(
      vec![
        pseudo("c", PseudoKind::Comment),
        load("l1", x(1), x(0), 0),
        pseudo("cfi", PseudoKind::Cfi),
        alu("a1", x(2), &[x(1)]),
        load("l2", x(3), x(0), 64),
        ret("r", &[x(2), x(3)]),
        pseudo("end", PseudoKind::Comment),
      ],
      &[],
    );
    let res = sched(&f, &checked());
    assert_eq!(names(&res), vec!["c", "l1", "cfi", "l2", "a1", "r", "end"]);
  }

  // b0 -> {b1, b2} -> b3: b0 and b3 are control equivalent.
  fn diamond() -> TFunc {
    let mut f = TFunc::new();
    f.block(
      vec![load("l0", x(1), x(0), 0), alu("a0", x(2), &[x(1)]), branch("br", &[x(2)])],
      &[1, 2],
    );
    f.block(vec![alu("t", x(5), &[x(2)]), branch("j1", &[])], &[3]);
    f.block(vec![alu("e", x(5), &[x(1)])], &[3]);
    f.block(vec![alu("h", x(6), &[x(0)]), ret("r", &[x(5), x(6)])], &[]);
    f
  }

  #[test]
  fn global_scheduling_hoists_between_equivalent_blocks() {
    let f = diamond();
    let res = sched(&f, &Options { strategy: Strategy::Global, ..checked() });
    assert_eq!(res.stats.num_global_regions, 1);
    assert_eq!(res.stats.num_moved, 1);
    assert_eq!(
      names(&res),
      vec!["l0", "h", "a0", "br", "t", "j1", "e", "r"]
    );
    assert_eq!(res.target_map[BlockIx::new(3)], InstIx::new(7));
  }

  #[test]
  fn global_scheduling_without_hoisting() {
    let f = diamond();
    let opts = Options {
      strategy: Strategy::Global,
      policy: PriorityPolicy::DependenceOrder,
      ..checked()
    };
    let res = sched(&f, &opts);
    assert_eq!(res.stats.num_moved, 0);
    assert_eq!(
      names(&res),
      vec!["l0", "a0", "br", "t", "j1", "e", "h", "r"]
    );
  }

  #[test]
  fn cold_blocks_do_not_receive_code() {
    let mut f = diamond();
    f.set_cold(BlockIx::new(0));
    let res = sched(&f, &Options { strategy: Strategy::Global, ..checked() });
    assert_eq!(res.stats.num_moved, 0);
  }

  #[test]
  fn pressure_scheduling() {
    let mut f = TFunc::new();
    f.block(
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
    let res = sched(&f, &Options { reg_pressure: true, ..checked() });
    assert_eq!(res.stats.num_pressure_scheduled, 1);
    assert_eq!(res.stats.num_pressure_fallbacks, 0);
    assert_eq!(
      names(&res),
      vec!["l1", "l2", "a5", "s5", "l3", "l4", "a6", "s6"]
    );
  }

  #[test]
  fn scheduling_is_deterministic() {
    let f = diamond();
    let opts = Options { strategy: Strategy::Global, ..checked() };
    assert_eq!(names(&sched(&f, &opts)), names(&sched(&f, &opts)));
  }
}
