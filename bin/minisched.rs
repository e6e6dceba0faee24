/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

use minisched::test_framework::{run_func, Func};
use minisched::validator::{check_results, validate};
use minisched::{parser, test_cases};

use insnsched::{schedule_aarch64, Options, PriorityPolicy, Strategy};

use clap;
use log::{error, info};
use pretty_env_logger;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

//=============================================================================
// Top level

fn load_func(matches: &clap::ArgMatches) -> Result<Func, String> {
  if let Some(path) = matches.value_of("load") {
    let file = File::open(path).map_err(|e| e.to_string())?;
    return bincode::deserialize_from(BufReader::new(file))
      .map_err(|e| format!("can't decode {}: {}", path, e));
  }
  if let Some(path) = matches.value_of("file") {
    return parser::parse_file(PathBuf::from(path)).map_err(|e| e.to_string());
  }
  let func_name = matches.value_of("test").unwrap_or("");
  match test_cases::find_func(func_name) {
    Ok(func) => Ok(func),
    Err(available_func_names) => {
      println!("available func names are:");
      for name in available_func_names {
        println!("     {}", name);
      }
      Err(format!("can't find Func with name '{}'", func_name))
    }
  }
}

fn options_from_matches(matches: &clap::ArgMatches) -> Options {
  // The environment gives the defaults; flags override it.
  let mut opts = Options::from_env();
  match matches.value_of("strategy") {
    Some("global") => opts.strategy = Strategy::Global,
    Some("local") => opts.strategy = Strategy::Local,
    _ => {}
  }
  match matches.value_of("policy") {
    Some("delay") => opts.policy = PriorityPolicy::Delay,
    Some("critical") => opts.policy = PriorityPolicy::CriticalPath,
    Some("deporder") => opts.policy = PriorityPolicy::DependenceOrder,
    _ => {}
  }
  if matches.is_present("pressure") {
    opts.reg_pressure = true;
  }
  if matches.is_present("simulate") {
    opts.simulate_only = true;
  }
  if matches.is_present("brute") {
    opts.brute_force = true;
  }
  if matches.is_present("check") {
    opts.run_checker = true;
  }
  opts
}

fn main() {
  pretty_env_logger::init();

  let app = clap::App::new("minisched")
    .about("a simple program to allow separate testing of insnsched")
    .arg(
      clap::Arg::new("test")
        .short('t')
        .long("test")
        .takes_value(true)
        .required_unless_present_any(["file", "load"])
        .help("test case name"),
    )
    .arg(
      clap::Arg::new("file")
        .short('f')
        .long("file")
        .takes_value(true)
        .help("read the function from a text file"),
    )
    .arg(
      clap::Arg::new("load")
        .long("load")
        .takes_value(true)
        .help("read the function from a file written by --save"),
    )
    .arg(
      clap::Arg::new("save")
        .long("save")
        .takes_value(true)
        .help("write the input function out, in binary"),
    )
    .arg(
      clap::Arg::new("strategy")
        .short('s')
        .long("strategy")
        .takes_value(true)
        .possible_values(["local", "global"])
        .help("one block at a time, or whole regions"),
    )
    .arg(
      clap::Arg::new("policy")
        .short('p')
        .long("policy")
        .takes_value(true)
        .possible_values(["delay", "critical", "deporder"])
        .help("priority policy"),
    )
    .arg(
      clap::Arg::new("pressure")
        .long("pressure")
        .help("schedule for register pressure"),
    )
    .arg(
      clap::Arg::new("simulate")
        .long("simulate")
        .help("only gather statistics, keeping the input order"),
    )
    .arg(
      clap::Arg::new("brute")
        .long("brute")
        .help("cross-check the pressure scheduler by enumeration"),
    )
    .arg(
      clap::Arg::new("check")
        .short('c')
        .long("check")
        .help("run the checker on the result"),
    );
  let matches = app.get_matches();

  let mut func = match load_func(&matches) {
    Ok(func) => func,
    Err(msg) => {
      error!("{}", msg);
      return;
    }
  };

  if let Err(msg) = validate(&func) {
    error!("invalid function '{}': {}", func.name, msg);
    return;
  }

  if let Some(path) = matches.value_of("save") {
    let saved = File::create(path)
      .map_err(|e| e.to_string())
      .and_then(|f| {
        bincode::serialize_into(BufWriter::new(f), &func)
          .map_err(|e| e.to_string())
      });
    match saved {
      Ok(()) => info!("saved '{}' to {}", func.name, path),
      Err(msg) => error!("can't save to {}: {}", path, msg),
    }
  }

  let opts = options_from_matches(&matches);
  info!("options: {:?}", opts);

  func.print("before scheduling");

  // Just so we can run it later.
  let original_func = func.clone();

  let result = match schedule_aarch64(&func, &opts) {
    Err(e) => {
      println!("scheduling failed: {}", e);
      return;
    }
    Ok(r) => r,
  };
  let stats = result.stats.clone();

  // Update the function itself. This bridges the gap from the generic
  // interface to our specific test ISA.
  func.update_from_schedule(result);

  func.print("after scheduling");

  let before_sched_result = run_func(&original_func, "Before scheduling");
  let after_sched_result = run_func(&func, "After scheduling");

  println!("");
  println!("{:#?}", stats);

  check_results(&before_sched_result, &after_sched_result);
}

#[cfg(test)]
mod test_utils {
  use super::*;
  use insnsched::{ScheduleResult, ScheduleStats};

  pub fn opts(strategy: Strategy, policy: PriorityPolicy) -> Options {
    Options { strategy, policy, run_checker: true, ..Options::default() }
  }

  pub fn find(func_name: &str) -> Func {
    let _ = pretty_env_logger::try_init();
    let func = test_cases::find_func(func_name)
      .unwrap_or_else(|_| panic!("no test case {}", func_name));
    validate(&func)
      .unwrap_or_else(|err| panic!("{} is invalid: {}", func_name, err));
    func
  }

  pub fn schedule(func: &Func, opts: &Options) -> ScheduleResult<Func> {
    schedule_aarch64(func, opts)
      .unwrap_or_else(|err| panic!("{}: scheduling failed: {}", func.name, err))
  }

  /// Schedule a test case, and check that it computes the same as before.
  pub fn check(func_name: &str, opts: &Options) -> ScheduleStats {
    let mut func = find(func_name);
    let before = run_func(&func, "Before scheduling");
    assert!(before.is_ok(), "{} fails by itself: {:?}", func_name, before);

    let result = schedule(&func, opts);
    let stats = result.stats.clone();
    func.update_from_schedule(result);
    validate(&func).unwrap_or_else(|err| {
      panic!("{} is invalid after scheduling: {}", func_name, err)
    });

    let after = run_func(&func, "After scheduling");
    check_results(&before, &after);
    stats
  }

  pub fn check_all(opts: &Options) {
    for name in test_cases::builtin_names() {
      check(name, opts);
    }
    check("swap", opts);
    check("throw_loop", opts);
  }

  // Position of each original instruction in the output.
  pub fn positions(result: &ScheduleResult<Func>) -> Vec<usize> {
    let mut pos = vec![0; result.orig_insn_map.len() as usize];
    for (i, orig) in result.orig_insn_map.iter().enumerate() {
      pos[orig.get() as usize] = i;
    }
    pos
  }
}

#[cfg(test)]
mod test {
  use super::test_utils::*;
  use super::*;
  use insnsched::RegClass;
  use minisched::test_framework::*;

  #[test]
  fn local_delay() {
    check_all(&opts(Strategy::Local, PriorityPolicy::Delay));
  }

  #[test]
  fn local_critical_path() {
    check_all(&opts(Strategy::Local, PriorityPolicy::CriticalPath));
  }

  #[test]
  fn local_dependence_order() {
    check_all(&opts(Strategy::Local, PriorityPolicy::DependenceOrder));
  }

  #[test]
  fn global_delay() {
    check_all(&opts(Strategy::Global, PriorityPolicy::Delay));
  }

  #[test]
  fn global_critical_path() {
    check_all(&opts(Strategy::Global, PriorityPolicy::CriticalPath));
  }

  #[test]
  fn global_dependence_order() {
    check_all(&opts(Strategy::Global, PriorityPolicy::DependenceOrder));
  }

  #[test]
  fn register_pressure() {
    let o = Options {
      reg_pressure: true,
      ..opts(Strategy::Local, PriorityPolicy::Delay)
    };
    check_all(&o);
    let stats = check("pressure", &o);
    assert_eq!(stats.num_pressure_scheduled, 1);
  }

  #[test]
  fn simulate_only_keeps_the_order() {
    for name in test_cases::builtin_names() {
      let func = find(name);
      let o = Options {
        simulate_only: true,
        ..opts(Strategy::Global, PriorityPolicy::Delay)
      };
      let result = schedule(&func, &o);
      for (i, orig) in result.orig_insn_map.iter().enumerate() {
        assert_eq!(orig.get() as usize, i, "{}", name);
      }
    }
  }

  #[test]
  fn global_scheduling_moves_code_into_the_entry() {
    let stats = check("diamond", &opts(Strategy::Global, PriorityPolicy::Delay));
    assert!(stats.num_global_regions >= 1);
    assert!(stats.num_moved >= 1);
  }

  #[test]
  fn separators_cut_long_blocks() {
    let o = Options {
      separator_window: 16,
      ..opts(Strategy::Local, PriorityPolicy::Delay)
    };
    check("big_block", &o);
  }

  // D1 -> D2 -> D4 is a chain of true dependences; D3 is free to move.
  #[test]
  fn true_dependences_keep_their_order() {
    let mut func = Func::new("chain");
    let r1 = func.new_virtual_reg(RegClass::I64);
    let r2 = func.new_virtual_reg(RegClass::I64);
    let r3 = func.new_virtual_reg(RegClass::I64);
    let r4 = func.new_virtual_reg(RegClass::I64);
    let r5 = func.new_virtual_reg(RegClass::I64);
    func.block(
      "start",
      vec![
        i_mov(r1, 6),                    // D1
        i_mul(r2, r1, RI_I(7)),          // D2
        i_ldr(r3, AM_RI(sp(), -8)),      // D3
        i_add(r4, r2, RI_I(1)),          // D4
        i_add(r5, r4, RI_R(r3)),
        i_ret(Some(r5)),
      ],
    );
    func.finish().expect("well formed");
    for policy in
      &[PriorityPolicy::Delay, PriorityPolicy::CriticalPath, PriorityPolicy::DependenceOrder]
    {
      let result = schedule(&func, &opts(Strategy::Local, *policy));
      let pos = positions(&result);
      assert!(pos[0] < pos[1] && pos[1] < pos[3], "{:?}: {:?}", policy, pos);
    }
  }

  #[test]
  fn memory_pairs_stay_adjacent() {
    let mut func = Func::new("pair");
    let a = func.new_virtual_reg(RegClass::I64);
    let l1 = func.new_virtual_reg(RegClass::I64);
    let l2 = func.new_virtual_reg(RegClass::I64);
    let s = func.new_virtual_reg(RegClass::I64);
    let t = func.new_virtual_reg(RegClass::I64);
    func.block(
      "start",
      vec![
        i_mov(a, 1),
        i_ldr(l1, AM_RI(sp(), -16)),
        i_ldr(l2, AM_RI(sp(), -8)),
        i_add(s, l1, RI_R(l2)),
        i_add(t, s, RI_R(a)),
        i_ret(Some(t)),
      ],
    );
    func.finish().expect("well formed");
    let result = schedule(&func, &opts(Strategy::Local, PriorityPolicy::Delay));
    let pos = positions(&result);
    assert_eq!(pos[2], pos[1] + 1);
  }

  #[test]
  fn oversized_blocks_are_not_touched() {
    let func = find("load_use");
    let num_real = func.insns.iter().filter(|i| !i.is_pseudo()).count() as u32;

    let o = Options {
      max_region_insns: num_real - 1,
      ..opts(Strategy::Local, PriorityPolicy::Delay)
    };
    let result = schedule(&func, &o);
    assert_eq!(result.stats.num_skipped, 1);
    for (i, orig) in result.orig_insn_map.iter().enumerate() {
      assert_eq!(orig.get() as usize, i);
    }

    // At the cap, it is scheduled.
    let o = Options { max_region_insns: num_real, ..o };
    let result = schedule(&func, &o);
    assert_eq!(result.stats.num_skipped, 0);
  }

  #[test]
  fn scheduling_is_deterministic() {
    for name in test_cases::builtin_names() {
      let func = find(name);
      for strategy in &[Strategy::Local, Strategy::Global] {
        let o = opts(*strategy, PriorityPolicy::Delay);
        let first = schedule(&func, &o);
        let second = schedule(&func, &o);
        assert_eq!(first.orig_insn_map.iter().collect::<Vec<_>>(),
                   second.orig_insn_map.iter().collect::<Vec<_>>(),
                   "{}", name);
        assert_eq!(first.stats, second.stats);
      }
    }
  }

  #[test]
  fn text_form_survives_scheduling() {
    // Scheduled code renders to text that parses back to the same code.
    let mut func = find("clinit");
    let result = schedule(&func, &opts(Strategy::Local, PriorityPolicy::Delay));
    func.update_from_schedule(result);
    let mut text = String::new();
    func.render("scheduled", &mut text).expect("render");
    let again = parser::parse_content("clinit", &text).expect("parse");
    assert_eq!(run_func(&func, "a"), run_func(&again, "b"));
  }
}
