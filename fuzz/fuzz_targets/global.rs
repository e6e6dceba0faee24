#![no_main]
use libfuzzer_sys::fuzz_target;

use insnsched::{self, Options, PriorityPolicy, SchedError, Strategy};
use minisched::{test_framework as ir, validator};

static mut POLICY: usize = 0;

// Schedules whole regions, cycling through the priority policies.
fuzz_target!(|func: ir::Func| {
  let mut func = func;
  if let Err(err) = validator::validate(&func) {
    println!("invalid input: {}", err);
    return;
  }

  let policy = unsafe {
    POLICY += 1;
    POLICY % 3
  };
  let opts = Options {
    strategy: Strategy::Global,
    policy: match policy {
      0 => PriorityPolicy::Delay,
      1 => PriorityPolicy::CriticalPath,
      _ => PriorityPolicy::DependenceOrder,
    },
    run_checker: true,
    ..Options::default()
  };

  let expected = ir::run_func(&func, "Before scheduling");
  if expected.is_err() {
    // Nothing to compare against.
    return;
  }

  let cloned_func = func.clone();
  let result = match insnsched::schedule_aarch64(&cloned_func, &opts) {
    Ok(result) => result,
    Err(err @ SchedError::Checker(_)) => {
      cloned_func.print("failing func");
      panic!("{}", err);
    }
    Err(err) => {
      println!("scheduling error: {}", err);
      return;
    }
  };

  func.update_from_schedule(result);
  func.print("after scheduling");
  validator::validate(&func).expect("scheduled func is invalid");

  let observed = ir::run_func(&func, "After scheduling");
  validator::check_results(&expected, &observed);
});
