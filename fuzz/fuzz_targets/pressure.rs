#![no_main]
use libfuzzer_sys::fuzz_target;

use insnsched::{self, Options, SchedError};
use minisched::{test_framework as ir, validator};

// The pressure scheduler, cross-checked against enumeration of small windows.
fuzz_target!(|func: ir::Func| {
  let mut func = func;
  if let Err(err) = validator::validate(&func) {
    println!("invalid input: {}", err);
    return;
  }

  let opts = Options {
    reg_pressure: true,
    brute_force: true,
    run_checker: true,
    ..Options::default()
  };

  let expected = ir::run_func(&func, "Before scheduling");
  if expected.is_err() {
    return;
  }

  let result = match insnsched::schedule_aarch64(&func, &opts) {
    Ok(result) => result,
    Err(err @ SchedError::Checker(_)) => panic!("{}", err),
    Err(err) => {
      println!("scheduling error: {}", err);
      return;
    }
  };

  func.update_from_schedule(result);
  validator::validate(&func).expect("scheduled func is invalid");

  let observed = ir::run_func(&func, "After scheduling");
  validator::check_results(&expected, &observed);
});
