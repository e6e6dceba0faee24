#![no_main]
use libfuzzer_sys::fuzz_target;

use minisched::{test_framework as ir, validator::validate};

fuzz_target!(|func: ir::Func| {
  if let Err(err) = validate(&func) {
    println!("validation error: {}", err);
  }
});
