/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

/// Test cases.  The list of them is right at the bottom, function |find_func|.
/// Add new ones there.
use insnsched::RegClass;

use crate::parser;
use crate::test_framework::*;

use std::path::{Path, PathBuf};

fn done(mut func: Func) -> Func {
  if let Err(msg) = func.finish() {
    panic!("test case {}: {}", func.name, msg);
  }
  func
}

/// Loads and stores through the stack, some arithmetic and a call.
fn test_straight_line() -> Func {
  let mut func = Func::new("straight_line");
  let a = func.new_virtual_reg(RegClass::I64);
  let b = func.new_virtual_reg(RegClass::I64);
  let la = func.new_virtual_reg(RegClass::I64);
  let lb = func.new_virtual_reg(RegClass::I64);
  let prod = func.new_virtual_reg(RegClass::I64);
  let t0 = func.new_virtual_reg(RegClass::I64);
  let t1 = func.new_virtual_reg(RegClass::I64);

  func.block(
    "start",
    vec![
      i_mov(a, 10),
      i_mov(b, 3),
      i_str(a, AM_RI(sp(), -8)),
      i_str(b, AM_RI(sp(), -16)),
      i_ldr(la, AM_RI(sp(), -8)),
      i_ldr(lb, AM_RI(sp(), -16)),
      i_mul(prod, la, RI_R(lb)),
      i_add(t0, prod, RI_I(7)),
      i_lsl(t1, t0, RI_I(2)),
      i_movr(xr(0), t1),
      i_bl(Builtin::Print),
      i_ret(Some(prod)),
    ],
  );
  done(func)
}

/// Independent loads whose latency can be hidden, with comments, debug
/// markers and CFI directives in between.
fn test_load_use() -> Func {
  let mut func = Func::new("load_use");
  let base = func.new_virtual_reg(RegClass::I64);
  let c5 = func.new_virtual_reg(RegClass::I64);
  let c7 = func.new_virtual_reg(RegClass::I64);
  let l0 = func.new_virtual_reg(RegClass::I64);
  let l1 = func.new_virtual_reg(RegClass::I64);
  let l2 = func.new_virtual_reg(RegClass::I64);
  let a0 = func.new_virtual_reg(RegClass::I64);
  let a1 = func.new_virtual_reg(RegClass::I64);
  let a2 = func.new_virtual_reg(RegClass::I64);
  let sum = func.new_virtual_reg(RegClass::I64);

  func.block(
    "start",
    vec![
      i_comment("global 1"),
      i_adrp(base, 1),
      i_addlo12(base, base, 1),
      i_mov(c5, 5),
      i_str(c5, AM_RI(base, 0)),
      i_mov(c7, 7),
      i_str(c7, AM_RI(base, 8)),
      i_comment("loads"),
      i_ldr(l0, AM_RI(base, 0)),
      i_debug(10),
      i_add(a0, l0, RI_I(1)),
      i_ldr(l1, AM_RI(base, 8)),
      i_cfi("def_cfa 16"),
      i_add(a1, l1, RI_I(2)),
      i_ldr(l2, AM_RI(base, 16)),
      i_add(a2, l2, RI_R(a1)),
      i_add(sum, a2, RI_R(a0)),
      i_movr(xr(0), sum),
      i_bl(Builtin::Print),
      i_ret(Some(sum)),
      i_cfi("endproc"),
    ],
  );
  done(func)
}

/// Stores and loads to adjacent stack slots, some through the frame
/// pointer.
fn test_pairs() -> Func {
  let mut func = Func::new("pairs");
  let v: Vec<_> = (0..11).map(|_| func.new_virtual_reg(RegClass::I64)).collect();

  func.block(
    "start",
    vec![
      i_mov(v[0], 1),
      i_mov(v[1], 2),
      i_mov(v[2], 3),
      i_mov(v[3], 4),
      i_str(v[0], AM_RI(sp(), -32)),
      i_str(v[1], AM_RI(sp(), -24)),
      i_str(v[2], AM_RI(sp(), -16)),
      i_str(v[3], AM_RI(sp(), -8)),
      i_ldr(v[4], AM_RI(sp(), -32)),
      i_ldr(v[5], AM_RI(sp(), -24)),
      i_ldr(v[6], AM_RI(fp(), -16)),
      i_ldr(v[7], AM_RI(fp(), -8)),
      i_add(v[8], v[4], RI_R(v[5])),
      i_add(v[9], v[6], RI_R(v[7])),
      i_mul(v[10], v[8], RI_R(v[9])),
      i_ret(Some(v[10])),
    ],
  );
  done(func)
}

/// If-then-else.  The join block is control equivalent to the entry.
fn test_diamond() -> Func {
  let mut func = Func::new("diamond");
  let x = func.new_virtual_reg(RegClass::I64);
  let y = func.new_virtual_reg(RegClass::I64);
  let g = func.new_virtual_reg(RegClass::I64);
  let l = func.new_virtual_reg(RegClass::I64);
  let s = func.new_virtual_reg(RegClass::I64);
  let r = func.new_virtual_reg(RegClass::I64);
  let k = func.new_virtual_reg(RegClass::I64);

  func.block(
    "start",
    vec![
      i_mov(x, 5),
      i_mov(k, 1),
      i_cmp(x, RI_I(3)),
      i_bcond(Cond::Gt, "then", "else"),
    ],
  );
  func.block("then", vec![i_mov(y, 100), i_b("join")]);
  func.block("else", vec![i_mov(y, 200), i_b("join")]);
  func.block(
    "join",
    vec![
      i_adrp(g, 2),
      i_addlo12(g, g, 2),
      i_ldr(l, AM_RI(g, 0)),
      i_add(s, l, RI_R(x)),
      i_add(s, s, RI_R(k)),
      i_movr(xr(0), s),
      i_bl(Builtin::Print),
      i_add(r, s, RI_R(y)),
      i_ret(Some(r)),
    ],
  );
  done(func)
}

/// Fill an array with squares, then sum it with post-indexed loads.
fn test_sum_loop() -> Func {
  let mut func = Func::new("sum_loop");
  let base = func.new_virtual_reg(RegClass::I64);
  let i = func.new_virtual_reg(RegClass::I64);
  let sum = func.new_virtual_reg(RegClass::I64);
  let off = func.new_virtual_reg(RegClass::I64);
  let next = func.new_virtual_reg(RegClass::I64);
  let sq = func.new_virtual_reg(RegClass::I64);
  let n = func.new_virtual_reg(RegClass::I64);
  let p = func.new_virtual_reg(RegClass::I64);
  let e = func.new_virtual_reg(RegClass::I64);

  func.block(
    "start",
    vec![
      i_adrp(base, 3),
      i_addlo12(base, base, 3),
      i_mov(i, 0),
      i_mov(sum, 0),
      i_b("fill"),
    ],
  );
  func.block(
    "fill",
    vec![
      i_lsl(off, i, RI_I(3)),
      i_add(next, i, RI_I(1)),
      i_mul(sq, i, RI_R(i)),
      i_str(sq, AM_RR(base, off)),
      i_movr(i, next),
      i_cmp(i, RI_I(8)),
      i_bcond(Cond::Lt, "fill", "sum_init"),
    ],
  );
  func.block(
    "sum_init",
    vec![i_mov(n, 0), i_movr(p, base), i_b("sum")],
  );
  func.block(
    "sum",
    vec![
      i_ldr(e, AM_POST(p, 8)),
      i_add(sum, sum, RI_R(e)),
      i_add(n, n, RI_I(1)),
      i_cmp(n, RI_I(8)),
      i_bcond(Cond::Lt, "sum", "end"),
    ],
  );
  func.block(
    "end",
    vec![i_movr(xr(0), sum), i_bl(Builtin::Print), i_ret(Some(sum))],
  );
  done(func)
}

/// Calls, caller- and callee-saved registers, floating point arguments.
fn test_calls() -> Func {
  let mut func = Func::new("calls");
  let m7 = func.new_virtual_reg(RegClass::I64);
  let a = func.new_virtual_reg(RegClass::I64);
  let b = func.new_virtual_reg(RegClass::I64);
  let c = func.new_virtual_reg(RegClass::I64);
  let f0 = func.new_virtual_reg(RegClass::F64);
  let f1 = func.new_virtual_reg(RegClass::F64);

  func.block(
    "start",
    vec![
      i_mov(m7, -7),
      i_movr(xr(0), m7),
      i_bl(Builtin::Abs),
      i_movr(a, xr(0)),
      i_mov(xr(19), 11),
      i_movr(xr(0), a),
      i_movr(xr(1), xr(19)),
      i_bl(Builtin::Max),
      i_movr(b, xr(0)),
      i_add(c, b, RI_R(xr(19))),
      i_movr(xr(0), c),
      i_bl(Builtin::Print),
      i_fmov(dr(8), 2.5),
      i_fmov(f0, 1.5),
      i_fpu(FpOp::FAdd, f1, f0, dr(8)),
      i_movr(dr(0), f1),
      i_bl(Builtin::PrintF),
      i_ret(Some(c)),
    ],
  );
  done(func)
}

/// A bounds check that throws into a handler, which reads both registers
/// and memory written before the check.
fn test_exceptions() -> Func {
  let mut func = Func::new("exceptions");
  let i = func.new_virtual_reg(RegClass::I64);
  let j = func.new_virtual_reg(RegClass::I64);
  let k = func.new_virtual_reg(RegClass::I64);
  let m = func.new_virtual_reg(RegClass::I64);
  let l = func.new_virtual_reg(RegClass::I64);
  let r = func.new_virtual_reg(RegClass::I64);

  let start = func.block(
    "start",
    vec![
      i_mov(i, 3),
      i_mov(j, 2),
      i_str(j, AM_RI(sp(), -8)),
      i_chk(i, RI_I(10)),
      i_add(k, i, RI_R(j)),
      i_chk(k, RI_I(4)),
      i_str(i, AM_RI(sp(), -8)),
      i_mov(m, 99),
      i_b("normal"),
    ],
  );
  func.set_eh_handler(start, "handler");
  func.block(
    "normal",
    vec![i_movr(xr(0), m), i_bl(Builtin::Print), i_ret(Some(m))],
  );
  func.block(
    "handler",
    vec![
      i_ldr(l, AM_RI(sp(), -8)),
      i_add(r, l, RI_R(k)),
      i_movr(xr(0), r),
      i_bl(Builtin::Print),
      i_ret(Some(r)),
    ],
  );
  done(func)
}

/// Memory barriers, an atomic, and inline assembly with and without a
/// memory clobber.
fn test_barriers() -> Func {
  let mut func = Func::new("barriers");
  let v: Vec<_> = (0..10).map(|_| func.new_virtual_reg(RegClass::I64)).collect();

  func.block(
    "start",
    vec![
      i_adrp(v[0], 4),
      i_addlo12(v[0], v[0], 4),
      i_mov(v[1], 5),
      i_str(v[1], AM_R(v[0])),
      i_dmb(),
      i_ldr(v[2], AM_R(v[0])),
      i_mov(v[3], 2),
      i_ldadd(v[4], v[3], v[0]),
      i_ldr(v[5], AM_R(v[0])),
      i_asm("foo", &[v[6]], &[v[5], v[4]], &[], true),
      i_asm("bar", &[v[7]], &[v[6]], &[xr(9)], false),
      i_add(v[8], v[7], RI_R(v[5])),
      i_str(v[8], AM_RI(v[0], 8)),
      i_ldr(v[9], AM_RI(v[0], 8)),
      i_add(v[9], v[9], RI_R(v[2])),
      i_ret(Some(v[9])),
    ],
  );
  done(func)
}

/// Class initialisation checks, literal pool loads and page addressing.
fn test_clinit() -> Func {
  let mut func = Func::new("clinit");
  func.literals = vec![42, 7, 2.0f64.to_bits() as i64];
  let c42 = func.new_virtual_reg(RegClass::I64);
  let c7 = func.new_virtual_reg(RegClass::I64);
  let g = func.new_virtual_reg(RegClass::I64);
  let l = func.new_virtual_reg(RegClass::I64);
  let s = func.new_virtual_reg(RegClass::I64);
  let f0 = func.new_virtual_reg(RegClass::F64);
  let f1 = func.new_virtual_reg(RegClass::F64);
  let f2 = func.new_virtual_reg(RegClass::F64);

  func.block(
    "start",
    vec![
      i_ldr(c42, AM_LIT(0)),
      i_ldr(c7, AM_LIT(1)),
      i_clinit(5),
      i_clinit_companion(5),
      i_adrp(g, 5),
      i_addlo12(g, g, 5),
      i_str(c42, AM_R(g)),
      i_ldr(l, AM_R(g)),
      i_add(s, l, RI_R(c7)),
      i_ldr(f0, AM_LIT(2)),
      i_fmov(f1, 0.5),
      i_fpu(FpOp::FMul, f2, f0, f1),
      i_movr(dr(0), f2),
      i_bl(Builtin::PrintF),
      i_clinit(5),
      i_movr(xr(0), s),
      i_bl(Builtin::Print),
      i_ret(Some(s)),
    ],
  );
  done(func)
}

/// Floating point, with a long-latency divide.
fn test_fp() -> Func {
  let mut func = Func::new("fp");
  let f: Vec<_> = (0..7).map(|_| func.new_virtual_reg(RegClass::F64)).collect();

  func.block(
    "start",
    vec![
      i_fmov(f[0], 1.0),
      i_fmov(f[1], 3.0),
      i_fpu(FpOp::FDiv, f[2], f[0], f[1]),
      i_fmov(f[6], 0.25),
      i_fpu(FpOp::FAdd, f[3], f[2], f[2]),
      i_fpu(FpOp::FSub, f[4], f[3], f[6]),
      i_fpu(FpOp::FMul, f[5], f[4], f[1]),
      i_movr(dr(0), f[5]),
      i_bl(Builtin::PrintF),
      i_ret(Some(f[5])),
    ],
  );
  done(func)
}

/// Many values loaded up front and consumed late.
fn test_pressure() -> Func {
  let mut func = Func::new("pressure");
  let base = func.new_virtual_reg(RegClass::I64);
  let mut insns = vec![i_adrp(base, 6), i_addlo12(base, base, 6)];
  for k in 0..8 {
    let c = func.new_virtual_reg(RegClass::I64);
    insns.push(i_mov(c, 3 * k + 1));
    insns.push(i_str(c, AM_RI(base, 8 * k)));
  }
  let loaded: Vec<_> = (0..8).map(|_| func.new_virtual_reg(RegClass::I64)).collect();
  for (k, l) in loaded.iter().enumerate() {
    insns.push(i_ldr(*l, AM_RI(base, 8 * k as i64)));
  }
  let mut acc = loaded[0];
  for l in loaded.iter().skip(1) {
    let t = func.new_virtual_reg(RegClass::I64);
    insns.push(i_mul(t, *l, RI_I(2)));
    let s = func.new_virtual_reg(RegClass::I64);
    insns.push(i_add(s, acc, RI_R(t)));
    acc = s;
  }
  insns.push(i_ret(Some(acc)));
  func.block("start", insns);
  done(func)
}

/// Pre- and post-indexed addressing on a global and on the stack.
fn test_pre_post_index() -> Func {
  let mut func = Func::new("pre_post_index");
  let g = func.new_virtual_reg(RegClass::I64);
  let v: Vec<_> = (0..7).map(|_| func.new_virtual_reg(RegClass::I64)).collect();

  func.block(
    "start",
    vec![
      i_adrp(g, 7),
      i_addlo12(g, g, 7),
      i_mov(v[0], 3),
      i_str(v[0], AM_PRE(g, 8)),
      i_mov(v[1], 4),
      i_str(v[1], AM_PRE(g, 8)),
      i_ldr(v[2], AM_POST(g, -8)),
      i_ldr(v[3], AM_R(g)),
      i_str(v[3], AM_PRE(sp(), -16)),
      i_ldr(v[4], AM_POST(sp(), 16)),
      i_add(v[5], v[2], RI_R(v[3])),
      i_add(v[6], v[5], RI_R(v[4])),
      i_ret(Some(v[6])),
    ],
  );
  done(func)
}

/// A rarely executed block on one side of a branch.
fn test_cold_path() -> Func {
  let mut func = Func::new("cold_path");
  let a = func.new_virtual_reg(RegClass::I64);
  let b = func.new_virtual_reg(RegClass::I64);
  let c = func.new_virtual_reg(RegClass::I64);
  let d = func.new_virtual_reg(RegClass::I64);

  func.block("start", vec![i_mov(a, 4), i_cbz(a, "slow", "fast")]);
  let slow = func.block(
    "slow",
    vec![i_movr(xr(0), a), i_bl(Builtin::Print), i_b("join")],
  );
  func.set_cold(slow);
  func.block("fast", vec![i_mov(b, 9), i_b("join")]);
  func.block(
    "join",
    vec![i_mov(c, 1), i_add(d, a, RI_R(c)), i_ret(Some(d))],
  );
  done(func)
}

/// One long block, long enough to be cut by separators.
fn test_big_block() -> Func {
  let mut func = Func::new("big_block");
  let mut acc = func.new_virtual_reg(RegClass::I64);
  let mut insns = vec![i_mov(acc, 0)];
  for k in 0..100 {
    let t = func.new_virtual_reg(RegClass::I64);
    insns.push(i_mov(t, k));
    insns.push(i_str(t, AM_RI(sp(), -8 * (k % 16 + 1))));
    let s = func.new_virtual_reg(RegClass::I64);
    insns.push(i_add(s, acc, RI_R(t)));
    acc = s;
  }
  let l = func.new_virtual_reg(RegClass::I64);
  let r = func.new_virtual_reg(RegClass::I64);
  insns.push(i_ldr(l, AM_RI(sp(), -8)));
  insns.push(i_add(r, acc, RI_R(l)));
  insns.push(i_ret(Some(r)));
  func.block("start", insns);
  done(func)
}

/// Two base registers holding the same address.
fn test_aliasing() -> Func {
  let mut func = Func::new("aliasing");
  let p = func.new_virtual_reg(RegClass::I64);
  let q = func.new_virtual_reg(RegClass::I64);
  let v: Vec<_> = (0..5).map(|_| func.new_virtual_reg(RegClass::I64)).collect();

  func.block(
    "start",
    vec![
      i_adrp(p, 8),
      i_addlo12(p, p, 8),
      i_adrp(q, 8),
      i_addlo12(q, q, 8),
      i_mov(v[0], 1),
      i_str(v[0], AM_RI(p, 16)),
      i_mov(v[1], 2),
      i_str(v[1], AM_RI(q, 16)),
      i_ldr(v[2], AM_RI(p, 16)),
      i_mov(v[3], 16),
      i_ldr(v[4], AM_RR(q, v[3])),
      i_add(v[4], v[4], RI_R(v[2])),
      i_ret(Some(v[4])),
    ],
  );
  done(func)
}

/// Two nested counted loops.
fn test_nested_loops() -> Func {
  let mut func = Func::new("nested_loops");
  let i = func.new_virtual_reg(RegClass::I64);
  let j = func.new_virtual_reg(RegClass::I64);
  let sum = func.new_virtual_reg(RegClass::I64);
  let t = func.new_virtual_reg(RegClass::I64);

  func.block("start", vec![i_mov(i, 0), i_mov(sum, 0), i_b("outer")]);
  func.block("outer", vec![i_mov(j, 0), i_b("inner")]);
  func.block(
    "inner",
    vec![
      i_mul(t, i, RI_R(j)),
      i_add(sum, sum, RI_R(t)),
      i_add(j, j, RI_I(1)),
      i_cmp(j, RI_I(3)),
      i_bcond(Cond::Lt, "inner", "latch"),
    ],
  );
  func.block(
    "latch",
    vec![
      i_add(i, i, RI_I(1)),
      i_cmp(i, RI_I(4)),
      i_bcond(Cond::Lt, "outer", "end"),
    ],
  );
  func.block(
    "end",
    vec![i_movr(xr(0), sum), i_bl(Builtin::Print), i_ret(Some(sum))],
  );
  done(func)
}

/// Integer division and shifts, with division by zero.
fn test_divide() -> Func {
  let mut func = Func::new("divide");
  let v: Vec<_> = (0..8).map(|_| func.new_virtual_reg(RegClass::I64)).collect();

  func.block(
    "start",
    vec![
      i_mov(v[0], 100),
      i_mov(v[1], 7),
      i_sdiv(v[2], v[0], RI_R(v[1])),
      i_mov(v[3], 0),
      i_sdiv(v[4], v[0], RI_R(v[3])),
      i_alu(BinOp::Lsr, v[5], v[0], RI_I(2)),
      i_alu(BinOp::Eor, v[6], v[5], RI_R(v[2])),
      i_sub(v[7], v[6], RI_R(v[4])),
      i_movr(xr(0), v[7]),
      i_bl(Builtin::Print),
      i_ret(Some(v[7])),
    ],
  );
  done(func)
}

pub fn find_func(name: &str) -> Result<Func, Vec<String>> {
  let all_funcs = vec![
    test_straight_line(),
    test_load_use(),     // latency hiding, with pseudo insns
    test_pairs(),        // adjacent stack slots
    test_diamond(),      // hoisting into the entry
    test_sum_loop(),     // loops, register-offset and post-index modes
    test_calls(),
    test_exceptions(),   // throwing insns and their handler
    test_barriers(),     // dmb, atomics, inline asm
    test_clinit(),
    test_fp(),
    test_pressure(),     // lots of simultaneously live values
    test_pre_post_index(),
    test_cold_path(),
    test_big_block(),    // more than one separator window
    test_aliasing(),     // different bases, same address
    test_nested_loops(),
    test_divide(),
  ];

  let mut all_names = Vec::new();
  for cand in &all_funcs {
    all_names.push(cand.name.clone());
  }

  for cand in all_funcs {
    if cand.name == *name {
      return Ok(cand);
    }
  }

  fn ends_in_tilde(path: &PathBuf) -> bool {
    path.to_str().map_or(false, |s| s.ends_with('~'))
  }

  let test_dir = Path::new("tests");
  match test_dir.read_dir() {
    Err(err) => {
      println!("can't read test directory: {}", err);
    }
    Ok(entries) => {
      for entry in entries.flatten() {
        let path = entry.path();
        // Skip editor backup files.
        if ends_in_tilde(&path) {
          continue;
        }
        let basename = match path.file_stem().and_then(|s| s.to_str()) {
          Some(s) => s.to_string(),
          None => continue,
        };
        if basename == name {
          match parser::parse_file(path) {
            Ok(func) => return Ok(func),
            Err(err) => panic!("unparseable test file {}: {}", name, err),
          }
        }
        all_names.push(basename)
      }
    }
  }

  all_names.sort();
  Err(all_names)
}

/// The names of the test cases built in here.
pub fn builtin_names() -> Vec<&'static str> {
  vec![
    "straight_line",
    "load_use",
    "pairs",
    "diamond",
    "sum_loop",
    "calls",
    "exceptions",
    "barriers",
    "clinit",
    "fp",
    "pressure",
    "pre_post_index",
    "cold_path",
    "big_block",
    "aliasing",
    "nested_loops",
    "divide",
  ]
}
