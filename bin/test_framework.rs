/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

#![allow(non_snake_case)]

/// As part of this set of test cases, we define a mini AArch64-like IR and
/// implement the `Function` trait for it so that we can use the scheduler's
/// public interface, and run the code before and after scheduling.
use arbitrary::Arbitrary;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use insnsched::{
  AddrMode, BlockIx, Function, InsnDesc, InsnProps, InstIx, InstRegUses, Map,
  MemAccessKind, MemOperand, MemRegion, OpClass, PseudoKind, Range, Reg,
  RegClass, ScheduleResult, Set,
};

use std::fmt;

//=============================================================================
// Registers.  x0 .. x30 and sp, d0 .. d31, the flags, and virtual registers
// of the integer and floating point classes.

pub const FP_INDEX: u8 = 29;
pub const LR_INDEX: u8 = 30;
pub const SP_INDEX: u8 = 31;

pub fn xr(n: u8) -> Reg {
  Reg::new_real(RegClass::I64, n)
}
pub fn dr(n: u8) -> Reg {
  Reg::new_real(RegClass::F64, n)
}
pub fn nzcv() -> Reg {
  Reg::new_real(RegClass::Flags, 0)
}
pub fn sp() -> Reg {
  xr(SP_INDEX)
}
pub fn fp() -> Reg {
  xr(FP_INDEX)
}

/// Registers a call may clobber (AAPCS64).
pub fn is_caller_saved(reg: Reg) -> bool {
  if !reg.is_real() {
    return false;
  }
  let n = reg.get_index();
  match reg.get_class() {
    RegClass::I64 => n <= 17 || n == LR_INDEX as usize,
    RegClass::F64 => n <= 7 || n >= 16,
    RegClass::Flags => true,
  }
}

pub fn reg_name(reg: Reg) -> String {
  if reg.is_virtual() {
    match reg.get_class() {
      RegClass::I64 => format!("v{}", reg.get_index()),
      RegClass::F64 => format!("vd{}", reg.get_index()),
      RegClass::Flags => format!("vc{}", reg.get_index()),
    }
  } else {
    match reg.get_class() {
      RegClass::I64 if reg.get_index() == SP_INDEX as usize => "sp".to_string(),
      RegClass::I64 => format!("x{}", reg.get_index()),
      RegClass::F64 => format!("d{}", reg.get_index()),
      RegClass::Flags => "nzcv".to_string(),
    }
  }
}

pub fn parse_reg(name: &str) -> Option<Reg> {
  fn num(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
      return None;
    }
    s.parse::<u32>().ok()
  }
  match name {
    "sp" => return Some(sp()),
    "nzcv" => return Some(nzcv()),
    _ => {}
  }
  if let Some(n) = name.strip_prefix("vd").and_then(num) {
    return Some(Reg::new_virtual(RegClass::F64, n));
  }
  if let Some(n) = name.strip_prefix("vc").and_then(num) {
    return Some(Reg::new_virtual(RegClass::Flags, n));
  }
  if let Some(n) = name.strip_prefix('v').and_then(num) {
    return Some(Reg::new_virtual(RegClass::I64, n));
  }
  if let Some(n) = name.strip_prefix('x').and_then(num) {
    if n < SP_INDEX as u32 {
      return Some(xr(n as u8));
    }
  }
  if let Some(n) = name.strip_prefix('d').and_then(num) {
    if n < 32 {
      return Some(dr(n as u8));
    }
  }
  None
}

//=============================================================================
// Definition of: Label, RI (reg-or-immediate operands), AM (address modes),
// the operators, and Inst (instructions).  Destinations are on the left.

#[derive(Clone, Serialize, Deserialize)]
pub enum Label {
  Unresolved { name: String },
  Resolved { name: String, bix: BlockIx },
}
impl fmt::Debug for Label {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{}", self.name())
  }
}
impl Label {
  pub fn new_unresolved(name: &str) -> Label {
    Label::Unresolved { name: name.to_string() }
  }
  pub fn name(&self) -> &str {
    match self {
      Label::Unresolved { name } | Label::Resolved { name, .. } => name,
    }
  }
  pub fn block_ix(&self) -> BlockIx {
    match self {
      Label::Resolved { bix, .. } => *bix,
      Label::Unresolved { name } => {
        panic!("Label::block_ix: unresolved label {}", name)
      }
    }
  }
  fn resolve(&mut self, blocks: &[Block]) -> Result<(), String> {
    let name = self.name().to_string();
    match blocks.iter().position(|b| b.name == name) {
      Some(n) => {
        *self = Label::Resolved { name, bix: BlockIx::new(n as u32) };
        Ok(())
      }
      None => Err(format!("can't resolve label name '{}'", name)),
    }
  }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub enum RI {
  Reg { reg: Reg },
  Imm { imm: i64 },
}
impl fmt::Debug for RI {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      RI::Reg { reg } => write!(fmt, "{}", reg_name(*reg)),
      RI::Imm { imm } => write!(fmt, "{}", imm),
    }
  }
}
pub fn RI_R(reg: Reg) -> RI {
  RI::Reg { reg }
}
pub fn RI_I(imm: i64) -> RI {
  RI::Imm { imm }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub enum AM {
  /// `[base, offset]`
  Offset { base: Reg, offset: i64 },
  /// `[base, offset]!`
  PreIndex { base: Reg, offset: i64 },
  /// `[base], offset`
  PostIndex { base: Reg, offset: i64 },
  /// `[base, index]`
  RegOffset { base: Reg, index: Reg },
  /// `=sym`: an entry of the function's literal pool.
  Literal { sym: u32 },
}
impl fmt::Debug for AM {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      AM::Offset { base, offset } => {
        write!(fmt, "[{}, {}]", reg_name(*base), offset)
      }
      AM::PreIndex { base, offset } => {
        write!(fmt, "[{}, {}]!", reg_name(*base), offset)
      }
      AM::PostIndex { base, offset } => {
        write!(fmt, "[{}], {}", reg_name(*base), offset)
      }
      AM::RegOffset { base, index } => {
        write!(fmt, "[{}, {}]", reg_name(*base), reg_name(*index))
      }
      AM::Literal { sym } => write!(fmt, "={}", sym),
    }
  }
}
pub fn AM_R(base: Reg) -> AM {
  AM::Offset { base, offset: 0 }
}
pub fn AM_RI(base: Reg, offset: i64) -> AM {
  AM::Offset { base, offset }
}
pub fn AM_PRE(base: Reg, offset: i64) -> AM {
  AM::PreIndex { base, offset }
}
pub fn AM_POST(base: Reg, offset: i64) -> AM {
  AM::PostIndex { base, offset }
}
pub fn AM_RR(base: Reg, index: Reg) -> AM {
  AM::RegOffset { base, index }
}
pub fn AM_LIT(sym: u32) -> AM {
  AM::Literal { sym }
}

impl AM {
  fn add_reg_reads_to(&self, uses: &mut Vec<Reg>) {
    match self {
      AM::Offset { base, .. }
      | AM::PreIndex { base, .. }
      | AM::PostIndex { base, .. } => uses.push(*base),
      AM::RegOffset { base, index } => {
        uses.push(*base);
        uses.push(*index);
      }
      AM::Literal { .. } => {}
    }
  }

  /// The base register, if the access writes it back.
  pub fn writeback_reg(&self) -> Option<Reg> {
    match self {
      AM::PreIndex { base, .. } | AM::PostIndex { base, .. } => Some(*base),
      _ => None,
    }
  }

  fn to_mem_operand(&self, access: MemAccessKind) -> MemOperand {
    let (mode, base, index, offset, symbol) = match *self {
      AM::Offset { base, offset } => {
        (AddrMode::BaseOffset, Some(base), None, offset, None)
      }
      AM::PreIndex { base, offset } => {
        (AddrMode::PreIndex, Some(base), None, offset, None)
      }
      AM::PostIndex { base, offset } => {
        (AddrMode::PostIndex, Some(base), None, offset, None)
      }
      AM::RegOffset { base, index } => {
        (AddrMode::RegOffset, Some(base), Some(index), 0, None)
      }
      AM::Literal { sym } => (AddrMode::Literal, None, None, 0, Some(sym)),
    };
    let region = match base {
      Some(b) if b == sp() || b == fp() => MemRegion::Stack,
      _ => MemRegion::Heap,
    };
    MemOperand {
      mode,
      base,
      index,
      offset,
      size: 8,
      symbol,
      region,
      access,
      // The literal pool is read-only.
      independent: mode == AddrMode::Literal,
      callee_save: false,
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Arbitrary)]
pub enum BinOp {
  Add,
  Sub,
  And,
  Orr,
  Eor,
  Lsl,
  Lsr,
  Mul,
  Sdiv,
}
impl BinOp {
  pub fn name(self) -> &'static str {
    match self {
      BinOp::Add => "add",
      BinOp::Sub => "sub",
      BinOp::And => "and",
      BinOp::Orr => "orr",
      BinOp::Eor => "eor",
      BinOp::Lsl => "lsl",
      BinOp::Lsr => "lsr",
      BinOp::Mul => "mul",
      BinOp::Sdiv => "sdiv",
    }
  }
  pub fn from_name(name: &str) -> Option<BinOp> {
    use BinOp::*;
    [Add, Sub, And, Orr, Eor, Lsl, Lsr, Mul, Sdiv]
      .iter()
      .cloned()
      .find(|op| op.name() == name)
  }
  pub fn calc(self, argL: i64, argR: i64) -> i64 {
    match self {
      BinOp::Add => argL.wrapping_add(argR),
      BinOp::Sub => argL.wrapping_sub(argR),
      BinOp::And => argL & argR,
      BinOp::Orr => argL | argR,
      BinOp::Eor => argL ^ argR,
      BinOp::Lsl => argL.wrapping_shl((argR & 63) as u32),
      BinOp::Lsr => ((argL as u64) >> (argR & 63)) as i64,
      BinOp::Mul => argL.wrapping_mul(argR),
      // Division by zero gives zero, as on AArch64.
      BinOp::Sdiv => {
        if argR == 0 {
          0
        } else {
          argL.wrapping_div(argR)
        }
      }
    }
  }
  fn op_class(self) -> OpClass {
    match self {
      BinOp::Lsl | BinOp::Lsr => OpClass::AluShift,
      BinOp::Mul => OpClass::Mul,
      BinOp::Sdiv => OpClass::Div,
      _ => OpClass::Alu,
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Arbitrary)]
pub enum FpOp {
  FAdd,
  FSub,
  FMul,
  FDiv,
}
impl FpOp {
  pub fn name(self) -> &'static str {
    match self {
      FpOp::FAdd => "fadd",
      FpOp::FSub => "fsub",
      FpOp::FMul => "fmul",
      FpOp::FDiv => "fdiv",
    }
  }
  pub fn from_name(name: &str) -> Option<FpOp> {
    use FpOp::*;
    [FAdd, FSub, FMul, FDiv].iter().cloned().find(|op| op.name() == name)
  }
  pub fn calc(self, argL: f64, argR: f64) -> f64 {
    match self {
      FpOp::FAdd => argL + argR,
      FpOp::FSub => argL - argR,
      FpOp::FMul => argL * argR,
      FpOp::FDiv => argL / argR,
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Arbitrary)]
pub enum Cond {
  Eq,
  Ne,
  Lt,
  Ge,
  Gt,
  Le,
}
impl Cond {
  pub fn name(self) -> &'static str {
    match self {
      Cond::Eq => "eq",
      Cond::Ne => "ne",
      Cond::Lt => "lt",
      Cond::Ge => "ge",
      Cond::Gt => "gt",
      Cond::Le => "le",
    }
  }
  pub fn from_name(name: &str) -> Option<Cond> {
    use Cond::*;
    [Eq, Ne, Lt, Ge, Gt, Le].iter().cloned().find(|c| c.name() == name)
  }
  /// `flags` is the sign of the last comparison.
  pub fn holds(self, flags: i64) -> bool {
    match self {
      Cond::Eq => flags == 0,
      Cond::Ne => flags != 0,
      Cond::Lt => flags < 0,
      Cond::Ge => flags >= 0,
      Cond::Gt => flags > 0,
      Cond::Le => flags <= 0,
    }
  }
}

/// The functions `bl` can call.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Arbitrary)]
pub enum Builtin {
  /// Print x0.
  Print,
  /// Print d0.
  PrintF,
  /// x0 = max(x0, x1)
  Max,
  /// x0 = |x0|
  Abs,
}
impl Builtin {
  pub fn name(self) -> &'static str {
    match self {
      Builtin::Print => "print",
      Builtin::PrintF => "printf",
      Builtin::Max => "max",
      Builtin::Abs => "abs",
    }
  }
  pub fn from_name(name: &str) -> Option<Builtin> {
    use Builtin::*;
    [Print, PrintF, Max, Abs].iter().cloned().find(|b| b.name() == name)
  }
  pub fn args(self) -> Vec<Reg> {
    match self {
      Builtin::Print | Builtin::Abs => vec![xr(0)],
      Builtin::PrintF => vec![dr(0)],
      Builtin::Max => vec![xr(0), xr(1)],
    }
  }
  pub fn result(self) -> Option<Reg> {
    match self {
      Builtin::Print | Builtin::PrintF => None,
      Builtin::Max | Builtin::Abs => Some(xr(0)),
    }
  }
}

#[derive(Clone, Serialize, Deserialize)]
pub enum Inst {
  Mov { dst: Reg, imm: i64 },
  MovR { dst: Reg, src: Reg },
  FMov { dst: Reg, imm: f64 },
  Alu { op: BinOp, dst: Reg, src_left: Reg, src_right: RI },
  /// Sets the flags to the sign of `src_left - src_right`.
  Cmp { src_left: Reg, src_right: RI },
  Fpu { op: FpOp, dst: Reg, src_left: Reg, src_right: Reg },
  Ldr { dst: Reg, addr: AM },
  Str { src: Reg, addr: AM },
  /// Atomic fetch-and-add: `dst = [base]; [base] += src`.
  LdAdd { dst: Reg, src: Reg, base: Reg },
  /// The 4K page of global `sym`.
  Adrp { dst: Reg, sym: u32 },
  /// `dst = src + the low 12 bits of global sym's address`.
  AddLo12 { dst: Reg, src: Reg, sym: u32 },
  /// Initialise global `sym` on first use.
  Clinit { sym: u32 },
  Bl { callee: Builtin },
  Dmb,
  Asm { text: String, defs: Vec<Reg>, uses: Vec<Reg>, clobbers: Vec<Reg>, memory: bool },
  /// Bounds check: throws unless `0 <= index < bound`.
  Chk { index: Reg, bound: RI },
  B { target: Label },
  BCond { cond: Cond, target_true: Label, target_false: Label },
  Cbz { reg: Reg, target_zero: Label, target_nonzero: Label },
  Ret { reg: Option<Reg> },
  Comment { text: String },
  DebugLoc { line: u32 },
  Cfi { text: String },
  ClinitCompanion { sym: u32 },
}

pub fn i_mov(dst: Reg, imm: i64) -> Inst {
  debug_assert!(dst.get_class() == RegClass::I64);
  Inst::Mov { dst, imm }
}
pub fn i_movr(dst: Reg, src: Reg) -> Inst {
  debug_assert!(dst.get_class() == src.get_class());
  Inst::MovR { dst, src }
}
pub fn i_fmov(dst: Reg, imm: f64) -> Inst {
  debug_assert!(dst.get_class() == RegClass::F64);
  Inst::FMov { dst, imm }
}
pub fn i_alu(op: BinOp, dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  debug_assert!(dst.get_class() == RegClass::I64);
  debug_assert!(src_left.get_class() == RegClass::I64);
  Inst::Alu { op, dst, src_left, src_right }
}
pub fn i_add(dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  i_alu(BinOp::Add, dst, src_left, src_right)
}
pub fn i_sub(dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  i_alu(BinOp::Sub, dst, src_left, src_right)
}
pub fn i_mul(dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  i_alu(BinOp::Mul, dst, src_left, src_right)
}
pub fn i_sdiv(dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  i_alu(BinOp::Sdiv, dst, src_left, src_right)
}
pub fn i_lsl(dst: Reg, src_left: Reg, src_right: RI) -> Inst {
  i_alu(BinOp::Lsl, dst, src_left, src_right)
}
pub fn i_cmp(src_left: Reg, src_right: RI) -> Inst {
  debug_assert!(src_left.get_class() == RegClass::I64);
  Inst::Cmp { src_left, src_right }
}
pub fn i_fpu(op: FpOp, dst: Reg, src_left: Reg, src_right: Reg) -> Inst {
  debug_assert!(dst.get_class() == RegClass::F64);
  debug_assert!(src_left.get_class() == RegClass::F64);
  debug_assert!(src_right.get_class() == RegClass::F64);
  Inst::Fpu { op, dst, src_left, src_right }
}
pub fn i_ldr(dst: Reg, addr: AM) -> Inst {
  Inst::Ldr { dst, addr }
}
pub fn i_str(src: Reg, addr: AM) -> Inst {
  Inst::Str { src, addr }
}
pub fn i_ldadd(dst: Reg, src: Reg, base: Reg) -> Inst {
  Inst::LdAdd { dst, src, base }
}
pub fn i_adrp(dst: Reg, sym: u32) -> Inst {
  Inst::Adrp { dst, sym }
}
pub fn i_addlo12(dst: Reg, src: Reg, sym: u32) -> Inst {
  Inst::AddLo12 { dst, src, sym }
}
pub fn i_clinit(sym: u32) -> Inst {
  Inst::Clinit { sym }
}
pub fn i_bl(callee: Builtin) -> Inst {
  Inst::Bl { callee }
}
pub fn i_dmb() -> Inst {
  Inst::Dmb
}
pub fn i_asm(
  text: &str, defs: &[Reg], uses: &[Reg], clobbers: &[Reg], memory: bool,
) -> Inst {
  Inst::Asm {
    text: text.to_string(),
    defs: defs.to_vec(),
    uses: uses.to_vec(),
    clobbers: clobbers.to_vec(),
    memory,
  }
}
pub fn i_chk(index: Reg, bound: RI) -> Inst {
  Inst::Chk { index, bound }
}
pub fn i_b(target: &str) -> Inst {
  Inst::B { target: Label::new_unresolved(target) }
}
pub fn i_bcond(cond: Cond, target_true: &str, target_false: &str) -> Inst {
  Inst::BCond {
    cond,
    target_true: Label::new_unresolved(target_true),
    target_false: Label::new_unresolved(target_false),
  }
}
pub fn i_cbz(reg: Reg, target_zero: &str, target_nonzero: &str) -> Inst {
  Inst::Cbz {
    reg,
    target_zero: Label::new_unresolved(target_zero),
    target_nonzero: Label::new_unresolved(target_nonzero),
  }
}
pub fn i_ret(reg: Option<Reg>) -> Inst {
  Inst::Ret { reg }
}
pub fn i_comment(text: &str) -> Inst {
  Inst::Comment { text: text.to_string() }
}
pub fn i_debug(line: u32) -> Inst {
  Inst::DebugLoc { line }
}
pub fn i_cfi(text: &str) -> Inst {
  Inst::Cfi { text: text.to_string() }
}
pub fn i_clinit_companion(sym: u32) -> Inst {
  Inst::ClinitCompanion { sym }
}

fn reg_list(regs: &[Reg]) -> String {
  let names: Vec<String> = regs.iter().map(|r| reg_name(*r)).collect();
  format!("({})", names.join(", "))
}

// Printed in the syntax the parser reads.
impl fmt::Debug for Inst {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let r = |reg: &Reg| reg_name(*reg);
    match self {
      Inst::Mov { dst, imm } => write!(fmt, "mov     {}, {}", r(dst), imm),
      Inst::MovR { dst, src } => write!(fmt, "mov     {}, {}", r(dst), r(src)),
      Inst::FMov { dst, imm } => write!(fmt, "fmov    {}, {:?}", r(dst), imm),
      Inst::Alu { op, dst, src_left, src_right } => write!(
        fmt,
        "{:<7} {}, {}, {:?}",
        op.name(),
        r(dst),
        r(src_left),
        src_right
      ),
      Inst::Cmp { src_left, src_right } => {
        write!(fmt, "cmp     {}, {:?}", r(src_left), src_right)
      }
      Inst::Fpu { op, dst, src_left, src_right } => write!(
        fmt,
        "{:<7} {}, {}, {}",
        op.name(),
        r(dst),
        r(src_left),
        r(src_right)
      ),
      Inst::Ldr { dst, addr } => write!(fmt, "ldr     {}, {:?}", r(dst), addr),
      Inst::Str { src, addr } => write!(fmt, "str     {}, {:?}", r(src), addr),
      Inst::LdAdd { dst, src, base } => {
        write!(fmt, "ldadd   {}, {}, [{}]", r(dst), r(src), r(base))
      }
      Inst::Adrp { dst, sym } => write!(fmt, "adrp    {}, {}", r(dst), sym),
      Inst::AddLo12 { dst, src, sym } => {
        write!(fmt, "addlo12 {}, {}, {}", r(dst), r(src), sym)
      }
      Inst::Clinit { sym } => write!(fmt, "clinit  {}", sym),
      Inst::Bl { callee } => write!(fmt, "bl      {}", callee.name()),
      Inst::Dmb => write!(fmt, "dmb"),
      Inst::Asm { text, defs, uses, clobbers, memory } => write!(
        fmt,
        "asm     {:?} {} {} {} {}",
        text,
        reg_list(defs),
        reg_list(uses),
        reg_list(clobbers),
        if *memory { "mem" } else { "nomem" }
      ),
      Inst::Chk { index, bound } => {
        write!(fmt, "chk     {}, {:?}", r(index), bound)
      }
      Inst::B { target } => write!(fmt, "b       {:?}", target),
      Inst::BCond { cond, target_true, target_false } => write!(
        fmt,
        "bcond   {}, {:?}, {:?}",
        cond.name(),
        target_true,
        target_false
      ),
      Inst::Cbz { reg, target_zero, target_nonzero } => write!(
        fmt,
        "cbz     {}, {:?}, {:?}",
        r(reg),
        target_zero,
        target_nonzero
      ),
      Inst::Ret { reg: Some(reg) } => write!(fmt, "ret     {}", r(reg)),
      Inst::Ret { reg: None } => write!(fmt, "ret"),
      Inst::Comment { text } => write!(fmt, "comment {:?}", text),
      Inst::DebugLoc { line } => write!(fmt, "debug   {}", line),
      Inst::Cfi { text } => write!(fmt, "cfi     {:?}", text),
      Inst::ClinitCompanion { sym } => write!(fmt, "clinit_companion {}", sym),
    }
  }
}

impl Inst {
  pub fn is_control_flow(&self) -> bool {
    match self {
      Inst::B { .. }
      | Inst::BCond { .. }
      | Inst::Cbz { .. }
      | Inst::Ret { .. } => true,
      _ => false,
    }
  }

  pub fn pseudo_kind(&self) -> Option<PseudoKind> {
    match self {
      Inst::Comment { .. } => Some(PseudoKind::Comment),
      Inst::DebugLoc { .. } => Some(PseudoKind::Debug),
      Inst::Cfi { .. } => Some(PseudoKind::Cfi),
      Inst::ClinitCompanion { .. } => Some(PseudoKind::ClinitCompanion),
      _ => None,
    }
  }

  pub fn is_pseudo(&self) -> bool {
    self.pseudo_kind().is_some()
  }

  // The blocks this insn might jump to.  Only for control flow insns, whose
  // labels are all resolved.
  pub fn targets(&self) -> Vec<BlockIx> {
    match self {
      Inst::B { target } => vec![target.block_ix()],
      Inst::BCond { target_true, target_false, .. } => {
        vec![target_true.block_ix(), target_false.block_ix()]
      }
      Inst::Cbz { target_zero, target_nonzero, .. } => {
        vec![target_zero.block_ix(), target_nonzero.block_ix()]
      }
      _ => vec![],
    }
  }

  fn labels_mut(&mut self) -> Vec<&mut Label> {
    match self {
      Inst::B { target } => vec![target],
      Inst::BCond { target_true, target_false, .. } => {
        vec![target_true, target_false]
      }
      Inst::Cbz { target_zero, target_nonzero, .. } => {
        vec![target_zero, target_nonzero]
      }
      _ => vec![],
    }
  }

  // Returns (defs, uses).  A register both read and written appears in
  // both.
  pub fn get_reg_usage(&self) -> (Vec<Reg>, Vec<Reg>) {
    let mut def = Vec::<Reg>::new();
    let mut uce = Vec::<Reg>::new();
    match self {
      Inst::Mov { dst, .. } | Inst::FMov { dst, .. } => def.push(*dst),
      Inst::MovR { dst, src } => {
        def.push(*dst);
        uce.push(*src);
      }
      Inst::Alu { dst, src_left, src_right, .. } => {
        def.push(*dst);
        uce.push(*src_left);
        if let RI::Reg { reg } = src_right {
          uce.push(*reg);
        }
      }
      Inst::Cmp { src_left, src_right } => {
        def.push(nzcv());
        uce.push(*src_left);
        if let RI::Reg { reg } = src_right {
          uce.push(*reg);
        }
      }
      Inst::Fpu { dst, src_left, src_right, .. } => {
        def.push(*dst);
        uce.push(*src_left);
        uce.push(*src_right);
      }
      Inst::Ldr { dst, addr } => {
        def.push(*dst);
        addr.add_reg_reads_to(&mut uce);
        def.extend(addr.writeback_reg());
      }
      Inst::Str { src, addr } => {
        uce.push(*src);
        addr.add_reg_reads_to(&mut uce);
        def.extend(addr.writeback_reg());
      }
      Inst::LdAdd { dst, src, base } => {
        def.push(*dst);
        uce.push(*src);
        uce.push(*base);
      }
      Inst::Adrp { dst, .. } => def.push(*dst),
      Inst::AddLo12 { dst, src, .. } => {
        def.push(*dst);
        uce.push(*src);
      }
      Inst::Clinit { .. } | Inst::Dmb => {}
      Inst::Bl { callee } => {
        uce.extend(callee.args());
        def.extend(callee.result());
        def.push(xr(LR_INDEX));
      }
      Inst::Asm { defs, uses, .. } => {
        def.extend(defs.iter().cloned());
        uce.extend(uses.iter().cloned());
      }
      Inst::Chk { index, bound } => {
        uce.push(*index);
        if let RI::Reg { reg } = bound {
          uce.push(*reg);
        }
      }
      Inst::B { .. } => {}
      Inst::BCond { .. } => uce.push(nzcv()),
      Inst::Cbz { reg, .. } => uce.push(*reg),
      Inst::Ret { reg } => uce.extend(*reg),
      Inst::Comment { .. }
      | Inst::DebugLoc { .. }
      | Inst::Cfi { .. }
      | Inst::ClinitCompanion { .. } => {}
    }
    def.sort();
    def.dedup();
    uce.sort();
    uce.dedup();
    (def, uce)
  }

  pub fn desc(&self) -> InsnDesc {
    if let Some(kind) = self.pseudo_kind() {
      return InsnDesc::pseudo(kind);
    }
    let mut props = InsnProps::default();
    let class = match self {
      Inst::Mov { .. } | Inst::MovR { .. } | Inst::Cmp { .. } => OpClass::Alu,
      Inst::FMov { .. } => OpClass::Fpu,
      Inst::Alu { op, .. } => op.op_class(),
      Inst::Fpu { op: FpOp::FDiv, .. } => OpClass::FpuDiv,
      Inst::Fpu { .. } => OpClass::Fpu,
      Inst::Ldr { .. } => OpClass::Load,
      Inst::Str { .. } => OpClass::Store,
      Inst::LdAdd { .. } => {
        props.is_atomic = true;
        OpClass::Atomic
      }
      Inst::Adrp { .. } => OpClass::Adrp,
      Inst::AddLo12 { .. } => OpClass::AddLo12,
      Inst::Clinit { .. } => {
        // Runs the initialiser the first time round.
        props.is_call = true;
        OpClass::Clinit
      }
      Inst::Bl { .. } => {
        props.is_call = true;
        OpClass::Call
      }
      Inst::Dmb => {
        props.is_barrier = true;
        OpClass::Barrier
      }
      Inst::Asm { memory, .. } => {
        props.is_inline_asm = true;
        props.asm_touches_memory = *memory;
        OpClass::InlineAsm
      }
      Inst::Chk { .. } => {
        props.may_throw = true;
        OpClass::Alu
      }
      Inst::B { .. } | Inst::BCond { .. } | Inst::Cbz { .. } => {
        props.is_branch = true;
        OpClass::Branch
      }
      Inst::Ret { .. } => {
        props.is_return = true;
        OpClass::Branch
      }
      _ => OpClass::Nop,
    };
    let mut desc = InsnDesc::new(class).with_props(props);
    match self {
      Inst::Ldr { addr, .. } => {
        desc = desc.with_mem(addr.to_mem_operand(MemAccessKind::Read))
      }
      Inst::Str { addr, .. } => {
        desc = desc.with_mem(addr.to_mem_operand(MemAccessKind::Write))
      }
      Inst::LdAdd { base, .. } => {
        desc = desc.with_mem(AM_R(*base).to_mem_operand(MemAccessKind::Write))
      }
      Inst::Asm { clobbers, .. } => {
        desc.clobbers = clobbers.iter().cloned().collect()
      }
      _ => {}
    }
    desc
  }
}

//=============================================================================
// The interpreter

/// Bytes of memory.  Globals start at GLOBALS_BASE, each GLOBAL_SIZE bytes
/// long; the stack grows down from STACK_TOP.
pub const MEM_SIZE: u64 = 64 * 1024;
pub const GLOBALS_BASE: u64 = 4096;
pub const GLOBAL_SIZE: u64 = 1024;
pub const NUM_GLOBALS: u32 = 16;
pub const STACK_TOP: u64 = MEM_SIZE - 1024;

const MAX_STEPS: u64 = 1_000_000;

pub fn global_addr(sym: u32) -> u64 {
  GLOBALS_BASE + GLOBAL_SIZE * sym as u64
}

#[derive(Copy, Clone)]
pub enum Value {
  I64(i64),
  F64(f64),
}
impl Value {
  fn from_bits(rc: RegClass, bits: u64) -> Value {
    match rc {
      RegClass::F64 => Value::F64(f64::from_bits(bits)),
      _ => Value::I64(bits as i64),
    }
  }
  fn to_bits(self) -> u64 {
    match self {
      Value::I64(n) => n as u64,
      Value::F64(f) => f.to_bits(),
    }
  }
  fn to_i64(self) -> i64 {
    self.to_bits() as i64
  }
  fn to_f64(self) -> f64 {
    f64::from_bits(self.to_bits())
  }
}
// Bitwise, so that NaNs compare equal to themselves.
impl PartialEq for Value {
  fn eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::I64(a), Value::I64(b)) => a == b,
      (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
      _ => false,
    }
  }
}
impl fmt::Debug for Value {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Value::I64(n) => write!(fmt, "{}", n),
      Value::F64(n) => write!(fmt, "{:?}", n),
    }
  }
}

struct IState<'a> {
  func: &'a Func,
  nia: InstIx, // Program counter ("next instruction address")
  regs: Map<Reg, Value>,
  mem: Vec<u64>,
  inited: Set<u32>,
  stdout: String,
  num_steps: u64,
  ret_value: Option<Value>,
}

impl<'a> IState<'a> {
  fn new(func: &'a Func) -> Self {
    let mut state = IState {
      func,
      nia: func.blocks[0].start,
      regs: Map::default(),
      mem: vec![0; (MEM_SIZE / 8) as usize],
      inited: Set::empty(),
      stdout: String::new(),
      num_steps: 0,
      ret_value: None,
    };
    state.regs.insert(sp(), Value::I64(STACK_TOP as i64));
    state.regs.insert(fp(), Value::I64(STACK_TOP as i64));
    state
  }

  fn get_reg(&self, reg: Reg) -> Result<Value, String> {
    match self.regs.get(&reg) {
      Some(v) => Ok(*v),
      None => Err(format!("read of uninit reg {}", reg_name(reg))),
    }
  }

  fn set_reg(&mut self, reg: Reg, bits: u64) {
    self.regs.insert(reg, Value::from_bits(reg.get_class(), bits));
  }

  fn get_i64(&self, reg: Reg) -> Result<i64, String> {
    Ok(self.get_reg(reg)?.to_i64())
  }

  fn get_ri(&self, ri: &RI) -> Result<i64, String> {
    match ri {
      RI::Reg { reg } => self.get_i64(*reg),
      RI::Imm { imm } => Ok(*imm),
    }
  }

  fn check_addr(&self, addr: i64) -> Result<usize, String> {
    if addr < 0 || addr as u64 >= MEM_SIZE || addr % 8 != 0 {
      return Err(format!("invalid address {}", addr));
    }
    Ok((addr / 8) as usize)
  }

  fn load(&self, addr: i64) -> Result<u64, String> {
    Ok(self.mem[self.check_addr(addr)?])
  }

  fn store(&mut self, addr: i64, bits: u64) -> Result<(), String> {
    let ix = self.check_addr(addr)?;
    self.mem[ix] = bits;
    Ok(())
  }

  // The address accessed, after doing any base register write back.
  fn get_am(&mut self, am: &AM) -> Result<i64, String> {
    match *am {
      AM::Offset { base, offset } => {
        Ok(self.get_i64(base)?.wrapping_add(offset))
      }
      AM::PreIndex { base, offset } => {
        let addr = self.get_i64(base)?.wrapping_add(offset);
        self.set_reg(base, addr as u64);
        Ok(addr)
      }
      AM::PostIndex { base, offset } => {
        let addr = self.get_i64(base)?;
        self.set_reg(base, addr.wrapping_add(offset) as u64);
        Ok(addr)
      }
      AM::RegOffset { base, index } => {
        Ok(self.get_i64(base)?.wrapping_add(self.get_i64(index)?))
      }
      AM::Literal { .. } => Err("literal address in a store".to_string()),
    }
  }

  // What a call leaves behind: everything caller-saved is garbage, except
  // the result.
  fn clobber_caller_saved(&mut self, keep: Option<Reg>) {
    self.regs.retain(|r, _| !is_caller_saved(*r) || Some(*r) == keep);
  }

  fn throw(&mut self, iix: InstIx) -> Result<(), String> {
    let bix = self.func.block_of(iix).ok_or("insn outside any block")?;
    match &self.func.blocks[bix.get() as usize].eh_handler {
      Some(handler) => {
        self.nia = self.func.blocks[handler.block_ix().get() as usize].start;
        Ok(())
      }
      None => Err("uncaught exception".to_string()),
    }
  }

  // Move the interpreter one step forward
  fn step(&mut self) -> Result<bool, String> {
    if self.num_steps >= MAX_STEPS {
      return Err("too many steps".to_string());
    }
    let iix = self.nia;
    self.nia = iix.plus(1);
    self.num_steps += 1;

    let func = self.func;
    let insn = match func.insns.get(iix.get() as usize) {
      Some(insn) => insn,
      None => return Err("ran off the end of the code".to_string()),
    };
    match insn {
      Inst::Mov { dst, imm } => self.set_reg(*dst, *imm as u64),
      Inst::MovR { dst, src } => {
        let v = self.get_reg(*src)?;
        self.set_reg(*dst, v.to_bits());
      }
      Inst::FMov { dst, imm } => self.set_reg(*dst, imm.to_bits()),
      Inst::Alu { op, dst, src_left, src_right } => {
        let l = self.get_i64(*src_left)?;
        let r = self.get_ri(src_right)?;
        self.set_reg(*dst, op.calc(l, r) as u64);
      }
      Inst::Cmp { src_left, src_right } => {
        let l = self.get_i64(*src_left)?;
        let r = self.get_ri(src_right)?;
        let sign = match l.cmp(&r) {
          std::cmp::Ordering::Less => -1i64,
          std::cmp::Ordering::Equal => 0,
          std::cmp::Ordering::Greater => 1,
        };
        self.set_reg(nzcv(), sign as u64);
      }
      Inst::Fpu { op, dst, src_left, src_right } => {
        let l = self.get_reg(*src_left)?.to_f64();
        let r = self.get_reg(*src_right)?.to_f64();
        self.set_reg(*dst, op.calc(l, r).to_bits());
      }
      Inst::Ldr { dst, addr: AM::Literal { sym } } => {
        let bits = match self.func.literals.get(*sym as usize) {
          Some(v) => *v as u64,
          None => return Err(format!("no literal {}", sym)),
        };
        self.set_reg(*dst, bits);
      }
      Inst::Ldr { dst, addr } => {
        let addr = self.get_am(addr)?;
        let bits = self.load(addr)?;
        self.set_reg(*dst, bits);
      }
      Inst::Str { src, addr } => {
        let bits = self.get_reg(*src)?.to_bits();
        let addr = self.get_am(addr)?;
        self.store(addr, bits)?;
      }
      Inst::LdAdd { dst, src, base } => {
        let addr = self.get_i64(*base)?;
        let add = self.get_i64(*src)?;
        let old = self.load(addr)?;
        self.store(addr, (old as i64).wrapping_add(add) as u64)?;
        self.set_reg(*dst, old);
      }
      Inst::Adrp { dst, sym } => self.set_reg(*dst, global_addr(*sym) & !0xfff),
      Inst::AddLo12 { dst, src, sym } => {
        let base = self.get_i64(*src)?;
        let lo = (global_addr(*sym) & 0xfff) as i64;
        self.set_reg(*dst, base.wrapping_add(lo) as u64);
      }
      Inst::Clinit { sym } => {
        if !self.inited.contains(*sym) {
          self.inited.insert(*sym);
          self.stdout += &format!("init {}\n", sym);
        }
      }
      Inst::Bl { callee } => {
        match callee {
          Builtin::Print => {
            let v = self.get_i64(xr(0))?;
            self.stdout += &format!("{}\n", v);
          }
          Builtin::PrintF => {
            let v = self.get_reg(dr(0))?.to_f64();
            self.stdout += &format!("{:?}\n", v);
          }
          Builtin::Max => {
            let v = self.get_i64(xr(0))?.max(self.get_i64(xr(1))?);
            self.set_reg(xr(0), v as u64);
          }
          Builtin::Abs => {
            let v = self.get_i64(xr(0))?.wrapping_abs();
            self.set_reg(xr(0), v as u64);
          }
        }
        self.clobber_caller_saved(callee.result());
      }
      Inst::Dmb => {}
      Inst::Asm { defs, uses, clobbers, .. } => {
        let mut sum = 0i64;
        for r in uses {
          sum = sum.wrapping_add(self.get_i64(*r)?);
        }
        for r in clobbers {
          self.regs.remove(r);
        }
        for (i, r) in defs.iter().enumerate() {
          self.set_reg(*r, sum.wrapping_add(i as i64) as u64);
        }
      }
      Inst::Chk { index, bound } => {
        let index = self.get_i64(*index)?;
        let bound = self.get_ri(bound)?;
        if index < 0 || index >= bound {
          self.throw(iix)?;
        }
      }
      Inst::B { target } => {
        self.nia = self.func.blocks[target.block_ix().get() as usize].start;
      }
      Inst::BCond { cond, target_true, target_false } => {
        let flags = self.get_i64(nzcv())?;
        let target = if cond.holds(flags) { target_true } else { target_false };
        self.nia = self.func.blocks[target.block_ix().get() as usize].start;
      }
      Inst::Cbz { reg, target_zero, target_nonzero } => {
        let v = self.get_i64(*reg)?;
        let target = if v == 0 { target_zero } else { target_nonzero };
        self.nia = self.func.blocks[target.block_ix().get() as usize].start;
      }
      Inst::Ret { reg } => {
        self.ret_value = match reg {
          Some(reg) => Some(self.get_reg(*reg)?),
          None => None,
        };
        return Ok(true);
      }
      Inst::Comment { .. }
      | Inst::DebugLoc { .. }
      | Inst::Cfi { .. }
      | Inst::ClinitCompanion { .. } => {}
    }
    Ok(false)
  }
}

#[derive(Debug, PartialEq)]
pub struct RunResult {
  pub ret_value: Option<Value>,
  pub stdout: String,
  pub num_steps: u64,
}

pub fn run_func(f: &Func, who: &str) -> Result<RunResult, String> {
  println!("");
  println!("Running stage '{}': Func: name='{}'", who, f.name);

  let mut istate = IState::new(f);
  while !istate.step()? {}

  println!(
    "Running stage '{}': done.  {} insns, result {:?}",
    who, istate.num_steps, istate.ret_value
  );

  Ok(RunResult {
    ret_value: istate.ret_value,
    stdout: istate.stdout,
    num_steps: istate.num_steps,
  })
}

//=============================================================================
// Definition of Block and Func, and printing thereof.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
  pub name: String,
  pub start: InstIx,
  pub len: u32,
  /// Where a throwing instruction in this block goes.
  pub eh_handler: Option<Label>,
  pub cold: bool,
}
impl Block {
  pub fn new(name: &str, start: InstIx, len: u32) -> Self {
    Self { name: name.to_string(), start, len, eh_handler: None, cold: false }
  }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Func {
  pub name: String,
  pub num_virtual_regs: u32,
  // Note that |blocks| must be in order of increasing |Block::start|, and
  // the first block is the entry.
  pub insns: Vec<Inst>,
  pub blocks: Vec<Block>,
  pub literals: Vec<i64>,
}

impl Func {
  pub fn new(name: &str) -> Self {
    Func {
      name: name.to_string(),
      num_virtual_regs: 0,
      insns: Vec::new(),
      blocks: Vec::new(),
      literals: Vec::new(),
    }
  }

  pub fn print(&self, who: &str) {
    let mut s = String::new();
    if self.render(who, &mut s).is_ok() {
      println!("");
      print!("{}", s);
    }
  }

  /// Write the function out in the syntax the parser reads.
  pub fn render(&self, who: &str, out: &mut String) -> fmt::Result {
    use std::fmt::Write;
    writeln!(out, "; {}: name='{}'", who, self.name)?;
    if !self.literals.is_empty() {
      let lits: Vec<String> =
        self.literals.iter().map(|l| l.to_string()).collect();
      writeln!(out, "literals {}", lits.join(", "))?;
    }
    for b in self.blocks.iter() {
      write!(out, "{}", b.name)?;
      if b.cold {
        write!(out, " cold")?;
      }
      if let Some(handler) = &b.eh_handler {
        write!(out, " eh {}", handler.name())?;
      }
      writeln!(out, ":")?;
      for i in b.start.get()..b.start.get() + b.len {
        writeln!(out, "    {:?}", self.insns[i as usize])?;
      }
    }
    Ok(())
  }

  // Get a new virtual register
  pub fn new_virtual_reg(&mut self, rc: RegClass) -> Reg {
    let v = Reg::new_virtual(rc, self.num_virtual_regs);
    self.num_virtual_regs += 1;
    v
  }

  // Add a block to the Func
  pub fn block(&mut self, name: &str, insns: Vec<Inst>) -> BlockIx {
    let start = self.insns.len() as u32;
    let len = insns.len() as u32;
    self.insns.extend(insns);
    self.blocks.push(Block::new(name, InstIx::new(start), len));
    BlockIx::new(self.blocks.len() as u32 - 1)
  }

  pub fn set_cold(&mut self, bix: BlockIx) {
    self.blocks[bix.get() as usize].cold = true;
  }

  pub fn set_eh_handler(&mut self, bix: BlockIx, handler: &str) {
    self.blocks[bix.get() as usize].eh_handler =
      Some(Label::new_unresolved(handler));
  }

  pub fn block_of(&self, iix: InstIx) -> Option<BlockIx> {
    self
      .blocks
      .iter()
      .position(|b| iix >= b.start && iix.get() < b.start.get() + b.len)
      .map(|n| BlockIx::new(n as u32))
  }

  // The last real instruction of a block.
  pub fn terminator(&self, bix: BlockIx) -> Option<&Inst> {
    let b = &self.blocks[bix.get() as usize];
    self.insns[b.start.get() as usize..(b.start.get() + b.len) as usize]
      .iter()
      .rev()
      .find(|i| !i.is_pseudo())
  }

  // All blocks have been added.  Resolve labels, count the virtual
  // registers and check the block structure:
  //    - every block has a real instruction
  //    - the last real instruction of a block is a control flow insn
  //    - no control flow insn before that
  pub fn finish(&mut self) -> Result<(), String> {
    if self.blocks.is_empty() {
      return Err("Func: no blocks".to_string());
    }
    for b in self.blocks.iter() {
      let (from, to) = (b.start.get() as usize, (b.start.get() + b.len) as usize);
      let reals: Vec<&Inst> =
        self.insns[from..to].iter().filter(|i| !i.is_pseudo()).collect();
      match reals.split_last() {
        None => return Err(format!("Func: block {} is empty", b.name)),
        Some((last, rest)) => {
          if !last.is_control_flow() {
            return Err(format!(
              "Func: block {} must end in a control flow insn",
              b.name
            ));
          }
          if rest.iter().any(|i| i.is_control_flow()) {
            return Err(format!(
              "Func: block {} contains control flow insn not at end",
              b.name
            ));
          }
        }
      }
    }

    let blocks = self.blocks.clone();
    for insn in self.insns.iter_mut() {
      for label in insn.labels_mut() {
        if let Label::Unresolved { .. } = label {
          label.resolve(&blocks)?;
        }
      }
    }
    for b in self.blocks.iter_mut() {
      if let Some(handler) = b.eh_handler.as_mut() {
        handler.resolve(&blocks)?;
      }
    }

    let mut num_vregs = self.num_virtual_regs;
    for insn in self.insns.iter() {
      let (defs, uses) = insn.get_reg_usage();
      for r in defs.iter().chain(uses.iter()) {
        if r.is_virtual() {
          num_vregs = num_vregs.max(r.get_index() as u32 + 1);
        }
      }
    }
    self.num_virtual_regs = num_vregs;
    Ok(())
  }

  pub fn update_from_schedule(&mut self, result: ScheduleResult<Func>) {
    self.insns = result.insns;
    let num_blocks = self.blocks.len();
    for i in 0..num_blocks {
      let start = result.target_map[BlockIx::new(i as u32)];
      let end = if i + 1 < num_blocks {
        result.target_map[BlockIx::new(i as u32 + 1)].get()
      } else {
        self.insns.len() as u32
      };
      let block = &mut self.blocks[i];
      block.start = start;
      block.len = end - start.get();
    }
  }
}

// --------------------------------------------------
// Implementation of `Function` trait for test cases.

impl Function for Func {
  type Inst = Inst;

  fn insns(&self) -> &[Inst] {
    &self.insns
  }

  fn get_insn(&self, iix: InstIx) -> &Inst {
    &self.insns[iix.get() as usize]
  }

  fn entry_block(&self) -> BlockIx {
    BlockIx::new(0)
  }

  fn blocks(&self) -> Range<BlockIx> {
    Range::new(BlockIx::new(0), self.blocks.len())
  }

  /// Provide the range of instruction indices contained in each block.
  fn block_insns(&self, block: BlockIx) -> Range<InstIx> {
    let b = &self.blocks[block.get() as usize];
    Range::new(b.start, b.len as usize)
  }

  /// Get CFG successors, in branch order.
  fn block_succs(&self, block: BlockIx) -> SmallVec<[BlockIx; 2]> {
    match self.terminator(block) {
      Some(insn) => insn.targets().into_iter().collect(),
      None => SmallVec::new(),
    }
  }

  fn block_eh_succs(&self, block: BlockIx) -> SmallVec<[BlockIx; 1]> {
    match &self.blocks[block.get() as usize].eh_handler {
      Some(handler) => {
        let mut succs = SmallVec::new();
        succs.push(handler.block_ix());
        succs
      }
      None => SmallVec::new(),
    }
  }

  fn is_cold_block(&self, block: BlockIx) -> bool {
    self.blocks[block.get() as usize].cold
  }

  /// Provide the defined and used registers for an instruction.
  fn get_regs(&self, insn: &Self::Inst) -> InstRegUses {
    let (d, u) = insn.get_reg_usage();
    InstRegUses { used: u.into_iter().collect(), defined: d.into_iter().collect() }
  }

  fn insn_desc(&self, insn: &Self::Inst) -> InsnDesc {
    insn.desc()
  }
}
