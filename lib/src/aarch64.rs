/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! AArch64 memory and calling-convention rules.

use crate::data_structures::{Reg, RegClass};
use crate::interface::{AddrMode, MemAccess, MemOperand, MemoryModel};

pub const FP_INDEX: u8 = 29;
pub const LR_INDEX: u8 = 30;
pub const SP_INDEX: u8 = 31;

pub fn xreg(n: u8) -> Reg {
  Reg::new_real(RegClass::I64, n)
}

pub fn dreg(n: u8) -> Reg {
  Reg::new_real(RegClass::F64, n)
}

pub fn nzcv() -> Reg {
  Reg::new_real(RegClass::Flags, 0)
}

pub fn sp() -> Reg {
  xreg(SP_INDEX)
}

pub fn fp() -> Reg {
  xreg(FP_INDEX)
}

/// Is `value` encodable as the signed, scaled 7-bit offset of an LDP / STP
/// of `size`-byte registers?
pub fn simm7_scaled_ok(value: i64, size: u32) -> bool {
  if !(size == 4 || size == 8 || size == 16) {
    return false;
  }
  let scale = size as i64;
  let upper_limit = 63 * scale;
  let lower_limit = -(64 * scale);
  value >= lower_limit && value <= upper_limit && (value & (scale - 1)) == 0
}

pub struct AArch64MemoryModel {
  caller_saved: Vec<Reg>,
}

impl AArch64MemoryModel {
  pub fn new() -> Self {
    // AAPCS64: x0-x17 (arguments, results, scratch and the IP registers)
    // and the link register; v0-v7 and v16-v31; and the flags.
    let mut caller_saved = Vec::new();
    for n in 0..=17 {
      caller_saved.push(xreg(n));
    }
    caller_saved.push(xreg(LR_INDEX));
    for n in (0..=7).chain(16..=31) {
      caller_saved.push(dreg(n));
    }
    caller_saved.push(nzcv());
    Self { caller_saved }
  }
}

impl Default for AArch64MemoryModel {
  fn default() -> Self {
    Self::new()
  }
}

// The byte range an access touches, relative to its base register value
// before the instruction.
fn base_relative_range(acc: &MemAccess) -> (i64, i64) {
  let start = match acc.op.mode {
    AddrMode::PostIndex => 0,
    _ => acc.op.offset,
  };
  (start, start + acc.op.size as i64)
}

fn ranges_overlap(a: (i64, i64), b: (i64, i64)) -> bool {
  a.0 < b.1 && b.0 < a.1
}

fn same_base(a: &MemAccess, b: &MemAccess) -> bool {
  a.op.base.is_some() && a.op.base == b.op.base && a.base_def == b.base_def
}

impl MemoryModel for AArch64MemoryModel {
  fn may_overlap(&self, a: &MemAccess, b: &MemAccess) -> bool {
    match (a.op.mode, b.op.mode) {
      (AddrMode::Unresolved, _) | (_, AddrMode::Unresolved) => {
        panic!("may_overlap: unresolved memory operand")
      }
      (AddrMode::Literal, AddrMode::Literal) => {
        a.op.symbol == b.op.symbol
          && ranges_overlap(
            (a.op.offset, a.op.offset + a.op.size as i64),
            (b.op.offset, b.op.offset + b.op.size as i64),
          )
      }
      (AddrMode::Literal, _) | (_, AddrMode::Literal) => true,
      (AddrMode::RegOffset, AddrMode::RegOffset) => {
        // Only provably the same address if base and index are the same
        // values; then compare the ranges.
        if same_base(a, b)
          && a.op.index == b.op.index
          && a.index_def == b.index_def
        {
          ranges_overlap(base_relative_range(a), base_relative_range(b))
        } else {
          true
        }
      }
      (AddrMode::RegOffset, _) | (_, AddrMode::RegOffset) => true,
      _ => {
        if same_base(a, b) {
          ranges_overlap(base_relative_range(a), base_relative_range(b))
        } else {
          true
        }
      }
    }
  }

  fn is_combinable_pair(&self, first: &MemAccess, second: &MemAccess) -> bool {
    let (f, s) = (first.op, second.op);
    if f.mode != AddrMode::BaseOffset || s.mode != AddrMode::BaseOffset {
      return false;
    }
    if f.access != s.access || f.size != s.size || f.region != s.region {
      return false;
    }
    if f.symbol.is_some() || s.symbol.is_some() {
      return false;
    }
    if !same_base(first, second) {
      return false;
    }
    let size = f.size as i64;
    let lo = if s.offset - f.offset == size {
      f.offset
    } else if f.offset - s.offset == size {
      s.offset
    } else {
      return false;
    };
    if !simm7_scaled_ok(lo, f.size) {
      return false;
    }
    match (first.data, second.data) {
      (Some(d1), Some(d2)) => {
        if d1.get_class() != d2.get_class() {
          return false;
        }
        if f.is_load() {
          // LDP with the same destination twice, or writing its own base,
          // is unpredictable.
          d1 != d2 && Some(d1) != f.base && Some(d2) != f.base
        } else {
          true
        }
      }
      _ => false,
    }
  }

  fn caller_saved_regs(&self) -> &[Reg] {
    &self.caller_saved
  }

  fn is_frame_reg(&self, reg: Reg) -> bool {
    reg.is_real()
      && reg.get_class() == RegClass::I64
      && (reg.get_index() == SP_INDEX as usize
        || reg.get_index() == FP_INDEX as usize)
  }

  fn is_stack_arg_setup(&self, op: &MemOperand) -> bool {
    op.is_store() && !op.callee_save && op.base == Some(sp()) && op.offset >= 0
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::data_structures::NodeIx;
  use crate::interface::{MemAccessKind, MemRegion};

  fn mem(
    mode: AddrMode, base: Reg, offset: i64, size: u32, access: MemAccessKind,
  ) -> MemOperand {
    MemOperand {
      mode,
      base: Some(base),
      index: None,
      offset,
      size,
      symbol: None,
      region: MemRegion::Heap,
      access,
      independent: false,
      callee_save: false,
    }
  }

  fn acc<'a>(op: &'a MemOperand, base_def: Option<u32>, data: Reg) -> MemAccess<'a> {
    MemAccess {
      op,
      base_def: base_def.map(NodeIx::new),
      index_def: None,
      data: Some(data),
    }
  }

  #[test]
  fn overlap_same_base() {
    let mm = AArch64MemoryModel::new();
    let a = mem(AddrMode::BaseOffset, xreg(1), 0, 8, MemAccessKind::Write);
    let b = mem(AddrMode::BaseOffset, xreg(1), 8, 8, MemAccessKind::Read);
    let c = mem(AddrMode::BaseOffset, xreg(1), 4, 8, MemAccessKind::Read);
    assert!(!mm.may_overlap(&acc(&a, None, xreg(2)), &acc(&b, None, xreg(3))));
    assert!(mm.may_overlap(&acc(&a, None, xreg(2)), &acc(&c, None, xreg(3))));
    // The base was redefined in between: no longer comparable.
    assert!(mm.may_overlap(&acc(&a, None, xreg(2)), &acc(&b, Some(4), xreg(3))));
  }

  #[test]
  fn overlap_post_index_uses_old_base() {
    let mm = AArch64MemoryModel::new();
    let a = mem(AddrMode::PostIndex, xreg(1), 16, 8, MemAccessKind::Write);
    let b = mem(AddrMode::BaseOffset, xreg(1), 0, 8, MemAccessKind::Read);
    let c = mem(AddrMode::BaseOffset, xreg(1), 16, 8, MemAccessKind::Read);
    assert!(mm.may_overlap(&acc(&a, None, xreg(2)), &acc(&b, None, xreg(3))));
    assert!(!mm.may_overlap(&acc(&a, None, xreg(2)), &acc(&c, None, xreg(3))));
  }

  #[test]
  fn overlap_different_bases_is_conservative() {
    let mm = AArch64MemoryModel::new();
    let a = mem(AddrMode::BaseOffset, xreg(1), 0, 8, MemAccessKind::Write);
    let b = mem(AddrMode::BaseOffset, xreg(2), 64, 8, MemAccessKind::Read);
    assert!(mm.may_overlap(&acc(&a, None, xreg(3)), &acc(&b, None, xreg(4))));
  }

  #[test]
  fn pairs() {
    let mm = AArch64MemoryModel::new();
    let a = mem(AddrMode::BaseOffset, xreg(1), 8, 8, MemAccessKind::Read);
    let b = mem(AddrMode::BaseOffset, xreg(1), 16, 8, MemAccessKind::Read);
    let far = mem(AddrMode::BaseOffset, xreg(1), 24, 8, MemAccessKind::Read);
    let st = mem(AddrMode::BaseOffset, xreg(1), 16, 8, MemAccessKind::Write);
    assert!(mm.is_combinable_pair(&acc(&a, None, xreg(2)), &acc(&b, None, xreg(3))));
    assert!(mm.is_combinable_pair(&acc(&b, None, xreg(2)), &acc(&a, None, xreg(3))));
    assert!(!mm.is_combinable_pair(&acc(&a, None, xreg(2)), &acc(&far, None, xreg(3))));
    assert!(!mm.is_combinable_pair(&acc(&a, None, xreg(2)), &acc(&st, None, xreg(3))));
    // Same destination twice, or the base as a destination.
    assert!(!mm.is_combinable_pair(&acc(&a, None, xreg(2)), &acc(&b, None, xreg(2))));
    assert!(!mm.is_combinable_pair(&acc(&a, None, xreg(1)), &acc(&b, None, xreg(3))));
    // Out of the scaled imm7 range.
    let hi1 = mem(AddrMode::BaseOffset, xreg(1), 512, 8, MemAccessKind::Read);
    let hi2 = mem(AddrMode::BaseOffset, xreg(1), 520, 8, MemAccessKind::Read);
    assert!(!mm.is_combinable_pair(&acc(&hi1, None, xreg(2)), &acc(&hi2, None, xreg(3))));
    assert!(simm7_scaled_ok(504, 8));
    assert!(!simm7_scaled_ok(512, 8));
  }

  #[test]
  fn abi_regs() {
    let mm = AArch64MemoryModel::new();
    assert!(mm.is_caller_saved(xreg(0)));
    assert!(mm.is_caller_saved(xreg(30)));
    assert!(!mm.is_caller_saved(xreg(19)));
    assert!(!mm.is_caller_saved(dreg(8)));
    assert!(mm.is_caller_saved(nzcv()));
    assert!(mm.is_frame_reg(sp()));
    assert!(mm.is_frame_reg(fp()));
    assert!(!mm.is_frame_reg(xreg(1)));
  }
}
