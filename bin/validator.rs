/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

use crate::test_framework::*;
use insnsched::{InstIx, Map, Reg, RegClass};

pub struct Context {
  pub num_vregs: usize,
  pub num_blocks: usize,
  pub num_literals: usize,
  vreg_types: Map<usize, RegClass>,
}

impl Context {
  fn new(func: &Func) -> Self {
    Self {
      num_vregs: func.num_virtual_regs as usize,
      num_blocks: func.blocks.len(),
      num_literals: func.literals.len(),
      vreg_types: Map::default(),
    }
  }

  pub fn check_reg(&mut self, reg: Reg) -> bool {
    if reg.is_virtual() {
      // A virtual register keeps one class, and must be in range.
      let index = reg.get_index();
      if let Some(prev_rc) = self.vreg_types.insert(index, reg.get_class()) {
        if prev_rc != reg.get_class() {
          return false;
        }
      }
      index < self.num_vregs
    } else {
      match reg.get_class() {
        RegClass::I64 => reg.get_index() <= SP_INDEX as usize,
        RegClass::F64 => reg.get_index() < 32,
        RegClass::Flags => reg.get_index() == 0,
      }
    }
  }

  fn check_class(&mut self, reg: Reg, rc: RegClass) -> bool {
    reg.get_class() == rc && self.check_reg(reg)
  }

  fn check_ri(&mut self, ri: &RI) -> bool {
    match ri {
      RI::Reg { reg } => self.check_class(*reg, RegClass::I64),
      RI::Imm { .. } => true,
    }
  }

  fn check_am(&mut self, am: &AM, is_store: bool) -> bool {
    match *am {
      AM::Offset { base, .. } => self.check_class(base, RegClass::I64),
      AM::PreIndex { base, .. } | AM::PostIndex { base, .. } => {
        self.check_class(base, RegClass::I64)
      }
      AM::RegOffset { base, index } => {
        self.check_class(base, RegClass::I64)
          && self.check_class(index, RegClass::I64)
      }
      AM::Literal { sym } => !is_store && (sym as usize) < self.num_literals,
    }
  }

  fn check_label(&self, label: &Label) -> bool {
    match label {
      Label::Resolved { bix, .. } => (bix.get() as usize) < self.num_blocks,
      Label::Unresolved { .. } => false,
    }
  }

  fn type_checks(&mut self, inst: &Inst) -> bool {
    use RegClass::*;
    match inst {
      Inst::Mov { dst, .. } => self.check_class(*dst, I64),
      Inst::MovR { dst, src } => {
        dst.get_class() == src.get_class()
          && dst.get_class() != Flags
          && self.check_reg(*dst)
          && self.check_reg(*src)
      }
      Inst::FMov { dst, .. } => self.check_class(*dst, F64),
      Inst::Alu { dst, src_left, src_right, .. } => {
        self.check_class(*dst, I64)
          && self.check_class(*src_left, I64)
          && self.check_ri(src_right)
      }
      Inst::Cmp { src_left, src_right } => {
        self.check_class(*src_left, I64) && self.check_ri(src_right)
      }
      Inst::Fpu { dst, src_left, src_right, .. } => {
        self.check_class(*dst, F64)
          && self.check_class(*src_left, F64)
          && self.check_class(*src_right, F64)
      }
      // The written back base can't also be the loaded or stored value.
      Inst::Ldr { dst, addr } => {
        dst.get_class() != Flags
          && self.check_reg(*dst)
          && self.check_am(addr, false)
          && addr.writeback_reg() != Some(*dst)
      }
      Inst::Str { src, addr } => {
        src.get_class() != Flags
          && self.check_reg(*src)
          && self.check_am(addr, true)
          && addr.writeback_reg() != Some(*src)
      }
      Inst::LdAdd { dst, src, base } => {
        self.check_class(*dst, I64)
          && self.check_class(*src, I64)
          && self.check_class(*base, I64)
          && dst != base
      }
      Inst::Adrp { dst, sym } => {
        self.check_class(*dst, I64) && *sym < NUM_GLOBALS
      }
      Inst::AddLo12 { dst, src, sym } => {
        self.check_class(*dst, I64)
          && self.check_class(*src, I64)
          && *sym < NUM_GLOBALS
      }
      Inst::Clinit { .. } | Inst::ClinitCompanion { .. } => true,
      Inst::Bl { .. } | Inst::Dmb => true,
      Inst::Asm { defs, uses, clobbers, .. } => {
        let all_ok = defs
          .iter()
          .chain(uses.iter())
          .chain(clobbers.iter())
          .all(|r| (r.is_real() || r.get_class() != Flags) && self.check_reg(*r));
        all_ok && !defs.iter().chain(clobbers.iter()).any(|r| *r == sp())
      }
      Inst::Chk { index, bound } => {
        self.check_class(*index, I64) && self.check_ri(bound)
      }
      Inst::B { target } => self.check_label(target),
      Inst::BCond { target_true, target_false, .. } => {
        self.check_label(target_true) && self.check_label(target_false)
      }
      Inst::Cbz { reg, target_zero, target_nonzero } => {
        self.check_class(*reg, I64)
          && self.check_label(target_zero)
          && self.check_label(target_nonzero)
      }
      Inst::Ret { reg } => match reg {
        Some(reg) => reg.get_class() != Flags && self.check_reg(*reg),
        None => true,
      },
      Inst::Comment { .. } | Inst::DebugLoc { .. } | Inst::Cfi { .. } => true,
    }
  }
}

pub fn validate(func: &Func) -> Result<(), String> {
  let mut cx = Context::new(func);

  if func.blocks.is_empty() {
    return Err("no blocks".into());
  }

  // Blocks must be contiguous, in increasing start order, and cover all of
  // the instructions.
  let mut next = 0u32;
  for b in func.blocks.iter() {
    if b.start.get() != next {
      return Err(format!("block {} is incorrectly specified", b.name));
    }
    next = match next.checked_add(b.len) {
      Some(n) => n,
      None => return Err(format!("too many instructions in block {}", b.name)),
    };
  }
  if next as usize != func.insns.len() {
    return Err("unused instructions".into());
  }

  for b in func.blocks.iter() {
    if let Some(handler) = &b.eh_handler {
      if !cx.check_label(handler) {
        return Err(format!("invalid handler for block {}", b.name));
      }
    }

    // Pseudo instructions may sit anywhere, but the last real instruction
    // must be the only control flow one.
    let mut last_real: Option<InstIx> = None;
    for i in b.start.get()..b.start.get() + b.len {
      let inst = &func.insns[i as usize];
      if !cx.type_checks(inst) {
        return Err(format!(
          "inst {:?} in block {} does not type check",
          inst, b.name
        ));
      }
      if inst.is_pseudo() {
        continue;
      }
      if let Some(prev) = last_real {
        if func.insns[prev.get() as usize].is_control_flow() {
          return Err(format!(
            "control flow inst in the middle of block {}",
            b.name
          ));
        }
      }
      last_real = Some(InstIx::new(i));
    }
    match last_real {
      None => return Err(format!("block {} is empty", b.name)),
      Some(iix) if !func.insns[iix.get() as usize].is_control_flow() => {
        return Err(format!(
          "final inst of block {} must be a control flow inst",
          b.name
        ));
      }
      Some(_) => {}
    }
  }

  Ok(())
}

/// Compare the runs of a function before and after scheduling.  If the
/// first run failed, the second must fail too; which error it hits may
/// differ, since independent failing instructions may have been reordered.
pub fn check_results(
  before: &Result<RunResult, String>, after: &Result<RunResult, String>,
) {
  match (before, after) {
    (Ok(before), Ok(after)) => {
      assert_eq!(
        before.ret_value, after.ret_value,
        "Incorrect interpreter result: expected {:?}, observed {:?}",
        before.ret_value, after.ret_value
      );
      assert_eq!(
        before.stdout, after.stdout,
        r#"Different stdout values before/after scheduling:
- before:
{}
- after:
{}
        "#,
        before.stdout, after.stdout
      );
    }
    (Ok(_), Err(err)) => {
      panic!("code after scheduling should have succeeded: {}", err)
    }
    (Err(_), Ok(after)) => panic!(
      "code after scheduling should have failed, returned {:?}",
      after.ret_value
    ),
    (Err(_), Err(_)) => {}
  }
}
