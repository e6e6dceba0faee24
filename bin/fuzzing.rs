/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Implements fuzzing primitives for everything.
//!
//! Generated functions only branch forwards, so they always terminate.  They
//! keep to the memory discipline the scheduler relies on: stack accesses go
//! through sp or fp, heap accesses through registers holding the address of
//! a global, and the two never mix.  Reads of registers that are not
//! defined on every path are allowed; such a function fails at run time,
//! before and after scheduling alike.

use arbitrary::{Arbitrary, Result, Unstructured};

use crate::test_framework::{self as ir, *};
use insnsched::{BlockIx, InstIx, Map, Reg, RegClass, NUM_REG_CLASSES};

/// Virtual registers 0 .. NUM_BASE_REGS only ever hold global addresses.
const NUM_BASE_REGS: u32 = 4;
const MAX_BLOCKS: u8 = 16;
const MAX_BLOCK_INSNS: u8 = 48;

struct FuzzingEnv {
  num_blocks: u32,
  cur_block: u32,
  num_virtual_regs: u32,
  num_literals: u32,
  /// Class of each virtual register defined so far.
  vregs: Map<u32, RegClass>,
  /// Registers defined so far, by class.
  regs_by_rc: Vec<Vec<Reg>>,
  /// Base registers holding a global's address.
  bases: Vec<Reg>,
}

impl FuzzingEnv {
  fn new(num_blocks: u32, num_virtual_regs: u32, num_literals: u32) -> Self {
    Self {
      num_blocks,
      cur_block: 0,
      num_virtual_regs,
      num_literals,
      vregs: Map::default(),
      regs_by_rc: vec![Vec::new(); NUM_REG_CLASSES],
      bases: Vec::new(),
    }
  }

  // A block after the current one.
  fn label(&self, u: &mut Unstructured) -> Result<Label> {
    let first = self.cur_block + 1;
    debug_assert!(first < self.num_blocks);
    let bix = first + u32::arbitrary(u)? % (self.num_blocks - first);
    Ok(Label::Resolved { name: format!("b{}", bix), bix: BlockIx::new(bix) })
  }

  fn has_reg_with_rc(&self, rc: RegClass) -> bool {
    !self.regs_by_rc[rc.rc_to_usize()].is_empty()
  }

  fn note_def(&mut self, reg: Reg) {
    let regs = &mut self.regs_by_rc[reg.get_class().rc_to_usize()];
    if !regs.contains(&reg) {
      regs.push(reg);
    }
  }

  fn def_reg(&mut self, rc: RegClass, u: &mut Unstructured) -> Result<Reg> {
    let reg = loop {
      if rc == RegClass::Flags {
        break nzcv();
      }
      if bool::arbitrary(u)? {
        let span = self.num_virtual_regs - NUM_BASE_REGS;
        let index = NUM_BASE_REGS + u32::arbitrary(u)? % span;
        match self.vregs.get(&index) {
          Some(prev) if *prev != rc => continue,
          _ => {}
        }
        self.vregs.insert(index, rc);
        break Reg::new_virtual(rc, index);
      }
      // Real registers, avoiding fp, lr and sp.
      let n = u8::arbitrary(u)? % 29;
      if n == 18 {
        continue;
      }
      break match rc {
        RegClass::I64 => xr(n),
        _ => dr(n % 32),
      };
    };
    self.note_def(reg);
    Ok(reg)
  }

  fn get_reg(&self, rc: RegClass, u: &mut Unstructured) -> Result<Reg> {
    debug_assert!(self.has_reg_with_rc(rc));
    let regs = &self.regs_by_rc[rc.rc_to_usize()];
    Ok(regs[usize::arbitrary(u)? % regs.len()])
  }

  fn get_ri(&self, u: &mut Unstructured) -> Result<RI> {
    Ok(if self.has_reg_with_rc(RegClass::I64) && bool::arbitrary(u)? {
      RI::Reg { reg: self.get_reg(RegClass::I64, u)? }
    } else {
      RI::Imm { imm: i8::arbitrary(u)? as i64 }
    })
  }

  fn value_rc(&self, u: &mut Unstructured) -> Result<RegClass> {
    Ok(if bool::arbitrary(u)? { RegClass::I64 } else { RegClass::F64 })
  }

  fn stack_am(&self, u: &mut Unstructured) -> Result<AM> {
    let base = if bool::arbitrary(u)? { sp() } else { fp() };
    Ok(AM_RI(base, -8 * (1 + (u8::arbitrary(u)? % 32) as i64)))
  }

  // An access to a global, maybe through an index register set up just
  // before it.
  fn heap_am(&mut self, u: &mut Unstructured, prefix: &mut Vec<Inst>) -> Result<AM> {
    let base = self.bases[usize::arbitrary(u)? % self.bases.len()];
    let offset = 8 * (u8::arbitrary(u)? % 64) as i64;
    if bool::arbitrary(u)? {
      Ok(AM_RI(base, offset))
    } else {
      let index = self.def_reg(RegClass::I64, u)?;
      prefix.push(i_mov(index, offset));
      Ok(AM_RR(base, index))
    }
  }

  // Calls clobber everything caller-saved.
  fn after_call(&mut self, result: Option<Reg>) {
    for regs in self.regs_by_rc.iter_mut() {
      regs.retain(|r| !is_caller_saved(*r) || Some(*r) == result);
    }
  }

  // A short sequence of non-control-flow instructions.
  fn insts(&mut self, u: &mut Unstructured) -> Result<Vec<Inst>> {
    use RegClass::*;

    const NUM_VARIANTS: u8 = 20;

    let mut out = Vec::new();
    loop {
      match u8::arbitrary(u)? % NUM_VARIANTS {
        0 => out.push(i_mov(self.def_reg(I64, u)?, i16::arbitrary(u)? as i64)),
        1 => out.push(Inst::FMov { dst: self.def_reg(F64, u)?, imm: f64::arbitrary(u)? }),
        2 => {
          let rc = self.value_rc(u)?;
          if !self.has_reg_with_rc(rc) {
            continue;
          }
          let src = self.get_reg(rc, u)?;
          out.push(i_movr(self.def_reg(rc, u)?, src));
        }
        3 => {
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          let op = ir::BinOp::arbitrary(u)?;
          let src_left = self.get_reg(I64, u)?;
          let src_right = self.get_ri(u)?;
          out.push(Inst::Alu { op, dst: self.def_reg(I64, u)?, src_left, src_right });
        }
        4 => {
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          let src_left = self.get_reg(I64, u)?;
          let src_right = self.get_ri(u)?;
          self.def_reg(Flags, u)?;
          out.push(i_cmp(src_left, src_right));
        }
        5 => {
          if !self.has_reg_with_rc(F64) {
            continue;
          }
          let op = ir::FpOp::arbitrary(u)?;
          let src_left = self.get_reg(F64, u)?;
          let src_right = self.get_reg(F64, u)?;
          out.push(i_fpu(op, self.def_reg(F64, u)?, src_left, src_right));
        }
        6 => {
          let rc = self.value_rc(u)?;
          let addr = self.stack_am(u)?;
          out.push(i_ldr(self.def_reg(rc, u)?, addr));
        }
        7 => {
          let rc = self.value_rc(u)?;
          if !self.has_reg_with_rc(rc) {
            continue;
          }
          let src = self.get_reg(rc, u)?;
          out.push(i_str(src, self.stack_am(u)?));
        }
        8 => {
          if self.bases.is_empty() {
            continue;
          }
          let rc = self.value_rc(u)?;
          let addr = self.heap_am(u, &mut out)?;
          out.push(i_ldr(self.def_reg(rc, u)?, addr));
        }
        9 => {
          let rc = self.value_rc(u)?;
          if self.bases.is_empty() || !self.has_reg_with_rc(rc) {
            continue;
          }
          let src = self.get_reg(rc, u)?;
          let addr = self.heap_am(u, &mut out)?;
          out.push(i_str(src, addr));
        }
        10 => {
          // Point a base register at a global.
          let base = Reg::new_virtual(I64, u32::arbitrary(u)? % NUM_BASE_REGS);
          let sym = u32::arbitrary(u)? % NUM_GLOBALS;
          out.push(i_adrp(base, sym));
          out.push(i_addlo12(base, base, sym));
          if !self.bases.contains(&base) {
            self.bases.push(base);
          }
        }
        11 => {
          if self.num_literals == 0 {
            continue;
          }
          let rc = self.value_rc(u)?;
          let sym = u32::arbitrary(u)? % self.num_literals;
          out.push(i_ldr(self.def_reg(rc, u)?, AM_LIT(sym)));
        }
        12 => {
          if self.bases.is_empty() || !self.has_reg_with_rc(I64) {
            continue;
          }
          let base = self.bases[usize::arbitrary(u)? % self.bases.len()];
          let src = self.get_reg(I64, u)?;
          out.push(i_ldadd(self.def_reg(I64, u)?, src, base));
        }
        13 => {
          let sym = u32::arbitrary(u)? % NUM_GLOBALS;
          out.push(i_clinit(sym));
          if bool::arbitrary(u)? {
            out.push(i_clinit_companion(sym));
          }
          self.after_call(None);
        }
        14 => {
          let callee = ir::Builtin::arbitrary(u)?;
          let args = callee.args();
          for arg in args.iter() {
            if !self.has_reg_with_rc(arg.get_class()) {
              return Ok(out);
            }
          }
          for arg in args.iter() {
            let src = self.get_reg(arg.get_class(), u)?;
            if src != *arg {
              out.push(i_movr(*arg, src));
            }
          }
          out.push(i_bl(callee));
          self.after_call(callee.result());
          if let Some(result) = callee.result() {
            self.note_def(result);
            out.push(i_movr(self.def_reg(I64, u)?, result));
          }
        }
        15 => out.push(i_dmb()),
        16 => {
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          let uses = vec![self.get_reg(I64, u)?];
          let defs = vec![self.def_reg(I64, u)?];
          let clobbers = if bool::arbitrary(u)? { vec![xr(9)] } else { vec![] };
          for regs in self.regs_by_rc.iter_mut() {
            regs.retain(|r| !clobbers.contains(r) || defs.contains(r));
          }
          out.push(i_asm("op", &defs, &uses, &clobbers, bool::arbitrary(u)?));
        }
        17 => {
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          let index = self.get_reg(I64, u)?;
          out.push(i_chk(index, self.get_ri(u)?));
        }
        18 => out.push(match u8::arbitrary(u)? % 3 {
          0 => i_comment("c"),
          1 => i_debug(u16::arbitrary(u)? as u32),
          _ => i_cfi("adjust"),
        }),
        19 => {
          // Push and pop through sp.
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          let src = self.get_reg(I64, u)?;
          out.push(i_str(src, AM_PRE(sp(), -16)));
          out.push(i_ldr(self.def_reg(I64, u)?, AM_POST(sp(), 16)));
        }
        x => {
          debug_assert!(x < NUM_VARIANTS, "update NUM_VARIANTS above");
          unreachable!()
        }
      }
      return Ok(out);
    }
  }

  fn inst_control_flow(&mut self, u: &mut Unstructured) -> Result<Inst> {
    use RegClass::*;
    let is_last = self.cur_block + 1 == self.num_blocks;
    loop {
      let choice = if is_last { 3 } else { u8::arbitrary(u)? % 4 };
      return Ok(match choice {
        0 => {
          if !self.has_reg_with_rc(Flags) {
            continue;
          }
          Inst::BCond {
            cond: ir::Cond::arbitrary(u)?,
            target_true: self.label(u)?,
            target_false: self.label(u)?,
          }
        }
        1 => {
          if !self.has_reg_with_rc(I64) {
            continue;
          }
          Inst::Cbz {
            reg: self.get_reg(I64, u)?,
            target_zero: self.label(u)?,
            target_nonzero: self.label(u)?,
          }
        }
        2 => Inst::B { target: self.label(u)? },
        _ => {
          let rc = self.value_rc(u)?;
          let reg = if self.has_reg_with_rc(rc) && bool::arbitrary(u)? {
            Some(self.get_reg(rc, u)?)
          } else {
            None
          };
          Inst::Ret { reg }
        }
      });
    }
  }
}

impl<'a> Arbitrary<'a> for Func {
  fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Func> {
    let num_virtual_regs = NUM_BASE_REGS + 1 + u32::arbitrary(u)? % 64;
    let num_blocks = 1 + (u8::arbitrary(u)? % MAX_BLOCKS) as u32;
    let mut literals = Vec::new();
    for _ in 0..u8::arbitrary(u)? % 4 {
      literals.push(i64::arbitrary(u)?);
    }

    let mut env =
      FuzzingEnv::new(num_blocks, num_virtual_regs, literals.len() as u32);

    let mut insns = Vec::new();
    let mut blocks = Vec::new();

    while env.cur_block < num_blocks {
      let start = insns.len() as u32;
      let num_block_insts = 1 + u8::arbitrary(u)? % MAX_BLOCK_INSNS;
      for _ in 1..num_block_insts {
        insns.extend(env.insts(u)?);
      }
      insns.push(env.inst_control_flow(u)?);

      let mut block = Block::new(
        &format!("b{}", env.cur_block),
        InstIx::new(start),
        insns.len() as u32 - start,
      );
      block.cold = u8::arbitrary(u)? % 8 == 0;
      if env.cur_block + 1 < num_blocks && bool::arbitrary(u)? {
        block.eh_handler = Some(env.label(u)?);
      }
      blocks.push(block);
      env.cur_block += 1;
    }

    Ok(Func {
      name: "funk".to_string(),
      num_virtual_regs,
      insns,
      blocks,
      literals,
    })
  }
}
