/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! A tiny Function implementation for the library's unit tests.  The real
//! test ISA, with an interpreter, lives in the minisched crate.

use smallvec::SmallVec;
use std::fmt;

use crate::aarch64::sp;
use crate::data_structures::{BlockIx, InstIx, Range, Reg, RegClass, Set};
use crate::interface::{
  AddrMode, Function, InsnDesc, InsnProps, InstRegUses, MemAccessKind,
  MemOperand, MemRegion, OpClass, PseudoKind,
};

pub fn x(n: u8) -> Reg {
  Reg::new_real(RegClass::I64, n)
}

pub fn v(n: u32) -> Reg {
  Reg::new_virtual(RegClass::I64, n)
}

#[derive(Clone)]
pub struct TInsn {
  pub name: &'static str,
  pub desc: InsnDesc,
  pub uses: Vec<Reg>,
  pub defs: Vec<Reg>,
}

impl fmt::Debug for TInsn {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{} {:?} <- {:?}", self.name, self.defs, self.uses)
  }
}

fn insn(name: &'static str, desc: InsnDesc, defs: &[Reg], uses: &[Reg]) -> TInsn {
  TInsn { name, desc, uses: uses.to_vec(), defs: defs.to_vec() }
}

fn mem(base: Reg, offset: i64, access: MemAccessKind) -> MemOperand {
  MemOperand {
    mode: AddrMode::BaseOffset,
    base: Some(base),
    index: None,
    offset,
    size: 8,
    symbol: None,
    region: if base == sp() { MemRegion::Stack } else { MemRegion::Heap },
    access,
    independent: false,
    callee_save: false,
  }
}

pub fn alu(name: &'static str, def: Reg, uses: &[Reg]) -> TInsn {
  insn(name, InsnDesc::new(OpClass::Alu), &[def], uses)
}

pub fn mul(name: &'static str, def: Reg, uses: &[Reg]) -> TInsn {
  insn(name, InsnDesc::new(OpClass::Mul), &[def], uses)
}

pub fn div(name: &'static str, def: Reg, uses: &[Reg]) -> TInsn {
  insn(name, InsnDesc::new(OpClass::Div), &[def], uses)
}

pub fn load(name: &'static str, dst: Reg, base: Reg, offset: i64) -> TInsn {
  let desc = InsnDesc::new(OpClass::Load)
    .with_mem(mem(base, offset, MemAccessKind::Read));
  insn(name, desc, &[dst], &[base])
}

pub fn store(name: &'static str, src: Reg, base: Reg, offset: i64) -> TInsn {
  let desc = InsnDesc::new(OpClass::Store)
    .with_mem(mem(base, offset, MemAccessKind::Write));
  insn(name, desc, &[], &[src, base])
}

pub fn branch(name: &'static str, uses: &[Reg]) -> TInsn {
  let props = InsnProps { is_branch: true, ..InsnProps::default() };
  insn(name, InsnDesc::new(OpClass::Branch).with_props(props), &[], uses)
}

pub fn ret(name: &'static str, uses: &[Reg]) -> TInsn {
  let props = InsnProps { is_return: true, ..InsnProps::default() };
  insn(name, InsnDesc::new(OpClass::Branch).with_props(props), &[], uses)
}

pub fn call(name: &'static str, defs: &[Reg], uses: &[Reg]) -> TInsn {
  let props = InsnProps { is_call: true, ..InsnProps::default() };
  insn(name, InsnDesc::new(OpClass::Call).with_props(props), defs, uses)
}

pub fn barrier(name: &'static str) -> TInsn {
  let props = InsnProps { is_barrier: true, ..InsnProps::default() };
  insn(name, InsnDesc::new(OpClass::Barrier).with_props(props), &[], &[])
}

pub fn throwing(name: &'static str, uses: &[Reg]) -> TInsn {
  let props = InsnProps { may_throw: true, ..InsnProps::default() };
  insn(name, InsnDesc::new(OpClass::Alu).with_props(props), &[], uses)
}

pub fn pseudo(name: &'static str, kind: PseudoKind) -> TInsn {
  insn(name, InsnDesc::pseudo(kind), &[], &[])
}

struct TBlock {
  start: u32,
  len: u32,
  succs: SmallVec<[BlockIx; 2]>,
  eh_succs: SmallVec<[BlockIx; 1]>,
  cold: bool,
}

pub struct TFunc {
  insns: Vec<TInsn>,
  blocks: Vec<TBlock>,
  pub liveouts: Set<Reg>,
}

impl TFunc {
  pub fn new() -> Self {
    Self { insns: Vec::new(), blocks: Vec::new(), liveouts: Set::empty() }
  }

  pub fn block(&mut self, insns: Vec<TInsn>, succs: &[u32]) -> BlockIx {
    self.block_eh(insns, succs, &[])
  }

  pub fn block_eh(
    &mut self, insns: Vec<TInsn>, succs: &[u32], eh_succs: &[u32],
  ) -> BlockIx {
    let start = self.insns.len() as u32;
    let len = insns.len() as u32;
    self.insns.extend(insns);
    self.blocks.push(TBlock {
      start,
      len,
      succs: succs.iter().map(|s| BlockIx::new(*s)).collect(),
      eh_succs: eh_succs.iter().map(|s| BlockIx::new(*s)).collect(),
      cold: false,
    });
    BlockIx::new(self.blocks.len() as u32 - 1)
  }

  pub fn set_cold(&mut self, bix: BlockIx) {
    self.blocks[bix.get() as usize].cold = true;
  }

  pub fn name_of(&self, iix: InstIx) -> &'static str {
    self.insns[iix.get() as usize].name
  }
}

impl Function for TFunc {
  type Inst = TInsn;

  fn insns(&self) -> &[TInsn] {
    &self.insns
  }

  fn get_insn(&self, iix: InstIx) -> &TInsn {
    &self.insns[iix.get() as usize]
  }

  fn entry_block(&self) -> BlockIx {
    BlockIx::new(0)
  }

  fn blocks(&self) -> Range<BlockIx> {
    Range::new(BlockIx::new(0), self.blocks.len())
  }

  fn block_insns(&self, bix: BlockIx) -> Range<InstIx> {
    let b = &self.blocks[bix.get() as usize];
    Range::new(InstIx::new(b.start), b.len as usize)
  }

  fn block_succs(&self, bix: BlockIx) -> SmallVec<[BlockIx; 2]> {
    self.blocks[bix.get() as usize].succs.clone()
  }

  fn block_eh_succs(&self, bix: BlockIx) -> SmallVec<[BlockIx; 1]> {
    self.blocks[bix.get() as usize].eh_succs.clone()
  }

  fn is_cold_block(&self, bix: BlockIx) -> bool {
    self.blocks[bix.get() as usize].cold
  }

  fn func_liveouts(&self) -> Set<Reg> {
    self.liveouts.clone()
  }

  fn get_regs(&self, insn: &TInsn) -> InstRegUses {
    InstRegUses {
      used: insn.uses.iter().cloned().collect(),
      defined: insn.defs.iter().cloned().collect(),
    }
  }

  fn insn_desc(&self, insn: &TInsn) -> InsnDesc {
    insn.desc.clone()
  }
}
