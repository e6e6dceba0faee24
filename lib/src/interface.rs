/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! This is the top level interface for the insnsched library.

use smallvec::SmallVec;
use std::env;
use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

// Stuff that is defined by the library

// Sets and maps of things.  The interface needs some way to speak about
// them, so let's use the library-provided versions.

pub use crate::data_structures::Map;
pub use crate::data_structures::Set;

// Registers and register classes.

pub use crate::data_structures::{Reg, RegClass, NUM_REG_CLASSES};

// Typed vectors and indices, so that the interface can speak about vectors
// of blocks and instructions.

pub use crate::data_structures::{BlockIx, InstIx, NodeIx, Range, TypedIxVec};

// The machine description and the default AArch64 collaborators.

pub use crate::aarch64::AArch64MemoryModel;
pub use crate::machine::{MachineDesc, Reservation, UnitDesc, UnitIx, UnitReq};

pub use crate::checker::{CheckerError, CheckerErrors};

use crate::analysis::AnalysisError;

/// Register uses for a given instruction.  A register that is both read and
/// written appears in both lists.
#[derive(Clone, Debug, Default)]
pub struct InstRegUses {
  pub used: SmallVec<[Reg; 4]>,
  pub defined: SmallVec<[Reg; 4]>,
}

/// The row of the machine description an instruction is looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum OpClass {
  Nop,
  Alu,
  AluShift,
  Mul,
  Div,
  Load,
  Store,
  Fpu,
  FpuDiv,
  Branch,
  Call,
  Barrier,
  Adrp,
  AddLo12,
  Clinit,
  InlineAsm,
  Atomic,
}

pub const NUM_OP_CLASSES: usize = 17;

impl OpClass {
  #[inline(always)]
  pub fn index(self) -> usize {
    self as usize
  }

  pub fn all() -> [OpClass; NUM_OP_CLASSES] {
    use OpClass::*;
    [
      Nop, Alu, AluShift, Mul, Div, Load, Store, Fpu, FpuDiv, Branch, Call,
      Barrier, Adrp, AddLo12, Clinit, InlineAsm, Atomic,
    ]
  }
}

/// Side-effect classification of an instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InsnProps {
  pub is_call: bool,
  pub is_branch: bool,
  pub is_return: bool,
  /// Memory barrier (`dmb` and friends).
  pub is_barrier: bool,
  pub may_throw: bool,
  /// Atomic or builtin sequences; never moved between blocks and ordered
  /// like a barrier.
  pub is_atomic: bool,
  pub is_inline_asm: bool,
  /// Inline asm with a memory operand or a "memory" clobber.
  pub asm_touches_memory: bool,
}

impl InsnProps {
  pub fn is_control_flow(&self) -> bool {
    self.is_branch || self.is_return
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrMode {
  /// `[base, #imm]`
  BaseOffset,
  /// `[base, #imm]!`: the base is written back before the access.
  PreIndex,
  /// `[base], #imm`: the base is written back after the access.
  PostIndex,
  /// `[base, index]`
  RegOffset,
  /// pc-relative literal, addressed by symbol.
  Literal,
  /// The client could not classify this operand.  Building a dependence
  /// graph over it is a fatal error.
  Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemRegion {
  /// Addressed off the stack or frame pointer.
  Stack,
  /// Anything else.  Heap pointers never point into the frame.
  Heap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemAccessKind {
  Read,
  Write,
}

/// A memory operand, as classified by the client.
#[derive(Clone, Debug, PartialEq)]
pub struct MemOperand {
  pub mode: AddrMode,
  pub base: Option<Reg>,
  pub index: Option<Reg>,
  pub offset: i64,
  /// Access size in bytes.
  pub size: u32,
  /// Interned symbol id, for literal and symbol-relative accesses.
  pub symbol: Option<u32>,
  pub region: MemRegion,
  pub access: MemAccessKind,
  /// Known not to alias any other access (e.g. a constant pool load).
  pub independent: bool,
  /// Prologue / epilogue spill or restore of a callee-saved register.
  pub callee_save: bool,
}

impl MemOperand {
  pub fn is_load(&self) -> bool {
    self.access == MemAccessKind::Read
  }
  pub fn is_store(&self) -> bool {
    self.access == MemAccessKind::Write
  }
}

/// Pseudo instructions: no machine effect, but bound to a real instruction
/// and carried along when it moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoKind {
  Comment,
  Debug,
  Cfi,
  ClinitCompanion,
}

impl PseudoKind {
  /// Does this pseudo bind to the real instruction that follows it?
  pub fn binds_forward(self) -> bool {
    match self {
      PseudoKind::Comment | PseudoKind::Debug => true,
      PseudoKind::Cfi | PseudoKind::ClinitCompanion => false,
    }
  }
}

/// Everything the scheduler needs to know about an instruction, beyond its
/// registers.
#[derive(Clone, Debug)]
pub struct InsnDesc {
  pub class: OpClass,
  pub props: InsnProps,
  pub mem: Option<MemOperand>,
  pub pseudo: Option<PseudoKind>,
  /// Alias-analysis "referenced object" set, if available.
  pub alias_objects: Option<SmallVec<[u32; 2]>>,
  /// Registers clobbered by inline asm.
  pub clobbers: SmallVec<[Reg; 4]>,
}

impl InsnDesc {
  pub fn new(class: OpClass) -> Self {
    Self {
      class,
      props: InsnProps::default(),
      mem: None,
      pseudo: None,
      alias_objects: None,
      clobbers: SmallVec::new(),
    }
  }

  pub fn pseudo(kind: PseudoKind) -> Self {
    let mut desc = Self::new(OpClass::Nop);
    desc.pseudo = Some(kind);
    desc
  }

  pub fn with_props(mut self, props: InsnProps) -> Self {
    self.props = props;
    self
  }

  pub fn with_mem(mut self, mem: MemOperand) -> Self {
    self.mem = Some(mem);
    self
  }

  pub fn is_pseudo(&self) -> bool {
    self.pseudo.is_some()
  }
}

/// A memory access as seen by the memory model: the client's operand, plus
/// the dependence-graph node that defined its base and index registers at
/// the point of the access (if one is in the graph).
#[derive(Clone, Debug)]
pub struct MemAccess<'a> {
  pub op: &'a MemOperand,
  pub base_def: Option<NodeIx>,
  pub index_def: Option<NodeIx>,
  /// The loaded or stored register.
  pub data: Option<Reg>,
}

/// Target-specific memory and call rules, shared by every dependence
/// builder.
pub trait MemoryModel {
  /// May the two accesses touch overlapping bytes?  Only called once the
  /// target-independent filters (flags, regions, symbols, alias sets) have
  /// failed to separate them.
  fn may_overlap(&self, a: &MemAccess, b: &MemAccess) -> bool;

  /// Can `first` and `second`, adjacent in program order, be issued as a
  /// pair (LDP / STP)?
  fn is_combinable_pair(&self, first: &MemAccess, second: &MemAccess) -> bool;

  /// Registers a call clobbers.  Calls are treated as reading and writing
  /// each of these.
  fn caller_saved_regs(&self) -> &[Reg];

  fn is_caller_saved(&self, reg: Reg) -> bool {
    self.caller_saved_regs().contains(&reg)
  }

  /// Stack or frame pointer.
  fn is_frame_reg(&self, reg: Reg) -> bool;

  /// Does this store set up a stack-passed call argument?
  fn is_stack_arg_setup(&self, op: &MemOperand) -> bool;
}

/// A trait defined by the client to provide access to its
/// machine-instruction / CFG representation.
pub trait Function {
  /// The scheduler is parameterized on F: Function and so can use the
  /// projected type F::Inst.
  type Inst: Clone + fmt::Debug;

  // -------------
  // CFG traversal
  // -------------

  /// Allow access to the underlying vector of instructions.
  fn insns(&self) -> &[Self::Inst];

  /// Get an instruction with a type-safe InstIx index.
  fn get_insn(&self, insn: InstIx) -> &Self::Inst;

  /// Get the index of the entry block.
  fn entry_block(&self) -> BlockIx;

  /// Allow iteration over basic blocks (in instruction order).
  fn blocks(&self) -> Range<BlockIx>;

  /// Provide the range of instruction indices contained in each block.
  fn block_insns(&self, block: BlockIx) -> Range<InstIx>;

  /// Get CFG successors for a given block, in branch order.  The position
  /// of a successor in this list is the branch outcome that reaches it.
  fn block_succs(&self, block: BlockIx) -> SmallVec<[BlockIx; 2]>;

  /// Exception-handler successors for a given block.
  fn block_eh_succs(&self, _block: BlockIx) -> SmallVec<[BlockIx; 1]> {
    SmallVec::new()
  }

  /// Is this block known to be rarely executed?
  fn is_cold_block(&self, _block: BlockIx) -> bool {
    false
  }

  /// Registers live on exit from the function.
  fn func_liveouts(&self) -> Set<Reg> {
    Set::empty()
  }

  // --------------------------
  // Instruction register slots
  // --------------------------

  /// Provide the defined and used registers for an instruction.
  fn get_regs(&self, insn: &Self::Inst) -> InstRegUses;

  /// Classify an instruction for the machine model and dependence rules.
  fn insn_desc(&self, insn: &Self::Inst) -> InsnDesc;
}

//=============================================================================
// Options

/// How candidates are collected for each run of the list scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Strategy {
  /// One block at a time.
  Local,
  /// One region at a time; instructions may move between control
  /// equivalent blocks.
  Global,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum PriorityPolicy {
  /// Delay first, then memory locality, dependence class, successors, id.
  Delay,
  /// Latest start first, then unit pressure, slot preference, successors, id.
  CriticalPath,
  /// Ignore every heuristic and resource: pick the ready node that comes
  /// last in program order.  A self-test for the dependence graph.
  DependenceOrder,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Options {
  /// Skip the whole phase.
  pub skip: bool,
  pub strategy: Strategy,
  pub policy: PriorityPolicy,
  /// Before register allocation, schedule blocks for register pressure.
  pub reg_pressure: bool,
  /// Run the schedulers and gather statistics, but keep the input order.
  pub simulate_only: bool,
  /// Cross-check the pressure scheduler against exhaustive enumeration of
  /// small windows.  Requires the "fuzzing" feature.
  pub brute_force: bool,
  /// Verify the produced order against the dependence graph.
  pub run_checker: bool,
  /// Number of real nodes between separator nodes.
  pub separator_window: u32,
  /// Regions (and blocks) with more real instructions than this are left
  /// alone.
  pub max_region_insns: u32,
  /// Upper bound on the number of orders enumerated by the brute force
  /// scheduler.
  pub max_series_count: u32,
  /// Size of the windows enumerated by the brute force scheduler.
  pub brute_force_window: u32,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      skip: false,
      strategy: Strategy::Local,
      policy: PriorityPolicy::Delay,
      reg_pressure: false,
      simulate_only: false,
      brute_force: false,
      run_checker: cfg!(debug_assertions),
      separator_window: 200,
      max_region_insns: 2000,
      max_series_count: 20000,
      brute_force_window: 8,
    }
  }
}

fn env_flag(name: &str) -> Option<bool> {
  match env::var(name) {
    Ok(s) => match s.as_str() {
      "1" | "y" | "yes" | "true" | "on" => Some(true),
      "0" | "n" | "no" | "false" | "off" => Some(false),
      _ => None,
    },
    Err(_) => None,
  }
}

fn env_u32(name: &str) -> Option<u32> {
  env::var(name).ok().and_then(|s| s.parse::<u32>().ok())
}

impl Options {
  /// The defaults, overridden by the SCHED_* environment variables.  Useful
  /// for debugging.
  pub fn from_env() -> Self {
    let mut opts = Options::default();
    if let Some(b) = env_flag("SCHED_SKIP") {
      opts.skip = b;
    }
    if let Ok(s) = env::var("SCHED_STRATEGY") {
      opts.strategy = match s.as_str() {
        "g" | "global" => Strategy::Global,
        _ => Strategy::Local,
      };
    }
    if let Ok(s) = env::var("SCHED_POLICY") {
      opts.policy = match s.as_str() {
        "c" | "critical" => PriorityPolicy::CriticalPath,
        "d" | "deporder" => PriorityPolicy::DependenceOrder,
        _ => PriorityPolicy::Delay,
      };
    }
    if let Some(b) = env_flag("SCHED_PRESSURE") {
      opts.reg_pressure = b;
    }
    if let Some(b) = env_flag("SCHED_SIMULATE") {
      opts.simulate_only = b;
    }
    if let Some(b) = env_flag("SCHED_BRUTE") {
      opts.brute_force = b;
    }
    if let Some(b) = env_flag("SCHED_CHECK") {
      opts.run_checker = b;
    }
    if let Some(n) = env_u32("SCHED_WINDOW") {
      opts.separator_window = n.max(2);
    }
    if let Some(n) = env_u32("SCHED_MAX_INSNS") {
      opts.max_region_insns = n;
    }
    opts
  }
}

//=============================================================================
// Results and errors

/// Counters gathered over one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ScheduleStats {
  pub num_regions: u32,
  pub num_global_regions: u32,
  pub num_local_blocks: u32,
  pub num_skipped: u32,
  pub num_moved: u32,
  pub num_pressure_scheduled: u32,
  pub num_pressure_fallbacks: u32,
  /// Sum over scheduled units of the simulated cycle count of the input
  /// order and of the produced order.
  pub cycles_before: u64,
  pub cycles_after: u64,
}

/// The result of scheduling.
pub struct ScheduleResult<F: Function> {
  /// The new sequence of instructions: the same instructions as the input,
  /// reordered within blocks and possibly moved between blocks of a region.
  pub insns: Vec<F::Inst>,

  /// Basic-block start indices for the new instruction list, indexed by the
  /// original basic block indices.
  pub target_map: TypedIxVec<BlockIx, InstIx>,

  /// The original index of every instruction in `insns`.
  pub orig_insn_map: TypedIxVec<InstIx, InstIx>,

  pub stats: ScheduleStats,
}

#[derive(Clone, Debug)]
pub enum SchedError {
  Analysis(AnalysisError),
  /// The dependence graph or the scheduler state is malformed.
  Internal(String),
  Checker(CheckerErrors),
}

impl fmt::Display for SchedError {
  fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SchedError::Analysis(err) => write!(fmt, "analysis error: {}", err),
      SchedError::Internal(msg) => write!(fmt, "internal error: {}", msg),
      SchedError::Checker(errors) => {
        write!(fmt, "checker error: {} problem(s)", errors.errors.len())?;
        for err in errors.errors.iter().take(4) {
          write!(fmt, "\n  {:?}", err)?;
        }
        Ok(())
      }
    }
  }
}

impl From<AnalysisError> for SchedError {
  fn from(err: AnalysisError) -> Self {
    SchedError::Analysis(err)
  }
}

/// Schedule a function's code with the given machine description and
/// memory model.  Scheduling either succeeds, returning the reordered
/// instructions, or fails without touching anything.
#[inline(never)]
pub fn schedule_function<F: Function>(
  func: &F, machine: &MachineDesc, mem_model: &dyn MemoryModel,
  opts: &Options,
) -> Result<ScheduleResult<F>, SchedError> {
  crate::schedule::run(func, machine, mem_model, opts)
}

/// Schedule with the generic AArch64 machine description and memory model.
pub fn schedule_aarch64<F: Function>(
  func: &F, opts: &Options,
) -> Result<ScheduleResult<F>, SchedError> {
  let machine = MachineDesc::aarch64_generic();
  let mem_model = AArch64MemoryModel::new();
  schedule_function(func, &machine, &mem_model, opts)
}
