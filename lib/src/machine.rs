/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! The machine description: execution units, and for every opcode class the
//! units it occupies and the latency of its result.  Plus the cycle-by-cycle
//! occupancy table the list scheduler consults.

use log::trace;
use smallvec::SmallVec;

use crate::data_structures::Map;
use crate::interface::{OpClass, NUM_OP_CLASSES};

/// Index of an execution unit in a `MachineDesc`.
pub type UnitIx = u32;

/// Occupancy is tracked this many cycles ahead.
const HORIZON: u32 = 64;

#[derive(Clone, Debug)]
pub struct UnitDesc {
  pub name: &'static str,
}

/// One of `alternatives`, for `cycles` consecutive cycles starting at issue.
#[derive(Clone, Debug)]
pub struct UnitReq {
  pub alternatives: SmallVec<[UnitIx; 2]>,
  pub cycles: u32,
}

#[derive(Clone, Debug)]
pub struct Reservation {
  pub reqs: SmallVec<[UnitReq; 4]>,
  /// Cycles from issue until the result can be consumed.
  pub latency: u32,
  /// Cycles that must elapse after issue before anything else is selected.
  pub forced_gap: u32,
}

impl Reservation {
  pub fn new(latency: u32) -> Self {
    Self { reqs: SmallVec::new(), latency, forced_gap: 0 }
  }

  pub fn with(mut self, alternatives: &[UnitIx], cycles: u32) -> Self {
    assert!(!alternatives.is_empty());
    assert!(cycles >= 1 && cycles <= HORIZON);
    self.reqs.push(UnitReq { alternatives: alternatives.into(), cycles });
    self
  }

  pub fn with_forced_gap(mut self, gap: u32) -> Self {
    self.forced_gap = gap;
    self
  }

  /// Does this reservation ever need unit `u`?
  pub fn may_use(&self, u: UnitIx) -> bool {
    self.reqs.iter().any(|req| req.alternatives.contains(&u))
  }

  /// Number of unit choices; fewer means harder to place.
  pub fn num_choices(&self) -> usize {
    self.reqs.iter().map(|req| req.alternatives.len()).sum()
  }
}

#[derive(Clone, Debug)]
pub struct MachineDesc {
  pub name: &'static str,
  units: Vec<UnitDesc>,
  reservations: Vec<Reservation>,
  pair_latency: Map<(OpClass, OpClass), u32>,
}

impl MachineDesc {
  /// A machine with no units, where everything has latency 1.
  pub fn new(name: &'static str) -> Self {
    Self {
      name,
      units: Vec::new(),
      reservations: vec![Reservation::new(1); NUM_OP_CLASSES],
      pair_latency: Map::default(),
    }
  }

  pub fn add_unit(&mut self, name: &'static str) -> UnitIx {
    self.units.push(UnitDesc { name });
    (self.units.len() - 1) as UnitIx
  }

  pub fn set_reservation(&mut self, class: OpClass, res: Reservation) {
    for req in res.reqs.iter() {
      for u in req.alternatives.iter() {
        assert!((*u as usize) < self.units.len(), "unknown unit {}", u);
      }
    }
    self.reservations[class.index()] = res;
  }

  /// Override the latency of a true dependence from `from` to `to`, for
  /// forwarding paths the generic latency doesn't describe.  Only a store's
  /// data operand sees the override; its address operands don't.
  pub fn set_pair_latency(&mut self, from: OpClass, to: OpClass, lat: u32) {
    self.pair_latency.insert((from, to), lat);
  }

  pub fn reservation(&self, class: OpClass) -> &Reservation {
    &self.reservations[class.index()]
  }

  pub fn latency(&self, class: OpClass) -> u32 {
    self.reservations[class.index()].latency
  }

  /// Latency of a true dependence between two instructions.
  pub fn true_latency(&self, from: OpClass, to: OpClass) -> u32 {
    match self.pair_latency.get(&(from, to)) {
      Some(lat) => *lat,
      None => self.latency(from),
    }
  }

  pub fn num_units(&self) -> usize {
    self.units.len()
  }

  pub fn unit(&self, u: UnitIx) -> &UnitDesc {
    &self.units[u as usize]
  }

  /// A generic dual-issue, in-order AArch64 core.
  pub fn aarch64_generic() -> Self {
    let mut m = MachineDesc::new("aarch64-generic");
    let slot0 = m.add_unit("slot0");
    let slot1 = m.add_unit("slot1");
    let alu0 = m.add_unit("alu0");
    let alu1 = m.add_unit("alu1");
    let mac = m.add_unit("mac");
    let div = m.add_unit("div");
    let ld = m.add_unit("ld");
    let st = m.add_unit("st");
    let fp0 = m.add_unit("fp0");
    let fp1 = m.add_unit("fp1");
    let br = m.add_unit("br");

    let slot = [slot0, slot1];
    let alu = [alu0, alu1];
    let fp = [fp0, fp1];

    use OpClass::*;
    m.set_reservation(Nop, Reservation::new(1).with(&slot, 1));
    m.set_reservation(Alu, Reservation::new(1).with(&slot, 1).with(&alu, 1));
    m.set_reservation(
      AluShift,
      Reservation::new(2).with(&slot, 1).with(&alu, 1),
    );
    m.set_reservation(Mul, Reservation::new(3).with(&slot, 1).with(&[mac], 1));
    m.set_reservation(
      Div,
      Reservation::new(8).with(&slot, 1).with(&[div], 8),
    );
    m.set_reservation(Load, Reservation::new(3).with(&slot, 1).with(&[ld], 1));
    m.set_reservation(Store, Reservation::new(1).with(&slot, 1).with(&[st], 1));
    m.set_reservation(Fpu, Reservation::new(4).with(&slot, 1).with(&fp, 1));
    m.set_reservation(
      FpuDiv,
      Reservation::new(10).with(&slot, 1).with(&[fp0], 10),
    );
    m.set_reservation(Branch, Reservation::new(1).with(&slot, 1).with(&[br], 1));
    // Single-issue: a call takes both slots.
    m.set_reservation(
      Call,
      Reservation::new(1).with(&[slot0], 1).with(&[slot1], 1).with(&[br], 1),
    );
    m.set_reservation(
      Barrier,
      Reservation::new(1)
        .with(&[slot0], 1)
        .with(&[slot1], 1)
        .with(&[ld], 1)
        .with(&[st], 1),
    );
    // Nothing dual-issues with ADRP.
    m.set_reservation(
      Adrp,
      Reservation::new(1).with(&slot, 1).with(&alu, 1).with_forced_gap(1),
    );
    m.set_reservation(AddLo12, Reservation::new(1).with(&slot, 1).with(&alu, 1));
    m.set_reservation(
      Clinit,
      Reservation::new(4)
        .with(&[slot0], 1)
        .with(&[slot1], 1)
        .with(&[ld], 1)
        .with_forced_gap(3),
    );
    m.set_reservation(
      InlineAsm,
      Reservation::new(1).with(&[slot0], 1).with(&[slot1], 1),
    );
    m.set_reservation(
      Atomic,
      Reservation::new(4)
        .with(&[slot0], 1)
        .with(&[slot1], 1)
        .with(&[ld], 1)
        .with(&[st], 1),
    );

    // Multiply-accumulate forwarding, and store data coming from a load.
    m.set_pair_latency(Mul, Mul, 1);
    m.set_pair_latency(Load, Store, 2);
    m
  }
}

//=============================================================================
// Resource occupancy

/// Occupancy of every unit over the next `HORIZON` cycles.  Bit `i` of
/// `busy[u]` is set when unit `u` is taken `i` cycles from now.
#[derive(Clone, Debug)]
pub struct ResourceTable {
  busy: Vec<u64>,
  cycle: u32,
}

fn cycle_mask(cycles: u32) -> u64 {
  if cycles >= 64 {
    !0
  } else {
    (1u64 << cycles) - 1
  }
}

impl ResourceTable {
  pub fn new(machine: &MachineDesc) -> Self {
    Self { busy: vec![0; machine.num_units()], cycle: 0 }
  }

  pub fn cycle(&self) -> u32 {
    self.cycle
  }

  // Pick a unit for every requirement, without double-booking a unit
  // between two requirements of the same reservation.
  fn assign(&self, res: &Reservation) -> Option<SmallVec<[(UnitIx, u64); 4]>> {
    let mut taken = SmallVec::<[(UnitIx, u64); 4]>::new();
    for req in res.reqs.iter() {
      let mask = cycle_mask(req.cycles);
      let choice = req.alternatives.iter().find(|u| {
        self.busy[**u as usize] & mask == 0
          && !taken.iter().any(|(tu, tm)| *tu == **u && tm & mask != 0)
      });
      match choice {
        Some(u) => taken.push((*u, mask)),
        None => return None,
      }
    }
    Some(taken)
  }

  pub fn is_free(&self, res: &Reservation) -> bool {
    self.assign(res).is_some()
  }

  /// Take the units `res` needs, from the current cycle on.  Returns false,
  /// changing nothing, if they aren't all free.
  pub fn occupy(&mut self, res: &Reservation) -> bool {
    match self.assign(res) {
      Some(taken) => {
        for (u, mask) in taken {
          trace!("    occupy unit {} mask {:#x} at cycle {}", u, mask, self.cycle);
          self.busy[u as usize] |= mask;
        }
        true
      }
      None => false,
    }
  }

  /// Move on to the next cycle.
  pub fn advance(&mut self) {
    for b in self.busy.iter_mut() {
      *b >>= 1;
    }
    self.cycle += 1;
  }
}

#[test]
fn resource_table_dual_issue() {
  let m = MachineDesc::aarch64_generic();
  let mut rt = ResourceTable::new(&m);
  let alu = m.reservation(OpClass::Alu);
  assert!(rt.occupy(alu));
  assert!(rt.occupy(alu));
  // Both slots are taken now.
  assert!(!rt.is_free(alu));
  rt.advance();
  assert_eq!(rt.cycle(), 1);
  assert!(rt.is_free(alu));
}

#[test]
fn resource_table_unpipelined_divide() {
  let m = MachineDesc::aarch64_generic();
  let mut rt = ResourceTable::new(&m);
  let div = m.reservation(OpClass::Div);
  assert!(rt.occupy(div));
  for _ in 0..7 {
    rt.advance();
    assert!(!rt.is_free(div));
    // Other units stay usable.
    assert!(rt.is_free(m.reservation(OpClass::Alu)));
  }
  rt.advance();
  assert!(rt.is_free(div));
}

#[test]
fn resource_table_call_is_single_issue() {
  let m = MachineDesc::aarch64_generic();
  let mut rt = ResourceTable::new(&m);
  assert!(rt.occupy(m.reservation(OpClass::Load)));
  // One slot is gone, so the call has to wait.
  assert!(!rt.is_free(m.reservation(OpClass::Call)));
  rt.advance();
  assert!(rt.occupy(m.reservation(OpClass::Call)));
  assert!(!rt.is_free(m.reservation(OpClass::Nop)));
}

#[test]
fn pair_latency_overrides() {
  let m = MachineDesc::aarch64_generic();
  assert_eq!(m.true_latency(OpClass::Load, OpClass::Alu), 3);
  assert_eq!(m.true_latency(OpClass::Load, OpClass::Store), 2);
  assert_eq!(m.true_latency(OpClass::Mul, OpClass::Mul), 1);
}
