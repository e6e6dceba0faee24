/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Data structures for the whole crate.

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Index;
use std::ops::IndexMut;
use std::slice::{Iter, IterMut};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

//=============================================================================
// Queues

pub type Queue<T> = VecDeque<T>;

//=============================================================================
// Maps

pub type Map<K, V> = FxHashMap<K, V>;

//=============================================================================
// Sets of things

pub struct Set<T> {
  set: FxHashSet<T>,
}

impl<T: Eq + Ord + Hash + Copy + fmt::Debug> Set<T> {
  #[inline(never)]
  pub fn empty() -> Self {
    Self { set: FxHashSet::<T>::default() }
  }

  #[inline(never)]
  pub fn unit(item: T) -> Self {
    let mut s = Self::empty();
    s.insert(item);
    s
  }

  #[inline(never)]
  pub fn two(item1: T, item2: T) -> Self {
    let mut s = Self::empty();
    s.insert(item1);
    s.insert(item2);
    s
  }

  #[inline(never)]
  pub fn card(&self) -> usize {
    self.set.len()
  }

  #[inline(never)]
  pub fn insert(&mut self, item: T) {
    self.set.insert(item);
  }

  #[inline(never)]
  pub fn delete(&mut self, item: T) {
    self.set.remove(&item);
  }

  #[inline(never)]
  pub fn is_empty(&self) -> bool {
    self.set.is_empty()
  }

  #[inline(never)]
  pub fn contains(&self, item: T) -> bool {
    self.set.contains(&item)
  }

  #[inline(never)]
  pub fn intersect(&mut self, other: &Self) {
    let mut res = FxHashSet::<T>::default();
    for item in self.set.iter() {
      if other.set.contains(item) {
        res.insert(*item);
      }
    }
    self.set = res;
  }

  #[inline(never)]
  pub fn union(&mut self, other: &Self) {
    for item in other.set.iter() {
      self.set.insert(*item);
    }
  }

  #[inline(never)]
  pub fn remove(&mut self, other: &Self) {
    for item in other.set.iter() {
      self.set.remove(item);
    }
  }

  #[inline(never)]
  pub fn intersects(&self, other: &Self) -> bool {
    !self.set.is_disjoint(&other.set)
  }

  #[inline(never)]
  pub fn is_subset_of(&self, other: &Self) -> bool {
    self.set.is_subset(&other.set)
  }

  /// Sorted contents; iterate this when the visiting order matters.
  #[inline(never)]
  pub fn to_vec(&self) -> Vec<T> {
    let mut res = Vec::<T>::new();
    for item in self.set.iter() {
      res.push(*item)
    }
    res.sort_unstable();
    res
  }

  #[inline(never)]
  pub fn from_vec(vec: Vec<T>) -> Self {
    let mut res = Set::<T>::empty();
    for x in vec {
      res.insert(x);
    }
    res
  }

  #[inline(never)]
  pub fn equals(&self, other: &Self) -> bool {
    self.set == other.set
  }
}

impl<T: Eq + Ord + Hash + Copy + fmt::Debug> fmt::Debug for Set<T> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?}", self.to_vec())
  }
}

impl<T: Eq + Ord + Hash + Copy + Clone + fmt::Debug> Clone for Set<T> {
  #[inline(never)]
  fn clone(&self) -> Self {
    let mut res = Set::<T>::empty();
    for item in self.set.iter() {
      res.set.insert(item.clone());
    }
    res
  }
}

pub struct SetIter<'a, T> {
  set_iter: std::collections::hash_set::Iter<'a, T>,
}
impl<T> Set<T> {
  pub fn iter(&self) -> SetIter<T> {
    SetIter { set_iter: self.set.iter() }
  }
}
impl<'a, T> Iterator for SetIter<'a, T> {
  type Item = &'a T;
  fn next(&mut self) -> Option<Self::Item> {
    self.set_iter.next()
  }
}

//=============================================================================
// Iteration boilerplate for entities.  The only purpose of this is to support
// constructions of the form
//
//   for ent in startEnt .dotdot( endPlus1Ent ) {
//   }
//
// until such time as |trait Step| is available in stable Rust.

pub trait Zero {
  fn zero() -> Self;
}

pub trait PlusN {
  fn plus_n(&self, n: usize) -> Self;
}

#[derive(Clone, Copy)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Range<T> {
  first: T,
  len: usize,
}

impl<T: Copy + PartialOrd + PlusN> IntoIterator for Range<T> {
  type Item = T;
  type IntoIter = MyIterator<T>;
  fn into_iter(self) -> Self::IntoIter {
    MyIterator { first: self.first, front: 0, back: self.len }
  }
}

impl<T: Copy + Eq + Ord + PlusN> Range<T> {
  /// Create a new range object.
  pub fn new(from: T, len: usize) -> Range<T> {
    Range { first: from, len }
  }

  pub fn start(&self) -> T {
    self.first
  }

  pub fn first(&self) -> T {
    assert!(self.len() > 0);
    self.start()
  }

  pub fn last(&self) -> T {
    assert!(self.len() > 0);
    self.start().plus_n(self.len() - 1)
  }

  pub fn last_plus1(&self) -> T {
    self.start().plus_n(self.len())
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn contains(&self, t: T) -> bool {
    t >= self.first && t < self.first.plus_n(self.len)
  }
}

pub struct MyIterator<T> {
  first: T,
  front: usize,
  back: usize,
}
impl<T: Copy + PartialOrd + PlusN> Iterator for MyIterator<T> {
  type Item = T;
  fn next(&mut self) -> Option<Self::Item> {
    if self.front >= self.back {
      None
    } else {
      let res = Some(self.first.plus_n(self.front));
      self.front += 1;
      res
    }
  }
}
impl<T: Copy + PartialOrd + PlusN> DoubleEndedIterator for MyIterator<T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.front >= self.back {
      None
    } else {
      self.back -= 1;
      Some(self.first.plus_n(self.back))
    }
  }
}

//=============================================================================
// Vectors where both the index and element types can be specified (and at
// most 2^32-1 elems can be stored.  What if this overflows?)

pub struct TypedIxVec<TyIx, Ty> {
  vek: Vec<Ty>,
  ty_ix: PhantomData<TyIx>,
}

impl<TyIx, Ty> TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
  TyIx: Copy + Eq + Ord + Zero + PlusN + Into<u32>,
{
  pub fn new() -> Self {
    Self { vek: Vec::new(), ty_ix: PhantomData::<TyIx> }
  }
  pub fn from_vec(vek: Vec<Ty>) -> Self {
    Self { vek, ty_ix: PhantomData::<TyIx> }
  }
  pub fn append(&mut self, other: &mut TypedIxVec<TyIx, Ty>) {
    // FIXME what if this overflows?
    self.vek.append(&mut other.vek);
  }
  pub fn iter(&self) -> Iter<Ty> {
    self.vek.iter()
  }
  pub fn iter_mut(&mut self) -> IterMut<Ty> {
    self.vek.iter_mut()
  }
  pub fn len(&self) -> u32 {
    // FIXME what if this overflows?
    self.vek.len() as u32
  }
  pub fn push(&mut self, item: Ty) {
    // FIXME what if this overflows?
    self.vek.push(item);
  }
  pub fn resize(&mut self, new_len: u32, value: Ty) {
    self.vek.resize(new_len as usize, value);
  }
  pub fn range(&self) -> Range<TyIx> {
    Range::new(TyIx::zero(), self.len() as usize)
  }
  pub fn elems(&self) -> &[Ty] {
    &self.vek[..]
  }
}

impl<TyIx, Ty> Index<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  type Output = Ty;
  fn index(&self, ix: TyIx) -> &Ty {
    &self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> IndexMut<TyIx> for TypedIxVec<TyIx, Ty>
where
  TyIx: Into<u32>,
{
  fn index_mut(&mut self, ix: TyIx) -> &mut Ty {
    &mut self.vek[ix.into() as usize]
  }
}

impl<TyIx, Ty> Clone for TypedIxVec<TyIx, Ty>
where
  Ty: Clone,
{
  // This is only needed for debug printing.
  fn clone(&self) -> Self {
    Self { vek: self.vek.clone(), ty_ix: PhantomData::<TyIx> }
  }
}

impl<TyIx, Ty: fmt::Debug> fmt::Debug for TypedIxVec<TyIx, Ty> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?}", self.vek)
  }
}

//=============================================================================

macro_rules! generate_boilerplate {
  ($TypeIx:ident, $Type:ident, $PrintingPrefix:expr) => {
    #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
    // Firstly, the indexing type (TypeIx)
    pub enum $TypeIx {
      $TypeIx(u32),
    }
    impl $TypeIx {
      #[allow(dead_code)]
      #[inline(always)]
      pub fn new(n: u32) -> Self {
        debug_assert!(n != u32::max_value());
        Self::$TypeIx(n)
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub const fn max_value() -> Self {
        Self::$TypeIx(u32::max_value() - 1)
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub const fn min_value() -> Self {
        Self::$TypeIx(u32::min_value())
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn get(self) -> u32 {
        let $TypeIx::$TypeIx(n) = self;
        n
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn plus(self, delta: u32) -> $TypeIx {
        let $TypeIx::$TypeIx(n) = self;
        Self::$TypeIx(n + delta)
      }
      #[allow(dead_code)]
      #[inline(always)]
      pub fn minus(self, delta: u32) -> $TypeIx {
        let $TypeIx::$TypeIx(n) = self;
        Self::$TypeIx(n - delta)
      }
      #[allow(dead_code)]
      pub fn dotdot(&self, last_plus1: $TypeIx) -> Range<$TypeIx> {
        let len = (last_plus1.get() - self.get()) as usize;
        Range::new(*self, len)
      }
    }
    impl fmt::Debug for $TypeIx {
      fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}{}", $PrintingPrefix, &self.get())
      }
    }
    impl PlusN for $TypeIx {
      #[inline(always)]
      fn plus_n(&self, n: usize) -> Self {
        self.plus(n as u32)
      }
    }
    impl Into<u32> for $TypeIx {
      #[inline(always)]
      fn into(self) -> u32 {
        self.get()
      }
    }
    impl Zero for $TypeIx {
      #[inline(always)]
      fn zero() -> Self {
        $TypeIx::new(0)
      }
    }
  };
}

generate_boilerplate!(InstIx, Inst, "i");

generate_boilerplate!(BlockIx, Block, "b");

generate_boilerplate!(NodeIx, DepNode, "n");

generate_boilerplate!(EdgeIx, DepLink, "e");

generate_boilerplate!(CdgEdgeIx, CdgEdge, "cd");

generate_boilerplate!(RegionIx, CdgRegion, "rg");

//=============================================================================
// Registers

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum RegClass {
  I64 = 0,
  F64 = 1,
  Flags = 2,
}

pub const NUM_REG_CLASSES: usize = 3;

impl RegClass {
  #[inline(always)]
  pub fn rc_to_u32(self) -> u32 {
    self as u32
  }
  #[inline(always)]
  pub fn rc_to_usize(self) -> usize {
    self as usize
  }
  #[inline(always)]
  pub fn rc_from_u32(rc: u32) -> RegClass {
    match rc {
      0 => RegClass::I64,
      1 => RegClass::F64,
      2 => RegClass::Flags,
      _ => panic!("RegClass::rc_from_u32"),
    }
  }
  pub fn short_name(self) -> &'static str {
    match self {
      RegClass::I64 => "I",
      RegClass::F64 => "F",
      RegClass::Flags => "C",
    }
  }
  pub fn all() -> [RegClass; NUM_REG_CLASSES] {
    [RegClass::I64, RegClass::F64, RegClass::Flags]
  }
}

// Reg represents both real and virtual registers.  For compactness and
// speed, these fields are packed into a single u32.  The format is:
//
// Virtual Reg:   1  rc:3                index:28
// Real Reg:      0  rc:3  uu:20         index:8
//
// |rc| is the register class.  |uu| means "unused".  |index| is the
// hardware number for real registers and the client's numbering for
// virtual ones.

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Reg {
  bits: u32,
}

static INVALID_REG: u32 = 0xffffffff;

impl Reg {
  pub fn is_virtual(self) -> bool {
    self.is_valid() && (self.bits & 0x8000_0000) != 0
  }
  pub fn is_real(self) -> bool {
    self.is_valid() && (self.bits & 0x8000_0000) == 0
  }
  pub fn new_real(rc: RegClass, index: u8) -> Self {
    let n = (0 << 31) | (rc.rc_to_u32() << 28) | (index as u32);
    Reg { bits: n }
  }
  pub fn new_virtual(rc: RegClass, index: u32) -> Self {
    if index >= (1 << 28) {
      panic!("new_virtual(): index too large");
    }
    let n = (1 << 31) | (rc.rc_to_u32() << 28) | (index << 0);
    Reg { bits: n }
  }
  pub fn invalid() -> Reg {
    Reg { bits: INVALID_REG }
  }
  pub fn is_invalid(self) -> bool {
    self.bits == INVALID_REG
  }
  pub fn is_valid(self) -> bool {
    !self.is_invalid()
  }
  pub fn get_class(self) -> RegClass {
    debug_assert!(self.is_valid());
    RegClass::rc_from_u32((self.bits >> 28) & 0x7)
  }
  pub fn get_index(self) -> usize {
    debug_assert!(self.is_valid());
    // Return type is usize because typically we will want to use the
    // result for indexing into a Vec
    if self.is_virtual() {
      (self.bits & ((1 << 28) - 1)) as usize
    } else {
      (self.bits & ((1 << 8) - 1)) as usize
    }
  }
}

impl fmt::Debug for Reg {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    if self.is_invalid() {
      return write!(fmt, "<invalid>");
    }
    if self.is_virtual() {
      return write!(
        fmt,
        "v{}{}",
        self.get_index(),
        self.get_class().short_name()
      );
    }
    match self.get_class() {
      RegClass::I64 if self.get_index() == 31 => write!(fmt, "sp"),
      RegClass::I64 => write!(fmt, "x{}", self.get_index()),
      RegClass::F64 => write!(fmt, "d{}", self.get_index()),
      RegClass::Flags => write!(fmt, "nzcv"),
    }
  }
}

/// Per-register-class counters, used for register pressure.
pub type PerClass<T> = [T; NUM_REG_CLASSES];

#[test]
fn reg_packing() {
  let x3 = Reg::new_real(RegClass::I64, 3);
  assert!(x3.is_real());
  assert_eq!(x3.get_class(), RegClass::I64);
  assert_eq!(x3.get_index(), 3);
  assert_eq!(format!("{:?}", x3), "x3");

  let v = Reg::new_virtual(RegClass::F64, 1000);
  assert!(v.is_virtual());
  assert_eq!(v.get_class(), RegClass::F64);
  assert_eq!(v.get_index(), 1000);
  assert_eq!(format!("{:?}", v), "v1000F");

  assert_eq!(format!("{:?}", Reg::new_real(RegClass::I64, 31)), "sp");
  assert_ne!(Reg::new_real(RegClass::I64, 3), Reg::new_virtual(RegClass::I64, 3));
}

#[test]
fn set_ops() {
  let mut a = Set::from_vec(vec![BlockIx::new(1), BlockIx::new(2)]);
  let b = Set::two(BlockIx::new(2), BlockIx::new(3));
  assert!(a.intersects(&b));
  a.union(&b);
  assert_eq!(a.to_vec(), vec![BlockIx::new(1), BlockIx::new(2), BlockIx::new(3)]);
  a.intersect(&b);
  assert!(a.equals(&b));
  assert!(a.is_subset_of(&b));
}
