/* -*- Mode: Rust; tab-width: 8; indent-tabs-mode: nil; rust-indent-offset: 2 -*-
 * vim: set ts=8 sts=2 et sw=2 tw=80:
*/

//! Main file / top-level module for the insnsched library.

// Make the analysis module public for fuzzing.
#[cfg(feature = "fuzzing")]
pub mod analysis;
#[cfg(not(feature = "fuzzing"))]
mod analysis;

#[cfg(feature = "fuzzing")]
pub mod brute_force;

mod aarch64;
mod cdg;
mod checker;
mod control_dep;
mod data_dep;
mod data_dep_base;
mod data_structures;
mod dep_graph;
mod inst_stream;
mod interface;
mod list_sched;
mod machine;
mod reg_pressure;
mod schedule;

#[cfg(test)]
mod test_func;

pub use crate::interface::*;
