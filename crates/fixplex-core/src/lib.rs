//! Fixplex core - ring arithmetic and dependency tracking
//!
//! Leaf building blocks for the fixed-precision simplex solver:
//! - machine-width numerals modulo `2^BITS` with parity (trailing-zeros)
//!   and odd-inverse operations
//! - half-open wrapping intervals with sound over-approximating arithmetic
//! - a backtrackable store of dependency sets for unsat-core extraction
//!
//! Nothing in this crate knows about tableaux or rows; the solver crate
//! builds on these pieces.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deps;
pub mod interval;
pub mod numeral;

pub use deps::{DepRef, DepStore};
pub use interval::ModInterval;
pub use numeral::{Numeral, NumeralError};
