//! Fixplex - fixed-precision simplex over machine integers
//!
//! A feasibility solver for systems of linear equalities, interval bounds
//! and pairwise inequalities over unsigned integers modulo `2^BITS`, built
//! for use inside a bit-vector arithmetic decision procedure.
//!
//! ## Core pieces
//! - sparse doubly-indexed tableau with in-place row scaling and combination
//! - parity-aware (Olm-Seidl) pivoting: pivot coefficients must have the
//!   minimal trailing-zeros count of their column so elimination preserves
//!   solutions; even-multiplier eliminations are accepted during row
//!   addition and counted as approximate
//! - feasibility search with a scoring pivot heuristic, deterministic
//!   reservoir tie-breaking, and Bland's rule as anti-cycling fallback
//! - bound propagation over rows (wrapping interval sums) and over
//!   inequalities (a case analysis of `v < w` / `v <= w` on half-open
//!   wrapping intervals), run to a fixpoint
//! - dependency-tracked bounds: every tightening carries a set of caller
//!   identifiers, and conflicts surface as a flat unsat core
//! - LIFO trail with `push`/`pop` backtracking, kept in lock-step with the
//!   dependency store's scopes
//! - offset-row and fixed-value equality inference
//!
//! ## Outcomes
//! `make_feasible` and `propagate_bounds` answer [`Feasibility::Sat`] with
//! an assignment, [`Feasibility::Unsat`] with an unsat core, or
//! [`Feasibility::Unknown`] when the iteration budget, the cancel flag, or
//! a pivot dead-end stopped the search; an outer layer completes the
//! search in that case.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod eqs;
pub mod matrix;
mod propagate;
pub mod solver;
mod varset;

pub use eqs::VarEq;
pub use fixplex_core::{DepRef, DepStore, ModInterval, Numeral, NumeralError};
pub use matrix::{RowId, SparseMatrix, Var};
pub use solver::{
    CancelFlag, Feasibility, Fixplex, FixplexConfig, FixplexError, FixplexStats, Ineq,
    PivotStrategy,
};
