//! Fixed-precision simplex tableau over machine-width unsigned integers.
//!
//! Maintains a sparse system of row equalities `Σ c_i · v_i = 0 (mod 2^BITS)`
//! together with per-variable wrapping intervals and pairwise inequalities,
//! and searches for an assignment satisfying all of them. Pivoting follows
//! the Olm-Seidl parity condition: a pivot coefficient must have the minimal
//! trailing-zeros count of its column so that row elimination preserves the
//! solution set. Eliminations that would need an even multiplier are
//! accepted during row addition but counted as approximate.
//!
//! Feasibility search patches one out-of-bounds base variable at a time,
//! falling back to Bland's smallest-index rule once the same variable keeps
//! reappearing. Every bound change is trailed and undone by `pop`, with the
//! dependency store's scopes kept in lock-step.

use crate::eqs::{FixEntry, VarEq};
use crate::matrix::{RowId, SparseMatrix, Var};
use crate::varset::VarSet;
use fixplex_core::{DepRef, DepStore, ModInterval, Numeral, NumeralError};
use hashbrown::{HashMap, HashSet};
use num_rational::BigRational;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a feasibility or propagation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// An assignment satisfying all rows, bounds and inequalities exists
    /// (and is exposed through the value accessors).
    Sat,
    /// The constraints are unsatisfiable; see `unsat_core`.
    Unsat,
    /// The search gave up (budget, cancellation, or a row it cannot patch).
    Unknown,
}

impl fmt::Display for Feasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feasibility::Sat => write!(f, "sat"),
            Feasibility::Unsat => write!(f, "unsat"),
            Feasibility::Unknown => write!(f, "unknown"),
        }
    }
}

/// Recoverable API-misuse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixplexError {
    /// The designated base variable already solves another row.
    #[error("{0} is already the base variable of another row")]
    AlreadyBasic(Var),
    /// The designated base variable has coefficient zero in the new row.
    #[error("{0} has coefficient zero in the row it is meant to solve")]
    ZeroBaseCoefficient(Var),
    /// A rational coefficient has no image in the ring.
    #[error(transparent)]
    Numeral(#[from] NumeralError),
}

/// Strategy for choosing which out-of-bounds base variable to patch next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PivotStrategy {
    /// Smallest variable index first.
    #[default]
    Smallest,
    /// Smallest distance to the violated interval first.
    LeastError,
    /// Greatest distance to the violated interval first.
    GreatestError,
}

/// Tunables for the feasibility search.
#[derive(Debug, Clone)]
pub struct FixplexConfig {
    /// Iteration budget for a single `make_feasible` call.
    pub max_iterations: u64,
    /// Repeated-selection count after which Bland's rule engages.
    pub blands_threshold: u32,
    /// Seed for the deterministic tie-breaking source.
    pub seed: u64,
    /// Patch-selection strategy.
    pub strategy: PivotStrategy,
}

impl Default for FixplexConfig {
    fn default() -> Self {
        FixplexConfig {
            max_iterations: u64::MAX,
            blands_threshold: 1000,
            seed: 0,
            strategy: PivotStrategy::Smallest,
        }
    }
}

/// Solver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixplexStats {
    /// Number of pivot operations.
    pub pivots: u64,
    /// Number of infeasible rows reported.
    pub infeasible: u64,
    /// Number of `make_feasible` calls.
    pub checks: u64,
    /// Rows currently not solved exactly over the integers (gauge).
    pub non_integral_rows: u64,
    /// Row additions whose re-reduction needed an even multiplier.
    pub approx_row_additions: u64,
}

/// Cooperative cancellation flag shared with the caller.
///
/// The feasibility loop polls the flag between iterations and returns
/// `Unknown` once it is raised.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, unraised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Lower the flag again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A pairwise inequality `v < w` (strict) or `v <= w`.
#[derive(Debug, Clone, Copy)]
pub struct Ineq {
    /// Left-hand variable.
    pub v: Var,
    /// Right-hand variable.
    pub w: Var,
    /// Caller-supplied dependency identifier.
    pub dep: u32,
    /// Strict comparison?
    pub strict: bool,
    pub(crate) active: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct VarInfo<N> {
    pub(crate) value: N,
    pub(crate) interval: ModInterval<N>,
    pub(crate) lo_dep: Option<DepRef>,
    pub(crate) hi_dep: Option<DepRef>,
    pub(crate) is_base: bool,
    pub(crate) base_row: u32,
    // a lossy elimination left this variable behind in other rows; its
    // column may legitimately be non-empty when its own row is deleted
    pub(crate) lossy_elim: bool,
}

impl<N: Numeral> Default for VarInfo<N> {
    fn default() -> Self {
        VarInfo {
            value: N::zero(),
            interval: ModInterval::free(),
            lo_dep: None,
            hi_dep: None,
            is_base: false,
            base_row: 0,
            lossy_elim: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RowInfo<N> {
    pub(crate) base: Option<Var>,
    pub(crate) base_coeff: N,
    pub(crate) value: N,
    pub(crate) integral: bool,
}

impl<N: Numeral> RowInfo<N> {
    fn dead() -> Self {
        RowInfo {
            base: None,
            base_coeff: N::zero(),
            value: N::zero(),
            integral: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StashedBound<N> {
    var: Var,
    value: N,
    interval: ModInterval<N>,
    lo_dep: Option<DepRef>,
    hi_dep: Option<DepRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrailEntry {
    PushScope,
    SetBound,
    AddRow,
    AddIneq,
}

/// The modular simplex solver.
pub struct Fixplex<N: Numeral> {
    pub(crate) matrix: SparseMatrix<N>,
    pub(crate) vars: Vec<VarInfo<N>>,
    pub(crate) rows: Vec<RowInfo<N>>,
    pub(crate) to_patch: VarSet,
    pub(crate) deps: DepStore,
    trail: Vec<TrailEntry>,
    stashed_bounds: Vec<StashedBound<N>>,
    row_trail: Vec<Var>,
    pub(crate) ineqs: Vec<Ineq>,
    var2ineqs: Vec<Vec<u32>>,
    pub(crate) ineqs_to_check: Vec<u32>,
    pub(crate) unsat_core: Vec<u32>,
    pub(crate) infeasible: bool,
    pub(crate) var_eqs: Vec<VarEq>,
    pub(crate) value2fixed: HashMap<N, FixEntry>,
    left_basis: HashSet<Var>,
    bland: bool,
    rng: ChaCha8Rng,
    config: FixplexConfig,
    pub(crate) stats: FixplexStats,
    cancel: CancelFlag,
}

impl<N: Numeral> Default for Fixplex<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Numeral> Fixplex<N> {
    /// Create a solver with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FixplexConfig::default())
    }

    /// Create a solver with the given configuration.
    pub fn with_config(config: FixplexConfig) -> Self {
        Fixplex {
            matrix: SparseMatrix::new(),
            vars: Vec::new(),
            rows: Vec::new(),
            to_patch: VarSet::new(),
            deps: DepStore::new(),
            trail: Vec::new(),
            stashed_bounds: Vec::new(),
            row_trail: Vec::new(),
            ineqs: Vec::new(),
            var2ineqs: Vec::new(),
            ineqs_to_check: Vec::new(),
            unsat_core: Vec::new(),
            infeasible: false,
            var_eqs: Vec::new(),
            value2fixed: HashMap::new(),
            left_basis: HashSet::new(),
            bland: false,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            stats: FixplexStats::default(),
            cancel: CancelFlag::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors

    /// Number of allocated variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Current value of `v`.
    pub fn value(&self, v: Var) -> N {
        self.vars[v.index()].value
    }

    /// Current value of `v` as a rational.
    pub fn get_value(&self, v: Var) -> BigRational {
        self.value(v).to_rational()
    }

    /// Current interval of `v`.
    pub fn bounds(&self, v: Var) -> ModInterval<N> {
        self.vars[v.index()].interval
    }

    /// The most recently recorded unsatisfiable core, as the caller's
    /// dependency identifiers.
    pub fn unsat_core(&self) -> &[u32] {
        &self.unsat_core
    }

    /// Implied variable equalities accumulated by `propagate_eqs` and the
    /// fixed-value table.
    pub fn var_equalities(&self) -> &[VarEq] {
        &self.var_eqs
    }

    /// Counter readout.
    pub fn stats(&self) -> &FixplexStats {
        &self.stats
    }

    /// Handle for cooperative cancellation of long feasibility runs.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Are all variables inside their intervals?
    pub fn is_feasible(&self) -> bool {
        (0..self.vars.len()).all(|i| self.in_bounds(Var(i as u32)))
    }

    pub(crate) fn lo(&self, v: Var) -> N {
        self.vars[v.index()].interval.lo
    }

    pub(crate) fn hi(&self, v: Var) -> N {
        self.vars[v.index()].interval.hi
    }

    pub(crate) fn is_base(&self, v: Var) -> bool {
        self.vars[v.index()].is_base
    }

    pub(crate) fn is_fixed(&self, v: Var) -> bool {
        self.vars[v.index()].interval.is_fixed()
    }

    pub(crate) fn is_free(&self, v: Var) -> bool {
        self.vars[v.index()].interval.is_free()
    }

    pub(crate) fn in_bounds(&self, v: Var) -> bool {
        self.vars[v.index()].interval.contains(self.vars[v.index()].value)
    }

    pub(crate) fn base2row(&self, v: Var) -> RowId {
        debug_assert!(self.is_base(v));
        RowId(self.vars[v.index()].base_row)
    }

    // ------------------------------------------------------------------
    // Variables and bounds

    /// Idempotently allocate variables up to and including `v`.
    pub fn ensure_var(&mut self, v: Var) {
        while self.vars.len() <= v.index() {
            self.matrix.ensure_var(Var(self.vars.len() as u32));
            self.vars.push(VarInfo::default());
        }
    }

    /// Intersect `v`'s interval with `[lo, hi)`, attaching `dep` to the
    /// endpoints that moved. Re-patches or moves `v` if its value fell
    /// outside the new interval.
    pub fn set_bounds(&mut self, v: Var, lo: N, hi: N, dep: u32) {
        self.ensure_var(v);
        let was_fixed = self.is_fixed(v);
        let leaf = Some(self.deps.leaf(dep));
        self.update_bounds(v, lo, hi, leaf);
        if self.vars[v.index()].interval.is_empty() {
            self.conflict_empty_bound(v, leaf);
            return;
        }
        if !was_fixed && self.is_fixed(v) {
            self.fixed_var_eh(None, v);
        }
        if self.in_bounds(v) {
            return;
        }
        if self.is_base(v) {
            self.add_patch(v);
        } else {
            let delta = self.value2delta(v, self.value(v));
            self.update_value(v, delta);
        }
    }

    /// Fix `v` to the single value `val`.
    pub fn set_value(&mut self, v: Var, val: N, dep: u32) {
        self.set_bounds(v, val, val.wrapping_add(&N::one()), dep);
    }

    pub(crate) fn update_bounds(&mut self, v: Var, lo: N, hi: N, dep: Option<DepRef>) {
        let vi = &self.vars[v.index()];
        self.stashed_bounds.push(StashedBound {
            var: v,
            value: vi.value,
            interval: vi.interval,
            lo_dep: vi.lo_dep,
            hi_dep: vi.hi_dep,
        });
        self.trail.push(TrailEntry::SetBound);
        let old = self.vars[v.index()].interval;
        let new = old & ModInterval::new(lo, hi);
        self.vars[v.index()].interval = new;
        if old.lo != new.lo {
            self.vars[v.index()].lo_dep = dep;
        }
        if old.hi != new.hi {
            self.vars[v.index()].hi_dep = dep;
        }
        if new != old {
            self.touch_var(v);
        }
    }

    /// Record a conflict for a bound update that emptied `x`'s interval:
    /// the join of the pre-update endpoint dependencies with the
    /// dependency of the update itself.
    pub(crate) fn conflict_empty_bound(&mut self, x: Var, dep: Option<DepRef>) {
        let st = self.stashed_bounds.last().expect("bound was just stashed");
        debug_assert_eq!(st.var, x);
        let (a, b) = (st.lo_dep, st.hi_dep);
        let joined = self.deps.join(a, b);
        self.conflict2(joined, dep);
    }

    fn restore_bound(&mut self) {
        let b = self.stashed_bounds.pop().expect("bound trail underflow");
        let vi = &mut self.vars[b.var.index()];
        vi.interval = b.interval;
        vi.lo_dep = b.lo_dep;
        vi.hi_dep = b.hi_dep;
        if !vi.is_base && vi.value != b.value {
            let delta = b.value.wrapping_sub(&vi.value);
            self.update_value(b.var, delta);
        }
    }

    /// Compute the delta moving `value` onto the nearest endpoint of `v`'s
    /// interval. Precondition: the current value of `v` is out of bounds.
    fn value2delta(&self, v: Var, value: N) -> N {
        debug_assert!(!self.in_bounds(v));
        debug_assert!(self.lo(v) != self.hi(v));
        if self.lo(v).wrapping_sub(&value) < value.wrapping_sub(&self.hi(v)) {
            self.lo(v).wrapping_sub(&value)
        } else {
            self.hi(v).wrapping_sub(&value).wrapping_sub(&N::one())
        }
    }

    fn value2error(&self, v: Var, value: N) -> N {
        if self.in_bounds(v) {
            return N::zero();
        }
        debug_assert!(self.lo(v) != self.hi(v));
        if self.lo(v).wrapping_sub(&value) < value.wrapping_sub(&self.hi(v)) {
            self.lo(v).wrapping_sub(&value)
        } else {
            value.wrapping_sub(&self.hi(v)).wrapping_sub(&N::one())
        }
    }

    // ------------------------------------------------------------------
    // Rows

    /// Install the equality `Σ coeff · var = 0` solved for `base`.
    ///
    /// `base` must not already be basic and must carry a non-zero
    /// coefficient. Variables of the new row that are base of other rows
    /// are eliminated from those rows; if any such elimination needs an
    /// even multiplier the addition is counted as approximate.
    pub fn add_row(&mut self, base: Var, entries: &[(Var, N)]) -> Result<RowId, FixplexError> {
        for &(v, _) in entries {
            self.ensure_var(v);
        }
        self.ensure_var(base);
        if self.is_base(base) {
            return Err(FixplexError::AlreadyBasic(base));
        }
        let r = self.matrix.mk_row();
        for &(v, c) in entries {
            if !c.is_zero() {
                self.matrix.add_var(r, c, v);
            }
        }
        let mut base_coeff = N::zero();
        let mut value = N::zero();
        let mut old_bases: Vec<Var> = Vec::new();
        for (v, c) in self.matrix.row_entries(r) {
            if v == base {
                base_coeff = c;
            } else {
                if self.is_base(v) {
                    old_bases.push(v);
                }
                value = value.wrapping_add(&c.wrapping_mul(&self.vars[v.index()].value));
            }
        }
        if base_coeff.is_zero() {
            self.matrix.del_row(r);
            return Err(FixplexError::ZeroBaseCoefficient(base));
        }
        while self.rows.len() <= r.index() {
            self.rows.push(RowInfo::dead());
        }
        self.rows[r.index()] = RowInfo {
            base: Some(base),
            base_coeff,
            value,
            integral: true,
        };
        self.vars[base.index()].base_row = r.0;
        self.vars[base.index()].is_base = true;
        self.set_base_value(base);
        self.add_patch(base);
        if !self.pivot_base_vars(&old_bases) {
            self.stats.approx_row_additions += 1;
        }
        debug_assert!(self.well_formed_row(r));
        debug_assert!(self.well_formed());
        self.trail.push(TrailEntry::AddRow);
        self.row_trail.push(base);
        Ok(r)
    }

    /// `add_row` with rational coefficients, reduced into the ring.
    pub fn add_row_rational(
        &mut self,
        base: Var,
        entries: &[(Var, BigRational)],
    ) -> Result<RowId, FixplexError> {
        let converted = entries
            .iter()
            .map(|(v, q)| Ok((*v, N::from_rational(q)?)))
            .collect::<Result<Vec<_>, NumeralError>>()?;
        self.add_row(base, &converted)
    }

    fn pivot_base_vars(&mut self, old_bases: &[Var]) -> bool {
        let mut ok = true;
        for &v in old_bases {
            if !self.elim_base(v) {
                ok = false;
            }
        }
        ok
    }

    /// Eliminate base variable `v` from every row except its own.
    /// Returns false as soon as an elimination is lossy.
    fn elim_base(&mut self, v: Var) -> bool {
        debug_assert!(self.is_base(v));
        let r = self.base2row(v);
        let b = self.rows[r.index()].base_coeff;
        let tz_b = b.trailing_zeros();
        let value_v = self.value(v);
        let cols: Vec<(RowId, N)> = self.matrix.col_entries(v).collect();
        for (rz, c) in cols {
            if rz == r {
                continue;
            }
            let lossless = self.eliminate_var(r, rz, c, tz_b, value_v);
            if let Some(z) = self.rows[rz.index()].base {
                self.add_patch(z);
            }
            if !lossless {
                self.vars[v.index()].lossy_elim = true;
                return false;
            }
        }
        true
    }

    /// Remove the row owning `var`. If `var` is not basic, it is first
    /// pivoted into the row of its column with minimal coefficient parity,
    /// moving that row's old base variable onto the nearest endpoint of its
    /// interval.
    pub fn del_row(&mut self, var: Var) {
        let r = if self.is_base(var) {
            self.base2row(var)
        } else {
            let mut best: Option<(RowId, N)> = None;
            let mut tz = u32::MAX;
            for (cr, c) in self.matrix.col_entries(var) {
                let tzc = c.trailing_zeros();
                if tzc < tz {
                    best = Some((cr, c));
                    tz = tzc;
                    if tz == 0 {
                        break;
                    }
                }
            }
            let Some((row, coeff)) = best else {
                return;
            };
            let old_base = self.rows[row.index()].base.expect("live row has a base");
            let vi = &self.vars[old_base.index()];
            let new_value = if vi.interval.is_empty() {
                vi.value
            } else {
                vi.interval.closest_value(vi.value)
            };
            self.pivot(old_base, var, coeff, new_value);
            debug_assert!(self.is_base(var));
            debug_assert_eq!(self.base2row(var), row);
            row
        };
        self.del_row_inner(r);
    }

    fn del_row_inner(&mut self, r: RowId) {
        self.var_eqs.clear();
        let var = self.rows[r.index()].base.expect("deleting a dead row");
        self.vars[var.index()].is_base = false;
        self.vars[var.index()].interval = ModInterval::free();
        self.rows[r.index()].base = None;
        if !self.rows[r.index()].integral {
            self.stats.non_integral_rows -= 1;
            self.rows[r.index()].integral = true;
        }
        self.matrix.del_row(r);
        debug_assert!(
            self.vars[var.index()].lossy_elim || self.matrix.column_is_empty(var)
        );
        debug_assert!(self.well_formed());
    }

    /// Add `delta` to the value of non-basic `v`, updating the cached value
    /// of every row containing it and recomputing the affected base values.
    pub(crate) fn update_value(&mut self, v: Var, delta: N) {
        if delta.is_zero() {
            return;
        }
        debug_assert!(!self.is_base(v));
        self.vars[v.index()].value = self.vars[v.index()].value.wrapping_add(&delta);
        self.touch_var(v);
        let cols: Vec<(RowId, N)> = self.matrix.col_entries(v).collect();
        for (r, c) in cols {
            let s = self.rows[r.index()].base.expect("occupied row has a base");
            self.rows[r.index()].value =
                self.rows[r.index()].value.wrapping_add(&delta.wrapping_mul(&c));
            self.set_base_value(s);
            self.add_patch(s);
        }
    }

    /// Solve `c · x + row_value = 0` for `x`, exactly for `c = ±1` and as a
    /// guiding approximation otherwise.
    pub(crate) fn solve_for(row_value: N, c: N) -> N {
        if c.is_one() {
            return row_value.wrapping_neg();
        }
        if c.wrapping_add(&N::one()).is_zero() {
            return row_value;
        }
        if c.wrapping_neg() < c {
            return row_value / c.wrapping_neg();
        }
        (row_value / c).wrapping_neg()
    }

    fn is_solved(&self, r: RowId) -> bool {
        let ri = &self.rows[r.index()];
        let base = ri.base.expect("solved test on a dead row");
        self.value(base)
            .wrapping_mul(&ri.base_coeff)
            .wrapping_add(&ri.value)
            .is_zero()
    }

    pub(crate) fn set_base_value(&mut self, x: Var) {
        debug_assert!(self.is_base(x));
        let r = self.base2row(x);
        let value = Self::solve_for(self.rows[r.index()].value, self.rows[r.index()].base_coeff);
        self.vars[x.index()].value = value;
        self.touch_var(x);
        let was_integral = self.rows[r.index()].integral;
        let solved = self.is_solved(r);
        self.rows[r.index()].integral = solved;
        if was_integral && !solved {
            self.stats.non_integral_rows += 1;
        } else if !was_integral && solved {
            self.stats.non_integral_rows -= 1;
        }
    }

    pub(crate) fn add_patch(&mut self, v: Var) {
        debug_assert!(self.is_base(v));
        if !self.in_bounds(v) {
            self.to_patch.insert(v);
        }
    }

    // ------------------------------------------------------------------
    // Pivoting

    /// Swap base variable `x` of its row for non-basic `y` (with
    /// coefficient `b`), assigning `x := new_value`, and eliminate `y`
    /// from every other row.
    pub(crate) fn pivot(&mut self, x: Var, y: Var, b: N, new_value: N) {
        self.stats.pivots += 1;
        debug_assert!(self.is_base(x));
        debug_assert!(!self.is_base(y));
        let rx = self.base2row(x);
        let a = self.rows[rx.index()].base_coeff;
        let old_value_y = self.value(y);
        let row = &mut self.rows[rx.index()];
        row.base = Some(y);
        row.value = row
            .value
            .wrapping_sub(&b.wrapping_mul(&old_value_y))
            .wrapping_add(&a.wrapping_mul(&new_value));
        row.base_coeff = b;
        self.vars[y.index()].base_row = rx.0;
        self.vars[y.index()].is_base = true;
        self.set_base_value(y);
        self.vars[x.index()].is_base = false;
        self.vars[x.index()].value = new_value;
        self.touch_var(x);
        self.add_patch(y);
        debug_assert!(self.well_formed_row(rx));

        let tz_b = b.trailing_zeros();
        let cols: Vec<(RowId, N)> = self.matrix.col_entries(y).collect();
        for (rz, c) in cols {
            if rz == rx {
                continue;
            }
            let _lossless = self.eliminate_var(rx, rz, c, tz_b, old_value_y);
            debug_assert!(_lossless, "pivot selection admitted a lossy elimination");
            if let Some(z) = self.rows[rz.index()].base {
                self.add_patch(z);
            }
        }
        debug_assert!(self.well_formed());
    }

    /// Eliminate the base variable of `r_y` from `r_z` by the parity-aware
    /// row combination `r_z := b1 · r_z + c1 · r_y`. Returns true iff the
    /// combination is lossless (`tz(b) <= tz(c)`).
    pub(crate) fn eliminate_var(
        &mut self,
        r_y: RowId,
        r_z: RowId,
        c: N,
        tz_b: u32,
        old_value_y: N,
    ) -> bool {
        let b = self.rows[r_y.index()].base_coeff;
        let z = self.rows[r_z.index()].base.expect("eliminating into a dead row");
        let tz_c = c.trailing_zeros();
        let (b1, c1) = if tz_b <= tz_c {
            (
                b.unsigned_shr(tz_b),
                c.unsigned_shr(tz_c - tz_b).wrapping_neg(),
            )
        } else {
            (
                b.unsigned_shr(tz_b - tz_c),
                c.unsigned_shr(tz_c).wrapping_neg(),
            )
        };
        self.matrix.mul(r_z, b1);
        self.matrix.add(r_z, c1, r_y);
        let ry_value = self.rows[r_y.index()].value;
        let rz = &mut self.rows[r_z.index()];
        rz.value = b1
            .wrapping_mul(&rz.value.wrapping_sub(&c.wrapping_mul(&old_value_y)))
            .wrapping_add(&c1.wrapping_mul(&ry_value));
        rz.base_coeff = rz.base_coeff.wrapping_mul(&b1);
        self.set_base_value(z);
        debug_assert!(self.well_formed_row(r_z));
        tz_b <= tz_c
    }

    // ------------------------------------------------------------------
    // Feasibility search

    /// Search for an assignment satisfying all rows, bounds and
    /// inequalities, patching out-of-bounds base variables one at a time.
    pub fn make_feasible(&mut self) -> Feasibility {
        self.stats.checks += 1;
        if self.infeasible {
            return Feasibility::Unsat;
        }
        self.left_basis.clear();
        self.bland = false;
        let mut num_iterations: u64 = 0;
        let mut num_repeated: u32 = 0;
        debug_assert!(self.well_formed());
        while let Some(v) = self.select_var_to_fix() {
            if self.cancel.is_cancelled() || num_iterations > self.config.max_iterations {
                self.to_patch.insert(v);
                return Feasibility::Unknown;
            }
            self.check_blands_rule(v, &mut num_repeated);
            match self.make_var_feasible(v) {
                Feasibility::Sat => num_iterations += 1,
                Feasibility::Unsat => {
                    self.to_patch.insert(v);
                    self.set_infeasible_base(v);
                    self.stats.infeasible += 1;
                    return Feasibility::Unsat;
                }
                Feasibility::Unknown => {
                    self.to_patch.insert(v);
                    if self.ineqs_are_violated() {
                        return Feasibility::Unsat;
                    }
                    return Feasibility::Unknown;
                }
            }
        }
        debug_assert!(self.well_formed());
        if self.ineqs_are_violated() {
            return Feasibility::Unsat;
        }
        if self.ineqs_are_satisfied() {
            return Feasibility::Sat;
        }
        Feasibility::Unknown
    }

    /// Try to move `x` inside its interval by pivoting against a suitable
    /// variable of its row.
    fn make_var_feasible(&mut self, x: Var) -> Feasibility {
        if self.in_bounds(x) {
            return Feasibility::Sat;
        }
        if self.vars[x.index()].interval.is_empty() {
            return Feasibility::Unsat;
        }
        let new_value = self.vars[x.index()].interval.closest_value(self.value(x));
        match self.select_pivot(x, new_value) {
            Some((y, b)) => {
                self.pivot(x, y, b, new_value);
                Feasibility::Sat
            }
            None => {
                if self.is_infeasible_row(x) || self.is_parity_infeasible_row(x) {
                    Feasibility::Unsat
                } else {
                    Feasibility::Unknown
                }
            }
        }
    }

    fn select_pivot(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        if self.bland {
            self.select_pivot_blands(x, new_value)
        } else {
            self.select_pivot_core(x, new_value)
        }
    }

    /// Scan `x`'s row for a pivot variable whose coefficient has the
    /// minimal trailing-zeros count of its column, scoring candidates by
    /// (in-bounds, gap, non-free dependents, column size) with reservoir
    /// sampling on plateaus. Returns none when no candidate makes progress
    /// over `x`'s own gap.
    fn select_pivot_core(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        debug_assert!(self.is_base(x));
        let r = self.base2row(x);
        let a = self.rows[r.index()].base_coeff;
        let row_value = self.rows[r.index()]
            .value
            .wrapping_add(&a.wrapping_mul(&new_value));
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        let mut result: Option<(Var, N)> = None;
        let mut n = 0u32;
        let mut best_col_sz = usize::MAX;
        let mut best_so_far = i32::MAX;
        let mut delta_best = N::zero();
        let mut best_in_bounds = false;
        for (y, b) in entries {
            if y == x {
                continue;
            }
            if !self.has_minimal_trailing_zeros(y, b) {
                continue;
            }
            let new_y_value =
                Self::solve_for(row_value.wrapping_sub(&b.wrapping_mul(&self.value(y))), b);
            let in_bounds = self.vars[y.index()].interval.contains(new_y_value);
            let mut delta_y = N::zero();
            if !in_bounds {
                if self.lo(y).wrapping_sub(&new_y_value)
                    < new_y_value.wrapping_sub(&self.hi(y))
                {
                    delta_y = new_y_value.wrapping_sub(&self.lo(y));
                } else {
                    delta_y = new_y_value
                        .wrapping_sub(&self.hi(y))
                        .wrapping_sub(&N::one());
                }
            }
            let num = self.num_non_free_dep_vars(y, best_so_far);
            let col_sz = self.matrix.column_size(y);
            let mut is_improvement = false;
            let mut is_plateau = false;
            if best_so_far == i32::MAX {
                is_improvement = true;
            } else if !best_in_bounds && in_bounds {
                is_improvement = true;
            } else if !best_in_bounds && !in_bounds && delta_y < delta_best {
                is_improvement = true;
            } else if best_in_bounds && in_bounds && num < best_so_far {
                is_improvement = true;
            } else if best_in_bounds && in_bounds && num == best_so_far && col_sz < best_col_sz {
                is_improvement = true;
            } else if !best_in_bounds
                && !in_bounds
                && delta_y == delta_best
                && best_so_far == num
                && col_sz == best_col_sz
            {
                is_plateau = true;
            } else if best_in_bounds && in_bounds && best_so_far == num && col_sz == best_col_sz {
                is_plateau = true;
            }
            if is_improvement {
                result = Some((y, b));
                best_so_far = num;
                best_col_sz = col_sz;
                best_in_bounds = in_bounds;
                delta_best = delta_y;
                n = 1;
            } else if is_plateau {
                n += 1;
                if self.rng.gen_range(0..n) == 0 {
                    result = Some((y, b));
                }
            }
        }
        let best = result?;
        if !best_in_bounds && delta_best >= self.value2delta(x, self.value(x)) {
            return None;
        }
        Some(best)
    }

    /// Bland's rule: the smallest-index row variable whose move keeps the
    /// overall error from growing. Ignores the parity filter.
    fn select_pivot_blands(&mut self, x: Var, new_value: N) -> Option<(Var, N)> {
        debug_assert!(self.is_base(x));
        let r = self.base2row(x);
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        let mut result: Option<(Var, N)> = None;
        for (y, b) in entries {
            if y == x {
                continue;
            }
            if let Some((best, _)) = result {
                if y >= best {
                    continue;
                }
            }
            if self.can_improve(x, new_value, y, b) {
                result = Some((y, b));
            }
        }
        result
    }

    /// Would setting `x := new_x_value` let `y` move without increasing
    /// the overall error?
    fn can_improve(&self, x: Var, new_x_value: N, y: Var, b: N) -> bool {
        let r = self.base2row(x);
        let row_value = self.rows[r.index()]
            .value
            .wrapping_add(&self.rows[r.index()].base_coeff.wrapping_mul(&new_x_value));
        let new_y_value =
            Self::solve_for(row_value.wrapping_sub(&b.wrapping_mul(&self.value(y))), b);
        if self.vars[y.index()].interval.contains(new_y_value) {
            return true;
        }
        self.value2error(y, new_y_value) <= self.value2error(x, self.value(x))
    }

    /// Is `b` a multiple of the smallest power of two among `y`'s
    /// coefficients across all rows?
    fn has_minimal_trailing_zeros(&self, y: Var, b: N) -> bool {
        let tz = b.trailing_zeros();
        if tz == 0 {
            return true;
        }
        self.matrix.col_entries(y).all(|(_, c)| tz <= c.trailing_zeros())
    }

    /// Number of non-free base variables depending on `x_j` (plus one if
    /// `x_j` itself is non-free), cut off once it exceeds `best_so_far`.
    fn num_non_free_dep_vars(&self, x_j: Var, best_so_far: i32) -> i32 {
        let mut result = i32::from(!self.is_free(x_j));
        for (r, _) in self.matrix.col_entries(x_j) {
            if let Some(s) = self.rows[r.index()].base {
                result += i32::from(!self.is_free(s));
            }
            if result > best_so_far {
                return result;
            }
        }
        result
    }

    fn select_var_to_fix(&mut self) -> Option<Var> {
        let strategy = if self.bland {
            PivotStrategy::Smallest
        } else {
            self.config.strategy
        };
        match strategy {
            PivotStrategy::Smallest => self.select_smallest_var(),
            PivotStrategy::LeastError => self.select_error_var(true),
            PivotStrategy::GreatestError => self.select_error_var(false),
        }
    }

    fn select_smallest_var(&mut self) -> Option<Var> {
        loop {
            let v = self.to_patch.iter().min()?;
            self.to_patch.remove(v);
            if self.is_base(v) {
                return Some(v);
            }
        }
    }

    fn select_error_var(&mut self, least: bool) -> Option<Var> {
        let mut best: Option<Var> = None;
        let mut best_error = N::zero();
        for v in self.to_patch.iter() {
            if !self.is_base(v) {
                continue;
            }
            let curr = self.value2error(v, self.value(v));
            if curr.is_zero() {
                continue;
            }
            let better = match best {
                None => true,
                Some(_) => {
                    if least {
                        curr < best_error
                    } else {
                        curr > best_error
                    }
                }
            };
            if better {
                best = Some(v);
                best_error = curr;
            }
        }
        match best {
            None => {
                // every queued variable is satisfied
                self.to_patch.clear();
                None
            }
            Some(v) => {
                self.to_patch.remove(v);
                Some(v)
            }
        }
    }

    fn check_blands_rule(&mut self, v: Var, num_repeated: &mut u32) {
        if self.bland {
            return;
        }
        if !self.left_basis.insert(v) {
            *num_repeated += 1;
            self.bland = *num_repeated > self.config.blands_threshold;
        }
    }

    // ------------------------------------------------------------------
    // Infeasibility tests

    /// Linear infeasibility: the interval sum of the row cannot reach 0.
    pub(crate) fn is_infeasible_row(&self, x: Var) -> bool {
        debug_assert!(self.is_base(x));
        let r = self.base2row(x);
        let mut range = ModInterval::new(N::zero(), N::one());
        for (v, c) in self.matrix.row_entries(r) {
            range += self.vars[v.index()].interval * c;
            if range.is_free() {
                return false;
            }
        }
        !range.contains(N::zero())
    }

    /// Parity infeasibility: the fixed part of the row has fewer trailing
    /// zeros than every non-fixed coefficient can supply. Only meaningful
    /// for rows not already solved exactly.
    pub(crate) fn is_parity_infeasible_row(&self, x: Var) -> bool {
        debug_assert!(self.is_base(x));
        let r = self.base2row(x);
        if self.rows[r.index()].integral {
            return false;
        }
        let mut fixed = N::zero();
        let mut parity = u32::MAX;
        for (v, c) in self.matrix.row_entries(r) {
            if self.is_fixed(v) {
                fixed = fixed.wrapping_add(&self.value(v).wrapping_mul(&c));
            } else {
                parity = parity.min(c.trailing_zeros());
            }
        }
        fixed.trailing_zeros() < parity
    }

    // ------------------------------------------------------------------
    // Inequalities

    /// Install the inequality `v < w` (strict) or `v <= w`, tagged with the
    /// caller's dependency identifier.
    pub fn add_ineq(&mut self, v: Var, w: Var, dep: u32, strict: bool) {
        self.ensure_var(v);
        self.ensure_var(w);
        let idx = self.ineqs.len() as u32;
        let need = v.index().max(w.index()) + 1;
        if self.var2ineqs.len() < need {
            self.var2ineqs.resize_with(need, Vec::new);
        }
        self.var2ineqs[v.index()].push(idx);
        self.var2ineqs[w.index()].push(idx);
        self.ineqs_to_check.push(idx);
        self.trail.push(TrailEntry::AddIneq);
        self.ineqs.push(Ineq {
            v,
            w,
            dep,
            strict,
            active: true,
        });
    }

    fn restore_ineq(&mut self) {
        let ineq = self.ineqs.pop().expect("inequality trail underflow");
        self.var2ineqs[ineq.v.index()].pop();
        self.var2ineqs[ineq.w.index()].pop();
    }

    /// Queue the inequalities watching `v` for re-checking. The active
    /// flag marks an inequality as already queued.
    pub(crate) fn touch_var(&mut self, v: Var) {
        if v.index() >= self.var2ineqs.len() {
            return;
        }
        for i in 0..self.var2ineqs[v.index()].len() {
            let idx = self.var2ineqs[v.index()][i];
            let ineq = &mut self.ineqs[idx as usize];
            if !ineq.active {
                ineq.active = true;
                self.ineqs_to_check.push(idx);
            }
        }
    }

    fn reset_ineqs_to_check(&mut self) {
        let pending = std::mem::take(&mut self.ineqs_to_check);
        for idx in pending {
            if idx as usize >= self.ineqs.len() {
                continue;
            }
            self.ineqs[idx as usize].active = false;
        }
    }

    /// Do the current values satisfy every pending inequality?
    fn ineqs_are_satisfied(&mut self) -> bool {
        for &idx in &self.ineqs_to_check {
            if idx as usize >= self.ineqs.len() {
                continue;
            }
            let ineq = &self.ineqs[idx as usize];
            if ineq.strict && self.value(ineq.v) >= self.value(ineq.w) {
                return false;
            }
            if !ineq.strict && self.value(ineq.v) > self.value(ineq.w) {
                return false;
            }
        }
        self.reset_ineqs_to_check();
        true
    }

    /// Propagate bounds through the pending inequalities; true on conflict.
    /// Tightenings re-queue the inequalities watching the moved variable,
    /// so the sweep runs to a fixpoint (intervals only ever shrink). The
    /// iteration budget and the cancel flag bound the sweep; giving up
    /// reports no conflict.
    pub(crate) fn ineqs_are_violated(&mut self) -> bool {
        let mut i = 0;
        let mut processed: u64 = 0;
        while i < self.ineqs_to_check.len() {
            let idx = self.ineqs_to_check[i] as usize;
            i += 1;
            if idx >= self.ineqs.len() {
                continue;
            }
            if self.cancel.is_cancelled() || processed > self.config.max_iterations {
                return false;
            }
            processed += 1;
            self.ineqs[idx].active = false;
            if !self.propagate_ineq(idx) {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Trail

    /// Open a backtracking scope.
    pub fn push(&mut self) {
        self.trail.push(TrailEntry::PushScope);
        self.deps.push_scope();
    }

    /// Unwind the trail through `n` scope markers, restoring bounds and
    /// dependency handles, deleting rows and dropping inequalities in
    /// reverse insertion order.
    pub fn pop(&mut self, n: usize) {
        debug_assert!(n > 0);
        self.deps.pop_scope(n);
        let mut n = n;
        while n > 0 {
            match self.trail.pop().expect("trail underflow") {
                TrailEntry::PushScope => n -= 1,
                TrailEntry::SetBound => self.restore_bound(),
                TrailEntry::AddRow => {
                    let base = self.row_trail.pop().expect("row trail underflow");
                    self.del_row(base);
                }
                TrailEntry::AddIneq => self.restore_ineq(),
            }
        }
        self.infeasible = false;
        self.unsat_core.clear();
    }

    /// Drop all state, keeping configuration and counters.
    pub fn reset(&mut self) {
        self.matrix.reset();
        self.vars.clear();
        self.rows.clear();
        self.to_patch.clear();
        self.deps.reset();
        self.trail.clear();
        self.stashed_bounds.clear();
        self.row_trail.clear();
        self.ineqs.clear();
        self.var2ineqs.clear();
        self.ineqs_to_check.clear();
        self.unsat_core.clear();
        self.infeasible = false;
        self.var_eqs.clear();
        self.value2fixed.clear();
        self.left_basis.clear();
        self.bland = false;
    }

    // ------------------------------------------------------------------
    // Debug checks

    pub(crate) fn well_formed(&self) -> bool {
        if !self.matrix.well_formed() {
            return false;
        }
        for (i, ri) in self.rows.iter().enumerate() {
            let Some(s) = ri.base else {
                continue;
            };
            if !self.vars[s.index()].is_base || self.vars[s.index()].base_row != i as u32 {
                return false;
            }
            if !self.well_formed_row(RowId(i as u32)) {
                return false;
            }
        }
        for (i, vi) in self.vars.iter().enumerate() {
            let v = Var(i as u32);
            if !vi.is_base && !self.in_bounds(v) && !self.infeasible {
                return false;
            }
        }
        true
    }

    pub(crate) fn well_formed_row(&self, r: RowId) -> bool {
        let ri = &self.rows[r.index()];
        let Some(s) = ri.base else {
            return false;
        };
        if !self.vars[s.index()].is_base || self.vars[s.index()].base_row != r.0 {
            return false;
        }
        let mut sum = N::zero();
        for (v, c) in self.matrix.row_entries(r) {
            sum = sum.wrapping_add(&c.wrapping_mul(&self.value(v)));
            if v == s && c != ri.base_coeff {
                return false;
            }
        }
        if sum >= ri.base_coeff {
            return false;
        }
        sum == ri.value.wrapping_add(&ri.base_coeff.wrapping_mul(&self.value(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Solver = Fixplex<u8>;

    #[test]
    fn add_row_solves_for_base() {
        let mut s = Solver::new();
        // s + x - y = 0 with x = y = 0: s = 0.
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1), (Var(2), 255)])
            .unwrap();
        assert!(s.is_base(Var(0)));
        assert_eq!(s.value(Var(0)), 0);
        assert!(s.well_formed());
    }

    #[test]
    fn add_row_rejects_duplicate_base() {
        let mut s = Solver::new();
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1)]).unwrap();
        let err = s.add_row(Var(0), &[(Var(0), 1), (Var(2), 1)]);
        assert_eq!(err, Err(FixplexError::AlreadyBasic(Var(0))));
    }

    #[test]
    fn add_row_rejects_zero_base_coefficient() {
        let mut s = Solver::new();
        let err = s.add_row(Var(0), &[(Var(1), 1), (Var(2), 1)]);
        assert_eq!(err, Err(FixplexError::ZeroBaseCoefficient(Var(0))));
        assert!(s.well_formed());
    }

    #[test]
    fn chained_rows_eliminate_old_base() {
        let mut s = Solver::new();
        // u solves u + x = 0; then t solves t + u = 0, which must
        // re-reduce through u's row rather than leave u in two rows.
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1)]).unwrap();
        s.add_row(Var(2), &[(Var(2), 1), (Var(0), 1)]).unwrap();
        assert_eq!(s.matrix.column_size(Var(0)), 1);
        assert!(s.well_formed());
    }

    #[test]
    fn solve_for_unit_coefficients() {
        assert_eq!(Solver::solve_for(10, 1), 246);
        assert_eq!(Solver::solve_for(10, 255), 10);
    }

    #[test]
    fn update_value_maintains_rows() {
        let mut s = Solver::new();
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1), (Var(2), 255)])
            .unwrap();
        s.set_bounds(Var(1), 5, 6, 0);
        assert_eq!(s.value(Var(1)), 5);
        // s = y - x = -5
        assert_eq!(s.value(Var(0)), 251);
        assert!(s.well_formed());
    }

    #[test]
    fn del_row_by_non_base_pivots_first() {
        let mut s = Solver::new();
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1), (Var(2), 255)])
            .unwrap();
        s.del_row(Var(1));
        assert!(!s.is_base(Var(0)));
        assert!(s.matrix.column_is_empty(Var(1)));
        assert!(s.well_formed());
    }

    #[test]
    fn lossy_elimination_leaves_residual_column() {
        let mut s = Solver::new();
        let (u, x, t) = (Var(0), Var(1), Var(2));
        // 2u + x = 0, then t + u = 0. Eliminating u from the new row would
        // need multiplying it by an even number, so u stays behind there
        // and the addition is flagged approximate.
        s.add_row(u, &[(u, 2), (x, 1)]).unwrap();
        s.add_row(t, &[(t, 1), (u, 1)]).unwrap();
        assert_eq!(s.stats().approx_row_additions, 1);
        assert!(s.vars[u.index()].lossy_elim);
        assert_eq!(s.matrix.column_size(u), 2);
        // Deleting u's own row tolerates the residual entry in the other.
        s.del_row(u);
        assert!(!s.is_base(u));
        assert!(!s.matrix.column_is_empty(u));
        assert!(s.well_formed());
    }

    #[test]
    fn cancel_flag_aborts_search() {
        let mut s = Solver::new();
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1)]).unwrap();
        s.set_bounds(Var(0), 10, 20, 0);
        s.cancel_flag().cancel();
        assert_eq!(s.make_feasible(), Feasibility::Unknown);
    }

    #[test]
    fn stats_count_checks_and_pivots() {
        let mut s = Solver::new();
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1)]).unwrap();
        s.set_bounds(Var(0), 10, 20, 0);
        assert_eq!(s.make_feasible(), Feasibility::Sat);
        assert_eq!(s.stats().checks, 1);
        assert!(s.stats().pivots >= 1);
    }
}
