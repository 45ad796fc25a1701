//! Bound propagation over rows and pairwise inequalities.
//!
//! Row propagation sums the scaled intervals of a row's variables: with a
//! single free variable the negated sum is a candidate interval for it,
//! otherwise subtracting each variable's own term yields a candidate. Every
//! candidate is applied by intersection, so bounds only ever tighten.
//!
//! Inequality propagation is a case analysis of `v < w` and `v <= w` over
//! half-open wrapping intervals. A few hand-written rules come first; the
//! bulk of each table is derived mechanically from the wrap-around
//! semantics and is best regenerated, not hand-edited. Each tightening
//! joins the inequality's own dependency with the endpoint dependencies it
//! consulted; endpoint values are re-read live after every tightening,
//! while the dependency handles are captured once on entry.

use crate::matrix::{RowId, Var};
use crate::solver::{Feasibility, Fixplex, Ineq};
use fixplex_core::{DepRef, ModInterval, Numeral};

fn inc<N: Numeral>(n: N) -> N {
    n.wrapping_add(&N::one())
}

fn dec<N: Numeral>(n: N) -> N {
    n.wrapping_sub(&N::one())
}

impl<N: Numeral> Fixplex<N> {
    /// Propagate bounds through every live row, then through every
    /// inequality. Returns `Unsat` on conflict (see `unsat_core`).
    pub fn propagate_bounds(&mut self) -> Feasibility {
        if self.infeasible {
            return Feasibility::Unsat;
        }
        for i in 0..self.rows.len() {
            if self.rows[i].base.is_none() {
                continue;
            }
            match self.propagate_row(RowId(i as u32)) {
                Feasibility::Sat => {}
                other => return other,
            }
        }
        for idx in 0..self.ineqs.len() {
            if !self.propagate_ineq(idx) {
                return Feasibility::Unsat;
            }
        }
        // Tightenings above re-queued affected inequalities; drain them.
        if self.ineqs_are_violated() {
            return Feasibility::Unsat;
        }
        Feasibility::Sat
    }

    /// Sum the scaled intervals of `r` and derive candidate bounds.
    /// A second free variable, or a sum that covers the ring, defeats
    /// propagation for this row.
    pub(crate) fn propagate_row(&mut self, r: RowId) -> Feasibility {
        let entries: Vec<(Var, N)> = self.matrix.row_entries(r).collect();
        let mut range = ModInterval::new(N::zero(), N::one());
        let mut free_var: Option<(Var, N)> = None;
        for &(v, c) in &entries {
            if self.is_free(v) {
                if free_var.is_some() {
                    return Feasibility::Sat;
                }
                free_var = Some((v, c));
                continue;
            }
            range += self.vars[v.index()].interval * c;
            if range.is_free() {
                return Feasibility::Sat;
            }
        }
        if let Some((fv, fc)) = free_var {
            let candidate = (-range) * fc;
            return if self.new_row_bound(r, fv, candidate) {
                Feasibility::Sat
            } else {
                Feasibility::Unsat
            };
        }
        for &(v, c) in &entries {
            let candidate = range - self.vars[v.index()].interval * c;
            if !self.new_row_bound(r, v, candidate) {
                return Feasibility::Unsat;
            }
        }
        Feasibility::Sat
    }

    /// Apply a row-derived candidate interval to `x`. A free candidate is
    /// no tightening and no conflict.
    fn new_row_bound(&mut self, r: RowId, x: Var, range: ModInterval<N>) -> bool {
        if range.is_free() {
            return true;
        }
        debug_assert!(!range.is_empty());
        let was_fixed = self.is_fixed(x);
        let dep = self.row2dep(r);
        self.update_bounds(x, range.lo, range.hi, dep);
        if self.vars[x.index()].interval.is_empty() {
            self.conflict_empty_bound(x, dep);
            return false;
        }
        if !was_fixed && self.is_fixed(x) {
            self.fixed_var_eh(Some(r), x);
        }
        true
    }

    /// Join of both endpoint dependencies of every variable in `r`.
    fn row2dep(&mut self, r: RowId) -> Option<DepRef> {
        let vars: Vec<Var> = self.matrix.row_entries(r).map(|(v, _)| v).collect();
        let mut dep = None;
        for v in vars {
            let (lo_dep, hi_dep) = (self.vars[v.index()].lo_dep, self.vars[v.index()].hi_dep);
            dep = self.deps.join(lo_dep, dep);
            dep = self.deps.join(hi_dep, dep);
        }
        dep
    }

    /// Apply an inequality-derived tightening to `x`, joining the
    /// inequality's dependency with the consulted endpoint dependencies.
    fn new_ineq_bound(
        &mut self,
        i: Ineq,
        x: Var,
        lo: N,
        hi: N,
        deps: &[Option<DepRef>],
    ) -> bool {
        let was_fixed = self.is_fixed(x);
        let mut dep = Some(self.deps.leaf(i.dep));
        for &d in deps {
            dep = self.deps.join(dep, d);
        }
        self.update_bounds(x, lo, hi, dep);
        if self.vars[x.index()].interval.is_empty() {
            self.conflict_empty_bound(x, dep);
            return false;
        }
        if !was_fixed && self.is_fixed(x) {
            self.fixed_var_eh(None, x);
        }
        true
    }

    pub(crate) fn propagate_ineq(&mut self, idx: usize) -> bool {
        let i = self.ineqs[idx];
        if i.strict {
            self.propagate_strict(i)
        } else {
            self.propagate_non_strict(i)
        }
    }

    /// Record a conflict from an arbitrary dependency set.
    pub(crate) fn conflict_dep(&mut self, dep: Option<DepRef>) {
        self.unsat_core.clear();
        self.deps.linearize_into(&[dep], &mut self.unsat_core);
        self.infeasible = true;
    }

    /// Record a conflict from the join of two dependency sets.
    pub(crate) fn conflict2(&mut self, a: Option<DepRef>, b: Option<DepRef>) {
        let dep = self.deps.join(a, b);
        self.conflict_dep(dep);
    }

    /// Record a conflict involving an inequality and endpoint dependencies.
    fn conflict_ineq(&mut self, i: Ineq, deps: &[Option<DepRef>]) {
        let mut dep = Some(self.deps.leaf(i.dep));
        for &d in deps {
            dep = self.deps.join(dep, d);
        }
        self.conflict_dep(dep);
    }

    /// Record the row of base variable `v` as the unsatisfiable core: the
    /// join of both endpoint dependencies of every variable in the row.
    pub(crate) fn set_infeasible_base(&mut self, v: Var) {
        debug_assert!(self.is_base(v));
        let r = self.base2row(v);
        let mut todo: Vec<Option<DepRef>> = Vec::new();
        for (u, _) in self.matrix.row_entries(r) {
            todo.push(self.vars[u.index()].lo_dep);
            todo.push(self.vars[u.index()].hi_dep);
        }
        self.unsat_core.clear();
        self.deps.linearize_into(&todo, &mut self.unsat_core);
        self.infeasible = true;
    }

    /// Case analysis for `v < w`.
    #[allow(clippy::if_same_then_else)]
    fn propagate_strict(&mut self, i: Ineq) -> bool {
        let (v, w) = (i.v, i.w);
        let vlo = self.vars[v.index()].lo_dep;
        let vhi = self.vars[v.index()].hi_dep;
        let wlo = self.vars[w.index()].lo_dep;
        let whi = self.vars[w.index()].hi_dep;
        let zero = N::zero();
        let one = N::one();

        if self.lo(w) == zero && !self.new_ineq_bound(i, w, inc(self.lo(w)), self.lo(w), &[wlo]) {
            return false;
        }
        if self.hi(w) == one && !self.new_ineq_bound(i, w, self.lo(w), dec(self.hi(w)), &[whi]) {
            return false;
        }
        if self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(v)), &[vhi, whi, wlo])
        {
            return false;
        }
        if self.hi(v) == zero
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.hi(v), &[vhi, vlo, wlo])
        {
            return false;
        }
        if self.hi(v) == zero
            && !self.is_free(v)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(v)), &[vhi])
        {
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.lo(v), &[vlo, vhi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && self.is_fixed(w)
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), self.hi(v), &[vlo, whi, wlo])
        {
            return false;
        }
        if self.is_fixed(v)
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) != one
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.hi(w) != zero
            && self.hi(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), dec(self.hi(w)), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), dec(self.hi(w)), &[vlo, whi, wlo])
        {
            return false;
        }
        if inc(self.lo(v)) == self.hi(w)
            && self.hi(w) == zero
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), self.hi(v), &[vlo, whi])
        {
            return false;
        }
        if inc(self.lo(v)) == zero
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), self.hi(v), &[vlo])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, zero, self.hi(v), &[vlo, vhi, whi, wlo])
        {
            return false;
        }

        // hand-written rules
        if self.is_fixed(w) && self.lo(w) == zero {
            self.conflict_ineq(i, &[wlo, whi]);
            return false;
        }
        if self.is_fixed(v) && self.hi(v) == zero {
            self.conflict_ineq(i, &[vlo, vhi]);
            return false;
        }
        if !self.is_free(w)
            && (self.lo(w) <= self.hi(w) || self.hi(w) == zero)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(w)), &[vlo, wlo, whi])
        {
            return false;
        }
        if !self.is_free(v)
            && (self.lo(w) <= self.hi(w) || self.hi(w) == zero)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.hi(w), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.lo(w) == zero && !self.new_ineq_bound(i, w, one, self.hi(w), &[wlo]) {
            return false;
        }
        if inc(self.lo(v)) == zero && !self.new_ineq_bound(i, v, zero, self.hi(v), &[vhi]) {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && (self.hi(w) <= self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(w)), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_fixed(w)
            && inc(self.lo(v)) == self.hi(w)
            && (self.lo(v) <= self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, w, self.lo(w), dec(self.hi(w)), &[vlo, wlo, whi])
        {
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.lo(v) == zero)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
        {
            self.conflict_ineq(i, &[vlo, vhi, wlo, whi]);
            return false;
        }

        // mechanical case analysis
        if self.lo(w) == zero && !self.new_ineq_bound(i, w, inc(self.lo(w)), self.lo(w), &[wlo]) {
            return false;
        }
        if self.is_fixed(v)
            && self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
        {
            self.conflict_ineq(i, &[wlo, whi, vhi, vlo]);
            return false;
        }
        if self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.lo(v), &[wlo, vhi, vlo])
        {
            return false;
        }
        if self.hi(w) <= self.hi(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(v)), &[wlo, whi, vhi])
        {
            return false;
        }
        if self.hi(w) == one && !self.new_ineq_bound(i, w, self.lo(w), dec(self.hi(w)), &[whi]) {
            return false;
        }
        if self.lo(v) != zero
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), dec(self.hi(w)), &[whi, vhi, vlo])
        {
            return false;
        }
        if self.hi(w) != zero
            && self.is_fixed(v)
            && self.hi(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), dec(self.hi(v)), &[whi, vhi, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.hi(w) != zero
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), dec(self.hi(w)), &[whi, vhi, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.is_fixed(w)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        if self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.is_free(w)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        if self.is_fixed(w) && self.hi(v) == zero && self.lo(w) <= self.lo(v) {
            self.conflict_ineq(i, &[wlo, whi, vhi, vlo]);
            return false;
        }
        if self.hi(v) == zero
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, inc(self.lo(v)), self.hi(v), &[wlo, vhi, vlo])
        {
            return false;
        }
        if self.hi(v) == zero
            && !self.is_free(v)
            && !self.new_ineq_bound(i, v, self.lo(v), dec(self.hi(v)), &[vhi])
        {
            return false;
        }
        if self.is_fixed(w)
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, inc(self.lo(v)), dec(self.hi(w)), &[wlo, whi, vlo])
        {
            return false;
        }
        true
    }

    /// Case analysis for `v <= w`.
    #[allow(clippy::if_same_then_else)]
    fn propagate_non_strict(&mut self, i: Ineq) -> bool {
        let (v, w) = (i.v, i.w);
        let vlo = self.vars[v.index()].lo_dep;
        let vhi = self.vars[v.index()].hi_dep;
        let wlo = self.vars[w.index()].lo_dep;
        let whi = self.vars[w.index()].hi_dep;
        let zero = N::zero();
        let one = N::one();

        // hand-written rules
        if self.lo(w) < self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, w, self.lo(v), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_free(w)
            && (self.lo(w) <= self.hi(w) || self.hi(w) == zero)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, v, self.lo(v), self.hi(w), &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if !self.is_free(v)
            && (self.lo(w) <= self.hi(w) || self.hi(w) == zero)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
            && !self.new_ineq_bound(i, w, self.lo(v), self.hi(w), &[vlo, vhi, whi])
        {
            return false;
        }
        if self.hi(w) < self.lo(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(v) < self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, vhi, wlo, whi])
        {
            return false;
        }
        if self.lo(w) < self.hi(w)
            && self.hi(w) <= self.lo(v)
            && (self.lo(v) < self.hi(v) || self.hi(v) == zero)
        {
            self.conflict_ineq(i, &[vlo, vhi, wlo, whi]);
            return false;
        }

        // mechanical case analysis
        if !(self.hi(w) <= self.lo(v))
            && !self.is_fixed(v)
            && self.is_fixed(w)
            && self.hi(w) == one
            && self.hi(v) != zero
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.lo(w))
            && !self.is_fixed(v)
            && self.is_fixed(w)
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.hi(w))
            && !(self.hi(w) <= self.lo(v))
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.lo(v))
            && !(self.hi(v) <= self.hi(w))
            && self.is_fixed(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.hi(w) == one
            && self.lo(v) <= self.hi(w)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if self.is_fixed(w)
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.is_fixed(v)
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, w, self.lo(v), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !self.is_fixed(w)
            && !(self.hi(v) <= self.lo(w))
            && self.is_fixed(v)
            && self.hi(v) <= self.hi(w)
            && self.hi(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, dec(self.hi(w)), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && !(self.hi(w) <= self.lo(v))
            && self.hi(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(v), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.is_fixed(v)
            && !self.new_ineq_bound(i, w, self.lo(v), zero, &[vhi, wlo, vlo])
        {
            return false;
        }
        if self.is_fixed(v)
            && self.hi(w) == one
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && self.hi(v) != zero
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if self.hi(v) != one
            && self.hi(w) == one
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if self.hi(w) != zero
            && self.is_fixed(v)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(v) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.hi(w))
            && self.hi(w) != zero
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && self.hi(v) <= self.lo(w)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !(self.lo(w) <= self.lo(v))
            && self.hi(w) == one
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && !(self.lo(w) <= self.lo(v))
            && self.hi(w) != zero
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vhi, wlo, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.is_fixed(v)
            && self.hi(w) == one
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.lo(w))
            && self.hi(w) == one
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.hi(w) != zero
            && self.is_fixed(v)
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.lo(w))
            && self.hi(w) != zero
            && self.lo(w) <= self.lo(v)
            && self.lo(v) <= self.lo(w)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.hi(v) != one
            && self.hi(w) == one
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && !(self.hi(v) <= self.hi(w))
            && self.hi(w) != zero
            && self.lo(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.hi(v) == zero
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, w, self.lo(v), zero, &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if self.hi(w) != one
            && self.hi(v) == one
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(v)
            && self.hi(v) <= self.lo(w)
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, v, zero, self.lo(w), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.hi(w) <= self.hi(v))
            && self.hi(w) <= self.lo(v)
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, v, zero, dec(self.hi(w)), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.hi(v) == zero
            && !self.new_ineq_bound(i, w, self.lo(v), zero, &[vhi, wlo, vlo])
        {
            return false;
        }
        if !(self.lo(v) <= self.lo(w))
            && self.hi(w) != zero
            && self.hi(v) == zero
            && self.lo(w) <= self.hi(v)
            && !self.new_ineq_bound(i, v, self.lo(v), self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && self.is_fixed(w)
            && self.hi(v) == zero
            && self.lo(w) <= self.hi(w)
            && !self.new_ineq_bound(i, v, self.lo(v), self.hi(w), &[vhi, vlo, wlo, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(v))
            && !(self.hi(w) <= self.lo(v))
            && self.hi(v) == zero
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, self.lo(w), self.hi(w), &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.hi(v) <= self.lo(w))
            && self.hi(v) <= self.hi(w)
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, v, zero, self.hi(w), &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.hi(w))
            && self.hi(w) == one
            && self.hi(v) == zero
            && self.lo(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        if !(self.lo(v) <= self.hi(w))
            && self.hi(w) != zero
            && self.hi(v) == zero
            && self.lo(v) <= self.lo(w)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[wlo, vhi, vlo, whi])
        {
            return false;
        }
        if !(self.lo(w) <= self.lo(v))
            && self.hi(w) != zero
            && self.hi(v) == zero
            && self.hi(w) <= self.lo(v)
            && !self.new_ineq_bound(i, w, self.lo(w), zero, &[vlo, wlo, vhi, whi])
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Feasibility;

    type Solver = Fixplex<u8>;

    #[test]
    fn row_propagation_tightens_single_free_variable() {
        let mut s = Solver::new();
        // s + x - y = 0, x in [10, 20), y in [15, 25): s = y - x.
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1), (Var(2), 255)])
            .unwrap();
        s.set_bounds(Var(1), 10, 20, 1);
        s.set_bounds(Var(2), 15, 25, 2);
        assert_eq!(s.propagate_bounds(), Feasibility::Sat);
        // y - x ranges over [15,25) - [10,20) = [-4, 15) = [252, 15).
        let b = s.bounds(Var(0));
        assert!(!b.is_free());
        for val in [0u8, 5, 14, 252, 255] {
            assert!(b.contains(val), "{} should contain {}", b, val);
        }
        assert!(!b.contains(100));
    }

    #[test]
    fn ineq_propagation_zero_upper_bound_conflict() {
        let mut s = Solver::new();
        // v < w with w fixed at 0 is unsatisfiable.
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.set_value(Var(1), 0, 7);
        s.add_ineq(Var(0), Var(1), 8, true);
        assert_eq!(s.propagate_bounds(), Feasibility::Unsat);
        assert!(s.unsat_core().contains(&7));
        assert!(s.unsat_core().contains(&8));
    }

    #[test]
    fn ineq_propagation_bounds_flow_forward() {
        let mut s = Solver::new();
        // v <= w, v in [10, 20): w gains a lower bound above 9.
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.set_bounds(Var(0), 10, 20, 1);
        s.add_ineq(Var(0), Var(1), 2, false);
        assert_eq!(s.propagate_bounds(), Feasibility::Sat);
        let b = s.bounds(Var(1));
        assert!(!b.contains(5), "w may not lie below v: {}", b);
        assert!(b.contains(15));
    }

    #[test]
    fn strict_chain_cycle_is_unsat() {
        let mut s = Solver::new();
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.ensure_var(Var(2));
        s.add_ineq(Var(0), Var(1), 1, false);
        s.add_ineq(Var(1), Var(2), 2, false);
        s.add_ineq(Var(2), Var(0), 3, true);
        assert_eq!(s.make_feasible(), Feasibility::Unsat);
        let core = s.unsat_core();
        assert!(core.contains(&1) && core.contains(&2) && core.contains(&3));
    }

    #[test]
    fn row_conflict_reports_row_dependencies() {
        let mut s = Solver::new();
        // x + y = 0 with x fixed 1, y fixed 1: 2 != 0.
        s.add_row(Var(0), &[(Var(0), 1), (Var(1), 1)]).unwrap();
        s.set_value(Var(1), 1, 11);
        s.set_bounds(Var(0), 1, 2, 12);
        assert_eq!(s.make_feasible(), Feasibility::Unsat);
        let core = s.unsat_core();
        assert!(core.contains(&11) && core.contains(&12));
    }
}
