//! Implied-equality inference.
//!
//! Two sources of equalities between variables:
//! - **offset rows**: an integral row with exactly two non-fixed variables
//!   pins their difference; two such rows with matching coefficient
//!   patterns over a shared variable imply the other two variables equal,
//!   provided their current values agree and the shared coefficient is odd.
//! - **fixed-value collisions**: a table keyed by value records which
//!   variable first became fixed at it; a second variable fixing to the
//!   same value yields an equality.
//!
//! Equalities accumulate in a list for an outer layer to consume and are
//! invalidated when a row is deleted.

use crate::matrix::{RowId, Var};
use crate::solver::Fixplex;
use fixplex_core::Numeral;

/// An implied equality `x = y`, witnessed by up to two rows. A missing
/// witness means the equality came from bound reasoning alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarEq {
    /// One side of the equality.
    pub x: Var,
    /// The other side.
    pub y: Var,
    /// Witness row for `x`, if any.
    pub r1: Option<RowId>,
    /// Witness row for `y`, if any.
    pub r2: Option<RowId>,
}

/// Entry of the fixed-value collision table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixEntry {
    pub(crate) var: Var,
    pub(crate) row: Option<RowId>,
}

impl<N: Numeral> Fixplex<N> {
    /// Scan all rows for offset-row equalities, appending to the
    /// implied-equality list.
    pub fn propagate_eqs(&mut self) {
        for i in 0..self.rows.len() {
            if self.rows[i].base.is_some() {
                self.get_offset_eqs(RowId(i as u32));
            }
        }
    }

    fn get_offset_eqs(&mut self, r: RowId) {
        let Some((cx, x, cy, y)) = self.is_offset_row(r) else {
            return;
        };
        self.lookahead_eq(r, cx, x, cy, y);
        self.lookahead_eq(r, cy, y, cx, x);
    }

    /// An offset row is integral and has exactly two non-fixed variables.
    fn is_offset_row(&self, r: RowId) -> Option<(N, Var, N, Var)> {
        if !self.rows[r.index()].integral {
            return None;
        }
        let mut first: Option<(Var, N)> = None;
        let mut second: Option<(Var, N)> = None;
        for (v, c) in self.matrix.row_entries(r) {
            if self.is_fixed(v) {
                continue;
            }
            if first.is_none() {
                first = Some((v, c));
            } else if second.is_none() {
                second = Some((v, c));
            } else {
                return None;
            }
        }
        let (x, cx) = first?;
        let (y, cy) = second?;
        Some((cx, x, cy, y))
    }

    /// Walk the rows sharing `x` with offset row `r1 = cx·x + cy·y + k`,
    /// looking for a second offset row `cx·x + cy·u + k'` (or the negated
    /// pattern) whose `u` currently evaluates like `y`.
    fn lookahead_eq(&mut self, r1: RowId, cx: N, x: Var, cy: N, y: Var) {
        if cy & N::one() == N::zero() {
            return;
        }
        let cols: Vec<RowId> = self.matrix.col_entries(x).map(|(r, _)| r).collect();
        for r2 in cols {
            if r1.0 >= r2.0 {
                continue;
            }
            let Some((mut cz, mut z, mut cu, mut u)) = self.is_offset_row(r2) else {
                continue;
            };
            if u == x {
                std::mem::swap(&mut z, &mut u);
                std::mem::swap(&mut cz, &mut cu);
            }
            if z == x && u != y && cx == cz && cu == cy && self.value(u) == self.value(y) {
                self.eq_eh(u, y, Some(r1), Some(r2));
            }
            if z == x
                && u != y
                && cx.wrapping_add(&cz).is_zero()
                && cu.wrapping_add(&cy).is_zero()
                && self.value(u) == self.value(y)
            {
                self.eq_eh(u, y, Some(r1), Some(r2));
            }
        }
    }

    /// Consult the fixed-value table for a collision with `x`, which just
    /// became fixed (through row `r`, if any).
    pub(crate) fn fixed_var_eh(&mut self, r: Option<RowId>, x: Var) {
        let val = self.value(x);
        let existing = self.value2fixed.get(&val).copied();
        match existing {
            Some(e)
                if e.var.index() < self.vars.len()
                    && e.var != x
                    && self.is_fixed(e.var)
                    && self.value(e.var) == val =>
            {
                self.eq_eh(x, e.var, e.row, r);
            }
            _ => {
                self.value2fixed.insert(val, FixEntry { var: x, row: r });
            }
        }
    }

    fn eq_eh(&mut self, x: Var, y: Var, r1: Option<RowId>, r2: Option<RowId>) {
        self.var_eqs.push(VarEq { x, y, r1, r2 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Feasibility;

    type Solver = Fixplex<u8>;

    fn has_eq(s: &Solver, a: Var, b: Var) -> bool {
        s.var_equalities()
            .iter()
            .any(|e| (e.x == a && e.y == b) || (e.x == b && e.y == a))
    }

    #[test]
    fn offset_rows_imply_equality() {
        let mut s = Solver::new();
        // x - y - 3 = 0 and x - z - 3 = 0 with value(y) = value(z) = 7 and
        // x = 10. The constant is a variable fixed at 1 with coefficient -3;
        // y and z stay non-fixed so both rows keep exactly two offset
        // variables.
        let (x, y, z, k) = (Var(0), Var(1), Var(2), Var(3));
        s.set_value(k, 1, 0);
        s.set_bounds(x, 10, 20, 1);
        s.add_row(y, &[(x, 1), (y, 255), (k, 253)]).unwrap();
        s.add_row(z, &[(x, 1), (z, 255), (k, 253)]).unwrap();
        assert_eq!(s.value(y), 7);
        assert_eq!(s.value(z), 7);
        assert_eq!(s.make_feasible(), Feasibility::Sat);
        s.propagate_eqs();
        assert!(has_eq(&s, y, z));
    }

    #[test]
    fn fixed_value_collision_implies_equality() {
        let mut s = Solver::new();
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.set_value(Var(0), 42, 1);
        s.set_value(Var(1), 42, 2);
        assert!(has_eq(&s, Var(0), Var(1)));
    }

    #[test]
    fn distinct_fixed_values_do_not_collide() {
        let mut s = Solver::new();
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.set_value(Var(0), 42, 1);
        s.set_value(Var(1), 43, 2);
        assert!(!has_eq(&s, Var(0), Var(1)));
    }

    #[test]
    fn collision_table_survives_value_reuse_after_pop() {
        let mut s = Solver::new();
        s.ensure_var(Var(0));
        s.ensure_var(Var(1));
        s.push();
        s.set_value(Var(0), 9, 1);
        s.pop(1);
        // Var(0) is no longer fixed at 9; a later fixing of Var(1) to 9
        // must not report an equality against the stale entry.
        s.set_value(Var(1), 9, 2);
        assert!(!has_eq(&s, Var(0), Var(1)));
    }
}
