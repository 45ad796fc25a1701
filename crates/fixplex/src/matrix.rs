//! Doubly-indexed sparse matrix of row equalities.
//!
//! Each row stores its `(variable, coefficient)` entries in an arena slot
//! vector; each variable's column stores `(row, entry-slot)` back-pointers.
//! Dead slots are recycled through per-row and per-column free lists, so
//! entry slots referenced from the column index stay stable across
//! insertions and deletions. Row combination (`add`) resolves target
//! positions through a dense scratch map that is reset after every call.

use fixplex_core::Numeral;
use std::fmt;

/// A variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

impl Var {
    /// The variable's index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u32);

impl RowId {
    /// The row's index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Marker for recycled entry slots.
const DEAD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct RowEntry<N> {
    var: u32,
    coeff: N,
    col_slot: u32,
}

#[derive(Debug)]
struct RowData<N> {
    entries: Vec<RowEntry<N>>,
    free: Vec<u32>,
    live: bool,
}

impl<N> Default for RowData<N> {
    fn default() -> Self {
        RowData {
            entries: Vec::new(),
            free: Vec::new(),
            live: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColEntry {
    row: u32,
    row_slot: u32,
}

#[derive(Debug, Default)]
struct ColData {
    entries: Vec<ColEntry>,
    free: Vec<u32>,
    size: u32,
}

/// Sparse tableau with row-by-row and column-by-column access.
#[derive(Debug, Default)]
pub struct SparseMatrix<N> {
    rows: Vec<RowData<N>>,
    cols: Vec<ColData>,
    free_rows: Vec<u32>,
    // var -> live entry slot in the row currently being combined, -1 otherwise
    var_pos: Vec<i32>,
}

impl<N: Numeral> SparseMatrix<N> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        SparseMatrix {
            rows: Vec::new(),
            cols: Vec::new(),
            free_rows: Vec::new(),
            var_pos: Vec::new(),
        }
    }

    /// Make sure columns exist up to and including `v`.
    pub fn ensure_var(&mut self, v: Var) {
        while self.cols.len() <= v.index() {
            self.cols.push(ColData::default());
            self.var_pos.push(-1);
        }
    }

    /// Allocate a fresh (empty) row.
    pub fn mk_row(&mut self) -> RowId {
        if let Some(r) = self.free_rows.pop() {
            self.rows[r as usize].live = true;
            RowId(r)
        } else {
            self.rows.push(RowData {
                live: true,
                ..RowData::default()
            });
            RowId(self.rows.len() as u32 - 1)
        }
    }

    /// Remove a row and all of its column back-pointers.
    pub fn del_row(&mut self, r: RowId) {
        debug_assert!(self.rows[r.index()].live);
        let entries = std::mem::take(&mut self.rows[r.index()].entries);
        for e in &entries {
            if e.var != DEAD {
                self.kill_col_slot(Var(e.var), e.col_slot);
            }
        }
        let row = &mut self.rows[r.index()];
        row.free.clear();
        row.live = false;
        self.free_rows.push(r.0);
    }

    /// Add `coeff * v` to row `r`. The variable must not already occur in
    /// the row and the coefficient must be non-zero.
    pub fn add_var(&mut self, r: RowId, coeff: N, v: Var) {
        debug_assert!(!coeff.is_zero());
        self.ensure_var(v);
        self.push_entry(r, coeff, v);
    }

    /// Multiply every coefficient of `r` by `k` (non-zero).
    pub fn mul(&mut self, r: RowId, k: N) {
        debug_assert!(!k.is_zero());
        for e in &mut self.rows[r.index()].entries {
            if e.var != DEAD {
                e.coeff = e.coeff.wrapping_mul(&k);
            }
        }
    }

    /// Row combination: `target += k * src`, dropping entries that cancel
    /// to zero. The column index is kept consistent.
    pub fn add(&mut self, target: RowId, k: N, src: RowId) {
        debug_assert!(target != src);
        for (slot, e) in self.rows[target.index()].entries.iter().enumerate() {
            if e.var != DEAD {
                self.var_pos[e.var as usize] = slot as i32;
            }
        }
        let src_entries: Vec<(Var, N)> = self.row_entries(src).collect();
        for (v, c) in src_entries {
            let kc = k.wrapping_mul(&c);
            let pos = self.var_pos[v.index()];
            if pos >= 0 {
                let e = &mut self.rows[target.index()].entries[pos as usize];
                e.coeff = e.coeff.wrapping_add(&kc);
                if e.coeff.is_zero() {
                    self.kill_row_slot(target, pos as u32);
                    self.var_pos[v.index()] = -1;
                }
            } else if !kc.is_zero() {
                self.push_entry(target, kc, v);
            }
        }
        for e in &self.rows[target.index()].entries {
            if e.var != DEAD {
                self.var_pos[e.var as usize] = -1;
            }
        }
    }

    /// Iterate the live `(variable, coefficient)` entries of a row.
    pub fn row_entries(&self, r: RowId) -> impl Iterator<Item = (Var, N)> + '_ {
        self.rows[r.index()]
            .entries
            .iter()
            .filter(|e| e.var != DEAD)
            .map(|e| (Var(e.var), e.coeff))
    }

    /// Iterate the rows containing `v` together with `v`'s coefficient.
    pub fn col_entries(&self, v: Var) -> impl Iterator<Item = (RowId, N)> + '_ {
        self.cols[v.index()]
            .entries
            .iter()
            .filter(|e| e.row != DEAD)
            .map(|e| {
                let coeff = self.rows[e.row as usize].entries[e.row_slot as usize].coeff;
                (RowId(e.row), coeff)
            })
    }

    /// Number of rows containing `v`.
    pub fn column_size(&self, v: Var) -> usize {
        self.cols[v.index()].size as usize
    }

    /// Does no live row contain `v`?
    pub fn column_is_empty(&self, v: Var) -> bool {
        self.cols[v.index()].size == 0
    }

    /// Drop everything.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.cols.clear();
        self.free_rows.clear();
        self.var_pos.clear();
    }

    fn push_entry(&mut self, r: RowId, coeff: N, v: Var) {
        let row_slot = match self.rows[r.index()].free.pop() {
            Some(s) => s,
            None => {
                self.rows[r.index()].entries.push(RowEntry {
                    var: DEAD,
                    coeff: N::zero(),
                    col_slot: DEAD,
                });
                self.rows[r.index()].entries.len() as u32 - 1
            }
        };
        let col = &mut self.cols[v.index()];
        let col_slot = match col.free.pop() {
            Some(s) => s,
            None => {
                col.entries.push(ColEntry {
                    row: DEAD,
                    row_slot: DEAD,
                });
                col.entries.len() as u32 - 1
            }
        };
        col.entries[col_slot as usize] = ColEntry {
            row: r.0,
            row_slot,
        };
        col.size += 1;
        self.rows[r.index()].entries[row_slot as usize] = RowEntry {
            var: v.0,
            coeff,
            col_slot,
        };
    }

    fn kill_row_slot(&mut self, r: RowId, slot: u32) {
        let e = self.rows[r.index()].entries[slot as usize];
        debug_assert!(e.var != DEAD);
        self.kill_col_slot(Var(e.var), e.col_slot);
        let row = &mut self.rows[r.index()];
        row.entries[slot as usize].var = DEAD;
        row.free.push(slot);
    }

    fn kill_col_slot(&mut self, v: Var, slot: u32) {
        let col = &mut self.cols[v.index()];
        debug_assert!(col.entries[slot as usize].row != DEAD);
        col.entries[slot as usize].row = DEAD;
        col.free.push(slot);
        col.size -= 1;
    }

    /// Cross-link consistency, for debug assertions.
    pub(crate) fn well_formed(&self) -> bool {
        for (ri, row) in self.rows.iter().enumerate() {
            for (slot, e) in row.entries.iter().enumerate() {
                if e.var == DEAD {
                    continue;
                }
                if !row.live || e.coeff.is_zero() {
                    return false;
                }
                let ce = self.cols[e.var as usize].entries[e.col_slot as usize];
                if ce.row != ri as u32 || ce.row_slot != slot as u32 {
                    return false;
                }
            }
        }
        for (vi, col) in self.cols.iter().enumerate() {
            let mut live = 0;
            for e in &col.entries {
                if e.row == DEAD {
                    continue;
                }
                live += 1;
                let re = self.rows[e.row as usize].entries[e.row_slot as usize];
                if re.var != vi as u32 || re.col_slot as usize >= col.entries.len() {
                    return false;
                }
            }
            if live != col.size {
                return false;
            }
        }
        self.var_pos.iter().all(|&p| p == -1)
    }
}
