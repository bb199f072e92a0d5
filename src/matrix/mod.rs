//! Read-only sparse projection of the active constraints.
//!
//! [`MatrixView::build`] walks all active transformed constraints once,
//! normalising each into `<=` / `=` rows (see [`normalize`]), and stores the
//! result in compressed row and column form together with the per-column
//! auxiliary data the presolvers need: objective, bounds, kinds, and lock
//! counts recomputed from the built rows.
//!
//! The view is immutable after build. Any coefficient-altering presolve step
//! invalidates it; callers drop it and build a fresh one.

pub mod normalize;

use derive_more::{Display, Error};
use faer::Col;
use faer::sparse::{SparseColMat, Triplet};

use crate::host::{Host, VarKind};
use crate::numerics;
use crate::terminators::Terminator;
use crate::{ConsId, E, I, RowId, VarId};

use normalize::{NormalizeCons, PendingRow, RowAccumulator};

/// Handler kind a row was normalised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    Linear,
    SetPacking,
    SetPartitioning,
    SetCovering,
    Knapsack,
    Xor,
    And,
    Or,
    LogicOr,
    Varbound,
    Linking,
    BoundDisjunction,
}

impl RowOrigin {
    /// Rows that are a faithful linear relaxation of their constraint and may
    /// therefore be rewritten by the sparsifier. The remaining origins encode
    /// structure for symmetry detection only.
    pub fn is_linearizable(&self) -> bool {
        matches!(
            self,
            RowOrigin::Linear
                | RowOrigin::SetPacking
                | RowOrigin::SetPartitioning
                | RowOrigin::SetCovering
                | RowOrigin::Knapsack
                | RowOrigin::Varbound
                | RowOrigin::LogicOr
        )
    }
}

/// Sense of a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowSense {
    /// `a^T x <= rhs`, left side infinite.
    Le,
    /// `a^T x = rhs`.
    Eq,
}

/// Why the projection could not be completed. None of these are fatal: the
/// caller disables the facility and the solve continues without it.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum BuildFailure {
    #[display("constraint {cons} uses an unsupported handler kind")]
    Unsupported { cons: ConsId },

    #[display("bound disjunction {cons} repeats a variable among more than two literals")]
    RepeatedDisjunctionVar { cons: ConsId },

    #[display("constraint {cons} references inactive variable {var}")]
    InactiveVariable { cons: ConsId, var: VarId },

    #[display("matrix build interrupted")]
    Interrupted,
}

/// Size statistics of a built view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixStats {
    pub n_rows: I,
    pub n_cols: I,
    pub nnz: I,
    pub n_bin_cols: I,
    pub n_int_cols: I,
    pub n_impl_cols: I,
    pub n_cont_cols: I,
}

/// Canonical sparse view of the active constraints with row and column
/// auxiliary data.
#[derive(Debug)]
pub struct MatrixView {
    n_rows: I,
    n_cols: I,

    // Compressed rows.
    row_ptr: Vec<I>,
    col_idx: Vec<VarId>,
    val: Vec<E>,
    lhs: Vec<E>,
    rhs: Vec<E>,
    origin: Vec<RowOrigin>,
    row_cons: Vec<ConsId>,

    // Compressed columns.
    col_ptr: Vec<I>,
    row_idx: Vec<RowId>,
    col_val: Vec<E>,

    // Per-column data.
    obj: Col<E>,
    lb: Col<E>,
    ub: Col<E>,
    kind: Vec<VarKind>,
    n_down_locks: Vec<I>,
    n_up_locks: Vec<I>,
}

impl MatrixView {
    /// Builds the projection by walking all active transformed constraints
    /// once. Returns a [`BuildFailure`] when a constraint cannot be
    /// represented or the terminator fires; the caller then proceeds without
    /// the facilities that need the matrix.
    pub fn build(host: &dyn Host, terminator: &mut dyn Terminator) -> Result<Self, BuildFailure> {
        let mut pending: Vec<PendingRow> = Vec::new();

        for cons in host.conss() {
            if terminator.terminate().is_some() {
                return Err(BuildFailure::Interrupted);
            }
            if !host.cons_is_active(cons) || !host.cons_is_transformed(cons) {
                continue;
            }
            if host.cons_is_conflict(cons) {
                continue;
            }
            let Some(data) = host.cons_data(cons) else {
                return Err(BuildFailure::Unsupported { cons });
            };
            data.normalize(&mut RowAccumulator::new(&mut pending, cons))?;
        }

        Self::assemble(host, pending)
    }

    fn assemble(host: &dyn Host, mut pending: Vec<PendingRow>) -> Result<Self, BuildFailure> {
        let n_cols = host.n_vars();

        // Sort, merge duplicates, drop zero coefficients and empty rows.
        for row in &mut pending {
            row.entries.sort_by_key(|&(v, _)| v);
            let mut merged: Vec<(VarId, E)> = Vec::with_capacity(row.entries.len());
            for &(v, c) in &row.entries {
                if v >= n_cols || !host.var_is_active(v) {
                    return Err(BuildFailure::InactiveVariable { cons: row.cons, var: v });
                }
                match merged.last_mut() {
                    Some(last) if last.0 == v => last.1 += c,
                    _ => merged.push((v, c)),
                }
            }
            merged.retain(|&(_, c)| !numerics::is_zero(c));
            row.entries = merged;
        }
        pending.retain(|row| !row.entries.is_empty());

        let n_rows = pending.len();
        let nnz: I = pending.iter().map(|r| r.entries.len()).sum();

        let mut row_ptr = Vec::with_capacity(n_rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut val = Vec::with_capacity(nnz);
        let mut lhs = Vec::with_capacity(n_rows);
        let mut rhs = Vec::with_capacity(n_rows);
        let mut origin = Vec::with_capacity(n_rows);
        let mut row_cons = Vec::with_capacity(n_rows);

        row_ptr.push(0);
        for row in &pending {
            for &(v, c) in &row.entries {
                col_idx.push(v);
                val.push(c);
            }
            row_ptr.push(col_idx.len());
            lhs.push(row.lhs);
            rhs.push(row.rhs);
            origin.push(row.origin);
            row_cons.push(row.cons);
        }

        // Transpose into compressed columns.
        let mut col_counts = vec![0usize; n_cols];
        for &v in &col_idx {
            col_counts[v] += 1;
        }
        let mut col_ptr = Vec::with_capacity(n_cols + 1);
        col_ptr.push(0);
        for j in 0..n_cols {
            col_ptr.push(col_ptr[j] + col_counts[j]);
        }
        let mut next = col_ptr[..n_cols].to_vec();
        let mut row_idx = vec![0 as RowId; nnz];
        let mut col_val = vec![0.; nnz];
        for r in 0..n_rows {
            for k in row_ptr[r]..row_ptr[r + 1] {
                let v = col_idx[k];
                row_idx[next[v]] = r;
                col_val[next[v]] = val[k];
                next[v] += 1;
            }
        }

        // Lock counts from coefficient signs against each row's finite sides.
        let mut n_down_locks = vec![0; n_cols];
        let mut n_up_locks = vec![0; n_cols];
        for r in 0..n_rows {
            let finite_lhs = !numerics::is_infinite(lhs[r]);
            for k in row_ptr[r]..row_ptr[r + 1] {
                let (v, c) = (col_idx[k], val[k]);
                if c > 0. {
                    n_up_locks[v] += 1;
                    if finite_lhs {
                        n_down_locks[v] += 1;
                    }
                } else {
                    n_down_locks[v] += 1;
                    if finite_lhs {
                        n_up_locks[v] += 1;
                    }
                }
            }
        }

        Ok(Self {
            n_rows,
            n_cols,
            row_ptr,
            col_idx,
            val,
            lhs,
            rhs,
            origin,
            row_cons,
            col_ptr,
            row_idx,
            col_val,
            obj: Col::from_fn(n_cols, |j| host.var_obj(j)),
            lb: Col::from_fn(n_cols, |j| host.var_lb(j)),
            ub: Col::from_fn(n_cols, |j| host.var_ub(j)),
            kind: (0..n_cols).map(|j| host.var_kind(j)).collect(),
            n_down_locks,
            n_up_locks,
        })
    }

    pub fn n_rows(&self) -> I {
        self.n_rows
    }

    pub fn n_cols(&self) -> I {
        self.n_cols
    }

    pub fn nnz(&self) -> I {
        self.col_idx.len()
    }

    /// All coefficients in row-major order (colour-class computation).
    pub fn all_vals(&self) -> &[E] {
        &self.val
    }

    /// Sorted variable indices of row `r`.
    pub fn row_vars(&self, r: RowId) -> &[VarId] {
        &self.col_idx[self.row_ptr[r]..self.row_ptr[r + 1]]
    }

    /// Coefficients of row `r`, aligned with [`MatrixView::row_vars`].
    pub fn row_vals(&self, r: RowId) -> &[E] {
        &self.val[self.row_ptr[r]..self.row_ptr[r + 1]]
    }

    pub fn row_len(&self, r: RowId) -> I {
        self.row_ptr[r + 1] - self.row_ptr[r]
    }

    pub fn row_lhs(&self, r: RowId) -> E {
        self.lhs[r]
    }

    pub fn row_rhs(&self, r: RowId) -> E {
        self.rhs[r]
    }

    pub fn row_origin(&self, r: RowId) -> RowOrigin {
        self.origin[r]
    }

    pub fn row_cons(&self, r: RowId) -> ConsId {
        self.row_cons[r]
    }

    pub fn row_sense(&self, r: RowId) -> RowSense {
        if numerics::is_infinite(self.lhs[r]) { RowSense::Le } else { RowSense::Eq }
    }

    pub fn is_equation(&self, r: RowId) -> bool {
        self.row_sense(r) == RowSense::Eq
    }

    /// Rows containing column `v`.
    pub fn col_rows(&self, v: VarId) -> &[RowId] {
        &self.row_idx[self.col_ptr[v]..self.col_ptr[v + 1]]
    }

    /// Coefficients of column `v`, aligned with [`MatrixView::col_rows`].
    pub fn col_vals(&self, v: VarId) -> &[E] {
        &self.col_val[self.col_ptr[v]..self.col_ptr[v + 1]]
    }

    pub fn col_len(&self, v: VarId) -> I {
        self.col_ptr[v + 1] - self.col_ptr[v]
    }

    pub fn obj(&self, v: VarId) -> E {
        self.obj[v]
    }

    pub fn lb(&self, v: VarId) -> E {
        self.lb[v]
    }

    pub fn ub(&self, v: VarId) -> E {
        self.ub[v]
    }

    pub fn kind(&self, v: VarId) -> VarKind {
        self.kind[v]
    }

    pub fn n_down_locks(&self, v: VarId) -> I {
        self.n_down_locks[v]
    }

    pub fn n_up_locks(&self, v: VarId) -> I {
        self.n_up_locks[v]
    }

    /// `true` when every column appears in at least one row, so an LP over
    /// the view covers all variables (consumed by strong branching).
    pub fn all_cols_in_lp(&self) -> bool {
        (0..self.n_cols).all(|v| self.col_len(v) > 0)
    }

    pub fn stats(&self) -> MatrixStats {
        let mut stats = MatrixStats {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            nnz: self.nnz(),
            ..Default::default()
        };
        for kind in &self.kind {
            match kind {
                VarKind::Binary => stats.n_bin_cols += 1,
                VarKind::Integer => stats.n_int_cols += 1,
                VarKind::ImplicitInteger => stats.n_impl_cols += 1,
                VarKind::Continuous => stats.n_cont_cols += 1,
            }
        }
        stats
    }

    /// Column-major copy of the coefficient structure.
    pub fn to_sparse_col_mat(&self) -> SparseColMat<I, E> {
        let mut triplets = Vec::with_capacity(self.nnz());
        for r in 0..self.n_rows {
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                triplets.push(Triplet::new(r, self.col_idx[k], self.val[k]));
            }
        }
        SparseColMat::try_new_from_triplets(self.n_rows, self.n_cols, &triplets).unwrap()
    }
}
