//! Equality-driven non-zero cancellation.
//!
//! For every candidate row the presolver probes a hashtable of two-variable
//! keys seeded from equality rows. A hit yields a scale `s` such that adding
//! `s * eq` to the row cancels at least the probed pair; the combination is
//! accepted when its cancellation rate beats the best one seen so far and it
//! respects the per-kind fill-in budgets, lock safety, and (optionally)
//! integer-coefficient preservation. The matrix view itself stays untouched:
//! accepted combinations rewrite the working copy of the row and are handed
//! back to the host as a rebuilt linear constraint replacing the original.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

use crate::host::{Host, VarKind};
use crate::matrix::{MatrixView, RowOrigin, RowSense};
use crate::numerics::{self, SCALE_MAX};
use crate::settings::{RowSort, SparsifySettings};
use crate::terminators::Terminator;
use crate::{E, I, PassOutcome, RowId, VarId};

/// Aggregated counters of one sparsifier pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SparsifyStats {
    /// Coefficients changed in rebuilt rows (cancelled, filled, or modified).
    pub n_chg_coefs: I,
    pub n_canceled: I,
    pub n_fill_in: I,
    /// Rows that became empty and were deleted as redundant.
    pub n_deleted_rows: I,
    /// Constraints replaced by a rebuilt linear constraint.
    pub n_rebuilt_rows: I,
}

/// An equality row's entry for one of its variable pairs. The key ordering
/// guarantees `var_i < var_j`.
#[derive(Debug, Clone, Copy)]
struct PairEntry {
    row: RowId,
    coef_i: E,
    coef_j: E,
    row_len: I,
}

/// Hash key of a pair: both variables plus a coarse bucket of the
/// coefficient ratio. Tolerance equality of the ratio is confirmed on probe.
type PairKey = (VarId, VarId, u64);

fn pair_key(var_i: VarId, var_j: VarId, coef_i: E, coef_j: E) -> PairKey {
    (var_i, var_j, numerics::hash_bucket(coef_j / coef_i))
}

/// Candidate combination found for the working row.
struct Candidate {
    eq_row: RowId,
    scale: E,
    rate: E,
    n_cancel: I,
    n_fill: I,
}

/// Result of simulating `row + s * eq` without materialising it.
struct Simulation {
    n_cancel: I,
    n_fill: I,
}

/// The sparsification presolver. Stateless between passes; scheduling and
/// back-off live in the orchestrator.
pub struct Sparsifier {
    settings: SparsifySettings,
}

impl Sparsifier {
    pub fn new(settings: SparsifySettings) -> Self {
        Self { settings }
    }

    /// Runs one pass over the matrix, rewriting host constraints for every
    /// row with at least one cancellation. The view is stale afterwards
    /// whenever the returned outcome is [`PassOutcome::Reduced`].
    pub fn run(
        &self,
        host: &mut dyn Host,
        matrix: &MatrixView,
        terminator: &mut dyn Terminator,
    ) -> (PassOutcome, SparsifyStats) {
        let mut stats = SparsifyStats::default();
        if !self.settings.enable {
            return (PassOutcome::DidNotRun, stats);
        }

        let table = self.build_pair_table(matrix);
        if table.is_empty() {
            return (PassOutcome::NothingFound, stats);
        }

        let retrieve_budget = (self.settings.max_retrieve_fac * matrix.nnz() as E) as I;
        let mut n_useless = 0;
        let mut interrupted = false;

        for r in self.candidate_rows(matrix) {
            if terminator.terminate().is_some() {
                interrupted = true;
                break;
            }
            if n_useless > retrieve_budget {
                break;
            }
            self.cancel_row(host, matrix, &table, r, &mut n_useless, &mut stats);
        }

        let outcome = if interrupted {
            PassOutcome::Interrupted
        } else if stats.n_canceled > 0 {
            PassOutcome::Reduced
        } else {
            PassOutcome::NothingFound
        };
        (outcome, stats)
    }

    /// Seeds the pair table from all two-element combinations of each
    /// equality row. Collisions retain the shortest equality; ties go to the
    /// higher row index.
    fn build_pair_table(&self, matrix: &MatrixView) -> HashMap<PairKey, PairEntry> {
        let mut table = HashMap::new();
        for r in 0..matrix.n_rows() {
            if !matrix.is_equation(r) || !matrix.row_origin(r).is_linearizable() {
                continue;
            }
            let len = matrix.row_len(r);
            if len < 2 {
                continue;
            }
            if let Some(cap) = self.settings.max_nonzeros_eq
                && len > cap
            {
                continue;
            }

            let vars = matrix.row_vars(r);
            let vals = matrix.row_vals(r);
            for i1 in 0..len - 1 {
                for i2 in i1 + 1..len {
                    let entry = PairEntry {
                        row: r,
                        coef_i: vals[i1],
                        coef_j: vals[i2],
                        row_len: len,
                    };
                    match table.entry(pair_key(vars[i1], vars[i2], vals[i1], vals[i2])) {
                        Entry::Vacant(slot) => {
                            slot.insert(entry);
                        }
                        Entry::Occupied(mut slot) => {
                            let held = slot.get();
                            if len < held.row_len || (len == held.row_len && r > held.row) {
                                slot.insert(entry);
                            }
                        }
                    }
                }
            }
        }
        table
    }

    /// Rows eligible as cancellation targets, in the configured order.
    fn candidate_rows(&self, matrix: &MatrixView) -> Vec<RowId> {
        let mut rows: Vec<RowId> = (0..matrix.n_rows())
            .filter(|&r| {
                let origin = matrix.row_origin(r);
                origin.is_linearizable()
                    && (origin != RowOrigin::Linear || self.settings.cancel_linear)
            })
            .collect();
        match self.settings.row_sort {
            RowSort::None => {}
            RowSort::Ascending => rows.sort_by_key(|&r| (matrix.row_len(r), r)),
            RowSort::Descending => rows.sort_by_key(|&r| (I::MAX - matrix.row_len(r), r)),
        }
        rows
    }

    /// Repeatedly combines row `r` with hashed equalities until no improving
    /// pair remains, then hands the rebuilt row to the host.
    fn cancel_row(
        &self,
        host: &mut dyn Host,
        matrix: &MatrixView,
        table: &HashMap<PairKey, PairEntry>,
        r: RowId,
        n_useless: &mut I,
        stats: &mut SparsifyStats,
    ) {
        let mut vars = matrix.row_vars(r).to_vec();
        let mut vals = matrix.row_vals(r).to_vec();
        let mut lhs = matrix.row_lhs(r);
        let mut rhs = matrix.row_rhs(r);
        let origin = matrix.row_origin(r);
        let sense = matrix.row_sense(r);
        // set-packing and logic-or structures must never be weakened
        let need_full_rate =
            matches!(origin, RowOrigin::SetPacking | RowOrigin::LogicOr);

        let mut row_changed = false;
        loop {
            let prefix = vars.len().min(self.settings.max_considered_nonzeros);
            let mut best: Option<Candidate> = None;

            'pairs: for i1 in 0..prefix.saturating_sub(1) {
                for i2 in i1 + 1..prefix {
                    let Some(entry) =
                        table.get(&pair_key(vars[i1], vars[i2], vals[i1], vals[i2]))
                    else {
                        *n_useless += 1;
                        continue;
                    };
                    *n_useless += 1;
                    if entry.row == r {
                        continue;
                    }
                    // confirm the ratio within tolerance; the bucket is coarse
                    if !numerics::is_eq(vals[i2] / vals[i1], entry.coef_j / entry.coef_i) {
                        continue;
                    }

                    let scale = -vals[i1] / entry.coef_i;
                    if !(scale.abs() < SCALE_MAX) {
                        continue;
                    }

                    let Some(sim) =
                        self.simulate(matrix, &vars, &vals, sense, entry.row, scale)
                    else {
                        continue;
                    };

                    let rate = (sim.n_cancel as E - sim.n_fill as E)
                        / matrix.row_len(entry.row) as E;
                    if need_full_rate && !numerics::is_eq(rate, 1.) {
                        continue;
                    }
                    let better = match &best {
                        Some(candidate) => rate > candidate.rate,
                        None => rate > 0.,
                    };
                    if better {
                        let full = numerics::is_eq(rate, 1.);
                        best = Some(Candidate {
                            eq_row: entry.row,
                            scale,
                            rate,
                            n_cancel: sim.n_cancel,
                            n_fill: sim.n_fill,
                        });
                        if full {
                            // pure cancellation, no better rate exists
                            break 'pairs;
                        }
                    }
                }
            }

            let Some(candidate) = best else { break };

            let n_modified = self.apply(
                matrix,
                &mut vars,
                &mut vals,
                &mut lhs,
                &mut rhs,
                candidate.eq_row,
                candidate.scale,
            );
            stats.n_canceled += candidate.n_cancel;
            stats.n_fill_in += candidate.n_fill;
            stats.n_chg_coefs += candidate.n_cancel + candidate.n_fill + n_modified;
            *n_useless = 0;
            row_changed = true;
        }

        if row_changed {
            self.replace_cons(host, matrix, r, &vars, &vals, lhs, rhs, stats);
        }
    }

    /// Walks `row + scale * eq` without materialising it, counting
    /// cancellations, fill-in, and modified coefficients, and enforcing the
    /// budgets, integrality preservation, and lock safety. `None` rejects.
    fn simulate(
        &self,
        matrix: &MatrixView,
        vars: &[VarId],
        vals: &[E],
        sense: RowSense,
        eq_row: RowId,
        scale: E,
    ) -> Option<Simulation> {
        let eq_vars = matrix.row_vars(eq_row);
        let eq_vals = matrix.row_vals(eq_row);

        let mut n_cancel = 0;
        let mut fill = [0 as I; 3]; // binary, integer, continuous
        let (mut a, mut b) = (0, 0);

        while a < vars.len() || b < eq_vars.len() {
            let in_row = a < vars.len();
            let in_eq = b < eq_vars.len();
            if in_row && (!in_eq || vars[a] < eq_vars[b]) {
                a += 1;
                continue;
            }
            if in_eq && (!in_row || eq_vars[b] < vars[a]) {
                // fill-in
                let v = eq_vars[b];
                let new_coef = scale * eq_vals[b];
                let kind = matrix.kind(v);
                if self.settings.preserve_int_coefs
                    && kind.is_integral()
                    && !numerics::is_integral(new_coef)
                {
                    return None;
                }
                let slot = if kind == VarKind::Binary {
                    0
                } else if kind.is_integral() {
                    1
                } else {
                    2
                };
                fill[slot] += 1;
                b += 1;
                continue;
            }

            // shared variable
            let v = vars[a];
            let old_coef = vals[a];
            let new_coef = old_coef + scale * eq_vals[b];
            if numerics::is_zero(new_coef) {
                n_cancel += 1;
            } else {
                if self.settings.preserve_int_coefs
                    && matrix.kind(v).is_integral()
                    && numerics::is_integral(old_coef)
                    && !numerics::is_integral(new_coef)
                {
                    return None;
                }
                if sense == RowSense::Le
                    && old_coef * new_coef < 0.
                    && !self.lock_safe(matrix, v, new_coef)
                {
                    return None;
                }
            }
            a += 1;
            b += 1;
        }

        if fill[0] > self.settings.max_bin_fillin
            || fill[1] > self.settings.max_int_fillin
            || fill[2] > self.settings.max_cont_fillin
        {
            return None;
        }

        Some(Simulation {
            n_cancel,
            n_fill: fill[0] + fill[1] + fill[2],
        })
    }

    /// A sign flip is safe unless it adds a lock in a direction that had at
    /// most one while the opposite direction holds more than one; such a
    /// combination would weaken propagation on `v`.
    fn lock_safe(&self, matrix: &MatrixView, v: VarId, new_coef: E) -> bool {
        let (down, up) = (matrix.n_down_locks(v), matrix.n_up_locks(v));
        if new_coef > 0. {
            !(up <= 1 && down > 1)
        } else {
            !(down <= 1 && up > 1)
        }
    }

    /// Materialises `row + scale * eq` into the working arrays and updates
    /// finite sides by `scale * eq_rhs`. Returns the modified-entry count.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        matrix: &MatrixView,
        vars: &mut Vec<VarId>,
        vals: &mut Vec<E>,
        lhs: &mut E,
        rhs: &mut E,
        eq_row: RowId,
        scale: E,
    ) -> I {
        let eq_vars = matrix.row_vars(eq_row);
        let eq_vals = matrix.row_vals(eq_row);

        let mut new_vars = Vec::with_capacity(vars.len() + eq_vars.len());
        let mut new_vals = Vec::with_capacity(vars.len() + eq_vars.len());
        let mut n_modified = 0;
        let (mut a, mut b) = (0, 0);

        while a < vars.len() || b < eq_vars.len() {
            let in_row = a < vars.len();
            let in_eq = b < eq_vars.len();
            if in_row && (!in_eq || vars[a] < eq_vars[b]) {
                new_vars.push(vars[a]);
                new_vals.push(vals[a]);
                a += 1;
            } else if in_eq && (!in_row || eq_vars[b] < vars[a]) {
                new_vars.push(eq_vars[b]);
                new_vals.push(scale * eq_vals[b]);
                b += 1;
            } else {
                let new_coef = vals[a] + scale * eq_vals[b];
                if !numerics::is_zero(new_coef) {
                    if !numerics::is_eq(new_coef, vals[a]) {
                        n_modified += 1;
                    }
                    new_vars.push(vars[a]);
                    new_vals.push(new_coef);
                }
                a += 1;
                b += 1;
            }
        }

        let eq_rhs = matrix.row_rhs(eq_row);
        if !numerics::is_zero(eq_rhs) {
            if !numerics::is_infinite(*lhs) {
                *lhs += scale * eq_rhs;
            }
            if !numerics::is_infinite(*rhs) {
                *rhs += scale * eq_rhs;
            }
        }

        *vars = new_vars;
        *vals = new_vals;
        n_modified
    }

    /// Replaces the original constraint with the rebuilt row, or deletes it
    /// outright when cancellation emptied the row.
    #[allow(clippy::too_many_arguments)]
    fn replace_cons(
        &self,
        host: &mut dyn Host,
        matrix: &MatrixView,
        r: RowId,
        vars: &[VarId],
        vals: &[E],
        lhs: E,
        rhs: E,
        stats: &mut SparsifyStats,
    ) {
        let cons = matrix.row_cons(r);
        if vars.is_empty() {
            if host.delete_cons(cons).is_ok() {
                stats.n_deleted_rows += 1;
            }
            return;
        }
        let name = format!("c{cons}_sparsified");
        if host
            .add_linear_cons(&name, lhs, rhs, vars, vals, false)
            .is_ok()
            && host.delete_cons(cons).is_ok()
        {
            stats.n_rebuilt_rows += 1;
        }
    }
}
