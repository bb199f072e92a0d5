//! Recognition of components whose generators form a full orbitope matrix.
//!
//! Preconditions: every generator of the component is a product of disjoint
//! 2-cycles, all moved variables are binary, and all generators have the
//! same number of 2-cycles. Two columns are seeded from one generator; the
//! matrix is then extended to the right and to the left by generators whose
//! 2-cycles pair the current outer column with fresh variables, one per row.
//! Detection succeeds only if every generator of the component is consumed,
//! yielding a matrix of shape `(k, nperms + 1)`.

use std::collections::VecDeque;

use crate::{I, VarId};

/// Decomposes `perm` into its transpositions `(v, w)` with `v < w`, in
/// ascending discovery order. `None` if any cycle is longer than two.
pub(crate) fn two_cycles(perm: &[I]) -> Option<Vec<(I, I)>> {
    let mut cycles = Vec::new();
    for v in 0..perm.len() {
        let w = perm[v];
        if w == v {
            continue;
        }
        if perm[w] != v {
            return None;
        }
        if v < w {
            cycles.push((v, w));
        }
    }
    Some(cycles)
}

/// Attempts to recognise the component's generators as a full orbitope.
/// Returns the variable matrix (rows x columns, in permutation-variable
/// indices) on success.
pub fn detect_orbitope(
    perms: &[&[I]],
    n_vars: I,
    mut is_binary: impl FnMut(VarId) -> bool,
) -> Option<Vec<Vec<I>>> {
    if perms.is_empty() {
        return None;
    }

    let mut all_cycles = Vec::with_capacity(perms.len());
    for perm in perms {
        let cycles = two_cycles(perm)?;
        if cycles.iter().any(|&(v, w)| !is_binary(v) || !is_binary(w)) {
            return None;
        }
        all_cycles.push(cycles);
    }

    let n_rows = all_cycles[0].len();
    // a single-row matrix is no orbitope; orbital fixing covers plain swaps
    if n_rows < 2 || all_cycles.iter().any(|c| c.len() != n_rows) {
        return None;
    }

    // Seed two columns from the first generator, rows in discovery order.
    let mut columns: VecDeque<Vec<I>> = VecDeque::new();
    columns.push_back(all_cycles[0].iter().map(|&(v, _)| v).collect());
    columns.push_back(all_cycles[0].iter().map(|&(_, w)| w).collect());
    let mut in_matrix = vec![false; n_vars];
    for col in &columns {
        for &v in col {
            in_matrix[v] = true;
        }
    }

    let mut used = vec![false; perms.len()];
    used[0] = true;
    let mut n_used = 1;

    // Extend right from the last column, then left from the first.
    for left in [false, true] {
        loop {
            let outer = if left { columns.front() } else { columns.back() };
            let outer = outer.cloned().unwrap();
            let mut extended = false;
            for p in 0..perms.len() {
                if used[p] {
                    continue;
                }
                if let Some(col) = extend_column(&all_cycles[p], &outer, &in_matrix) {
                    for &v in &col {
                        in_matrix[v] = true;
                    }
                    if left {
                        columns.push_front(col);
                    } else {
                        columns.push_back(col);
                    }
                    used[p] = true;
                    n_used += 1;
                    extended = true;
                    break;
                }
            }
            if !extended {
                break;
            }
        }
    }

    if n_used < perms.len() {
        return None;
    }

    let n_cols = columns.len();
    let mut matrix = vec![vec![0; n_cols]; n_rows];
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            matrix[i][j] = v;
        }
    }
    Some(matrix)
}

/// A generator extends the outer column cleanly when each of its 2-cycles
/// pairs exactly one outer variable with a variable not yet in the matrix,
/// covering every row exactly once. Returns the fresh column, row-aligned.
fn extend_column(cycles: &[(I, I)], outer: &[I], in_matrix: &[bool]) -> Option<Vec<I>> {
    let mut image = vec![None; outer.len()];
    for &(x, y) in cycles {
        let x_row = outer.iter().position(|&v| v == x);
        let y_row = outer.iter().position(|&v| v == y);
        let (row, fresh) = match (x_row, y_row) {
            (Some(row), None) => (row, y),
            (None, Some(row)) => (row, x),
            _ => return None,
        };
        if in_matrix[fresh] || image[row].is_some() {
            return None;
        }
        image[row] = Some(fresh);
    }
    image.into_iter().collect()
}
