//! Coloured-graph construction for automorphism detection, plus generator
//! verification against the matrix.
//!
//! The graph is bipartite: one node per matrix column, one (or, for doubled
//! equations, two) nodes per row, and one edge per non-zero. Colours encode
//! everything a permutation must preserve:
//!
//! - variable nodes by (objective, lower bound, upper bound, kind), with a
//!   unique colour for every variable of a kind the host pinned, and an
//!   optional extra channel from the column's non-zero count;
//! - row nodes by (sense, right-hand side), sense ordered strictly before
//!   value so numeric noise can never merge rows across senses;
//! - edges by coefficient value under tolerance equality.

use hashbrown::HashMap;

use crate::host::VarKind;
use crate::matrix::{MatrixView, RowSense};
use crate::numerics::{self, tolerance_classes};
use crate::settings::SymmetrySettings;
use crate::{E, I, RowId, VarId};

/// One non-zero of the matrix as a coloured edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub var: VarId,
    pub rhs_node: I,
    pub color: I,
}

/// Coloured bipartite graph handed to the automorphism backend.
#[derive(Debug, Clone)]
pub struct ColoredGraph {
    pub n_vars: I,
    pub var_colors: Vec<I>,
    pub n_var_colors: I,
    /// Colour of each row node; equations contribute a second node when
    /// `double_equations` is set.
    pub rhs_colors: Vec<I>,
    pub edges: Vec<GraphEdge>,
    pub n_edge_colors: I,
}

impl ColoredGraph {
    /// Every variable in its own colour class: the identity is the only
    /// automorphism and the backend call can be skipped.
    pub fn all_var_colors_unique(&self) -> bool {
        self.n_var_colors == self.n_vars
    }

    /// Every coefficient in its own colour class; same shortcut.
    pub fn all_edge_colors_unique(&self) -> bool {
        self.n_edge_colors == self.edges.len()
    }
}

/// Sense code of a row node; the discriminant orders before the value class
/// in the colour key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SenseCode {
    Le,
    Eq,
    /// The `>=` half of a doubled equation.
    Ge,
}

pub fn build_colored_graph(matrix: &MatrixView, settings: &SymmetrySettings) -> ColoredGraph {
    let n_vars = matrix.n_cols();

    // Tolerance classes per colouring channel.
    let obj_classes = tolerance_classes(&(0..n_vars).map(|v| matrix.obj(v)).collect::<Vec<E>>());
    let lb_classes = tolerance_classes(&(0..n_vars).map(|v| matrix.lb(v)).collect::<Vec<E>>());
    let ub_classes = tolerance_classes(&(0..n_vars).map(|v| matrix.ub(v)).collect::<Vec<E>>());
    let rhs_classes =
        tolerance_classes(&(0..matrix.n_rows()).map(|r| matrix.row_rhs(r)).collect::<Vec<E>>());
    let coef_classes = tolerance_classes(matrix.all_vals());

    let fixed = |kind: VarKind| match kind {
        VarKind::Binary => settings.fixed_kinds.binary,
        VarKind::Integer => settings.fixed_kinds.integer,
        VarKind::ImplicitInteger => settings.fixed_kinds.implicit_integer,
        VarKind::Continuous => settings.fixed_kinds.continuous,
    };

    // Variable colours: intern the per-variable key; pinned kinds always get
    // a fresh colour so no permutation can move them.
    let mut var_color_ids: HashMap<(I, I, I, u8, I), I> = HashMap::new();
    let mut var_colors = Vec::with_capacity(n_vars);
    let mut next_color = 0;
    for v in 0..n_vars {
        let kind = matrix.kind(v);
        if fixed(kind) {
            var_colors.push(next_color);
            next_color += 1;
            continue;
        }
        let sparsity = if settings.use_column_sparsity { matrix.col_len(v) } else { 0 };
        let key = (obj_classes[v], lb_classes[v], ub_classes[v], kind_code(kind), sparsity);
        let color = *var_color_ids.entry(key).or_insert_with(|| {
            let c = next_color;
            next_color += 1;
            c
        });
        var_colors.push(color);
    }
    let n_var_colors = next_color;

    // Row nodes coloured by (sense, rhs class), sense strictly first.
    let mut rhs_color_ids: HashMap<(SenseCode, I), I> = HashMap::new();
    let mut rhs_colors = Vec::new();
    let mut node_of_row: Vec<(I, Option<I>)> = Vec::with_capacity(matrix.n_rows());
    for r in 0..matrix.n_rows() {
        let sense = matrix.row_sense(r);
        let code = match sense {
            RowSense::Le => SenseCode::Le,
            RowSense::Eq => SenseCode::Eq,
        };
        let primary = intern_rhs(&mut rhs_color_ids, &mut rhs_colors, (code, rhs_classes[r]));
        let secondary = (sense == RowSense::Eq && settings.double_equations).then(|| {
            intern_rhs(&mut rhs_color_ids, &mut rhs_colors, (SenseCode::Ge, rhs_classes[r]))
        });
        node_of_row.push((primary, secondary));
    }

    // One edge per non-zero, coloured by coefficient class; doubled
    // equations replicate their edges onto the second node.
    let mut edges = Vec::with_capacity(matrix.nnz());
    let mut k = 0;
    for r in 0..matrix.n_rows() as RowId {
        let (primary, secondary) = node_of_row[r];
        for &v in matrix.row_vars(r) {
            edges.push(GraphEdge { var: v, rhs_node: primary, color: coef_classes[k] });
            if let Some(node) = secondary {
                edges.push(GraphEdge { var: v, rhs_node: node, color: coef_classes[k] });
            }
            k += 1;
        }
    }
    let n_edge_colors = edges.iter().map(|e| e.color).max().map_or(0, |c| c + 1);

    ColoredGraph { n_vars, var_colors, n_var_colors, rhs_colors, edges, n_edge_colors }
}

fn kind_code(kind: VarKind) -> u8 {
    match kind {
        VarKind::Binary => 0,
        VarKind::Integer => 1,
        VarKind::ImplicitInteger => 2,
        VarKind::Continuous => 3,
    }
}

fn intern_rhs(
    ids: &mut HashMap<(SenseCode, I), I>,
    colors: &mut Vec<I>,
    key: (SenseCode, I),
) -> I {
    let next = ids.len();
    let color = *ids.entry(key).or_insert(next);
    colors.push(color);
    colors.len() - 1
}

/// Checks that applying `perm` (over matrix columns) to every row yields a
/// row of the same sense and right-hand side with a tolerance-equal
/// coefficient pattern. A failure means the backend returned a
/// non-automorphism, which is fatal for the pipeline.
pub fn verify_generator(matrix: &MatrixView, perm: &[I]) -> bool {
    // Bucket rows by (sense, rhs bucket) for candidate lookup.
    let mut buckets: HashMap<(RowSense, u64), Vec<RowId>> = HashMap::new();
    for r in 0..matrix.n_rows() {
        buckets
            .entry((matrix.row_sense(r), numerics::hash_bucket(matrix.row_rhs(r))))
            .or_default()
            .push(r);
    }

    for r in 0..matrix.n_rows() {
        let mut permuted: Vec<(VarId, E)> = matrix
            .row_vars(r)
            .iter()
            .zip(matrix.row_vals(r))
            .map(|(&v, &c)| (perm[v], c))
            .collect();
        permuted.sort_by_key(|&(v, _)| v);

        let key = (matrix.row_sense(r), numerics::hash_bucket(matrix.row_rhs(r)));
        let found = buckets.get(&key).is_some_and(|candidates| {
            candidates.iter().any(|&r2| {
                numerics::is_eq(matrix.row_rhs(r2), matrix.row_rhs(r))
                    && numerics::is_eq(matrix.row_lhs(r2), matrix.row_lhs(r))
                    && rows_match(matrix, r2, &permuted)
            })
        });
        if !found {
            return false;
        }
    }
    true
}

fn rows_match(matrix: &MatrixView, r: RowId, permuted: &[(VarId, E)]) -> bool {
    let vars = matrix.row_vars(r);
    let vals = matrix.row_vals(r);
    vars.len() == permuted.len()
        && vars
            .iter()
            .zip(vals)
            .zip(permuted)
            .all(|((&v, &c), &(pv, pc))| v == pv && numerics::is_eq(c, pc))
}
