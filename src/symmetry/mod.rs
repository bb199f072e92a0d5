//! Symmetry detection and handling.
//!
//! The pipeline: build a coloured graph from the matrix view ([`graph`]),
//! obtain generators from the pluggable automorphism backend ([`backend`]),
//! split them into components ([`components`]), recognise exploitable
//! structure ([`orbitope`], [`subgroup`]) and add symmetry-handling
//! constraints, and perform node-local orbital fixing ([`orbital`]) on
//! whatever remains unblocked.

pub mod backend;
pub mod components;
pub mod graph;
pub mod orbit;
pub mod orbitope;
pub mod subgroup;

pub mod orbital;

use derive_more::{Display, Error};
use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::host::{BoundEvent, Host, OrbitopeKind, VarKind};
use crate::matrix::{MatrixView, RowOrigin};
use crate::numerics;
use crate::settings::{OrbitalSettings, SymmetrySettings};
use crate::terminators::Terminator;
use crate::{E, I, PermId, Propagation, VarId};

use backend::SymmetryBackend;
use components::Components;
use orbital::OrbitalFixer;

/// Compression is only worthwhile on problems at least this large.
const COMPRESS_MIN_VARS: I = 25_000;

/// Fatal conditions of the pipeline. Everything else (unsupported input,
/// absent backend, resource exhaustion) downgrades to self-disabling.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum SymmetryError {
    #[display("generator {perm} is not an automorphism of the matrix")]
    Verification { perm: PermId },
}

/// Permutation storage plus the variable indexing it acts on.
///
/// Permutations are stored twice: row-major (`perms[p][v]`) for orbit
/// closure and verification, and transposed (`transposed[v][p]`) for the
/// per-variable scans of orbital fixing. Both views are built once and only
/// read afterwards.
pub struct SymmetryData {
    /// Host variable behind each permutation index.
    pub permvars: Vec<VarId>,
    pub var_to_perm: HashMap<VarId, I>,
    pub perms: Vec<Vec<I>>,
    pub transposed: Vec<Vec<I>>,
    pub log10_group_size: E,
    pub components: Components,
    /// Whether the index space was compressed to moved variables only.
    pub compressed: bool,
}

impl SymmetryData {
    pub fn new(permvars: Vec<VarId>, perms: Vec<Vec<I>>, log10_group_size: E) -> Self {
        Self::with_compression(permvars, perms, log10_group_size, false)
    }

    fn with_compression(
        permvars: Vec<VarId>,
        perms: Vec<Vec<I>>,
        log10_group_size: E,
        compressed: bool,
    ) -> Self {
        let n = permvars.len();
        let transposed = (0..n)
            .map(|v| perms.iter().map(|p| p[v]).collect())
            .collect();
        let var_to_perm = permvars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let components = Components::build(&perms, n);
        Self {
            permvars,
            var_to_perm,
            perms,
            transposed,
            log10_group_size,
            components,
            compressed,
        }
    }

    pub fn n_permvars(&self) -> I {
        self.permvars.len()
    }

    pub fn n_perms(&self) -> I {
        self.perms.len()
    }

    /// Rewrites the permutations to index only moved variables when the
    /// moved fraction is at or below `threshold` on a sufficiently large
    /// problem. All downstream algorithms then operate on the smaller space.
    pub fn compressed_from(
        permvars: Vec<VarId>,
        perms: Vec<Vec<I>>,
        log10_group_size: E,
        threshold: E,
    ) -> Self {
        let n = permvars.len();
        let mut moved: Vec<I> = (0..n)
            .filter(|&v| perms.iter().any(|p| p[v] != v))
            .collect();
        moved.sort_unstable();

        let fraction = moved.len() as E / n.max(1) as E;
        if n < COMPRESS_MIN_VARS || fraction > threshold {
            return Self::with_compression(permvars, perms, log10_group_size, false);
        }

        let mut old_to_new = vec![I::MAX; n];
        for (new, &old) in moved.iter().enumerate() {
            old_to_new[old] = new;
        }
        let compressed_perms = perms
            .iter()
            .map(|p| moved.iter().map(|&old| old_to_new[p[old]]).collect())
            .collect();
        let compressed_vars = moved.iter().map(|&old| permvars[old]).collect();
        debug!(
            n_moved = moved.len(),
            n_vars = n,
            "compressed permutation storage to moved variables"
        );
        Self::with_compression(compressed_vars, compressed_perms, log10_group_size, true)
    }
}

/// Aggregate counters surfaced to the host's statistics display.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetryStats {
    pub n_generators: I,
    pub log10_group_size: E,
    pub n_components: I,
    pub n_orbitopes: I,
    pub n_subgroup_orbitopes: I,
    pub n_weak_sbcs: I,
    pub n_symresacks: I,
}

/// Lifecycle owner of the symmetry pipeline: computation, constraint
/// addition, orbital fixing, events, restarts, and teardown.
pub struct SymmetryPropagator {
    settings: SymmetrySettings,
    backend: Box<dyn SymmetryBackend>,
    data: Option<SymmetryData>,
    fixer: OrbitalFixer,
    /// Set once symmetry handling failed or was found inapplicable.
    disabled: bool,
    computed: bool,
    conss_added: bool,
    backend_reported: bool,
    last_run: Option<I>,
    stats: SymmetryStats,
}

impl SymmetryPropagator {
    pub fn new(
        settings: SymmetrySettings,
        orbital: OrbitalSettings,
        backend: Box<dyn SymmetryBackend>,
    ) -> Self {
        Self {
            settings,
            backend,
            data: None,
            fixer: OrbitalFixer::new(orbital),
            disabled: false,
            computed: false,
            conss_added: false,
            backend_reported: false,
            last_run: None,
            stats: SymmetryStats::default(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    pub fn data(&self) -> Option<&SymmetryData> {
        self.data.as_ref()
    }

    pub fn stats(&self) -> SymmetryStats {
        self.stats
    }

    /// `(n_fixed_zero, n_fixed_one)` of orbital fixing.
    pub fn fixing_counters(&self) -> (I, I) {
        self.fixer.counters()
    }

    /// Disables the pipeline for the remainder of the run, with a one-line
    /// reason.
    pub fn disable(&mut self, reason: &str) {
        if !self.disabled {
            info!("symmetry handling disabled: {reason}");
        }
        self.disabled = true;
        self.data = None;
    }

    /// Computes the symmetry group from the matrix view. Non-fatal obstacles
    /// (absent backend, trivial colouring) disable the pipeline; only a
    /// failed generator verification is an error.
    pub fn compute(
        &mut self,
        host: &mut dyn Host,
        matrix: &MatrixView,
        terminator: &mut dyn Terminator,
    ) -> Result<(), SymmetryError> {
        if self.disabled || self.computed || !self.settings.enable {
            return Ok(());
        }
        self.computed = true;
        self.last_run = Some(host.run_number());

        let graph = graph::build_colored_graph(matrix, &self.settings);
        if graph.all_var_colors_unique() || graph.all_edge_colors_unique() {
            debug!("colouring is discrete, formulation has no symmetry");
            self.data = Some(SymmetryData::new(Vec::new(), Vec::new(), 0.));
            return Ok(());
        }

        if !self.backend.available() {
            if !self.backend_reported {
                warn!(backend = self.backend.name(), "automorphism backend unavailable");
                self.backend_reported = true;
            }
            self.disable("no automorphism backend");
            return Ok(());
        }

        let generators =
            match self.backend.compute_generators(&graph, self.settings.max_generators) {
                Ok(generators) => generators,
                Err(_) => {
                    self.disable("automorphism backend failed");
                    return Ok(());
                }
            };
        if terminator.terminate().is_some() {
            self.disable("interrupted during symmetry computation");
            return Ok(());
        }

        if self.settings.check_symmetries {
            for (p, perm) in generators.perms.iter().enumerate() {
                if !graph::verify_generator(matrix, perm) {
                    tracing::error!(perm = p, "backend returned a non-automorphism");
                    self.disable("generator verification failed");
                    return Err(SymmetryError::Verification { perm: p });
                }
            }
        }

        let permvars: Vec<VarId> = (0..matrix.n_cols()).collect();
        let data = if self.settings.compress {
            SymmetryData::compressed_from(
                permvars,
                generators.perms,
                generators.log10_group_size,
                self.settings.compress_threshold,
            )
        } else {
            SymmetryData::new(permvars, generators.perms, generators.log10_group_size)
        };

        self.stats.n_generators = data.n_perms();
        self.stats.log10_group_size = data.log10_group_size;
        self.stats.n_components = data.components.n_components();
        info!(
            n_generators = data.n_perms(),
            n_components = data.components.n_components(),
            log10_group_size = data.log10_group_size,
            "symmetry group computed"
        );

        self.fixer.reset(data.n_permvars());
        if self.fixer.enabled() {
            self.fixer.register(host, &data);
        }
        self.data = Some(data);
        Ok(())
    }

    /// Detects orbitopes and subgroup structures per component and adds the
    /// corresponding symmetry-handling constraints through the host.
    /// Components claimed by an exclusive handler are blocked for orbital
    /// fixing; symresacks are per-generator and non-exclusive.
    pub fn add_constraints(
        &mut self,
        host: &mut dyn Host,
        matrix: &MatrixView,
        terminator: &mut dyn Terminator,
    ) {
        if self.disabled || self.conss_added {
            return;
        }
        let Some(data) = self.data.take() else {
            return;
        };
        self.conss_added = true;
        let mut data = data;
        let initial_lp = self.settings.conss_add_lp;

        for c in 0..data.components.n_components() {
            if terminator.terminate().is_some() {
                break;
            }
            if data.components.is_blocked(c) {
                continue;
            }
            let perms: Vec<&[I]> = data
                .components
                .perms_of(c)
                .iter()
                .map(|&p| data.perms[p].as_slice())
                .collect();

            if self.settings.detect_orbitopes
                && let Some(grid) = orbitope::detect_orbitope(&perms, data.n_permvars(), |i| {
                    matrix.kind(data.permvars[i]) == VarKind::Binary
                })
            {
                let var_matrix = to_var_matrix(&data, &grid);
                let kind = classify_orbitope(matrix, &var_matrix);
                let name = format!("orbitope_c{c}");
                if host
                    .add_orbitope_cons(&name, kind, &var_matrix, initial_lp)
                    .is_ok()
                {
                    data.components.block(c);
                    self.stats.n_orbitopes += 1;
                    debug!(component = c, rows = var_matrix.len(), "orbitope detected");
                    continue;
                }
            }

            // a single generator has no subgroup structure worth a graph
            if self.settings.detect_subgroups && perms.len() >= 2 {
                let detection = subgroup::detect_subgroups(&perms, data.n_permvars());
                let mut added = false;
                for grid in &detection.orbitopes {
                    let var_matrix = to_var_matrix(&data, grid);
                    let kind = classify_orbitope(matrix, &var_matrix);
                    let name = format!("suborbitope_c{c}_{}", self.stats.n_subgroup_orbitopes);
                    if host
                        .add_orbitope_cons(&name, kind, &var_matrix, initial_lp)
                        .is_ok()
                    {
                        self.stats.n_subgroup_orbitopes += 1;
                        added = true;
                    }
                }
                if self.settings.add_weak_sbcs {
                    for &(rep, other) in &detection.weak_sbcs {
                        let (rep, other) = (data.permvars[rep], data.permvars[other]);
                        let name = format!("weak_sbc_{rep}_{other}");
                        if host
                            .add_linear_cons(
                                &name,
                                0.,
                                numerics::INFINITY,
                                &[rep, other],
                                &[1., -1.],
                                initial_lp,
                            )
                            .is_ok()
                        {
                            self.stats.n_weak_sbcs += 1;
                            added = true;
                        }
                    }
                }
                if added {
                    data.components.block(c);
                    continue;
                }
            }

            // per-generator lex constraints and orbital fixing are mutually
            // exclusive reductions on a component
            if self.settings.add_symresacks && !self.fixer.enabled() {
                let mut added = false;
                for (k, perm) in perms.iter().enumerate() {
                    if perm.iter().enumerate().all(|(v, &w)| v == w) {
                        continue;
                    }
                    let name = format!("symresack_c{c}_{k}");
                    if host
                        .add_symresack_cons(&name, perm, &data.permvars, initial_lp)
                        .is_ok()
                    {
                        self.stats.n_symresacks += 1;
                        added = true;
                    }
                }
                if added {
                    data.components.block(c);
                }
            }
        }

        self.data = Some(data);
    }

    /// Node propagation entry point; delegates to orbital fixing.
    pub fn propagate(&mut self, host: &mut dyn Host) -> Propagation {
        if self.disabled {
            return Propagation::NoChange;
        }
        match &self.data {
            Some(data) => self.fixer.propagate(host, data),
            None => Propagation::NoChange,
        }
    }

    /// Host event entry point for global bound tightenings.
    pub fn on_bound_event(&mut self, event: BoundEvent) {
        if let Some(data) = &self.data {
            self.fixer.on_bound_event(data, event);
        }
    }

    /// Reacts to a restart: when recompute-on-restart is configured, all
    /// symmetry data is dropped and rebuilt on first demand in the new run.
    pub fn on_new_run(&mut self, host: &mut dyn Host, recompute: bool) {
        let run = host.run_number();
        if self.last_run == Some(run) {
            return;
        }
        self.last_run = Some(run);
        if !recompute {
            return;
        }
        if let Some(data) = self.data.take() {
            self.fixer.unregister(host, &data);
        }
        self.computed = false;
        self.conss_added = false;
        debug!(run, "restart: symmetry data discarded for recomputation");
    }

    /// Releases event registrations and variable captures.
    pub fn teardown(&mut self, host: &mut dyn Host) {
        if let Some(data) = self.data.take() {
            self.fixer.unregister(host, &data);
        }
        self.computed = false;
        self.conss_added = false;
    }
}

fn to_var_matrix(data: &SymmetryData, grid: &[Vec<I>]) -> Vec<Vec<VarId>> {
    grid.iter()
        .map(|row| row.iter().map(|&i| data.permvars[i]).collect())
        .collect()
}

/// Classifies an orbitope by matching each of its rows' variable sets
/// against set-packing/partitioning rows of the matrix.
fn classify_orbitope(matrix: &MatrixView, var_matrix: &[Vec<VarId>]) -> OrbitopeKind {
    let mut ppc_rows: HashMap<Vec<VarId>, RowOrigin> = HashMap::new();
    for r in 0..matrix.n_rows() {
        let origin = matrix.row_origin(r);
        if matches!(origin, RowOrigin::SetPacking | RowOrigin::SetPartitioning) {
            let mut support = matrix.row_vars(r).to_vec();
            support.sort_unstable();
            // partitioning dominates packing on identical support
            ppc_rows
                .entry(support)
                .and_modify(|held| {
                    if origin == RowOrigin::SetPartitioning {
                        *held = origin;
                    }
                })
                .or_insert(origin);
        }
    }

    let mut all_packing = true;
    let mut all_partitioning = true;
    for row in var_matrix {
        let mut support = row.clone();
        support.sort_unstable();
        match ppc_rows.get(&support) {
            Some(RowOrigin::SetPartitioning) => all_packing = false,
            Some(RowOrigin::SetPacking) => all_partitioning = false,
            _ => {
                all_packing = false;
                all_partitioning = false;
            }
        }
    }
    if all_partitioning {
        OrbitopeKind::Partitioning
    } else if all_packing {
        OrbitopeKind::Packing
    } else {
        OrbitopeKind::Full
    }
}
