//! Parameter surface of the core.
//!
//! Every tunable recognised by the sparsifier, the symmetry pipeline, and
//! orbital fixing lives here as a plain struct with the documented default.
//! The structs derive [`serde::Deserialize`] so a host configuration layer
//! can populate them from its own parameter facility; the core itself never
//! reads configuration from the environment.

use serde::Deserialize;

use crate::{E, I};

/// Presolve timing at which a pass is allowed to run, matching the three
/// passes the host's presolve loop performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Before,
    During,
    After,
}

/// When the symmetry group is computed (and, independently, when
/// symmetry-handling constraints are added).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeTiming {
    Before,
    During,
    FirstCall,
}

/// Row processing order of the sparsifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSort {
    None,
    Ascending,
    /// Denser rows first; they benefit most from cancellation.
    #[default]
    Descending,
}

/// Parameters of the sparsification presolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SparsifySettings {
    pub enable: bool,
    /// Should rows originating from plain linear constraints be candidates
    /// for cancellation?
    pub cancel_linear: bool,
    /// Reject combinations that turn an integral coefficient on an integer
    /// variable into a fractional one.
    pub preserve_int_coefs: bool,
    /// Per-kind fill-in budgets for a single row combination.
    pub max_cont_fillin: I,
    pub max_bin_fillin: I,
    pub max_int_fillin: I,
    /// Longest equality row seeding the pair table (`None` = unlimited).
    pub max_nonzeros_eq: Option<I>,
    /// Cap on the row prefix whose pairs are probed against the table.
    pub max_considered_nonzeros: I,
    pub row_sort: RowSort,
    /// Useless-retrieve budget, as a multiple of the matrix non-zero count.
    pub max_retrieve_fac: E,
    /// Back-off factor: a failed pass waits `waiting_fac * failures` rounds.
    pub waiting_fac: E,
    pub timing: Timing,
}

impl Default for SparsifySettings {
    fn default() -> Self {
        Self {
            enable: true,
            cancel_linear: true,
            preserve_int_coefs: true,
            max_cont_fillin: 0,
            max_bin_fillin: 0,
            max_int_fillin: 0,
            max_nonzeros_eq: None,
            max_considered_nonzeros: 70,
            row_sort: RowSort::Descending,
            max_retrieve_fac: 100.,
            waiting_fac: 2.,
            timing: Timing::After,
        }
    }
}

/// Variable kinds the host wants pinned during symmetry detection; each such
/// variable receives a unique colour and can never be moved by a generator.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct FixedKinds {
    pub binary: bool,
    pub integer: bool,
    pub implicit_integer: bool,
    pub continuous: bool,
}

/// Parameters of symmetry detection and symmetry-handling constraints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SymmetrySettings {
    pub enable: bool,
    /// Generator-count limit handed to the automorphism backend.
    pub max_generators: I,
    /// Verify every returned generator against the matrix (fatal on failure).
    pub check_symmetries: bool,
    /// Represent an equation by separate `<=` and `>=` nodes.
    pub double_equations: bool,
    pub compress: bool,
    /// Compress when the moved fraction is at or below this threshold.
    pub compress_threshold: E,
    /// Extra colour channel from per-variable constraint counts.
    pub use_column_sparsity: bool,
    pub detect_orbitopes: bool,
    pub detect_subgroups: bool,
    pub add_symresacks: bool,
    pub add_conss_timing: ComputeTiming,
    pub add_weak_sbcs: bool,
    /// Mark added symmetry-handling constraints as initial LP rows.
    pub conss_add_lp: bool,
    pub fixed_kinds: FixedKinds,
}

impl Default for SymmetrySettings {
    fn default() -> Self {
        Self {
            enable: true,
            max_generators: 1500,
            check_symmetries: false,
            double_equations: false,
            compress: true,
            compress_threshold: 0.5,
            use_column_sparsity: false,
            detect_orbitopes: true,
            detect_subgroups: true,
            add_symresacks: true,
            add_conss_timing: ComputeTiming::FirstCall,
            add_weak_sbcs: true,
            conss_add_lp: true,
            fixed_kinds: FixedKinds::default(),
        }
    }
}

/// Parameters of orbital fixing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrbitalSettings {
    pub enable: bool,
    pub compute_timing: ComputeTiming,
    /// Also run the fixing step during presolve (root node).
    pub perform_in_presolve: bool,
    /// Discard and recompute all symmetry data after a restart.
    pub recompute_on_restart: bool,
}

impl Default for OrbitalSettings {
    fn default() -> Self {
        Self {
            enable: true,
            compute_timing: ComputeTiming::FirstCall,
            perform_in_presolve: false,
            recompute_on_restart: false,
        }
    }
}

/// Complete parameter set of the core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sparsifier: SparsifySettings,
    pub symmetry: SymmetrySettings,
    pub orbital_fixing: OrbitalSettings,
}
