//! Pluggable graph-automorphism backend.
//!
//! Symmetry detection hands the coloured graph to an external solver
//! selected at startup. The capability is probed through
//! [`SymmetryBackend::available`]; when no backend is present the pipeline
//! disables itself and reports the absence once.

use problemo::Problem;

use crate::symmetry::graph::ColoredGraph;
use crate::{E, I};

/// Generators returned by the backend: permutations over the graph's
/// variable nodes plus the order of the group they generate.
#[derive(Debug, Clone, Default)]
pub struct GeneratorSet {
    pub perms: Vec<Vec<I>>,
    pub log10_group_size: E,
}

/// Automorphism-computation capability.
pub trait SymmetryBackend {
    /// Whether the backend can be invoked in this build/configuration.
    fn available(&self) -> bool;

    fn name(&self) -> &'static str;

    /// Computes up to `max_generators` automorphism generators of the
    /// coloured bipartite graph. Every returned permutation must respect all
    /// three colour channels (variables, right-hand sides, coefficients).
    fn compute_generators(
        &self,
        graph: &ColoredGraph,
        max_generators: I,
    ) -> Result<GeneratorSet, Problem>;
}

/// Placeholder used when the build carries no automorphism solver.
pub struct NoBackend;

impl SymmetryBackend for NoBackend {
    fn available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn compute_generators(
        &self,
        _graph: &ColoredGraph,
        _max_generators: I,
    ) -> Result<GeneratorSet, Problem> {
        Ok(GeneratorSet::default())
    }
}
