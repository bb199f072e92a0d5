//! Shared test infrastructure: the in-memory solver host and the
//! end-to-end scenarios driving the orchestrated core against it.

pub mod host;

use problemo::Problem;

use crate::symmetry::backend::{GeneratorSet, SymmetryBackend};
use crate::symmetry::graph::ColoredGraph;
use crate::{E, I};

/// Backend returning a fixed generator list, for driving the pipeline
/// without a real automorphism solver.
pub struct ScriptedBackend {
    pub perms: Vec<Vec<I>>,
    pub log10_group_size: E,
}

impl ScriptedBackend {
    pub fn new(perms: Vec<Vec<I>>) -> Self {
        Self { perms, log10_group_size: 0. }
    }
}

impl SymmetryBackend for ScriptedBackend {
    fn available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn compute_generators(
        &self,
        _graph: &ColoredGraph,
        max_generators: I,
    ) -> Result<GeneratorSet, Problem> {
        let mut perms = self.perms.clone();
        perms.truncate(max_generators);
        Ok(GeneratorSet { perms, log10_group_size: self.log10_group_size })
    }
}
