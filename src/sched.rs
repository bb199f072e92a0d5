//! Orchestration of the presolve and propagation lifecycle.
//!
//! The host drives three presolve passes (before, during, after) plus one
//! propagation call per node. The orchestrator owns the cached matrix view,
//! the back-off schedules of both presolvers, and the restart policy, and
//! converts the timing parameters into concrete pass decisions: symmetry
//! *computation* timing is independent from symmetry-*constraint* timing,
//! and either can be deferred to the first propagation call.

use derive_more::{Display, Error};
use problemo::{Problem, ProblemResult};
use tracing::info;

use crate::callback::Callback;
use crate::host::{BoundEvent, Host};
use crate::matrix::MatrixView;
use crate::settings::{ComputeTiming, Settings, Timing};
use crate::sparsify::{Sparsifier, SparsifyStats};
use crate::symmetry::SymmetryPropagator;
use crate::symmetry::backend::SymmetryBackend;
use crate::terminators::Terminator;
use crate::{E, I, PassOutcome, Propagation};

/// Orchestration-level failures surfaced to the host. Everything except a
/// symmetry invariant violation is handled by self-disabling instead.
#[derive(Debug, Display, Error)]
pub enum SchedulerError {
    #[display("symmetry pipeline reported an invariant violation")]
    FatalSymmetry,
}

/// Hooks the host threads through every orchestrator call, in the manner of
/// a solver's callback/terminator pair.
pub struct CoreHooks {
    pub callback: Box<dyn Callback>,
    pub terminator: Box<dyn Terminator>,
}

/// Failure/back-off bookkeeping of one presolver: a pass that finds nothing
/// raises `waiting` to `waiting_fac * failures`, and the presolver is
/// skipped until the counter drains.
#[derive(Debug, Clone)]
pub struct Schedule {
    waiting_fac: E,
    failures: I,
    waiting: I,
}

impl Schedule {
    pub fn new(waiting_fac: E) -> Self {
        Self { waiting_fac, failures: 0, waiting: 0 }
    }

    /// Whether the next pass may run; a waiting pass decrements instead.
    pub fn ready(&mut self) -> bool {
        if self.waiting > 0 {
            self.waiting -= 1;
            return false;
        }
        true
    }

    pub fn record(&mut self, outcome: PassOutcome) {
        match outcome {
            PassOutcome::Reduced => {
                self.failures = 0;
                self.waiting = 0;
            }
            PassOutcome::NothingFound => {
                self.failures += 1;
                self.waiting = (self.waiting_fac * self.failures as E) as I;
            }
            PassOutcome::DidNotRun | PassOutcome::Interrupted => {}
        }
    }

    pub fn failures(&self) -> I {
        self.failures
    }
}

/// Outcome summary of one presolve pass, handed to the callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassSummary {
    pub timing: Option<Timing>,
    pub sparsify_outcome: PassOutcome,
    pub sparsify: SparsifyStats,
    pub symmetry_computed: bool,
    pub propagation: Option<Propagation>,
}

/// Presolve/propagation orchestrator owning both subsystems and the shared
/// matrix view.
pub struct Presolver {
    settings: Settings,
    sparsifier: Sparsifier,
    symmetry: SymmetryPropagator,
    matrix: Option<MatrixView>,
    /// Set when a matrix build came back incomplete; the core then stays
    /// disabled for the rest of the run.
    matrix_failed: bool,
    sparsify_schedule: Schedule,
    symmetry_schedule: Schedule,
}

impl Presolver {
    pub fn new(settings: Settings, backend: Box<dyn SymmetryBackend>) -> Self {
        let sparsifier = Sparsifier::new(settings.sparsifier.clone());
        let symmetry = SymmetryPropagator::new(
            settings.symmetry.clone(),
            settings.orbital_fixing.clone(),
            backend,
        );
        let waiting_fac = settings.sparsifier.waiting_fac;
        Self {
            settings,
            sparsifier,
            symmetry,
            matrix: None,
            matrix_failed: false,
            sparsify_schedule: Schedule::new(waiting_fac),
            symmetry_schedule: Schedule::new(waiting_fac),
        }
    }

    pub fn symmetry(&self) -> &SymmetryPropagator {
        &self.symmetry
    }

    /// Any coefficient-altering step outside the orchestrator stales the
    /// cached view; the next consumer rebuilds it.
    pub fn invalidate_matrix(&mut self) {
        self.matrix = None;
    }

    /// Builds (or returns the cached) matrix view. A failed build disables
    /// the core's facilities with a one-line message; the solve continues.
    fn ensure_matrix(&mut self, host: &dyn Host, terminator: &mut dyn Terminator) -> bool {
        if self.matrix_failed {
            return false;
        }
        if self.matrix.is_some() {
            return true;
        }
        match MatrixView::build(host, terminator) {
            Ok(matrix) => {
                self.matrix = Some(matrix);
                true
            }
            Err(failure) => {
                info!("matrix view incomplete, core disabled: {failure}");
                self.matrix_failed = true;
                self.symmetry.disable("matrix view incomplete");
                false
            }
        }
    }

    /// One presolve pass at the given timing.
    pub fn presolve_pass(
        &mut self,
        host: &mut dyn Host,
        timing: Timing,
        hooks: &mut CoreHooks,
    ) -> Result<PassSummary, Problem> {
        let mut summary = PassSummary { timing: Some(timing), ..Default::default() };
        if host.stop_requested() {
            return Ok(summary);
        }

        // Sparsification.
        if self.settings.sparsifier.enable
            && self.settings.sparsifier.timing == timing
            && self.sparsify_schedule.ready()
            && self.ensure_matrix(host, hooks.terminator.as_mut())
        {
            let (outcome, stats) = {
                let matrix = self.matrix.as_ref().unwrap();
                self.sparsifier.run(host, matrix, hooks.terminator.as_mut())
            };
            summary.sparsify_outcome = outcome;
            summary.sparsify = stats;
            self.sparsify_schedule.record(outcome);
            if outcome == PassOutcome::Reduced {
                // rewritten constraints invalidate the projection
                self.matrix = None;
            }
        }

        // Symmetry computation at its own timing.
        if self.compute_due(timing)
            && self.symmetry_schedule.ready()
            && self.ensure_matrix(host, hooks.terminator.as_mut())
        {
            self.compute_symmetry(host, hooks.terminator.as_mut())?;
            summary.symmetry_computed = self.symmetry.is_computed();
            let outcome = if self.symmetry.data().is_some_and(|d| d.n_perms() > 0) {
                PassOutcome::Reduced
            } else {
                PassOutcome::NothingFound
            };
            self.symmetry_schedule.record(outcome);
        }

        // Constraint addition, independently timed.
        if self.conss_due(timing) && self.symmetry.is_computed() && self.matrix.is_some() {
            let matrix = self.matrix.as_ref().unwrap();
            self.symmetry.add_constraints(host, matrix, hooks.terminator.as_mut());
        }

        // Orbital fixing in presolve applies at the root node.
        if self.settings.orbital_fixing.perform_in_presolve && self.symmetry.is_computed() {
            summary.propagation = Some(self.symmetry.propagate(host));
        }

        hooks.callback.on_pass(&summary);
        Ok(summary)
    }

    /// Node propagation: computes symmetry on first demand when configured,
    /// then runs orbital fixing.
    pub fn propagate(
        &mut self,
        host: &mut dyn Host,
        hooks: &mut CoreHooks,
    ) -> Result<Propagation, Problem> {
        if host.stop_requested() {
            return Ok(Propagation::NoChange);
        }

        if self.settings.orbital_fixing.compute_timing == ComputeTiming::FirstCall
            && !self.symmetry.is_computed()
            && self.ensure_matrix(host, hooks.terminator.as_mut())
        {
            self.compute_symmetry(host, hooks.terminator.as_mut())?;
        }
        if self.settings.symmetry.add_conss_timing == ComputeTiming::FirstCall
            && self.symmetry.is_computed()
            && self.ensure_matrix(host, hooks.terminator.as_mut())
        {
            let matrix = self.matrix.as_ref().unwrap();
            self.symmetry.add_constraints(host, matrix, hooks.terminator.as_mut());
        }

        Ok(self.symmetry.propagate(host))
    }

    fn compute_symmetry(
        &mut self,
        host: &mut dyn Host,
        terminator: &mut dyn Terminator,
    ) -> Result<(), Problem> {
        let matrix = self.matrix.as_ref().unwrap();
        self.symmetry
            .compute(host, matrix, terminator)
            .via(SchedulerError::FatalSymmetry)
    }

    fn compute_due(&self, timing: Timing) -> bool {
        if !self.settings.symmetry.enable || self.symmetry.is_computed() {
            return false;
        }
        match self.settings.orbital_fixing.compute_timing {
            ComputeTiming::Before => timing == Timing::Before,
            ComputeTiming::During => timing == Timing::During,
            ComputeTiming::FirstCall => false,
        }
    }

    fn conss_due(&self, timing: Timing) -> bool {
        match self.settings.symmetry.add_conss_timing {
            ComputeTiming::Before => timing == Timing::Before,
            ComputeTiming::During => timing == Timing::During,
            ComputeTiming::FirstCall => false,
        }
    }

    /// Host event entry point.
    pub fn on_bound_event(&mut self, event: BoundEvent) {
        self.symmetry.on_bound_event(event);
    }

    /// Host restart notification.
    pub fn on_new_run(&mut self, host: &mut dyn Host) {
        let recompute = self.settings.orbital_fixing.recompute_on_restart;
        self.symmetry.on_new_run(host, recompute);
        if recompute {
            self.matrix = None;
            self.matrix_failed = false;
        }
    }

    /// Releases all host-side registrations.
    pub fn teardown(&mut self, host: &mut dyn Host) {
        self.symmetry.teardown(host);
        self.matrix = None;
    }
}
