//! Per-pass observer hooks.

use tracing::info;

use crate::sched::PassSummary;

/// Hook invoked once per presolve pass for logging, monitoring, or
/// statistics collection.
pub trait Callback {
    /// Called at the end of each orchestrated pass with its summary.
    fn on_pass(&mut self, summary: &PassSummary);
}

/// A callback that does nothing. Use when no per-pass output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn on_pass(&mut self, _summary: &PassSummary) {
        // Do nothing
    }
}

/// Logs cancellation and fixing counters after every pass.
pub struct StatsOutput {}

impl Callback for StatsOutput {
    fn on_pass(&mut self, summary: &PassSummary) {
        info!(
            timing = ?summary.timing,
            outcome = ?summary.sparsify_outcome,
            n_canceled = summary.sparsify.n_canceled,
            n_fill_in = summary.sparsify.n_fill_in,
            n_chg_coefs = summary.sparsify.n_chg_coefs,
            symmetry_computed = summary.symmetry_computed,
            propagation = ?summary.propagation,
            "presolve pass finished"
        );
    }
}
