//! Contract between the core and the solver host.
//!
//! The host owns variables, constraints, the search tree, and the clock; the
//! core holds stable numeric indices into the host's tables and talks to it
//! exclusively through the [`Host`] trait. Constraint payloads cross the
//! boundary as the [`ConsData`] tagged variant; each variant knows how to
//! normalise itself into matrix rows (see [`crate::matrix::normalize`]).

use enum_dispatch::enum_dispatch;
use problemo::Problem;

use crate::{ConsId, E, I, NodeId, VarId};

/// Kind of a host variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Binary,
    Integer,
    ImplicitInteger,
    Continuous,
}

impl VarKind {
    /// Binary, integer, or implicit-integer.
    pub fn is_integral(&self) -> bool {
        !matches!(self, VarKind::Continuous)
    }
}

/// Sense of a bound-disjunction literal: `Lower` is `(x >= b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSense {
    Lower,
    Upper,
}

/// Which bound of a variable an event or branching decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Lower,
    Upper,
}

/// Shape of an orbitope constraint handed back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitopeKind {
    Packing,
    Partitioning,
    Full,
}

/// `lhs <= a^T x <= rhs` with explicit coefficients.
#[derive(Debug, Clone)]
pub struct LinearCons {
    pub lhs: E,
    pub rhs: E,
    pub vars: Vec<VarId>,
    pub coefs: Vec<E>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPpcKind {
    Packing,
    Partitioning,
    Covering,
}

/// All-ones constraint over binary variables: `sum x_i {<=,=,>=} 1`.
#[derive(Debug, Clone)]
pub struct SetPpcCons {
    pub kind: SetPpcKind,
    pub vars: Vec<VarId>,
}

/// `sum w_i x_i <= capacity` with integer weights over binary variables.
#[derive(Debug, Clone)]
pub struct KnapsackCons {
    pub vars: Vec<VarId>,
    pub weights: Vec<i64>,
    pub capacity: i64,
}

/// `x_1 xor ... xor x_n = rhs`, optionally with the integer slack variable
/// that linearises the parity condition.
#[derive(Debug, Clone)]
pub struct XorCons {
    pub vars: Vec<VarId>,
    pub rhs: bool,
    pub int_var: Option<VarId>,
}

/// `resultant = x_1 and ... and x_n`.
#[derive(Debug, Clone)]
pub struct AndCons {
    pub resultant: VarId,
    pub operands: Vec<VarId>,
}

/// `resultant = x_1 or ... or x_n`.
#[derive(Debug, Clone)]
pub struct OrCons {
    pub resultant: VarId,
    pub operands: Vec<VarId>,
}

/// `x_1 or ... or x_n` over binary variables.
#[derive(Debug, Clone)]
pub struct LogicOrCons {
    pub vars: Vec<VarId>,
}

/// `lhs <= x + c * y <= rhs`.
#[derive(Debug, Clone)]
pub struct VarboundCons {
    pub var: VarId,
    pub bound_var: VarId,
    pub bound_coef: E,
    pub lhs: E,
    pub rhs: E,
}

/// `link_var = sum vals_j y_j` with `sum y_j = 1` over binary `y`.
#[derive(Debug, Clone)]
pub struct LinkingCons {
    pub link_var: VarId,
    pub bin_vars: Vec<VarId>,
    pub vals: Vec<E>,
}

/// Disjunction of bound literals `(x_i >= b_i)` / `(x_i <= b_i)`.
#[derive(Debug, Clone)]
pub struct BoundDisjunctionCons {
    pub vars: Vec<VarId>,
    pub senses: Vec<BoundSense>,
    pub bounds: Vec<E>,
}

/// Constraint payload by handler kind. One normalisation function per
/// variant, dispatched once at constraint-walk time.
#[enum_dispatch(NormalizeCons)]
#[derive(Debug, Clone)]
pub enum ConsData {
    Linear(LinearCons),
    SetPpc(SetPpcCons),
    Knapsack(KnapsackCons),
    Xor(XorCons),
    And(AndCons),
    Or(OrCons),
    LogicOr(LogicOrCons),
    Varbound(VarboundCons),
    Linking(LinkingCons),
    BoundDisjunction(BoundDisjunctionCons),
}

/// Outcome of a bound-tightening primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TightenResult {
    pub infeasible: bool,
    pub tightened: bool,
}

/// One branching decision on the path from a node towards the root.
#[derive(Debug, Clone, Copy)]
pub struct BranchDecision {
    pub var: VarId,
    pub kind: BoundKind,
    pub new_bound: E,
}

/// A global bound change delivered by the host's event system.
#[derive(Debug, Clone, Copy)]
pub struct BoundEvent {
    pub var: VarId,
    pub kind: BoundKind,
    pub new_bound: E,
}

/// Handle of a variable-event subscription, returned by the host and handed
/// back on deregistration.
pub type EventToken = I;

/// Capabilities the core requires from its solver host.
///
/// Variable and constraint handles are plain indices that stay valid for the
/// lifetime of a run; a released variable becomes inactive rather than
/// invalidating other indices. All callbacks of the core run synchronously
/// on the host's thread.
pub trait Host {
    // -- variable introspection --

    fn n_vars(&self) -> I;
    fn var_kind(&self, var: VarId) -> VarKind;
    fn var_obj(&self, var: VarId) -> E;
    /// Global lower bound.
    fn var_lb(&self, var: VarId) -> E;
    /// Global upper bound.
    fn var_ub(&self, var: VarId) -> E;
    /// Bound local to the node currently being processed.
    fn var_local_lb(&self, var: VarId) -> E;
    fn var_local_ub(&self, var: VarId) -> E;
    fn var_n_down_locks(&self, var: VarId) -> I;
    fn var_n_up_locks(&self, var: VarId) -> I;
    fn var_is_active(&self, var: VarId) -> bool;
    fn var_allows_multi_aggregation(&self, var: VarId) -> bool;
    /// Reference-counts the variable so the host may not delete it.
    fn capture_var(&mut self, var: VarId);
    fn release_var(&mut self, var: VarId);

    // -- constraint enumeration and lifecycle --

    /// Handles of all active transformed constraints.
    fn conss(&self) -> Vec<ConsId>;
    /// Payload of a constraint, or `None` for a handler kind the core
    /// cannot model (the caller then disables itself).
    fn cons_data(&self, cons: ConsId) -> Option<ConsData>;
    fn cons_is_active(&self, cons: ConsId) -> bool;
    fn cons_is_transformed(&self, cons: ConsId) -> bool;
    /// Conflict constraints are skipped by the matrix projection.
    fn cons_is_conflict(&self, cons: ConsId) -> bool;

    fn add_linear_cons(
        &mut self,
        name: &str,
        lhs: E,
        rhs: E,
        vars: &[VarId],
        coefs: &[E],
        initial_lp: bool,
    ) -> Result<ConsId, Problem>;

    fn add_orbitope_cons(
        &mut self,
        name: &str,
        kind: OrbitopeKind,
        var_matrix: &[Vec<VarId>],
        initial_lp: bool,
    ) -> Result<ConsId, Problem>;

    fn add_symresack_cons(
        &mut self,
        name: &str,
        perm: &[I],
        vars: &[VarId],
        initial_lp: bool,
    ) -> Result<ConsId, Problem>;

    fn delete_cons(&mut self, cons: ConsId) -> Result<(), Problem>;

    // -- bound tightening (local to the current node) --

    fn tighten_lb(&mut self, var: VarId, new_bound: E) -> TightenResult;
    fn tighten_ub(&mut self, var: VarId, new_bound: E) -> TightenResult;

    // -- variable events --

    /// Subscribes to global bound tightenings of `var`; events arrive through
    /// the core's event entry points in the order the host performs them.
    fn subscribe_global_bound(&mut self, var: VarId) -> EventToken;
    fn unsubscribe_global_bound(&mut self, token: EventToken);

    // -- tree navigation --

    fn current_node(&self) -> NodeId;
    fn depth(&self) -> I;
    fn in_probing(&self) -> bool;
    fn in_repropagation(&self) -> bool;
    /// Branching bound changes on the path from the current node to the
    /// root, in root-to-node order.
    fn branching_path(&self) -> Vec<BranchDecision>;

    // -- control --

    fn stop_requested(&self) -> bool;
    /// Seconds spent solving so far.
    fn solving_time(&self) -> E;
    /// Restart counter; increments when the host starts a new run.
    fn run_number(&self) -> I;
}
