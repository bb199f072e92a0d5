//! In-memory [`Host`] implementation backing the unit and scenario tests.
//!
//! The fixture keeps the full problem state (variables with global and local
//! bounds, constraints as [`ConsData`] payloads) and records every mutation
//! the core performs: added linear/orbitope/symresack constraints, deleted
//! constraints, event subscriptions, and variable captures. Global-bound
//! events are *not* pushed automatically; scenarios deliver them explicitly
//! so event order stays under test control.

use problemo::Problem;

use crate::host::{
    BranchDecision, ConsData, EventToken, Host, OrbitopeKind, TightenResult, VarKind,
};
use crate::numerics::{self, INFINITY};
use crate::{ConsId, E, I, NodeId, VarId};

struct TestVar {
    kind: VarKind,
    obj: E,
    lb: E,
    ub: E,
    llb: E,
    lub: E,
    down_locks: I,
    up_locks: I,
    active: bool,
    captures: i64,
}

struct TestCons {
    /// `None` models a handler kind the core cannot normalise.
    data: Option<ConsData>,
    active: bool,
    transformed: bool,
    conflict: bool,
}

/// Record of a linear constraint the core added.
#[derive(Debug, Clone)]
pub struct AddedLinear {
    pub name: String,
    pub lhs: E,
    pub rhs: E,
    pub vars: Vec<VarId>,
    pub coefs: Vec<E>,
}

#[derive(Debug, Clone)]
pub struct AddedOrbitope {
    pub name: String,
    pub kind: OrbitopeKind,
    pub var_matrix: Vec<Vec<VarId>>,
}

#[derive(Debug, Clone)]
pub struct AddedSymresack {
    pub name: String,
    pub perm: Vec<I>,
    pub vars: Vec<VarId>,
}

#[derive(Default)]
pub struct TestHost {
    vars: Vec<TestVar>,
    conss: Vec<TestCons>,

    added_linear: Vec<AddedLinear>,
    added_orbitopes: Vec<AddedOrbitope>,
    added_symresacks: Vec<AddedSymresack>,
    deleted: Vec<ConsId>,

    path: Vec<BranchDecision>,
    probing: bool,
    repropagation: bool,
    stop: bool,
    run: I,
    node: NodeId,
    depth: I,

    next_token: EventToken,
    subscriptions: Vec<(EventToken, VarId)>,
}

impl TestHost {
    pub fn new() -> Self {
        Self { run: 1, ..Default::default() }
    }

    pub fn add_var(&mut self, kind: VarKind, obj: E, lb: E, ub: E) -> VarId {
        self.vars.push(TestVar {
            kind,
            obj,
            lb,
            ub,
            llb: lb,
            lub: ub,
            down_locks: 0,
            up_locks: 0,
            active: true,
            captures: 0,
        });
        self.vars.len() - 1
    }

    pub fn add_binary(&mut self) -> VarId {
        self.add_var(VarKind::Binary, 0., 0., 1.)
    }

    pub fn add_continuous(&mut self, obj: E) -> VarId {
        self.add_var(VarKind::Continuous, obj, -INFINITY, INFINITY)
    }

    pub fn set_obj(&mut self, var: VarId, obj: E) {
        self.vars[var].obj = obj;
    }

    pub fn set_locks(&mut self, var: VarId, down: I, up: I) {
        self.vars[var].down_locks = down;
        self.vars[var].up_locks = up;
    }

    pub fn add_cons(&mut self, data: ConsData) -> ConsId {
        self.conss.push(TestCons { data: Some(data), active: true, transformed: true, conflict: false });
        self.conss.len() - 1
    }

    /// A constraint of a handler kind the core cannot model.
    pub fn add_unsupported_cons(&mut self) -> ConsId {
        self.conss.push(TestCons { data: None, active: true, transformed: true, conflict: false });
        self.conss.len() - 1
    }

    /// Fixes the variable globally (and hence locally) to the bound.
    pub fn fix_ub(&mut self, var: VarId, value: E) {
        self.vars[var].ub = value;
        self.vars[var].lub = self.vars[var].lub.min(value);
    }

    pub fn fix_lb(&mut self, var: VarId, value: E) {
        self.vars[var].lb = value;
        self.vars[var].llb = self.vars[var].llb.max(value);
    }

    pub fn set_branching_path(&mut self, path: Vec<BranchDecision>) {
        self.depth = path.len();
        self.path = path;
    }

    pub fn set_probing(&mut self, probing: bool) {
        self.probing = probing;
    }

    pub fn set_repropagation(&mut self, repropagation: bool) {
        self.repropagation = repropagation;
    }

    pub fn set_stop(&mut self, stop: bool) {
        self.stop = stop;
    }

    pub fn set_node(&mut self, node: NodeId) {
        self.node = node;
    }

    /// Simulates a restart into a fresh run.
    pub fn advance_run(&mut self) {
        self.run += 1;
        self.path.clear();
        self.depth = 0;
        self.node = 0;
        for var in &mut self.vars {
            var.llb = var.lb;
            var.lub = var.ub;
        }
    }

    pub fn added_linear(&self) -> &[AddedLinear] {
        &self.added_linear
    }

    pub fn added_orbitopes(&self) -> &[AddedOrbitope] {
        &self.added_orbitopes
    }

    pub fn added_symresacks(&self) -> &[AddedSymresack] {
        &self.added_symresacks
    }

    pub fn deleted(&self) -> &[ConsId] {
        &self.deleted
    }

    pub fn n_subscriptions(&self) -> I {
        self.subscriptions.len()
    }

    pub fn n_captured(&self) -> i64 {
        self.vars.iter().map(|v| v.captures).sum()
    }
}

impl Host for TestHost {
    fn n_vars(&self) -> I {
        self.vars.len()
    }

    fn var_kind(&self, var: VarId) -> VarKind {
        self.vars[var].kind
    }

    fn var_obj(&self, var: VarId) -> E {
        self.vars[var].obj
    }

    fn var_lb(&self, var: VarId) -> E {
        self.vars[var].lb
    }

    fn var_ub(&self, var: VarId) -> E {
        self.vars[var].ub
    }

    fn var_local_lb(&self, var: VarId) -> E {
        self.vars[var].llb
    }

    fn var_local_ub(&self, var: VarId) -> E {
        self.vars[var].lub
    }

    fn var_n_down_locks(&self, var: VarId) -> I {
        self.vars[var].down_locks
    }

    fn var_n_up_locks(&self, var: VarId) -> I {
        self.vars[var].up_locks
    }

    fn var_is_active(&self, var: VarId) -> bool {
        self.vars[var].active
    }

    fn var_allows_multi_aggregation(&self, _var: VarId) -> bool {
        true
    }

    fn capture_var(&mut self, var: VarId) {
        self.vars[var].captures += 1;
    }

    fn release_var(&mut self, var: VarId) {
        self.vars[var].captures -= 1;
    }

    fn conss(&self) -> Vec<ConsId> {
        (0..self.conss.len()).collect()
    }

    fn cons_data(&self, cons: ConsId) -> Option<ConsData> {
        self.conss[cons].data.clone()
    }

    fn cons_is_active(&self, cons: ConsId) -> bool {
        self.conss[cons].active
    }

    fn cons_is_transformed(&self, cons: ConsId) -> bool {
        self.conss[cons].transformed
    }

    fn cons_is_conflict(&self, cons: ConsId) -> bool {
        self.conss[cons].conflict
    }

    fn add_linear_cons(
        &mut self,
        name: &str,
        lhs: E,
        rhs: E,
        vars: &[VarId],
        coefs: &[E],
        _initial_lp: bool,
    ) -> Result<ConsId, Problem> {
        self.added_linear.push(AddedLinear {
            name: name.to_string(),
            lhs,
            rhs,
            vars: vars.to_vec(),
            coefs: coefs.to_vec(),
        });
        Ok(self.add_cons(ConsData::Linear(crate::host::LinearCons {
            lhs,
            rhs,
            vars: vars.to_vec(),
            coefs: coefs.to_vec(),
        })))
    }

    fn add_orbitope_cons(
        &mut self,
        name: &str,
        kind: OrbitopeKind,
        var_matrix: &[Vec<VarId>],
        _initial_lp: bool,
    ) -> Result<ConsId, Problem> {
        self.added_orbitopes.push(AddedOrbitope {
            name: name.to_string(),
            kind,
            var_matrix: var_matrix.to_vec(),
        });
        // handled by a specialised host-side handler, not walked as a row
        Ok(I::MAX - self.added_orbitopes.len())
    }

    fn add_symresack_cons(
        &mut self,
        name: &str,
        perm: &[I],
        vars: &[VarId],
        _initial_lp: bool,
    ) -> Result<ConsId, Problem> {
        self.added_symresacks.push(AddedSymresack {
            name: name.to_string(),
            perm: perm.to_vec(),
            vars: vars.to_vec(),
        });
        Ok(I::MAX - self.added_symresacks.len())
    }

    fn delete_cons(&mut self, cons: ConsId) -> Result<(), Problem> {
        self.conss[cons].active = false;
        self.deleted.push(cons);
        Ok(())
    }

    fn tighten_lb(&mut self, var: VarId, new_bound: E) -> TightenResult {
        let v = &mut self.vars[var];
        if new_bound <= v.llb + numerics::EPS {
            return TightenResult { infeasible: false, tightened: false };
        }
        if numerics::is_gt(new_bound, v.lub) {
            return TightenResult { infeasible: true, tightened: false };
        }
        v.llb = new_bound;
        TightenResult { infeasible: false, tightened: true }
    }

    fn tighten_ub(&mut self, var: VarId, new_bound: E) -> TightenResult {
        let v = &mut self.vars[var];
        if new_bound >= v.lub - numerics::EPS {
            return TightenResult { infeasible: false, tightened: false };
        }
        if numerics::is_lt(new_bound, v.llb) {
            return TightenResult { infeasible: true, tightened: false };
        }
        v.lub = new_bound;
        TightenResult { infeasible: false, tightened: true }
    }

    fn subscribe_global_bound(&mut self, var: VarId) -> EventToken {
        let token = self.next_token;
        self.next_token += 1;
        self.subscriptions.push((token, var));
        token
    }

    fn unsubscribe_global_bound(&mut self, token: EventToken) {
        self.subscriptions.retain(|&(t, _)| t != token);
    }

    fn current_node(&self) -> NodeId {
        self.node
    }

    fn depth(&self) -> I {
        self.depth
    }

    fn in_probing(&self) -> bool {
        self.probing
    }

    fn in_repropagation(&self) -> bool {
        self.repropagation
    }

    fn branching_path(&self) -> Vec<BranchDecision> {
        self.path.clone()
    }

    fn stop_requested(&self) -> bool {
        self.stop
    }

    fn solving_time(&self) -> E {
        0.
    }

    fn run_number(&self) -> I {
        self.run
    }
}
