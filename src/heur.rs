//! Trivial rounding heuristic.
//!
//! Rounds fractional values of integral variables that may round in at
//! least one direction without violating any constraint (zero locks in that
//! direction). Kept deliberately minimal; it exists as the primal
//! collaborator the end-to-end tests drive.

use crate::host::Host;
use crate::numerics::{self, ceil_tol, floor_tol};
use crate::{E, VarId};

/// Rounds `value` for a variable with the given roundability. When both
/// directions are admissible, the objective sign decides: down for a
/// non-negative objective coefficient, up otherwise.
pub fn round_value(value: E, obj: E, may_round_down: bool, may_round_up: bool) -> Option<E> {
    match (may_round_down, may_round_up) {
        (true, true) => Some(if obj >= 0. { floor_tol(value) } else { ceil_tol(value) }),
        (true, false) => Some(floor_tol(value)),
        (false, true) => Some(ceil_tol(value)),
        (false, false) => None,
    }
}

/// Rounds every fractional integral variable of `solution` in place, using
/// the host's lock counts for roundability. Returns `false` when some
/// fractional variable cannot be rounded in either direction.
pub fn round_solution(host: &dyn Host, solution: &mut [E]) -> bool {
    for (v, value) in solution.iter_mut().enumerate() {
        let var = v as VarId;
        if !host.var_kind(var).is_integral() || numerics::is_integral(*value) {
            continue;
        }
        let may_down = host.var_n_down_locks(var) == 0;
        let may_up = host.var_n_up_locks(var) == 0;
        match round_value(*value, host.var_obj(var), may_down, may_up) {
            Some(rounded) => *value = rounded,
            None => return false,
        }
    }
    true
}
