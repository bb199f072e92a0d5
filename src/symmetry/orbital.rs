//! Orbital fixing: node-local propagation of 0/1 fixings across variable
//! orbits under the stabiliser of the branching decisions.
//!
//! The fixer tracks two global sets through host events: `bg0`, variables
//! whose global upper bound was tightened to zero, and `bg1`, variables
//! globally fixed to one. At a node, the branching path's 1-branchings
//! extend `bg1` locally; every permutation moving a set variable onto an
//! unset one is deactivated, and orbits of binary variables under the
//! remaining permutations propagate fixings: one 0-fixed member fixes the
//! whole orbit to zero, one 1-fixed member fixes it to one, and both at once
//! proves the node infeasible.

use tracing::debug;

use crate::host::{BoundEvent, BoundKind, EventToken, Host, VarKind};
use crate::settings::OrbitalSettings;
use crate::symmetry::SymmetryData;
use crate::symmetry::orbit::compute_orbits;
use crate::{I, Propagation, VarId};

/// Event-driven tracker and per-node propagator.
pub struct OrbitalFixer {
    settings: OrbitalSettings,

    /// Permutation variables whose global upper bound reached zero.
    bg0: Vec<bool>,
    bg0_list: Vec<I>,
    /// Permutation variables globally fixed to one.
    bg1: Vec<bool>,
    bg1_list: Vec<I>,

    /// Event registrations, in subscription order.
    tokens: Vec<EventToken>,
    /// Binary permutation variables captured against host-side deletion.
    captured: Vec<VarId>,

    n_fixed_zero: I,
    n_fixed_one: I,
}

impl OrbitalFixer {
    pub fn new(settings: OrbitalSettings) -> Self {
        Self {
            settings,
            bg0: Vec::new(),
            bg0_list: Vec::new(),
            bg1: Vec::new(),
            bg1_list: Vec::new(),
            tokens: Vec::new(),
            captured: Vec::new(),
            n_fixed_zero: 0,
            n_fixed_one: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enable
    }

    /// Sizes the tracking sets for a freshly computed permutation-variable
    /// space, discarding any previous run's state.
    pub fn reset(&mut self, n_permvars: I) {
        self.bg0 = vec![false; n_permvars];
        self.bg0_list.clear();
        self.bg1 = vec![false; n_permvars];
        self.bg1_list.clear();
    }

    /// Captures every binary permutation variable and subscribes to its
    /// global bound events.
    pub fn register(&mut self, host: &mut dyn Host, data: &SymmetryData) {
        for &var in &data.permvars {
            if host.var_kind(var) != VarKind::Binary {
                continue;
            }
            host.capture_var(var);
            self.captured.push(var);
            self.tokens.push(host.subscribe_global_bound(var));
        }
    }

    /// Deregisters events in reverse order of registration, then releases
    /// the captured variables.
    pub fn unregister(&mut self, host: &mut dyn Host, _data: &SymmetryData) {
        for token in self.tokens.drain(..).rev() {
            host.unsubscribe_global_bound(token);
        }
        for var in self.captured.drain(..).rev() {
            host.release_var(var);
        }
    }

    /// Statistics counters `(n_fixed_zero, n_fixed_one)` for host reporting.
    pub fn counters(&self) -> (I, I) {
        (self.n_fixed_zero, self.n_fixed_one)
    }

    /// Entry point for the host's global-bound events, delivered in the
    /// order the host performs the tightenings.
    pub fn on_bound_event(&mut self, data: &SymmetryData, event: BoundEvent) {
        let Some(&idx) = data.var_to_perm.get(&event.var) else {
            return;
        };
        match event.kind {
            BoundKind::Upper if event.new_bound < 0.5 => {
                if !self.bg0[idx] {
                    self.bg0[idx] = true;
                    self.bg0_list.push(idx);
                }
            }
            BoundKind::Lower if event.new_bound > 0.5 => {
                if !self.bg1[idx] {
                    self.bg1[idx] = true;
                    self.bg1_list.push(idx);
                }
            }
            _ => {}
        }
    }

    /// Runs the fixing step once for the current node. Must not be called
    /// during probing or repropagation: the root-to-node branching path
    /// would not match the one seen at initial propagation.
    pub fn propagate(&mut self, host: &mut dyn Host, data: &SymmetryData) -> Propagation {
        if !self.settings.enable || data.perms.is_empty() {
            return Propagation::NoChange;
        }
        if host.in_probing() || host.in_repropagation() {
            return Propagation::NoChange;
        }

        // 1. Extend bg1 by the binary variables branched to one on the path
        // to the root; this extension is local to the call.
        let mut b1 = self.bg1.clone();
        let mut b1_list = self.bg1_list.clone();
        for decision in host.branching_path() {
            if decision.kind != BoundKind::Lower || decision.new_bound <= 0.5 {
                continue;
            }
            if host.var_kind(decision.var) != VarKind::Binary {
                continue;
            }
            let Some(&idx) = data.var_to_perm.get(&decision.var) else {
                // a branching variable unknown to the permutation space makes
                // the stabiliser reasoning unsound; bail out quietly
                return Propagation::NoChange;
            };
            if !b1[idx] {
                b1[idx] = true;
                b1_list.push(idx);
            }
        }

        // 2. Deactivate permutations that map a set variable onto an unset
        // one, and everything in blocked components.
        let n_perms = data.perms.len();
        let mut inactive = vec![false; n_perms];
        for c in 0..data.components.n_components() {
            if data.components.is_blocked(c) {
                for &p in data.components.perms_of(c) {
                    inactive[p] = true;
                }
            }
        }
        for &v in self.bg0_list.iter() {
            for p in 0..n_perms {
                let w = data.transposed[v][p];
                if w != v && !self.bg0[w] {
                    inactive[p] = true;
                }
            }
        }
        for &v in b1_list.iter() {
            for p in 0..n_perms {
                let w = data.transposed[v][p];
                if w != v && !b1[w] {
                    inactive[p] = true;
                }
            }
        }

        let active: Vec<&[I]> = (0..n_perms)
            .filter(|&p| !inactive[p])
            .map(|p| data.perms[p].as_slice())
            .collect();
        if active.is_empty() {
            return Propagation::NoChange;
        }

        // 3. Orbits of binary variables in unblocked components.
        let (orbits, begins) = compute_orbits(data.n_permvars(), &active, |i| {
            host.var_kind(data.permvars[i]) == VarKind::Binary
                && data.components.component_of_var(i) != crate::symmetry::components::UNAFFECTED
        });

        // 4. Propagate fixings orbit by orbit.
        let mut n_fix0 = 0;
        let mut n_fix1 = 0;
        for w in begins.windows(2) {
            let orbit = &orbits[w[0]..w[1]];
            let has_zero = orbit.iter().any(|&i| host.var_local_ub(data.permvars[i]) < 0.5);
            let has_one = orbit.iter().any(|&i| host.var_local_lb(data.permvars[i]) > 0.5);
            if has_zero && has_one {
                debug!("orbit contains a 0-fixed and a 1-fixed variable, node is infeasible");
                return Propagation::Infeasible;
            }
            if has_zero {
                for &i in orbit {
                    let var = data.permvars[i];
                    if host.var_local_ub(var) < 0.5 {
                        continue;
                    }
                    let result = host.tighten_ub(var, 0.);
                    if result.infeasible {
                        return Propagation::Infeasible;
                    }
                    if result.tightened {
                        n_fix0 += 1;
                    }
                }
            } else if has_one {
                for &i in orbit {
                    let var = data.permvars[i];
                    if host.var_local_lb(var) > 0.5 {
                        continue;
                    }
                    let result = host.tighten_lb(var, 1.);
                    if result.infeasible {
                        return Propagation::Infeasible;
                    }
                    if result.tightened {
                        n_fix1 += 1;
                    }
                }
            }
        }

        if n_fix0 + n_fix1 == 0 {
            return Propagation::NoChange;
        }
        self.n_fixed_zero += n_fix0;
        self.n_fixed_one += n_fix1;
        Propagation::Tightened { n_fixed_zero: n_fix0, n_fixed_one: n_fix1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BranchDecision;
    use crate::symmetry::SymmetryData;
    use crate::tests::host::TestHost;

    /// `n` symmetric binaries under adjacent-transposition generators.
    fn symmetric_data(host: &mut TestHost, n: I) -> SymmetryData {
        let vars: Vec<VarId> = (0..n).map(|_| host.add_binary()).collect();
        let mut perms = Vec::new();
        // adjacent transpositions generate the symmetric group
        for k in 0..n - 1 {
            let mut p: Vec<I> = (0..n).collect();
            p.swap(k, k + 1);
            perms.push(p);
        }
        SymmetryData::new(vars, perms, 0.)
    }

    fn fixer(data: &SymmetryData) -> OrbitalFixer {
        let mut fixer = OrbitalFixer::new(OrbitalSettings::default());
        fixer.reset(data.n_permvars());
        fixer
    }

    /// A node-local 0-fixing (e.g. a 0-branching) spreads through the orbit.
    #[test]
    fn test_local_zero_fixing_spreads() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 2);
        let mut fixer = fixer(&data);

        host.tighten_ub(0, 0.);

        let result = fixer.propagate(&mut host, &data);
        assert_eq!(result, Propagation::Tightened { n_fixed_zero: 1, n_fixed_one: 0 });
        assert!(host.var_local_ub(1) < 0.5);
    }

    /// A *global* 0-fixing enters bg0 through its event and deactivates
    /// every permutation moving the variable, so nothing propagates.
    #[test]
    fn test_global_zero_fixing_restricts_stabiliser() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 2);
        let mut fixer = fixer(&data);

        host.fix_ub(0, 0.);
        fixer.on_bound_event(&data, BoundEvent { var: 0, kind: BoundKind::Upper, new_bound: 0. });

        assert_eq!(fixer.propagate(&mut host, &data), Propagation::NoChange);
        assert!(host.var_local_ub(1) > 0.5);
    }

    /// With x0 branched to 1, the swap generator is stabilised and x1 stays
    /// free.
    #[test]
    fn test_branching_variable_keeps_orbit_free() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 2);
        let mut fixer = fixer(&data);

        host.set_branching_path(vec![BranchDecision {
            var: 0,
            kind: BoundKind::Lower,
            new_bound: 1.,
        }]);
        host.tighten_lb(0, 1.);

        let result = fixer.propagate(&mut host, &data);
        assert_eq!(result, Propagation::NoChange);
        assert!(host.var_local_ub(1) > 0.5);
    }

    /// A second call right after a successful one changes nothing.
    #[test]
    fn test_idempotent_within_node() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 3);
        let mut fixer = fixer(&data);

        host.tighten_ub(2, 0.);

        let first = fixer.propagate(&mut host, &data);
        assert_eq!(first, Propagation::Tightened { n_fixed_zero: 2, n_fixed_one: 0 });
        let second = fixer.propagate(&mut host, &data);
        assert_eq!(second, Propagation::NoChange);
        assert_eq!(fixer.counters(), (2, 0));
    }

    /// A 1-fixed and a 0-fixed variable in one orbit cut the node. The
    /// fixings are node-local here (their global events have not been
    /// flushed), so the full orbit is still visible.
    #[test]
    fn test_infeasible_orbit() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 3);
        let mut fixer = fixer(&data);

        host.tighten_lb(0, 1.);
        host.tighten_ub(1, 0.);

        assert_eq!(fixer.propagate(&mut host, &data), Propagation::Infeasible);
    }

    /// An unknown branching variable aborts the call silently.
    #[test]
    fn test_unknown_branching_var_bails_out() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 2);
        let extra = host.add_binary();
        let mut fixer = fixer(&data);

        host.tighten_ub(0, 0.);
        host.set_branching_path(vec![BranchDecision {
            var: extra,
            kind: BoundKind::Lower,
            new_bound: 1.,
        }]);

        assert_eq!(fixer.propagate(&mut host, &data), Propagation::NoChange);
        assert!(host.var_local_ub(1) > 0.5);
    }

    /// Blocked components are skipped entirely.
    #[test]
    fn test_blocked_component_skipped() {
        let mut host = TestHost::new();
        let mut data = symmetric_data(&mut host, 2);
        data.components.block(0);
        let mut fixer = fixer(&data);

        host.tighten_ub(0, 0.);

        assert_eq!(fixer.propagate(&mut host, &data), Propagation::NoChange);
        assert!(host.var_local_ub(1) > 0.5);
    }

    /// Propagation is suppressed during probing and repropagation.
    #[test]
    fn test_probing_suppressed() {
        let mut host = TestHost::new();
        let data = symmetric_data(&mut host, 2);
        let mut fixer = fixer(&data);

        host.tighten_ub(0, 0.);
        host.set_probing(true);
        assert_eq!(fixer.propagate(&mut host, &data), Propagation::NoChange);
        host.set_probing(false);
        assert!(fixer.propagate(&mut host, &data).tightened());
    }
}
