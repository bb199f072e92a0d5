//! Per-handler-kind normalisation of constraints into matrix rows.
//!
//! Every [`ConsData`](crate::host::ConsData) variant emits zero or more rows
//! in one of two senses: `<=` (left side infinite) or `=`. Two-sided finite
//! constraints are split into a pair of `<=` rows; covering-type structures
//! are stored negated. Bound disjunctions follow the bit-exact literal
//! rewriting with the [`SPECIAL_BOUND`] sentinel for zero bounds.

use enum_dispatch::enum_dispatch;

use crate::host::{
    AndCons, BoundDisjunctionCons, BoundSense, ConsData, KnapsackCons, LinearCons, LinkingCons,
    LogicOrCons, OrCons, SetPpcCons, SetPpcKind, VarboundCons, XorCons,
};
use crate::matrix::{BuildFailure, RowOrigin};
use crate::numerics::{self, SPECIAL_BOUND};
use crate::{ConsId, E, VarId};

/// A normalised row before index sorting and duplicate merging.
#[derive(Debug, Clone)]
pub(crate) struct PendingRow {
    pub lhs: E,
    pub rhs: E,
    pub entries: Vec<(VarId, E)>,
    pub origin: RowOrigin,
    pub cons: ConsId,
}

/// Sink the normalisation functions emit rows into; remembers which
/// constraint is being walked so rows and failures carry its handle.
pub struct RowAccumulator<'a> {
    rows: &'a mut Vec<PendingRow>,
    cons: ConsId,
}

impl<'a> RowAccumulator<'a> {
    pub(crate) fn new(rows: &'a mut Vec<PendingRow>, cons: ConsId) -> Self {
        Self { rows, cons }
    }

    pub fn cons(&self) -> ConsId {
        self.cons
    }

    /// Emits `entries <= rhs`.
    pub fn le(&mut self, entries: Vec<(VarId, E)>, rhs: E, origin: RowOrigin) {
        self.rows.push(PendingRow {
            lhs: -numerics::INFINITY,
            rhs,
            entries,
            origin,
            cons: self.cons,
        });
    }

    /// Emits `entries = value`.
    pub fn eq(&mut self, entries: Vec<(VarId, E)>, value: E, origin: RowOrigin) {
        self.rows.push(PendingRow {
            lhs: value,
            rhs: value,
            entries,
            origin,
            cons: self.cons,
        });
    }

    /// Emits `lhs <= entries <= rhs` as one `=` row when the sides agree and
    /// as up to two `<=` rows otherwise. A free row emits nothing.
    pub fn ranged(&mut self, entries: Vec<(VarId, E)>, lhs: E, rhs: E, origin: RowOrigin) {
        if !numerics::is_infinite(lhs) && !numerics::is_infinite(rhs) && numerics::is_eq(lhs, rhs) {
            self.eq(entries, rhs, origin);
            return;
        }
        if !numerics::is_infinite(rhs) {
            self.le(entries.clone(), rhs, origin);
        }
        if !numerics::is_infinite(lhs) {
            let negated = entries.into_iter().map(|(v, c)| (v, -c)).collect();
            self.le(negated, -lhs, origin);
        }
    }
}

/// Emission of the normalised rows of one constraint.
#[enum_dispatch]
pub trait NormalizeCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure>;
}

impl NormalizeCons for LinearCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let entries = self.vars.iter().copied().zip(self.coefs.iter().copied()).collect();
        acc.ranged(entries, self.lhs, self.rhs, RowOrigin::Linear);
        Ok(())
    }
}

impl NormalizeCons for SetPpcCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let ones = |sign: E| self.vars.iter().map(|&v| (v, sign)).collect::<Vec<_>>();
        match self.kind {
            SetPpcKind::Packing => acc.le(ones(1.), 1., RowOrigin::SetPacking),
            SetPpcKind::Partitioning => acc.eq(ones(1.), 1., RowOrigin::SetPartitioning),
            SetPpcKind::Covering => acc.le(ones(-1.), -1., RowOrigin::SetCovering),
        }
        Ok(())
    }
}

impl NormalizeCons for KnapsackCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let entries = self
            .vars
            .iter()
            .copied()
            .zip(self.weights.iter().map(|&w| w as E))
            .collect();
        acc.le(entries, self.capacity as E, RowOrigin::Knapsack);
        Ok(())
    }
}

impl NormalizeCons for XorCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        // Without the integer slack the parity condition has no linear row.
        let Some(int_var) = self.int_var else {
            return Err(BuildFailure::Unsupported { cons: acc.cons() });
        };
        let mut entries: Vec<(VarId, E)> = self.vars.iter().map(|&v| (v, 1.)).collect();
        entries.push((int_var, -2.));
        acc.eq(entries, if self.rhs { 1. } else { 0. }, RowOrigin::Xor);
        Ok(())
    }
}

impl NormalizeCons for AndCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        // r <= x_i for each operand, sum x_i - r <= n - 1
        for &op in &self.operands {
            acc.le(vec![(self.resultant, 1.), (op, -1.)], 0., RowOrigin::And);
        }
        let mut entries: Vec<(VarId, E)> = self.operands.iter().map(|&v| (v, 1.)).collect();
        entries.push((self.resultant, -1.));
        acc.le(entries, self.operands.len() as E - 1., RowOrigin::And);
        Ok(())
    }
}

impl NormalizeCons for OrCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        // x_i <= r for each operand, r <= sum x_i
        for &op in &self.operands {
            acc.le(vec![(op, 1.), (self.resultant, -1.)], 0., RowOrigin::Or);
        }
        let mut entries: Vec<(VarId, E)> = self.operands.iter().map(|&v| (v, -1.)).collect();
        entries.push((self.resultant, 1.));
        acc.le(entries, 0., RowOrigin::Or);
        Ok(())
    }
}

impl NormalizeCons for LogicOrCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let entries = self.vars.iter().map(|&v| (v, -1.)).collect();
        acc.le(entries, -1., RowOrigin::LogicOr);
        Ok(())
    }
}

impl NormalizeCons for VarboundCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let entries = vec![(self.var, 1.), (self.bound_var, self.bound_coef)];
        acc.ranged(entries, self.lhs, self.rhs, RowOrigin::Varbound);
        Ok(())
    }
}

impl NormalizeCons for LinkingCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        // Defining identity over the binary expansion.
        let mut entries: Vec<(VarId, E)> = vec![(self.link_var, 1.)];
        entries.extend(self.bin_vars.iter().copied().zip(self.vals.iter().map(|&v| -v)));
        acc.eq(entries, 0., RowOrigin::Linking);

        // Partitioning equation over the binaries.
        let ones = self.bin_vars.iter().map(|&v| (v, 1.)).collect();
        acc.eq(ones, 1., RowOrigin::Linking);
        Ok(())
    }
}

impl BoundDisjunctionCons {
    /// Literal coefficient: `(x >= b) -> -b`, `(x <= b) -> b`, with zero
    /// bounds replaced by the sentinel magnitude.
    fn literal_coef(sense: BoundSense, bound: E) -> E {
        let magnitude = if numerics::is_zero(bound) { SPECIAL_BOUND } else { bound };
        match sense {
            BoundSense::Lower => -magnitude,
            BoundSense::Upper => magnitude,
        }
    }
}

impl NormalizeCons for BoundDisjunctionCons {
    fn normalize(&self, acc: &mut RowAccumulator<'_>) -> Result<(), BuildFailure> {
        let repeated = {
            let mut sorted = self.vars.clone();
            sorted.sort_unstable();
            sorted.windows(2).any(|w| w[0] == w[1])
        };

        if repeated && self.vars.len() == 2 {
            // Two literals on one variable bracket it.
            let c1 = Self::literal_coef(self.senses[0], self.bounds[0]);
            let c2 = Self::literal_coef(self.senses[1], self.bounds[1]);
            acc.ranged(
                vec![(self.vars[0], 1.)],
                c1.min(c2),
                c1.max(c2),
                RowOrigin::BoundDisjunction,
            );
            return Ok(());
        }
        if repeated {
            return Err(BuildFailure::RepeatedDisjunctionVar { cons: acc.cons() });
        }

        let entries = self
            .vars
            .iter()
            .zip(self.senses.iter().zip(self.bounds.iter()))
            .map(|(&v, (&s, &b))| (v, Self::literal_coef(s, b)))
            .collect();
        acc.eq(entries, 0., RowOrigin::BoundDisjunction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(data: &dyn NormalizeCons, cons: ConsId) -> Result<Vec<PendingRow>, BuildFailure> {
        let mut rows = Vec::new();
        data.normalize(&mut RowAccumulator::new(&mut rows, cons))?;
        Ok(rows)
    }

    #[test]
    fn test_linear_two_sided_splits() {
        let cons = LinearCons {
            lhs: 1.,
            rhs: 4.,
            vars: vec![0, 1],
            coefs: vec![2., -3.],
        };
        let rows = collect(&cons, 7).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rhs, 4.);
        assert_eq!(rows[0].entries, vec![(0, 2.), (1, -3.)]);
        assert_eq!(rows[1].rhs, -1.);
        assert_eq!(rows[1].entries, vec![(0, -2.), (1, 3.)]);
        assert!(rows.iter().all(|r| r.cons == 7));
    }

    #[test]
    fn test_linear_equation_single_row() {
        let cons = LinearCons {
            lhs: 5.,
            rhs: 5.,
            vars: vec![0],
            coefs: vec![1.],
        };
        let rows = collect(&cons, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].lhs, rows[0].rhs), (5., 5.));
    }

    #[test]
    fn test_covering_stored_negated() {
        let cons = SetPpcCons {
            kind: SetPpcKind::Covering,
            vars: vec![2, 3],
        };
        let rows = collect(&cons, 0).unwrap();
        assert_eq!(rows[0].entries, vec![(2, -1.), (3, -1.)]);
        assert_eq!(rows[0].rhs, -1.);
    }

    #[test]
    fn test_xor_slack_coefficient() {
        let cons = XorCons {
            vars: vec![0, 1, 2],
            rhs: true,
            int_var: Some(5),
        };
        let rows = collect(&cons, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(*rows[0].entries.last().unwrap(), (5, -2.));
        assert_eq!(rows[0].rhs, 1.);

        let no_slack = XorCons {
            vars: vec![0, 1],
            rhs: false,
            int_var: None,
        };
        assert!(matches!(
            collect(&no_slack, 3),
            Err(BuildFailure::Unsupported { cons: 3 })
        ));
    }

    #[test]
    fn test_linking_emits_identity_and_partition() {
        let cons = LinkingCons {
            link_var: 9,
            bin_vars: vec![1, 2, 3],
            vals: vec![10., 20., 30.],
        };
        let rows = collect(&cons, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entries[0], (9, 1.));
        assert_eq!(rows[0].entries[2], (2, -20.));
        assert_eq!(rows[1].entries.len(), 3);
        assert_eq!((rows[1].lhs, rows[1].rhs), (1., 1.));
    }

    #[test]
    fn test_bound_disjunction_literals() {
        // (x0 >= 2) or (x1 <= 0): zero bound becomes the sentinel.
        let cons = BoundDisjunctionCons {
            vars: vec![0, 1],
            senses: vec![BoundSense::Lower, BoundSense::Upper],
            bounds: vec![2., 0.],
        };
        let rows = collect(&cons, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entries, vec![(0, -2.), (1, SPECIAL_BOUND)]);
        assert_eq!((rows[0].lhs, rows[0].rhs), (0., 0.));
    }

    #[test]
    fn test_bound_disjunction_bracket() {
        // (x >= 3) or (x <= 1) on the same variable.
        let cons = BoundDisjunctionCons {
            vars: vec![4, 4],
            senses: vec![BoundSense::Lower, BoundSense::Upper],
            bounds: vec![3., 1.],
        };
        let rows = collect(&cons, 0).unwrap();
        // coefficients -3 and 1 bracket the variable as two <= rows
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entries, vec![(4, 1.)]);
        assert_eq!(rows[0].rhs, 1.);
        assert_eq!(rows[1].entries, vec![(4, -1.)]);
        assert_eq!(rows[1].rhs, 3.);
    }

    #[test]
    fn test_bound_disjunction_repetition_rejected() {
        let cons = BoundDisjunctionCons {
            vars: vec![0, 1, 0],
            senses: vec![BoundSense::Lower, BoundSense::Upper, BoundSense::Upper],
            bounds: vec![1., 0., 0.],
        };
        assert!(matches!(
            collect(&cons, 11),
            Err(BuildFailure::RepeatedDisjunctionVar { cons: 11 })
        ));
    }
}
