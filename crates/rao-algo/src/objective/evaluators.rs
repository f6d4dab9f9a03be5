use super::CostEvaluator;
use crate::sensitivity::{ComputationStatus, SensitivityResult};
use rao_core::{ConstraintId, MonitoredConstraint, OperatorId};
use std::collections::{BTreeSet, HashMap};

/// Tolerance under which a margin counts as unchanged.
const MARGIN_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
struct RelativeMargin {
    ptdf_zonal_sums: HashMap<ConstraintId, f64>,
    lower_bound: f64,
}

#[derive(Debug, Clone)]
struct UnoptimizedMargins {
    initial_margins: HashMap<ConstraintId, f64>,
}

/// Ranks optimized constraints by margin.
///
/// Relative margins divide positive margins by the constraint's PTDF zonal
/// sum (bounded below). Constraints of unoptimized operators are ignored as
/// long as their margin did not decrease.
#[derive(Debug, Clone)]
pub struct MinMarginEvaluator {
    constraints: Vec<MonitoredConstraint>,
    relative: Option<RelativeMargin>,
    unoptimized: Option<UnoptimizedMargins>,
}

impl MinMarginEvaluator {
    pub fn absolute(constraints: Vec<MonitoredConstraint>) -> Self {
        Self {
            constraints,
            relative: None,
            unoptimized: None,
        }
    }

    pub fn relative(mut self, initial: &SensitivityResult, lower_bound: f64) -> Self {
        let ptdf_zonal_sums = self
            .constraints
            .iter()
            .filter_map(|c| initial.ptdf_zonal_sum(&c.id).map(|s| (c.id.clone(), s)))
            .collect();
        self.relative = Some(RelativeMargin {
            ptdf_zonal_sums,
            lower_bound,
        });
        self
    }

    pub fn with_unoptimized_operators(
        mut self,
        operators: BTreeSet<OperatorId>,
        initial: &SensitivityResult,
    ) -> Self {
        let initial_margins = self
            .constraints
            .iter()
            .filter(|c| c.operator.as_ref().is_some_and(|op| operators.contains(op)))
            .filter_map(|c| initial.margin(c).map(|m| (c.id.clone(), m)))
            .collect();
        self.unoptimized = Some(UnoptimizedMargins { initial_margins });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Coefficient dividing positive margins of `constraint`.
    pub fn relative_coefficient(&self, constraint: &ConstraintId) -> Option<f64> {
        self.relative.as_ref().map(|r| {
            r.ptdf_zonal_sums
                .get(constraint)
                .copied()
                .unwrap_or(r.lower_bound)
                .max(r.lower_bound)
        })
    }

    fn margin(&self, constraint: &MonitoredConstraint, result: &SensitivityResult) -> Option<f64> {
        let margin = result.margin(constraint)?;
        if let Some(unoptimized) = &self.unoptimized {
            if let Some(initial) = unoptimized.initial_margins.get(&constraint.id) {
                if margin >= initial - MARGIN_EPSILON {
                    return None;
                }
            }
        }
        match self.relative_coefficient(&constraint.id) {
            Some(coefficient) if margin > 0.0 => Some(margin / coefficient),
            _ => Some(margin),
        }
    }

    /// Margins of counted constraints, lowest first, ties by id.
    pub fn ranked_margins(&self, result: &SensitivityResult) -> Vec<(ConstraintId, f64)> {
        let mut margins: Vec<(ConstraintId, f64)> = self
            .constraints
            .iter()
            .filter_map(|c| self.margin(c, result).map(|m| (c.id.clone(), m)))
            .filter(|(_, m)| m.is_finite())
            .collect();
        margins.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        margins
    }
}

/// Penalizes monitored constraints degraded beyond the acceptable decrease.
#[derive(Debug, Clone)]
pub struct MnecViolationEvaluator {
    constraints: Vec<(MonitoredConstraint, f64)>,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
}

impl MnecViolationEvaluator {
    pub fn new(
        constraints: Vec<MonitoredConstraint>,
        initial: &SensitivityResult,
        acceptable_margin_decrease: f64,
        violation_cost: f64,
    ) -> Self {
        let constraints = constraints
            .into_iter()
            .filter_map(|c| initial.margin(&c).map(|m| (c, m)))
            .collect();
        Self {
            constraints,
            acceptable_margin_decrease,
            violation_cost,
        }
    }
}

impl CostEvaluator for MnecViolationEvaluator {
    fn name(&self) -> &str {
        "mnec-violation-cost"
    }

    fn compute_cost(&self, result: &SensitivityResult) -> f64 {
        let total: f64 = self
            .constraints
            .iter()
            .filter_map(|(c, initial_margin)| {
                let margin = result.margin(c)?;
                let floor = (initial_margin - self.acceptable_margin_decrease).min(0.0);
                Some((floor - margin).max(0.0))
            })
            .sum();
        self.violation_cost * total
    }
}

/// Penalizes loop flows above `max(limit, |initial| + acceptable increase)`.
#[derive(Debug, Clone)]
pub struct LoopFlowViolationEvaluator {
    thresholds: Vec<(ConstraintId, f64)>,
    violation_cost: f64,
}

impl LoopFlowViolationEvaluator {
    pub fn new(
        constraints: Vec<MonitoredConstraint>,
        initial: &SensitivityResult,
        acceptable_increase: f64,
        violation_cost: f64,
    ) -> Self {
        let thresholds = constraints
            .into_iter()
            .filter_map(|c| {
                let limit = c.loop_flow_limit?;
                let initial_loop_flow = initial.loop_flow(&c.id).unwrap_or(0.0);
                Some((c.id, limit.max(initial_loop_flow.abs() + acceptable_increase)))
            })
            .collect();
        Self {
            thresholds,
            violation_cost,
        }
    }

    pub fn threshold(&self, constraint: &ConstraintId) -> Option<f64> {
        self.thresholds
            .iter()
            .find(|(id, _)| id == constraint)
            .map(|(_, t)| *t)
    }
}

impl CostEvaluator for LoopFlowViolationEvaluator {
    fn name(&self) -> &str {
        "loop-flow-cost"
    }

    fn compute_cost(&self, result: &SensitivityResult) -> f64 {
        let excess: f64 = self
            .thresholds
            .iter()
            .filter_map(|(id, threshold)| {
                let loop_flow = result.loop_flow(id)?;
                Some((loop_flow.abs() - threshold).max(0.0))
            })
            .sum();
        self.violation_cost * excess
    }
}

/// Flat overcost when the sensitivity computation partially failed.
#[derive(Debug, Clone)]
pub struct SensitivityFailureOvercostEvaluator {
    overcost: f64,
}

impl SensitivityFailureOvercostEvaluator {
    pub fn new(overcost: f64) -> Self {
        Self { overcost }
    }
}

impl CostEvaluator for SensitivityFailureOvercostEvaluator {
    fn name(&self) -> &str {
        "sensitivity-failure-cost"
    }

    fn compute_cost(&self, result: &SensitivityResult) -> f64 {
        if result.status == ComputationStatus::Failure {
            self.overcost
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::StateId;

    fn constraint(id: &str, limit: f64) -> MonitoredConstraint {
        MonitoredConstraint::new(id, id, StateId::preventive()).with_limit(limit)
    }

    #[test]
    fn test_relative_margin_only_scales_positive_margins() {
        let mut initial = SensitivityResult::new(ComputationStatus::Default);
        initial.set_ptdf_zonal_sum("a".into(), 0.5);
        initial.set_ptdf_zonal_sum("b".into(), 0.001);
        let evaluator =
            MinMarginEvaluator::absolute(vec![constraint("a", 100.0), constraint("b", 100.0)])
                .relative(&initial, 0.01);
        let result = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("a", 90.0)
            .with_flow("b", 105.0);
        let ranked = evaluator.ranked_margins(&result);
        assert_eq!(ranked[0], (ConstraintId::new("b"), -5.0));
        assert_eq!(ranked[1], (ConstraintId::new("a"), 20.0));
        assert_eq!(evaluator.relative_coefficient(&"b".into()), Some(0.01));
    }

    #[test]
    fn test_unoptimized_operator_ignored_unless_margin_decreases() {
        let c = constraint("a", 100.0).with_operator("BE");
        let initial = SensitivityResult::new(ComputationStatus::Default).with_flow("a", 120.0);
        let evaluator = MinMarginEvaluator::absolute(vec![c, constraint("b", 100.0)])
            .with_unoptimized_operators(BTreeSet::from([OperatorId::new("BE")]), &initial);

        let same = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("a", 120.0)
            .with_flow("b", 90.0);
        assert_eq!(evaluator.ranked_margins(&same), vec![(ConstraintId::new("b"), 10.0)]);

        let worse = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("a", 125.0)
            .with_flow("b", 90.0);
        assert_eq!(evaluator.ranked_margins(&worse)[0], (ConstraintId::new("a"), -25.0));
    }

    #[test]
    fn test_loop_flow_threshold_and_cost() {
        let c = constraint("a", 100.0).with_loop_flow_limit(30.0);
        let mut initial = SensitivityResult::new(ComputationStatus::Default).with_flow("a", 50.0);
        initial.set_commercial_flow("a".into(), 10.0);
        let evaluator = LoopFlowViolationEvaluator::new(vec![c], &initial, 5.0, 2.0);
        assert_eq!(evaluator.threshold(&"a".into()), Some(45.0));

        let mut current = SensitivityResult::new(ComputationStatus::Default).with_flow("a", 60.0);
        current.set_commercial_flow("a".into(), 10.0);
        assert!((evaluator.compute_cost(&current) - 10.0).abs() < 1e-9);
    }
}
