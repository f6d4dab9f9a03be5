//! Objective function: functional cost plus named virtual costs.
//!
//! The functional cost is the opposite of the minimum margin over optimized
//! constraints, so a secure network has a negative cost. Virtual costs are
//! non-negative penalties contributed by independent [`CostEvaluator`]s.
//!
//! ```text
//! cost = −min_c margin(c) + Σ_k virtual_k
//! ```

mod evaluators;

pub use evaluators::{
    LoopFlowViolationEvaluator, MinMarginEvaluator, MnecViolationEvaluator,
    SensitivityFailureOvercostEvaluator,
};

use crate::parameters::{ObjectiveFunctionKind, SearchTreeParameters};
use crate::perimeter::Perimeter;
use crate::sensitivity::SensitivityResult;
use rao_core::ConstraintId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, non-negative penalty.
pub trait CostEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn compute_cost(&self, result: &SensitivityResult) -> f64;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveFunctionResult {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    /// Optimized constraints ranked by margin, most limiting first.
    pub limiting_elements: Vec<(ConstraintId, f64)>,
}

impl ObjectiveFunctionResult {
    pub fn cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost()
    }

    pub fn virtual_cost(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn virtual_cost_of(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }

    pub fn most_limiting_elements(&self, n: usize) -> &[(ConstraintId, f64)] {
        &self.limiting_elements[..n.min(self.limiting_elements.len())]
    }
}

pub struct ObjectiveFunction {
    functional: MinMarginEvaluator,
    virtual_evaluators: Vec<Box<dyn CostEvaluator>>,
}

impl ObjectiveFunction {
    pub fn new(functional: MinMarginEvaluator) -> Self {
        Self {
            functional,
            virtual_evaluators: Vec::new(),
        }
    }

    pub fn with_virtual(mut self, evaluator: Box<dyn CostEvaluator>) -> Self {
        self.virtual_evaluators.push(evaluator);
        self
    }

    /// Objective for one perimeter. `initial` is the pre-perimeter result
    /// that MNEC, loop-flow and unoptimized-constraint terms compare against.
    pub fn for_perimeter(
        perimeter: &Perimeter,
        params: &SearchTreeParameters,
        initial: &SensitivityResult,
    ) -> Self {
        let mut functional = MinMarginEvaluator::absolute(perimeter.optimized_constraints());
        if params.objective == ObjectiveFunctionKind::MaxMinRelativeMargin {
            functional = functional.relative(initial, params.relative_margin.ptdf_sum_lower_bound);
        }
        if !perimeter.unoptimized_operators.is_empty() {
            functional = functional.with_unoptimized_operators(
                perimeter.unoptimized_operators.clone(),
                initial,
            );
        }

        let mut objective = Self::new(functional).with_virtual(Box::new(
            SensitivityFailureOvercostEvaluator::new(params.sensitivity_failure_overcost),
        ));
        if let Some(mnec) = &params.mnec {
            let monitored = perimeter.monitored_constraints();
            if !monitored.is_empty() {
                objective = objective.with_virtual(Box::new(MnecViolationEvaluator::new(
                    monitored,
                    initial,
                    mnec.acceptable_margin_decrease,
                    mnec.violation_cost,
                )));
            }
        }
        if let Some(loop_flow) = &params.loop_flow {
            let constrained = perimeter.loop_flow_constraints();
            if !constrained.is_empty() {
                objective = objective.with_virtual(Box::new(LoopFlowViolationEvaluator::new(
                    constrained,
                    initial,
                    loop_flow.acceptable_increase,
                    loop_flow.violation_cost,
                )));
            }
        }
        objective
    }

    pub fn evaluate(&self, result: &SensitivityResult) -> ObjectiveFunctionResult {
        let limiting_elements = self.functional.ranked_margins(result);
        let functional_cost = limiting_elements
            .first()
            .map_or(0.0, |(_, margin)| -margin);
        let virtual_costs = self
            .virtual_evaluators
            .iter()
            .map(|e| (e.name().to_string(), e.compute_cost(result)))
            .collect();
        ObjectiveFunctionResult {
            functional_cost,
            virtual_costs,
            limiting_elements,
        }
    }

    pub fn functional(&self) -> &MinMarginEvaluator {
        &self.functional
    }

    /// True when no constraint contributes to the functional cost.
    pub fn is_purely_virtual(&self) -> bool {
        self.functional.is_empty()
    }

    pub fn virtual_cost_names(&self) -> Vec<&str> {
        self.virtual_evaluators.iter().map(|e| e.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{MnecParameters, RaoParameters};
    use crate::sensitivity::ComputationStatus;
    use rao_core::{MonitoredConstraint, StateId};

    fn perimeter() -> Perimeter {
        Perimeter::new(StateId::preventive())
            .with_constraint(
                MonitoredConstraint::new("c1", "l1", StateId::preventive()).with_limit(100.0),
            )
            .with_constraint(
                MonitoredConstraint::new("c2", "l2", StateId::preventive()).with_limit(50.0),
            )
            .with_constraint(
                MonitoredConstraint::new("m1", "l3", StateId::preventive())
                    .with_limit(10.0)
                    .monitored_only(),
            )
    }

    fn result(f1: f64, f2: f64, m1: f64) -> SensitivityResult {
        SensitivityResult::new(ComputationStatus::Default)
            .with_flow("c1", f1)
            .with_flow("c2", f2)
            .with_flow("m1", m1)
    }

    #[test]
    fn test_functional_cost_is_minus_min_margin() {
        let params = SearchTreeParameters::preventive(&RaoParameters::default());
        let initial = result(90.0, 45.0, 0.0);
        let objective = ObjectiveFunction::for_perimeter(&perimeter(), &params, &initial);
        let evaluated = objective.evaluate(&result(103.0, 20.0, 0.0));
        assert_eq!(evaluated.functional_cost, 3.0);
        assert_eq!(evaluated.virtual_cost(), 0.0);
        assert_eq!(evaluated.cost(), 3.0);
        let ranked: Vec<_> = evaluated
            .most_limiting_elements(5)
            .iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ranked, vec!["c1", "c2"]);
    }

    #[test]
    fn test_mnec_violation_is_virtual() {
        let mut rao = RaoParameters::default();
        rao.mnec = Some(MnecParameters {
            acceptable_margin_decrease: 5.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        });
        let params = SearchTreeParameters::preventive(&rao);
        let initial = result(90.0, 45.0, 8.0);
        let objective = ObjectiveFunction::for_perimeter(&perimeter(), &params, &initial);
        assert!(objective.virtual_cost_names().contains(&"mnec-violation-cost"));
        // initial margin 2, allowed down to -3, current margin -4
        let evaluated = objective.evaluate(&result(90.0, 45.0, 14.0));
        assert!((evaluated.virtual_cost_of("mnec-violation-cost") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sensitivity_failure_overcost() {
        let params = SearchTreeParameters::preventive(&RaoParameters::default());
        let initial = result(90.0, 45.0, 0.0);
        let objective = ObjectiveFunction::for_perimeter(&perimeter(), &params, &initial);
        let mut failed = result(90.0, 45.0, 0.0);
        failed.status = ComputationStatus::Failure;
        let evaluated = objective.evaluate(&failed);
        assert_eq!(evaluated.virtual_cost_of("sensitivity-failure-cost"), 10000.0);
    }

    #[test]
    fn test_purely_virtual_objective() {
        let perimeter = Perimeter::new(StateId::preventive()).with_constraint(
            MonitoredConstraint::new("m1", "l3", StateId::preventive())
                .with_limit(10.0)
                .monitored_only(),
        );
        let params = SearchTreeParameters::preventive(&RaoParameters::default());
        let objective =
            ObjectiveFunction::for_perimeter(&perimeter, &params, &result(0.0, 0.0, 0.0));
        assert!(objective.is_purely_virtual());
        assert_eq!(objective.evaluate(&result(0.0, 0.0, 50.0)).functional_cost, 0.0);
    }
}
