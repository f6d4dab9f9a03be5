//! Iterative linear optimization of continuous set points.
//!
//! Sensitivities are only valid around the point they were computed at, so
//! the LP is solved, the network re-evaluated at the new set points, and the
//! LP rebuilt around them:
//!
//! ```text
//! best ← baseline
//! repeat up to max_iterations:
//!     solve LP around best            (failure → stop, keep best)
//!     same set points as best?        → converged
//!     re-run sensitivity              (failure → stop, keep best)
//!     cost < best cost?               → best ← candidate
//!     otherwise                       → stop, keep best
//! ```
//!
//! The returned result is never worse than the baseline.

use crate::linear_problem::{FillContext, LinearProblemBuilder, LinearSolver};
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::sensitivity::{SensitivityProvider, SensitivityResult};
use rao_core::{ActionId, ContinuousAction, MonitoredConstraint, NetworkState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Set points closer than this are considered equal.
pub const SET_POINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearOptimizationStatus {
    /// Not optimized (baseline copied).
    NotRun,
    Converged,
    MaxIterationsReached,
    /// Problem construction or LP solve failed; best result kept.
    SolverFailure,
    /// Sensitivity re-evaluation failed; best result kept.
    SensitivityFailure,
}

/// Network, set points, flows and cost at one operating point.
#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub network: NetworkState,
    pub set_points: HashMap<ActionId, f64>,
    pub sensitivity: SensitivityResult,
    pub objective: ObjectiveFunctionResult,
    pub iterations: usize,
    pub status: LinearOptimizationStatus,
}

impl LinearOptimizationResult {
    pub fn unoptimized(
        network: NetworkState,
        set_points: HashMap<ActionId, f64>,
        sensitivity: SensitivityResult,
        objective: ObjectiveFunctionResult,
    ) -> Self {
        Self {
            network,
            set_points,
            sensitivity,
            objective,
            iterations: 0,
            status: LinearOptimizationStatus::NotRun,
        }
    }

    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }
}

pub struct IteratingLinearOptimizer<'a> {
    sensitivity: &'a dyn SensitivityProvider,
    solver: &'a dyn LinearSolver,
    objective: &'a ObjectiveFunction,
    max_iterations: usize,
    convergence_threshold: f64,
}

impl<'a> IteratingLinearOptimizer<'a> {
    pub fn new(
        sensitivity: &'a dyn SensitivityProvider,
        solver: &'a dyn LinearSolver,
        objective: &'a ObjectiveFunction,
    ) -> Self {
        Self {
            sensitivity,
            solver,
            objective,
            max_iterations: 10,
            convergence_threshold: 0.0,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Optimizes `optimized` set points starting from `baseline`.
    ///
    /// `perimeter_actions` and `constraints` are what every sensitivity
    /// re-evaluation covers; `optimized` is the subset the LP may move.
    pub fn optimize(
        &self,
        baseline: &LinearOptimizationResult,
        builder: &LinearProblemBuilder,
        optimized: &[ContinuousAction],
        perimeter_actions: &[ContinuousAction],
        constraints: &[MonitoredConstraint],
    ) -> LinearOptimizationResult {
        let mut best = baseline.clone();
        best.status = LinearOptimizationStatus::MaxIterationsReached;

        for iteration in 1..=self.max_iterations {
            let ctx = FillContext {
                sensitivity: &best.sensitivity,
                set_points: &best.set_points,
            };
            let problem = match builder.build(&ctx) {
                Ok(problem) => problem,
                Err(e) => {
                    warn!("linear problem could not be built: {}", e);
                    best.status = LinearOptimizationStatus::SolverFailure;
                    break;
                }
            };
            let solution = match self.solver.solve(&problem) {
                Ok(solution) => solution,
                Err(e) => {
                    warn!(
                        "linear optimization failed at iteration {} ({}): {}",
                        iteration,
                        self.solver.name(),
                        e
                    );
                    best.status = LinearOptimizationStatus::SolverFailure;
                    break;
                }
            };

            let mut candidate_set_points = best.set_points.clone();
            let mut changed = false;
            for action in optimized {
                if let Some(var) = problem.set_point_variable(&action.id) {
                    let value = solution.value(var);
                    let previous = best.set_points.get(&action.id).copied().unwrap_or(value);
                    if (value - previous).abs() > SET_POINT_TOLERANCE {
                        changed = true;
                    }
                    candidate_set_points.insert(action.id.clone(), value);
                }
            }
            if !changed {
                debug!("iteration {}: set points unchanged, converged", iteration);
                best.status = LinearOptimizationStatus::Converged;
                break;
            }

            let mut network = best.network.clone();
            for action in optimized {
                if let Some(value) = candidate_set_points.get(&action.id) {
                    action.apply(&mut network, *value);
                }
            }
            let sensitivity = match self.sensitivity.compute(&network, perimeter_actions, constraints) {
                Ok(result) => result,
                Err(e) => {
                    warn!("sensitivity failed after iteration {}: {}", iteration, e);
                    best.status = LinearOptimizationStatus::SensitivityFailure;
                    break;
                }
            };
            let objective = self.objective.evaluate(&sensitivity);
            let improvement = best.cost() - objective.cost();
            if improvement <= 0.0 {
                debug!(
                    "iteration {}: cost {:.4} does not improve {:.4}, keeping previous set points",
                    iteration,
                    objective.cost(),
                    best.cost()
                );
                best.status = LinearOptimizationStatus::Converged;
                break;
            }
            debug!(
                "iteration {}: cost improved from {:.4} to {:.4}",
                iteration,
                best.cost(),
                objective.cost()
            );
            best = LinearOptimizationResult {
                network,
                set_points: candidate_set_points,
                sensitivity,
                objective,
                iterations: iteration,
                status: LinearOptimizationStatus::MaxIterationsReached,
            };
            if improvement < self.convergence_threshold {
                best.status = LinearOptimizationStatus::Converged;
                break;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_problem::{
        CoreAction, CoreFiller, LinearProblem, LinearSolution, LinearSolverError,
        MaxMinMarginFiller,
    };
    use crate::objective::MinMarginEvaluator;
    use crate::sensitivity::LinearFlowModel;
    use rao_core::{ContinuousKind, SetPointRange, StateId};

    /// Returns the same set point every time.
    struct FixedSolver(f64);

    impl LinearSolver for FixedSolver {
        fn name(&self) -> &str {
            "fixed"
        }

        fn solve(&self, problem: &LinearProblem) -> Result<LinearSolution, LinearSolverError> {
            let mut values = vec![0.0; problem.variables().len()];
            for (_, var) in problem.set_point_variables() {
                values[var.index()] = self.0;
            }
            Ok(LinearSolution::new(values, 0.0))
        }
    }

    struct FailingSolver;

    impl LinearSolver for FailingSolver {
        fn name(&self) -> &str {
            "failing"
        }

        fn solve(&self, _problem: &LinearProblem) -> Result<LinearSolution, LinearSolverError> {
            Err(LinearSolverError::Infeasible)
        }
    }

    struct Fixture {
        model: LinearFlowModel,
        action: ContinuousAction,
        constraint: MonitoredConstraint,
        objective: ObjectiveFunction,
    }

    fn fixture() -> Fixture {
        let constraint =
            MonitoredConstraint::new("c", "line", StateId::preventive()).with_limit(100.0);
        let action = ContinuousAction::new(
            "pst",
            ContinuousKind::Pst,
            "pst-el",
            vec![SetPointRange::absolute(-10.0, 10.0)],
        );
        let model = LinearFlowModel::new()
            .with_base_flow("c", 110.0)
            .with_set_point_sensitivity("c", "pst-el", -5.0);
        let objective = ObjectiveFunction::new(MinMarginEvaluator::absolute(vec![constraint.clone()]));
        Fixture {
            model,
            action,
            constraint,
            objective,
        }
    }

    fn baseline(f: &Fixture) -> LinearOptimizationResult {
        let network = NetworkState::new("n").with_set_point("pst-el", 0.0);
        let sensitivity = f
            .model
            .compute(&network, &[f.action.clone()], &[f.constraint.clone()])
            .unwrap();
        let objective = f.objective.evaluate(&sensitivity);
        LinearOptimizationResult::unoptimized(
            network,
            HashMap::from([(f.action.id.clone(), 0.0)]),
            sensitivity,
            objective,
        )
    }

    fn builder(f: &Fixture) -> LinearProblemBuilder {
        LinearProblemBuilder::new()
            .with_filler(Box::new(CoreFiller::new(
                vec![CoreAction {
                    action: f.action.clone(),
                    min: -10.0,
                    max: 10.0,
                    initial: 0.0,
                }],
                vec![f.constraint.clone()],
                1e-6,
            )))
            .with_filler(Box::new(MaxMinMarginFiller::new(vec![f.constraint.clone()], vec![])))
    }

    #[test]
    fn test_improving_solution_is_accepted_then_converges() {
        let f = fixture();
        let solver = FixedSolver(4.0);
        let optimizer = IteratingLinearOptimizer::new(&f.model, &solver, &f.objective);
        let base = baseline(&f);
        let actions = [f.action.clone()];
        let result = optimizer.optimize(&base, &builder(&f), &actions, &actions, &[f.constraint.clone()]);
        // flow 110 − 5·4 = 90, margin 10
        assert_eq!(result.cost(), -10.0);
        assert_eq!(result.set_points[&ActionId::new("pst")], 4.0);
        assert_eq!(result.network.set_point("pst-el"), Some(4.0));
        assert_eq!(result.status, LinearOptimizationStatus::Converged);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_worse_solution_keeps_baseline() {
        let f = fixture();
        let solver = FixedSolver(-4.0);
        let optimizer = IteratingLinearOptimizer::new(&f.model, &solver, &f.objective);
        let base = baseline(&f);
        let actions = [f.action.clone()];
        let result = optimizer.optimize(&base, &builder(&f), &actions, &actions, &[f.constraint.clone()]);
        assert_eq!(result.cost(), base.cost());
        assert_eq!(result.network.set_point("pst-el"), Some(0.0));
    }

    #[test]
    fn test_solver_failure_keeps_baseline() {
        let f = fixture();
        let optimizer = IteratingLinearOptimizer::new(&f.model, &FailingSolver, &f.objective);
        let base = baseline(&f);
        let actions = [f.action.clone()];
        let result = optimizer.optimize(&base, &builder(&f), &actions, &actions, &[f.constraint.clone()]);
        assert_eq!(result.cost(), base.cost());
        assert_eq!(result.status, LinearOptimizationStatus::SolverFailure);
    }
}
