//! LP solver seam.
//!
//! [`LinearSolver`] is the strategy trait; [`ClarabelSolver`] translates a
//! [`LinearProblem`] into a `good_lp` model solved by Clarabel.

use super::{LinearProblem, VariableId};
use rao_core::RaoError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolverError {
    #[error("linear problem is infeasible")]
    Infeasible,
    #[error("linear problem is unbounded")]
    Unbounded,
    #[error("numerical issue: {0}")]
    Numerical(String),
}

impl From<LinearSolverError> for RaoError {
    fn from(err: LinearSolverError) -> Self {
        RaoError::Solver(err.to_string())
    }
}

/// Variable values and objective of an optimal solution.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    values: Vec<f64>,
    pub objective: f64,
}

impl LinearSolution {
    pub fn new(values: Vec<f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    pub fn value(&self, var: VariableId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }
}

/// Solves a linear problem to optimality.
pub trait LinearSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, problem: &LinearProblem) -> Result<LinearSolution, LinearSolverError>;
}

#[cfg(feature = "solver-clarabel")]
pub use clarabel_backend::ClarabelSolver;

#[cfg(feature = "solver-clarabel")]
mod clarabel_backend {
    use super::{LinearSolution, LinearSolver, LinearSolverError};
    use crate::linear_problem::LinearProblem;
    use good_lp::solvers::clarabel::clarabel;
    use good_lp::{
        constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel,
        Variable,
    };

    /// Interior-point LP backend (pure Rust).
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClarabelSolver;

    impl ClarabelSolver {
        pub fn new() -> Self {
            Self
        }
    }

    impl LinearSolver for ClarabelSolver {
        fn name(&self) -> &str {
            "clarabel"
        }

        fn solve(&self, problem: &LinearProblem) -> Result<LinearSolution, LinearSolverError> {
            let mut vars = variables!();
            let handles: Vec<Variable> = problem
                .variables()
                .iter()
                .map(|def| {
                    let mut definition = variable().name(def.name.clone());
                    if def.lower.is_finite() {
                        definition = definition.min(def.lower);
                    }
                    if def.upper.is_finite() {
                        definition = definition.max(def.upper);
                    }
                    vars.add(definition)
                })
                .collect();

            let objective = problem
                .objective()
                .iter()
                .zip(&handles)
                .filter(|(coef, _)| **coef != 0.0)
                .fold(Expression::from(0.0), |acc, (coef, var)| acc + *coef * *var);

            let mut model = vars.minimise(objective).using(clarabel);
            for row in problem.constraints() {
                let mut expr = Expression::from(0.0);
                for (var, coef) in &row.terms {
                    expr += *coef * handles[var.index()];
                }
                let (lower, upper) = (row.lower, row.upper);
                if lower.is_finite() && upper.is_finite() && lower == upper {
                    model = model.with(constraint!(expr == lower));
                    continue;
                }
                if lower.is_finite() {
                    model = model.with(constraint!(expr.clone() >= lower));
                }
                if upper.is_finite() {
                    model = model.with(constraint!(expr <= upper));
                }
            }

            let solution = model.solve().map_err(|e| match e {
                ResolutionError::Infeasible => LinearSolverError::Infeasible,
                ResolutionError::Unbounded => LinearSolverError::Unbounded,
                other => LinearSolverError::Numerical(format!("{:?}", other)),
            })?;

            let values: Vec<f64> = handles.iter().map(|v| solution.value(*v)).collect();
            let objective = problem
                .objective()
                .iter()
                .zip(&values)
                .map(|(coef, value)| coef * value)
                .sum();
            Ok(LinearSolution::new(values, objective))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_solves_small_max_min_problem() {
            // maximize m s.t. m ≤ 10 − x, m ≤ x, 0 ≤ x ≤ 10  ⇒  x = 5, m = 5
            let mut problem = LinearProblem::default();
            let x = problem.add_variable("x", 0.0, 10.0);
            let m = problem.add_variable("m", f64::NEG_INFINITY, f64::INFINITY);
            problem.add_constraint("upper", vec![(m, 1.0), (x, 1.0)], f64::NEG_INFINITY, 10.0);
            problem.add_constraint("lower", vec![(m, 1.0), (x, -1.0)], f64::NEG_INFINITY, 0.0);
            problem.add_objective_term(m, -1.0);

            let solution = ClarabelSolver::new().solve(&problem).unwrap();
            assert!((solution.value(x) - 5.0).abs() < 1e-4);
            assert!((solution.objective + 5.0).abs() < 1e-4);
        }

        #[test]
        fn test_infeasible_problem_is_reported() {
            let mut problem = LinearProblem::default();
            let x = problem.add_variable("x", 0.0, 1.0);
            problem.add_constraint("impossible", vec![(x, 1.0)], 2.0, f64::INFINITY);
            let err = ClarabelSolver::new().solve(&problem).unwrap_err();
            assert!(matches!(
                err,
                LinearSolverError::Infeasible | LinearSolverError::Numerical(_)
            ));
        }
    }
}
