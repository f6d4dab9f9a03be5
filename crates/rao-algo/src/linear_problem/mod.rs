//! Linear problem over continuous set points.
//!
//! The problem is solver-agnostic: fillers append variables, two-sided
//! constraints and objective coefficients, then a [`LinearSolver`] translates
//! it to its backend. The problem is rebuilt from scratch after every
//! sensitivity update, so fillers never need to patch an existing model.
//! Fillers that declare the shared variables run first, so the order they
//! are registered in does not matter.
//!
//! ```text
//! CoreFiller            set_point[a], abs_variation[a], flow[c]
//! MaxMinMarginFiller    min_margin  ≤ margin(c)         (objective −min_margin)
//! MnecFiller            flow[c] within degraded bounds (violation penalised)
//! MaxLoopFlowFiller     |flow[c] − commercial[c]| ≤ threshold (violation penalised)
//! UnoptimizedFiller     margin(c) + slack ≥ initial margin
//! ```

mod fillers;
mod solver;

pub use fillers::{
    CoreAction, CoreFiller, MaxLoopFlowFiller, MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller,
    UnoptimizedConstraintFiller,
};
#[cfg(feature = "solver-clarabel")]
pub use solver::ClarabelSolver;
pub use solver::{LinearSolution, LinearSolver, LinearSolverError};

use crate::sensitivity::SensitivityResult;
use rao_core::{ActionId, ConstraintId, RaoError, RaoResult};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

impl VariableId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// `lower ≤ Σ coef·var ≤ upper`; either side may be infinite.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VariableId, f64)>,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<f64>,
    set_point_vars: BTreeMap<ActionId, VariableId>,
    abs_variation_vars: BTreeMap<ActionId, VariableId>,
    flow_vars: BTreeMap<ConstraintId, VariableId>,
    min_margin_var: Option<VariableId>,
}

impl LinearProblem {
    pub fn builder() -> LinearProblemBuilder {
        LinearProblemBuilder::new()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VariableId {
        let id = VariableId(self.variables.len());
        self.variables.push(VariableDef {
            name: name.into(),
            lower,
            upper,
        });
        self.objective.push(0.0);
        id
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VariableId, f64)>,
        lower: f64,
        upper: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms,
            lower,
            upper,
        });
    }

    /// Adds `coefficient` to the objective coefficient of `var`.
    pub fn add_objective_term(&mut self, var: VariableId, coefficient: f64) {
        self.objective[var.0] += coefficient;
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn register_set_point(&mut self, action: ActionId, var: VariableId) {
        self.set_point_vars.insert(action, var);
    }

    pub fn register_abs_variation(&mut self, action: ActionId, var: VariableId) {
        self.abs_variation_vars.insert(action, var);
    }

    pub fn register_flow(&mut self, constraint: ConstraintId, var: VariableId) {
        self.flow_vars.insert(constraint, var);
    }

    pub fn register_min_margin(&mut self, var: VariableId) {
        self.min_margin_var = Some(var);
    }

    pub fn set_point_variable(&self, action: &ActionId) -> Option<VariableId> {
        self.set_point_vars.get(action).copied()
    }

    pub fn abs_variation_variable(&self, action: &ActionId) -> Option<VariableId> {
        self.abs_variation_vars.get(action).copied()
    }

    pub fn min_margin_variable(&self) -> Option<VariableId> {
        self.min_margin_var
    }

    /// Flow variable of `constraint`, declared by the core filler.
    pub fn flow_variable(&self, constraint: &ConstraintId) -> RaoResult<VariableId> {
        self.flow_vars.get(constraint).copied().ok_or_else(|| {
            RaoError::Solver(format!("no flow variable for constraint '{}'", constraint))
        })
    }

    pub fn set_point_variables(&self) -> impl Iterator<Item = (&ActionId, VariableId)> {
        self.set_point_vars.iter().map(|(id, var)| (id, *var))
    }
}

/// What fillers may read while building one problem.
pub struct FillContext<'a> {
    pub sensitivity: &'a SensitivityResult,
    /// Set points the sensitivities were computed at.
    pub set_points: &'a HashMap<ActionId, f64>,
}

/// Contributes variables, constraints and objective terms to a problem.
pub trait ProblemFiller: Send + Sync {
    /// Whether this filler declares the set-point, variation and flow
    /// variables the others refer to.
    fn declares_shared_variables(&self) -> bool {
        false
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()>;
}

/// Fillers of one problem.
#[derive(Default)]
pub struct LinearProblemBuilder {
    fillers: Vec<Box<dyn ProblemFiller>>,
}

impl LinearProblemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filler(mut self, filler: Box<dyn ProblemFiller>) -> Self {
        self.fillers.push(filler);
        self
    }

    /// Runs the declaring fillers, then the others, each group in
    /// registration order.
    pub fn build(&self, ctx: &FillContext<'_>) -> RaoResult<LinearProblem> {
        let mut problem = LinearProblem::default();
        let (declaring, dependent): (Vec<_>, Vec<_>) = self
            .fillers
            .iter()
            .partition(|f| f.declares_shared_variables());
        for filler in declaring.into_iter().chain(dependent) {
            filler.fill(&mut problem, ctx)?;
        }
        Ok(problem)
    }
}
