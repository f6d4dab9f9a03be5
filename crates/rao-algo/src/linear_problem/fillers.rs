use super::{FillContext, LinearProblem, ProblemFiller};
use rao_core::{ActionId, ConstraintId, ContinuousAction, MonitoredConstraint, RaoError, RaoResult};

const INF: f64 = f64::INFINITY;

/// Unit penalty on margin decreases of unoptimized constraints.
const UNOPTIMIZED_SLACK_COST: f64 = 1.0;

/// A continuous action as seen by the LP.
#[derive(Debug, Clone)]
pub struct CoreAction {
    pub action: ContinuousAction,
    pub min: f64,
    pub max: f64,
    /// Pre-perimeter set point, the origin of the absolute variation.
    pub initial: f64,
}

/// Set-point, absolute-variation and flow variables.
///
/// Flows are linearized around the point the sensitivities were computed at:
/// `flow[c] = ref_flow[c] + Σ_a s(c, a)·(set_point[a] − ref_set_point[a])`.
#[derive(Debug, Clone)]
pub struct CoreFiller {
    actions: Vec<CoreAction>,
    constraints: Vec<MonitoredConstraint>,
    sensitivity_threshold: f64,
}

impl CoreFiller {
    pub fn new(
        actions: Vec<CoreAction>,
        constraints: Vec<MonitoredConstraint>,
        sensitivity_threshold: f64,
    ) -> Self {
        Self {
            actions,
            constraints,
            sensitivity_threshold,
        }
    }
}

impl ProblemFiller for CoreFiller {
    fn declares_shared_variables(&self) -> bool {
        true
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let mut set_point_vars = Vec::with_capacity(self.actions.len());
        for core in &self.actions {
            let id = &core.action.id;
            let set_point = problem.add_variable(format!("set_point_{}", id), core.min, core.max);
            let variation = problem.add_variable(format!("abs_variation_{}", id), 0.0, INF);
            problem.add_constraint(
                format!("abs_variation_below_{}", id),
                vec![(set_point, 1.0), (variation, -1.0)],
                -INF,
                core.initial,
            );
            problem.add_constraint(
                format!("abs_variation_above_{}", id),
                vec![(set_point, 1.0), (variation, 1.0)],
                core.initial,
                INF,
            );
            problem.register_set_point(id.clone(), set_point);
            problem.register_abs_variation(id.clone(), variation);
            let reference = ctx.set_points.get(id).copied().unwrap_or(core.initial);
            set_point_vars.push((id, set_point, reference));
        }

        for constraint in &self.constraints {
            let reference_flow = ctx.sensitivity.flow(&constraint.id).ok_or_else(|| {
                RaoError::Sensitivity(format!("no flow for constraint '{}'", constraint.id))
            })?;
            let flow = problem.add_variable(format!("flow_{}", constraint.id), -INF, INF);
            let mut terms = vec![(flow, 1.0)];
            let mut rhs = reference_flow;
            for (action, var, reference) in &set_point_vars {
                let sensitivity = ctx.sensitivity.sensitivity(&constraint.id, action);
                if sensitivity.abs() >= self.sensitivity_threshold && sensitivity != 0.0 {
                    terms.push((*var, -sensitivity));
                    rhs -= sensitivity * reference;
                }
            }
            problem.add_constraint(format!("flow_definition_{}", constraint.id), terms, rhs, rhs);
            problem.register_flow(constraint.id.clone(), flow);
        }
        Ok(())
    }
}

fn add_variation_penalties(problem: &mut LinearProblem, penalties: &[(ActionId, f64)]) {
    for (action, cost) in penalties {
        if let Some(variation) = problem.abs_variation_variable(action) {
            problem.add_objective_term(variation, *cost);
        }
    }
}

/// Maximizes the minimum absolute margin (objective `−min_margin`).
#[derive(Debug, Clone)]
pub struct MaxMinMarginFiller {
    constraints: Vec<MonitoredConstraint>,
    penalties: Vec<(ActionId, f64)>,
}

impl MaxMinMarginFiller {
    pub fn new(constraints: Vec<MonitoredConstraint>, penalties: Vec<(ActionId, f64)>) -> Self {
        Self {
            constraints,
            penalties,
        }
    }
}

impl ProblemFiller for MaxMinMarginFiller {
    fn fill(&self, problem: &mut LinearProblem, _ctx: &FillContext<'_>) -> RaoResult<()> {
        let min_margin = if self.constraints.is_empty() {
            problem.add_variable("min_margin", 0.0, 0.0)
        } else {
            problem.add_variable("min_margin", -INF, INF)
        };
        for constraint in &self.constraints {
            let flow = problem.flow_variable(&constraint.id)?;
            if let Some(upper) = constraint.upper {
                problem.add_constraint(
                    format!("min_margin_upper_{}", constraint.id),
                    vec![(min_margin, 1.0), (flow, 1.0)],
                    -INF,
                    upper,
                );
            }
            if let Some(lower) = constraint.lower {
                problem.add_constraint(
                    format!("min_margin_lower_{}", constraint.id),
                    vec![(min_margin, 1.0), (flow, -1.0)],
                    -INF,
                    -lower,
                );
            }
        }
        problem.add_objective_term(min_margin, -1.0);
        problem.register_min_margin(min_margin);
        add_variation_penalties(problem, &self.penalties);
        Ok(())
    }
}

/// Maximizes the minimum margin divided by each constraint's coefficient.
///
/// Continuous relaxation: the coefficient applies to negative margins too.
#[derive(Debug, Clone)]
pub struct MaxMinRelativeMarginFiller {
    constraints: Vec<(MonitoredConstraint, f64)>,
    penalties: Vec<(ActionId, f64)>,
}

impl MaxMinRelativeMarginFiller {
    pub fn new(
        constraints: Vec<(MonitoredConstraint, f64)>,
        penalties: Vec<(ActionId, f64)>,
    ) -> Self {
        Self {
            constraints,
            penalties,
        }
    }
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn fill(&self, problem: &mut LinearProblem, _ctx: &FillContext<'_>) -> RaoResult<()> {
        let min_margin = if self.constraints.is_empty() {
            problem.add_variable("min_relative_margin", 0.0, 0.0)
        } else {
            problem.add_variable("min_relative_margin", -INF, INF)
        };
        for (constraint, coefficient) in &self.constraints {
            let flow = problem.flow_variable(&constraint.id)?;
            if let Some(upper) = constraint.upper {
                problem.add_constraint(
                    format!("min_relative_margin_upper_{}", constraint.id),
                    vec![(min_margin, *coefficient), (flow, 1.0)],
                    -INF,
                    upper,
                );
            }
            if let Some(lower) = constraint.lower {
                problem.add_constraint(
                    format!("min_relative_margin_lower_{}", constraint.id),
                    vec![(min_margin, *coefficient), (flow, -1.0)],
                    -INF,
                    -lower,
                );
            }
        }
        problem.add_objective_term(min_margin, -1.0);
        problem.register_min_margin(min_margin);
        add_variation_penalties(problem, &self.penalties);
        Ok(())
    }
}

/// Lets monitored constraints degrade by an acceptable amount, penalizing more.
#[derive(Debug, Clone)]
pub struct MnecFiller {
    constraints: Vec<(MonitoredConstraint, f64)>,
    acceptable_margin_decrease: f64,
    violation_cost: f64,
    adjustment_coefficient: f64,
}

impl MnecFiller {
    /// `constraints` pairs each monitored constraint with its initial flow.
    pub fn new(
        constraints: Vec<(MonitoredConstraint, f64)>,
        acceptable_margin_decrease: f64,
        violation_cost: f64,
        adjustment_coefficient: f64,
    ) -> Self {
        Self {
            constraints,
            acceptable_margin_decrease,
            violation_cost,
            adjustment_coefficient,
        }
    }
}

impl ProblemFiller for MnecFiller {
    fn fill(&self, problem: &mut LinearProblem, _ctx: &FillContext<'_>) -> RaoResult<()> {
        for (constraint, initial_flow) in &self.constraints {
            let flow = problem.flow_variable(&constraint.id)?;
            let violation =
                problem.add_variable(format!("mnec_violation_{}", constraint.id), 0.0, INF);
            if let Some(upper) = constraint.upper {
                let bound = upper.max(initial_flow + self.acceptable_margin_decrease)
                    - self.adjustment_coefficient;
                problem.add_constraint(
                    format!("mnec_upper_{}", constraint.id),
                    vec![(flow, 1.0), (violation, -1.0)],
                    -INF,
                    bound,
                );
            }
            if let Some(lower) = constraint.lower {
                let bound = lower.min(initial_flow - self.acceptable_margin_decrease)
                    + self.adjustment_coefficient;
                problem.add_constraint(
                    format!("mnec_lower_{}", constraint.id),
                    vec![(flow, 1.0), (violation, 1.0)],
                    bound,
                    INF,
                );
            }
            problem.add_objective_term(violation, self.violation_cost);
        }
        Ok(())
    }
}

/// Keeps loop flows (flow minus commercial flow) under their threshold.
#[derive(Debug, Clone)]
pub struct MaxLoopFlowFiller {
    /// (constraint, threshold, commercial flow)
    constraints: Vec<(ConstraintId, f64, f64)>,
    violation_cost: f64,
    adjustment_coefficient: f64,
}

impl MaxLoopFlowFiller {
    pub fn new(
        constraints: Vec<(ConstraintId, f64, f64)>,
        violation_cost: f64,
        adjustment_coefficient: f64,
    ) -> Self {
        Self {
            constraints,
            violation_cost,
            adjustment_coefficient,
        }
    }
}

impl ProblemFiller for MaxLoopFlowFiller {
    fn fill(&self, problem: &mut LinearProblem, _ctx: &FillContext<'_>) -> RaoResult<()> {
        for (id, threshold, commercial) in &self.constraints {
            let flow = problem.flow_variable(id)?;
            let violation = problem.add_variable(format!("loop_flow_violation_{}", id), 0.0, INF);
            let bound = (threshold - self.adjustment_coefficient).max(0.0);
            problem.add_constraint(
                format!("max_loop_flow_upper_{}", id),
                vec![(flow, 1.0), (violation, -1.0)],
                -INF,
                commercial + bound,
            );
            problem.add_constraint(
                format!("max_loop_flow_lower_{}", id),
                vec![(flow, 1.0), (violation, 1.0)],
                commercial - bound,
                INF,
            );
            problem.add_objective_term(violation, self.violation_cost);
        }
        Ok(())
    }
}

/// Constraints of unoptimized operators: margin decreases cost one unit per
/// unit of decrease and never drive the min-margin variable.
#[derive(Debug, Clone)]
pub struct UnoptimizedConstraintFiller {
    /// (constraint, initial margin)
    constraints: Vec<(MonitoredConstraint, f64)>,
}

impl UnoptimizedConstraintFiller {
    pub fn new(constraints: Vec<(MonitoredConstraint, f64)>) -> Self {
        Self { constraints }
    }
}

impl ProblemFiller for UnoptimizedConstraintFiller {
    fn fill(&self, problem: &mut LinearProblem, _ctx: &FillContext<'_>) -> RaoResult<()> {
        for (constraint, initial_margin) in &self.constraints {
            let flow = problem.flow_variable(&constraint.id)?;
            let slack =
                problem.add_variable(format!("unoptimized_slack_{}", constraint.id), 0.0, INF);
            // upper − flow + slack ≥ initial margin
            if let Some(upper) = constraint.upper {
                problem.add_constraint(
                    format!("unoptimized_upper_{}", constraint.id),
                    vec![(flow, -1.0), (slack, 1.0)],
                    initial_margin - upper,
                    INF,
                );
            }
            // flow − lower + slack ≥ initial margin
            if let Some(lower) = constraint.lower {
                problem.add_constraint(
                    format!("unoptimized_lower_{}", constraint.id),
                    vec![(flow, 1.0), (slack, 1.0)],
                    initial_margin + lower,
                    INF,
                );
            }
            problem.add_objective_term(slack, UNOPTIMIZED_SLACK_COST);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_problem::{LinearConstraint, LinearProblemBuilder, VariableId};
    use crate::sensitivity::{ComputationStatus, SensitivityResult};
    use rao_core::{ContinuousKind, SetPointRange, StateId};
    use std::collections::HashMap;

    fn core() -> CoreFiller {
        let action = ContinuousAction::new(
            "pst",
            ContinuousKind::Pst,
            "pst-el",
            vec![SetPointRange::absolute(-10.0, 10.0)],
        );
        let constraint =
            MonitoredConstraint::new("c", "line", StateId::preventive()).with_limit(100.0);
        CoreFiller::new(
            vec![CoreAction {
                action,
                min: -10.0,
                max: 10.0,
                initial: 0.0,
            }],
            vec![constraint],
            1e-6,
        )
    }

    #[test]
    fn test_core_filler_linearizes_around_reference() {
        let sensitivity = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("c", 110.0)
            .with_sensitivity("c", "pst", -2.0);
        let set_points = HashMap::from([(ActionId::new("pst"), 3.0)]);
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let problem = LinearProblem::builder()
            .with_filler(Box::new(core()))
            .build(&ctx)
            .unwrap();

        // set point, abs variation, flow
        assert_eq!(problem.variables().len(), 3);
        let definition = problem
            .constraints()
            .iter()
            .find(|c| c.name == "flow_definition_c")
            .unwrap();
        // flow + 2·sp = 110 + 2·3
        assert_eq!(definition.lower, 116.0);
        assert_eq!(definition.upper, 116.0);
        assert_eq!(definition.terms.len(), 2);
    }

    fn ctx_parts() -> (SensitivityResult, HashMap<ActionId, f64>) {
        let sensitivity = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("c", 110.0)
            .with_sensitivity("c", "pst", -2.0);
        (sensitivity, HashMap::from([(ActionId::new("pst"), 0.0)]))
    }

    fn limited(id: &str, limit: f64) -> MonitoredConstraint {
        MonitoredConstraint::new(id, "line", StateId::preventive()).with_limit(limit)
    }

    fn row<'p>(problem: &'p LinearProblem, name: &str) -> &'p LinearConstraint {
        problem
            .constraints()
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no row '{}'", name))
    }

    fn variable(problem: &LinearProblem, name: &str) -> VariableId {
        let index = problem
            .variables()
            .iter()
            .position(|v| v.name == name)
            .unwrap_or_else(|| panic!("no variable '{}'", name));
        VariableId(index)
    }

    fn coefficient(row: &LinearConstraint, var: VariableId) -> f64 {
        row.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    #[test]
    fn test_filler_registration_order_does_not_matter() {
        let (sensitivity, set_points) = ctx_parts();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let margin = || {
            Box::new(MaxMinMarginFiller::new(
                vec![limited("c", 100.0)],
                vec![(ActionId::new("pst"), 0.01)],
            ))
        };
        let forward = LinearProblemBuilder::new()
            .with_filler(Box::new(core()))
            .with_filler(margin())
            .build(&ctx)
            .unwrap();
        let reversed = LinearProblemBuilder::new()
            .with_filler(margin())
            .with_filler(Box::new(core()))
            .build(&ctx)
            .unwrap();

        let names = |p: &LinearProblem| -> Vec<String> {
            p.constraints().iter().map(|c| c.name.clone()).collect()
        };
        assert_eq!(names(&forward), names(&reversed));
        assert_eq!(forward.objective(), reversed.objective());
        let variation = reversed
            .abs_variation_variable(&ActionId::new("pst"))
            .unwrap();
        assert_eq!(reversed.objective()[variation.index()], 0.01);
    }

    #[test]
    fn test_relative_margin_filler_weights_min_margin() {
        let (sensitivity, set_points) = ctx_parts();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let problem = LinearProblemBuilder::new()
            .with_filler(Box::new(core()))
            .with_filler(Box::new(MaxMinRelativeMarginFiller::new(
                vec![(limited("c", 100.0), 0.25)],
                vec![],
            )))
            .build(&ctx)
            .unwrap();

        let min_margin = problem.min_margin_variable().unwrap();
        assert_eq!(problem.variables()[min_margin.index()].name, "min_relative_margin");
        assert_eq!(problem.objective()[min_margin.index()], -1.0);
        let flow = problem.flow_variable(&"c".into()).unwrap();

        // 0.25·m + flow ≤ 100
        let upper = row(&problem, "min_relative_margin_upper_c");
        assert_eq!(coefficient(upper, min_margin), 0.25);
        assert_eq!(coefficient(upper, flow), 1.0);
        assert_eq!((upper.lower, upper.upper), (f64::NEG_INFINITY, 100.0));
        // 0.25·m − flow ≤ 100
        let lower = row(&problem, "min_relative_margin_lower_c");
        assert_eq!(coefficient(lower, min_margin), 0.25);
        assert_eq!(coefficient(lower, flow), -1.0);
        assert_eq!(lower.upper, 100.0);
    }

    #[test]
    fn test_mnec_filler_bounds_flow_with_penalized_violation() {
        let sensitivity = SensitivityResult::new(ComputationStatus::Default).with_flow("m", 48.0);
        let set_points = HashMap::new();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let monitored = limited("m", 50.0).monitored_only();
        let problem = LinearProblemBuilder::new()
            .with_filler(Box::new(MnecFiller::new(
                vec![(monitored.clone(), 48.0)],
                5.0,
                10.0,
                1.0,
            )))
            .with_filler(Box::new(CoreFiller::new(vec![], vec![monitored], 1e-6)))
            .build(&ctx)
            .unwrap();

        let flow = problem.flow_variable(&"m".into()).unwrap();
        let violation = variable(&problem, "mnec_violation_m");
        assert_eq!(problem.objective()[violation.index()], 10.0);
        // flow − v ≤ max(50, 48 + 5) − 1
        let upper = row(&problem, "mnec_upper_m");
        assert_eq!(coefficient(upper, flow), 1.0);
        assert_eq!(coefficient(upper, violation), -1.0);
        assert_eq!(upper.upper, 52.0);
        // flow + v ≥ min(−50, 48 − 5) + 1
        let lower = row(&problem, "mnec_lower_m");
        assert_eq!(coefficient(lower, violation), 1.0);
        assert_eq!(lower.lower, -49.0);
    }

    #[test]
    fn test_loop_flow_filler_centers_on_commercial_flow() {
        let (sensitivity, set_points) = ctx_parts();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let problem = LinearProblemBuilder::new()
            .with_filler(Box::new(MaxLoopFlowFiller::new(
                vec![(ConstraintId::new("c"), 30.0, 70.0)],
                5.0,
                2.0,
            )))
            .with_filler(Box::new(core()))
            .build(&ctx)
            .unwrap();

        let flow = problem.flow_variable(&"c".into()).unwrap();
        let violation = variable(&problem, "loop_flow_violation_c");
        assert_eq!(problem.objective()[violation.index()], 5.0);
        let upper = row(&problem, "max_loop_flow_upper_c");
        assert_eq!(coefficient(upper, flow), 1.0);
        assert_eq!(coefficient(upper, violation), -1.0);
        assert_eq!(upper.upper, 98.0);
        let lower = row(&problem, "max_loop_flow_lower_c");
        assert_eq!(coefficient(lower, violation), 1.0);
        assert_eq!(lower.lower, 42.0);
    }

    #[test]
    fn test_unoptimized_filler_keeps_margin_out_of_min_margin() {
        let (sensitivity, set_points) = ctx_parts();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let problem = LinearProblemBuilder::new()
            .with_filler(Box::new(core()))
            .with_filler(Box::new(MaxMinMarginFiller::new(vec![], vec![])))
            .with_filler(Box::new(UnoptimizedConstraintFiller::new(vec![(
                limited("c", 100.0),
                -10.0,
            )])))
            .build(&ctx)
            .unwrap();

        let flow = problem.flow_variable(&"c".into()).unwrap();
        let slack = variable(&problem, "unoptimized_slack_c");
        let min_margin = problem.min_margin_variable().unwrap();
        assert_eq!(problem.objective()[slack.index()], UNOPTIMIZED_SLACK_COST);
        // 100 − flow + s ≥ −10
        let upper = row(&problem, "unoptimized_upper_c");
        assert_eq!(coefficient(upper, flow), -1.0);
        assert_eq!(coefficient(upper, slack), 1.0);
        assert_eq!(upper.lower, -110.0);
        // flow + 100 + s ≥ −10
        let lower = row(&problem, "unoptimized_lower_c");
        assert_eq!(coefficient(lower, flow), 1.0);
        assert_eq!(lower.lower, -110.0);
        assert!(problem
            .constraints()
            .iter()
            .all(|c| coefficient(c, min_margin) == 0.0));
    }

    #[test]
    fn test_empty_margin_filler_fixes_min_margin() {
        let sensitivity = SensitivityResult::new(ComputationStatus::Default);
        let set_points = HashMap::new();
        let ctx = FillContext {
            sensitivity: &sensitivity,
            set_points: &set_points,
        };
        let problem = LinearProblemBuilder::new()
            .with_filler(Box::new(MaxMinMarginFiller::new(vec![], vec![])))
            .build(&ctx)
            .unwrap();
        let var = problem.min_margin_variable().unwrap();
        let def = &problem.variables()[var.index()];
        assert_eq!((def.lower, def.upper), (0.0, 0.0));
    }
}
