//! One node of the search tree.
//!
//! A leaf is identified by the discrete actions applied along its path (the
//! root has none). It owns its own copy of the network, so sibling leaves
//! can be evaluated on different threads without sharing mutable state.
//!
//! ```text
//! Created ──evaluate──▶ Evaluated ──optimize──▶ Optimized ──bloom──▶ children
//!    │                      ▲
//!    └──(failure)──▶ Error  └── inherited sensitivity result
//! ```

use crate::iterating::{IteratingLinearOptimizer, LinearOptimizationResult};
use crate::linear_problem::{
    CoreAction, CoreFiller, LinearProblemBuilder, LinearSolver, MaxLoopFlowFiller,
    MaxMinMarginFiller, MaxMinRelativeMarginFiller, MnecFiller, UnoptimizedConstraintFiller,
};
use crate::objective::ObjectiveFunction;
use crate::parameters::{ObjectiveFunctionKind, SearchTreeParameters};
use crate::perimeter::Perimeter;
use crate::sensitivity::{ComputationStatus, SensitivityProvider, SensitivityResult};
use rao_core::{
    ActionId, ConstraintId, ContinuousAction, DiscreteAction, NetworkState, OperatorId,
    RegionGraph,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, error, warn};

/// A continuous action is active when its set point moved by more than this.
pub const ACTIVATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    Created,
    Evaluated,
    Optimized,
    Error,
}

/// Read-only collaborators shared by every leaf of one perimeter.
#[derive(Clone, Copy)]
pub struct LeafContext<'a> {
    pub perimeter: &'a Perimeter,
    pub params: &'a SearchTreeParameters,
    pub sensitivity: &'a dyn SensitivityProvider,
    pub solver: &'a dyn LinearSolver,
    pub objective: &'a ObjectiveFunction,
    pub region_graph: &'a RegionGraph,
    /// Pre-perimeter result.
    pub initial: &'a SensitivityResult,
    /// Pre-perimeter set points of the perimeter's continuous actions.
    pub initial_set_points: &'a HashMap<ActionId, f64>,
}

#[derive(Debug, Clone)]
pub struct Leaf {
    network: NetworkState,
    actions: Vec<DiscreteAction>,
    status: LeafStatus,
    sensitivity: Option<SensitivityResult>,
    pre_optim: Option<LinearOptimizationResult>,
    optimized: Option<LinearOptimizationResult>,
}

impl Leaf {
    pub fn root(network: NetworkState) -> Self {
        Self {
            network,
            actions: Vec::new(),
            status: LeafStatus::Created,
            sensitivity: None,
            pre_optim: None,
            optimized: None,
        }
    }

    /// Root leaf whose sensitivity was already computed on `network`.
    pub fn root_with_sensitivity(network: NetworkState, sensitivity: SensitivityResult) -> Self {
        Self {
            status: LeafStatus::Evaluated,
            sensitivity: Some(sensitivity),
            ..Self::root(network)
        }
    }

    /// Child of `parent` adding `action`. The child starts from the parent's
    /// best network, including its optimized set points, unless keeping them
    /// would break the usage limits (see [`Leaf::evaluate`]).
    pub fn child(parent: &Leaf, action: DiscreteAction) -> Self {
        let mut actions = parent.actions.clone();
        actions.push(action);
        Self {
            network: parent.best_network().clone(),
            actions,
            status: LeafStatus::Created,
            sensitivity: None,
            pre_optim: None,
            optimized: None,
        }
    }

    pub fn status(&self) -> LeafStatus {
        self.status
    }

    pub fn is_root(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[DiscreteAction] {
        &self.actions
    }

    pub fn action_ids(&self) -> Vec<ActionId> {
        self.actions.iter().map(|a| a.id.clone()).collect()
    }

    /// Network after optimization if optimized, as evaluated otherwise.
    pub fn best_network(&self) -> &NetworkState {
        self.result().map_or(&self.network, |r| &r.network)
    }

    /// Optimized result if available, otherwise the evaluated baseline.
    pub fn result(&self) -> Option<&LinearOptimizationResult> {
        self.optimized.as_ref().or(self.pre_optim.as_ref())
    }

    /// Total cost; infinite until evaluated.
    pub fn cost(&self) -> f64 {
        self.result().map_or(f64::INFINITY, |r| r.cost())
    }

    pub fn functional_cost(&self) -> f64 {
        self.result()
            .map_or(f64::INFINITY, |r| r.objective.functional_cost)
    }

    pub fn virtual_cost(&self) -> f64 {
        self.result().map_or(0.0, |r| r.objective.virtual_cost())
    }

    pub fn virtual_cost_of(&self, name: &str) -> f64 {
        self.result().map_or(0.0, |r| r.objective.virtual_cost_of(name))
    }

    pub fn sensitivity_status(&self) -> Option<ComputationStatus> {
        self.result().map(|r| r.sensitivity.status)
    }

    pub fn most_limiting_elements(&self, n: usize) -> &[(ConstraintId, f64)] {
        self.result()
            .map_or(&[][..], |r| r.objective.most_limiting_elements(n))
    }

    /// Current set point of every perimeter continuous action.
    pub fn set_points(&self) -> Option<&HashMap<ActionId, f64>> {
        self.result().map(|r| &r.set_points)
    }

    /// Continuous actions whose set point moved away from its pre-perimeter value.
    pub fn active_continuous_actions<'c>(&self, ctx: &LeafContext<'c>) -> Vec<&'c ContinuousAction> {
        let network = self.best_network();
        ctx.perimeter
            .continuous_actions
            .iter()
            .filter(|a| {
                let initial = ctx
                    .initial_set_points
                    .get(&a.id)
                    .copied()
                    .unwrap_or_else(|| a.current_value(network));
                (a.current_value(network) - initial).abs() > ACTIVATION_TOLERANCE
            })
            .collect()
    }

    fn applied_count(&self, operator: &OperatorId) -> usize {
        self.actions
            .iter()
            .filter(|a| a.operator.as_ref() == Some(operator))
            .count()
    }

    /// Discrete actions still allowed per limited operator:
    /// `min(max_discrete, max_total − active continuous)`.
    pub fn max_discrete_per_operator(&self, ctx: &LeafContext<'_>) -> BTreeMap<OperatorId, usize> {
        let limits = &ctx.params.tree.usage_limits;
        let active = self.active_continuous_actions(ctx);
        let operators: BTreeSet<&OperatorId> = limits
            .max_ra_per_operator
            .keys()
            .chain(limits.max_discrete_per_operator.keys())
            .collect();
        operators
            .into_iter()
            .map(|op| {
                let active_count = active
                    .iter()
                    .filter(|a| a.operator.as_ref() == Some(op))
                    .count();
                let from_total = limits
                    .max_ra_per_operator
                    .get(op)
                    .map_or(usize::MAX, |max| max.saturating_sub(active_count));
                let from_discrete = limits
                    .max_discrete_per_operator
                    .get(op)
                    .copied()
                    .unwrap_or(usize::MAX);
                (op.clone(), from_total.min(from_discrete))
            })
            .collect()
    }

    /// Continuous actions allowed per limited operator:
    /// `min(max_continuous, max_total − applied discrete)`.
    pub fn max_continuous_per_operator(
        &self,
        ctx: &LeafContext<'_>,
    ) -> BTreeMap<OperatorId, usize> {
        let limits = &ctx.params.tree.usage_limits;
        let operators: BTreeSet<&OperatorId> = limits
            .max_ra_per_operator
            .keys()
            .chain(limits.max_continuous_per_operator.keys())
            .collect();
        operators
            .into_iter()
            .map(|op| {
                let from_total = limits
                    .max_ra_per_operator
                    .get(op)
                    .map_or(usize::MAX, |max| max.saturating_sub(self.applied_count(op)));
                let from_continuous = limits
                    .max_continuous_per_operator
                    .get(op)
                    .copied()
                    .unwrap_or(usize::MAX);
                (op.clone(), from_total.min(from_continuous))
            })
            .collect()
    }

    /// Applies this leaf's discrete actions and computes its baseline cost.
    ///
    /// When the inherited active continuous actions no longer fit the usage
    /// limits next to the discrete ones, every continuous action goes back to
    /// its pre-perimeter set point first. Idempotent once evaluated.
    /// Collaborator failures set `Error`.
    pub fn evaluate(&mut self, ctx: &LeafContext<'_>) {
        match self.status {
            LeafStatus::Error | LeafStatus::Optimized => return,
            LeafStatus::Evaluated if self.pre_optim.is_some() => {
                debug!("leaf {} already evaluated", self);
                return;
            }
            _ => {}
        }

        if self.sensitivity.is_none() {
            for action in &self.actions {
                if self.network.has_applied(&action.id) {
                    continue;
                }
                if let Err(e) = action.apply(&mut self.network) {
                    error!("could not apply '{}': {}", action.id, e);
                    self.status = LeafStatus::Error;
                    return;
                }
            }
            self.release_continuous_over_limits(ctx);
            match ctx.sensitivity.compute(
                &self.network,
                &ctx.perimeter.continuous_actions,
                &ctx.perimeter.constraints,
            ) {
                Ok(result) => self.sensitivity = Some(result),
                Err(e) => {
                    error!("sensitivity failed for leaf {}: {}", self, e);
                    self.status = LeafStatus::Error;
                    return;
                }
            }
        }

        let Some(sensitivity) = self.sensitivity.take() else {
            self.status = LeafStatus::Error;
            return;
        };
        let objective = ctx.objective.evaluate(&sensitivity);
        self.pre_optim = Some(LinearOptimizationResult::unoptimized(
            self.network.clone(),
            ctx.perimeter.set_points(&self.network),
            sensitivity,
            objective,
        ));
        self.status = LeafStatus::Evaluated;
    }

    /// Optimizes continuous set points for this leaf's topology.
    pub fn optimize(&mut self, ctx: &LeafContext<'_>) {
        match self.status {
            LeafStatus::Optimized => return,
            LeafStatus::Created | LeafStatus::Error => {
                warn!(
                    "cannot optimize leaf {} with status {:?}, evaluate it first",
                    self, self.status
                );
                return;
            }
            LeafStatus::Evaluated => {}
        }
        let Some(baseline) = self.pre_optim.as_ref() else {
            warn!("leaf {} has no evaluation result", self);
            return;
        };

        let actions = self.optimizable_actions(ctx, baseline);
        if actions.is_empty() {
            debug!("no continuous action to optimize for leaf {}", self);
            self.optimized = Some(baseline.clone());
            self.status = LeafStatus::Optimized;
            return;
        }

        let builder = problem_builder(ctx, &actions);
        let optimizer = IteratingLinearOptimizer::new(ctx.sensitivity, ctx.solver, ctx.objective)
            .with_max_iterations(ctx.params.range_actions.max_iterations)
            .with_convergence_threshold(ctx.params.range_actions.convergence_threshold);
        let optimized: Vec<ContinuousAction> = actions.into_iter().map(|(a, _)| a).collect();
        let result = optimizer.optimize(
            baseline,
            &builder,
            &optimized,
            &ctx.perimeter.continuous_actions,
            &ctx.perimeter.constraints,
        );
        debug!(
            "leaf {} optimized in {} iteration(s): {:.4} -> {:.4}",
            self,
            result.iterations,
            baseline.cost(),
            result.cost()
        );
        self.optimized = Some(result);
        self.status = LeafStatus::Optimized;
    }

    /// Puts every continuous action back to its pre-perimeter set point when
    /// the active ones exceed the global, per-operator total or per-operator
    /// continuous limit given this leaf's discrete actions.
    fn release_continuous_over_limits(&mut self, ctx: &LeafContext<'_>) {
        let active = self.active_continuous_actions(ctx);
        if active.is_empty() {
            return;
        }
        let limits = &ctx.params.tree.usage_limits;
        let active_of = |op: &OperatorId| {
            active
                .iter()
                .filter(|a| a.operator.as_ref() == Some(op))
                .count()
        };
        let exceeded = limits
            .max_ra
            .is_some_and(|max| self.actions.len() + active.len() > max)
            || limits
                .max_ra_per_operator
                .iter()
                .any(|(op, max)| self.applied_count(op) + active_of(op) > *max)
            || limits
                .max_continuous_per_operator
                .iter()
                .any(|(op, max)| active_of(op) > *max);
        if !exceeded {
            return;
        }
        debug!(
            "leaf {} releases {} active continuous action(s) to respect the usage limits",
            self,
            active.len()
        );
        for action in &ctx.perimeter.continuous_actions {
            if let Some(initial) = ctx.initial_set_points.get(&action.id) {
                action.apply(&mut self.network, *initial);
            }
        }
    }

    /// Continuous actions the LP may move, with their admissible range.
    ///
    /// Drops actions whose current value lies outside their own range, then
    /// the least sensitive ones of each operator above its quota, then the
    /// least sensitive ones above the global limit. Active actions are
    /// dropped last, and active actions left out of the LP still count
    /// against the limits.
    fn optimizable_actions(
        &self,
        ctx: &LeafContext<'_>,
        baseline: &LinearOptimizationResult,
    ) -> Vec<(ContinuousAction, (f64, f64))> {
        let active: HashSet<ActionId> = self
            .active_continuous_actions(ctx)
            .into_iter()
            .map(|a| a.id.clone())
            .collect();
        let mut pinned: Vec<&ContinuousAction> = Vec::new();
        let mut actions: Vec<(ContinuousAction, (f64, f64))> = Vec::new();
        for action in &ctx.perimeter.continuous_actions {
            let current = action.current_value(&baseline.network);
            let pre_perimeter = ctx
                .initial_set_points
                .get(&action.id)
                .copied()
                .unwrap_or(current);
            let initial = ctx
                .perimeter
                .initial_network_set_points
                .get(&action.id)
                .copied()
                .unwrap_or(pre_perimeter);
            let previous = ctx
                .perimeter
                .previous_instant_set_points
                .get(&action.id)
                .copied()
                .unwrap_or(pre_perimeter);
            let (min, max) = action.admissible_range(initial, previous);
            if current < min - ACTIVATION_TOLERANCE || current > max + ACTIVATION_TOLERANCE {
                warn!(
                    "continuous action '{}' has set point {} outside its range [{}, {}], it is not optimized",
                    action.id, current, min, max
                );
                if active.contains(&action.id) {
                    pinned.push(action);
                }
                continue;
            }
            actions.push((action.clone(), (min, max)));
        }

        let most_limiting = baseline.objective.limiting_elements.first().map(|(id, _)| id);
        let sensitivity_of = |action: &ContinuousAction| {
            most_limiting.map_or(0.0, |c| baseline.sensitivity.sensitivity(c, &action.id).abs())
        };

        for (operator, limit) in self.max_continuous_per_operator(ctx) {
            let pinned_count = pinned
                .iter()
                .filter(|a| a.operator.as_ref() == Some(&operator))
                .count();
            let limit = limit.saturating_sub(pinned_count);
            let mut owned: Vec<(ActionId, bool, f64)> = actions
                .iter()
                .filter(|(a, _)| a.operator.as_ref() == Some(&operator))
                .map(|(a, _)| (a.id.clone(), active.contains(&a.id), sensitivity_of(a)))
                .collect();
            if owned.len() <= limit {
                continue;
            }
            let excess = owned.len() - limit;
            owned.sort_by(|a, b| {
                a.1.cmp(&b.1)
                    .then_with(|| a.2.total_cmp(&b.2))
                    .then_with(|| a.0.cmp(&b.0))
            });
            let removed: HashSet<ActionId> =
                owned.into_iter().take(excess).map(|(id, _, _)| id).collect();
            debug!(
                "operator {} limited to {} continuous action(s), dropping {:?}",
                operator, limit, removed
            );
            actions.retain(|(a, _)| !removed.contains(&a.id));
        }

        if let Some(max_ra) = ctx.params.tree.usage_limits.max_ra {
            let allowed = max_ra.saturating_sub(self.actions.len() + pinned.len());
            if actions.len() > allowed {
                actions.sort_by(|a, b| {
                    active
                        .contains(&b.0.id)
                        .cmp(&active.contains(&a.0.id))
                        .then_with(|| sensitivity_of(&b.0).total_cmp(&sensitivity_of(&a.0)))
                        .then_with(|| a.0.id.cmp(&b.0.id))
                });
                actions.truncate(allowed);
                actions.sort_by(|a, b| a.0.id.cmp(&b.0.id));
                debug!("global limit keeps {} continuous action(s)", allowed);
            }
        }
        actions
    }

    /// Candidate discrete actions for the children of this leaf.
    ///
    /// Only applied discrete actions count against the global limit here: a
    /// child whose discrete actions leave no room for the inherited
    /// continuous ones releases them when evaluated.
    pub fn bloom(&self, ctx: &LeafContext<'_>) -> Vec<DiscreteAction> {
        if self.status != LeafStatus::Optimized {
            warn!("cannot bloom leaf {} with status {:?}", self, self.status);
            return Vec::new();
        }
        let limits = &ctx.params.tree.usage_limits;
        if limits.max_ra.is_some_and(|max| self.actions.len() >= max) {
            debug!("leaf {} reached the maximum number of actions", self);
            return Vec::new();
        }

        let applied: HashSet<&ActionId> = self.actions.iter().map(|a| &a.id).collect();
        let mut candidates: Vec<&DiscreteAction> = ctx
            .perimeter
            .discrete_actions
            .iter()
            .filter(|a| !applied.contains(&a.id))
            .collect();

        if ctx.params.tree.skip_actions_far_from_most_limiting_element {
            let max_boundaries = ctx.params.tree.max_number_of_boundaries_for_skipping_actions;
            let locations = self
                .most_limiting_elements(1)
                .first()
                .and_then(|(id, _)| ctx.perimeter.constraint(id))
                .map(|c| &c.locations);
            if let Some(locations) = locations.filter(|l| !l.is_empty()) {
                candidates.retain(|action| {
                    action.locations.is_empty()
                        || action.locations.iter().any(|region| {
                            locations
                                .iter()
                                .any(|l| ctx.region_graph.are_neighbors(region, l, max_boundaries))
                        })
                });
            }
        }

        let max_discrete = self.max_discrete_per_operator(ctx);
        candidates.retain(|action| match &action.operator {
            Some(op) => max_discrete
                .get(op)
                .map_or(true, |limit| self.applied_count(op) < *limit),
            None => true,
        });

        candidates.into_iter().cloned().collect()
    }
}

/// Fillers for one leaf's linear problem, in build order.
fn problem_builder(
    ctx: &LeafContext<'_>,
    actions: &[(ContinuousAction, (f64, f64))],
) -> LinearProblemBuilder {
    let params = ctx.params;
    let perimeter = ctx.perimeter;
    let core_actions: Vec<CoreAction> = actions
        .iter()
        .map(|(action, (min, max))| CoreAction {
            action: action.clone(),
            min: *min,
            max: *max,
            initial: ctx.initial_set_points.get(&action.id).copied().unwrap_or(0.0),
        })
        .collect();
    let penalties: Vec<(ActionId, f64)> = actions
        .iter()
        .map(|(a, _)| (a.id.clone(), params.range_actions.penalty_cost(a.kind)))
        .collect();

    let mut builder = LinearProblemBuilder::new().with_filler(Box::new(CoreFiller::new(
        core_actions,
        perimeter.constraints.clone(),
        params.range_actions.sensitivity_threshold,
    )));

    let unoptimized = &perimeter.unoptimized_operators;
    let is_unoptimized = |c: &rao_core::MonitoredConstraint| {
        c.operator.as_ref().is_some_and(|op| unoptimized.contains(op))
    };
    let optimized: Vec<_> = perimeter
        .optimized_constraints()
        .into_iter()
        .filter(|c| !is_unoptimized(c))
        .collect();
    builder = match params.objective {
        ObjectiveFunctionKind::MaxMinMargin => {
            builder.with_filler(Box::new(MaxMinMarginFiller::new(optimized, penalties)))
        }
        ObjectiveFunctionKind::MaxMinRelativeMargin => {
            let weighted = optimized
                .into_iter()
                .map(|c| {
                    let coefficient = ctx
                        .objective
                        .functional()
                        .relative_coefficient(&c.id)
                        .unwrap_or(1.0);
                    (c, coefficient)
                })
                .collect();
            builder.with_filler(Box::new(MaxMinRelativeMarginFiller::new(weighted, penalties)))
        }
    };

    if let Some(mnec) = &params.mnec {
        let monitored: Vec<_> = perimeter
            .monitored_constraints()
            .into_iter()
            .filter_map(|c| ctx.initial.flow(&c.id).map(|flow| (c, flow)))
            .collect();
        if !monitored.is_empty() {
            builder = builder.with_filler(Box::new(MnecFiller::new(
                monitored,
                mnec.acceptable_margin_decrease,
                mnec.violation_cost,
                mnec.constraint_adjustment_coefficient,
            )));
        }
    }

    if let Some(loop_flow) = &params.loop_flow {
        let constrained: Vec<_> = perimeter
            .loop_flow_constraints()
            .into_iter()
            .filter_map(|c| {
                let limit = c.loop_flow_limit?;
                let initial = ctx.initial.loop_flow(&c.id).unwrap_or(0.0);
                let threshold = limit.max(initial.abs() + loop_flow.acceptable_increase);
                let commercial = ctx.initial.commercial_flow(&c.id).unwrap_or(0.0);
                Some((c.id, threshold, commercial))
            })
            .collect();
        if !constrained.is_empty() {
            builder = builder.with_filler(Box::new(MaxLoopFlowFiller::new(
                constrained,
                loop_flow.violation_cost,
                loop_flow.constraint_adjustment_coefficient,
            )));
        }
    }

    if !unoptimized.is_empty() {
        let tracked: Vec<_> = perimeter
            .optimized_constraints()
            .into_iter()
            .filter(|c| is_unoptimized(c))
            .filter_map(|c| ctx.initial.margin(&c).map(|m| (c, m)))
            .collect();
        if !tracked.is_empty() {
            builder = builder.with_filler(Box::new(UnoptimizedConstraintFiller::new(tracked)));
        }
    }
    builder
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("root")?;
        } else {
            let ids: Vec<&str> = self.actions.iter().map(|a| a.id.as_str()).collect();
            write!(f, "[{}]", ids.join(", "))?;
        }
        if let Some(result) = self.result() {
            write!(
                f,
                " (cost {:.2}, functional {:.2}, virtual {:.2})",
                result.cost(),
                result.objective.functional_cost,
                result.objective.virtual_cost()
            )?;
        }
        Ok(())
    }
}
