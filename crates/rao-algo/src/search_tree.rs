//! Branch-and-bound driver for one perimeter.
//!
//! ```text
//! root: evaluate ─▶ stop? ─▶ optimize ─▶ stop?
//!   └─ depth loop: bloom ─▶ evaluate/optimize children (pool) ─▶ select best ─▶ stop?
//! ```
//!
//! Children of one depth are explored on a rayon pool of
//! `leaves_in_parallel` threads. Each child owns its own network copy, so the
//! only shared state is the index of the earliest child known to satisfy the
//! stop criterion: children after it skip their optimization. Selection
//! happens after the barrier, in candidate order, which keeps the
//! "first found wins" rule deterministic. Children after that index are left
//! out of the selection even when they finished with a lower cost, as
//! whether they finished depends on thread scheduling.

use crate::leaf::{Leaf, LeafContext, LeafStatus};
use crate::linear_problem::LinearSolver;
use crate::objective::{ObjectiveFunction, ObjectiveFunctionResult};
use crate::parameters::SearchTreeParameters;
use crate::perimeter::Perimeter;
use crate::sensitivity::{ComputationStatus, SensitivityProvider};
use rao_core::{DiscreteAction, NetworkState, RaoError, RaoResult, RegionGraph};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};
use web_time::Instant;

/// Virtual costs below this count as zero for purely virtual perimeters.
const VIRTUAL_COST_EPSILON: f64 = 1e-6;

const LIMITING_ELEMENTS_DURING_TREE: usize = 2;
const LIMITING_ELEMENTS_AT_END: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerimeterStatus {
    Default,
    /// The best leaf relies on a fallback sensitivity computation.
    Fallback,
    Failure,
}

impl From<ComputationStatus> for PerimeterStatus {
    fn from(status: ComputationStatus) -> Self {
        match status {
            ComputationStatus::Default => PerimeterStatus::Default,
            ComputationStatus::Fallback => PerimeterStatus::Fallback,
            ComputationStatus::Failure => PerimeterStatus::Failure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchTreeResult {
    pub perimeter_id: String,
    pub status: PerimeterStatus,
    /// `None` only when the root itself could not be evaluated.
    pub best: Option<Leaf>,
    pub initial_objective: Option<ObjectiveFunctionResult>,
    /// Depth of the deepest explored level.
    pub depth: usize,
    /// Leaves evaluated, root included.
    pub leaves_evaluated: usize,
    pub elapsed_ms: u128,
}

impl SearchTreeResult {
    fn failed(perimeter_id: String, elapsed_ms: u128) -> Self {
        Self {
            perimeter_id,
            status: PerimeterStatus::Failure,
            best: None,
            initial_objective: None,
            depth: 0,
            leaves_evaluated: 0,
            elapsed_ms,
        }
    }

    pub fn cost(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, Leaf::cost)
    }

    /// True only for a successful run whose best leaf has no violated
    /// constraint and no penalty.
    pub fn is_secure(&self) -> bool {
        self.status != PerimeterStatus::Failure
            && self.best.as_ref().is_some_and(|leaf| {
                leaf.functional_cost() <= 0.0 && leaf.virtual_cost() < VIRTUAL_COST_EPSILON
            })
    }
}

pub struct SearchTree<'a> {
    perimeter: &'a Perimeter,
    params: &'a SearchTreeParameters,
    sensitivity: &'a dyn SensitivityProvider,
    solver: &'a dyn LinearSolver,
    region_graph: &'a RegionGraph,
}

impl<'a> SearchTree<'a> {
    pub fn new(
        perimeter: &'a Perimeter,
        params: &'a SearchTreeParameters,
        sensitivity: &'a dyn SensitivityProvider,
        solver: &'a dyn LinearSolver,
        region_graph: &'a RegionGraph,
    ) -> Self {
        Self {
            perimeter,
            params,
            sensitivity,
            solver,
            region_graph,
        }
    }

    /// Searches the best combination of actions starting from `network`.
    ///
    /// Returns `Err` only for configuration errors, raised before any search
    /// work. A root that cannot be evaluated yields a `Failure` result with
    /// no best leaf.
    pub fn run(&self, network: NetworkState) -> RaoResult<SearchTreeResult> {
        let start = Instant::now();
        self.params.validate()?;
        self.perimeter.validate()?;
        let perimeter_id = self.perimeter.id();
        info!(
            "optimizing perimeter {} ({} state(s), {} discrete and {} continuous action(s))",
            perimeter_id,
            self.perimeter.states.len(),
            self.perimeter.discrete_actions.len(),
            self.perimeter.continuous_actions.len()
        );

        let initial = match self.sensitivity.compute(
            &network,
            &self.perimeter.continuous_actions,
            &self.perimeter.constraints,
        ) {
            Ok(result) => result,
            Err(e) => {
                error!("initial sensitivity failed on perimeter {}: {}", perimeter_id, e);
                return Ok(SearchTreeResult::failed(
                    perimeter_id,
                    start.elapsed().as_millis(),
                ));
            }
        };
        let initial_set_points = self.perimeter.set_points(&network);
        let objective = ObjectiveFunction::for_perimeter(self.perimeter, self.params, &initial);
        let ctx = LeafContext {
            perimeter: self.perimeter,
            params: self.params,
            sensitivity: self.sensitivity,
            solver: self.solver,
            objective: &objective,
            region_graph: self.region_graph,
            initial: &initial,
            initial_set_points: &initial_set_points,
        };

        let mut root = Leaf::root_with_sensitivity(network, initial.clone());
        root.evaluate(&ctx);
        if root.status() == LeafStatus::Error {
            error!("root leaf of perimeter {} could not be evaluated", perimeter_id);
            return Ok(SearchTreeResult::failed(
                perimeter_id,
                start.elapsed().as_millis(),
            ));
        }
        let initial_objective = root.result().map(|r| r.objective.clone());
        info!("root leaf: {}", root);
        log_most_limiting_elements(&root, LIMITING_ELEMENTS_DURING_TREE);

        let mut optimal = root;
        let mut depth = 0;
        let mut leaves_evaluated = 1;
        if self.stop_criterion_reached(&objective, &optimal) {
            info!("stop criterion reached on root leaf");
        } else {
            optimal.optimize(&ctx);
            info!("optimized root leaf: {}", optimal);
            log_most_limiting_elements(&optimal, LIMITING_ELEMENTS_DURING_TREE);
            if self.stop_criterion_reached(&objective, &optimal) {
                info!("stop criterion reached on optimized root leaf");
            } else {
                let (explored_depth, explored) = self.iterate(&ctx, &objective, &mut optimal)?;
                depth = explored_depth;
                leaves_evaluated += explored;
            }
        }

        let status = optimal
            .sensitivity_status()
            .map_or(PerimeterStatus::Failure, PerimeterStatus::from);
        let elapsed_ms = start.elapsed().as_millis();
        info!(
            "perimeter {} done in {} ms: {} leaves evaluated, depth {}, best {}",
            perimeter_id, elapsed_ms, leaves_evaluated, depth, optimal
        );
        log_most_limiting_elements(&optimal, LIMITING_ELEMENTS_AT_END);
        if let Some(initial) = &initial_objective {
            info!(
                "cost before optimization {:.2} (functional {:.2}, virtual {:.2}), after {:.2} (functional {:.2}, virtual {:.2})",
                initial.cost(),
                initial.functional_cost,
                initial.virtual_cost(),
                optimal.cost(),
                optimal.functional_cost(),
                optimal.virtual_cost()
            );
        }

        Ok(SearchTreeResult {
            perimeter_id,
            status,
            best: Some(optimal),
            initial_objective,
            depth,
            leaves_evaluated,
            elapsed_ms,
        })
    }

    /// Depth loop. Returns the last explored depth and the number of leaves
    /// evaluated.
    fn iterate(
        &self,
        ctx: &LeafContext<'_>,
        objective: &ObjectiveFunction,
        optimal: &mut Leaf,
    ) -> RaoResult<(usize, usize)> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.params.tree.leaves_in_parallel)
            .build()
            .map_err(|e| RaoError::Other(format!("building leaf thread pool: {}", e)))?;

        let mut depth = 0;
        let mut evaluated = 0;
        while depth < self.params.tree.maximum_search_depth {
            let candidates = optimal.bloom(ctx);
            if candidates.is_empty() {
                info!("no more candidate action after depth {}", depth);
                break;
            }
            depth += 1;
            info!("depth {}: exploring {} leaves", depth, candidates.len());

            let stop_index = AtomicUsize::new(usize::MAX);
            let parent: &Leaf = optimal;
            let children: Vec<Option<Leaf>> = pool.install(|| {
                candidates
                    .into_par_iter()
                    .enumerate()
                    .map(|(index, action)| {
                        self.explore(ctx, objective, parent, action, index, &stop_index)
                    })
                    .collect()
            });
            let last_considered = stop_index.into_inner();
            evaluated += children.iter().flatten().count();

            let previous_depth_cost = optimal.cost();
            let mut best: Option<Leaf> = None;
            for (index, child) in children.into_iter().enumerate() {
                if index > last_considered {
                    break;
                }
                let Some(child) = child else { continue };
                if child.status() == LeafStatus::Error {
                    continue;
                }
                let best_cost = best.as_ref().map_or(previous_depth_cost, Leaf::cost);
                if self.improved_enough(previous_depth_cost, child.cost()) && child.cost() < best_cost {
                    debug!("new best leaf at depth {}: {}", depth, child);
                    best = Some(child);
                }
            }

            let Some(best) = best else {
                info!("no leaf improves enough on the previous depth, stopping");
                break;
            };
            *optimal = best;
            info!("optimal leaf after depth {}: {}", depth, optimal);
            log_most_limiting_elements(optimal, LIMITING_ELEMENTS_DURING_TREE);
            if self.stop_criterion_reached(objective, optimal) {
                info!("stop criterion reached at depth {}", depth);
                break;
            }
        }
        Ok((depth, evaluated))
    }

    /// Evaluates and optimizes one child. `None` when skipped because an
    /// earlier sibling already satisfies the stop criterion.
    fn explore(
        &self,
        ctx: &LeafContext<'_>,
        objective: &ObjectiveFunction,
        parent: &Leaf,
        action: DiscreteAction,
        index: usize,
        stop_index: &AtomicUsize,
    ) -> Option<Leaf> {
        if index > stop_index.load(Ordering::SeqCst) {
            debug!("skipping '{}', an earlier leaf fulfills the stop criterion", action.id);
            return None;
        }
        let mut leaf = Leaf::child(parent, action);
        leaf.evaluate(ctx);
        match leaf.status() {
            LeafStatus::Error => return Some(leaf),
            _ if self.stop_criterion_reached(objective, &leaf) => {
                debug!("evaluated leaf {} fulfills the stop criterion", leaf);
                stop_index.fetch_min(index, Ordering::SeqCst);
                return Some(leaf);
            }
            _ => {}
        }
        if index > stop_index.load(Ordering::SeqCst) {
            debug!("skipping optimization of {}, an earlier leaf fulfills the stop criterion", leaf);
            return None;
        }
        leaf.optimize(ctx);
        debug!("optimized leaf {}", leaf);
        if self.stop_criterion_reached(objective, &leaf) {
            stop_index.fetch_min(index, Ordering::SeqCst);
        }
        Some(leaf)
    }

    fn stop_criterion_reached(&self, objective: &ObjectiveFunction, leaf: &Leaf) -> bool {
        if objective.is_purely_virtual() && leaf.virtual_cost() < VIRTUAL_COST_EPSILON {
            debug!("perimeter is purely virtual and virtual cost is zero");
            return true;
        }
        self.params.tree.is_reached(leaf.cost())
    }

    /// `new_cost` beats `previous_cost` by both minimum impact thresholds.
    fn improved_enough(&self, previous_cost: f64, new_cost: f64) -> bool {
        let absolute = self.params.tree.absolute_min_impact;
        let relative = self.params.tree.relative_min_impact;
        previous_cost - absolute > new_cost
            && (1.0 - previous_cost.signum() * relative) * previous_cost > new_cost
    }
}

fn log_most_limiting_elements(leaf: &Leaf, n: usize) {
    for (rank, (constraint, margin)) in leaf.most_limiting_elements(n).iter().enumerate() {
        info!("  limiting element #{}: {} (margin {:.2})", rank + 1, constraint, margin);
    }
}

#[cfg(all(test, feature = "solver-clarabel"))]
mod tests {
    use super::*;
    use crate::parameters::{RaoParameters, StopCriterion};
    use crate::linear_problem::ClarabelSolver;
    use crate::sensitivity::LinearFlowModel;
    use rao_core::{ElementaryAction, MonitoredConstraint, StateId};

    fn perimeter() -> Perimeter {
        Perimeter::new(StateId::preventive())
            .with_constraint(
                MonitoredConstraint::new("c", "line", StateId::preventive()).with_limit(100.0),
            )
            .with_discrete_action(DiscreteAction::new(
                "open-a",
                vec![ElementaryAction::Topology {
                    element: "a".into(),
                    closed: false,
                }],
            ))
    }

    #[test]
    fn test_improved_enough_thresholds() {
        let mut params = SearchTreeParameters::preventive(&RaoParameters::default());
        params.tree.absolute_min_impact = 1.0;
        params.tree.relative_min_impact = 0.1;
        let perimeter = perimeter();
        let model = LinearFlowModel::new();
        let graph = RegionGraph::new();
        let solver = ClarabelSolver::new();
        let tree = SearchTree::new(&perimeter, &params, &model, &solver, &graph);
        assert!(tree.improved_enough(10.0, 8.5));
        assert!(!tree.improved_enough(10.0, 9.5));
        // relative threshold applies on the magnitude of negative costs too
        assert!(tree.improved_enough(-10.0, -11.5));
        assert!(!tree.improved_enough(-10.0, -10.8));
    }

    #[test]
    fn test_root_failure_is_reported_without_best() {
        let params = SearchTreeParameters::preventive(&RaoParameters::default());
        let perimeter = perimeter();
        let model = LinearFlowModel::new();
        let graph = RegionGraph::new();
        let solver = ClarabelSolver::new();
        let tree = SearchTree::new(&perimeter, &params, &model, &solver, &graph);
        // no base flow for "c": the model cannot compute it
        let result = tree.run(NetworkState::new("n")).unwrap();
        assert_eq!(result.status, PerimeterStatus::Failure);
        assert!(result.best.is_none());
        assert!(!result.is_secure());
    }

    #[test]
    fn test_invalid_parameters_abort_before_search() {
        let mut params = SearchTreeParameters::preventive(&RaoParameters::default());
        params.tree.stop_criterion = StopCriterion::AtTargetObjectiveValue(f64::NAN);
        let perimeter = perimeter();
        let model = LinearFlowModel::new().with_base_flow("c", 50.0);
        let graph = RegionGraph::new();
        let solver = ClarabelSolver::new();
        let tree = SearchTree::new(&perimeter, &params, &model, &solver, &graph);
        assert!(matches!(
            tree.run(NetworkState::new("n")),
            Err(RaoError::Config(_))
        ));
    }
}
