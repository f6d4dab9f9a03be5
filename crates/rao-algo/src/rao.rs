//! Whole optimization: preventive perimeter, then each curative perimeter.
//!
//! Curative perimeters start from the network chosen by the preventive
//! search. Their stop targets are derived from the preventive cost. Ranges
//! relative to the previous instant are anchored on the preventive set
//! points, ranges relative to the initial network on the network given to
//! [`Rao::run`].

use crate::linear_problem::LinearSolver;
use crate::parameters::{RaoParameters, SearchTreeParameters};
use crate::report::{PerimeterReport, ResultSink};
use crate::search_tree::{SearchTree, SearchTreeResult};
use crate::sensitivity::SensitivityProvider;
use crate::state_tree::StateTree;
use rao_core::{Catalog, NetworkState, OperatorId, RaoResult, StateId};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub preventive: SearchTreeResult,
    pub curative: Vec<SearchTreeResult>,
    pub operators_not_sharing_cras: BTreeSet<OperatorId>,
}

impl OptimizationOutcome {
    pub fn perimeters(&self) -> impl Iterator<Item = &SearchTreeResult> {
        std::iter::once(&self.preventive).chain(self.curative.iter())
    }

    pub fn is_secure(&self) -> bool {
        self.perimeters().all(SearchTreeResult::is_secure)
    }
}

pub struct Rao<'a> {
    catalog: &'a Catalog,
    params: &'a RaoParameters,
    sensitivity: &'a dyn SensitivityProvider,
    solver: &'a dyn LinearSolver,
}

impl<'a> Rao<'a> {
    pub fn new(
        catalog: &'a Catalog,
        params: &'a RaoParameters,
        sensitivity: &'a dyn SensitivityProvider,
        solver: &'a dyn LinearSolver,
    ) -> Self {
        Self {
            catalog,
            params,
            sensitivity,
            solver,
        }
    }

    pub fn run(
        &self,
        network: NetworkState,
        sink: &mut dyn ResultSink,
    ) -> RaoResult<OptimizationOutcome> {
        self.params.validate()?;
        self.catalog.validate()?;
        let state_tree = StateTree::new(self.catalog, &StateId::preventive())?;
        let region_graph = self.catalog.region_graph();

        info!("----- preventive perimeter -----");
        let initial_network = network.clone();
        let preventive_perimeter = state_tree
            .perimeter(self.catalog, state_tree.preventive_perimeter())
            .with_initial_network(&initial_network);
        let preventive_params = SearchTreeParameters::preventive(self.params);
        let preventive = SearchTree::new(
            &preventive_perimeter,
            &preventive_params,
            self.sensitivity,
            self.solver,
            &region_graph,
        )
        .run(network)?;
        sink.report(&PerimeterReport::from_result(&preventive))?;

        let Some(preventive_best) = preventive.best.as_ref() else {
            warn!("preventive optimization failed, curative perimeters are not optimized");
            return Ok(OptimizationOutcome {
                preventive,
                curative: Vec::new(),
                operators_not_sharing_cras: state_tree.operators_not_sharing_cras().clone(),
            });
        };
        let post_preventive = preventive_best.best_network().clone();
        let preventive_cost = preventive.cost();

        let unoptimized = if self
            .params
            .unoptimized_constraints
            .do_not_optimize_operators_without_curative_actions
        {
            state_tree.operators_not_sharing_cras().clone()
        } else {
            BTreeSet::new()
        };
        let curative_params = SearchTreeParameters::curative(self.params, preventive_cost);

        let mut curative = Vec::with_capacity(state_tree.curative_perimeters().len());
        for states in state_tree.curative_perimeters() {
            info!("----- curative perimeter {} -----", states.optimized_state);
            let perimeter = state_tree
                .perimeter(self.catalog, states)
                .with_unoptimized_operators(unoptimized.clone())
                .with_initial_network(&initial_network)
                .with_previous_instant(&post_preventive);
            let result = SearchTree::new(
                &perimeter,
                &curative_params,
                self.sensitivity,
                self.solver,
                &region_graph,
            )
            .run(post_preventive.clone())?;
            sink.report(&PerimeterReport::from_result(&result))?;
            curative.push(result);
        }

        Ok(OptimizationOutcome {
            preventive,
            curative,
            operators_not_sharing_cras: state_tree.operators_not_sharing_cras().clone(),
        })
    }
}
