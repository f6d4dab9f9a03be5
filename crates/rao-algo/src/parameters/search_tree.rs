use super::{
    LoopFlowParameters, MnecParameters, ObjectiveFunctionKind, RangeActionsParameters,
    RaoParameters, RelativeMarginParameters, TreeParameters,
};
use rao_core::RaoResult;

/// Everything one search-tree run needs besides its perimeter.
#[derive(Debug, Clone)]
pub struct SearchTreeParameters {
    pub tree: TreeParameters,
    pub objective: ObjectiveFunctionKind,
    pub range_actions: RangeActionsParameters,
    pub relative_margin: RelativeMarginParameters,
    pub mnec: Option<MnecParameters>,
    pub loop_flow: Option<LoopFlowParameters>,
    pub sensitivity_failure_overcost: f64,
}

impl SearchTreeParameters {
    pub fn preventive(params: &RaoParameters) -> Self {
        Self::with_tree(params, TreeParameters::for_preventive_perimeter(params))
    }

    pub fn curative(params: &RaoParameters, preventive_cost: f64) -> Self {
        Self::with_tree(
            params,
            TreeParameters::for_curative_perimeter(params, preventive_cost),
        )
    }

    pub fn with_tree(params: &RaoParameters, tree: TreeParameters) -> Self {
        Self {
            tree,
            objective: params.objective_function.kind,
            range_actions: params.range_actions.clone(),
            relative_margin: params.relative_margin.clone(),
            mnec: params.mnec.clone(),
            loop_flow: params.loop_flow.clone(),
            sensitivity_failure_overcost: params.sensitivity.failure_overcost,
        }
    }

    pub fn validate(&self) -> RaoResult<()> {
        self.tree.validate()
    }
}
