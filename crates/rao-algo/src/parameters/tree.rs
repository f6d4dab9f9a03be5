use super::{CurativeStopCriterion, PreventiveStopCriterion, RaUsageLimits, RaoParameters};
use rao_core::{RaoError, RaoResult};

/// When the search may stop before exhausting its depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCriterion {
    /// Never stop early; explore until depth or candidates run out.
    MinObjective,
    /// Stop as soon as the best cost is at or below the target.
    AtTargetObjectiveValue(f64),
}

/// Immutable search configuration for one perimeter.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParameters {
    pub stop_criterion: StopCriterion,
    pub maximum_search_depth: usize,
    pub leaves_in_parallel: usize,
    pub absolute_min_impact: f64,
    pub relative_min_impact: f64,
    pub skip_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_actions: usize,
    pub usage_limits: RaUsageLimits,
}

impl TreeParameters {
    pub fn for_preventive_perimeter(params: &RaoParameters) -> Self {
        let stop_criterion = match params.objective_function.preventive_stop_criterion {
            PreventiveStopCriterion::MinObjective => StopCriterion::MinObjective,
            PreventiveStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
        };
        let search = &params.topological_search;
        Self {
            stop_criterion,
            maximum_search_depth: search.max_preventive_search_depth,
            leaves_in_parallel: params.multithreading.preventive_leaves_in_parallel,
            absolute_min_impact: search.absolute_min_impact_threshold,
            relative_min_impact: search.relative_min_impact_threshold,
            skip_actions_far_from_most_limiting_element: search
                .skip_actions_far_from_most_limiting_element,
            max_number_of_boundaries_for_skipping_actions: search
                .max_number_of_boundaries_for_skipping_actions,
            usage_limits: params.ra_usage_limits.preventive.clone(),
        }
    }

    /// Curative targets are expressed relative to the preventive result.
    pub fn for_curative_perimeter(params: &RaoParameters, preventive_cost: f64) -> Self {
        let improvement = params.objective_function.curative_min_obj_improvement;
        let stop_criterion = match params.objective_function.curative_stop_criterion {
            CurativeStopCriterion::MinObjective => StopCriterion::MinObjective,
            CurativeStopCriterion::Secure => StopCriterion::AtTargetObjectiveValue(0.0),
            CurativeStopCriterion::PreventiveObjective => {
                StopCriterion::AtTargetObjectiveValue(preventive_cost - improvement)
            }
            CurativeStopCriterion::PreventiveObjectiveAndSecure => {
                StopCriterion::AtTargetObjectiveValue((preventive_cost - improvement).min(0.0))
            }
        };
        let search = &params.topological_search;
        Self {
            stop_criterion,
            maximum_search_depth: search.max_curative_search_depth,
            leaves_in_parallel: params.multithreading.curative_leaves_in_parallel,
            absolute_min_impact: search.absolute_min_impact_threshold,
            relative_min_impact: search.relative_min_impact_threshold,
            skip_actions_far_from_most_limiting_element: search
                .skip_actions_far_from_most_limiting_element,
            max_number_of_boundaries_for_skipping_actions: search
                .max_number_of_boundaries_for_skipping_actions,
            usage_limits: params.ra_usage_limits.curative.clone(),
        }
    }

    pub fn validate(&self) -> RaoResult<()> {
        if self.leaves_in_parallel == 0 {
            return Err(RaoError::Config("leaves_in_parallel must be at least 1".into()));
        }
        if let StopCriterion::AtTargetObjectiveValue(target) = self.stop_criterion {
            if !target.is_finite() {
                return Err(RaoError::Config(format!(
                    "target objective value must be finite, got {}",
                    target
                )));
            }
        }
        if self.absolute_min_impact < 0.0 || !(0.0..1.0).contains(&self.relative_min_impact) {
            return Err(RaoError::Config("minimum impact thresholds out of range".into()));
        }
        Ok(())
    }

    /// Whether `cost` lets the search stop now.
    pub fn is_reached(&self, cost: f64) -> bool {
        match self.stop_criterion {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue(target) => cost <= target,
        }
    }
}
