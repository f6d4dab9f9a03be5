//! Optimizer configuration.
//!
//! [`RaoParameters`] is the user-facing document, loadable from TOML or JSON.
//! Every section carries `#[serde(default)]` so partial files are accepted.
//! The search tree never reads it directly: [`TreeParameters`] and
//! [`SearchTreeParameters`] are derived once per perimeter and passed down as
//! immutable values.

mod search_tree;
mod tree;

pub use search_tree::SearchTreeParameters;
pub use tree::{StopCriterion, TreeParameters};

use rao_core::{ContinuousKind, OperatorId, RaoError, RaoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Margin definition used by the functional cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveFunctionKind {
    #[default]
    MaxMinMargin,
    MaxMinRelativeMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreventiveStopCriterion {
    MinObjective,
    #[default]
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurativeStopCriterion {
    #[default]
    MinObjective,
    Secure,
    PreventiveObjective,
    PreventiveObjectiveAndSecure,
}

impl FromStr for PreventiveStopCriterion {
    type Err = RaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MIN_OBJECTIVE" => Ok(Self::MinObjective),
            "SECURE" => Ok(Self::Secure),
            other => Err(RaoError::Config(format!(
                "unknown preventive stop criterion '{}'",
                other
            ))),
        }
    }
}

impl FromStr for CurativeStopCriterion {
    type Err = RaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MIN_OBJECTIVE" => Ok(Self::MinObjective),
            "SECURE" => Ok(Self::Secure),
            "PREVENTIVE_OBJECTIVE" => Ok(Self::PreventiveObjective),
            "PREVENTIVE_OBJECTIVE_AND_SECURE" => Ok(Self::PreventiveObjectiveAndSecure),
            other => Err(RaoError::Config(format!(
                "unknown curative stop criterion '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveFunctionParameters {
    pub kind: ObjectiveFunctionKind,
    pub preventive_stop_criterion: PreventiveStopCriterion,
    pub curative_stop_criterion: CurativeStopCriterion,
    /// Improvement over the preventive cost required from curative perimeters.
    pub curative_min_obj_improvement: f64,
}

impl Default for ObjectiveFunctionParameters {
    fn default() -> Self {
        Self {
            kind: ObjectiveFunctionKind::MaxMinMargin,
            preventive_stop_criterion: PreventiveStopCriterion::Secure,
            curative_stop_criterion: CurativeStopCriterion::MinObjective,
            curative_min_obj_improvement: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologicalSearchParameters {
    pub max_preventive_search_depth: usize,
    pub max_curative_search_depth: usize,
    pub absolute_min_impact_threshold: f64,
    pub relative_min_impact_threshold: f64,
    pub skip_actions_far_from_most_limiting_element: bool,
    pub max_number_of_boundaries_for_skipping_actions: usize,
}

impl Default for TopologicalSearchParameters {
    fn default() -> Self {
        Self {
            max_preventive_search_depth: 2,
            max_curative_search_depth: 2,
            absolute_min_impact_threshold: 0.0,
            relative_min_impact_threshold: 0.0,
            skip_actions_far_from_most_limiting_element: false,
            max_number_of_boundaries_for_skipping_actions: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionsParameters {
    pub pst_penalty_cost: f64,
    pub hvdc_penalty_cost: f64,
    pub injection_penalty_cost: f64,
    /// Sensitivities below this absolute value are ignored in the LP.
    pub sensitivity_threshold: f64,
    pub max_iterations: usize,
    /// Minimum cost decrease between two LP iterations to keep iterating.
    pub convergence_threshold: f64,
}

impl Default for RangeActionsParameters {
    fn default() -> Self {
        Self {
            pst_penalty_cost: 0.01,
            hvdc_penalty_cost: 0.001,
            injection_penalty_cost: 0.001,
            sensitivity_threshold: 1e-6,
            max_iterations: 10,
            convergence_threshold: 0.0,
        }
    }
}

impl RangeActionsParameters {
    pub fn penalty_cost(&self, kind: ContinuousKind) -> f64 {
        match kind {
            ContinuousKind::Pst => self.pst_penalty_cost,
            ContinuousKind::Hvdc => self.hvdc_penalty_cost,
            ContinuousKind::Injection => self.injection_penalty_cost,
        }
    }
}

/// Remedial-action usage limits for one kind of perimeter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaUsageLimits {
    /// Maximum number of actions (discrete + active continuous) in a path.
    pub max_ra: Option<usize>,
    pub max_ra_per_operator: BTreeMap<OperatorId, usize>,
    pub max_discrete_per_operator: BTreeMap<OperatorId, usize>,
    pub max_continuous_per_operator: BTreeMap<OperatorId, usize>,
}

impl RaUsageLimits {
    pub fn is_unlimited(&self) -> bool {
        self.max_ra.is_none()
            && self.max_ra_per_operator.is_empty()
            && self.max_discrete_per_operator.is_empty()
            && self.max_continuous_per_operator.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaUsageLimitsParameters {
    pub preventive: RaUsageLimits,
    pub curative: RaUsageLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultithreadingParameters {
    pub preventive_leaves_in_parallel: usize,
    pub curative_leaves_in_parallel: usize,
}

impl Default for MultithreadingParameters {
    fn default() -> Self {
        Self {
            preventive_leaves_in_parallel: 1,
            curative_leaves_in_parallel: 1,
        }
    }
}

/// Monitored-only constraints (MNEC) handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    pub acceptable_margin_decrease: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    pub acceptable_increase: f64,
    pub violation_cost: f64,
    pub constraint_adjustment_coefficient: f64,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginParameters {
    pub ptdf_sum_lower_bound: f64,
}

impl Default for RelativeMarginParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnoptimizedConstraintsParameters {
    /// Constraints of operators without curative actions may not get worse
    /// but do not drive the curative objective.
    pub do_not_optimize_operators_without_curative_actions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityParameters {
    /// Virtual cost added when the sensitivity computation failed.
    pub failure_overcost: f64,
}

impl Default for SensitivityParameters {
    fn default() -> Self {
        Self {
            failure_overcost: 10000.0,
        }
    }
}

/// Complete optimizer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaoParameters {
    pub objective_function: ObjectiveFunctionParameters,
    pub topological_search: TopologicalSearchParameters,
    pub range_actions: RangeActionsParameters,
    pub ra_usage_limits: RaUsageLimitsParameters,
    pub multithreading: MultithreadingParameters,
    pub mnec: Option<MnecParameters>,
    pub loop_flow: Option<LoopFlowParameters>,
    pub relative_margin: RelativeMarginParameters,
    pub unoptimized_constraints: UnoptimizedConstraintsParameters,
    pub sensitivity: SensitivityParameters,
}

impl RaoParameters {
    pub fn from_toml_str(content: &str) -> RaoResult<Self> {
        let params: Self =
            toml::from_str(content).map_err(|e| RaoError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_str(content: &str) -> RaoResult<Self> {
        let params: Self =
            serde_json::from_str(content).map_err(|e| RaoError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Loads parameters from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> RaoResult<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(RaoError::Config(format!(
                "unsupported parameter file extension {:?}",
                other
            ))),
        }
    }

    pub fn validate(&self) -> RaoResult<()> {
        let non_negative = [
            (
                "objective_function.curative_min_obj_improvement",
                self.objective_function.curative_min_obj_improvement,
            ),
            (
                "topological_search.absolute_min_impact_threshold",
                self.topological_search.absolute_min_impact_threshold,
            ),
            (
                "topological_search.relative_min_impact_threshold",
                self.topological_search.relative_min_impact_threshold,
            ),
            ("range_actions.pst_penalty_cost", self.range_actions.pst_penalty_cost),
            ("range_actions.hvdc_penalty_cost", self.range_actions.hvdc_penalty_cost),
            (
                "range_actions.injection_penalty_cost",
                self.range_actions.injection_penalty_cost,
            ),
            (
                "range_actions.sensitivity_threshold",
                self.range_actions.sensitivity_threshold,
            ),
            (
                "range_actions.convergence_threshold",
                self.range_actions.convergence_threshold,
            ),
            ("sensitivity.failure_overcost", self.sensitivity.failure_overcost),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RaoError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.topological_search.relative_min_impact_threshold >= 1.0 {
            return Err(RaoError::Config(
                "topological_search.relative_min_impact_threshold must be below 1".into(),
            ));
        }
        if self.multithreading.preventive_leaves_in_parallel == 0
            || self.multithreading.curative_leaves_in_parallel == 0
        {
            return Err(RaoError::Config(
                "multithreading leaves in parallel must be at least 1".into(),
            ));
        }
        if self.range_actions.max_iterations == 0 {
            return Err(RaoError::Config(
                "range_actions.max_iterations must be at least 1".into(),
            ));
        }
        if self.relative_margin.ptdf_sum_lower_bound <= 0.0 {
            return Err(RaoError::Config(
                "relative_margin.ptdf_sum_lower_bound must be positive".into(),
            ));
        }
        if let Some(mnec) = &self.mnec {
            if mnec.violation_cost < 0.0 || mnec.acceptable_margin_decrease < 0.0 {
                return Err(RaoError::Config("mnec costs and thresholds must be non-negative".into()));
            }
        }
        if let Some(loop_flow) = &self.loop_flow {
            if loop_flow.violation_cost < 0.0 || loop_flow.acceptable_increase < 0.0 {
                return Err(RaoError::Config(
                    "loop_flow costs and thresholds must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}
