//! Sensitivity collaborator interface.
//!
//! The optimizer never computes physics itself. A [`SensitivityProvider`]
//! turns a network state into reference flows and linear sensitivities of
//! each constraint flow to each continuous action set point. The provider is
//! shared read-only across worker threads.

mod linear;

pub use linear::LinearFlowModel;

use rao_core::{ActionId, ConstraintId, ContinuousAction, MonitoredConstraint, NetworkState};
use rao_core::RaoError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Failure of the sensitivity engine for one network state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensitivityError {
    #[error("load flow did not converge: {0}")]
    Divergence(String),
    #[error("missing data: {0}")]
    MissingData(String),
}

impl From<SensitivityError> for RaoError {
    fn from(err: SensitivityError) -> Self {
        RaoError::Sensitivity(err.to_string())
    }
}

/// How the computation went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    #[default]
    Default,
    /// Converged with fallback settings.
    Fallback,
    /// Partial failure; flows may be unreliable.
    Failure,
}

/// Flows and sensitivities around one operating point. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityResult {
    pub status: ComputationStatus,
    flows: HashMap<ConstraintId, f64>,
    sensitivities: HashMap<ConstraintId, HashMap<ActionId, f64>>,
    ptdf_zonal_sums: HashMap<ConstraintId, f64>,
    commercial_flows: HashMap<ConstraintId, f64>,
}

impl SensitivityResult {
    pub fn new(status: ComputationStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, constraint: impl Into<ConstraintId>, flow: f64) -> Self {
        self.flows.insert(constraint.into(), flow);
        self
    }

    pub fn with_sensitivity(
        mut self,
        constraint: impl Into<ConstraintId>,
        action: impl Into<ActionId>,
        value: f64,
    ) -> Self {
        self.sensitivities
            .entry(constraint.into())
            .or_default()
            .insert(action.into(), value);
        self
    }

    pub fn set_flow(&mut self, constraint: ConstraintId, flow: f64) {
        self.flows.insert(constraint, flow);
    }

    pub fn set_sensitivity(&mut self, constraint: ConstraintId, action: ActionId, value: f64) {
        self.sensitivities
            .entry(constraint)
            .or_default()
            .insert(action, value);
    }

    pub fn set_ptdf_zonal_sum(&mut self, constraint: ConstraintId, value: f64) {
        self.ptdf_zonal_sums.insert(constraint, value);
    }

    pub fn set_commercial_flow(&mut self, constraint: ConstraintId, value: f64) {
        self.commercial_flows.insert(constraint, value);
    }

    pub fn flow(&self, constraint: &ConstraintId) -> Option<f64> {
        self.flows.get(constraint).copied()
    }

    /// Missing sensitivities read as zero.
    pub fn sensitivity(&self, constraint: &ConstraintId, action: &ActionId) -> f64 {
        self.sensitivities
            .get(constraint)
            .and_then(|by_action| by_action.get(action))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn ptdf_zonal_sum(&self, constraint: &ConstraintId) -> Option<f64> {
        self.ptdf_zonal_sums.get(constraint).copied()
    }

    pub fn commercial_flow(&self, constraint: &ConstraintId) -> Option<f64> {
        self.commercial_flows.get(constraint).copied()
    }

    /// Flow minus its commercial part; `None` without a commercial flow.
    pub fn loop_flow(&self, constraint: &ConstraintId) -> Option<f64> {
        Some(self.flow(constraint)? - self.commercial_flow(constraint)?)
    }

    pub fn margin(&self, constraint: &MonitoredConstraint) -> Option<f64> {
        self.flow(&constraint.id).map(|flow| constraint.margin(flow))
    }
}

/// Computes flows and sensitivities for a network state.
pub trait SensitivityProvider: Send + Sync {
    fn compute(
        &self,
        network: &NetworkState,
        actions: &[ContinuousAction],
        constraints: &[MonitoredConstraint],
    ) -> Result<SensitivityResult, SensitivityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::StateId;

    #[test]
    fn test_missing_sensitivity_is_zero() {
        let result = SensitivityResult::new(ComputationStatus::Default)
            .with_flow("c", 10.0)
            .with_sensitivity("c", "pst", 2.0);
        assert_eq!(result.sensitivity(&"c".into(), &"pst".into()), 2.0);
        assert_eq!(result.sensitivity(&"c".into(), &"hvdc".into()), 0.0);
        assert_eq!(result.flow(&"d".into()), None);
    }

    #[test]
    fn test_loop_flow_needs_commercial_flow() {
        let mut result = SensitivityResult::new(ComputationStatus::Default).with_flow("c", 10.0);
        assert_eq!(result.loop_flow(&"c".into()), None);
        result.set_commercial_flow("c".into(), 4.0);
        assert_eq!(result.loop_flow(&"c".into()), Some(6.0));
    }

    #[test]
    fn test_margin_from_flow() {
        let constraint =
            MonitoredConstraint::new("c", "line", StateId::preventive()).with_limit(100.0);
        let result = SensitivityResult::new(ComputationStatus::Default).with_flow("c", 103.0);
        assert_eq!(result.margin(&constraint), Some(-3.0));
    }
}
