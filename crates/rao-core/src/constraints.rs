use crate::{ConstraintId, OperatorId, RegionId, StateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Flow constraint on one network element in one state (a CNEC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredConstraint {
    pub id: ConstraintId,
    #[serde(default)]
    pub name: String,
    /// Network element whose flow is constrained.
    pub element: String,
    pub state: StateId,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    /// Counts toward the functional cost.
    #[serde(default = "default_true")]
    pub optimized: bool,
    /// Penalized when degraded beyond the acceptable margin decrease.
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub operator: Option<OperatorId>,
    #[serde(default)]
    pub locations: BTreeSet<RegionId>,
    /// Loop-flow threshold, when the constraint is subject to loop-flow limits.
    #[serde(default)]
    pub loop_flow_limit: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl MonitoredConstraint {
    pub fn new(id: impl Into<ConstraintId>, element: impl Into<String>, state: StateId) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            element: element.into(),
            state,
            lower: None,
            upper: None,
            optimized: true,
            monitored: false,
            operator: None,
            locations: BTreeSet::new(),
            loop_flow_limit: None,
        }
    }

    pub fn with_bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Symmetric thermal limit `[-limit, limit]`.
    pub fn with_limit(self, limit: f64) -> Self {
        self.with_bounds(Some(-limit), Some(limit))
    }

    pub fn with_operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_location(mut self, region: impl Into<RegionId>) -> Self {
        self.locations.insert(region.into());
        self
    }

    /// Monitored only (MNEC): tracked but not part of the min-margin objective.
    pub fn monitored_only(mut self) -> Self {
        self.optimized = false;
        self.monitored = true;
        self
    }

    pub fn with_loop_flow_limit(mut self, limit: f64) -> Self {
        self.loop_flow_limit = Some(limit);
        self
    }

    /// Distance to the closest bound; negative when violated.
    pub fn margin(&self, flow: f64) -> f64 {
        let upper = self.upper.map_or(f64::INFINITY, |u| u - flow);
        let lower = self.lower.map_or(f64::INFINITY, |l| flow - l);
        upper.min(lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_uses_closest_bound() {
        let c = MonitoredConstraint::new("c", "line", StateId::preventive()).with_limit(100.0);
        assert_eq!(c.margin(95.0), 5.0);
        assert_eq!(c.margin(-103.0), -3.0);
    }

    #[test]
    fn test_unbounded_margin_is_infinite() {
        let c = MonitoredConstraint::new("c", "line", StateId::preventive());
        assert!(c.margin(1e6).is_infinite());
    }
}
