use super::{ComputationStatus, SensitivityError, SensitivityProvider, SensitivityResult};
use rao_core::{ActionId, ConstraintId, ContinuousAction, MonitoredConstraint, NetworkState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Deterministic flow model, affine in set points.
///
/// `flow(c) = base(c) + Σ_e s(c, e)·(sp(e) − ref(e)) + Σ_{e open} Δ(e, c)`
///
/// Used by the CLI runner on case files and by tests. Scripted divergences
/// reproduce engine failures for chosen discrete actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearFlowModel {
    /// Flows with every element closed and set points at their reference.
    pub base_flows: HashMap<ConstraintId, f64>,
    /// Reference set point per element; absent means 0.
    pub reference_set_points: HashMap<String, f64>,
    /// Flow sensitivity per constraint to each element's set point.
    pub set_point_sensitivities: HashMap<ConstraintId, HashMap<String, f64>>,
    /// Flow change per constraint when an element is opened.
    pub opening_effects: HashMap<String, HashMap<ConstraintId, f64>>,
    pub ptdf_zonal_sums: HashMap<ConstraintId, f64>,
    pub commercial_flows: HashMap<ConstraintId, f64>,
    /// The computation diverges once any of these actions is applied.
    pub diverging_actions: BTreeSet<ActionId>,
    /// The computation only converges with fallback settings.
    pub fallback_actions: BTreeSet<ActionId>,
}

impl LinearFlowModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_flow(mut self, constraint: impl Into<ConstraintId>, flow: f64) -> Self {
        self.base_flows.insert(constraint.into(), flow);
        self
    }

    pub fn with_set_point_sensitivity(
        mut self,
        constraint: impl Into<ConstraintId>,
        element: impl Into<String>,
        value: f64,
    ) -> Self {
        self.set_point_sensitivities
            .entry(constraint.into())
            .or_default()
            .insert(element.into(), value);
        self
    }

    pub fn with_reference_set_point(mut self, element: impl Into<String>, value: f64) -> Self {
        self.reference_set_points.insert(element.into(), value);
        self
    }

    pub fn with_opening_effect(
        mut self,
        element: impl Into<String>,
        constraint: impl Into<ConstraintId>,
        delta: f64,
    ) -> Self {
        self.opening_effects
            .entry(element.into())
            .or_default()
            .insert(constraint.into(), delta);
        self
    }

    pub fn with_ptdf_zonal_sum(mut self, constraint: impl Into<ConstraintId>, value: f64) -> Self {
        self.ptdf_zonal_sums.insert(constraint.into(), value);
        self
    }

    pub fn with_commercial_flow(mut self, constraint: impl Into<ConstraintId>, value: f64) -> Self {
        self.commercial_flows.insert(constraint.into(), value);
        self
    }

    pub fn diverging_on(mut self, action: impl Into<ActionId>) -> Self {
        self.diverging_actions.insert(action.into());
        self
    }

    fn reference(&self, element: &str) -> f64 {
        self.reference_set_points.get(element).copied().unwrap_or(0.0)
    }

    fn flow(&self, network: &NetworkState, constraint: &ConstraintId) -> Result<f64, SensitivityError> {
        let mut flow = *self.base_flows.get(constraint).ok_or_else(|| {
            SensitivityError::MissingData(format!("no base flow for constraint '{}'", constraint))
        })?;
        if let Some(by_element) = self.set_point_sensitivities.get(constraint) {
            for (element, sensitivity) in by_element {
                let reference = self.reference(element);
                let set_point = network.set_point(element).unwrap_or(reference);
                flow += sensitivity * (set_point - reference);
            }
        }
        for element in network.open_elements() {
            if let Some(delta) = self
                .opening_effects
                .get(element)
                .and_then(|effects| effects.get(constraint))
            {
                flow += delta;
            }
        }
        Ok(flow)
    }
}

impl SensitivityProvider for LinearFlowModel {
    fn compute(
        &self,
        network: &NetworkState,
        actions: &[ContinuousAction],
        constraints: &[MonitoredConstraint],
    ) -> Result<SensitivityResult, SensitivityError> {
        if let Some(action) = network
            .applied_actions()
            .iter()
            .find(|a| self.diverging_actions.contains(*a))
        {
            return Err(SensitivityError::Divergence(format!(
                "'{}' with action '{}'",
                network.name, action
            )));
        }
        let status = if network
            .applied_actions()
            .iter()
            .any(|a| self.fallback_actions.contains(a))
        {
            ComputationStatus::Fallback
        } else {
            ComputationStatus::Default
        };

        let mut result = SensitivityResult::new(status);
        for constraint in constraints {
            let id = &constraint.id;
            result.set_flow(id.clone(), self.flow(network, id)?);
            let by_element = self.set_point_sensitivities.get(id);
            for action in actions {
                let value = by_element
                    .and_then(|s| s.get(&action.element))
                    .copied()
                    .unwrap_or(0.0);
                result.set_sensitivity(id.clone(), action.id.clone(), value);
            }
            if let Some(sum) = self.ptdf_zonal_sums.get(id) {
                result.set_ptdf_zonal_sum(id.clone(), *sum);
            }
            if let Some(commercial) = self.commercial_flows.get(id) {
                result.set_commercial_flow(id.clone(), *commercial);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{ContinuousKind, DiscreteAction, ElementaryAction, SetPointRange, StateId};

    fn constraint() -> MonitoredConstraint {
        MonitoredConstraint::new("c", "line-1", StateId::preventive()).with_limit(100.0)
    }

    fn pst() -> ContinuousAction {
        ContinuousAction::new(
            "pst",
            ContinuousKind::Pst,
            "pst-el",
            vec![SetPointRange::absolute(-10.0, 10.0)],
        )
    }

    #[test]
    fn test_flow_is_affine_in_set_points() {
        let model = LinearFlowModel::new()
            .with_base_flow("c", 110.0)
            .with_reference_set_point("pst-el", 1.0)
            .with_set_point_sensitivity("c", "pst-el", -5.0);
        let network = NetworkState::new("n").with_set_point("pst-el", 3.0);
        let result = model.compute(&network, &[pst()], &[constraint()]).unwrap();
        assert_eq!(result.flow(&"c".into()), Some(100.0));
        assert_eq!(result.sensitivity(&"c".into(), &"pst".into()), -5.0);
    }

    #[test]
    fn test_opening_effect() {
        let model = LinearFlowModel::new()
            .with_base_flow("c", 110.0)
            .with_opening_effect("line-2", "c", -20.0);
        let network = NetworkState::new("n").with_status("line-2", false);
        let result = model.compute(&network, &[], &[constraint()]).unwrap();
        assert_eq!(result.flow(&"c".into()), Some(90.0));
    }

    #[test]
    fn test_missing_base_flow_fails() {
        let model = LinearFlowModel::new();
        let err = model
            .compute(&NetworkState::new("n"), &[], &[constraint()])
            .unwrap_err();
        assert!(matches!(err, SensitivityError::MissingData(_)));
    }

    #[test]
    fn test_scripted_divergence() {
        let model = LinearFlowModel::new()
            .with_base_flow("c", 0.0)
            .diverging_on("bad");
        let mut network = NetworkState::new("n");
        DiscreteAction::new("bad", vec![ElementaryAction::Topology {
            element: "x".into(),
            closed: false,
        }])
        .apply(&mut network)
        .unwrap();
        assert!(matches!(
            model.compute(&network, &[], &[constraint()]),
            Err(SensitivityError::Divergence(_))
        ));
    }
}
