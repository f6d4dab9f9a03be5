use rao_core::{
    ActionId, Catalog, ConstraintId, ContinuousAction, DiscreteAction, MonitoredConstraint, NetworkState,
    OperatorId, RaoResult, StateId,
};
use std::collections::{BTreeSet, HashMap};

/// States optimized together, with the actions available at the first one.
///
/// Immutable once built; shared read-only by every leaf of a search tree.
#[derive(Debug, Clone)]
pub struct Perimeter {
    pub optimized_state: StateId,
    pub states: BTreeSet<StateId>,
    /// Sorted by id so sibling order is reproducible.
    pub discrete_actions: Vec<DiscreteAction>,
    pub continuous_actions: Vec<ContinuousAction>,
    pub constraints: Vec<MonitoredConstraint>,
    /// Operators whose constraints may not drive the objective.
    pub unoptimized_operators: BTreeSet<OperatorId>,
    /// Set points chosen at the previous instant, for relative ranges.
    pub previous_instant_set_points: HashMap<ActionId, f64>,
    /// Set points in the network before any optimization. Ranges relative
    /// to the initial network are anchored here; absent entries fall back to
    /// the pre-perimeter value.
    pub initial_network_set_points: HashMap<ActionId, f64>,
}

impl Perimeter {
    pub fn new(optimized_state: StateId) -> Self {
        Self {
            states: BTreeSet::from([optimized_state.clone()]),
            optimized_state,
            discrete_actions: Vec::new(),
            continuous_actions: Vec::new(),
            constraints: Vec::new(),
            unoptimized_operators: BTreeSet::new(),
            previous_instant_set_points: HashMap::new(),
            initial_network_set_points: HashMap::new(),
        }
    }

    pub fn from_catalog(
        catalog: &Catalog,
        optimized_state: StateId,
        states: BTreeSet<StateId>,
    ) -> Self {
        let mut discrete_actions: Vec<DiscreteAction> = catalog
            .discrete_actions_available(&optimized_state)
            .into_iter()
            .cloned()
            .collect();
        discrete_actions.sort_by(|a, b| a.id.cmp(&b.id));
        let mut continuous_actions: Vec<ContinuousAction> = catalog
            .continuous_actions_available(&optimized_state)
            .into_iter()
            .cloned()
            .collect();
        continuous_actions.sort_by(|a, b| a.id.cmp(&b.id));
        let constraints = catalog.constraints_in(&states).cloned().collect();
        Self {
            optimized_state,
            states,
            discrete_actions,
            continuous_actions,
            constraints,
            unoptimized_operators: BTreeSet::new(),
            previous_instant_set_points: HashMap::new(),
            initial_network_set_points: HashMap::new(),
        }
    }

    pub fn with_discrete_action(mut self, action: DiscreteAction) -> Self {
        self.discrete_actions.push(action);
        self.discrete_actions.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }

    pub fn with_continuous_action(mut self, action: ContinuousAction) -> Self {
        self.continuous_actions.push(action);
        self.continuous_actions.sort_by(|a, b| a.id.cmp(&b.id));
        self
    }

    pub fn with_constraint(mut self, constraint: MonitoredConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_unoptimized_operators(mut self, operators: BTreeSet<OperatorId>) -> Self {
        self.unoptimized_operators = operators;
        self
    }

    /// Records the set points of `network` as previous-instant values.
    pub fn with_previous_instant(mut self, network: &NetworkState) -> Self {
        self.previous_instant_set_points = self
            .continuous_actions
            .iter()
            .map(|a| (a.id.clone(), a.current_value(network)))
            .collect();
        self
    }

    /// Records the set points of the unoptimized `network`.
    pub fn with_initial_network(mut self, network: &NetworkState) -> Self {
        self.initial_network_set_points = self.set_points(network);
        self
    }

    pub fn id(&self) -> String {
        self.optimized_state.to_string()
    }

    pub fn optimized_constraints(&self) -> Vec<MonitoredConstraint> {
        self.constraints.iter().filter(|c| c.optimized).cloned().collect()
    }

    pub fn monitored_constraints(&self) -> Vec<MonitoredConstraint> {
        self.constraints.iter().filter(|c| c.monitored).cloned().collect()
    }

    pub fn loop_flow_constraints(&self) -> Vec<MonitoredConstraint> {
        self.constraints
            .iter()
            .filter(|c| c.loop_flow_limit.is_some())
            .cloned()
            .collect()
    }

    pub fn constraint(&self, id: &ConstraintId) -> Option<&MonitoredConstraint> {
        self.constraints.iter().find(|c| &c.id == id)
    }

    pub fn discrete_action(&self, id: &ActionId) -> Option<&DiscreteAction> {
        self.discrete_actions.iter().find(|a| &a.id == id)
    }

    /// Set points of every continuous action in `network`.
    pub fn set_points(&self, network: &NetworkState) -> HashMap<ActionId, f64> {
        self.continuous_actions
            .iter()
            .map(|a| (a.id.clone(), a.current_value(network)))
            .collect()
    }

    pub fn validate(&self) -> RaoResult<()> {
        for action in &self.continuous_actions {
            action.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{ContinuousKind, Instant, SetPointRange, UsageRule};

    #[test]
    fn test_from_catalog_picks_available_actions_and_perimeter_constraints() {
        let curative = StateId::after("co", Instant::Curative);
        let catalog = Catalog {
            continuous_actions: vec![
                ContinuousAction::new(
                    "z-pst",
                    ContinuousKind::Pst,
                    "z",
                    vec![SetPointRange::absolute(-1.0, 1.0)],
                )
                .with_usage_rule(UsageRule::OnInstant {
                    instant: Instant::Curative,
                }),
                ContinuousAction::new(
                    "a-pst",
                    ContinuousKind::Pst,
                    "a",
                    vec![SetPointRange::absolute(-1.0, 1.0)],
                )
                .with_usage_rule(UsageRule::OnInstant {
                    instant: Instant::Curative,
                }),
            ],
            constraints: vec![
                MonitoredConstraint::new("c-prev", "l", StateId::preventive()),
                MonitoredConstraint::new("c-cur", "l", curative.clone()),
            ],
            ..Catalog::default()
        };
        let perimeter = Perimeter::from_catalog(
            &catalog,
            curative.clone(),
            BTreeSet::from([curative]),
        );
        let ids: Vec<_> = perimeter
            .continuous_actions
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a-pst", "z-pst"]);
        assert_eq!(perimeter.constraints.len(), 1);
        assert_eq!(perimeter.id(), "co - curative");
    }
}
