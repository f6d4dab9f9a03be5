//! Read-only catalog of contingencies, remedial actions and constraints.

use crate::{
    ContingencyId, ContinuousAction, DiscreteAction, MonitoredConstraint, OperatorId, RaoError,
    RaoResult, RegionGraph, RegionId, StateId, UsageRule,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contingency {
    pub id: ContingencyId,
    #[serde(default)]
    pub name: String,
    /// Elements tripped by the contingency.
    #[serde(default)]
    pub elements: Vec<String>,
}

impl Contingency {
    pub fn new(id: impl Into<ContingencyId>, elements: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            elements,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub contingencies: Vec<Contingency>,
    pub discrete_actions: Vec<DiscreteAction>,
    pub continuous_actions: Vec<ContinuousAction>,
    pub constraints: Vec<MonitoredConstraint>,
    /// Shared region boundaries used by the locality filter.
    pub boundaries: Vec<(RegionId, RegionId)>,
}

impl Catalog {
    /// States reached after `contingency`, in chronological order.
    ///
    /// A state exists when a constraint or a usage rule refers to it.
    pub fn states(&self, contingency: &ContingencyId) -> Vec<StateId> {
        let mut states = BTreeSet::new();
        for constraint in &self.constraints {
            if constraint.state.contingency.as_ref() == Some(contingency) {
                states.insert(constraint.state.instant);
            }
        }
        let rules = self
            .discrete_actions
            .iter()
            .flat_map(|a| a.usage_rules.iter())
            .chain(self.continuous_actions.iter().flat_map(|a| a.usage_rules.iter()));
        for rule in rules {
            if let UsageRule::OnState {
                contingency: co,
                instant,
            } = rule
            {
                if co == contingency {
                    states.insert(*instant);
                }
            }
        }
        states
            .into_iter()
            .map(|instant| StateId::after(contingency.clone(), instant))
            .collect()
    }

    pub fn discrete_actions_available(&self, state: &StateId) -> Vec<&DiscreteAction> {
        self.discrete_actions
            .iter()
            .filter(|a| a.is_available(state))
            .collect()
    }

    pub fn continuous_actions_available(&self, state: &StateId) -> Vec<&ContinuousAction> {
        self.continuous_actions
            .iter()
            .filter(|a| a.is_available(state))
            .collect()
    }

    pub fn has_available_action(&self, state: &StateId) -> bool {
        self.discrete_actions.iter().any(|a| a.is_available(state))
            || self.continuous_actions.iter().any(|a| a.is_available(state))
    }

    /// Operators owning at least one action available in `state`.
    pub fn operators_with_actions(&self, state: &StateId) -> BTreeSet<OperatorId> {
        self.discrete_actions
            .iter()
            .filter(|a| a.is_available(state))
            .filter_map(|a| a.operator.clone())
            .chain(
                self.continuous_actions
                    .iter()
                    .filter(|a| a.is_available(state))
                    .filter_map(|a| a.operator.clone()),
            )
            .collect()
    }

    /// Operators owning at least one constraint or remedial action.
    pub fn operators(&self) -> BTreeSet<OperatorId> {
        self.constraints
            .iter()
            .filter_map(|c| c.operator.clone())
            .chain(self.discrete_actions.iter().filter_map(|a| a.operator.clone()))
            .chain(self.continuous_actions.iter().filter_map(|a| a.operator.clone()))
            .collect()
    }

    pub fn constraints_in<'a>(
        &'a self,
        states: &'a BTreeSet<StateId>,
    ) -> impl Iterator<Item = &'a MonitoredConstraint> + 'a {
        self.constraints
            .iter()
            .filter(move |c| states.contains(&c.state))
    }

    pub fn region_graph(&self) -> RegionGraph {
        RegionGraph::from_boundaries(&self.boundaries)
    }

    /// Checks identifiers and ranges. Run once before any optimization.
    pub fn validate(&self) -> RaoResult<()> {
        let mut seen = HashSet::new();
        for id in self
            .discrete_actions
            .iter()
            .map(|a| &a.id)
            .chain(self.continuous_actions.iter().map(|a| &a.id))
        {
            if !seen.insert(id) {
                return Err(RaoError::Validation(format!("duplicate action id '{}'", id)));
            }
        }

        let mut constraint_ids = HashSet::new();
        for constraint in &self.constraints {
            if !constraint_ids.insert(&constraint.id) {
                return Err(RaoError::Validation(format!(
                    "duplicate constraint id '{}'",
                    constraint.id
                )));
            }
        }

        let contingencies: HashSet<_> = self.contingencies.iter().map(|c| &c.id).collect();
        for constraint in &self.constraints {
            if let Some(co) = &constraint.state.contingency {
                if !contingencies.contains(co) {
                    return Err(RaoError::Validation(format!(
                        "constraint '{}' refers to unknown contingency '{}'",
                        constraint.id, co
                    )));
                }
            }
        }

        for action in &self.continuous_actions {
            action.validate()?;
        }
        Ok(())
    }
}
