//! Partition of states into independently optimized perimeters.
//!
//! The preventive state seeds the first perimeter. Each contingency's states
//! are then walked in chronological order: a state with at least one
//! available action starts a new perimeter, any other state joins the
//! perimeter currently open for that contingency (the preventive one until
//! the first state with actions). Actions at the outage instant are not
//! supported and rejected as a configuration error.

use crate::perimeter::Perimeter;
use rao_core::{Catalog, Instant, OperatorId, RaoError, RaoResult, StateId};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Optimized state plus the states it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerimeterStates {
    pub optimized_state: StateId,
    pub states: BTreeSet<StateId>,
}

impl PerimeterStates {
    fn new(optimized_state: StateId) -> Self {
        Self {
            states: BTreeSet::from([optimized_state.clone()]),
            optimized_state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateTree {
    preventive: PerimeterStates,
    curative: Vec<PerimeterStates>,
    operators_not_sharing_cras: BTreeSet<OperatorId>,
}

impl StateTree {
    pub fn new(catalog: &Catalog, starting_state: &StateId) -> RaoResult<Self> {
        if !starting_state.is_preventive() {
            return Err(RaoError::Config(format!(
                "optimization must start from the preventive state, got '{}'",
                starting_state
            )));
        }
        let mut preventive = PerimeterStates::new(starting_state.clone());
        let mut curative: Vec<PerimeterStates> = Vec::new();

        for contingency in &catalog.contingencies {
            let mut current: Option<PerimeterStates> = None;
            for state in catalog.states(&contingency.id) {
                if state.instant == Instant::Outage && catalog.has_available_action(&state) {
                    return Err(RaoError::Config(format!(
                        "outage state '{}' has available remedial actions",
                        state
                    )));
                }
                if catalog.has_available_action(&state) {
                    if let Some(done) = current.take() {
                        curative.push(done);
                    }
                    debug!("state {} starts a new perimeter", state);
                    current = Some(PerimeterStates::new(state));
                } else {
                    match current.as_mut() {
                        Some(open) => open.states.insert(state),
                        None => preventive.states.insert(state),
                    };
                }
            }
            if let Some(done) = current {
                curative.push(done);
            }
        }

        let operators_with_cras: BTreeSet<OperatorId> = curative
            .iter()
            .flat_map(|p| catalog.operators_with_actions(&p.optimized_state))
            .collect();
        let operators_not_sharing_cras: BTreeSet<OperatorId> = catalog
            .operators()
            .difference(&operators_with_cras)
            .cloned()
            .collect();

        info!(
            "state tree: preventive perimeter with {} state(s), {} curative perimeter(s)",
            preventive.states.len(),
            curative.len()
        );
        if !operators_not_sharing_cras.is_empty() {
            info!(
                "operators without curative remedial action: {:?}",
                operators_not_sharing_cras
            );
        }
        Ok(Self {
            preventive,
            curative,
            operators_not_sharing_cras,
        })
    }

    pub fn preventive_perimeter(&self) -> &PerimeterStates {
        &self.preventive
    }

    pub fn curative_perimeters(&self) -> &[PerimeterStates] {
        &self.curative
    }

    /// Optimized states, preventive first.
    pub fn optimized_states(&self) -> Vec<&StateId> {
        std::iter::once(&self.preventive.optimized_state)
            .chain(self.curative.iter().map(|p| &p.optimized_state))
            .collect()
    }

    /// Operators owning constraints or actions but no action at any curative
    /// optimized state.
    pub fn operators_not_sharing_cras(&self) -> &BTreeSet<OperatorId> {
        &self.operators_not_sharing_cras
    }

    /// Builds the perimeter of `states` with the catalog's content.
    pub fn perimeter(&self, catalog: &Catalog, states: &PerimeterStates) -> Perimeter {
        Perimeter::from_catalog(catalog, states.optimized_state.clone(), states.states.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{Contingency, DiscreteAction, ElementaryAction, MonitoredConstraint, UsageRule};

    fn constraint(id: &str, state: StateId, operator: &str) -> MonitoredConstraint {
        MonitoredConstraint::new(id, "line", state)
            .with_limit(100.0)
            .with_operator(operator)
    }

    fn curative_action(id: &str, contingency: &str, operator: &str) -> DiscreteAction {
        DiscreteAction::new(
            id,
            vec![ElementaryAction::Topology {
                element: "breaker".into(),
                closed: false,
            }],
        )
        .with_operator(operator)
        .with_usage_rule(UsageRule::OnState {
            contingency: contingency.into(),
            instant: Instant::Curative,
        })
    }

    fn catalog() -> Catalog {
        Catalog {
            contingencies: vec![
                Contingency::new("co-1", vec![]),
                Contingency::new("co-2", vec![]),
            ],
            discrete_actions: vec![
                curative_action("cra-1", "co-1", "FR"),
                DiscreteAction::new(
                    "pra-nl",
                    vec![ElementaryAction::Topology {
                        element: "coupler".into(),
                        closed: true,
                    }],
                )
                .with_operator("NL")
                .with_usage_rule(UsageRule::OnInstant {
                    instant: Instant::Preventive,
                }),
            ],
            constraints: vec![
                constraint("pre", StateId::preventive(), "FR"),
                constraint("co1-out", StateId::after("co-1", Instant::Outage), "FR"),
                constraint("co1-cur", StateId::after("co-1", Instant::Curative), "FR"),
                constraint("co2-out", StateId::after("co-2", Instant::Outage), "BE"),
                constraint("co2-cur", StateId::after("co-2", Instant::Curative), "BE"),
            ],
            ..Catalog::default()
        }
    }

    #[test]
    fn test_states_without_actions_join_preventive_perimeter() {
        let tree = StateTree::new(&catalog(), &StateId::preventive()).unwrap();
        let preventive = &tree.preventive_perimeter().states;
        assert!(preventive.contains(&StateId::preventive()));
        assert!(preventive.contains(&StateId::after("co-1", Instant::Outage)));
        assert!(preventive.contains(&StateId::after("co-2", Instant::Outage)));
        assert!(preventive.contains(&StateId::after("co-2", Instant::Curative)));
        assert!(!preventive.contains(&StateId::after("co-1", Instant::Curative)));

        assert_eq!(tree.curative_perimeters().len(), 1);
        assert_eq!(
            tree.curative_perimeters()[0].optimized_state,
            StateId::after("co-1", Instant::Curative)
        );
        assert_eq!(tree.optimized_states().len(), 2);
    }

    #[test]
    fn test_operators_not_sharing_cras() {
        let tree = StateTree::new(&catalog(), &StateId::preventive()).unwrap();
        let operators: Vec<&str> = tree
            .operators_not_sharing_cras()
            .iter()
            .map(|o| o.as_str())
            .collect();
        // NL only owns a preventive action
        assert_eq!(operators, vec!["BE", "NL"]);
    }

    #[test]
    fn test_outage_state_with_actions_is_rejected() {
        let mut catalog = catalog();
        catalog.discrete_actions.push(curative_action("out-1", "co-2", "BE").with_usage_rule(
            UsageRule::OnState {
                contingency: "co-2".into(),
                instant: Instant::Outage,
            },
        ));
        assert!(matches!(
            StateTree::new(&catalog, &StateId::preventive()),
            Err(RaoError::Config(_))
        ));
    }

    #[test]
    fn test_non_preventive_start_is_rejected() {
        let start = StateId::after("co-1", Instant::Curative);
        assert!(matches!(
            StateTree::new(&catalog(), &start),
            Err(RaoError::Config(_))
        ));
    }

    #[test]
    fn test_perimeter_collects_constraints_of_its_states() {
        let catalog = catalog();
        let tree = StateTree::new(&catalog, &StateId::preventive()).unwrap();
        let perimeter = tree.perimeter(&catalog, &tree.curative_perimeters()[0]);
        assert_eq!(perimeter.constraints.len(), 1);
        assert_eq!(perimeter.discrete_actions.len(), 1);
    }
}
