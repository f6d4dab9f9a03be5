use crate::ActionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Simulated operating point: switch statuses and set points.
///
/// Elements without an explicit status are closed. Every discrete action
/// applied to the state is recorded so it can never be applied twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkState {
    pub name: String,
    topology: BTreeMap<String, bool>,
    set_points: BTreeMap<String, f64>,
    applied_actions: Vec<ActionId>,
}

impl NetworkState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_set_point(mut self, element: impl Into<String>, value: f64) -> Self {
        self.set_points.insert(element.into(), value);
        self
    }

    pub fn with_status(mut self, element: impl Into<String>, closed: bool) -> Self {
        self.topology.insert(element.into(), closed);
        self
    }

    pub fn is_closed(&self, element: &str) -> bool {
        self.topology.get(element).copied().unwrap_or(true)
    }

    pub fn set_closed(&mut self, element: impl Into<String>, closed: bool) {
        self.topology.insert(element.into(), closed);
    }

    pub fn set_point(&self, element: &str) -> Option<f64> {
        self.set_points.get(element).copied()
    }

    pub fn set_set_point(&mut self, element: impl Into<String>, value: f64) {
        self.set_points.insert(element.into(), value);
    }

    /// Elements explicitly opened in this state.
    pub fn open_elements(&self) -> impl Iterator<Item = &str> {
        self.topology
            .iter()
            .filter(|(_, closed)| !**closed)
            .map(|(element, _)| element.as_str())
    }

    pub fn set_points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.set_points.iter().map(|(e, v)| (e.as_str(), *v))
    }

    pub fn applied_actions(&self) -> &[ActionId] {
        &self.applied_actions
    }

    pub fn has_applied(&self, action: &ActionId) -> bool {
        self.applied_actions.contains(action)
    }

    pub(crate) fn record_applied(&mut self, action: ActionId) {
        self.applied_actions.push(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_closed() {
        let state = NetworkState::new("n").with_status("line-2", false);
        assert!(state.is_closed("line-1"));
        assert!(!state.is_closed("line-2"));
        assert_eq!(state.open_elements().collect::<Vec<_>>(), vec!["line-2"]);
    }

    #[test]
    fn test_clone_is_isolated() {
        let base = NetworkState::new("n").with_set_point("pst", 1.0);
        let mut copy = base.clone();
        copy.set_set_point("pst", 4.0);
        assert_eq!(base.set_point("pst"), Some(1.0));
        assert_eq!(copy.set_point("pst"), Some(4.0));
    }
}
