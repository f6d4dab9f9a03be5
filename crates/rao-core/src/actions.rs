//! Remedial actions and their usage rules.
//!
//! Discrete actions are a closed list of [`ElementaryAction`]s applied all at
//! once. Continuous actions expose a set point that the linear optimizer moves
//! inside the intersection of their [`SetPointRange`]s.

use crate::{ActionId, ContingencyId, Instant, NetworkState, OperatorId, RaoError, RaoResult};
use crate::{RegionId, StateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// When an action may be used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageRule {
    /// Available in every state of the given instant.
    OnInstant { instant: Instant },
    /// Available only after the given contingency, at the given instant.
    OnState {
        contingency: ContingencyId,
        instant: Instant,
    },
}

impl UsageRule {
    pub fn applies_to(&self, state: &StateId) -> bool {
        match self {
            UsageRule::OnInstant { instant } => *instant == state.instant,
            UsageRule::OnState {
                contingency,
                instant,
            } => *instant == state.instant && state.contingency.as_ref() == Some(contingency),
        }
    }
}

/// Atomic modification of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementaryAction {
    Topology { element: String, closed: bool },
    SetPoint { element: String, value: f64 },
    PstTap { element: String, tap: i32 },
}

impl ElementaryAction {
    pub fn element(&self) -> &str {
        match self {
            ElementaryAction::Topology { element, .. }
            | ElementaryAction::SetPoint { element, .. }
            | ElementaryAction::PstTap { element, .. } => element,
        }
    }

    pub fn apply(&self, network: &mut NetworkState) {
        match self {
            ElementaryAction::Topology { element, closed } => {
                network.set_closed(element.clone(), *closed)
            }
            ElementaryAction::SetPoint { element, value } => {
                network.set_set_point(element.clone(), *value)
            }
            ElementaryAction::PstTap { element, tap } => {
                network.set_set_point(element.clone(), f64::from(*tap))
            }
        }
    }
}

/// Binary corrective action (network action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAction {
    pub id: ActionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<OperatorId>,
    /// Regions the action acts on; empty when unknown.
    #[serde(default)]
    pub locations: BTreeSet<RegionId>,
    pub elementary_actions: Vec<ElementaryAction>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
}

impl DiscreteAction {
    pub fn new(id: impl Into<ActionId>, elementary_actions: Vec<ElementaryAction>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            operator: None,
            locations: BTreeSet::new(),
            elementary_actions,
            usage_rules: Vec::new(),
        }
    }

    pub fn with_operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_location(mut self, region: impl Into<RegionId>) -> Self {
        self.locations.insert(region.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    pub fn is_available(&self, state: &StateId) -> bool {
        self.usage_rules.iter().any(|rule| rule.applies_to(state))
    }

    /// Applies every elementary action. Fails if the action was already applied.
    pub fn apply(&self, network: &mut NetworkState) -> RaoResult<()> {
        if network.has_applied(&self.id) {
            return Err(RaoError::Network(format!(
                "action '{}' already applied on '{}'",
                self.id, network.name
            )));
        }
        for elementary in &self.elementary_actions {
            elementary.apply(network);
        }
        network.record_applied(self.id.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuousKind {
    Pst,
    Hvdc,
    Injection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    Absolute,
    RelativeToInitialNetwork,
    RelativeToPreviousInstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPointRange {
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

impl SetPointRange {
    pub fn absolute(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::Absolute,
            min,
            max,
        }
    }

    pub fn relative_to_initial(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::RelativeToInitialNetwork,
            min,
            max,
        }
    }

    pub fn relative_to_previous_instant(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::RelativeToPreviousInstant,
            min,
            max,
        }
    }
}

/// Continuous corrective action (range action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousAction {
    pub id: ActionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub operator: Option<OperatorId>,
    pub kind: ContinuousKind,
    /// Network element carrying the set point.
    pub element: String,
    #[serde(default)]
    pub locations: BTreeSet<RegionId>,
    pub ranges: Vec<SetPointRange>,
    #[serde(default)]
    pub usage_rules: Vec<UsageRule>,
}

impl ContinuousAction {
    pub fn new(
        id: impl Into<ActionId>,
        kind: ContinuousKind,
        element: impl Into<String>,
        ranges: Vec<SetPointRange>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            operator: None,
            kind,
            element: element.into(),
            locations: BTreeSet::new(),
            ranges,
            usage_rules: Vec::new(),
        }
    }

    pub fn with_operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn with_usage_rule(mut self, rule: UsageRule) -> Self {
        self.usage_rules.push(rule);
        self
    }

    pub fn is_available(&self, state: &StateId) -> bool {
        self.usage_rules.iter().any(|rule| rule.applies_to(state))
    }

    /// Current set point; elements never written read as 0.
    pub fn current_value(&self, network: &NetworkState) -> f64 {
        network.set_point(&self.element).unwrap_or(0.0)
    }

    pub fn apply(&self, network: &mut NetworkState, set_point: f64) {
        network.set_set_point(self.element.clone(), set_point);
    }

    /// Intersection of all ranges, given the initial-network and
    /// previous-instant set points.
    pub fn admissible_range(&self, initial: f64, previous_instant: f64) -> (f64, f64) {
        self.ranges
            .iter()
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), range| {
                let offset = match range.range_type {
                    RangeType::Absolute => 0.0,
                    RangeType::RelativeToInitialNetwork => initial,
                    RangeType::RelativeToPreviousInstant => previous_instant,
                };
                (lo.max(offset + range.min), hi.min(offset + range.max))
            })
    }

    pub fn validate(&self) -> RaoResult<()> {
        if self.ranges.is_empty() {
            return Err(RaoError::Config(format!(
                "continuous action '{}' has no range",
                self.id
            )));
        }
        for range in &self.ranges {
            if !(range.min <= range.max) {
                return Err(RaoError::Config(format!(
                    "continuous action '{}' has malformed range [{}, {}]",
                    self.id, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}
