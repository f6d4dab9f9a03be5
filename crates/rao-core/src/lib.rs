//! # rao-core: Remedial-Action Data Model
//!
//! Provides the data structures shared by the remedial-action optimizer:
//!
//! - **[`NetworkState`]**: the simulated operating point (switch statuses and
//!   set points). Cloned per search-tree leaf, never shared mutably.
//! - **[`DiscreteAction`]**: a binary corrective action made of
//!   [`ElementaryAction`]s, tagged with an operator and regions.
//! - **[`ContinuousAction`]**: a set point that the LP may move inside an
//!   admissible range.
//! - **[`MonitoredConstraint`]**: a flow constraint with bounds and
//!   optimized/monitored flags, attached to one [`StateId`].
//! - **[`Catalog`]**: everything above, plus contingencies and region
//!   boundaries, validated once and then shared read-only.
//! - **[`RegionGraph`]**: region adjacency used by the locality filter.
//!
//! ## Quick Start
//!
//! ```rust
//! use rao_core::*;
//!
//! let mut network = NetworkState::new("base");
//! network.set_set_point("pst-1", 0.0);
//!
//! let open_line = DiscreteAction::new("open-l1", vec![ElementaryAction::Topology {
//!     element: "line-1".into(),
//!     closed: false,
//! }])
//! .with_operator("FR");
//!
//! open_line.apply(&mut network).unwrap();
//! assert!(!network.is_closed("line-1"));
//! assert!(open_line.apply(&mut network).is_err());
//! ```

pub mod actions;
pub mod catalog;
pub mod constraints;
pub mod error;
pub mod network;
pub mod region_graph;
pub mod state;

pub use actions::{
    ContinuousAction, ContinuousKind, DiscreteAction, ElementaryAction, RangeType, SetPointRange,
    UsageRule,
};
pub use catalog::{Catalog, Contingency};
pub use constraints::MonitoredConstraint;
pub use error::{RaoError, RaoResult};
pub use network::NetworkState;
pub use region_graph::RegionGraph;
pub use state::{Instant, StateId};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a discrete or continuous remedial action.
    ActionId
);
string_id!(
    /// Identifier of a monitored constraint.
    ConstraintId
);
string_id!(
    /// Identifier of a contingency (outage scenario).
    ContingencyId
);
string_id!(
    /// Transmission system operator owning actions and constraints.
    OperatorId
);
string_id!(
    /// Geographic region (typically a country or bidding zone).
    RegionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_order_and_display() {
        let a = ActionId::new("a");
        let b = ActionId::from("b");
        assert!(a < b);
        assert_eq!(b.to_string(), "b");
        assert_eq!(a.as_str(), "a");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&OperatorId::new("FR")).unwrap();
        assert_eq!(json, "\"FR\"");
    }
}
