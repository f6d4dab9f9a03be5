//! Case files consumed by the CLI.

use anyhow::{Context, Result};
use rao_algo::LinearFlowModel;
use rao_core::{Catalog, NetworkState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Initial network, action and constraint catalog, and the flow model
/// standing in for the sensitivity engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseFile {
    pub network: NetworkState,
    pub catalog: Catalog,
    pub model: LinearFlowModel,
}

impl CaseFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading case file '{}'", path.display()))?;
        let case: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing case file '{}'", path.display()))?;
        case.catalog
            .validate()
            .with_context(|| format!("validating catalog of '{}'", path.display()))?;
        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_case_parses() {
        let case: CaseFile = serde_json::from_str(
            r#"{
                "network": {"name": "base", "set_points": {"pst-el": 0.0}},
                "catalog": {
                    "constraints": [{
                        "id": "c",
                        "element": "line",
                        "state": {"instant": "preventive"},
                        "lower": -100.0,
                        "upper": 100.0
                    }]
                },
                "model": {"base_flows": {"c": 90.0}}
            }"#,
        )
        .unwrap();
        assert_eq!(case.network.set_point("pst-el"), Some(0.0));
        assert_eq!(case.catalog.constraints.len(), 1);
        assert!(case.catalog.constraints[0].optimized);
        assert_eq!(case.model.base_flows.len(), 1);
    }
}
