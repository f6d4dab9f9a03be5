//! Per-perimeter reports and the sinks consuming them.

use crate::search_tree::{PerimeterStatus, SearchTreeResult};
use rao_core::RaoResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const REPORTED_LIMITING_ELEMENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitingElement {
    pub constraint: String,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub functional: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    pub total: f64,
}

/// Final outcome of one perimeter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerimeterReport {
    pub perimeter: String,
    pub status: PerimeterStatus,
    pub secure: bool,
    pub discrete_actions: Vec<String>,
    pub set_points: BTreeMap<String, f64>,
    pub initial_cost: Option<CostBreakdown>,
    pub final_cost: Option<CostBreakdown>,
    pub limiting_elements: Vec<LimitingElement>,
    pub depth: usize,
    pub leaves_evaluated: usize,
    pub elapsed_ms: u128,
}

impl PerimeterReport {
    pub fn from_result(result: &SearchTreeResult) -> Self {
        let best = result.best.as_ref();
        let best_result = best.and_then(|leaf| leaf.result());
        Self {
            perimeter: result.perimeter_id.clone(),
            status: result.status,
            secure: result.is_secure(),
            discrete_actions: best
                .map(|leaf| leaf.action_ids().iter().map(|id| id.to_string()).collect())
                .unwrap_or_default(),
            set_points: best_result
                .map(|r| {
                    r.set_points
                        .iter()
                        .map(|(id, value)| (id.to_string(), *value))
                        .collect()
                })
                .unwrap_or_default(),
            initial_cost: result.initial_objective.as_ref().map(|o| CostBreakdown {
                functional: o.functional_cost,
                virtual_costs: o.virtual_costs.clone(),
                total: o.cost(),
            }),
            final_cost: best_result.map(|r| CostBreakdown {
                functional: r.objective.functional_cost,
                virtual_costs: r.objective.virtual_costs.clone(),
                total: r.objective.cost(),
            }),
            limiting_elements: best
                .map(|leaf| {
                    leaf.most_limiting_elements(REPORTED_LIMITING_ELEMENTS)
                        .iter()
                        .map(|(id, margin)| LimitingElement {
                            constraint: id.to_string(),
                            margin: *margin,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            depth: result.depth,
            leaves_evaluated: result.leaves_evaluated,
            elapsed_ms: result.elapsed_ms,
        }
    }
}

/// Consumes the final report of every perimeter.
pub trait ResultSink {
    fn report(&mut self, report: &PerimeterReport) -> RaoResult<()>;
}

/// Logs reports through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn report(&mut self, report: &PerimeterReport) -> RaoResult<()> {
        if report.status == PerimeterStatus::Failure && report.final_cost.is_none() {
            warn!("perimeter {}: optimization failed", report.perimeter);
            return Ok(());
        }
        let cost = report.final_cost.as_ref().map_or(f64::INFINITY, |c| c.total);
        info!(
            "perimeter {} ({:?}, secure: {}): cost {:.2}, actions [{}]",
            report.perimeter,
            report.status,
            report.secure,
            cost,
            report.discrete_actions.join(", ")
        );
        for (action, value) in &report.set_points {
            info!("  set point {} = {:.4}", action, value);
        }
        Ok(())
    }
}

/// Collects reports for JSON export.
#[derive(Debug, Default)]
pub struct JsonSink {
    reports: Vec<PerimeterReport>,
}

impl JsonSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[PerimeterReport] {
        &self.reports
    }

    pub fn to_json_string(&self) -> RaoResult<String> {
        Ok(serde_json::to_string_pretty(&self.reports)?)
    }

    pub fn write(&self, path: &Path) -> RaoResult<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

impl ResultSink for JsonSink {
    fn report(&mut self, report: &PerimeterReport) -> RaoResult<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
