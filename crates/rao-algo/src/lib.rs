//! # rao-algo: Remedial Action Search-Tree Optimizer
//!
//! This crate decides which combination of discrete and continuous remedial
//! actions keeps monitored grid constraints within their limits at minimum
//! cost. Discrete actions are explored by a branch-and-bound search tree;
//! continuous set points are chosen at every node by an iterated linear
//! program driven by externally supplied sensitivities.
//!
//! ## Pipeline
//!
//! | Stage | Type | Role |
//! |-------|------|------|
//! | Partition | [`StateTree`] | Groups states into independently optimized perimeters |
//! | Configure | [`TreeParameters`], [`SearchTreeParameters`] | Immutable per-perimeter settings |
//! | Search | [`SearchTree`] | Depth loop over [`Leaf`] nodes, siblings in parallel |
//! | Node | [`Leaf`] | evaluate → optimize → bloom |
//! | Continuous | [`IteratingLinearOptimizer`] | LP solve ↔ sensitivity update |
//! | Cost | [`ObjectiveFunction`] | −min margin + named virtual costs |
//! | Report | [`ResultSink`] | Per-perimeter export |
//!
//! ### Collaborators
//!
//! The optimizer owns no physics and no LP algorithm:
//!
//! - **[`SensitivityProvider`]**: flows and sensitivities for a network state
//!   ([`LinearFlowModel`] is a deterministic affine implementation)
//! - **[`LinearSolver`]**: solves the [`linear_problem::LinearProblem`]
//!   assembled by the fillers ([`ClarabelSolver`] with the
//!   `solver-clarabel` feature)
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{ClarabelSolver, JsonSink, LinearFlowModel, Rao, RaoParameters};
//!
//! let params = RaoParameters::load(Path::new("params.toml"))?;
//! let mut sink = JsonSink::new();
//! let outcome = Rao::new(&catalog, &params, &model, &ClarabelSolver::new())
//!     .run(network, &mut sink)?;
//! println!("secure: {}", outcome.is_secure());
//! ```

pub mod iterating;
pub mod leaf;
pub mod linear_problem;
pub mod objective;
pub mod parameters;
pub mod perimeter;
pub mod rao;
pub mod report;
pub mod search_tree;
pub mod sensitivity;
pub mod state_tree;

pub use iterating::{IteratingLinearOptimizer, LinearOptimizationResult, LinearOptimizationStatus};
pub use leaf::{Leaf, LeafContext, LeafStatus};
#[cfg(feature = "solver-clarabel")]
pub use linear_problem::ClarabelSolver;
pub use linear_problem::{LinearSolver, LinearSolverError};
pub use objective::{ObjectiveFunction, ObjectiveFunctionResult};
pub use parameters::{
    CurativeStopCriterion, ObjectiveFunctionKind, PreventiveStopCriterion, RaUsageLimits,
    RaoParameters, SearchTreeParameters, StopCriterion, TreeParameters,
};
pub use perimeter::Perimeter;
pub use rao::{OptimizationOutcome, Rao};
pub use report::{JsonSink, PerimeterReport, ResultSink, TracingSink};
pub use search_tree::{PerimeterStatus, SearchTree, SearchTreeResult};
pub use sensitivity::{
    ComputationStatus, LinearFlowModel, SensitivityError, SensitivityProvider, SensitivityResult,
};
pub use state_tree::{PerimeterStates, StateTree};
