// src/config/mod.rs

//! Plan files for the `reconcile-flow` binary.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate references, durations and acyclicity (`validate.rs`).
//! - Turn a validated plan into a [`Graph`](crate::dag::Graph) (`plan.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod plan;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{DefaultsSection, FlowSection, PlanFile, RawPlanFile, TaskConfig};
pub use plan::build_graph;
