//! Convergence engine for capstan
//!
//! The engine orchestrates:
//! 1. Planning - Build the ordered resource sequence from the manifest
//! 2. Diffing - Compute current vs desired state
//! 3. Executing - Apply the sequence in order, halting on the first failure

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, ProvisionError, execute};
pub use planner::{ExecutionPlan, PostAction, build_plan};
