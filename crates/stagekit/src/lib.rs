//! # Stagekit
//!
//! Building blocks for turning application source into a deployable release.
//!
//! A release is an **artifact set** with fixed file names: the backend
//! executable, its config file, a secret env file and the runtime database,
//! staged together into a flat deployment directory, plus a separately-built
//! static frontend tree. Stagekit owns the whole pipeline up to the point
//! where a host activator takes over:
//!
//! - [`backend::BackendBuild`] — compile the backend into a self-contained
//!   executable
//! - [`frontend::FrontendBuild`] — run the bundler and strip source maps
//!   from the public output tree
//! - [`template`] — field-level config rewriting (value substitution by key,
//!   all other lines untouched)
//! - [`stage::Stager`] — stage artifacts with an enforced permission
//!   contract and an atomic all-or-nothing finalize
//!
//! The deployment directory is never patched incrementally: staging happens
//! in a sibling work directory and the final rename replaces the previous
//! release wholesale, so the directory's presence implies a complete set.

pub mod backend;
pub mod error;
pub mod frontend;
pub mod stage;
pub mod template;

pub use backend::BackendBuild;
pub use error::{Error, Result};
pub use frontend::{FrontendBuild, purge_source_maps};
pub use stage::{ArtifactKind, Layout, Stager};
