//! Domain models for Roadmapper.
//!
//! # Core Concepts
//!
//! - [`Project`]: a user's idea, optionally linked to a repository for evidence.
//! - [`RefinementSession`]: clarifying questions and answers; must close before
//!   a roadmap can be generated.
//! - [`Module`] / [`Task`]: the roadmap tree. Modules nest; tasks are leaves with
//!   monotonic completion. Module and roadmap completion are always derived.
//! - [`ProgressReport`]: result of checking a task against commit evidence.
//!
//! Types prefixed `Generated` are collaborator output before ids are assigned.

mod progress;
mod project;
mod refinement;
mod roadmap;

pub use progress::*;
pub use project::*;
pub use refinement::*;
pub use roadmap::*;
