//! Roadmapper: turns a project idea into a refined, trackable learning
//! roadmap of nested modules and tasks.
//!
//! The [`service::RoadmapService`] owns the lifecycle: a project is refined
//! through a question/answer session, a roadmap is generated once from the
//! answers, and tasks are completed by hand or automatically from commit
//! evidence. Module and roadmap completion is always derived from tasks.

pub mod api;
pub mod caller;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod models;
pub mod progress;
pub mod refinement;
pub mod render;
pub mod roadmap;
pub mod service;
