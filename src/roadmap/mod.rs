//! The roadmap tree: materialization from generator output and derived
//! completion.

mod build;
mod tree;

pub use build::*;
pub use tree::*;
