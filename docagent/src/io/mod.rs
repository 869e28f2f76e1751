//! Side-effecting collaborators of the documentation task.

pub mod config;
pub mod document;
pub mod interaction;
pub mod manifest;
pub mod mcp;
pub mod model;
pub mod prompt;
pub mod render;
pub mod sandbox;
pub mod status;
pub mod url_probe;
