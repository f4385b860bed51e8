// src/core/mod.rs — Quality gate core

pub mod autofix;
pub mod cost;
pub mod gate;
pub mod orchestrator;
pub mod safety;
pub mod sampling;
pub mod scoring;
pub mod state;
pub mod types;
