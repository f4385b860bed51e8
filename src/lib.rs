// src/lib.rs — Library root for lessongate

pub mod cli;
pub mod core;
pub mod evaluator;
pub mod infra;
pub mod provider;
pub mod store;
pub mod util;
