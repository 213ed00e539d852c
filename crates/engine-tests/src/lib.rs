//! Test doubles for the loader's capabilities and the scenario tests that
//! drive the whole pipeline through them.

pub mod mocks;
pub mod utils;

mod file_pipeline;
