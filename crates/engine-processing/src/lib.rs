pub mod config;
pub mod consumer;
pub mod error;
pub mod loader;
pub mod producer;

pub use loader::Loader;
