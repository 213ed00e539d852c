pub mod coldswap;
pub mod connectors;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod schema;
pub mod state;
