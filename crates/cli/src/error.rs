use engine_config::error::ConfigError;
use engine_runtime::error::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Loader run failed: {0}")]
    Runner(#[from] RuntimeError),
}
