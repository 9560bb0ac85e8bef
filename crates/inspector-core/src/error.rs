use thiserror::Error;

use crate::config::ConfigError;
use crate::executor::ExecutorError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
