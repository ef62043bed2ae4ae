use thiserror::Error;

use crate::plan::ActionId;

#[derive(Debug, Error)]
pub enum BringupError {
    #[error("failed to spawn process '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for process '{name}': {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process action {0} was already executed in this run")]
    AlreadyExecuted(ActionId),

    #[error("executor task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, BringupError>;
