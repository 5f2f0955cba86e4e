use thiserror::Error;

/// Errors returned by graph mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("question '{0}' not found")]
    QuestionNotFound(String),

    #[error("node '{0}' cannot be connected to itself")]
    SelfLoop(String),

    #[error("no '{0}' ids left to allocate")]
    IdsExhausted(String),
}

impl GraphError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::NodeNotFound(_)
                | GraphError::ConnectionNotFound(_)
                | GraphError::QuestionNotFound(_)
        )
    }
}

/// Errors raised while importing diagram data. A failed import never touches the live model.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to parse flowchart JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported flowchart payload: {0}")]
    Structure(String),
}
