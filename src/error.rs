pub type VisageResult<T> = Result<T, VisageError>;

#[derive(thiserror::Error, Debug)]
pub enum VisageError {
    #[error("precondition error: {0}")]
    Precondition(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("provision error: {0}")]
    Provision(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VisageError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }
}
