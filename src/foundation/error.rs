/// Convenience result type used across vatbake.
pub type VatResult<T> = Result<T, VatError>;

/// Top-level error taxonomy used by baking APIs.
#[derive(thiserror::Error, Debug)]
pub enum VatError {
    /// Invalid counts, layouts, or caller-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A required collaborator (evaluator, clip) is missing or unusable.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Resources used in the wrong lifecycle state (before acquire, after release, ...).
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// The execution surface rejected or failed a dispatch, allocation or read-back.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Errors when serializing or deserializing configuration.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VatError {
    /// Build a [`VatError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VatError::Precondition`] value.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Build a [`VatError::Lifecycle`] value.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Build a [`VatError::Dispatch`] value.
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Build a [`VatError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
