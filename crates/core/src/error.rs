#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation was deliberately aborted by a cancellation request.
    /// Distinct from [`CoreError::Processing`]; not logged at error level.
    #[error("Job was cancelled")]
    Cancelled,

    /// The underlying long-running operation failed, tagged with the
    /// pipeline step at which it failed.
    #[error("Processing failed at step '{step}': {message}")]
    Processing { step: String, message: String },

    /// The operation ran out of memory or another hard resource limit.
    /// `remediation` carries an actionable hint for the user.
    #[error("{message} ({remediation})")]
    ResourceExhausted { message: String, remediation: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`CoreError::Processing`] error.
    pub fn processing(step: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Processing {
            step: step.into(),
            message: message.into(),
        }
    }
}
