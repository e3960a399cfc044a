use crate::types::Role;
use crate::workflow::Stage;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("role {role:?} is not authorized to act at stage {stage:?}")]
    PermissionDenied { stage: Stage, role: Role },
    #[error("action is not legal for the current state: {0}")]
    InvalidState(String),
    #[error("validation failed for `{field}`: {detail}")]
    Validation {
        field: &'static str,
        detail: String,
    },
    #[error("blocking pre-checks failed: {0:?}")]
    ChecksFailed(Vec<String>),
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("record was modified concurrently; reload and retry")]
    Conflict,
    #[error("{context} failed: {detail}")]
    Dependency {
        context: &'static str,
        detail: String,
    },
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("codec error: {0}")]
    Codec(String),
}

impl EngineError {
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }

    /// A Policy Evaluator, Document Service or Domain Effect Applier error.
    /// The record is left unchanged when this is returned mid-execute, so
    /// the caller may retry safely.
    pub fn dependency(context: &'static str, err: anyhow::Error) -> Self {
        Self::Dependency {
            context,
            detail: format!("{err:#}"),
        }
    }
}

/// Validate a free-form reason/note field. Executor rejections and every
/// cancellation require a trimmed reason of at least five characters.
pub fn require_reason(field: &'static str, reason: Option<&str>) -> Result<String, EngineError> {
    let trimmed = reason.unwrap_or_default().trim();
    // characters, not bytes: reasons arrive in whatever script the caller
    // writes in
    let chars = trimmed.chars().count();
    if chars < 5 {
        return Err(EngineError::Validation {
            field,
            detail: format!("a reason of at least 5 characters is required, got {chars}"),
        });
    }
    Ok(trimmed.to_string())
}
