use thiserror::Error;

/// Caller input that violates a local invariant. Raised before any cache write or network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("translation key must not be empty")]
    EmptyKey,
    #[error("category must not be empty")]
    EmptyCategory,
    #[error("at least one translation value is required")]
    MissingTranslation,
    #[error("project name must not be empty")]
    EmptyProjectName,
    #[error("language code must not be empty")]
    EmptyLanguageCode,
    #[error("cannot remove default language '{code}' from project {project_id}")]
    DefaultLanguageRemoval { project_id: String, code: String },
    #[error("supported languages of project {project_id} must include default language '{code}'")]
    DefaultLanguageDropped { project_id: String, code: String },
}

/// Failure reported by a remote store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("mutation task aborted: {0}")]
    Aborted(String),
}

impl MutationError {
    /// Whether the mutation reached the optimistic phase and was restored afterwards.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, MutationError::Store(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MutationError::Store(StoreError::NotFound(_)))
    }
}
