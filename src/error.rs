use thiserror::Error;

/// Error taxonomy for the recommendation and learning-path engine.
///
/// `NotFound` and `Validation` surface to the caller untouched. Generators
/// treat `Upstream` as degradable (empty result set), while the orchestrator
/// user lookup and final persistence propagate it as fatal. `CircuitOpen` is
/// distinct so callers can apply their own fallback instead of retrying.
/// `Clone` lets deduplicated callers share one failed generation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("circuit open for operation '{0}'")]
    CircuitOpen(String),

    #[error("operation '{0}' timed out after {1}ms")]
    Timeout(String, u64),

    #[error("cache error: {0}")]
    Cache(String),
}

impl EngineError {
    pub fn user_not_found(user_id: uuid::Uuid) -> Self {
        Self::NotFound(format!("User {} not found", user_id))
    }

    pub fn course_not_found(course_id: uuid::Uuid) -> Self {
        Self::NotFound(format!("Course {} not found", course_id))
    }

    pub fn path_not_found(path_id: uuid::Uuid) -> Self {
        Self::NotFound(format!("Learning path {} not found", path_id))
    }

    pub fn step_not_found(step_id: uuid::Uuid) -> Self {
        Self::NotFound(format!("Step {} not found in learning path", step_id))
    }

    pub fn recommendation_not_found(id: uuid::Uuid) -> Self {
        Self::NotFound(format!("Recommendation {} not found", id))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Cache(format!("serialization: {}", e))
    }
}
