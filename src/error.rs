//! Central error handling for the emberray scheduler
//!
//! Provides a unified RenderError enum with consistent categorization
//! across scene building, spatial-index construction, and scheduling.

/// Centralized error type for all scheduler operations
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Caller contract violation (malformed input); never recovered internally
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A second build/worker task was started while one is outstanding
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Operation on a resource after dispose()
    #[error("{0} used after dispose")]
    Disposed(&'static str),

    /// Spatial index construction failure
    #[error("Build error: {0}")]
    Build(String),

    /// Render target allocation or resize failure
    #[error("Target error: {0}")]
    Target(String),
}

impl RenderError {
    /// Convenience constructors for common error types
    pub fn precondition<T: ToString>(msg: T) -> Self {
        RenderError::Precondition(msg.to_string())
    }

    pub fn build<T: ToString>(msg: T) -> Self {
        RenderError::Build(msg.to_string())
    }

    pub fn target<T: ToString>(msg: T) -> Self {
        RenderError::Target(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
