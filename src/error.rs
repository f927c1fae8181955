use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::render::{ProviderError, RenderError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Resource Unavailable: {0}")]
    ResourceUnavailable(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Render Failed: {message}")]
    RenderFailed { message: String, handle_dead: bool },

    #[error("Timed out after {0:?} waiting for a permit")]
    Timeout(Duration),

    #[error("Pool is closed!")]
    Closed,

    #[error("Close Failed: {0}")]
    CloseFailed(String),

    #[error("Executable Not Found: {0}")]
    NotFound(String),

    #[error("Provider Error: {0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    pub fn unavailable(err: BoxError) -> Self {
        Self::ResourceUnavailable(Arc::from(err))
    }

    pub fn render_failed(message: impl Into<String>) -> Self {
        Self::RenderFailed {
            message: message.into(),
            handle_dead: false,
        }
    }

    /// `true` when the failure means the shared handle must not be reused.
    pub fn is_handle_dead(&self) -> bool {
        matches!(
            self,
            Self::RenderFailed {
                handle_dead: true,
                ..
            }
        )
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Self::RenderFailed {
            message: err.message,
            handle_dead: err.handle_dead,
        }
    }
}
