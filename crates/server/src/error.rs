use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pdfgate::{Error, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Gate(#[from] Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Gate(Error::Timeout(_)) | ApiError::Gate(Error::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Gate(Error::Provider(ProviderError::NotFound(_))) => StatusCode::NOT_FOUND,
            ApiError::Gate(Error::Provider(ProviderError::Unavailable(_))) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Gate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::Gate(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("failed to generate PDF: {}", self);
        } else {
            log::info!("rejected PDF request: {}", self);
        }

        (status, format!("Erro ao gerar PDF: {}", self)).into_response()
    }
}
