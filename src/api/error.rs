use actix_web::{HttpResponse, error::ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::error::MinerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("mining job {0} was abandoned")]
    MiningAborted(String),

    #[error(transparent)]
    Miner(#[from] MinerError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MiningAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Miner(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
