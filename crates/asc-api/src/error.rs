//! HTTP error mapping: user/input errors surface as 400 with a
//! machine-readable `errors[]`, store/cloud/lock failures as 500. No
//! handler mutates state after returning an error for that mutation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::model::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed")]
    Validation(Vec<String>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<asc_common::AutoscalerError> for ApiError {
    fn from(e: asc_common::AutoscalerError) -> Self {
        match e {
            asc_common::AutoscalerError::GroupNotFound(name) => ApiError::NotFound(format!("group not found: {name}")),
            asc_common::AutoscalerError::InvalidGroup(msg) => ApiError::Validation(vec![msg]),
            asc_common::AutoscalerError::GroupHasActiveInstances(name) => {
                ApiError::Conflict(format!("group {name} has active instances"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<asc_cloud::CloudError> for ApiError {
    fn from(e: asc_cloud::CloudError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<asc_lock::LockError> for ApiError {
    fn from(e: asc_lock::LockError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errors) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, vec![msg]),
            ApiError::Validation(errors) => (StatusCode::BAD_REQUEST, errors),
            ApiError::Conflict(msg) => (StatusCode::BAD_REQUEST, vec![msg]),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, vec![msg]),
        };
        (status, Json(ErrorResponse { errors })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
