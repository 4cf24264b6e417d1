//! Error taxonomy → HTTP mapping: every non-2xx response carries `{detail: <string>}`.
//! One `From` impl per boundary error type this crate actually surfaces, converging on a
//! single `IntoResponse` implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, axum::Json(ErrorBody { detail })).into_response()
    }
}

impl From<okcvm_workspace::WorkspaceError> for ApiError {
    fn from(err: okcvm_workspace::WorkspaceError) -> Self {
        use okcvm_workspace::WorkspaceError as W;
        match err {
            W::EmptyPath | W::Escape(_) => ApiError::BadRequest(err.to_string()),
            W::UnknownSnapshot(_) | W::UnknownBranch(_) => ApiError::NotFound(err.to_string()),
            W::Io(_) | W::Backend(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<okcvm_deploy::DeployError> for ApiError {
    fn from(err: okcvm_deploy::DeployError) -> Self {
        use okcvm_deploy::DeployError as D;
        match err {
            D::NotFound(_) => ApiError::NotFound(err.to_string()),
            D::SourceNotFound(_)
            | D::NoEntryFile
            | D::AmbiguousEntryFile
            | D::TargetExists(_)
            | D::PathEscape(_) => ApiError::BadRequest(err.to_string()),
            D::IdSpaceExhausted | D::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<okcvm_conversation::StoreError> for ApiError {
    fn from(err: okcvm_conversation::StoreError) -> Self {
        use okcvm_conversation::StoreError as S;
        match err {
            S::NotFound(_) => ApiError::NotFound(err.to_string()),
            S::ClientMismatch(_) | S::InvalidPayload => ApiError::BadRequest(err.to_string()),
            S::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<okcvm_core::SessionError> for ApiError {
    fn from(err: okcvm_core::SessionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
