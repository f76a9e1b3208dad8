//! API error type and its JSON rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;
use crate::scheduler::SchedulerError;
use crate::tsdb::query::QueryError;
use crate::tsdb::TsdbError;

/// `{status, message}` body used by registration and every error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
    pub message: String,
}

impl StatusBody {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("failed to store target: {0}")]
    Registry(#[from] DbError),
    #[error("failed to start monitoring: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Window(#[from] QueryError),
    #[error("error fetching data in TSDB: {0}")]
    Query(#[from] TsdbError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Window(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidTarget(_)
            | ApiError::Registry(_)
            | ApiError::Scheduler(_)
            | ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(StatusBody::error(self.to_string()))).into_response()
    }
}
