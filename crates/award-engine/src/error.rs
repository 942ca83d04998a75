use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::procurement::{ProcurementServiceError, ScoreSheetError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    ScoreSheet(ScoreSheetError),
    Scenario(serde_json::Error),
    Procurement(ProcurementServiceError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::ScoreSheet(err) => write!(f, "score sheet error: {}", err),
            AppError::Scenario(err) => write!(f, "invalid requisition scenario: {}", err),
            AppError::Procurement(err) => write!(f, "procurement error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::ScoreSheet(err) => Some(err),
            AppError::Scenario(err) => Some(err),
            AppError::Procurement(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::ScoreSheet(_) | AppError::Scenario(_) => StatusCode::BAD_REQUEST,
            AppError::Procurement(ProcurementServiceError::Transition(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Procurement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ScoreSheetError> for AppError {
    fn from(value: ScoreSheetError) -> Self {
        Self::ScoreSheet(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Scenario(value)
    }
}

impl From<ProcurementServiceError> for AppError {
    fn from(value: ProcurementServiceError) -> Self {
        Self::Procurement(value)
    }
}
