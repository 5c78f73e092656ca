use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request or out-of-range amount.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Insufficient funds, insufficient holdings, reward cooldown.
    #[error("{0}")]
    BusinessRule(String),

    /// Generation API unreachable, malformed or unauthenticated.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Store unreachable or transaction failure.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl AppError {
    pub fn insufficient_funds(needed: f64, available: f64) -> Self {
        AppError::BusinessRule(format!(
            "Insufficient funds: need {:.0}, have {:.0}",
            needed, available
        ))
    }

    pub fn insufficient_holdings(needed: u64, available: u64) -> Self {
        AppError::BusinessRule(format!(
            "Insufficient holdings: need {}, have {}",
            needed, available
        ))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BusinessRule(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BusinessRule(_) => "BUSINESS_RULE",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE",
            AppError::Persistence(_) => "PERSISTENCE",
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Persistence(format!("corrupt record: {}", e))
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(e: axum::extract::rejection::JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "msg": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
