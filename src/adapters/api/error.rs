//! API Errors - Engine Errors to HTTP Responses
//!
//! Status mapping:
//! - 400 malformed input
//! - 401 missing or unknown credential, 403 ineligible or unauthorized
//! - 404 unknown market or wallet
//! - 409 stale client view or illegal lifecycle move
//! - 422 business-rule rejection (balance, shares, liquidity, sizing)
//! - 500 numeric faults, 503 store unavailable or contended

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::types::ErrorBody;
use crate::domain::error::{EngineError, StoreError};

/// Error returned by every API handler.
#[derive(Debug)]
pub enum ApiError {
    /// No usable bearer credential.
    Unauthorized(String),
    /// Request body or query could not be decoded.
    BadRequest(String),
    /// Rejection raised by the engine.
    Engine(EngineError),
    /// Failure outside the engine (metrics rendering).
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(e) => engine_status(e),
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, message, stale) = match self {
            Self::Unauthorized(m) => ("unauthorized", m.clone(), false),
            Self::BadRequest(m) => ("bad_request", m.clone(), false),
            Self::Internal(m) => ("internal", m.clone(), false),
            Self::Engine(e) => (e.kind(), e.to_string(), e.is_stale_state()),
        };
        ErrorBody {
            error: error.to_string(),
            message,
            stale,
        }
    }
}

fn engine_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        EngineError::NotEligible(_) | EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::MarketNotTradeable { .. }
        | EngineError::ScopeMismatch { .. }
        | EngineError::InvalidTransition { .. }
        | EngineError::AlreadyTerminal { .. } => StatusCode::CONFLICT,
        EngineError::ConvergenceFailure { .. }
        | EngineError::InsufficientBalance { .. }
        | EngineError::InsufficientShares { .. }
        | EngineError::LiquidityExceeded { .. }
        | EngineError::UnsafeSellBounds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NumericFault(_) | EngineError::Store(StoreError::BatchTooLarge { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        EngineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
