//! API handlers and shared response helpers.

pub mod admin;
pub mod health;
pub mod portal;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::voucher::VoucherError;

/// JSON error body shared by all JSON endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

/// Plain `{"status": "success"}` acknowledgement.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Unwrap a JSON request body; a missing or malformed body becomes a 400 `ErrorBody`.
pub(crate) fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!("Rejected request body: {rejection}");
        error_response(StatusCode::BAD_REQUEST, "Invalid request body")
    })
}

/// Map a voucher operation failure to its HTTP status and client message.
///
/// Store failures are logged here and reported without detail.
pub(crate) fn voucher_error_response(err: &VoucherError) -> Response {
    match err {
        VoucherError::Denied(reason) => error_response(StatusCode::UNAUTHORIZED, reason.to_string()),
        VoucherError::InvalidInput(message) => error_response(StatusCode::BAD_REQUEST, *message),
        VoucherError::DuplicateCode(_) => {
            error_response(StatusCode::CONFLICT, "Voucher code already exists")
        }
        VoucherError::NotFound => error_response(StatusCode::NOT_FOUND, "Voucher not found"),
        VoucherError::RandomnessFailure(source) => {
            error!("Failed to generate voucher code: {source}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not generate voucher code",
            )
        }
        VoucherError::Store(source) => {
            error!("Voucher store failure: {source}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
