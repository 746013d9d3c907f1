//! Client-facing voucher endpoints.
//!
//! Flow Overview:
//! 1) Direct mode: the splash page calls `/auth`, which claims the voucher and returns the
//!    granted minutes for the gateway to apply.
//! 2) BinAuth mode: the splash page calls `/binauth-stage`, then the gateway's BinAuth
//!    script polls `/binauth-check` with the client MAC and receives the granted seconds
//!    as plain text, at most once.

use axum::{
    Json,
    extract::{Extension, Query, rejection::QueryRejection},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use super::{ErrorBody, error_response, voucher_error_response};
use crate::voucher::VoucherEngine;

/// Query string sent by the splash page.
#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct VoucherArgs {
    /// Voucher code typed by the client
    #[serde(default)]
    pub voucher: String,
    /// Client IP address as seen by the gateway
    #[serde(default)]
    pub ip: String,
    /// Client MAC address as seen by the gateway
    #[serde(default)]
    pub mac: String,
}

/// Query string sent by the BinAuth script.
#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct MacArgs {
    /// Client MAC address
    #[serde(default)]
    pub mac: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AuthResponse {
    pub status: String,
    /// Granted access in minutes; `0` means no cap.
    pub duration: i64,
}

impl AuthResponse {
    fn success(duration: i64) -> Self {
        Self {
            status: "success".to_string(),
            duration,
        }
    }
}

fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    match query {
        Ok(Query(args)) => Ok(args),
        Err(err) => {
            debug!("Failed to parse query parameters: {err}");
            Err(error_response(StatusCode::BAD_REQUEST, "Invalid query string"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth",
    params(VoucherArgs),
    responses(
        (status = 200, description = "Voucher accepted", body = AuthResponse),
        (status = 401, description = "Voucher refused", body = ErrorBody),
        (status = 500, description = "Voucher store failure", body = ErrorBody)
    ),
    tag = "portal"
)]
pub async fn auth(
    Extension(engine): Extension<Arc<VoucherEngine>>,
    query: Result<Query<VoucherArgs>, QueryRejection>,
) -> Response {
    let args = match parse_query(query) {
        Ok(args) => args,
        Err(response) => return response,
    };

    match engine.authorize(&args.voucher, &args.ip, &args.mac).await {
        Ok(grant) => {
            info!(
                code = %args.voucher,
                mac = %args.mac,
                duration = grant.duration_minutes,
                "client authorized"
            );
            (StatusCode::OK, Json(AuthResponse::success(grant.duration_minutes))).into_response()
        }
        Err(err) => voucher_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/binauth-stage",
    params(VoucherArgs),
    responses(
        (status = 200, description = "Voucher accepted and staged for the BinAuth check", body = AuthResponse),
        (status = 400, description = "Missing client MAC", body = ErrorBody),
        (status = 401, description = "Voucher refused", body = ErrorBody),
        (status = 500, description = "Voucher store failure", body = ErrorBody)
    ),
    tag = "portal"
)]
pub async fn binauth_stage(
    Extension(engine): Extension<Arc<VoucherEngine>>,
    query: Result<Query<VoucherArgs>, QueryRejection>,
) -> Response {
    let args = match parse_query(query) {
        Ok(args) => args,
        Err(response) => return response,
    };

    match engine.stage(&args.voucher, &args.ip, &args.mac).await {
        Ok(duration) => {
            (StatusCode::OK, Json(AuthResponse::success(duration))).into_response()
        }
        Err(err) => voucher_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/binauth-check",
    params(MacArgs),
    responses(
        (status = 200, description = "Granted seconds", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing MAC address", body = String, content_type = "text/plain"),
        (status = 401, description = "Nothing staged for this MAC", body = String, content_type = "text/plain")
    ),
    tag = "portal"
)]
pub async fn binauth_check(
    Extension(engine): Extension<Arc<VoucherEngine>>,
    query: Result<Query<MacArgs>, QueryRejection>,
) -> Response {
    // The BinAuth script reads plain text, so errors are plain text too.
    let mac = match query {
        Ok(Query(args)) if !args.mac.is_empty() => args.mac,
        _ => return (StatusCode::BAD_REQUEST, "MAC address required").into_response(),
    };

    match engine.check(&mac).await {
        Ok(seconds) => {
            info!(mac = %mac, seconds, "staged authentication consumed");
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain")],
                seconds.to_string(),
            )
                .into_response()
        }
        Err(_) => (StatusCode::UNAUTHORIZED, "Not authorized").into_response(),
    }
}
