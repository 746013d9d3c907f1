//! Voucher management endpoints.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{AdminState, require_admin, types::DeleteVoucherRequest};
use crate::{
    api::handlers::{ErrorBody, StatusBody, json_payload, voucher_error_response},
    voucher::{NewVoucher, Voucher, VoucherEngine},
};

#[utoipa::path(
    post,
    path = "/admin/add",
    request_body = NewVoucher,
    responses(
        (status = 200, description = "Voucher created", body = Voucher),
        (status = 400, description = "Invalid request body or negative duration", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 409, description = "Voucher code already exists", body = ErrorBody),
        (status = 500, description = "Code generation or store failure", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn add(
    headers: HeaderMap,
    Extension(admin): Extension<Arc<AdminState>>,
    Extension(engine): Extension<Arc<VoucherEngine>>,
    payload: Result<Json<NewVoucher>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&headers, &admin).await {
        return response;
    }
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match engine.add_voucher(request).await {
        Ok(voucher) => (StatusCode::OK, Json(voucher)).into_response(),
        Err(err) => voucher_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/admin/delete",
    request_body = DeleteVoucherRequest,
    responses(
        (status = 200, description = "Voucher deleted", body = StatusBody),
        (status = 400, description = "Invalid voucher id", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 404, description = "Voucher not found", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn delete(
    headers: HeaderMap,
    Extension(admin): Extension<Arc<AdminState>>,
    Extension(engine): Extension<Arc<VoucherEngine>>,
    payload: Result<Json<DeleteVoucherRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&headers, &admin).await {
        return response;
    }
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match engine.delete_voucher(request.id).await {
        Ok(()) => (StatusCode::OK, Json(StatusBody::success())).into_response(),
        Err(err) => voucher_error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/admin/vouchers",
    responses(
        (status = 200, description = "All vouchers, newest first", body = [Voucher]),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn list(
    headers: HeaderMap,
    Extension(admin): Extension<Arc<AdminState>>,
    Extension(engine): Extension<Arc<VoucherEngine>>,
) -> Response {
    if let Err(response) = require_admin(&headers, &admin).await {
        return response;
    }

    match engine.list_vouchers().await {
        Ok(vouchers) => (StatusCode::OK, Json(vouchers)).into_response(),
        Err(err) => voucher_error_response(&err),
    }
}
