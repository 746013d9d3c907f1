use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::{AdminState, require_admin, types::ChangePasswordRequest};
use crate::{
    api::handlers::{ErrorBody, StatusBody, error_response, json_payload},
    store::ADMIN_PASSWORD_KEY,
};

#[utoipa::path(
    post,
    path = "/admin/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = StatusBody),
        (status = 400, description = "Invalid request body or empty new password", body = ErrorBody),
        (status = 401, description = "No admin session or incorrect old password", body = ErrorBody),
        (status = 500, description = "Settings store failure", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn change_password(
    headers: HeaderMap,
    Extension(admin): Extension<Arc<AdminState>>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&headers, &admin).await {
        return response;
    }
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let current = match admin.settings().get_setting(ADMIN_PASSWORD_KEY).await {
        Ok(password) => password,
        Err(err) => {
            error!("Failed to read admin password: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if request.old_password != current {
        return error_response(StatusCode::UNAUTHORIZED, "Incorrect old password");
    }
    if request.new_password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "New password cannot be empty");
    }

    if let Err(err) = admin
        .settings()
        .set_setting(ADMIN_PASSWORD_KEY, &request.new_password)
        .await
    {
        error!("Failed to store admin password: {err}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    }

    info!("Admin password changed");
    (StatusCode::OK, Json(StatusBody::success())).into_response()
}
