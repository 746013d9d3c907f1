//! Admin login sessions.
//!
//! A session is a random token held in memory with a fixed lifetime. The cookie carries
//! the token; nothing about the session is persisted, so a restart logs everyone out.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use rand::{RngCore, rngs::OsRng};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{error, info};

use super::{
    AdminState,
    types::{LoginRequest, LogoutResponse},
};
use crate::{
    api::handlers::{ErrorBody, StatusBody, error_response, json_payload},
    store::{ADMIN_PASSWORD_KEY, StoreError},
};

pub const SESSION_COOKIE_NAME: &str = "voucher-admin-session";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct AdminSessions {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Instant>>,
}

impl Default for AdminSessions {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl AdminSessions {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session and return its token.
    ///
    /// # Errors
    /// Returns the RNG error if no token can be generated.
    pub async fn create(&self) -> Result<String, rand::Error> {
        let mut bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut bytes)?;
        let token = hex::encode(bytes);

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, created_at| created_at.elapsed() < self.ttl);
        sessions.insert(token.clone(), Instant::now());
        Ok(token)
    }

    pub async fn is_active(&self, token: &str) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .get(token)
            .is_some_and(|created_at| created_at.elapsed() < self.ttl)
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.lock().await.remove(token);
    }
}

/// Build the `HttpOnly` session cookie for `token`.
pub(crate) fn session_cookie(
    token: &str,
    ttl: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = ttl.as_secs();
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    ))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "voucher-admin-session=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
    )
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = StatusBody),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Settings store failure", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn login(
    Extension(admin): Extension<Arc<AdminState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let current = match admin.settings().get_setting(ADMIN_PASSWORD_KEY).await {
        Ok(password) => password,
        Err(StoreError::NotFound) => {
            error!("Admin password is not initialized");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
        Err(err) => {
            error!("Failed to read admin password: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if request.password != current {
        info!("Admin login rejected");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    let token = match admin.sessions().create().await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate session token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let mut headers = HeaderMap::new();
    match session_cookie(&token, admin.sessions().ttl()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }

    info!("Admin logged in");
    (StatusCode::OK, headers, Json(StatusBody::success())).into_response()
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses(
        (status = 200, description = "Session cleared", body = LogoutResponse)
    ),
    tag = "admin"
)]
pub async fn logout(headers: HeaderMap, Extension(admin): Extension<Arc<AdminState>>) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        admin.sessions().revoke(&token).await;
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear_session_cookie());
    (
        StatusCode::OK,
        response_headers,
        Json(LogoutResponse {
            status: "success".to_string(),
            message: "Logged out successfully".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sessions_expire_after_ttl() -> Result<(), rand::Error> {
        let sessions = AdminSessions::new(Duration::from_secs(600));
        let token = sessions.create().await?;
        assert_eq!(token.len(), 64);
        assert!(sessions.is_active(&token).await);

        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(!sessions.is_active(&token).await);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_session_is_inactive() -> Result<(), rand::Error> {
        let sessions = AdminSessions::default();
        let token = sessions.create().await?;
        let other = sessions.create().await?;
        assert_ne!(token, other);

        sessions.revoke(&token).await;
        assert!(!sessions.is_active(&token).await);
        assert!(sessions.is_active(&other).await);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_inactive() {
        let sessions = AdminSessions::default();
        assert!(!sessions.is_active("admin-is-logged-in").await);
    }

    #[test]
    fn extract_session_token_reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; voucher-admin-session=abc123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn extract_session_token_ignores_empty_or_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("voucher-admin-session="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_is_strict_and_http_only() -> Result<(), InvalidHeaderValue> {
        let cookie = session_cookie("tok", Duration::from_secs(600))?;
        let value = cookie.to_str().unwrap_or_default();
        assert!(value.starts_with("voucher-admin-session=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Max-Age=600"));
        Ok(())
    }
}
