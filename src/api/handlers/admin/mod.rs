//! Admin endpoints.
//!
//! Everything except login and logout requires a live session cookie; requests without
//! one get `401 {"error": "Unauthorized"}` before any other work happens.

pub(crate) mod password;
pub(crate) mod session;
pub(crate) mod types;
pub(crate) mod vouchers;

pub use session::{AdminSessions, DEFAULT_SESSION_TTL, SESSION_COOKIE_NAME};

use axum::{http::HeaderMap, http::StatusCode, response::Response};
use std::sync::Arc;

use super::error_response;
use crate::store::SettingsStore;

pub struct AdminState {
    settings: Arc<dyn SettingsStore>,
    sessions: AdminSessions,
}

impl AdminState {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsStore>, sessions: AdminSessions) -> Self {
        Self { settings, sessions }
    }

    #[must_use]
    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &AdminSessions {
        &self.sessions
    }
}

/// Reject the request unless it carries a live admin session cookie.
pub(crate) async fn require_admin(headers: &HeaderMap, admin: &AdminState) -> Result<(), Response> {
    match session::extract_session_token(headers) {
        Some(token) if admin.sessions().is_active(&token).await => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized")),
    }
}
