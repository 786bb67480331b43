use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Extension,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{non_blank, AppState};
use crate::auth::{create_admin_session, session_cookie, verify_password, ADMIN_COOKIE, ADMIN_SESSION_HOURS};
use crate::error::{ApiJson, ApiResponse, AppError};
use crate::models::{AdminClaims, AdminRole, PublicAdmin};

#[derive(Deserialize)]
pub struct AdminLogin {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<AdminLogin>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (non_blank(payload.email), payload.password) else {
        return Err(AppError::validation("Email and password are required"));
    };

    let admin = state
        .storage
        .find_admin_by_email(&email)?
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;
    if !verify_password(&password, &admin.password_hash)? {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let token = create_admin_session(&admin, &state.config.session_secret)?;
    let cookie = session_cookie(
        ADMIN_COOKIE,
        &token,
        ADMIN_SESSION_HOURS * 3600,
        state.config.production,
    );
    info!(admin = %admin.email, "admin logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok("Login successful", PublicAdmin::from(&admin)),
    ))
}

pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = session_cookie(ADMIN_COOKIE, "", 0, state.config.production);
    ([(header::SET_COOKIE, cookie)], ApiResponse::message("Logged out successfully"))
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub id: String,
    pub name: String,
    pub role: AdminRole,
    pub department: Option<String>,
}

pub async fn health(Extension(claims): Extension<AdminClaims>) -> ApiResponse<SessionInfo> {
    ApiResponse::ok(
        "Admin session active",
        SessionInfo {
            authenticated: true,
            id: claims.sub,
            name: claims.name,
            role: claims.role,
            department: claims.department,
        },
    )
}
