//! Session and token guards, installed as route layers.
//!
//! A guard validates the caller, then inserts its claims into the request
//! extensions where handlers pick them up with `Extension<_>`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::AppState;
use crate::auth::{
    cookie_value, validate_admin_session, validate_user_token, ADMIN_COOKIE, USER_COOKIE,
};
use crate::error::AppError;
use crate::models::{AdminClaims, AdminRole, UserClaims};

/// The authenticated caller of a route open to admins and users alike.
#[derive(Debug, Clone)]
pub enum Principal {
    Admin(AdminClaims),
    User(UserClaims),
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| cookie_value(value, name))
        .map(str::to_string)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Admin claims from a valid `sid` cookie whose admin still exists.
fn admin_claims(state: &AppState, headers: &HeaderMap) -> Result<Option<AdminClaims>, AppError> {
    let Some(token) = cookie(headers, ADMIN_COOKIE) else {
        return Ok(None);
    };
    let claims = match validate_admin_session(&token, &state.config.session_secret) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("rejected admin session: {e}");
            return Ok(None);
        }
    };
    Ok(state.storage.get_admin(&claims.sub)?.map(|_| claims))
}

/// User claims from the `token` cookie, or else a Bearer header.
fn user_claims(state: &AppState, headers: &HeaderMap) -> Option<UserClaims> {
    let token = cookie(headers, USER_COOKIE).or_else(|| bearer(headers))?;
    match validate_user_token(&token, &state.config.jwt_secret) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!("rejected user token: {e}");
            None
        }
    }
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = admin_claims(&state, req.headers())?
        .ok_or_else(|| AppError::unauthorized("Admin login required"))?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_superadmin(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = admin_claims(&state, req.headers())?
        .ok_or_else(|| AppError::unauthorized("Admin login required"))?;
    if claims.role != AdminRole::Superadmin {
        return Err(AppError::forbidden("Superadmin access required"));
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = user_claims(&state, req.headers())
        .ok_or_else(|| AppError::unauthorized("Not authorized. Login again"))?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let principal = match admin_claims(&state, req.headers())? {
        Some(admin) => Principal::Admin(admin),
        None => user_claims(&state, req.headers())
            .map(Principal::User)
            .ok_or_else(|| AppError::unauthorized("Not authorized. Login again"))?,
    };
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
