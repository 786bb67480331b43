//! Student/teacher self-service: registration, login, email verification and
//! password reset by one-time code.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Extension};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::accounts::is_valid_email;
use super::{non_blank, AppState};
use crate::auth::{
    create_user_token, generate_otp, hash_password, is_strong_password, otp_deadline, otp_matches,
    session_cookie, verify_password, RESET_OTP_MINUTES, USER_COOKIE, USER_TOKEN_DAYS,
    VERIFY_OTP_HOURS,
};
use crate::error::{on_duplicate, ApiJson, ApiResponse, ApiResult, AppError};
use crate::mail::{reset_otp_mail, verify_otp_mail};
use crate::models::{PublicUser, Role, User, UserClaims};
use crate::timetable::opt_number;

const WEAK_PASSWORD: &str =
    "Password must be at least 8 characters with upper and lower case letters, a digit and a symbol";

fn token_cookie(state: &AppState, user: &User) -> Result<String, AppError> {
    let token = create_user_token(user, &state.config.jwt_secret)?;
    Ok(session_cookie(
        USER_COOKIE,
        &token,
        USER_TOKEN_DAYS * 24 * 3600,
        state.config.production,
    ))
}

pub(crate) fn current_user(state: &AppState, claims: &UserClaims) -> Result<User, AppError> {
    state
        .storage
        .get_user(&claims.sub)?
        .ok_or_else(|| AppError::not_found("User not found"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    #[serde(default, deserialize_with = "opt_number")]
    pub admission_year: Option<i32>,
    pub division: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Register>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(name), Some(email), Some(password)) = (
        non_blank(payload.name),
        non_blank(payload.email),
        payload.password,
    ) else {
        return Err(AppError::validation("Missing details"));
    };
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }
    if !is_strong_password(&password) {
        return Err(AppError::validation(WEAK_PASSWORD));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: hash_password(&password, state.config.bcrypt_cost)?,
        role: Role::Student,
        department: non_blank(payload.department),
        admission_year: payload.admission_year,
        year: None,
        division: non_blank(payload.division),
        batch: None,
        is_account_verified: false,
        verify_otp: None,
        verify_otp_expires_at: 0,
        reset_otp: None,
        reset_otp_expires_at: 0,
        created_at: Utc::now(),
    };
    state
        .storage
        .create_user(&user)
        .map_err(on_duplicate("User already exists"))?;
    info!(user = %user.email, "student registered");

    let cookie = token_cookie(&state, &user)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::created("Registration successful", PublicUser::from(&user)),
    ))
}

#[derive(Deserialize)]
pub struct Login {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Login>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (non_blank(payload.email), payload.password) else {
        return Err(AppError::validation("Email and password are required"));
    };

    let user = state
        .storage
        .find_user_by_email(&email)?
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;
    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let cookie = token_cookie(&state, &user)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok("Login successful", PublicUser::from(&user)),
    ))
}

pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = session_cookie(USER_COOKIE, "", 0, state.config.production);
    ([(header::SET_COOKIE, cookie)], ApiResponse::message("Logged out"))
}

pub async fn is_authenticated(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
) -> ApiResult<PublicUser> {
    let user = current_user(&state, &claims)?;
    Ok(ApiResponse::ok("Authenticated", PublicUser::from(&user)))
}

pub async fn send_verify_otp(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
) -> ApiResult<()> {
    let mut user = current_user(&state, &claims)?;
    if user.is_account_verified {
        return Err(AppError::validation("Account already verified"));
    }

    let otp = generate_otp();
    user.verify_otp = Some(otp.clone());
    user.verify_otp_expires_at = otp_deadline(Duration::hours(VERIFY_OTP_HOURS));
    state.storage.update_user(&user)?;

    state.mailer.send(verify_otp_mail(&user.email, &otp)).await?;
    Ok(ApiResponse::message("Verification OTP sent to your email"))
}

#[derive(Deserialize)]
pub struct VerifyAccount {
    pub otp: Option<String>,
}

pub async fn verify_account(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
    ApiJson(payload): ApiJson<VerifyAccount>,
) -> ApiResult<()> {
    let Some(otp) = non_blank(payload.otp) else {
        return Err(AppError::validation("Missing details"));
    };

    let mut user = current_user(&state, &claims)?;
    if !otp_matches(user.verify_otp.as_deref(), user.verify_otp_expires_at, &otp) {
        return Err(AppError::validation("Invalid or expired OTP"));
    }

    user.is_account_verified = true;
    user.verify_otp = None;
    user.verify_otp_expires_at = 0;
    state.storage.update_user(&user)?;
    info!(user = %user.email, "account verified");

    Ok(ApiResponse::message("Email verified successfully"))
}

#[derive(Deserialize)]
pub struct SendResetOtp {
    pub email: Option<String>,
}

pub async fn send_reset_otp(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SendResetOtp>,
) -> ApiResult<()> {
    let Some(email) = non_blank(payload.email) else {
        return Err(AppError::validation("Email is required"));
    };
    let mut user = state
        .storage
        .find_user_by_email(&email)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let otp = generate_otp();
    user.reset_otp = Some(otp.clone());
    user.reset_otp_expires_at = otp_deadline(Duration::minutes(RESET_OTP_MINUTES));
    state.storage.update_user(&user)?;

    state.mailer.send(reset_otp_mail(&user.email, &otp)).await?;
    Ok(ApiResponse::message("OTP sent to your email"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPassword {
    pub email: Option<String>,
    pub otp: Option<String>,
    pub new_password: Option<String>,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ResetPassword>,
) -> ApiResult<()> {
    let (Some(email), Some(otp), Some(new_password)) = (
        non_blank(payload.email),
        non_blank(payload.otp),
        payload.new_password,
    ) else {
        return Err(AppError::validation("Email, OTP, and new password are required"));
    };

    let mut user = state
        .storage
        .find_user_by_email(&email)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    if !otp_matches(user.reset_otp.as_deref(), user.reset_otp_expires_at, &otp) {
        return Err(AppError::validation("Invalid or expired OTP"));
    }
    if !is_strong_password(&new_password) {
        return Err(AppError::validation(WEAK_PASSWORD));
    }

    user.password_hash = hash_password(&new_password, state.config.bcrypt_cost)?;
    user.reset_otp = None;
    user.reset_otp_expires_at = 0;
    state.storage.update_user(&user)?;
    info!(user = %user.email, "password reset");

    Ok(ApiResponse::message("Password has been reset successfully"))
}

#[cfg(test)]
mod tests {
    use crate::rest::testing::TestContext;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn otp_in(text: &str) -> String {
        text.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_ascii_digit()))
            .find(|w| w.len() == 6)
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_register_verify_round_trip() {
        let ctx = TestContext::new();

        let weak = ctx
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Asha", "email": "asha@uni.edu", "password": "password"})),
            )
            .await;
        assert_eq!(weak.status, StatusCode::BAD_REQUEST);

        let res = ctx
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Asha", "email": "asha@uni.edu", "password": "Str0ng!pw", "admissionYear": "2023"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.json()["data"]["admissionYear"], 2023);
        assert_eq!(res.json()["data"]["role"], "student");
        assert_eq!(res.json()["data"]["isAccountVerified"], false);
        let token = res.cookie("token").expect("token cookie");

        let res = ctx.call(Method::POST, "/api/auth/send-verify-otp", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
        let otp = {
            let sent = ctx.mailer.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].to, "asha@uni.edu");
            otp_in(&sent[0].text)
        };

        let res = ctx
            .call(Method::POST, "/api/auth/verify-account", Some(&token), Some(json!({"otp": "000000x"})))
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        let res = ctx
            .call(Method::POST, "/api/auth/verify-account", Some(&token), Some(json!({"otp": otp})))
            .await;
        assert_eq!(res.status, StatusCode::OK);

        let res = ctx.call(Method::GET, "/api/auth/is-auth", Some(&token), None).await;
        assert_eq!(res.json()["data"]["isAccountVerified"], true);

        // already verified
        let res = ctx
            .call(Method::POST, "/api/auth/send-verify-otp", Some(&token), None)
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        let dup = ctx
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": "Asha 2", "email": "ASHA@uni.edu", "password": "Str0ng!pw"})),
            )
            .await;
        assert_eq!(dup.status, StatusCode::BAD_REQUEST);
        assert_eq!(dup.json()["message"], "User already exists");
    }

    #[tokio::test]
    async fn test_login_with_bearer_and_reset_password() {
        let ctx = TestContext::new();
        let (user, _) = ctx.seed_user("Ravi", crate::models::Role::Student, true);

        let res = ctx
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": user.email, "password": "nope"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let res = ctx
            .call(
                Method::POST,
                "/api/auth/send-reset-otp",
                None,
                Some(json!({"email": user.email})),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        let otp = otp_in(&ctx.mailer.sent.lock().unwrap()[0].text);

        let res = ctx
            .call(
                Method::POST,
                "/api/auth/reset-password",
                None,
                Some(json!({"email": user.email, "otp": otp, "newPassword": "N3w!secret"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);

        let res = ctx
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": user.email, "password": "N3w!secret"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        let token = res.cookie("token").unwrap();
        let bearer = token.trim_start_matches("token=").to_string();

        let request = axum::http::Request::builder()
            .uri("/api/user/data")
            .header("authorization", format!("Bearer {bearer}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(ctx.app.clone(), request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
