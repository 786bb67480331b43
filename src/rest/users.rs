use std::sync::Arc;

use axum::{extract::State, Extension};
use serde::Deserialize;

use super::auth::current_user;
use super::{non_blank, AppState};
use crate::error::{ApiJson, ApiResponse, ApiResult, AppError};
use crate::models::{PublicUser, UserClaims};
use crate::timetable::opt_string;

pub async fn user_data(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
) -> ApiResult<PublicUser> {
    let user = current_user(&state, &claims)?;
    Ok(ApiResponse::ok("User data", PublicUser::from(&user)))
}

/// Year, division and batch may arrive as numbers from form inputs.
#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub department: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub division: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub batch: Option<String>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
    ApiJson(payload): ApiJson<ProfileUpdate>,
) -> ApiResult<PublicUser> {
    let (Some(department), Some(year), Some(division)) = (
        non_blank(payload.department),
        non_blank(payload.year),
        non_blank(payload.division),
    ) else {
        return Err(AppError::validation("Department, year and division are required"));
    };

    let mut user = current_user(&state, &claims)?;
    user.department = Some(department);
    user.year = Some(year);
    user.division = Some(division);
    user.batch = non_blank(payload.batch);
    state.storage.update_user(&user)?;

    Ok(ApiResponse::ok("Profile updated successfully", PublicUser::from(&user)))
}
