//! Admin-side management of teacher and student accounts.

use std::sync::{Arc, OnceLock};

use axum::extract::{Path, State};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{non_blank, AppState};
use crate::auth::hash_password;
use crate::error::{on_duplicate, ApiJson, ApiQuery, ApiResponse, ApiResult, AppError};
use crate::models::{PublicUser, Role, User, UserFilter};

pub(crate) fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"))
        .is_match(email)
}

#[derive(Deserialize)]
pub struct AddTeacher {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct TeacherSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
}

pub async fn add_teacher(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<AddTeacher>,
) -> ApiResult<TeacherSummary> {
    let (Some(name), Some(email), Some(department), Some(password)) = (
        non_blank(payload.name),
        non_blank(payload.email),
        non_blank(payload.department),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("All fields are required"));
    };
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    let teacher = User {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: hash_password(&password, state.config.bcrypt_cost)?,
        role: Role::Teacher,
        department: Some(department),
        admission_year: None,
        year: None,
        division: None,
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
        .create_user(&teacher)
        .map_err(on_duplicate("Teacher already exists"))?;
    info!(teacher = %teacher.email, "teacher added");

    Ok(ApiResponse::created(
        "Teacher added successfully",
        TeacherSummary {
            id: teacher.id,
            name: teacher.name,
            email: teacher.email,
            department: teacher.department,
        },
    ))
}

#[derive(Deserialize)]
pub struct UpdateTeacher {
    pub name: Option<String>,
    pub department: Option<String>,
}

fn load_teacher(state: &AppState, id: &str) -> Result<User, AppError> {
    state
        .storage
        .get_user(id)?
        .filter(|u| u.role == Role::Teacher)
        .ok_or_else(|| AppError::not_found("Teacher not found"))
}

pub async fn update_teacher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateTeacher>,
) -> ApiResult<PublicUser> {
    let (Some(name), Some(department)) = (non_blank(payload.name), non_blank(payload.department))
    else {
        return Err(AppError::validation("Name and department are required"));
    };

    let mut teacher = load_teacher(&state, &id)?;
    teacher.name = name;
    teacher.department = Some(department);
    state.storage.update_user(&teacher)?;

    Ok(ApiResponse::ok("Teacher updated successfully", PublicUser::from(&teacher)))
}

pub async fn delete_teacher(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    load_teacher(&state, &id)?;
    state.storage.delete_user(&id)?;
    info!(%id, "teacher deleted");
    Ok(ApiResponse::message("Teacher deleted successfully"))
}

#[derive(Deserialize, Default)]
pub struct DepartmentQuery {
    pub department: Option<String>,
}

pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<DepartmentQuery>,
) -> ApiResult<Vec<PublicUser>> {
    let filter = UserFilter {
        role: Some(Role::Teacher),
        department: query.department,
        ..UserFilter::default()
    };
    let teachers = state.storage.list_users(&filter)?;
    Ok(ApiResponse::ok(
        format!("{} teachers", teachers.len()),
        teachers.iter().map(PublicUser::from).collect(),
    ))
}

pub async fn list_students(
    State(state): State<Arc<AppState>>,
    ApiQuery(mut filter): ApiQuery<UserFilter>,
) -> ApiResult<Vec<PublicUser>> {
    filter.role = Some(Role::Student);
    let students = state.storage.list_users(&filter)?;
    Ok(ApiResponse::ok(
        format!("{} students", students.len()),
        students.iter().map(PublicUser::from).collect(),
    ))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    match state.storage.delete_user(&id)? {
        Some(user) => {
            info!(user = %user.email, "user deleted");
            Ok(ApiResponse::message("User deleted successfully"))
        }
        None => Err(AppError::not_found("User not found")),
    }
}
