use std::sync::Arc;

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{non_blank, AppState};
use crate::error::{on_duplicate, ApiJson, ApiQuery, ApiResponse, ApiResult, AppError};
use crate::models::{Subject, SubjectKind, DEFAULT_DEPARTMENT};
use crate::timetable::{eq_loose, opt_number, opt_string};

const DUPLICATE_SUBJECT: &str = "Subject code already exists";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPayload {
    pub name: Option<String>,
    pub code: Option<String>,
    pub department: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub year: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<SubjectKind>,
    #[serde(default, deserialize_with = "opt_number")]
    pub hours_per_week: Option<u32>,
}

#[derive(Deserialize, Default)]
pub struct SubjectQuery {
    pub department: Option<String>,
    pub year: Option<String>,
}

pub async fn add_subject(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SubjectPayload>,
) -> ApiResult<Subject> {
    let (Some(name), Some(code), Some(year), Some(kind), Some(hours_per_week)) = (
        non_blank(payload.name),
        non_blank(payload.code),
        non_blank(payload.year),
        payload.kind,
        payload.hours_per_week,
    ) else {
        return Err(AppError::validation("All fields are required"));
    };

    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        name,
        code,
        department: non_blank(payload.department).unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
        year,
        kind,
        hours_per_week,
        created_at: Utc::now(),
    };
    state
        .storage
        .create_subject(&subject)
        .map_err(on_duplicate(DUPLICATE_SUBJECT))?;
    info!(code = %subject.code, "subject added");

    Ok(ApiResponse::created("Subject added successfully", subject))
}

pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SubjectQuery>,
) -> ApiResult<Vec<Subject>> {
    let mut subjects = state.storage.list_subjects()?;
    if let Some(department) = non_blank(query.department) {
        subjects.retain(|s| eq_loose(&s.department, &department));
    }
    if let Some(year) = non_blank(query.year) {
        subjects.retain(|s| eq_loose(&s.year, &year));
    }
    Ok(ApiResponse::ok(format!("{} subjects", subjects.len()), subjects))
}

pub async fn update_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<SubjectPayload>,
) -> ApiResult<Subject> {
    let mut subject = state
        .storage
        .get_subject(&id)?
        .ok_or_else(|| AppError::not_found("Subject not found"))?;
    let previous_code = subject.code.clone();

    if let Some(name) = non_blank(payload.name) {
        subject.name = name;
    }
    if let Some(code) = non_blank(payload.code) {
        subject.code = code;
    }
    if let Some(department) = non_blank(payload.department) {
        subject.department = department;
    }
    if let Some(year) = non_blank(payload.year) {
        subject.year = year;
    }
    if let Some(kind) = payload.kind {
        subject.kind = kind;
    }
    if let Some(hours) = payload.hours_per_week {
        subject.hours_per_week = hours;
    }

    state
        .storage
        .update_subject(&previous_code, &subject)
        .map_err(on_duplicate(DUPLICATE_SUBJECT))?;
    Ok(ApiResponse::ok("Subject updated successfully", subject))
}

pub async fn delete_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    match state.storage.delete_subject(&id)? {
        Some(subject) => {
            info!(code = %subject.code, "subject deleted");
            Ok(ApiResponse::message("Subject deleted successfully"))
        }
        None => Err(AppError::not_found("Subject not found")),
    }
}
