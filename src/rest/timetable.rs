//! Timetable reads, pivoted views and CSV exports.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::auth::current_user;
use super::{non_blank, AppState};
use crate::error::{ApiJson, ApiResponse, ApiResult, AppError};
use crate::models::{Role, User, UserClaims};
use crate::timetable::csv::{to_csv, CsvStyle};
use crate::timetable::view::{student_timetables, teacher_timetable, teacher_timetables, StudentProfile, TeacherTimetable};
use crate::timetable::{opt_string, parse_grid, GridLayout, TimetableDocument, TimetableGrid};

fn csv_response(stem: &str, body: String) -> Response {
    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{stem}.csv\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn load_timetable(state: &AppState, id: &str) -> Result<TimetableDocument, AppError> {
    state
        .storage
        .get_timetable(id)?
        .ok_or_else(|| AppError::not_found("Timetable not found"))
}

/// Days and slots used anywhere in the institution, so every teacher view
/// renders on the same grid.
fn institution_layout(docs: &[TimetableDocument]) -> GridLayout {
    GridLayout::from_grids(docs.iter().map(|d| &d.timetable_data))
}

pub async fn list_timetables(State(state): State<Arc<AppState>>) -> ApiResult<Vec<TimetableDocument>> {
    let docs = state.storage.list_timetables()?;
    Ok(ApiResponse::ok(format!("{} timetables", docs.len()), docs))
}

pub async fn get_timetable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<TimetableDocument> {
    Ok(ApiResponse::ok("Timetable", load_timetable(&state, &id)?))
}

pub async fn timetable_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let doc = load_timetable(&state, &id)?;
    let grid = &doc.timetable_data;
    let body = to_csv(grid, &GridLayout::of(grid), CsvStyle::Class);
    Ok(csv_response(&format!("timetable_{}_{}", doc.year, doc.division), body))
}

#[derive(Serialize)]
pub struct TeacherViews {
    pub layout: GridLayout,
    pub teachers: Vec<TeacherTimetable>,
}

pub async fn teacher_views(State(state): State<Arc<AppState>>) -> ApiResult<TeacherViews> {
    let docs = state.storage.list_timetables()?;
    let teachers = teacher_timetables(&docs);
    Ok(ApiResponse::ok(
        format!("{} teachers", teachers.len()),
        TeacherViews {
            layout: institution_layout(&docs),
            teachers,
        },
    ))
}

pub async fn teacher_view(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<TeacherTimetable> {
    let docs = state.storage.list_timetables()?;
    let view = teacher_timetable(&docs, &name)
        .ok_or_else(|| AppError::not_found("No classes found for this teacher"))?;
    Ok(ApiResponse::ok("Teacher timetable", view))
}

pub async fn teacher_csv(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let docs = state.storage.list_timetables()?;
    let view = teacher_timetable(&docs, &name)
        .ok_or_else(|| AppError::not_found("No classes found for this teacher"))?;
    let body = to_csv(&view.timetable, &institution_layout(&docs), CsvStyle::Teacher);
    Ok(csv_response(&format!("{}_timetable", view.teacher), body))
}

/// What `/my` returns: a teacher's own pivot, or a student's class timetables
/// with other batches' sessions removed.
#[derive(Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum MyTimetable {
    Teacher {
        layout: GridLayout,
        timetable: TeacherTimetable,
    },
    Student {
        batch: Option<String>,
        timetables: Vec<TimetableDocument>,
    },
}

fn verified_user(state: &AppState, claims: &UserClaims) -> Result<User, AppError> {
    let user = current_user(state, claims)?;
    if !user.is_account_verified {
        return Err(AppError::forbidden("Please verify your account first"));
    }
    Ok(user)
}

fn student_profile(user: &User) -> Result<StudentProfile, AppError> {
    StudentProfile::from_user(user)
        .ok_or_else(|| AppError::validation("Complete your profile (year and division) first"))
}

fn own_teacher_view(docs: &[TimetableDocument], user: &User) -> TeacherTimetable {
    teacher_timetable(docs, &user.name).unwrap_or_else(|| TeacherTimetable {
        teacher: user.name.trim().to_string(),
        timetable: TimetableGrid::new(),
    })
}

pub async fn my_timetable(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
) -> ApiResult<MyTimetable> {
    let user = verified_user(&state, &claims)?;
    let docs = state.storage.list_timetables()?;

    let view = match user.role {
        Role::Teacher => MyTimetable::Teacher {
            layout: institution_layout(&docs),
            timetable: own_teacher_view(&docs, &user),
        },
        Role::Student => {
            let profile = student_profile(&user)?;
            MyTimetable::Student {
                timetables: student_timetables(&docs, &profile),
                batch: profile.batch,
            }
        }
    };
    Ok(ApiResponse::ok("Your timetable", view))
}

pub async fn my_timetable_csv(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<UserClaims>,
) -> Result<Response, AppError> {
    let user = verified_user(&state, &claims)?;
    let docs = state.storage.list_timetables()?;

    match user.role {
        Role::Teacher => {
            let view = own_teacher_view(&docs, &user);
            let body = to_csv(&view.timetable, &institution_layout(&docs), CsvStyle::Teacher);
            Ok(csv_response(&format!("{}_timetable", view.teacher), body))
        }
        Role::Student => {
            let profile = student_profile(&user)?;
            let mut matches = student_timetables(&docs, &profile);
            if matches.len() > 1 {
                return Err(AppError::validation(
                    "Several departments share your class, set your department in your profile",
                ));
            }
            let doc = matches
                .pop()
                .ok_or_else(|| AppError::not_found("No timetable found for your class"))?;
            let grid = &doc.timetable_data;
            let body = to_csv(grid, &GridLayout::of(grid), CsvStyle::Class);
            Ok(csv_response(&format!("timetable_{}_{}", doc.year, doc.division), body))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTimetable {
    #[serde(default, deserialize_with = "opt_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub division: Option<String>,
    pub department: Option<String>,
    pub timetable_data: Option<Value>,
}

/// Stores a hand-edited grid, replacing the class's current timetable.
pub async fn save_timetable(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SaveTimetable>,
) -> ApiResult<TimetableDocument> {
    let (Some(year), Some(division), Some(data)) = (
        non_blank(payload.year),
        non_blank(payload.division),
        payload.timetable_data,
    ) else {
        return Err(AppError::validation("Year, division and timetableData are required"));
    };
    let timetable_data =
        parse_grid(data).map_err(|e| AppError::validation(format!("Invalid timetableData: {e}")))?;

    let doc = TimetableDocument {
        id: Uuid::new_v4().to_string(),
        year,
        division,
        department: non_blank(payload.department),
        timetable_data,
        created_at: Utc::now(),
    };
    let replaced = state.storage.save_timetable(&doc)?;
    info!(year = %doc.year, division = %doc.division, replaced, "timetable saved");

    Ok(ApiResponse::created("Timetable saved successfully", doc))
}

pub async fn delete_timetable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    match state.storage.delete_timetable(&id)? {
        Some(doc) => {
            info!(year = %doc.year, division = %doc.division, "timetable deleted");
            Ok(ApiResponse::message("Timetable deleted successfully"))
        }
        None => Err(AppError::not_found("Timetable not found")),
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{AdminRole, Role};
    use crate::rest::testing::TestContext;
    use axum::http::{header, Method, StatusCode};
    use serde_json::{json, Value};

    fn grid_a() -> Value {
        json!({
            "Mon": {
                "1": [{"subject": "DBMS", "teacher": "Rao", "room": "101", "type": "Theory"}],
                "2": [
                    {"subject": "OS Lab", "teacher": "Iyer", "room": "L1", "type": "Lab", "batch": "1"},
                    {"subject": "CN Lab", "teacher": "Rao", "room": "L2", "type": "Lab", "batch": "2"}
                ]
            }
        })
    }

    async fn save(ctx: &TestContext, sid: &str, division: &str, grid: Value) -> String {
        let res = ctx
            .call(
                Method::POST,
                "/api/timetable/save",
                Some(sid),
                Some(json!({"year": "SE", "division": division, "department": "Computer", "timetableData": grid})),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        res.json()["data"]["_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_save_read_export_and_delete() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        let id = save(&ctx, &sid, "A", grid_a()).await;

        let res = ctx.call(Method::GET, "/api/timetable/all", Some(&sid), None).await;
        assert_eq!(res.json()["data"].as_array().unwrap().len(), 1);

        let res = ctx.call(Method::GET, &format!("/api/timetable/{id}"), Some(&sid), None).await;
        assert_eq!(res.json()["data"]["division"], "A");

        let res = ctx.call(Method::GET, &format!("/api/timetable/{id}/csv"), Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        assert!(res.headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("timetable_SE_A.csv"));
        assert!(res.body.starts_with("Period / Day,Mon\nP1,\"DBMS (Rao R:101)\"\n"));

        let uri = format!("/api/timetable/delete/{id}");
        assert_eq!(ctx.call(Method::DELETE, &uri, Some(&sid), None).await.status, StatusCode::OK);
        assert_eq!(
            ctx.call(Method::DELETE, &uri, Some(&sid), None).await.status,
            StatusCode::NOT_FOUND
        );
        let res = ctx.call(Method::GET, &format!("/api/timetable/{id}"), Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_save_rejects_bad_grid() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        let res = ctx
            .call(
                Method::POST,
                "/api/timetable/save",
                Some(&sid),
                Some(json!({"year": "SE", "division": "A", "timetableData": [1, 2]})),
            )
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(ctx.storage().list_timetables().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teacher_views_merge_divisions() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        save(&ctx, &sid, "A", grid_a()).await;
        save(
            &ctx,
            &sid,
            "B",
            json!({"Tue": {"3": [{"subject": "DBMS", "teacher": " rao ", "room": "102", "type": "Theory"}]}}),
        )
        .await;

        let res = ctx.call(Method::GET, "/api/timetable/teachers", Some(&sid), None).await;
        let data = res.json()["data"].clone();
        assert_eq!(data["teachers"].as_array().unwrap().len(), 2);
        assert_eq!(data["layout"]["days"], json!(["Mon", "Tue"]));

        let res = ctx.call(Method::GET, "/api/timetable/teacher/RAO", Some(&sid), None).await;
        let rao = res.json()["data"]["timetable"].clone();
        assert_eq!(rao["Mon"]["1"][0]["division"], "A");
        assert_eq!(rao["Mon"]["2"][0]["subject"], "CN Lab");
        assert_eq!(rao["Tue"]["3"][0]["division"], "B");

        let res = ctx.call(Method::GET, "/api/timetable/teacher/Nobody", Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        let res = ctx.call(Method::GET, "/api/timetable/teacher/Iyer/csv", Some(&sid), None).await;
        assert_eq!(
            res.body,
            "Period / Day,Mon,Tue\nP1,-,-\nP2,\"OS Lab (Y:SE Div:A R:L1)\",-\nP3,-,-\n"
        );
    }

    #[tokio::test]
    async fn test_odd_slot_labels_do_not_break_views() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        save(
            &ctx,
            &sid,
            "A",
            json!({"Mon": {
                "99999999:00-10:00": [{"subject": "DBMS", "teacher": "Rao", "type": "Theory"}],
                "09:00-10:00": [{"subject": "OS", "teacher": "Rao", "type": "Theory"}]
            }}),
        )
        .await;

        let res = ctx.call(Method::GET, "/api/timetable/teachers", Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(
            res.json()["data"]["layout"]["slots"],
            json!(["09:00-10:00", "99999999:00-10:00"])
        );

        let res = ctx.call(Method::GET, "/api/timetable/teacher/Rao/csv", Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_student_sees_own_batch_only() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        save(&ctx, &sid, "A", grid_a()).await;
        save(&ctx, &sid, "B", json!({"Mon": {"1": [{"subject": "Maths", "teacher": "Sen"}]}})).await;

        let (mut student, token) = ctx.seed_user("Asha", Role::Student, true);
        student.year = Some("se".to_string());
        student.division = Some("a".to_string());
        student.batch = Some("1".to_string());
        ctx.storage().update_user(&student).unwrap();

        let res = ctx.call(Method::GET, "/api/timetable/my", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
        let data = res.json()["data"].clone();
        assert_eq!(data["view"], "student");
        let timetables = data["timetables"].as_array().unwrap();
        assert_eq!(timetables.len(), 1);
        let slot2 = timetables[0]["timetableData"]["Mon"]["2"].as_array().unwrap();
        assert_eq!(slot2.len(), 1);
        assert_eq!(slot2[0]["subject"], "OS Lab");

        let res = ctx.call(Method::GET, "/api/timetable/my/csv", Some(&token), None).await;
        assert!(res.body.contains("OS Lab"));
        assert!(!res.body.contains("CN Lab"));

        // students may read any class too
        let res = ctx.call(Method::GET, "/api/timetable/all", Some(&token), None).await;
        assert_eq!(res.json()["data"].as_array().unwrap().len(), 2);
        // but not write
        let res = ctx.call(Method::POST, "/api/timetable/save", Some(&token), Some(json!({}))).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_my_csv_needs_department_when_class_is_ambiguous() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        save(&ctx, &sid, "A", grid_a()).await;
        let res = ctx
            .call(
                Method::POST,
                "/api/timetable/save",
                Some(&sid),
                Some(json!({"year": "SE", "division": "A", "department": "IT",
                    "timetableData": {"Mon": {"1": [{"subject": "Networks", "teacher": "Sen"}]}}})),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);

        let (mut student, token) = ctx.seed_user("Asha", Role::Student, true);
        student.department = None;
        student.year = Some("SE".to_string());
        student.division = Some("A".to_string());
        ctx.storage().update_user(&student).unwrap();

        let res = ctx.call(Method::GET, "/api/timetable/my/csv", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        student.department = Some("IT".to_string());
        ctx.storage().update_user(&student).unwrap();
        let res = ctx.call(Method::GET, "/api/timetable/my/csv", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.contains("Networks"));
        assert!(!res.body.contains("DBMS"));
    }

    #[tokio::test]
    async fn test_my_timetable_requires_verified_account() {
        let ctx = TestContext::new();
        let (_, token) = ctx.seed_user("Asha", Role::Student, false);
        let res = ctx.call(Method::GET, "/api/timetable/my", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);

        let (_, token) = ctx.seed_user("Ravi", Role::Student, true);
        let res = ctx.call(Method::GET, "/api/timetable/my", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_teacher_my_view() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Admin);
        save(&ctx, &sid, "A", grid_a()).await;
        let (_, token) = ctx.seed_user("Iyer", Role::Teacher, true);

        let res = ctx.call(Method::GET, "/api/timetable/my", Some(&token), None).await;
        let data = res.json()["data"].clone();
        assert_eq!(data["view"], "teacher");
        assert_eq!(data["timetable"]["teacher"], "Iyer");
        assert_eq!(data["timetable"]["timetable"]["Mon"]["2"][0]["subject"], "OS Lab");
    }
}
