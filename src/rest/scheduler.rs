use std::sync::Arc;

use axum::extract::State;
use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiJson, ApiResponse, ApiResult, AppError};
use crate::scheduler::{grid_from_response, SchedulerError};
use crate::timetable::TimetableDocument;

const SCHEDULER_DOWN: &str = "Scheduler API Not Responding";

fn upstream(source: SchedulerError) -> AppError {
    AppError::Upstream {
        message: SCHEDULER_DOWN.to_string(),
        source,
    }
}

/// Reads a class identifier given either as a string or a number.
fn class_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Forwards the constraint payload to the optimiser and stores the grid it
/// returns as the class's timetable.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<TimetableDocument> {
    let (Some(year), Some(division)) = (class_field(&payload, "year"), class_field(&payload, "division"))
    else {
        return Err(AppError::validation("Year and division are required"));
    };
    let department = class_field(&payload, "department");

    let response = state.scheduler.generate(&payload).await.map_err(upstream)?;
    let timetable_data = grid_from_response(response).map_err(upstream)?;

    let doc = TimetableDocument {
        id: Uuid::new_v4().to_string(),
        year,
        division,
        department,
        timetable_data,
        created_at: Utc::now(),
    };
    let replaced = state.storage.save_timetable(&doc)?;
    info!(
        year = %doc.year,
        division = %doc.division,
        entries = doc.entry_count(),
        replaced,
        "timetable generated"
    );

    Ok(ApiResponse::created("Timetable generated successfully", doc))
}

#[cfg(test)]
mod tests {
    use crate::models::AdminRole;
    use crate::rest::testing::TestContext;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_persists_and_replaces() {
        let grid = json!({"timetable": {"Mon": {"1": [{"subject": "DBMS", "teacher": "Rao", "room": "101", "type": "Theory"}]}}});
        let ctx = TestContext::with_scheduler(Some(grid));
        let sid = ctx.seed_admin(AdminRole::Admin);
        let payload = json!({"year": "SE", "division": 1, "department": "Computer", "subjects": []});

        let res = ctx
            .call(Method::POST, "/api/scheduler/generate", Some(&sid), Some(payload.clone()))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        let data = res.json()["data"].clone();
        assert_eq!(data["division"], "1");
        assert_eq!(data["timetableData"]["Mon"]["1"][0]["teacher"], "Rao");

        // the payload reaches the scheduler untouched
        assert_eq!(ctx.scheduler.calls.lock().unwrap()[0], payload);

        ctx.call(Method::POST, "/api/scheduler/generate", Some(&sid), Some(payload))
            .await;
        assert_eq!(ctx.storage().list_timetables().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_accepts_large_constraint_payloads() {
        let grid = json!({"timetable": {"Mon": {"1": [{"subject": "DBMS", "teacher": "Rao"}]}}});
        let ctx = TestContext::with_scheduler(Some(grid));
        let sid = ctx.seed_admin(AdminRole::Admin);
        let notes = "x".repeat(3 * 1024 * 1024);
        let payload = json!({"year": "SE", "division": "A", "notes": notes});

        let res = ctx
            .call(Method::POST, "/api/scheduler/generate", Some(&sid), Some(payload))
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(ctx.storage().list_timetables().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_failure_persists_nothing() {
        let ctx = TestContext::with_scheduler(None);
        let sid = ctx.seed_admin(AdminRole::Admin);

        let res = ctx
            .call(
                Method::POST,
                "/api/scheduler/generate",
                Some(&sid),
                Some(json!({"year": "SE", "division": "A"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::BAD_GATEWAY);
        assert_eq!(res.json()["message"], "Scheduler API Not Responding");
        assert!(ctx.storage().list_timetables().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_grid_and_missing_class() {
        let ctx = TestContext::with_scheduler(Some(json!({"timetable": "infeasible"})));
        let sid = ctx.seed_admin(AdminRole::Admin);

        let res = ctx
            .call(Method::POST, "/api/scheduler/generate", Some(&sid), Some(json!({"division": "A"})))
            .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(ctx.scheduler.calls.lock().unwrap().is_empty());

        let res = ctx
            .call(
                Method::POST,
                "/api/scheduler/generate",
                Some(&sid),
                Some(json!({"year": "SE", "division": "A"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::BAD_GATEWAY);
        assert!(ctx.storage().list_timetables().unwrap().is_empty());
    }
}
