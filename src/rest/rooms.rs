use std::sync::Arc;

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{non_blank, AppState};
use crate::error::{on_duplicate, ApiJson, ApiQuery, ApiResponse, ApiResult, AppError};
use crate::models::{Room, RoomKind, DEFAULT_DEPARTMENT};
use crate::timetable::{eq_loose, opt_number};

const DUPLICATE_ROOM: &str = "Room name already exists";

#[derive(Deserialize)]
pub struct RoomPayload {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<RoomKind>,
    #[serde(default, deserialize_with = "opt_number")]
    pub capacity: Option<u32>,
    pub department: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RoomQuery {
    pub department: Option<String>,
}

fn check_capacity(capacity: u32) -> Result<u32, AppError> {
    if capacity == 0 {
        return Err(AppError::validation("Capacity must be greater than zero"));
    }
    Ok(capacity)
}

pub async fn add_room(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RoomPayload>,
) -> ApiResult<Room> {
    let (Some(name), Some(kind), Some(capacity)) =
        (non_blank(payload.name), payload.kind, payload.capacity)
    else {
        return Err(AppError::validation("All fields are required"));
    };

    let now = Utc::now();
    let room = Room {
        id: Uuid::new_v4().to_string(),
        name,
        kind,
        capacity: check_capacity(capacity)?,
        department: non_blank(payload.department).unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
        created_at: now,
        updated_at: now,
    };
    state
        .storage
        .create_room(&room)
        .map_err(on_duplicate(DUPLICATE_ROOM))?;
    info!(room = %room.name, "room added");

    Ok(ApiResponse::created("Room added successfully", room))
}

pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<RoomQuery>,
) -> ApiResult<Vec<Room>> {
    let mut rooms = state.storage.list_rooms()?;
    if let Some(department) = non_blank(query.department) {
        rooms.retain(|r| eq_loose(&r.department, &department));
    }
    Ok(ApiResponse::ok(format!("{} rooms", rooms.len()), rooms))
}

pub async fn update_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<RoomPayload>,
) -> ApiResult<Room> {
    let mut room = state
        .storage
        .get_room(&id)?
        .ok_or_else(|| AppError::not_found("Room not found"))?;
    let previous_name = room.name.clone();

    if let Some(name) = non_blank(payload.name) {
        room.name = name;
    }
    if let Some(kind) = payload.kind {
        room.kind = kind;
    }
    if let Some(capacity) = payload.capacity {
        room.capacity = check_capacity(capacity)?;
    }
    if let Some(department) = non_blank(payload.department) {
        room.department = department;
    }
    room.updated_at = Utc::now();

    state
        .storage
        .update_room(&previous_name, &room)
        .map_err(on_duplicate(DUPLICATE_ROOM))?;
    Ok(ApiResponse::ok("Room updated successfully", room))
}

pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    match state.storage.delete_room(&id)? {
        Some(room) => {
            info!(room = %room.name, "room deleted");
            Ok(ApiResponse::message("Room deleted successfully"))
        }
        None => Err(AppError::not_found("Room not found")),
    }
}
