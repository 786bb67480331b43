//! REST API layer (Axum).
//!
//! Every endpoint answers with the `{success, message, data?}` envelope from
//! [`crate::error`]. Routes are grouped per resource; each group carries the
//! guard it needs as a route layer:
//! - admin session (`sid` cookie): rooms, subjects, teachers, students, scheduler
//! - superadmin session: admin management
//! - user token (`token` cookie or Bearer header): profile, own timetable
//! - any of the above: timetable reads and exports

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::AppConfig;
use crate::error::ApiResponse;
use crate::logging;
use crate::mail::Mailer;
use crate::scheduler::Scheduler;
use crate::storage::Storage;

mod accounts;
mod admin;
mod auth;
mod guard;
mod rooms;
mod scheduler;
mod subjects;
mod superadmin;
mod timetable;
mod users;

#[cfg(test)]
mod testing;

pub use guard::Principal;

/// Shared app state for REST handlers.
pub struct AppState {
    pub storage: Storage,
    pub config: AppConfig,
    pub scheduler: Arc<dyn Scheduler>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        storage: Storage,
        config: AppConfig,
        scheduler: Arc<dyn Scheduler>,
        mailer: Arc<dyn Mailer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            config,
            scheduler,
            mailer,
        })
    }
}

/// Credentialed CORS for the configured frontend origins. Cookies only flow
/// cross-origin with an explicit origin list, never a wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid frontend origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::SET_COOKIE])
}

/// Create the Axum router with every `/api` group mounted.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.frontend_urls);
    let body_limit = DefaultBodyLimit::max(state.config.body_limit);
    let admin_only = || middleware::from_fn_with_state(state.clone(), guard::require_admin);
    let user_only = || middleware::from_fn_with_state(state.clone(), guard::require_user);

    let admin_routes = Router::new()
        .route("/health", get(admin::health))
        .route("/add-teacher", post(accounts::add_teacher))
        .route("/update-teacher/:id", put(accounts::update_teacher))
        .route("/delete-teacher/:id", delete(accounts::delete_teacher))
        .route("/students", get(accounts::list_students))
        .route("/delete-user/:id", delete(accounts::delete_user))
        .route_layer(admin_only())
        .route("/login", post(admin::login))
        .route("/logout", post(admin::logout));

    let teacher_routes = Router::new()
        .route("/", get(accounts::list_teachers))
        .route_layer(admin_only());

    let superadmin_routes = Router::new()
        .route("/create-admin", post(superadmin::create_admin))
        .route("/admins", get(superadmin::list_admins))
        .route("/delete-admin/:id", delete(superadmin::delete_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_superadmin,
        ));

    let auth_routes = Router::new()
        .route("/is-auth", get(auth::is_authenticated))
        .route("/send-verify-otp", post(auth::send_verify_otp))
        .route("/verify-account", post(auth::verify_account))
        .route_layer(user_only())
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/send-reset-otp", post(auth::send_reset_otp))
        .route("/reset-password", post(auth::reset_password));

    let user_routes = Router::new()
        .route("/data", get(users::user_data))
        .route("/update-profile", post(users::update_profile))
        .route_layer(user_only());

    let room_routes = Router::new()
        .route("/add", post(rooms::add_room))
        .route("/all", get(rooms::list_rooms))
        .route("/update/:id", put(rooms::update_room))
        .route("/delete/:id", delete(rooms::delete_room))
        .route_layer(admin_only());

    let subject_routes = Router::new()
        .route("/add", post(subjects::add_subject))
        .route("/all", get(subjects::list_subjects))
        .route("/update/:id", put(subjects::update_subject))
        .route("/delete/:id", delete(subjects::delete_subject))
        .route_layer(admin_only());

    let scheduler_routes = Router::new()
        .route("/generate", post(scheduler::generate))
        .route_layer(admin_only());

    let timetable_routes = Router::new()
        .route("/all", get(timetable::list_timetables))
        .route("/teachers", get(timetable::teacher_views))
        .route("/teacher/:name", get(timetable::teacher_view))
        .route("/teacher/:name/csv", get(timetable::teacher_csv))
        .route("/:id", get(timetable::get_timetable))
        .route("/:id/csv", get(timetable::timetable_csv))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_principal,
        ))
        .merge(
            Router::new()
                .route("/my", get(timetable::my_timetable))
                .route("/my/csv", get(timetable::my_timetable_csv))
                .route_layer(user_only()),
        )
        .merge(
            Router::new()
                .route("/save", post(timetable::save_timetable))
                .route("/delete/:id", delete(timetable::delete_timetable))
                .route_layer(admin_only()),
        );

    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .nest("/api/admin", admin_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/superadmin", superadmin_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/rooms", room_routes)
        .nest("/api/subjects", subject_routes)
        .nest("/api/scheduler", scheduler_routes)
        .nest("/api/timetable", timetable_routes)
        .layer(body_limit)
        .layer(cors)
        .layer(middleware::from_fn(logging::log_requests))
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Server is up and running!"
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    time: String,
}

async fn health_handler() -> impl IntoResponse {
    ApiResponse::ok(
        "Timetable portal API healthy",
        Health {
            status: "ok",
            time: Utc::now().to_rfc3339(),
        },
    )
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
