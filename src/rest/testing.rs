//! In-process harness for router tests: temporary store, stub scheduler,
//! capturing mailer and a `oneshot` request helper.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use super::{create_router, AppState};
use crate::auth::{
    create_admin_session, create_user_token, hash_password, ADMIN_COOKIE, USER_COOKIE,
};
use crate::config::AppConfig;
use crate::mail::{MailError, Mailer, OutgoingMail};
use crate::models::{Admin, AdminRole, Role, User};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::storage::Storage;

/// Answers with a canned response, or fails like an unreachable service.
pub struct StubScheduler {
    pub response: Option<Value>,
    pub calls: Mutex<Vec<Value>>,
}

#[async_trait]
impl Scheduler for StubScheduler {
    async fn generate(&self, payload: &Value) -> Result<Value, SchedulerError> {
        self.calls.lock().unwrap().push(payload.clone());
        self.response.clone().ok_or(SchedulerError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// `name=value` pair of a `Set-Cookie` header, ready to send back.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| pair.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }
}

pub struct TestContext {
    pub state: Arc<AppState>,
    pub scheduler: Arc<StubScheduler>,
    pub mailer: Arc<CapturingMailer>,
    pub app: Router,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_scheduler(None)
    }

    pub fn with_scheduler(response: Option<Value>) -> Self {
        let scheduler = Arc::new(StubScheduler {
            response,
            calls: Mutex::new(Vec::new()),
        });
        let mailer = Arc::new(CapturingMailer::default());
        let storage = Storage::open_temporary().unwrap();
        let state = AppState::new(
            storage,
            AppConfig::for_tests(),
            scheduler.clone(),
            mailer.clone(),
        );
        let app = create_router(state.clone());
        Self {
            state,
            scheduler,
            mailer,
            app,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.state.storage
    }

    /// Stores an admin and returns a `sid=...` cookie for it.
    pub fn seed_admin(&self, role: AdminRole) -> String {
        let admin = Admin {
            id: Uuid::new_v4().to_string(),
            name: "Dean".to_string(),
            email: format!("{}@uni.edu", Uuid::new_v4()),
            password_hash: hash_password("Adm1n!pass", 4).unwrap(),
            role,
            department: Some("Computer".to_string()),
            created_at: Utc::now(),
        };
        self.storage().create_admin(&admin).unwrap();
        let token = create_admin_session(&admin, &self.state.config.session_secret).unwrap();
        format!("{ADMIN_COOKIE}={token}")
    }

    /// Stores a user and returns it with a `token=...` cookie.
    pub fn seed_user(&self, name: &str, role: Role, verified: bool) -> (User, String) {
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: format!("{}@uni.edu", name.to_lowercase().replace(' ', ".")),
            password_hash: hash_password("Us3r!pass", 4).unwrap(),
            role,
            department: Some("Computer".to_string()),
            admission_year: None,
            year: None,
            division: None,
            batch: None,
            is_account_verified: verified,
            verify_otp: None,
            verify_otp_expires_at: 0,
            reset_otp: None,
            reset_otp_expires_at: 0,
            created_at: Utc::now(),
        };
        self.storage().create_user(&user).unwrap();
        let token = create_user_token(&user, &self.state.config.jwt_secret).unwrap();
        (user, format!("{USER_COOKIE}={token}"))
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        self.call_raw(method, uri, cookie, &body).await
    }

    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: &str,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}
