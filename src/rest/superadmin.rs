use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::accounts::is_valid_email;
use super::{non_blank, AppState};
use crate::auth::hash_password;
use crate::error::{on_duplicate, ApiJson, ApiResponse, ApiResult, AppError};
use crate::models::{Admin, AdminClaims, AdminRole, PublicAdmin};

#[derive(Deserialize)]
pub struct CreateAdmin {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    pub role: Option<AdminRole>,
}

pub async fn create_admin(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AdminClaims>,
    ApiJson(payload): ApiJson<CreateAdmin>,
) -> ApiResult<PublicAdmin> {
    let (Some(name), Some(email), Some(password)) = (
        non_blank(payload.name),
        non_blank(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Name, email and password are required"));
    };
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    let admin = Admin {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: hash_password(&password, state.config.bcrypt_cost)?,
        role: payload.role.unwrap_or(AdminRole::Admin),
        department: non_blank(payload.department),
        created_at: Utc::now(),
    };
    state
        .storage
        .create_admin(&admin)
        .map_err(on_duplicate("Admin already exists"))?;
    info!(admin = %admin.email, by = %claims.sub, "admin created");

    Ok(ApiResponse::created("Admin created successfully", PublicAdmin::from(&admin)))
}

pub async fn list_admins(State(state): State<Arc<AppState>>) -> ApiResult<Vec<PublicAdmin>> {
    let admins = state.storage.list_admins()?;
    Ok(ApiResponse::ok(
        format!("{} admins", admins.len()),
        admins.iter().map(PublicAdmin::from).collect(),
    ))
}

pub async fn delete_admin(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    if claims.sub == id {
        return Err(AppError::validation("You cannot delete your own account"));
    }
    match state.storage.delete_admin(&id)? {
        Some(admin) => {
            info!(admin = %admin.email, by = %claims.sub, "admin deleted");
            Ok(ApiResponse::message("Admin deleted successfully"))
        }
        None => Err(AppError::not_found("Admin not found")),
    }
}

#[cfg(test)]
mod tests {
    use crate::models::AdminRole;
    use crate::rest::testing::TestContext;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_only_superadmins_manage_admins() {
        let ctx = TestContext::new();
        let admin_sid = ctx.seed_admin(AdminRole::Admin);
        let res = ctx.call(Method::GET, "/api/superadmin/admins", Some(&admin_sid), None).await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);

        let root_sid = ctx.seed_admin(AdminRole::Superadmin);
        let res = ctx
            .call(
                Method::POST,
                "/api/superadmin/create-admin",
                Some(&root_sid),
                Some(json!({"name": "IT Admin", "email": "it@uni.edu", "password": "Adm1n!pw", "department": "IT"})),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.json()["data"]["role"], "admin");
        assert!(res.json()["data"].get("passwordHash").is_none());
        let new_id = res.json()["data"]["_id"].as_str().unwrap().to_string();

        let res = ctx.call(Method::GET, "/api/superadmin/admins", Some(&root_sid), None).await;
        assert_eq!(res.json()["data"].as_array().unwrap().len(), 3);

        let uri = format!("/api/superadmin/delete-admin/{new_id}");
        assert_eq!(ctx.call(Method::DELETE, &uri, Some(&root_sid), None).await.status, StatusCode::OK);
        assert_eq!(
            ctx.call(Method::DELETE, &uri, Some(&root_sid), None).await.status,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_superadmin_cannot_delete_itself() {
        let ctx = TestContext::new();
        let sid = ctx.seed_admin(AdminRole::Superadmin);
        let me = ctx.storage().list_admins().unwrap().remove(0);

        let uri = format!("/api/superadmin/delete-admin/{}", me.id);
        let res = ctx.call(Method::DELETE, &uri, Some(&sid), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(ctx.storage().get_admin(&me.id).unwrap().is_some());
    }
}
