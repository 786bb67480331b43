use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

/// A teacher or student account, as stored. Never serialise this into a response;
/// use [`PublicUser`] instead.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub admission_year: Option<i32>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub is_account_verified: bool,
    #[serde(default)]
    pub verify_otp: Option<String>,
    #[serde(default)]
    pub verify_otp_expires_at: i64,
    #[serde(default)]
    pub reset_otp: Option<String>,
    #[serde(default)]
    pub reset_otp_expires_at: i64,
    pub created_at: DateTime<Utc>,
}

/// Client-facing view of a [`User`] (no password hash, no OTPs).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub admission_year: Option<i32>,
    pub year: Option<String>,
    pub division: Option<String>,
    pub batch: Option<String>,
    pub is_account_verified: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            department: user.department.clone(),
            admission_year: user.admission_year,
            year: user.year.clone(),
            division: user.division.clone(),
            batch: user.batch.clone(),
            is_account_verified: user.is_account_verified,
        }
    }
}

/// Filter for user listings; `None` fields match everything.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserFilter {
    #[serde(skip)]
    pub role: Option<Role>,
    pub department: Option<String>,
    pub year: Option<String>,
    pub division: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        fn field(want: &Option<String>, have: &Option<String>) -> bool {
            match want.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
                None => true,
                Some(w) => have
                    .as_deref()
                    .is_some_and(|h| h.trim().eq_ignore_ascii_case(w)),
            }
        }

        self.role.map_or(true, |r| r == user.role)
            && field(&self.department, &user.department)
            && field(&self.year, &user.year)
            && field(&self.division, &user.division)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Admin,
    Superadmin,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
    #[serde(default)]
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicAdmin {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: AdminRole,
    pub department: Option<String>,
}

impl From<&Admin> for PublicAdmin {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id.clone(),
            name: admin.name.clone(),
            email: admin.email.clone(),
            role: admin.role,
            department: admin.department.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Classroom,
    Lab,
    Tutorial,
}

pub const DEFAULT_DEPARTMENT: &str = "Software Engineering";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub capacity: u32,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Theory,
    Lab,
    Tutorial,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub code: String,
    pub department: String,
    pub year: String,
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub hours_per_week: u32,
    pub created_at: DateTime<Utc>,
}

/// JWT claims for a student/teacher token.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserClaims {
    pub sub: String, // user id
    pub role: Role,
    pub exp: usize,
}

/// JWT claims carried in the admin session cookie.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminClaims {
    pub sub: String, // admin id
    pub name: String,
    pub role: AdminRole,
    pub department: Option<String>,
    pub exp: usize,
}
