//! Seeds a local timetable store with sample data.
//!
//! Populates `$DATABASE_PATH` (default `timetable_data`) with:
//! - a superadmin (`$SUPERADMIN_EMAIL` / `$SUPERADMIN_PASSWORD`, or admin@portal.local / Admin@123)
//! - classrooms and labs, theory and lab subjects
//! - two teachers and a sample SE-A timetable split into lab batches
//!
//! Run: cargo run --bin load_data
//! Records that already exist are left alone, so the script can be re-run.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use timetable_portal::auth::hash_password;
use timetable_portal::config::AppConfig;
use timetable_portal::models::{
    Admin, AdminRole, Role, Room, RoomKind, Subject, SubjectKind, User, DEFAULT_DEPARTMENT,
};
use timetable_portal::storage::{Storage, StorageError};
use timetable_portal::timetable::{parse_grid, TimetableDocument};

/// A duplicate means the record was seeded by an earlier run.
fn seeded(result: Result<(), StorageError>) -> Result<bool, StorageError> {
    match result {
        Ok(()) => Ok(true),
        Err(StorageError::Duplicate { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn teacher(name: &str, email: &str, password_hash: &str) -> User {
    User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        role: Role::Teacher,
        department: Some(DEFAULT_DEPARTMENT.to_string()),
        admission_year: None,
        year: None,
        division: None,
        batch: None,
        is_account_verified: true,
        verify_otp: None,
        verify_otp_expires_at: 0,
        reset_otp: None,
        reset_otp_expires_at: 0,
        created_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let storage = Storage::open(&config.database_path)?;

    let (email, password) = match &config.superadmin {
        Some(seed) => (seed.email.clone(), seed.password.clone()),
        None => ("admin@portal.local".to_string(), "Admin@123".to_string()),
    };
    let admin = Admin {
        id: Uuid::new_v4().to_string(),
        name: "Super Admin".to_string(),
        email: email.clone(),
        password_hash: hash_password(&password, config.bcrypt_cost)?,
        role: AdminRole::Superadmin,
        department: None,
        created_at: Utc::now(),
    };
    if seeded(storage.create_admin(&admin))? {
        println!("✅ Superadmin {email} created");
    }

    let now = Utc::now();
    let rooms = [
        ("A-101", RoomKind::Classroom, 60),
        ("A-102", RoomKind::Classroom, 60),
        ("Lab-1", RoomKind::Lab, 30),
        ("Lab-2", RoomKind::Lab, 30),
        ("T-1", RoomKind::Tutorial, 25),
    ];
    let mut added = 0;
    for (name, kind, capacity) in rooms {
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind,
            capacity,
            department: DEFAULT_DEPARTMENT.to_string(),
            created_at: now,
            updated_at: now,
        };
        added += seeded(storage.create_room(&room))? as usize;
    }
    println!("✅ {added} rooms loaded");

    let subjects = [
        ("Database Management Systems", "SE301", SubjectKind::Theory, 4),
        ("Operating Systems", "SE302", SubjectKind::Theory, 3),
        ("DBMS Lab", "SE351", SubjectKind::Lab, 2),
        ("OS Lab", "SE352", SubjectKind::Lab, 2),
    ];
    let mut added = 0;
    for (name, code, kind, hours_per_week) in subjects {
        let subject = Subject {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            code: code.to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
            year: "SE".to_string(),
            kind,
            hours_per_week,
            created_at: now,
        };
        added += seeded(storage.create_subject(&subject))? as usize;
    }
    println!("✅ {added} subjects loaded");

    let teacher_hash = hash_password("Teacher@123", config.bcrypt_cost)?;
    let mut added = 0;
    for (name, email) in [("Meera Rao", "rao@portal.local"), ("Karan Iyer", "iyer@portal.local")] {
        added += seeded(storage.create_user(&teacher(name, email, &teacher_hash)))? as usize;
    }
    println!("✅ {added} teachers loaded (password Teacher@123)");

    let grid = parse_grid(json!({
        "Mon": {
            "1": [{"subject": "Database Management Systems", "teacher": "Meera Rao", "room": "A-101", "type": "Theory"}],
            "2": [{"subject": "Operating Systems", "teacher": "Karan Iyer", "room": "A-101", "type": "Theory"}],
            "3": [
                {"subject": "DBMS Lab", "teacher": "Meera Rao", "room": "Lab-1", "type": "Lab", "batch": "1", "lab_part": 1, "lab_session_id": "mon-dbms-1"},
                {"subject": "OS Lab", "teacher": "Karan Iyer", "room": "Lab-2", "type": "Lab", "batch": "2", "lab_part": 1, "lab_session_id": "mon-os-2"}
            ],
            "4": [
                {"subject": "DBMS Lab", "teacher": "Meera Rao", "room": "Lab-1", "type": "Lab", "batch": "1", "lab_part": 2, "lab_session_id": "mon-dbms-1"},
                {"subject": "OS Lab", "teacher": "Karan Iyer", "room": "Lab-2", "type": "Lab", "batch": "2", "lab_part": 2, "lab_session_id": "mon-os-2"}
            ]
        },
        "Tue": {
            "1": [{"subject": "Operating Systems", "teacher": "Karan Iyer", "room": "A-102", "type": "Theory"}],
            "2": [{"subject": "Database Management Systems", "teacher": "Meera Rao", "room": "A-102", "type": "Theory"}],
            "3": []
        }
    }))?;
    let doc = TimetableDocument {
        id: Uuid::new_v4().to_string(),
        year: "SE".to_string(),
        division: "A".to_string(),
        department: Some(DEFAULT_DEPARTMENT.to_string()),
        timetable_data: grid,
        created_at: now,
    };
    let replaced = storage.save_timetable(&doc)?;
    println!(
        "✅ Sample SE-A timetable saved ({} entries, {} replaced)",
        doc.entry_count(),
        replaced
    );

    storage.flush().await?;
    println!("🧪 Start the server with `cargo run --bin timetable_portal` and log in as {email}");
    Ok(())
}
