//! Sled-backed document store.
//!
//! Every collection is a tree of JSON documents keyed by id. Natural keys
//! (user/admin email, room name, subject code) live in separate index trees
//! mapping the normalised key to the owning id; a key is claimed with
//! compare-and-swap before the document is written, so two writers can never
//! both win the same name.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;

use crate::models::{Admin, Room, Subject, User, UserFilter};
use crate::timetable::TimetableDocument;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{field} {value:?} is already taken")]
    Duplicate { field: &'static str, value: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Clone)]
pub struct Storage {
    db: Db,
    users: Tree,
    user_emails: Tree,
    admins: Tree,
    admin_emails: Tree,
    rooms: Tree,
    room_names: Tree,
    subjects: Tree,
    subject_codes: Tree,
    timetables: Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> StorageResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway database removed on drop (tests, dry runs).
    pub fn open_temporary() -> StorageResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            user_emails: db.open_tree("user_emails")?,
            admins: db.open_tree("admins")?,
            admin_emails: db.open_tree("admin_emails")?,
            rooms: db.open_tree("rooms")?,
            room_names: db.open_tree("room_names")?,
            subjects: db.open_tree("subjects")?,
            subject_codes: db.open_tree("subject_codes")?,
            timetables: db.open_tree("timetables")?,
            db,
        })
    }

    pub async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // --- users ---

    pub fn create_user(&self, user: &User) -> StorageResult<()> {
        claim(&self.user_emails, "email", &user.email, &user.id)?;
        put(&self.users, &user.id, user)
    }

    pub fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        fetch(&self.users, id)
    }

    pub fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        match self.user_emails.get(normalise(email))? {
            Some(id) => fetch(&self.users, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    pub fn list_users(&self, filter: &UserFilter) -> StorageResult<Vec<User>> {
        let mut users: Vec<User> = scan(&self.users)?;
        users.retain(|u| filter.matches(u));
        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(users)
    }

    /// Overwrites an existing user. The email is immutable once created.
    pub fn update_user(&self, user: &User) -> StorageResult<()> {
        put(&self.users, &user.id, user)
    }

    pub fn delete_user(&self, id: &str) -> StorageResult<Option<User>> {
        let removed: Option<User> = take(&self.users, id)?;
        if let Some(user) = &removed {
            release(&self.user_emails, &user.email, &user.id)?;
        }
        Ok(removed)
    }

    // --- admins ---

    pub fn create_admin(&self, admin: &Admin) -> StorageResult<()> {
        claim(&self.admin_emails, "email", &admin.email, &admin.id)?;
        put(&self.admins, &admin.id, admin)
    }

    pub fn get_admin(&self, id: &str) -> StorageResult<Option<Admin>> {
        fetch(&self.admins, id)
    }

    pub fn find_admin_by_email(&self, email: &str) -> StorageResult<Option<Admin>> {
        match self.admin_emails.get(normalise(email))? {
            Some(id) => fetch(&self.admins, &String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    pub fn list_admins(&self) -> StorageResult<Vec<Admin>> {
        let mut admins: Vec<Admin> = scan(&self.admins)?;
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }

    pub fn delete_admin(&self, id: &str) -> StorageResult<Option<Admin>> {
        let removed: Option<Admin> = take(&self.admins, id)?;
        if let Some(admin) = &removed {
            release(&self.admin_emails, &admin.email, &admin.id)?;
        }
        Ok(removed)
    }

    // --- rooms ---

    pub fn create_room(&self, room: &Room) -> StorageResult<()> {
        claim(&self.room_names, "room name", &room.name, &room.id)?;
        put(&self.rooms, &room.id, room)
    }

    pub fn get_room(&self, id: &str) -> StorageResult<Option<Room>> {
        fetch(&self.rooms, id)
    }

    /// All rooms sorted by name.
    pub fn list_rooms(&self) -> StorageResult<Vec<Room>> {
        let mut rooms: Vec<Room> = scan(&self.rooms)?;
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    /// Overwrites `room`; a changed name must still be free.
    pub fn update_room(&self, previous_name: &str, room: &Room) -> StorageResult<()> {
        rename(&self.room_names, "room name", previous_name, &room.name, &room.id)?;
        put(&self.rooms, &room.id, room)
    }

    pub fn delete_room(&self, id: &str) -> StorageResult<Option<Room>> {
        let removed: Option<Room> = take(&self.rooms, id)?;
        if let Some(room) = &removed {
            release(&self.room_names, &room.name, &room.id)?;
        }
        Ok(removed)
    }

    // --- subjects ---

    pub fn create_subject(&self, subject: &Subject) -> StorageResult<()> {
        claim(&self.subject_codes, "subject code", &subject.code, &subject.id)?;
        put(&self.subjects, &subject.id, subject)
    }

    pub fn get_subject(&self, id: &str) -> StorageResult<Option<Subject>> {
        fetch(&self.subjects, id)
    }

    pub fn list_subjects(&self) -> StorageResult<Vec<Subject>> {
        let mut subjects: Vec<Subject> = scan(&self.subjects)?;
        subjects.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(subjects)
    }

    pub fn update_subject(&self, previous_code: &str, subject: &Subject) -> StorageResult<()> {
        rename(&self.subject_codes, "subject code", previous_code, &subject.code, &subject.id)?;
        put(&self.subjects, &subject.id, subject)
    }

    pub fn delete_subject(&self, id: &str) -> StorageResult<Option<Subject>> {
        let removed: Option<Subject> = take(&self.subjects, id)?;
        if let Some(subject) = &removed {
            release(&self.subject_codes, &subject.code, &subject.id)?;
        }
        Ok(removed)
    }

    // --- timetables ---

    /// Stores `doc`, dropping any earlier timetable for the same class.
    /// Returns how many documents were replaced.
    pub fn save_timetable(&self, doc: &TimetableDocument) -> StorageResult<usize> {
        let stale: Vec<TimetableDocument> = scan::<TimetableDocument>(&self.timetables)?
            .into_iter()
            .filter(|existing| existing.id != doc.id && existing.same_class(doc))
            .collect();
        for old in &stale {
            self.timetables.remove(old.id.as_bytes())?;
        }
        put(&self.timetables, &doc.id, doc)?;
        Ok(stale.len())
    }

    pub fn get_timetable(&self, id: &str) -> StorageResult<Option<TimetableDocument>> {
        fetch(&self.timetables, id)
    }

    /// All timetables ordered by year, then division.
    pub fn list_timetables(&self) -> StorageResult<Vec<TimetableDocument>> {
        let mut docs: Vec<TimetableDocument> = scan(&self.timetables)?;
        docs.sort_by(|a, b| (&a.year, &a.division).cmp(&(&b.year, &b.division)));
        Ok(docs)
    }

    pub fn delete_timetable(&self, id: &str) -> StorageResult<Option<TimetableDocument>> {
        take(&self.timetables, id)
    }
}

fn normalise(key: &str) -> String {
    key.trim().to_lowercase()
}

fn put<T: Serialize>(tree: &Tree, id: &str, value: &T) -> StorageResult<()> {
    tree.insert(id.as_bytes(), serde_json::to_vec(value)?)?;
    Ok(())
}

fn fetch<T: DeserializeOwned>(tree: &Tree, id: &str) -> StorageResult<Option<T>> {
    match tree.get(id.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn take<T: DeserializeOwned>(tree: &Tree, id: &str) -> StorageResult<Option<T>> {
    match tree.remove(id.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &Tree) -> StorageResult<Vec<T>> {
    let mut out = Vec::new();
    for item in tree.iter() {
        let (_, bytes) = item?;
        out.push(serde_json::from_slice(&bytes)?);
    }
    Ok(out)
}

/// Maps `key` to `id` in `index` unless another id already holds it.
fn claim(index: &Tree, field: &'static str, key: &str, id: &str) -> StorageResult<()> {
    let key = normalise(key);
    match index.compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(id.as_bytes()))? {
        Ok(()) => Ok(()),
        Err(cas) if cas.current.as_deref() == Some(id.as_bytes()) => Ok(()),
        Err(_) => Err(StorageError::Duplicate { field, value: key }),
    }
}

/// Removes `key` from `index` if it still points at `id`.
fn release(index: &Tree, key: &str, id: &str) -> StorageResult<()> {
    let key = normalise(key);
    // A mismatch means someone else owns the key now; leave it alone.
    let _ = index.compare_and_swap(key.as_bytes(), Some(id.as_bytes()), None as Option<&[u8]>)?;
    Ok(())
}

fn rename(index: &Tree, field: &'static str, old: &str, new: &str, id: &str) -> StorageResult<()> {
    if normalise(old) == normalise(new) {
        return Ok(());
    }
    claim(index, field, new, id)?;
    release(index, old, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, RoomKind, DEFAULT_DEPARTMENT};
    use crate::timetable::parse_grid;
    use chrono::Utc;
    use serde_json::json;

    fn room(id: &str, name: &str) -> Room {
        Room {
            id: id.to_string(),
            name: name.to_string(),
            kind: RoomKind::Classroom,
            capacity: 60,
            department: DEFAULT_DEPARTMENT.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn timetable(id: &str, year: &str, division: &str) -> TimetableDocument {
        TimetableDocument {
            id: id.to_string(),
            year: year.to_string(),
            division: division.to_string(),
            department: Some("Computer".to_string()),
            timetable_data: parse_grid(json!({"Mon": {"1": [{"subject": "DBMS"}]}})).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_room_names_are_unique_case_insensitively() {
        let storage = Storage::open_temporary().expect("Failed to open storage");

        storage.create_room(&room("r1", "A-101")).unwrap();
        let err = storage.create_room(&room("r2", " a-101 ")).unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { field: "room name", .. }));
        assert_eq!(storage.list_rooms().unwrap().len(), 1);

        // freed by delete
        assert!(storage.delete_room("r1").unwrap().is_some());
        assert!(storage.delete_room("r1").unwrap().is_none());
        storage.create_room(&room("r2", "A-101")).unwrap();
    }

    #[test]
    fn test_room_rename_moves_the_index() {
        let storage = Storage::open_temporary().expect("Failed to open storage");
        storage.create_room(&room("r1", "A-101")).unwrap();
        storage.create_room(&room("r2", "B-201")).unwrap();

        let clash = room("r1", "B-201");
        assert!(storage.update_room("A-101", &clash).is_err());

        let renamed = room("r1", "C-301");
        storage.update_room("A-101", &renamed).unwrap();
        assert_eq!(storage.get_room("r1").unwrap().unwrap().name, "C-301");
        storage.create_room(&room("r3", "A-101")).unwrap();
    }

    #[test]
    fn test_user_lookup_by_email() {
        let storage = Storage::open_temporary().expect("Failed to open storage");
        let user = User {
            id: "u1".to_string(),
            name: "Meera".to_string(),
            email: "Meera@Uni.edu".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Teacher,
            department: Some("Computer".to_string()),
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
        storage.create_user(&user).unwrap();

        let found = storage.find_user_by_email("meera@uni.edu").unwrap().unwrap();
        assert_eq!(found.id, "u1");
        storage.delete_user("u1").unwrap();
        assert!(storage.find_user_by_email("meera@uni.edu").unwrap().is_none());
    }

    #[test]
    fn test_saving_a_class_timetable_replaces_the_previous_one() {
        let storage = Storage::open_temporary().expect("Failed to open storage");
        assert_eq!(storage.save_timetable(&timetable("t1", "SE", "A")).unwrap(), 0);
        assert_eq!(storage.save_timetable(&timetable("t2", "SE", "B")).unwrap(), 0);
        assert_eq!(storage.save_timetable(&timetable("t3", "se", "a")).unwrap(), 1);

        let mut ids: Vec<String> = storage
            .list_timetables()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["t2", "t3"]);
    }
}
