//! Per-teacher and per-student views pivoted out of class timetables.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{blank_to_none, eq_loose, ClassEntry, TimetableDocument, TimetableGrid};
use crate::models::User;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TeacherTimetable {
    pub teacher: String,
    pub timetable: TimetableGrid,
}

fn teacher_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Copy of `entry` tagged with the class it came from. Tags already on the
/// entry take precedence.
fn tag_with_class(entry: &ClassEntry, doc: &TimetableDocument) -> ClassEntry {
    let mut tagged = entry.clone();
    tagged.year.get_or_insert_with(|| doc.year.clone());
    tagged.division.get_or_insert_with(|| doc.division.clone());
    tagged
}

fn pivot_by_teacher<F>(docs: &[TimetableDocument], keep: F) -> BTreeMap<String, TeacherTimetable>
where
    F: Fn(&str) -> bool,
{
    let mut by_teacher: BTreeMap<String, TeacherTimetable> = BTreeMap::new();

    for doc in docs {
        for (day, slots) in &doc.timetable_data {
            for (slot, cell) in slots {
                for entry in cell {
                    let Some(name) = entry.teacher.as_deref().map(str::trim).filter(|n| !n.is_empty())
                    else {
                        continue;
                    };
                    let key = teacher_key(name);
                    if !keep(&key) {
                        continue;
                    }

                    by_teacher
                        .entry(key)
                        .or_insert_with(|| TeacherTimetable {
                            teacher: name.to_string(),
                            timetable: TimetableGrid::new(),
                        })
                        .timetable
                        .entry(day.clone())
                        .or_default()
                        .entry(slot.clone())
                        .or_default()
                        .push(tag_with_class(entry, doc));
                }
            }
        }
    }

    by_teacher
}

/// One timetable per teacher across every class, sorted by teacher name.
pub fn teacher_timetables(docs: &[TimetableDocument]) -> Vec<TeacherTimetable> {
    pivot_by_teacher(docs, |_| true).into_values().collect()
}

/// The timetable of a single teacher, or `None` when they teach nothing.
pub fn teacher_timetable(docs: &[TimetableDocument], teacher: &str) -> Option<TeacherTimetable> {
    let wanted = teacher_key(teacher);
    if wanted.is_empty() {
        return None;
    }
    pivot_by_teacher(docs, |key| key == wanted).remove(&wanted)
}

/// The class a student sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub year: String,
    pub division: String,
    pub department: Option<String>,
    pub batch: Option<String>,
}

impl StudentProfile {
    /// `None` until the student has filled in year and division.
    pub fn from_user(user: &User) -> Option<Self> {
        Some(Self {
            year: blank_to_none(&user.year)?.to_string(),
            division: blank_to_none(&user.division)?.to_string(),
            department: blank_to_none(&user.department).map(str::to_string),
            batch: blank_to_none(&user.batch).map(str::to_string),
        })
    }

    pub fn attends(&self, doc: &TimetableDocument) -> bool {
        eq_loose(&self.year, &doc.year)
            && eq_loose(&self.division, &doc.division)
            && match (blank_to_none(&self.department), blank_to_none(&doc.department)) {
                (Some(mine), Some(theirs)) => eq_loose(mine, theirs),
                _ => true,
            }
    }
}

/// Labs and tutorials split by batch are only shown to that batch; theory and
/// unbatched sessions are shown to everyone.
pub fn visible_to_batch(entry: &ClassEntry, batch: Option<&str>) -> bool {
    let batch = batch.map(str::trim).filter(|b| !b.is_empty());
    match (batch, blank_to_none(&entry.batch)) {
        (Some(mine), Some(theirs)) if !entry.is_theory() => eq_loose(mine, theirs),
        _ => true,
    }
}

/// Drops entries hidden from `batch`. Slots left empty stay in the grid.
pub fn filter_for_batch(grid: &TimetableGrid, batch: Option<&str>) -> TimetableGrid {
    grid.iter()
        .map(|(day, slots)| {
            let slots = slots
                .iter()
                .map(|(slot, cell)| {
                    let visible = cell
                        .iter()
                        .filter(|entry| visible_to_batch(entry, batch))
                        .cloned()
                        .collect();
                    (slot.clone(), visible)
                })
                .collect();
            (day.clone(), slots)
        })
        .collect()
}

/// The student's class timetables with other batches' labs removed.
pub fn student_timetables(
    docs: &[TimetableDocument],
    profile: &StudentProfile,
) -> Vec<TimetableDocument> {
    docs.iter()
        .filter(|doc| profile.attends(doc))
        .map(|doc| TimetableDocument {
            timetable_data: filter_for_batch(&doc.timetable_data, profile.batch.as_deref()),
            ..doc.clone()
        })
        .collect()
}
