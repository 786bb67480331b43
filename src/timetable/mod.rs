//! Timetable documents and the grid they carry.
//!
//! A grid maps day name → period number or time slot → class entries. The
//! scheduler produces the grids; this module only reads, reshapes and
//! exports them (see [`view`] and [`csv`]).

pub mod csv;
pub mod view;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub type TimetableGrid = BTreeMap<String, BTreeMap<String, Vec<ClassEntry>>>;

/// One class in one slot. Fields the scheduler adds beyond the known ones are
/// kept in `extra` and written back unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClassEntry {
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub lab_part: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub lab_session_id: Option<String>,
    /// Set on entries pivoted out of their class document.
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClassEntry {
    pub fn is_theory(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.trim().eq_ignore_ascii_case("theory"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimetableDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub year: String,
    pub division: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "deserialize_grid")]
    pub timetable_data: TimetableGrid,
    pub created_at: DateTime<Utc>,
}

impl TimetableDocument {
    /// Same year, division and department (case-insensitive, trimmed; a missing
    /// department only matches another missing department).
    pub fn same_class(&self, other: &TimetableDocument) -> bool {
        eq_loose(&self.year, &other.year)
            && eq_loose(&self.division, &other.division)
            && match (blank_to_none(&self.department), blank_to_none(&other.department)) {
                (Some(a), Some(b)) => eq_loose(a, b),
                (None, None) => true,
                _ => false,
            }
    }

    pub fn entry_count(&self) -> usize {
        grid_entry_count(&self.timetable_data)
    }
}

pub fn grid_entry_count(grid: &TimetableGrid) -> usize {
    grid.values().flat_map(|slots| slots.values()).map(Vec::len).sum()
}

pub(crate) fn eq_loose(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub(crate) fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Reads a grid out of an arbitrary JSON value (e.g. a scheduler response).
pub fn parse_grid(value: Value) -> Result<TimetableGrid, serde_json::Error> {
    deserialize_grid(value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCell {
    Many(Vec<ClassEntry>),
    One(ClassEntry),
    Empty(()),
}

fn deserialize_grid<'de, D>(deserializer: D) -> Result<TimetableGrid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Option<BTreeMap<String, RawCell>>> =
        BTreeMap::deserialize(deserializer)?;

    Ok(raw
        .into_iter()
        .map(|(day, slots)| {
            let slots = slots
                .unwrap_or_default()
                .into_iter()
                .map(|(slot, cell)| {
                    let entries = match cell {
                        RawCell::Many(entries) => entries,
                        RawCell::One(entry) => vec![entry],
                        RawCell::Empty(()) => Vec::new(),
                    };
                    (slot, entries)
                })
                .collect();
            (day, slots)
        })
        .collect())
}

/// Accepts a string, number or bool; blank strings and null become `None`.
pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

/// Accepts a number or a numeric string (form inputs send `"45"`); blank
/// strings and null become `None`.
pub(crate) fn opt_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let text = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(D::Error::custom(format!("expected a number, found {other}")));
        }
    };
    text.parse()
        .map(Some)
        .map_err(|e| D::Error::custom(format!("invalid number {text:?}: {e}")))
}

/// The days and slots to render, in display order.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct GridLayout {
    pub days: Vec<String>,
    pub slots: Vec<String>,
}

impl GridLayout {
    pub fn of(grid: &TimetableGrid) -> Self {
        Self::from_grids(std::iter::once(grid))
    }

    /// Union of the days and slots used by any of `grids`.
    pub fn from_grids<'a, I>(grids: I) -> Self
    where
        I: IntoIterator<Item = &'a TimetableGrid>,
    {
        let mut days = BTreeSet::new();
        let mut slots = BTreeSet::new();
        for grid in grids {
            for (day, day_slots) in grid {
                days.insert(day.clone());
                slots.extend(day_slots.keys().cloned());
            }
        }

        let mut days: Vec<String> = days.into_iter().collect();
        days.sort_by_key(|d| day_rank(d));
        let mut slots: Vec<String> = slots.into_iter().collect();
        slots.sort_by(|a, b| compare_slots(a, b));

        Self { days, slots }
    }
}

/// Weekday position for `Mon`/`Monday`/`monday`..., unknown names sort last.
pub fn day_rank(day: &str) -> (usize, String) {
    let lower = day.trim().to_ascii_lowercase();
    let rank = lower
        .get(..3)
        .and_then(|prefix| WEEKDAYS.iter().position(|w| w.eq_ignore_ascii_case(prefix)))
        .unwrap_or(WEEKDAYS.len());
    (rank, lower)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SlotKey {
    Period(u32),
    Time(u32, String),
    Other(String),
}

fn slot_key(slot: &str) -> SlotKey {
    let slot = slot.trim();
    if let Ok(n) = slot.parse::<u32>() {
        return SlotKey::Period(n);
    }
    let start = slot.split('-').next().unwrap_or(slot).trim();
    if let Some((h, m)) = start.split_once(':') {
        let parsed = (h.trim().parse::<u32>(), m.trim().parse::<u32>());
        if let (Ok(h @ 0..=23), Ok(m @ 0..=59)) = parsed {
            return SlotKey::Time(h * 60 + m, slot.to_string());
        }
    }
    SlotKey::Other(slot.to_string())
}

/// Period numbers first (numerically), then time slots by start time, then the rest.
pub fn compare_slots(a: &str, b: &str) -> Ordering {
    slot_key(a).cmp(&slot_key(b))
}

/// Row label: `P3` for period 3, the slot text itself otherwise.
pub fn slot_label(slot: &str) -> String {
    match slot_key(slot) {
        SlotKey::Period(n) => format!("P{n}"),
        _ => slot.trim().to_string(),
    }
}
