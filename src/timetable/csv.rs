//! Slot-by-day CSV export of a timetable grid.

use super::{slot_label, ClassEntry, GridLayout, TimetableGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvStyle {
    /// A class timetable: each entry names its teacher.
    Class,
    /// A teacher's own timetable: each entry names the class instead.
    Teacher,
}

pub fn to_csv(grid: &TimetableGrid, layout: &GridLayout, style: CsvStyle) -> String {
    let mut out = String::from("Period / Day");
    for day in &layout.days {
        out.push(',');
        out.push_str(&escape(day));
    }
    out.push('\n');

    for slot in &layout.slots {
        out.push_str(&escape(&slot_label(slot)));
        for day in &layout.days {
            out.push(',');
            let cell = grid
                .get(day)
                .and_then(|slots| slots.get(slot))
                .map(Vec::as_slice)
                .unwrap_or_default();
            if cell.is_empty() {
                out.push('-');
            } else {
                let combined: Vec<String> = cell.iter().map(|e| entry_label(e, style)).collect();
                out.push_str(&quote(&combined.join(" | ")));
            }
        }
        out.push('\n');
    }

    out
}

fn entry_label(entry: &ClassEntry, style: CsvStyle) -> String {
    let subject = entry.subject.as_deref().unwrap_or("-");
    let extra = [
        entry.year.as_deref().map(|y| format!("Y:{y}")),
        entry.division.as_deref().map(|d| format!("Div:{d}")),
        entry.room.as_deref().map(|r| format!("R:{r}")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    match style {
        CsvStyle::Class => {
            let teacher = entry.teacher.as_deref().unwrap_or("-");
            if extra.is_empty() {
                format!("{subject} ({teacher})")
            } else {
                format!("{subject} ({teacher} {extra})")
            }
        }
        CsvStyle::Teacher if extra.is_empty() => subject.to_string(),
        CsvStyle::Teacher => format!("{subject} ({extra})"),
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        quote(field)
    } else {
        field.to_string()
    }
}
