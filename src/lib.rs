//! Timetable portal: university timetable management backend.
//!
//! Sled document store for users, admins, rooms, subjects and generated
//! timetables; an Axum REST API over it; a client for the external Python
//! optimiser that generates timetables; and the view logic that pivots stored
//! class timetables into per-teacher and per-student views and CSV exports.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod models;
pub mod rest;
pub mod scheduler;
pub mod storage;
pub mod timetable;
