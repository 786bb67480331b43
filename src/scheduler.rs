//! Client for the external timetable optimiser.
//!
//! The optimiser is a separate Python service; this crate only forwards the
//! admin's constraint payload to `POST {base}/generate` and reads a grid back.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::timetable::{parse_grid, TimetableGrid};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scheduler returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("scheduler response has no usable timetable: {0}")]
    BadGrid(#[from] serde_json::Error),
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Sends the opaque constraint payload, returns the raw response.
    async fn generate(&self, payload: &Value) -> Result<Value, SchedulerError>;
}

pub struct PythonScheduler {
    client: Client,
    endpoint: String,
}

impl PythonScheduler {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SchedulerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: generate_url(base_url),
        })
    }
}

pub fn generate_url(base_url: &str) -> String {
    format!("{}/generate", base_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl Scheduler for PythonScheduler {
    async fn generate(&self, payload: &Value) -> Result<Value, SchedulerError> {
        info!("Requesting timetable from scheduler ({})", self.endpoint);
        let t0 = Instant::now();

        let response = self.client.post(&self.endpoint).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Scheduler returned {} after {} ms", status, t0.elapsed().as_millis());
            return Err(SchedulerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        info!("Scheduler answered in {} ms", t0.elapsed().as_millis());
        Ok(body)
    }
}

/// Pulls the grid out of a scheduler response: the `timetable` or
/// `timetableData` member when present, otherwise the whole body.
pub fn grid_from_response(mut response: Value) -> Result<TimetableGrid, SchedulerError> {
    let wrapped = ["timetable", "timetableData"]
        .into_iter()
        .find(|key| response.get(*key).is_some_and(Value::is_object));
    let grid = match wrapped {
        Some(key) => response[key].take(),
        None => response,
    };
    Ok(parse_grid(grid)?)
}
