//! Scripted fetcher and feed builders shared by synchronizer and scheduler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{SyncError, SyncResult};
use crate::remote::{Fetcher, validate_calendar_text};

#[derive(Debug, Clone)]
pub enum Scripted {
    Body(String),
    Status(u16),
}

/// Serves canned responses per URL; unknown URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for `gate` to be notified first.
    pub fn gated(gate: Arc<Notify>) -> Self {
        FakeFetcher {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Body(body.into()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Status(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> SyncResult<String> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.calls.lock().unwrap().push(url.to_string());
        let response = self.responses.lock().unwrap().get(url).cloned();

        match response {
            Some(Scripted::Body(body)) => {
                validate_calendar_text(&body)?;
                Ok(body)
            }
            Some(Scripted::Status(status)) => Err(SyncError::HttpStatus(status)),
            None => Err(SyncError::HttpStatus(404)),
        }
    }
}

/// Feed named `name` with one 1-hour UTC event per `(summary, start)` pair.
pub fn feed(name: &str, events: &[(&str, &str)]) -> String {
    let mut ics = format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nX-WR-CALNAME:{}\r\n", name);
    for (i, (summary, start)) in events.iter().enumerate() {
        ics.push_str(&format!(
            "BEGIN:VEVENT\r\nUID:{}-{}\r\nSUMMARY:{}\r\nDTSTART:{}\r\nDURATION:PT1H\r\nEND:VEVENT\r\n",
            name, i, summary, start
        ));
    }
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

/// A start a few days from now, so it is inside the current window.
pub fn soon(days: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::days(days))
        .format("%Y%m%dT100000Z")
        .to_string()
}
