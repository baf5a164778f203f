//! az-logging: NDJSON search events.
//!
//! One JSON object per line, appended. Records are versioned (`*V1`) and carry an `event` tag
//! plus a millisecond timestamp, so several runs can share one file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Event schema version written into every record.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

pub fn now_ms() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfoV1 {
    pub schema_version: u32,
    pub engine_version: String,
}

impl VersionInfoV1 {
    pub fn new(engine_version: &str) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            engine_version: engine_version.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStatsV1 {
    /// `Debug` rendering of the action.
    pub action: String,
    pub prior: f32,
    pub logit: f32,
    pub visits: u32,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersV1 {
    pub action_nodes: u64,
    pub state_nodes: u64,
    pub terminal_states: u64,
    pub inference_calls: u64,
    pub evictions: u64,
}

/// One finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEventV1 {
    pub event: String,
    pub ts_ms: u64,
    pub v: VersionInfoV1,

    pub search_id: u64,
    pub game: String,
    /// `"ucb"` or `"halving"`.
    pub mode: String,
    pub simulations: u32,
    pub wall_ms: u64,

    pub root_player: usize,
    pub root_values: Vec<f32>,
    pub chosen: Option<String>,
    pub most_visited: Option<String>,
    pub actions: Vec<ActionStatsV1>,
    pub counters: CountersV1,
}

/// One coordinator flush within a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushEventV1 {
    pub event: String,
    pub ts_ms: u64,
    pub search_id: u64,
    /// Position of the flush within its search.
    pub index: u32,
    pub batch_size: usize,
    pub resumed: usize,
}

#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("ndjson io: {0}")]
    Io(#[from] io::Error),
    #[error("ndjson encode: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only NDJSON writer.
///
/// Contract: each call writes exactly one JSON object followed by a newline.
pub struct NdjsonWriter {
    w: BufWriter<File>,
    lines_since_flush: u64,
    flush_every_lines: u64,
}

impl NdjsonWriter {
    /// Open a file for append. Creates it if it doesn't exist.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, NdjsonError> {
        Self::open_append_with_flush(path, 0)
    }

    /// `flush_every_lines=0` disables periodic flushing.
    pub fn open_append_with_flush(
        path: impl AsRef<Path>,
        flush_every_lines: u64,
    ) -> Result<Self, NdjsonError> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            w: BufWriter::new(f),
            lines_since_flush: 0,
            flush_every_lines,
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<(), NdjsonError> {
        let mut buf = serde_json::to_vec(event)?;
        buf.push(b'\n');
        self.w.write_all(&buf)?;
        self.lines_since_flush += 1;
        if self.flush_every_lines > 0 && self.lines_since_flush >= self.flush_every_lines {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.w.flush()?;
        self.lines_since_flush = 0;
        Ok(())
    }
}

/// Read every complete JSON line of `path`, skipping blank or truncated ones.
pub fn read_events_lenient(path: impl AsRef<Path>) -> Result<Vec<serde_json::Value>, NdjsonError> {
    let s = std::fs::read_to_string(path)?;
    Ok(s.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
