//! C4 — Append-only JSONL trace log.
//!
//! Same file-append discipline as a progress tracker that never rewrites
//! history: open-append-write, read back by parsing each line independently.
//! `event_id` is assigned monotonically by the writer rather than trusted
//! from the caller, so ordering survives even if two call sites race.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    RunStart,
    RunEnd,
    IterationStart,
    IterationEnd,
    GenerationStart,
    GenerationEnd,
    TestingStart,
    TestingEnd,
    EvaluationStart,
    EvaluationEnd,
    ScreenshotTaken,
    PatchPlanned,
    PatchApplied,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_id: u64,
    pub timestamp: String,
    pub event_type: TraceEventType,
    pub message: String,
    pub data: serde_json::Value,
}

pub struct TraceWriter {
    path: PathBuf,
    next_event_id: AtomicU64,
}

impl TraceWriter {
    /// Open (or create) the trace file at `path`, resuming `event_id`
    /// numbering one past whatever is already on disk.
    pub fn open(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let next_event_id = if path.exists() {
            Self::read_all_from(&path)?
                .last()
                .map(|e| e.event_id + 1)
                .unwrap_or(0)
        } else {
            0
        };
        Ok(Self {
            path,
            next_event_id: AtomicU64::new(next_event_id),
        })
    }

    pub fn record(
        &self,
        event_type: TraceEventType,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> RuntimeResult<TraceEvent> {
        let event = TraceEvent {
            event_id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            message: message.into(),
            data,
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&event)?)?;
        Ok(event)
    }

    pub fn read_all(&self) -> RuntimeResult<Vec<TraceEvent>> {
        Self::read_all_from(&self.path)
    }

    fn read_all_from(path: &Path) -> RuntimeResult<Vec<TraceEvent>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_monotonic_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::open(dir.path().join("trace.jsonl")).unwrap();
        let a = writer
            .record(TraceEventType::RunStart, "run started", serde_json::json!({}))
            .unwrap();
        let b = writer
            .record(TraceEventType::IterationStart, "iter 1", serde_json::json!({"iteration": 1}))
            .unwrap();
        assert_eq!(a.event_id, 0);
        assert_eq!(b.event_id, 1);

        let replayed = writer.read_all().unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].event_id, 0);
        assert_eq!(replayed[1].event_id, 1);
    }

    #[test]
    fn reopening_resumes_event_id_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        {
            let writer = TraceWriter::open(&path).unwrap();
            writer.record(TraceEventType::RunStart, "start", serde_json::json!({})).unwrap();
        }
        let writer = TraceWriter::open(&path).unwrap();
        let next = writer.record(TraceEventType::RunEnd, "end", serde_json::json!({})).unwrap();
        assert_eq!(next.event_id, 1);
    }
}
