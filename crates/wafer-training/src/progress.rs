//! Per-run logging.
//!
//! A [`RunLog`] is created at the start of a training or prediction run and
//! handed to every component at construction. It forwards [`ProgressEvent`]s
//! to a [`ProgressSink`] and is flushed by [`RunLog::finish`].

use crate::error::{Stage, StageError, StageResult, TrainingResult};
use crate::trainer::TrainerState;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifier for a single training or prediction run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { run_id: RunId, pipeline: String },
    StageStarted { run_id: RunId, stage: Stage },
    Message { run_id: RunId, stage: Stage, message: String },
    Warning { run_id: RunId, stage: Stage, message: String },
    TrainerState { run_id: RunId, state: TrainerState },
    ModelScored { run_id: RunId, model: String, accuracy: f64 },
    StageFinished { run_id: RunId, stage: Stage },
    StageFailed { run_id: RunId, stage: Stage, error: String, location: String },
    RunFinished { run_id: RunId, success: bool },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);

    fn flush(&self) -> TrainingResult<()> {
        Ok(())
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { run_id, pipeline } => info!(%run_id, %pipeline, "run started"),
            ProgressEvent::StageStarted { run_id, stage } => info!(%run_id, %stage, "stage started"),
            ProgressEvent::Message { run_id, stage, message } => info!(%run_id, %stage, "{message}"),
            ProgressEvent::Warning { run_id, stage, message } => warn!(%run_id, %stage, "{message}"),
            ProgressEvent::TrainerState { run_id, state } => info!(%run_id, ?state, "trainer state"),
            ProgressEvent::ModelScored { run_id, model, accuracy } => {
                info!(%run_id, %model, accuracy, "model scored");
            }
            ProgressEvent::StageFinished { run_id, stage } => info!(%run_id, %stage, "stage finished"),
            ProgressEvent::StageFailed { run_id, stage, error, location } => {
                error!(%run_id, %stage, %location, error = %error, "stage failed");
            }
            ProgressEvent::RunFinished { run_id, success } => info!(%run_id, success, "run finished"),
        }
    }
}

/// Appends events as JSON lines to one log file per run.
pub struct JsonlFileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlFileSink {
    /// Open `<dir>/<MM_DD_YYYY_HH_MM_SS>.log`, creating `dir` when needed.
    pub fn create(dir: &Path) -> TrainingResult<Self> {
        std::fs::create_dir_all(dir)?;
        let name = format!("{}.log", chrono::Local::now().format("%m_%d_%Y_%H_%M_%S"));
        let path = dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer: Mutex::new(BufWriter::new(file)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressSink for JsonlFileSink {
    fn on_event(&self, event: &ProgressEvent) {
        let line = serde_json::json!({
            "ts": chrono::Utc::now().to_rfc3339(),
            "event": event,
        });
        if let Ok(mut writer) = self.writer.lock() {
            // A failed log write must not fail the run.
            let _ = writeln!(writer, "{line}");
        }
    }

    fn flush(&self) -> TrainingResult<()> {
        if let Ok(mut writer) = self.writer.lock() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Sends every event to each inner sink.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanoutSink {
    fn on_event(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }

    fn flush(&self) -> TrainingResult<()> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Keeps events in memory; used by tests and embedders that inspect a run.
#[derive(Debug, Default)]
pub struct MemoryProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemoryProgressSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.to_vec()).unwrap_or_default()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn on_event(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Injected per-run logger.
#[derive(Clone)]
pub struct RunLog {
    run_id: RunId,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").field("run_id", &self.run_id).finish_non_exhaustive()
    }
}

impl RunLog {
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { run_id: RunId::new(), sink }
    }

    /// A run log that only forwards to `tracing`.
    #[must_use]
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingProgressSink))
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn emit(&self, event: &ProgressEvent) {
        self.sink.on_event(event);
    }

    pub fn start(&self, pipeline: &str) {
        self.emit(&ProgressEvent::RunStarted { run_id: self.run_id.clone(), pipeline: pipeline.to_string() });
    }

    /// Emit the terminal event and flush the sink.
    pub fn finish(&self, success: bool) -> TrainingResult<()> {
        self.emit(&ProgressEvent::RunFinished { run_id: self.run_id.clone(), success });
        self.sink.flush()
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) {
        self.emit(&ProgressEvent::Message { run_id: self.run_id.clone(), stage, message: message.into() });
    }

    pub fn warn(&self, stage: Stage, message: impl Into<String>) {
        self.emit(&ProgressEvent::Warning { run_id: self.run_id.clone(), stage, message: message.into() });
    }

    pub fn trainer_state(&self, state: TrainerState) {
        self.emit(&ProgressEvent::TrainerState { run_id: self.run_id.clone(), state });
    }

    pub fn model_scored(&self, model: &str, accuracy: f64) {
        self.emit(&ProgressEvent::ModelScored {
            run_id: self.run_id.clone(),
            model: model.to_string(),
            accuracy,
        });
    }

    /// Run a stage body, logging its start and outcome and wrapping any failure
    /// into a [`StageError`] that records the caller's location.
    #[track_caller]
    pub fn stage<T>(&self, stage: Stage, body: impl FnOnce() -> TrainingResult<T>) -> StageResult<T> {
        let location = Location::caller();
        self.emit(&ProgressEvent::StageStarted { run_id: self.run_id.clone(), stage });
        match body() {
            Ok(value) => {
                self.emit(&ProgressEvent::StageFinished { run_id: self.run_id.clone(), stage });
                Ok(value)
            }
            Err(source) => {
                let err = StageError { stage, location, source };
                self.emit(&ProgressEvent::StageFailed {
                    run_id: self.run_id.clone(),
                    stage,
                    error: err.source.to_string(),
                    location: format!("{}:{}", location.file(), location.line()),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainingError;
    use tempfile::TempDir;

    #[test]
    fn test_stage_success_emits_start_and_finish() {
        let sink = Arc::new(MemoryProgressSink::default());
        let log = RunLog::new(sink.clone());
        let value = log.stage(Stage::Ingestion, || Ok(7)).unwrap();
        assert_eq!(value, 7);

        let events = sink.events();
        assert!(matches!(events[0], ProgressEvent::StageStarted { stage: Stage::Ingestion, .. }));
        assert!(matches!(events[1], ProgressEvent::StageFinished { stage: Stage::Ingestion, .. }));
    }

    #[test]
    fn test_stage_failure_wraps_typed_cause() {
        let sink = Arc::new(MemoryProgressSink::default());
        let log = RunLog::new(sink.clone());
        let err = log
            .stage::<()>(Stage::Training, || Err(TrainingError::NoModelEvaluated))
            .unwrap_err();

        assert_eq!(err.stage, Stage::Training);
        assert!(matches!(err.source, TrainingError::NoModelEvaluated));
        assert!(err.location.file().ends_with("progress.rs"));
        assert!(sink.events().iter().any(|e| matches!(e, ProgressEvent::StageFailed { .. })));
    }

    #[test]
    fn test_jsonl_sink_writes_lines_on_finish() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(JsonlFileSink::create(&temp.path().join("logs")).unwrap());
        let log = RunLog::new(sink.clone());
        log.start("train");
        log.info(Stage::Ingestion, "hello");
        log.finish(true).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"]["type"], "run_started");
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemoryProgressSink::default());
        let b = Arc::new(MemoryProgressSink::default());
        let log = RunLog::new(Arc::new(FanoutSink::new(vec![a.clone() as Arc<dyn ProgressSink>, b.clone()])));
        log.model_scored("SVC", 0.75);
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events(), a.events());
    }
}
