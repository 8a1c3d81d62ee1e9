//! Text log sinks and the progress record written during a run

use super::{grid_cells, MetricResult};
use crate::error::Result;
use crate::plan::PlanRow;
use crate::search::GridOutcome;
use crate::validation::Metric;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Append-only destination for the human readable run log
pub trait LogSink: Send {
    fn append(&mut self, text: &str) -> Result<()>;
}

/// Writes the log to a file, flushing after every append so a failed run
/// still leaves its record behind
#[derive(Debug)]
pub struct FileLogSink {
    writer: BufWriter<File>,
}

impl FileLogSink {
    /// Create (or truncate) `path` and stamp the run start
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "Run started: {}", chrono::Local::now().to_rfc3339())?;
        writer.flush()?;
        Ok(Self { writer })
    }
}

impl LogSink for FileLogSink {
    fn append(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps the log in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    buffer: Arc<Mutex<String>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&mut self, text: &str) -> Result<()> {
        self.buffer.lock().push_str(text);
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn append(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Formats progress blocks onto a sink
pub struct ProgressLog<'a> {
    sink: &'a mut dyn LogSink,
}

impl<'a> ProgressLog<'a> {
    pub fn new(sink: &'a mut dyn LogSink) -> Self {
        Self { sink }
    }

    fn line(&mut self, text: String) -> Result<()> {
        self.sink.append(&text)?;
        self.sink.append("\n")
    }

    /// `index` is zero based; the log shows it one based
    pub fn row_started(&mut self, index: usize, total: usize, row: &PlanRow) -> Result<()> {
        self.line(format!("Line: {}/{}", index + 1, total))?;
        self.line(row.to_string())
    }

    pub fn features(&mut self, elapsed: Duration) -> Result<()> {
        self.line(format!("Got Features: {:.4} sec", elapsed.as_secs_f64()))
    }

    pub fn scoring(&mut self, metric: Metric) -> Result<()> {
        self.line(format!("Scoring: {}", metric))
    }

    pub fn grid_search(&mut self, elapsed: Duration, grid: &GridOutcome) -> Result<()> {
        let [mean, std, params] = grid_cells(grid);
        self.line(format!("Grid Search: {:.4} sec", elapsed.as_secs_f64()))?;
        self.line(format!("Grid Search Results: {}, {}, {}", mean, std, params))
    }

    pub fn scores(&mut self, elapsed: Duration, result: &MetricResult) -> Result<()> {
        self.line(format!("Got Scores: {:.4} sec", elapsed.as_secs_f64()))?;
        self.line(format!("Scores mean: {}", result.eval_mean))?;
        self.line(format!("Scores std: {}", result.eval_std))?;
        self.line(format!("Scores: {}\n", result.eval_scores_cell()))
    }

    pub fn failure(&mut self, metric: Metric, kind: &str, message: &str) -> Result<()> {
        self.line(format!("Failed ({}): {}: {}\n", metric, kind, message))
    }
}
