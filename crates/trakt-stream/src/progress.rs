//! Progress tracking and callbacks for batch processing.
//!
//! This module provides progress tracking, callbacks, and monitoring
//! for long-running streamline batches.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Progress information for a batch.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Stage being processed (e.g. "densify").
    pub stage: String,
    /// Items completed so far.
    pub completed: usize,
    /// Total number of items (if known).
    pub total: Option<usize>,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time.
    pub estimated_remaining: Option<Duration>,
}

impl ProgressInfo {
    /// Create new progress information.
    pub fn new(stage: impl Into<String>, completed: usize, total: Option<usize>, elapsed: Duration) -> Self {
        Self {
            stage: stage.into(),
            completed,
            total,
            elapsed,
            estimated_remaining: None,
        }
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total
            .filter(|&total| total > 0)
            .map(|total| (self.completed as f64 / total as f64) * 100.0)
    }

    /// Calculate estimated remaining time.
    pub fn calculate_remaining(&mut self) {
        if let Some(total) = self.total {
            if self.completed > 0 {
                let avg_time_per_item = self.elapsed.as_secs_f64() / self.completed as f64;
                let remaining = total.saturating_sub(self.completed);
                self.estimated_remaining = Some(Duration::from_secs_f64(avg_time_per_item * remaining as f64));
            }
        }
    }
}

/// Progress callback trait for monitoring batch progress.
pub trait ProgressCallback: Send + Sync {
    /// Called as items complete.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when a stage starts.
    fn on_start(&self, _stage: &str, _total: Option<usize>) {}

    /// Called when a stage completes.
    fn on_complete(&self, _info: &ProgressInfo) {}

    /// Called when a stage fails.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (items).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1000 }
    }
}

impl ConsoleProgressCallback {
    /// Create a new console progress callback.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.completed % self.log_interval == 0 || info.total == Some(info.completed) {
            let progress = info.progress_percent().unwrap_or(0.0);
            let remaining = info
                .estimated_remaining
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());

            tracing::info!(
                "{}: {}/{} ({:.1}%) | Elapsed: {:.2}s | ETA: {}",
                info.stage,
                info.completed,
                info.total.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
                progress,
                info.elapsed.as_secs_f64(),
                remaining
            );
        }
    }

    fn on_start(&self, stage: &str, total: Option<usize>) {
        match total {
            Some(total) => tracing::info!("{} started ({} items)", stage, total),
            None => tracing::info!("{} started", stage),
        }
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "{} completed: {} items in {:.2}s",
            info.stage,
            info.completed,
            info.elapsed.as_secs_f64()
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Processing failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl HistoryCallback {
    /// Create a new history callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Get the recorded errors.
    pub fn get_errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info.clone());
    }

    fn on_error(&self, error: &str) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }
}

/// Progress tracker that fans out to multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start: Arc<Mutex<Option<(String, Instant)>>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Add a callback, builder style.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Start tracking a stage.
    pub fn start(&self, stage: &str, total: Option<usize>) {
        *self.start.lock().unwrap_or_else(PoisonError::into_inner) = Some((stage.to_string(), Instant::now()));
        for callback in &self.callbacks {
            callback.on_start(stage, total);
        }
    }

    fn snapshot(&self, completed: usize, total: Option<usize>) -> ProgressInfo {
        let start = self.start.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let (stage, elapsed) = start
            .map(|(stage, t)| (stage, t.elapsed()))
            .unwrap_or_else(|| (String::new(), Duration::ZERO));
        ProgressInfo::new(stage, completed, total, elapsed)
    }

    /// Update progress.
    pub fn update(&self, completed: usize, total: Option<usize>) {
        if self.callbacks.is_empty() {
            return;
        }
        let mut info = self.snapshot(completed, total);
        info.calculate_remaining();
        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    /// Complete the current stage.
    pub fn complete(&self, completed: usize) {
        let info = self.snapshot(completed, Some(completed));
        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    /// Report an error.
    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}
