use crate::error::Resource;
use crate::snapshot::Snapshot;
use anyhow::Result;
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicBool, Ordering},
    mpsc,
};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

// ── Events from pipeline to UI ──────────────────────────────────────────────

/// Headline numbers of a written snapshot, small enough to ship over a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub updated_at: NaiveDateTime,
    pub rows: usize,
    pub total_cases: u64,
    pub unknown: usize,
    /// (id, name, positivi, positivi_1000), highest rate first.
    pub top: Vec<(String, String, u64, f64)>,
}

impl SnapshotSummary {
    pub fn of(snapshot: &Snapshot, top_n: usize) -> Self {
        Self {
            updated_at: snapshot.updated_at,
            rows: snapshot.len(),
            total_cases: snapshot.total_cases(),
            unknown: snapshot.unknown.len(),
            top: snapshot
                .top_by_rate(top_n)
                .into_iter()
                .map(|(id, r)| (id.to_string(), r.denominazione.clone(), r.positivi, r.positivi_1000))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Log(String),
    Warning(String),

    CycleStarted { cycle: u64 },
    UpdateDetected { updated_at: NaiveDateTime },
    SnapshotSkipped { path: PathBuf },

    DownloadStarted { resource: Resource, total_bytes: u64 },
    DownloadProgress { bytes_read: u64 },
    DownloadComplete { resource: Resource, size_bytes: u64 },

    SnapshotWritten { path: PathBuf, summary: SnapshotSummary },
    CycleFailed { cycle: u64, message: String },
    Waiting { seconds: u64 },

    BackfillStarted { total: usize },
    BackfillEntry { index: usize, updated_at: NaiveDateTime },

    Finished,
    Error(String),
}

// ── Pipeline control (pause / cancel) ───────────────────────────────────────

/// Returned by [`PipelineControl::check`] and [`PipelineControl::sleep`] after a cancel.
#[derive(thiserror::Error, Debug)]
#[error("Cancelled by user")]
pub struct Cancelled;

pub struct PipelineControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl PipelineControl {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        // taken so a waiter between its flag check and its wait cannot miss the notify
        let _guard = self.lock.lock().unwrap();
        self.cvar.notify_all();
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.resume(); // unblock if paused or sleeping
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks while paused. Returns `Err` if cancelled.
    pub fn check(&self) -> Result<()> {
        let mut guard = self.lock.lock().unwrap();
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(Cancelled.into());
            }
            if !self.paused.load(Ordering::SeqCst) {
                return Ok(());
            }
            guard = self.cvar.wait(guard).unwrap();
        }
    }

    /// Sleep for `dur`, waking early on cancel. Returns `Err` if cancelled.
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        let deadline = Instant::now() + dur;
        {
            let mut guard = self.lock.lock().unwrap();
            loop {
                if self.cancelled.load(Ordering::SeqCst) {
                    return Err(Cancelled.into());
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                guard = self.cvar.wait_timeout(guard, deadline - now).unwrap().0;
            }
        }
        self.check()
    }
}

impl Default for PipelineControl {
    fn default() -> Self {
        Self::new()
    }
}

// ── EventSink trait ─────────────────────────────────────────────────────────

/// Abstraction for sending pipeline events.
pub trait EventSink: Send + Sync {
    fn send(&self, event: UiEvent);
    /// Check for pause/cancel. Blocks while paused. Returns Err if cancelled.
    fn check(&self) -> Result<()>;
    /// Wait between poll cycles. Returns Err if cancelled while waiting.
    fn wait(&self, dur: Duration) -> Result<()>;
}

// ── Console sink (headless mode) ────────────────────────────────────────────

pub struct ConsoleSink {
    pb: Mutex<Option<ProgressBar>>,
    control: Arc<PipelineControl>,
}

impl ConsoleSink {
    pub fn new() -> Arc<Self> {
        Self::with_control(Arc::new(PipelineControl::new()))
    }

    pub fn with_control(control: Arc<PipelineControl>) -> Arc<Self> {
        Arc::new(Self {
            pb: Mutex::new(None),
            control,
        })
    }

    fn make_pb(total: u64, template: &str) -> ProgressBar {
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    fn finish_pb(&self) {
        if let Some(pb) = self.pb.lock().unwrap().take() {
            pb.finish_and_clear();
        }
    }
}

impl EventSink for ConsoleSink {
    fn send(&self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => info!("{}", msg),
            UiEvent::Warning(msg) => warn!("{}", msg),

            UiEvent::CycleStarted { cycle } => {
                println!("\n━━━ Cycle {} ━━━", cycle);
            }
            UiEvent::UpdateDetected { updated_at } => {
                info!("Latest update on the dashboard: {}", updated_at);
            }
            UiEvent::SnapshotSkipped { path } => {
                info!("No new data, {} already exists", path.display());
            }

            UiEvent::DownloadStarted { resource, total_bytes } => {
                let pb = Self::make_pb(
                    total_bytes,
                    "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                );
                pb.set_message(resource.file_name());
                *self.pb.lock().unwrap() = Some(pb);
            }
            UiEvent::DownloadProgress { bytes_read } => {
                if let Some(pb) = self.pb.lock().unwrap().as_ref() {
                    pb.set_position(bytes_read);
                }
            }
            UiEvent::DownloadComplete { resource, size_bytes } => {
                self.finish_pb();
                info!("Downloaded {} ({} bytes)", resource, size_bytes);
            }

            UiEvent::SnapshotWritten { path, summary } => {
                self.finish_pb();
                println!(
                    "  Wrote {} ({} municipalities, {} positivi)",
                    path.display(),
                    summary.rows,
                    summary.total_cases
                );
                if summary.unknown > 0 {
                    warn!("{} municipalities had no name in the reference list", summary.unknown);
                }
            }
            UiEvent::CycleFailed { cycle, message } => {
                self.finish_pb();
                error!("Cycle {} failed: {}", cycle, message);
            }
            UiEvent::Waiting { seconds } => {
                info!("Next check in {}s", seconds);
            }

            UiEvent::BackfillStarted { total } => {
                let pb = Self::make_pb(
                    total as u64,
                    "  Backfill [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                );
                *self.pb.lock().unwrap() = Some(pb);
            }
            UiEvent::BackfillEntry { index, updated_at } => {
                if let Some(pb) = self.pb.lock().unwrap().as_ref() {
                    pb.set_position(index as u64);
                    pb.set_message(updated_at.to_string());
                }
            }

            UiEvent::Finished => {
                self.finish_pb();
                println!("\n=== Complete ===");
            }
            UiEvent::Error(msg) => {
                self.finish_pb();
                error!("{}", msg);
            }
        }
    }

    fn check(&self) -> Result<()> {
        self.control.check()
    }

    fn wait(&self, dur: Duration) -> Result<()> {
        self.control.sleep(dur)
    }
}

// ── Channel sink (TUI mode) ────────────────────────────────────────────────

pub struct ChannelSink {
    tx: mpsc::Sender<UiEvent>,
    control: Arc<PipelineControl>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<UiEvent>, control: Arc<PipelineControl>) -> Arc<Self> {
        Arc::new(Self { tx, control })
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    fn check(&self) -> Result<()> {
        self.control.check()
    }

    fn wait(&self, dur: Duration) -> Result<()> {
        self.control.sleep(dur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_interrupts_sleep() {
        let control = Arc::new(PipelineControl::new());
        let c = control.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let result = c.sleep(Duration::from_secs(30));
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        control.cancel();
        let (result, elapsed) = handle.join().unwrap();
        assert!(result.unwrap_err().is::<Cancelled>());
        assert!(elapsed < Duration::from_secs(10));
    }

    #[test]
    fn test_sleep_elapses() {
        let control = PipelineControl::new();
        let start = Instant::now();
        control.sleep(Duration::from_millis(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pause_blocks_check_until_resume() {
        let control = Arc::new(PipelineControl::new());
        control.pause();
        assert!(control.is_paused());

        let c = control.clone();
        let handle = thread::spawn(move || c.check());
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        control.resume();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = mpsc::channel();
        let control = Arc::new(PipelineControl::new());
        let sink = ChannelSink::new(tx, control.clone());
        sink.send(UiEvent::Log("hello".into()));
        assert!(matches!(rx.try_recv().unwrap(), UiEvent::Log(ref m) if m == "hello"));

        control.cancel();
        assert!(control.is_cancelled());
        assert!(sink.check().is_err());
    }
}
