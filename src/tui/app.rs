use crate::config::Config;
use crate::error::Resource;
use crate::events::{PipelineControl, SnapshotSummary, UiEvent};
use crate::snapshot::MissingNamePolicy;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

// ── Screens ─────────────────────────────────────────────────────────────────

#[derive(PartialEq, Clone)]
pub enum Screen {
    Config,
    Dashboard,
}

#[derive(PartialEq, Clone, Debug)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Finished,
    Error(String),
}

#[derive(PartialEq, Clone, Debug)]
pub enum Phase {
    Checking,
    Downloading,
    Waiting,
    Done,
}

// ── Config field ────────────────────────────────────────────────────────────

pub struct ConfigField {
    pub label: &'static str,
    pub value: String,
    pub hint: &'static str,
}

// ── App state ───────────────────────────────────────────────────────────────

pub struct App {
    pub screen: Screen,

    // Config screen
    pub fields: Vec<ConfigField>,
    pub selected: usize,
    pub editing: bool,
    pub edit_cursor: usize,
    pub validation_error: Option<String>,

    // Dashboard state
    pub run_state: RunState,
    pub phase: Phase,
    pub cycle: u64,
    pub last_update: Option<NaiveDateTime>,

    // Download
    pub dl_resource: Option<Resource>,
    pub dl_total: u64,
    pub dl_read: u64,

    // Waiting between cycles
    pub wait_started: Option<Instant>,
    pub wait_total: Duration,

    // Cumulative totals
    pub written: u64,
    pub skipped: u64,
    pub failures: u64,
    pub last_snapshot: Option<(PathBuf, SnapshotSummary)>,

    // Logs
    pub logs: Vec<String>,
    pub log_scroll: usize,

    // Communication
    pub event_rx: Option<mpsc::Receiver<UiEvent>>,
    pub control: Option<Arc<PipelineControl>>,

    pub should_quit: bool,
}

fn yes_no(b: bool) -> String {
    let flag = if b { "y" } else { "n" };
    flag.to_string()
}

impl App {
    pub fn new(defaults: &Config) -> Self {
        Self {
            screen: Screen::Config,
            fields: vec![
                ConfigField { label: "Base URL", value: defaults.base_url.clone(), hint: "config.json, va.dat, in.dat" },
                ConfigField { label: "Comuni File", value: defaults.comuni_path.display().to_string(), hint: "codice_comune;denominazione" },
                ConfigField { label: "Output Directory", value: defaults.output_dir.display().to_string(), hint: "one CSV per update" },
                ConfigField {
                    label: "Archive Directory",
                    value: defaults.archive_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
                    hint: "empty = don't keep raw payloads",
                },
                ConfigField {
                    label: "Poll Interval (min)",
                    value: (defaults.poll_interval.as_secs_f64() / 60.0).to_string(),
                    hint: "delay between checks",
                },
                ConfigField { label: "HTTP Timeout (s)", value: defaults.request_timeout.as_secs().to_string(), hint: "per request" },
                ConfigField {
                    label: "Strict Names",
                    value: yes_no(defaults.missing_names == MissingNamePolicy::Strict),
                    hint: "y = fail on unknown municipality",
                },
                ConfigField { label: "Stop On Error", value: yes_no(defaults.stop_on_error), hint: "n = log and retry next cycle" },
            ],
            selected: 0,
            editing: false,
            edit_cursor: 0,
            validation_error: None,

            run_state: RunState::Idle,
            phase: Phase::Checking,
            cycle: 0,
            last_update: None,

            dl_resource: None,
            dl_total: 0,
            dl_read: 0,
            wait_started: None,
            wait_total: Duration::ZERO,

            written: 0,
            skipped: 0,
            failures: 0,
            last_snapshot: None,

            logs: Vec::new(),
            log_scroll: 0,

            event_rx: None,
            control: None,
            should_quit: false,
        }
    }

    /// Total config fields + 1 for the Start button.
    pub fn total_items(&self) -> usize {
        self.fields.len() + 1
    }

    pub fn is_on_start_button(&self) -> bool {
        self.selected == self.fields.len()
    }

    pub fn add_log(&mut self, msg: String) {
        self.logs.push(msg);
        // Auto-scroll to bottom
        let visible = 10usize; // approximate visible log lines
        if self.logs.len() > visible {
            self.log_scroll = self.logs.len() - visible;
        }
    }

    /// Fraction of the inter-cycle wait already elapsed.
    pub fn wait_ratio(&self) -> f64 {
        match self.wait_started {
            Some(start) if !self.wait_total.is_zero() => {
                (start.elapsed().as_secs_f64() / self.wait_total.as_secs_f64()).min(1.0)
            }
            _ => 0.0,
        }
    }

    pub fn wait_remaining(&self) -> Duration {
        self.wait_started
            .map(|start| self.wait_total.saturating_sub(start.elapsed()))
            .unwrap_or_default()
    }

    /// Process a pipeline event.
    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => self.add_log(msg),
            UiEvent::Warning(msg) => self.add_log(format!("WARNING: {}", msg)),

            UiEvent::CycleStarted { cycle } => {
                self.cycle = cycle;
                self.phase = Phase::Checking;
                self.wait_started = None;
                self.dl_resource = None;
                self.add_log(format!("Cycle {} started", cycle));
            }
            UiEvent::UpdateDetected { updated_at } => {
                self.last_update = Some(updated_at);
            }
            UiEvent::SnapshotSkipped { path } => {
                self.skipped += 1;
                self.add_log(format!("No new data ({} exists)", path.display()));
            }

            UiEvent::DownloadStarted { resource, total_bytes } => {
                self.phase = Phase::Downloading;
                self.dl_resource = Some(resource);
                self.dl_total = total_bytes;
                self.dl_read = 0;
            }
            UiEvent::DownloadProgress { bytes_read } => {
                self.dl_read = bytes_read;
            }
            UiEvent::DownloadComplete { resource, size_bytes } => {
                self.dl_read = size_bytes;
                self.add_log(format!("Downloaded {} ({})", resource, fmt_bytes(size_bytes)));
            }

            UiEvent::SnapshotWritten { path, summary } => {
                self.written += 1;
                self.add_log(format!(
                    "Snapshot complete: {} ({} municipalities, {} positivi)",
                    path.display(),
                    summary.rows,
                    fmt_count(summary.total_cases)
                ));
                self.last_snapshot = Some((path, summary));
            }
            UiEvent::CycleFailed { cycle, message } => {
                self.failures += 1;
                self.add_log(format!("ERROR in cycle {}: {}", cycle, message));
            }
            UiEvent::Waiting { seconds } => {
                self.phase = Phase::Waiting;
                self.wait_started = Some(Instant::now());
                self.wait_total = Duration::from_secs(seconds);
            }

            UiEvent::BackfillStarted { total } => {
                self.add_log(format!("Backfilling {} updates", total));
            }
            UiEvent::BackfillEntry { index, updated_at } => {
                self.add_log(format!("[{}] {}", index + 1, updated_at));
            }

            UiEvent::Finished => {
                self.phase = Phase::Done;
                self.run_state = RunState::Finished;
                self.add_log("=== Poller finished ===".into());
            }
            UiEvent::Error(msg) => {
                self.run_state = RunState::Error(msg.clone());
                self.add_log(format!("ERROR: {}", msg));
            }
        }
    }

    /// Validate config fields and build a Config struct.
    pub fn build_config(&self) -> Result<Config, String> {
        let base_url = self.fields[0].value.trim().to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err("Base URL must start with http:// or https://".into());
        }

        let comuni_path = PathBuf::from(self.fields[1].value.trim());
        if !comuni_path.is_file() {
            return Err(format!("Comuni file not found: {}", comuni_path.display()));
        }

        let output_dir = PathBuf::from(self.fields[2].value.trim());
        if output_dir.as_os_str().is_empty() {
            return Err("Output directory cannot be empty".into());
        }

        let archive = self.fields[3].value.trim();
        let archive_dir = (!archive.is_empty()).then(|| PathBuf::from(archive));

        let interval_min: f64 = self.fields[4].value.trim().parse()
            .map_err(|_| "Poll interval must be a number of minutes")?;
        if interval_min <= 0.0 {
            return Err("Poll interval must be positive".into());
        }
        let poll_interval = Duration::try_from_secs_f64(interval_min * 60.0)
            .map_err(|_| format!("Poll interval out of range: {}", interval_min))?;

        let timeout_s: u64 = self.fields[5].value.trim().parse()
            .map_err(|_| "HTTP timeout must be a positive integer")?;
        if timeout_s == 0 {
            return Err("HTTP timeout must be a positive integer".into());
        }

        let strict = parse_flag(&self.fields[6].value)?;
        let stop_on_error = parse_flag(&self.fields[7].value)?;

        Ok(Config {
            base_url,
            comuni_path,
            output_dir,
            archive_dir,
            missing_names: if strict { MissingNamePolicy::Strict } else { MissingNamePolicy::Placeholder },
            request_timeout: Duration::from_secs(timeout_s),
            poll_interval,
            stop_on_error,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn parse_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" | "" => Ok(false),
        other => Err(format!("Expected y or n, got '{}'", other)),
    }
}

pub fn fmt_count(n: u64) -> String {
    if n >= 1_000_000 { format!("{:.1}M", n as f64 / 1e6) }
    else if n >= 1_000 { format!("{:.1}K", n as f64 / 1e3) }
    else { n.to_string() }
}

pub fn fmt_bytes(n: u64) -> String {
    if n >= 1_048_576 { format!("{:.1} MB", n as f64 / 1_048_576.0) }
    else if n >= 1024 { format!("{:.1} KB", n as f64 / 1024.0) }
    else { format!("{} B", n) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn app_with_comuni() -> (App, tempfile::NamedTempFile) {
        let comuni = tempfile::NamedTempFile::new().unwrap();
        let config = Config {
            comuni_path: comuni.path().to_path_buf(),
            ..Config::default_piemonte()
        };
        (App::new(&config), comuni)
    }

    #[test]
    fn test_default_fields_build() {
        let (app, _comuni) = app_with_comuni();
        let config = app.build_config().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(15 * 60));
        assert_eq!(config.archive_dir, None);
        assert_eq!(config.missing_names, MissingNamePolicy::Placeholder);
        assert!(!config.stop_on_error);
    }

    #[test]
    fn test_validation_errors() {
        let (mut app, _comuni) = app_with_comuni();
        app.fields[4].value = "abc".into();
        assert!(app.build_config().unwrap_err().contains("Poll interval"));
        for bad in ["NaN", "inf", "-inf", "1e300", "-2"] {
            app.fields[4].value = bad.into();
            assert!(app.build_config().unwrap_err().contains("Poll interval"), "{}", bad);
        }

        app.fields[4].value = "0.5".into();
        app.fields[6].value = "maybe".into();
        assert!(app.build_config().unwrap_err().contains("Expected y or n"));

        app.fields[6].value = "y".into();
        app.fields[3].value = "raw".into();
        let config = app.build_config().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.missing_names, MissingNamePolicy::Strict);
        assert_eq!(config.archive_dir, Some(PathBuf::from("raw")));

        app.fields[0].value = "ftp://example.org".into();
        assert!(app.build_config().is_err());
    }

    #[test]
    fn test_handle_cycle_events() {
        let (mut app, _comuni) = app_with_comuni();
        let dt = NaiveDate::from_ymd_opt(2020, 11, 5).unwrap().and_hms_opt(18, 30, 0).unwrap();

        app.handle_event(UiEvent::CycleStarted { cycle: 1 });
        app.handle_event(UiEvent::UpdateDetected { updated_at: dt });
        app.handle_event(UiEvent::SnapshotWritten {
            path: PathBuf::from("dataset/20201105_1830.csv"),
            summary: SnapshotSummary { updated_at: dt, rows: 2, total_cases: 30, unknown: 0, top: Vec::new() },
        });
        app.handle_event(UiEvent::Waiting { seconds: 900 });
        assert_eq!(app.phase, Phase::Waiting);
        assert!(app.wait_remaining() <= Duration::from_secs(900));

        app.handle_event(UiEvent::CycleStarted { cycle: 2 });
        app.handle_event(UiEvent::CycleFailed { cycle: 2, message: "boom".into() });

        assert_eq!(app.cycle, 2);
        assert_eq!(app.written, 1);
        assert_eq!(app.failures, 1);
        assert_eq!(app.last_update, Some(dt));
        assert!(app.logs.iter().any(|l| l.contains("ERROR in cycle 2")));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(fmt_count(950), "950");
        assert_eq!(fmt_count(12_345), "12.3K");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
    }
}
