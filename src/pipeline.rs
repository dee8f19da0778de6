use crate::comuni::Comuni;
use crate::config::Config;
use crate::error::Resource;
use crate::events::{Cancelled, EventSink, SnapshotSummary, UiEvent};
use crate::fetch::{LocalSource, PayloadSource, RemoteSource};
use crate::header::parse_columns;
use crate::snapshot::{Snapshot, assemble};
use crate::timestamp::extract_update_time;
use crate::writer::{RawArchive, write_snapshot};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Municipalities listed in the `SnapshotWritten` summary.
const SUMMARY_TOP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// A single attempt; any failure is returned to the caller.
    Once,
    /// Attempt, wait `interval`, repeat until cancelled or `max_cycles` attempts were made.
    Repeat {
        interval: Duration,
        max_cycles: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The snapshot for the current update already exists. Nothing was downloaded or written.
    NoNewData { updated_at: NaiveDateTime, path: PathBuf },
    Fetched { updated_at: NaiveDateTime, path: PathBuf, rows: usize },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub written: Vec<PathBuf>,
    pub skipped: u64,
    pub failures: u64,
}

// ── Fetch ───────────────────────────────────────────────────────────────────

/// Read the update instant announced in the backend's `config.json`.
pub fn detect_update(source: &dyn PayloadSource, sink: &dyn EventSink) -> Result<NaiveDateTime> {
    let raw = source.fetch(Resource::Config, sink)?;
    let config: serde_json::Value =
        serde_json::from_slice(&raw).context("config.json is not valid JSON")?;
    Ok(extract_update_time(&config)?)
}

/// Retrieve header and data from `source` and build the snapshot for `updated_at`.
pub fn fetch_snapshot(
    source: &dyn PayloadSource,
    updated_at: NaiveDateTime,
    config: &Config,
    sink: &dyn EventSink,
) -> Result<Snapshot> {
    let header = source.fetch(Resource::Header, sink)?;
    let columns = parse_columns(&String::from_utf8_lossy(&header));
    let data = source.fetch(Resource::Data, sink)?;

    let comuni = Comuni::load(&config.comuni_path)?;
    let snapshot = assemble(&data, &columns, updated_at, &comuni, config.missing_names)
        .with_context(|| format!("Cannot decode data for {}", updated_at))?;

    if !snapshot.unknown.is_empty() {
        sink.send(UiEvent::Warning(format!(
            "{} municipalities missing from {}: {}",
            snapshot.unknown.len(),
            config.comuni_path.display(),
            snapshot.unknown.join(", ")
        )));
    }
    Ok(snapshot)
}

/// Latest snapshot from the remote backend.
pub fn fetch_remote(config: &Config, sink: &dyn EventSink) -> Result<Snapshot> {
    let source = RemoteSource::new(&config.base_url, config.request_timeout);
    let updated_at = detect_update(&source, sink)?;
    fetch_snapshot(&source, updated_at, config, sink)
}

/// Snapshot from previously downloaded `in.dat` / `va.dat` files; the update time is given.
pub fn fetch_from_files(
    data: &Path,
    header: &Path,
    updated_at: NaiveDateTime,
    config: &Config,
    sink: &dyn EventSink,
) -> Result<Snapshot> {
    let source = LocalSource::new(data.to_path_buf(), header.to_path_buf());
    fetch_snapshot(&source, updated_at, config, sink)
}

/// Stores a compressed copy of every header/data payload that passes through.
struct ArchivingSource<'a> {
    inner: &'a dyn PayloadSource,
    archive: RawArchive,
    updated_at: NaiveDateTime,
}

impl PayloadSource for ArchivingSource<'_> {
    fn fetch(&self, resource: Resource, sink: &dyn EventSink) -> Result<Vec<u8>> {
        let data = self.inner.fetch(resource, sink)?;
        let path = self.archive.store(&self.updated_at, resource, &data)?;
        sink.send(UiEvent::Log(format!("Archived {}", path.display())));
        Ok(data)
    }
}

// ── Run ─────────────────────────────────────────────────────────────────────

/// One poll attempt: skip if the snapshot for the announced update exists, otherwise fetch and write it.
pub fn run_once(config: &Config, source: &dyn PayloadSource, sink: &dyn EventSink) -> Result<Outcome> {
    let updated_at = detect_update(source, sink)?;
    sink.send(UiEvent::UpdateDetected { updated_at });

    let path = config.snapshot_path(&updated_at);
    if path.is_file() {
        sink.send(UiEvent::SnapshotSkipped { path: path.clone() });
        return Ok(Outcome::NoNewData { updated_at, path });
    }

    sink.send(UiEvent::Log(format!("Fetching new data [{}]", updated_at)));
    let snapshot = match &config.archive_dir {
        Some(dir) => {
            let archiving = ArchivingSource {
                inner: source,
                archive: RawArchive::new(dir.clone()),
                updated_at,
            };
            fetch_snapshot(&archiving, updated_at, config, sink)?
        }
        None => fetch_snapshot(source, updated_at, config, sink)?,
    };

    write_snapshot(&snapshot, &path)?;
    sink.send(UiEvent::SnapshotWritten {
        path: path.clone(),
        summary: SnapshotSummary::of(&snapshot, SUMMARY_TOP),
    });
    Ok(Outcome::Fetched { updated_at, path, rows: snapshot.len() })
}

/// `Ok(true)` when the control reports a cancel, other errors pass through.
fn stop_requested(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(false),
        Err(e) if e.is::<Cancelled>() => Ok(true),
        Err(e) => Err(e),
    }
}

/// Run the poller with the given mode.
///
/// In `Repeat` mode a failed cycle is reported and the loop goes on, unless
/// `config.stop_on_error` is set. A cancel ends the loop cleanly.
pub fn run(config: &Config, source: &dyn PayloadSource, mode: RunMode, sink: &dyn EventSink) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    loop {
        if stop_requested(sink.check())? {
            sink.send(UiEvent::Log("Stop requested".into()));
            break;
        }
        summary.cycles += 1;
        let cycle = summary.cycles;
        sink.send(UiEvent::CycleStarted { cycle });

        match run_once(config, source, sink) {
            Ok(Outcome::Fetched { path, .. }) => summary.written.push(path),
            Ok(Outcome::NoNewData { .. }) => summary.skipped += 1,
            Err(e) if e.is::<Cancelled>() => break,
            Err(e) => {
                if mode == RunMode::Once || config.stop_on_error {
                    return Err(e);
                }
                summary.failures += 1;
                sink.send(UiEvent::CycleFailed { cycle, message: format!("{:#}", e) });
            }
        }

        let RunMode::Repeat { interval, max_cycles } = mode else {
            break;
        };
        if max_cycles.is_some_and(|max| cycle >= max) {
            break;
        }
        sink.send(UiEvent::Waiting { seconds: interval.as_secs() });
        if stop_requested(sink.wait(interval))? {
            sink.send(UiEvent::Log("Stop requested".into()));
            break;
        }
    }

    sink.send(UiEvent::Finished);
    Ok(summary)
}

// ── Backfill ────────────────────────────────────────────────────────────────

/// One previously downloaded update.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillEntry {
    pub updated_at: NaiveDateTime,
    pub data: PathBuf,
    pub header: PathBuf,
}

#[derive(Deserialize)]
struct ManifestRecord {
    datetime: String,
    data: PathBuf,
    header: PathBuf,
}

pub const MANIFEST_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Read a `;`-separated manifest with a `datetime;data;header` header row.
///
/// Relative payload paths are resolved against the manifest's directory.
pub fn load_manifest(path: &Path) -> Result<Vec<BackfillEntry>> {
    let base = path.parent().unwrap_or(Path::new(""));
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Cannot open manifest {}", path.display()))?;

    let mut entries = Vec::new();
    for record in rdr.deserialize::<ManifestRecord>() {
        let record = record.with_context(|| format!("Invalid manifest {}", path.display()))?;
        let updated_at = NaiveDateTime::parse_from_str(&record.datetime, MANIFEST_DATETIME_FORMAT)
            .with_context(|| format!("Bad datetime '{}' in manifest", record.datetime))?;
        entries.push(BackfillEntry {
            updated_at,
            data: base.join(record.data),
            header: base.join(record.header),
        });
    }
    Ok(entries)
}

/// Regenerate snapshots from local payload files. Existing snapshots are overwritten.
pub fn backfill(config: &Config, entries: &[BackfillEntry], sink: &dyn EventSink) -> Result<Vec<PathBuf>> {
    sink.send(UiEvent::BackfillStarted { total: entries.len() });
    let mut written = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        if stop_requested(sink.check())? {
            break;
        }
        sink.send(UiEvent::BackfillEntry { index, updated_at: entry.updated_at });

        let snapshot = fetch_from_files(&entry.data, &entry.header, entry.updated_at, config, sink)?;
        let path = config.snapshot_path(&entry.updated_at);
        write_snapshot(&snapshot, &path)?;
        sink.send(UiEvent::SnapshotWritten {
            path: path.clone(),
            summary: SnapshotSummary::of(&snapshot, SUMMARY_TOP),
        });
        written.push(path);
    }

    sink.send(UiEvent::Finished);
    Ok(written)
}
