use crate::config::stamp;
use crate::error::Resource;
use crate::snapshot::{CaseRow, Snapshot};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 5] = ["id_comune", "denominazione", "datetime", "positivi", "positivi_1000"];

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    id_comune: String,
    denominazione: String,
    datetime: String,
    positivi: u64,
    positivi_1000: f64,
}

/// Write `snapshot` as CSV, keyed by `id_comune`.
///
/// The file is written next to `path` with a `.part` suffix and renamed once
/// complete; `path` only ever exists as a finished snapshot.
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("csv.part");
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    // written by hand so an empty snapshot still carries the header
    wtr.write_record(HEADER)?;
    for (id, row) in &snapshot.rows {
        wtr.serialize(SnapshotRecord {
            id_comune: id.clone(),
            denominazione: row.denominazione.clone(),
            datetime: row.datetime.format(DATETIME_FORMAT).to_string(),
            positivi: row.positivi,
            positivi_1000: row.positivi_1000,
        })?;
    }
    wtr.flush()?;
    drop(wtr);

    fs::rename(&tmp, path).context("Failed to rename snapshot file")?;
    Ok(())
}

/// Read a snapshot written by [`write_snapshot`].
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open snapshot {}", path.display()))?;

    let mut rows = BTreeMap::new();
    for record in rdr.deserialize::<SnapshotRecord>() {
        let record = record?;
        let datetime = NaiveDateTime::parse_from_str(&record.datetime, DATETIME_FORMAT)
            .with_context(|| format!("Bad datetime '{}' in {}", record.datetime, path.display()))?;
        rows.insert(
            record.id_comune,
            CaseRow {
                denominazione: record.denominazione,
                datetime,
                positivi: record.positivi,
                positivi_1000: record.positivi_1000,
            },
        );
    }

    let updated_at = match rows.values().next() {
        Some(row) => row.datetime,
        None => stamp_from_path(path)?,
    };
    Ok(Snapshot { updated_at, rows, unknown: Vec::new() })
}

fn stamp_from_path(path: &Path) -> Result<NaiveDateTime> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    NaiveDateTime::parse_from_str(&format!("{}00", stem), "%Y%m%d_%H%M%S")
        .with_context(|| format!("Cannot derive update time from {}", path.display()))
}

/// Compressed copies of downloaded payloads, named so they can be fed back to a backfill.
pub struct RawArchive {
    dir: PathBuf,
}

impl RawArchive {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, updated_at: &NaiveDateTime, resource: Resource) -> PathBuf {
        let name = resource.file_name();
        let (stem, ext) = name.split_once('.').unwrap_or((name, "bin"));
        self.dir.join(format!("{}_{}.{}.zst", stem, stamp(updated_at), ext))
    }

    /// Compress `data` with zstd into the archive. Overwrites an existing copy.
    pub fn store(&self, updated_at: &NaiveDateTime, resource: Resource, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(updated_at, resource);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut encoder = zstd::stream::write::Encoder::new(file, 3)?;
        encoder.write_all(data)?;
        encoder.finish()?;
        Ok(path)
    }
}

/// Read a payload file, decompressing it when the name ends in `.zst`.
pub fn read_payload(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut data = Vec::new();
    if path.extension().is_some_and(|e| e == "zst") {
        zstd::Decoder::new(file)?.read_to_end(&mut data)?;
    } else {
        file.read_to_end(&mut data)?;
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 11, 6).unwrap().and_hms_opt(11, 0, 0).unwrap()
    }

    fn sample() -> Snapshot {
        let mut rows = BTreeMap::new();
        rows.insert(
            "001001".to_string(),
            CaseRow { denominazione: "Agliè".into(), datetime: ts(), positivi: 10, positivi_1000: 0.5 },
        );
        rows.insert(
            "001002".to_string(),
            CaseRow { denominazione: "Airasca, frazione".into(), datetime: ts(), positivi: 20, positivi_1000: 1.2346 },
        );
        rows.insert(
            "004242".to_string(),
            CaseRow { denominazione: String::new(), datetime: ts(), positivi: 0, positivi_1000: 0.0 },
        );
        Snapshot { updated_at: ts(), rows, unknown: Vec::new() }
    }

    #[test]
    fn test_write_then_read_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20201106_1100.csv");
        let snap = sample();

        write_snapshot(&snap, &path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("csv.part").exists());

        let back = read_snapshot(&path).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("20201106_1100.csv");
        write_snapshot(&sample(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id_comune,denominazione,datetime,positivi,positivi_1000"));
        assert_eq!(lines.next(), Some("001001,Agliè,2020-11-06 11:00:00,10,0.5"));
        assert_eq!(lines.next(), Some("001002,\"Airasca, frazione\",2020-11-06 11:00:00,20,1.2346"));
    }

    #[test]
    fn test_read_empty_snapshot_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20201106_1100.csv");
        let empty = Snapshot { updated_at: ts(), rows: BTreeMap::new(), unknown: Vec::new() };
        write_snapshot(&empty, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), HEADER.join(","));
        assert_eq!(read_snapshot(&path).unwrap().updated_at, ts());
    }

    #[test]
    fn test_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = RawArchive::new(dir.path().join("raw"));
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let path = archive.store(&ts(), Resource::Data, &payload).unwrap();
        assert_eq!(path.file_name().unwrap(), "in_20201106_1100.dat.zst");
        assert_eq!(read_payload(&path).unwrap(), payload);

        let header = archive.store(&ts(), Resource::Header, b"1181;0;positivi;positivi_1000").unwrap();
        assert_eq!(header.file_name().unwrap(), "va_20201106_1100.dat.zst");
    }

    #[test]
    fn test_read_plain_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_1106.dat");
        fs::write(&path, [1u8, 2, 3]).unwrap();
        assert_eq!(read_payload(&path).unwrap(), vec![1, 2, 3]);
    }
}
