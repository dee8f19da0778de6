use crate::snapshot::MissingNamePolicy;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://giscovid.sdp.csi.it/tiles/data";

/// Main configuration for the tile-data poller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of `config.json`, `va.dat` and `in.dat`.
    pub base_url: String,
    /// `;`-separated municipality reference file (`codice_comune;denominazione`).
    pub comuni_path: PathBuf,
    /// Directory where per-update CSV snapshots are stored.
    pub output_dir: PathBuf,
    /// Keep a zstd copy of every downloaded header/data payload here. None = don't archive.
    pub archive_dir: Option<PathBuf>,
    pub missing_names: MissingNamePolicy,
    /// Global timeout for each HTTP request.
    pub request_timeout: Duration,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Abort the poll loop on the first failed cycle instead of logging and waiting.
    pub stop_on_error: bool,
}

impl Config {
    /// Defaults for the Piedmont dashboard, writing into `./dataset`.
    pub fn default_piemonte() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            comuni_path: PathBuf::from("comuni_piemonte.csv"),
            output_dir: PathBuf::from("dataset"),
            archive_dir: None,
            missing_names: MissingNamePolicy::Placeholder,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(15 * 60),
            stop_on_error: false,
        }
    }

    /// Snapshot file for a given update instant (minute precision).
    pub fn snapshot_path(&self, updated_at: &NaiveDateTime) -> PathBuf {
        self.output_dir.join(format!("{}.csv", stamp(updated_at)))
    }
}

/// `YYYYmmdd_HHMM`, the naming key shared by snapshots and archived payloads.
pub fn stamp(updated_at: &NaiveDateTime) -> String {
    updated_at.format("%Y%m%d_%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_snapshot_path() {
        let config = Config::default_piemonte();
        let dt = NaiveDate::from_ymd_opt(2020, 11, 5).unwrap().and_hms_opt(8, 5, 42).unwrap();
        assert_eq!(config.snapshot_path(&dt), PathBuf::from("dataset/20201105_0805.csv"));
    }
}
