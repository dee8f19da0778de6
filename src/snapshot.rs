use crate::comuni::{Comuni, comune_id};
use crate::decoder::{unpack_f32, unpack_u32};
use crate::error::Error;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::warn;

/// The value section carries exactly this pair per municipality: (positivi, positivi_1000).
pub const EXPECTED_COLUMNS: usize = 2;

/// What to do when a decoded municipality is missing from the reference lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingNamePolicy {
    /// Keep the row with an empty name and report the id.
    #[default]
    Placeholder,
    /// Reject the whole payload.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    pub denominazione: String,
    pub datetime: NaiveDateTime,
    pub positivi: u64,
    pub positivi_1000: f64,
}

/// Case counts for every municipality at one update instant, keyed by ISTAT code.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub updated_at: NaiveDateTime,
    pub rows: BTreeMap<String, CaseRow>,
    /// Ids present in the payload but absent from the lookup.
    pub unknown: Vec<String>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_cases(&self) -> u64 {
        self.rows.values().map(|r| r.positivi).sum()
    }

    /// Municipalities with the highest cases per 1000 inhabitants, highest first.
    pub fn top_by_rate(&self, n: usize) -> Vec<(&str, &CaseRow)> {
        let mut rows: Vec<_> = self.rows.iter().map(|(id, r)| (id.as_str(), r)).collect();
        rows.sort_by(|a, b| b.1.positivi_1000.total_cmp(&a.1.positivi_1000).then(a.0.cmp(b.0)));
        rows.truncate(n);
        rows
    }
}

pub fn round4(v: f32) -> f64 {
    (v as f64 * 10_000.0).round() / 10_000.0
}

/// Build a [`Snapshot`] from the raw `in.dat` payload.
///
/// The payload holds one `int32` id per municipality in `comuni`, followed by
/// `comuni.len() * columns.len()` `float32` values interleaved per municipality.
pub fn assemble(
    payload: &[u8],
    columns: &[String],
    updated_at: NaiveDateTime,
    comuni: &Comuni,
    policy: MissingNamePolicy,
) -> Result<Snapshot, Error> {
    if columns.len() != EXPECTED_COLUMNS {
        return Err(Error::ColumnCountMismatch {
            expected: EXPECTED_COLUMNS,
            found: columns.len(),
        });
    }

    let n = comuni.len();
    let (ids, offset) = unpack_u32(payload, n)?;
    let (values, _) = unpack_f32(&payload[offset..], n * columns.len())?;

    let mut rows = BTreeMap::new();
    let mut unknown = Vec::new();
    for (id, pair) in ids.iter().zip(values.chunks_exact(EXPECTED_COLUMNS)) {
        let key = comune_id(id);
        let denominazione = match comuni.name(&key) {
            Some(name) => name.to_string(),
            None if policy == MissingNamePolicy::Strict => {
                return Err(Error::UnknownMunicipality(key));
            }
            None => {
                warn!(id = %key, "municipality not in reference lookup");
                unknown.push(key.clone());
                String::new()
            }
        };

        let row = CaseRow {
            denominazione,
            datetime: updated_at,
            // `as` saturates: negative and NaN become 0
            positivi: pair[0].trunc() as u64,
            positivi_1000: round4(pair[1]),
        };
        if rows.insert(key.clone(), row).is_some() {
            return Err(Error::DuplicateId(key));
        }
    }

    Ok(Snapshot { updated_at, rows, unknown })
}
