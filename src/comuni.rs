use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Zero-pad a municipality code to the 6-digit ISTAT form.
pub fn comune_id(code: impl std::fmt::Display) -> String {
    format!("{:0>6}", code.to_string().trim())
}

#[derive(Deserialize)]
struct ComuneRecord {
    codice_comune: String,
    denominazione: String,
}

/// Read-only ISTAT code -> municipality name lookup.
#[derive(Debug, Clone, Default)]
pub struct Comuni {
    names: BTreeMap<String, String>,
}

impl Comuni {
    /// Load a `;`-separated reference file with a `codice_comune;denominazione` header.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open municipality list {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Invalid municipality list {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut names = BTreeMap::new();
        for record in rdr.deserialize::<ComuneRecord>() {
            let record = record?;
            names.insert(comune_id(&record.codice_comune), record.denominazione);
        }
        Ok(Self { names })
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Comuni {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(k, v)| (comune_id(k.into()), v.into()))
                .collect(),
        }
    }
}
