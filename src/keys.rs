// Surrogate-key registry.
//
// Each categorical column owns an append-only `KeyTable`. IDs start at 1
// and never change once written; values first seen in a later run are
// appended above the current maximum in sorted order. ID `0` is reserved
// for "no match" and is what `lookup` returns for absent or null values.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Writer};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::KeyEntry;

/// Sentinel id for a missing or unmatched value.
pub const UNMATCHED_ID: u32 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct KeyTable {
    column: String,
    entries: Vec<KeyEntry>,
    index: HashMap<String, u32>,
}

impl KeyTable {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a table from persisted entries, rejecting reserved or
    /// duplicated ids and duplicated values.
    pub fn from_entries(column: &str, entries: Vec<KeyEntry>) -> Result<Self> {
        let mut table = KeyTable::new(column);
        let mut ids = BTreeSet::new();
        for entry in entries {
            if entry.id == UNMATCHED_ID {
                return Err(corrupt(column, format!("id 0 is reserved (value '{}')", entry.value)));
            }
            if !ids.insert(entry.id) {
                return Err(corrupt(column, format!("id {} is used twice", entry.id)));
            }
            if table.index.contains_key(&entry.value) {
                return Err(corrupt(column, format!("value '{}' appears twice", entry.value)));
            }
            table.push(entry);
        }
        Ok(table)
    }

    fn push(&mut self, entry: KeyEntry) {
        self.index.insert(entry.value.clone(), entry.id);
        self.entries.push(entry);
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> Vec<&KeyEntry> {
        let mut entries: Vec<&KeyEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_id(&self) -> u32 {
        self.entries.iter().map(|e| e.id).max().unwrap_or(UNMATCHED_ID)
    }

    pub fn get(&self, value: &str) -> Option<u32> {
        self.index.get(value).copied()
    }

}

fn corrupt(column: &str, details: String) -> PipelineError {
    PipelineError::KeyTable {
        column: column.to_string(),
        details,
    }
}

/// Assign ids to `new_values`.
///
/// Without an existing table the values get `1..=N` in sorted order. With one,
/// only values missing from it are appended, numbered from `max_id + 1` in
/// sorted order; existing entries are returned untouched.
pub fn assign(column: &str, existing: Option<KeyTable>, new_values: &BTreeSet<String>) -> KeyTable {
    let mut table = existing.unwrap_or_else(|| KeyTable::new(column));
    let mut next_id = table.max_id() + 1;
    for value in new_values {
        if table.get(value).is_some() {
            continue;
        }
        table.push(KeyEntry {
            id: next_id,
            value: value.clone(),
        });
        next_id += 1;
    }
    table
}

/// Id of `value`, or [`UNMATCHED_ID`] when it is null or unknown.
pub fn lookup(table: &KeyTable, value: Option<&str>) -> u32 {
    value.and_then(|v| table.get(v)).unwrap_or(UNMATCHED_ID)
}

/// On-disk registry of key tables, one `key_{column}.csv` per column.
///
/// Tables are loaded lazily on first registration and rewritten after every
/// registration, so a column shared by several datasets accumulates ids from
/// each of them within one run.
pub struct KeyRegistry<'a> {
    dir: PathBuf,
    config: &'a PipelineConfig,
    tables: BTreeMap<String, KeyTable>,
}

impl<'a> KeyRegistry<'a> {
    pub fn open(dir: &Path, config: &'a PipelineConfig) -> Self {
        Self {
            dir: dir.to_path_buf(),
            config,
            tables: BTreeMap::new(),
        }
    }

    pub fn path_for(&self, column: &str) -> PathBuf {
        self.dir.join(format!("key_{column}.csv"))
    }

    /// Register the observed values of `column` and persist the result.
    pub fn register<'v, I>(&mut self, column: &str, values: I) -> Result<&KeyTable>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let observed: BTreeSet<String> = values
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .collect();

        let existing = match self.tables.remove(column) {
            Some(table) => Some(table),
            None => self.load(column)?,
        };
        let before = existing.as_ref().map(|t| t.len()).unwrap_or(0);
        let table = assign(column, existing, &observed);
        if table.len() > before {
            info!(
                column,
                added = table.len() - before,
                total = table.len(),
                "key table extended"
            );
        }
        self.persist(&table)?;
        let table = self.tables.entry(column.to_string()).or_insert(table);
        Ok(&*table)
    }

    /// Id of `value` in `column`; unregistered columns resolve to 0.
    pub fn id(&self, column: &str, value: Option<&str>) -> u32 {
        self.tables
            .get(column)
            .map(|t| lookup(t, value))
            .unwrap_or(UNMATCHED_ID)
    }

    pub fn tables(&self) -> impl Iterator<Item = &KeyTable> {
        self.tables.values()
    }

    fn load(&self, column: &str) -> Result<Option<KeyTable>> {
        let path = self.path_for(column);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "loading key table");
        let mut rdr = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let mut entries = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let raw_id = record.get(0).unwrap_or("").trim();
            let id: u32 = raw_id
                .parse()
                .map_err(|_| corrupt(column, format!("invalid id '{raw_id}'")))?;
            let label = record.get(1).unwrap_or("");
            let value = self.config.internal_value(column, label).to_string();
            entries.push(KeyEntry { id, value });
        }
        KeyTable::from_entries(column, entries).map(Some)
    }

    fn persist(&self, table: &KeyTable) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut wtr = Writer::from_path(self.path_for(table.column()))?;
        for entry in table.entries() {
            wtr.serialize(KeyEntry {
                id: entry.id,
                value: self.config.display_label(table.column(), &entry.value).to_string(),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
