//! Class catalog: the external `class_id,class_name` table seeding `Classes`.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// One catalog row. Extra CSV columns are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClassEntry {
    pub class_id: i64,
    pub class_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ClassCatalog {
    entries: Vec<ClassEntry>,
    by_name: HashMap<String, i64>,
}

impl ClassCatalog {
    pub fn new(entries: Vec<ClassEntry>) -> Self {
        let by_name = entries
            .iter()
            .map(|entry| (entry.class_name.clone(), entry.class_id))
            .collect();
        Self { entries, by_name }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open class catalog {}", path.display()))?;
        Self::from_csv_reader(file)
            .with_context(|| format!("failed to parse class catalog {}", path.display()))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut entries = Vec::new();
        for (line_num, result) in reader.deserialize::<ClassEntry>().enumerate() {
            let entry = result.map_err(|e| anyhow!("line {}: {}", line_num + 2, e))?;
            entries.push(entry);
        }
        Ok(Self::new(entries))
    }

    /// Rows in file order.
    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn class_id(&self, class_name: &str) -> Option<i64> {
        self.by_name.get(class_name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
