//! Comma separated device source.
//!
//! ```text
//! # Comments and blank lines are ignored.
//! device, pop, realm, vendor, flags
//! device_a, abc01, prod, juniper, f1, f2
//! device_b, xyz02, lab, cisco
//! ```
//!
//! The first column must be `device`. When the last header is `flags`, rows
//! may be variable length and every trailing column becomes a flag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Device, DeviceSource, DeviceTable};
use crate::error::InventoryError;

const FLAGS: &str = "flags";

/// Devices read from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    /// Source reading `path` on every fetch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses CSV text into a device table.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Csv`] if the header is missing or does not
    /// start with `device`, or a row does not fit the header.
    pub fn parse(text: &str) -> Result<DeviceTable, InventoryError> {
        let mut lines = text.lines();

        let header = lines
            .by_ref()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .find(|line| !line.is_empty())
            .ok_or_else(|| InventoryError::Csv("no header found".into()))?;

        let mut columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
        if columns.first().map(String::as_str) != Some("device") {
            return Err(InventoryError::Csv(format!(
                "column named \"device\" must be first column of header, found: {header:?}"
            )));
        }
        columns.remove(0);
        let has_flags = columns.last().is_some_and(|c| c == FLAGS);
        let fixed = if has_flags {
            columns.len() - 1
        } else {
            columns.len()
        };

        let mut devices = BTreeMap::new();
        for line in lines.map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            let Some(name) = fields.next().filter(|name| !name.is_empty()) else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if values.len() < fixed || (!has_flags && values.len() != fixed) {
                return Err(InventoryError::Csv(format!(
                    "final column header must be \"flags\" if rows are to be variable length, \
                     found: {header:?}"
                )));
            }

            let mut attributes: BTreeMap<String, Vec<String>> = columns[..fixed]
                .iter()
                .zip(&values)
                .map(|(column, value)| (column.clone(), vec![(*value).to_string()]))
                .collect();
            if has_flags {
                let flags = values[fixed..]
                    .iter()
                    .filter(|flag| !flag.is_empty())
                    .map(ToString::to_string)
                    .collect();
                attributes.insert(FLAGS.to_string(), flags);
            }
            devices.insert(name.to_string(), Device { attributes });
        }

        debug!(count = devices.len(), "Parsed devices from CSV");
        Ok(DeviceTable {
            attributes: columns,
            devices,
        })
    }
}

impl DeviceSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self) -> Result<DeviceTable, InventoryError> {
        debug!(path = %self.path.display(), "Reading device inventory");
        let text = std::fs::read_to_string(&self.path)?;
        Self::parse(&text)
    }
}
