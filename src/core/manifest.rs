//! Purpose: Map decoded BSV rows onto root and content manifest entries.
//! Exports: `RootEntry`, `ManifestEntry`, `parse_root_manifest`, `parse_content_manifest`,
//! `find_platform`, `find_named`, `find_containing`.
//! Role: Row-shape interpretation between the table decoder and the chain resolver.
//! Invariants: Lookups are case-insensitive and return the first matching row.
//! Invariants: Rows with fewer than three fields are dropped without error.
//! Notes: Content rows are classified by field count only (>=7 full, >=3 simple). A future
//! manifest layout with a different column count would be misread; there is no version gate.
use serde::Serialize;

use crate::core::bsv::{Row, Value, decode_table};
use crate::core::error::{Error, ErrorKind};
use crate::core::hname::hname;

const FULL_ROW_FIELDS: usize = 7;
const SIMPLE_ROW_FIELDS: usize = 3;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RootEntry {
    pub platform: String,
    pub size: u64,
    pub checksum: u64,
}

impl RootEntry {
    pub fn hname(&self) -> String {
        hname(self.checksum, self.size, self.platform.as_bytes())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    pub checksum: u64,
}

impl ManifestEntry {
    pub fn hname(&self) -> String {
        hname(self.checksum, self.size, self.name.as_bytes())
    }
}

pub fn parse_root_manifest(buf: &[u8]) -> Result<Vec<RootEntry>, Error> {
    let table = decode_table(buf)?;
    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.len() >= SIMPLE_ROW_FIELDS)
        .map(|(index, row)| {
            Ok(RootEntry {
                platform: text_at(row, index, 0)?,
                size: uint_at(row, index, 1)?,
                checksum: uint_at(row, index, 2)?,
            })
        })
        .collect()
}

pub fn parse_content_manifest(buf: &[u8]) -> Result<Vec<ManifestEntry>, Error> {
    let table = decode_table(buf)?;
    let mut entries = Vec::with_capacity(table.rows.len());
    for (index, row) in table.rows.iter().enumerate() {
        if let Some(entry) = content_entry(row, index)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Full rows are (name, dependency, group, priority, size, checksum, key).
fn content_entry(row: &Row, index: usize) -> Result<Option<ManifestEntry>, Error> {
    let (size_at, checksum_at) = if row.len() >= FULL_ROW_FIELDS {
        (4, 5)
    } else if row.len() >= SIMPLE_ROW_FIELDS {
        (1, 2)
    } else {
        return Ok(None);
    };
    Ok(Some(ManifestEntry {
        name: text_at(row, index, 0)?,
        size: uint_at(row, index, size_at)?,
        checksum: uint_at(row, index, checksum_at)?,
    }))
}

pub fn find_platform<'a>(entries: &'a [RootEntry], platform: &str) -> Option<&'a RootEntry> {
    let wanted = platform.to_lowercase();
    entries
        .iter()
        .find(|entry| entry.platform.to_lowercase() == wanted)
}

pub fn find_named<'a>(entries: &'a [ManifestEntry], name: &str) -> Option<&'a ManifestEntry> {
    let wanted = name.to_lowercase();
    entries
        .iter()
        .find(|entry| entry.name.to_lowercase() == wanted)
}

pub fn find_containing<'a>(
    entries: &'a [ManifestEntry],
    needle: &str,
) -> Option<&'a ManifestEntry> {
    let needle = needle.to_lowercase();
    entries
        .iter()
        .find(|entry| entry.name.to_lowercase().contains(&needle))
}

fn text_at(row: &Row, row_index: usize, field: usize) -> Result<String, Error> {
    match row.get(field) {
        Some(Value::Text(text)) => Ok(text.clone()),
        other => Err(field_type_error(row, row_index, field, "text", other)),
    }
}

fn uint_at(row: &Row, row_index: usize, field: usize) -> Result<u64, Error> {
    match row.get(field) {
        Some(Value::Uint(value)) => Ok(*value),
        other => Err(field_type_error(row, row_index, field, "integer", other)),
    }
}

fn field_type_error(
    row: &Row,
    row_index: usize,
    field: usize,
    expected: &str,
    got: Option<&Value>,
) -> Error {
    let got = match got {
        Some(Value::Text(_)) => "text",
        Some(Value::Uint(_)) => "integer",
        None => "nothing",
    };
    Error::new(ErrorKind::Format)
        .with_message(format!(
            "manifest row {row_index} field {field}: expected {expected}, got {got}"
        ))
        .with_offset(row.offset())
}
