//! Checksums over graded cells.
//!
//! A cell digest is SHA-256 over a fixed sequence of length-prefixed fields:
//! cell type, source, grade id, points, lock flag. The field order is part of
//! the baseline format; changing it invalidates every published baseline.
//!
//! Two notebook-level modes exist:
//! - aggregate: one digest folded over `(grade_id, cell digest)` in document
//!   order, so reordering, insertion and deletion of graded cells are visible;
//! - per-cell: a `grade_id -> digest` map, which pinpoints the edited cell but
//!   is order-insensitive.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::classify::{graded_cells, grading_record};
use crate::error::StructuralError;
use crate::model::{Cell, GradingRecord, Notebook};

/// A SHA-256 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

/// A string that is not a 64-character hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid checksum `{0}`: expected 64 hex characters")]
pub struct ChecksumParseError(pub String);

impl FromStr for Checksum {
    type Err = ChecksumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ChecksumParseError(s.to_string());
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which notebook-level digest to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumMode {
    #[default]
    Aggregate,
    PerCell,
}

/// Published checksum value(s) a submission is graded against.
///
/// Serialized as a bare hex string (aggregate) or an object of
/// `grade_id -> hex` (per-cell); the JSON shape selects the mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Baseline {
    Aggregate(Checksum),
    PerCell(BTreeMap<String, Checksum>),
}

impl Baseline {
    pub fn mode(&self) -> ChecksumMode {
        match self {
            Baseline::Aggregate(_) => ChecksumMode::Aggregate,
            Baseline::PerCell(_) => ChecksumMode::PerCell,
        }
    }
}

/// Digest of one graded cell.
///
/// Fails if the cell has no grading metadata or the metadata is malformed.
pub fn cell_digest(cell: &Cell) -> Result<Checksum, StructuralError> {
    let record = grading_record(cell)?
        .ok_or_else(|| StructuralError::malformed("cell carries no grading metadata"))?;
    Ok(digest_with_record(cell, &record))
}

/// Notebook digest in the requested mode.
pub fn notebook_digest(notebook: &Notebook, mode: ChecksumMode) -> Result<Baseline, StructuralError> {
    match mode {
        ChecksumMode::Aggregate => aggregate_digest(notebook).map(Baseline::Aggregate),
        ChecksumMode::PerCell => per_cell_digests(notebook).map(Baseline::PerCell),
    }
}

/// Single order-sensitive digest over all graded cells.
pub fn aggregate_digest(notebook: &Notebook) -> Result<Checksum, StructuralError> {
    let mut hasher = Sha256::new();
    for graded in graded_cells(notebook)? {
        let digest = digest_with_record(graded.cell, &graded.record);
        update_field(&mut hasher, graded.record.grade_id.as_bytes());
        update_field(&mut hasher, digest.to_hex().as_bytes());
    }
    Ok(finish(hasher))
}

/// `grade_id -> digest` for every graded cell.
pub fn per_cell_digests(notebook: &Notebook) -> Result<BTreeMap<String, Checksum>, StructuralError> {
    Ok(graded_cells(notebook)?
        .into_iter()
        .map(|graded| {
            let digest = digest_with_record(graded.cell, &graded.record);
            (graded.record.grade_id, digest)
        })
        .collect())
}

pub(crate) fn digest_with_record(cell: &Cell, record: &GradingRecord) -> Checksum {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, cell.cell_type.as_str().as_bytes());
    update_field(&mut hasher, cell.source.as_bytes());
    update_field(&mut hasher, record.grade_id.as_bytes());
    update_field(&mut hasher, canonical_points(record.points).as_bytes());
    update_field(&mut hasher, if record.is_locked() { b"1" } else { b"0" });
    finish(hasher)
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn finish(hasher: Sha256) -> Checksum {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    Checksum(bytes)
}

/// Shortest round-trip decimal, with `-0` folded into `0`.
fn canonical_points(points: f64) -> String {
    format!("{}", points + 0.0)
}
