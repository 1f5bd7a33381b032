//! Evidence map: source-element UIDs to the artifact locations where content
//! derived from them was emitted.
//!
//! Recording is additive and idempotent per `(uid, artifact kind, file,
//! lines)`; replaying the same emission twice collapses to one record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Which artifact family a record points into.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Sql,
    Migration,
    Snapshot,
}

impl ArtifactKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Sql => "sql",
            ArtifactKind::Migration => "migration",
            ArtifactKind::Snapshot => "snapshot",
        }
    }
}

/// One-based inclusive line range inside an artifact file.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// A single evidence record: file, line range, content hash.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EvidenceRecord {
    pub file: String,
    pub lines: LineRange,
    pub sha: String,
}

/// A warning or error note attached to a UID.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EvidenceNote {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The evidence side-channel threaded through every emitter.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EvidenceMap {
    records: BTreeMap<String, BTreeMap<ArtifactKind, Vec<EvidenceRecord>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    warnings: BTreeMap<String, Vec<EvidenceNote>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, Vec<EvidenceNote>>,
}

impl EvidenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an emission. Identical keys collapse to one record.
    pub fn record(&mut self, uid: &str, kind: ArtifactKind, record: EvidenceRecord) {
        let bucket = self
            .records
            .entry(uid.to_string())
            .or_default()
            .entry(kind)
            .or_default();
        if !bucket
            .iter()
            .any(|r| r.file == record.file && r.lines == record.lines)
        {
            bucket.push(record);
        }
    }

    pub fn record_warning(&mut self, uid: &str, note: EvidenceNote) {
        self.warnings.entry(uid.to_string()).or_default().push(note);
    }

    pub fn record_error(&mut self, uid: &str, note: EvidenceNote) {
        self.errors.entry(uid.to_string()).or_default().push(note);
    }

    /// All records for a UID, grouped by artifact kind.
    pub fn get(&self, uid: &str) -> Option<&BTreeMap<ArtifactKind, Vec<EvidenceRecord>>> {
        self.records.get(uid)
    }

    pub fn warnings_for(&self, uid: &str) -> &[EvidenceNote] {
        self.warnings.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Canonical JSON dump (optional artifact).
    pub fn to_json(&self) -> String {
        let mut out = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }
}

/// Content hash over the canonical text of an emitted fragment.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(file: &str, start: usize, end: usize) -> EvidenceRecord {
        EvidenceRecord {
            file: file.to_string(),
            lines: LineRange { start, end },
            sha: sha256_hex("x"),
        }
    }

    #[test]
    fn recording_is_idempotent_per_key() {
        let mut map = EvidenceMap::new();
        map.record("tbl_user", ArtifactKind::Sql, rec("schema.sql", 1, 1));
        map.record("tbl_user", ArtifactKind::Sql, rec("schema.sql", 1, 1));
        map.record("tbl_user", ArtifactKind::Sql, rec("schema.sql", 2, 2));
        let by_kind = map.get("tbl_user").unwrap();
        assert_eq!(by_kind[&ArtifactKind::Sql].len(), 2);
    }

    #[test]
    fn kinds_are_kept_apart() {
        let mut map = EvidenceMap::new();
        map.record("u", ArtifactKind::Sql, rec("schema.sql", 1, 1));
        map.record("u", ArtifactKind::Migration, rec("001_expand.sql", 1, 1));
        assert_eq!(map.get("u").unwrap().len(), 2);
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(sha256_hex("a"), sha256_hex("a"));
        assert_ne!(sha256_hex("a"), sha256_hex("b"));
        assert_eq!(sha256_hex("").len(), 64);
    }
}
