//! Artifact writer.
//!
//! Owns the on-disk layout of a compile run: the bootstrap DDL, the phased
//! migration files, the snapshot, and the optional evidence dump. Artifacts
//! are written only from a successful compile output; the validate file is
//! omitted when its phase is empty.

use crate::compile::{CompileOutput, MigrationOutput};
use crate::postgres::emit::DDL_FILE;
use crate::snapshot::SNAPSHOT_FILE;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes compile artifacts into an output directory.
pub struct ArtifactWriter {
    out: PathBuf,
}

impl ArtifactWriter {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.out.join(SNAPSHOT_FILE)
    }

    /// Write the bootstrap artifacts: `schema.sql` and `snapshot.json`.
    pub fn write_bootstrap(&self, output: &CompileOutput) -> Result<Vec<PathBuf>, WriteError> {
        self.ensure_dir()?;
        let mut written = Vec::new();
        let ddl_path = self.out.join(DDL_FILE);
        fs::write(&ddl_path, output.ddl.text()).map_err(WriteError::from_io)?;
        written.push(ddl_path);
        written.push(self.write_snapshot(&output.snapshot.to_json())?);
        Ok(written)
    }

    /// Write the migration artifacts: `001_expand.sql`, `002_validate.sql`
    /// (only when non-empty) and the superseding snapshot.
    pub fn write_migration(&self, output: &MigrationOutput) -> Result<Vec<PathBuf>, WriteError> {
        self.ensure_dir()?;
        let mut written = Vec::new();
        if !output.expand.is_empty() {
            let path = self.out.join(&output.expand.file_name);
            fs::write(&path, output.expand.text()).map_err(WriteError::from_io)?;
            written.push(path);
        }
        if !output.validate.is_empty() {
            let path = self.out.join(&output.validate.file_name);
            fs::write(&path, output.validate.text()).map_err(WriteError::from_io)?;
            written.push(path);
        }
        written.push(self.write_snapshot(&output.snapshot.to_json())?);
        Ok(written)
    }

    /// Write the evidence dump next to the other artifacts.
    pub fn write_evidence(&self, json: &str) -> Result<PathBuf, WriteError> {
        self.ensure_dir()?;
        let path = self.out.join("evidence.json");
        fs::write(&path, json).map_err(WriteError::from_io)?;
        Ok(path)
    }

    fn write_snapshot(&self, json: &str) -> Result<PathBuf, WriteError> {
        let path = self.snapshot_path();
        fs::write(&path, json).map_err(WriteError::from_io)?;
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<(), WriteError> {
        fs::create_dir_all(&self.out).map_err(WriteError::from_io)
    }
}

/// Artifact writing errors.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(String),
}

impl WriteError {
    fn from_io(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
