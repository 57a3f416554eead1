//! Purpose: Persist stage payloads and the final artifact.
//! Exports: `ArtifactSink`, `DirSink`, and the fixed output file names.
//! Role: Side-effect collaborator for the resolver; failures are fatal and not retried.
//! Invariants: Output names are single path components inside the sink directory.
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

pub const ROOT_MANIFEST_FILE: &str = "root.manifest.bsv";
pub const MASTER_MANIFEST_FILE: &str = "master.manifest.bsv";
pub const ARTIFACT_FILE: &str = "master.mdb";

pub fn platform_manifest_file(platform: &str) -> String {
    format!("{platform}.manifest.bsv")
}

pub trait ArtifactSink {
    /// Writes `bytes` under `name` and returns where they landed.
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, Error>;
}

#[derive(Clone, Debug)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirSink {
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
        ensure_file_name(name)?;
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create output directory")
                .with_path(&self.dir)
                .with_source(err)
        })?;
        let path = self.dir.join(name);
        fs::write(&path, bytes).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output file")
                .with_path(&path)
                .with_source(err)
        })?;
        Ok(path)
    }
}

fn ensure_file_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("output name {name:?} must be a plain file name")));
    }
    Ok(())
}
