//! Purpose: Walk the manifest chain from an app version down to the master database.
//! Exports: `Resolver`, `ResolveRequest`, `Resolution`, `StageReport`, `Target`.
//! Role: Orchestrates fetch -> decompress -> persist -> decode -> select for four stages.
//! Invariants: Stages run strictly in order; each URL depends on the previous selection.
//! Invariants: Root and artifact payloads are always decompressed; platform and category
//! manifests only when they carry the LZ4 frame magic.
//! Invariants: Each stage persists its payload before decoding it.
//! Invariants: Cancellation is checked before every stage and after every fetch; the
//! resulting error names the files already written.
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::cancel::CancelToken;
use super::codec;
use super::display::{group_thousands, hex64, mebibytes};
use super::endpoints::Endpoints;
use super::sink::{
    ARTIFACT_FILE, ArtifactSink, MASTER_MANIFEST_FILE, ROOT_MANIFEST_FILE, platform_manifest_file,
};
use super::transport::Transport;
use crate::core::error::{Error, ErrorKind, Stage};
use crate::core::manifest::{
    ManifestEntry, RootEntry, find_containing, find_named, find_platform, parse_content_manifest,
    parse_root_manifest,
};

pub const CATEGORY_NAME: &str = "master";
pub const ARTIFACT_NEEDLE: &str = "master.mdb";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolveRequest {
    pub app_version: String,
    pub platform: String,
}

impl ResolveRequest {
    pub fn new(app_version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            platform: platform.into(),
        }
    }
}

/// The entry whose hname addressed a stage's download.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Target {
    pub name: String,
    pub size: u64,
    pub checksum: u64,
    pub hname: String,
}

impl From<&RootEntry> for Target {
    fn from(entry: &RootEntry) -> Self {
        Self {
            name: entry.platform.clone(),
            size: entry.size,
            checksum: entry.checksum,
            hname: entry.hname(),
        }
    }
}

impl From<&ManifestEntry> for Target {
    fn from(entry: &ManifestEntry) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            checksum: entry.checksum,
            hname: entry.hname(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub url: String,
    pub target: Option<Target>,
    pub downloaded_bytes: usize,
    pub payload_bytes: usize,
    pub decompressed: bool,
    pub path: PathBuf,
    /// Entries decoded from the payload; absent for the final artifact.
    pub entries: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Resolution {
    pub app_version: String,
    pub platform: String,
    pub artifact: Target,
    pub artifact_path: PathBuf,
    pub artifact_bytes: usize,
    pub stages: Vec<StageReport>,
}

pub struct Resolver<'a> {
    endpoints: &'a Endpoints,
    transport: &'a dyn Transport,
    sink: &'a dyn ArtifactSink,
    cancel: CancelToken,
}

#[derive(Default)]
struct Progress {
    written: Vec<PathBuf>,
    stages: Vec<StageReport>,
}

struct Payload {
    url: Url,
    downloaded: usize,
    data: Vec<u8>,
    decompressed: bool,
    path: PathBuf,
}

impl<'a> Resolver<'a> {
    pub fn new(
        endpoints: &'a Endpoints,
        transport: &'a dyn Transport,
        sink: &'a dyn ArtifactSink,
    ) -> Self {
        Self {
            endpoints,
            transport,
            sink,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, Error> {
        let mut progress = Progress::default();
        self.run(request, &mut progress)
            .map_err(|err| annotate_partial(err, &progress.written))
    }

    fn run(&self, request: &ResolveRequest, progress: &mut Progress) -> Result<Resolution, Error> {
        let roots = self.root_stage(request, progress)?;
        let platform_entries = self.platform_stage(request, &roots, progress)?;
        let master_entries = self.category_stage(&platform_entries, progress)?;
        let (artifact, artifact_path, artifact_bytes) =
            self.artifact_stage(&master_entries, progress)?;

        info!(
            path = %artifact_path.display(),
            size = %group_thousands(artifact_bytes as u64),
            mb = %mebibytes(artifact_bytes as u64),
            "master database saved"
        );

        Ok(Resolution {
            app_version: request.app_version.clone(),
            platform: request.platform.clone(),
            artifact,
            artifact_path,
            artifact_bytes,
            stages: std::mem::take(&mut progress.stages),
        })
    }

    fn root_stage(
        &self,
        request: &ResolveRequest,
        progress: &mut Progress,
    ) -> Result<Vec<RootEntry>, Error> {
        let stage = Stage::Root;
        info!(app_version = %request.app_version, "step 1: root manifest");
        let url = self
            .endpoints
            .root_manifest_url(&request.app_version)
            .map_err(|err| err.with_stage(stage))?;
        let payload =
            self.download(stage, url, ROOT_MANIFEST_FILE, Decompression::Always, progress)?;

        let roots = parse_root_manifest(&payload.data)
            .map_err(|err| err.with_stage(stage).with_path(payload.path.clone()))?;
        info!(count = roots.len(), "platforms in root manifest");
        for entry in &roots {
            info!(
                platform = %entry.platform,
                size = %group_thousands(entry.size),
                checksum = %hex64(entry.checksum),
                hname = %entry.hname(),
                "platform"
            );
        }
        progress.record(stage, payload, None, Some(roots.len()));
        Ok(roots)
    }

    fn platform_stage(
        &self,
        request: &ResolveRequest,
        roots: &[RootEntry],
        progress: &mut Progress,
    ) -> Result<Vec<ManifestEntry>, Error> {
        let stage = Stage::Platform;
        self.check_cancelled(stage)?;
        info!(platform = %request.platform, "step 2: platform manifest");
        let entry = find_platform(roots, &request.platform).ok_or_else(|| {
            let known: Vec<&str> = roots.iter().map(|entry| entry.platform.as_str()).collect();
            Error::new(ErrorKind::Lookup)
                .with_message(format!(
                    "platform '{}' not found in root manifest",
                    request.platform
                ))
                .with_hint(format!("available platforms: {}", known.join(", ")))
                .with_stage(stage)
        })?;
        let target = Target::from(entry);
        let url = self
            .endpoints
            .manifest_url(&target.hname)
            .map_err(|err| err.with_stage(stage))?;
        info!(hname = %target.hname, "platform entry selected");

        let file = platform_manifest_file(&request.platform);
        let payload = self.download(stage, url, &file, Decompression::IfFramed, progress)?;
        let entries = self.decode_content(stage, &payload)?;
        progress.record(stage, payload, Some(target), Some(entries.len()));
        Ok(entries)
    }

    fn category_stage(
        &self,
        platform_entries: &[ManifestEntry],
        progress: &mut Progress,
    ) -> Result<Vec<ManifestEntry>, Error> {
        let stage = Stage::Category;
        self.check_cancelled(stage)?;
        info!("step 3: master manifest");
        let entry = find_named(platform_entries, CATEGORY_NAME).ok_or_else(|| {
            Error::new(ErrorKind::Lookup)
                .with_message(format!(
                    "'{CATEGORY_NAME}' entry not found in platform manifest"
                ))
                .with_stage(stage)
        })?;
        let target = Target::from(entry);
        info!(
            size = %group_thousands(target.size),
            checksum = %hex64(target.checksum),
            hname = %target.hname,
            "master entry selected"
        );
        let url = self
            .endpoints
            .manifest_url(&target.hname)
            .map_err(|err| err.with_stage(stage))?;

        let payload = self.download(
            stage,
            url,
            MASTER_MANIFEST_FILE,
            Decompression::IfFramed,
            progress,
        )?;
        let entries = self.decode_content(stage, &payload)?;
        progress.record(stage, payload, Some(target), Some(entries.len()));
        Ok(entries)
    }

    fn artifact_stage(
        &self,
        master_entries: &[ManifestEntry],
        progress: &mut Progress,
    ) -> Result<(Target, PathBuf, usize), Error> {
        let stage = Stage::Artifact;
        self.check_cancelled(stage)?;
        info!("step 4: {ARTIFACT_NEEDLE}");
        let entry = find_containing(master_entries, ARTIFACT_NEEDLE).ok_or_else(|| {
            Error::new(ErrorKind::Lookup)
                .with_message(format!(
                    "no entry containing '{ARTIFACT_NEEDLE}' in master manifest"
                ))
                .with_stage(stage)
        })?;
        let target = Target::from(entry);
        info!(
            entry = %target.name,
            size = %group_thousands(target.size),
            checksum = %hex64(target.checksum),
            hname = %target.hname,
            "artifact entry selected"
        );
        let url = self
            .endpoints
            .generic_url(&target.hname)
            .map_err(|err| err.with_stage(stage))?;

        let payload = self.download(stage, url, ARTIFACT_FILE, Decompression::Always, progress)?;
        let path = payload.path.clone();
        let len = payload.data.len();
        progress.record(stage, payload, Some(target.clone()), None);
        Ok((target, path, len))
    }

    fn decode_content(&self, stage: Stage, payload: &Payload) -> Result<Vec<ManifestEntry>, Error> {
        let entries = parse_content_manifest(&payload.data)
            .map_err(|err| err.with_stage(stage).with_path(payload.path.clone()))?;
        info!(count = entries.len(), stage = %stage, "manifest entries");
        for entry in &entries {
            debug!(
                name = %entry.name,
                size = %group_thousands(entry.size),
                hname = %entry.hname(),
                "entry"
            );
        }
        Ok(entries)
    }

    fn download(
        &self,
        stage: Stage,
        url: Url,
        file: &str,
        decompression: Decompression,
        progress: &mut Progress,
    ) -> Result<Payload, Error> {
        self.check_cancelled(stage)?;
        info!(url = %url, "downloading");
        let raw = self
            .transport
            .fetch(&url)
            .map_err(|err| err.with_stage(stage))?;
        let downloaded = raw.len();
        info!(bytes = %group_thousands(downloaded as u64), "downloaded");
        self.check_cancelled(stage)?;

        let decoded = match decompression {
            Decompression::Always => codec::decompress(&raw).map(|data| (data, true)),
            Decompression::IfFramed => codec::decompress_if_framed(raw),
        };
        let (data, decompressed) =
            decoded.map_err(|err| err.with_stage(stage).with_url(url.as_str()))?;
        if decompressed {
            info!(bytes = %group_thousands(data.len() as u64), "decompressed");
        }

        let path = self
            .sink
            .persist(file, &data)
            .map_err(|err| err.with_stage(stage))?;
        progress.written.push(path.clone());
        info!(path = %path.display(), "saved");

        Ok(Payload {
            url,
            downloaded,
            data,
            decompressed,
            path,
        })
    }

    fn check_cancelled(&self, stage: Stage) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::new(ErrorKind::Cancelled)
                .with_message(format!("cancelled during {stage} stage"))
                .with_stage(stage));
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Decompression {
    Always,
    IfFramed,
}

impl Progress {
    fn record(
        &mut self,
        stage: Stage,
        payload: Payload,
        target: Option<Target>,
        entries: Option<usize>,
    ) {
        self.stages.push(StageReport {
            stage: stage.as_str(),
            url: payload.url.into(),
            target,
            downloaded_bytes: payload.downloaded,
            payload_bytes: payload.data.len(),
            decompressed: payload.decompressed,
            path: payload.path,
            entries,
        });
    }
}

fn annotate_partial(err: Error, written: &[PathBuf]) -> Error {
    if err.kind() != ErrorKind::Cancelled || written.is_empty() {
        return err;
    }
    for path in written {
        warn!(path = %path.display(), "partial output left after cancellation");
    }
    let listed: Vec<String> = written
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    err.with_hint(format!("partial outputs kept: {}", listed.join(", ")))
}
