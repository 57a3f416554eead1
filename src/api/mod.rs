//! Purpose: Public Rust API for resolving the manifest chain.
//! Exports: Resolver, collaborators (transport, codec, sink), endpoints, and core types.
//! Role: The only path the CLI and integration tests use into the crate.
//! Invariants: Collaborators sit behind traits so the resolver runs without a network.
pub mod codec;
pub mod display;

mod cancel;
mod endpoints;
mod resolver;
mod sink;
mod transport;

pub use crate::core::bsv::{
    ColumnKind, ColumnSchema, Row, Table, TableBuilder, TableHeader, Value, decode_table,
};
pub use crate::core::error::{Error, ErrorKind, Stage, to_exit_code};
pub use crate::core::hname::hname;
pub use crate::core::manifest::{
    ManifestEntry, RootEntry, parse_content_manifest, parse_root_manifest,
};
pub use cancel::CancelToken;
pub use endpoints::{DEFAULT_BASE_URL, Endpoints};
pub use resolver::{ResolveRequest, Resolution, Resolver, StageReport, Target};
pub use sink::{
    ARTIFACT_FILE, ArtifactSink, DirSink, MASTER_MANIFEST_FILE, ROOT_MANIFEST_FILE,
    platform_manifest_file,
};
pub use transport::{DEFAULT_TIMEOUT, HttpTransport, Transport, USER_AGENT};
