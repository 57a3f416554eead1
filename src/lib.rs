//! Purpose: Library crate behind the `mdbfetch` CLI.
//! Exports: `core` (byte cursor, BSV tables, hname, manifest rows, errors) and `api`.
//! Role: Decode content-addressed BSV manifests and resolve them to the master database.
//! Invariants: Decoding and addressing are pure; all I/O goes through `api` collaborators.
pub mod api;
pub mod core;
