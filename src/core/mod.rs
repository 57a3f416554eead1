// Core modules: byte decoding, BSV tables, content addressing, manifest rows, errors.
pub mod bsv;
pub mod cursor;
pub mod error;
pub mod hname;
pub mod manifest;
