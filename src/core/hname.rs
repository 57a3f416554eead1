// Content address ("hname"): unpadded base-32 of SHA-1 over checksum ‖ size ‖ name.
use data_encoding::BASE32_NOPAD;
use sha1::{Digest, Sha1};

/// Pure and deterministic; recompute rather than cache.
pub fn hname(checksum: u64, size: u64, name: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(checksum.to_be_bytes());
    hasher.update(size.to_be_bytes());
    hasher.update(name);
    BASE32_NOPAD.encode(&hasher.finalize())
}

/// Two-character sharding directory for an hname.
pub fn shard_prefix(hname: &str) -> &str {
    let end = hname
        .char_indices()
        .nth(2)
        .map(|(index, _)| index)
        .unwrap_or(hname.len());
    &hname[..end]
}
