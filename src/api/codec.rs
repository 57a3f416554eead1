// LZ4 decompression: self-describing frames, or raw blocks behind a 4-byte LE size prefix.
use std::io::Read;

use crate::core::error::{Error, ErrorKind};

/// `0x184D2204` little-endian.
pub const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

pub fn is_frame_compressed(data: &[u8]) -> bool {
    data.starts_with(&LZ4_FRAME_MAGIC)
}

/// Frame format when the magic is present, otherwise a size-prefixed block.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < 4 {
        return Err(Error::new(ErrorKind::Codec).with_message("data too short for LZ4 header"));
    }
    if is_frame_compressed(data) {
        return decompress_frame(data);
    }
    lz4_flex::block::decompress_size_prepended(data).map_err(|err| {
        Error::new(ErrorKind::Codec)
            .with_message("invalid LZ4 block payload")
            .with_source(err)
    })
}

/// Some manifests are stored uncompressed; only framed payloads are decoded.
pub fn decompress_if_framed(data: Vec<u8>) -> Result<(Vec<u8>, bool), Error> {
    if is_frame_compressed(&data) {
        Ok((decompress_frame(&data)?, true))
    } else {
        Ok((data, false))
    }
}

fn decompress_frame(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    lz4_flex::frame::FrameDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| {
            Error::new(ErrorKind::Codec)
                .with_message("invalid LZ4 frame payload")
                .with_source(err)
        })?;
    Ok(out)
}
