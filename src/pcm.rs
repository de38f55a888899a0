//! Reference PCM reading.
//!
//! Reference decode files (`.dec`) are raw signed 16-bit little-endian
//! samples, channel-interleaved, with no header. The byte count must be
//! a whole number of samples; anything else fails loudly rather than
//! silently truncating, since a misaligned reference poisons every
//! comparison after it.

use std::fs;
use std::path::Path;

use crate::error::{FoError, FoResult};

/// Parse an in-memory reference stream.
pub fn parse_reference(data: &[u8]) -> FoResult<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(FoError::MalformedReference(format!(
            "{} bytes is not a whole number of 16-bit samples",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Read a reference decode file.
pub fn read_reference_file(path: &Path) -> FoResult<Vec<i16>> {
    let data = fs::read(path)?;
    let samples = parse_reference(&data)?;
    tracing::debug!(
        path = %path.display(),
        samples = samples.len(),
        "read reference stream"
    );
    Ok(samples)
}
