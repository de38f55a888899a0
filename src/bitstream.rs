//! Test-vector container parsing.
//!
//! Vector files use the `opus_demo` exchange format: a sequence of
//! self-delimiting records, each `{ length: u32 big-endian, expected
//! final range: u32 big-endian, payload: length bytes }`, repeated to
//! end of file. A file ending exactly on a record boundary is a clean
//! parse; a file ending mid-record is a structural error, because
//! nothing downstream of a partial record can be trusted to align.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{FoError, FoResult};
use crate::toc::{self, Toc};

const RECORD_HEADER_BYTES: usize = 8;

/// One framed unit of encoded audio plus the entropy-coder state the
/// reference encoder reported after producing it.
///
/// Zero-length payloads are structurally valid and preserved: some
/// vectors use them to signal loss or silence, and dropping them would
/// desynchronize every later packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: Vec<u8>,
    /// Expected decoder-side entropy-coder state after this packet.
    pub expected_range: u32,
}

impl Packet {
    /// Classification of the framing byte, absent for empty payloads.
    #[must_use]
    pub fn toc(&self) -> Option<Toc> {
        self.payload.first().map(|&byte| Toc::parse(byte))
    }

    /// Samples per channel this packet decodes to (zero when empty).
    #[must_use]
    pub fn samples(&self) -> usize {
        toc::packet_samples(&self.payload)
    }
}

/// Parse an in-memory vector container into its ordered packet sequence.
pub fn parse_bitstream(data: &[u8]) -> FoResult<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < RECORD_HEADER_BYTES {
            return Err(FoError::MalformedBitstream {
                offset,
                detail: format!("truncated record header ({remaining} trailing bytes)"),
            });
        }
        let len = read_u32_be(data, offset) as usize;
        let expected_range = read_u32_be(data, offset + 4);
        offset += RECORD_HEADER_BYTES;

        if data.len() - offset < len {
            return Err(FoError::MalformedBitstream {
                offset,
                detail: format!(
                    "record declares {len} payload bytes but only {} remain",
                    data.len() - offset
                ),
            });
        }
        packets.push(Packet {
            payload: data[offset..offset + len].to_vec(),
            expected_range,
        });
        offset += len;
    }

    Ok(packets)
}

/// Read and parse a vector container file.
pub fn read_bitstream_file(path: &Path) -> FoResult<Vec<Packet>> {
    let data = fs::read(path)?;
    let packets = parse_bitstream(&data)?;
    tracing::debug!(
        path = %path.display(),
        packets = packets.len(),
        "parsed vector container"
    );
    Ok(packets)
}

fn read_u32_be(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Container summary computed without decoding.
#[derive(Debug, Clone, Serialize)]
pub struct BitstreamInfo {
    pub packet_count: usize,
    pub total_payload_bytes: usize,
    /// Classification of the first non-empty packet.
    pub first_toc: Option<Toc>,
    /// Total signalled duration, in samples per channel.
    pub duration_samples: usize,
}

#[must_use]
pub fn bitstream_info(packets: &[Packet]) -> BitstreamInfo {
    BitstreamInfo {
        packet_count: packets.len(),
        total_payload_bytes: packets.iter().map(|p| p.payload.len()).sum(),
        first_toc: packets.iter().find_map(Packet::toc),
        duration_samples: packets.iter().map(Packet::samples).sum(),
    }
}

/// One (mode, frame duration) bucket of the container's distribution.
#[derive(Debug, Clone, Serialize)]
pub struct FrameBucket {
    pub mode: crate::toc::Mode,
    pub frame_samples: usize,
    pub packets: usize,
}

/// Distribution of packets over (mode, frame duration), sorted by mode
/// then duration. Useful for spotting unexpected configurations before
/// any decoding happens.
#[must_use]
pub fn frame_distribution(packets: &[Packet]) -> Vec<FrameBucket> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<(crate::toc::Mode, usize), usize> = BTreeMap::new();
    for toc in packets.iter().filter_map(Packet::toc) {
        *buckets.entry((toc.mode, toc.frame_samples)).or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|((mode, frame_samples), packets)| FrameBucket {
            mode,
            frame_samples,
            packets,
        })
        .collect()
}

/// Serialize a single packet back to the container's record layout.
///
/// The result is structurally identical to one container record, so it
/// can be fed to independent reference tooling that accepts one-record
/// files.
#[must_use]
pub fn packet_record(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_BYTES + packet.payload.len());
    out.extend_from_slice(&(packet.payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&packet.expected_range.to_be_bytes());
    out.extend_from_slice(&packet.payload);
    out
}

/// Write a single packet as a standalone debug artifact.
pub fn export_packet(packet: &Packet, path: &Path) -> FoResult<()> {
    fs::write(path, packet_record(packet))?;
    tracing::info!(
        path = %path.display(),
        bytes = packet.payload.len(),
        "exported packet artifact"
    );
    Ok(())
}
