//! Shared fixtures: synthetic vector containers and a scripted decoder.

use franken_opus::decoder::{DecodeError, PacketDecoder};

/// Build a TOC byte from its fields.
#[must_use]
pub fn toc_byte(config: u8, stereo: bool, code: u8) -> u8 {
    (config << 3) | (u8::from(stereo) << 2) | (code & 0x03)
}

/// Serialize `(payload, expected_range)` pairs into the container
/// layout: `{ length: u32 BE, range: u32 BE, payload }` per record.
#[must_use]
pub fn build_container(records: &[(Vec<u8>, u32)]) -> Vec<u8> {
    let mut data = Vec::new();
    for (payload, range) in records {
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(&range.to_be_bytes());
        data.extend_from_slice(payload);
    }
    data
}

/// Serialize interleaved samples as raw i16 little-endian.
#[must_use]
pub fn build_reference(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Deterministic stand-in decoder: replays pre-scripted PCM and final
/// ranges per call, in order.
pub struct ScriptedDecoder {
    channels: usize,
    outputs: Vec<Result<Vec<i16>, DecodeError>>,
    ranges: Vec<u32>,
    cursor: usize,
}

impl ScriptedDecoder {
    #[must_use]
    pub fn new(
        channels: usize,
        outputs: Vec<Result<Vec<i16>, DecodeError>>,
        ranges: Vec<u32>,
    ) -> Self {
        Self { channels, outputs, ranges, cursor: 0 }
    }
}

impl PacketDecoder for ScriptedDecoder {
    fn decode(&mut self, _payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
        let step = self.outputs.get(self.cursor).cloned().unwrap_or(Ok(Vec::new()));
        self.cursor += 1;
        let samples = step?;
        pcm[..samples.len()].copy_from_slice(&samples);
        Ok(samples.len() / self.channels)
    }

    fn final_range(&mut self) -> u32 {
        self.ranges
            .get(self.cursor.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    fn channels(&self) -> usize {
        self.channels
    }
}
