//! Packet classification from the table-of-contents byte.
//!
//! The first payload byte of every Opus packet carries everything the
//! harness needs to keep two independently-advancing sample streams
//! aligned: the top five bits select a (mode, bandwidth, frame duration)
//! triple from a fixed table, bit 2 signals stereo, and the low two bits
//! select the frame-count code. Classification is recomputed on demand;
//! it is cheap and packet-local.

use std::fmt;

use serde::Serialize;

/// Coding algorithm family in effect for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Silk,
    Hybrid,
    Celt,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Silk => f.write_str("SILK"),
            Mode::Hybrid => f.write_str("Hybrid"),
            Mode::Celt => f.write_str("CELT"),
        }
    }
}

/// Audio bandwidth class selected by the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    Narrowband,
    Mediumband,
    Wideband,
    SuperWideband,
    Fullband,
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Narrowband => f.write_str("NB"),
            Bandwidth::Mediumband => f.write_str("MB"),
            Bandwidth::Wideband => f.write_str("WB"),
            Bandwidth::SuperWideband => f.write_str("SWB"),
            Bandwidth::Fullband => f.write_str("FB"),
        }
    }
}

// Frame duration per config, in samples per channel at 48 kHz.
const FRAME_SAMPLES: [usize; 32] = [
    480, 960, 1920, 2880, // SILK NB
    480, 960, 1920, 2880, // SILK MB
    480, 960, 1920, 2880, // SILK WB
    480, 960, // Hybrid SWB
    480, 960, // Hybrid FB
    120, 240, 480, 960, // CELT NB
    120, 240, 480, 960, // CELT WB
    120, 240, 480, 960, // CELT SWB
    120, 240, 480, 960, // CELT FB
];

/// Decoded view of one table-of-contents byte.
///
/// The five-bit config table is exhaustive, so every byte value 0..=255
/// classifies; parsing never fails, even on adversarial input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Toc {
    pub config: u8,
    pub mode: Mode,
    pub bandwidth: Bandwidth,
    /// Duration of a single frame, in samples per channel at 48 kHz.
    pub frame_samples: usize,
    pub stereo: bool,
    /// Frame-count code: 0 one frame, 1 two equal frames, 2 two
    /// arbitrary frames, 3 arbitrary count.
    pub frame_code: u8,
}

impl Toc {
    #[must_use]
    pub fn parse(byte: u8) -> Self {
        let config = byte >> 3;
        Toc {
            config,
            mode: mode_for(config),
            bandwidth: bandwidth_for(config),
            frame_samples: FRAME_SAMPLES[config as usize],
            stereo: byte & 0x04 != 0,
            frame_code: byte & 0x03,
        }
    }

    #[must_use]
    pub fn channels(self) -> usize {
        if self.stereo { 2 } else { 1 }
    }

    #[must_use]
    pub fn frame_millis(self) -> f64 {
        self.frame_samples as f64 / 48.0
    }
}

impl fmt::Display for Toc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config={} mode={} bw={} fs={} stereo={} code={}",
            self.config, self.mode, self.bandwidth, self.frame_samples, self.stereo, self.frame_code
        )
    }
}

fn mode_for(config: u8) -> Mode {
    match config {
        0..=11 => Mode::Silk,
        12..=15 => Mode::Hybrid,
        _ => Mode::Celt,
    }
}

fn bandwidth_for(config: u8) -> Bandwidth {
    match config {
        0..=3 => Bandwidth::Narrowband,
        4..=7 => Bandwidth::Mediumband,
        8..=11 => Bandwidth::Wideband,
        12..=13 => Bandwidth::SuperWideband,
        14..=15 => Bandwidth::Fullband,
        16..=19 => Bandwidth::Narrowband,
        20..=23 => Bandwidth::Wideband,
        24..=27 => Bandwidth::SuperWideband,
        _ => Bandwidth::Fullband,
    }
}

/// Number of frames the packet signals, per the frame-count code.
///
/// Code 3 carries the count in the low six bits of the second byte; a
/// malformed count of zero is clamped to one frame so alignment
/// bookkeeping never stalls. Empty payloads signal zero frames.
#[must_use]
pub fn frame_count(payload: &[u8]) -> usize {
    let Some(&toc) = payload.first() else {
        return 0;
    };
    match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => match payload.get(1) {
            Some(&count) => ((count & 0x3F) as usize).max(1),
            None => 1,
        },
    }
}

/// Total samples per channel the packet decodes to.
#[must_use]
pub fn packet_samples(payload: &[u8]) -> usize {
    match payload.first() {
        Some(&byte) => Toc::parse(byte).frame_samples * frame_count(payload),
        None => 0,
    }
}

/// Voice-activity and redundancy flags carried in the second byte of
/// SILK-mode payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SilkFlags {
    /// Voice activity detected for the first frame.
    pub vad: bool,
    /// Low-bitrate redundancy data present.
    pub lbrr: bool,
}

/// Extract the SILK flag byte. `None` unless the packet is SILK mode
/// with at least two bytes of payload.
#[must_use]
pub fn silk_flags(payload: &[u8]) -> Option<SilkFlags> {
    let toc = Toc::parse(*payload.first()?);
    if toc.mode != Mode::Silk {
        return None;
    }
    let flags = *payload.get(1)?;
    Some(SilkFlags {
        vad: flags & 0x80 != 0,
        lbrr: flags & 0x40 != 0,
    })
}
