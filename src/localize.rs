//! Packet-level failure localization.
//!
//! Given a suspect packet index (typically from the divergence
//! analyzer's worst-N output), replay a bounded window of preceding
//! packets through a fresh decoder to reconstruct plausible internal
//! state, then dump the target packet sample by sample.
//!
//! The warm-up window is an approximation, not a guarantee: a decoder
//! warmed over `warmup_packets` packets is not promised to hold state
//! bit-identical to a continuous decode from stream start. Shorter
//! windows trade fidelity for iteration speed; widen the window when a
//! diagnosis disagrees with the full-stream analysis.

use serde::Serialize;

use crate::bitstream::Packet;
use crate::decoder::{MAX_PACKET_SAMPLES, PacketDecoder};
use crate::error::{FoError, FoResult};
use crate::toc::{self, SilkFlags, Toc};

/// Tuning for one localization pass.
#[derive(Debug, Clone, Copy)]
pub struct LocalizeConfig {
    /// Packets replayed before the target to warm decoder state,
    /// clamped at the stream start.
    pub warmup_packets: usize,
    /// Leading sample pairs dumped side by side.
    pub sample_pairs: usize,
    /// Samples of context kept on each side of the peak deviation.
    pub context: usize,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            warmup_packets: 20,
            sample_pairs: 20,
            context: 5,
        }
    }
}

/// One decoded/reference sample pair with its signed difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplePair {
    /// Interleaved sample offset within the target packet.
    pub offset: usize,
    pub decoded: i16,
    pub reference: i16,
    pub diff: i32,
}

/// Location and magnitude of the largest deviation in the packet, with
/// surrounding context.
#[derive(Debug, Clone, Serialize)]
pub struct PeakDeviation {
    pub offset: usize,
    pub magnitude: i32,
    pub window: Vec<SamplePair>,
}

/// Everything the localizer learned about one suspect packet.
#[derive(Debug, Clone, Serialize)]
pub struct PacketDiagnosis {
    pub index: usize,
    pub toc: Option<Toc>,
    /// VAD/redundancy flags, present for SILK payloads of two or more
    /// bytes.
    pub silk_flags: Option<SilkFlags>,
    pub payload_bytes: usize,
    pub expected_range: u32,
    /// First packet of the warm-up window actually replayed.
    pub warmup_start: usize,
    pub pairs: Vec<SamplePair>,
    pub peak: Option<PeakDeviation>,
}

/// Diagnose one suspect packet with the supplied fresh decoder.
///
/// The decoder must be newly constructed; the warm-up replay is what
/// gives its internal state meaning at the target.
pub fn diagnose_packet<D: PacketDecoder>(
    decoder: &mut D,
    packets: &[Packet],
    reference: &[i16],
    target: usize,
    config: &LocalizeConfig,
) -> FoResult<PacketDiagnosis> {
    if target >= packets.len() {
        return Err(FoError::InvalidRequest(format!(
            "packet index {target} out of range ({} packets)",
            packets.len()
        )));
    }

    let channels = decoder.channels();
    let start = target.saturating_sub(config.warmup_packets);

    // Reference offset of the window start, from signalled durations of
    // everything skipped.
    let mut ref_offset: usize =
        packets[..start].iter().map(Packet::samples).sum::<usize>() * channels;

    let mut pcm = vec![0i16; MAX_PACKET_SAMPLES * channels];
    let mut target_segment: Vec<i16> = Vec::new();

    for (index, packet) in packets.iter().enumerate().take(target + 1).skip(start) {
        let signalled = (packet.samples() * channels).min(pcm.len());
        let produced = match decoder.decode(&packet.payload, &mut pcm) {
            Ok(samples) => samples * channels,
            Err(error) => {
                tracing::debug!(packet = index, %error, "warm-up decode failed; substituting silence");
                pcm[..signalled].fill(0);
                signalled
            }
        };
        if index == target {
            target_segment.extend_from_slice(&pcm[..produced]);
        } else {
            ref_offset += produced;
        }
    }

    let ref_start = ref_offset.min(reference.len());
    let available = target_segment.len().min(reference.len() - ref_start);
    let decoded_segment = &target_segment[..available];
    let reference_segment = &reference[ref_start..ref_start + available];

    let pair_at = |offset: usize| SamplePair {
        offset,
        decoded: decoded_segment[offset],
        reference: reference_segment[offset],
        diff: i32::from(decoded_segment[offset]) - i32::from(reference_segment[offset]),
    };

    let pairs = (0..available.min(config.sample_pairs))
        .map(|offset| pair_at(offset))
        .collect();

    let mut peak_offset: Option<usize> = None;
    let mut peak_magnitude = 0i32;
    for offset in 0..available {
        let magnitude = (i32::from(decoded_segment[offset]) - i32::from(reference_segment[offset])).abs();
        if peak_offset.is_none() || magnitude > peak_magnitude {
            peak_offset = Some(offset);
            peak_magnitude = magnitude;
        }
    }
    let peak = peak_offset.map(|offset| {
        let lo = offset.saturating_sub(config.context);
        let hi = (offset + config.context + 1).min(available);
        PeakDeviation {
            offset,
            magnitude: peak_magnitude,
            window: (lo..hi).map(|i| pair_at(i)).collect(),
        }
    });

    let packet = &packets[target];
    Ok(PacketDiagnosis {
        index: target,
        toc: packet.toc(),
        silk_flags: toc::silk_flags(&packet.payload),
        payload_bytes: packet.payload.len(),
        expected_range: packet.expected_range,
        warmup_start: start,
        pairs,
        peak,
    })
}

/// Diagnose several suspect packets, instantiating a fresh decoder per
/// target via `make_decoder`.
pub fn diagnose_packets<D, F>(
    make_decoder: F,
    packets: &[Packet],
    reference: &[i16],
    targets: &[usize],
    config: &LocalizeConfig,
) -> FoResult<Vec<PacketDiagnosis>>
where
    D: PacketDecoder,
    F: Fn() -> FoResult<D>,
{
    targets
        .iter()
        .map(|&target| {
            let mut decoder = make_decoder()?;
            diagnose_packet(&mut decoder, packets, reference, target, config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeError;

    // Emits a constant value per packet, scripted up front.
    struct ConstDecoder {
        values: Vec<i16>,
        cursor: usize,
    }

    impl PacketDecoder for ConstDecoder {
        fn decode(&mut self, _payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
            let value = self.values.get(self.cursor).copied().unwrap_or(0);
            self.cursor += 1;
            pcm[..960].fill(value);
            Ok(960)
        }

        fn final_range(&mut self) -> u32 {
            0
        }

        fn channels(&self) -> usize {
            1
        }
    }

    const SILK_TOC: u8 = 9 << 3; // SILK WB 20 ms

    fn silk_packet(flag_byte: u8) -> Packet {
        Packet { payload: vec![SILK_TOC, flag_byte], expected_range: 0x42 }
    }

    #[test]
    fn warmup_window_clamps_at_stream_start() {
        let packets: Vec<Packet> = (0..3).map(|_| silk_packet(0)).collect();
        let reference = vec![7i16; 3 * 960];
        let mut decoder = ConstDecoder { values: vec![7, 7, 7], cursor: 0 };

        let diagnosis = diagnose_packet(
            &mut decoder,
            &packets,
            &reference,
            2,
            &LocalizeConfig { warmup_packets: 20, ..LocalizeConfig::default() },
        )
        .unwrap();
        assert_eq!(diagnosis.warmup_start, 0);
        assert_eq!(diagnosis.pairs.len(), 20);
        assert!(diagnosis.pairs.iter().all(|pair| pair.diff == 0));
    }

    #[test]
    fn reports_peak_deviation_with_context() {
        let packets: Vec<Packet> = (0..2).map(|_| silk_packet(0)).collect();
        // Reference diverges from the constant decode at one sample of
        // the second packet.
        let mut reference = vec![100i16; 2 * 960];
        reference[960 + 300] = -500;
        let mut decoder = ConstDecoder { values: vec![100, 100], cursor: 0 };

        let diagnosis = diagnose_packet(
            &mut decoder,
            &packets,
            &reference,
            1,
            &LocalizeConfig::default(),
        )
        .unwrap();
        let peak = diagnosis.peak.unwrap();
        assert_eq!(peak.offset, 300);
        assert_eq!(peak.magnitude, 600);
        assert_eq!(peak.window.len(), 11);
        assert_eq!(peak.window[5].offset, 300);
        assert_eq!(peak.window[5].diff, 600);
    }

    #[test]
    fn peak_window_clamps_at_segment_edges() {
        let packets = vec![silk_packet(0)];
        let mut reference = vec![0i16; 960];
        reference[0] = 50;
        let mut decoder = ConstDecoder { values: vec![0], cursor: 0 };

        let diagnosis =
            diagnose_packet(&mut decoder, &packets, &reference, 0, &LocalizeConfig::default())
                .unwrap();
        let peak = diagnosis.peak.unwrap();
        assert_eq!(peak.offset, 0);
        assert_eq!(peak.window.first().unwrap().offset, 0);
        assert_eq!(peak.window.len(), 6);
    }

    #[test]
    fn surfaces_silk_flags_and_framing() {
        let packets = vec![silk_packet(0xC0)];
        let reference = vec![0i16; 960];
        let mut decoder = ConstDecoder { values: vec![0], cursor: 0 };

        let diagnosis =
            diagnose_packet(&mut decoder, &packets, &reference, 0, &LocalizeConfig::default())
                .unwrap();
        assert_eq!(diagnosis.silk_flags, Some(SilkFlags { vad: true, lbrr: true }));
        assert_eq!(diagnosis.toc.unwrap().config, 9);
        assert_eq!(diagnosis.expected_range, 0x42);
        assert_eq!(diagnosis.payload_bytes, 2);
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let packets = vec![silk_packet(0)];
        let reference = vec![0i16; 960];
        let mut decoder = ConstDecoder { values: vec![0], cursor: 0 };

        let error =
            diagnose_packet(&mut decoder, &packets, &reference, 5, &LocalizeConfig::default())
                .unwrap_err();
        assert!(matches!(error, FoError::InvalidRequest(_)));
    }

    #[test]
    fn fresh_decoder_per_target() {
        let packets: Vec<Packet> = (0..4).map(|_| silk_packet(0)).collect();
        let reference = vec![3i16; 4 * 960];

        let diagnoses = diagnose_packets(
            || Ok(ConstDecoder { values: vec![3, 3, 3, 3], cursor: 0 }),
            &packets,
            &reference,
            &[1, 3],
            &LocalizeConfig { warmup_packets: 1, ..LocalizeConfig::default() },
        )
        .unwrap();
        assert_eq!(diagnoses.len(), 2);
        assert_eq!(diagnoses[0].index, 1);
        assert_eq!(diagnoses[0].warmup_start, 0);
        assert_eq!(diagnoses[1].index, 3);
        assert_eq!(diagnoses[1].warmup_start, 2);
        assert!(diagnoses.iter().all(|d| d.peak.as_ref().unwrap().magnitude == 0));
    }
}
