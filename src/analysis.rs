//! Sample-level divergence analysis.
//!
//! Drives a vector's packets through the decoder in stream order,
//! aligns the decoded output against the reference sample stream packet
//! by packet, and accumulates per-packet and running power statistics.
//! A single bad packet never prevents analysis of the rest of the
//! vector: decode failures are recovered by substituting silence of the
//! signalled duration so both streams stay aligned.

use std::cmp::Ordering;

use serde::Serialize;

use crate::bitstream::Packet;
use crate::decoder::{MAX_PACKET_SAMPLES, PacketDecoder};
use crate::toc::Mode;

/// Finite stand-in for segments with no measurable noise. Real audio is
/// never infinite-precision identical except by exact match; a finite
/// ceiling keeps aggregate statistics finite.
pub const SNR_CEILING_DB: f64 = 200.0;

/// Reference-segment RMS at or above this counts the packet as active.
/// Divergence measured only in near-silence is numerically unstable and
/// not representative, so aggregate reporting tracks active packets
/// separately.
pub const ACTIVE_RMS_THRESHOLD: f64 = 100.0;

/// Mode-transition packets below this SNR are surfaced in reports.
pub const TRANSITION_SNR_FLOOR_DB: f64 = 40.0;

/// Default number of worst-SNR packets surfaced per vector.
pub const WORST_PACKET_COUNT: usize = 5;

/// Signal-to-noise ratio in decibels from raw power sums.
///
/// Edge-case policy, fixed for comparability across implementations:
/// zero noise reports [`SNR_CEILING_DB`]; nonzero noise against a silent
/// reference reports negative infinity (worst possible).
#[must_use]
pub fn snr_db(signal_power: f64, noise_power: f64) -> f64 {
    if noise_power == 0.0 {
        SNR_CEILING_DB
    } else if signal_power == 0.0 {
        f64::NEG_INFINITY
    } else {
        10.0 * (signal_power / noise_power).log10()
    }
}

/// Power and deviation statistics over one aligned segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentStats {
    pub snr_db: f64,
    /// Pointwise maximum deviation, saturated to the sample range.
    pub max_abs_diff: i16,
    pub mean_abs_diff: f64,
    pub signal_power: f64,
    pub noise_power: f64,
    pub reference_rms: f64,
}

/// Compare an aligned pair of segments. Only the overlapping prefix is
/// measured when the lengths differ.
#[must_use]
pub fn segment_stats(decoded: &[i16], reference: &[i16]) -> SegmentStats {
    let n = decoded.len().min(reference.len());
    let mut signal_power = 0.0f64;
    let mut noise_power = 0.0f64;
    let mut abs_diff_sum = 0.0f64;
    let mut max_abs_diff = 0i32;

    for (&d, &r) in decoded[..n].iter().zip(&reference[..n]) {
        let signal = f64::from(r);
        let noise = f64::from(d) - signal;
        signal_power += signal * signal;
        noise_power += noise * noise;

        let diff = (i32::from(d) - i32::from(r)).abs();
        abs_diff_sum += f64::from(diff);
        if diff > max_abs_diff {
            max_abs_diff = diff;
        }
    }

    let reference_rms = if n == 0 {
        0.0
    } else {
        (signal_power / n as f64).sqrt()
    };
    let mean_abs_diff = if n == 0 { 0.0 } else { abs_diff_sum / n as f64 };

    SegmentStats {
        snr_db: snr_db(signal_power, noise_power),
        max_abs_diff: max_abs_diff.min(i32::from(i16::MAX)) as i16,
        mean_abs_diff,
        signal_power,
        noise_power,
        reference_rms,
    }
}

/// Per-packet comparison result.
#[derive(Debug, Clone, Serialize)]
pub struct DivergenceRecord {
    pub index: usize,
    pub mode: Mode,
    /// Samples per channel the packet signalled.
    pub samples: usize,
    pub snr_db: f64,
    pub max_abs_diff: i16,
    pub mean_abs_diff: f64,
    /// Previous packet's mode when this packet switched coding modes.
    /// Mode switches are a known high-risk boundary for divergence.
    pub transition_from: Option<Mode>,
}

impl DivergenceRecord {
    #[must_use]
    pub fn is_mode_transition(&self) -> bool {
        self.transition_from.is_some()
    }
}

/// Running power sums for one analysis run.
///
/// Owned by the run and passed by reference, never shared: independent
/// vectors each carry their own accumulator, which is what makes
/// parallel suite processing safe without locking.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PowerAccumulator {
    pub signal_power: f64,
    pub noise_power: f64,
    pub active_signal_power: f64,
    pub active_noise_power: f64,
    pub packets: usize,
    pub active_packets: usize,
}

impl PowerAccumulator {
    pub fn record(&mut self, stats: &SegmentStats, active: bool) {
        self.signal_power += stats.signal_power;
        self.noise_power += stats.noise_power;
        self.packets += 1;
        if active {
            self.active_signal_power += stats.signal_power;
            self.active_noise_power += stats.noise_power;
            self.active_packets += 1;
        }
    }

    #[must_use]
    pub fn overall_snr_db(&self) -> f64 {
        snr_db(self.signal_power, self.noise_power)
    }

    #[must_use]
    pub fn active_snr_db(&self) -> f64 {
        snr_db(self.active_signal_power, self.active_noise_power)
    }
}

/// Full result of one vector's divergence analysis.
///
/// The per-packet records are retained for the duration of one vector's
/// analysis; [`VectorAnalysis::summarize`] reduces them to summary
/// statistics plus a ranked worst-N before longer-term retention.
#[derive(Debug, Clone, Serialize)]
pub struct VectorAnalysis {
    pub records: Vec<DivergenceRecord>,
    pub power: PowerAccumulator,
    pub decode_failures: usize,
    pub skipped_empty: usize,
    /// Σ signalled samples × channels over all packets.
    pub expected_samples: usize,
    pub reference_samples: usize,
    /// Interleaved samples the reference is short of the signalled
    /// total. A data condition to report, not a crash.
    pub shortfall: Option<usize>,
    /// Interleaved samples the reference carries beyond the signalled
    /// total.
    pub surplus: Option<usize>,
}

impl VectorAnalysis {
    /// Worst packets, ranked ascending by SNR.
    #[must_use]
    pub fn worst(&self, count: usize) -> Vec<&DivergenceRecord> {
        let mut ranked: Vec<&DivergenceRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| match a.snr_db.total_cmp(&b.snr_db) {
            Ordering::Equal => a.index.cmp(&b.index),
            order => order,
        });
        ranked.truncate(count);
        ranked
    }

    /// Mode-transition packets whose SNR fell below
    /// [`TRANSITION_SNR_FLOOR_DB`]. These are the highest-value failure
    /// signals for debugging.
    #[must_use]
    pub fn flagged_transitions(&self) -> Vec<&DivergenceRecord> {
        self.records
            .iter()
            .filter(|r| r.is_mode_transition() && r.snr_db < TRANSITION_SNR_FLOOR_DB)
            .collect()
    }

    /// Reduce to summary statistics and a ranked worst-N, dropping the
    /// per-packet record sequence.
    #[must_use]
    pub fn summarize(&self, worst: usize) -> VectorSummary {
        VectorSummary {
            overall_snr_db: self.power.overall_snr_db(),
            active_snr_db: self.power.active_snr_db(),
            packets_compared: self.power.packets,
            active_packets: self.power.active_packets,
            decode_failures: self.decode_failures,
            skipped_empty: self.skipped_empty,
            expected_samples: self.expected_samples,
            reference_samples: self.reference_samples,
            shortfall: self.shortfall,
            surplus: self.surplus,
            worst: self.worst(worst).into_iter().cloned().collect(),
            weak_transitions: self
                .flagged_transitions()
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

/// Reduced per-vector summary retained after analysis.
#[derive(Debug, Clone, Serialize)]
pub struct VectorSummary {
    pub overall_snr_db: f64,
    pub active_snr_db: f64,
    pub packets_compared: usize,
    pub active_packets: usize,
    pub decode_failures: usize,
    pub skipped_empty: usize,
    pub expected_samples: usize,
    pub reference_samples: usize,
    pub shortfall: Option<usize>,
    pub surplus: Option<usize>,
    pub worst: Vec<DivergenceRecord>,
    pub weak_transitions: Vec<DivergenceRecord>,
}

/// Replay `packets` through `decoder` in stream order and compare the
/// output against `reference`.
///
/// Per packet: empty payloads skip decoding and contribute nothing to
/// the statistics; decode failures substitute silence of the signalled
/// duration and are tallied; the comparison window is clamped to the
/// reference bounds, with any shortfall reported in the result rather
/// than raised.
pub fn analyze_vector<D: PacketDecoder>(
    decoder: &mut D,
    packets: &[Packet],
    reference: &[i16],
) -> VectorAnalysis {
    let channels = decoder.channels();
    let mut pcm = vec![0i16; MAX_PACKET_SAMPLES * channels];

    let mut records = Vec::new();
    let mut power = PowerAccumulator::default();
    let mut decode_failures = 0usize;
    let mut skipped_empty = 0usize;
    let mut previous_mode: Option<Mode> = None;
    let mut offset = 0usize;

    for (index, packet) in packets.iter().enumerate() {
        let Some(toc) = packet.toc() else {
            skipped_empty += 1;
            continue;
        };

        let signalled = (packet.samples() * channels).min(pcm.len());
        let produced = match decoder.decode(&packet.payload, &mut pcm) {
            Ok(samples) => samples * channels,
            Err(error) => {
                decode_failures += 1;
                tracing::warn!(
                    packet = index,
                    %error,
                    "decode failed; substituting silence to preserve alignment"
                );
                pcm[..signalled].fill(0);
                signalled
            }
        };

        let segment_start = offset.min(reference.len());
        let available = produced.min(reference.len() - segment_start);
        if available > 0 {
            let stats = segment_stats(&pcm[..available], &reference[segment_start..segment_start + available]);
            let active = stats.reference_rms >= ACTIVE_RMS_THRESHOLD;
            power.record(&stats, active);

            let transition_from = previous_mode.filter(|&mode| mode != toc.mode);
            if transition_from.is_some() {
                tracing::debug!(
                    packet = index,
                    from = %previous_mode.map(|m| m.to_string()).unwrap_or_default(),
                    to = %toc.mode,
                    snr_db = stats.snr_db,
                    "mode transition"
                );
            }
            records.push(DivergenceRecord {
                index,
                mode: toc.mode,
                samples: packet.samples(),
                snr_db: stats.snr_db,
                max_abs_diff: stats.max_abs_diff,
                mean_abs_diff: stats.mean_abs_diff,
                transition_from,
            });
        }

        previous_mode = Some(toc.mode);
        offset += produced;
    }

    let expected_samples: usize = packets.iter().map(Packet::samples).sum::<usize>() * channels;
    let shortfall = expected_samples.saturating_sub(reference.len());
    let surplus = reference.len().saturating_sub(expected_samples);
    if shortfall > 0 {
        tracing::warn!(
            expected = expected_samples,
            reference = reference.len(),
            shortfall,
            "reference stream shorter than signalled total"
        );
    }

    VectorAnalysis {
        records,
        power,
        decode_failures,
        skipped_empty,
        expected_samples,
        reference_samples: reference.len(),
        shortfall: (shortfall > 0).then_some(shortfall),
        surplus: (surplus > 0).then_some(surplus),
    }
}
