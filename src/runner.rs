//! Vector-level orchestration.
//!
//! One vector run is strictly sequential: the divergence pass and the
//! final-range pass each own a fresh decoder and drive it in stream
//! order. Vectors are independent of each other, so a suite fans out
//! across them with rayon; every worker owns its decoder and its
//! accumulators and nothing is shared.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::{self, VectorSummary, WORST_PACKET_COUNT};
use crate::bitstream::{self, Packet};
use crate::decoder::PacketDecoder;
use crate::error::{FoError, FoResult};
use crate::localize::PacketDiagnosis;
use crate::pcm;
use crate::range_check::{self, RangeTally};

/// Settings shared by single-vector and suite runs.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub sample_rate: u32,
    /// Output channel count; inferred from the first packet's TOC when
    /// absent.
    pub channels: Option<usize>,
    /// Worst-SNR packets surfaced per vector.
    pub worst: usize,
    /// Treat final-range mismatches as hard failures.
    pub strict_range: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: None,
            worst: WORST_PACKET_COUNT,
            strict_range: false,
        }
    }
}

/// Outcome of one full vector run.
#[derive(Debug, Clone, Serialize)]
pub struct VectorReport {
    pub name: String,
    pub packets: usize,
    pub channels: usize,
    pub summary: VectorSummary,
    pub range: RangeTally,
}

/// Outcome of a suite run over a directory of vector pairs.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub vectors: Vec<VectorReport>,
    /// Final-range tallies folded across all vectors.
    pub aggregate_range: RangeTally,
    /// Vectors that failed structurally, with the error rendered.
    pub failures: Vec<VectorFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorFailure {
    pub name: String,
    pub error: String,
}

/// Channel count for a run: explicit override, else the first
/// classifiable packet's stereo flag, else mono.
#[must_use]
pub fn resolve_channels(packets: &[Packet], configured: Option<usize>) -> usize {
    configured
        .or_else(|| packets.iter().find_map(|p| p.toc()).map(|toc| toc.channels()))
        .unwrap_or(1)
}

/// Run one vector: divergence analysis plus final-range verification,
/// each over its own fresh decoder.
pub fn run_vector<D, F>(
    make_decoder: &F,
    bit_path: &Path,
    dec_path: &Path,
    config: &HarnessConfig,
) -> FoResult<VectorReport>
where
    D: PacketDecoder,
    F: Fn(u32, usize) -> FoResult<D>,
{
    let name = vector_name(bit_path);
    let packets = bitstream::read_bitstream_file(bit_path)?;
    let reference = pcm::read_reference_file(dec_path)?;
    let channels = resolve_channels(&packets, config.channels);

    tracing::info!(
        vector = %name,
        packets = packets.len(),
        channels,
        reference_samples = reference.len(),
        "starting vector run"
    );

    let mut decoder = make_decoder(config.sample_rate, channels)?;
    let summary = analysis::analyze_vector(&mut decoder, &packets, &reference).summarize(config.worst);

    let mut range_decoder = make_decoder(config.sample_rate, channels)?;
    let range = range_check::verify_final_ranges(&mut range_decoder, &packets);

    tracing::info!(
        vector = %name,
        overall_snr_db = summary.overall_snr_db,
        active_snr_db = summary.active_snr_db,
        range_passed = range.passed,
        range_failed = range.failed,
        "vector run complete"
    );

    Ok(VectorReport {
        name,
        packets: packets.len(),
        channels,
        summary,
        range,
    })
}

/// Discover `<stem>.bit` / `<stem>.dec` pairs in a directory, sorted by
/// name for deterministic ordering.
pub fn discover_vectors(dir: &Path) -> FoResult<Vec<(PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let bit_path = entry?.path();
        if bit_path.extension().and_then(|ext| ext.to_str()) != Some("bit") {
            continue;
        }
        let dec_path = bit_path.with_extension("dec");
        if dec_path.is_file() {
            pairs.push((bit_path, dec_path));
        } else {
            tracing::warn!(
                vector = %bit_path.display(),
                "no matching .dec reference; skipping"
            );
        }
    }
    pairs.sort();
    Ok(pairs)
}

/// Run every vector pair in `dir`, fanning out across vectors. A vector
/// that fails structurally is reported in `failures` without stopping
/// the rest of the suite.
pub fn run_suite<D, F>(make_decoder: &F, dir: &Path, config: &HarnessConfig) -> FoResult<SuiteReport>
where
    D: PacketDecoder,
    F: Fn(u32, usize) -> FoResult<D> + Sync,
{
    let pairs = discover_vectors(dir)?;
    if pairs.is_empty() {
        return Err(FoError::InvalidRequest(format!(
            "no .bit/.dec vector pairs found in {}",
            dir.display()
        )));
    }

    let outcomes: Vec<(String, FoResult<VectorReport>)> = pairs
        .par_iter()
        .map(|(bit_path, dec_path)| {
            (
                vector_name(bit_path),
                run_vector(make_decoder, bit_path, dec_path, config),
            )
        })
        .collect();

    let mut vectors = Vec::new();
    let mut failures = Vec::new();
    let mut aggregate_range = RangeTally::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                aggregate_range.merge(&report.range);
                vectors.push(report);
            }
            Err(error) => failures.push(VectorFailure {
                name,
                error: error.to_string(),
            }),
        }
    }

    tracing::info!(
        vectors = vectors.len(),
        failures = failures.len(),
        aggregate_pass_rate = aggregate_range.pass_rate(),
        "suite complete"
    );

    Ok(SuiteReport {
        vectors,
        aggregate_range,
        failures,
    })
}

fn vector_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Human-readable rendering
// ---------------------------------------------------------------------------

#[must_use]
pub fn render_vector_report(report: &VectorReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "vector {}: {} packets, {} channel(s)",
        report.name, report.packets, report.channels
    );
    let _ = writeln!(
        out,
        "  overall SNR {:.2} dB, active SNR {:.2} dB ({} of {} packets active)",
        summary.overall_snr_db, summary.active_snr_db, summary.active_packets, summary.packets_compared
    );
    let _ = writeln!(
        out,
        "  decode failures {}, empty packets {}",
        summary.decode_failures, summary.skipped_empty
    );
    let _ = writeln!(
        out,
        "  reference {} samples, signalled {}",
        summary.reference_samples, summary.expected_samples
    );
    if let Some(shortfall) = summary.shortfall {
        let _ = writeln!(out, "  WARNING: reference short by {shortfall} samples");
    }
    if let Some(surplus) = summary.surplus {
        let _ = writeln!(out, "  WARNING: reference carries {surplus} extra samples");
    }

    if !summary.worst.is_empty() {
        let _ = writeln!(out, "  worst packets by SNR:");
        for record in &summary.worst {
            let transition = match record.transition_from {
                Some(from) => format!("  (transition from {from})"),
                None => String::new(),
            };
            let _ = writeln!(
                out,
                "    #{:<6} {:<6} {:>5} smp  {:>9.2} dB  maxdiff {:>5}{transition}",
                record.index, record.mode.to_string(), record.samples, record.snr_db, record.max_abs_diff
            );
        }
    }

    if !summary.weak_transitions.is_empty() {
        let _ = writeln!(
            out,
            "  mode transitions below {:.0} dB:",
            analysis::TRANSITION_SNR_FLOOR_DB
        );
        for record in &summary.weak_transitions {
            let from = record
                .transition_from
                .map(|mode| mode.to_string())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    #{:<6} {} -> {}  {:.2} dB",
                record.index, from, record.mode, record.snr_db
            );
        }
    }

    let _ = writeln!(
        out,
        "  final range: {}/{} passed ({:.1}%), {} skipped",
        report.range.passed,
        report.range.checked(),
        report.range.pass_rate() * 100.0,
        report.range.skipped
    );
    for mismatch in &report.range.mismatches {
        let _ = writeln!(
            out,
            "    packet {}: got {:#010x}, want {:#010x}",
            mismatch.packet, mismatch.actual, mismatch.expected
        );
    }
    out
}

#[must_use]
pub fn render_suite_report(report: &SuiteReport) -> String {
    let mut out = String::new();
    for vector in &report.vectors {
        out.push_str(&render_vector_report(vector));
    }
    let _ = writeln!(
        out,
        "suite: {} vectors, aggregate final range {}/{} passed ({:.1}%)",
        report.vectors.len(),
        report.aggregate_range.passed,
        report.aggregate_range.checked(),
        report.aggregate_range.pass_rate() * 100.0
    );
    for failure in &report.failures {
        let _ = writeln!(out, "  FAILED {}: {}", failure.name, failure.error);
    }
    out
}

#[must_use]
pub fn render_diagnosis(diagnosis: &PacketDiagnosis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "packet {} ({} bytes, expected range {:#010x}, warm-up from packet {})",
        diagnosis.index, diagnosis.payload_bytes, diagnosis.expected_range, diagnosis.warmup_start
    );
    match diagnosis.toc {
        Some(toc) => {
            let _ = writeln!(out, "  {toc}");
        }
        None => {
            let _ = writeln!(out, "  empty payload (signalled loss)");
        }
    }
    if let Some(flags) = diagnosis.silk_flags {
        let _ = writeln!(out, "  SILK flags: VAD={} LBRR={}", flags.vad, flags.lbrr);
    }
    if !diagnosis.pairs.is_empty() {
        let _ = writeln!(out, "  leading sample pairs:");
        for pair in &diagnosis.pairs {
            let _ = writeln!(
                out,
                "    [{:>5}] dec={:>6} ref={:>6} diff={:>6}",
                pair.offset, pair.decoded, pair.reference, pair.diff
            );
        }
    }
    if let Some(peak) = &diagnosis.peak {
        let _ = writeln!(
            out,
            "  peak deviation {} at sample {}:",
            peak.magnitude, peak.offset
        );
        for pair in &peak.window {
            let marker = if pair.offset == peak.offset { "  <-- peak" } else { "" };
            let _ = writeln!(
                out,
                "    [{:>5}] dec={:>6} ref={:>6} diff={:>6}{marker}",
                pair.offset, pair.decoded, pair.reference, pair.diff
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::Mode;

    #[test]
    fn resolve_channels_prefers_override_then_toc() {
        let stereo_packet = Packet {
            payload: vec![(31 << 3) | 0x04],
            expected_range: 0,
        };
        let empty = Packet { payload: Vec::new(), expected_range: 0 };

        assert_eq!(resolve_channels(&[stereo_packet.clone()], Some(1)), 1);
        assert_eq!(resolve_channels(&[empty.clone(), stereo_packet], None), 2);
        assert_eq!(resolve_channels(&[empty], None), 1);
        assert_eq!(resolve_channels(&[], None), 1);
    }

    #[test]
    fn rendering_includes_key_figures() {
        let report = VectorReport {
            name: "testvector01".to_owned(),
            packets: 2,
            channels: 1,
            summary: VectorSummary {
                overall_snr_db: 52.5,
                active_snr_db: 51.0,
                packets_compared: 2,
                active_packets: 1,
                decode_failures: 0,
                skipped_empty: 0,
                expected_samples: 1920,
                reference_samples: 1900,
                shortfall: Some(20),
                surplus: None,
                worst: vec![crate::analysis::DivergenceRecord {
                    index: 1,
                    mode: Mode::Celt,
                    samples: 960,
                    snr_db: 12.0,
                    max_abs_diff: 321,
                    mean_abs_diff: 4.5,
                    transition_from: Some(Mode::Silk),
                }],
                weak_transitions: Vec::new(),
            },
            range: RangeTally::default(),
        };
        let rendered = render_vector_report(&report);
        assert!(rendered.contains("testvector01"));
        assert!(rendered.contains("short by 20 samples"));
        assert!(rendered.contains("transition from SILK"));
        assert!(rendered.contains("maxdiff   321"));
    }
}
