//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::localize::LocalizeConfig;
use crate::runner::HarnessConfig;

#[derive(Parser, Debug)]
#[command(
    name = "franken_opus",
    version,
    about = "Conformance harness for Opus decoder implementations",
    long_about = "Replays opus_demo-format test vectors through a decoder backend and \
reports sample-level SNR divergence, entropy-coder final-range agreement, and \
per-packet failure localization."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay one vector and report SNR divergence plus final-range agreement.
    Analyze(AnalyzeArgs),
    /// Run every .bit/.dec pair in a directory, vectors in parallel.
    Suite(SuiteArgs),
    /// Check only the entropy-coder final range, packet by packet.
    VerifyRange(VerifyRangeArgs),
    /// Deep-dive suspect packets with a fresh, warmed-up decoder.
    Localize(LocalizeArgs),
    /// Export one packet as a standalone single-record container.
    Extract(ExtractArgs),
    /// Summarize a vector container without decoding anything.
    Info(InfoArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Vector container (.bit).
    pub bitstream: PathBuf,
    /// Reference decode (.dec).
    pub reference: PathBuf,
    /// Output channel count; inferred from the first packet when omitted.
    #[arg(long)]
    pub channels: Option<usize>,
    /// Decoder output sample rate in Hz.
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
    /// How many worst-SNR packets to surface.
    #[arg(long, default_value_t = 5)]
    pub worst: usize,
    /// Treat any final-range mismatch as a hard failure.
    #[arg(long)]
    pub strict_range: bool,
    /// Emit the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeArgs {
    #[must_use]
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            worst: self.worst,
            strict_range: self.strict_range,
        }
    }
}

#[derive(Args, Debug)]
pub struct SuiteArgs {
    /// Directory holding .bit containers with sibling .dec references.
    pub directory: PathBuf,
    /// Output channel count override for every vector.
    #[arg(long)]
    pub channels: Option<usize>,
    /// Decoder output sample rate in Hz.
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
    /// How many worst-SNR packets to surface per vector.
    #[arg(long, default_value_t = 5)]
    pub worst: usize,
    /// Treat any final-range mismatch as a hard failure.
    #[arg(long)]
    pub strict_range: bool,
    /// Emit the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl SuiteArgs {
    #[must_use]
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            worst: self.worst,
            strict_range: self.strict_range,
        }
    }
}

#[derive(Args, Debug)]
pub struct VerifyRangeArgs {
    /// Vector container (.bit).
    pub bitstream: PathBuf,
    /// Output channel count; inferred from the first packet when omitted.
    #[arg(long)]
    pub channels: Option<usize>,
    /// Decoder output sample rate in Hz.
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
    /// Fail when any packet's final range disagrees.
    #[arg(long)]
    pub strict: bool,
    /// Emit the tally as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct LocalizeArgs {
    /// Vector container (.bit).
    pub bitstream: PathBuf,
    /// Reference decode (.dec).
    pub reference: PathBuf,
    /// Suspect packet index; repeat for several targets.
    #[arg(long = "packet", required = true)]
    pub packets: Vec<usize>,
    /// Warm-up packets replayed before each target.
    #[arg(long, default_value_t = 20)]
    pub warmup: usize,
    /// Leading sample pairs to dump.
    #[arg(long, default_value_t = 20)]
    pub pairs: usize,
    /// Context samples on each side of the peak deviation.
    #[arg(long, default_value_t = 5)]
    pub context: usize,
    /// Output channel count; inferred from the first packet when omitted.
    #[arg(long)]
    pub channels: Option<usize>,
    /// Decoder output sample rate in Hz.
    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,
    /// Emit diagnoses as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl LocalizeArgs {
    #[must_use]
    pub fn localize_config(&self) -> LocalizeConfig {
        LocalizeConfig {
            warmup_packets: self.warmup,
            sample_pairs: self.pairs,
            context: self.context,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Vector container (.bit).
    pub bitstream: PathBuf,
    /// Packet index to export.
    #[arg(long)]
    pub packet: usize,
    /// Destination file for the single-record container.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Vector container (.bit).
    pub bitstream: PathBuf,
    /// Emit the summary as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}
