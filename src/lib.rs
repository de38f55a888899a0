#![forbid(unsafe_code)]

//! Compliance-verification harness for Opus-style decoder
//! implementations.
//!
//! The harness replays `opus_demo`-format test vectors (a `.bit`
//! container of framed packets plus a `.dec` reference decode) through
//! a [`decoder::PacketDecoder`] and quantifies how closely the output
//! matches the reference: per-packet and aggregate signal-to-noise
//! ratios, entropy-coder final-range agreement, and sample-level
//! localization of the worst divergences.
//!
//! The decoder itself is an external collaborator: enable the `libopus`
//! feature to bind the seam to the reference decoder via the `opus`
//! crate, or implement [`decoder::PacketDecoder`] for a decoder under
//! test.

pub mod analysis;
pub mod bitstream;
pub mod cli;
pub mod decoder;
pub mod error;
pub mod localize;
pub mod logging;
pub mod pcm;
pub mod range_check;
pub mod runner;
pub mod toc;

pub use decoder::{DecodeError, PacketDecoder};
pub use error::{FoError, FoResult};
pub use runner::{HarnessConfig, SuiteReport, VectorReport};
