//! The decoder seam.
//!
//! This harness verifies decoders; it does not implement one. Every
//! analysis pass drives the [`PacketDecoder`] trait, and the `libopus`
//! cargo feature binds it to the `opus` crate so the binary can run
//! against the reference decoder end-to-end. Builds without a backend
//! still expose the library and the file-inspection subcommands.

use thiserror::Error;

use crate::error::FoResult;

/// Longest duration a single packet can signal: 120 ms at 48 kHz,
/// in samples per channel. Used to size decode buffers.
pub const MAX_PACKET_SAMPLES: usize = 5760;

/// Per-packet decode failure. Recovered locally by the analysis passes;
/// never aborts a vector run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("decoder rejected packet: {0}")]
    InvalidPacket(String),

    #[error("output buffer holds {available} samples but packet needs {needed}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("decoder backend failure: {0}")]
    Backend(String),
}

/// A stateful packet decoder under verification.
///
/// Implementations carry mutable internal state across calls (entropy
/// coder range, prediction history) that only advances correctly under
/// in-order, non-reentrant use: feed packets strictly in stream order
/// and never share an instance between concurrent passes.
pub trait PacketDecoder {
    /// Decode one packet into `pcm` (interleaved), returning the number
    /// of samples produced per channel. A zero-length payload signals
    /// packet loss and must be accepted.
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError>;

    /// Entropy-coder state observed immediately after the most recent
    /// decode. Compared against the per-packet expected value as the
    /// strict bit-exactness signal.
    fn final_range(&mut self) -> u32;

    /// Channel count the decoder was configured for.
    fn channels(&self) -> usize;
}

impl<D: PacketDecoder + ?Sized> PacketDecoder for Box<D> {
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
        (**self).decode(payload, pcm)
    }

    fn final_range(&mut self) -> u32 {
        (**self).final_range()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }
}

#[cfg(feature = "libopus")]
pub use libopus::LibopusDecoder;

#[cfg(feature = "libopus")]
mod libopus {
    use super::{DecodeError, PacketDecoder};
    use crate::error::{FoError, FoResult};

    /// Reference decoder backed by the `opus` crate (libopus FFI).
    pub struct LibopusDecoder {
        inner: opus::Decoder,
        channels: usize,
    }

    impl LibopusDecoder {
        pub fn new(sample_rate: u32, channels: usize) -> FoResult<Self> {
            let layout = match channels {
                1 => opus::Channels::Mono,
                2 => opus::Channels::Stereo,
                other => {
                    return Err(FoError::DecoderConfig(format!(
                        "unsupported channel count {other}"
                    )));
                }
            };
            let inner = opus::Decoder::new(sample_rate, layout)
                .map_err(|error| FoError::DecoderConfig(error.to_string()))?;
            Ok(Self { inner, channels })
        }
    }

    impl PacketDecoder for LibopusDecoder {
        fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
            self.inner
                .decode(payload, pcm, false)
                .map_err(|error| DecodeError::Backend(error.to_string()))
        }

        fn final_range(&mut self) -> u32 {
            self.inner.get_final_range().unwrap_or(0)
        }

        fn channels(&self) -> usize {
            self.channels
        }
    }
}

/// Placeholder backend for builds without a decoder; never constructed.
#[cfg(not(feature = "libopus"))]
pub enum NeverDecoder {}

#[cfg(not(feature = "libopus"))]
impl PacketDecoder for NeverDecoder {
    fn decode(&mut self, _payload: &[u8], _pcm: &mut [i16]) -> Result<usize, DecodeError> {
        match *self {}
    }

    fn final_range(&mut self) -> u32 {
        match *self {}
    }

    fn channels(&self) -> usize {
        match *self {}
    }
}

/// Construct the decoder backend this build carries.
#[cfg(feature = "libopus")]
pub fn backend(sample_rate: u32, channels: usize) -> FoResult<LibopusDecoder> {
    LibopusDecoder::new(sample_rate, channels)
}

/// Construct the decoder backend this build carries.
///
/// This build has none; decode-driven subcommands report the missing
/// backend instead of guessing.
#[cfg(not(feature = "libopus"))]
pub fn backend(_sample_rate: u32, _channels: usize) -> FoResult<NeverDecoder> {
    Err(crate::error::FoError::DecoderUnavailable(
        "built without a decoder backend; rebuild with --features libopus".to_owned(),
    ))
}
