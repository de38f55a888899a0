//! Entropy-coder final-range verification.
//!
//! After every successful decode the decoder exposes a 32-bit checksum
//! of its internal entropy-coder state; the vector container stores the
//! value the reference encoder saw. Agreement is the strictest possible
//! compliance bar, so by default the tally is advisory: a decoder can
//! be perceptually correct without being bit-exact, and callers opt in
//! to strict failure explicitly.

use serde::Serialize;

use crate::bitstream::Packet;
use crate::decoder::{MAX_PACKET_SAMPLES, PacketDecoder};

/// Cap on retained mismatch details, to bound log volume on decoders
/// that diverge everywhere.
pub const MAX_RECORDED_MISMATCHES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeMismatch {
    pub packet: usize,
    pub expected: u32,
    pub actual: u32,
}

/// Pass/fail/skip counters for one or more vectors. Monotone: counters
/// only ever increase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RangeTally {
    pub passed: usize,
    pub failed: usize,
    /// Packets whose decode failed; checksum comparison is only
    /// meaningful after a successful decode.
    pub skipped: usize,
    /// First [`MAX_RECORDED_MISMATCHES`] mismatches, verbatim.
    pub mismatches: Vec<RangeMismatch>,
}

impl RangeTally {
    pub fn observe_pass(&mut self) {
        self.passed += 1;
    }

    pub fn observe_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn observe_mismatch(&mut self, mismatch: RangeMismatch) {
        self.failed += 1;
        if self.mismatches.len() < MAX_RECORDED_MISMATCHES {
            self.mismatches.push(mismatch);
        }
    }

    #[must_use]
    pub fn checked(&self) -> usize {
        self.passed + self.failed
    }

    /// Fraction of checked packets that passed; 0.0 when nothing was
    /// checked.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        let checked = self.checked();
        if checked == 0 {
            0.0
        } else {
            self.passed as f64 / checked as f64
        }
    }

    /// Fold another vector's tally into an aggregate.
    pub fn merge(&mut self, other: &RangeTally) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        for mismatch in &other.mismatches {
            if self.mismatches.len() >= MAX_RECORDED_MISMATCHES {
                break;
            }
            self.mismatches.push(*mismatch);
        }
    }

    /// Whether this tally constitutes a failure under the caller's
    /// strictness policy. Advisory (non-strict) tallies never fail.
    #[must_use]
    pub fn is_failure(&self, strict: bool) -> bool {
        strict && self.failed > 0
    }
}

/// Decode every packet in stream order and compare the decoder's
/// post-decode final range against the expected value stored with the
/// packet. Never aborts: mismatches and decode errors are tallied and
/// the pass continues.
pub fn verify_final_ranges<D: PacketDecoder>(decoder: &mut D, packets: &[Packet]) -> RangeTally {
    let channels = decoder.channels();
    let mut pcm = vec![0i16; MAX_PACKET_SAMPLES * channels];
    let mut tally = RangeTally::default();

    for (index, packet) in packets.iter().enumerate() {
        match decoder.decode(&packet.payload, &mut pcm) {
            Ok(_) => {
                let actual = decoder.final_range();
                if actual == packet.expected_range {
                    tally.observe_pass();
                } else {
                    if tally.failed < MAX_RECORDED_MISMATCHES {
                        tracing::debug!(
                            packet = index,
                            expected = format_args!("{:#010x}", packet.expected_range),
                            actual = format_args!("{actual:#010x}"),
                            "final range mismatch"
                        );
                    }
                    tally.observe_mismatch(RangeMismatch {
                        packet: index,
                        expected: packet.expected_range,
                        actual,
                    });
                }
            }
            Err(error) => {
                tally.observe_skip();
                tracing::debug!(packet = index, %error, "decode error; skipping range check");
            }
        }
    }

    tracing::info!(
        passed = tally.passed,
        failed = tally.failed,
        skipped = tally.skipped,
        "final range verification"
    );
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeError;

    // Decoder whose final range is scripted per packet; payloads are
    // ignored and every decode emits one 20 ms mono frame.
    struct RangeScriptDecoder {
        ranges: Vec<Result<u32, DecodeError>>,
        cursor: usize,
        last: u32,
    }

    impl RangeScriptDecoder {
        fn new(ranges: Vec<Result<u32, DecodeError>>) -> Self {
            Self { ranges, cursor: 0, last: 0 }
        }
    }

    impl PacketDecoder for RangeScriptDecoder {
        fn decode(&mut self, _payload: &[u8], pcm: &mut [i16]) -> Result<usize, DecodeError> {
            let step = self.ranges.get(self.cursor).cloned().unwrap_or(Ok(0));
            self.cursor += 1;
            self.last = step?;
            pcm[..960].fill(0);
            Ok(960)
        }

        fn final_range(&mut self) -> u32 {
            self.last
        }

        fn channels(&self) -> usize {
            1
        }
    }

    fn packets_with_ranges(ranges: &[u32]) -> Vec<Packet> {
        ranges
            .iter()
            .map(|&expected_range| Packet { payload: vec![1 << 3], expected_range })
            .collect()
    }

    #[test]
    fn tallies_passes_and_failures() {
        // Ten packets; the decoder disagrees on packets 2 and 5.
        let expected: Vec<u32> = (0..10).map(|i| 0x1000 + i).collect();
        let packets = packets_with_ranges(&expected);
        let actual: Vec<Result<u32, DecodeError>> = expected
            .iter()
            .enumerate()
            .map(|(i, &range)| if i == 2 || i == 5 { Ok(range ^ 0xFF) } else { Ok(range) })
            .collect();
        let mut decoder = RangeScriptDecoder::new(actual);

        let tally = verify_final_ranges(&mut decoder, &packets);
        assert_eq!(tally.passed, 8);
        assert_eq!(tally.failed, 2);
        assert_eq!(tally.skipped, 0);
        assert_eq!(tally.mismatches.len(), 2);
        assert_eq!(tally.mismatches[0].packet, 2);
        assert_eq!(tally.mismatches[1].packet, 5);
        assert!((tally.pass_rate() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn decode_errors_skip_the_check() {
        let packets = packets_with_ranges(&[1, 2, 3]);
        let mut decoder = RangeScriptDecoder::new(vec![
            Ok(1),
            Err(DecodeError::InvalidPacket("torn".to_owned())),
            Ok(3),
        ]);
        let tally = verify_final_ranges(&mut decoder, &packets);
        assert_eq!(tally.passed, 2);
        assert_eq!(tally.failed, 0);
        assert_eq!(tally.skipped, 1);
    }

    #[test]
    fn mismatch_details_are_bounded() {
        let expected: Vec<u32> = (0..20).collect();
        let packets = packets_with_ranges(&expected);
        let actual = expected.iter().map(|&r| Ok(r + 1000)).collect();
        let mut decoder = RangeScriptDecoder::new(actual);

        let tally = verify_final_ranges(&mut decoder, &packets);
        assert_eq!(tally.failed, 20);
        assert_eq!(tally.mismatches.len(), MAX_RECORDED_MISMATCHES);
    }

    #[test]
    fn merge_aggregates_across_vectors() {
        let mut aggregate = RangeTally::default();
        let mut one = RangeTally::default();
        one.observe_pass();
        one.observe_mismatch(RangeMismatch { packet: 3, expected: 1, actual: 2 });
        let mut two = RangeTally::default();
        two.observe_pass();
        two.observe_skip();

        aggregate.merge(&one);
        aggregate.merge(&two);
        assert_eq!(aggregate.passed, 2);
        assert_eq!(aggregate.failed, 1);
        assert_eq!(aggregate.skipped, 1);
        assert_eq!(aggregate.mismatches.len(), 1);
    }

    #[test]
    fn strictness_is_caller_controlled() {
        let mut tally = RangeTally::default();
        tally.observe_mismatch(RangeMismatch { packet: 0, expected: 1, actual: 2 });
        assert!(!tally.is_failure(false));
        assert!(tally.is_failure(true));

        let clean = RangeTally::default();
        assert!(!clean.is_failure(true));
    }

    #[test]
    fn empty_tally_has_zero_pass_rate() {
        assert_eq!(RangeTally::default().pass_rate(), 0.0);
    }
}
