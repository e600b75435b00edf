// ABOUTME: SMPTE 12M linear timecode encoder
// ABOUTME: Packs 80-bit LTC frames and renders them as a biphase-mark waveform at the output sample rate

use crate::audio::level::OutputLevel;
use crate::error::Error;
use crate::timecode::{FrameRateSpec, Timecode, TvStandard};

/// Bits per LTC frame.
pub const LTC_FRAME_BITS: usize = 80;

/// Sync word occupying bits 64-79, as stored LSB-first in bytes 8 and 9.
const SYNC_BYTES: [u8; 2] = [0xFC, 0xBF];

const DROP_FRAME_BIT: usize = 10;
const POLARITY_BIT_525: usize = 27;
const POLARITY_BIT_625: usize = 59;

/// Turns one timecode into one frame of audio samples.
pub trait TimecodeEncoder {
    /// Encode `timecode` and return the samples for exactly one frame.
    ///
    /// The returned slice is valid until the next call.
    fn encode(&mut self, timecode: &Timecode) -> &[i16];
}

/// One packed 80-bit LTC frame, bit `n` at byte `n / 8`, position `n % 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LtcFrame {
    bytes: [u8; 10],
}

impl LtcFrame {
    /// Pack `timecode` for `rate`, with the calendar date in the user bits
    /// when `with_date` is set.
    pub fn pack(timecode: &Timecode, rate: &FrameRateSpec, with_date: bool) -> Self {
        let mut frame = Self::default();

        frame.put_bcd(0, 8, timecode.frame, 2);
        frame.put_bcd(16, 24, timecode.second, 3);
        frame.put_bcd(32, 40, timecode.minute, 3);
        frame.put_bcd(48, 56, timecode.hour, 2);
        if rate.drop_frame {
            frame.set(DROP_FRAME_BIT, true);
        }

        if with_date {
            let year = timecode.year.rem_euclid(100) as u8;
            let groups = [
                timecode.day % 10,
                timecode.day / 10,
                timecode.month % 10,
                timecode.month / 10,
                year % 10,
                year / 10,
            ];
            for (group, value) in groups.into_iter().enumerate() {
                frame.put_user_group(group, value);
            }
        }

        frame.bytes[8] = SYNC_BYTES[0];
        frame.bytes[9] = SYNC_BYTES[1];

        let polarity_bit = match rate.standard {
            TvStandard::Ntsc525_60 => POLARITY_BIT_525,
            TvStandard::Pal625_50 => POLARITY_BIT_625,
        };
        if frame.count_ones() % 2 == 1 {
            frame.set(polarity_bit, true);
        }
        frame
    }

    pub fn bit(&self, index: usize) -> bool {
        self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn bytes(&self) -> &[u8; 10] {
        &self.bytes
    }

    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    fn set(&mut self, index: usize, value: bool) {
        let mask = 1 << (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }

    fn put_bits(&mut self, start: usize, width: usize, value: u8) {
        for i in 0..width {
            self.set(start + i, value & (1 << i) != 0);
        }
    }

    /// Units digit at `units_at` (4 bits), tens digit at `tens_at` (`tens_width` bits).
    fn put_bcd(&mut self, units_at: usize, tens_at: usize, value: u8, tens_width: usize) {
        self.put_bits(units_at, 4, value % 10);
        self.put_bits(tens_at, tens_width, value / 10);
    }

    /// User bit groups 1-8 sit in the upper nibble of bytes 0-7.
    fn put_user_group(&mut self, group: usize, value: u8) {
        self.put_bits(group * 8 + 4, 4, value);
    }
}

/// Biphase-mark LTC audio generator.
///
/// Frame boundaries are kept on the exact rational grid `sample_rate * den / num`,
/// so fractional samples-per-frame rates (29.97) alternate frame lengths
/// without drift.
pub struct LtcEncoder {
    rate: &'static FrameRateSpec,
    sample_rate: u32,
    amplitude: i16,
    with_date: bool,
    level_high: bool,
    frames_encoded: u64,
    buffer: Vec<i16>,
}

impl LtcEncoder {
    pub fn new(sample_rate: u32, rate: &'static FrameRateSpec, level: OutputLevel) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::Encoder("sample rate must be non-zero".to_string()));
        }
        // Each half bit cell needs at least one sample.
        let min_samples = (LTC_FRAME_BITS * 2) as f64;
        if rate.samples_per_frame(sample_rate) < min_samples {
            return Err(Error::Encoder(format!(
                "{} Hz is too low for {} fps LTC",
                sample_rate, rate.name
            )));
        }

        Ok(Self {
            rate,
            sample_rate,
            amplitude: level.amplitude(),
            with_date: true,
            level_high: false,
            frames_encoded: 0,
            buffer: Vec::with_capacity(rate.nominal_frame_size(sample_rate) + 1),
        })
    }

    /// Leave the user bits empty instead of carrying the date.
    pub fn without_date(mut self) -> Self {
        self.with_date = false;
        self
    }

    pub fn rate(&self) -> &'static FrameRateSpec {
        self.rate
    }

    /// Sample index at which frame `k` begins on the exact grid.
    fn frame_start(&self, k: u64) -> u128 {
        let num = self.rate.numerator as u128;
        let per_frame = self.sample_rate as u128 * self.rate.denominator as u128;
        (k as u128 * per_frame).div_ceil(num)
    }
}

impl TimecodeEncoder for LtcEncoder {
    fn encode(&mut self, timecode: &Timecode) -> &[i16] {
        let frame = LtcFrame::pack(timecode, self.rate, self.with_date);

        let mut half_cells = [false; LTC_FRAME_BITS * 2];
        let mut level = self.level_high;
        for bit in 0..LTC_FRAME_BITS {
            level = !level;
            half_cells[bit * 2] = level;
            if frame.bit(bit) {
                level = !level;
            }
            half_cells[bit * 2 + 1] = level;
        }
        self.level_high = level;

        let k = self.frames_encoded;
        let start = self.frame_start(k);
        let end = self.frame_start(k + 1);
        let num = self.rate.numerator as u128;
        let per_frame = self.sample_rate as u128 * self.rate.denominator as u128;
        let origin = k as u128 * per_frame;
        let last_half = half_cells.len() - 1;

        self.buffer.clear();
        for n in start..end {
            // Position inside the frame in units of 1/(num) samples, scaled to half cells.
            let half = ((n * num - origin) * half_cells.len() as u128 / per_frame) as usize;
            let high = half_cells[half.min(last_half)];
            self.buffer
                .push(if high { self.amplitude } else { -self.amplitude });
        }

        self.frames_encoded += 1;
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::lookup;
    use crate::SAMPLE_RATE;

    fn timecode() -> Timecode {
        Timecode {
            year: 2024,
            month: 3,
            day: 9,
            hour: 12,
            minute: 34,
            second: 56,
            frame: 17,
        }
    }

    fn bits(frame: &LtcFrame, start: usize, width: usize) -> u8 {
        (0..width).fold(0, |acc, i| acc | ((frame.bit(start + i) as u8) << i))
    }

    #[test]
    fn test_pack_time_fields() {
        let frame = LtcFrame::pack(&timecode(), lookup("25").unwrap(), false);
        assert_eq!(bits(&frame, 0, 4), 7);
        assert_eq!(bits(&frame, 8, 2), 1);
        assert_eq!(bits(&frame, 16, 4), 6);
        assert_eq!(bits(&frame, 24, 3), 5);
        assert_eq!(bits(&frame, 32, 4), 4);
        assert_eq!(bits(&frame, 40, 3), 3);
        assert_eq!(bits(&frame, 48, 4), 2);
        assert_eq!(bits(&frame, 56, 2), 1);
        assert!(!frame.bit(DROP_FRAME_BIT));
        assert_eq!(&frame.bytes()[8..], &[0xFC, 0xBF]);
    }

    #[test]
    fn test_pack_date_user_bits() {
        let frame = LtcFrame::pack(&timecode(), lookup("25").unwrap(), true);
        let groups: Vec<u8> = (0..6).map(|g| bits(&frame, g * 8 + 4, 4)).collect();
        assert_eq!(groups, vec![9, 0, 3, 0, 4, 2]);
    }

    #[test]
    fn test_drop_frame_flag() {
        let frame = LtcFrame::pack(&timecode(), lookup("29.97df").unwrap(), false);
        assert!(frame.bit(DROP_FRAME_BIT));
    }

    #[test]
    fn test_even_parity_all_rates() {
        for name in ["24", "25", "29.97", "30", "29.97df", "30df"] {
            for frame_no in 0..24 {
                let mut tc = timecode();
                tc.frame = frame_no;
                let frame = LtcFrame::pack(&tc, lookup(name).unwrap(), true);
                assert_eq!(frame.count_ones() % 2, 0, "rate {name} frame {frame_no}");
            }
        }
    }

    #[test]
    fn test_rejects_low_sample_rate() {
        assert!(LtcEncoder::new(0, lookup("25").unwrap(), OutputLevel::default()).is_err());
        assert!(LtcEncoder::new(2_000, lookup("30").unwrap(), OutputLevel::default()).is_err());
    }

    #[test]
    fn test_pal_frame_length_and_transitions() {
        let rate = lookup("25").unwrap();
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, rate, OutputLevel::default()).unwrap();
        let ones = LtcFrame::pack(&timecode(), rate, true).count_ones() as usize;

        let samples = encoder.encode(&timecode()).to_vec();
        assert_eq!(samples.len(), 1920);
        assert!(samples.iter().all(|&s| s == i16::MAX || s == -i16::MAX));

        // Encoder starts low; the first bit cell opens with a transition.
        let mut previous = -i16::MAX;
        let mut transitions = 0;
        for &s in &samples {
            if s != previous {
                transitions += 1;
            }
            previous = s;
        }
        assert_eq!(transitions, LTC_FRAME_BITS + ones);
        // Even parity: the frame ends at the level it started from.
        assert_eq!(*samples.last().unwrap(), -i16::MAX);
    }

    #[test]
    fn test_ntsc_fractional_frame_lengths() {
        let rate = lookup("29.97").unwrap();
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, rate, OutputLevel::default()).unwrap();
        let mut total = 0;
        for _ in 0..100 {
            let len = encoder.encode(&timecode()).len();
            assert!(len == 1601 || len == 1602, "unexpected length {len}");
            total += len;
        }
        assert_eq!(total, 160_160);
    }

    #[test]
    fn test_level_scales_amplitude() {
        let level = OutputLevel::from_dbfs(-6.0).unwrap();
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, lookup("30").unwrap(), level).unwrap();
        let samples = encoder.encode(&timecode());
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|s| s.abs() == level.amplitude()));
    }

    #[test]
    fn test_without_date_changes_user_bits_only() {
        let rate = lookup("25").unwrap();
        let mut dated = LtcEncoder::new(SAMPLE_RATE, rate, OutputLevel::default()).unwrap();
        let mut plain = LtcEncoder::new(SAMPLE_RATE, rate, OutputLevel::default())
            .unwrap()
            .without_date();
        let a = dated.encode(&timecode()).to_vec();
        let b = plain.encode(&timecode()).to_vec();
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
        // Bit 0 (frame units LSB) is identical in both: first bit cell matches.
        assert_eq!(a[..24], b[..24]);
    }
}
