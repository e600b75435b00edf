// ABOUTME: Timecode value type and civil time conversion
// ABOUTME: Calendar fields plus frame number, with console formatting for the display loop

use crate::timecode::FrameRateSpec;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use std::fmt;

/// A time-of-day timecode with calendar date.
///
/// Produced fresh by every clock computation; plain `Copy` data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timecode {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub frame: u8,
}

/// Time zone used to derive calendar fields from Unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CivilZone {
    /// Host local time, including DST.
    #[default]
    Local,
    /// Coordinated Universal Time.
    Utc,
}

impl CivilZone {
    /// Parse `local` or `utc` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(CivilZone::Local),
            "utc" => Some(CivilZone::Utc),
            _ => None,
        }
    }
}

impl Timecode {
    /// Calendar fields for `unix_seconds` in `zone`, frame left at 0.
    ///
    /// Never fails: an unrepresentable instant (or an ambiguous local time with
    /// no mapping) yields the Unix epoch fields.
    pub fn civil(unix_seconds: i64, zone: CivilZone) -> Self {
        let fields = match zone {
            CivilZone::Utc => DateTime::<Utc>::from_timestamp(unix_seconds, 0).map(|dt| calendar(&dt)),
            CivilZone::Local => Local
                .timestamp_opt(unix_seconds, 0)
                .earliest()
                .map(|dt| calendar(&dt)),
        };
        fields.unwrap_or(Timecode {
            year: 1970,
            month: 1,
            day: 1,
            ..Timecode::default()
        })
    }

    /// `HH:MM:SS:FF`, with `;` before the frames for drop-frame rates.
    pub fn hmsf(&self, drop_frame: bool) -> String {
        let sep = if drop_frame { ';' } else { ':' };
        format!(
            "{:02}:{:02}:{:02}{}{:02}",
            self.hour, self.minute, self.second, sep, self.frame
        )
    }
}

fn calendar<T: Datelike + Timelike>(dt: &T) -> Timecode {
    Timecode {
        year: dt.year(),
        month: dt.month() as u8,
        day: dt.day() as u8,
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
        second: dt.second().min(59) as u8,
        frame: 0,
    }
}

/// One console line for the display loop: `\rHH:MM:SS:FF @ 25.000 fps`.
pub struct DisplayLine<'a> {
    pub timecode: &'a Timecode,
    pub rate: &'a FrameRateSpec,
}

impl fmt::Display for DisplayLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\r{} @ {:.3} fps",
            self.timecode.hmsf(self.rate.drop_frame),
            self.rate.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::rates::lookup;

    #[test]
    fn test_civil_utc() {
        // 2024-03-09T12:34:56Z
        let tc = Timecode::civil(1_709_987_696, CivilZone::Utc);
        assert_eq!(tc.year, 2024);
        assert_eq!(tc.month, 3);
        assert_eq!(tc.day, 9);
        assert_eq!((tc.hour, tc.minute, tc.second), (12, 34, 56));
        assert_eq!(tc.frame, 0);
    }

    #[test]
    fn test_civil_before_epoch() {
        let tc = Timecode::civil(-1, CivilZone::Utc);
        assert_eq!((tc.year, tc.month, tc.day), (1969, 12, 31));
        assert_eq!((tc.hour, tc.minute, tc.second), (23, 59, 59));
    }

    #[test]
    fn test_hmsf_separator() {
        let tc = Timecode {
            hour: 1,
            minute: 2,
            second: 3,
            frame: 4,
            ..Timecode::default()
        };
        assert_eq!(tc.hmsf(false), "01:02:03:04");
        assert_eq!(tc.hmsf(true), "01:02:03;04");
    }

    #[test]
    fn test_display_line() {
        let tc = Timecode {
            hour: 10,
            minute: 11,
            second: 12,
            frame: 13,
            ..Timecode::default()
        };
        let line = DisplayLine {
            timecode: &tc,
            rate: lookup("29.97df").unwrap(),
        };
        assert_eq!(line.to_string(), "\r10:11:12;13 @ 29.970 fps");
    }

    #[test]
    fn test_zone_parse() {
        assert_eq!(CivilZone::parse("UTC"), Some(CivilZone::Utc));
        assert_eq!(CivilZone::parse(" local "), Some(CivilZone::Local));
        assert_eq!(CivilZone::parse("gmt"), None);
    }
}
