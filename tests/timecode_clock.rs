use ltc_clock::timecode::{
    lookup, CivilZone, CorrectionCurve, DisplayLine, TimecodeClock, WallClockSample,
    SUPPORTED_RATES,
};

// 2024-01-01T00:00:00Z
const NEW_YEAR_2024_US: i64 = 1_704_067_200_000_000;

fn utc_clock(name: &str) -> TimecodeClock {
    TimecodeClock::new(lookup(name).unwrap()).with_zone(CivilZone::Utc)
}

#[test]
fn test_frame_range_all_rates() {
    for rate in SUPPORTED_RATES.iter() {
        let clock = TimecodeClock::new(rate).with_zone(CivilZone::Utc);
        let limit = rate.frames_per_second();
        for step in 0..2_000i64 {
            let now = WallClockSample::from_unix_micros(NEW_YEAR_2024_US + step * 997);
            let display = clock.compute_display(now, 0);
            let paced = clock.compute_paced(now, Some(step as u64 * 7), 0);
            assert!(display.frame < limit, "rate {} display frame {}", rate, display.frame);
            assert!(paced.frame < limit, "rate {} paced frame {}", rate, paced.frame);
        }
    }
}

#[test]
fn test_drop_frame_skips_first_two_frames() {
    for name in ["29.97df", "30df"] {
        let clock = utc_clock(name);
        for minute in 0..20i64 {
            let minute_start = NEW_YEAR_2024_US + minute * 60_000_000;
            for us in [0, 20_000, 40_000, 66_000] {
                let tc = clock.compute_display(WallClockSample::from_unix_micros(minute_start + us), 0);
                assert_eq!(tc.minute as i64, minute);
                if minute % 10 == 0 {
                    assert!(tc.frame < 2 || us == 66_000, "{name} minute {minute}");
                } else {
                    assert_eq!(tc.frame, 2, "{name} minute {minute} at {us}us");
                }
            }
        }
    }
}

#[test]
fn test_non_drop_rates_start_at_zero() {
    for name in ["24", "25", "29.97", "30"] {
        let clock = utc_clock(name);
        let tc = clock.compute_display(
            WallClockSample::from_unix_micros(NEW_YEAR_2024_US + 60_000_000),
            0,
        );
        assert_eq!((tc.minute, tc.second, tc.frame), (1, 0, 0));
    }
}

#[test]
fn test_display_idempotent() {
    let clock = utc_clock("29.97df");
    let now = WallClockSample::from_unix_micros(NEW_YEAR_2024_US + 123_456_789);
    assert_eq!(clock.compute_display(now, 5_000), clock.compute_display(now, 5_000));
}

#[test]
fn test_calendar_fields() {
    let clock = utc_clock("25");
    let tc = clock.compute_display(
        WallClockSample::from_unix_micros(NEW_YEAR_2024_US + 3_723_480_000),
        0,
    );
    assert_eq!((tc.year, tc.month, tc.day), (2024, 1, 1));
    assert_eq!((tc.hour, tc.minute, tc.second, tc.frame), (1, 2, 3, 12));
}

#[test]
fn test_correction_curve_shifts_paced_only() {
    let now = WallClockSample::from_unix_micros(NEW_YEAR_2024_US);
    let corrected = utc_clock("25");
    let flat = utc_clock("25").with_curve(CorrectionCurve::disabled());

    assert_eq!(flat.compute_paced(now, Some(0), 0).frame, 0);
    assert_eq!(corrected.compute_paced(now, Some(0), 0).frame, 3);
    assert_eq!(corrected.compute_display(now, 0).frame, 0);
}

#[test]
fn test_display_line_format() {
    let clock = utc_clock("29.97df");
    let rate = clock.rate();
    let tc = clock.compute_display(
        WallClockSample::from_unix_micros(NEW_YEAR_2024_US + 3_723_500_000),
        0,
    );
    let line = DisplayLine { timecode: &tc, rate }.to_string();
    assert_eq!(line, "\r01:02:03;14 @ 29.970 fps");

    let clock = utc_clock("25");
    let tc = clock.compute_display(WallClockSample::from_unix_micros(NEW_YEAR_2024_US), 0);
    let line = DisplayLine { timecode: &tc, rate: clock.rate() }.to_string();
    assert_eq!(line, "\r00:00:00:00 @ 25.000 fps");
}
