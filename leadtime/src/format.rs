//! Text labels for times and durations.

use crate::MINUTES_PER_DAY;

pub const NEXT_DAY_LABEL: &str = "First flight next day";

fn clock(minutes: i64) -> String {
    let tod = minutes.rem_euclid(i64::from(MINUTES_PER_DAY));
    format!("{:02}:{:02}", tod / 60, tod % 60)
}

/// Absolute instant relative to the order day: `"07:00"`, `"09:00 (+1d)"`,
/// or `"22:00 (prev day)"`.
pub fn format_abs_time(abs_minutes: f64) -> String {
    let minutes = abs_minutes.round() as i64;
    let day_offset = minutes.div_euclid(i64::from(MINUTES_PER_DAY));
    let base = clock(minutes);
    match day_offset {
        d if d > 0 => format!("{base} (+{d}d)"),
        d if d < 0 => format!("{base} (prev day)"),
        _ => base,
    }
}

/// Order cutoff time of day; negative values fall on the previous day.
pub fn format_cutoff(cutoff_tod_minutes: f64) -> String {
    let minutes = cutoff_tod_minutes.round() as i64;
    if minutes >= 0 {
        clock(minutes)
    } else {
        format!("{} (prev day)", clock(minutes))
    }
}

/// `"45m"`, `"2h"`, `"1h 30m"`, with a leading `-` for negative spans.
pub fn format_duration_minutes(minutes: f64) -> String {
    let mins = minutes.round() as i64;
    let sign = if mins < 0 { "-" } else { "" };
    let abs = mins.abs();
    let (h, m) = (abs / 60, abs % 60);
    if h == 0 {
        format!("{sign}{m}m")
    } else if m == 0 {
        format!("{sign}{h}h")
    } else {
        format!("{sign}{h}h {m}m")
    }
}

pub fn format_hours(hours: f64) -> String {
    format!("{hours:.2}h")
}

pub fn format_percent(pct: f64) -> String {
    format!("{pct:.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_abs_time() {
        assert_eq!(format_abs_time(420.0), "07:00");
        assert_eq!(format_abs_time(1440.0 + 540.0), "09:00 (+1d)");
        assert_eq!(format_abs_time(-120.0), "22:00 (prev day)");
        assert_eq!(format_abs_time(180.4), "03:00");
    }

    #[test]
    fn test_format_cutoff() {
        assert_eq!(format_cutoff(360.0), "06:00");
        assert_eq!(format_cutoff(-60.0), "23:00 (prev day)");
        assert_eq!(format_cutoff(-1440.0), "00:00 (prev day)");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration_minutes(45.0), "45m");
        assert_eq!(format_duration_minutes(120.0), "2h");
        assert_eq!(format_duration_minutes(90.0), "1h 30m");
        assert_eq!(format_duration_minutes(-61.0), "-1h 1m");
        assert_eq!(format_duration_minutes(0.0), "0m");
    }

    #[test]
    fn test_format_numbers() {
        assert_eq!(format_hours(24.0), "24.00h");
        assert_eq!(format_percent(33.2639), "33.26%");
    }
}
