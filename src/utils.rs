use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn mb_from_bytes(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

/// Items per second, rounded to two decimals. A zero duration reports the
/// plain count.
pub fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        count as f64 / secs
    } else {
        count as f64
    };
    round_two_decimals(rate)
}

pub fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_duration_zero() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
    }

    #[test]
    fn format_duration_rollover() {
        assert_eq!(format_duration(Duration::from_secs(61)), "00:01:01");
        assert_eq!(format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn mb_from_bytes_converts_megabytes() {
        assert_eq!(mb_from_bytes(0), 0.0);
        assert_eq!(mb_from_bytes(3_145_728), 3.0);
    }

    #[test]
    fn per_second_rates() {
        assert_eq!(per_second(300, Duration::from_secs(2)), 150.0);
        assert_eq!(per_second(10, Duration::from_millis(3000)), 3.33);
        assert_eq!(per_second(7, Duration::ZERO), 7.0);
    }

    #[test]
    fn round_two_decimals_rounds_half_up() {
        assert_eq!(round_two_decimals(2.344), 2.34);
        assert_eq!(round_two_decimals(2.5), 2.5);
    }
}
