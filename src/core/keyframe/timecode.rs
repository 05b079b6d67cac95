//! hh:mm:ss.SSS 时间码

use crate::core::video::error::{VideoError, VideoResult};
use once_cell::sync::Lazy;
use regex::Regex;

static TIMECODE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(\d+):([0-5]?\d):([0-5]?\d)(?:[.,](\d{1,3}))?$"));

/// `"01:23:45.678"` → `5025678`. The fraction may be omitted or shorter
/// than three digits (`".5"` is 500 ms).
pub fn time_string_to_milliseconds(s: &str) -> VideoResult<u64> {
    let re = TIMECODE
        .as_ref()
        .map_err(|e| VideoError::Timecode(e.to_string()))?;
    let caps = re
        .captures(s.trim())
        .ok_or_else(|| VideoError::Timecode(format!("expected hh:mm:ss.SSS, got {:?}", s)))?;

    let field = |i: usize| -> VideoResult<u64> {
        caps.get(i)
            .map_or(Ok(0), |m| m.as_str().parse::<u64>())
            .map_err(|e| VideoError::Timecode(format!("{:?}: {}", s, e)))
    };
    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let millis = match caps.get(4) {
        Some(m) => {
            let digits = m.as_str();
            let value: u64 = digits
                .parse()
                .map_err(|e| VideoError::Timecode(format!("{:?}: {}", s, e)))?;
            value * 10u64.pow(3 - digits.len() as u32)
        }
        None => 0,
    };

    Ok(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Truncates to whole milliseconds; negative input clamps to zero.
pub fn milliseconds_to_time_string(ms: f64) -> String {
    let total = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
    let (hours, rest) = (total / 3_600_000, total % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timecode() {
        assert_eq!(time_string_to_milliseconds("01:23:45.678").unwrap(), 5_025_678);
        assert_eq!(time_string_to_milliseconds("00:00:30.000").unwrap(), 30_000);
        assert_eq!(time_string_to_milliseconds("00:00:01.5").unwrap(), 1_500);
        assert_eq!(time_string_to_milliseconds("00:02:00").unwrap(), 120_000);
        assert_eq!(time_string_to_milliseconds(" 00:00:00.001 ").unwrap(), 1);
    }

    #[test]
    fn test_reject_malformed() {
        for bad in ["", "12", "00:61:00.000", "aa:bb:cc", "00:00:00.1234"] {
            assert!(
                matches!(time_string_to_milliseconds(bad), Err(VideoError::Timecode(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_format_timecode() {
        assert_eq!(milliseconds_to_time_string(5_025_678.0), "01:23:45.678");
        assert_eq!(milliseconds_to_time_string(30_500.0), "00:00:30.500");
        assert_eq!(milliseconds_to_time_string(999.9), "00:00:00.999");
        assert_eq!(milliseconds_to_time_string(-3.0), "00:00:00.000");
    }

    #[test]
    fn test_format_parse_agree() {
        for ms in [0u64, 1, 59_999, 3_600_000, 86_399_999] {
            let s = milliseconds_to_time_string(ms as f64);
            assert_eq!(time_string_to_milliseconds(&s).unwrap(), ms);
        }
    }
}
