//! Watch-progress strings reported by the home-media history server.
//!
//! Three shapes are understood: `"Unknown"`, a bare duration `"<N>s"`, and
//! the structured `"<start>/<total>s (<pct>%)"`.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static BARE_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)s$").expect("valid regex"));
static STRUCTURED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)/(\d+)s \(([\d.]+)%\)$").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackInfo {
    pub start_time: i64,
    pub total_time: i64,
    pub percentage: f64,
}

impl PlaybackInfo {
    /// Seconds left to watch; never negative.
    pub fn remaining(&self) -> i64 {
        (self.total_time - self.start_time).max(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Playback {
    Known(PlaybackInfo),
    /// The source reported `"Unknown"`.
    Unset,
    Malformed(String),
}

impl Playback {
    /// Progress to act on. `Unset` reads as zero progress; `Malformed` has none.
    pub fn info(&self) -> Option<PlaybackInfo> {
        match self {
            Self::Known(info) => Some(*info),
            Self::Unset => Some(PlaybackInfo::default()),
            Self::Malformed(_) => None,
        }
    }
}

pub fn parse_playback(raw: &str) -> Playback {
    let raw = raw.trim();
    if raw == "Unknown" {
        return Playback::Unset;
    }

    if let Some(caps) = BARE_SECONDS.captures(raw) {
        return match caps[1].parse::<i64>() {
            Ok(total_time) => Playback::Known(PlaybackInfo {
                start_time: 0,
                total_time,
                percentage: 0.0,
            }),
            Err(e) => Playback::Malformed(format!("{raw}: {e}")),
        };
    }

    let Some(caps) = STRUCTURED.captures(raw) else {
        return Playback::Malformed(format!("unrecognized playback format: {raw:?}"));
    };

    let start_time = caps[1].parse::<i64>();
    let total_time = caps[2].parse::<i64>();
    let percentage = caps[3].parse::<f64>();

    match (start_time, total_time, percentage) {
        (Ok(start_time), Ok(total_time), Ok(percentage)) => Playback::Known(PlaybackInfo {
            start_time,
            total_time,
            percentage,
        }),
        _ => Playback::Malformed(format!("invalid numbers in playback: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_form() {
        let parsed = parse_playback("120/600s (20%)");
        let info = parsed.info().unwrap();
        assert_eq!(info.start_time, 120);
        assert_eq!(info.total_time, 600);
        assert!((info.percentage - 20.0).abs() < f64::EPSILON);
        assert_eq!(info.remaining(), 480);
    }

    #[test]
    fn fractional_percentage() {
        let info = parse_playback("10/3600s (0.27%)").info().unwrap();
        assert!((info.percentage - 0.27).abs() < 1e-9);
    }

    #[test]
    fn unknown_is_zero_progress() {
        let parsed = parse_playback("Unknown");
        assert_eq!(parsed, Playback::Unset);
        assert_eq!(parsed.info(), Some(PlaybackInfo::default()));
        assert_eq!(parsed.info().unwrap().remaining(), 0);
    }

    #[test]
    fn bare_seconds_is_total_time() {
        let info = parse_playback("900s").info().unwrap();
        assert_eq!(
            info,
            PlaybackInfo {
                start_time: 0,
                total_time: 900,
                percentage: 0.0
            }
        );
    }

    #[test]
    fn garbage_is_malformed_not_panic() {
        for raw in ["", "abc", "12/s (1%)", "1.5.5/20s (3%)", "10/20s (1.2.3%)"] {
            let parsed = parse_playback(raw);
            assert!(matches!(parsed, Playback::Malformed(_)), "{raw}");
            assert!(parsed.info().is_none());
        }
    }

    #[test]
    fn remaining_never_negative() {
        let info = parse_playback("700/600s (100%)").info().unwrap();
        assert_eq!(info.remaining(), 0);
    }
}
