use crate::error::{AppError, Result};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Videos at or below this length are classified as shorts.
pub const SHORTS_MAX: Duration = Duration::from_secs(60);

static ISO_8601: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("valid regex")
});

/// Parse an ISO-8601 duration such as `PT1H2M3S` or `P0D`.
pub fn parse_iso8601(raw: &str) -> Result<Duration> {
    let normalized = raw.trim().to_ascii_uppercase();
    let caps = ISO_8601
        .captures(&normalized)
        .ok_or_else(|| AppError::ParseError(format!("invalid ISO-8601 duration: {raw:?}")))?;

    // "P" and "PT" alone match the pattern but carry no component.
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return Err(AppError::ParseError(format!(
            "empty ISO-8601 duration: {raw:?}"
        )));
    }

    let component = |i: usize, unit: u64| -> Result<u64> {
        let Some(m) = caps.get(i) else {
            return Ok(0);
        };
        m.as_str()
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(unit))
            .ok_or_else(|| AppError::ParseError(format!("duration component out of range: {raw:?}")))
    };

    let whole = [
        component(1, 7 * 86_400)?,
        component(2, 86_400)?,
        component(3, 3_600)?,
        component(4, 60)?,
    ]
    .into_iter()
    .try_fold(0u64, u64::checked_add)
    .ok_or_else(|| AppError::ParseError(format!("duration out of range: {raw:?}")))?;

    let fraction = match caps.get(5) {
        Some(m) => m
            .as_str()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or_else(|| AppError::ParseError(format!("seconds out of range: {raw:?}")))?,
        None => Duration::ZERO,
    };

    Duration::from_secs(whole)
        .checked_add(fraction)
        .ok_or_else(|| AppError::ParseError(format!("duration out of range: {raw:?}")))
}

pub fn is_shorts(duration: Duration) -> bool {
    duration <= SHORTS_MAX
}
