//! Timeline time in integer microseconds.
//!
//! Positions, durations, source points and keyframe times all use [`Time`].
//! Integer time keeps split/merge and ripple arithmetic exact.

/// Microseconds since timeline (or source, or clip-local) zero.
pub type Time = i64;

pub const MICROS_PER_SECOND: Time = 1_000_000;
pub const MICROS_PER_MILLI: Time = 1_000;

/// Time zero.
pub const ZERO: Time = 0;

/// Convert seconds to microseconds (rounded to nearest).
#[inline]
pub fn from_seconds(seconds: f64) -> Time {
    (seconds * MICROS_PER_SECOND as f64).round() as Time
}

/// Convert microseconds to seconds.
#[inline]
pub fn to_seconds(micros: Time) -> f64 {
    micros as f64 / MICROS_PER_SECOND as f64
}

#[inline]
pub fn from_millis(millis: i64) -> Time {
    millis * MICROS_PER_MILLI
}

#[inline]
pub fn to_millis(micros: Time) -> i64 {
    micros / MICROS_PER_MILLI
}

/// Duration of one frame at the given rate.
#[inline]
pub fn frame_duration(fps: f64) -> Time {
    if fps <= 0.0 {
        return 1;
    }
    ((MICROS_PER_SECOND as f64 / fps).floor() as Time).max(1)
}

/// Frame index containing `micros` at the given rate.
#[inline]
pub fn to_frame_index(micros: Time, fps: f64) -> i64 {
    (to_seconds(micros) * fps).floor() as i64
}

/// Format as `HH:MM:SS.mmm`. Negative values get a leading `-`.
pub fn format_time(micros: Time) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let total_ms = abs / MICROS_PER_MILLI as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{}{:02}:{:02}:{:02}.{:03}", sign, hours, minutes, seconds, millis)
}

/// Parse a time argument: plain seconds (`"4.5"`), or `MM:SS(.fff)` / `HH:MM:SS(.fff)`.
pub fn parse_time(text: &str) -> Option<Time> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let parts: Vec<&str> = body.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut seconds = 0.0;
    for part in &parts {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }
    let t = from_seconds(seconds);
    Some(if negative { -t } else { t })
}
