//! Keyframe tracks and interpolation.
//!
//! Keyframe times are clip-local. A track is kept sorted by time with at
//! most one keyframe per time: setting an existing time overwrites it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::Time;

/// A clip property that can be animated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimatedProperty {
    PositionX,
    PositionY,
    ScaleX,
    ScaleY,
    Rotation,
    Opacity,
    Volume,
    /// Effect parameter or other renderer-defined property.
    Custom(String),
}

impl AnimatedProperty {
    /// Value used when the property has no keyframes (identity transform).
    pub fn default_value(&self) -> f64 {
        match self {
            AnimatedProperty::ScaleX
            | AnimatedProperty::ScaleY
            | AnimatedProperty::Opacity
            | AnimatedProperty::Volume => 1.0,
            _ => 0.0,
        }
    }

    /// Parse `position_x`, `opacity`, ...; anything else becomes `Custom`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "position_x" | "x" => AnimatedProperty::PositionX,
            "position_y" | "y" => AnimatedProperty::PositionY,
            "scale_x" => AnimatedProperty::ScaleX,
            "scale_y" => AnimatedProperty::ScaleY,
            "rotation" => AnimatedProperty::Rotation,
            "opacity" => AnimatedProperty::Opacity,
            "volume" => AnimatedProperty::Volume,
            _ => AnimatedProperty::Custom(name.to_string()),
        }
    }
}

/// How the value travels from one keyframe to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    /// Keep the value until the next keyframe.
    Hold,
    EaseIn,
    EaseOut,
    EaseInOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: Time,
    pub value: f64,
    #[serde(default)]
    pub easing: Easing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTrack {
    pub property: AnimatedProperty,
    keyframes: Vec<Keyframe>,
}

impl KeyframeTrack {
    pub fn new(property: AnimatedProperty) -> Self {
        Self {
            property,
            keyframes: Vec::new(),
        }
    }

    /// Build from unsorted samples; later duplicates win.
    pub fn from_keyframes(property: AnimatedProperty, keyframes: impl IntoIterator<Item = Keyframe>) -> Self {
        let mut track = Self::new(property);
        for kf in keyframes {
            track.set(kf.time, kf.value, kf.easing);
        }
        track
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Insert a keyframe, overwriting value and easing if `time` already exists.
    pub fn set(&mut self, time: Time, value: f64, easing: Easing) {
        let kf = Keyframe { time, value, easing };
        match self.keyframes.binary_search_by_key(&time, |k| k.time) {
            Ok(idx) => self.keyframes[idx] = kf,
            Err(idx) => self.keyframes.insert(idx, kf),
        }
    }

    pub fn remove(&mut self, time: Time) -> Option<Keyframe> {
        let idx = self.keyframes.binary_search_by_key(&time, |k| k.time).ok()?;
        Some(self.keyframes.remove(idx))
    }

    pub fn value_at(&self, t: Time) -> f64 {
        interpolate(self, t)
    }

    /// Shift every keyframe time by `delta`.
    pub(crate) fn shift(&mut self, delta: Time) {
        for kf in &mut self.keyframes {
            kf.time += delta;
        }
    }

    /// Split at clip-local time `at` into the tracks for the head and the
    /// tail. The tail is rebased so `at` becomes its zero. Boundary
    /// keyframes carry the interpolated value so both halves keep the
    /// animation they showed before the split.
    pub fn split_at(&self, at: Time) -> (KeyframeTrack, KeyframeTrack) {
        let mut head = KeyframeTrack::new(self.property.clone());
        let mut tail = KeyframeTrack::new(self.property.clone());
        if self.keyframes.is_empty() {
            return (head, tail);
        }

        let boundary_value = self.value_at(at);
        let boundary_easing = self
            .keyframes
            .iter()
            .rev()
            .find(|k| k.time <= at)
            .map(|k| k.easing)
            .unwrap_or_default();

        let has_before = self.keyframes.iter().any(|k| k.time < at);
        let has_at_or_after = self.keyframes.iter().any(|k| k.time >= at);
        let has_exact = self.keyframes.iter().any(|k| k.time == at);

        head.keyframes = self.keyframes.iter().copied().filter(|k| k.time < at).collect();
        if has_at_or_after {
            head.keyframes.push(Keyframe {
                time: at,
                value: boundary_value,
                easing: boundary_easing,
            });
        }

        if has_before && !has_exact {
            tail.keyframes.push(Keyframe {
                time: 0,
                value: boundary_value,
                easing: boundary_easing,
            });
        }
        tail.keyframes.extend(
            self.keyframes
                .iter()
                .filter(|k| k.time >= at)
                .map(|k| Keyframe { time: k.time - at, ..*k }),
        );

        (head, tail)
    }
}

/// Interpolate a keyframe track at clip-local time `t`.
///
/// Empty tracks yield the property default; times outside the keyed range
/// clamp to the nearest boundary keyframe.
pub fn interpolate(track: &KeyframeTrack, t: Time) -> f64 {
    let kfs = &track.keyframes;
    let (first, last) = match (kfs.first(), kfs.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return track.property.default_value(),
    };
    if t <= first.time {
        return first.value;
    }
    if t >= last.time {
        return last.value;
    }

    // Index of the first keyframe strictly after t; the bracket is [idx-1, idx].
    let idx = kfs.partition_point(|k| k.time <= t);
    let a = &kfs[idx - 1];
    let b = &kfs[idx];
    let span = (b.time - a.time) as f64;
    let frac = (t - a.time) as f64 / span;
    ease(a.easing, frac, a.value, b.value)
}

/// Blend from `a` to `b` at normalized position `frac` in `[0, 1]`.
pub fn ease(easing: Easing, frac: f64, a: f64, b: f64) -> f64 {
    let f = frac.clamp(0.0, 1.0);
    let shaped = match easing {
        Easing::Linear => f,
        Easing::Hold => 0.0,
        Easing::EaseIn => f * f * f,
        Easing::EaseOut => 1.0 - (1.0 - f).powi(3),
        Easing::EaseInOut => {
            if f < 0.5 {
                4.0 * f * f * f
            } else {
                1.0 - (-2.0 * f + 2.0).powi(3) / 2.0
            }
        }
    };
    a + (b - a) * shaped
}

/// Evaluated transform of a clip at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSample {
    pub position_x: f64,
    pub position_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation: f64,
    pub opacity: f64,
    pub volume: f64,
    pub custom: BTreeMap<String, f64>,
}

impl Default for TransformSample {
    fn default() -> Self {
        Self {
            position_x: 0.0,
            position_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            volume: 1.0,
            custom: BTreeMap::new(),
        }
    }
}

/// Evaluate every track at `local`, starting from `base`.
pub fn sample_tracks(tracks: &[KeyframeTrack], local: Time, base: TransformSample) -> TransformSample {
    let mut sample = base;
    for track in tracks.iter().filter(|t| !t.is_empty()) {
        let value = track.value_at(local);
        match &track.property {
            AnimatedProperty::PositionX => sample.position_x = value,
            AnimatedProperty::PositionY => sample.position_y = value,
            AnimatedProperty::ScaleX => sample.scale_x = value,
            AnimatedProperty::ScaleY => sample.scale_y = value,
            AnimatedProperty::Rotation => sample.rotation = value,
            AnimatedProperty::Opacity => sample.opacity = value,
            AnimatedProperty::Volume => sample.volume = value,
            AnimatedProperty::Custom(name) => {
                sample.custom.insert(name.clone(), value);
            }
        }
    }
    sample
}

impl super::types::TimelineClip {
    /// Transform at clip-local time: static opacity/volume, overridden by
    /// any animated property.
    pub fn transform_at(&self, local: Time) -> TransformSample {
        let base = TransformSample {
            opacity: self.opacity,
            volume: self.volume,
            ..TransformSample::default()
        };
        sample_tracks(&self.keyframe_tracks, local, base)
    }

    pub(crate) fn shift_keyframes(&mut self, delta: Time) {
        if delta == 0 {
            return;
        }
        for track in &mut self.keyframe_tracks {
            track.shift(delta);
        }
    }

    /// Cut keyframes back to `[0, duration]` after an edge moved, pinning
    /// the value shown at each new edge.
    pub(crate) fn fit_keyframes_to_duration(&mut self) {
        let duration = self.duration;
        for track in &mut self.keyframe_tracks {
            if track.keyframes.first().is_some_and(|k| k.time < 0) {
                *track = track.split_at(0).1;
            }
            if track.keyframes.last().is_some_and(|k| k.time > duration) {
                *track = track.split_at(duration).0;
            }
        }
        self.keyframe_tracks.retain(|t| !t.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_linear_track(samples: &[(Time, f64)]) -> KeyframeTrack {
        KeyframeTrack::from_keyframes(
            AnimatedProperty::Opacity,
            samples.iter().map(|&(time, value)| Keyframe {
                time,
                value,
                easing: Easing::Linear,
            }),
        )
    }

    #[test]
    fn test_empty_track_returns_default() {
        assert_eq!(interpolate(&KeyframeTrack::new(AnimatedProperty::ScaleX), 10), 1.0);
        assert_eq!(interpolate(&KeyframeTrack::new(AnimatedProperty::Rotation), 10), 0.0);
    }

    #[test]
    fn test_clamps_outside_range() {
        let track = make_linear_track(&[(1_000, 5.0), (2_000, 10.0)]);
        assert_eq!(interpolate(&track, 0), 5.0);
        assert_eq!(interpolate(&track, -500), 5.0);
        assert_eq!(interpolate(&track, 2_000), 10.0);
        assert_eq!(interpolate(&track, 99_000), 10.0);
    }

    #[test]
    fn test_linear_midpoints() {
        let track = make_linear_track(&[(0, 0.0), (1_000, 10.0), (2_000, 5.0)]);
        assert!((interpolate(&track, 500) - 5.0).abs() < 1e-9);
        assert!((interpolate(&track, 1_500) - 7.5).abs() < 1e-9);
        assert_eq!(interpolate(&track, 1_000), 10.0);
    }

    #[test]
    fn test_hold_keeps_left_value() {
        let mut track = KeyframeTrack::new(AnimatedProperty::Opacity);
        track.set(0, 1.0, Easing::Hold);
        track.set(1_000, 0.0, Easing::Linear);
        assert_eq!(interpolate(&track, 999), 1.0);
        assert_eq!(interpolate(&track, 1_000), 0.0);
    }

    #[test]
    fn test_ease_in_out_shape() {
        assert!((ease(Easing::EaseInOut, 0.5, 0.0, 1.0) - 0.5).abs() < 1e-9);
        assert!(ease(Easing::EaseInOut, 0.25, 0.0, 1.0) < 0.25);
        assert!(ease(Easing::EaseInOut, 0.75, 0.0, 1.0) > 0.75);
        assert!(ease(Easing::EaseIn, 0.5, 0.0, 1.0) < 0.5);
        assert!(ease(Easing::EaseOut, 0.5, 0.0, 1.0) > 0.5);
        assert_eq!(ease(Easing::EaseOut, 1.0, 2.0, 4.0), 4.0);
    }

    #[test]
    fn test_duplicate_time_overwrites() {
        let mut track = make_linear_track(&[(0, 0.0), (1_000, 1.0)]);
        track.set(1_000, 3.0, Easing::EaseOut);
        assert_eq!(track.len(), 2);
        assert_eq!(track.keyframes()[1].value, 3.0);
        assert_eq!(track.keyframes()[1].easing, Easing::EaseOut);
    }

    #[test]
    fn test_set_keeps_sorted() {
        let track = make_linear_track(&[(3_000, 3.0), (1_000, 1.0), (2_000, 2.0)]);
        let times: Vec<Time> = track.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn test_remove() {
        let mut track = make_linear_track(&[(0, 0.0), (1_000, 1.0)]);
        assert!(track.remove(1_000).is_some());
        assert!(track.remove(1_000).is_none());
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_split_rebases_halves() {
        let track = make_linear_track(&[(0, 0.0), (4_000, 4.0), (10_000, 10.0)]);
        let (head, tail) = track.split_at(5_000);

        let head_times: Vec<Time> = head.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(head_times, vec![0, 4_000, 5_000]);
        assert!((head.value_at(5_000) - 5.0).abs() < 1e-9);

        let tail_times: Vec<Time> = tail.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(tail_times, vec![0, 5_000]);
        assert!((tail.value_at(0) - 5.0).abs() < 1e-9);
        assert!((tail.value_at(2_500) - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_split_on_existing_keyframe() {
        let track = make_linear_track(&[(0, 0.0), (5_000, 5.0), (10_000, 0.0)]);
        let (head, tail) = track.split_at(5_000);
        assert_eq!(head.len(), 2);
        assert_eq!(tail.keyframes()[0], Keyframe { time: 0, value: 5.0, easing: Easing::Linear });
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn test_split_all_before() {
        let track = make_linear_track(&[(0, 0.0), (1_000, 1.0)]);
        let (head, tail) = track.split_at(5_000);
        assert_eq!(head.len(), 2);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail.value_at(123), 1.0);
    }

    #[test]
    fn test_sample_tracks_overrides_base() {
        let mut x = KeyframeTrack::new(AnimatedProperty::PositionX);
        x.set(0, 0.0, Easing::Linear);
        x.set(1_000, 100.0, Easing::Linear);
        let custom = KeyframeTrack::from_keyframes(
            AnimatedProperty::Custom("blur.radius".into()),
            [Keyframe { time: 0, value: 2.0, easing: Easing::Linear }],
        );
        let sample = sample_tracks(&[x, custom], 500, TransformSample::default());
        assert!((sample.position_x - 50.0).abs() < 1e-9);
        assert_eq!(sample.scale_x, 1.0);
        assert_eq!(sample.custom.get("blur.radius"), Some(&2.0));
    }

    #[test]
    fn test_parse_property() {
        assert_eq!(AnimatedProperty::parse("Opacity"), AnimatedProperty::Opacity);
        assert_eq!(
            AnimatedProperty::parse("glow"),
            AnimatedProperty::Custom("glow".into())
        );
    }
}
