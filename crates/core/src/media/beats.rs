//! Energy-flux beat detection on WAV audio.

use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};

use super::{BeatAnalysis, BeatDetector, CancelToken};
use crate::error::MediaError;
use crate::time::{self, Time};
use crate::timeline::types::{BeatMarker, MediaAsset};

/// Frames of flux on each side used for the adaptive threshold.
const LOCAL_MEAN_RADIUS: usize = 8;
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Picks onsets where the frame-to-frame rise in RMS energy peaks above a
/// local average.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyBeatDetector {
    pub window_ms: u32,
    pub hop_ms: u32,
    /// Multiple of the local mean flux a peak must exceed.
    pub sensitivity: f64,
    /// Minimum spacing between reported beats.
    pub min_interval_ms: u32,
}

impl Default for EnergyBeatDetector {
    fn default() -> Self {
        Self {
            window_ms: 20,
            hop_ms: 10,
            sensitivity: 1.5,
            min_interval_ms: 250,
        }
    }
}

/// Read a WAV file as mono f64 in [-1, 1], averaging channels.
fn read_wav_mono(path: &Path) -> Result<(Vec<f64>, u32)> {
    let reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read WAV samples")?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read WAV samples")?,
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f64>() / frame.len() as f64)
        .collect();
    Ok((mono, spec.sample_rate))
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl EnergyBeatDetector {
    /// Detect beats in raw mono samples.
    pub fn analyze(&self, samples: &[f64], sample_rate: u32, cancel: &CancelToken) -> Result<BeatAnalysis> {
        let window = (sample_rate as usize * self.window_ms as usize / 1000).max(1);
        let hop = (sample_rate as usize * self.hop_ms as usize / 1000).max(1);
        if samples.len() < window {
            return Ok(BeatAnalysis::default());
        }

        let mut rms = Vec::with_capacity(samples.len() / hop + 1);
        let mut start = 0;
        while start + window <= samples.len() {
            if rms.len() % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }
            let energy: f64 = samples[start..start + window].iter().map(|s| s * s).sum();
            rms.push((energy / window as f64).sqrt());
            start += hop;
        }

        let flux: Vec<f64> = std::iter::once(rms[0])
            .chain(rms.windows(2).map(|w| (w[1] - w[0]).max(0.0)))
            .collect();
        let max_flux = flux.iter().copied().fold(0.0, f64::max);
        if max_flux <= 0.0 {
            return Ok(BeatAnalysis::default());
        }

        let frame_time = |i: usize| -> Time {
            time::from_seconds((i * hop + window / 2) as f64 / sample_rate as f64)
        };
        let min_gap = time::from_millis(self.min_interval_ms as i64);
        let mut beats: Vec<BeatMarker> = Vec::new();
        for i in 0..flux.len() {
            let lo = i.saturating_sub(LOCAL_MEAN_RADIUS);
            let hi = (i + LOCAL_MEAN_RADIUS + 1).min(flux.len());
            let local_mean = flux[lo..hi].iter().sum::<f64>() / (hi - lo) as f64;
            let prev = if i > 0 { flux[i - 1] } else { 0.0 };
            let next = flux.get(i + 1).copied().unwrap_or(0.0);
            let is_peak = flux[i] >= prev && flux[i] > next;
            if !is_peak || flux[i] <= local_mean * self.sensitivity {
                continue;
            }
            let t = frame_time(i);
            if beats.last().is_some_and(|b| t - b.timestamp < min_gap) {
                continue;
            }
            beats.push(BeatMarker {
                timestamp: t,
                strength: (flux[i] / max_flux) as f32,
            });
        }

        let mut intervals: Vec<f64> = beats
            .windows(2)
            .map(|w| time::to_seconds(w[1].timestamp - w[0].timestamp))
            .collect();
        let tempo_bpm = median(&mut intervals).filter(|m| *m > 0.0).map(|m| 60.0 / m);
        Ok(BeatAnalysis { beats, tempo_bpm })
    }
}

impl BeatDetector for EnergyBeatDetector {
    fn detect(&self, asset: &MediaAsset, cancel: &CancelToken) -> Result<BeatAnalysis, MediaError> {
        let run = || -> Result<BeatAnalysis> {
            let (samples, sample_rate) = read_wav_mono(&asset.source_path)?;
            self.analyze(&samples, sample_rate, cancel)
        };
        let analysis = run().map_err(|e| match e.downcast::<MediaError>() {
            Ok(media) => media,
            Err(e) => MediaError::DetectionFailed(format!("{:#}", e)),
        })?;
        log::info!(
            "detected {} beats in {} (tempo {})",
            analysis.beats.len(),
            asset.display_name(),
            analysis
                .tempo_bpm
                .map(|t| format!("{:.1} bpm", t))
                .unwrap_or_else(|| "unknown".into())
        );
        Ok(analysis)
    }
}
