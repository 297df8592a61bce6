//! Media probing via symphonia.

use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AssetProbe, CancelToken};
use crate::error::MediaError;
use crate::time::{self, Time};
use crate::timeline::types::{AssetKind, MediaAsset};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi"];

/// Packets scanned between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Probes containers symphonia can demux. Images are recognized by
/// extension and get zero duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaProbe;

/// Asset kind implied by a file extension.
pub fn kind_for_path(path: &Path) -> AssetKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        AssetKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        AssetKind::Video
    } else {
        AssetKind::Audio
    }
}

fn symphonia_time(tb: symphonia::core::units::TimeBase, ts: u64) -> Time {
    let t = tb.calc_time(ts);
    time::from_seconds(t.seconds as f64 + t.frac)
}

fn probe_duration(path: &Path, cancel: &CancelToken) -> Result<Time> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| format.tracks().first())
        .context("No media track found")?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(n), Some(tb), _) => return Ok(symphonia_time(tb, n)),
        (Some(n), None, Some(sr)) if sr > 0 => {
            return Ok(time::from_seconds(n as f64 / sr as f64));
        }
        _ => {}
    }

    // No frame count in the header: walk the packets.
    let tb = params
        .time_base
        .or_else(|| params.sample_rate.map(|sr| symphonia::core::units::TimeBase::new(1, sr)))
        .context("Track has no time base")?;
    let mut end_ts = 0u64;
    let mut scanned = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read packet"),
        };
        scanned += 1;
        if scanned % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }
        if packet.track_id() == track_id {
            end_ts = end_ts.max(packet.ts() + packet.dur());
        }
    }
    Ok(symphonia_time(tb, end_ts))
}

fn into_media_error(path: &Path, err: anyhow::Error) -> MediaError {
    match err.downcast::<MediaError>() {
        Ok(media) => media,
        Err(err) => MediaError::UnreadableMedia {
            path: path.to_path_buf(),
            reason: format!("{:#}", err),
        },
    }
}

impl AssetProbe for SymphoniaProbe {
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<MediaAsset, MediaError> {
        cancel.check()?;
        if !path.is_file() {
            return Err(MediaError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        let kind = kind_for_path(path);
        if kind == AssetKind::Image {
            return Ok(MediaAsset::new(kind, path, 0));
        }
        let duration = probe_duration(path, cancel).map_err(|e| into_media_error(path, e))?;
        if duration <= 0 {
            return Err(MediaError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: "media has zero duration".into(),
            });
        }
        log::debug!("probed {}: {} {}", path.display(), kind.as_str(), time::format_time(duration));
        Ok(MediaAsset::new(kind, path, duration))
    }
}
