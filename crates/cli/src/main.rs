//! Splicer CLI: edit a timeline project file from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use splicer_core::media::{
    CancelToken, EnergyBeatDetector, ExportProfile, ManifestExporter, SymphoniaProbe,
};
use splicer_core::time::{self, Time};
use splicer_core::timeline::ops::{OverlapPolicy, RippleScope};
use splicer_core::timeline::{
    load_project, save_project, AssetKind, ClipId, EditSession, MarkerKind, Project, TrackId, TrackKind,
};
use splicer_core::EditorSettings;

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "splicer", about = "Non-linear timeline editor", version)]
struct Cli {
    /// Project file to edit
    #[arg(short, long, global = true, default_value = "project.splice.json")]
    project: PathBuf,

    /// Settings file (default: $SPLICER_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new project file
    New {
        name: String,
        /// Start without the default V1/A1 tracks
        #[arg(long, default_value_t = false)]
        empty: bool,
    },
    /// Print tracks, clips and markers
    Info {
        /// Print a JSON summary instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Probe media files and add them to the project
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Also append each file to this track
        #[arg(long)]
        append_to: Option<String>,
    },
    /// Add an empty track
    AddTrack {
        #[arg(value_parser = ["video", "audio", "overlay"])]
        kind: String,
        name: String,
    },
    /// Split the clip under a time
    Split {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(value_parser = parse_time_arg)]
        at: Time,
    },
    /// Remove a time range and close the gap
    RippleDelete {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(value_parser = parse_time_arg)]
        start: Time,
        #[arg(value_parser = parse_time_arg)]
        length: Time,
        /// Ripple every unlocked track
        #[arg(long, default_value_t = false)]
        all_tracks: bool,
    },
    /// Shift the source window of the clip under a time
    #[command(allow_negative_numbers = true)]
    Slip {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(value_parser = parse_time_arg)]
        at: Time,
        #[arg(value_parser = parse_time_arg, allow_hyphen_values = true)]
        delta: Time,
    },
    /// Move the cut at a time between two abutting clips
    #[command(allow_negative_numbers = true)]
    Roll {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(value_parser = parse_time_arg)]
        cut: Time,
        #[arg(value_parser = parse_time_arg, allow_hyphen_values = true)]
        delta: Time,
    },
    /// Move the clip under a time, trimming its neighbor
    #[command(allow_negative_numbers = true)]
    Slide {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(value_parser = parse_time_arg)]
        at: Time,
        #[arg(value_parser = parse_time_arg, allow_hyphen_values = true)]
        delta: Time,
    },
    /// Detect beats in an imported WAV file and store them
    Beats {
        file: PathBuf,
        /// Timeline position of the audio's start
        #[arg(long, value_parser = parse_time_arg, default_value = "0")]
        offset: Time,
        /// Onset threshold multiplier
        #[arg(long)]
        sensitivity: Option<f64>,
    },
    /// Place imported files on successive beats
    BeatSync {
        #[arg(long, default_value = "V1")]
        track: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Keep clip lengths instead of cutting to the beat interval
        #[arg(long, default_value_t = false)]
        no_snap: bool,
        /// Skip a beat instead of truncating into an occupied clip
        #[arg(long, default_value_t = false)]
        skip_beat: bool,
        /// Ignore beats weaker than this
        #[arg(long)]
        min_strength: Option<f32>,
    },
    /// Add a marker
    Marker {
        #[arg(value_parser = parse_time_arg)]
        at: Time,
        name: String,
        #[arg(long, default_value = "standard", value_parser = ["standard", "chapter", "todo"])]
        kind: String,
    },
    /// Write a render manifest for an external encoder
    Export {
        output: PathBuf,
        #[arg(long, default_value_t = 1920)]
        width: u32,
        #[arg(long, default_value_t = 1080)]
        height: u32,
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long, value_parser = parse_time_arg)]
        start: Option<Time>,
        #[arg(long, value_parser = parse_time_arg)]
        end: Option<Time>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn parse_time_arg(s: &str) -> std::result::Result<Time, String> {
    time::parse_time(s).ok_or_else(|| format!("invalid time '{}' (use seconds or [HH:]MM:SS.mmm)", s))
}

fn open_session(project: &Path, config: Option<&Path>) -> Result<EditSession> {
    let settings = EditorSettings::resolve(config)?;
    let project = load_project(project)?;
    Ok(EditSession::new(project, settings))
}

fn find_track(project: &Project, name: &str) -> Result<TrackId> {
    match project.track_by_name(name) {
        Some(track) => Ok(track.id),
        None => bail!("No track named '{}'", name),
    }
}

fn clip_under(project: &Project, track: TrackId, at: Time) -> Result<ClipId> {
    let track = project.track(track)?;
    match track.clip_at(at) {
        Some(clip) => Ok(clip.id),
        None => bail!("No clip on {} at {}", track.name, time::format_time(at)),
    }
}

fn asset_for(session: &mut EditSession, path: &Path) -> Result<splicer_core::timeline::AssetId> {
    let id = session
        .import_asset(&SymphoniaProbe, path, &CancelToken::new())
        .with_context(|| format!("Failed to import {}", path.display()))?;
    Ok(id)
}

fn print_info(project: &Project) {
    println!("{} ({})", project.name, time::format_time(project.duration()));
    for asset in project.assets.iter() {
        println!(
            "  asset {} {} {}",
            asset.kind.as_str(),
            time::format_time(asset.probed_duration),
            asset.source_path.display()
        );
    }
    for track in project.tracks() {
        let flags = match (track.muted, track.locked) {
            (true, true) => " [muted, locked]",
            (true, false) => " [muted]",
            (false, true) => " [locked]",
            (false, false) => "",
        };
        println!("  {} ({}){}", track.name, track.kind.as_str(), flags);
        for clip in track.clips() {
            println!(
                "    {} - {}  {}  src {} - {}",
                time::format_time(clip.timeline_position),
                time::format_time(clip.end()),
                clip.label,
                time::format_time(clip.source_in),
                time::format_time(clip.source_out)
            );
        }
    }
    for marker in &project.markers {
        println!("  marker {} {}", time::format_time(marker.position), marker.name);
    }
    if !project.beat_markers().is_empty() {
        let tempo = project
            .tempo_bpm
            .map(|t| format!(" at {:.1} bpm", t))
            .unwrap_or_default();
        println!("  {} beats{}", project.beat_markers().len(), tempo);
    }
}

fn info_json(project: &Project) -> serde_json::Value {
    serde_json::json!({
        "name": project.name,
        "duration_seconds": time::to_seconds(project.duration()),
        "assets": project.assets.len(),
        "tracks": project.tracks().iter().map(|t| serde_json::json!({
            "name": t.name,
            "kind": t.kind.as_str(),
            "clips": t.len(),
            "end_seconds": time::to_seconds(t.end()),
        })).collect::<Vec<_>>(),
        "markers": project.markers.len(),
        "beats": project.beat_markers().len(),
        "tempo_bpm": project.tempo_bpm,
    })
}

// ─── Command runner ──────────────────────────────────────────────

fn run(cli: Cli) -> Result<()> {
    let path = cli.project.as_path();
    let config = cli.config.as_deref();

    match cli.command {
        Command::New { name, empty } => {
            if path.exists() {
                bail!("Project already exists: {}", path.display());
            }
            let project = if empty {
                Project::new(name)
            } else {
                Project::with_default_tracks(name)
            };
            save_project(&project, path)
        }
        Command::Info { json } => {
            let project = load_project(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info_json(&project))?);
            } else {
                print_info(&project);
            }
            Ok(())
        }
        command => {
            let mut session = open_session(path, config)?;
            apply(&mut session, command)?;
            session
                .project()
                .check_invariants()
                .context("Refusing to save an invalid project")?;
            save_project(&session.into_project(), path)
        }
    }
}

fn apply(session: &mut EditSession, command: Command) -> Result<()> {
    match command {
        Command::New { .. } | Command::Info { .. } => bail!("Command does not edit the project"),
        Command::Import { files, append_to } => {
            let target = append_to.map(|name| find_track(session.project(), &name)).transpose()?;
            for file in files {
                let asset = asset_for(session, &file)?;
                if let Some(track) = target {
                    let clip = session.new_clip(asset, None)?;
                    session.append(track, clip)?;
                }
            }
        }
        Command::AddTrack { kind, name } => {
            let kind = match kind.as_str() {
                "audio" => TrackKind::Audio,
                "overlay" => TrackKind::Overlay,
                _ => TrackKind::Video,
            };
            if session.project().track_by_name(&name).is_some() {
                bail!("Track '{}' already exists", name);
            }
            session.add_track(kind, name);
        }
        Command::Split { track, at } => {
            let track = find_track(session.project(), &track)?;
            let clip = clip_under(session.project(), track, at)?;
            let halves = session.split(clip, at)?;
            log::info!("Split into {} and {}", halves.left, halves.right);
        }
        Command::RippleDelete {
            track,
            start,
            length,
            all_tracks,
        } => {
            let track = find_track(session.project(), &track)?;
            let scope = if all_tracks {
                RippleScope::AllTracks
            } else {
                session.settings.ripple_scope
            };
            let result = session.ripple_delete_with_scope(track, start, length, scope)?;
            log::info!(
                "Removed {} clip(s), trimmed {}",
                result.removed.len(),
                result.trimmed.len()
            );
        }
        Command::Slip { track, at, delta } => {
            let track = find_track(session.project(), &track)?;
            let clip = clip_under(session.project(), track, at)?;
            let applied = session.slip(clip, delta)?;
            if applied != delta {
                log::warn!("Slip clamped to {}", time::format_time(applied));
            }
        }
        Command::Roll { track, cut, delta } => {
            let track = find_track(session.project(), &track)?;
            let right = clip_under(session.project(), track, cut)?;
            let left = match session.project().track(track)?.previous(right) {
                Some(left) if left.end() == cut => left.id,
                _ => bail!("No cut at {}", time::format_time(cut)),
            };
            session.roll(left, right, delta)?;
        }
        Command::Slide { track, at, delta } => {
            let track = find_track(session.project(), &track)?;
            let clip = clip_under(session.project(), track, at)?;
            session.slide(clip, delta)?;
        }
        Command::Beats {
            file,
            offset,
            sensitivity,
        } => {
            let asset = asset_for(session, &file)?;
            if session.project().assets.get(asset).map(|a| a.kind) != Some(AssetKind::Audio) {
                bail!("Beat detection needs an audio file: {}", file.display());
            }
            let mut detector = EnergyBeatDetector::default();
            if let Some(sensitivity) = sensitivity {
                detector.sensitivity = sensitivity;
            }
            let count = session.detect_beats(&detector, asset, offset, &CancelToken::new())?;
            log::info!("Stored {} beats", count);
        }
        Command::BeatSync {
            track,
            files,
            no_snap,
            skip_beat,
            min_strength,
        } => {
            let track = find_track(session.project(), &track)?;
            let mut opts = session.settings.beat_sync.clone();
            if no_snap {
                opts.snap_duration = false;
            }
            if skip_beat {
                opts.overlap_policy = OverlapPolicy::SkipBeat;
            }
            if let Some(min) = min_strength {
                opts.min_strength = min;
            }
            let mut clips = Vec::with_capacity(files.len());
            for file in &files {
                let asset = asset_for(session, file)?;
                clips.push(session.new_clip(asset, None)?);
            }
            let result = session.beat_sync(track, clips, Some(&opts))?;
            log::info!(
                "Placed {} clip(s), {} without a beat, {} beat(s) skipped",
                result.placed.len(),
                result.unplaced.len(),
                result.skipped_beats
            );
        }
        Command::Marker { at, name, kind } => {
            let kind = match kind.as_str() {
                "chapter" => MarkerKind::Chapter,
                "todo" => MarkerKind::Todo,
                _ => MarkerKind::Standard,
            };
            session.add_marker(at, &name, kind);
        }
        Command::Export {
            output,
            width,
            height,
            fps,
            start,
            end,
        } => {
            let mut profile = ExportProfile::new(output);
            profile.width = width;
            profile.height = height;
            profile.frame_rate = fps.unwrap_or(session.settings.frame_rate);
            if start.is_some() || end.is_some() {
                profile.range = Some((start.unwrap_or(0), end.unwrap_or(session.project().duration())));
            }
            session.export(&ManifestExporter, &profile)?;
        }
    }
    Ok(())
}
