//! HLS artifact naming and mux directives
//!
//! Every relay invocation gets its own session id, and every file it writes
//! carries that id, so sessions never share playlists or segments.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::RelayConfig;
use crate::device::MuxOptions;

static LAST_SESSION_ID: AtomicI64 = AtomicI64::new(0);

/// Microsecond timestamp, strictly increasing within this process
pub fn new_session_id() -> String {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_SESSION_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_SESSION_ID.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

/// Output locations of one relay invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub session_id: String,
    pub output_dir: PathBuf,
    /// Playlist file on disk
    pub playlist_path: PathBuf,
    /// Segment filename pattern (`%03d` expanded by the muxer)
    pub segment_pattern: PathBuf,
    /// Playlist location as seen by the browser
    pub playlist_url: String,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, url_prefix: &str, session_id: &str) -> Self {
        let playlist_name = format!("stream_{}.m3u8", session_id);
        Self {
            session_id: session_id.to_string(),
            output_dir: output_dir.to_path_buf(),
            playlist_path: output_dir.join(&playlist_name),
            segment_pattern: output_dir.join(format!("stream_{}_%03d.ts", session_id)),
            playlist_url: format!("{}/{}", url_prefix.trim_end_matches('/'), playlist_name),
        }
    }

    /// Whether `file_name` is this session's playlist or one of its segments
    pub fn owns(&self, file_name: &str) -> bool {
        let stem = format!("stream_{}", self.session_id);
        file_name == format!("{}.m3u8", stem)
            || (file_name.starts_with(&format!("{}_", stem)) && file_name.ends_with(".ts"))
    }

    /// Remove this session's playlist and segments; returns files removed
    pub async fn remove_all(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str().map(|n| self.owns(n)).unwrap_or(false) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    // The muxer deletes expired segments on its own
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(removed)
    }
}

/// Low-latency HLS directives: copied video, transcoded audio, rolling window
pub fn hls_mux_options(config: &RelayConfig, paths: &ArtifactPaths) -> MuxOptions {
    let video = ["-vcodec", "copy", "-fflags", "nobuffer", "-flags", "low_delay"];

    let audio = vec![
        "-acodec".to_string(),
        config.audio_codec.clone(),
        "-b:a".to_string(),
        config.audio_bitrate.clone(),
        "-ar".to_string(),
        config.audio_sample_rate.to_string(),
    ];

    let output = vec![
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        config.segment_seconds.to_string(),
        "-hls_list_size".to_string(),
        config.list_size.to_string(),
        "-hls_flags".to_string(),
        "delete_segments+append_list+split_by_time".to_string(),
        "-hls_segment_filename".to_string(),
        paths.segment_pattern.to_string_lossy().into_owned(),
        paths.playlist_path.to_string_lossy().into_owned(),
    ];

    MuxOptions {
        video: video.iter().map(|s| s.to_string()).collect(),
        audio,
        output,
    }
}
