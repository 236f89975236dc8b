use std::{ffi::OsString, path::Path, process::Command};

use tracing::info;

use crate::{
    error::{VisageError, VisageResult},
    layout::ensure_parent_dir,
};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Force `input` to a 16 kHz mono waveform with no video stream, the layout
/// both inference backends expect. Overwrites `output` unconditionally.
pub fn normalize_audio(input: &Path, output: &Path) -> VisageResult<()> {
    ensure_parent_dir(output)?;
    info!(input = %input.display(), output = %output.display(), "normalizing audio");
    run_ffmpeg(&normalize_args(input, output), "audio normalization")
}

/// Combine a video stream and an audio stream into one container. The video
/// stream is copied bit-for-bit (no re-encode); the audio is encoded as AAC.
/// Fails if either input lacks the expected stream.
pub fn mux(video: &Path, audio: &Path, output: &Path) -> VisageResult<()> {
    ensure_parent_dir(output)?;
    info!(video = %video.display(), audio = %audio.display(), output = %output.display(), "muxing");
    run_ffmpeg(&mux_args(video, audio, output), "mux")
}

pub fn normalize_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
        "-ar".into(),
        "16000".into(),
        "-ac".into(),
        "1".into(),
        "-vn".into(),
        output.as_os_str().to_owned(),
    ]
}

pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-i".into(),
        audio.as_os_str().to_owned(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        output.as_os_str().to_owned(),
    ]
}

fn run_ffmpeg(args: &[OsString], what: &str) -> VisageResult<()> {
    if !is_ffmpeg_on_path() {
        return Err(VisageError::precondition(format!(
            "ffmpeg is required for {what}, but was not found on PATH"
        )));
    }

    let out = Command::new("ffmpeg")
        .args(args)
        .output()
        .map_err(|e| VisageError::process(format!("failed to spawn ffmpeg for {what}: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(VisageError::process(format!(
            "ffmpeg {what} exited with status {}: {}",
            out.status,
            stderr.trim()
        )));
    }
    Ok(())
}
