use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use visage::{frames, media};

fn ffmpeg_tools_available() -> bool {
    let ffmpeg_ok = Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    let ffprobe_ok = Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    ffmpeg_ok && ffprobe_ok
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "visage_media_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// A silent H.264 video with exactly `frame_count` frames.
fn synth_silent_video(path: &Path, frame_count: u32) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=64x64:rate=30",
            "-frames:v",
            &frame_count.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating silent video");
    Ok(())
}

/// A stereo 44.1 kHz tone, deliberately not in the layout the backends want.
fn synth_stereo_tone(path: &Path) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=44100",
            "-t",
            "1",
            "-ac",
            "2",
            "-ar",
            "44100",
            "-c:a",
            "pcm_s16le",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating tone");
    Ok(())
}

fn probe_streams(path: &Path) -> serde_json::Value {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .unwrap();
    assert!(out.status.success());
    serde_json::from_slice(&out.stdout).unwrap()
}

/// Decode the full video stream to raw RGBA bytes for byte-level comparison.
fn decode_rgba(path: &Path) -> Vec<u8> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .output()
        .unwrap();
    assert!(out.status.success());
    out.stdout
}

#[test]
fn extraction_yields_exactly_n_sequentially_named_frames() {
    if !ffmpeg_tools_available() {
        return;
    }
    let root = scratch_dir("extract");
    let video = root.join("clip.mp4");
    synth_silent_video(&video, 3).unwrap();

    let frames_dir = root.join("frames");
    let count = frames::extract(&video, &frames_dir).unwrap();

    assert_eq!(count, 3);
    for i in 0..3u64 {
        assert!(frames_dir.join(format!("frame_{i:05}.png")).is_file());
    }
    assert!(!frames_dir.join("frame_00003.png").exists());
}

#[test]
fn normalization_forces_mono_16khz_whatever_the_input_layout() {
    if !ffmpeg_tools_available() {
        return;
    }
    let root = scratch_dir("normalize");
    let tone = root.join("tone.wav");
    synth_stereo_tone(&tone).unwrap();

    let normalized = root.join("normalized.wav");
    media::normalize_audio(&tone, &normalized).unwrap();

    let probed = probe_streams(&normalized);
    let streams = probed["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["codec_type"], "audio");
    assert_eq!(streams[0]["channels"], 1);
    assert_eq!(streams[0]["sample_rate"], "16000");
}

#[test]
fn mux_copies_the_video_stream_bit_for_bit() {
    if !ffmpeg_tools_available() {
        return;
    }
    let root = scratch_dir("mux");
    let silent = root.join("silent.mp4");
    let tone = root.join("tone.wav");
    synth_silent_video(&silent, 3).unwrap();
    synth_stereo_tone(&tone).unwrap();

    let muxed = root.join("muxed.mp4");
    media::mux(&silent, &tone, &muxed).unwrap();

    let probed = probe_streams(&muxed);
    let streams = probed["streams"].as_array().unwrap();
    assert!(streams.iter().any(|s| s["codec_type"] == "video"));
    assert!(
        streams
            .iter()
            .any(|s| s["codec_type"] == "audio" && s["codec_name"] == "aac")
    );

    // Copied, not re-encoded: decoding both files must give identical
    // pixels.
    assert_eq!(decode_rgba(&silent), decode_rgba(&muxed));
}

#[test]
fn resolved_artifact_from_a_real_run_directory_survives_delivery_intact() {
    if !ffmpeg_tools_available() {
        return;
    }
    let results_root = scratch_dir("resolve_real");

    for stamp in ["2024_08_05_10.00.00", "2024_08_06_10.00.00"] {
        let dir = results_root.join(stamp);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("older.mp4"), stamp).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(30));
    }
    let latest = results_root.join("2024_08_07_10.00.00");
    fs::create_dir_all(&latest).unwrap();
    synth_silent_video(&latest.join("generated.mp4"), 3).unwrap();

    let found = visage::resolve_artifact(&results_root).unwrap();
    assert_eq!(found, latest.join("generated.mp4"));

    let requested = results_root.join("talking.mp4");
    fs::rename(&found, &requested).unwrap();

    // The delivered artifact is the 3-frame video, playable as-is.
    let frames_dir = results_root.join("frames");
    assert_eq!(frames::extract(&requested, &frames_dir).unwrap(), 3);
    assert!(results_root.join("2024_08_05_10.00.00/older.mp4").exists());
    assert!(results_root.join("2024_08_06_10.00.00/older.mp4").exists());
}
