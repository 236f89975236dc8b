use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
};

use tracing::info;

use crate::error::{VisageError, VisageResult};

/// Decode every frame of `video` in presentation order into `out_dir`, one
/// zero-padded PNG per frame (`frame_00000.png`, `frame_00001.png`, ...).
/// Returns the number of frames written. The decoder running out of frames,
/// including on corrupt trailing data, ends the sequence normally.
pub fn extract(video: &Path, out_dir: &Path) -> VisageResult<u64> {
    let (width, height) = probe_dimensions(video)?;

    use anyhow::Context as _;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory '{}'", out_dir.display()))?;

    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(video)
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VisageError::process(format!("failed to spawn ffmpeg for frame decode: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| VisageError::process("failed to open ffmpeg stdout (unexpected)"))?;

    let frame_len = width as usize * height as usize * 4;
    let mut buf = vec![0u8; frame_len];
    let mut count: u64 = 0;

    loop {
        match read_full_frame(&mut stdout, &mut buf) {
            Ok(true) => {}
            Ok(false) => break, // no more frames
            Err(e) => {
                return Err(VisageError::process(format!(
                    "reading decoded frames from '{}' failed: {e}",
                    video.display()
                )));
            }
        }

        let frame_path = out_dir.join(frame_file_name(count));
        image::save_buffer_with_format(
            &frame_path,
            &buf,
            width,
            height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write frame '{}'", frame_path.display()))?;
        count += 1;
    }
    drop(stdout);

    let out = child
        .wait_with_output()
        .map_err(|e| VisageError::process(format!("failed to wait for ffmpeg: {e}")))?;
    // A decoder that delivered frames and then gave up mid-stream truncated
    // the sequence; only a run that produced nothing at all is an error.
    if count == 0 && !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(VisageError::process(format!(
            "ffmpeg frame decode failed for '{}': {}",
            video.display(),
            stderr.trim()
        )));
    }

    info!(video = %video.display(), frames = count, "extracted frames");
    Ok(count)
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:05}.png")
}

/// Fill `buf` with exactly one frame. Returns Ok(false) on a clean or
/// mid-frame end of stream.
fn read_full_frame(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn probe_dimensions(video: &Path) -> VisageResult<(u32, u32)> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(video)
        .output()
        .map_err(|e| VisageError::process(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(VisageError::process(format!(
            "ffprobe failed for '{}': {}",
            video.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| VisageError::process(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            VisageError::process(format!("no video stream found in '{}'", video.display()))
        })?;
    let width = stream
        .width
        .ok_or_else(|| VisageError::process("missing video width from ffprobe"))?;
    let height = stream
        .height
        .ok_or_else(|| VisageError::process("missing video height from ffprobe"))?;
    Ok((width, height))
}
