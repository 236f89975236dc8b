use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::SystemTime,
};

use tracing::info;

use crate::{
    bootstrap::BackendInstallation,
    error::{VisageError, VisageResult},
    layout::{Workspace, ensure_parent_dir},
    registry::{Backend, InputKind},
};

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// One animation request: a visual input matching the backend's expected
/// kind, a driving audio track, and an optional output destination.
#[derive(Clone, Debug)]
pub struct AnimationJob {
    pub backend: Backend,
    pub visual: PathBuf,
    pub audio: PathBuf,
    pub output: Option<PathBuf>,
}

/// Tuning applied to every image-driven run. The defaults reproduce the
/// flag set the pipeline has always passed; callers may override any field.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PortraitTuning {
    pub enhancer: String,
    pub preprocess: String,
    pub still: bool,
    pub expression_scale: f64,
    pub background_enhancer: String,
}

impl Default for PortraitTuning {
    fn default() -> Self {
        Self {
            enhancer: "gfpgan".to_string(),
            preprocess: "full".to_string(),
            still: true,
            expression_scale: 0.8,
            background_enhancer: "realesrgan".to_string(),
        }
    }
}

impl PortraitTuning {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--enhancer".to_string(),
            self.enhancer.clone(),
            "--preprocess".to_string(),
            self.preprocess.clone(),
        ];
        if self.still {
            args.push("--still".to_string());
        }
        args.push("--expression_scale".to_string());
        args.push(self.expression_scale.to_string());
        args.push("--background_enhancer".to_string());
        args.push(self.background_enhancer.clone());
        args
    }
}

pub fn run(workspace: &Workspace, job: &AnimationJob) -> VisageResult<PathBuf> {
    run_with_tuning(workspace, job, &PortraitTuning::default())
}

/// Run one job to completion and return the final artifact path.
///
/// All preconditions are checked before any child process is spawned; a
/// missing installation is never installed on the fly.
pub fn run_with_tuning(
    workspace: &Workspace,
    job: &AnimationJob,
    tuning: &PortraitTuning,
) -> VisageResult<PathBuf> {
    let installation = BackendInstallation::locate(workspace, job.backend)?;
    check_visual_kind(job)?;
    check_input_exists(&job.visual, "visual input")?;
    check_input_exists(&job.audio, "audio input")?;

    use anyhow::Context as _;
    let output = job
        .output
        .clone()
        .unwrap_or_else(|| workspace.outputs_root().join(job.backend.default_output_name()));
    let output = std::path::absolute(&output)
        .with_context(|| format!("resolve output path '{}'", output.display()))?;
    ensure_parent_dir(&output)?;

    // The backend runs with cwd at its own tree, so every path it receives
    // must be absolute.
    let visual = std::path::absolute(&job.visual)
        .with_context(|| format!("resolve input path '{}'", job.visual.display()))?;
    let audio = std::path::absolute(&job.audio)
        .with_context(|| format!("resolve input path '{}'", job.audio.display()))?;

    match job.backend {
        Backend::SadTalker => {
            let results_root = output
                .parent()
                .ok_or_else(|| {
                    VisageError::precondition(format!(
                        "output path '{}' has no parent directory",
                        output.display()
                    ))
                })?
                .to_path_buf();

            let mut cmd = Command::new(&installation.python);
            cmd.arg("inference.py")
                .current_dir(&installation.dir)
                .arg("--driven_audio")
                .arg(&audio)
                .arg("--source_image")
                .arg(&visual)
                .arg("--result_dir")
                .arg(&results_root)
                .args(tuning.to_args())
                .args(["--checkpoint_dir", "checkpoints"]);
            run_backend(&mut cmd, job.backend)?;

            let produced = resolve_artifact(&results_root)?;
            info!(artifact = %produced.display(), "resolved backend output");
            fs::rename(&produced, &output).with_context(|| {
                format!(
                    "move artifact '{}' -> '{}'",
                    produced.display(),
                    output.display()
                )
            })?;
        }
        Backend::Wav2Lip => {
            // Wav2Lip takes the output path directly; no resolution step.
            let mut cmd = Command::new(&installation.python);
            cmd.arg("inference.py")
                .current_dir(&installation.dir)
                .arg("--face")
                .arg(&visual)
                .arg("--audio")
                .arg(&audio)
                .arg("--outfile")
                .arg(&output)
                .args(["--pads", "0 20 0 0"]);
            run_backend(&mut cmd, job.backend)?;
        }
    }

    Ok(output)
}

/// Locate the artifact of an image-driven run.
///
/// The backend does not accept an explicit output file; by convention the
/// newest-modified subdirectory under `results_root` belongs to the run
/// that just finished, and the first video file inside it (filesystem
/// enumeration order) is the result. Assumes no concurrent run writes into
/// the same results root; callers serialize jobs per backend installation.
pub fn resolve_artifact(results_root: &Path) -> VisageResult<PathBuf> {
    let entries = fs::read_dir(results_root).map_err(|e| {
        VisageError::resolution(format!(
            "cannot read results root '{}': {e}",
            results_root.display()
        ))
    })?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| {
            VisageError::resolution(format!(
                "cannot read results root '{}': {e}",
                results_root.display()
            ))
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| {
                VisageError::resolution(format!("cannot stat '{}': {e}", path.display()))
            })?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    let (_, dir) = newest.ok_or_else(|| {
        VisageError::resolution(format!(
            "no result directory under '{}' after backend run",
            results_root.display()
        ))
    })?;

    let entries = fs::read_dir(&dir).map_err(|e| {
        VisageError::resolution(format!("cannot read '{}': {e}", dir.display()))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            VisageError::resolution(format!("cannot read '{}': {e}", dir.display()))
        })?;
        let path = entry.path();
        if path.is_file() && is_video_file(&path) {
            return Ok(path);
        }
    }

    Err(VisageError::resolution(format!(
        "no video file in result directory '{}'",
        dir.display()
    )))
}

pub fn input_kind_of(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(InputKind::Image)
    } else if VIDEO_EXTS.contains(&ext.as_str()) {
        Some(InputKind::Video)
    } else {
        None
    }
}

fn is_video_file(path: &Path) -> bool {
    matches!(input_kind_of(path), Some(InputKind::Video))
}

fn kind_name(kind: InputKind) -> &'static str {
    match kind {
        InputKind::Image => "image",
        InputKind::Video => "video",
    }
}

fn check_visual_kind(job: &AnimationJob) -> VisageResult<()> {
    let expected = job.backend.input_kind();
    match input_kind_of(&job.visual) {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(VisageError::precondition(format!(
            "{} expects {} input, but '{}' is {}",
            job.backend.display_name(),
            kind_name(expected),
            job.visual.display(),
            kind_name(kind)
        ))),
        None => Err(VisageError::precondition(format!(
            "cannot tell whether '{}' is an image or a video",
            job.visual.display()
        ))),
    }
}

fn check_input_exists(path: &Path, what: &str) -> VisageResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(VisageError::precondition(format!(
            "{what} '{}' does not exist",
            path.display()
        )))
    }
}

fn run_backend(cmd: &mut Command, backend: Backend) -> VisageResult<()> {
    info!(backend = backend.display_name(), "running inference");
    let status = cmd.status().map_err(|e| {
        VisageError::process(format!(
            "failed to spawn {} inference: {e}",
            backend.display_name()
        ))
    })?;
    if !status.success() {
        return Err(VisageError::process(format!(
            "{} inference exited with status {status}",
            backend.display_name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "visage_dispatch_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn installed_workspace(tag: &str, backend: Backend) -> Workspace {
        let ws = Workspace::at(scratch_dir(tag));
        fs::create_dir_all(ws.backend_dir(backend.dir_name())).unwrap();
        ws
    }

    #[test]
    fn tuning_defaults_reproduce_the_fixed_flag_set() {
        let args = PortraitTuning::default().to_args();
        assert_eq!(
            args,
            vec![
                "--enhancer",
                "gfpgan",
                "--preprocess",
                "full",
                "--still",
                "--expression_scale",
                "0.8",
                "--background_enhancer",
                "realesrgan",
            ]
        );
    }

    #[test]
    fn tuning_still_flag_is_droppable() {
        let tuning = PortraitTuning {
            still: false,
            ..PortraitTuning::default()
        };
        assert!(!tuning.to_args().iter().any(|a| a == "--still"));
    }

    #[test]
    fn uninstalled_backend_is_rejected_before_anything_else() {
        let ws = Workspace::at(scratch_dir("uninstalled"));
        let job = AnimationJob {
            backend: Backend::SadTalker,
            visual: PathBuf::from("face.png"),
            audio: PathBuf::from("speech.wav"),
            output: None,
        };
        let err = run(&ws, &job).unwrap_err();
        assert!(err.to_string().contains("precondition error:"));
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn mismatched_visual_kind_is_rejected_before_spawn() {
        for (backend, wrong) in [
            (Backend::SadTalker, "clip.mp4"),
            (Backend::Wav2Lip, "face.png"),
        ] {
            let ws = installed_workspace("kind", backend);
            let job = AnimationJob {
                backend,
                visual: PathBuf::from(wrong),
                audio: PathBuf::from("speech.wav"),
                output: None,
            };
            let err = run(&ws, &job).unwrap_err();
            assert!(err.to_string().contains("precondition error:"), "{backend:?}");
            assert!(err.to_string().contains("expects"), "{backend:?}");
        }
    }

    #[test]
    fn unrecognized_visual_kind_is_rejected() {
        let ws = installed_workspace("unknown_kind", Backend::SadTalker);
        let job = AnimationJob {
            backend: Backend::SadTalker,
            visual: PathBuf::from("face.gltf"),
            audio: PathBuf::from("speech.wav"),
            output: None,
        };
        let err = run(&ws, &job).unwrap_err();
        assert!(err.to_string().contains("precondition error:"));
    }

    #[test]
    fn missing_inputs_are_rejected_before_spawn() {
        let ws = installed_workspace("missing_inputs", Backend::SadTalker);
        let job = AnimationJob {
            backend: Backend::SadTalker,
            visual: ws.root().join("face.png"),
            audio: ws.root().join("speech.wav"),
            output: None,
        };
        let err = run(&ws, &job).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn resolution_picks_the_newest_directory() {
        let root = scratch_dir("newest");
        for name in ["2024_01_01", "2024_06_01", "2024_12_01"] {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("result.mp4"), name).unwrap();
            // Creation order drives the modification timestamps the scan
            // compares; keep them strictly increasing.
            std::thread::sleep(std::time::Duration::from_millis(30));
        }

        let found = resolve_artifact(&root).unwrap();
        assert_eq!(found, root.join("2024_12_01").join("result.mp4"));
    }

    #[test]
    fn resolution_skips_non_video_entries_in_the_winning_directory() {
        let root = scratch_dir("skip_non_video");
        let dir = root.join("run");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("args.txt"), b"log").unwrap();
        fs::write(dir.join("first_frame.png"), b"png").unwrap();
        fs::write(dir.join("output.mp4"), b"video").unwrap();

        let found = resolve_artifact(&root).unwrap();
        assert_eq!(found, dir.join("output.mp4"));
    }

    #[test]
    fn resolution_ignores_loose_files_under_the_results_root() {
        let root = scratch_dir("loose_files");
        fs::write(root.join("stray.mp4"), b"not in a run dir").unwrap();
        let dir = root.join("run");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("output.mp4"), b"video").unwrap();

        let found = resolve_artifact(&root).unwrap();
        assert_eq!(found, dir.join("output.mp4"));
    }

    #[test]
    fn resolution_errors_without_a_result_directory() {
        let root = scratch_dir("empty_root");
        let err = resolve_artifact(&root).unwrap_err();
        assert!(err.to_string().contains("resolution error:"));
        assert!(err.to_string().contains("no result directory"));
    }

    #[test]
    fn resolution_errors_without_a_video_file() {
        let root = scratch_dir("no_video");
        fs::create_dir_all(root.join("run")).unwrap();
        let err = resolve_artifact(&root).unwrap_err();
        assert!(err.to_string().contains("no video file"));
    }

    #[test]
    fn input_kind_is_judged_by_extension_case_insensitively() {
        assert_eq!(input_kind_of(Path::new("a.PNG")), Some(InputKind::Image));
        assert_eq!(input_kind_of(Path::new("a.Mp4")), Some(InputKind::Video));
        assert_eq!(input_kind_of(Path::new("a.tar")), None);
        assert_eq!(input_kind_of(Path::new("noext")), None);
    }
}
