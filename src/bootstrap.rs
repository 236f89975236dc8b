use std::{
    path::{Path, PathBuf},
    process::Command,
};

use tracing::info;

use crate::{
    error::{VisageError, VisageResult},
    layout::Workspace,
    provision::Provisioner,
    registry::Backend,
};

/// A backend whose source tree is present on disk. Usable iff `dir` exists;
/// the pinned revision is checked out once at install time and never
/// re-verified afterwards.
#[derive(Clone, Debug)]
pub struct BackendInstallation {
    pub backend: Backend,
    pub dir: PathBuf,
    /// Interpreter used to run the backend: its own venv Python when the
    /// install step created one, the system interpreter otherwise.
    pub python: PathBuf,
}

impl BackendInstallation {
    /// Look up an existing installation without touching the network.
    pub fn locate(workspace: &Workspace, backend: Backend) -> VisageResult<Self> {
        let dir = workspace.backend_dir(backend.dir_name());
        if !dir.is_dir() {
            return Err(VisageError::precondition(format!(
                "{} is not installed at '{}'; run `visage setup` first",
                backend.display_name(),
                dir.display()
            )));
        }
        let venv = venv_python(&dir);
        let python = if venv.is_file() { venv } else { system_python() };
        Ok(Self {
            backend,
            dir,
            python,
        })
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.dir.join("checkpoints")
    }
}

/// Clone, pin, resolve dependencies, and stage weights for one backend.
///
/// An already-present source tree is never updated (staleness is accepted);
/// the dependency install is intentionally repeated on every run.
pub fn install(
    workspace: &Workspace,
    provisioner: &Provisioner,
    backend: Backend,
) -> VisageResult<BackendInstallation> {
    let dir = workspace.backend_dir(backend.dir_name());

    if !dir.is_dir() {
        use anyhow::Context as _;
        std::fs::create_dir_all(workspace.models_root())
            .with_context(|| "failed to create models root")?;

        info!(backend = backend.display_name(), url = backend.repo_url(), "cloning");
        run_step(
            Command::new("git")
                .arg("clone")
                .arg(backend.repo_url())
                .arg(&dir),
            "git clone",
        )?;

        if let Some(rev) = backend.pinned_rev() {
            info!(backend = backend.display_name(), rev, "pinning revision");
            run_step(
                Command::new("git").arg("-C").arg(&dir).args(["fetch", "--tags"]),
                "git fetch --tags",
            )?;
            run_step(
                Command::new("git").arg("-C").arg(&dir).args(["checkout", rev]),
                "git checkout",
            )?;
        }
    }

    // Dependencies resolve into a venv scoped to this installation, not the
    // process-wide interpreter.
    let venv_dir = dir.join(".venv");
    if !venv_dir.is_dir() {
        info!(backend = backend.display_name(), "creating virtualenv");
        run_step(
            Command::new(system_python())
                .args(["-m", "venv"])
                .arg(&venv_dir),
            "python -m venv",
        )?;
    }

    let python = venv_python(&dir);
    info!(backend = backend.display_name(), "installing dependencies");
    run_step(
        Command::new(&python)
            .args(["-m", "pip", "install", "-r", "requirements.txt"])
            .current_dir(&dir),
        "pip install",
    )?;

    let checkpoints = dir.join("checkpoints");
    for asset in backend.weight_assets(&checkpoints) {
        provisioner.ensure(&asset)?;
    }

    Ok(BackendInstallation {
        backend,
        dir,
        python,
    })
}

fn venv_python(backend_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        backend_dir.join(".venv").join("Scripts").join("python.exe")
    } else {
        backend_dir.join(".venv").join("bin").join("python")
    }
}

fn system_python() -> PathBuf {
    PathBuf::from(if cfg!(windows) { "python" } else { "python3" })
}

/// Run a setup step with inherited stdio, surfacing a non-zero exit verbatim.
fn run_step(cmd: &mut Command, what: &str) -> VisageResult<()> {
    let status = cmd
        .status()
        .map_err(|e| VisageError::process(format!("failed to spawn {what}: {e}")))?;
    if !status.success() {
        return Err(VisageError::process(format!(
            "{what} exited with status {status}"
        )));
    }
    Ok(())
}
