use std::path::{Path, PathBuf};

use crate::error::VisageResult;

/// On-disk layout shared by every pipeline stage: a models root holding one
/// directory per backend, and an outputs root for default destinations.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_root(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn outputs_root(&self) -> PathBuf {
        self.root.join("outputs")
    }

    pub fn backend_dir(&self, dir_name: &str) -> PathBuf {
        self.models_root().join(dir_name)
    }
}

pub fn ensure_parent_dir(path: &Path) -> VisageResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}
