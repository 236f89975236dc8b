#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod layout;
pub mod media;
pub mod provision;
pub mod registry;

pub use bootstrap::{BackendInstallation, install};
pub use dispatch::{AnimationJob, PortraitTuning, resolve_artifact, run, run_with_tuning};
pub use error::{VisageError, VisageResult};
pub use layout::Workspace;
pub use provision::{ArchiveKind, ModelAsset, Provisioner};
pub use registry::{Backend, InputKind};
