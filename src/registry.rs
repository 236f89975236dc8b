use std::path::Path;

use crate::provision::{ArchiveKind, ModelAsset};

/// The two interchangeable animation engines. SadTalker animates a still
/// portrait from audio; Wav2Lip re-syncs the lips of an existing video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    SadTalker,
    Wav2Lip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Video,
}

const SADTALKER_REPO: &str = "https://github.com/OpenTalker/SadTalker.git";
const WAV2LIP_REPO: &str = "https://github.com/Rudrabha/Wav2Lip.git";

const SADTALKER_RELEASE: &str =
    "https://github.com/OpenTalker/SadTalker/releases/download/v0.0.2";
const WAV2LIP_RELEASE: &str =
    "https://github.com/Rudrabha/Wav2Lip/releases/download/v1.0";

// Checkpoint file name -> release asset name, per the upstream v0.0.2 release.
const SADTALKER_WEIGHTS: &[(&str, &str)] = &[
    ("epoch_20.pth", "epoch_20.pth"),
    ("mapping.pth.tar", "mapping_00109-model.pth.tar"),
    ("mapping_emo.pth.tar", "mapping_00229-model.pth.tar"),
    ("sad.safetensors", "SadTalker_V0.0.2_256.safetensors"),
    ("wav2lip.pth", "wav2lip.pth"),
    ("gfpgan.pth", "GFPGANv1.4.pth"),
    ("auido2pose_00140-model.pth", "auido2pose_00140-model.pth"),
    ("auido2exp_00300-model.pth", "auido2exp_00300-model.pth"),
    ("facevid2vid_00189-model.pth.tar", "facevid2vid_00189-model.pth.tar"),
    (
        "shape_predictor_68_face_landmarks.dat",
        "shape_predictor_68_face_landmarks.dat",
    ),
];

const WAV2LIP_WEIGHTS: &[(&str, &str)] = &[
    ("wav2lip.pth", "wav2lip.pth"),
    ("wav2lip_gan.pth", "wav2lip_gan.pth"),
];

impl Backend {
    pub fn all() -> &'static [Self] {
        &[Self::SadTalker, Self::Wav2Lip]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SadTalker => "SadTalker",
            Self::Wav2Lip => "Wav2Lip",
        }
    }

    /// Directory name under the models root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::SadTalker => "sadtalker",
            Self::Wav2Lip => "wav2lip",
        }
    }

    pub fn repo_url(&self) -> &'static str {
        match self {
            Self::SadTalker => SADTALKER_REPO,
            Self::Wav2Lip => WAV2LIP_REPO,
        }
    }

    /// Revision checked out once at install time. Wav2Lip publishes no usable
    /// tags, so it tracks whatever the default branch was at clone time.
    pub fn pinned_rev(&self) -> Option<&'static str> {
        match self {
            Self::SadTalker => Some("v0.0.2"),
            Self::Wav2Lip => None,
        }
    }

    /// The visual input kind the backend's inference entry point expects.
    pub fn input_kind(&self) -> InputKind {
        match self {
            Self::SadTalker => InputKind::Image,
            Self::Wav2Lip => InputKind::Video,
        }
    }

    pub fn default_output_name(&self) -> &'static str {
        match self {
            Self::SadTalker => "sadtalker_output.mp4",
            Self::Wav2Lip => "wav2lip_output.mp4",
        }
    }

    /// Pre-trained weights this backend needs staged under `checkpoints_dir`.
    pub fn weight_assets(&self, checkpoints_dir: &Path) -> Vec<ModelAsset> {
        let (table, release) = match self {
            Self::SadTalker => (SADTALKER_WEIGHTS, SADTALKER_RELEASE),
            Self::Wav2Lip => (WAV2LIP_WEIGHTS, WAV2LIP_RELEASE),
        };

        let mut assets: Vec<ModelAsset> = table
            .iter()
            .map(|(file, release_name)| ModelAsset {
                name: (*file).to_string(),
                url: format!("{release}/{release_name}"),
                dest: checkpoints_dir.join(file),
                archive: ArchiveKind::None,
            })
            .collect();

        if let Self::SadTalker = self {
            // The face-parsing hub ships as a zip that must land extracted
            // next to the checkpoints; the extracted `hub` directory doubles
            // as the already-unpacked marker.
            assets.push(ModelAsset {
                name: "hub.zip".to_string(),
                url: format!("{SADTALKER_RELEASE}/hub.zip"),
                dest: checkpoints_dir.join("hub.zip"),
                archive: ArchiveKind::Zip {
                    unpack_marker: checkpoints_dir.join("hub"),
                },
            });
        }

        assets
    }
}
