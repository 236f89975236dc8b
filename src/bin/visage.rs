use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use visage::{AnimationJob, Backend, Provisioner, Workspace};

#[derive(Parser, Debug)]
#[command(name = "visage", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install one or both inference backends (clone, pin, resolve
    /// dependencies, download weights).
    Setup(SetupArgs),
    /// Animate a face: image + audio (sadtalker) or video + audio (wav2lip).
    Animate(AnimateArgs),
    /// Decode a video into numbered still frames.
    ExtractFrames(ExtractFramesArgs),
    /// Resample audio to the 16 kHz mono layout the backends expect.
    NormalizeAudio(NormalizeAudioArgs),
    /// Merge a video stream and an audio stream into one file.
    Mux(MuxArgs),
}

#[derive(Parser, Debug)]
struct SetupArgs {
    /// Backend to install; installs both when omitted.
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Workspace root holding the models/ and outputs/ directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[derive(Parser, Debug)]
struct AnimateArgs {
    /// Backend to run.
    #[arg(long, value_enum)]
    backend: BackendChoice,

    /// Source portrait image (sadtalker).
    #[arg(long)]
    image: Option<PathBuf>,

    /// Source talking-head video (wav2lip).
    #[arg(long)]
    video: Option<PathBuf>,

    /// Driving audio track.
    #[arg(long)]
    audio: PathBuf,

    /// Output video path; defaults to the outputs root.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Workspace root holding the models/ and outputs/ directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[derive(Parser, Debug)]
struct ExtractFramesArgs {
    /// Input video.
    video: PathBuf,

    /// Directory the numbered frames are written into.
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct NormalizeAudioArgs {
    /// Input audio (any container/layout ffmpeg can read).
    input: PathBuf,

    /// Output waveform path.
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct MuxArgs {
    /// Input video; its video stream is copied without re-encoding.
    video: PathBuf,

    /// Input audio; encoded as AAC.
    audio: PathBuf,

    /// Output container path.
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Sadtalker,
    Wav2lip,
}

impl From<BackendChoice> for Backend {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Sadtalker => Backend::SadTalker,
            BackendChoice::Wav2lip => Backend::Wav2Lip,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Setup(args) => cmd_setup(args),
        Command::Animate(args) => cmd_animate(args),
        Command::ExtractFrames(args) => cmd_extract_frames(args),
        Command::NormalizeAudio(args) => cmd_normalize_audio(args),
        Command::Mux(args) => cmd_mux(args),
    }
}

fn cmd_setup(args: SetupArgs) -> anyhow::Result<()> {
    let workspace = Workspace::at(args.root);
    let provisioner = Provisioner::new()?;

    let backends: Vec<Backend> = match args.backend {
        Some(choice) => vec![choice.into()],
        None => Backend::all().to_vec(),
    };
    for backend in backends {
        let installation = visage::install(&workspace, &provisioner, backend)?;
        eprintln!(
            "{} installed at {}",
            backend.display_name(),
            installation.dir.display()
        );
    }
    Ok(())
}

fn cmd_animate(args: AnimateArgs) -> anyhow::Result<()> {
    let backend: Backend = args.backend.into();
    let visual = match (backend, args.image, args.video) {
        (Backend::SadTalker, Some(image), None) => image,
        (Backend::Wav2Lip, None, Some(video)) => video,
        (Backend::SadTalker, None, _) => anyhow::bail!("--image is required for sadtalker"),
        (Backend::Wav2Lip, _, None) => anyhow::bail!("--video is required for wav2lip"),
        _ => anyhow::bail!("pass exactly one of --image or --video"),
    };

    let workspace = Workspace::at(args.root);
    let job = AnimationJob {
        backend,
        visual,
        audio: args.audio,
        output: args.out,
    };
    let artifact = visage::run(&workspace, &job)?;
    eprintln!("wrote {}", artifact.display());
    Ok(())
}

fn cmd_extract_frames(args: ExtractFramesArgs) -> anyhow::Result<()> {
    let count = visage::frames::extract(&args.video, &args.out_dir)?;
    eprintln!("extracted {count} frames to {}", args.out_dir.display());
    Ok(())
}

fn cmd_normalize_audio(args: NormalizeAudioArgs) -> anyhow::Result<()> {
    visage::media::normalize_audio(&args.input, &args.output)?;
    eprintln!("wrote {}", args.output.display());
    Ok(())
}

fn cmd_mux(args: MuxArgs) -> anyhow::Result<()> {
    visage::media::mux(&args.video, &args.audio, &args.output)?;
    eprintln!("wrote {}", args.output.display());
    Ok(())
}
