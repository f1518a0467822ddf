use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::localize::AudioClip;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no audio player configured")]
    NoPlayer,

    #[error("audio i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio player exited with {0}")]
    PlayerFailed(std::process::ExitStatus),
}

/// Write `bytes` to a fresh temporary file, hand its path to `use_file`, and
/// remove the file afterwards whatever `use_file` returns.
pub async fn with_temp_artifact<T, F, Fut>(bytes: &[u8], suffix: &str, use_file: F) -> Result<T, PlaybackError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T, PlaybackError>>,
{
    let mut file = tempfile::Builder::new()
        .prefix("carecompass-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let path = file.path().to_path_buf();
    debug!(path = %path.display(), bytes = bytes.len(), "temporary artifact created");
    let result = use_file(path).await;
    // NamedTempFile deletes on drop; closing explicitly surfaces the error.
    file.close()?;
    result
}

/// Play the clip through `player` (the file path is appended as the last
/// argument).
pub async fn play(clip: &AudioClip, player: &[String]) -> Result<(), PlaybackError> {
    let (program, args) = player.split_first().ok_or(PlaybackError::NoPlayer)?;
    with_temp_artifact(&clip.bytes, ".mp3", |path| async move {
        info!(program = %program, "playing synthesized speech");
        let status = Command::new(program).args(args).arg(&path).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::PlayerFailed(status))
        }
    })
    .await
}

/// Keep the clip instead of playing it.
pub async fn save(clip: &AudioClip, path: &Path) -> Result<(), PlaybackError> {
    tokio::fs::write(path, &clip.bytes).await?;
    info!(path = %path.display(), "speech saved");
    Ok(())
}
