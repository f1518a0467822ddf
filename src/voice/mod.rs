//! Optional spoken symptom input.
//!
//! Microphone capture is host specific, so recognition is delegated to an
//! external command (for example a whisper.cpp wrapper) that prints the
//! transcript on stdout.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Where the symptom text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Typed(String),
    Recognized(String),
}

impl TextSource {
    pub fn text(&self) -> &str {
        match self {
            TextSource::Typed(text) | TextSource::Recognized(text) => text,
        }
    }
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("voice input is not available on this host")]
    Unavailable,

    #[error("failed to run recognizer: {0}")]
    Launch(#[from] std::io::Error),

    #[error("recognizer exited with {0}")]
    Failed(std::process::ExitStatus),

    #[error("speech not recognized")]
    NotRecognized,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn listen(&self) -> Result<String, VoiceError>;
}

/// Runs `command[0] command[1..]` and reads the transcript from stdout.
pub struct CommandRecognizer {
    command: Vec<String>,
}

impl CommandRecognizer {
    /// `None` when no command is configured.
    pub fn from_command(command: &[String]) -> Option<Self> {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return None;
        }
        Some(Self {
            command: command.to_vec(),
        })
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    async fn listen(&self) -> Result<String, VoiceError> {
        let (program, args) = self.command.split_first().ok_or(VoiceError::Unavailable)?;
        info!(program = %program, "listening for symptoms");

        let output = Command::new(program).args(args).output().await?;
        if !output.status.success() {
            return Err(VoiceError::Failed(output.status));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = transcript.len(), "recognizer finished");
        if transcript.is_empty() {
            return Err(VoiceError::NotRecognized);
        }
        Ok(transcript)
    }
}

/// Listen once and tag the result as recognized speech.
pub async fn capture(recognizer: &dyn SpeechRecognizer) -> Result<TextSource, VoiceError> {
    recognizer.listen().await.map(TextSource::Recognized)
}
