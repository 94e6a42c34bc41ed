//! Local command-line synthesizers

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::SpeechProvider;
use crate::{Error, Result};

/// Timeout for a synthesizer process
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Festival voice used by `text2wave`
const FESTIVAL_VOICE: &str = "(voice_cmu_us_slt_arctic_hts)";

/// Which binary renders the clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEngine {
    /// Festival's `text2wave`, text on stdin
    Festival,
    /// SVOX `pico2wave`, text as an argument
    Pico,
}

/// Synthesizer backed by a local binary
#[derive(Debug, Clone)]
pub struct CommandVoice {
    engine: CommandEngine,
    temp_dir: PathBuf,
}

impl CommandVoice {
    /// Create a command voice writing one-off clips into `temp_dir`
    #[must_use]
    pub fn new(engine: CommandEngine, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            temp_dir: temp_dir.into(),
        }
    }

    fn command(&self, text: &str, output: &Path) -> Command {
        let mut command = match self.engine {
            CommandEngine::Festival => {
                let mut c = Command::new("text2wave");
                c.arg("-eval").arg(FESTIVAL_VOICE).arg("-o").arg(output);
                c.stdin(Stdio::piped());
                c
            }
            CommandEngine::Pico => {
                let mut c = Command::new("pico2wave");
                c.arg("-w").arg(output).arg(text);
                c.stdin(Stdio::null());
                c
            }
        };
        command.stdout(Stdio::null()).stderr(Stdio::piped());
        command
    }
}

#[async_trait]
impl SpeechProvider for CommandVoice {
    fn name(&self) -> &str {
        match self.engine {
            CommandEngine::Festival => "festival",
            CommandEngine::Pico => "pico",
        }
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    async fn render(&self, text: &str, output: &Path) -> Result<()> {
        let name = self.name();
        let mut child = self
            .command(text, output)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Speech(format!("failed to spawn {name}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // Closing stdin ends the input for text2wave
            drop(stdin);
        }

        let output_status = tokio::time::timeout(RENDER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Speech(format!(
                    "{name} timed out after {} seconds",
                    RENDER_TIMEOUT.as_secs()
                ))
            })??;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(Error::Speech(format!("{name} failed: {}", stderr.trim())));
        }

        tracing::debug!(engine = name, output = %output.display(), "rendered clip");
        Ok(())
    }
}
