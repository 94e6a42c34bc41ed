//! Google Translate speech over HTTP

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::SpeechProvider;
use crate::{Error, Result};

/// Speech endpoint behind Google Translate's listen button
const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Fetches MP3 clips from Google Translate, no key needed
pub struct GoogleVoice {
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl GoogleVoice {
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            temp_dir: temp_dir.into(),
        }
    }

    async fn fetch(&self, text: &str) -> Result<Vec<u8>> {
        let response = self.client.get(tts_url(text)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Speech(format!("google speech returned {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechProvider for GoogleVoice {
    fn name(&self) -> &str {
        "gtts"
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    async fn render(&self, text: &str, output: &Path) -> Result<()> {
        let audio = self.fetch(text).await?;
        tokio::fs::write(output, &audio).await?;
        tracing::debug!(
            provider = self.name(),
            bytes = audio.len(),
            output = %output.display(),
            "rendered clip"
        );
        Ok(())
    }
}

/// Request URL speaking `text` in English
fn tts_url(text: &str) -> String {
    format!(
        "{GOOGLE_TTS_URL}?ie=UTF-8&tl=en&client=tw-ob&q={}",
        urlencoding::encode(text)
    )
}
