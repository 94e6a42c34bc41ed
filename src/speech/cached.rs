//! Precomputed clip lookup with a fallback synthesizer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{AudioClip, SpeechProvider, cached_clip_path, sanitize};
use crate::Result;

/// Serves clips from a directory of precomputed files, keyed by
/// [`super::cache_key`], and delegates to `fallback` on a miss
pub struct CachedVoice {
    dir: PathBuf,
    fallback: Arc<dyn SpeechProvider>,
}

impl CachedVoice {
    /// Create a cached voice over `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, fallback: Arc<dyn SpeechProvider>) -> Self {
        Self {
            dir: dir.into(),
            fallback,
        }
    }

    /// Directory holding the precomputed clips
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Precomputed clip for `text`, or `None` on a cache miss
    pub async fn synthesize_cached(&self, text: &str) -> Option<AudioClip> {
        let path = cached_clip_path(&self.dir, &sanitize(text));
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(AudioClip::new(path)),
            _ => None,
        }
    }
}

#[async_trait]
impl SpeechProvider for CachedVoice {
    fn name(&self) -> &str {
        "cached"
    }

    fn extension(&self) -> &'static str {
        self.fallback.extension()
    }

    fn temp_dir(&self) -> &Path {
        self.fallback.temp_dir()
    }

    async fn render(&self, text: &str, output: &Path) -> Result<()> {
        self.fallback.render(text, output).await
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        if let Some(clip) = self.synthesize_cached(text).await {
            tracing::debug!(clip = %clip.path().display(), "cache hit");
            return Ok(clip);
        }

        tracing::debug!(dir = %self.dir.display(), "cache miss, using fallback");
        self.fallback.synthesize(&sanitize(text)).await
    }
}

/// Render each message with `provider` into `dir` under its cache key
///
/// # Errors
///
/// Returns error if the directory cannot be created or a message fails to render
pub async fn cache_voice(
    provider: &dyn SpeechProvider,
    dir: &Path,
    messages: &[String],
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(messages.len());
    for message in messages {
        let text = sanitize(message);
        let path = cached_clip_path(dir, &text);
        provider.render(&text, &path).await?;
        tracing::info!(message = %text, path = %path.display(), "cached clip");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Writes the text it was given into the output file
    struct EchoVoice {
        temp_dir: PathBuf,
        rendered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechProvider for EchoVoice {
        fn name(&self) -> &str {
            "echo"
        }

        fn temp_dir(&self) -> &Path {
            &self.temp_dir
        }

        async fn render(&self, text: &str, output: &Path) -> Result<()> {
            self.rendered.lock().unwrap().push(text.to_string());
            tokio::fs::write(output, text).await?;
            Ok(())
        }
    }

    fn echo(temp_dir: &Path) -> Arc<EchoVoice> {
        Arc::new(EchoVoice {
            temp_dir: temp_dir.to_path_buf(),
            rendered: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn hit_returns_precomputed_clip() {
        let clips = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(clips.path().join("welcome alice.wav"), b"clip").unwrap();

        let fallback = echo(temp.path());
        let voice = CachedVoice::new(clips.path(), fallback.clone());
        let clip = voice.synthesize("Welcome Alice!").await.unwrap();

        assert_eq!(clip.path(), clips.path().join("welcome alice.wav"));
        assert!(!clip.is_temporary());
        assert!(fallback.rendered.lock().unwrap().is_empty());

        // Playing a precomputed clip must not consume it
        clip.discard().await;
        assert!(clips.path().join("welcome alice.wav").exists());
    }

    #[tokio::test]
    async fn miss_delegates_to_fallback() {
        let clips = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();

        let fallback = echo(temp.path());
        let voice = CachedVoice::new(clips.path(), fallback.clone());
        assert!(voice.synthesize_cached("Goodbye Bob").await.is_none());

        let clip = voice.synthesize("Goodbye Bob").await.unwrap();
        assert!(clip.path().starts_with(temp.path()));
        assert!(clip.is_temporary());
        assert_eq!(*fallback.rendered.lock().unwrap(), vec!["Goodbye Bob"]);
    }

    #[tokio::test]
    async fn cache_voice_populates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let clips = temp.path().join("clips");
        let provider = echo(temp.path());

        let messages = vec!["ATC Online".to_string(), "Welcome Alice".to_string()];
        let written = cache_voice(&*provider, &clips, &messages).await.unwrap();

        assert_eq!(written.len(), 2);
        assert!(clips.join("atc online.wav").exists());
        assert!(clips.join("welcome alice.wav").exists());

        let voice = CachedVoice::new(&clips, provider.clone());
        assert!(voice.synthesize_cached("ATC Online").await.is_some());
    }
}
