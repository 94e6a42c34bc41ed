//! Speech synthesis
//!
//! A [`SpeechProvider`] turns text into an [`AudioClip`] a worker can play.
//! Providers are picked by name once (see [`make_provider`]) and shared by
//! every worker in the fleet.

mod cached;
mod command;
mod http;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

pub use cached::{CachedVoice, cache_voice};
pub use command::{CommandEngine, CommandVoice};
pub use http::GoogleVoice;

use crate::config::SpeechConfig;
use crate::Result;

/// Characters kept by [`sanitize`], besides ASCII letters and digits
const SANITIZE_EXTRA: &str = " ,.?!";

/// A rendered clip on disk
///
/// Temporary clips were rendered for a single playback and belong to
/// whoever holds them; [`AudioClip::discard`] removes their file. Any other
/// clip (a precomputed one, say) is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    path: PathBuf,
    temporary: bool,
}

impl AudioClip {
    /// Wrap a file that outlives its playback
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// Wrap a file rendered for one playback
    #[must_use]
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: true,
        }
    }

    /// Location of the clip
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Release the clip, deleting its file if it is temporary
    pub async fn discard(self) {
        if !self.temporary {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), error = %e, "temporary clip not removed");
        }
    }
}

/// Text-to-speech backend
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Name used to select this provider
    fn name(&self) -> &str;

    /// File extension of rendered clips
    fn extension(&self) -> &'static str {
        "wav"
    }

    /// Directory for one-off clips
    fn temp_dir(&self) -> &Path;

    /// Render already sanitized `text` into `output`
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    async fn render(&self, text: &str, output: &Path) -> Result<()>;

    /// Sanitize `text` and render it to a fresh temporary clip
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be rendered
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let output = temp_clip_path(self.temp_dir(), self.extension()).await?;
        let clip = AudioClip::temporary(output);
        if let Err(e) = self.render(&sanitize(text), clip.path()).await {
            clip.discard().await;
            return Err(e);
        }
        Ok(clip)
    }
}

/// Keep only ASCII letters, digits, space and `,.?!`
#[must_use]
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || SANITIZE_EXTRA.contains(*c))
        .collect()
}

/// Lookup key for a precomputed clip: lowercase letters and spaces only
#[must_use]
pub fn cache_key(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == ' ')
        .collect()
}

/// Path of the precomputed clip for `text` inside `dir`
#[must_use]
pub fn cached_clip_path(dir: &Path, text: &str) -> PathBuf {
    dir.join(format!("{}.wav", cache_key(text)))
}

/// Unique path for a one-off clip, creating `dir` if needed
async fn temp_clip_path(dir: &Path, extension: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(dir.join(format!("voice_{}.{extension}", uuid::Uuid::new_v4().simple())))
}

/// Build the provider selected by `name`
///
/// Known names are `festival`, `pico` and `gtts`. Any other name is treated
/// as a directory of precomputed clips, with festival rendering whatever the
/// directory lacks.
#[must_use]
pub fn make_provider(name: &str, config: &SpeechConfig) -> Arc<dyn SpeechProvider> {
    let temp_dir = config.temp_dir.clone();

    let provider: Arc<dyn SpeechProvider> = match name.to_lowercase().as_str() {
        "festival" => Arc::new(CommandVoice::new(CommandEngine::Festival, temp_dir)),
        "pico" => Arc::new(CommandVoice::new(CommandEngine::Pico, temp_dir)),
        "gtts" => Arc::new(GoogleVoice::new(temp_dir)),
        _ => {
            let fallback = Arc::new(CommandVoice::new(CommandEngine::Festival, temp_dir));
            Arc::new(CachedVoice::new(name, fallback))
        }
    };

    tracing::info!(voice = name, provider = provider.name(), "speech provider selected");
    provider
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize("Welcome Zoë \"; rm -rf /"), "Welcome Zo  rm rf ");
        assert_eq!(sanitize("Hi, Bob! Ready? 42."), "Hi, Bob! Ready? 42.");
    }

    #[test]
    fn cache_key_keeps_lowercase_letters_and_spaces() {
        assert_eq!(cache_key("Welcome Alice"), "welcome alice");
        assert_eq!(cache_key("ATC Online!"), "atc online");
        assert_eq!(cache_key("R2-D2 here"), "rd here");
    }

    #[test]
    fn cached_clip_path_uses_key() {
        let path = cached_clip_path(Path::new("clips"), "Goodbye, Bob.");
        assert_eq!(path, PathBuf::from("clips/goodbye bob.wav"));
    }

    #[test]
    fn known_names_select_providers() {
        let config = SpeechConfig::default();
        assert_eq!(make_provider("festival", &config).name(), "festival");
        assert_eq!(make_provider("PICO", &config).name(), "pico");
        assert_eq!(make_provider("gtts", &config).name(), "gtts");
    }

    #[test]
    fn unknown_name_is_a_clip_directory() {
        let config = SpeechConfig::default();
        let provider = make_provider("my_clips", &config);
        assert_eq!(provider.name(), "cached");
    }

    #[tokio::test]
    async fn temp_clip_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_clip_path(dir.path(), "wav").await.unwrap();
        let b = temp_clip_path(dir.path(), "wav").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("wav"));
    }

    struct WritingVoice {
        dir: PathBuf,
        fail: bool,
    }

    #[async_trait]
    impl SpeechProvider for WritingVoice {
        fn name(&self) -> &str {
            "writing"
        }

        fn temp_dir(&self) -> &Path {
            &self.dir
        }

        async fn render(&self, text: &str, output: &Path) -> Result<()> {
            tokio::fs::write(output, text).await?;
            if self.fail {
                return Err(crate::Error::Speech("half written".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn synthesized_clips_are_temporary_and_discardable() {
        let dir = tempfile::tempdir().unwrap();
        let voice = WritingVoice {
            dir: dir.path().to_path_buf(),
            fail: false,
        };

        let clip = voice.synthesize("Welcome <Alice>").await.unwrap();
        assert!(clip.is_temporary());
        assert_eq!(std::fs::read_to_string(clip.path()).unwrap(), "Welcome Alice");

        let path = clip.path().to_path_buf();
        clip.discard().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let voice = WritingVoice {
            dir: dir.path().to_path_buf(),
            fail: true,
        };

        assert!(voice.synthesize("Goodbye Bob").await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn discarding_a_kept_clip_leaves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("welcome alice.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        AudioClip::new(&path).discard().await;
        assert!(path.exists());
    }
}
