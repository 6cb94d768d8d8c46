use std::path::{Path, PathBuf};
use crate::error::Error;
use crate::models::VoiceParams;

/// Turns text into an audio file. Blocking and CPU-bound; only ever called
/// from the TTS worker thread (or an explicit preview).
#[cfg_attr(feature = "mocks", mockall::automock)]
pub trait SpeechRenderer: Send + Sync {
    /// The returned file belongs to the caller, who deletes it after use.
    fn render(&self, text: &str, params: &VoiceParams) -> Result<PathBuf, Error>;
}

/// Plays an audio file. Blocks until playback has finished.
#[cfg_attr(feature = "mocks", mockall::automock)]
pub trait AudioPlayer: Send + Sync {
    /// `gain` is 0.0..=1.0.
    fn play(&self, path: &Path, gain: f32) -> Result<(), Error>;
}
