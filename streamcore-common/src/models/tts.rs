use serde::{Deserialize, Serialize};

/// Voice parameters applied when rendering an utterance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceParams {
    /// Playback rate multiplier, 1.0 = unchanged.
    pub speed: f32,
    /// Pitch multiplier, 1.0 = unchanged.
    pub pitch: f32,
    /// 0..=100
    pub volume: u8,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            volume: 80,
        }
    }
}

impl VoiceParams {
    /// Volume as a 0.0..=1.0 gain.
    pub fn gain(&self) -> f32 {
        f32::from(self.volume.min(100)) / 100.0
    }
}

/// One queued utterance. No dedup, FIFO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TtsRequest {
    pub speaker: String,
    pub text: String,
    /// `None` = use the worker's settings at render time.
    #[serde(default)]
    pub voice_params: Option<VoiceParams>,
}

impl TtsRequest {
    pub fn new(speaker: &str, text: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            text: text.to_string(),
            voice_params: None,
        }
    }
}
