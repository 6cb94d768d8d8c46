// File: streamcore-core/src/test_utils/helpers.rs
//
// Shared doubles for unit and integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;

use streamcore_common::models::{ChatMessage, Platform, VoiceParams};
use streamcore_common::traits::{AudioPlayer, SpeechRenderer};

use crate::eventbus::{BotEvent, EventBus, Topic};
use crate::Error;

/// Builds a chat message, panicking on empty content (tests only).
pub fn chat(platform: Platform, sender: &str, content: &str) -> ChatMessage {
    chat_with_raw(platform, sender, content, Value::Null)
}

pub fn chat_with_raw(platform: Platform, sender: &str, content: &str, raw: Value) -> ChatMessage {
    ChatMessage::new(platform, sender, content, raw).expect("test message must not be empty")
}

/// Polls `cond` until it holds or `timeout` runs out.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Records every event published on the given topics, in order.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<BotEvent>>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus, topics: &[Topic]) -> Self {
        let recorder = Self::default();
        for topic in topics {
            let events = recorder.events.clone();
            bus.subscribe(*topic, move |evt| {
                events.lock().push(evt.clone());
                Ok(())
            });
        }
        recorder
    }

    pub fn events(&self) -> Vec<BotEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events.lock().iter().filter(|e| e.topic() == topic).count()
    }

    pub fn replies(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BotEvent::CommandReply { response, .. } => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Renderer that writes the text into a file under `dir`. When built with
/// [`FileRenderer::gated`], every render blocks until the test releases it.
pub struct FileRenderer {
    dir: PathBuf,
    rendered: Mutex<Vec<(String, VoiceParams)>>,
    fail_on: Option<String>,
    gate: Option<Receiver<()>>,
}

impl FileRenderer {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            rendered: Mutex::new(Vec::new()),
            fail_on: None,
            gate: None,
        }
    }

    /// Renders containing `needle` fail.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Returns the renderer plus the sender that releases one render per `send(())`.
    pub fn gated(dir: &Path) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        let mut renderer = Self::new(dir);
        renderer.gate = Some(rx);
        (renderer, tx)
    }

    pub fn rendered(&self) -> Vec<(String, VoiceParams)> {
        self.rendered.lock().clone()
    }
}

impl SpeechRenderer for FileRenderer {
    fn render(&self, text: &str, params: &VoiceParams) -> Result<PathBuf, Error> {
        if let Some(gate) = &self.gate {
            gate.recv_timeout(Duration::from_secs(10))
                .map_err(|_| Error::Render("render gate was never opened".into()))?;
        }
        self.rendered.lock().push((text.to_string(), *params));
        if self.fail_on.as_deref().is_some_and(|n| text.contains(n)) {
            return Err(Error::Render(format!("cannot render '{text}'")));
        }
        let n = self.rendered.lock().len();
        let path = self.dir.join(format!("utterance_{n}.wav"));
        fs::write(&path, text)?;
        Ok(path)
    }
}

/// Player that records what it was asked to play, reading the file so tests
/// can check the text that reached playback.
#[derive(Default)]
pub struct RecordingPlayer {
    played: Mutex<Vec<(String, f32)>>,
    delay: Duration,
}

impl RecordingPlayer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn played(&self) -> Vec<(String, f32)> {
        self.played.lock().clone()
    }

    pub fn played_texts(&self) -> Vec<String> {
        self.played.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

impl AudioPlayer for RecordingPlayer {
    fn play(&self, path: &Path, gain: f32) -> Result<(), Error> {
        let content = fs::read_to_string(path)
            .unwrap_or_else(|_| path.display().to_string());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.played.lock().push((content, gain));
        Ok(())
    }
}
