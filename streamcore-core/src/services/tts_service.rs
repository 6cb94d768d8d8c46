//! Sequential text-to-speech: one worker thread drains a FIFO queue,
//! rendering and then playing each utterance to completion.

use std::fmt;
use std::fs;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use streamcore_common::models::{Module, TtsRequest, VoiceParams};
use streamcore_common::traits::{AudioPlayer, SpeechRenderer};

use crate::audio::preview_data_url;
use crate::eventbus::{BotEvent, EventBus, Topic};
use crate::services::module_state::ModuleStateHandle;
use crate::tasks::{StopSignal, Supervisor};
use crate::Error;

/// Default bound on how long the idle worker blocks before re-checking the
/// module switch and the stop signal.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Unbounded FIFO of pending utterances. Cloning shares the same queue.
#[derive(Clone)]
pub struct TtsQueue {
    tx: Sender<TtsRequest>,
    rx: Receiver<TtsRequest>,
}

impl Default for TtsQueue {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

impl TtsQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, req: TtsRequest) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(req);
    }

    /// Discards everything not yet picked up by the worker.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Rendering,
    Playing,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Rendering => write!(f, "rendering"),
            WorkerState::Playing => write!(f, "playing"),
        }
    }
}

/// Handle to the running TTS worker.
pub struct TtsService {
    queue: TtsQueue,
    held: Arc<Mutex<Option<TtsRequest>>>,
    voice: Arc<RwLock<VoiceParams>>,
    state: Arc<Mutex<WorkerState>>,
    renderer: Arc<dyn SpeechRenderer>,
}

/// Everything the worker thread owns.
struct TtsWorker {
    queue: TtsQueue,
    /// An item taken off the queue just as the module was switched off.
    /// It goes next once the module is back on.
    held: Arc<Mutex<Option<TtsRequest>>>,
    voice: Arc<RwLock<VoiceParams>>,
    state: Arc<Mutex<WorkerState>>,
    modules: ModuleStateHandle,
    renderer: Arc<dyn SpeechRenderer>,
    player: Arc<dyn AudioPlayer>,
    poll_interval: Duration,
}

impl TtsService {
    /// Spawns the worker under `supervisor` and subscribes to `tts:speak`
    /// (enqueue) and `tts:config` (live voice changes).
    pub fn start(
        bus: &EventBus,
        modules: ModuleStateHandle,
        renderer: Arc<dyn SpeechRenderer>,
        player: Arc<dyn AudioPlayer>,
        voice: VoiceParams,
        poll_interval: Duration,
        supervisor: &Supervisor,
    ) -> Result<Arc<Self>, Error> {
        let service = Arc::new(Self {
            queue: TtsQueue::new(),
            held: Arc::new(Mutex::new(None)),
            voice: Arc::new(RwLock::new(voice)),
            state: Arc::new(Mutex::new(WorkerState::Idle)),
            renderer: renderer.clone(),
        });

        let worker = TtsWorker {
            queue: service.queue.clone(),
            held: service.held.clone(),
            voice: service.voice.clone(),
            state: service.state.clone(),
            modules,
            renderer,
            player,
            poll_interval,
        };
        supervisor.spawn("tts-worker", move |stop| worker.run(stop))?;

        let weak: Weak<Self> = Arc::downgrade(&service);
        bus.subscribe(Topic::TtsSpeak, move |evt| {
            if let (Some(svc), BotEvent::TtsSpeak(req)) = (weak.upgrade(), evt) {
                svc.enqueue(req.clone());
            }
            Ok(())
        });

        let weak: Weak<Self> = Arc::downgrade(&service);
        bus.subscribe(Topic::TtsConfig, move |evt| {
            if let (Some(svc), BotEvent::TtsConfig(params)) = (weak.upgrade(), evt) {
                svc.set_voice(*params);
            }
            Ok(())
        });

        info!("TTS worker started");
        Ok(service)
    }

    pub fn enqueue(&self, req: TtsRequest) {
        debug!(speaker = %req.speaker, pending = self.queue.len() + 1, "tts enqueue");
        self.queue.enqueue(req);
    }

    /// Drops pending items; an item already rendering or playing finishes.
    pub fn clear_queue(&self) -> usize {
        let held = usize::from(self.held.lock().take().is_some());
        let dropped = self.queue.clear() + held;
        info!("TTS queue cleared ({} pending item(s) dropped)", dropped);
        dropped
    }

    /// Items waiting to be rendered, including one parked while the module
    /// is off.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.held.lock().is_some())
    }

    /// An item the worker has just dequeued reports `Idle` until the worker
    /// has confirmed the module is on and moved to `Rendering`.
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn voice(&self) -> VoiceParams {
        *self.voice.read()
    }

    pub fn set_voice(&self, params: VoiceParams) {
        info!(speed = params.speed, pitch = params.pitch, volume = params.volume, "tts voice updated");
        *self.voice.write() = params;
    }

    /// Renders `text` outside the queue and returns it as a `data:` URL.
    pub fn preview(&self, text: &str, params: Option<VoiceParams>) -> Result<String, Error> {
        let params = params.unwrap_or_else(|| self.voice());
        preview_data_url(self.renderer.as_ref(), text, &params)
    }
}

impl TtsWorker {
    fn run(self, stop: StopSignal) {
        debug!("tts worker loop running");
        while !stop.is_stopped() {
            if !self.modules.is_enabled(Module::Tts) {
                // Items accumulate while the module is off.
                stop.wait_timeout(self.poll_interval);
                continue;
            }
            let parked = self.held.lock().take();
            let req = match parked {
                Some(req) => req,
                None => match self.queue.rx.recv_timeout(self.poll_interval) {
                    Ok(req) => req,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };
            // The switch may have flipped while blocked in `recv_timeout`.
            if !self.modules.is_enabled(Module::Tts) {
                debug!(speaker = %req.speaker, "tts disabled, holding dequeued item");
                *self.held.lock() = Some(req);
                continue;
            }
            self.process(req);
        }
        debug!("tts worker loop exited");
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    fn process(&self, req: TtsRequest) {
        self.set_state(WorkerState::Rendering);
        let params = req.voice_params.unwrap_or_else(|| *self.voice.read());

        let path = match self.renderer.render(&req.text, &params) {
            Ok(path) => path,
            Err(e) => {
                warn!(speaker = %req.speaker, "tts render failed: {}", e);
                self.set_state(WorkerState::Idle);
                return;
            }
        };

        self.set_state(WorkerState::Playing);
        if let Err(e) = self.player.play(&path, params.gain()) {
            error!(speaker = %req.speaker, "tts playback failed: {}", e);
        }

        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove tts artifact {}: {}", path.display(), e);
            }
        }
        self.set_state(WorkerState::Idle);
    }
}
