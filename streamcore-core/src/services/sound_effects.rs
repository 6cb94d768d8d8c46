use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use streamcore_common::traits::AudioPlayer;

use crate::eventbus::{BotEvent, EventBus, Topic};
use crate::tasks::Supervisor;
use crate::Error;

/// Plays `sound:play` effects on a dedicated thread so publishers never wait
/// on audio. Effects are independent of the TTS queue.
pub struct SoundEffectService {
    tx: Sender<(PathBuf, f32)>,
}

impl SoundEffectService {
    pub fn start(
        bus: &EventBus,
        player: Arc<dyn AudioPlayer>,
        poll_interval: Duration,
        supervisor: &Supervisor,
    ) -> Result<Arc<Self>, Error> {
        let (tx, rx) = unbounded::<(PathBuf, f32)>();

        supervisor.spawn("sound-effects", move |stop| {
            while !stop.is_stopped() {
                match rx.recv_timeout(poll_interval) {
                    Ok((path, gain)) => {
                        if !path.exists() {
                            warn!("sound effect not found: {}", path.display());
                            continue;
                        }
                        debug!(path = %path.display(), gain, "playing sound effect");
                        if let Err(e) = player.play(&path, gain) {
                            warn!("sound effect failed: {}", e);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        let service = Arc::new(Self { tx });
        let sender = service.tx.clone();
        bus.subscribe(Topic::PlaySound, move |evt| {
            if let BotEvent::PlaySound { path, gain } = evt {
                sender
                    .send((path.clone(), *gain))
                    .map_err(|_| Error::EventBus("sound effect worker has stopped".into()))?;
            }
            Ok(())
        });

        info!("Sound effect worker started");
        Ok(service)
    }

    /// Queue an effect directly, bypassing the bus.
    pub fn play(&self, path: PathBuf, gain: f32) -> Result<(), Error> {
        self.tx
            .send((path, gain))
            .map_err(|_| Error::EventBus("sound effect worker has stopped".into()))
    }
}
