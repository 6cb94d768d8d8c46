use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::{Decoder, OutputStream, Sink};
use tracing::debug;

use streamcore_common::traits::AudioPlayer;
use crate::Error;

/// In-process playback. The output stream is not `Send`, so each call opens
/// its own on the calling (worker) thread and blocks until the sink drains.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioPlayer;

impl AudioPlayer for RodioPlayer {
    fn play(&self, path: &Path, gain: f32) -> Result<(), Error> {
        let (_stream, handle) =
            OutputStream::try_default().map_err(|e| Error::Playback(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| Error::Playback(e.to_string()))?;

        let file = BufReader::new(File::open(path)?);
        let source = Decoder::new(file).map_err(|e| Error::Playback(e.to_string()))?;

        sink.set_volume(gain.clamp(0.0, 1.0));
        sink.append(source);
        debug!(path = %path.display(), "rodio playback started");
        sink.sleep_until_end();
        Ok(())
    }
}
