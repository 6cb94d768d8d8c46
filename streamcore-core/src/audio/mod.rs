//! Speech rendering and playback through external programs, plus the
//! optional in-process rodio player.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};
use uuid::Uuid;

use streamcore_common::models::VoiceParams;
use streamcore_common::traits::{AudioPlayer, SpeechRenderer};
use crate::Error;

#[cfg(feature = "rodio")]
pub mod rodio_player;
#[cfg(feature = "rodio")]
pub use rodio_player::RodioPlayer;

const SAMPLE_RATE: u32 = 44_100;

/// Renders with a synthesizer program, then realizes pitch and speed by
/// resampling with ffmpeg.
///
/// `synth_args` may contain `{out}` (target wav path) and `{text}`.
pub struct ProcessRenderer {
    synth_program: String,
    synth_args: Vec<String>,
    ffmpeg_program: String,
    out_dir: PathBuf,
}

impl ProcessRenderer {
    pub fn new(synth_command: &str, out_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let mut parts = synth_command.split_whitespace().map(str::to_string);
        let synth_program = parts
            .next()
            .ok_or_else(|| Error::Config("synthesizer command is empty".into()))?;
        Ok(Self {
            synth_program,
            synth_args: parts.collect(),
            ffmpeg_program: "ffmpeg".to_string(),
            out_dir: out_dir.into(),
        })
    }

    /// `espeak-ng -w {out} {text}` writing into the system temp dir.
    pub fn espeak() -> Self {
        Self {
            synth_program: "espeak-ng".to_string(),
            synth_args: vec!["-w".into(), "{out}".into(), "{text}".into()],
            ffmpeg_program: "ffmpeg".to_string(),
            out_dir: std::env::temp_dir(),
        }
    }

    pub fn with_ffmpeg(mut self, program: &str) -> Self {
        self.ffmpeg_program = program.to_string();
        self
    }

    fn synthesize(&self, text: &str, out: &Path) -> Result<(), Error> {
        let out_str = out.to_string_lossy();
        let args: Vec<String> = self
            .synth_args
            .iter()
            .map(|a| a.replace("{out}", &out_str).replace("{text}", text))
            .collect();
        run(&self.synth_program, &args)
    }

    fn resample(&self, input: &Path, output: &Path, params: &VoiceParams) -> Result<(), Error> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-af".into(),
            resample_filter(params),
            output.to_string_lossy().into_owned(),
        ];
        run(&self.ffmpeg_program, &args)
    }
}

impl SpeechRenderer for ProcessRenderer {
    fn render(&self, text: &str, params: &VoiceParams) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.out_dir)?;
        let id = Uuid::new_v4();
        let raw = self.out_dir.join(format!("tts_raw_{id}.wav"));
        let out = self.out_dir.join(format!("tts_{id}.wav"));

        let result = self.synthesize(text, &raw).and_then(|_| {
            if is_neutral(params) {
                fs::rename(&raw, &out).map_err(Error::from)
            } else {
                self.resample(&raw, &out, params)
            }
        });

        if raw.exists() {
            if let Err(e) = fs::remove_file(&raw) {
                warn!("could not remove {}: {}", raw.display(), e);
            }
        }
        match result {
            Ok(()) => {
                debug!(path = %out.display(), "rendered utterance");
                Ok(out)
            }
            Err(e) => {
                let _ = fs::remove_file(&out);
                Err(e)
            }
        }
    }
}

fn is_neutral(params: &VoiceParams) -> bool {
    (params.speed - 1.0).abs() < f32::EPSILON && (params.pitch - 1.0).abs() < f32::EPSILON
}

/// `asetrate` shifts pitch and tempo together; `atempo` then corrects the
/// tempo to the requested speed. atempo only accepts 0.5..=2.0 per stage.
pub fn resample_filter(params: &VoiceParams) -> String {
    let pitch = params.pitch.clamp(0.5, 2.0);
    let speed = params.speed.clamp(0.5, 2.0);
    let tempo = (speed / pitch).clamp(0.5, 2.0);
    format!(
        "asetrate={},aresample={},atempo={:.3}",
        (SAMPLE_RATE as f32 * pitch).round() as u32,
        SAMPLE_RATE,
        tempo
    )
}

fn run(program: &str, args: &[String]) -> Result<(), Error> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Render(format!("could not run {program}: {e}")))?;
    if !output.status.success() {
        return Err(Error::Render(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Plays through `ffplay` (or a compatible program) and waits for it.
pub struct ProcessPlayer {
    program: String,
}

impl Default for ProcessPlayer {
    fn default() -> Self {
        Self::new("ffplay")
    }
}

impl ProcessPlayer {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl AudioPlayer for ProcessPlayer {
    fn play(&self, path: &Path, gain: f32) -> Result<(), Error> {
        if !path.exists() {
            return Err(Error::Playback(format!("{} does not exist", path.display())));
        }
        let volume = (gain.clamp(0.0, 1.0) * 100.0).round() as u32;
        let status = Command::new(&self.program)
            .args(["-nodisp", "-autoexit", "-loglevel", "quiet", "-volume"])
            .arg(volume.to_string())
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::Playback(format!("could not run {}: {}", self.program, e)))?;
        if !status.success() {
            return Err(Error::Playback(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }
}

/// Renders `text` and returns it inline as a `data:` URL. The rendered file
/// is removed before returning.
pub fn preview_data_url(
    renderer: &dyn SpeechRenderer,
    text: &str,
    params: &VoiceParams,
) -> Result<String, Error> {
    let path = renderer.render(text, params)?;
    let bytes = fs::read(&path);
    if let Err(e) = fs::remove_file(&path) {
        debug!("could not remove preview {}: {}", path.display(), e);
    }
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        _ => "audio/wav",
    };
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes?)))
}
