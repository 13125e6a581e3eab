//! Device Stand-ins
//!
//! Microphone capture and audio playback belong to the surface. Headless
//! surfaces (the CLI, tests) use these stand-ins instead: a microphone that
//! records nothing, an on-device synthesizer that isn't there, and an output
//! that writes clips to disk instead of playing them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::traits::{AudioClip, AudioOutput, Microphone, Recording, SpeechRequest, SpeechSynthesizer};
use crate::error::ProviderError;

/// On-device synthesizer for platforms without one
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLocalSpeech;

#[async_trait]
impl SpeechSynthesizer for NullLocalSpeech {
    fn name(&self) -> &str {
        "local"
    }

    async fn synthesize(&self, _request: &SpeechRequest) -> Result<AudioClip, ProviderError> {
        Err(ProviderError::not_configured(
            "local",
            "no on-device speech synthesizer on this surface",
        ))
    }
}

/// Microphone that captures silence
#[derive(Debug, Default)]
pub struct NullMicrophone {
    recording: AtomicBool,
}

#[async_trait]
impl Microphone for NullMicrophone {
    async fn start(&self) -> Result<(), ProviderError> {
        self.recording.store(true, Ordering::SeqCst);
        tracing::debug!("Null microphone started");
        Ok(())
    }

    async fn stop(&self) -> Result<Recording, ProviderError> {
        self.recording.store(false, Ordering::SeqCst);
        Ok(Recording {
            transcript: String::new(),
            audio: None,
        })
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// Output that saves each clip as a file
#[derive(Debug)]
pub struct FileAudioOutput {
    dir: PathBuf,
}

impl FileAudioOutput {
    /// Write clips into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AudioOutput for FileAudioOutput {
    async fn play(&self, clip: AudioClip) -> Result<(), ProviderError> {
        let extension = match clip.format {
            super::AudioFormat::Mp3 => "mp3",
            super::AudioFormat::Wav => "wav",
            super::AudioFormat::Opus => "ogg",
        };
        let path = self
            .dir
            .join(format!("speech-{}.{extension}", uuid::Uuid::new_v4().simple()));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ProviderError::transport("audio-output", e))?;
        tokio::fs::write(&path, &clip.data)
            .await
            .map_err(|e| ProviderError::transport("audio-output", e))?;

        tracing::info!(path = %path.display(), bytes = clip.data.len(), "Saved synthesized speech");
        Ok(())
    }

    fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}
