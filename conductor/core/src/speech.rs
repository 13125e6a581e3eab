//! Speech Coordinator
//!
//! Owns the microphone and the audio output, and speaks completed responses.
//!
//! Two rules keep the devices from fighting each other: nothing plays while
//! the microphone records, and only one clip plays at a time. A new `speak`
//! or a recording start cancels any synthesis still in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    AudioFormat, AudioOutput, Microphone, Recording, SpeechRequest, SpeechSynthesizer,
};
use crate::error::ProviderError;
use crate::metrics::{PerformanceSample, SharedMonitor};

/// Longest text sent for synthesis, in characters
pub const MAX_TTS_CHARS: usize = 4096;

/// Voice parameters for synthesis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Voice name
    pub voice: String,
    /// Playback speed multiplier
    pub speed: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

/// What happened to a `speak` request
#[derive(Clone, Debug, PartialEq)]
pub enum SpeechOutcome {
    /// Playback started on the named engine's audio
    Played {
        /// Engine that synthesized the clip
        engine: String,
    },
    /// The microphone was recording
    Suppressed,
    /// A newer request or a recording start superseded this one
    Cancelled,
    /// Both engines failed, or playback did
    Failed(ProviderError),
}

/// Coordinates synthesis, playback and capture
pub struct SpeechCoordinator {
    remote: Arc<dyn SpeechSynthesizer>,
    local: Arc<dyn SpeechSynthesizer>,
    microphone: Arc<dyn Microphone>,
    output: Arc<dyn AudioOutput>,
    voice: VoiceSettings,
    monitor: SharedMonitor,
    pending: Mutex<Option<(u64, CancellationToken)>>,
    next_request: AtomicU64,
}

impl SpeechCoordinator {
    /// Create a coordinator
    pub fn new(
        remote: Arc<dyn SpeechSynthesizer>,
        local: Arc<dyn SpeechSynthesizer>,
        microphone: Arc<dyn Microphone>,
        output: Arc<dyn AudioOutput>,
        voice: VoiceSettings,
        monitor: SharedMonitor,
    ) -> Self {
        Self {
            remote,
            local,
            microphone,
            output,
            voice,
            monitor,
            pending: Mutex::new(None),
            next_request: AtomicU64::new(1),
        }
    }

    /// Speak `text`
    pub async fn speak(&self, text: &str) -> SpeechOutcome {
        if self.microphone.is_recording() {
            tracing::debug!("Microphone is recording, not speaking");
            return SpeechOutcome::Suppressed;
        }

        self.output.stop();
        let (id, token) = self.replace_pending();

        let request = SpeechRequest {
            text: text.chars().take(MAX_TTS_CHARS).collect(),
            voice: self.voice.voice.clone(),
            format: AudioFormat::Mp3,
            speed: self.voice.speed,
        };

        let started = Instant::now();
        let remote = tokio::select! {
            () = token.cancelled() => {
                tracing::debug!("Speech synthesis cancelled");
                return SpeechOutcome::Cancelled;
            }
            result = self.remote.synthesize(&request) => result,
        };
        self.record(self.remote.name(), started, remote.is_ok());

        let (clip, engine) = match remote {
            Ok(clip) => (clip, self.remote.name().to_string()),
            Err(remote_error) => {
                tracing::warn!(
                    engine = self.remote.name(),
                    error = %remote_error,
                    "Remote speech failed, falling back to local engine"
                );
                let started = Instant::now();
                let local = self.local.synthesize(&request).await;
                self.record(self.local.name(), started, local.is_ok());
                match local {
                    Ok(clip) => (clip, self.local.name().to_string()),
                    Err(local_error) => {
                        tracing::warn!(
                            engine = self.local.name(),
                            error = %local_error,
                            "Local speech failed"
                        );
                        self.finish(id);
                        return SpeechOutcome::Failed(remote_error);
                    }
                }
            }
        };

        self.finish(id);
        if token.is_cancelled() {
            return SpeechOutcome::Cancelled;
        }
        // Recording may have started while synthesis ran
        if self.microphone.is_recording() {
            return SpeechOutcome::Suppressed;
        }

        match self.output.play(clip).await {
            Ok(()) => {
                tracing::debug!(engine = %engine, "Speaking");
                SpeechOutcome::Played { engine }
            }
            Err(e) => SpeechOutcome::Failed(e),
        }
    }

    /// Cancel synthesis and stop playback
    pub fn stop_speaking(&self) {
        if let Some((_, token)) = self.pending.lock().take() {
            token.cancel();
        }
        self.output.stop();
    }

    /// Start capturing; silences any speech first
    pub async fn start_recording(&self) -> Result<(), ProviderError> {
        self.stop_speaking();
        self.microphone.start().await
    }

    /// Stop capturing and return what was said
    pub async fn stop_recording(&self) -> Result<Recording, ProviderError> {
        self.microphone.stop().await
    }

    /// Whether the microphone is capturing
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.microphone.is_recording()
    }

    /// Whether speech is being synthesized or played
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.pending.lock().is_some() || self.output.is_playing()
    }

    fn record(&self, engine: &str, started: Instant, success: bool) {
        self.monitor
            .write()
            .record(PerformanceSample::since(engine, started, success));
    }

    fn replace_pending(&self) -> (u64, CancellationToken) {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self.pending.lock().replace((id, token.clone())) {
            previous.cancel();
        }
        (id, token)
    }

    fn finish(&self, id: u64) {
        let mut pending = self.pending.lock();
        if matches!(*pending, Some((current, _)) if current == id) {
            *pending = None;
        }
    }
}
