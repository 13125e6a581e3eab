//! Conductor integration tests
//!
//! These tests drive a full Conductor through realistic conversations with
//! recording mock providers. Tests cover:
//! - Image selection and the enhancement confirmation gate
//! - Edit parameters and the three-step edit fallback chain
//! - Generation fallback between providers
//! - Failure reporting (one message, one toast, no stuck loading)
//! - Context windows for long conversations
//! - Recording and speech interplay
//! - TOML configuration feeding the Conductor

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

use atelier_conductor::backend::{
    AudioClip, AudioOutput, ChatRole, EditRequest, GenerateRequest, ImageEditor, ImageGenerator,
    ImageUpscaler, LlmBackend, LlmRequest, LlmResponse, Microphone, NullLocalSpeech, Recording,
    SpeechRequest, SpeechSynthesizer, StreamingToken, UpscaleRequest,
};
use atelier_conductor::config::{load_config_from_path, ConfigOverrides, ConfigSource};
use atelier_conductor::enhancement::{CANCELLED_REPLY, RESTATE_PROMPT};
use atelier_conductor::{
    Conductor, ConductorConfig, ConductorMessage, ErrorCategory, MediaProviders, MediaRef,
    MessageRole, NotifyLevel, ProviderError, Providers, SurfaceEvent,
};

// =============================================================================
// Mock providers
// =============================================================================

/// Text backend that records every request and streams a fixed reply
#[derive(Default)]
struct RecordingLlm {
    requests: Mutex<Vec<LlmRequest>>,
}

impl RecordingLlm {
    fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for RecordingLlm {
    fn name(&self) -> &str {
        "recording-llm"
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(StreamingToken::Token("Sure, ".to_string())).await;
            let _ = tx.send(StreamingToken::Token("here you go.".to_string())).await;
            let _ = tx
                .send(StreamingToken::Complete {
                    message: "Sure, here you go.".to_string(),
                })
                .await;
        });
        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(LlmResponse {
            content: "Sure, here you go.".to_string(),
            model: request.model.clone(),
            tokens_used: None,
        })
    }
}

/// One provider playing every image role, failing on request
#[derive(Default)]
struct RecordingImages {
    name: &'static str,
    fail_generate: AtomicBool,
    fail_edit: AtomicBool,
    fail_upscale: AtomicBool,
    generates: Mutex<Vec<GenerateRequest>>,
    edits: Mutex<Vec<EditRequest>>,
    upscales: Mutex<Vec<UpscaleRequest>>,
}

impl RecordingImages {
    fn named(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            ..Default::default()
        })
    }

    fn unavailable(&self) -> ProviderError {
        ProviderError::from_status(self.name, 503, "overloaded")
    }

    fn calls(&self) -> usize {
        self.generates.lock().unwrap().len()
            + self.edits.lock().unwrap().len()
            + self.upscales.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for RecordingImages {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<MediaRef, ProviderError> {
        self.generates.lock().unwrap().push(request.clone());
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(MediaRef::new(format!("https://{}.test/generated.png", self.name)))
    }
}

#[async_trait]
impl ImageEditor for RecordingImages {
    fn name(&self) -> &str {
        self.name
    }

    async fn edit(&self, request: &EditRequest) -> Result<MediaRef, ProviderError> {
        self.edits.lock().unwrap().push(request.clone());
        if self.fail_edit.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(MediaRef::new(format!("https://{}.test/edited.png", self.name)))
    }
}

#[async_trait]
impl ImageUpscaler for RecordingImages {
    fn name(&self) -> &str {
        self.name
    }

    async fn upscale(&self, request: &UpscaleRequest) -> Result<MediaRef, ProviderError> {
        self.upscales.lock().unwrap().push(request.clone());
        if self.fail_upscale.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(MediaRef::new(format!("https://{}.test/upscaled.png", self.name)))
    }
}

/// Remote speech that takes its time
struct SlowSpeech {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for SlowSpeech {
    fn name(&self) -> &str {
        "slow-speech"
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(request.text.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(AudioClip {
            format: request.format,
            data: vec![0xFF],
        })
    }
}

/// Microphone that "hears" a fixed transcript
#[derive(Default)]
struct ScriptedMicrophone {
    transcript: String,
    recording: AtomicBool,
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    async fn start(&self) -> Result<(), ProviderError> {
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<Recording, ProviderError> {
        self.recording.store(false, Ordering::SeqCst);
        Ok(Recording {
            transcript: self.transcript.clone(),
            audio: None,
        })
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct CountingOutput {
    plays: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait]
impl AudioOutput for CountingOutput {
    async fn play(&self, _clip: AudioClip) -> Result<(), ProviderError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        false
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    conductor: Conductor,
    rx: mpsc::Receiver<ConductorMessage>,
    llm: Arc<RecordingLlm>,
    primary: Arc<RecordingImages>,
    secondary: Arc<RecordingImages>,
    speech: Arc<SlowSpeech>,
    output: Arc<CountingOutput>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ConductorConfig::default(), "")
    }

    fn with_config(config: ConductorConfig, transcript: &str) -> Self {
        let llm = Arc::new(RecordingLlm::default());
        let primary = RecordingImages::named("primary");
        let secondary = RecordingImages::named("secondary");
        let speech = Arc::new(SlowSpeech {
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        });
        let output = Arc::new(CountingOutput::default());

        let providers = Providers {
            text: llm.clone(),
            media: MediaProviders {
                generator: primary.clone(),
                secondary_generator: Some(secondary.clone()),
                editor: primary.clone(),
                upscaler: primary.clone(),
            },
            speech: speech.clone(),
            local_speech: Arc::new(NullLocalSpeech),
            microphone: Arc::new(ScriptedMicrophone {
                transcript: transcript.to_string(),
                ..Default::default()
            }),
            audio_output: output.clone(),
        };

        let (tx, rx) = mpsc::channel(1024);
        Self {
            conductor: Conductor::new(config, providers, tx),
            rx,
            llm,
            primary,
            secondary,
            speech,
            output,
        }
    }

    async fn say(&mut self, text: &str) {
        self.conductor
            .handle_event(SurfaceEvent::user_message(text))
            .await
            .unwrap();
    }

    async fn select(&mut self, url: &str) {
        self.say("select image").await;
        self.conductor
            .handle_event(SurfaceEvent::image_clicked(MediaRef::new(url)))
            .await
            .unwrap();
        self.drain();
    }

    fn drain(&mut self) -> Vec<ConductorMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn assistant_texts(&self) -> Vec<String> {
        self.conductor
            .session()
            .all_messages()
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content().to_string())
            .collect()
    }
}

fn error_toasts(messages: &[ConductorMessage]) -> Vec<(Option<String>, String)> {
    messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::Notify {
                level: NotifyLevel::Error,
                title,
                message,
            } => Some((title.clone(), message.clone())),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Test 1: Selection
// =============================================================================

#[tokio::test]
async fn test_select_image_emits_one_guidance_message() {
    let mut h = Harness::new();
    h.say("select image").await;

    assert!(h.conductor.context().selection_mode);
    assert!(h.conductor.status().selection_mode);
    let messages = h.conductor.session().all_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(h.llm.requests().is_empty());

    h.conductor
        .handle_event(SurfaceEvent::image_clicked(MediaRef::new(
            "https://photos.test/cat.png",
        )))
        .await
        .unwrap();

    assert!(!h.conductor.context().selection_mode);
    assert_eq!(
        h.conductor
            .context()
            .selected_image
            .as_ref()
            .map(MediaRef::as_str),
        Some("https://photos.test/cat.png")
    );
}

#[tokio::test]
async fn test_user_message_is_emitted_before_reply() {
    let mut h = Harness::new();
    h.say("what's a good name for a cat?").await;

    let emitted = h.drain();
    let first_message = emitted.iter().find_map(|m| match m {
        ConductorMessage::Message { message } => Some(message.clone()),
        _ => None,
    });
    let first_message = first_message.expect("a message was emitted");
    assert_eq!(first_message.role, MessageRole::User);
    assert_eq!(first_message.content(), "what's a good name for a cat?");
}

// =============================================================================
// Test 2: Confirmation gate
// =============================================================================

#[tokio::test]
async fn test_enhancement_waits_for_proceed() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;

    h.say("enhance the lighting").await;
    let emitted = h.drain();

    assert_eq!(
        h.conductor.enhancement().pending_prompt(),
        Some("enhance the lighting")
    );
    assert_eq!(h.primary.calls(), 0);

    let description = emitted.iter().find_map(|m| match m {
        ConductorMessage::Confirmation { description, .. } => Some(description.clone()),
        _ => None,
    });
    assert!(description.expect("confirmation sent").contains("lighting"));

    // Anything else is still a confirmation answer, never chat
    h.say("hmm, what do you think?").await;
    assert_eq!(h.primary.calls(), 0);
    assert!(h.llm.requests().is_empty());

    h.say("proceed").await;
    let edits = h.primary.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].source.as_str(), "https://photos.test/cat.png");
    assert!((edits[0].strength - 0.7).abs() < f32::EPSILON);
    assert!((edits[0].guidance_scale - 8.0).abs() < f32::EPSILON);
    assert_eq!(edits[0].steps, 20);
    assert_eq!(h.primary.upscales.lock().unwrap().len(), 0);

    // The result becomes the selected image and joins the history
    let context = h.conductor.context();
    assert_eq!(
        context.selected_image.as_ref().map(MediaRef::as_str),
        Some("https://primary.test/edited.png")
    );
    assert_eq!(context.enhancement_history.len(), 1);
    assert_eq!(context.enhancement_history[0].prompt, "enhance the lighting");
    assert!(h.conductor.enhancement().pending_prompt().is_none());
    assert!(!h.conductor.status().loading);
}

#[tokio::test]
async fn test_dramatic_cue_raises_strength() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;

    h.say("enhance the lighting, make it dramatic").await;
    h.say("yes").await;

    let edits = h.primary.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    assert!((edits[0].strength - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_pinned_params_beat_prompt_cues() {
    let mut h = Harness::new();
    h.conductor
        .handle_event(SurfaceEvent::command(
            "params",
            vec!["strength=0.3".to_string(), "steps=12".to_string()],
        ))
        .await
        .unwrap();
    h.select("https://photos.test/cat.png").await;

    h.say("enhance the lighting, make it dramatic").await;
    h.say("yes").await;

    let edits = h.primary.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    assert!((edits[0].strength - 0.3).abs() < f32::EPSILON);
    assert_eq!(edits[0].steps, 12);
    assert!((edits[0].guidance_scale - 8.0).abs() < f32::EPSILON);

    // Bad arguments warn and leave the pinned values alone
    h.conductor
        .handle_event(SurfaceEvent::command("params", vec!["seed=7".to_string()]))
        .await
        .unwrap();
    let warned = h.drain().iter().any(|m| {
        matches!(
            m,
            ConductorMessage::Notify {
                level: NotifyLevel::Warning,
                ..
            }
        )
    });
    assert!(warned);
}

#[tokio::test]
async fn test_cancel_discards_pending_prompt() {
    for answer in ["cancel", "no", "stop"] {
        let mut h = Harness::new();
        h.select("https://photos.test/cat.png").await;

        h.say("improve the colors").await;
        h.say(answer).await;

        assert!(h.conductor.enhancement().pending_prompt().is_none());
        assert_eq!(h.primary.calls(), 0, "answer {answer:?} ran the pipeline");
        assert_eq!(h.assistant_texts().last().map(String::as_str), Some(CANCELLED_REPLY));

        // The gate is closed: a later "yes" is ordinary chat
        h.say("yes").await;
        assert_eq!(h.primary.calls(), 0);
    }
}

#[tokio::test]
async fn test_modify_asks_for_restatement() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;

    h.say("adjust the contrast").await;
    h.say("change it").await;

    assert!(h.conductor.enhancement().is_awaiting());
    assert!(h.conductor.enhancement().pending_prompt().is_none());
    assert_eq!(h.assistant_texts().last().map(String::as_str), Some(RESTATE_PROMPT));

    // The restated request is proposed again, still nothing executed
    h.say("make it black and white").await;
    assert_eq!(
        h.conductor.enhancement().pending_prompt(),
        Some("make it black and white")
    );
    assert_eq!(h.primary.calls(), 0);

    h.say("go").await;
    assert_eq!(h.primary.edits.lock().unwrap().len(), 1);
}

// =============================================================================
// Test 3: Fallback chains
// =============================================================================

#[tokio::test]
async fn test_edit_falls_back_to_upscale_enhance() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;
    h.primary.fail_edit.store(true, Ordering::SeqCst);

    h.say("enhance the details").await;
    h.say("ok").await;

    let upscales = h.primary.upscales.lock().unwrap().clone();
    assert_eq!(h.primary.edits.lock().unwrap().len(), 1);
    assert_eq!(upscales.len(), 1);
    assert!(upscales[0].enhance);
    assert_eq!(
        upscales[0].enhancement_prompt.as_deref(),
        Some("enhance the details")
    );
    assert_eq!(
        h.conductor
            .context()
            .selected_image
            .as_ref()
            .map(MediaRef::as_str),
        Some("https://primary.test/upscaled.png")
    );
}

#[tokio::test]
async fn test_edit_chain_failure_is_reported_once() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;
    h.primary.fail_edit.store(true, Ordering::SeqCst);
    h.primary.fail_upscale.store(true, Ordering::SeqCst);

    h.say("enhance the lighting").await;
    h.drain();
    let before = h.conductor.session().message_count();
    h.say("proceed").await;
    let emitted = h.drain();

    // standard edit, upscale-enhance, relaxed edit; no fourth attempt
    let edits = h.primary.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 2);
    assert_eq!(h.primary.upscales.lock().unwrap().len(), 1);
    assert!((edits[1].strength - 0.5).abs() < f32::EPSILON);
    assert!((edits[1].guidance_scale - 5.0).abs() < f32::EPSILON);
    assert_eq!(edits[1].steps, 15);

    // user message + exactly one categorized assistant message
    assert_eq!(h.conductor.session().message_count(), before + 2);
    assert_eq!(
        h.assistant_texts().last().map(String::as_str),
        Some(ErrorCategory::ServerUnavailable.user_message())
    );

    let toasts = error_toasts(&emitted);
    assert_eq!(toasts.len(), 1);
    assert_eq!(
        toasts[0].0.as_deref(),
        Some(ErrorCategory::ServerUnavailable.toast_title())
    );

    assert!(!h.conductor.status().loading);
    assert!(!h.conductor.session().is_streaming());
    // Selection untouched by the failure
    assert_eq!(
        h.conductor
            .context()
            .selected_image
            .as_ref()
            .map(MediaRef::as_str),
        Some("https://photos.test/cat.png")
    );
    assert!(h.conductor.context().enhancement_history.is_empty());
}

#[tokio::test]
async fn test_generation_uses_secondary_provider() {
    let mut h = Harness::new();
    h.conductor
        .handle_event(SurfaceEvent::command("photo", vec![]))
        .await
        .unwrap();
    h.primary.fail_generate.store(true, Ordering::SeqCst);

    h.say("a lighthouse in a storm").await;

    assert_eq!(h.primary.generates.lock().unwrap().len(), 1);
    let secondary = h.secondary.generates.lock().unwrap().clone();
    assert_eq!(secondary.len(), 1);
    assert_eq!(secondary[0].prompt, "a lighthouse in a storm");

    let last = h.conductor.session().last_message().unwrap();
    assert_eq!(
        last.body.media().map(MediaRef::as_str),
        Some("https://secondary.test/generated.png")
    );
}

#[tokio::test]
async fn test_photo_edit_without_source_generates() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;
    h.say("start over").await;
    h.conductor
        .handle_event(SurfaceEvent::command("photo", vec![]))
        .await
        .unwrap();
    h.drain();

    // No source image: generation, not an edit
    h.say("edit the sky").await;
    assert_eq!(h.primary.edits.lock().unwrap().len(), 0);
    assert_eq!(h.primary.generates.lock().unwrap().len(), 1);
}

// =============================================================================
// Test 4: Context window
// =============================================================================

#[tokio::test]
async fn test_long_conversation_is_summarized() {
    let mut h = Harness::new();
    for i in 0..30 {
        h.say(&format!("tell me about gardening tip number {i}")).await;
    }
    assert_eq!(h.conductor.session().message_count(), 60);

    h.say("and what about tomatoes?").await;

    let requests = h.llm.requests();
    let last = requests.last().unwrap();
    let summaries: Vec<_> = last
        .turns
        .iter()
        .filter(|t| t.role == ChatRole::System)
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].content.contains("Topics"));
    assert!(last.turns.len() <= 15);
    assert_eq!(
        last.turns.last().map(|t| t.content.as_str()),
        Some("and what about tomatoes?")
    );

    let system = last.system.as_deref().unwrap();
    assert!(system.contains("gardening"));
}

#[tokio::test]
async fn test_analysis_attaches_selected_image() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;

    h.say("describe this").await;

    let requests = h.llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].image.as_ref().map(MediaRef::as_str),
        Some("https://photos.test/cat.png")
    );
}

// =============================================================================
// Test 5: Speech
// =============================================================================

#[tokio::test]
async fn test_recording_aborts_pending_speech() {
    let mut config = ConductorConfig::default();
    config.speech.audio_enabled = true;
    let mut h = Harness::with_config(config, "make me a poem");

    h.say("hello there").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert!(h.conductor.status().speaking);

    let stops_before = h.output.stops.load(Ordering::SeqCst);
    h.conductor
        .handle_event(SurfaceEvent::StartRecording {
            event_id: SurfaceEvent::new_event_id(),
        })
        .await
        .unwrap();

    assert!(h.conductor.status().recording);
    assert!(!h.conductor.status().speaking);
    assert!(h.output.stops.load(Ordering::SeqCst) > stops_before);
    assert_eq!(h.output.plays.load(Ordering::SeqCst), 0);

    // The text stream was never touched
    assert_eq!(
        h.assistant_texts().last().map(String::as_str),
        Some("Sure, here you go.")
    );

    // The transcript is routed like typed text
    h.conductor
        .handle_event(SurfaceEvent::StopRecording {
            event_id: SurfaceEvent::new_event_id(),
        })
        .await
        .unwrap();
    let voice = h
        .conductor
        .session()
        .all_messages()
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .cloned()
        .unwrap();
    assert_eq!(voice.content(), "make me a poem");
    assert_eq!(h.llm.requests().len(), 2);
}

#[tokio::test]
async fn test_media_results_are_spoken() {
    let mut config = ConductorConfig::default();
    config.speech.audio_enabled = true;
    let mut h = Harness::with_config(config, "");

    h.conductor
        .handle_event(SurfaceEvent::command("photo", vec![]))
        .await
        .unwrap();
    h.say("a lighthouse in a storm").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.speech.texts.lock().unwrap().clone(),
        vec!["a lighthouse in a storm".to_string()]
    );
}

#[tokio::test]
async fn test_confirmed_enhancement_is_spoken() {
    let mut config = ConductorConfig::default();
    config.speech.audio_enabled = true;
    let mut h = Harness::with_config(config, "");
    h.select("https://photos.test/cat.png").await;

    h.say("enhance the lighting").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let before = h.speech.calls.load(Ordering::SeqCst);

    h.say("proceed").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.speech.calls.load(Ordering::SeqCst), before + 1);
    assert_eq!(
        h.speech.texts.lock().unwrap().last().cloned(),
        Some("Enhanced: enhance the lighting".to_string())
    );
}

// =============================================================================
// Test 6: Configuration
// =============================================================================

#[tokio::test]
async fn test_toml_config_reaches_requests() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[text]
model = "local-model"
max_tokens = 300

[images.defaults]
width = 768
height = 768
"#
    )
    .unwrap();

    let mut config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
    assert_eq!(config.source(), ConfigSource::File);
    config.apply_overrides(&ConfigOverrides {
        model: Some("override-model".to_string()),
        ..Default::default()
    });

    let mut h = Harness::with_config(config, "");
    h.say("hi").await;
    h.conductor
        .handle_event(SurfaceEvent::command("photo", vec![]))
        .await
        .unwrap();
    h.say("a red kite").await;

    let request = h.llm.requests().pop().unwrap();
    assert_eq!(request.model, "override-model");
    assert_eq!(request.max_tokens, 300);

    let generate = h.primary.generates.lock().unwrap().pop().unwrap();
    assert_eq!((generate.width, generate.height), (768, 768));
}

#[tokio::test]
async fn test_new_command_resets_everything() {
    let mut h = Harness::new();
    h.select("https://photos.test/cat.png").await;
    h.say("enhance the lighting").await;

    h.conductor
        .handle_event(SurfaceEvent::command("new", vec![]))
        .await
        .unwrap();

    assert_eq!(h.conductor.session().message_count(), 0);
    assert!(h.conductor.context().selected_image.is_none());
    assert!(!h.conductor.enhancement().is_awaiting());
    assert_eq!(h.conductor.snapshot().title, "New conversation");
}
