//! Conductor - The Orchestration Core
//!
//! The Conductor is the single entry point for surface events. It owns:
//! - the conversation session and its [`ConversationContext`]
//! - the enhancement confirmation gate
//! - the media pipeline, the streaming coordinator and the speech coordinator
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It doesn't know whether it is talking to a
//! terminal, a browser, or a test harness. It communicates through:
//! - `SurfaceEvent`: what the user did, received FROM the surface
//! - `ConductorMessage`: what to show, sent TO the surface
//!
//! Events are handled one at a time. Every user message is recorded and
//! echoed before it is classified, and every failure ends in exactly one
//! assistant message plus one toast, with the loading flag cleared.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    AudioOutput, ChatRole, ChatTurn, FileAudioOutput, InferenceImageProvider, LlmBackend,
    LlmRequest, Microphone, NullLocalSpeech, NullMicrophone, OpenAiBackend, OpenAiSpeech,
    SpeechSynthesizer, StabilityImageProvider,
};
use crate::config::ConductorConfig;
use crate::context::{AssistantMode, ContextCommand, ConversationContext};
use crate::context_window::{
    build_system_prompt, build_window, digest, infer_expertise, infer_topics, question_pattern,
};
use crate::enhancement::{
    suggestions, EnhancementState, Proposal, Transition, CANCELLED_REPLY, RESTATE_PROMPT,
    UNRECOGNIZED_PROMPT,
};
use crate::error::{ErrorCategory, ProviderError};
use crate::events::{SurfaceEvent, SurfaceType};
use crate::media::MediaRef;
use crate::messages::{
    ConductorMessage, ConductorState, MessageId, MessageRole, NotifyLevel, SessionId,
    SessionSnapshot, StatusFlags,
};
use crate::metrics::{PerformanceMonitor, SharedMonitor};
use crate::pipeline::{MediaPipeline, MediaProviders, MediaRequest, ParamOverrides};
use crate::routing::{classify, Command, PhotoOperation, RouterView};
use crate::session::{ConversationMessage, MessageBody, Session};
use crate::speech::{SpeechCoordinator, SpeechOutcome};
use crate::streaming::StreamingCoordinator;

const HELP_TEXT: &str = "Commands:
  /help          show this help
  /new           start a new conversation
  /reset         clear the selected image and enhancement history
  /photo         photo mode: every message creates or changes an image
  /chat          back to chat mode
  /audio on|off  speak responses aloud
  /model <name>  switch the text model
  /params k=v    pin edit parameters (strength, guidance, steps); /params reset clears
  /snapshot      export the conversation
  /quit          exit

Say \"select image\" to pick an image to enhance or describe.";

const SELECT_GUIDANCE: &str =
    "Click an image in the conversation to select it, or say \"cancel\" to stop selecting.";
const SELECTED_REPLY: &str =
    "Image selected. Ask me to enhance it, describe it, or say \"suggest\" for ideas.";
const SELECTION_CANCELLED_REPLY: &str = "Okay, no image selected.";
const SELECTION_CLEARED_REPLY: &str = "Selection cleared. Say \"select image\" to pick another.";
const ANALYSIS_SYSTEM_PROMPT: &str =
    "You describe images precisely: subject, composition, lighting, color and notable detail. Then answer the user's question about it.";
const TITLE_CHARS: usize = 40;

// ============================================================================
// Providers
// ============================================================================

/// Everything the Conductor talks to
#[derive(Clone)]
pub struct Providers {
    /// Text completion
    pub text: Arc<dyn LlmBackend>,
    /// Image generate / edit / upscale
    pub media: MediaProviders,
    /// Remote speech synthesis
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// On-device speech synthesis
    pub local_speech: Arc<dyn SpeechSynthesizer>,
    /// Capture device
    pub microphone: Arc<dyn Microphone>,
    /// Playback device
    pub audio_output: Arc<dyn AudioOutput>,
}

impl Providers {
    /// HTTP providers from configuration, with headless device stand-ins
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &ConductorConfig) -> Result<Self, ProviderError> {
        let text = Arc::new(OpenAiBackend::new(
            config.text.base_url.clone(),
            config.text.api_key.clone(),
            config.text.timeout,
        )?);

        let stability = Arc::new(StabilityImageProvider::new(
            config.images.stability_url.clone(),
            config.images.stability_key.clone(),
            config.images.engine.clone(),
            config.images.timeout,
        )?);
        let inference = Arc::new(InferenceImageProvider::new(
            config.images.inference_url.clone(),
            config.images.inference_key.clone(),
            config.images.inference_model.clone(),
            config.images.timeout,
        )?);

        let speech = Arc::new(OpenAiSpeech::new(
            config.speech.base_url.clone(),
            config.speech.api_key.clone(),
            config.speech.model.clone(),
            config.text.timeout,
        )?);

        Ok(Self {
            text,
            media: MediaProviders {
                generator: stability.clone(),
                secondary_generator: Some(inference),
                editor: stability.clone(),
                upscaler: stability,
            },
            speech,
            local_speech: Arc::new(NullLocalSpeech),
            microphone: Arc::new(NullMicrophone::default()),
            audio_output: Arc::new(FileAudioOutput::new(config.speech.output_dir.clone())),
        })
    }
}

// ============================================================================
// Conductor
// ============================================================================

/// The Conductor - headless orchestration core
pub struct Conductor {
    /// Configuration
    config: ConductorConfig,
    /// Text backend, wrapped with stream handling
    streaming: StreamingCoordinator,
    /// Image operations
    pipeline: MediaPipeline,
    /// Microphone and playback
    speech: Arc<SpeechCoordinator>,
    /// Provider latency and failures
    monitor: SharedMonitor,
    /// Current session
    session: Session,
    /// Orchestration state next to the history
    context: ConversationContext,
    /// Enhancement confirmation gate
    enhancement: EnhancementState,
    /// Current operational state
    state: ConductorState,
    /// An orchestrated operation is in flight
    loading: bool,
    /// Speak completed responses
    audio_enabled: bool,
    /// Edit parameters pinned with `/params`
    edit_overrides: ParamOverrides,
    /// Channel to send messages to UI surface
    tx: mpsc::Sender<ConductorMessage>,
    /// Connected surface
    surface_type: Option<SurfaceType>,
    /// Cancelled on shutdown
    shutdown: CancellationToken,
}

impl Conductor {
    /// Create a new Conductor
    pub fn new(
        config: ConductorConfig,
        providers: Providers,
        tx: mpsc::Sender<ConductorMessage>,
    ) -> Self {
        let monitor = PerformanceMonitor::shared();
        let session =
            Session::new_with_limit(config.text.model.clone(), config.max_session_messages);
        let pipeline = MediaPipeline::new(
            providers.media,
            config.images.settings.clone(),
            monitor.clone(),
        );
        let speech = Arc::new(SpeechCoordinator::new(
            providers.speech,
            providers.local_speech,
            providers.microphone,
            providers.audio_output,
            config.speech.voice.clone(),
            monitor.clone(),
        ));

        Self {
            audio_enabled: config.speech.audio_enabled,
            edit_overrides: ParamOverrides::default(),
            streaming: StreamingCoordinator::new(providers.text, monitor.clone()),
            pipeline,
            speech,
            monitor,
            session,
            context: ConversationContext::new(),
            enhancement: EnhancementState::Idle,
            state: ConductorState::Initializing,
            loading: false,
            tx,
            surface_type: None,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Get current state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// The conversation
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Orchestration context
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Enhancement gate
    pub fn enhancement(&self) -> &EnhancementState {
        &self.enhancement
    }

    /// Shared provider performance monitor
    pub fn monitor(&self) -> &SharedMonitor {
        &self.monitor
    }

    /// Connected surface, if any
    pub fn surface_type(&self) -> Option<SurfaceType> {
        self.surface_type
    }

    /// Current status flags
    pub fn status(&self) -> StatusFlags {
        StatusFlags {
            loading: self.loading,
            recording: self.speech.is_recording(),
            speaking: self.speech.is_speaking(),
            selection_mode: self.context.selection_mode,
        }
    }

    /// Start the Conductor
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::Initializing).await;

        // Check backend health
        if !self.streaming.backend().health_check().await {
            self.notify(
                NotifyLevel::Warning,
                "Text service not reachable - first reply may fail",
            )
            .await;
        }

        self.set_state(ConductorState::Ready).await;
        self.send_status().await;
        Ok(())
    }

    /// Handle an event from the UI surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> anyhow::Result<()> {
        match event {
            SurfaceEvent::Connected { surface_type, .. } => {
                self.surface_type = Some(surface_type);
                tracing::info!(surface = ?surface_type, "Surface connected");
                self.send(ConductorMessage::State { state: self.state })
                    .await;
                self.send_status().await;
            }

            SurfaceEvent::Disconnected { reason, .. } => {
                tracing::info!(reason = ?reason, "Surface disconnected");
                self.surface_type = None;
            }

            SurfaceEvent::UserMessage { content, .. } => {
                self.handle_user_message(MessageBody::text(content)).await;
            }

            SurfaceEvent::UserCommand { command, args, .. } => {
                self.handle_command(&command, &args).await?;
            }

            SurfaceEvent::ImageClicked { image, .. } => {
                self.handle_image_click(image).await;
            }

            SurfaceEvent::ImageUploaded { image, .. } => {
                self.update_context(ContextCommand::AttachUpload(image.clone()));
                self.record_user(MessageBody::image("Uploaded image", image))
                    .await;
            }

            SurfaceEvent::StartRecording { .. } => {
                if let Err(e) = self.speech.start_recording().await {
                    self.report_failure(e.category(), &e.to_string()).await;
                }
                self.send_status().await;
            }

            SurfaceEvent::StopRecording { .. } => match self.speech.stop_recording().await {
                Ok(recording) if recording.transcript.trim().is_empty() => {
                    self.send_status().await;
                    self.notify(NotifyLevel::Warning, "I didn't catch anything.")
                        .await;
                }
                Ok(recording) => {
                    self.send_status().await;
                    self.handle_user_message(MessageBody::voice(
                        recording.transcript,
                        recording.audio,
                    ))
                    .await;
                }
                Err(e) => {
                    self.send_status().await;
                    self.report_failure(e.category(), &e.to_string()).await;
                }
            },

            SurfaceEvent::SpeakMessage { message_id, .. } => {
                let text = self
                    .session
                    .get_message(&message_id)
                    .map(|m| m.content().to_string());
                match text {
                    Some(text) => self.speak(text),
                    None => {
                        tracing::debug!(message_id = %message_id, "Speak request for unknown message");
                    }
                }
            }

            SurfaceEvent::SnapshotRequested { .. } => {
                let snapshot = self.snapshot();
                self.send(ConductorMessage::Snapshot { snapshot }).await;
            }

            SurfaceEvent::QuitRequested { .. } => {
                self.shutdown().await?;
            }
        }

        Ok(())
    }

    // ========================================================================
    // User messages
    // ========================================================================

    async fn handle_user_message(&mut self, body: MessageBody) {
        let text = body.content().trim().to_string();
        if text.is_empty() {
            return;
        }

        // Recorded and echoed before anything else happens
        self.record_user(body).await;

        if let Some(style) = self.context.style.with_preferences_from(&text) {
            tracing::debug!(style = ?style, "Response style updated");
            self.update_context(ContextCommand::SetStyle(style));
        }

        let view = RouterView::new(&self.context, &self.enhancement);
        let command = classify(&text, &view);
        self.dispatch(command, &text).await;
    }

    async fn dispatch(&mut self, command: Command, text: &str) {
        match command {
            Command::SelectImage => {
                self.update_context(ContextCommand::EnterSelectionMode);
                self.reply(SELECT_GUIDANCE).await;
                self.send_status().await;
            }

            Command::CancelSelection => {
                self.update_context(ContextCommand::ExitSelectionMode);
                self.reply(SELECTION_CANCELLED_REPLY).await;
                self.send_status().await;
            }

            Command::AnalyzeImage => self.analyze_image(text).await,

            Command::ResetSelection => {
                self.update_context(ContextCommand::ClearSelection);
                self.enhancement = EnhancementState::Idle;
                self.reply(SELECTION_CLEARED_REPLY).await;
                self.send_status().await;
            }

            Command::RequestEnhancement => {
                let (state, proposal) = std::mem::take(&mut self.enhancement).request(text);
                self.enhancement = state;
                self.send_proposal(proposal).await;
            }

            Command::ConfirmEnhancement(response) => {
                let (state, transition) =
                    std::mem::take(&mut self.enhancement).respond(response, text);
                self.enhancement = state;
                tracing::debug!(transition = ?transition, "Enhancement gate answered");
                match transition {
                    Transition::Execute { prompt } => self.execute_enhancement(prompt).await,
                    Transition::Cancelled => self.reply(CANCELLED_REPLY).await,
                    Transition::Modify => self.reply(RESTATE_PROMPT).await,
                    Transition::Restated(proposal) => self.send_proposal(proposal).await,
                    Transition::Suggest => self.send_suggestions().await,
                    Transition::Unrecognized => self.reply(UNRECOGNIZED_PROMPT).await,
                }
            }

            Command::Suggest => self.send_suggestions().await,

            Command::GeneratePhoto(operation) => self.photo(operation, text).await,

            Command::Chat => self.chat(text).await,
        }
    }

    async fn handle_image_click(&mut self, image: MediaRef) {
        if !self.context.selection_mode {
            tracing::debug!(image = %image, "Image click outside selection mode");
            return;
        }
        self.update_context(ContextCommand::SelectImage(image));
        // A new target invalidates any pending proposal
        self.enhancement = EnhancementState::Idle;
        self.reply(SELECTED_REPLY).await;
        self.send_status().await;
    }

    // ========================================================================
    // Enhancement
    // ========================================================================

    async fn send_proposal(&mut self, proposal: Proposal) {
        self.reply(&proposal.description).await;
        self.send(ConductorMessage::Confirmation {
            description: proposal.description,
            options: proposal.options,
        })
        .await;
    }

    async fn send_suggestions(&mut self) {
        let list = suggestions(self.context.has_selection(), self.context.mode);
        let mut text = String::from("Here are a few ideas:");
        for suggestion in &list {
            text.push_str("\n- ");
            text.push_str(suggestion);
        }
        self.reply(&text).await;
        self.send(ConductorMessage::Suggestions { suggestions: list })
            .await;
    }

    async fn execute_enhancement(&mut self, prompt: String) {
        let Some(source) = self.context.selected_image.clone() else {
            self.report_failure(ErrorCategory::NoSelection, "no image selected")
                .await;
            return;
        };

        self.begin_operation(ConductorState::Rendering).await;
        let result = self
            .pipeline
            .execute(MediaRequest::Edit {
                prompt: prompt.clone(),
                source,
                overrides: self.edit_overrides,
            })
            .await;
        self.end_operation().await;

        match result {
            Ok(image) => {
                self.update_context(ContextCommand::RecordEnhancement {
                    prompt: prompt.clone(),
                    result: image.clone(),
                });
                let caption = format!("Enhanced: {prompt}");
                self.reply_body(MessageBody::image(caption.clone(), image))
                    .await;
                self.send_status().await;
                self.speak(caption);
            }
            Err(failure) => {
                self.report_failure(failure.category(), &failure.summary())
                    .await;
            }
        }
    }

    // ========================================================================
    // Photo mode
    // ========================================================================

    async fn photo(&mut self, operation: PhotoOperation, text: &str) {
        let request = match operation {
            PhotoOperation::Generate => MediaRequest::Generate {
                prompt: text.to_string(),
                style: None,
            },
            PhotoOperation::Edit | PhotoOperation::Upscale => {
                let Some(source) = self.context.source_image().cloned() else {
                    self.report_failure(ErrorCategory::NoSelection, "no source image")
                        .await;
                    return;
                };
                if operation == PhotoOperation::Edit {
                    MediaRequest::Edit {
                        prompt: text.to_string(),
                        source,
                        overrides: self.edit_overrides,
                    }
                } else {
                    MediaRequest::Upscale { source }
                }
            }
        };

        self.begin_operation(ConductorState::Rendering).await;
        let result = self.pipeline.execute(request).await;
        self.end_operation().await;

        let image = match result {
            Ok(image) => image,
            Err(failure) => {
                self.report_failure(failure.category(), &failure.summary())
                    .await;
                return;
            }
        };

        let caption = match operation {
            PhotoOperation::Generate => text.to_string(),
            PhotoOperation::Edit => format!("Edited: {text}"),
            PhotoOperation::Upscale => "Upscaled 2x".to_string(),
        };

        // Edits chain: the result becomes the next source
        if operation != PhotoOperation::Generate {
            if self.context.has_selection() {
                self.update_context(ContextCommand::RecordEnhancement {
                    prompt: text.to_string(),
                    result: image.clone(),
                });
            } else {
                self.update_context(ContextCommand::AttachUpload(image.clone()));
            }
        }

        self.reply_body(MessageBody::image(caption.clone(), image))
            .await;
        self.speak(caption);
    }

    // ========================================================================
    // Text
    // ========================================================================

    async fn analyze_image(&mut self, text: &str) {
        let Some(image) = self.context.selected_image.clone() else {
            self.report_failure(ErrorCategory::NoSelection, "no image selected")
                .await;
            return;
        };

        let request = LlmRequest::new(
            self.config.text.model.clone(),
            vec![ChatTurn::new(ChatRole::User, text)],
        )
        .with_system(ANALYSIS_SYSTEM_PROMPT)
        .with_max_tokens(self.token_budget())
        .with_temperature(self.config.text.temperature)
        .with_image(image);

        self.respond(request).await;
    }

    async fn chat(&mut self, text: &str) {
        let topics = infer_topics(text);
        if !topics.is_empty() {
            self.update_context(ContextCommand::NoteTopics(topics));
        }
        if let Some(pattern) = question_pattern(text) {
            self.update_context(ContextCommand::NoteQuestion(pattern));
        }
        if let Some(level) = infer_expertise(text) {
            self.update_context(ContextCommand::SetExpertise(level));
        }

        let degraded = self.monitor.read().is_degraded();
        if degraded {
            tracing::info!("Provider performance degraded, shrinking request");
        }

        let window = build_window(self.session.all_messages(), text, degraded);
        let system = build_system_prompt(
            self.context.mode,
            self.context.expertise,
            self.context.style,
            &digest(&self.context),
        );

        let request = LlmRequest::new(self.config.text.model.clone(), window.turns)
            .with_system(system)
            .with_max_tokens(self.token_budget())
            .with_temperature(self.config.text.temperature);

        self.respond(request).await;
    }

    /// Response token budget, halved while providers are degraded
    fn token_budget(&self) -> u32 {
        let budget = self.config.text.max_tokens;
        if self.monitor.read().is_degraded() {
            (budget / 2).max(1)
        } else {
            budget
        }
    }

    async fn respond(&mut self, request: LlmRequest) {
        self.begin_operation(ConductorState::Thinking).await;
        let cancel = self.shutdown.child_token();
        let result = self
            .streaming
            .respond(&mut self.session, &request, &self.tx, &cancel)
            .await;
        self.end_operation().await;

        match result {
            Ok(outcome) => {
                if outcome.metadata.used_fallback {
                    tracing::info!("Response delivered by non-streaming retry");
                }
                self.speak(outcome.content);
            }
            Err(ProviderError::Cancelled) => {
                tracing::debug!("Response cancelled");
            }
            Err(e) => self.report_failure(e.category(), &e.to_string()).await,
        }
    }

    fn speak(&self, text: String) {
        if !self.audio_enabled || text.trim().is_empty() {
            return;
        }
        let speech = Arc::clone(&self.speech);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let SpeechOutcome::Failed(e) = speech.speak(&text).await {
                let category = e.category();
                let _ = tx
                    .send(ConductorMessage::Notify {
                        level: NotifyLevel::Warning,
                        title: Some(category.toast_title().to_string()),
                        message: format!("Couldn't speak the response: {e}"),
                    })
                    .await;
            }
        });
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Handle a user command
    async fn handle_command(&mut self, command: &str, args: &[String]) -> anyhow::Result<()> {
        match command {
            "help" => {
                self.notify(NotifyLevel::Info, HELP_TEXT).await;
            }
            "new" | "clear" => {
                self.session.clear_history();
                self.update_context(ContextCommand::Reset);
                self.enhancement = EnhancementState::Idle;
                self.notify(NotifyLevel::Info, "Started a new conversation")
                    .await;
                self.send_status().await;
            }
            "reset" => {
                self.update_context(ContextCommand::ClearSelection);
                self.enhancement = EnhancementState::Idle;
                self.notify(NotifyLevel::Info, "Selection and enhancement history cleared")
                    .await;
                self.send_status().await;
            }
            "photo" => {
                self.update_context(ContextCommand::SetMode(AssistantMode::Photo));
                self.notify(
                    NotifyLevel::Info,
                    "Photo mode: describe an image and I'll create it",
                )
                .await;
            }
            "chat" => {
                self.update_context(ContextCommand::SetMode(AssistantMode::Chat));
                self.notify(NotifyLevel::Info, "Chat mode").await;
            }
            "audio" => {
                let enabled = match args.first().map(String::as_str) {
                    Some("on") => true,
                    Some("off") => false,
                    _ => !self.audio_enabled,
                };
                self.audio_enabled = enabled;
                if !enabled {
                    self.speech.stop_speaking();
                }
                let message = if enabled {
                    "Audio on: responses will be spoken"
                } else {
                    "Audio off"
                };
                self.notify(NotifyLevel::Info, message).await;
                self.send_status().await;
            }
            "model" if !args.is_empty() => {
                self.config.text.model = args[0].clone();
                self.session.metadata.model = args[0].clone();
                self.notify(NotifyLevel::Info, &format!("Model set to: {}", args[0]))
                    .await;
            }
            "model" => {
                let message = format!("Current model: {}", self.config.text.model);
                self.notify(NotifyLevel::Info, &message).await;
            }
            "params" => self.set_edit_overrides(args).await,
            "snapshot" => {
                let snapshot = self.snapshot();
                self.send(ConductorMessage::Snapshot { snapshot }).await;
            }
            "quit" | "exit" => {
                self.shutdown().await?;
            }
            _ => {
                self.notify(
                    NotifyLevel::Warning,
                    &format!("Unknown command: /{command}. Type /help for the list."),
                )
                .await;
            }
        }

        Ok(())
    }

    async fn set_edit_overrides(&mut self, args: &[String]) {
        if args.first().is_some_and(|a| a == "reset") {
            self.edit_overrides = ParamOverrides::default();
            self.notify(NotifyLevel::Info, "Edit parameters follow the prompt again")
                .await;
            return;
        }
        if args.is_empty() {
            let message = if self.edit_overrides.is_empty() {
                "Edit parameters follow the prompt".to_string()
            } else {
                format!("Edit parameters: {}", self.edit_overrides.describe())
            };
            self.notify(NotifyLevel::Info, &message).await;
            return;
        }

        match ParamOverrides::from_args(args) {
            Ok(overrides) => {
                self.edit_overrides = overrides;
                tracing::debug!(params = %overrides.describe(), "Edit parameters pinned");
                self.notify(
                    NotifyLevel::Info,
                    &format!("Edit parameters: {}", overrides.describe()),
                )
                .await;
            }
            Err(e) => self.notify(NotifyLevel::Warning, &e.to_string()).await,
        }
    }

    // ========================================================================
    // Snapshot and shutdown
    // ========================================================================

    /// Serializable view of the conversation for an external store
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session.id.clone(),
            messages: self.session.completed_messages().cloned().collect(),
            mode: self.context.mode,
            model: self.config.text.model.clone(),
            title: self.title(),
        }
    }

    fn title(&self) -> String {
        if let Some(topic) = self.context.topics.first() {
            let mut chars = topic.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => topic.clone(),
            };
        }

        self.session
            .all_messages()
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(ConversationMessage::content)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map_or_else(
                || "New conversation".to_string(),
                |content| {
                    if content.chars().count() > TITLE_CHARS {
                        let mut title: String = content.chars().take(TITLE_CHARS - 1).collect();
                        title.push('…');
                        title
                    } else {
                        content.to_string()
                    }
                },
            )
    }

    /// Shut down the Conductor
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::ShuttingDown).await;
        self.shutdown.cancel();
        self.speech.stop_speaking();
        self.session.end();

        // Send quit to UI
        self.send(ConductorMessage::Quit {
            message: Some("Goodbye!".to_string()),
        })
        .await;

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn update_context(&mut self, command: ContextCommand) {
        self.context = std::mem::take(&mut self.context).apply(command);
    }

    async fn record_user(&mut self, body: MessageBody) -> MessageId {
        let id = self.session.add_user_message(body);
        self.emit_message(&id).await;
        id
    }

    async fn reply(&mut self, text: &str) {
        self.reply_body(MessageBody::text(text)).await;
    }

    async fn reply_body(&mut self, body: MessageBody) {
        let id = self.session.add_assistant_message(body);
        self.emit_message(&id).await;
    }

    async fn emit_message(&self, id: &MessageId) {
        if let Some(message) = self.session.get_message(id) {
            self.send(ConductorMessage::Message {
                message: message.clone(),
            })
            .await;
        }
    }

    /// One assistant message and one toast per failure
    async fn report_failure(&mut self, category: ErrorCategory, detail: &str) {
        tracing::warn!(category = ?category, detail, "Operation failed");

        if let Some(message_id) = self.session.cancel_streaming() {
            self.send(ConductorMessage::MessageRemoved { message_id })
                .await;
        }
        if self.loading {
            self.end_operation().await;
        }

        self.reply(category.user_message()).await;
        self.send(ConductorMessage::Notify {
            level: NotifyLevel::Error,
            title: Some(category.toast_title().to_string()),
            message: detail.to_string(),
        })
        .await;
    }

    async fn begin_operation(&mut self, state: ConductorState) {
        self.loading = true;
        self.set_state(state).await;
        self.send_status().await;
    }

    async fn end_operation(&mut self) {
        self.loading = false;
        self.set_state(ConductorState::Ready).await;
        self.send_status().await;
    }

    async fn send_status(&self) {
        self.send(ConductorMessage::Status {
            status: self.status(),
        })
        .await;
    }

    /// Set state and notify UI
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.send(ConductorMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ConductorMessage::Notify {
            level,
            title: None,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the UI surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}
