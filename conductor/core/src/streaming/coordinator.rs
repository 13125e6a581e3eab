//! Streaming Response Coordinator
//!
//! Drives one text response from request to finalized message.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{LlmBackend, LlmRequest, LlmResponse, StreamingToken};
use crate::error::ProviderError;
use crate::messages::{ConductorMessage, MessageId, ResponseMetadata};
use crate::metrics::{PerformanceSample, SharedMonitor};
use crate::session::{MessageBody, Session};

/// A finished response
#[derive(Clone, Debug, PartialEq)]
pub struct StreamOutcome {
    /// The assistant message holding the response
    pub message_id: MessageId,
    /// Final text
    pub content: String,
    /// Timing and provenance
    pub metadata: ResponseMetadata,
}

/// Why the stream stopped short
enum StreamBreak {
    /// Worth one non-streaming retry
    Transport(ProviderError),
    /// Surface as is
    Fatal(ProviderError),
}

/// Turns an incremental delta stream into one growing assistant message
pub struct StreamingCoordinator {
    backend: Arc<dyn LlmBackend>,
    monitor: SharedMonitor,
}

impl StreamingCoordinator {
    /// Create a coordinator for a backend
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, monitor: SharedMonitor) -> Self {
        Self { backend, monitor }
    }

    /// The text backend
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    /// Stream a response into `session`, emitting renderer messages on `tx`
    ///
    /// The first delta creates the assistant message; every delta is appended
    /// to it in arrival order. A transport failure removes the partial
    /// message and retries once without streaming. Cancellation removes the
    /// partial message and returns [`ProviderError::Cancelled`].
    pub async fn respond(
        &self,
        session: &mut Session,
        request: &LlmRequest,
        tx: &mpsc::Sender<ConductorMessage>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, ProviderError> {
        let started = Instant::now();

        let opened = tokio::select! {
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
            opened = self.backend.send_streaming(request) => opened,
        };

        let broke = match opened {
            Ok(rx) => match self.consume(session, request, rx, tx, cancel, started).await {
                Ok(outcome) => {
                    self.record(started, true);
                    return Ok(outcome);
                }
                Err(broke) => broke,
            },
            Err(e) if e.is_transport() => StreamBreak::Transport(e),
            Err(e) => StreamBreak::Fatal(e),
        };

        // Never leave a placeholder behind
        if let Some(message_id) = session.cancel_streaming() {
            emit(tx, ConductorMessage::MessageRemoved { message_id }).await;
        }

        match broke {
            StreamBreak::Fatal(ProviderError::Cancelled) => Err(ProviderError::Cancelled),
            StreamBreak::Fatal(error) => {
                self.record(started, false);
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %error,
                    "Streaming request failed"
                );
                Err(error)
            }
            StreamBreak::Transport(error) => {
                self.record(started, false);
                tracing::warn!(
                    backend = self.backend.name(),
                    error = %error,
                    "Stream transport failed, retrying without streaming"
                );
                self.fallback(session, request, tx, cancel).await
            }
        }
    }

    async fn consume(
        &self,
        session: &mut Session,
        request: &LlmRequest,
        mut rx: mpsc::Receiver<StreamingToken>,
        tx: &mpsc::Sender<ConductorMessage>,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<StreamOutcome, StreamBreak> {
        let mut message_id: Option<MessageId> = None;
        let mut token_count: u32 = 0;

        loop {
            let token = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(StreamBreak::Fatal(ProviderError::Cancelled));
                }
                token = rx.recv() => token,
            };

            match token {
                Some(StreamingToken::Token(text)) => {
                    let id = match message_id {
                        Some(ref id) => id.clone(),
                        None => {
                            let id = self.open_message(session, tx).await;
                            message_id = Some(id.clone());
                            id
                        }
                    };
                    token_count += 1;
                    session.append_streaming(&text);
                    emit(
                        tx,
                        ConductorMessage::Token {
                            message_id: id,
                            text,
                        },
                    )
                    .await;
                }

                Some(StreamingToken::Complete { message }) => {
                    let id = match message_id {
                        Some(id) => id,
                        None => {
                            // Provider skipped deltas and sent the whole text
                            let id = self.open_message(session, tx).await;
                            session.append_streaming(&message);
                            id
                        }
                    };

                    let content = session
                        .complete_streaming()
                        .map(|m| m.content().to_string())
                        .unwrap_or_default();
                    let final_content = if message.is_empty() { content } else { message };

                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    let mut metadata = ResponseMetadata::with_timing(elapsed_ms, token_count);
                    metadata.model_id = Some(request.model.clone());

                    emit(
                        tx,
                        ConductorMessage::StreamEnd {
                            message_id: id.clone(),
                            final_content: final_content.clone(),
                            metadata: metadata.clone(),
                        },
                    )
                    .await;

                    tracing::debug!(
                        backend = self.backend.name(),
                        tokens = token_count,
                        elapsed_ms,
                        "Stream complete"
                    );

                    return Ok(StreamOutcome {
                        message_id: id,
                        content: final_content,
                        metadata,
                    });
                }

                Some(StreamingToken::Error(error)) if error.is_transport() => {
                    return Err(StreamBreak::Transport(error));
                }
                Some(StreamingToken::Error(error)) => return Err(StreamBreak::Fatal(error)),

                None => {
                    return Err(StreamBreak::Transport(ProviderError::transport(
                        self.backend.name(),
                        "stream closed without completion",
                    )));
                }
            }
        }
    }

    async fn open_message(
        &self,
        session: &mut Session,
        tx: &mpsc::Sender<ConductorMessage>,
    ) -> MessageId {
        let id = session.start_assistant_response();
        if let Some(message) = session.get_message(&id) {
            emit(
                tx,
                ConductorMessage::Message {
                    message: message.clone(),
                },
            )
            .await;
        }
        id
    }

    async fn fallback(
        &self,
        session: &mut Session,
        request: &LlmRequest,
        tx: &mpsc::Sender<ConductorMessage>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, ProviderError> {
        let started = Instant::now();

        let result: Result<LlmResponse, ProviderError> = tokio::select! {
            () = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = self.backend.send(request) => result,
        };
        self.record(started, result.is_ok());

        let response = result?;
        let message_id = session.add_assistant_message(MessageBody::text(response.content.clone()));
        if let Some(message) = session.get_message(&message_id) {
            emit(
                tx,
                ConductorMessage::Message {
                    message: message.clone(),
                },
            )
            .await;
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let metadata = ResponseMetadata {
            model_id: Some(response.model),
            elapsed_ms,
            token_count: response.tokens_used.unwrap_or(0),
            tokens_per_second: None,
            used_fallback: true,
        };

        Ok(StreamOutcome {
            message_id,
            content: response.content,
            metadata,
        })
    }

    fn record(&self, started: Instant, success: bool) {
        self.monitor.write().record(PerformanceSample::since(
            self.backend.name(),
            started,
            success,
        ));
    }
}

async fn emit(tx: &mpsc::Sender<ConductorMessage>, msg: ConductorMessage) {
    if let Err(e) = tx.send(msg).await {
        tracing::warn!("Failed to send message to surface: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChatRole, ChatTurn};
    use crate::error::ErrorCategory;
    use crate::metrics::PerformanceMonitor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Tokens(Vec<&'static str>),
        MidStreamTransport,
        OpenFails(ProviderError),
        Hang,
    }

    struct ScriptedBackend {
        script: Script,
        send_calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                send_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "Scripted"
        }

        async fn send_streaming(
            &self,
            _request: &LlmRequest,
        ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
            let (tx, rx) = mpsc::channel(10);
            match &self.script {
                Script::Tokens(tokens) => {
                    let tokens = tokens.clone();
                    tokio::spawn(async move {
                        for t in &tokens {
                            let _ = tx.send(StreamingToken::Token((*t).to_string())).await;
                        }
                        let _ = tx
                            .send(StreamingToken::Complete {
                                message: tokens.concat(),
                            })
                            .await;
                    });
                }
                Script::MidStreamTransport => {
                    tokio::spawn(async move {
                        let _ = tx.send(StreamingToken::Token("par".to_string())).await;
                        let _ = tx
                            .send(StreamingToken::Error(ProviderError::transport(
                                "Scripted", "reset",
                            )))
                            .await;
                    });
                }
                Script::OpenFails(error) => return Err(error.clone()),
                Script::Hang => {
                    tokio::spawn(async move {
                        let _ = tx.send(StreamingToken::Token("partial".to_string())).await;
                        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                        drop(tx);
                    });
                }
            }
            Ok(rx)
        }

        async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: "fallback answer".to_string(),
                model: request.model.clone(),
                tokens_used: Some(3),
            })
        }
    }

    fn request() -> LlmRequest {
        LlmRequest::new("test-model", vec![ChatTurn::new(ChatRole::User, "hi")])
    }

    fn drain(rx: &mut mpsc::Receiver<ConductorMessage>) -> Vec<ConductorMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_deltas_grow_one_message() {
        let backend = ScriptedBackend::new(Script::Tokens(vec!["Hello ", "world", "!"]));
        let coordinator = StreamingCoordinator::new(backend, PerformanceMonitor::shared());
        let mut session = Session::new("test-model".to_string());
        let (tx, mut rx) = mpsc::channel(100);

        let outcome = coordinator
            .respond(&mut session, &request(), &tx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.content, "Hello world!");
        assert_eq!(outcome.metadata.token_count, 3);
        assert!(!outcome.metadata.used_fallback);

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], ConductorMessage::Message { .. }));
        let tokens: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                ConductorMessage::Token { message_id, text } => {
                    assert_eq!(message_id, &outcome.message_id);
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Hello ", "world", "!"]);
        assert!(matches!(messages.last(), Some(ConductorMessage::StreamEnd { .. })));

        assert_eq!(session.all_messages().len(), 1);
        assert_eq!(session.all_messages()[0].content(), "Hello world!");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_once() {
        let backend = ScriptedBackend::new(Script::MidStreamTransport);
        let coordinator = StreamingCoordinator::new(backend.clone(), PerformanceMonitor::shared());
        let mut session = Session::new("test-model".to_string());
        let (tx, mut rx) = mpsc::channel(100);

        let outcome = coordinator
            .respond(&mut session, &request(), &tx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.send_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.metadata.used_fallback);
        assert_eq!(session.all_messages().len(), 1);
        assert_eq!(session.all_messages()[0].content(), "fallback answer");

        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, ConductorMessage::MessageRemoved { .. })));
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let backend = ScriptedBackend::new(Script::OpenFails(ProviderError::RateLimited {
            provider: "Scripted".to_string(),
            retry_after_secs: Some(5),
        }));
        let coordinator = StreamingCoordinator::new(backend.clone(), PerformanceMonitor::shared());
        let mut session = Session::new("test-model".to_string());
        let (tx, _rx) = mpsc::channel(100);

        let err = coordinator
            .respond(&mut session, &request(), &tx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert_eq!(backend.send_calls.load(Ordering::SeqCst), 0);
        assert!(session.all_messages().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_removes_partial_message() {
        let backend = ScriptedBackend::new(Script::Hang);
        let monitor = PerformanceMonitor::shared();
        let coordinator = StreamingCoordinator::new(backend, monitor);
        let mut session = Session::new("test-model".to_string());
        let (tx, mut rx) = mpsc::channel(100);
        let cancel = CancellationToken::new();

        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if matches!(msg, ConductorMessage::Token { .. }) {
                        cancel.cancel();
                    }
                    if matches!(msg, ConductorMessage::MessageRemoved { .. }) {
                        return true;
                    }
                }
                false
            })
        };

        let err = coordinator
            .respond(&mut session, &request(), &tx, &cancel)
            .await
            .unwrap_err();
        drop(tx);

        assert_eq!(err, ProviderError::Cancelled);
        assert!(session.all_messages().is_empty());
        assert!(watcher.await.unwrap());
    }
}
