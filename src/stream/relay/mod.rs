mod cancel;
mod transport;


pub use cancel::CancellationToken;
pub use transport::{ByteStream, TransportError, UpstreamTransport, indicates_timeout};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use super::decoder::{UpstreamEvent, decode};
use super::events::{FailureReason, StreamEvent, UsageStats};
use super::lines::{DEFAULT_MAX_LINE_BYTES, LineReassembler};
use super::watchdog::IdleWatchdog;
use crate::ollama::GenerateRequest;

/// Ordered events for one relayed generation. The last item is always terminal.
pub type RelayStream = BoxStream<'static, StreamEvent>;

/// Upper bound on attempts per generation, for configuration and per-request overrides alike.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub max_attempts: u32,
    pub connect_timeout_seconds: u64,
    pub total_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub retry_backoff_seconds: u64,
    pub max_line_bytes: usize,
}

impl Default for RelayConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout_seconds: 30,
            total_timeout_seconds: 600,
            read_timeout_seconds: 60,
            idle_timeout_seconds: 60,
            retry_backoff_seconds: 2,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl RelayConfig {
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    #[inline]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_seconds)
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }
}

/// Turns an unreliable upstream byte stream into an ordered [`StreamEvent`] sequence,
/// reconnecting on transient failures.
#[derive(Clone)]
pub struct StreamRelay {
    transport: Arc<dyn UpstreamTransport>,
    config: RelayConfig,
}

impl StreamRelay {
    #[inline]
    pub fn new(transport: Arc<dyn UpstreamTransport>, config: RelayConfig) -> Self {
        Self { transport, config }
    }

    #[inline]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay a generation with no external cancellation.
    #[inline]
    pub fn relay(&self, request: GenerateRequest, max_attempts: u32) -> RelayStream {
        self.relay_with_cancel(request, max_attempts, CancellationToken::new())
    }

    /// Relay a generation that stops with a `cancelled` failure once `cancel` fires.
    ///
    /// `max_attempts` of zero is treated as one.
    #[inline]
    pub fn relay_with_cancel(
        &self,
        request: GenerateRequest,
        max_attempts: u32,
        cancel: CancellationToken,
    ) -> RelayStream {
        let machine = RelayMachine {
            transport: Arc::clone(&self.transport),
            request,
            config: self.config.clone(),
            cancel,
            max_attempts: max_attempts.max(1),
            attempt: 0,
            phase: Phase::Connecting,
            pending: VecDeque::new(),
            emitted: String::new(),
            token_index: 0,
        };

        futures::stream::unfold(machine, |mut machine| async move {
            machine.next_event().await.map(|event| (event, machine))
        })
        .boxed()
    }
}

#[derive(Debug, Error)]
enum AttemptFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Upstream reported an error: {0}")]
    Upstream(String),

    #[error("No data received for {0:?}")]
    Stalled(Duration),

    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("Upstream closed the stream before completion")]
    Disconnected,
}

impl AttemptFailure {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Upstream(message) => indicates_timeout(message),
            Self::Stalled(_) | Self::ReadTimeout(_) | Self::Disconnected => true,
        }
    }

    fn permanent_reason(&self) -> FailureReason {
        match self {
            Self::Upstream(_) => FailureReason::UpstreamError,
            Self::Transport(TransportError::Status { .. }) => FailureReason::HttpStatus,
            _ => FailureReason::Transport,
        }
    }
}

struct ActiveAttempt {
    body: ByteStream,
    lines: LineReassembler,
    watchdog: IdleWatchdog,
    /// Text received on this attempt while it is still replaying already-relayed output.
    replayed: String,
    replaying: bool,
}

enum Phase {
    Connecting,
    Reading(Box<ActiveAttempt>),
    Backoff,
    Finished,
}

struct RelayMachine {
    transport: Arc<dyn UpstreamTransport>,
    request: GenerateRequest,
    config: RelayConfig,
    cancel: CancellationToken,
    max_attempts: u32,
    attempt: u32,
    phase: Phase,
    pending: VecDeque<StreamEvent>,
    /// Everything relayed to the consumer so far, across all attempts.
    emitted: String,
    token_index: u64,
}

impl RelayMachine {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,
                Phase::Connecting => self.connect().await,
                Phase::Reading(active) => self.read(active).await,
                Phase::Backoff => self.back_off().await,
            }
        }
    }

    /// Waiting for response headers is bounded by the transport's connect and total
    /// timeouts only. The watchdog and read timeout start once a body is available.
    async fn connect(&mut self) {
        self.attempt += 1;
        debug!(
            "Opening upstream stream for model {} (attempt {}/{})",
            self.request.model, self.attempt, self.max_attempts
        );

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            opened = self.transport.open_stream(&self.request) => Some(opened),
        };

        match opened {
            None => self.cancelled(),
            Some(Ok(body)) => {
                self.phase = Phase::Reading(Box::new(ActiveAttempt {
                    body,
                    lines: LineReassembler::new(self.config.max_line_bytes),
                    watchdog: IdleWatchdog::new(self.config.idle_timeout(), Instant::now()),
                    replayed: String::new(),
                    replaying: !self.emitted.is_empty(),
                }));
            }
            Some(Err(e)) => self.fail_attempt(e.into()),
        }
    }

    async fn read(&mut self, mut active: Box<ActiveAttempt>) {
        let idle_left = active.watchdog.remaining(Instant::now());
        let read_timeout = self.config.read_timeout();
        let stall_bound = idle_left <= read_timeout;
        let wait = if stall_bound { idle_left } else { read_timeout };

        let next = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            next = timeout(wait, active.body.next()) => Some(next),
        };

        let Some(next) = next else {
            // Dropping the attempt closes the upstream connection.
            drop(active);
            self.cancelled();
            return;
        };

        let chunk = match next {
            Err(_) => {
                let failure = if stall_bound {
                    AttemptFailure::Stalled(active.watchdog.threshold())
                } else {
                    AttemptFailure::ReadTimeout(read_timeout)
                };
                drop(active);
                self.fail_attempt(failure);
                return;
            }
            Ok(None) => {
                let discarded = active.lines.flush();
                if discarded > 0 {
                    debug!("Discarded {} bytes of unterminated trailing data", discarded);
                }
                self.fail_attempt(AttemptFailure::Disconnected);
                return;
            }
            Ok(Some(Err(e))) => {
                drop(active);
                self.fail_attempt(e.into());
                return;
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        active.watchdog.observe_activity(Instant::now());

        for line in active.lines.feed(&chunk) {
            match decode(&line) {
                Ok(UpstreamEvent::Token(fragment)) => self.accept_fragment(&mut active, &fragment),
                Ok(UpstreamEvent::Done { tail, usage }) => {
                    if let Some(tail) = tail {
                        self.accept_fragment(&mut active, &tail);
                    }
                    self.settle_replay(&mut active);
                    self.complete(usage);
                    return;
                }
                Ok(UpstreamEvent::Error(message)) => {
                    self.fail_attempt(AttemptFailure::Upstream(message));
                    return;
                }
                Ok(UpstreamEvent::NoOp) => {}
                Err(e) => debug!("Skipping undecodable upstream line: {}", e),
            }
        }

        self.phase = Phase::Reading(active);
    }

    async fn back_off(&mut self) {
        let delay = self.config.retry_backoff();
        let cancelled = tokio::select! {
            biased;
            () = self.cancel.cancelled() => true,
            () = sleep(delay) => false,
        };

        if cancelled {
            self.cancelled();
        } else {
            self.phase = Phase::Connecting;
        }
    }

    /// Relay a fragment, suppressing text a retried attempt repeats from earlier attempts.
    ///
    /// Fragments are held back while they match the relayed text. Once they stop matching,
    /// the held-back text either extends the relayed text or, if it contradicts it, the
    /// relay restarts with this attempt's text.
    fn accept_fragment(&mut self, active: &mut ActiveAttempt, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        if !active.replaying {
            self.emit_token(fragment.to_string());
            return;
        }

        active.replayed.push_str(fragment);
        if self.emitted.starts_with(active.replayed.as_str()) {
            debug!(
                "Suppressing {} replayed bytes on attempt {}",
                fragment.len(),
                self.attempt
            );
            return;
        }

        active.replaying = false;
        let replayed = std::mem::take(&mut active.replayed);
        let fresh = replayed
            .strip_prefix(self.emitted.as_str())
            .map(str::to_string);
        match fresh {
            Some(fresh) => {
                if !fresh.is_empty() {
                    self.emit_token(fresh);
                }
            }
            None => self.restart(replayed),
        }
    }

    /// A retried attempt finished while its text was still a strict prefix of what was
    /// relayed. The shorter text is the answer, so relay it as a restart.
    fn settle_replay(&mut self, active: &mut ActiveAttempt) {
        if !active.replaying || active.replayed.len() == self.emitted.len() {
            return;
        }

        active.replaying = false;
        let replayed = std::mem::take(&mut active.replayed);
        self.restart(replayed);
    }

    /// Discard the relayed text and start over from what this attempt generated.
    fn restart(&mut self, text: String) {
        warn!(
            "Attempt {} diverged from the {} bytes already relayed; restarting the text",
            self.attempt,
            self.emitted.len()
        );
        self.emitted.clear();
        self.pending.push_back(StreamEvent::Restarted {
            attempt: self.attempt,
        });
        if !text.is_empty() {
            self.emit_token(text);
        }
    }

    fn emit_token(&mut self, text: String) {
        self.token_index += 1;
        self.emitted.push_str(&text);
        self.pending.push_back(StreamEvent::Token {
            text,
            cumulative_text: self.emitted.clone(),
            index: self.token_index,
        });
    }

    fn fail_attempt(&mut self, failure: AttemptFailure) {
        let retryable = failure.is_retryable();

        if retryable && self.attempt < self.max_attempts {
            warn!(
                "Attempt {}/{} for model {} failed: {}; retrying in {:?}",
                self.attempt,
                self.max_attempts,
                self.request.model,
                failure,
                self.config.retry_backoff()
            );
            self.pending.push_back(StreamEvent::Retrying {
                attempt: self.attempt + 1,
                max_attempts: self.max_attempts,
                reason: failure.to_string(),
            });
            self.phase = Phase::Backoff;
            return;
        }

        let (reason, detail) = if retryable {
            (
                FailureReason::RetriesExhausted,
                format!("Failed after {} attempts: {}", self.attempt, failure),
            )
        } else {
            (failure.permanent_reason(), failure.to_string())
        };

        error!(
            "Relay for model {} failed ({}): {}",
            self.request.model, reason, detail
        );
        self.finish(StreamEvent::Failed { reason, detail });
    }

    fn complete(&mut self, usage: UsageStats) {
        info!(
            "Relay for model {} completed with {} tokens after {} attempt(s)",
            self.request.model, self.token_index, self.attempt
        );
        let full_text = std::mem::take(&mut self.emitted);
        self.finish(StreamEvent::Complete {
            full_text,
            token_count: self.token_index,
            model: self.request.model.clone(),
            usage,
        });
    }

    fn cancelled(&mut self) {
        info!(
            "Relay for model {} cancelled during attempt {}",
            self.request.model, self.attempt
        );
        self.finish(StreamEvent::Failed {
            reason: FailureReason::Cancelled,
            detail: "Request was cancelled".to_string(),
        });
    }

    fn finish(&mut self, event: StreamEvent) {
        self.pending.push_back(event);
        self.phase = Phase::Finished;
    }
}
