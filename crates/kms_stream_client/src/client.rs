//! KMS client: builds queries and drives streaming sessions.
//!
//! A [`StreamSession`] is pull-driven: each call to [`StreamSession::next`]
//! reads from the transport only when every frame already buffered has been
//! decoded and folded, so snapshots come out strictly in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::accumulator::{Accumulator, Snapshot};
use crate::config::{Config, DEFAULT_PROMPT_SUFFIX, DEFAULT_USERNAME};
use crate::decoder::{PayloadDecoder, DEFAULT_RESCUE_MIN_LEN};
use crate::framer::{Frame, LineFramer};
use crate::messages::QueryRequest;
use crate::transport::{ByteStream, HttpTransport, Transport, TransportError};

/// What a streaming session reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// State after one more record; supersedes every earlier snapshot.
    Snapshot(Snapshot),
    /// Fatal transport failure. Nothing follows it.
    Error(TransportError),
    /// Natural end (`[DONE]` or end of body). Nothing follows it.
    Complete,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Query client over any [`Transport`].
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    username: String,
    prompt_suffix: String,
    rescue_min_len: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("prompt_suffix", &self.prompt_suffix)
            .field("rescue_min_len", &self.rescue_min_len)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            username: DEFAULT_USERNAME.to_owned(),
            prompt_suffix: DEFAULT_PROMPT_SUFFIX.to_owned(),
            rescue_min_len: DEFAULT_RESCUE_MIN_LEN,
        }
    }

    /// HTTP client for the service at `url` (e.g. `http://host:19001/chat/query`).
    pub fn http(url: impl Into<String>) -> Self {
        Self::new(Arc::new(HttpTransport::new(url)))
    }

    pub fn from_config(config: &Config) -> Self {
        Self::http(config.api_url())
            .with_username(config.username())
            .with_prompt_suffix(config.prompt_suffix())
            .with_rescue_min_len(config.rescue_min_len())
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_prompt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.prompt_suffix = suffix.into();
        self
    }

    pub fn with_rescue_min_len(mut self, len: usize) -> Self {
        self.rescue_min_len = len;
        self
    }

    /// Request body for `question`, with the prompt suffix appended.
    pub fn request(&self, question: &str, stream: bool) -> QueryRequest {
        QueryRequest::new(
            format!("{}{}", question, self.prompt_suffix),
            self.username.as_str(),
            stream,
        )
    }

    /// Start a streaming query. Nothing is sent until the session is first polled.
    pub fn stream(&self, question: &str) -> StreamSession {
        StreamSession::new(
            Arc::clone(&self.transport),
            self.request(question, true),
            PayloadDecoder::new(self.rescue_min_len),
        )
    }

    /// Single-shot query; the whole answer arrives as one snapshot.
    pub async fn query(&self, question: &str) -> Result<Snapshot, ClientError> {
        let response = self.transport.query(&self.request(question, false)).await?;
        Ok(Snapshot::from(response))
    }

    /// [`Client::query`] that gives up when `cancel` fires. Cancellation is
    /// not an error: it yields `Ok(None)` and drops the in-flight request.
    pub async fn query_until_cancelled(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("query cancelled");
                Ok(None)
            }
            result = self.query(question) => result.map(Some),
        }
    }
}

enum Phase {
    Pending(QueryRequest),
    Reading(ByteStream),
    /// Body ended; buffered frames still to fold before `Complete`.
    Draining,
    Finished,
}

/// One in-flight streaming query.
pub struct StreamSession {
    transport: Arc<dyn Transport>,
    phase: Phase,
    framer: LineFramer,
    frames: VecDeque<Frame>,
    decoder: PayloadDecoder,
    accumulator: Accumulator,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("finished", &self.is_finished())
            .field("buffered_frames", &self.frames.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        request: QueryRequest,
        decoder: PayloadDecoder,
    ) -> Self {
        Self {
            transport,
            phase: Phase::Pending(request),
            framer: LineFramer::new(),
            frames: VecDeque::new(),
            decoder,
            accumulator: Accumulator::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this session; clone it into another task to stop a
    /// pending read. Cancelling twice is harmless.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("stream cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished) || self.cancel.is_cancelled()
    }

    /// Current accumulated state without folding anything new.
    pub fn snapshot(&self) -> Snapshot {
        self.accumulator.snapshot()
    }

    /// Next event, or `None` once the session has ended or been cancelled.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if self.cancel.is_cancelled() {
                self.terminate();
                return None;
            }

            if let Some(frame) = self.frames.pop_front() {
                match frame {
                    Frame::Done => {
                        tracing::info!("stream completed by [DONE]");
                        self.terminate();
                        return Some(StreamEvent::Complete);
                    }
                    Frame::Data(payload) => match self.decoder.decode(&payload) {
                        Some(record) => {
                            return Some(StreamEvent::Snapshot(self.accumulator.apply(&record)));
                        }
                        None => continue,
                    },
                }
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,
                Phase::Draining => {
                    tracing::info!("stream completed by end of body");
                    return Some(StreamEvent::Complete);
                }
                Phase::Pending(request) => {
                    let transport = Arc::clone(&self.transport);
                    let opened = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        opened = transport.open(&request) => opened,
                    };
                    match opened {
                        Ok(bytes) => self.phase = Phase::Reading(bytes),
                        Err(e) => {
                            tracing::warn!(error = %e, "stream failed to open");
                            return Some(StreamEvent::Error(e));
                        }
                    }
                }
                Phase::Reading(mut bytes) => {
                    let chunk = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        chunk = bytes.next() => chunk,
                    };
                    match chunk {
                        Some(Ok(chunk)) => {
                            tracing::trace!(len = chunk.len(), "chunk received");
                            self.frames.extend(self.framer.feed(&chunk));
                            self.phase = Phase::Reading(bytes);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "stream failed mid-body");
                            return Some(StreamEvent::Error(e));
                        }
                        None => {
                            self.frames.extend(self.framer.finish());
                            self.phase = Phase::Draining;
                        }
                    }
                }
            }
        }
    }

    /// The session as a `Stream` of events; ends like [`StreamSession::next`].
    pub fn into_stream(self) -> BoxStream<'static, StreamEvent> {
        stream::unfold(self, |mut session| async move {
            session.next().await.map(|event| (event, session))
        })
        .boxed()
    }

    fn terminate(&mut self) {
        self.phase = Phase::Finished;
        self.frames.clear();
    }
}
