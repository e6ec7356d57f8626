//! HTTP client for the event API.
//!
//! `POST {base}/events` submits an event; `GET {base}/events/stream` is the
//! feed, read either as Server-Sent Events or by polling pages of JSON.

use super::sse::SseParser;
use super::{EventSource, ItemStream, StreamError, StreamItem, StreamedEvent};
use crate::domain::EventRequest;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Timeout for single request/response calls (emission, feed pages).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for all calls, including the long-lived SSE feed.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events requested per feed page.
pub const POLL_PAGE_LIMIT: usize = 100;

/// Delay before the first emission retry; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on a single emission retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

const MAX_RETRY_EXPONENT: u32 = 10;

#[derive(Clone)]
pub struct EventApiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl EventApiClient {
    pub fn new(base_url: &str, max_retries: u32) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-based), capped at
    /// [`MAX_RETRY_DELAY`].
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(MAX_RETRY_EXPONENT));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY)
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    pub fn stream_url(&self) -> String {
        format!("{}/events/stream", self.base_url)
    }

    /// Submits an event, retrying failed attempts up to `max_retries` times.
    ///
    /// Returns the API's JSON response body.
    pub async fn emit_event(&self, request: &EventRequest) -> Result<Value, StreamError> {
        let mut attempt = 0u32;
        loop {
            match self.try_emit(request).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        event_name = %request.event_name,
                        attempt = attempt + 1,
                        error = %e,
                        "Event emission failed, retrying in {:?}",
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_emit(&self, request: &EventRequest) -> Result<Value, StreamError> {
        tracing::debug!(event_name = %request.event_name, "Emitting event");
        let response = self
            .client
            .post(self.events_url())
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| StreamError::Decode(e.to_string()))
    }

    /// Fetches one page of the feed, optionally only events after `since`.
    pub async fn fetch_page(
        &self,
        since: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Value>, StreamError> {
        let mut url = reqwest::Url::parse(&self.stream_url())
            .map_err(|e| StreamError::Connect(format!("invalid API URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
        }

        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let response = check_status(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| StreamError::Decode(e.to_string()))?;

        match body.get("events") {
            Some(Value::Array(events)) => Ok(events.clone()),
            Some(_) => Err(StreamError::Decode("`events` is not an array".to_string())),
            None => Ok(Vec::new()),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Server-Sent Events feed.
pub struct SseSource {
    api: EventApiClient,
}

impl SseSource {
    pub fn new(api: EventApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventSource for SseSource {
    async fn connect(&self) -> Result<ItemStream, StreamError> {
        let response = self
            .api
            .client
            .get(self.api.stream_url())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let response = check_status(response).await?;

        let mut parser = SseParser::new();
        let items = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(chunk) => parser
                    .push(&chunk)
                    .into_iter()
                    .map(|frame| Ok(StreamItem::from_frame(frame)))
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(StreamError::Read(e.to_string()))],
            })
            .flat_map(futures::stream::iter);
        Ok(Box::pin(items))
    }
}

/// Polling feed over paged JSON responses.
///
/// Empty pages yield a heartbeat. The timestamp of the last event seen is
/// kept across reconnects so a new connection resumes where the last ended.
pub struct PollingSource {
    api: EventApiClient,
    interval: Duration,
    since: Arc<Mutex<Option<String>>>,
}

impl PollingSource {
    pub fn new(api: EventApiClient, interval: Duration) -> Self {
        Self {
            api,
            interval,
            since: Arc::new(Mutex::new(None)),
        }
    }
}

struct PollState {
    api: EventApiClient,
    interval: Duration,
    since: Arc<Mutex<Option<String>>>,
    pending: VecDeque<Value>,
    polled: bool,
    failed: bool,
}

impl PollState {
    async fn next_item(mut self) -> Option<(Result<StreamItem, StreamError>, Self)> {
        if self.failed {
            return None;
        }
        if let Some(event) = self.pending.pop_front() {
            return Some((Ok(StreamItem::EventCreated(StreamedEvent::new(event))), self));
        }

        if self.polled {
            tokio::time::sleep(self.interval).await;
        }
        self.polled = true;

        let since = self.since.lock().await.clone();
        match self.api.fetch_page(since.as_deref(), POLL_PAGE_LIMIT).await {
            Ok(events) if events.is_empty() => Some((Ok(StreamItem::Heartbeat), self)),
            Ok(events) => {
                let newest = events
                    .iter()
                    .filter_map(|e| e.get("timestamp").and_then(Value::as_str))
                    .map(str::to_string)
                    .fold(None, |_, ts| Some(ts));
                if let Some(ts) = newest {
                    *self.since.lock().await = Some(ts);
                }
                self.pending.extend(events);
                let first = self.pending.pop_front()?;
                Some((Ok(StreamItem::EventCreated(StreamedEvent::new(first))), self))
            }
            Err(e) => {
                self.failed = true;
                Some((Err(e), self))
            }
        }
    }
}

#[async_trait]
impl EventSource for PollingSource {
    async fn connect(&self) -> Result<ItemStream, StreamError> {
        let state = PollState {
            api: self.api.clone(),
            interval: self.interval,
            since: self.since.clone(),
            pending: VecDeque::new(),
            polled: false,
            failed: false,
        };
        Ok(Box::pin(futures::stream::unfold(state, PollState::next_item)))
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
