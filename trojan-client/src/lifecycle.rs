//! Single-flight analyze request lifecycle
//!
//! At most one analyze request is current. Every submit allocates a new
//! generation and cancels the previous request's transport future; a
//! completion is applied only if its generation is still the latest, so a
//! superseded response can never reach the visible state no matter when it
//! arrives.
//!
//! While a request is in flight a [`PeriodicTask`] nudges a simulated progress
//! value towards a ceiling. The ticker is owned by the in-flight request and is
//! stopped on every terminal transition.

use crate::backend::{Backend, ClientError, HttpReply};
use crate::periodic::{FirstTick, PeriodicTask};
use crate::request::{AnalyzeRequest, UploadFile, ValidationError};
use crate::ClientConfig;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress increment per tick is drawn from this range
const PROGRESS_STEP: std::ops::Range<f64> = 5.0..15.0;

/// Structured response from the analysis service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnalyzeResult(Value);

impl AnalyzeResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// `translation`, top level first, then under `data`
    pub fn translation(&self) -> Option<&Value> {
        self.field("translation")
    }

    /// `analysis`, top level first, then under `data`
    pub fn analysis(&self) -> Option<&Value> {
        self.field("analysis")
    }

    /// Text the server extracted from an uploaded file
    pub fn extracted_text(&self) -> Option<String> {
        match self.0.get("text") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn field(&self, name: &str) -> Option<&Value> {
        let present = |v: &&Value| !v.is_null();
        self.0
            .get(name)
            .filter(present)
            .or_else(|| self.0.get("data").and_then(|d| d.get(name)).filter(present))
    }
}

/// Visible state of the current request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Idle,
    InFlight,
    Succeeded(AnalyzeResult),
    Failed(String),
    Cancelled,
}

impl RequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestState::InFlight)
    }

    pub fn result(&self) -> Option<&AnalyzeResult> {
        match self {
            RequestState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RequestState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn shows_outcome(&self) -> bool {
        matches!(self, RequestState::Succeeded(_) | RequestState::Failed(_))
    }
}

/// Copy of everything a renderer needs
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSnapshot {
    pub state: RequestState,
    /// Simulated percentage; only meaningful while in flight or after success
    pub progress: f64,
    pub model_id: String,
    pub text: String,
    /// Latest validation refusal, shown as a non-blocking hint
    pub advisory: Option<String>,
}

impl LifecycleSnapshot {
    /// `{model, textLen, loading}` shown when there is no result
    pub fn debug_summary(&self) -> Value {
        json!({
            "model": self.model_id,
            "textLen": self.text.chars().count(),
            "loading": self.state.is_in_flight(),
        })
    }
}

struct Inner {
    generation: u64,
    state: RequestState,
    progress: f64,
    model_id: String,
    text: String,
    advisory: Option<String>,
    cancel: Option<CancellationToken>,
    ticker: Option<PeriodicTask>,
}

impl Inner {
    /// Invalidate whatever is in flight and stop its ticker
    fn abandon_current(&mut self) {
        self.generation += 1;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.stop_ticker();
    }

    fn stop_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the single current analyze request
pub struct RequestLifecycle {
    backend: Arc<dyn Backend>,
    engine: String,
    tick: Duration,
    ceiling: f64,
    inner: Arc<Mutex<Inner>>,
}

impl RequestLifecycle {
    /// Create an idle lifecycle
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            engine: config.engine.clone(),
            tick: config.progress_tick(),
            ceiling: progress_ceiling(config),
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                state: RequestState::Idle,
                progress: 0.0,
                model_id: String::new(),
                text: String::new(),
                advisory: None,
                cancel: None,
                ticker: None,
            })),
        }
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let inner = lock(&self.inner);
        LifecycleSnapshot {
            state: inner.state.clone(),
            progress: inner.progress,
            model_id: inner.model_id.clone(),
            text: inner.text.clone(),
            advisory: inner.advisory.clone(),
        }
    }

    pub fn state(&self) -> RequestState {
        lock(&self.inner).state.clone()
    }

    pub fn progress(&self) -> f64 {
        lock(&self.inner).progress
    }

    /// Select a model. Clears a showing result or error.
    pub fn set_model(&self, model_id: impl Into<String>) {
        let mut inner = lock(&self.inner);
        inner.model_id = model_id.into();
        Self::invalidate_outcome(&mut inner);
    }

    /// Edit the input text. Clears a showing result or error.
    pub fn set_text(&self, text: impl Into<String>) {
        let mut inner = lock(&self.inner);
        inner.text = text.into();
        Self::invalidate_outcome(&mut inner);
    }

    fn invalidate_outcome(inner: &mut Inner) {
        inner.advisory = None;
        if inner.state.shows_outcome() {
            inner.state = RequestState::Idle;
        }
    }

    /// Submit the current model and text
    pub async fn submit(&self) -> Result<(), ValidationError> {
        let (model_id, text) = {
            let inner = lock(&self.inner);
            (inner.model_id.clone(), inner.text.clone())
        };
        self.submit_text(&model_id, &text).await
    }

    /// Analyze `text` with `model_id`.
    ///
    /// Returns once this request settles or is superseded. The outcome is
    /// observed through [`RequestLifecycle::state`]; `Err` only reports a
    /// local validation refusal, in which case no request was issued.
    pub async fn submit_text(&self, model_id: &str, text: &str) -> Result<(), ValidationError> {
        let request = self.validated(AnalyzeRequest::text(model_id, text, self.engine.as_str()))?;
        {
            let mut inner = lock(&self.inner);
            inner.model_id = model_id.to_string();
            inner.text = text.to_string();
        }
        self.run(request).await;
        Ok(())
    }

    /// Analyze an uploaded file with `model_id`. On success, server-extracted
    /// text replaces the current text input.
    pub async fn submit_file(&self, model_id: &str, file: UploadFile) -> Result<(), ValidationError> {
        let request = self.validated(AnalyzeRequest::file(model_id, file, self.engine.as_str()))?;
        lock(&self.inner).model_id = model_id.to_string();
        self.run(request).await;
        Ok(())
    }

    fn validated(
        &self,
        request: Result<AnalyzeRequest, ValidationError>,
    ) -> Result<AnalyzeRequest, ValidationError> {
        request.map_err(|e| {
            warn!(error = %e, "Submit refused");
            lock(&self.inner).advisory = Some(e.to_string());
            e
        })
    }

    /// Abort the in-flight request, keeping inputs. No-op unless in flight.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if !inner.state.is_in_flight() {
            return;
        }
        inner.abandon_current();
        inner.state = RequestState::Cancelled;
        info!(generation = inner.generation, "Request cancelled");
    }

    /// Abort anything in flight and clear text, result, error and progress
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.abandon_current();
        inner.state = RequestState::Idle;
        inner.text.clear();
        inner.advisory = None;
        inner.progress = 0.0;
        debug!(generation = inner.generation, "Lifecycle reset");
    }

    async fn run(&self, request: AnalyzeRequest) {
        let (generation, token) = self.begin();
        info!(
            generation,
            model_id = %request.model_id,
            upload = request.is_upload(),
            backend = self.backend.name(),
            "Analyze request started"
        );

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            reply = self.backend.analyze(&request) => Some(reply),
        };

        match outcome {
            Some(reply) => self.finish(generation, request.is_upload(), reply),
            None => debug!(generation, "Request superseded before completion"),
        }
    }

    /// Idle/terminal -> InFlight. Supersedes the predecessor if there is one.
    fn begin(&self) -> (u64, CancellationToken) {
        let mut inner = lock(&self.inner);
        if inner.state.is_in_flight() {
            debug!(generation = inner.generation, "Superseding in-flight request");
        }
        inner.abandon_current();

        let generation = inner.generation;
        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        inner.state = RequestState::InFlight;
        inner.advisory = None;
        inner.progress = 0.0;
        inner.ticker = Some(self.spawn_ticker(generation));

        (generation, token)
    }

    fn spawn_ticker(&self, generation: u64) -> PeriodicTask {
        let weak = Arc::downgrade(&self.inner);
        let ceiling = self.ceiling;
        PeriodicTask::spawn("progress", self.tick, FirstTick::AfterPeriod, move || {
            let weak = weak.clone();
            async move { advance_progress(&weak, generation, ceiling) }
        })
    }

    fn finish(&self, generation: u64, upload: bool, reply: Result<HttpReply, ClientError>) {
        let mut inner = lock(&self.inner);
        if inner.generation != generation || !inner.state.is_in_flight() {
            debug!(generation, current = inner.generation, "Discarding stale response");
            return;
        }

        inner.cancel = None;
        inner.stop_ticker();

        let context = if upload { "Upload" } else { "Request" };
        let parsed = reply.and_then(|reply| {
            if reply.is_success() {
                reply.json::<Value>()
            } else {
                Err(ClientError::Status {
                    context,
                    status: reply.status,
                })
            }
        });

        match parsed {
            Ok(value) => {
                let result = AnalyzeResult::new(value);
                if upload {
                    if let Some(text) = result.extracted_text() {
                        inner.text = text;
                    }
                }
                inner.state = RequestState::Succeeded(result);
                inner.progress = 100.0;
                info!(generation, "Analyze request succeeded");
            }
            Err(e) => {
                warn!(generation, status = ?e.status(), error = %e, "Analyze request failed");
                inner.state = RequestState::Failed(e.to_string());
            }
        }
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        lock(&self.inner).abandon_current();
    }
}

/// Configured ceiling bounded to 0..=100; NaN and infinities fall back to the default
fn progress_ceiling(config: &ClientConfig) -> f64 {
    let ceiling = config.progress_ceiling;
    if ceiling.is_finite() {
        ceiling.clamp(0.0, 100.0)
    } else {
        warn!(ceiling, "Ignoring non-finite progress ceiling");
        crate::default_progress_ceiling()
    }
}

fn advance_progress(inner: &Weak<Mutex<Inner>>, generation: u64, ceiling: f64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = lock(&inner);
    if inner.generation != generation || !inner.state.is_in_flight() {
        return;
    }
    let step = rand::thread_rng().gen_range(PROGRESS_STEP);
    inner.progress = (inner.progress + step).min(ceiling).max(inner.progress);
}
