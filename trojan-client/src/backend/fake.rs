//! Scripted in-memory backend for tests

use super::{Backend, ClientError, HealthStatus, HttpReply, StatusSource};
use crate::request::AnalyzeRequest;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub(crate) type Scripted = Result<HttpReply, String>;

/// Analyze replies are handed out in call order. Each one is a oneshot receiver
/// so a test can decide when (and in which order) requests complete.
#[derive(Default)]
pub(crate) struct FakeBackend {
    analyze_queue: Mutex<VecDeque<oneshot::Receiver<Scripted>>>,
    analyze_calls: AtomicUsize,
    last_request: Mutex<Option<AnalyzeRequest>>,
    status_gates: Mutex<HashMap<StatusSource, VecDeque<oneshot::Receiver<Scripted>>>>,
    status_replies: Mutex<HashMap<StatusSource, Scripted>>,
    status_calls: Mutex<HashMap<StatusSource, usize>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an analyze reply that is released later through the returned sender
    pub(crate) fn gate_analyze(&self) -> oneshot::Sender<Scripted> {
        let (tx, rx) = oneshot::channel();
        self.analyze_queue.lock().unwrap().push_back(rx);
        tx
    }

    /// Queue an analyze reply that resolves immediately
    pub(crate) fn push_analyze(&self, reply: Scripted) {
        let tx = self.gate_analyze();
        let _ = tx.send(reply);
    }

    /// Hold the next status reply for `source` until the returned sender fires.
    /// Gated replies are used before the fixed one from `set_status`.
    pub(crate) fn gate_status(&self, source: StatusSource) -> oneshot::Sender<Scripted> {
        let (tx, rx) = oneshot::channel();
        self.status_gates
            .lock()
            .unwrap()
            .entry(source)
            .or_default()
            .push_back(rx);
        tx
    }

    pub(crate) fn set_status(&self, source: StatusSource, reply: Scripted) {
        self.status_replies.lock().unwrap().insert(source, reply);
    }

    pub(crate) fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<AnalyzeRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub(crate) fn status_calls(&self, source: StatusSource) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(&source)
            .copied()
            .unwrap_or(0)
    }
}

pub(crate) fn ok(body: &str) -> Scripted {
    Ok(HttpReply::new(200, body))
}

pub(crate) fn status(code: u16) -> Scripted {
    Ok(HttpReply::new(code, "{\"detail\": \"error\"}"))
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<HttpReply, ClientError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let next = self.analyze_queue.lock().unwrap().pop_front();
        let Some(rx) = next else {
            return Err(ClientError::Transport("no scripted reply".to_string()));
        };

        match rx.await {
            Ok(reply) => reply.map_err(ClientError::Transport),
            Err(_) => Err(ClientError::Transport("reply dropped".to_string())),
        }
    }

    async fn get_status(&self, source: StatusSource) -> Result<HttpReply, ClientError> {
        *self.status_calls.lock().unwrap().entry(source).or_insert(0) += 1;

        let gated = self
            .status_gates
            .lock()
            .unwrap()
            .get_mut(&source)
            .and_then(VecDeque::pop_front);
        if let Some(rx) = gated {
            return match rx.await {
                Ok(reply) => reply.map_err(ClientError::Transport),
                Err(_) => Err(ClientError::Transport("reply dropped".to_string())),
            };
        }

        let reply = self.status_replies.lock().unwrap().get(&source).cloned();
        match reply {
            Some(reply) => reply.map_err(ClientError::Transport),
            None => Ok(HttpReply::new(404, "")),
        }
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service: Some("fake".to_string()),
            latency_ms: Some(0),
            error: None,
        }
    }
}
