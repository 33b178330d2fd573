//! Model status polling with registry fallback

use crate::backend::{Backend, ClientError, HttpReply, StatusSource};
use crate::normalize::{any_available, normalize, ModelStatusRecord};
use crate::periodic::{FirstTick, PeriodicTask};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the status view shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBoard {
    pub records: Vec<ModelStatusRecord>,
    /// Latest poll error; the records are from the last good cycle
    pub error: Option<String>,
    /// At least one poll cycle is outstanding
    pub loading: bool,
    /// Completed poll cycles, good or bad
    pub cycles: u64,
    /// Cycles started but not yet finished; a timer tick can overlap `refresh`
    outstanding: usize,
}

impl StatusBoard {
    /// At-a-glance indicator: any model is up
    pub fn any_available(&self) -> bool {
        any_available(&self.records)
    }
}

fn lock(board: &Mutex<StatusBoard>) -> MutexGuard<'_, StatusBoard> {
    board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Polls the status endpoints while the status view is open
pub struct StatusPoller {
    backend: Arc<dyn Backend>,
    board: Arc<Mutex<StatusBoard>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            board: Arc::new(Mutex::new(StatusBoard::default())),
            task: Mutex::new(None),
        }
    }

    /// Poll now and then every `interval`. No-op if already polling.
    pub fn start(&self, interval: Duration) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().map(PeriodicTask::is_running).unwrap_or(false) {
            return;
        }

        let backend = Arc::clone(&self.backend);
        let board = Arc::clone(&self.board);
        info!(interval_ms = interval.as_millis() as u64, "Status polling started");
        *task = Some(PeriodicTask::spawn("status-poll", interval, FirstTick::Immediate, move || {
            let backend = Arc::clone(&backend);
            let board = Arc::clone(&board);
            async move { poll_once(backend.as_ref(), &board).await }
        }));
    }

    /// Stop polling. Idempotent.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mut running) = task.take() {
            running.stop();
            info!("Status polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(PeriodicTask::is_running)
            .unwrap_or(false)
    }

    /// Run one poll cycle now
    pub async fn refresh(&self) {
        poll_once(self.backend.as_ref(), &self.board).await;
    }

    pub fn board(&self) -> StatusBoard {
        lock(&self.board).clone()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_once(backend: &dyn Backend, board: &Mutex<StatusBoard>) {
    {
        let mut board = lock(board);
        board.outstanding += 1;
        board.loading = true;
        board.error = None;
    }

    let outcome = fetch_records(backend).await;

    let mut board = lock(board);
    match outcome {
        Ok(records) => {
            debug!(records = records.len(), "Status list replaced");
            board.records = records;
        }
        Err(e) => {
            warn!(error = %e, "Status poll failed; keeping previous list");
            board.error = Some(e.to_string());
        }
    }
    board.outstanding = board.outstanding.saturating_sub(1);
    board.loading = board.outstanding > 0;
    board.cycles += 1;
}

/// Primary first; the registry only when the primary answers non-2xx
async fn fetch_records(backend: &dyn Backend) -> Result<Vec<ModelStatusRecord>, ClientError> {
    let primary = fetch(backend, StatusSource::Primary).await?;

    let reply = if primary.is_success() {
        primary
    } else {
        debug!(status = primary.status, "Primary status endpoint failed, trying registry");
        let registry = fetch(backend, StatusSource::Registry).await?;
        if !registry.is_success() {
            return Err(ClientError::AggregatePoll {
                primary: primary.status,
                registry: registry.status,
            });
        }
        registry
    };

    let payload: Value = reply
        .json()
        .map_err(|e| ClientError::StatusLoad(Box::new(e)))?;
    Ok(normalize(&payload))
}

async fn fetch(backend: &dyn Backend, source: StatusSource) -> Result<HttpReply, ClientError> {
    backend
        .get_status(source)
        .await
        .map_err(|e| ClientError::StatusLoad(Box::new(e)))
}
