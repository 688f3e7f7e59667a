//! Pending runs, keyed by run id.
//!
//! `start` only records what to execute. The first `stream` takes the run
//! out of the table and spawns it; the run then goes to completion whether
//! or not anyone keeps reading. A run id can be streamed once.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use switchboard_core::error::{Result, RunError};
use switchboard_core::message::Message;

use crate::stream_event::{EventSink, ProtocolEvent};

/// What a run's job gets to work with.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub thread_id: String,
    pub events: EventSink,
}

/// The deferred work behind a run.
pub type RunJob = Box<dyn FnOnce(RunContext) -> BoxFuture<'static, Result<Message>> + Send>;

/// The ordered events of one run.
pub type RunStream = UnboundedReceiverStream<ProtocolEvent>;

/// Identifiers handed back by [`RunTable::start`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartedRun {
    pub run_id: String,
    pub thread_id: String,
}

struct PendingRun {
    thread_id: String,
    job: RunJob,
    created_at: Instant,
}

pub struct RunTable {
    runs: Mutex<HashMap<String, PendingRun>>,
    ttl: Duration,
}

impl RunTable {
    /// Runs not streamed within `ttl` are dropped.
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a run. Ids are generated when not supplied.
    pub async fn start(
        &self,
        run_id: Option<String>,
        thread_id: Option<String>,
        job: RunJob,
    ) -> std::result::Result<StartedRun, RunError> {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut runs = self.runs.lock().await;
        if runs.contains_key(&run_id) {
            return Err(RunError::Duplicate(run_id));
        }
        runs.insert(
            run_id.clone(),
            PendingRun {
                thread_id: thread_id.clone(),
                job,
                created_at: Instant::now(),
            },
        );
        debug!(run_id = %run_id, thread_id = %thread_id, pending = runs.len(), "Run started");
        Ok(StartedRun { run_id, thread_id })
    }

    /// Take the run out of the table and start producing its events.
    pub async fn stream(&self, run_id: &str) -> std::result::Result<RunStream, RunError> {
        let run = self
            .runs
            .lock()
            .await
            .remove(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        if run.created_at.elapsed() > self.ttl {
            debug!(run_id, "Run expired before it was streamed");
            return Err(RunError::NotFound(run_id.to_string()));
        }

        let (events, rx) = EventSink::channel();
        let context = RunContext {
            run_id: run_id.to_string(),
            thread_id: run.thread_id,
            events,
        };
        tokio::spawn(execute(context, run.job));
        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Drop runs older than the TTL. Returns how many were dropped.
    pub async fn reap_expired(&self) -> usize {
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        runs.retain(|_, run| run.created_at.elapsed() <= self.ttl);
        before - runs.len()
    }

    pub async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.lock().await.is_empty()
    }

    /// Periodically reap expired runs.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = table.reap_expired().await;
                if reaped > 0 {
                    info!(reaped, "Reaped runs that were never streamed");
                }
            }
        })
    }
}

/// Run the job between RUN_STARTED and RUN_FINISHED. RUN_FINISHED is
/// always sent, carrying the error if the job failed or panicked.
async fn execute(context: RunContext, job: RunJob) {
    let events = context.events.clone();
    let (run_id, thread_id) = (context.run_id.clone(), context.thread_id.clone());
    events.emit(ProtocolEvent::RunStarted {
        thread_id: thread_id.clone(),
        run_id: run_id.clone(),
    });
    info!(run_id = %run_id, thread_id = %thread_id, "Run executing");

    let error = match AssertUnwindSafe(job(context)).catch_unwind().await {
        Ok(Ok(message)) => {
            info!(run_id = %run_id, chars = message.content.len(), "Run finished");
            None
        }
        Ok(Err(e)) => {
            error!(run_id = %run_id, error = %e, "Run failed");
            Some(e.to_string())
        }
        Err(_) => {
            error!(run_id = %run_id, "Run panicked");
            Some("run task panicked".to_string())
        }
    };

    events.emit(ProtocolEvent::RunFinished {
        thread_id,
        run_id,
        error,
    });
}
