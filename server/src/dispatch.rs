//! Serialized command dispatch. Submissions from the console and the HTTP
//! surface funnel through one bounded FIFO queue into a single worker task,
//! so at most one command executes against the adapter at any instant and
//! transcript output from different commands never interleaves.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tidepool_core::{wire, CommandExecutor, ExecutionError, Transcript};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Queued submissions beyond this depth are rejected as busy.
    pub queue_depth: usize,
    /// Soft timeout after which the submitting caller is released while the
    /// adapter keeps running.
    pub soft_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_depth: 8,
            soft_timeout: Duration::from_secs(30),
        }
    }
}

/// What a completed (or soft-timed-out) submission hands back to its caller.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Only the lines appended on behalf of this call, excluding the echo.
    pub lines: Vec<String>,
    /// Transcript sequence after those lines landed.
    pub sequence: u64,
    pub completed_at: OffsetDateTime,
}

impl CommandOutput {
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The FIFO queue is full. The transcript was not touched.
    #[error("command queue is full")]
    Busy,
    /// The worker is gone; only happens while the process shuts down.
    #[error("dispatcher is no longer running")]
    Closed,
}

struct Job {
    command: String,
    reply: oneshot::Sender<CommandOutput>,
}

/// Handle for submitting commands. Cloneable; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Spawns the worker task and returns the submission handle. The
    /// transcript is the process-wide log shared with the protocol
    /// handlers; the dispatcher is its only writer.
    pub fn spawn(
        transcript: Arc<Transcript>,
        executor: Arc<dyn CommandExecutor>,
        config: DispatchConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let worker = tokio::spawn(run_worker(rx, transcript, executor, config.soft_timeout));
        (Self { tx }, worker)
    }

    /// Submits a command and waits for its outcome. FIFO with one command
    /// in flight; a full queue answers [`SubmitError::Busy`] immediately.
    pub async fn submit(&self, command: impl Into<String>) -> Result<CommandOutput, SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            command: command.into(),
            reply: reply_tx,
        };
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Busy,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })?;
        reply_rx.await.map_err(|_| SubmitError::Closed)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Job>,
    transcript: Arc<Transcript>,
    executor: Arc<dyn CommandExecutor>,
    soft_timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        run_job(job, &transcript, &executor, soft_timeout).await;
    }
    debug!("dispatch worker stopped");
}

async fn run_job(
    job: Job,
    transcript: &Arc<Transcript>,
    executor: &Arc<dyn CommandExecutor>,
    soft_timeout: Duration,
) {
    let Job { command, reply } = job;

    // Phase (a): echo the command before running it, so a concurrent poller
    // sees it even while the result is still pending.
    transcript.append([wire::echo_line(&command)]);

    let adapter = Arc::clone(executor);
    let input = command.clone();
    let mut pending = tokio::task::spawn_blocking(move || adapter.execute(&input));

    match tokio::time::timeout(soft_timeout, &mut pending).await {
        Ok(joined) => {
            let output = append_result(transcript, joined);
            let _ = reply.send(output);
        }
        Err(_) => {
            warn!(
                command = %command,
                timeout_secs = soft_timeout.as_secs(),
                "command exceeded soft timeout; releasing caller"
            );
            let notice = format!("{command}: still running, output will follow");
            let sequence = transcript.append([notice.clone()]);
            let _ = reply.send(CommandOutput {
                lines: vec![notice],
                sequence,
                completed_at: OffsetDateTime::now_utc(),
            });
            // The adapter is not cancelled. Its eventual output still lands
            // in the transcript, and the worker holds here so no other
            // command starts until it does.
            append_result(transcript, pending.await);
        }
    }
}

// Phase (b): flatten the adapter outcome into transcript lines. Adapter
// failures become a single error-tagged line; the loop always returns to
// idle.
fn append_result(
    transcript: &Transcript,
    joined: Result<Result<String, ExecutionError>, JoinError>,
) -> CommandOutput {
    let lines: Vec<String> = match joined {
        Ok(Ok(output)) => output.lines().map(str::to_owned).collect(),
        Ok(Err(err)) => vec![format!("Error: {err}")],
        Err(join_err) => {
            error!(error = %join_err, "executor task aborted");
            vec![format!("Error: executor task aborted: {join_err}")]
        }
    };
    let sequence = if lines.is_empty() {
        transcript.current_sequence()
    } else {
        transcript.append(lines.iter().cloned())
    };
    CommandOutput {
        lines,
        sequence,
        completed_at: OffsetDateTime::now_utc(),
    }
}
