//! Reference polling client for the tidepool sync protocol. Keeps a local
//! cursor (`last_seen_sequence`), asks the server for the cheap sequence
//! number on a timer, and fetches the transcript only when it advanced —
//! returning exactly the unseen tail, so already-rendered lines are never
//! fetched twice. All state here is client-local; the server knows nothing
//! about any particular client. Clearing a view is likewise a local,
//! cosmetic action of whatever renders these lines; the protocol offers no
//! way to truncate the transcript.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tidepool_core::{wire, CommandRequest, CommandResponse, PollSeqResponse, StatusResponse};
use tracing::{debug, warn};

/// Poll cadence used by [`PollingClient::run`] unless the caller picks one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

const CONNECT_ATTEMPTS: u32 = 5;
const BACKOFF_START: Duration = Duration::from_millis(250);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error("server is busy; retry once the current command finishes")]
    Busy,
    #[error("could not reach the server after {attempts} attempts")]
    Disconnected { attempts: u32 },
}

/// Client-local sync state, never shared with the server.
#[derive(Debug, Clone, Default)]
pub struct ClientSyncState {
    pub last_seen_sequence: u64,
    /// Submitted commands, most recent first.
    pub local_history: Vec<String>,
    /// Recall position inside `local_history`; `None` when not recalling.
    pub history_cursor: Option<usize>,
}

/// Result of a submitted command, ready for optimistic rendering.
#[derive(Debug, Clone)]
pub struct SubmittedCommand {
    /// Echo body for immediate local rendering. A poll tick racing the
    /// command may have fetched the server-side echo already; whether to
    /// suppress the optimistic copy is the renderer's call.
    pub echo: String,
    /// Output lines produced by this command alone.
    pub output_lines: Vec<String>,
    pub sequence: u64,
}

pub struct PollingClient {
    http: reqwest::Client,
    base_url: String,
    state: ClientSyncState,
}

impl PollingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            state: ClientSyncState::default(),
        }
    }

    pub fn state(&self) -> &ClientSyncState {
        &self.state
    }

    pub fn last_seen_sequence(&self) -> u64 {
        self.state.last_seen_sequence
    }

    /// Establishes the session view: probes `/status` with bounded retries
    /// and doubling backoff, then fetches the transcript that already
    /// exists and positions the cursor after it. Returns those initial
    /// lines for rendering.
    pub async fn connect(&mut self) -> Result<Vec<String>, ClientError> {
        self.probe_with_backoff().await?;
        let lines = self.fetch_output().await?;
        self.state.last_seen_sequence = lines.len() as u64;
        Ok(lines)
    }

    /// One poll tick. Fetches the transcript only when the sequence
    /// advanced; returns the lines beyond the previous cursor.
    pub async fn poll(&mut self) -> Result<Vec<String>, ClientError> {
        let response = self.http.get(self.url("/pollseq")).send().await?;
        let response = ok_or_status(response)?;
        let poll: PollSeqResponse = response.json().await?;
        if poll.sequence <= self.state.last_seen_sequence {
            return Ok(Vec::new());
        }

        let lines = self.fetch_output().await?;
        let (fresh, sequence) = unseen_tail(lines, self.state.last_seen_sequence);
        self.state.last_seen_sequence = sequence;
        Ok(fresh)
    }

    /// Submits a command, records it in the local history, and advances the
    /// cursor past the lines this command appended so the next poll does
    /// not re-deliver them.
    pub async fn submit(&mut self, command: &str) -> Result<SubmittedCommand, ClientError> {
        self.state.local_history.insert(0, command.to_string());
        self.state.history_cursor = None;

        let response = self
            .http
            .post(self.url("/command"))
            .json(&CommandRequest {
                cmd: command.to_string(),
            })
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::Busy);
        }
        let response = ok_or_status(response)?;
        let reply: CommandResponse = response.json().await?;

        // A concurrent poll tick may already have advanced the cursor past
        // this command's lines; never move it backwards.
        if reply.seq > self.state.last_seen_sequence {
            self.state.last_seen_sequence = reply.seq;
        }

        let output_lines = if reply.out.is_empty() {
            Vec::new()
        } else {
            reply.out.split('\n').map(str::to_owned).collect()
        };
        Ok(SubmittedCommand {
            echo: wire::echo_line(command),
            output_lines,
            sequence: reply.seq,
        })
    }

    /// Steps back through the history (most recent first).
    pub fn history_prev(&mut self) -> Option<&str> {
        if self.state.local_history.is_empty() {
            return None;
        }
        let next = match self.state.history_cursor {
            None => 0,
            Some(idx) => (idx + 1).min(self.state.local_history.len() - 1),
        };
        self.state.history_cursor = Some(next);
        Some(&self.state.local_history[next])
    }

    /// Steps forward again; leaving the newest entry ends recall.
    pub fn history_next(&mut self) -> Option<&str> {
        match self.state.history_cursor {
            None | Some(0) => {
                self.state.history_cursor = None;
                None
            }
            Some(idx) => {
                self.state.history_cursor = Some(idx - 1);
                Some(&self.state.local_history[idx - 1])
            }
        }
    }

    /// Polls forever at `interval`, handing fresh lines to `render`.
    /// Transient transport failures flip the client into a reconnect probe
    /// with backoff; the cursor survives, so rendering resumes exactly
    /// where it stopped. Returns only once reconnection gives up.
    pub async fn run<F>(&mut self, interval: Duration, mut render: F) -> Result<(), ClientError>
    where
        F: FnMut(&[String]),
    {
        let initial = self.connect().await?;
        if !initial.is_empty() {
            render(&initial);
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.poll().await {
                Ok(lines) => {
                    if !lines.is_empty() {
                        render(&lines);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "poll failed; reconnecting");
                    self.probe_with_backoff().await?;
                }
            }
        }
    }

    async fn probe_with_backoff(&self) -> Result<(), ClientError> {
        let mut backoff = BACKOFF_START;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.get_status().await {
                Ok(status) if status.ok => {
                    debug!(sequence = status.sequence, attempt, "server reachable");
                    return Ok(());
                }
                Ok(_) => warn!(attempt, "server answered but reported not ok"),
                Err(err) => warn!(attempt, error = %err, "status probe failed"),
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
        Err(ClientError::Disconnected {
            attempts: CONNECT_ATTEMPTS,
        })
    }

    async fn get_status(&self) -> Result<StatusResponse, ClientError> {
        let response = self.http.get(self.url("/status")).send().await?;
        let response = ok_or_status(response)?;
        Ok(response.json().await?)
    }

    async fn fetch_output(&self) -> Result<Vec<String>, ClientError> {
        let response = self.http.get(self.url("/output")).send().await?;
        let response = ok_or_status(response)?;
        let body = response.text().await?;
        if body.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(body.split('\n').map(str::to_owned).collect())
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn ok_or_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status(response.status()))
    }
}

// Tail of `lines` beyond the `seen` cursor, plus the new cursor position.
// A shrunken transcript means the server restarted; the cursor snaps back
// so the next polls resync instead of stalling.
fn unseen_tail(lines: Vec<String>, seen: u64) -> (Vec<String>, u64) {
    let total = lines.len() as u64;
    if total <= seen {
        return (Vec::new(), total);
    }
    let fresh = lines[seen as usize..].to_vec();
    (fresh, total)
}
