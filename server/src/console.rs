//! Line-oriented native console. Shares the session with remote clients:
//! input goes through the same dispatch loop, and output is mirrored from
//! the transcript on a short tick, so commands issued from a browser show
//! up here too. In-process it reads the transcript directly instead of
//! polling the HTTP surface.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tidepool_core::{wire, Transcript};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::debug;

use crate::dispatch::{Dispatcher, SubmitError};

const MIRROR_INTERVAL: Duration = Duration::from_millis(200);

/// Runs until stdin closes or the user types `exit`, then fires
/// `exit_notify` so the whole server can shut down gracefully once its
/// native terminal ends.
pub async fn run(transcript: Arc<Transcript>, dispatcher: Dispatcher, exit_notify: Arc<Notify>) {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(MIRROR_INTERVAL);
    let mut seen = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seen = mirror_new_lines(&transcript, seen);
            }
            line = input.next_line() => {
                match line {
                    Ok(Some(raw)) => {
                        let command = raw.trim().to_string();
                        if command.is_empty() {
                            continue;
                        }
                        if command == "exit" {
                            break;
                        }
                        // Submit without holding up the mirror tick; the
                        // echoed command and its output arrive through the
                        // transcript like everyone else's.
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            match dispatcher.submit(command).await {
                                Ok(_) => {}
                                Err(SubmitError::Busy) => {
                                    println!("(busy: a command is already running)");
                                }
                                Err(SubmitError::Closed) => {}
                            }
                        });
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(error = %err, "console input closed");
                        break;
                    }
                }
            }
        }
    }

    // Flush whatever landed before the console goes away.
    mirror_new_lines(&transcript, seen);
    debug!("console finished");
    exit_notify.notify_one();
}

fn mirror_new_lines(transcript: &Transcript, seen: u64) -> u64 {
    let snapshot = transcript.read_from(seen);
    if snapshot.lines.is_empty() {
        return snapshot.sequence;
    }
    let mut stdout = std::io::stdout().lock();
    for line in &snapshot.lines {
        let _ = writeln!(stdout, "{}", wire::render_line(line));
    }
    let _ = stdout.flush();
    snapshot.sequence
}
