use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::wire;

/// One immutable output line. Its index in the transcript is its identity;
/// lines are never reordered or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub timestamp: OffsetDateTime,
    pub text: String,
}

/// Consistent copy-on-read view of the transcript. `sequence` always equals
/// the total line count at the instant the snapshot was taken.
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot {
    pub lines: Vec<TranscriptLine>,
    pub sequence: u64,
}

/// Append-only session transcript with a monotonic sequence counter.
///
/// The sequence number is defined as the line count, so advancing the
/// counter and publishing the lines are a single operation under the write
/// lock; readers can never observe one without the other. There is exactly
/// one instance per process, constructed empty at startup and handed by
/// `Arc` to the dispatch loop and the protocol handlers. Growth is
/// unbounded for the process lifetime (see DESIGN.md).
#[derive(Debug, Default)]
pub struct Transcript {
    lines: RwLock<Vec<TranscriptLine>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            lines: RwLock::new(Vec::new()),
        }
    }

    /// Atomically appends all `lines` and returns the resulting sequence
    /// number. Every line in one call becomes visible together, stamped
    /// with the same append-time wall clock.
    pub fn append<I>(&self, lines: I) -> u64
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let timestamp = OffsetDateTime::now_utc();
        let mut guard = self.lines.write();
        for text in lines {
            guard.push(TranscriptLine {
                timestamp,
                text: text.into(),
            });
        }
        guard.len() as u64
    }

    pub fn read_all(&self) -> TranscriptSnapshot {
        let guard = self.lines.read();
        TranscriptSnapshot {
            lines: guard.clone(),
            sequence: guard.len() as u64,
        }
    }

    /// Tail snapshot: the lines at index `sequence` and beyond. A caller
    /// that tracked an earlier sequence number gets exactly what it has not
    /// seen yet, under the same consistency guarantee as [`read_all`].
    ///
    /// [`read_all`]: Transcript::read_all
    pub fn read_from(&self, sequence: u64) -> TranscriptSnapshot {
        let guard = self.lines.read();
        let start = (sequence as usize).min(guard.len());
        TranscriptSnapshot {
            lines: guard[start..].to_vec(),
            sequence: guard.len() as u64,
        }
    }

    /// Cheap read of the counter alone. Never scans the log.
    pub fn current_sequence(&self) -> u64 {
        self.lines.read().len() as u64
    }

    /// Full transcript in wire form, lines joined by `\n`.
    pub fn render(&self) -> String {
        let guard = self.lines.read();
        let mut out = String::new();
        for (idx, line) in guard.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            out.push_str(&wire::render_line(line));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sequence_advances_by_exactly_the_appended_line_count() {
        let transcript = Transcript::new();
        assert_eq!(transcript.current_sequence(), 0);

        let seq = transcript.append(["one"]);
        assert_eq!(seq, 1);
        let seq = transcript.append(["two", "three"]);
        assert_eq!(seq, 3);
        assert_eq!(transcript.current_sequence(), 3);
    }

    #[test]
    fn read_all_sequence_matches_line_count() {
        let transcript = Transcript::new();
        transcript.append(["a", "b"]);

        let snapshot = transcript.read_all();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.lines.len() as u64, snapshot.sequence);
        assert_eq!(snapshot.lines[0].text, "a");
        assert_eq!(snapshot.lines[1].text, "b");
    }

    #[test]
    fn read_from_returns_only_the_unseen_tail() {
        let transcript = Transcript::new();
        transcript.append(["a", "b", "c"]);

        let tail = transcript.read_from(2);
        assert_eq!(tail.sequence, 3);
        assert_eq!(tail.lines.len(), 1);
        assert_eq!(tail.lines[0].text, "c");

        // Past-the-end cursors yield an empty tail, not a panic.
        let tail = transcript.read_from(10);
        assert!(tail.lines.is_empty());
        assert_eq!(tail.sequence, 3);
    }

    #[test]
    fn render_joins_lines_with_newlines() {
        let transcript = Transcript::new();
        assert_eq!(transcript.render(), "");

        transcript.append(["> echo hi", "hi"]);
        let rendered = transcript.render();
        let lines: Vec<&str> = rendered.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("> echo hi"));
        assert!(lines[1].ends_with(" hi"));
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_batch() {
        let transcript = Arc::new(Transcript::new());
        let writer = {
            let transcript = Arc::clone(&transcript);
            thread::spawn(move || {
                for i in 0..200 {
                    // Three-line batches; readers must only ever see whole ones.
                    transcript.append([
                        format!("batch {i} line 0"),
                        format!("batch {i} line 1"),
                        format!("batch {i} line 2"),
                    ]);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let transcript = Arc::clone(&transcript);
                thread::spawn(move || {
                    let mut last_seen = 0u64;
                    for _ in 0..500 {
                        let snapshot = transcript.read_all();
                        assert_eq!(snapshot.sequence, snapshot.lines.len() as u64);
                        assert_eq!(snapshot.sequence % 3, 0, "torn batch visible");
                        assert!(snapshot.sequence >= last_seen, "sequence went backwards");
                        last_seen = snapshot.sequence;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(transcript.current_sequence(), 600);
    }
}
