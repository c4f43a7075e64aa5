//! The plain-text line convention spoken between the server and every
//! renderer (browser, console, debug tooling). There is no structured field
//! per line; clients recognize the fixed patterns below, so the rendered
//! byte layout is part of the wire contract:
//!
//! - every rendered line is prefixed `[HH:MM:SS] ` (UTC, 24-hour);
//! - a body starting with `> ` is an echoed command;
//! - a body matching case-insensitive `error` is rendered as an error.
//!
//! Bump [`WIRE_VERSION`] if any of these patterns change.

use crate::transcript::TranscriptLine;

/// Version of the line-tagging convention described in the module docs.
pub const WIRE_VERSION: u16 = 1;

/// Prefix marking an echoed command body.
pub const COMMAND_ECHO_PREFIX: &str = "> ";

/// How a renderer should treat a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    CommandEcho,
    Error,
    Output,
}

/// A wire line split back into its fixed-pattern parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    /// The `HH:MM:SS` portion, when the line carries the timestamp prefix.
    pub timestamp: Option<&'a str>,
    /// The line text with the timestamp prefix stripped.
    pub body: &'a str,
    pub kind: LineKind,
}

/// Renders one transcript line in wire form.
pub fn render_line(line: &TranscriptLine) -> String {
    format!(
        "[{:02}:{:02}:{:02}] {}",
        line.timestamp.hour(),
        line.timestamp.minute(),
        line.timestamp.second(),
        line.text
    )
}

/// Builds the echo body for a submitted command.
pub fn echo_line(command: &str) -> String {
    format!("{COMMAND_ECHO_PREFIX}{command}")
}

/// Splits a wire line into timestamp and body and classifies it. Accepts
/// bodies without the timestamp prefix as well, since the convention makes
/// the prefix optional.
pub fn parse_line(raw: &str) -> ParsedLine<'_> {
    let (timestamp, body) = match split_timestamp(raw) {
        Some((ts, rest)) => (Some(ts), rest),
        None => (None, raw),
    };
    ParsedLine {
        timestamp,
        body,
        kind: classify(body),
    }
}

fn classify(body: &str) -> LineKind {
    if body.starts_with(COMMAND_ECHO_PREFIX) {
        LineKind::CommandEcho
    } else if contains_ignore_case(body, "error") {
        LineKind::Error
    } else {
        LineKind::Output
    }
}

// Matches exactly "[HH:MM:SS] ".
fn split_timestamp(raw: &str) -> Option<(&str, &str)> {
    let bytes = raw.as_bytes();
    if bytes.len() < 11 || bytes[0] != b'[' || bytes[9] != b']' || bytes[10] != b' ' {
        return None;
    }
    for (idx, byte) in bytes[1..9].iter().enumerate() {
        let expects_colon = idx == 2 || idx == 5;
        if expects_colon != (*byte == b':') {
            return None;
        }
        if !expects_colon && !byte.is_ascii_digit() {
            return None;
        }
    }
    Some((&raw[1..9], &raw[11..]))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
