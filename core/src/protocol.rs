//! JSON payloads exchanged over the sync HTTP surface. Shared between the
//! server handlers and the polling client so the two sides cannot drift.

use serde::{Deserialize, Serialize};

/// `GET /status` — cheap liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub sequence: u64,
    pub ok: bool,
}

/// `GET /pollseq` — the lightweight poll check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSeqResponse {
    pub sequence: u64,
}

/// `POST /command` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
}

/// `POST /command` response: only the lines appended during this call,
/// newline-joined, plus the resulting sequence number and an RFC 3339
/// completion timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub out: String,
    pub seq: u64,
    pub ts: String,
}

/// JSON body carried by non-200 protocol responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_request_uses_the_cmd_field() {
        let request: CommandRequest = serde_json::from_str(r#"{"cmd":"calc 2+2"}"#).unwrap();
        assert_eq!(request.cmd, "calc 2+2");
    }

    #[test]
    fn status_response_shape() {
        let json = serde_json::to_value(StatusResponse {
            sequence: 7,
            ok: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"sequence": 7, "ok": true}));
    }
}
