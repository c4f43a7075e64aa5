//! Shared primitives for the tidepool shared-terminal session: the
//! append-only transcript log, the plain-text line convention spoken on the
//! wire, the executor-adapter contract, and the JSON payloads exchanged by
//! the sync server and its polling clients. Keeping these in one leaf crate
//! keeps the server and the client implementations in sync without copying
//! message shapes across crates.

mod executor;
mod protocol;
mod transcript;
pub mod wire;

pub use executor::{CommandExecutor, ExecutionError};
pub use protocol::{
    CommandRequest, CommandResponse, ErrorResponse, PollSeqResponse, StatusResponse,
};
pub use transcript::{Transcript, TranscriptLine, TranscriptSnapshot};
