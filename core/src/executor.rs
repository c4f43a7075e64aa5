use thiserror::Error;

/// Capability the dispatch loop needs from the surrounding shell logic:
/// turn a command line into output text. Implementations may block for
/// arbitrary wall-clock time and know nothing about the transcript or
/// sequence numbers.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str) -> Result<String, ExecutionError>;
}

/// Failure reported by an executor adapter. Recovered locally by the
/// dispatch loop, which renders it as an error-tagged transcript line and
/// keeps serving.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Plain functions and closures work as executors, which keeps test
/// doubles short.
impl<F> CommandExecutor for F
where
    F: Fn(&str) -> Result<String, ExecutionError> + Send + Sync,
{
    fn execute(&self, command: &str) -> Result<String, ExecutionError> {
        self(command)
    }
}
