//! The built-in shell: the domain logic layered on top of the dispatch
//! core, reached only through the [`CommandExecutor`] contract. Everything
//! here is workspace-safe and in-memory; nothing touches the filesystem.

mod calc;

pub use calc::CalcError;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tidepool_core::{CommandExecutor, ExecutionError};
use time::OffsetDateTime;

const HELP_TEXT: &str = "\
tidepool commands: (type 'help <cmd>' for details)
  help echo calc chat alias unalias clear
  time date uptime sysinfo updatesim";

/// Command set shipped with the server binary. Stateless apart from the
/// in-memory alias table and the process start time; safe to share across
/// dispatch workers.
pub struct BuiltinShell {
    started_at: Instant,
    aliases: Mutex<HashMap<String, String>>,
    install_step: Duration,
}

impl Default for BuiltinShell {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinShell {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            aliases: Mutex::new(HashMap::new()),
            install_step: Duration::from_millis(1500),
        }
    }

    /// Shortens the simulated install phases; used by tests.
    pub fn with_install_step(mut self, step: Duration) -> Self {
        self.install_step = step;
        self
    }

    fn expand_alias(&self, raw: &str) -> String {
        let mut parts = raw.splitn(2, char::is_whitespace);
        let Some(head) = parts.next() else {
            return raw.to_string();
        };
        let aliases = self.aliases.lock();
        match aliases.get(head) {
            Some(expansion) => match parts.next() {
                Some(rest) => format!("{expansion} {rest}"),
                None => expansion.clone(),
            },
            None => raw.to_string(),
        }
    }

    fn cmd_help(&self, args: &str) -> String {
        if args.is_empty() {
            return HELP_TEXT.to_string();
        }
        match args.split_whitespace().next().unwrap_or("") {
            "calc" => "calc <expression> - arithmetic with + - * / % ( )".to_string(),
            "alias" => "alias name=value - define a shorthand; alias alone lists them".to_string(),
            "unalias" => "unalias <name> - remove a shorthand".to_string(),
            "updatesim" => {
                "updatesim <pkg> - simulate updating/installing a package".to_string()
            }
            "clear" => "clear - clears your terminal view only; the session log keeps everything"
                .to_string(),
            other => format!("No detailed help for {other}"),
        }
    }

    fn cmd_calc(&self, args: &str) -> Result<String, ExecutionError> {
        if args.is_empty() {
            return Ok("Usage: calc <expression>".to_string());
        }
        match calc::eval(args) {
            Ok(value) => Ok(calc::format_value(value)),
            Err(err) => Err(ExecutionError::new(err.to_string())),
        }
    }

    fn cmd_chat(&self, args: &str) -> String {
        if args.is_empty() {
            return "Usage: chat <text>".to_string();
        }
        let text = args.to_ascii_lowercase();
        if text.contains("hello") || text.contains("hi") {
            "Hello from tidepool!".to_string()
        } else if text.contains("how are") {
            "I am code; ready.".to_string()
        } else {
            "Tell me more.".to_string()
        }
    }

    fn cmd_alias(&self, args: &str) -> String {
        if args.is_empty() {
            let aliases = self.aliases.lock();
            if aliases.is_empty() {
                return "(no aliases)".to_string();
            }
            let mut entries: Vec<String> = aliases
                .iter()
                .map(|(name, value)| format!("{name} -> {value}"))
                .collect();
            entries.sort();
            return entries.join("\n");
        }
        let Some((name, value)) = args.split_once('=') else {
            return "Usage: alias name=value".to_string();
        };
        let name = name.trim().to_string();
        let value = value.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        if name.is_empty() || value.is_empty() {
            return "Usage: alias name=value".to_string();
        }
        let mut aliases = self.aliases.lock();
        let reply = format!("Alias set: {name} -> {value}");
        aliases.insert(name, value);
        reply
    }

    fn cmd_unalias(&self, args: &str) -> String {
        let Some(name) = args.split_whitespace().next() else {
            return "Usage: unalias <name>".to_string();
        };
        let mut aliases = self.aliases.lock();
        if aliases.remove(name).is_some() {
            format!("Removed alias {name}")
        } else {
            "Alias not found".to_string()
        }
    }

    fn cmd_sysinfo(&self) -> String {
        format!(
            "platform: {}\narch: {}\npid: {}\nuptime_s: {}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::process::id(),
            self.started_at.elapsed().as_secs()
        )
    }

    fn cmd_updatesim(&self, args: &str) -> String {
        let Some(pkg) = args.split_whitespace().next() else {
            return "Usage: updatesim <pkg>".to_string();
        };
        // Deliberately slow: each phase sleeps, so the whole install usually
        // outlives the dispatch soft timeout and its log reaches the
        // transcript only when the simulated install finishes.
        let mut log = vec![format!("Starting simulated update: {pkg}")];
        std::thread::sleep(self.install_step);
        log.push(format!("Installing {pkg}..."));
        std::thread::sleep(self.install_step);
        log.push(format!("Finished updating {pkg}"));
        log.join("\n")
    }
}

impl CommandExecutor for BuiltinShell {
    fn execute(&self, command: &str) -> Result<String, ExecutionError> {
        let raw = command.trim();
        if raw.is_empty() {
            return Ok(String::new());
        }
        let expanded = self.expand_alias(raw);
        let (head, args) = match expanded.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (expanded.as_str(), ""),
        };

        let output = match head.to_ascii_lowercase().as_str() {
            "help" => self.cmd_help(args),
            "echo" => args.to_string(),
            "calc" => return self.cmd_calc(args),
            "chat" => self.cmd_chat(args),
            "alias" => self.cmd_alias(args),
            "unalias" => self.cmd_unalias(args),
            // Client-local, cosmetic only; the transcript is append-only.
            "clear" => String::new(),
            "time" => {
                let now = OffsetDateTime::now_utc();
                format!("{:02}:{:02}:{:02} UTC", now.hour(), now.minute(), now.second())
            }
            "date" => {
                let now = OffsetDateTime::now_utc();
                format!("{:04}-{:02}-{:02}", now.year(), now.month() as u8, now.day())
            }
            "uptime" => format!("Uptime: {}s", self.started_at.elapsed().as_secs()),
            "sysinfo" => self.cmd_sysinfo(),
            "updatesim" => self.cmd_updatesim(args),
            other => format!("Unknown command: {other}. Type 'help'."),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_answers_through_the_executor_contract() {
        let shell = BuiltinShell::new();
        assert_eq!(shell.execute("calc 2+2").unwrap(), "4");
        assert_eq!(shell.execute("calc (1+2)*3").unwrap(), "9");
    }

    #[test]
    fn calc_failures_surface_as_execution_errors() {
        let shell = BuiltinShell::new();
        let err = shell.execute("calc 1/0").unwrap_err();
        assert!(err.message.contains("division by zero"));
        let err = shell.execute("calc 2+x").unwrap_err();
        assert!(err.message.contains("invalid characters"));
    }

    #[test]
    fn aliases_expand_and_can_be_removed() {
        let shell = BuiltinShell::new();
        shell.execute("alias c=calc").unwrap();
        assert_eq!(shell.execute("c 40+2").unwrap(), "42");
        assert_eq!(shell.execute("unalias c").unwrap(), "Removed alias c");
        assert!(shell.execute("c 1").unwrap().starts_with("Unknown command"));
    }

    #[test]
    fn unknown_commands_point_at_help() {
        let shell = BuiltinShell::new();
        assert_eq!(
            shell.execute("frobnicate").unwrap(),
            "Unknown command: frobnicate. Type 'help'."
        );
    }

    #[test]
    fn clear_produces_no_output_lines() {
        let shell = BuiltinShell::new();
        assert_eq!(shell.execute("clear").unwrap(), "");
        assert_eq!(shell.execute("").unwrap(), "");
    }

    #[test]
    fn updatesim_returns_the_full_install_log() {
        let shell = BuiltinShell::new().with_install_step(Duration::from_millis(1));
        let log = shell.execute("updatesim ripgrep").unwrap();
        let lines: Vec<&str> = log.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Starting simulated update: ripgrep");
        assert_eq!(lines[2], "Finished updating ripgrep");
    }

    #[test]
    fn echo_returns_its_arguments() {
        let shell = BuiltinShell::new();
        assert_eq!(shell.execute("echo hello world").unwrap(), "hello world");
        assert_eq!(shell.execute("ECHO shouty").unwrap(), "shouty");
    }
}
