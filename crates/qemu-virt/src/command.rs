use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::trace;

/// Error from a failed command.
#[derive(Debug, thiserror::Error)]
#[error("command failed: {command}\n{detail}")]
pub struct CommandError {
    pub command: String,
    pub detail: String,
}

/// Format a human-readable display string for a direct command invocation.
///
/// Arguments containing whitespace or quotes are single-quoted so the preview
/// can be pasted back into a shell.
pub(crate) fn format_command_display(program: &OsStr, args: &[OsString]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(quote(&program.to_string_lossy()));
    parts.extend(args.iter().map(|a| quote(&a.to_string_lossy())));
    parts.join(" ")
}

fn quote(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '$' | '`' | '\\'));
    if needs_quotes {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.to_string()
    }
}

/// Execute a command and capture its output.
///
/// Returns trimmed stdout on success.
pub async fn exec(program: &OsStr, args: &[OsString]) -> Result<String, CommandError> {
    let cmd_display = format_command_display(program, args);
    trace!(command = %cmd_display, "exec");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| CommandError {
            command: cmd_display.clone(),
            detail: e.to_string(),
        })?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CommandError {
            command: cmd_display,
            detail: if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            },
        })
    }
}

/// Run a command in the foreground with stdin/stdout/stderr inherited.
///
/// Blocks until the child exits. Only a spawn failure is an error; the exit
/// status is returned as-is for the caller to interpret.
pub async fn run_inherited(program: &OsStr, args: &[OsString]) -> Result<ExitStatus, CommandError> {
    let cmd_display = format_command_display(program, args);
    trace!(command = %cmd_display, "run_inherited");

    Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| CommandError {
            command: cmd_display,
            detail: e.to_string(),
        })
}

/// Map an exit status to a process exit code, signals to 128 + signal number.
#[cfg(unix)]
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map(|sig| 128 + sig).unwrap_or(1))
}

#[cfg(not(unix))]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
