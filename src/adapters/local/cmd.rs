use async_trait::async_trait;
use std::io;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Runs a one-shot external tool to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn output(&self, program: &str, args: &[String]) -> io::Result<Output>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> io::Result<Output> {
        tracing::debug!(program, ?args, "running");
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// Last non-empty stderr lines, for error messages.
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let tail: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    tail[tail.len().saturating_sub(lines)..].join(" | ")
}
