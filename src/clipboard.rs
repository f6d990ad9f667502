use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::session::Clipboard;

/// Clipboard capability backed by an external command (`xclip`, `wl-copy`,
/// `pbcopy`). The text is piped through stdin; a non-zero exit is a failure
/// the session controller downgrades to its transient indicator.
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    /// Parses a command line such as `"xclip -selection clipboard"`.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .context("Clipboard command must not be empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Platform default used when no command is configured.
    pub fn platform_default() -> Self {
        let command = if cfg!(target_os = "macos") {
            "pbcopy"
        } else {
            "xclip -selection clipboard"
        };
        Self::new(command).expect("default clipboard command is non-empty")
    }
}

impl Clipboard for CommandClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        debug!("Copying {} bytes via {}", text.len(), self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn clipboard command {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Clipboard command has no stdin")?;
        stdin
            .write_all(text.as_bytes())
            .await
            .context("Failed to write to clipboard command")?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .context("Failed to wait for clipboard command")?;
        if !status.success() {
            bail!("Clipboard command exited with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_parsing() {
        let clipboard = CommandClipboard::new("xclip -selection clipboard").expect("parses");
        assert_eq!(clipboard.program, "xclip");
        assert_eq!(clipboard.args, ["-selection", "clipboard"]);

        assert!(CommandClipboard::new("   ").is_err());
    }

    #[tokio::test]
    async fn failed_command_reports_an_error() {
        let clipboard = CommandClipboard::new("false").expect("parses");
        assert!(clipboard.write_text("GABC").await.is_err());
    }

    #[tokio::test]
    async fn missing_command_reports_an_error() {
        let clipboard = CommandClipboard::new("definitely-not-a-real-binary").expect("parses");
        assert!(clipboard.write_text("GABC").await.is_err());
    }
}
