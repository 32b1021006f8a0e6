//! Host-specific keystroke drivers.
//!
//! Each driver shells out to the platform's automation tool chain. The
//! clipboard is written through the tool's stdin so message content never
//! appears in a process argument list.

use std::process::Stdio;

use {
    async_trait::async_trait,
    threadmirror_common::{Error, Result},
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::debug,
};

use crate::KeystrokeDriver;

async fn run(mut command: Command, context: &'static str) -> Result<()> {
    debug!(context, "running automation command");
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::external(context, e))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_failure(context, &stderr))
}

async fn run_with_stdin(mut command: Command, input: &str, context: &'static str) -> Result<()> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::external(context, e))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| Error::external(context, e))?;
    }
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::external(context, e))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_failure(context, &stderr))
}

/// Deep link the IDE registers for jumping straight to a conversation;
/// dispatching it through the OS URL handler is the "open specific
/// conversation" command.
fn conversation_uri(conversation_id: &str) -> String {
    format!("cursor://composer/open?conversationId={conversation_id}")
}

fn classify_failure(context: &str, stderr: &str) -> Error {
    let lowered = stderr.to_lowercase();
    if lowered.contains("assistive access")
        || lowered.contains("not authorized")
        || lowered.contains("accessibility")
    {
        return Error::accessibility_denied(
            "the automation tool was refused keyboard access; grant Accessibility permission to \
             this process in the system privacy settings and retry",
        );
    }
    Error::invalid_input(format!("{context} failed: {}", stderr.trim()))
}

/// macOS: AppleScript via `osascript`, clipboard via `pbcopy`.
pub struct OsaScriptDriver;

#[async_trait]
impl KeystrokeDriver for OsaScriptDriver {
    async fn focus_window(&self, label: &str) -> Result<()> {
        let script = format!(
            r#"tell application "System Events"
                set procs to (every process whose name contains "Cursor")
                repeat with proc in procs
                    repeat with w in (every window of proc)
                        if name of w contains "{label}" then
                            set frontmost of proc to true
                            perform action "AXRaise" of w
                            return
                        end if
                    end repeat
                end repeat
            end tell"#,
            label = label.replace('"', "\\\"")
        );
        let mut command = Command::new("osascript");
        command.arg("-e").arg(script);
        run(command, "focus window").await
    }

    async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut command = Command::new("open");
        command.arg(conversation_uri(conversation_id));
        run(command, "open conversation").await
    }

    async fn focus_composer_input(&self) -> Result<()> {
        let mut command = Command::new("osascript");
        command
            .arg("-e")
            .arg(r#"tell application "System Events" to keystroke "i" using command down"#);
        run(command, "focus composer").await
    }

    async fn paste(&self, textual: &str) -> Result<()> {
        run_with_stdin(Command::new("pbcopy"), textual, "stage clipboard").await?;
        let mut command = Command::new("osascript");
        command
            .arg("-e")
            .arg(r#"tell application "System Events" to keystroke "v" using command down"#);
        run(command, "paste").await
    }

    async fn press_enter(&self) -> Result<()> {
        let mut command = Command::new("osascript");
        command
            .arg("-e")
            .arg(r#"tell application "System Events" to key code 36"#);
        run(command, "press enter").await
    }
}

/// Windows: PowerShell with `WScript.Shell` activation and `SendKeys`.
pub struct PowerShellDriver;

fn powershell(script: String) -> Command {
    let mut command = Command::new("powershell");
    command
        .arg("-NoProfile")
        .arg("-NonInteractive")
        .arg("-Command")
        .arg(script);
    command
}

#[async_trait]
impl KeystrokeDriver for PowerShellDriver {
    async fn focus_window(&self, label: &str) -> Result<()> {
        let escaped = label.replace('\'', "''");
        run(
            powershell(format!(
                "$shell = New-Object -ComObject WScript.Shell; \
                 if (-not $shell.AppActivate('{escaped}')) {{ exit 1 }}"
            )),
            "focus window",
        )
        .await
    }

    async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        let uri = conversation_uri(conversation_id).replace('\'', "''");
        run(
            powershell(format!("Start-Process '{uri}'")),
            "open conversation",
        )
        .await
    }

    async fn focus_composer_input(&self) -> Result<()> {
        run(
            powershell(
                "$shell = New-Object -ComObject WScript.Shell; $shell.SendKeys('^i')".to_string(),
            ),
            "focus composer",
        )
        .await
    }

    async fn paste(&self, textual: &str) -> Result<()> {
        run_with_stdin(
            powershell("$input | Set-Clipboard".to_string()),
            textual,
            "stage clipboard",
        )
        .await?;
        run(
            powershell(
                "$shell = New-Object -ComObject WScript.Shell; $shell.SendKeys('^v')".to_string(),
            ),
            "paste",
        )
        .await
    }

    async fn press_enter(&self) -> Result<()> {
        run(
            powershell(
                "$shell = New-Object -ComObject WScript.Shell; $shell.SendKeys('{ENTER}')"
                    .to_string(),
            ),
            "press enter",
        )
        .await
    }
}

/// Linux: `xdotool` for windows and keys, `xclip` for the clipboard.
pub struct XToolDriver;

#[async_trait]
impl KeystrokeDriver for XToolDriver {
    async fn focus_window(&self, label: &str) -> Result<()> {
        let mut command = Command::new("xdotool");
        command
            .arg("search")
            .arg("--name")
            .arg(label)
            .arg("windowactivate")
            .arg("--sync");
        run(command, "focus window").await
    }

    async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut command = Command::new("xdg-open");
        command.arg(conversation_uri(conversation_id));
        run(command, "open conversation").await
    }

    async fn focus_composer_input(&self) -> Result<()> {
        let mut command = Command::new("xdotool");
        command.arg("key").arg("ctrl+i");
        run(command, "focus composer").await
    }

    async fn paste(&self, textual: &str) -> Result<()> {
        let mut clip = Command::new("xclip");
        clip.arg("-selection").arg("clipboard");
        run_with_stdin(clip, textual, "stage clipboard").await?;
        let mut command = Command::new("xdotool");
        command.arg("key").arg("ctrl+v");
        run(command, "paste").await
    }

    async fn press_enter(&self) -> Result<()> {
        let mut command = Command::new("xdotool");
        command.arg("key").arg("Return");
        run(command, "press enter").await
    }
}

/// The driver for the host this daemon runs on.
#[must_use]
pub fn host_driver() -> Box<dyn KeystrokeDriver> {
    #[cfg(target_os = "macos")]
    {
        Box::new(OsaScriptDriver)
    }
    #[cfg(target_os = "windows")]
    {
        Box::new(PowerShellDriver)
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Box::new(XToolDriver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_uri_carries_the_id() {
        let uri = conversation_uri("bc-41f2");
        assert!(uri.starts_with("cursor://"));
        assert!(uri.ends_with("conversationId=bc-41f2"));
    }
}
