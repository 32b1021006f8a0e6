//! Keystroke actuation: delivering chat text into the IDE conversation.
//!
//! The injection itself hides behind [`KeystrokeDriver`], with one concrete
//! driver per host OS. The [`Actuator`] owns the sequencing and the settling
//! delays between steps; the clipboard is overwritten and not restored.

pub mod directive;
pub mod platform;

use std::time::Duration;

use {
    async_trait::async_trait,
    threadmirror_common::Result,
    tracing::{debug, info},
};

pub use platform::{OsaScriptDriver, PowerShellDriver, XToolDriver, host_driver};

/// Minimal capability set for keystroke injection.
#[async_trait]
pub trait KeystrokeDriver: Send + Sync {
    /// Bring the IDE window whose title carries `label` to the front.
    async fn focus_window(&self, label: &str) -> Result<()>;

    /// Switch the focused IDE window to the given conversation.
    async fn open_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Put the caret into the agent composer input.
    async fn focus_composer_input(&self) -> Result<()>;

    /// Stage `text` on the clipboard and issue the paste chord.
    async fn paste(&self, text: &str) -> Result<()>;

    async fn press_enter(&self) -> Result<()>;
}

/// Settling delays between injection steps; UI state needs time to catch
/// up after focus changes and pastes.
const FOCUS_SETTLE: Duration = Duration::from_millis(400);
const OPEN_SETTLE: Duration = Duration::from_millis(300);
const COMPOSER_SETTLE: Duration = Duration::from_millis(100);
const PASTE_SETTLE: Duration = Duration::from_millis(150);

/// Turns an inbound chat message into an IDE agent turn.
pub struct Actuator {
    driver: Box<dyn KeystrokeDriver>,
    workspace_label: String,
}

impl Actuator {
    #[must_use]
    pub fn new(driver: Box<dyn KeystrokeDriver>, workspace_label: impl Into<String>) -> Self {
        Self {
            driver,
            workspace_label: workspace_label.into(),
        }
    }

    /// Host-default actuator for a workspace.
    #[must_use]
    pub fn for_host(workspace_label: impl Into<String>) -> Self {
        Self::new(host_driver(), workspace_label)
    }

    /// Deliver `text` into its conversation: focus the workspace window,
    /// open the owning conversation, focus the composer input, paste the
    /// staged message (with its thread directive), press Enter.
    ///
    /// Opening the conversation first is what keeps the paste out of
    /// whatever conversation the user happens to have on screen.
    pub async fn deliver(
        &self,
        conversation_id: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<()> {
        let staged = directive::compose(text, thread_id);
        debug!(
            conversation_id = %conversation_id,
            label = %self.workspace_label,
            "injecting message into IDE"
        );

        self.driver.focus_window(&self.workspace_label).await?;
        tokio::time::sleep(FOCUS_SETTLE).await;
        self.driver.open_conversation(conversation_id).await?;
        tokio::time::sleep(OPEN_SETTLE).await;
        self.driver.focus_composer_input().await?;
        tokio::time::sleep(COMPOSER_SETTLE).await;
        self.driver.paste(&staged).await?;
        tokio::time::sleep(PASTE_SETTLE).await;
        self.driver.press_enter().await?;

        info!(conversation_id = %conversation_id, "message delivered to IDE");
        Ok(())
    }
}
