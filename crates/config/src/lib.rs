//! Configuration schema for the bridge daemon.

pub mod schema;

pub use schema::{
    GlobalConfig, MessagePingMode, ProjectConfig, ThreadCreationNotify, invite_url,
};

use secrecy::SecretString;

/// The stored Discord bot credential.
///
/// Wrapped so the token never lands in debug output or logs; the gateway
/// client exposes it only at connect time.
#[derive(Clone)]
pub struct BotToken(SecretString);

impl BotToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        use secrecy::ExposeSecret;
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BotToken(***)")
    }
}
