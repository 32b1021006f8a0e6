//! Serenity-backed Discord gateway for the bridge daemon.

pub mod client;
pub mod errors;
pub mod handler;
pub mod ping;
pub mod questions;
pub mod sink;
pub mod typing;

pub use {
    client::{DiscordGateway, PermissionReport},
    questions::InteractionManager,
    sink::InboundSink,
    typing::TypingManager,
};
