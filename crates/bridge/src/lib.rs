//! The bridge control plane.
//!
//! Everything that makes the conversation↔thread mirroring correct lives
//! here: the gateway and conversation-source seams, thread orchestration,
//! the reconciliation tick loop, the name-sync watcher, and the
//! three-strategy resolver. Concrete Discord and IDE-storage adapters plug
//! in from their own crates.

pub mod gateway;
pub mod lifecycle;
pub mod name_sync;
pub mod pending;
pub mod resolver;
pub mod source;
pub mod threads;
pub mod watcher;

pub use {
    gateway::{
        ChannelInfo, ChatGateway, FilePayload, GuildInfo, QuestionOption, QuestionOutcome,
        QuestionRequest, QuestionResponseType, ThreadSnapshot,
    },
    lifecycle::{ArchiveClass, apply_archive_transition, classify_archive, note_inbound_activity},
    name_sync::NameSyncWatcher,
    pending::PendingComposer,
    resolver::{Resolution, ResolveMethod, ThreadResolver},
    source::{ConversationSource, RankedConversation},
    threads::ThreadService,
    watcher::{ChatWatcher, WatcherEvent},
};
