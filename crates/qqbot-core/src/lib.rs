//! # QQBot Core
//!
//! Shared building blocks for the qqbot crates:
//!
//! - [`Envelope`], [`Message`] and [`Segment`]: the inbound message model
//! - [`MessageArchive`]: message archival by id, in memory ([`MemoryArchive`])
//!   or in a database file ([`FileArchive`])
//! - [`Bot`]: the facade handlers use to reply and look messages up
//! - [`GatewayApi`]: the chat gateway's HTTP API
//! - [`EventSink`]: the seam between a transport and the runtime
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  qqbot (apps, CLI)  │
//! ├─────────────────────┤
//! │  qqbot-runtime      │  config, logging, QQBot, lifecycle
//! ├──────────┬──────────┤
//! │ framework│ transport│  dispatcher / webhook + gateway client
//! ├──────────┴──────────┤
//! │  qqbot-core         │  <- This crate
//! └─────────────────────┘
//! ```

pub mod archive;
pub mod bot;
pub mod envelope;
pub mod error;
pub mod event;
pub mod file_archive;
pub mod gateway;
pub mod message;
pub mod segment;

pub use archive::{ArchivedRecord, BoxedArchive, MemoryArchive, MessageArchive};
pub use bot::{Bot, BoxedBot};
pub use envelope::{ChatScope, Envelope, Sender};
pub use error::{
    ArchiveError, ArchiveResult, EnvelopeError, EnvelopeResult, TransportError, TransportResult,
};
pub use event::{BoxedEventSink, EventSink, PostType};
pub use file_archive::FileArchive;
pub use gateway::{BoxedGateway, GatewayApi, LoginInfo, Person};
pub use message::Message;
pub use segment::{
    AtData, FaceData, FileData, ImageData, JsonData, ReplyData, Segment, TextData, VoiceData,
    parse_segment,
};
