//! Crosspost - publish one post everywhere, on schedule
//!
//! Core library behind the crosspost tools: the OAuth connection manager,
//! the platform capability registry, and the fan-out/dispatch pipeline that
//! turns one authored post into independently retried per-platform publish
//! jobs.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod registry;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, NewConnection, QueueStats};
pub use dispatch::Dispatcher;
pub use error::{ConnectError, CrosspostError, PublishError, Result, ValidationError};
pub use fanout::NewPostRequest;
pub use oauth::ConnectionManager;
pub use registry::PlatformSpec;
pub use types::{
    Connection, ConnectionStatus, ContentKind, EntryStatus, MediaRef, PlatformId, Post,
    PostStatus, QueueEntry,
};
