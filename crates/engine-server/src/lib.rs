//! engine-server
//!
//! Durable per-symbol runtime for the matching engine: symbol actors with a
//! group-committed command WAL, an event outbox, outbox publishers, crash
//! recovery and the `Engine` registry tying them together.

pub mod actor;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod outbox;
pub mod publisher;
pub mod recovery;
pub mod types;

pub use actor::{ActorExit, ActorStats, CommandLog};
pub use bus::{ChanBus, EventBus};
pub use config::EngineConfig;
pub use engine::{BookFactory, Engine};
pub use error::{ActorError, ConfigError, PublishError, RecoveryError, SubmitError};
pub use outbox::{load_cursor, store_cursor, EventOutbox, Outbox, OutboxEmitter, OutboxScan};
pub use publisher::OutboxPublisher;
pub use recovery::{recover_symbol, RecoveryReport};
pub use types::{PublishedEvent, SymbolPaths};
