//! Error taxonomy of the runtime.
//!
//! - [`SubmitError`]: admission errors, returned synchronously to callers.
//! - [`RecoveryError`]: failures while creating or recovering a symbol.
//! - [`ActorError`]: the durability failure that stopped an actor.
//!
//! Validation rejections are not errors: they become `Rejected` events.

use std::io;

use thiserror::Error;

use engine_protocol::ProtocolError;
use engine_wal::WalError;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The symbol's mailbox is full.
    #[error("engine busy: mailbox full")]
    Busy,

    #[error("unknown symbol")]
    UnknownSymbol,

    /// The command does not match the entry point it was sent to.
    #[error("bad command")]
    BadCommand,

    /// Creating or recovering the symbol failed.
    #[error("symbol recovery failed: {0}")]
    Io(#[from] RecoveryError),

    /// The symbol's actor stopped after a durability failure.
    #[error("symbol halted")]
    Halted,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Wal(#[from] WalError),

    /// A record passed its checksum but is not a valid command/event.
    #[error("undecodable record ending at offset {offset} in {file}: {source}")]
    Decode {
        file: &'static str,
        offset: u64,
        #[source]
        source: ProtocolError,
    },

    #[error("i/o: {0}")]
    Io(#[from] io::Error),
}

impl RecoveryError {
    /// `true` if the logs are corrupt (not merely torn).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RecoveryError::Wal(WalError::ChecksumMismatch { .. }) | RecoveryError::Decode { .. }
        )
    }
}

/// Why an actor stopped. Nothing from the failing batch was applied
/// (command-log failures) or the outbox is behind the book (outbox
/// failures); either way restart + replay restores consistency.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("command log append failed: {0}")]
    CommandAppend(#[source] WalError),

    #[error("command log flush failed: {0}")]
    CommandFlush(#[source] WalError),

    #[error("outbox append failed: {0}")]
    OutboxAppend(#[source] WalError),

    #[error("outbox flush failed: {0}")]
    OutboxFlush(#[source] WalError),
}

/// The bus refused an event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event bus closed")]
    Closed,

    #[error("event bus rejected event: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_failures_are_corruption() {
        let err = RecoveryError::from(WalError::ChecksumMismatch { offset: 8 });
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum"));

        let torn = RecoveryError::from(WalError::TruncatedPayload { offset: 0 });
        assert!(!torn.is_corruption());
    }

    #[test]
    fn recovery_error_surfaces_through_submit() {
        let err: SubmitError = RecoveryError::from(io::Error::other("disk")).into();
        assert!(matches!(err, SubmitError::Io(_)));
    }
}
