//! engine-protocol
//!
//! Record-level encoding/decoding for the matching engine.
//!
//! This crate turns logical engine messages (`engine_core::Command` /
//! `engine_core::Event`) into the fixed-layout payloads stored in the
//! command WAL and the event outbox, and back again.
//!
//! - [`binary_codec`] : production little-endian record layout
//! - [`csv_codec`]    : readable one-line-per-record form (tests, tooling)
//! - [`codec`]        : the `CommandCodec` / `EventCodec` seam over both

pub mod wire_types;
pub mod binary_codec;
pub mod csv_codec;
pub mod codec;

pub use binary_codec::{
    ProtocolError,
    decode_command,
    decode_event,
    encode_command,
    encode_event,
};

pub use codec::{BinaryCodec, CommandCodec, CsvCodec, EventCodec, RecordCodec};
