//! Low-level record types and constants.
//!
//! This module defines:
//! - Record versions and fixed payload lengths.
//! - Type IDs for command and event records.
//! - Byte offsets of every field inside a record.
//!
//! The actual encode/decode logic lives in `binary_codec`.

use engine_core::Side;

/// Current layout version of command records.
///
/// Bumped if a field is added, moved or reinterpreted.
pub const CMD_RECORD_VERSION: u8 = 1;

/// Current layout version of event records.
pub const EVENT_RECORD_VERSION: u8 = 1;

/// Command payload length in bytes.
pub const CMD_RECORD_LEN: usize = 67;

/// Event payload length in bytes.
pub const EVENT_RECORD_LEN: usize = 68;

/// Byte offsets inside a command record (all integers little-endian).
pub mod cmd_off {
    pub const VER: usize = 0;
    pub const TYPE: usize = 1;
    pub const SEQ: usize = 2;
    pub const REQ_ID: usize = 10;
    pub const CLIENT_TS: usize = 18;
    pub const ORDER_ID: usize = 26;
    pub const USER_ID: usize = 34;
    pub const SIDE: usize = 42;
    pub const PRICE: usize = 43;
    pub const QTY: usize = 51;
    pub const CANCEL_ID: usize = 59;
}

/// Byte offsets inside an event record (all integers little-endian).
pub mod ev_off {
    pub const VER: usize = 0;
    pub const TYPE: usize = 1;
    pub const SEQ: usize = 2;
    /// `u16`
    pub const IDX: usize = 10;
    pub const REQ_ID: usize = 12;
    pub const ORDER_ID: usize = 20;
    pub const USER_ID: usize = 28;
    pub const MAKER_ID: usize = 36;
    pub const TAKER_ID: usize = 44;
    pub const PRICE: usize = 52;
    pub const QTY: usize = 60;
}

/// Command record types.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireCommandType {
    /// New limit order.
    SubmitLimit = 1,

    /// Cancel a resting order by id.
    Cancel = 2,
}

impl WireCommandType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(WireCommandType::SubmitLimit),
            2 => Some(WireCommandType::Cancel),
            _ => None,
        }
    }
}

/// Event record types.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireEventType {
    Accepted = 1,
    Rejected = 2,
    Added = 3,
    Cancelled = 4,
    Trade = 5,

    /// Command boundary marker. Never published.
    CmdEnd = 250,
}

impl WireEventType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(WireEventType::Accepted),
            2 => Some(WireEventType::Rejected),
            3 => Some(WireEventType::Added),
            4 => Some(WireEventType::Cancelled),
            5 => Some(WireEventType::Trade),
            250 => Some(WireEventType::CmdEnd),
            _ => None,
        }
    }
}

/// Side byte in a command record. `0` is written for cancels.
pub fn side_to_u8(side: Side) -> u8 {
    match side {
        Side::Buy => 1,
        Side::Sell => 2,
    }
}

pub fn side_from_u8(v: u8) -> Option<Side> {
    match v {
        1 => Some(Side::Buy),
        2 => Some(Side::Sell),
        _ => None,
    }
}

/// Offset of the byte just past the `CMD_RECORD_LEN` record.
///
/// Exists so the offset table can be checked against the length.
pub const fn cmd_record_end() -> usize {
    cmd_off::CANCEL_ID + 8
}

pub const fn event_record_end() -> usize {
    ev_off::QTY + 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_tables_fill_records_exactly() {
        assert_eq!(cmd_record_end(), CMD_RECORD_LEN);
        assert_eq!(event_record_end(), EVENT_RECORD_LEN);
    }

    #[test]
    fn cmd_end_type_is_reserved_250() {
        assert_eq!(WireEventType::CmdEnd as u8, 250);
        assert_eq!(WireEventType::from_u8(250), Some(WireEventType::CmdEnd));
        assert_eq!(WireEventType::from_u8(6), None);
    }

    #[test]
    fn side_bytes() {
        assert_eq!(side_from_u8(side_to_u8(Side::Buy)), Some(Side::Buy));
        assert_eq!(side_from_u8(side_to_u8(Side::Sell)), Some(Side::Sell));
        assert_eq!(side_from_u8(0), None);
        assert_eq!(side_from_u8(3), None);
    }
}
