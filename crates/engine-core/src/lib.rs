//! engine-core
//!
//! Pure matching logic, no I/O:
//! - messages (commands in, events out)
//! - order representation and the node arena
//! - per-symbol price-level book with heap best-price tracking
//! - command validation / application

pub mod side;
pub mod messages;
pub mod order;
pub mod pool;
pub mod order_book;
pub mod book;
pub mod apply;
pub mod top_of_book;

pub use side::Side;

pub use messages::{
    CancelOrder,
    Command,
    CommandKind,
    Event,
    EventKind,
    RejectReason,
    SubmitLimit,
};

pub use order::{Order, OrderId, Price, Qty, Trade, UserId};
pub use order_book::LevelBook;
pub use book::{Emitter, NoopEmitter, OrderBook};
pub use apply::{apply_command, validate};
pub use top_of_book::{LevelSummary, TopOfBookSnapshot};
