//! Event handlers consuming the dispatcher queue.

mod transfer;

pub use transfer::TransferHandler;
