//! Wire protocol for the bidirectional event channel

pub mod messages;

pub use messages::*;
