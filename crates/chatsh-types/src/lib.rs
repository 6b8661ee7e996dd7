//! Shared types for the chatsh conversation state and interaction ledger.

mod conversation;
mod interaction;

pub use conversation::*;
pub use interaction::*;
