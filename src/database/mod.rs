//! Database module exports.

mod chat_state;
#[cfg(test)]
pub mod memory;
mod mongo;
mod store;

pub use chat_state::{strip_envelope, ChatState, CHAT_KEY};
pub use mongo::Database;
pub use store::DocumentStore;
