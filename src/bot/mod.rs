//! Bot module - protocol seam, update model, runtime context and the
//! polling/webhook runtime.

mod client;
mod pool;
mod runtime;
mod state;
mod telegram;
pub mod update;
mod webhook;

pub use client::{BotIdentity, ChatClient, ChatMemberRecord, MemberStatus, OutgoingDocument};
pub use pool::WorkerPool;
pub use runtime::run;
pub use state::AppState;
pub use telegram::TelegramClient;
pub use update::{ChatKind, DocumentRef, MessageUpdate, ReplyRef, Update, UpdateKind};
