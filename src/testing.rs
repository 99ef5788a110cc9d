//! Test doubles shared by unit tests across modules.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bot::{AppState, BotIdentity, ChatClient, ChatMemberRecord, OutgoingDocument, WorkerPool};
use crate::cache::CacheRegistry;
use crate::database::memory::MemoryStore;
use crate::error::ProtocolError;
use crate::i18n::I18n;
use crate::permissions::{Rights, StaffRoster};

pub const BOT_ID: u64 = 1000;
pub const BOT_USERNAME: &str = "warden_bot";
pub const OWNER_ID: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i32>,
}

#[derive(Default)]
struct Recorded {
    sent: Vec<Sent>,
    edits: Vec<(i64, i32, String)>,
    documents: Vec<(i64, OutgoingDocument)>,
    deleted: Vec<(i64, i32)>,
    pins: Vec<(i64, i32, bool)>,
    unpins: Vec<(i64, Option<i32>)>,
    promotions: Vec<(i64, u64, Rights)>,
    bans: Vec<(i64, u64)>,
    unbans: Vec<(i64, u64)>,
    left: Vec<i64>,
    answered: Vec<(String, Option<String>)>,
}

/// In-memory chat platform that records every side effect.
#[derive(Default)]
pub struct StubClient {
    members: Mutex<HashMap<(i64, u64), ChatMemberRecord>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    recorded: Mutex<Recorded>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member(&self, chat_id: i64, record: ChatMemberRecord) {
        self.members.lock().insert((chat_id, record.user_id), record);
    }

    pub fn set_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().insert(file_id.to_string(), bytes);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.recorded.lock().sent.clone()
    }

    pub fn edits(&self) -> Vec<(i64, i32, String)> {
        self.recorded.lock().edits.clone()
    }

    pub fn documents(&self) -> Vec<(i64, OutgoingDocument)> {
        self.recorded.lock().documents.clone()
    }

    pub fn deleted(&self) -> Vec<(i64, i32)> {
        self.recorded.lock().deleted.clone()
    }

    pub fn pins(&self) -> Vec<(i64, i32, bool)> {
        self.recorded.lock().pins.clone()
    }

    /// `None` stands for "the most recent pin"; `unpin_all` is counted separately.
    pub fn unpins(&self) -> Vec<(i64, Option<i32>)> {
        self.recorded.lock().unpins.clone()
    }

    pub fn promotions(&self) -> Vec<(i64, u64, Rights)> {
        self.recorded.lock().promotions.clone()
    }

    pub fn bans(&self) -> Vec<(i64, u64)> {
        self.recorded.lock().bans.clone()
    }

    pub fn unbans(&self) -> Vec<(i64, u64)> {
        self.recorded.lock().unbans.clone()
    }

    pub fn left(&self) -> Vec<i64> {
        self.recorded.lock().left.clone()
    }

    pub fn answered(&self) -> Vec<(String, Option<String>)> {
        self.recorded.lock().answered.clone()
    }

    fn count(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_default() += 1;
    }
}

#[async_trait]
impl ChatClient for StubClient {
    async fn me(&self) -> Result<BotIdentity, ProtocolError> {
        self.count("me");
        Ok(BotIdentity {
            id: BOT_ID,
            username: BOT_USERNAME.to_string(),
            name: "Warden".to_string(),
        })
    }

    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i32>) -> Result<i32, ProtocolError> {
        self.count("send_message");
        let mut recorded = self.recorded.lock();
        recorded.sent.push(Sent {
            chat_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(100 + recorded.sent.len() as i32)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), ProtocolError> {
        self.count("edit_message");
        self.recorded.lock().edits.push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ProtocolError> {
        self.count("delete_message");
        self.recorded.lock().deleted.push((chat_id, message_id));
        Ok(())
    }

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i32]) -> Result<(), ProtocolError> {
        self.count("delete_messages");
        self.recorded
            .lock()
            .deleted
            .extend(message_ids.iter().map(|id| (chat_id, *id)));
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, message_id: i32, notify: bool) -> Result<(), ProtocolError> {
        self.count("pin_message");
        self.recorded.lock().pins.push((chat_id, message_id, notify));
        Ok(())
    }

    async fn unpin_message(&self, chat_id: i64, message_id: Option<i32>) -> Result<(), ProtocolError> {
        self.count("unpin_message");
        self.recorded.lock().unpins.push((chat_id, message_id));
        Ok(())
    }

    async fn unpin_all(&self, _chat_id: i64) -> Result<(), ProtocolError> {
        self.count("unpin_all");
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        document: OutgoingDocument,
        _reply_to: Option<i32>,
    ) -> Result<(), ProtocolError> {
        self.count("send_document");
        self.recorded.lock().documents.push((chat_id, document));
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ProtocolError> {
        self.count("download_file");
        self.files
            .lock()
            .get(file_id)
            .cloned()
            .ok_or_else(|| ProtocolError::Other(format!("no file {file_id}")))
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), ProtocolError> {
        self.count("answer_callback");
        self.recorded
            .lock()
            .answered
            .push((query_id.to_string(), text.map(str::to_owned)));
        Ok(())
    }

    async fn get_chat_member(&self, chat_id: i64, user_id: u64) -> Result<ChatMemberRecord, ProtocolError> {
        self.count("get_chat_member");
        self.members
            .lock()
            .get(&(chat_id, user_id))
            .cloned()
            .ok_or(ProtocolError::NotParticipant)
    }

    async fn get_chat_administrators(&self, chat_id: i64) -> Result<Vec<ChatMemberRecord>, ProtocolError> {
        self.count("get_chat_administrators");
        Ok(self
            .members
            .lock()
            .iter()
            .filter(|((chat, _), record)| *chat == chat_id && record.is_admin())
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn ban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError> {
        self.count("ban_member");
        self.recorded.lock().bans.push((chat_id, user_id));
        Ok(())
    }

    async fn unban_member(&self, chat_id: i64, user_id: u64) -> Result<(), ProtocolError> {
        self.count("unban_member");
        self.recorded.lock().unbans.push((chat_id, user_id));
        Ok(())
    }

    async fn promote_member(&self, chat_id: i64, user_id: u64, rights: Rights) -> Result<(), ProtocolError> {
        self.count("promote_member");
        self.recorded.lock().promotions.push((chat_id, user_id, rights));
        Ok(())
    }

    async fn export_invite_link(&self, chat_id: i64) -> Result<String, ProtocolError> {
        self.count("export_invite_link");
        Ok(format!("https://t.me/+invite{}", chat_id.unsigned_abs()))
    }

    async fn leave_chat(&self, chat_id: i64) -> Result<(), ProtocolError> {
        self.count("leave_chat");
        self.recorded.lock().left.push(chat_id);
        Ok(())
    }
}

/// Runtime context over a stub client and a fresh in-memory store.
pub fn app_state(client: Arc<StubClient>) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let caches = CacheRegistry::new();
    let i18n = match I18n::load(store.clone(), &caches) {
        Ok(i18n) => Arc::new(i18n),
        Err(e) => panic!("embedded language tables must parse: {e}"),
    };
    let me = BotIdentity {
        id: BOT_ID,
        username: BOT_USERNAME.to_string(),
        name: "Warden".to_string(),
    };
    let state = AppState::new(
        client,
        store.clone(),
        me,
        Arc::new(StaffRoster::new(OWNER_ID)),
        i18n,
        caches,
        WorkerPool::new(2),
    );
    (state, store)
}
