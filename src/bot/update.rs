//! Inbound update model.
//!
//! Teloxide updates are converted once at the edge; the dispatch core,
//! filters and plugins only see these types.

use teloxide::types as tg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
    pub kind: ChatKind,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub first_name: String,
    pub username: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub file_id: String,
    pub file_name: Option<String>,
}

/// The message a command replied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    pub message_id: i32,
    pub sender: Option<Sender>,
    pub document: Option<DocumentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpdate {
    pub message_id: i32,
    pub chat: Chat,
    /// Absent for channel posts.
    pub sender: Option<Sender>,
    /// Chat the message was sent on behalf of. Equal to `chat.id` for
    /// anonymous group admins.
    pub sender_chat: Option<i64>,
    /// Text or media caption.
    pub text: Option<String>,
    pub reply_to: Option<ReplyRef>,
    pub document: Option<DocumentRef>,
    /// Set on the service message a supergroup receives after an upgrade.
    pub migrate_from_chat_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUpdate {
    pub id: String,
    pub sender: Sender,
    /// Chat and message the pressed button belongs to, when still accessible.
    pub chat: Option<Chat>,
    pub message_id: Option<i32>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Command(MessageUpdate),
    GenericMessage(MessageUpdate),
    CallbackQuery(CallbackUpdate),
}

/// The category a registration listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Command,
    GenericMessage,
    CallbackQuery,
}

impl UpdateKind {
    /// Whether a registration of this kind receives updates of `incoming` kind.
    ///
    /// A command is also a message, so message listeners see commands too.
    pub fn accepts(self, incoming: UpdateKind) -> bool {
        match self {
            Self::GenericMessage => {
                matches!(incoming, UpdateKind::GenericMessage | UpdateKind::Command)
            }
            other => other == incoming,
        }
    }
}

impl Update {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Command(_) => UpdateKind::Command,
            Self::GenericMessage(_) => UpdateKind::GenericMessage,
            Self::CallbackQuery(_) => UpdateKind::CallbackQuery,
        }
    }

    /// Classify a message: text starting with `/` is a command.
    pub fn from_message(message: MessageUpdate) -> Self {
        if message
            .text
            .as_deref()
            .is_some_and(|text| text.starts_with('/'))
        {
            Self::Command(message)
        } else {
            Self::GenericMessage(message)
        }
    }

    pub fn message(&self) -> Option<&MessageUpdate> {
        match self {
            Self::Command(m) | Self::GenericMessage(m) => Some(m),
            Self::CallbackQuery(_) => None,
        }
    }

    pub fn chat(&self) -> Option<&Chat> {
        match self {
            Self::Command(m) | Self::GenericMessage(m) => Some(&m.chat),
            Self::CallbackQuery(q) => q.chat.as_ref(),
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat().map(|c| c.id)
    }

    pub fn sender(&self) -> Option<&Sender> {
        match self {
            Self::Command(m) | Self::GenericMessage(m) => m.sender.as_ref(),
            Self::CallbackQuery(q) => Some(&q.sender),
        }
    }

    /// Message text, or callback payload.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Command(m) | Self::GenericMessage(m) => m.text.as_deref(),
            Self::CallbackQuery(q) => Some(&q.data),
        }
    }

    /// Convert a teloxide update. Unsupported kinds yield `None`.
    pub fn from_telegram(update: &tg::Update) -> Option<Self> {
        match &update.kind {
            tg::UpdateKind::Message(msg) => Some(Self::from_message(convert_message(msg))),
            tg::UpdateKind::CallbackQuery(query) => {
                let (chat, message_id) = match &query.message {
                    Some(msg) => (Some(convert_chat(msg.chat())), Some(msg.id().0)),
                    None => (None, None),
                };
                Some(Self::CallbackQuery(CallbackUpdate {
                    id: query.id.to_string(),
                    sender: convert_user(&query.from),
                    chat,
                    message_id,
                    data: query.data.clone().unwrap_or_default(),
                }))
            }
            _ => None,
        }
    }
}

fn convert_chat(chat: &tg::Chat) -> Chat {
    let kind = if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    };
    Chat {
        id: chat.id.0,
        kind,
        title: chat.title().map(str::to_owned),
    }
}

fn convert_user(user: &tg::User) -> Sender {
    Sender {
        id: user.id.0,
        first_name: user.first_name.clone(),
        username: user.username.clone(),
        is_bot: user.is_bot,
    }
}

fn convert_document(msg: &tg::Message) -> Option<DocumentRef> {
    msg.document().map(|doc| DocumentRef {
        file_id: doc.file.id.to_string(),
        file_name: doc.file_name.clone(),
    })
}

fn convert_message(msg: &tg::Message) -> MessageUpdate {
    MessageUpdate {
        message_id: msg.id.0,
        chat: convert_chat(&msg.chat),
        sender: msg.from.as_ref().map(convert_user),
        sender_chat: msg.sender_chat.as_ref().map(|chat| chat.id.0),
        text: msg.text().or(msg.caption()).map(str::to_owned),
        reply_to: msg.reply_to_message().map(|reply| ReplyRef {
            message_id: reply.id.0,
            sender: reply.from.as_ref().map(convert_user),
            document: convert_document(reply),
        }),
        document: convert_document(msg),
        migrate_from_chat_id: msg.migrate_from_chat_id().map(|id| id.0),
    }
}
