//! Filter predicates gating handlers.
//!
//! A filter answers "should this handler run for this update". A `false`
//! is an ordinary denial; an `Err` means the check itself broke and is
//! reported by the dispatcher. Protocol failures the platform reports for
//! ordinary reasons (not a participant, no admin rights, rate limits) are
//! folded into `false` with a warning.
//!
//! Filters may write into the per-evaluation [`Scratch`], which the handler
//! receives once its filter passes.

mod command;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::bot::{AppState, ChatKind, Update};
use crate::error::{ConfigError, ProtocolError};
use crate::permissions::{Rank, Rights};

pub use command::MatchesCommand;

/// Values extracted while filtering, consumed by the handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratch {
    /// Command word as typed, without prefix or `@bot` suffix.
    pub command: Option<String>,
    /// Shell-split arguments after the command word.
    pub args: Vec<String>,
    /// Raw text after the command word.
    pub input: String,
    /// Capture groups of the last matching pattern. Index 0 is the whole match.
    pub captures: Vec<Option<String>>,
}

pub struct FilterContext<'a> {
    pub update: &'a Update,
    pub state: &'a AppState,
    pub scratch: &'a mut Scratch,
}

#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool>;
}

pub type BoxedFilter = Arc<dyn Filter>;

/// Every filter must pass. Stops at the first `false`.
pub struct And(Vec<BoxedFilter>);

/// Any filter may pass. Stops at the first `true`.
pub struct Or(Vec<BoxedFilter>);

pub struct Not(BoxedFilter);

pub fn and(filters: impl IntoIterator<Item = BoxedFilter>) -> BoxedFilter {
    Arc::new(And(filters.into_iter().collect()))
}

pub fn or(filters: impl IntoIterator<Item = BoxedFilter>) -> BoxedFilter {
    Arc::new(Or(filters.into_iter().collect()))
}

pub fn not(filter: BoxedFilter) -> BoxedFilter {
    Arc::new(Not(filter))
}

#[async_trait]
impl Filter for And {
    fn name(&self) -> &str {
        "And"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        for filter in &self.0 {
            if !filter.check(ctx).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Filter for Or {
    fn name(&self) -> &str {
        "Or"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        for filter in &self.0 {
            if filter.check(ctx).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Filter for Not {
    fn name(&self) -> &str {
        "Not"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(!self.0.check(ctx).await?)
    }
}

/// Fold transient protocol failures into a denial.
fn degrade(filter: &str, result: Result<bool, ProtocolError>) -> Result<bool> {
    match result {
        Ok(passed) => Ok(passed),
        Err(e) if e.is_transient() => {
            warn!("{} denied after protocol failure: {}", filter, e);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub struct IsPrivateChat;

#[async_trait]
impl Filter for IsPrivateChat {
    fn name(&self) -> &str {
        "IsPrivateChat"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(ctx.update.chat().is_some_and(|c| c.kind == ChatKind::Private))
    }
}

pub struct IsGroupChat;

#[async_trait]
impl Filter for IsGroupChat {
    fn name(&self) -> &str {
        "IsGroupChat"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(ctx.update.chat().is_some_and(|c| c.kind.is_group()))
    }
}

/// Regex over message text or callback data. Captures land in the scratch.
pub struct MatchesRegex {
    pattern: Regex,
}

impl MatchesRegex {
    pub fn new(handler: &str, pattern: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            handler: handler.to_string(),
            source,
        })?;
        Ok(Self { pattern })
    }
}

#[async_trait]
impl Filter for MatchesRegex {
    fn name(&self) -> &str {
        "MatchesRegex"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        let Some(text) = ctx.update.text() else {
            return Ok(false);
        };
        let Some(captures) = self.pattern.captures(text) else {
            return Ok(false);
        };
        ctx.scratch.captures = captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        Ok(true)
    }
}

/// Staff, or an administrator of the group the update came from.
///
/// A message sent on behalf of the group itself comes from an anonymous
/// admin and passes without a lookup.
pub struct IsAdmin;

#[async_trait]
impl Filter for IsAdmin {
    fn name(&self) -> &str {
        "IsAdmin"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        let (Some(chat), Some(sender)) = (ctx.update.chat(), ctx.update.sender()) else {
            return Ok(false);
        };
        if chat.kind.is_group()
            && ctx
                .update
                .message()
                .is_some_and(|message| message.sender_chat == Some(chat.id))
        {
            return Ok(true);
        }
        let result = ctx
            .state
            .permissions
            .is_admin(chat.id, chat.kind.is_group(), sender.id)
            .await;
        degrade(self.name(), result)
    }
}

/// The bot administers the chat. Notifies the chat when it does not.
pub struct IsBotAdmin;

#[async_trait]
impl Filter for IsBotAdmin {
    fn name(&self) -> &str {
        "IsBotAdmin"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        let Some(chat) = ctx.update.chat() else {
            return Ok(false);
        };
        if !chat.kind.is_group() {
            return Ok(false);
        }
        let reply_to = ctx.update.message().map(|m| m.message_id);
        let result = ctx.state.permissions.is_bot_admin(chat.id, reply_to).await;
        degrade(self.name(), result)
    }
}

pub struct IsStaff;

#[async_trait]
impl Filter for IsStaff {
    fn name(&self) -> &str {
        "IsStaff"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(ctx
            .update
            .sender()
            .is_some_and(|s| ctx.state.staff.is_staff(s.id)))
    }
}

/// Staff holding at least `rank`.
pub struct HasRank(pub Rank);

impl HasRank {
    pub fn parse(rank: &str) -> Result<Self, ConfigError> {
        Ok(Self(rank.parse()?))
    }
}

#[async_trait]
impl Filter for HasRank {
    fn name(&self) -> &str {
        "HasRank"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        Ok(ctx
            .update
            .sender()
            .is_some_and(|s| ctx.state.staff.has_rank(s.id, self.0)))
    }
}

/// Invoker and bot must both hold `bits` in the chat.
///
/// Private chats are denied silently. A denial in a group tells the invoker
/// which right is missing.
pub struct HasPermissionBits(pub Rights);

#[async_trait]
impl Filter for HasPermissionBits {
    fn name(&self) -> &str {
        "HasPermissionBits"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        let (Some(chat), Some(sender)) = (ctx.update.chat(), ctx.update.sender()) else {
            return Ok(false);
        };

        if !chat.kind.is_group() {
            return Ok(false);
        }

        match ctx.state.permissions.has_bits(chat.id, sender.id, self.0).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                if let Some(message) = ctx.update.message() {
                    let text = ctx
                        .state
                        .text(chat.id, "error-missing-right", &[&self.0.to_string()])
                        .await;
                    if let Err(e) = ctx.state.reply(message, &text).await {
                        warn!("Failed to send missing-right notice to {}: {}", chat.id, e);
                    }
                }
                Ok(false)
            }
            Err(e) => degrade(self.name(), Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::bot::update::fixtures::*;
    use crate::bot::ChatMemberRecord;
    use crate::testing::{app_state, StubClient, BOT_ID};

    struct Counting {
        answer: bool,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Filter for Counting {
        fn name(&self) -> &str {
            "Counting"
        }

        async fn check(&self, _ctx: &mut FilterContext<'_>) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    async fn run(filter: &dyn Filter, state: &AppState, update: &Update) -> Result<bool> {
        let mut scratch = Scratch::default();
        let mut ctx = FilterContext {
            update,
            state,
            scratch: &mut scratch,
        };
        filter.check(&mut ctx).await
    }

    #[tokio::test]
    async fn test_and_short_circuits_on_false() {
        let (state, _) = app_state(Arc::new(StubClient::new()));
        let first = Counting::new(false);
        let second = Counting::new(true);
        let both = and([first.clone() as BoxedFilter, second.clone() as BoxedFilter]);

        let passed = run(both.as_ref(), &state, &group_text(-1, 5, "hi")).await.unwrap();
        assert!(!passed);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_or_short_circuits_on_true() {
        let (state, _) = app_state(Arc::new(StubClient::new()));
        let first = Counting::new(true);
        let second = Counting::new(false);
        let either = or([first.clone() as BoxedFilter, second.clone() as BoxedFilter]);

        assert!(run(either.as_ref(), &state, &group_text(-1, 5, "hi")).await.unwrap());
        assert_eq!(second.calls(), 0);

        let negated = not(Counting::new(true));
        assert!(!run(negated.as_ref(), &state, &group_text(-1, 5, "hi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_chat_kind_filters() {
        let (state, _) = app_state(Arc::new(StubClient::new()));
        let group = group_text(-100, 5, "hi");
        let private = Update::from_message(message(private(5), 5, "hi"));

        assert!(run(&IsGroupChat, &state, &group).await.unwrap());
        assert!(!run(&IsGroupChat, &state, &private).await.unwrap());
        assert!(run(&IsPrivateChat, &state, &private).await.unwrap());
        assert!(!run(&IsPrivateChat, &state, &group).await.unwrap());
    }

    #[tokio::test]
    async fn test_regex_fills_captures() {
        let (state, _) = app_state(Arc::new(StubClient::new()));
        let filter = MatchesRegex::new("lang", r"^set_lang_(\w+)$").unwrap();
        let update = callback(-100, 5, "set_lang_id");

        let mut scratch = Scratch::default();
        let mut ctx = FilterContext {
            update: &update,
            state: &state,
            scratch: &mut scratch,
        };
        assert!(filter.check(&mut ctx).await.unwrap());
        assert_eq!(scratch.captures[1].as_deref(), Some("id"));
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let err = MatchesRegex::new("broken", "(unclosed").err().unwrap();
        assert!(matches!(err, ConfigError::Pattern { handler, .. } if handler == "broken"));
    }

    #[test]
    fn test_unknown_rank_is_config_error() {
        assert!(matches!(
            HasRank::parse("janitor"),
            Err(ConfigError::UnknownRank(rank)) if rank == "janitor"
        ));
        assert_eq!(HasRank::parse("Dev").unwrap().0, Rank::Dev);
    }

    #[tokio::test]
    async fn test_admin_filter_reads_protocol_status() {
        let client = Arc::new(StubClient::new());
        client.set_member(-100, ChatMemberRecord::owner(7));
        client.set_member(-100, ChatMemberRecord::member(8));
        let (state, _) = app_state(client);

        assert!(run(&IsAdmin, &state, &group_text(-100, 7, "hi")).await.unwrap());
        assert!(!run(&IsAdmin, &state, &group_text(-100, 8, "hi")).await.unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_admin_passes_admin_filter() {
        let client = Arc::new(StubClient::new());
        let (state, _) = app_state(client.clone());

        // Anonymous admins post as GroupAnonymousBot on behalf of the group.
        let mut msg = message(group(-100), 1087968824, "/backup");
        msg.sender_chat = Some(-100);
        assert!(run(&IsAdmin, &state, &Update::from_message(msg.clone())).await.unwrap());
        assert_eq!(client.calls("get_chat_administrators"), 0);

        // A linked channel posting into the group is not an admin.
        msg.sender_chat = Some(-200);
        assert!(!run(&IsAdmin, &state, &Update::from_message(msg)).await.unwrap());
    }

    #[tokio::test]
    async fn test_permission_bits_degrades_non_participant() {
        let client = Arc::new(StubClient::new());
        client.set_member(
            -100,
            ChatMemberRecord::administrator(BOT_ID, Rights::RESTRICT_MEMBERS),
        );
        let (state, _) = app_state(client.clone());

        // User 9 is unknown to the chat.
        let filter = HasPermissionBits(Rights::RESTRICT_MEMBERS);
        assert!(!run(&filter, &state, &group_text(-100, 9, "/ban")).await.unwrap());
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_permission_bits_in_private_is_silent() {
        let client = Arc::new(StubClient::new());
        let (state, _) = app_state(client.clone());
        let update = Update::from_message(message(private(5), 5, "/ban"));

        let filter = HasPermissionBits(Rights::RESTRICT_MEMBERS);
        assert!(!run(&filter, &state, &update).await.unwrap());
        assert!(client.sent().is_empty());
        assert_eq!(client.calls("get_chat_member"), 0);
    }

    #[tokio::test]
    async fn test_permission_bits_names_missing_right() {
        let client = Arc::new(StubClient::new());
        client.set_member(-100, ChatMemberRecord::administrator(BOT_ID, Rights::all()));
        client.set_member(-100, ChatMemberRecord::member(8));
        let (state, _) = app_state(client.clone());

        let filter = HasPermissionBits(Rights::PIN_MESSAGES);
        assert!(!run(&filter, &state, &group_text(-100, 8, "/pin")).await.unwrap());
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, -100);
        assert!(sent[0].text.contains("can_pin_messages"));
    }
}
