//! Per-chat language selection.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::bot::AppState;
use crate::database::ChatState;
use crate::dispatcher::{Binder, CommandSpec, Context, Propagation};
use crate::error::ConfigError;
use crate::filters::{or, BoxedFilter, HasPermissionBits, IsPrivateChat};
use crate::i18n::I18n;
use crate::permissions::Rights;
use crate::utils::html_escape;

use super::{ChatBackup, ChatMigrate, Plugin};

pub const NAME: &str = "Language";

pub struct Language {
    i18n: Arc<I18n>,
    /// Shared with `I18n`, so both sides serialize on one lock.
    state: ChatState,
}

impl Language {
    pub fn build(state: &AppState) -> Arc<dyn Plugin> {
        Arc::new(Self {
            i18n: Arc::clone(&state.i18n),
            state: state.i18n.state().clone(),
        })
    }

    /// Anyone in private; members who may change chat info in groups.
    fn gate() -> BoxedFilter {
        or([
            Arc::new(IsPrivateChat) as BoxedFilter,
            Arc::new(HasPermissionBits(Rights::CHANGE_INFO)),
        ])
    }

    fn available(&self) -> String {
        self.i18n
            .languages()
            .into_iter()
            .map(|code| format!("<code>{}</code>", code))
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn set_language(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let Some(chat_id) = ctx.chat_id() else {
            return Ok(Propagation::Continue);
        };

        let Some(code) = ctx.args().first().map(|c| c.to_lowercase()) else {
            let current = self.i18n.chat_language(chat_id).await;
            let chat_name = ctx
                .update
                .chat()
                .and_then(|c| c.title.clone())
                .unwrap_or_else(|| "this chat".to_string());
            let language_name = self.i18n.get(&current, "language-name");
            ctx.reply(
                "current-language",
                &[&html_escape(&chat_name), &language_name, &self.available()],
            )
            .await?;
            return Ok(Propagation::Continue);
        };

        if !self.i18n.is_supported(&code) {
            ctx.reply("language-invalid", &[&self.available()]).await?;
            return Ok(Propagation::Continue);
        }

        self.i18n.switch(chat_id, &code).await?;
        let language_name = self.i18n.get(&code, "language-name");
        ctx.reply("language-set", &[&language_name]).await?;
        Ok(Propagation::Continue)
    }

    async fn on_button(self: Arc<Self>, ctx: Context) -> Result<Propagation> {
        let crate::bot::Update::CallbackQuery(query) = ctx.update.as_ref() else {
            return Ok(Propagation::Continue);
        };
        let (Some(chat_id), Some(code)) = (
            ctx.chat_id(),
            ctx.scratch.captures.get(1).cloned().flatten(),
        ) else {
            return Ok(Propagation::Continue);
        };

        if !self.i18n.is_supported(&code) {
            let text = ctx.text("language-invalid", &[&self.available()]).await;
            ctx.state.client.answer_callback(&query.id, Some(&text)).await?;
            return Ok(Propagation::Continue);
        }

        self.i18n.switch(chat_id, &code).await?;
        let text = self
            .i18n
            .format(&code, "language-set", &[&self.i18n.get(&code, "language-name")]);
        ctx.state.client.answer_callback(&query.id, None).await?;
        if let Some(message_id) = query.message_id {
            ctx.state.client.edit_message(chat_id, message_id, &text).await?;
        }
        Ok(Propagation::Continue)
    }
}

#[async_trait]
impl Plugin for Language {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
        binder.command(
            CommandSpec::new(["lang", "setlang", "language"]).filter(Self::gate()),
            &self,
            Self::set_language,
        )?;
        binder.callback(
            r"^set_lang_(\w+)$",
            Some(Self::gate()),
            "set_lang",
            &self,
            Self::on_button,
        )?;
        Ok(())
    }

    fn as_migrate(&self) -> Option<&dyn ChatMigrate> {
        Some(self)
    }

    fn as_backup(&self) -> Option<&dyn ChatBackup> {
        Some(self)
    }
}

#[async_trait]
impl ChatMigrate for Language {
    async fn migrate_chat(&self, old_chat: i64, new_chat: i64) -> Result<()> {
        self.state.migrate(old_chat, new_chat).await?;
        self.i18n.forget(old_chat);
        self.i18n.forget(new_chat);
        Ok(())
    }
}

#[async_trait]
impl ChatBackup for Language {
    async fn export_chat(&self, chat_id: i64) -> Result<Option<Bson>> {
        Ok(self.state.export(chat_id).await?.map(Bson::Document))
    }

    async fn import_chat(&self, chat_id: i64, data: Document) -> Result<()> {
        self.state.import(chat_id, data).await?;
        self.i18n.forget(chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::update::fixtures::*;
    use crate::bot::{ChatMemberRecord, Update};
    use crate::dispatcher::Dispatcher;
    use crate::plugins::PluginRegistry;
    use crate::testing::{app_state, StubClient, BOT_ID};

    async fn dispatcher(client: Arc<StubClient>) -> Dispatcher {
        let (state, _) = app_state(client);
        let registry = Arc::new(PluginRegistry::new(state.clone()));
        registry.load(Language::build(&state)).await.unwrap();
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_private_chat_switches_freely() {
        let client = Arc::new(StubClient::new());
        let dispatcher = dispatcher(client.clone()).await;

        dispatcher
            .dispatch(Update::from_message(message(private(5), 5, "/lang id")))
            .await;

        let state = dispatcher.registry().state();
        assert_eq!(state.i18n.chat_language(5).await, "id");
        assert_eq!(client.sent()[0].text, "Bahasa diubah ke <b>Indonesia</b>.");
    }

    #[tokio::test]
    async fn test_group_member_without_rights_is_refused() {
        let client = Arc::new(StubClient::new());
        client.set_member(-1, ChatMemberRecord::administrator(BOT_ID, Rights::all()));
        client.set_member(-1, ChatMemberRecord::member(5));
        let dispatcher = dispatcher(client.clone()).await;

        dispatcher.dispatch(group_text(-1, 5, "/setlang id")).await;
        let state = dispatcher.registry().state();
        assert_eq!(state.i18n.chat_language(-1).await, "en");
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("can_change_info"));
    }

    #[tokio::test]
    async fn test_other_commands_skip_rights_lookup() {
        let client = Arc::new(StubClient::new());
        client.set_member(-1, ChatMemberRecord::administrator(BOT_ID, Rights::all()));
        client.set_member(-1, ChatMemberRecord::member(5));
        let dispatcher = dispatcher(client.clone()).await;

        for text in ["/rules", "/ban 7", "/start"] {
            dispatcher.dispatch(group_text(-1, 5, text)).await;
        }
        assert_eq!(client.calls("get_chat_member"), 0);
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_code_lists_languages() {
        let client = Arc::new(StubClient::new());
        let dispatcher = dispatcher(client.clone()).await;

        dispatcher
            .dispatch(Update::from_message(message(private(5), 5, "/lang xx")))
            .await;
        assert!(client.sent()[0].text.contains("<code>en</code>, <code>id</code>"));
    }

    #[tokio::test]
    async fn test_button_switches_and_edits() {
        let client = Arc::new(StubClient::new());
        client.set_member(-1, ChatMemberRecord::administrator(BOT_ID, Rights::all()));
        client.set_member(-1, ChatMemberRecord::owner(5));
        let dispatcher = dispatcher(client.clone()).await;

        dispatcher.dispatch(callback(-1, 5, "set_lang_id")).await;
        assert_eq!(client.answered().len(), 1);
        assert_eq!(client.edits()[0].1, 77);
        let state = dispatcher.registry().state();
        assert_eq!(state.i18n.chat_language(-1).await, "id");
    }
}
