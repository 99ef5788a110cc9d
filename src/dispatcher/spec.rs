//! Bind-time registration builders.
//!
//! ```rust,ignore
//! fn register(self: Arc<Self>, binder: &mut Binder) -> Result<(), ConfigError> {
//!     binder.command(CommandSpec::new(["ban"]).can_restrict(), &self, Self::ban)?;
//!     binder.callback(r"^set_lang_(\w+)$", None, "set_lang", &self, Self::on_button)?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use crate::bot::UpdateKind;
use crate::error::ConfigError;
use crate::filters::{
    and, BoxedFilter, HasPermissionBits, HasRank, IsAdmin, IsBotAdmin, IsGroupChat, IsStaff,
    MatchesCommand, MatchesRegex,
};
use crate::permissions::Rights;

use super::handler::PluginHandler;
use super::{Context, Handler, Propagation, Registration};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StaffGate {
    Any,
    Rank(String),
}

/// Declarative description of a command binding.
///
/// Gates compose as: the command match, then the extra filter, then
/// permission bits, then either the admin gate or the staff gate. Nothing
/// past the command match runs for other commands.
#[derive(Clone)]
pub struct CommandSpec {
    names: Vec<String>,
    prefixes: Vec<String>,
    case_sensitive: bool,
    filter: Option<BoxedFilter>,
    admin_only: bool,
    staff: Option<StaffGate>,
    rights: Rights,
    group: i32,
}

impl CommandSpec {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            prefixes: vec!["/".to_string()],
            case_sensitive: false,
            filter: None,
            admin_only: false,
            staff: None,
            rights: Rights::NONE,
            group: 0,
        }
    }

    pub fn filter(mut self, filter: BoxedFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Group admins (or staff), in a group where the bot is admin.
    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub fn staff_only(mut self) -> Self {
        self.staff = Some(StaffGate::Any);
        self
    }

    /// Staff holding at least `rank` (`owner`, `dev` or `sudo`).
    pub fn staff_rank(mut self, rank: &str) -> Self {
        self.staff = Some(StaffGate::Rank(rank.to_string()));
        self
    }

    pub fn can_change_info(mut self) -> Self {
        self.rights |= Rights::CHANGE_INFO;
        self
    }

    pub fn can_delete(mut self) -> Self {
        self.rights |= Rights::DELETE_MESSAGES;
        self
    }

    pub fn can_restrict(mut self) -> Self {
        self.rights |= Rights::RESTRICT_MEMBERS;
        self
    }

    pub fn can_invite(mut self) -> Self {
        self.rights |= Rights::INVITE_USERS;
        self
    }

    pub fn can_pin(mut self) -> Self {
        self.rights |= Rights::PIN_MESSAGES;
        self
    }

    pub fn can_promote(mut self) -> Self {
        self.rights |= Rights::PROMOTE_MEMBERS;
        self
    }

    pub fn group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn handler_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("<unnamed>")
    }

    /// Validate and fold the declaration into a kind, one filter and a group.
    ///
    /// Only slash-prefixed commands listen on `Command`; other prefixes
    /// listen on plain messages.
    pub fn compose(self) -> Result<(UpdateKind, BoxedFilter, i32), ConfigError> {
        let handler = self.handler_name().to_string();
        if self.admin_only && self.staff.is_some() {
            return Err(ConfigError::ConflictingGate(handler));
        }

        let kind = if !self.prefixes.is_empty() && self.prefixes.iter().all(|p| p.starts_with('/')) {
            UpdateKind::Command
        } else {
            UpdateKind::GenericMessage
        };

        let mut chain: Vec<BoxedFilter> = vec![Arc::new(MatchesCommand::new(
            self.names,
            self.prefixes,
            self.case_sensitive,
        ))];
        chain.extend(self.filter);
        if !self.rights.is_empty() {
            chain.push(Arc::new(HasPermissionBits(self.rights)));
        }
        if self.admin_only {
            chain.push(Arc::new(IsGroupChat));
            chain.push(Arc::new(IsAdmin));
            chain.push(Arc::new(IsBotAdmin));
        }
        match self.staff {
            Some(StaffGate::Any) => chain.push(Arc::new(IsStaff)),
            Some(StaffGate::Rank(rank)) => chain.push(Arc::new(HasRank::parse(&rank)?)),
            None => {}
        }

        Ok((kind, and(chain), self.group))
    }
}

/// Collects one plugin's registrations while it registers.
///
/// Nothing reaches the router unless every binding validates.
pub struct Binder {
    owner: Arc<str>,
    registrations: Vec<Registration>,
}

impl Binder {
    pub(crate) fn new(owner: &str) -> Self {
        Self {
            owner: Arc::from(owner),
            registrations: Vec::new(),
        }
    }

    /// Bind a prepared handler.
    pub fn bind(
        &mut self,
        kind: UpdateKind,
        group: i32,
        filter: Option<BoxedFilter>,
        name: &str,
        handler: Arc<dyn Handler>,
    ) {
        self.registrations.push(Registration::new(
            kind,
            group,
            Arc::clone(&self.owner),
            name,
            filter,
            handler,
        ));
    }

    pub fn command<P, F, Fut>(&mut self, spec: CommandSpec, plugin: &Arc<P>, f: F) -> Result<(), ConfigError>
    where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Propagation>> + Send + 'static,
    {
        let name = spec.handler_name().to_string();
        let (kind, filter, group) = spec.compose()?;
        self.bind(
            kind,
            group,
            Some(filter),
            &name,
            Arc::new(PluginHandler::new(Arc::clone(plugin), f)),
        );
        Ok(())
    }

    /// Listen on every message (commands included) in `group`.
    pub fn message<P, F, Fut>(
        &mut self,
        group: i32,
        filter: Option<BoxedFilter>,
        name: &str,
        plugin: &Arc<P>,
        f: F,
    ) where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Propagation>> + Send + 'static,
    {
        self.bind(
            UpdateKind::GenericMessage,
            group,
            filter,
            name,
            Arc::new(PluginHandler::new(Arc::clone(plugin), f)),
        );
    }

    /// Listen on callback queries whose data matches `pattern`.
    pub fn callback<P, F, Fut>(
        &mut self,
        pattern: &str,
        extra: Option<BoxedFilter>,
        name: &str,
        plugin: &Arc<P>,
        f: F,
    ) -> Result<(), ConfigError>
    where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Propagation>> + Send + 'static,
    {
        let matcher: BoxedFilter = Arc::new(MatchesRegex::new(name, pattern)?);
        let filter = match extra {
            Some(extra) => and([matcher, extra]),
            None => matcher,
        };
        self.bind(
            UpdateKind::CallbackQuery,
            0,
            Some(filter),
            name,
            Arc::new(PluginHandler::new(Arc::clone(plugin), f)),
        );
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<Registration> {
        self.registrations
    }
}
