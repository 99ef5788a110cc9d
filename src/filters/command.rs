//! Command matching with shell-style argument parsing.

use anyhow::Result;
use async_trait::async_trait;

use super::{Filter, FilterContext, Scratch};

/// Matches `<prefix><name>[@bot] args...`.
///
/// An `@suffix` naming a different bot rejects the update, so commands
/// addressed to other bots in the same group are left alone.
#[derive(Debug, Clone)]
pub struct MatchesCommand {
    names: Vec<String>,
    prefixes: Vec<String>,
    case_sensitive: bool,
}

impl MatchesCommand {
    pub fn new(names: Vec<String>, prefixes: Vec<String>, case_sensitive: bool) -> Self {
        let names = if case_sensitive {
            names
        } else {
            names.into_iter().map(|n| n.to_lowercase()).collect()
        };
        let mut prefixes = if prefixes.is_empty() {
            vec![String::new()]
        } else {
            prefixes
        };
        // Longest first, so an empty prefix never shadows a real one.
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        prefixes.dedup();

        Self {
            names,
            prefixes,
            case_sensitive,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Parse `text` as one of our commands.
    pub fn parse(&self, text: &str, bot_username: &str) -> Option<Scratch> {
        for prefix in &self.prefixes {
            let Some(rest) = text.strip_prefix(prefix.as_str()) else {
                continue;
            };
            let (word, tail) = match rest.find(char::is_whitespace) {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            let (command, target) = match word.split_once('@') {
                Some((command, target)) => (command, Some(target)),
                None => (word, None),
            };
            if command.is_empty() || !self.is_name(command) {
                continue;
            }
            if let Some(target) = target
                && !target.eq_ignore_ascii_case(bot_username)
            {
                return None;
            }

            let input = tail.trim().to_string();
            let args = shlex::split(&input)
                .unwrap_or_else(|| input.split_whitespace().map(str::to_owned).collect());
            return Some(Scratch {
                command: Some(command.to_string()),
                args,
                input,
                captures: Vec::new(),
            });
        }
        None
    }

    fn is_name(&self, command: &str) -> bool {
        if self.case_sensitive {
            self.names.iter().any(|n| n == command)
        } else {
            let command = command.to_lowercase();
            self.names.iter().any(|n| *n == command)
        }
    }
}

#[async_trait]
impl Filter for MatchesCommand {
    fn name(&self) -> &str {
        "MatchesCommand"
    }

    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<bool> {
        let Some(text) = ctx.update.message().and_then(|m| m.text.as_deref()) else {
            return Ok(false);
        };
        match self.parse(text, &ctx.state.me.username) {
            Some(parsed) => {
                ctx.scratch.command = parsed.command;
                ctx.scratch.args = parsed.args;
                ctx.scratch.input = parsed.input;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slash(names: &[&str]) -> MatchesCommand {
        MatchesCommand::new(
            names.iter().map(|n| n.to_string()).collect(),
            vec!["/".to_string()],
            false,
        )
    }

    #[test]
    fn test_other_bot_suffix_rejects() {
        let cmd = slash(&["cmd"]);
        assert!(cmd.parse("/cmd@OtherBot arg", "warden_bot").is_none());
        assert!(cmd.parse("/cmd@Warden_Bot arg", "warden_bot").is_some());
    }

    #[test]
    fn test_shell_quoting_is_honored() {
        let parsed = slash(&["cmd"]).parse("/cmd arg1 \"arg two\"", "warden_bot").unwrap();
        assert_eq!(parsed.args, vec!["arg1", "arg two"]);
        assert_eq!(parsed.input, "arg1 \"arg two\"");
        assert_eq!(parsed.command.as_deref(), Some("cmd"));
    }

    #[test]
    fn test_unbalanced_quotes_fall_back_to_whitespace() {
        let parsed = slash(&["note"]).parse("/note it's fine", "warden_bot").unwrap();
        assert_eq!(parsed.args, vec!["it's", "fine"]);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let cmd = slash(&["Ban"]);
        assert!(cmd.parse("/BAN 5", "warden_bot").is_some());

        let strict = MatchesCommand::new(vec!["Ban".into()], vec!["/".into()], true);
        assert!(strict.parse("/ban 5", "warden_bot").is_none());
        assert!(strict.parse("/Ban 5", "warden_bot").is_some());
    }

    #[test]
    fn test_whole_word_only() {
        let cmd = slash(&["ban"]);
        assert!(cmd.parse("/banana", "warden_bot").is_none());
        assert!(cmd.parse("ban 5", "warden_bot").is_none());
    }

    #[test]
    fn test_multiple_prefixes_and_empty_default() {
        let cmd = MatchesCommand::new(vec!["rules".into()], vec!["/".into(), "!".into()], false);
        assert!(cmd.parse("!rules", "warden_bot").is_some());
        assert!(cmd.parse("/rules", "warden_bot").is_some());

        let bare = MatchesCommand::new(vec!["rules".into()], Vec::new(), false);
        assert!(bare.parse("rules please", "warden_bot").is_some());
        assert!(bare.parse("/rules", "warden_bot").is_none());
    }
}
