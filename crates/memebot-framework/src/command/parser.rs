use memebot_core::{Attachment, CallbackAction, Update};

use super::split::shell_split;

/// A command extracted from an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lower-case command name without the leading slash.
    pub token: String,
    pub arguments: Vec<String>,
    pub attachments: Vec<Attachment>,
}

impl ParsedCommand {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            arguments: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// The argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }
}

/// Result of parsing one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// An explicit command or button press.
    Command(ParsedCommand),
    /// Attachments or plain text without a command; they belong to whatever
    /// conversation holds the chat. Plain text carries no attachments.
    Continuation(Vec<Attachment>),
    /// Nothing to act on.
    Ignored,
}

/// Extracts commands from updates.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    bot_username: Option<String>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands addressed to another bot (`/token@otherbot`) are ignored once
    /// the bot's own username is known.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.bot_username = Some(username.trim_start_matches('@').to_string());
        self
    }

    pub fn parse(&self, update: &Update) -> Parsed {
        if let Some(callback) = update.callback() {
            return Self::parse_callback(callback);
        }

        if let Some(text) = update.text()
            && let Some(command) = self.parse_text(text)
        {
            return Parsed::Command(command.with_attachments(update.attachments().to_vec()));
        }

        if !update.attachments().is_empty() || update.text().is_some_and(is_plain_text) {
            Parsed::Continuation(update.attachments().to_vec())
        } else {
            Parsed::Ignored
        }
    }

    fn parse_text(&self, text: &str) -> Option<ParsedCommand> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, tail) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (name, mention) = match head.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (head, None),
        };
        if let (Some(mention), Some(own)) = (mention, &self.bot_username)
            && !mention.eq_ignore_ascii_case(own)
        {
            return None;
        }
        if !is_token(name) {
            return None;
        }

        Some(ParsedCommand::new(name.to_ascii_lowercase()).with_arguments(shell_split(tail)))
    }

    fn parse_callback(callback: &CallbackAction) -> Parsed {
        let mut parts = callback.data.split(':');
        let Some(name) = parts.next().filter(|name| is_token(name)) else {
            return Parsed::Ignored;
        };
        let arguments = parts.map(str::to_string).collect();
        Parsed::Command(ParsedCommand::new(name.to_ascii_lowercase()).with_arguments(arguments))
    }
}

/// Non-blank text that does not look like a command.
fn is_plain_text(text: &str) -> bool {
    let text = text.trim_start();
    !text.is_empty() && !text.starts_with('/')
}

/// Returns `true` if `name` can be a command token.
pub(crate) fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use memebot_core::{ChatId, Sender, SequenceMarker, UserId};

    fn update() -> Update {
        Update::new(SequenceMarker(1), ChatId(1), Sender::new(UserId(7), "alice"))
    }

    fn command(parsed: Parsed) -> ParsedCommand {
        match parsed {
            Parsed::Command(cmd) => cmd,
            other => panic!("expected a command, got {other:?}"),
        }
    }

    #[test]
    fn test_text_command() {
        let cmd = command(CommandParser::new().parse(&update().with_text("/Fortune  today now")));
        assert_eq!(cmd.token, "fortune");
        assert_eq!(cmd.arguments, vec!["today", "now"]);
        assert!(cmd.attachments.is_empty());
    }

    #[test]
    fn test_caption_command_keeps_attachments() {
        let parsed = CommandParser::new().parse(
            &update()
                .with_text("/dongzhuo")
                .with_attachment(Attachment::photo("A")),
        );
        let cmd = command(parsed);
        assert_eq!(cmd.token, "dongzhuo");
        assert_eq!(cmd.attachments, vec![Attachment::photo("A")]);
    }

    #[test]
    fn test_mention_filter() {
        let parser = CommandParser::new().with_bot_username("@MemeBot");
        assert_eq!(
            command(parser.parse(&update().with_text("/start@memebot"))).token,
            "start"
        );
        assert_eq!(
            parser.parse(&update().with_text("/start@otherbot")),
            Parsed::Ignored
        );
    }

    #[test]
    fn test_callback_command() {
        let parsed = CommandParser::new().parse(&update().with_callback(CallbackAction {
            id: "cb1".into(),
            data: "REROLL:7:2024-05-01".into(),
            message_id: Some(3),
        }));
        let cmd = command(parsed);
        assert_eq!(cmd.token, "reroll");
        assert_eq!(cmd.arguments, vec!["7", "2024-05-01"]);
    }

    #[test]
    fn test_bare_photo_is_continuation() {
        let parsed = CommandParser::new().parse(&update().with_attachment(Attachment::photo("B")));
        assert_eq!(parsed, Parsed::Continuation(vec![Attachment::photo("B")]));
    }

    #[test]
    fn test_plain_text_is_empty_continuation() {
        let parser = CommandParser::new();
        assert_eq!(
            parser.parse(&update().with_text("hello")),
            Parsed::Continuation(Vec::new())
        );
        assert_eq!(parser.parse(&update().with_text("   ")), Parsed::Ignored);
    }

    #[test]
    fn test_malformed_commands_ignored() {
        let parser = CommandParser::new();
        assert_eq!(parser.parse(&update().with_text("/")), Parsed::Ignored);
        assert_eq!(parser.parse(&update().with_text("/a-b")), Parsed::Ignored);
    }
}
