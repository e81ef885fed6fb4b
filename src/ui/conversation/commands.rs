use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Stage a PNG, JPEG or plain text file for the next message
    Attach,
    /// Drop the staged file
    Detach,
    /// Show the current session id
    Session,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Attach => "attach a file to the next message: /attach <path>",
            SlashCommand::Detach => "remove the attached file",
            SlashCommand::Session => "show the current session id",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is pending.
    pub fn available_while_pending(self) -> bool {
        !matches!(self, SlashCommand::Attach)
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim_start();
    let rest = input.strip_prefix('/')?;

    let (head, argument) = match rest.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, Some(tail.trim().to_string()).filter(|s| !s.is_empty())),
        None => (rest.trim_end(), None),
    };

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "exit" | "bye" => Some(SlashCommand::Quit),
            "a" | "file" => Some(SlashCommand::Attach),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }
    help.push_str("\nAliases: /q for /quit, /a for /attach, /h for /help");
    help
}
